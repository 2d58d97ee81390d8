use std::collections::HashSet;

use babylon_bitcoin::merkle::MAX_PROOF_DEPTH;
use babylon_bitcoin::{deserialize, Transaction};

use cosmwasm_std::{Decimal, StdError};

use crate::btc_staking_api::{
    BtcUndelegate, CommissionRates, CovenantSignatures, EditFinalityProvider,
    FinalityProviderDescription, InclusionProof, NewBtcDelegation, NewFinalityProvider,
    ProofOfPossessionBtc, SelectiveSlashingEvidence, ADAPTOR_SIGNATURE_LEN, BIP340_PUB_KEY_LEN,
    BIP340_SIGNATURE_LEN, ECDSA_SIGNATURE_LEN, HASH_SIZE, SECRET_KEY_LEN,
};
use crate::error::StakingApiError;

/// A trait for validating the API structs / input.
pub trait Validate {
    fn validate(&self) -> Result<(), StakingApiError>;
}

fn validate_btc_pk_hex(pk_hex: &str) -> Result<(), StakingApiError> {
    if pk_hex.is_empty() {
        return Err(StakingApiError::EmptyBtcPk);
    }
    let pk = hex::decode(pk_hex)?;
    if pk.len() != BIP340_PUB_KEY_LEN {
        return Err(StakingApiError::InvalidBtcPk(pk_hex.to_string()));
    }
    Ok(())
}

fn validate_hash_hex(hash_hex: &str) -> Result<(), StakingApiError> {
    if hash_hex.len() != HASH_SIZE * 2 {
        return Err(StakingApiError::InvalidStakingTxHash(HASH_SIZE * 2));
    }
    hex::decode(hash_hex)?;
    Ok(())
}

fn validate_tx(tx: &[u8], empty: StakingApiError) -> Result<(), StakingApiError> {
    if tx.is_empty() {
        return Err(empty);
    }
    let _: Transaction =
        deserialize(tx).map_err(|_| StakingApiError::InvalidBtcTx(hex::encode(tx)))?;
    Ok(())
}

fn validate_len(what: &str, bytes: &[u8], expected: usize) -> Result<(), StakingApiError> {
    if bytes.len() != expected {
        return Err(StakingApiError::invalid_length(what, expected, bytes.len()));
    }
    Ok(())
}

impl Validate for NewFinalityProvider {
    fn validate(&self) -> Result<(), StakingApiError> {
        self.description
            .as_ref()
            .map(FinalityProviderDescription::validate)
            .transpose()?;

        validate_btc_pk_hex(&self.btc_pk_hex)?;

        match self.pop {
            Some(ref pop) => pop.validate()?,
            None => return Err(StakingApiError::MissingPop),
        }

        self.commission.validate()?;

        if self.bsn_id.is_empty() {
            return Err(StakingApiError::EmptyBsnId);
        }

        Ok(())
    }
}

impl Validate for EditFinalityProvider {
    fn validate(&self) -> Result<(), StakingApiError> {
        validate_btc_pk_hex(&self.btc_pk_hex)?;
        self.description
            .as_ref()
            .map(FinalityProviderDescription::validate)
            .transpose()?;
        if let Some(rate) = self.commission {
            if rate > Decimal::one() {
                return Err(StakingApiError::InvalidCommission(
                    "rate cannot exceed 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Validate for CommissionRates {
    fn validate(&self) -> Result<(), StakingApiError> {
        if self.max_rate > Decimal::one() {
            return Err(StakingApiError::InvalidCommission(
                "max rate cannot exceed 1".to_string(),
            ));
        }
        if self.rate > self.max_rate {
            return Err(StakingApiError::InvalidCommission(
                "rate cannot exceed max rate".to_string(),
            ));
        }
        if self.max_change_rate > self.max_rate {
            return Err(StakingApiError::InvalidCommission(
                "max change rate cannot exceed max rate".to_string(),
            ));
        }
        Ok(())
    }
}

impl Validate for FinalityProviderDescription {
    fn validate(&self) -> Result<(), StakingApiError> {
        if self.moniker.is_empty() {
            return Err(StakingApiError::description_err("Moniker cannot be empty"));
        }
        if self.moniker.len() > FinalityProviderDescription::MAX_MONIKER_LENGTH {
            return Err(StakingApiError::description_err(format!(
                "Invalid moniker length; got: {}, max: {}",
                self.moniker.len(),
                FinalityProviderDescription::MAX_MONIKER_LENGTH
            )));
        }

        if self.identity.len() > FinalityProviderDescription::MAX_IDENTITY_LENGTH {
            return Err(StakingApiError::from(StdError::generic_err(format!(
                "Invalid identity length; got: {}, max: {}",
                self.identity.len(),
                FinalityProviderDescription::MAX_IDENTITY_LENGTH
            ))));
        }

        if self.website.len() > FinalityProviderDescription::MAX_WEBSITE_LENGTH {
            return Err(StakingApiError::from(StdError::generic_err(format!(
                "Invalid website length; got: {}, max: {}",
                self.website.len(),
                FinalityProviderDescription::MAX_WEBSITE_LENGTH
            ))));
        }

        if self.security_contact.len() > FinalityProviderDescription::MAX_SECURITY_CONTACT_LENGTH {
            return Err(StakingApiError::from(StdError::generic_err(format!(
                "Invalid security contact length; got: {}, max: {}",
                self.security_contact.len(),
                FinalityProviderDescription::MAX_SECURITY_CONTACT_LENGTH
            ))));
        }

        if self.details.len() > FinalityProviderDescription::MAX_DETAILS_LENGTH {
            return Err(StakingApiError::from(StdError::generic_err(format!(
                "Invalid details length; got: {}, max: {}",
                self.details.len(),
                FinalityProviderDescription::MAX_DETAILS_LENGTH
            ))));
        }

        Ok(())
    }
}

impl Validate for ProofOfPossessionBtc {
    fn validate(&self) -> Result<(), StakingApiError> {
        match self {
            ProofOfPossessionBtc::Bip340 { sig } => {
                validate_len("pop signature", sig, BIP340_SIGNATURE_LEN)
            }
            ProofOfPossessionBtc::Bip322 { address, sig } => {
                if address.is_empty() || sig.is_empty() {
                    return Err(StakingApiError::MissingPop);
                }
                Ok(())
            }
            ProofOfPossessionBtc::Ecdsa { sig } => validate_len("pop signature", sig, ECDSA_SIGNATURE_LEN),
        }
    }
}

impl Validate for InclusionProof {
    fn validate(&self) -> Result<(), StakingApiError> {
        if self.block_hash_hex.len() != HASH_SIZE * 2 {
            return Err(StakingApiError::InvalidBlockHash(HASH_SIZE * 2));
        }
        hex::decode(&self.block_hash_hex)?;
        if self.proof.len() % HASH_SIZE != 0 {
            return Err(StakingApiError::InvalidInclusionProof(format!(
                "proof length {} is not a multiple of {HASH_SIZE}",
                self.proof.len()
            )));
        }
        if self.proof.len() / HASH_SIZE > MAX_PROOF_DEPTH {
            return Err(StakingApiError::InvalidInclusionProof(format!(
                "proof has more than {MAX_PROOF_DEPTH} hashes"
            )));
        }
        Ok(())
    }
}

impl Validate for NewBtcDelegation {
    fn validate(&self) -> Result<(), StakingApiError> {
        if self.staker_addr.is_empty() {
            return Err(StakingApiError::EmptyStakerAddr);
        }
        validate_btc_pk_hex(&self.btc_pk_hex)?;
        match self.pop {
            Some(ref pop) => pop.validate()?,
            None => return Err(StakingApiError::MissingPop),
        }

        // Ensure the list of finality provider BTC PKs is not empty
        if self.fp_btc_pk_list.is_empty() {
            return Err(StakingApiError::EmptyBtcPkList);
        }
        // Ensure the list of finality provider BTC PKs is not duplicated
        let mut fp_btc_pk_set = HashSet::new();
        for fp_btc_pk in &self.fp_btc_pk_list {
            validate_btc_pk_hex(fp_btc_pk)?;
            if !fp_btc_pk_set.insert(fp_btc_pk.to_lowercase()) {
                return Err(StakingApiError::DuplicatedBtcPk(fp_btc_pk.clone()));
            }
        }

        if self.staking_time == 0 || self.staking_time > u16::MAX as u32 {
            return Err(StakingApiError::InvalidStakingTime(
                self.staking_time,
                u16::MAX as u32,
            ));
        }
        // Check unbonding time is lower than max uint16
        if self.unbonding_time == 0 || self.unbonding_time > u16::MAX as u32 {
            return Err(StakingApiError::ErrInvalidUnbondingTime(
                self.unbonding_time,
                u16::MAX as u32,
            ));
        }
        if self.staking_value == 0 {
            return Err(StakingApiError::ZeroStakingValue);
        }
        if self.unbonding_value == 0 {
            return Err(StakingApiError::ZeroUnbondingValue);
        }

        validate_tx(&self.staking_tx, StakingApiError::EmptyStakingTx)?;
        validate_tx(&self.slashing_tx, StakingApiError::EmptySlashingTx)?;
        validate_tx(&self.unbonding_tx, StakingApiError::EmptyUnbondingTx)?;
        validate_tx(&self.unbonding_slashing_tx, StakingApiError::EmptySlashingTx)?;

        validate_len(
            "delegator slashing signature",
            &self.delegator_slashing_sig,
            BIP340_SIGNATURE_LEN,
        )?;
        validate_len(
            "delegator unbonding slashing signature",
            &self.delegator_unbonding_slashing_sig,
            BIP340_SIGNATURE_LEN,
        )?;

        self.staking_tx_inclusion_proof
            .as_ref()
            .map(InclusionProof::validate)
            .transpose()?;

        Ok(())
    }
}

impl Validate for CovenantSignatures {
    fn validate(&self) -> Result<(), StakingApiError> {
        validate_btc_pk_hex(&self.cov_pk_hex)?;
        validate_hash_hex(&self.staking_tx_hash)?;
        validate_len(
            "covenant unbonding signature",
            &self.unbonding_tx_sig,
            BIP340_SIGNATURE_LEN,
        )?;
        for sig in self
            .slashing_tx_sigs
            .iter()
            .chain(self.slashing_unbonding_tx_sigs.iter())
        {
            validate_len("covenant adaptor signature", sig, ADAPTOR_SIGNATURE_LEN)?;
        }
        Ok(())
    }
}

impl Validate for BtcUndelegate {
    fn validate(&self) -> Result<(), StakingApiError> {
        validate_hash_hex(&self.staking_tx_hash)?;
        validate_tx(&self.stake_spending_tx, StakingApiError::EmptyUnbondingTx)?;
        for funding_tx in &self.funding_transactions {
            validate_tx(funding_tx, StakingApiError::EmptyStakingTx)?;
        }
        self.stake_spending_tx_inclusion_proof.validate()
    }
}

impl Validate for SelectiveSlashingEvidence {
    fn validate(&self) -> Result<(), StakingApiError> {
        validate_hash_hex(&self.staking_tx_hash)?;

        if self.recovered_fp_btc_sk.is_empty() {
            return Err(StakingApiError::EmptyBtcSk);
        }
        let sk = hex::decode(&self.recovered_fp_btc_sk)?;
        if sk.len() != SECRET_KEY_LEN {
            return Err(StakingApiError::InvalidBtcSk(sk.len()));
        }

        Ok(())
    }
}
