use std::collections::HashSet;
use std::str::FromStr;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::Order::Descending;
use cosmwasm_std::{Decimal, StdResult, Storage};
use cw_storage_plus::{Bound, Map};
use derivative::Derivative;

use babylon_apis::error::StakingApiError;
use babylon_btcstaking::tx_verify::{is_rate_valid, SlashingTxParams};
use bitcoin::{ScriptBuf, XOnlyPublicKey};

use crate::error::ContractError;

/// Params versions, keyed by version number
pub(crate) const PARAMS: Map<u32, Params> = Map::new("params");
/// Params version governing new delegations from a BTC height on
pub(crate) const HEIGHT_TO_VERSION: Map<u32, u32> = Map::new("height_to_version");

/// Params define the governance-selectable BTC staking parameters.
/// A version is immutable once stored; updates append a new version.
#[cw_serde]
#[derive(Derivative)]
#[derivative(Default)]
pub struct Params {
    /// `covenant_pks` is the list of public keys held by the covenant committee each PK
    /// follows encoding in BIP-340 spec on Bitcoin
    pub covenant_pks: Vec<String>,
    /// `covenant_quorum` is the minimum number of signatures needed for the covenant multi-signature
    #[derivative(Default(value = "1"))]
    pub covenant_quorum: u32,
    #[derivative(Default(value = "1000"))]
    pub min_staking_value_sat: u64,
    #[derivative(Default(value = "10_000_000_000"))]
    pub max_staking_value_sat: u64,
    #[derivative(Default(value = "10"))]
    pub min_staking_time_blocks: u32,
    #[derivative(Default(value = "65535"))]
    pub max_staking_time_blocks: u32,
    /// `slashing_pk_script` is the pk script that the slashed BTC goes to, hex encoded
    #[derivative(Default(
        value = "String::from(\"76a914010101010101010101010101010101010101010188ac\")"
    ))]
    pub slashing_pk_script: String,
    /// `min_slashing_tx_fee_sat` is the minimum amount of tx fee (quantified in Satoshi) needed for
    /// the pre-signed slashing tx
    #[derivative(Default(value = "1000"))]
    pub min_slashing_tx_fee_sat: u64,
    /// `slashing_rate` determines the portion of the staked amount to be slashed,
    /// expressed as a decimal (e.g. 0.5 for 50%), with at most two decimal places
    #[derivative(Default(value = "Decimal::percent(10)"))]
    pub slashing_rate: Decimal,
    /// `unbonding_time_blocks` is the minimum (exclusive) unbonding time a delegation may use
    #[derivative(Default(value = "101"))]
    pub unbonding_time_blocks: u32,
    /// `unbonding_fee_sat` is the exact fee the unbonding tx pays
    #[derivative(Default(value = "1000"))]
    pub unbonding_fee_sat: u64,
    /// `min_commission_rate` is the chain-wide minimum commission rate that a finality provider
    /// can charge their delegators
    pub min_commission_rate: Decimal,
    /// `max_finality_providers` caps the number of finality providers a delegation restakes to
    #[derivative(Default(value = "10"))]
    pub max_finality_providers: u32,
    /// `btc_activation_height` is the first BTC height at which this version governs new
    /// delegations
    pub btc_activation_height: u32,
}

impl Params {
    pub fn validate(&self) -> Result<(), ContractError> {
        let covenant_pks = self.covenant_keys()?;
        let unique: HashSet<_> = covenant_pks.iter().collect();
        if unique.len() != covenant_pks.len() {
            return Err(ContractError::InvalidParams(
                "duplicated covenant public key".to_string(),
            ));
        }
        if self.covenant_quorum == 0 || self.covenant_quorum as usize > covenant_pks.len() {
            return Err(ContractError::InvalidParams(format!(
                "covenant quorum {} out of range for {} members",
                self.covenant_quorum,
                covenant_pks.len()
            )));
        }
        if 2 * self.covenant_quorum as usize <= covenant_pks.len() {
            return Err(ContractError::InvalidParams(
                "covenant quorum must be a majority of the committee".to_string(),
            ));
        }
        if self.min_staking_value_sat == 0 || self.min_staking_value_sat > self.max_staking_value_sat
        {
            return Err(ContractError::InvalidParams(
                "invalid staking value range".to_string(),
            ));
        }
        if self.min_staking_time_blocks == 0
            || self.min_staking_time_blocks > self.max_staking_time_blocks
            || self.max_staking_time_blocks > u16::MAX as u32
        {
            return Err(ContractError::InvalidParams(
                "invalid staking time range".to_string(),
            ));
        }
        if self.unbonding_time_blocks == 0 || self.unbonding_time_blocks > u16::MAX as u32 {
            return Err(ContractError::InvalidParams(
                "invalid unbonding time".to_string(),
            ));
        }
        if self.slashing_script()?.is_empty() {
            return Err(ContractError::InvalidParams(
                "empty slashing pk script".to_string(),
            ));
        }
        if self.min_slashing_tx_fee_sat == 0 || self.unbonding_fee_sat == 0 {
            return Err(ContractError::InvalidParams(
                "fees must be positive".to_string(),
            ));
        }
        if !is_rate_valid(self.slashing_rate_dec()?) {
            return Err(ContractError::InvalidParams(format!(
                "invalid slashing rate {}",
                self.slashing_rate
            )));
        }
        if self.min_commission_rate > Decimal::one() {
            return Err(ContractError::InvalidParams(
                "min commission rate above one".to_string(),
            ));
        }
        if self.max_finality_providers == 0 {
            return Err(ContractError::InvalidParams(
                "max finality providers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn covenant_keys(&self) -> Result<Vec<XOnlyPublicKey>, ContractError> {
        self.covenant_pks
            .iter()
            .map(|pk_hex| {
                parse_x_only(pk_hex).map_err(|_| ContractError::InvalidCovenantPk(pk_hex.clone()))
            })
            .collect()
    }

    pub fn slashing_script(&self) -> Result<ScriptBuf, ContractError> {
        Ok(ScriptBuf::from_bytes(hex::decode(&self.slashing_pk_script)?))
    }

    pub fn slashing_rate_dec(&self) -> Result<rust_decimal::Decimal, ContractError> {
        rust_decimal::Decimal::from_str(&self.slashing_rate.to_string())
            .map_err(|e| ContractError::InvalidParams(e.to_string()))
    }

    /// slashing_tx_params fixes the shape of the slashing txs of a delegation
    pub fn slashing_tx_params<'a>(
        &self,
        slashing_script: &'a ScriptBuf,
        change_lock_time: u16,
    ) -> Result<SlashingTxParams<'a>, ContractError> {
        Ok(SlashingTxParams {
            slashing_pk_script: slashing_script.as_script(),
            slashing_rate: self.slashing_rate_dec()?,
            min_fee: self.min_slashing_tx_fee_sat,
            change_lock_time,
        })
    }

    pub fn has_covenant_pk(&self, pk_hex: &str) -> bool {
        self.covenant_pks
            .iter()
            .any(|pk| pk.eq_ignore_ascii_case(pk_hex))
    }
}

pub fn parse_x_only(pk_hex: &str) -> Result<XOnlyPublicKey, ContractError> {
    let bytes = hex::decode(pk_hex)?;
    XOnlyPublicKey::from_slice(&bytes)
        .map_err(|_| StakingApiError::InvalidBtcPk(pk_hex.to_string()).into())
}

/// save_params validates and appends a new params version, returning its version number
pub fn save_params(storage: &mut dyn Storage, params: &Params) -> Result<u32, ContractError> {
    params.validate()?;
    let version = match get_latest_params(storage)? {
        Some((latest_version, latest)) => {
            if params.btc_activation_height <= latest.btc_activation_height {
                return Err(ContractError::InvalidParams(format!(
                    "activation height {} must be above {}",
                    params.btc_activation_height, latest.btc_activation_height
                )));
            }
            latest_version + 1
        }
        None => 0,
    };
    PARAMS.save(storage, version, params)?;
    HEIGHT_TO_VERSION.save(storage, params.btc_activation_height, &version)?;
    Ok(version)
}

pub fn get_latest_params(storage: &dyn Storage) -> StdResult<Option<(u32, Params)>> {
    PARAMS.range(storage, None, None, Descending).next().transpose()
}

pub fn get_params_by_version(storage: &dyn Storage, version: u32) -> Result<Params, ContractError> {
    PARAMS
        .may_load(storage, version)?
        .ok_or(ContractError::ParamsVersionNotFound(version))
}

/// get_params_at_btc_height returns the version governing new delegations at `height`,
/// that is the one with the largest activation height not above it
pub fn get_params_at_btc_height(
    storage: &dyn Storage,
    height: u32,
) -> Result<(u32, Params), ContractError> {
    let version = HEIGHT_TO_VERSION
        .range(storage, None, Some(Bound::inclusive(height)), Descending)
        .next()
        .transpose()?
        .map(|(_, version)| version)
        .ok_or(ContractError::ParamsNotFound(height))?;
    Ok((version, get_params_by_version(storage, version)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::test_utils::staking_params;
    use cosmwasm_std::testing::mock_dependencies;

    #[test]
    fn default_params_need_covenants() {
        assert_eq!(
            Params::default().validate(),
            Err(ContractError::InvalidParams(
                "covenant quorum 1 out of range for 0 members".to_string()
            ))
        );
        staking_params().validate().unwrap();
    }

    #[test]
    fn quorum_must_be_majority() {
        let mut params = staking_params();
        params.covenant_quorum = 2;
        assert_matches!(
            params.validate(),
            Err(ContractError::InvalidParams(_))
        );
    }

    #[test]
    fn slashing_rate_precision() {
        let mut params = staking_params();
        params.slashing_rate = Decimal::from_str("0.105").unwrap();
        assert!(params.validate().is_err());
        params.slashing_rate = Decimal::from_str("0.15").unwrap();
        params.validate().unwrap();
    }

    #[test]
    fn versions_follow_activation_height() {
        let mut deps = mock_dependencies();
        let storage = deps.as_mut().storage;

        let mut params = staking_params();
        params.btc_activation_height = 100;
        assert_eq!(save_params(storage, &params).unwrap(), 0);

        // activation heights are strictly increasing
        assert_matches!(
            save_params(storage, &params),
            Err(ContractError::InvalidParams(_))
        );

        params.btc_activation_height = 200;
        params.min_staking_value_sat = 5_000;
        assert_eq!(save_params(storage, &params).unwrap(), 1);

        assert_eq!(
            get_params_at_btc_height(storage, 99),
            Err(ContractError::ParamsNotFound(99))
        );
        assert_eq!(get_params_at_btc_height(storage, 100).unwrap().0, 0);
        assert_eq!(get_params_at_btc_height(storage, 199).unwrap().0, 0);
        let (version, at_200) = get_params_at_btc_height(storage, 200).unwrap();
        assert_eq!(version, 1);
        assert_eq!(at_200.min_staking_value_sat, 5_000);
        assert_eq!(get_params_at_btc_height(storage, 10_000).unwrap().0, 1);
    }
}
