/// BTC staking messages / API
/// Payloads carried by the execute messages of the btc-staking contract.
/// Keys and hashes are hex encoded; transactions use Bitcoin consensus encoding.
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Decimal;

use crate::Bytes;

/// Hash size in bytes
pub const HASH_SIZE: usize = 32;
/// BIP-340 public key size in bytes
pub const BIP340_PUB_KEY_LEN: usize = 32;
/// BIP-340 signature size in bytes
pub const BIP340_SIGNATURE_LEN: usize = 64;
/// Schnorr adaptor signature size in bytes: compressed R, s_hat and the negation flag
pub const ADAPTOR_SIGNATURE_LEN: usize = 66;
/// Compact recoverable ECDSA signature size in bytes
pub const ECDSA_SIGNATURE_LEN: usize = 65;
/// Secret key size in bytes
pub const SECRET_KEY_LEN: usize = 32;

#[cw_serde]
pub struct NewFinalityProvider {
    /// addr is the staking-chain address of the finality provider; it must be the sender
    pub addr: String,
    /// description defines the description terms for the finality provider
    pub description: Option<FinalityProviderDescription>,
    /// commission defines the initial commission rate and its bounds
    pub commission: CommissionRates,
    /// btc_pk_hex is the Bitcoin secp256k1 PK of this finality provider
    /// the PK follows encoding in BIP-340 spec in hex format
    pub btc_pk_hex: String,
    /// pop is the proof of possession of the btc_pk over the finality provider's address
    pub pop: Option<ProofOfPossessionBtc>,
    /// bsn_id is the id of the network the finality provider secures
    pub bsn_id: String,
}

#[cw_serde]
pub struct EditFinalityProvider {
    pub addr: String,
    pub btc_pk_hex: String,
    /// description replaces the stored description when set
    pub description: Option<FinalityProviderDescription>,
    /// commission is the new commission rate, if any
    pub commission: Option<Decimal>,
}

#[cw_serde]
pub struct CommissionRates {
    /// rate is the commission rate charged to delegators
    pub rate: Decimal,
    /// max_rate is the maximum commission rate the finality provider can ever charge
    pub max_rate: Decimal,
    /// max_change_rate is the maximum change of the rate allowed in a single edit
    pub max_change_rate: Decimal,
}

#[cw_serde]
pub struct FinalityProviderDescription {
    /// moniker is the name of the finality provider
    pub moniker: String,
    /// identity is the identity of the finality provider
    pub identity: String,
    /// website is the website of the finality provider
    pub website: String,
    /// security_contact is the security contact of the finality provider
    pub security_contact: String,
    /// details is the details of the finality provider
    pub details: String,
}

impl FinalityProviderDescription {
    /// Description field lengths
    pub const MAX_MONIKER_LENGTH: usize = 70;
    pub const MAX_IDENTITY_LENGTH: usize = 3000;
    pub const MAX_WEBSITE_LENGTH: usize = 140;
    pub const MAX_SECURITY_CONTACT_LENGTH: usize = 140;
    pub const MAX_DETAILS_LENGTH: usize = 280;
}

/// ProofOfPossessionBtc is the proof that the holder of a Bitcoin key also controls a
/// staking-chain address
#[cw_serde]
pub enum ProofOfPossessionBtc {
    /// Bip340 is a Schnorr signature over the hashed signing context and canonical address
    Bip340 { sig: Bytes },
    /// Bip322 is a BIP-322 simple signature by `address`; `sig` is the consensus-encoded
    /// witness stack
    Bip322 { address: String, sig: Bytes },
    /// Ecdsa is a 65-byte compact recoverable signature in Bitcoin signed-message format
    Ecdsa { sig: Bytes },
}

impl ProofOfPossessionBtc {
    pub fn sig(&self) -> &Bytes {
        match self {
            ProofOfPossessionBtc::Bip340 { sig }
            | ProofOfPossessionBtc::Bip322 { sig, .. }
            | ProofOfPossessionBtc::Ecdsa { sig } => sig,
        }
    }
}

/// InclusionProof proves that a transaction is included in a canonical BTC block
#[cw_serde]
pub struct InclusionProof {
    /// block_hash_hex is the hash of the block containing the transaction
    pub block_hash_hex: String,
    /// tx_index is the position of the transaction in the block
    pub tx_index: u32,
    /// proof is the Merkle branch, as concatenated 32-byte sibling hashes from the leaf up
    pub proof: Bytes,
}

#[cw_serde]
pub struct NewBtcDelegation {
    /// staker_addr is the staking-chain address of the staker; it must be the sender
    pub staker_addr: String,
    /// btc_pk_hex is the Bitcoin secp256k1 PK of the BTC delegator.
    /// The PK follows encoding in BIP-340 spec in hex format
    pub btc_pk_hex: String,
    /// pop is the proof of possession of btc_pk over staker_addr
    pub pop: Option<ProofOfPossessionBtc>,
    /// fp_btc_pk_list is the list of BIP-340 PKs of the finality providers that
    /// this BTC delegation delegates to
    pub fp_btc_pk_list: Vec<String>,
    /// staking_time is the time lock of the staking output, in BTC blocks
    pub staking_time: u32,
    /// staking_value is the amount locked in the staking output, in satoshi
    pub staking_value: u64,
    /// staking_tx is the staking tx
    pub staking_tx: Bytes,
    /// staking_tx_inclusion_proof optionally proves the staking tx is already on chain
    pub staking_tx_inclusion_proof: Option<InclusionProof>,
    /// slashing_tx is the slashing tx spending the staking output
    pub slashing_tx: Bytes,
    /// delegator_slashing_sig is the staker's signature on the slashing tx
    pub delegator_slashing_sig: Bytes,
    /// unbonding_time is used in the unbonding output time-lock path and in slashing
    /// transactions change outputs
    pub unbonding_time: u32,
    /// unbonding_tx is the transaction moving the stake into the unbonding output
    pub unbonding_tx: Bytes,
    /// unbonding_value is the amount locked in the unbonding output, in satoshi
    pub unbonding_value: u64,
    /// unbonding_slashing_tx is the slashing tx spending the unbonding output
    pub unbonding_slashing_tx: Bytes,
    /// delegator_unbonding_slashing_sig is the staker's signature on the unbonding slashing tx
    pub delegator_unbonding_slashing_sig: Bytes,
}

/// CovenantSignatures is the submission of a single covenant member for a delegation
#[cw_serde]
pub struct CovenantSignatures {
    /// cov_pk_hex is the BIP-340 PK of the covenant member
    pub cov_pk_hex: String,
    /// staking_tx_hash identifies the delegation
    pub staking_tx_hash: String,
    /// slashing_tx_sigs holds one adaptor signature per finality provider of the delegation,
    /// in the order of its fp_btc_pk_list
    pub slashing_tx_sigs: Vec<Bytes>,
    /// unbonding_tx_sig is a Schnorr signature on the unbonding tx
    pub unbonding_tx_sig: Bytes,
    /// slashing_unbonding_tx_sigs holds one adaptor signature per finality provider over the
    /// unbonding slashing tx
    pub slashing_unbonding_tx_sigs: Vec<Bytes>,
    /// stake_expansion_tx_sig is accepted for compatibility and ignored
    pub stake_expansion_tx_sig: Option<Bytes>,
}

/// CovenantAdaptorSignatures is a list adaptor signatures signed by the
/// covenant with different finality provider's public keys as encryption keys
#[cw_serde]
pub struct CovenantAdaptorSignatures {
    /// cov_pk is the public key of the covenant emulator, used as the public key of the adaptor signature
    pub cov_pk: Bytes,
    /// adaptor_sigs is a list of adaptor signatures, each encrypted by a restaked BTC finality provider's public key
    pub adaptor_sigs: Vec<Bytes>,
}

/// SignatureInfo is a BIP-340 signature together with its signer's BIP-340 PK
#[cw_serde]
pub struct SignatureInfo {
    pub pk: Bytes,
    pub sig: Bytes,
}

/// BtcUndelegate reports a Bitcoin transaction that spent the staking output through the
/// unbonding path
#[cw_serde]
pub struct BtcUndelegate {
    pub staking_tx_hash: String,
    /// stake_spending_tx is the transaction spending the staking output
    pub stake_spending_tx: Bytes,
    /// stake_spending_tx_inclusion_proof proves stake_spending_tx is k-deep
    pub stake_spending_tx_inclusion_proof: InclusionProof,
    /// funding_transactions are the transactions funding the inputs of stake_spending_tx
    /// other than the staking output
    pub funding_transactions: Vec<Bytes>,
}

/// SelectiveSlashingEvidence reveals the secret key of a finality provider of the delegation
#[cw_serde]
pub struct SelectiveSlashingEvidence {
    pub staking_tx_hash: String,
    /// recovered_fp_btc_sk is the extracted BTC SK of the finality provider, hex encoded
    pub recovered_fp_btc_sk: String,
}

/// Evidence is the evidence that a finality provider has signed finality
/// signatures with correct public randomness on two conflicting blocks
#[cw_serde]
pub struct Evidence {
    /// `fp_btc_pk` is the BTC PK of the finality provider that casts this vote
    pub fp_btc_pk: Bytes,
    /// `block_height` is the height of the conflicting blocks
    pub block_height: u64,
    /// `pub_rand` is the public randomness the finality provider has committed to
    pub pub_rand: Bytes,
    /// `canonical_app_hash` is the AppHash of the canonical block
    pub canonical_app_hash: Bytes,
    /// `fork_app_hash` is the AppHash of the fork block
    pub fork_app_hash: Bytes,
    /// `canonical_finality_sig` is the EOTS signature on the canonical block
    pub canonical_finality_sig: Bytes,
    /// `fork_finality_sig` is the EOTS signature on the fork block
    pub fork_finality_sig: Bytes,
}

impl Evidence {
    /// msg_to_sign is the message a finality provider signs when voting for `app_hash`
    pub fn msg_to_sign(height: u64, app_hash: &[u8]) -> Vec<u8> {
        let mut msg = height.to_be_bytes().to_vec();
        msg.extend_from_slice(app_hash);
        msg
    }
}
