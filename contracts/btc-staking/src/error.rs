use cosmwasm_std::{Decimal, StdError, Uint256};
use cw_controllers::AdminError;
use cw_utils::PaymentError;
use hex::FromHexError;
use thiserror::Error;

use babylon_apis::error::StakingApiError;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),
    #[error("{0}")]
    Payment(#[from] PaymentError),
    #[error("{0}")]
    Admin(#[from] AdminError),
    #[error("{0}")]
    StakingApi(#[from] StakingApiError),
    #[error("{0}")]
    BtcStaking(#[from] babylon_btcstaking::error::Error),
    #[error("{0}")]
    Bitcoin(#[from] babylon_bitcoin::error::Error),
    #[error("{0}")]
    Eots(#[from] eots::Error),
    #[error("{0}")]
    HexError(#[from] FromHexError),
    #[error("{0}")]
    HashError(#[from] babylon_bitcoin::HexError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Finality provider not found: {0}")]
    FpNotFound(String),
    #[error("Finality provider already registered: {0}")]
    FpAlreadyRegistered(String),
    #[error("Finality provider already slashed: {0}")]
    FpAlreadySlashed(String),
    #[error("Finality provider already jailed: {0}")]
    FpAlreadyJailed(String),
    #[error("Finality provider is not jailed: {0}")]
    FpNotJailed(String),
    #[error("Finality provider {0} is not restaked by delegation {1}")]
    FpNotInDelegation(String, String),
    #[error("BTC delegation not found: {0}")]
    DelegationNotFound(String),
    #[error("Staking tx already used: {0}")]
    ReusedStakingTx(String),
    #[error("Staking tx is not in the allow list: {0}")]
    StakingTxNotAllowed(String),
    #[error("Covenant public key is not part of the committee: {0}")]
    InvalidCovenantPk(String),
    #[error("Invalid covenant signature: {0}")]
    InvalidCovenantSig(String),
    #[error("Covenant {0} already submitted signatures for this delegation")]
    DuplicatedCovenantSig(String),
    #[error("Invalid staking tx: {0}")]
    InvalidStakingTx(String),
    #[error("Invalid slashing tx: {0}")]
    InvalidSlashingTx(String),
    #[error("Invalid unbonding tx: {0}")]
    InvalidUnbondingTx(String),
    #[error("Invalid undelegation request: {0}")]
    InvalidUndelegationRequest(String),
    #[error("Invalid proof of possession: {0}")]
    InvalidProofOfPossession(String),
    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusionProof(String),
    #[error("Inclusion proof already set for delegation {0}")]
    InclusionProofAlreadySet(String),
    #[error("Duplicated finality provider: {0}")]
    DuplicatedFp(String),
    #[error("Empty finality provider list")]
    EmptyFpList,
    #[error("Too many finality providers: {0} > {1}")]
    TooManyFps(usize, u32),
    #[error("Commission rate {0} is lower than the minimum {1}")]
    CommissionLtMin(Decimal, Decimal),
    #[error("Commission rate {0} is greater than the maximum {1}")]
    CommissionGtMax(Decimal, Decimal),
    #[error("Commission change exceeds the max change rate {0}")]
    CommissionChangeTooLarge(Decimal),
    #[error("Commission can only be updated once every 24h, last update at {0}")]
    CommissionUpdateTooSoon(u64),
    #[error("No params version is active at BTC height {0}")]
    ParamsNotFound(u32),
    #[error("Params version {0} not found")]
    ParamsVersionNotFound(u32),
    #[error("BTC header at height {0} not found")]
    BtcHeightNotFound(u32),
    #[error("BTC header with hash {0} not found")]
    BtcHeaderNotFound(String),
    #[error("The BTC header cannot be decoded")]
    BtcHeaderDecodeError,
    #[error("No BTC headers were given")]
    BtcHeaderEmpty,
    #[error("The BTC header does not satisfy the difficulty requirement or is not consecutive")]
    BtcHeaderError,
    #[error("The new chain's work ({0}) is not better than the current chain's work ({1})")]
    BtcChainWithNotEnoughWork(Uint256, Uint256),
    #[error("BTC reorg of {block_diff} blocks reached the confirmation depth {depth}")]
    BtcReorgTooDeep { block_diff: u32, depth: u32 },
}
