use hex::FromHexError;
use thiserror::Error;

use cosmwasm_std::StdError;

#[derive(Error, Debug, PartialEq)]
pub enum StakingApiError {
    #[error("{0}")]
    Std(#[from] StdError),
    #[error("{0}")]
    HexError(#[from] FromHexError),
    #[error("Staking tx hash hex string is not {0} chars long")]
    InvalidStakingTxHash(usize),
    #[error("Block hash hex string is not {0} chars long")]
    InvalidBlockHash(usize),
    #[error("Invalid Btc tx: {0}")]
    InvalidBtcTx(String),
    #[error("Empty Btc public key")]
    EmptyBtcPk,
    #[error("Invalid Btc public key: {0}")]
    InvalidBtcPk(String),
    #[error("Empty Btc private key")]
    EmptyBtcSk,
    #[error("Invalid Btc private key length: {0}")]
    InvalidBtcSk(usize),
    #[error("Empty proof of possession")]
    MissingPop,
    #[error("Empty BSN id")]
    EmptyBsnId,
    #[error("Empty staker address")]
    EmptyStakerAddr,
    #[error("No Finality Providers Btc public keys")]
    EmptyBtcPkList,
    #[error("Duplicate Finality Provider Btc public key: {0}")]
    DuplicatedBtcPk(String),
    #[error("Empty Staking tx")]
    EmptyStakingTx,
    #[error("Empty Slashing tx")]
    EmptySlashingTx,
    #[error("Empty Unbonding tx")]
    EmptyUnbondingTx,
    #[error("Invalid staking time blocks: {0}, max: {1}")]
    InvalidStakingTime(u32, u32),
    #[error("Invalid unbonding time blocks: {0}, max: {1}")]
    ErrInvalidUnbondingTime(u32, u32),
    #[error("Staking value must be positive")]
    ZeroStakingValue,
    #[error("Unbonding value must be positive")]
    ZeroUnbondingValue,
    #[error("Empty signature from the delegator")]
    EmptySignature,
    #[error("Invalid {0} length: expected {1}, got {2}")]
    InvalidLength(String, usize, usize),
    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusionProof(String),
    #[error("Invalid commission: {0}")]
    InvalidCommission(String),
    #[error("Description error: {0}")]
    DescriptionErr(String),
}

impl StakingApiError {
    pub fn description_err(msg: impl Into<String>) -> Self {
        StakingApiError::DescriptionErr(msg.into())
    }

    pub fn invalid_length(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        StakingApiError::InvalidLength(what.into(), expected, actual)
    }
}
