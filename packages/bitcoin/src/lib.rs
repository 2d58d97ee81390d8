pub use bitcoin::{
    block::{Header as BlockHeader, Version},
    consensus::encode::Error as EncodeError,
    consensus::{deserialize, serialize},
    hash_types,
    hash_types::TxMerkleNode,
    hashes::hex::HexToArrayError as HexError,
    BlockHash, CompactTarget, Target, Transaction, Txid, Work,
};

pub use cosmwasm_std::Uint256;

pub mod chain_params;
pub mod error;
pub mod merkle;
pub mod pow;

pub type Result<T> = std::result::Result<T, error::Error>;

/// Cumulative work of a header chain, in the decimal-printable form used in storage
pub fn work_to_uint256(work: Work) -> Uint256 {
    Uint256::from_be_bytes(work.to_be_bytes())
}
