use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("The header's target should be no larger than pow_limit")]
    TargetAbovePowLimit {},
    #[error("The header's hash should be no larger than its target")]
    HashAboveTarget {},
    #[error("The header is not consecutive to the previous header")]
    HeaderNotConsecutive {},
    #[error("Difficulty not relevant to parent difficulty")]
    DifficultyOutOfRange {},
    #[error("Merkle proof length {0} is not a multiple of 32")]
    MalformedMerkleProof(usize),
    #[error("Merkle proof for tx index {0} is out of range")]
    MerkleIndexOutOfRange(usize),
}
