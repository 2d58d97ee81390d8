pub mod adaptor_sig;
pub mod error;
pub mod pop;
pub mod scripts_utils;
pub mod sig_verify;
pub mod signer;
pub mod tapscript;
pub mod tx_verify;
pub mod witness;

pub use adaptor_sig::AdaptorSignature;
pub use pop::{Bip322Sig, PopMessage, ProofOfPossession};
pub use scripts_utils::{BabylonScriptPaths, SpendInfo, SpendPath, StakingInfo};

pub type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
pub(crate) mod test_keys;
