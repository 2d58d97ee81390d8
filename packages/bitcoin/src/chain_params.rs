pub use bitcoin::consensus::Params;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Network selects the Bitcoin chain the contract follows. It mirrors `bitcoin::Network`, which
/// has no JSON schema.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl From<Network> for bitcoin::Network {
    fn from(net: Network) -> Self {
        match net {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// get_chain_params returns the consensus params (PoW limit, retargeting) of `net`
pub fn get_chain_params(net: Network) -> Params {
    Params::new(net.into())
}

pub fn get_bitcoin_network(net: Network) -> bitcoin::Network {
    net.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regtest_has_no_retargeting() {
        let params = get_chain_params(Network::Regtest);
        assert!(params.no_pow_retargeting);
        assert!(params.allow_min_difficulty_blocks);
        assert!(!get_chain_params(Network::Mainnet).no_pow_retargeting);
        assert_eq!(get_bitcoin_network(Network::Mainnet), bitcoin::Network::Bitcoin);
    }
}
