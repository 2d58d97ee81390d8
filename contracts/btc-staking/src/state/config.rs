use babylon_bitcoin::chain_params::Network;
use cosmwasm_schema::cw_serde;

use cw_controllers::Admin;
use cw_storage_plus::Item;

pub(crate) const CONFIG: Item<Config> = Item::new("config");
/// Storage for admin
pub(crate) const ADMIN: Admin = Admin::new("admin");

/// Config are the deployment-wide settings of the BTC staking contract, fixed at instantiation
#[cw_serde]
pub struct Config {
    /// network is the Bitcoin network the staking txs and headers belong to
    pub network: Network,
    /// btc_confirmation_depth (k) is the depth after which a BTC block is considered irreversible
    pub btc_confirmation_depth: u32,
    /// checkpoint_finalization_timeout (w) bounds the unbonding time from below
    pub checkpoint_finalization_timeout: u32,
    /// bsn_id identifies the network secured by the finality providers registered here
    pub bsn_id: String,
    /// allow_list_expiration_height is the block height until which only allow-listed staking
    /// txs are accepted
    pub allow_list_expiration_height: Option<u64>,
}

impl Config {
    /// allow_list_active tells whether delegations are still restricted to the allow list
    pub fn allow_list_active(&self, height: u64) -> bool {
        self.allow_list_expiration_height
            .map(|expiration| height < expiration)
            .unwrap_or(false)
    }
}
