use cosmwasm_schema::cw_serde;
use cw_storage_plus::Item;

/// The deepest BTC reorg observed by the light client
pub(crate) const LARGEST_REORG: Item<LargestBtcReorg> = Item::new("largest_btc_reorg");

/// ReorgPoint is a header on either side of a BTC reorg
#[cw_serde]
pub struct ReorgPoint {
    /// hash is the block hash in its displayed (byte-reversed) hex form
    pub hash: String,
    pub height: u32,
}

/// LargestBtcReorg only ever grows: a reorg replaces it iff its depth is larger
#[cw_serde]
pub struct LargestBtcReorg {
    /// rollback_from is the tip of the abandoned branch
    pub rollback_from: ReorgPoint,
    /// rollback_to is the common ancestor of both branches
    pub rollback_to: ReorgPoint,
    pub block_diff: u32,
}
