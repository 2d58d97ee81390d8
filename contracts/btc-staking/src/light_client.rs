use std::str::FromStr;

use bitcoin::hashes::Hash;
use cosmwasm_std::Order::Ascending;
use cosmwasm_std::{DepsMut, Event, MessageInfo, Response, StdResult, Storage};
use cw_storage_plus::PrefixBound;

use babylon_apis::events::StakingEvent;
use babylon_bitcoin::BlockHash;

use crate::error::ContractError;
use crate::msg::btc_header::{BaseHeader, BtcHeader};
use crate::state::config::{ADMIN, CONFIG};
use crate::state::light_client::{
    get_header_by_hash, get_tip, insert_headers, remove_headers, set_tip, verify_headers,
    BtcHeaderInfo, BTC_HEADER_BASE,
};
use crate::state::reorg::{LargestBtcReorg, ReorgPoint, LARGEST_REORG};
use crate::state::staking::{
    get_delegation, touch, tx_hash_hex, DELEGATIONS, EXPIRY_QUEUE, INCLUSIONS,
    LAST_PROCESSED_BTC_HEIGHT,
};

/// HeaderUpdate describes how a batch of headers moved the tip
pub struct HeaderUpdate {
    pub old_tip: BtcHeaderInfo,
    pub new_tip: BtcHeaderInfo,
    /// fork_parent is the common ancestor when the batch replaced part of the canonical chain
    pub fork_parent: Option<BtcHeaderInfo>,
}

/// init sets the trusted base header, which is also the first tip
pub fn init(storage: &mut dyn Storage, base_header: &BaseHeader) -> Result<(), ContractError> {
    let cfg = CONFIG.load(storage)?;
    let btc_network = babylon_bitcoin::chain_params::get_chain_params(cfg.network);

    let base = base_header.to_btc_header_info()?;
    babylon_bitcoin::pow::verify_header_pow(&btc_network, &base.block_header()?)
        .map_err(|_| ContractError::BtcHeaderError)?;

    // NOTE: not changeable in the future
    BTC_HEADER_BASE.save(storage, &base)?;
    insert_headers(storage, &[base.clone()])?;
    set_tip(storage, &base)?;
    LAST_PROCESSED_BTC_HEIGHT.save(storage, &base.height)?;
    Ok(())
}

/// handle_btc_headers verifies and inserts a number of BTC headers, either extending the tip or
/// replacing the canonical chain above their parent with a heavier branch
pub fn handle_btc_headers(
    storage: &mut dyn Storage,
    new_btc_headers: &[BtcHeader],
) -> Result<HeaderUpdate, ContractError> {
    let cfg = CONFIG.load(storage)?;
    let btc_network = babylon_bitcoin::chain_params::get_chain_params(cfg.network);

    let first_new_btc_header = new_btc_headers.first().ok_or(ContractError::BtcHeaderEmpty)?;
    let prev_blockhash = BlockHash::from_str(&first_new_btc_header.prev_blockhash)?;

    let cur_tip = get_tip(storage)?;
    let parent = if prev_blockhash.as_byte_array() == cur_tip.hash.as_slice() {
        cur_tip.clone()
    } else {
        get_header_by_hash(storage, prev_blockhash.as_byte_array())?
    };

    // Convert new headers to `BtcHeaderInfo`s on top of their parent
    let mut prev_height = parent.height;
    let mut prev_work = parent.work;
    let mut new_headers = Vec::with_capacity(new_btc_headers.len());
    for new_btc_header in new_btc_headers {
        let info = new_btc_header.to_btc_header_info(prev_height, prev_work)?;
        prev_height = info.height;
        prev_work = info.work;
        new_headers.push(info);
    }
    verify_headers(&btc_network, &parent, &new_headers)?;
    let new_tip = new_headers.last().ok_or(ContractError::BtcHeaderEmpty)?.clone();

    let fork_parent = if parent.hash == cur_tip.hash {
        None
    } else {
        if new_tip.work <= cur_tip.work {
            return Err(ContractError::BtcChainWithNotEnoughWork(
                new_tip.work,
                cur_tip.work,
            ));
        }
        // Remove all headers from the old fork first
        remove_headers(storage, &cur_tip, &parent)?;
        Some(parent)
    };

    insert_headers(storage, &new_headers)?;
    set_tip(storage, &new_tip)?;

    Ok(HeaderUpdate {
        old_tip: cur_tip,
        new_tip,
        fork_parent,
    })
}

/// handle_headers_msg applies a batch of admin-submitted headers and reconciles the delegations
/// with the new canonical chain
pub fn handle_headers_msg(
    deps: DepsMut,
    info: &MessageInfo,
    headers: &[BtcHeader],
) -> Result<Response, ContractError> {
    ADMIN
        .assert_admin(deps.as_ref(), &info.sender)
        .map_err(|_| ContractError::Unauthorized)?;

    let update = handle_btc_headers(deps.storage, headers)?;
    let mut res = Response::new()
        .add_attribute("action", "btc_headers")
        .add_attribute("tip_height", update.new_tip.height.to_string());

    if let Some(fork_parent) = &update.fork_parent {
        let reorg = record_reorg(deps.storage, &update.old_tip, fork_parent)?;
        deps.api.debug(&format!(
            "BTC reorg of {} blocks, rolled back to height {}",
            reorg.block_diff, fork_parent.height
        ));
        res = res
            .add_event(StakingEvent::BtcReorg {
                rollback_from_height: update.old_tip.height,
                rollback_to_height: fork_parent.height,
                block_diff: reorg.block_diff,
            })
            .add_events(rollback_inclusions(deps.storage, fork_parent.height)?);
    }
    rewind_expiry_cursor(deps.storage, update.new_tip.height)?;

    Ok(res)
}

/// record_reorg keeps the deepest reorg seen so far, and returns the current one
fn record_reorg(
    storage: &mut dyn Storage,
    old_tip: &BtcHeaderInfo,
    fork_parent: &BtcHeaderInfo,
) -> Result<LargestBtcReorg, ContractError> {
    let reorg = LargestBtcReorg {
        rollback_from: ReorgPoint {
            hash: old_tip.block_hash()?.to_string(),
            height: old_tip.height,
        },
        rollback_to: ReorgPoint {
            hash: fork_parent.block_hash()?.to_string(),
            height: fork_parent.height,
        },
        block_diff: old_tip.height - fork_parent.height,
    };
    let deeper = LARGEST_REORG
        .may_load(storage)?
        .map(|largest| reorg.block_diff > largest.block_diff)
        .unwrap_or(true);
    if deeper {
        LARGEST_REORG.save(storage, &reorg)?;
    }
    Ok(reorg)
}

/// rollback_inclusions forgets the inclusion of every delegation whose staking tx was included
/// in a block above `fork_height`, so it has to be proven again on the new branch
fn rollback_inclusions(
    storage: &mut dyn Storage,
    fork_height: u32,
) -> Result<Vec<Event>, ContractError> {
    let rolled_back = INCLUSIONS
        .prefix_range(
            storage,
            Some(PrefixBound::exclusive(fork_height)),
            None,
            Ascending,
        )
        .map(|item| item.map(|((_, hash), _)| hash))
        .collect::<StdResult<Vec<_>>>()?;

    let mut events = Vec::with_capacity(rolled_back.len());
    for hash in rolled_back {
        let mut del = get_delegation(storage, &hash)?;
        INCLUSIONS.remove(storage, (del.start_height, hash.as_slice()));
        EXPIRY_QUEUE.remove(storage, (del.expiry_height(), hash.as_slice()));
        let start_height = del.start_height;
        del.start_height = 0;
        del.end_height = 0;
        DELEGATIONS.save(storage, &hash, &del)?;
        touch(storage, &hash)?;
        events.push(
            StakingEvent::InclusionRolledBack {
                staking_tx_hash: tx_hash_hex(&hash),
                start_height,
            }
            .into(),
        );
    }
    Ok(events)
}

/// rewind_expiry_cursor makes expiries already drained above the new tip count again, since the
/// delegations behind them are not expired on the new branch
fn rewind_expiry_cursor(storage: &mut dyn Storage, tip_height: u32) -> Result<(), ContractError> {
    let last = LAST_PROCESSED_BTC_HEIGHT.load(storage)?;
    if tip_height >= last {
        return Ok(());
    }
    let hashes = EXPIRY_QUEUE
        .prefix_range(
            storage,
            Some(PrefixBound::exclusive(tip_height)),
            Some(PrefixBound::inclusive(last)),
            Ascending,
        )
        .map(|item| item.map(|((_, hash), _)| hash))
        .collect::<StdResult<Vec<_>>>()?;
    for hash in hashes {
        touch(storage, &hash)?;
    }
    LAST_PROCESSED_BTC_HEIGHT.save(storage, &tip_height)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cosmwasm_std::testing::{message_info, mock_dependencies};
    use cosmwasm_std::Uint256;

    use test_utils::TestChain;

    use crate::contract::tests::{instantiate_at, CREATOR};
    use crate::state::light_client::{get_header, get_header_height};
    use crate::state::staking::TOUCHED;

    fn msgs(headers: &[babylon_bitcoin::BlockHeader]) -> Vec<BtcHeader> {
        headers.iter().map(BtcHeader::from).collect()
    }

    #[test]
    fn headers_extend_the_tip() {
        let mut deps = mock_dependencies();
        let mut chain = instantiate_at(deps.as_mut(), 100);
        let new_headers = msgs(&chain.extend(5));

        let admin = message_info(&deps.api.addr_make(CREATOR), &[]);
        handle_headers_msg(deps.as_mut(), &admin, &new_headers).unwrap();

        let tip = get_tip(&deps.storage).unwrap();
        assert_eq!(tip.height, 105);
        assert_eq!(tip.block_hash().unwrap(), chain.header_at(105).block_hash());
        assert!(LARGEST_REORG.may_load(&deps.storage).unwrap().is_none());
    }

    #[test]
    fn only_admin_submits_headers() {
        let mut deps = mock_dependencies();
        let mut chain = instantiate_at(deps.as_mut(), 100);
        let new_headers = msgs(&chain.extend(1));

        let other = message_info(&deps.api.addr_make("other"), &[]);
        assert_eq!(
            handle_headers_msg(deps.as_mut(), &other, &new_headers).unwrap_err(),
            ContractError::Unauthorized
        );
    }

    #[test]
    fn heavier_fork_replaces_the_tip() {
        let mut deps = mock_dependencies();
        let mut chain = instantiate_at(deps.as_mut(), 100);
        let admin = message_info(&deps.api.addr_make(CREATOR), &[]);
        handle_headers_msg(deps.as_mut(), &admin, &msgs(&chain.extend(4))).unwrap();

        // a fork of the same length does not win
        let mut fork = chain.fork(102);
        let same_work = msgs(&fork.extend(2));
        assert_matches!(
            handle_headers_msg(deps.as_mut(), &admin, &same_work).unwrap_err(),
            ContractError::BtcChainWithNotEnoughWork(_, _)
        );

        fork.extend(1);
        let heavier = msgs(&fork.headers_after(102));
        let res = handle_headers_msg(deps.as_mut(), &admin, &heavier).unwrap();
        assert!(res.events.iter().any(|e| e.ty == "btc_reorg"));

        let storage = &deps.storage;
        assert_eq!(get_tip(storage).unwrap().height, 105);
        assert_eq!(
            get_header(storage, 104).unwrap().block_hash().unwrap(),
            fork.header_at(104).block_hash()
        );
        assert!(get_header_height(storage, chain.header_at(104).block_hash().as_byte_array()).is_err());

        let reorg = LARGEST_REORG.load(storage).unwrap();
        assert_eq!(reorg.block_diff, 2);
        assert_eq!(reorg.rollback_to.height, 102);
        assert_eq!(
            reorg.rollback_from.hash,
            chain.header_at(104).block_hash().to_string()
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let mut other = TestChain::new(300);
        let orphan = msgs(&other.extend(1));
        let admin = message_info(&deps.api.addr_make(CREATOR), &[]);
        assert_matches!(
            handle_headers_msg(deps.as_mut(), &admin, &orphan).unwrap_err(),
            ContractError::BtcHeaderNotFound(_)
        );
        assert_eq!(
            handle_headers_msg(deps.as_mut(), &admin, &[]).unwrap_err(),
            ContractError::BtcHeaderEmpty
        );
    }

    #[test]
    fn largest_reorg_only_grows() {
        let mut deps = mock_dependencies();
        let chain = TestChain::new(10);
        let parent = BaseHeader {
            header: BtcHeader::from(chain.base()),
            height: 10,
            total_work: Uint256::zero(),
        }
        .to_btc_header_info()
        .unwrap();
        let mut tip = parent.clone();

        tip.height = 15;
        record_reorg(deps.as_mut().storage, &tip, &parent).unwrap();
        tip.height = 12;
        let shallow = record_reorg(deps.as_mut().storage, &tip, &parent).unwrap();
        assert_eq!(shallow.block_diff, 2);
        assert_eq!(LARGEST_REORG.load(&deps.storage).unwrap().block_diff, 5);
    }

    #[test]
    fn rewinding_touches_expiries_above_the_tip() {
        let mut deps = mock_dependencies();
        let storage = deps.as_mut().storage;
        LAST_PROCESSED_BTC_HEIGHT.save(storage, &120).unwrap();
        EXPIRY_QUEUE.save(storage, (105, &[1u8; 32][..]), &()).unwrap();
        EXPIRY_QUEUE.save(storage, (110, &[2u8; 32][..]), &()).unwrap();
        EXPIRY_QUEUE.save(storage, (121, &[3u8; 32][..]), &()).unwrap();

        rewind_expiry_cursor(storage, 105).unwrap();
        let touched: Vec<Vec<u8>> = TOUCHED
            .keys(storage, None, None, Ascending)
            .collect::<StdResult<_>>()
            .unwrap();
        assert_eq!(touched, vec![vec![2u8; 32]]);
        assert_eq!(LAST_PROCESSED_BTC_HEIGHT.load(storage).unwrap(), 105);
    }
}
