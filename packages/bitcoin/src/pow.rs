use crate::error::Error;
use crate::{BlockHeader, Result, Uint256};

// RetargetAdjustmentFactor in https://github.com/btcsuite/btcd/blob/master/chaincfg/params.go
// Its value is always 4
const RETARGET_ADJUSTMENT_FACTOR: u64 = 4;

/// verify_header_pow ensures the header's hash <= the header's target <= pow limit
pub fn verify_header_pow(
    chain_params: &bitcoin::consensus::Params,
    header: &BlockHeader,
) -> Result<()> {
    let target = header.target();
    if target > chain_params.max_attainable_target {
        return Err(Error::TargetAbovePowLimit {});
    }

    // validate_pow also compares the required target, which is the header's own here
    if header.validate_pow(target).is_err() {
        return Err(Error::HashAboveTarget {});
    }

    Ok(())
}

/// verify_next_header_pow checks whether `header` extends `prev_header`, including checking
/// the prev hash and PoW
pub fn verify_next_header_pow(
    chain_params: &bitcoin::consensus::Params,
    prev_header: &BlockHeader,
    header: &BlockHeader,
) -> Result<()> {
    if prev_header.block_hash() != header.prev_blockhash {
        return Err(Error::HeaderNotConsecutive {});
    }

    verify_header_pow(chain_params, header)?;

    // without min-difficulty blocks, the new target must stay within [0.25, 4] of the parent's
    if !chain_params.allow_min_difficulty_blocks {
        let factor = Uint256::from(RETARGET_ADJUSTMENT_FACTOR);
        let old_target = Uint256::from_be_bytes(prev_header.target().to_be_bytes());
        let cur_target = Uint256::from_be_bytes(header.target().to_be_bytes());
        let max_cur_target = old_target.saturating_mul(factor);
        let min_cur_target = old_target / factor;
        if cur_target > max_cur_target || cur_target < min_cur_target {
            return Err(Error::DifficultyOutOfRange {});
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::{get_chain_params, Network};
    use bitcoin::hashes::Hash;
    use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};

    fn mine(prev: BlockHash, time: u32) -> BlockHeader {
        let mut header = BlockHeader {
            version: bitcoin::block::Version::TWO,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce: 0,
        };
        while header.validate_pow(header.target()).is_err() {
            header.nonce += 1;
        }
        header
    }

    #[test]
    fn regtest_chain_verifies() {
        let params = get_chain_params(Network::Regtest);
        let first = mine(BlockHash::all_zeros(), 1);
        let second = mine(first.block_hash(), 2);
        verify_header_pow(&params, &first).unwrap();
        verify_next_header_pow(&params, &first, &second).unwrap();
    }

    #[test]
    fn non_consecutive_header_fails() {
        let params = get_chain_params(Network::Regtest);
        let first = mine(BlockHash::all_zeros(), 1);
        let orphan = mine(BlockHash::all_zeros(), 2);
        assert_eq!(
            verify_next_header_pow(&params, &first, &orphan),
            Err(Error::HeaderNotConsecutive {})
        );
    }

    #[test]
    fn regtest_target_rejected_on_mainnet() {
        let params = get_chain_params(Network::Mainnet);
        let header = mine(BlockHash::all_zeros(), 1);
        assert_eq!(
            verify_header_pow(&params, &header),
            Err(Error::TargetAbovePowLimit {})
        );
    }
}
