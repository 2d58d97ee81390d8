//! A regtest header chain mined on the fly, with blocks that commit to chosen transactions.

use bitcoin::block::{Header as BlockHeader, Version};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{BlockHash, CompactTarget, Transaction, TxMerkleNode, Txid, Work};

use babylon_apis::btc_staking_api::InclusionProof;
use babylon_bitcoin::merkle::merkle_proof;

/// Easiest regtest target, so a header is found within a couple of nonces
pub const REGTEST_BITS: u32 = 0x207fffff;

const BASE_TIME: u32 = 1_700_000_000;

pub fn mine_header(prev: BlockHash, merkle_root: TxMerkleNode, time: u32) -> BlockHeader {
    let mut header = BlockHeader {
        version: Version::TWO,
        prev_blockhash: prev,
        merkle_root,
        time,
        bits: CompactTarget::from_consensus(REGTEST_BITS),
        nonce: 0,
    };
    while header.validate_pow(header.target()).is_err() {
        header.nonce += 1;
    }
    header
}

/// TestChain is a linear header chain starting at `base_height`
#[derive(Clone, Debug)]
pub struct TestChain {
    pub base_height: u32,
    pub headers: Vec<BlockHeader>,
    /// distinguishes empty blocks of sibling forks
    salt: u8,
}

impl TestChain {
    pub fn new(base_height: u32) -> Self {
        let base = mine_header(BlockHash::all_zeros(), filler_root(base_height, 0), BASE_TIME);
        TestChain {
            base_height,
            headers: vec![base],
            salt: 0,
        }
    }

    pub fn base(&self) -> &BlockHeader {
        &self.headers[0]
    }

    /// base_work is the cumulative work assigned to the base header
    pub fn base_work(&self) -> Work {
        self.base().work()
    }

    pub fn tip_height(&self) -> u32 {
        self.base_height + self.headers.len() as u32 - 1
    }

    pub fn header_at(&self, height: u32) -> &BlockHeader {
        &self.headers[(height - self.base_height) as usize]
    }

    /// headers_after returns the headers strictly above `height`
    pub fn headers_after(&self, height: u32) -> Vec<BlockHeader> {
        self.headers[(height + 1 - self.base_height) as usize..].to_vec()
    }

    fn push(&mut self, merkle_root: TxMerkleNode) -> BlockHeader {
        let prev = self.headers[self.headers.len() - 1];
        let height = self.tip_height() + 1;
        let header = mine_header(prev.block_hash(), merkle_root, BASE_TIME + height);
        self.headers.push(header);
        header
    }

    /// extend appends `n` empty blocks and returns them
    pub fn extend(&mut self, n: u32) -> Vec<BlockHeader> {
        (0..n)
            .map(|_| {
                let root = filler_root(self.tip_height() + 1, self.salt);
                self.push(root)
            })
            .collect()
    }

    /// extend_to appends empty blocks until the tip reaches `height`
    pub fn extend_to(&mut self, height: u32) -> Vec<BlockHeader> {
        let n = height.saturating_sub(self.tip_height());
        self.extend(n)
    }

    /// include mines a block whose merkle root commits to a filler coinbase followed by `txs`,
    /// returning the new header and one inclusion proof per tx
    pub fn include(&mut self, txs: &[Transaction]) -> (BlockHeader, Vec<InclusionProof>) {
        let coinbase = Txid::from_raw_hash(filler_hash(self.tip_height() + 1, self.salt));
        let txids: Vec<Txid> = std::iter::once(coinbase)
            .chain(txs.iter().map(Transaction::compute_txid))
            .collect();
        let (root, _) = merkle_proof(&txids, 0).unwrap();
        let header = self.push(root);
        let proofs = (1..txids.len())
            .map(|idx| {
                let (_, proof) = merkle_proof(&txids, idx).unwrap();
                InclusionProof {
                    block_hash_hex: header.block_hash().to_string(),
                    tx_index: idx as u32,
                    proof,
                }
            })
            .collect();
        (header, proofs)
    }

    /// fork keeps the headers up to and including `height`, so new blocks build a competing branch
    pub fn fork(&self, height: u32) -> TestChain {
        let keep = (height - self.base_height + 1) as usize;
        TestChain {
            base_height: self.base_height,
            headers: self.headers[..keep].to_vec(),
            salt: self.salt.wrapping_add(1),
        }
    }
}

fn filler_hash(height: u32, salt: u8) -> sha256d::Hash {
    let mut preimage = height.to_be_bytes().to_vec();
    preimage.push(salt);
    sha256d::Hash::hash(&preimage)
}

fn filler_root(height: u32, salt: u8) -> TxMerkleNode {
    TxMerkleNode::from_raw_hash(filler_hash(height, salt))
}
