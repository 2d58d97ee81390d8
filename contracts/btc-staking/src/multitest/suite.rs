use anyhow::Result as AnyResult;
use bitcoin::consensus::serialize;
use bitcoin::secp256k1::SecretKey;
use cosmwasm_schema::serde::de::DeserializeOwned;
use derivative::Derivative;

use cosmwasm_std::{Addr, Api, Empty};
use cw_multi_test::{next_block, App, AppResponse, Contract, ContractWrapper, Executor};

use babylon_apis::btc_staking_api::{BtcUndelegate, NewBtcDelegation, NewFinalityProvider};
use babylon_btcstaking::pop::{fp_pop_context, staker_pop_context};
use test_utils::delegation::staker_pop;
use test_utils::keys::{fp_pk_hex, fp_sk, staker_sk, x_only};
use test_utils::{DelegationFixture, TestChain};

use crate::contract::tests::{instantiate_msg, CREATOR};
use crate::msg::btc_header::{BtcHeader, BtcHeaderResponse};
use crate::msg::{
    DelegationResponse, ExecuteMsg, FinalityProviderInfo, QueryMsg, SignedSlashingTxResponse,
    SudoMsg,
};
use crate::state::reorg::LargestBtcReorg;
use crate::state::staking::FinalityProvider;
use crate::test_utils::fixture_params;

fn contract_btc_staking() -> Box<dyn Contract<Empty>> {
    let contract = ContractWrapper::new(
        crate::contract::execute,
        crate::contract::instantiate,
        crate::contract::query,
    )
    .with_sudo(crate::contract::sudo);
    Box::new(contract)
}

#[derive(Derivative)]
#[derivative(Default = "new")]
pub struct SuiteBuilder {
    height: Option<u64>,
    base_height: Option<u32>,
    allow_list_expiration_height: Option<u64>,
}

impl SuiteBuilder {
    pub fn with_height(mut self, height: u64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_base_height(mut self, height: u32) -> Self {
        self.base_height = Some(height);
        self
    }

    pub fn with_allow_list_until(mut self, height: u64) -> Self {
        self.allow_list_expiration_height = Some(height);
        self
    }

    #[track_caller]
    pub fn build(self) -> Suite {
        let mut app = App::default();
        if let Some(height) = self.height {
            app.update_block(|block| block.height = height);
        }
        let admin = app.api().addr_make(CREATOR);
        let base_height = self.base_height.unwrap_or(100);

        let code_id = app.store_code_with_creator(admin.clone(), contract_btc_staking());
        let mut msg = instantiate_msg(app.api(), base_height);
        msg.allow_list_expiration_height = self.allow_list_expiration_height;
        let contract = app
            .instantiate_contract(
                code_id,
                admin.clone(),
                &msg,
                &[],
                "btc-staking",
                Some(admin.to_string()),
            )
            .unwrap();

        Suite {
            app,
            contract,
            admin,
            chain: TestChain::new(base_height),
            cov_sks: fixture_params().covenant_sks,
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Suite {
    #[derivative(Debug = "ignore")]
    pub app: App,
    /// The btc-staking contract address
    pub contract: Addr,
    /// Admin of the contract, also the BTC header reporter
    pub admin: Addr,
    /// The BTC chain the contract follows
    #[derivative(Debug = "ignore")]
    pub chain: TestChain,
    #[derivative(Debug = "ignore")]
    pub cov_sks: Vec<SecretKey>,
}

impl Suite {
    fn query<T: DeserializeOwned>(&self, msg: &QueryMsg) -> T {
        self.app
            .wrap()
            .query_wasm_smart(self.contract.clone(), msg)
            .unwrap()
    }

    #[track_caller]
    pub fn get_finality_provider(&self, i: usize) -> FinalityProvider {
        self.query(&QueryMsg::FinalityProvider {
            btc_pk_hex: fp_pk_hex(i),
        })
    }

    #[track_caller]
    pub fn get_power(&self, i: usize, height: Option<u64>) -> u64 {
        let info: FinalityProviderInfo = self.query(&QueryMsg::FinalityProviderInfo {
            btc_pk_hex: fp_pk_hex(i),
            height,
        });
        info.power
    }

    #[track_caller]
    pub fn get_delegation(&self, del: &DelegationFixture) -> DelegationResponse {
        self.query(&QueryMsg::Delegation {
            staking_tx_hash_hex: del.staking_tx_hash(),
        })
    }

    #[track_caller]
    pub fn get_btc_tip_header(&self) -> BtcHeaderResponse {
        self.query(&QueryMsg::BtcTipHeader {})
    }

    #[track_caller]
    pub fn get_largest_btc_reorg(&self) -> Option<LargestBtcReorg> {
        self.query(&QueryMsg::LargestBtcReorg {})
    }

    pub fn get_signed_slashing_tx(
        &self,
        del: &DelegationFixture,
        i: usize,
    ) -> AnyResult<SignedSlashingTxResponse> {
        let res = self.app.wrap().query_wasm_smart(
            self.contract.clone(),
            &QueryMsg::SignedSlashingTx {
                staking_tx_hash_hex: del.staking_tx_hash(),
                fp_btc_pk_hex: fp_pk_hex(i),
            },
        )?;
        Ok(res)
    }

    /// new_fp builds the registration of the `i`-th finality provider, with a proof of
    /// possession bound to this chain and contract
    pub fn new_fp(&self, i: usize) -> NewFinalityProvider {
        let api = self.app.api();
        let addr = api.addr_make(&format!("fp{i}"));
        let canonical = api.addr_canonicalize(addr.as_str()).unwrap();
        let context = fp_pop_context(&self.app.block_info().chain_id, self.contract.as_str());
        let mut fp = crate::contract::tests::new_fp(api, i);
        fp.pop = Some(staker_pop(
            &fp_sk(i),
            &context,
            addr.as_str(),
            canonical.as_slice(),
        ));
        fp
    }

    #[track_caller]
    pub fn register_finality_providers(&mut self, ids: &[usize]) -> AnyResult<()> {
        for i in ids {
            let fp = self.new_fp(*i);
            let sender = Addr::unchecked(fp.addr.clone());
            self.app.execute_contract(
                sender,
                self.contract.clone(),
                &ExecuteMsg::CreateFinalityProvider(fp),
                &[],
            )?;
        }
        Ok(())
    }

    /// fixture is a delegation of 100k sats from the first staker to the given finality
    /// providers, locked for 500 blocks with an unbonding time of 200 blocks
    pub fn fixture(&self, fp_ids: &[usize]) -> DelegationFixture {
        let fp_pks: Vec<_> = fp_ids.iter().map(|i| x_only(&fp_sk(*i))).collect();
        DelegationFixture::new(&fixture_params(), staker_sk(1), &fp_pks, 500, 200, 100_000)
    }

    pub fn delegation_msg(&self, del: &DelegationFixture) -> NewBtcDelegation {
        let api = self.app.api();
        let staker = api.addr_make("staker");
        let canonical = api.addr_canonicalize(staker.as_str()).unwrap();
        let context = staker_pop_context(&self.app.block_info().chain_id, self.contract.as_str());
        del.to_msg(staker.as_str(), canonical.as_slice(), &context)
    }

    #[track_caller]
    pub fn create_delegation(&mut self, del: &DelegationFixture) -> AnyResult<AppResponse> {
        let msg = self.delegation_msg(del);
        let sender = Addr::unchecked(msg.staker_addr.clone());
        self.app.execute_contract(
            sender,
            self.contract.clone(),
            &ExecuteMsg::CreateBtcDelegation(msg),
            &[],
        )
    }

    /// add_covenant_sigs submits the signatures of the first `n` covenant members
    #[track_caller]
    pub fn add_covenant_sigs(&mut self, del: &DelegationFixture, n: usize) -> AnyResult<()> {
        for sk in self.cov_sks[..n].to_vec() {
            self.app.execute_contract(
                self.admin.clone(),
                self.contract.clone(),
                &ExecuteMsg::AddCovenantSigs(del.covenant_sigs(&sk)),
                &[],
            )?;
        }
        Ok(())
    }

    #[track_caller]
    pub fn submit_headers(
        &mut self,
        headers: &[babylon_bitcoin::BlockHeader],
    ) -> AnyResult<AppResponse> {
        self.app.execute_contract(
            self.admin.clone(),
            self.contract.clone(),
            &ExecuteMsg::BtcHeaders {
                headers: headers.iter().map(BtcHeader::from).collect(),
            },
            &[],
        )
    }

    /// mine_to extends the followed BTC chain up to `height`
    #[track_caller]
    pub fn mine_to(&mut self, height: u32) -> AnyResult<AppResponse> {
        let headers = self.chain.extend_to(height);
        self.submit_headers(&headers)
    }

    /// include_delegation mines a block with the staking tx and proves its inclusion
    #[track_caller]
    pub fn include_delegation(&mut self, del: &DelegationFixture) -> AnyResult<AppResponse> {
        let (header, proofs) = self.chain.include(&[del.staking_tx.clone()]);
        self.submit_headers(&[header])?;
        self.app.execute_contract(
            self.admin.clone(),
            self.contract.clone(),
            &ExecuteMsg::AddBtcDelegationInclusionProof {
                staking_tx_hash: del.staking_tx_hash(),
                proof: proofs[0].clone(),
            },
            &[],
        )
    }

    /// activate_delegation takes a fresh delegation through covenant signing and inclusion, then
    /// ends the block so it gains power
    #[track_caller]
    pub fn activate_delegation(&mut self, del: &DelegationFixture) -> AnyResult<AppResponse> {
        self.create_delegation(del)?;
        let quorum = fixture_params().covenant_quorum as usize;
        self.add_covenant_sigs(del, quorum)?;
        self.include_delegation(del)?;
        self.end_block()
    }

    /// unbond mines the signed unbonding tx `confirmations` blocks deep and reports it
    #[track_caller]
    pub fn unbond(&mut self, del: &DelegationFixture, confirmations: u32) -> AnyResult<AppResponse> {
        let quorum = fixture_params().covenant_quorum as usize;
        let unbonding_tx = del.signed_unbonding_tx(&self.cov_sks[..quorum]);
        let (header, proofs) = self.chain.include(&[unbonding_tx.clone()]);
        self.submit_headers(&[header])?;
        if confirmations > 1 {
            let headers = self.chain.extend(confirmations - 1);
            self.submit_headers(&headers)?;
        }
        self.app.execute_contract(
            Addr::unchecked("anyone"),
            self.contract.clone(),
            &ExecuteMsg::BtcUndelegate(BtcUndelegate {
                staking_tx_hash: del.staking_tx_hash(),
                stake_spending_tx: serialize(&unbonding_tx),
                stake_spending_tx_inclusion_proof: proofs[0].clone(),
                funding_transactions: vec![],
            }),
            &[],
        )
    }

    /// reorg replaces the followed chain above `fork_height` with a branch of `len` new blocks
    #[track_caller]
    pub fn reorg(&mut self, fork_height: u32, len: u32) -> AnyResult<AppResponse> {
        let mut fork = self.chain.fork(fork_height);
        fork.extend(len);
        let res = self.submit_headers(&fork.headers_after(fork_height))?;
        self.chain = fork;
        Ok(res)
    }

    /// end_block moves to the next block and runs the end-block hook there
    #[track_caller]
    pub fn end_block(&mut self) -> AnyResult<AppResponse> {
        self.app.update_block(next_block);
        self.app.wasm_sudo(self.contract.clone(), &SudoMsg::EndBlock {})
    }

    #[track_caller]
    pub fn sudo(&mut self, msg: &SudoMsg) -> AnyResult<AppResponse> {
        self.app.wasm_sudo(self.contract.clone(), msg)
    }

    #[track_caller]
    pub fn slash_selectively(&mut self, del: &DelegationFixture, i: usize) -> AnyResult<AppResponse> {
        self.app.execute_contract(
            Addr::unchecked("anyone"),
            self.contract.clone(),
            &ExecuteMsg::SelectiveSlashingEvidence(
                babylon_apis::btc_staking_api::SelectiveSlashingEvidence {
                    staking_tx_hash: del.staking_tx_hash(),
                    recovered_fp_btc_sk: hex::encode(fp_sk(i).secret_bytes()),
                },
            ),
            &[],
        )
    }
}

/// has_event tells whether a contract emitted a custom event of type `ty`
pub fn has_event(res: &AppResponse, ty: &str) -> bool {
    let wasm_ty = format!("wasm-{ty}");
    res.events.iter().any(|e| e.ty == wasm_ty)
}
