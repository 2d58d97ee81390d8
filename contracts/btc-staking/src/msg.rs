use cosmwasm_schema::{cw_serde, QueryResponses};
#[cfg(not(target_arch = "wasm32"))]
use {
    crate::msg::btc_header::{BtcHeaderResponse, BtcHeadersResponse},
    crate::state::config::Config,
    crate::state::reorg::LargestBtcReorg,
    cw_controllers::AdminResponse,
};

use babylon_apis::btc_staking_api::{
    BtcUndelegate, CovenantSignatures, EditFinalityProvider, Evidence, InclusionProof,
    NewBtcDelegation, NewFinalityProvider, SelectiveSlashingEvidence,
};
use babylon_bitcoin::chain_params::Network;

use crate::error::ContractError;
use crate::msg::btc_header::{BaseHeader, BtcHeader};
use crate::state::params::Params;
use crate::state::staking::{BtcDelegation, DelegationStatus, FinalityProvider};

pub mod btc_header;

#[cw_serde]
pub struct InstantiateMsg {
    pub network: Network,
    /// btc_confirmation_depth (k) is the depth after which a BTC block is irreversible
    pub btc_confirmation_depth: u32,
    /// checkpoint_finalization_timeout (w) bounds the unbonding time of delegations from below
    pub checkpoint_finalization_timeout: u32,
    /// bsn_id identifies the network this contract registers finality providers for
    pub bsn_id: String,
    pub admin: Option<String>,
    /// allow_list_expiration_height is the block height until which only allow-listed staking
    /// txs are accepted. `None` disables the allow list
    pub allow_list_expiration_height: Option<u64>,
    /// params is the first params version
    pub params: Params,
    /// base_header is the trusted BTC header the light client starts from
    pub base_header: BaseHeader,
}

impl InstantiateMsg {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.btc_confirmation_depth == 0 {
            return Err(ContractError::InvalidConfig(
                "BTC confirmation depth must be greater than 0".to_string(),
            ));
        }
        if self.checkpoint_finalization_timeout == 0 {
            return Err(ContractError::InvalidConfig(
                "Checkpoint finalization timeout must be greater than 0".to_string(),
            ));
        }
        if self.bsn_id.is_empty() {
            return Err(ContractError::InvalidConfig("Empty BSN id".to_string()));
        }
        self.params.validate()
    }
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Change the admin
    UpdateAdmin { admin: Option<String> },
    /// Append a new params version. Admin only
    UpdateParams { params: Params },
    /// Extend the BTC header chain, or switch to a heavier fork. Admin only
    BtcHeaders { headers: Vec<BtcHeader> },
    /// Register a finality provider
    CreateFinalityProvider(NewFinalityProvider),
    /// Update the description or commission rate of a finality provider. Owner only
    EditFinalityProvider(EditFinalityProvider),
    /// Submit a new BTC delegation with its pre-signed transactions
    CreateBtcDelegation(NewBtcDelegation),
    /// Submit the signatures of one covenant member for a delegation
    AddCovenantSigs(CovenantSignatures),
    /// Prove the staking tx of a delegation was included in a canonical BTC block
    AddBtcDelegationInclusionProof {
        staking_tx_hash: String,
        proof: InclusionProof,
    },
    /// Report that the staking output of a delegation was spent on Bitcoin
    BtcUndelegate(BtcUndelegate),
    /// Reveal the secret key of a finality provider through one of its delegations
    SelectiveSlashingEvidence(SelectiveSlashingEvidence),
    /// Accept the given staking tx hashes while the allow list is active. Admin only
    AddAllowedStakingTxs { staking_tx_hashes: Vec<String> },
}

/// Privileged messages from the staking chain
#[cw_serde]
pub enum SudoMsg {
    BeginBlock {},
    /// Apply the pending delegation status changes to voting power
    EndBlock {},
    /// Slash a finality provider that voted for two blocks at the same height
    SlashFp { evidence: Evidence },
    JailFp { fp_btc_pk_hex: String },
    UnjailFp { fp_btc_pk_hex: String },
    /// Record that a finality provider voted at `height`
    RecordVote { fp_btc_pk_hex: String, height: u64 },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// `Config` returns the current configuration of the btc-staking contract
    #[returns(Config)]
    Config {},
    /// `Admin` returns the current admin of the contract
    #[returns(AdminResponse)]
    Admin {},
    /// `Params` returns a params version, or the latest one if `version` is `None`
    #[returns(ParamsResponse)]
    Params { version: Option<u32> },
    /// `ParamsAtBtcHeight` returns the params version governing new delegations at a BTC height
    #[returns(ParamsResponse)]
    ParamsAtBtcHeight { height: u32 },
    /// `FinalityProvider` returns the finality provider by its BTC public key, in hex format
    #[returns(FinalityProvider)]
    FinalityProvider { btc_pk_hex: String },
    /// `FinalityProviders` returns the list of registered finality providers
    ///
    /// `start_after` is the BTC public key of the FP to start after, or `None` to start from the beginning
    #[returns(FinalityProvidersResponse)]
    FinalityProviders {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    /// `FinalityProvidersByBsn` returns the finality providers securing the given network
    #[returns(FinalityProvidersResponse)]
    FinalityProvidersByBsn {
        bsn_id: String,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    /// `FinalityProviderInfo` returns the effective power of a finality provider
    ///
    /// `height` is the staking-chain height to query the power at, or `None` for the current one.
    /// Jailed and slashed finality providers have no power.
    #[returns(FinalityProviderInfo)]
    FinalityProviderInfo {
        btc_pk_hex: String,
        height: Option<u64>,
    },
    /// `FinalityProvidersByPower` returns the finality providers ordered by cached power,
    /// descending
    #[returns(FinalityProvidersByPowerResponse)]
    FinalityProvidersByPower {
        start_after: Option<FinalityProviderInfo>,
        limit: Option<u32>,
    },
    /// `Delegation` returns the delegation with its status at the current BTC tip
    #[returns(DelegationResponse)]
    Delegation { staking_tx_hash_hex: String },
    /// `Delegations` returns the delegations, optionally only those with the given status
    ///
    /// `start_after` is the staking tx hash (in hex format) of the delegation to start after
    #[returns(DelegationsResponse)]
    Delegations {
        status: Option<DelegationStatus>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    /// `DelegationsByFp` returns the staking tx hashes of the delegations restaked to a finality provider
    #[returns(DelegationsByFpResponse)]
    DelegationsByFp {
        btc_pk_hex: String,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    /// `DelegationsByStaker` returns the delegations of a staker in submission order
    ///
    /// `start_after` is the position of the delegation to start after
    #[returns(DelegationsResponse)]
    DelegationsByStaker {
        staker_addr: String,
        start_after: Option<u64>,
        limit: Option<u32>,
    },
    /// `LargestBtcReorg` returns the deepest BTC reorg seen so far, if any
    #[returns(Option<LargestBtcReorg>)]
    LargestBtcReorg {},
    #[returns(BtcHeaderResponse)]
    BtcBaseHeader {},
    #[returns(BtcHeaderResponse)]
    BtcTipHeader {},
    #[returns(BtcHeaderResponse)]
    BtcHeader { height: u32 },
    #[returns(BtcHeaderResponse)]
    BtcHeaderByHash { hash: String },
    #[returns(BtcHeadersResponse)]
    BtcHeaders {
        start_after: Option<u32>,
        limit: Option<u32>,
        reverse: Option<bool>,
    },
    /// `SignedSlashingTx` returns the fully signed slashing tx of a delegation, assembled when
    /// one of its finality providers got slashed
    #[returns(SignedSlashingTxResponse)]
    SignedSlashingTx {
        staking_tx_hash_hex: String,
        fp_btc_pk_hex: String,
    },
}

#[cw_serde]
pub struct ParamsResponse {
    pub version: u32,
    pub params: Params,
}

#[cw_serde]
pub struct FinalityProvidersResponse {
    pub fps: Vec<FinalityProvider>,
}

#[cw_serde]
pub struct FinalityProviderInfo {
    /// `btc_pk_hex` is the Bitcoin secp256k1 PK of the finality provider.
    /// The PK follows encoding in BIP-340 spec in hex format
    pub btc_pk_hex: String,
    /// `power` is the voting power of the finality provider, in satoshis
    pub power: u64,
}

#[cw_serde]
pub struct FinalityProvidersByPowerResponse {
    pub fps: Vec<FinalityProviderInfo>,
}

#[cw_serde]
pub struct DelegationResponse {
    /// `staking_tx_hash` is the staking tx hash, in its displayed hex format
    pub staking_tx_hash: String,
    pub status: DelegationStatus,
    pub delegation: BtcDelegation,
}

#[cw_serde]
pub struct DelegationsResponse {
    pub delegations: Vec<DelegationResponse>,
}

#[cw_serde]
pub struct DelegationsByFpResponse {
    pub hashes: Vec<String>,
}

#[cw_serde]
pub struct SignedSlashingTxResponse {
    /// `signed_tx_hex` is the consensus-encoded slashing tx with its full witness
    pub signed_tx_hex: String,
}
