//! Deterministic fixtures for the BTC staking workspace: fixed key material, honestly built
//! delegations with their pre-signed transactions, covenant submissions, a regtest header
//! chain and double-sign evidence. Nothing is read from disk.

pub mod chain;
pub mod delegation;
pub mod finality;
pub mod keys;

pub use chain::TestChain;
pub use delegation::{DelegationFixture, FixtureParams};
