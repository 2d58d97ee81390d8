pub mod config;
pub mod light_client;
pub mod params;
pub mod reorg;
pub mod staking;
