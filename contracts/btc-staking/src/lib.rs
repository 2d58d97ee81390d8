mod finality;
mod light_client;
mod power;
mod staking;
mod validation;

pub mod contract;
pub mod error;
pub mod msg;
pub mod queries;
pub mod state;
#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod multitest;
