pub mod config;
pub mod logging;

pub mod backend;
pub mod client;
pub mod control;
pub mod error;
pub mod listing;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod transfer;
pub mod verdict;

#[cfg(test)]
mod testing;
