pub mod build_info;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod firebase_client;
pub mod logging;
pub mod queue;
pub mod relay;
pub mod rpc;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod sync_service;

#[cfg(test)]
pub(crate) mod test_support;
