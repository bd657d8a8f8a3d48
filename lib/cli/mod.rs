use crate::build_info;
use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Fetch top stories on a schedule and upsert them into Postgres
    Ingest,
    /// Fetch top stories on a schedule and push them onto the durable queue
    Publish,
    /// Drain the durable queue and persist items through the rpc service
    Relay,
    /// Serve the storage rpc endpoints over Postgres
    Rpc,
    /// Serve the cached read API over Postgres
    Api,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Publish => "publish",
            Self::Relay => "relay",
            Self::Rpc => "rpc",
            Self::Api => "api",
        }
    }

    pub fn needs_database(self) -> bool {
        matches!(self, Self::Ingest | Self::Rpc | Self::Api)
    }
}

#[derive(Parser, Debug)]
#[command(
    about = "Hacker News top-story ingestion, relay and read API",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[clap(short, long, value_enum)]
    /// Which process role to run
    pub mode: Mode,

    #[clap(long)]
    /// Run a single ingest or publish batch and exit instead of scheduling
    pub once: bool,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
