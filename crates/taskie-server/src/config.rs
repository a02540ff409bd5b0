//! Command line and environment configuration.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// In-memory task queue with dependencies and execution deadlines.
#[derive(Debug, Clone, Parser)]
#[command(name = "taskie", version)]
pub struct Config {
    /// Address the HTTP API binds to.
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:3000")]
    pub listen_address: SocketAddr,

    /// Log output format. Verbosity follows RUST_LOG (default: info).
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
