use clap::Parser;

use taskie_server::{Config, run, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    telemetry::init(config.log_format)?;
    run(config).await
}
