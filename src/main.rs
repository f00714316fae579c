use anyhow::Result;
use clap::Parser;
use rooster_market::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rooster_market::telemetry::init(cli.verbose);
    cli.run().await
}
