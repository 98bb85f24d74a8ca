use clap::Parser;
use color_eyre::Result;
use mesinpintar::{cli::Cli, load_config, run};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pretty_env_logger::init();
    color_eyre::install()?;

    let cfg = load_config()?;
    run(cli, cfg).await
}
