use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use portfwd::config::{ForwardConfig, PortForwardConfig};
use portfwd::table::RuleTables;
use portfwd::PortForwardService;

#[derive(Parser, Debug)]
#[command(version, about = "NAT port-forward gateway")]
struct PortForwardArgs {
    #[arg(
        short,
        long,
        default_value = "/etc/portfwd.toml",
        help = "Configuration file"
    )]
    config: PathBuf,
    #[arg(
        short,
        long = "forward",
        help = "Additional forward as protocol,source,destination"
    )]
    forward: Vec<ForwardConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = PortForwardArgs::parse();
    let mut config = PortForwardConfig::load(&args.config).await?;
    config.forwards.extend(args.forward);

    let service = PortForwardService::launch(&config, RuleTables::default())?;
    service.load_preconfigured(&config);

    tokio::signal::ctrl_c().await?;
    info!("shutting down port-forward gateway");
    tokio::task::spawn_blocking(move || service.shutdown()).await??;
    Ok(())
}
