use anyhow::Context;
use clap::Parser;
use config::StationConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use system::CaptureSystem;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use wriplecore::RecordLabels;

mod bridge;
mod config;
mod system;

#[derive(Parser)]
#[command(author, version, about = "Base station for the Wriple CSI/radar sensing rig")]
struct Args {
    /// Load a station config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start a monitoring session immediately
    #[arg(long, default_value_t = false)]
    monitor: bool,
    /// Start a recording session immediately
    #[arg(long, default_value_t = false)]
    record: bool,
    /// Host the HTTP bridge for the operator frontend
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Override the bridge port from the config
    #[arg(long)]
    port: Option<u16>,
    /// Override the recording packet limit from the config
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut station_config = if let Some(path) = &args.config {
        StationConfig::load(path)?
    } else {
        StationConfig::default()
    };
    if let Some(limit) = args.limit {
        station_config.pipeline.record.record_packet_limit = limit;
    }
    if args.monitor && args.record {
        anyhow::bail!("--monitor and --record are mutually exclusive");
    }

    let bind: SocketAddr = format!(
        "{}:{}",
        station_config.bridge.bind_address,
        args.port.unwrap_or(station_config.bridge.port)
    )
    .parse()
    .context("parsing bridge bind address")?;

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;
    runtime.block_on(async {
        let system = Arc::new(CaptureSystem::new(station_config.pipeline)?);

        if args.monitor {
            system.start_monitoring().await?;
        } else if args.record {
            system.start_recording(RecordLabels::default()).await?;
        }
        if args.serve {
            bridge::http::spawn(system.clone(), bind);
        }

        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        // A finished recording session may already have stopped itself.
        if let Err(err) = system.stop().await {
            log::debug!("shutdown: {err}");
        }
        Ok::<(), anyhow::Error>(())
    })
}
