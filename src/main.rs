use clap::Parser;
use log::{error, info};
use raft_storage::{ClusterConfig, KvEngineFactory, Protocol, ProtocolConfig, StaticCluster, TcpLauncher};
use slog::{o, Drain};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "raft-storage-node")]
#[command(about = "Partitioned Raft storage node", long_about = None)]
struct Args {
    /// ID of the local member in the topology document
    member_id: String,

    /// Replica/partition topology document (cluster.json)
    cluster: PathBuf,

    /// Protocol tuning document (protocol.json)
    protocol: PathBuf,

    /// Marker file written once every partition has a leader
    #[arg(long, default_value = "/tmp/atomix-ready")]
    ready_file: PathBuf,
}

fn root_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let cluster_config = ClusterConfig::load(&args.cluster)?;
    let protocol_config = ProtocolConfig::load(&args.protocol)?;
    info!(
        "Starting member {} ({} replicas, {} partitions)",
        args.member_id,
        cluster_config.replicas.len(),
        cluster_config.partitions.len()
    );

    let logger = root_logger().new(o!("member" => args.member_id.clone()));
    let cluster = StaticCluster::from_config(args.member_id.as_str(), cluster_config);
    let launcher = TcpLauncher {
        data_dir: protocol_config.data_dir_or_default(),
        rtt: protocol_config.rtt_or_default(),
        logger: logger.clone(),
    };

    let protocol = Protocol::new(protocol_config, logger);
    if let Err(e) = protocol.start(&cluster, Arc::new(KvEngineFactory), &launcher).await {
        error!("Failed to start storage node: {}", e);
        return Err(e.into());
    }

    std::fs::write(&args.ready_file, b"")?;
    info!("Storage node ready, press Ctrl+C to shut down");

    signal::ctrl_c().await?;

    let result = protocol.stop().await;
    if let Err(e) = std::fs::remove_file(&args.ready_file) {
        error!("Failed to remove {}: {}", args.ready_file.display(), e);
    }
    result?;
    Ok(())
}
