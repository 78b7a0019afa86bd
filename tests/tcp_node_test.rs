use bytes::Bytes;
use raft_storage::cluster::{ClusterConfig, PartitionId};
use raft_storage::{KvEngineFactory, Protocol, ProtocolConfig, ProtocolState, StaticCluster, TcpLauncher};
use slog::{o, Drain};
use std::sync::Arc;
use tokio::time::Duration;

fn test_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    slog::Logger::root(std::sync::Mutex::new(drain).fuse(), o!())
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("Should find a free port")
}

#[tokio::test]
async fn test_single_node_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let topology = format!(
        r#"{{
            "replicas": [{{"id": "raft-0", "host": "127.0.0.1", "apiPort": 5678, "protocolPort": {}}}],
            "partitions": [{{"partition": 1}}, {{"partition": 2}}]
        }}"#,
        port
    );
    let cluster = StaticCluster::from_config("raft-0", ClusterConfig::from_json(&topology).unwrap());

    let protocol_json = format!(
        r#"{{"snapshotThreshold": 50, "startupTimeout": "10s", "rttMillisecond": 20, "dataDir": {:?}}}"#,
        dir.path().join("data")
    );
    let config = ProtocolConfig::from_json(&protocol_json).unwrap();
    let launcher = TcpLauncher {
        data_dir: config.data_dir_or_default(),
        rtt: config.rtt_or_default(),
        logger: test_logger(),
    };

    let protocol = Protocol::new(config, test_logger());
    protocol
        .start(&cluster, Arc::new(KvEngineFactory), &launcher)
        .await
        .expect("Single node should start");
    assert_eq!(protocol.state(), ProtocolState::Ready);
    assert!(dir.path().join("data").join("nodehost.json").exists());

    let partition = protocol.partition(PartitionId(2)).unwrap();
    assert_eq!(partition.execute("SET greeting=hello").await.unwrap(), Bytes::from("OK"));
    assert_eq!(partition.read("GET greeting").await.unwrap(), Bytes::from("hello"));
    assert_eq!(partition.execute("DEL greeting").await.unwrap(), Bytes::from("OK"));
    assert_eq!(partition.execute("DEL greeting").await.unwrap(), Bytes::from("NOT_FOUND"));

    protocol.stop().await.unwrap();
    assert_eq!(protocol.state(), ProtocolState::Stopped);
    assert!(protocol.partitions().is_empty());

    // The raft port is released once the runtime closes.
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("raft port should be free again");
}
