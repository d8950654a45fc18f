use clap::Parser;
use raft3d::config::NodeConfig;
use raft3d::start_raft_node;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Setup the logger
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Parse the parameters passed by arguments and environment.
    let config = NodeConfig::parse();

    start_raft_node(config).await
}
