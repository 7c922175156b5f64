use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fetchpool")]
#[command(about = "Batch URL download service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API together with the worker pool
    Server(ServerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file (overrides FETCHPOOL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of download workers (overrides pool.workers)
    #[arg(long)]
    pub workers: Option<usize>,
}
