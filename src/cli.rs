use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish one PDF issue end to end.
    Publish(PublishArgs),
    /// Run the HTTP upload endpoint.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Path to the PDF to publish.
    #[arg(long)]
    pub file: PathBuf,

    /// Filename to publish under (default: the local file name).
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1:8080", env = "PRESSFLIP_BIND")]
    pub addr: SocketAddr,
}
