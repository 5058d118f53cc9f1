use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wirestore-server", about = "Stores JSON record batches in a relational table")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read record batches from stdin, store them and forward them to stdout
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to TOML config file
    #[arg(long, default_value = "config.toml", env = "WIRESTORE_CONFIG")]
    pub config: String,
}
