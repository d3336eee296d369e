use clap::{Parser, Subcommand};
use nadac_backend::storage::DEFAULT_DATA_FILE;

#[derive(Parser, Debug)]
#[command(name = "nadac-backend")]
#[command(about = "NADAC heat map dashboard backend (DuckDB over parquet)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the dashboard JSON API.
    Serve(ServeArgs),
    /// Print the period, state and drug catalogs as JSON.
    Catalog(CatalogArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Parquet fact table (state x drug x quarter x segment).
    #[arg(long, env = "NADAC_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8050)]
    pub port: u16,

    /// Upper bound for a single catalog or pipeline query.
    #[arg(long, default_value_t = 30)]
    pub query_timeout_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long, env = "NADAC_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: String,

    /// Drug list scope: all, brand or generic.
    #[arg(long, default_value = "all")]
    pub how: String,
}
