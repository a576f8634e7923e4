//! Command-line configuration. Every flag has a default so a bare launch
//! trains the bid book model and serves it on port 5000.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::schema::Variant;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "book-price-predictor",
    version,
    about = "Train a book price model and serve predictions over HTTP"
)]
pub struct ServiceArgs {
    /// Dataset variant, which also selects the regressor
    #[arg(long, value_enum, default_value_t = Variant::Bidbook)]
    pub variant: Variant,

    /// Explicit CSV path, bypassing the variant's default file names
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Directory searched for the variant's dataset files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Seed for the train/test split and the regressor
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub test_size: f64,

    /// Write the fitted boosters to this path after training (forest members
    /// get a `.<i>` suffix)
    #[arg(long)]
    pub save_model: Option<PathBuf>,
}

impl ServiceArgs {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
