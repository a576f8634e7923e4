use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use book_price_predictor::config::ServiceArgs;
use book_price_predictor::{load_csv_file, resolve_dataset_path, server, train_price_model};

// Startup sequence
// 1. Resolve the dataset CSV (explicit path, primary name, fallback name)
// 2. Load file
// 3. Train the pipeline on a seeded split and log its metrics
// 4. Optionally save the boosters
// 5. Serve predictions until Ctrl-C

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServiceArgs::parse();
    let variant = args.variant;
    info!("Starting {:?} price model...", variant);

    // 1. Resolve the dataset
    let csv_file_path = resolve_dataset_path(
        args.data.as_deref(),
        &args.data_dir,
        &variant.dataset_candidates(),
    )?;
    info!("Using dataset {}", csv_file_path.display());

    // 2. Load file
    let df = load_csv_file(&csv_file_path)?;

    // 3. Train once, before the listener exists
    let (pipeline, _evaluation) = train_price_model(
        &df,
        variant.schema(),
        variant.regressor(),
        args.test_size,
        args.seed,
    )?;

    // 4. Save the model if asked to
    if let Some(path) = &args.save_model {
        for written in pipeline.save(path)? {
            info!("Saved model to {}", written.display());
        }
    }

    // 5. Serve
    server::serve(args.bind_addr()?, Arc::new(pipeline)).await
}
