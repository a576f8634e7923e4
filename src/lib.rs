use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context};
use polars::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info};

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod preprocess;
pub mod schema;
pub mod server;

pub use error::PredictionError;
pub use metrics::Evaluation;
pub use model::{train_price_model, PricePipeline, Regressor};
pub use schema::{FeatureSchema, Variant};

// Pick the CSV to train on.
// An explicit path wins; otherwise the candidates are tried in order inside data_dir.
pub fn resolve_dataset_path(
    explicit: Option<&Path>,
    data_dir: &Path,
    candidates: &[&str],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        ensure!(path.is_file(), "dataset {} does not exist", path.display());
        return Ok(path.to_path_buf());
    }

    for name in candidates {
        let path = data_dir.join(name);
        if path.is_file() {
            return Ok(path);
        }
        debug!("No dataset at {}", path.display());
    }

    bail!(
        "no dataset found in {} (looked for {})",
        data_dir.display(),
        candidates.join(", ")
    )
}

pub fn load_csv_file(file_path: &Path) -> anyhow::Result<DataFrame> {
    let df = CsvReader::from_path(file_path)
        .with_context(|| format!("failed to open {}", file_path.display()))?
        .has_header(true)
        .finish()
        .with_context(|| format!("failed to parse {}", file_path.display()))?;

    info!("Loaded {} rows and {} columns", df.height(), df.width());
    debug!("{:?}", df.head(Some(5)));

    Ok(df)
}

pub fn train_test_split(
    df: &DataFrame,
    perc_test_size: f64,
    seed: u64,
) -> anyhow::Result<(DataFrame, DataFrame)> {
    ensure!(
        perc_test_size > 0.0 && perc_test_size < 1.0,
        "test size must be between 0 and 1, got {perc_test_size}"
    );

    // generate vector from 0 to # of rows in df
    let mut indices: Vec<u32> = (0..df.height() as u32).collect();

    // seeded rng so the split is reproducible
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    // the first ceil(n * test) shuffled rows are held out
    let split_idx = (df.height() as f64 * perc_test_size).ceil() as usize;
    ensure!(
        split_idx > 0 && split_idx < df.height(),
        "cannot split {} rows with test size {perc_test_size}",
        df.height()
    );

    let test_indices_ca = UInt32Chunked::from_vec("", indices[..split_idx].to_vec());
    let train_indices_ca = UInt32Chunked::from_vec("", indices[split_idx..].to_vec());

    let train_df = df.take(&train_indices_ca)?;
    let test_df = df.take(&test_indices_ca)?;

    Ok((train_df, test_df))
}

pub fn split_features_and_target(
    df: &DataFrame,
    schema: &FeatureSchema,
) -> anyhow::Result<(DataFrame, Series)> {
    let features = df
        .select(schema.feature_names())
        .context("dataset is missing feature columns")?;
    let target = df
        .column(schema.target)
        .with_context(|| format!("dataset has no target column `{}`", schema.target))?
        .clone();

    Ok((features, target))
}
