//! Regressor configuration and the fitted price pipeline.
//!
//! XGBoost boosters are native handles that cannot leave the thread that
//! created them, so every booster lives on a dedicated worker thread. The
//! pipeline encodes rows on the caller's side and sends the dense matrix over
//! a channel; the worker trains once, then answers predict and save jobs until
//! the pipeline is dropped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::{anyhow, ensure, Context};
use polars::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info};
use xgboost::{parameters, Booster, DMatrix};

use crate::error::PredictionError;
use crate::metrics::Evaluation;
use crate::preprocess::{numeric_values, ColumnTransformer};
use crate::schema::FeatureSchema;
use crate::{split_features_and_target, train_test_split};

/// Tree ensemble fitted on the encoded features. Boosting is one XGBoost
/// booster trained for many rounds; the forest is many single-round,
/// row-subsampled boosters with their own seeds whose predictions are averaged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regressor {
    GradientBoosting {
        n_estimators: u32,
        max_depth: u32,
        learning_rate: f32,
    },
    RandomForest {
        n_estimators: u32,
        max_depth: u32,
        sample_ratio: f32,
    },
}

impl Regressor {
    pub fn name(&self) -> &'static str {
        match self {
            Regressor::GradientBoosting { .. } => "gradient boosting",
            Regressor::RandomForest { .. } => "random forest",
        }
    }

    fn members(&self) -> u32 {
        match *self {
            Regressor::GradientBoosting { .. } => 1,
            Regressor::RandomForest { n_estimators, .. } => n_estimators,
        }
    }

    fn rounds(&self) -> u32 {
        match *self {
            Regressor::GradientBoosting { n_estimators, .. } => n_estimators,
            Regressor::RandomForest { .. } => 1,
        }
    }

    fn booster_params(&self, seed: u64) -> anyhow::Result<parameters::BoosterParameters> {
        let tree_params = match *self {
            Regressor::GradientBoosting {
                max_depth,
                learning_rate,
                ..
            } => parameters::tree::TreeBoosterParametersBuilder::default()
                .max_depth(max_depth)
                .eta(learning_rate)
                .build(),
            Regressor::RandomForest {
                max_depth,
                sample_ratio,
                ..
            } => parameters::tree::TreeBoosterParametersBuilder::default()
                .max_depth(max_depth)
                .eta(1.0)
                .subsample(sample_ratio)
                .build(),
        }
        .map_err(|e| anyhow!("invalid tree parameters: {e}"))?;

        let learning_params = parameters::learning::LearningTaskParametersBuilder::default()
            .objective(parameters::learning::Objective::RegLinear)
            .seed(seed)
            .build()
            .map_err(|e| anyhow!("invalid learning parameters: {e}"))?;

        parameters::BoosterParametersBuilder::default()
            .booster_type(parameters::BoosterType::Tree(tree_params))
            .learning_params(learning_params)
            .verbose(false)
            .build()
            .map_err(|e| anyhow!("invalid booster parameters: {e}"))
    }
}

/// Files written for a model with `members` boosters: the path itself for a
/// single booster, `<path>.<i>` for each member of a forest.
pub fn member_paths(path: &Path, members: usize) -> Vec<PathBuf> {
    if members == 1 {
        return vec![path.to_path_buf()];
    }

    (0..members)
        .map(|i| {
            let mut name = OsString::from(path.as_os_str());
            name.push(format!(".{i}"));
            PathBuf::from(name)
        })
        .collect()
}

/// Fitted boosters, owned by the worker thread.
struct Ensemble {
    members: Vec<Booster>,
}

impl Ensemble {
    fn train(
        regressor: Regressor,
        matrix: &[f32],
        rows: usize,
        labels: &[f32],
        seed: u64,
    ) -> anyhow::Result<Self> {
        let mut dtrain =
            DMatrix::from_dense(matrix, rows).context("failed to build training matrix")?;
        dtrain
            .set_labels(labels)
            .context("failed to attach training labels")?;

        let members = (0..regressor.members())
            .map(|i| {
                let training_params = parameters::TrainingParametersBuilder::default()
                    .dtrain(&dtrain)
                    .boost_rounds(regressor.rounds())
                    .booster_params(regressor.booster_params(seed + u64::from(i))?)
                    .build()
                    .map_err(|e| anyhow!("invalid training parameters: {e}"))?;

                Booster::train(&training_params)
                    .with_context(|| format!("{} training failed", regressor.name()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { members })
    }

    fn predict(&self, matrix: &[f32], rows: usize) -> anyhow::Result<Vec<f32>> {
        let dmatrix = DMatrix::from_dense(matrix, rows)?;

        let mut sums = vec![0f32; rows];
        for member in &self.members {
            for (sum, p) in sums.iter_mut().zip(member.predict(&dmatrix)?) {
                *sum += p;
            }
        }

        let n = self.members.len() as f32;
        Ok(sums.into_iter().map(|s| s / n).collect())
    }

    fn save(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let paths = member_paths(path, self.members.len());
        for (member, path) in self.members.iter().zip(&paths) {
            member
                .save(path)
                .with_context(|| format!("failed to save model to {}", path.display()))?;
        }
        Ok(paths)
    }

    fn serve(self, jobs: Receiver<Job>) {
        for job in jobs {
            match job {
                Job::Predict {
                    matrix,
                    rows,
                    reply,
                } => {
                    let _ = reply.send(self.predict(&matrix, rows));
                }
                Job::Save { path, reply } => {
                    let _ = reply.send(self.save(&path));
                }
            }
        }
        debug!("Booster worker stopped");
    }
}

enum Job {
    Predict {
        matrix: Vec<f32>,
        rows: usize,
        reply: Sender<anyhow::Result<Vec<f32>>>,
    },
    Save {
        path: PathBuf,
        reply: Sender<anyhow::Result<Vec<PathBuf>>>,
    },
}

/// Handle to the thread that owns the fitted boosters.
struct BoosterWorker {
    jobs: Sender<Job>,
}

impl BoosterWorker {
    fn spawn(
        regressor: Regressor,
        matrix: Vec<f32>,
        rows: usize,
        labels: Vec<f32>,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let (jobs, job_rx) = mpsc::channel();

        thread::Builder::new()
            .name("booster".into())
            .spawn(move || {
                match Ensemble::train(regressor, &matrix, rows, &labels, seed) {
                    Ok(ensemble) => {
                        if ready_tx.send(Ok(())).is_ok() {
                            ensemble.serve(job_rx);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .context("failed to start booster thread")?;

        ready_rx
            .recv()
            .context("booster thread exited during training")??;

        Ok(Self { jobs })
    }

    fn predict(&self, matrix: Vec<f32>, rows: usize) -> anyhow::Result<Vec<f32>> {
        let (reply, response) = mpsc::channel();
        self.jobs
            .send(Job::Predict {
                matrix,
                rows,
                reply,
            })
            .map_err(|_| anyhow!("booster thread stopped"))?;
        response.recv().context("booster thread stopped")?
    }

    fn save(&self, path: PathBuf) -> anyhow::Result<Vec<PathBuf>> {
        let (reply, response) = mpsc::channel();
        self.jobs
            .send(Job::Save { path, reply })
            .map_err(|_| anyhow!("booster thread stopped"))?;
        response.recv().context("booster thread stopped")?
    }
}

/// Fitted transform plus fitted regressor, replayed for every prediction.
pub struct PricePipeline {
    preprocessor: ColumnTransformer,
    worker: BoosterWorker,
}

impl PricePipeline {
    pub fn fit(
        schema: &'static FeatureSchema,
        regressor: Regressor,
        x_train: &DataFrame,
        y_train: &Series,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let preprocessor = ColumnTransformer::fit(schema, x_train)?;
        let matrix = preprocessor.transform(x_train)?;
        let labels = target_values(y_train)?;

        debug!(
            "Encoded {} training rows into {} features",
            x_train.height(),
            preprocessor.n_outputs()
        );

        let worker = BoosterWorker::spawn(regressor, matrix, x_train.height(), labels, seed)?;

        Ok(Self {
            preprocessor,
            worker,
        })
    }

    /// Raw predictions for every row of a feature frame.
    pub fn predict_frame(&self, features: &DataFrame) -> anyhow::Result<Vec<f32>> {
        let matrix = self.preprocessor.transform(features)?;
        self.worker.predict(matrix, features.height())
    }

    /// Prediction for one record, rounded to cents.
    pub fn predict_record(&self, record: &Map<String, Value>) -> Result<f64, PredictionError> {
        let row = self.preprocessor.transform_record(record)?;
        let predictions = self
            .worker
            .predict(row, 1)
            .map_err(|e| PredictionError::Model(format!("{e:#}")))?;
        let price = predictions
            .first()
            .copied()
            .ok_or_else(|| PredictionError::Model("booster returned no prediction".into()))?;

        Ok(round_to_cents(price as f64))
    }

    pub fn evaluate(&self, x_test: &DataFrame, y_test: &Series) -> anyhow::Result<Evaluation> {
        let predictions = self.predict_frame(x_test)?;
        let labels = target_values(y_test)?;
        Ok(Evaluation::compute(&labels, &predictions))
    }

    /// Persist the boosters in XGBoost's binary model format and return the
    /// files written (see [`member_paths`]).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Vec<PathBuf>> {
        self.worker.save(path.as_ref().to_path_buf())
    }
}

/// Two decimals, ties to even.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn target_values(target: &Series) -> anyhow::Result<Vec<f32>> {
    let frame = DataFrame::new(vec![target.clone()])?;
    let values = numeric_values(&frame, target.name())
        .with_context(|| format!("target column `{}` is unusable", target.name()))?;
    Ok(values.into_iter().map(|v| v as f32).collect())
}

/// Fit the pipeline on a seeded train split and score it on the held-out rest.
pub fn train_price_model(
    df: &DataFrame,
    schema: &'static FeatureSchema,
    regressor: Regressor,
    test_size: f64,
    seed: u64,
) -> anyhow::Result<(PricePipeline, Evaluation)> {
    ensure!(df.height() > 0, "dataset is empty");

    let (train_df, test_df) = train_test_split(df, test_size, seed)?;
    info!(
        "Training {} on {} rows, holding out {}",
        regressor.name(),
        train_df.height(),
        test_df.height()
    );

    let (x_train, y_train) = split_features_and_target(&train_df, schema)?;
    let (x_test, y_test) = split_features_and_target(&test_df, schema)?;

    let pipeline = PricePipeline::fit(schema, regressor, &x_train, &y_train, seed)?;
    let evaluation = pipeline.evaluate(&x_test, &y_test)?;

    info!("MAE : {:.4}", evaluation.mae);
    info!("RMSE : {:.4}", evaluation.rmse);
    info!("R² : {:.4}", evaluation.r2);

    Ok((pipeline, evaluation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MARKETPLACE_SCHEMA;

    fn listings(rows: usize) -> DataFrame {
        let n = rows as i64;
        df!(
            "totalPages" => (0..n).map(|i| 80 + (i * 37) % 600).collect::<Vec<_>>(),
            "damagedPages" => (0..n).map(|i| (i * 5) % 12).collect::<Vec<_>>(),
            "age" => (0..n).map(|i| 5 + (i * 7) % 40).collect::<Vec<_>>(),
            "title" => (0..rows).map(|i| ["Candide", "Nadja", "Alcools"][i % 3]).collect::<Vec<_>>(),
            "author" => (0..rows).map(|i| ["Voltaire", "Breton", "Apollinaire"][i % 3]).collect::<Vec<_>>(),
            "category" => (0..rows).map(|i| ["novel", "poetry", "essay"][i % 3]).collect::<Vec<_>>(),
            "language" => (0..rows).map(|i| ["fr", "en"][i % 2]).collect::<Vec<_>>(),
            "editor" => (0..rows).map(|i| ["Gallimard", "Hachette"][i % 2]).collect::<Vec<_>>(),
            "edition" => (0..n).map(|i| 1980 + (i * 7) % 40).collect::<Vec<_>>(),
            "price" => (0..n).map(|i| 4.0 + ((i * 37) % 600) as f64 * 0.03).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn fit(regressor: Regressor) -> (PricePipeline, DataFrame) {
        let (x, y) = split_features_and_target(&listings(60), &MARKETPLACE_SCHEMA).unwrap();
        let pipeline = PricePipeline::fit(&MARKETPLACE_SCHEMA, regressor, &x, &y, 42).unwrap();
        (pipeline, x)
    }

    #[test]
    fn rounds_to_cents_with_ties_to_even() {
        assert_eq!(round_to_cents(12.345_6), 12.35);
        assert_eq!(round_to_cents(7.0), 7.0);
        assert_eq!(round_to_cents(-3.004), -3.0);
        // Exactly representable halves go to the even cent.
        assert_eq!(round_to_cents(12.125), 12.12);
        assert_eq!(round_to_cents(40.625), 40.62);
        assert_eq!(round_to_cents(40.375), 40.38);
    }

    #[test]
    fn forest_is_one_booster_per_tree() {
        let forest = crate::schema::Variant::Marketplace.regressor();
        assert_eq!(forest.name(), "random forest");
        assert_eq!((forest.members(), forest.rounds()), (100, 1));
        assert!(forest.booster_params(42).is_ok());

        let boosting = crate::schema::Variant::Bidbook.regressor();
        assert_eq!((boosting.members(), boosting.rounds()), (1, 300));
    }

    #[test]
    fn member_paths_suffix_forest_files() {
        let path = Path::new("/tmp/model.bin");
        assert_eq!(member_paths(path, 1), vec![PathBuf::from("/tmp/model.bin")]);
        assert_eq!(
            member_paths(path, 2),
            vec![
                PathBuf::from("/tmp/model.bin.0"),
                PathBuf::from("/tmp/model.bin.1")
            ]
        );
    }

    #[test]
    fn saved_booster_reloads_with_same_predictions() {
        let (pipeline, x) = fit(Regressor::GradientBoosting {
            n_estimators: 20,
            max_depth: 3,
            learning_rate: 0.1,
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let written = pipeline.save(&path).unwrap();
        assert_eq!(written, vec![path.clone()]);
        assert!(path.is_file());

        let matrix = pipeline.preprocessor.transform(&x).unwrap();
        let dmatrix = DMatrix::from_dense(&matrix, x.height()).unwrap();
        let reloaded = Booster::load(&path).unwrap().predict(&dmatrix).unwrap();
        let expected = pipeline.predict_frame(&x).unwrap();

        assert_eq!(reloaded.len(), expected.len());
        for (a, b) in reloaded.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn saved_forest_writes_every_member() {
        let (pipeline, x) = fit(Regressor::RandomForest {
            n_estimators: 4,
            max_depth: 4,
            sample_ratio: 0.8,
        });
        let dir = tempfile::tempdir().unwrap();

        let written = pipeline.save(dir.path().join("forest.bin")).unwrap();
        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|p| p.is_file()));

        let matrix = pipeline.preprocessor.transform(&x).unwrap();
        let dmatrix = DMatrix::from_dense(&matrix, x.height()).unwrap();
        let mut sums = vec![0f32; x.height()];
        for path in &written {
            let member = Booster::load(path).unwrap().predict(&dmatrix).unwrap();
            for (sum, p) in sums.iter_mut().zip(member) {
                *sum += p;
            }
        }

        let expected = pipeline.predict_frame(&x).unwrap();
        for (sum, b) in sums.iter().zip(&expected) {
            assert!((sum / 4.0 - b).abs() < 1e-4);
        }
    }
}
