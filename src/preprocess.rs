//! Column transformer fitted on the training features.
//!
//! Numeric columns are standardized, categorical columns are one-hot encoded
//! over the vocabulary seen during fitting, and binary flags pass through as
//! 0/1. The same transformer encodes whole frames at training time and single
//! JSON records at request time, so both paths produce identical layouts.

use std::collections::BTreeSet;

use anyhow::{bail, ensure, Context};
use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::PredictionError;
use crate::schema::FeatureSchema;

/// Learned mean and scale of one numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: f64,
    pub scale: f64,
}

impl StandardScaler {
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, scale: 1.0 };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let scale = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        Self { mean, scale }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// Sorted vocabulary of one categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHotEncoder {
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit(values: &[String]) -> Self {
        let categories: BTreeSet<&String> = values.iter().collect();
        Self {
            categories: categories.into_iter().cloned().collect(),
        }
    }

    /// Indicator slot for `value`; `None` for categories never seen in training.
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Number of indicator slots.
    pub fn width(&self) -> usize {
        self.categories.len()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnTransformer {
    schema: &'static FeatureSchema,
    scalers: Vec<StandardScaler>,
    encoders: Vec<OneHotEncoder>,
}

impl ColumnTransformer {
    pub fn fit(schema: &'static FeatureSchema, features: &DataFrame) -> anyhow::Result<Self> {
        let scalers = schema
            .numeric
            .iter()
            .map(|name| numeric_values(features, name).map(|v| StandardScaler::fit(&v)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let encoders = schema
            .categorical
            .iter()
            .map(|name| categorical_values(features, name).map(|v| OneHotEncoder::fit(&v)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            schema,
            scalers,
            encoders,
        })
    }

    pub fn scalers(&self) -> &[StandardScaler] {
        &self.scalers
    }

    pub fn encoders(&self) -> &[OneHotEncoder] {
        &self.encoders
    }

    /// Width of an encoded row.
    pub fn n_outputs(&self) -> usize {
        self.scalers.len()
            + self.encoders.iter().map(OneHotEncoder::width).sum::<usize>()
            + self.schema.binary.len()
    }

    /// Encode a feature frame into a dense row-major matrix.
    pub fn transform(&self, features: &DataFrame) -> anyhow::Result<Vec<f32>> {
        let width = self.n_outputs();
        let mut matrix = vec![0f32; features.height() * width];
        let mut offset = 0;

        for (name, scaler) in self.schema.numeric.iter().zip(&self.scalers) {
            for (row, value) in numeric_values(features, name)?.into_iter().enumerate() {
                matrix[row * width + offset] = scaler.transform(value) as f32;
            }
            offset += 1;
        }

        for (name, encoder) in self.schema.categorical.iter().zip(&self.encoders) {
            for (row, value) in categorical_values(features, name)?.iter().enumerate() {
                if let Some(slot) = encoder.index_of(value) {
                    matrix[row * width + offset + slot] = 1.0;
                }
            }
            offset += encoder.width();
        }

        for name in self.schema.binary {
            for (row, value) in binary_values(features, name)?.into_iter().enumerate() {
                matrix[row * width + offset] = value;
            }
            offset += 1;
        }

        Ok(matrix)
    }

    /// Encode a single JSON record. The record must carry exactly the fitted
    /// feature columns.
    pub fn transform_record(&self, record: &Map<String, Value>) -> Result<Vec<f32>, PredictionError> {
        if let Some(extra) = record.keys().find(|key| !self.schema.contains(key.as_str())) {
            return Err(PredictionError::UnexpectedField(extra.clone()));
        }

        let mut row = Vec::with_capacity(self.n_outputs());

        for (name, scaler) in self.schema.numeric.iter().zip(&self.scalers) {
            let value = field(record, name)?
                .as_f64()
                .ok_or_else(|| invalid_type(name, "a number"))?;
            row.push(scaler.transform(value) as f32);
        }

        for (name, encoder) in self.schema.categorical.iter().zip(&self.encoders) {
            let value = match field(record, name)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(invalid_type(name, "a string")),
            };
            let mut block = vec![0f32; encoder.width()];
            if let Some(slot) = encoder.index_of(&value) {
                block[slot] = 1.0;
            }
            row.extend(block);
        }

        for name in self.schema.binary {
            let flag = match field(record, name)? {
                Value::Bool(b) => *b,
                Value::Number(n) if n.as_f64() == Some(0.0) => false,
                Value::Number(n) if n.as_f64() == Some(1.0) => true,
                _ => return Err(invalid_type(name, "a boolean")),
            };
            row.push(if flag { 1.0 } else { 0.0 });
        }

        Ok(row)
    }
}

fn field<'a>(record: &'a Map<String, Value>, name: &str) -> Result<&'a Value, PredictionError> {
    record
        .get(name)
        .ok_or_else(|| PredictionError::MissingField(name.to_string()))
}

fn invalid_type(field: &str, expected: &'static str) -> PredictionError {
    PredictionError::InvalidType {
        field: field.to_string(),
        expected,
    }
}

fn present_column<'a>(df: &'a DataFrame, name: &str) -> anyhow::Result<&'a Series> {
    let series = df
        .column(name)
        .with_context(|| format!("dataset has no column `{name}`"))?;
    ensure!(
        series.null_count() == 0,
        "column `{name}` has {} empty values",
        series.null_count()
    );
    Ok(series)
}

pub(crate) fn numeric_values(df: &DataFrame, name: &str) -> anyhow::Result<Vec<f64>> {
    let series = present_column(df, name)?;
    ensure!(
        series.dtype().is_numeric(),
        "column `{name}` must be numeric, found {}",
        series.dtype()
    );

    let values = series.cast(&DataType::Float64)?;
    let values = values.f64()?.into_no_null_iter().collect();
    Ok(values)
}

fn categorical_values(df: &DataFrame, name: &str) -> anyhow::Result<Vec<String>> {
    let series = present_column(df, name)?;

    let values = series.cast(&DataType::Utf8)?;
    let values = values
        .utf8()?
        .into_no_null_iter()
        .map(str::to_owned)
        .collect();
    Ok(values)
}

fn binary_values(df: &DataFrame, name: &str) -> anyhow::Result<Vec<f32>> {
    let series = present_column(df, name)?;

    match series.dtype() {
        DataType::Boolean => Ok(series
            .bool()?
            .into_no_null_iter()
            .map(|b| if b { 1.0 } else { 0.0 })
            .collect()),
        DataType::Utf8 => series
            .utf8()?
            .into_no_null_iter()
            .map(|s| match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(1.0),
                "false" | "0" => Ok(0.0),
                other => bail!("column `{name}` has non-binary value `{other}`"),
            })
            .collect(),
        dtype if dtype.is_numeric() => {
            let values = series.cast(&DataType::Float64)?;
            let values = values.f64()?;
            values
                .into_no_null_iter()
                .map(|v| match v {
                    v if v == 0.0 => Ok(0.0),
                    v if v == 1.0 => Ok(1.0),
                    other => bail!("column `{name}` has non-binary value {other}"),
                })
                .collect()
        }
        other => bail!("column `{name}` must be binary, found {other}"),
    }
}
