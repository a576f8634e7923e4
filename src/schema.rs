use clap::ValueEnum;

use crate::model::Regressor;

/// Column layout of a listing dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSchema {
    pub numeric: &'static [&'static str],
    pub categorical: &'static [&'static str],
    pub binary: &'static [&'static str],
    pub target: &'static str,
}

impl FeatureSchema {
    /// Every feature column, in the order the transformer emits them.
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.numeric
            .iter()
            .chain(self.categorical)
            .chain(self.binary)
            .copied()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.feature_names().iter().any(|n| *n == name)
    }
}

pub const BIDBOOK_SCHEMA: FeatureSchema = FeatureSchema {
    numeric: &[
        "année_édition",
        "nombre_pages",
        "pages_arrachées",
        "nombre_exemplaires_connus",
    ],
    categorical: &[
        "titre",
        "auteur",
        "genre",
        "langue",
        "éditeur",
        "état_général",
    ],
    binary: &["édition_originale", "reliure_cuir", "avec_dédicace"],
    target: "prix",
};

pub const MARKETPLACE_SCHEMA: FeatureSchema = FeatureSchema {
    numeric: &["totalPages", "damagedPages", "age"],
    categorical: &["title", "author", "category", "language", "editor", "edition"],
    binary: &[],
    target: "price",
};

/// Which dataset the service is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// Rare book auction listings, gradient boosting.
    Bidbook,
    /// Second-hand marketplace listings, random forest.
    Marketplace,
}

impl Variant {
    pub fn schema(self) -> &'static FeatureSchema {
        match self {
            Variant::Bidbook => &BIDBOOK_SCHEMA,
            Variant::Marketplace => &MARKETPLACE_SCHEMA,
        }
    }

    /// Primary file name first, then the fallback.
    pub fn dataset_candidates(self) -> [&'static str; 2] {
        match self {
            Variant::Bidbook => ["bidbook.csv", "bidbook_dataset.csv"],
            Variant::Marketplace => ["books.csv", "books_dataset.csv"],
        }
    }

    pub fn regressor(self) -> Regressor {
        match self {
            Variant::Bidbook => Regressor::GradientBoosting {
                n_estimators: 300,
                max_depth: 6,
                learning_rate: 0.1,
            },
            Variant::Marketplace => Regressor::RandomForest {
                n_estimators: 100,
                max_depth: 12,
                sample_ratio: 0.8,
            },
        }
    }
}
