//! Bagged decision-tree churn classifier

use crate::data::{CleanedDataset, CHURN_LABEL, CHURN_TIMEFRAME, CUSTOMER_ID, TEMPORAL_COLUMNS};
use crate::error::{PortfolioError, Result};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ensemble and split parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    /// Number of bootstrap-aggregated trees
    pub n_trees: usize,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    /// Seed for both the train/test split and the bootstrap samples
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Fitted ensemble. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedChurnModel {
    feature_names: Vec<String>,
    seed: u64,
    trees: Vec<DecisionTree<f64, usize>>,
}

impl TrainedChurnModel {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Majority vote over all trees; a tie predicts "no churn".
    ///
    /// `records` must have one column per entry of
    /// [`feature_names`](Self::feature_names), in the same order.
    pub fn predict(&self, records: &Array2<f64>) -> Array1<usize> {
        let mut churn_votes = Array1::<usize>::zeros(records.nrows());
        for tree in &self.trees {
            let predictions: Array1<usize> = tree.predict(records);
            churn_votes
                .iter_mut()
                .zip(predictions.iter())
                .for_each(|(votes, &class)| *votes += usize::from(class == 1));
        }

        churn_votes.mapv(|votes| usize::from(votes * 2 > self.trees.len()))
    }
}

/// Precision, recall, F1 and support for one class or an average
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy and macro/weighted averages
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// One entry per class seen in either the truth or the predictions
    pub classes: Vec<(usize, ClassMetrics)>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn compute(y_true: &[usize], y_pred: &[usize]) -> Self {
        let labels: BTreeSet<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let pairs: Vec<(usize, usize)> = y_true.iter().copied().zip(y_pred.iter().copied()).collect();

        let classes: Vec<(usize, ClassMetrics)> = labels
            .into_iter()
            .map(|label| {
                let tp = pairs.iter().filter(|&&(t, p)| t == label && p == label).count();
                let predicted = pairs.iter().filter(|&&(_, p)| p == label).count();
                let support = pairs.iter().filter(|&&(t, _)| t == label).count();

                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                (
                    label,
                    ClassMetrics {
                        precision,
                        recall,
                        f1_score,
                        support,
                    },
                )
            })
            .collect();

        let correct = pairs.iter().filter(|(t, p)| t == p).count();
        let total = pairs.len();
        let n_classes = classes.len().max(1) as f64;
        let macro_avg = ClassMetrics {
            precision: classes.iter().map(|(_, m)| m.precision).sum::<f64>() / n_classes,
            recall: classes.iter().map(|(_, m)| m.recall).sum::<f64>() / n_classes,
            f1_score: classes.iter().map(|(_, m)| m.f1_score).sum::<f64>() / n_classes,
            support: total,
        };
        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|(_, m)| metric(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            support: total,
        };

        Self {
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
        }
    }

    pub fn class(&self, label: usize) -> Option<&ClassMetrics> {
        self.classes
            .iter()
            .find(|(class, _)| *class == label)
            .map(|(_, metrics)| metrics)
    }
}

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len() + 3))?;
        for (label, metrics) in &self.classes {
            map.serialize_entry(&label.to_string(), metrics)?;
        }
        map.serialize_entry("accuracy", &self.accuracy)?;
        map.serialize_entry("macro avg", &self.macro_avg)?;
        map.serialize_entry("weighted avg", &self.weighted_avg)?;
        map.end()
    }
}

/// Feature name and importance pairs, in input-column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureImportance(pub Vec<(String, f64)>);

impl FeatureImportance {
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == feature)
            .map(|(_, score)| *score)
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, score)| score).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, f64)> {
        self.0.iter()
    }
}

impl Serialize for FeatureImportance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, score) in &self.0 {
            map.serialize_entry(name, score)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEvaluation {
    pub model_performance: ClassificationReport,
    pub feature_importance: FeatureImportance,
    /// Predicted class for each held-out row, in split order
    #[serde(skip)]
    pub held_out_predictions: Vec<usize>,
}

/// Columns never used as model input
const NON_FEATURE_COLUMNS: [&str; 6] = [
    CUSTOMER_ID,
    CHURN_LABEL,
    CHURN_TIMEFRAME,
    TEMPORAL_COLUMNS[0],
    TEMPORAL_COLUMNS[1],
    TEMPORAL_COLUMNS[2],
];

/// Every cleaned column except identifiers, label and temporal columns
pub fn feature_columns(dataset: &CleanedDataset) -> Vec<String> {
    dataset
        .column_names()
        .iter()
        .filter(|name| !NON_FEATURE_COLUMNS.contains(&name.as_str()))
        .cloned()
        .collect()
}

/// Binary churn class per row. Fails when the label is absent or takes a
/// single value, since evaluation is undefined then.
pub fn churn_labels(dataset: &CleanedDataset) -> Result<Array1<usize>> {
    let column = dataset.column(CHURN_LABEL).ok_or_else(|| {
        PortfolioError::Training(format!("label column {CHURN_LABEL} is absent"))
    })?;
    let labels = column.mapv(|value| usize::from(value != 0.0));

    let Some(&first) = labels.get(0) else {
        return Err(PortfolioError::Training("dataset has no rows".to_string()));
    };
    if labels.iter().all(|&label| label == first) {
        return Err(PortfolioError::Training(format!(
            "{CHURN_LABEL} has a single class ({first})"
        )));
    }
    Ok(labels)
}

/// Shuffled `(train, test)` row indices. The test partition takes
/// `ceil(n_rows * test_fraction)` rows.
pub fn train_test_split(n_rows: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(&mut rng);

    let n_test = ((n_rows as f64 * test_fraction).ceil() as usize).min(n_rows);
    let train = indices.split_off(n_test);
    (train, indices)
}

/// Split, fit the ensemble, evaluate on the held-out rows and rank features
pub fn build_churn_model(
    dataset: &CleanedDataset,
    config: &ForestConfig,
) -> Result<(TrainedChurnModel, ModelEvaluation)> {
    let labels = churn_labels(dataset)?;
    let feature_names = feature_columns(dataset);
    if feature_names.is_empty() {
        return Err(PortfolioError::Training(
            "no feature columns left after excluding identifiers and labels".to_string(),
        ));
    }

    let feature_idx: Vec<usize> = feature_names
        .iter()
        .filter_map(|name| dataset.position(name))
        .collect();
    let records = dataset.values().select(Axis(1), &feature_idx);

    let (train_idx, test_idx) = train_test_split(dataset.n_rows(), config.test_fraction, config.seed);
    if train_idx.is_empty() {
        return Err(PortfolioError::Training(format!(
            "training partition is empty ({} rows, test fraction {})",
            dataset.n_rows(),
            config.test_fraction
        )));
    }
    if test_idx.is_empty() {
        return Err(PortfolioError::Training(format!(
            "held-out partition is empty ({} rows, test fraction {})",
            dataset.n_rows(),
            config.test_fraction
        )));
    }
    tracing::info!(
        train = train_idx.len(),
        test = test_idx.len(),
        features = feature_names.len(),
        "data split"
    );

    let x_train = records.select(Axis(0), &train_idx);
    let y_train = labels.select(Axis(0), &train_idx);
    let x_test = records.select(Axis(0), &test_idx);
    let y_test = labels.select(Axis(0), &test_idx);

    let model = fit_forest(&x_train, &y_train, feature_names, config)?;
    let predictions = model.predict(&x_test);

    let model_performance = ClassificationReport::compute(&y_test.to_vec(), &predictions.to_vec());
    tracing::info!(accuracy = model_performance.accuracy, "model evaluated");

    let importances = forest_importance(&model.trees, model.feature_names.len());
    let feature_importance = FeatureImportance(
        model
            .feature_names
            .iter()
            .cloned()
            .zip(importances)
            .collect(),
    );

    let evaluation = ModelEvaluation {
        model_performance,
        feature_importance,
        held_out_predictions: predictions.to_vec(),
    };

    Ok((model, evaluation))
}

fn fit_forest(
    x_train: &Array2<f64>,
    y_train: &Array1<usize>,
    feature_names: Vec<String>,
    config: &ForestConfig,
) -> Result<TrainedChurnModel> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let n_samples = x_train.nrows();

    let trees = (0..config.n_trees)
        .map(|_| {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let bootstrap = Dataset::new(
                x_train.select(Axis(0), &sample),
                y_train.select(Axis(0), &sample),
            );

            DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .fit(&bootstrap)
                .map_err(|e| PortfolioError::Training(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(trees = trees.len(), samples = n_samples, "ensemble fitted");

    Ok(TrainedChurnModel {
        feature_names,
        seed: config.seed,
        trees,
    })
}

/// Mean of the per-tree normalized impurity importances, renormalized to
/// sum to one. Trees without any split carry no signal and are skipped;
/// if no tree split at all the importance is uniform.
fn forest_importance(trees: &[DecisionTree<f64, usize>], n_features: usize) -> Vec<f64> {
    let mut totals = vec![0.0; n_features];

    for tree in trees {
        let importance = tree.feature_importance();
        let sum: f64 = importance.iter().sum();
        if !(sum.is_finite() && sum > 0.0) || importance.iter().any(|v| *v < 0.0) {
            continue;
        }
        for (total, value) in totals.iter_mut().zip(importance.iter()) {
            *total += value / sum;
        }
    }

    let grand_total: f64 = totals.iter().sum();
    if grand_total > 0.0 {
        totals.iter().map(|total| total / grand_total).collect()
    } else {
        vec![1.0 / n_features as f64; n_features]
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
