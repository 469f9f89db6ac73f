//! Portfolio statistics and churn-rate segmentation

use crate::data::{
    CleanedDataset, ACCOUNT_BALANCE, AGE, ANNUAL_INCOME, CHURN_LABEL, CREDIT_SCORE, LOAN_AMOUNT,
};
use crate::error::Result;
use ndarray::ArrayView1;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Age bucket edges, in years
pub const AGE_EDGES: [f64; 5] = [0.0, 30.0, 50.0, 70.0, 100.0];
/// Credit score bucket edges
pub const CREDIT_SCORE_EDGES: [f64; 4] = [0.0, 300.0, 600.0, 850.0];
/// Number of equal-width annual income buckets
pub const INCOME_BUCKETS: usize = 5;

/// Decimals used for bucket labels unless more are needed to tell edges apart
pub const LABEL_DECIMALS: u32 = 3;

/// Half-open range `(lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentBucket {
    pub lower: f64,
    pub upper: f64,
    /// Decimals kept for the edges in [`label`](Self::label)
    pub decimals: u32,
}

impl SegmentBucket {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            decimals: LABEL_DECIMALS,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower < value && value <= self.upper
    }

    /// Interval notation with rounded edges, e.g. `(30, 50]`
    pub fn label(&self) -> String {
        format!(
            "({}, {}]",
            round_edge(self.lower, self.decimals),
            round_edge(self.upper, self.decimals)
        )
    }
}

fn round_edge(edge: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (edge * scale).round() / scale
}

/// Fewest decimals, starting at [`LABEL_DECIMALS`], that keep every
/// rounded edge distinct
fn label_decimals(edges: &[f64]) -> u32 {
    (LABEL_DECIMALS..=15)
        .find(|&decimals| {
            edges
                .windows(2)
                .all(|pair| round_edge(pair[0], decimals) != round_edge(pair[1], decimals))
        })
        .unwrap_or(15)
}

/// Churn rate of the rows falling into one bucket
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRate {
    pub bucket: SegmentBucket,
    pub members: usize,
    /// `None` for an empty bucket
    pub churn_rate: Option<f64>,
}

/// Buckets of one segmentation dimension, in ascending range order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentTable {
    pub buckets: Vec<SegmentRate>,
}

impl SegmentTable {
    pub fn get(&self, label: &str) -> Option<&SegmentRate> {
        self.buckets.iter().find(|rate| rate.bucket.label() == label)
    }

    pub fn labels(&self) -> Vec<String> {
        self.buckets.iter().map(|rate| rate.bucket.label()).collect()
    }
}

// Serialized as an ordered `label -> churn rate` mapping.
impl Serialize for SegmentTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for rate in &self.buckets {
            map.serialize_entry(&rate.bucket.label(), &rate.churn_rate)?;
        }
        map.end()
    }
}

/// The attributes rows are segmented by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentDimension {
    Age,
    Income,
    CreditScore,
}

impl SegmentDimension {
    pub const ALL: [SegmentDimension; 3] = [Self::Age, Self::Income, Self::CreditScore];

    /// Key under `segmented_analysis`
    pub fn key(self) -> &'static str {
        match self {
            Self::Age => "by_age",
            Self::Income => "by_income",
            Self::CreditScore => "by_credit_score",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Age => AGE,
            Self::Income => ANNUAL_INCOME,
            Self::CreditScore => CREDIT_SCORE,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Age => "Churn Rate by Age Group",
            Self::Income => "Churn Rate by Income Group",
            Self::CreditScore => "Churn Rate by Credit Score",
        }
    }

    /// Bucket layout for this dimension. Income buckets depend on the
    /// observed values, the others are fixed.
    pub fn buckets(self, values: ArrayView1<'_, f64>) -> Vec<SegmentBucket> {
        match self {
            Self::Age => fixed_buckets(&AGE_EDGES),
            Self::Income => equal_width_buckets(values, INCOME_BUCKETS),
            Self::CreditScore => fixed_buckets(&CREDIT_SCORE_EDGES),
        }
    }
}

/// Churn rate breakdowns, one table per dimension
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SegmentedAnalysis {
    pub by_age: SegmentTable,
    pub by_income: SegmentTable,
    pub by_credit_score: SegmentTable,
}

impl SegmentedAnalysis {
    pub fn table(&self, dimension: SegmentDimension) -> &SegmentTable {
        match dimension {
            SegmentDimension::Age => &self.by_age,
            SegmentDimension::Income => &self.by_income,
            SegmentDimension::CreditScore => &self.by_credit_score,
        }
    }
}

/// Aggregate portfolio statistics. Means over zero rows are NaN and
/// serialize as `null`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PortfolioSummary {
    pub total_customers: usize,
    pub churn_rate: f64,
    pub avg_credit_score: f64,
    pub avg_loan_amount: f64,
    /// Share of rows whose loan amount exceeds the account balance.
    /// A heuristic proxy, not a credit-risk default determination.
    pub default_rate: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub summary: PortfolioSummary,
    pub segmented_analysis: SegmentedAnalysis,
}

/// Compute the aggregate statistics and all three segment tables
pub fn analyze_portfolio(dataset: &CleanedDataset) -> Result<AnalysisResult> {
    let summary = summarize(dataset)?;
    tracing::info!(
        customers = summary.total_customers,
        churn_rate = summary.churn_rate,
        default_rate = summary.default_rate,
        "portfolio summarized"
    );

    let segmented_analysis = SegmentedAnalysis {
        by_age: segment(dataset, SegmentDimension::Age)?,
        by_income: segment(dataset, SegmentDimension::Income)?,
        by_credit_score: segment(dataset, SegmentDimension::CreditScore)?,
    };

    Ok(AnalysisResult {
        summary,
        segmented_analysis,
    })
}

/// Customer count, churn rate, averages and the default-rate heuristic
pub fn summarize(dataset: &CleanedDataset) -> Result<PortfolioSummary> {
    let churn = dataset.require(CHURN_LABEL)?;
    let credit_score = dataset.require(CREDIT_SCORE)?;
    let loan_amount = dataset.require(LOAN_AMOUNT)?;
    let balance = dataset.require(ACCOUNT_BALANCE)?;

    let over_balance = loan_amount
        .iter()
        .zip(balance.iter())
        .filter(|(loan, balance)| loan > balance)
        .count();

    Ok(PortfolioSummary {
        total_customers: dataset.n_rows(),
        churn_rate: mean(churn),
        avg_credit_score: mean(credit_score),
        avg_loan_amount: mean(loan_amount),
        default_rate: over_balance as f64 / dataset.n_rows() as f64,
    })
}

/// Mean churn label per bucket of `dimension`
pub fn segment(dataset: &CleanedDataset, dimension: SegmentDimension) -> Result<SegmentTable> {
    let values = dataset.require(dimension.column())?;
    let churn = dataset.require(CHURN_LABEL)?;

    let buckets = dimension
        .buckets(values)
        .into_iter()
        .map(|bucket| {
            let (members, churned) = values
                .iter()
                .zip(churn.iter())
                .filter(|(value, _)| bucket.contains(**value))
                .fold((0usize, 0.0), |(n, sum), (_, label)| (n + 1, sum + label));

            let churn_rate = (members > 0).then(|| churned / members as f64);
            tracing::debug!(
                dimension = dimension.key(),
                bucket = %bucket.label(),
                members,
                ?churn_rate,
                "segment computed"
            );

            SegmentRate {
                bucket,
                members,
                churn_rate,
            }
        })
        .collect();

    Ok(SegmentTable { buckets })
}

/// Consecutive `(edges[i], edges[i + 1]]` buckets
pub fn fixed_buckets(edges: &[f64]) -> Vec<SegmentBucket> {
    let decimals = label_decimals(edges);
    edges
        .windows(2)
        .map(|pair| SegmentBucket {
            decimals,
            ..SegmentBucket::new(pair[0], pair[1])
        })
        .collect()
}

/// `n` equal-width buckets spanning the observed range.
///
/// The lowest edge is pulled down by 0.1% of the range so the minimum
/// falls inside the first bucket. A degenerate range is widened by 0.1%
/// of its magnitude on both sides first. No values means no buckets.
pub fn equal_width_buckets(values: ArrayView1<'_, f64>, n: usize) -> Vec<SegmentBucket> {
    if values.is_empty() || n == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut edges: Vec<f64> = if min == max {
        let pad = |v: f64| if v == 0.0 { 0.001 } else { 0.001 * v.abs() };
        linspace(min - pad(min), max + pad(max), n)
    } else {
        let mut edges = linspace(min, max, n);
        edges[0] -= (max - min) * 0.001;
        edges
    };
    edges.dedup();

    fixed_buckets(&edges)
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / n as f64;
    let mut edges: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    edges.push(end);
    edges
}

fn mean(values: ArrayView1<'_, f64>) -> f64 {
    values.sum() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ALLOW_LIST;
    use ndarray::{array, Array1};

    /// Dataset with every allow-list column, overriding the ones given
    fn dataset_with(rows: usize, overrides: &[(&str, Vec<f64>)]) -> CleanedDataset {
        let columns = ALLOW_LIST
            .iter()
            .map(|&name| {
                let values = overrides
                    .iter()
                    .find(|(column, _)| *column == name)
                    .map(|(_, values)| values.clone())
                    .unwrap_or_else(|| vec![0.0; rows]);
                (name.to_string(), values)
            })
            .collect();
        CleanedDataset::from_columns(columns).unwrap()
    }

    #[test]
    fn test_single_churned_row() {
        let dataset = dataset_with(
            1,
            &[
                (AGE, vec![45.0]),
                (CREDIT_SCORE, vec![700.0]),
                (ANNUAL_INCOME, vec![55_000.0]),
                (CHURN_LABEL, vec![1.0]),
            ],
        );
        let result = analyze_portfolio(&dataset).unwrap();

        assert_eq!(result.summary.total_customers, 1);
        assert_eq!(result.summary.churn_rate, 1.0);
        assert_eq!(
            result.segmented_analysis.by_age.get("(30, 50]").unwrap().churn_rate,
            Some(1.0)
        );
    }

    #[test]
    fn test_summary_statistics() {
        let dataset = dataset_with(
            4,
            &[
                (CHURN_LABEL, vec![1.0, 0.0, 0.0, 1.0]),
                (CREDIT_SCORE, vec![500.0, 600.0, 700.0, 800.0]),
                (LOAN_AMOUNT, vec![100.0, 5_000.0, 0.0, 3_000.0]),
                (ACCOUNT_BALANCE, vec![1_000.0, 1_000.0, 1_000.0, 1_000.0]),
            ],
        );
        let summary = summarize(&dataset).unwrap();

        assert_eq!(summary.total_customers, 4);
        assert_eq!(summary.churn_rate, 0.5);
        assert_eq!(summary.avg_credit_score, 650.0);
        assert_eq!(summary.avg_loan_amount, 2_025.0);
        assert_eq!(summary.default_rate, 0.5);
    }

    #[test]
    fn test_age_buckets_are_half_open() {
        let dataset = dataset_with(
            6,
            &[
                (AGE, vec![0.0, 30.0, 31.0, 50.0, 70.0, 101.0]),
                (CHURN_LABEL, vec![1.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
            ],
        );
        let table = segment(&dataset, SegmentDimension::Age).unwrap();

        assert_eq!(
            table.labels(),
            vec!["(0, 30]", "(30, 50]", "(50, 70]", "(70, 100]"]
        );
        // Age 0 and age 101 fall outside every bucket.
        let members: Vec<usize> = table.buckets.iter().map(|b| b.members).collect();
        assert_eq!(members, vec![1, 2, 1, 0]);
        assert_eq!(table.get("(0, 30]").unwrap().churn_rate, Some(1.0));
        assert_eq!(table.get("(30, 50]").unwrap().churn_rate, Some(0.5));
        assert_eq!(table.get("(70, 100]").unwrap().churn_rate, None);
    }

    #[test]
    fn test_credit_score_buckets() {
        let dataset = dataset_with(
            3,
            &[
                (CREDIT_SCORE, vec![250.0, 450.0, 850.0]),
                (CHURN_LABEL, vec![0.0, 1.0, 1.0]),
            ],
        );
        let table = segment(&dataset, SegmentDimension::CreditScore).unwrap();

        assert_eq!(table.labels(), vec!["(0, 300]", "(300, 600]", "(600, 850]"]);
        let rates: Vec<Option<f64>> = table.buckets.iter().map(|b| b.churn_rate).collect();
        assert_eq!(rates, vec![Some(0.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_income_buckets_span_observed_range() {
        let incomes = array![10_000.0, 20_000.0, 30_000.0, 40_000.0, 60_000.0];
        let buckets = equal_width_buckets(incomes.view(), INCOME_BUCKETS);

        assert_eq!(buckets.len(), 5);
        assert!((buckets[0].lower - 9_950.0).abs() < 1e-9);
        assert_eq!(buckets[4].upper, 60_000.0);
        assert!(buckets.windows(2).all(|w| w[0].upper == w[1].lower));
        for value in incomes.iter() {
            assert_eq!(buckets.iter().filter(|b| b.contains(*value)).count(), 1);
        }
    }

    #[test]
    fn test_income_buckets_degenerate_range() {
        let incomes = array![42_000.0, 42_000.0];
        let buckets = equal_width_buckets(incomes.view(), INCOME_BUCKETS);

        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets.iter().filter(|b| b.contains(42_000.0)).count(), 1);
        assert!(equal_width_buckets(Array1::<f64>::zeros(0).view(), INCOME_BUCKETS).is_empty());
    }

    #[test]
    fn test_income_labels_stay_distinct_for_narrow_ranges() {
        let incomes = array![0.0001, 0.0002, 0.0003, 0.0004, 0.0005];
        let buckets = equal_width_buckets(incomes.view(), INCOME_BUCKETS);
        let table = SegmentTable {
            buckets: buckets
                .into_iter()
                .map(|bucket| SegmentRate {
                    bucket,
                    members: 1,
                    churn_rate: Some(0.0),
                })
                .collect(),
        };

        let labels = table.labels();
        let unique: std::collections::BTreeSet<&String> = labels.iter().collect();
        assert_eq!(unique.len(), 5);

        let json = serde_json::to_string(&table).unwrap();
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 5);

        assert_eq!(fixed_buckets(&AGE_EDGES)[1].label(), "(30, 50]");
    }

    #[test]
    fn test_rates_within_unit_interval_and_idempotent() {
        let n = 40;
        let ages: Vec<f64> = (0..n).map(|i| 18.0 + (i * 2) as f64).collect();
        let churn: Vec<f64> = ages.iter().map(|a| f64::from(*a > 60.0)).collect();
        let incomes: Vec<f64> = (0..n).map(|i| 20_000.0 + ((i * 37) % 40) as f64 * 1_000.0).collect();
        let dataset = dataset_with(
            n,
            &[(AGE, ages), (CHURN_LABEL, churn), (ANNUAL_INCOME, incomes)],
        );

        let first = analyze_portfolio(&dataset).unwrap();
        let second = analyze_portfolio(&dataset).unwrap();
        assert_eq!(first, second);

        assert!((0.0..=1.0).contains(&first.summary.churn_rate));
        assert!((0.0..=1.0).contains(&first.summary.default_rate));
        for dimension in SegmentDimension::ALL {
            for rate in &first.segmented_analysis.table(dimension).buckets {
                if let Some(value) = rate.churn_rate {
                    assert!((0.0..=1.0).contains(&value));
                }
            }
        }
    }

    #[test]
    fn test_segment_table_serializes_in_bucket_order() {
        let table = SegmentTable {
            buckets: vec![
                SegmentRate {
                    bucket: SegmentBucket::new(0.0, 30.0),
                    members: 2,
                    churn_rate: Some(0.5),
                },
                SegmentRate {
                    bucket: SegmentBucket::new(30.0, 50.0),
                    members: 0,
                    churn_rate: None,
                },
            ],
        };
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"(0, 30]":0.5,"(30, 50]":null}"#);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let dataset =
            CleanedDataset::from_columns(vec![(CHURN_LABEL.to_string(), vec![1.0])]).unwrap();
        assert!(analyze_portfolio(&dataset).is_err());
    }
}
