//! Asset classes, buckets, and the capital-market assumptions they carry.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::error::{Result, ValidationError};
use crate::linalg::CovarianceMatrix;

/// Sub-universe an asset class is optimized in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Bucket {
    Equity,
    Bond,
    Cash,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Equity => write!(f, "equity"),
            Bucket::Bond => write!(f, "bond"),
            Bucket::Cash => write!(f, "cash"),
        }
    }
}

/// One asset class and its row/column in the universe covariance matrix.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetClass {
    pub id: String,
    pub bucket: Bucket,
    pub expected_return: f64,
    pub index: usize,
}

/// Expected returns and covariance restricted to one bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketInputs {
    pub ids: Vec<String>,
    pub expected_returns: Vec<f64>,
    pub covariance: CovarianceMatrix,
}

impl BucketInputs {
    /// Build bucket inputs directly, checking that the pieces line up.
    pub fn new(
        ids: Vec<String>,
        expected_returns: Vec<f64>,
        covariance: CovarianceMatrix,
    ) -> Result<Self> {
        if expected_returns.len() != ids.len() {
            return Err(ValidationError::DimensionMismatch {
                what: "bucket expected returns",
                expected: ids.len(),
                actual: expected_returns.len(),
            });
        }
        if covariance.dim() != ids.len() {
            return Err(ValidationError::DimensionMismatch {
                what: "bucket covariance",
                expected: ids.len(),
                actual: covariance.dim(),
            });
        }
        Ok(Self {
            ids,
            expected_returns,
            covariance,
        })
    }

    /// A bucket with no assets.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            expected_returns: Vec::new(),
            covariance: CovarianceMatrix::empty(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// An ordered set of asset classes with a shared covariance matrix.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetUniverse {
    classes: Vec<AssetClass>,
    covariance: CovarianceMatrix,
}

impl AssetUniverse {
    /// Build a universe from `(id, bucket, expected_return)` rows and a
    /// covariance matrix in the same order.
    pub fn new(
        classes: Vec<(String, Bucket, f64)>,
        covariance: CovarianceMatrix,
    ) -> Result<Self> {
        if covariance.dim() != classes.len() {
            return Err(ValidationError::DimensionMismatch {
                what: "universe covariance",
                expected: classes.len(),
                actual: covariance.dim(),
            });
        }

        let mut seen = FxHashSet::default();
        let mut cash_classes = 0;
        let mut out = Vec::with_capacity(classes.len());
        for (index, (id, bucket, expected_return)) in classes.into_iter().enumerate() {
            if id.trim().is_empty() {
                return Err(ValidationError::EmptyTicker);
            }
            if !seen.insert(id.clone()) {
                return Err(ValidationError::DuplicateTicker(id));
            }
            if !expected_return.is_finite() {
                return Err(ValidationError::NonFiniteInput("expected returns"));
            }
            if bucket == Bucket::Cash {
                cash_classes += 1;
            }
            out.push(AssetClass {
                id,
                bucket,
                expected_return,
                index,
            });
        }
        if cash_classes > 1 {
            return Err(ValidationError::DuplicateCash);
        }

        Ok(Self {
            classes: out,
            covariance,
        })
    }

    /// The standard 12-class universe: six equity styles, five bond
    /// segments, and cash, with long-run expected returns and covariance.
    pub fn standard() -> Self {
        const CLASSES: [(&str, Bucket, f64); 12] = [
            ("large_cap_growth", Bucket::Equity, 0.075),
            ("large_cap_value", Bucket::Equity, 0.070),
            ("small_cap_growth", Bucket::Equity, 0.085),
            ("small_cap_value", Bucket::Equity, 0.080),
            ("developed_market_equity", Bucket::Equity, 0.070),
            ("emerging_market_equity", Bucket::Equity, 0.090),
            ("short_term_treasury", Bucket::Bond, 0.035),
            ("mid_term_treasury", Bucket::Bond, 0.045),
            ("long_term_treasury", Bucket::Bond, 0.047),
            ("corporate_bond", Bucket::Bond, 0.050),
            ("tips", Bucket::Bond, 0.045),
            ("cash", Bucket::Cash, 0.020),
        ];
        #[rustfmt::skip]
        const COV: [[f64; 12]; 12] = [
            [0.036100, 0.024320, 0.036480, 0.033440, 0.027360, 0.033440, -0.000855, -0.001425, -0.002565, -0.001995, -0.001425, -0.000048],
            [0.024320, 0.025600, 0.030720, 0.028160, 0.023040, 0.028160, -0.000720, -0.001200, -0.002160, -0.001680, -0.001200, -0.000040],
            [0.036480, 0.030720, 0.057600, 0.042240, 0.034560, 0.042240, -0.001080, -0.001800, -0.003240, -0.002520, -0.001800, -0.000060],
            [0.033440, 0.028160, 0.042240, 0.048400, 0.031680, 0.038720, -0.000990, -0.001650, -0.002970, -0.002310, -0.001650, -0.000055],
            [0.027360, 0.023040, 0.034560, 0.031680, 0.032400, 0.031680, -0.000810, -0.001350, -0.002430, -0.001890, -0.001350, -0.000045],
            [0.033440, 0.028160, 0.042240, 0.038720, 0.031680, 0.048400, -0.000990, -0.001650, -0.002970, -0.002310, -0.001650, -0.000055],
            [-0.000855, -0.000720, -0.001080, -0.000990, -0.000810, -0.000990, 0.000900, 0.000900, 0.001620, 0.001260, 0.000900, 0.000015],
            [-0.001425, -0.001200, -0.001800, -0.001650, -0.001350, -0.001650, 0.000900, 0.002500, 0.002700, 0.002100, 0.001500, 0.000025],
            [-0.002565, -0.002160, -0.003240, -0.002970, -0.002430, -0.002970, 0.001620, 0.002700, 0.008100, 0.003780, 0.002700, 0.000045],
            [-0.001995, -0.001680, -0.002520, -0.002310, -0.001890, -0.002310, 0.001260, 0.002100, 0.003780, 0.004900, 0.002100, 0.000035],
            [-0.001425, -0.001200, -0.001800, -0.001650, -0.001350, -0.001650, 0.000900, 0.001500, 0.002700, 0.002100, 0.002500, 0.000025],
            [-0.000048, -0.000040, -0.000060, -0.000055, -0.000045, -0.000055, 0.000015, 0.000025, 0.000045, 0.000035, 0.000025, 0.000025],
        ];

        let classes = CLASSES
            .iter()
            .enumerate()
            .map(|(index, &(id, bucket, expected_return))| AssetClass {
                id: id.to_string(),
                bucket,
                expected_return,
                index,
            })
            .collect();
        let covariance =
            CovarianceMatrix::from_rows_unchecked(COV.iter().map(|row| row.to_vec()).collect());

        Self {
            classes,
            covariance,
        }
    }

    /// All classes in universe order.
    pub fn classes(&self) -> &[AssetClass] {
        &self.classes
    }

    /// Full covariance matrix.
    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }

    /// Look up a class by id.
    pub fn class(&self, id: &str) -> Option<&AssetClass> {
        self.classes.iter().find(|c| c.id == id)
    }

    /// The cash class, if the universe has one.
    pub fn cash_class(&self) -> Option<&AssetClass> {
        self.classes.iter().find(|c| c.bucket == Bucket::Cash)
    }

    /// Annualized volatility of a class (square root of its variance).
    pub fn volatility(&self, class: &AssetClass) -> f64 {
        self.covariance.get(class.index, class.index).max(0.0).sqrt()
    }

    /// Expected returns and covariance restricted to one bucket, in universe order.
    pub fn bucket_inputs(&self, bucket: Bucket) -> BucketInputs {
        let members: Vec<&AssetClass> =
            self.classes.iter().filter(|c| c.bucket == bucket).collect();
        let indices: Vec<usize> = members.iter().map(|c| c.index).collect();
        BucketInputs {
            ids: members.iter().map(|c| c.id.clone()).collect(),
            expected_returns: members.iter().map(|c| c.expected_return).collect(),
            covariance: self.covariance.submatrix(&indices),
        }
    }
}
