//! Covariance-weighted deviation of current weights from target weights.

use crate::book::PositionBook;
use crate::error::{Result, ValidationError};
use crate::linalg::CovarianceMatrix;
use crate::types::{Dollars, Shares};

/// Tracking-error model over one book and its ticker covariance.
///
/// Cash never enters the quadratic form: `diff` only covers non-cash
/// positions, so a cash overweight shows up indirectly through the
/// securities being underweight.
#[derive(Clone, Copy, Debug)]
pub struct TrackingErrorModel<'a> {
    book: &'a PositionBook,
    covariance: &'a CovarianceMatrix,
}

impl<'a> TrackingErrorModel<'a> {
    /// Pair a book with its covariance. The matrix must be
    /// `book.len() x book.len()`, rows aligned with book order.
    pub fn new(book: &'a PositionBook, covariance: &'a CovarianceMatrix) -> Result<Self> {
        if covariance.dim() != book.len() {
            return Err(ValidationError::DimensionMismatch {
                what: "ticker covariance",
                expected: book.len(),
                actual: covariance.dim(),
            });
        }
        Ok(Self { book, covariance })
    }

    #[inline]
    pub fn book(&self) -> &'a PositionBook {
        self.book
    }

    #[inline]
    pub fn covariance(&self) -> &'a CovarianceMatrix {
        self.covariance
    }

    /// `diff' Sigma diff` with `diff = current - target` over non-cash weights.
    pub fn tracking_error_squared(&self, quantities: &[Shares], cash: Dollars) -> f64 {
        let (weights, _) = self.book.weights(quantities, cash);
        let diff: Vec<f64> = weights
            .iter()
            .zip(self.book.securities())
            .map(|(w, p)| w - p.target_weight)
            .collect();
        // Rounding can push an exact-zero form a hair negative.
        self.covariance.quad_form(&diff).max(0.0)
    }

    /// Square root of [`tracking_error_squared`](Self::tracking_error_squared).
    pub fn tracking_error(&self, quantities: &[Shares], cash: Dollars) -> f64 {
        self.tracking_error_squared(quantities, cash).sqrt()
    }

    /// Change in TE² from selling one dollar of security `i` into cash.
    pub(crate) fn marginal_sale_per_dollar(
        &self,
        quantities: &[Shares],
        cash: Dollars,
        i: usize,
    ) -> f64 {
        let before = self.tracking_error_squared(quantities, cash);
        let mut after = quantities.to_vec();
        after[i] -= 1.0 / self.book.securities()[i].price;
        self.tracking_error_squared(&after, cash + 1.0) - before
    }
}
