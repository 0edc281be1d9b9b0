//! Latin hypercube sample for the global stage of the fit.
//!
//! Points sit at the centers of their strata (no jitter inside a stratum) and
//! the stratum permutation of each dimension comes from a fixed-seed RNG, so
//! the same configuration always yields the same sample.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A centered Latin hypercube scaled to a box.
#[derive(Debug, Clone)]
pub struct LatinHypercube {
    points: Array2<f64>,
}

impl LatinHypercube {
    /// Generate `n` points in `lower.len()` dimensions within `[lower, upper]`.
    ///
    /// # Panics
    ///
    /// Panics if `lower` and `upper` differ in length.
    pub fn centered(n: usize, lower: &[f64], upper: &[f64], seed: u64) -> Self {
        assert_eq!(
            lower.len(),
            upper.len(),
            "lower and upper bounds must have the same dimension"
        );
        let dims = lower.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Array2::<f64>::zeros((n, dims));

        for (dim, mut column) in points.axis_iter_mut(Axis(1)).enumerate() {
            let mut strata: Vec<usize> = (0..n).collect();
            strata.shuffle(&mut rng);

            let span = upper[dim] - lower[dim];
            for (value, stratum) in column.iter_mut().zip(strata) {
                let unit = (stratum as f64 + 0.5) / n as f64;
                *value = lower[dim] + unit * span;
            }
        }

        Self { points }
    }

    /// All points, n × dims
    pub fn points(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    pub fn point(&self, index: usize) -> ArrayView1<'_, f64> {
        self.points.row(index)
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }
}
