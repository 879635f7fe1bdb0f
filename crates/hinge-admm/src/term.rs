//! Local ADMM terms and their closed-form minimizers.
//!
//! Each term owns local copies `x` of the consensus variables it touches and
//! one dual `y` per local copy. A local step minimizes
//! `f(x) + ρ/2 ‖x − z + y/ρ‖²` exactly.

use hinge_model::Comparator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermKind {
    /// `weight · max(0, a·x + c)`
    Hinge { weight: f64 },
    /// `weight · max(0, a·x + c)²`
    SquaredHinge { weight: f64 },
    /// Indicator of `a·x + c ⋈ 0`.
    Constraint(Comparator),
}

#[derive(Debug, Clone)]
pub struct AdmmTerm {
    /// Consensus index of each local copy. An index repeats when an atom
    /// occurs more than once in the kernel.
    pub(crate) z_indices: Vec<usize>,
    pub(crate) coeffs: Vec<f64>,
    /// Includes the folded-in contribution of observed atoms.
    pub(crate) constant: f64,
    pub(crate) x: Vec<f64>,
    pub(crate) y: Vec<f64>,
    pub(crate) kind: TermKind,
}

impl AdmmTerm {
    pub(crate) fn new(
        z_indices: Vec<usize>,
        coeffs: Vec<f64>,
        constant: f64,
        kind: TermKind,
        z: &[f64],
    ) -> Self {
        let x = z_indices.iter().map(|&i| z[i]).collect();
        let y = vec![0.0; z_indices.len()];
        Self {
            z_indices,
            coeffs,
            constant,
            x,
            y,
            kind,
        }
    }

    pub fn len(&self) -> usize {
        self.z_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z_indices.is_empty()
    }

    pub fn kind(&self) -> TermKind {
        self.kind
    }

    pub fn duals(&self) -> &[f64] {
        &self.y
    }

    pub fn weight(&self) -> Option<f64> {
        match self.kind {
            TermKind::Hinge { weight } | TermKind::SquaredHinge { weight } => Some(weight),
            TermKind::Constraint(_) => None,
        }
    }

    fn affine(&self, x: &[f64]) -> f64 {
        self.coeffs
            .iter()
            .zip(x)
            .fold(self.constant, |acc, (a, v)| acc + a * v)
    }

    fn norm_sq(&self) -> f64 {
        self.coeffs.iter().map(|a| a * a).sum()
    }

    /// `y += ρ (x − z)`.
    pub(crate) fn update_duals(&mut self, z: &[f64], step: f64) {
        for ((y, x), &i) in self.y.iter_mut().zip(&self.x).zip(&self.z_indices) {
            *y += step * (x - z[i]);
        }
    }

    /// Exact minimization of the local augmented Lagrangian.
    pub(crate) fn minimize(&mut self, z: &[f64], step: f64) {
        for ((x, y), &i) in self.x.iter_mut().zip(&self.y).zip(&self.z_indices) {
            *x = z[i] - y / step;
        }
        let norm_sq = self.norm_sq();
        if norm_sq == 0.0 {
            return;
        }
        let value = self.affine(&self.x);

        match self.kind {
            TermKind::Hinge { weight } => {
                if value <= 0.0 {
                    return;
                }
                // Try the linear side of the hinge first.
                let shift = weight / step;
                let linear_value = value - shift * norm_sq;
                if linear_value >= 0.0 {
                    self.shift_along_coeffs(shift);
                } else {
                    self.shift_along_coeffs(value / norm_sq);
                }
            }
            TermKind::SquaredHinge { weight } => {
                if value <= 0.0 {
                    return;
                }
                let scale = 2.0 * weight * value / (step + 2.0 * weight * norm_sq);
                self.shift_along_coeffs(scale);
            }
            TermKind::Constraint(comparator) => {
                let violated = match comparator {
                    Comparator::Equality => value != 0.0,
                    Comparator::LessEqual => value > 0.0,
                    Comparator::GreaterEqual => value < 0.0,
                };
                if violated {
                    self.shift_along_coeffs(value / norm_sq);
                }
            }
        }
    }

    /// `x −= scale · a`
    fn shift_along_coeffs(&mut self, scale: f64) {
        for (x, a) in self.x.iter_mut().zip(&self.coeffs) {
            *x -= scale * a;
        }
    }

    /// `(Σ (x − z)², Σ x², Σ y²)` for the residual check.
    pub(crate) fn residual_parts(&self, z: &[f64]) -> (f64, f64, f64) {
        let mut primal = 0.0;
        let mut x_sq = 0.0;
        let mut y_sq = 0.0;
        for ((x, y), &i) in self.x.iter().zip(&self.y).zip(&self.z_indices) {
            let d = x - z[i];
            primal += d * d;
            x_sq += x * x;
            y_sq += y * y;
        }
        (primal, x_sq, y_sq)
    }
}
