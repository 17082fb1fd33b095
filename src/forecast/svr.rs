//! Epsilon-insensitive support-vector regression with a linear kernel.
//!
//! Solves the libsvm dual
//!
//!   min 1/2 a'Qa + p'a   s.t.  y'a = 0,  0 <= a_t <= C
//!
//! over 2n variables (one pair per observation) with SMO and second-order
//! working-set selection. The bias is not regularized, so a single point or a
//! constant series is fitted exactly.
//!
//! Inputs are scaled into [0, 1] before the kernel is built and the weight is
//! mapped back afterwards. The cost C therefore applies in scaled units.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};

/// Curvature floor for non-positive-definite pairs.
const TAU: f64 = 1e-12;

/// Lower bound on the SMO iteration budget.
const MIN_ITERATIONS: usize = 100_000;

/// Hyperparameters of the regressor. Defaults match libsvm's epsilon-SVR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvrParams {
    /// Regularization constant C.
    pub cost: f64,
    /// Half-width of the insensitive tube.
    pub epsilon: f64,
    /// Stopping tolerance on the KKT violation.
    pub tolerance: f64,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            cost: 1.0,
            epsilon: 0.1,
            tolerance: 1e-3,
        }
    }
}

impl SvrParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.cost > 0.0) || !self.cost.is_finite() {
            return Err(StatsError::InvalidInput(format!(
                "SVR cost must be a positive number, got {}",
                self.cost
            )));
        }
        if !(self.epsilon >= 0.0) || !self.epsilon.is_finite() {
            return Err(StatsError::InvalidInput(format!(
                "SVR epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(StatsError::InvalidInput(format!(
                "SVR tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// A fitted linear-kernel regressor: f(x) = weight * x + bias.
#[derive(Debug, Clone, PartialEq)]
pub struct SvrModel {
    pub weight: f64,
    pub bias: f64,
    /// Observations with a non-zero dual coefficient.
    pub support_vectors: usize,
    pub iterations: usize,
    /// False if the iteration budget ran out before the tolerance was met.
    pub converged: bool,
}

impl SvrModel {
    pub fn predict(&self, x: f64) -> f64 {
        self.weight * x + self.bias
    }
}

/// SMO state over the 2n dual variables.
///
/// Variable t < n is the "+" copy of observation t, variable t >= n the "-"
/// copy of observation t - n.
struct Solver {
    n: usize,
    kernel: DMatrix<f64>,
    alpha: Vec<f64>,
    grad: Vec<f64>,
    cost: f64,
    tolerance: f64,
}

impl Solver {
    fn len(&self) -> usize {
        2 * self.n
    }

    fn sign(&self, t: usize) -> f64 {
        if t < self.n {
            1.0
        } else {
            -1.0
        }
    }

    fn q(&self, i: usize, j: usize) -> f64 {
        self.sign(i) * self.sign(j) * self.kernel[(i % self.n, j % self.n)]
    }

    fn qd(&self, i: usize) -> f64 {
        let k = i % self.n;
        self.kernel[(k, k)]
    }

    fn is_upper(&self, t: usize) -> bool {
        self.alpha[t] >= self.cost
    }

    fn is_lower(&self, t: usize) -> bool {
        self.alpha[t] <= 0.0
    }

    /// Second-order working-set selection. Returns None once the maximal
    /// KKT violation drops below the tolerance.
    fn select_working_set(&self) -> Option<(usize, usize)> {
        let mut gmax = f64::NEG_INFINITY;
        let mut gmax2 = f64::NEG_INFINITY;
        let mut gmax_idx = None;

        for t in 0..self.len() {
            if self.sign(t) > 0.0 {
                if !self.is_upper(t) && -self.grad[t] >= gmax {
                    gmax = -self.grad[t];
                    gmax_idx = Some(t);
                }
            } else if !self.is_lower(t) && self.grad[t] >= gmax {
                gmax = self.grad[t];
                gmax_idx = Some(t);
            }
        }

        let i = gmax_idx?;
        let mut gmin_idx = None;
        let mut obj_diff_min = f64::INFINITY;

        for j in 0..self.len() {
            let grad_diff = if self.sign(j) > 0.0 {
                if self.is_lower(j) {
                    continue;
                }
                gmax2 = gmax2.max(self.grad[j]);
                gmax + self.grad[j]
            } else {
                if self.is_upper(j) {
                    continue;
                }
                gmax2 = gmax2.max(-self.grad[j]);
                gmax - self.grad[j]
            };

            if grad_diff > 0.0 {
                let quad = self.qd(i) + self.qd(j) - 2.0 * self.sign(i) * self.sign(j) * self.q(i, j);
                let quad = if quad > 0.0 { quad } else { TAU };
                let obj_diff = -(grad_diff * grad_diff) / quad;
                if obj_diff <= obj_diff_min {
                    gmin_idx = Some(j);
                    obj_diff_min = obj_diff;
                }
            }
        }

        if gmax + gmax2 < self.tolerance {
            return None;
        }
        gmin_idx.map(|j| (i, j))
    }

    /// Analytically optimize the pair (i, j) and refresh the gradient.
    fn update_pair(&mut self, i: usize, j: usize) {
        let c = self.cost;
        let q_ij = self.q(i, j);
        let old_i = self.alpha[i];
        let old_j = self.alpha[j];

        if self.sign(i) != self.sign(j) {
            let quad = self.qd(i) + self.qd(j) + 2.0 * q_ij;
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (-self.grad[i] - self.grad[j]) / quad;
            let diff = old_i - old_j;
            let (mut ai, mut aj) = (old_i + delta, old_j + delta);

            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
            self.alpha[i] = ai;
            self.alpha[j] = aj;
        } else {
            let quad = self.qd(i) + self.qd(j) - 2.0 * q_ij;
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (self.grad[i] - self.grad[j]) / quad;
            let sum = old_i + old_j;
            let (mut ai, mut aj) = (old_i - delta, old_j + delta);

            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
            self.alpha[i] = ai;
            self.alpha[j] = aj;
        }

        let delta_i = self.alpha[i] - old_i;
        let delta_j = self.alpha[j] - old_j;
        for k in 0..self.len() {
            self.grad[k] += self.q(i, k) * delta_i + self.q(j, k) * delta_j;
        }
    }

    /// Offset rho of the decision function f(x) = sum(beta * K) - rho.
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_count = 0usize;
        let mut free_sum = 0.0;

        for t in 0..self.len() {
            let y_grad = self.sign(t) * self.grad[t];
            let positive = self.sign(t) > 0.0;
            if self.is_upper(t) {
                if positive {
                    lower = lower.max(y_grad);
                } else {
                    upper = upper.min(y_grad);
                }
            } else if self.is_lower(t) {
                if positive {
                    upper = upper.min(y_grad);
                } else {
                    lower = lower.max(y_grad);
                }
            } else {
                free_count += 1;
                free_sum += y_grad;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

/// Fit f(x) = w*x + b to the pairs (x_i, y_i).
pub fn fit(x: &[f64], y: &[f64], params: &SvrParams) -> Result<SvrModel> {
    params.validate()?;
    if x.len() != y.len() {
        return Err(StatsError::InvalidInput(format!(
            "SVR inputs differ in length: {} samples, {} targets",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    if n == 0 {
        return Err(StatsError::InsufficientData(
            "SVR needs at least one sample".to_string(),
        ));
    }

    let scale = input_scale(x);
    let samples = DVector::from_iterator(n, x.iter().map(|xi| xi / scale));
    let kernel = &samples * samples.transpose();

    // p_t = epsilon - y_t for the "+" copies, epsilon + y_t for the "-" copies
    let grad: Vec<f64> = (0..2 * n)
        .map(|t| {
            if t < n {
                params.epsilon - y[t]
            } else {
                params.epsilon + y[t - n]
            }
        })
        .collect();

    let mut solver = Solver {
        n,
        kernel,
        alpha: vec![0.0; 2 * n],
        grad,
        cost: params.cost,
        tolerance: params.tolerance,
    };

    let max_iterations = MIN_ITERATIONS.max(200 * n);
    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < max_iterations {
        match solver.select_working_set() {
            Some((i, j)) => solver.update_pair(i, j),
            None => {
                converged = true;
                break;
            }
        }
        iterations += 1;
    }

    let betas: Vec<f64> = (0..n)
        .map(|t| solver.alpha[t] - solver.alpha[t + n])
        .collect();
    let weight: f64 = betas.iter().zip(samples.iter()).map(|(beta, xi)| beta * xi).sum::<f64>() / scale;
    let support_vectors = betas.iter().filter(|b| **b != 0.0).count();
    let bias = -solver.rho();

    Ok(SvrModel {
        weight,
        bias,
        support_vectors,
        iterations,
        converged,
    })
}

/// Largest input magnitude, or 1 when every input is zero.
fn input_scale(x: &[f64]) -> f64 {
    let max = x.iter().fold(0.0_f64, |acc, xi| acc.max(xi.abs()));
    if max > 0.0 {
        max
    } else {
        1.0
    }
}
