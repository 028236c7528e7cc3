//! The opaque QP-solver capability of spec §6 (`init`/`hotstart`/`getPrimal`
//! over a distinguished-success status), and the crate's own concrete,
//! dense implementation of it.
//!
//! `amadavan-copters` solves large sparse QPs/LPs with a Mehrotra
//! predictor-corrector interior-point method (`qp/mpc`), backed by AMD-permuted
//! sparse Cholesky. The systems here are the opposite shape: tiny (nV is a
//! handful of columns), dense, and structurally static across a `hotstart`
//! call (only the operational rows' values change, not the active set's
//! sparsity pattern) — a better fit is the primal active-set method (Nocedal
//! & Wright, *Numerical Optimization*, ch. 16), which this module implements
//! directly over [`DenseKktSolver`]'s dense LU KKT solves rather than
//! adapting the teacher's interior-point machinery.

use faer::{Col, Mat};

use crate::E;
use crate::linalg::cholesky::DenseKktSolver;
use crate::linalg::solver::DenseSolver;

/// Tiny Tikhonov damping added to every KKT direction-finding solve so that
/// free (as yet unconstrained) primal directions under a zero or
/// rank-deficient `H` still yield a well-posed system. Vanishingly small
/// relative to [`crate::TINY`]; never changes which constraints end up
/// active at convergence.
const KKT_REG: E = 1e-10;

/// Status returned by a QP solve. `Successful` is the distinguished value
/// spec §6 requires of the opaque backend; the reachability solver treats
/// anything else as a failed primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    Successful,
    Infeasible,
    MaxIterationsReached,
}

impl QpStatus {
    pub fn is_successful(self) -> bool {
        matches!(self, QpStatus::Successful)
    }
}

/// The opaque QP-solver capability spec §6 consumes: `init`/`hotstart`
/// advance the solver's internal state and return a status; `get_primal`
/// reads back the `nV`-length primal solution of the last solve.
///
/// Problem form: `min 1/2 y^T H y + g^T y` s.t. `lA <= A y <= hA`,
/// `l <= y <= h`.
pub trait QpBackend {
    /// Allocates a new instance sized for `n_vars` primal variables and
    /// `n_cons` general rows.
    fn new(n_vars: usize, n_cons: usize) -> Self
    where
        Self: Sized;

    /// Cold-starts the solver: no assumption is made about the previous
    /// solution or active set.
    #[allow(clippy::too_many_arguments)]
    fn init(
        &mut self,
        h: &Mat<E>,
        g: &Col<E>,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
        nwsr: usize,
    ) -> QpStatus;

    /// Warm-starts from the previous call's primal solution.
    #[allow(clippy::too_many_arguments)]
    fn hotstart(
        &mut self,
        h: &Mat<E>,
        g: &Col<E>,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
        nwsr: usize,
    ) -> QpStatus;

    /// The `nV`-length primal of the most recent solve.
    fn get_primal(&self) -> Col<E>;
}

/// One unified `coeffs^T y <= rhs` row, built from either a general `A` row
/// or a variable bound. `equality` rows are pinned permanently into the
/// working set and never dropped by the active-set iteration.
struct Row {
    coeffs: Col<E>,
    rhs: E,
    equality: bool,
}

impl Row {
    fn value(&self, y: &Col<E>) -> E {
        let mut acc = 0.0;
        for i in 0..y.nrows() {
            acc += self.coeffs[i] * y[i];
        }
        acc
    }
}

/// The crate's default [`QpBackend`]: a dense primal active-set QP solver.
///
/// Rather than persisting a factorization object across `hotstart` calls
/// (as a true qpOASES-style backend would), this implementation re-derives
/// an initial working set from the warm-started primal point on every call.
/// That is a simplification of the "stateful factorization" ownership model
/// spec §5 describes, traded for implementation clarity given how small
/// these per-stage systems are; see `DESIGN.md`.
pub struct DenseActiveSetQp {
    n_vars: usize,
    n_cons: usize,
    y: Col<E>,
    has_warm_start: bool,
}

impl DenseActiveSetQp {
    fn clamp_to_bounds(&self, l: &Col<E>, h: &Col<E>) -> Col<E> {
        Col::from_fn(self.n_vars, |i| {
            if self.has_warm_start {
                self.y[i].clamp(l[i].max(-crate::INFTY), h[i].min(crate::INFTY))
            } else if l[i] > -crate::INFTY {
                l[i]
            } else if h[i] < crate::INFTY {
                h[i]
            } else {
                0.0
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_rows(
        &self,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
    ) -> Vec<Row> {
        let mut rows = Vec::with_capacity(2 * (self.n_cons + self.n_vars));
        for r in 0..self.n_cons {
            let lo = la[r];
            let hi = ha[r];
            let coeffs_upper = Col::from_fn(self.n_vars, |j| a[(r, j)]);
            if (hi - lo).abs() < crate::TINY {
                rows.push(Row { coeffs: coeffs_upper, rhs: hi, equality: true });
                continue;
            }
            if hi < crate::INFTY {
                rows.push(Row { coeffs: coeffs_upper.clone(), rhs: hi, equality: false });
            }
            if lo > -crate::INFTY {
                let coeffs_lower = Col::from_fn(self.n_vars, |j| -a[(r, j)]);
                rows.push(Row { coeffs: coeffs_lower, rhs: -lo, equality: false });
            }
        }
        for j in 0..self.n_vars {
            let lo = l[j];
            let hi = h_bounds[j];
            if (hi - lo).abs() < crate::TINY {
                let coeffs = Col::from_fn(self.n_vars, |k| if k == j { 1.0 } else { 0.0 });
                rows.push(Row { coeffs, rhs: hi, equality: true });
                continue;
            }
            if hi < crate::INFTY {
                let coeffs = Col::from_fn(self.n_vars, |k| if k == j { 1.0 } else { 0.0 });
                rows.push(Row { coeffs, rhs: hi, equality: false });
            }
            if lo > -crate::INFTY {
                let coeffs = Col::from_fn(self.n_vars, |k| if k == j { -1.0 } else { 0.0 });
                rows.push(Row { coeffs, rhs: -lo, equality: false });
            }
        }
        rows
    }

    /// Solves the equality-constrained direction-finding KKT system for the
    /// rows currently in the working set `active`, returning `(p, lambda)`.
    fn solve_direction(
        &self,
        h: &Mat<E>,
        g: &Col<E>,
        y: &Col<E>,
        rows: &[Row],
        active: &[usize],
    ) -> Option<(Col<E>, Col<E>)> {
        let n = self.n_vars;
        let m = active.len();
        let dim = n + m;

        let grad = Col::from_fn(n, |i| {
            let mut acc = g[i];
            for j in 0..n {
                acc += h[(i, j)] * y[j];
            }
            acc
        });

        let kkt = Mat::from_fn(dim, dim, |r, c| {
            if r < n && c < n {
                h[(r, c)] + if r == c { KKT_REG } else { 0.0 }
            } else if r < n && c >= n {
                rows[active[c - n]].coeffs[r]
            } else if r >= n && c < n {
                rows[active[r - n]].coeffs[c]
            } else {
                0.0
            }
        });
        let rhs = Mat::from_fn(dim, 1, |r, _| if r < n { -grad[r] } else { 0.0 });

        let mut solver = DenseKktSolver::new();
        solver.factorize(kkt.as_ref()).ok()?;
        let sol = solver.solve(rhs.as_ref()).ok()?;

        let p = Col::from_fn(n, |i| sol[(i, 0)]);
        let lambda = Col::from_fn(m, |i| sol[(n + i, 0)]);
        Some((p, lambda))
    }

    fn run(
        &mut self,
        h: &Mat<E>,
        g: &Col<E>,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
        nwsr: usize,
    ) -> QpStatus {
        let rows = self.build_rows(a, l, h_bounds, la, ha);
        let mut y = self.clamp_to_bounds(l, h_bounds);

        let mut active: Vec<usize> = (0..rows.len())
            .filter(|&r| rows[r].equality || (rows[r].rhs - rows[r].value(&y)).abs() < crate::TINY)
            .collect();

        let mut budget = nwsr;
        let status = loop {
            if budget == 0 {
                break QpStatus::MaxIterationsReached;
            }
            let Some((p, lambda)) = self.solve_direction(h, g, &y, &rows, &active) else {
                tracing::warn!("dense active-set QP: singular KKT system, aborting solve");
                break QpStatus::Infeasible;
            };

            let p_norm = (0..self.n_vars).map(|i| p[i].abs()).fold(0.0, E::max);
            if p_norm < crate::TINY {
                let mut worst: Option<(usize, E)> = None;
                for (k, &r) in active.iter().enumerate() {
                    if rows[r].equality {
                        continue;
                    }
                    let lam = lambda[k];
                    if lam < -crate::TINY && worst.map(|(_, w)| lam < w).unwrap_or(true) {
                        worst = Some((k, lam));
                    }
                }
                match worst {
                    Some((k, _)) => {
                        active.remove(k);
                        continue;
                    }
                    None => break QpStatus::Successful,
                }
            }

            let mut alpha = 1.0;
            let mut blocking: Option<usize> = None;
            for (r, row) in rows.iter().enumerate() {
                if active.contains(&r) {
                    continue;
                }
                let a_p = row.value(&Col::from_fn(self.n_vars, |i| p[i]));
                if a_p > crate::TINY {
                    let slack = row.rhs - row.value(&y);
                    let candidate = slack / a_p;
                    if candidate < alpha {
                        alpha = candidate;
                        blocking = Some(r);
                    }
                }
            }
            alpha = alpha.max(0.0);

            for i in 0..self.n_vars {
                y[i] += alpha * p[i];
            }
            if let Some(r) = blocking {
                active.push(r);
            }
            budget -= 1;
        };

        if status == QpStatus::Successful {
            let infeasible = rows.iter().any(|r| r.value(&y) - r.rhs > crate::SMALL);
            self.y = y;
            self.has_warm_start = true;
            if infeasible {
                QpStatus::Infeasible
            } else {
                QpStatus::Successful
            }
        } else {
            self.y = y;
            self.has_warm_start = true;
            status
        }
    }
}

impl QpBackend for DenseActiveSetQp {
    fn new(n_vars: usize, n_cons: usize) -> Self {
        Self {
            n_vars,
            n_cons,
            y: Col::zeros(n_vars),
            has_warm_start: false,
        }
    }

    fn init(
        &mut self,
        h: &Mat<E>,
        g: &Col<E>,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
        nwsr: usize,
    ) -> QpStatus {
        self.has_warm_start = false;
        self.run(h, g, a, l, h_bounds, la, ha, nwsr)
    }

    fn hotstart(
        &mut self,
        h: &Mat<E>,
        g: &Col<E>,
        a: &Mat<E>,
        l: &Col<E>,
        h_bounds: &Col<E>,
        la: &Col<E>,
        ha: &Col<E>,
        nwsr: usize,
    ) -> QpStatus {
        self.run(h, g, a, l, h_bounds, la, ha, nwsr)
    }

    fn get_primal(&self) -> Col<E> {
        self.y.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximizes_x_under_a_box() {
        // max x s.t. 0 <= x <= 5, -10 <= u <= 10 (u irrelevant to objective).
        let h = Mat::<E>::zeros(2, 2);
        let g = Col::from_fn(2, |i| if i == 1 { -1.0 } else { 0.0 });
        let a = Mat::<E>::zeros(1, 2);
        let l = Col::from_fn(2, |i| if i == 0 { -10.0 } else { 0.0 });
        let hb = Col::from_fn(2, |i| if i == 0 { 10.0 } else { 5.0 });
        let la = Col::from_fn(1, |_| -crate::INFTY);
        let ha = Col::from_fn(1, |_| crate::INFTY);

        let mut qp = DenseActiveSetQp::new(2, 1);
        let status = qp.init(&h, &g, &a, &l, &hb, &la, &ha, 100);
        assert!(status.is_successful());
        let primal = qp.get_primal();
        assert!((primal[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn respects_a_general_inequality_row() {
        // max x s.t. x <= 2*u, u <= 1, x >= 0 -> x* = 2.
        let h = Mat::<E>::zeros(2, 2);
        let g = Col::from_fn(2, |i| if i == 1 { -1.0 } else { 0.0 });
        let a = Mat::from_fn(1, 2, |_, j| if j == 0 { -2.0 } else { 1.0 });
        let l = Col::from_fn(2, |_| 0.0);
        let hb = Col::from_fn(2, |i| if i == 0 { 1.0 } else { crate::INFTY });
        let la = Col::from_fn(1, |_| -crate::INFTY);
        let ha = Col::from_fn(1, |_| 0.0);

        let mut qp = DenseActiveSetQp::new(2, 1);
        let status = qp.init(&h, &g, &a, &l, &hb, &la, &ha, 100);
        assert!(status.is_successful());
        let primal = qp.get_primal();
        assert!((primal[1] - 2.0).abs() < 1e-6);
        assert!((primal[0] - 1.0).abs() < 1e-6);
    }
}
