//! Geometric path capability: `eval`/`evald`/`evaldd` over an array of path
//! parameters, consumed opaquely by the constraint builders and trajectory
//! reconstruction.

use faer::Mat;

use crate::E;

/// A geometric path q(s) in joint space, defined on `[s_bounds().0, s_bounds().1]`
/// and continuous through its second derivative on the open interval.
///
/// Mirrors the three pure operations `amadavan-copters`' `linalg` layer
/// exposes over dense data (`faer::Mat`-shaped in, `faer::Mat`-shaped out):
/// no interior state is mutated by evaluation.
pub trait Path {
    /// Degrees of freedom (number of joints).
    fn dof(&self) -> usize;

    /// Inclusive domain of the path parameter.
    fn s_bounds(&self) -> (E, E);

    /// q(s) for every s in `s`. Returns a `(s.len(), dof)` matrix.
    fn eval(&self, s: &[E]) -> Mat<E>;

    /// dq/ds for every s in `s`. Returns a `(s.len(), dof)` matrix.
    fn evald(&self, s: &[E]) -> Mat<E>;

    /// d^2q/ds^2 for every s in `s`. Returns a `(s.len(), dof)` matrix.
    fn evaldd(&self, s: &[E]) -> Mat<E>;
}

/// Per-joint natural cubic spline through a set of waypoints, used as the
/// default concrete [`Path`] when no richer geometric path is supplied.
///
/// The original implementation delegated this to `scipy`'s spline
/// interpolator; per spec design notes (the optional-fast-path guidance
/// given for the velocity constraint applies here too), this crate carries
/// a straightforward native implementation: one natural cubic spline per
/// joint, each solved via a tridiagonal (Thomas algorithm) system for the
/// second derivatives at the knots.
pub struct CubicSplinePath {
    knots: Vec<E>,
    dof: usize,
    /// Second derivative of each joint's spline at every knot, flattened
    /// `knots.len() * dof` with joint-major stride `knots.len()`.
    second_derivs: Vec<E>,
    values: Vec<E>,
}

impl CubicSplinePath {
    /// Builds a natural cubic spline through `waypoints` (`(knots.len(), dof)`,
    /// row `i` is q(knots[i])). `knots` must be strictly increasing with at
    /// least two entries.
    pub fn new(knots: Vec<E>, waypoints: Mat<E>) -> Self {
        assert!(knots.len() >= 2, "a spline needs at least two knots");
        assert_eq!(waypoints.nrows(), knots.len());
        for w in knots.windows(2) {
            assert!(w[1] > w[0], "knots must be strictly increasing");
        }

        let n = knots.len();
        let dof = waypoints.ncols();
        let mut values = vec![0.0; n * dof];
        for i in 0..n {
            for j in 0..dof {
                values[j * n + i] = waypoints[(i, j)];
            }
        }

        let mut second_derivs = vec![0.0; n * dof];
        for j in 0..dof {
            let y = &values[j * n..(j + 1) * n];
            let m = natural_spline_second_derivatives(&knots, y);
            second_derivs[j * n..(j + 1) * n].copy_from_slice(&m);
        }

        Self {
            knots,
            dof,
            second_derivs,
            values,
        }
    }

    fn segment(&self, s: E) -> usize {
        let n = self.knots.len();
        if s <= self.knots[0] {
            return 0;
        }
        if s >= self.knots[n - 1] {
            return n - 2;
        }
        match self
            .knots
            .binary_search_by(|k| k.partial_cmp(&s).unwrap())
        {
            Ok(i) => i.min(n - 2),
            Err(i) => i.saturating_sub(1).min(n - 2),
        }
    }

    fn eval_joint(&self, j: usize, s: E, order: usize) -> E {
        let n = self.knots.len();
        let i = self.segment(s);
        let y = &self.values[j * n..(j + 1) * n];
        let m = &self.second_derivs[j * n..(j + 1) * n];

        let s_i = self.knots[i];
        let h = self.knots[i + 1] - s_i;
        let t = s - s_i;

        let a = (m[i + 1] - m[i]) / (6.0 * h);
        let b = m[i] / 2.0;
        let c = (y[i + 1] - y[i]) / h - h * (2.0 * m[i] + m[i + 1]) / 6.0;
        let d = y[i];

        match order {
            0 => a * t.powi(3) + b * t.powi(2) + c * t + d,
            1 => 3.0 * a * t.powi(2) + 2.0 * b * t + c,
            2 => 6.0 * a * t + 2.0 * b,
            _ => unreachable!("order must be 0, 1, or 2"),
        }
    }

    fn eval_order(&self, s: &[E], order: usize) -> Mat<E> {
        Mat::from_fn(s.len(), self.dof, |i, j| self.eval_joint(j, s[i], order))
    }
}

impl Path for CubicSplinePath {
    fn dof(&self) -> usize {
        self.dof
    }

    fn s_bounds(&self) -> (E, E) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    fn eval(&self, s: &[E]) -> Mat<E> {
        self.eval_order(s, 0)
    }

    fn evald(&self, s: &[E]) -> Mat<E> {
        self.eval_order(s, 1)
    }

    fn evaldd(&self, s: &[E]) -> Mat<E> {
        self.eval_order(s, 2)
    }
}

/// Solves for the natural-boundary (M_0 = M_n = 0) second derivatives of a
/// single-joint cubic spline via the standard tridiagonal system.
fn natural_spline_second_derivatives(knots: &[E], y: &[E]) -> Vec<E> {
    let n = knots.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    let h: Vec<E> = knots.windows(2).map(|w| w[1] - w[0]).collect();

    // Thomas algorithm on the interior rows; M_0 = M_n-1 = 0 by construction.
    let mut c_prime = vec![0.0; n - 2];
    let mut d_prime = vec![0.0; n - 2];

    for i in 1..n - 1 {
        let k = i - 1;
        let diag = 2.0 * (h[i - 1] + h[i]);
        let rhs = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);

        let lower = h[i - 1];
        let upper = h[i];

        if k == 0 {
            c_prime[k] = upper / diag;
            d_prime[k] = rhs / diag;
        } else {
            let denom = diag - lower * c_prime[k - 1];
            c_prime[k] = upper / denom;
            d_prime[k] = (rhs - lower * d_prime[k - 1]) / denom;
        }
    }

    let mut interior = vec![0.0; n - 2];
    let last = n - 3;
    interior[last] = d_prime[last];
    for k in (0..last).rev() {
        interior[k] = d_prime[k] - c_prime[k] * interior[k + 1];
    }

    m[1..n - 1].copy_from_slice(&interior);
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_a_straight_line_exactly() {
        let knots = vec![0.0, 1.0, 2.0, 3.0];
        let waypoints = Mat::from_fn(4, 1, |i, _| knots[i] * 2.0 + 1.0);
        let path = CubicSplinePath::new(knots, waypoints);

        let s = [0.25, 1.5, 2.75];
        let q = path.eval(&s);
        let qs = path.evald(&s);
        let qss = path.evaldd(&s);

        for i in 0..s.len() {
            assert!((q[(i, 0)] - (2.0 * s[i] + 1.0)).abs() < 1e-9);
            assert!((qs[(i, 0)] - 2.0).abs() < 1e-9);
            assert!(qss[(i, 0)].abs() < 1e-9);
        }
    }

    #[test]
    fn endpoints_match_waypoints() {
        let knots = vec![0.0, 0.5, 1.0];
        let waypoints = Mat::from_fn(3, 2, |i, j| (i as E) + (j as E) * 0.1);
        let path = CubicSplinePath::new(knots.clone(), waypoints.clone());

        let q = path.eval(&knots);
        for i in 0..3 {
            for j in 0..2 {
                assert!((q[(i, j)] - waypoints[(i, j)]).abs() < 1e-9);
            }
        }
    }
}
