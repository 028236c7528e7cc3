//! Joint velocity limits: canonical constraint `x <= vlim^2`, expressed in
//! squared path velocity as the spec's §4.A path derivative scaled by the
//! per-joint velocity bound.
//!
//! `create_velocity_path_constraint` in the original delegates to an
//! optional compiled (Cython) kernel for speed; per the design notes this
//! crate carries only the straightforward native implementation.

use faer::Mat;

use crate::E;
use crate::constraint::PathConstraint;
use crate::path::Path;

/// Builds the canonical constraint `x * max_j(qs_j(s)^2 / vlim_j^2) <= 1` for
/// every joint `j`, i.e. `0*u + x*b(s) + c(s) <= 0` with
/// `b(s) = max_j qs_j(s)^2 / vlim_j^2`, `c(s) = -1`.
pub fn joint_velocity_constraint(path: &dyn Path, ss: &[E], vlim: &[E]) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(vlim.len(), dof, "one velocity bound per joint is required");

    let qs = path.evald(ss);
    let n1 = ss.len();

    let mut b = Mat::<E>::zeros(n1, 1);
    let c = Mat::<E>::from_fn(n1, 1, |_, _| -1.0);
    let a = Mat::<E>::zeros(n1, 1);

    for i in 0..n1 {
        let mut worst = 0.0_f64;
        for j in 0..dof {
            let ratio = (qs[(i, j)] / vlim[j]).powi(2);
            worst = worst.max(ratio);
        }
        b[(i, 0)] = worst;
    }

    PathConstraint::new(ss.to_vec(), Some((a, b, c)), None, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CubicSplinePath;

    #[test]
    fn straight_line_velocity_bound_is_constant() {
        let knots = vec![0.0, 1.0];
        let waypoints = Mat::from_fn(2, 1, |i, _| i as E);
        let path = CubicSplinePath::new(knots, waypoints);
        let ss: Vec<E> = (0..=10).map(|i| i as E / 10.0).collect();

        let constraint = joint_velocity_constraint(&path, &ss, &[1.0]);
        for i in 0..ss.len() {
            assert!((constraint.b()[(i, 0)] - 1.0).abs() < 1e-9);
            assert_eq!(constraint.c()[(i, 0)], -1.0);
        }
    }
}
