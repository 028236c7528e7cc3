//! Joint acceleration limits: canonical constraint pair `+/-(qs*u + qss*x) - alim <= 0`
//! per joint, since `q-double-dot_j = qs_j(s)*u + qss_j(s)*x`.

use faer::Mat;

use crate::E;
use crate::constraint::PathConstraint;
use crate::path::Path;

/// Builds the canonical constraint encoding `|qs_j(s)*u + qss_j(s)*x| <= alim_j`
/// for every joint `j`, as `2*dof` rows (one upper, one lower bound per joint).
pub fn joint_acceleration_constraint(path: &dyn Path, ss: &[E], alim: &[E]) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(alim.len(), dof, "one acceleration bound per joint is required");

    let qs = path.evald(ss);
    let qss = path.evaldd(ss);
    let n1 = ss.len();
    let nm = 2 * dof;

    let mut a = Mat::<E>::zeros(n1, nm);
    let mut b = Mat::<E>::zeros(n1, nm);
    let mut c = Mat::<E>::zeros(n1, nm);

    for i in 0..n1 {
        for j in 0..dof {
            // Upper row: qs*u + qss*x - alim <= 0.
            a[(i, 2 * j)] = qs[(i, j)];
            b[(i, 2 * j)] = qss[(i, j)];
            c[(i, 2 * j)] = -alim[j];

            // Lower row: -qs*u - qss*x - alim <= 0.
            a[(i, 2 * j + 1)] = -qs[(i, j)];
            b[(i, 2 * j + 1)] = -qss[(i, j)];
            c[(i, 2 * j + 1)] = -alim[j];
        }
    }

    PathConstraint::new(ss.to_vec(), Some((a, b, c)), None, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CubicSplinePath;

    #[test]
    fn straight_line_acceleration_bound_pins_u_only() {
        let knots = vec![0.0, 1.0];
        let waypoints = Mat::from_fn(2, 1, |i, _| i as E);
        let path = CubicSplinePath::new(knots, waypoints);
        let ss: Vec<E> = (0..=4).map(|i| i as E / 4.0).collect();

        let constraint = joint_acceleration_constraint(&path, &ss, &[1.0]);
        assert_eq!(constraint.nm(), 2);
        for i in 0..ss.len() {
            assert!((constraint.a()[(i, 0)] - 1.0).abs() < 1e-9);
            assert!(constraint.b()[(i, 0)].abs() < 1e-9);
            assert!((constraint.c()[(i, 0)] + 1.0).abs() < 1e-9);
        }
    }
}
