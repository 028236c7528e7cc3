//! Actuator torque limits driven by an opaque inverse-dynamics callback.
//!
//! Joint torque along the path is affine in `(u, x) = (s-double-dot, s-dot^2)`:
//! `tau = t1*u + (t2+t3)*x + t4`, where `(t1,t3,t4)` come from one
//! inverse-dynamics evaluation and `t2` from another, per the calling
//! convention given for `inv_dyn` in the external-interfaces section.

use faer::Mat;

use crate::E;
use crate::constraint::PathConstraint;
use crate::path::Path;

/// `(t1, t3, t4) = inv_dyn(robot, q, qd, qd)`: one inverse-dynamics call with
/// the path velocity substituted in the acceleration slot, decomposing the
/// torque's velocity-independent and velocity-squared terms.
pub type InvDynDecompose<'a> = dyn Fn(&[E], &[E]) -> (Vec<E>, Vec<E>, Vec<E>) + 'a;
/// `t2 = inv_dyn(robot, q, qd, qdd)`: the ordinary inverse-dynamics call.
pub type InvDynFull<'a> = dyn Fn(&[E], &[E], &[E]) -> Vec<E> + 'a;

pub(crate) fn torque_terms_pub(
    path: &dyn Path,
    ss: &[E],
    decompose: &InvDynDecompose,
    full: &InvDynFull,
) -> (Mat<E>, Mat<E>, Mat<E>) {
    let dof = path.dof();
    let n1 = ss.len();
    let q = path.eval(ss);
    let qd = path.evald(ss);
    let qdd = path.evaldd(ss);

    let mut t1 = Mat::<E>::zeros(n1, dof);
    let mut t23 = Mat::<E>::zeros(n1, dof);
    let mut t4 = Mat::<E>::zeros(n1, dof);

    for i in 0..n1 {
        let q_i: Vec<E> = (0..dof).map(|j| q[(i, j)]).collect();
        let qd_i: Vec<E> = (0..dof).map(|j| qd[(i, j)]).collect();
        let qdd_i: Vec<E> = (0..dof).map(|j| qdd[(i, j)]).collect();

        let (d1, d3, d4) = decompose(&q_i, &qd_i);
        let d2 = full(&q_i, &qd_i, &qdd_i);

        for j in 0..dof {
            t1[(i, j)] = d1[j];
            t23[(i, j)] = d2[j] + d3[j];
            t4[(i, j)] = d4[j];
        }
    }

    (t1, t23, t4)
}

/// Builds the canonical `+/-(t1*u + (t2+t3)*x + t4) - torque_bnd <= 0` constraint,
/// `2*dof` rows.
pub fn robot_torque_constraint(
    path: &dyn Path,
    ss: &[E],
    decompose: &InvDynDecompose,
    full: &InvDynFull,
    torque_bnd: &[E],
) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(torque_bnd.len(), dof);
    let (t1, t23, t4) = torque_terms_pub(path, ss, decompose, full);

    let n1 = ss.len();
    let nm = 2 * dof;
    let mut a = Mat::<E>::zeros(n1, nm);
    let mut b = Mat::<E>::zeros(n1, nm);
    let mut c = Mat::<E>::zeros(n1, nm);

    for i in 0..n1 {
        for j in 0..dof {
            a[(i, 2 * j)] = t1[(i, j)];
            b[(i, 2 * j)] = t23[(i, j)];
            c[(i, 2 * j)] = t4[(i, j)] - torque_bnd[j];

            a[(i, 2 * j + 1)] = -t1[(i, j)];
            b[(i, 2 * j + 1)] = -t23[(i, j)];
            c[(i, 2 * j + 1)] = -t4[(i, j)] - torque_bnd[j];
        }
    }

    PathConstraint::new(ss.to_vec(), Some((a, b, c)), None, None, None)
}

/// Builds the Type-I torque constraint through a caller-supplied per-stage
/// null-space basis `null_space[i]` (`neq x dof`, rows spanning the
/// admissible torque directions under loop-closure constraints):
/// `D*t1*u + D*(t2+t3)*x + D*t4 = D*v`, `v` boxed to `[-torque_bnd, torque_bnd]`.
/// `D` is reused both to project the raw torque coefficients onto the
/// admissible subspace and as the Type-I slack-coupling matrix, per
/// `create_rave_re_torque_path_constraint`. Dropped by the distilled spec
/// but present in the original and included as a supplement since it reuses
/// the same `inv_dyn` callback.
pub fn redundant_torque_constraint(
    path: &dyn Path,
    ss: &[E],
    decompose: &InvDynDecompose,
    full: &InvDynFull,
    null_space: Vec<Mat<E>>,
    torque_bnd: &[E],
) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(torque_bnd.len(), dof);
    let (t1, t23, t4) = torque_terms_pub(path, ss, decompose, full);
    let n1 = ss.len();
    assert_eq!(null_space.len(), n1);
    let neq = null_space.first().map(|d| d.nrows()).unwrap_or(0);
    let nv = null_space.first().map(|d| d.ncols()).unwrap_or(0);
    assert_eq!(nv, dof);

    let project = |terms: &Mat<E>| {
        Mat::<E>::from_fn(n1, neq, |i, k| {
            let d_i = &null_space[i];
            let mut acc = 0.0;
            for j in 0..dof {
                acc += d_i[(k, j)] * terms[(i, j)];
            }
            acc
        })
    };
    let abar = project(&t1);
    let bbar = project(&t23);
    let cbar = project(&t4);

    let l = Mat::<E>::from_fn(n1, nv, |_, j| -torque_bnd[j]);
    let h = Mat::<E>::from_fn(n1, nv, |_, j| torque_bnd[j]);

    PathConstraint::new(
        ss.to_vec(),
        None,
        Some((abar, bbar, cbar, null_space)),
        Some((l, h)),
        None,
    )
}
