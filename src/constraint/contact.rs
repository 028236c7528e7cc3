//! Contact-stability constraints: the full Type-I/Type-II wrench-cone
//! formulation (`create_full_contact_path_constraint`) and a reduced,
//! canonical-only center-of-mass formulation
//! (`create_pymanoid_contact_stability_path_constraint`), included as a
//! supplement since it demonstrates the Canonical-only contact case used in
//! the seed tests.

use faer::Mat;

use crate::E;
use crate::constraint::PathConstraint;
use crate::constraint::torque::{InvDynDecompose, InvDynFull};
use crate::path::Path;

/// Builds the full contact-stability constraint: a Type-I torque-balance
/// equality `t1*u + (t2+t3)*x + t4 = v_torque - J_wrench^T * v_wrench`
/// (slack `v = [v_torque; v_wrench]`, `D[i] = [eye(dof), -J_wrench[i]^T]`)
/// bounding `v_torque` in `[-torque_bnd, torque_bnd]` via the slack box, plus
/// a Type-II linearized wrench-cone inequality `wrench_faces * v_wrench <= 0`
/// on `v_wrench`.
pub fn contact_stability_constraint(
    path: &dyn Path,
    ss: &[E],
    decompose: &InvDynDecompose,
    full: &InvDynFull,
    wrench_jacobians: Vec<Mat<E>>,
    wrench_faces: Mat<E>,
    torque_bnd: &[E],
) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(torque_bnd.len(), dof);
    let n1 = ss.len();
    assert_eq!(wrench_jacobians.len(), n1);
    let nw = wrench_faces.ncols();
    let niq = wrench_faces.nrows();
    let nv = dof + nw;

    let (t1, t23, t4) =
        crate::constraint::torque::torque_terms_pub(path, ss, decompose, full);

    let abar = t1;
    let bbar = t23;
    let cbar = t4;

    let D: Vec<Mat<E>> = wrench_jacobians
        .iter()
        .map(|jw| {
            assert_eq!(jw.nrows(), dof);
            assert_eq!(jw.ncols(), nw);
            Mat::from_fn(dof, nv, |r, c| {
                if c < dof {
                    if r == c { 1.0 } else { 0.0 }
                } else {
                    -jw[(r, c - dof)]
                }
            })
        })
        .collect();

    let l = Mat::<E>::from_fn(n1, nv, |_, c| {
        if c < dof { -torque_bnd[c] } else { -crate::INFTY }
    });
    let h = Mat::<E>::from_fn(n1, nv, |_, c| {
        if c < dof { torque_bnd[c] } else { crate::INFTY }
    });

    let G: Vec<Mat<E>> = (0..n1)
        .map(|_| {
            Mat::from_fn(niq, nv, |r, c| {
                if c < dof { 0.0 } else { wrench_faces[(r, c - dof)] }
            })
        })
        .collect();
    let lG = Mat::<E>::from_fn(n1, niq, |_, _| -crate::INFTY);
    let hG = Mat::<E>::zeros(n1, niq);

    PathConstraint::new(
        ss.to_vec(),
        None,
        Some((abar, bbar, cbar, D)),
        Some((l, h)),
        Some((G, lG, hG)),
    )
}

/// Builds the reduced, canonical-only contact-stability constraint from a
/// center-of-mass path: `wrench_face[k] . (com_acc(s) + gravity) <= lim[k]`
/// for each linearized support-polygon face `k`, where
/// `com_acc(s) = evald(s)*u + evaldd(s)*x`.
pub fn reduced_contact_stability_constraint(
    path: &dyn Path,
    ss: &[E],
    mass: E,
    wrench_face: Mat<E>,
    lim: &[E],
    gravity: &[E],
) -> PathConstraint {
    let dof = path.dof();
    assert_eq!(wrench_face.ncols(), dof);
    let niq = wrench_face.nrows();
    assert_eq!(lim.len(), niq);
    assert_eq!(gravity.len(), dof);

    let qs = path.evald(ss);
    let qss = path.evaldd(ss);
    let n1 = ss.len();

    let mut a = Mat::<E>::zeros(n1, niq);
    let mut b = Mat::<E>::zeros(n1, niq);
    let mut c = Mat::<E>::zeros(n1, niq);

    for i in 0..n1 {
        for k in 0..niq {
            let mut dot_qs = 0.0;
            let mut dot_qss = 0.0;
            let mut dot_g = 0.0;
            for j in 0..dof {
                dot_qs += wrench_face[(k, j)] * qs[(i, j)];
                dot_qss += wrench_face[(k, j)] * qss[(i, j)];
                dot_g += wrench_face[(k, j)] * gravity[j];
            }
            a[(i, k)] = mass * dot_qs;
            b[(i, k)] = mass * dot_qss;
            c[(i, k)] = mass * dot_g - lim[k];
        }
    }

    PathConstraint::new(ss.to_vec(), Some((a, b, c)), None, None, None)
}
