//! Integration scenarios exercising the full reachability + trajectory
//! pipeline end to end, covering the seed scenarios of spec §8.

use faer::Mat;
use rstest::rstest;

use toppra::E;
use toppra::constraint::acceleration::joint_acceleration_constraint;
use toppra::constraint::contact::contact_stability_constraint;
use toppra::constraint::velocity::joint_velocity_constraint;
use toppra::path::{CubicSplinePath, Path};
use toppra::reachability::ReachabilityAnalysis;
use toppra::trajectory::compute_trajectory_gridpoints;

fn straight_line_path() -> CubicSplinePath {
    let knots = vec![0.0, 1.0];
    let waypoints = Mat::from_fn(2, 1, |i, _| i as E);
    CubicSplinePath::new(knots, waypoints)
}

fn linspace(a: E, b: E, n: usize) -> Vec<E> {
    (0..n).map(|i| a + (b - a) * i as E / (n - 1) as E).collect()
}

/// Scenario (a): straight scalar path, velocity-only constraint.
#[test]
fn velocity_only_straight_path_is_parameterizable() {
    let path = straight_line_path();
    let ss = linspace(0.0, 1.0, 21);
    let constraint = joint_velocity_constraint(&path, &ss, &[1.0]);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    solver.set_goal_interval(0.0).unwrap();

    assert!(solver.solve_controllable_sets(toppra::EPS_K));
    let k = solver.controllable_sets();
    assert_eq!(k.len(), ss.len());
    for iv in &k {
        assert!(iv.low >= -toppra::TINY);
        assert!(iv.high <= 1.0 + toppra::SMALL);
    }

    assert!(solver.solve_reachable_sets());
    let l = solver.reachable_sets();
    assert_eq!(l.len(), ss.len());

    let (u, x) = solver.solve_topp(false, 1e-6).expect("path should be parameterizable");
    assert_eq!(u.len(), ss.len() - 1);
    assert_eq!(x.len(), ss.len());
    assert!(x[0] <= toppra::TINY);
    for &xi in &x {
        assert!(xi >= -toppra::SUPERTINY);
        assert!(xi <= 1.0 + toppra::SMALL);
    }

    // Gridpoint trajectory reconstruction: time strictly increasing and
    // matching the trapezoid-in-sd relation (testable property 6).
    let traj = compute_trajectory_gridpoints(&path, &ss, &u, &x);
    for i in 0..ss.len() - 1 {
        assert!(traj.t[i + 1] > traj.t[i]);
    }
}

/// Scenario (c): a goal interval outside the feasible squared-velocity
/// range must surface as `NotParameterizable`, never a panic or a silently
/// clamped result.
#[test]
fn infeasible_goal_interval_is_reported() {
    let path = straight_line_path();
    let ss = linspace(0.0, 1.0, 11);
    let constraint = joint_velocity_constraint(&path, &ss, &[1.0]);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    // x <= 1 everywhere, so a goal interval centered at 100 is infeasible.
    solver.set_goal_interval((100.0, 100.0)).unwrap();

    let err = solver.solve_topp(false, 1e-6).unwrap_err();
    match err {
        toppra::error::ToppraError::NotParameterizable { .. } => {}
        other => panic!("expected NotParameterizable, got {other:?}"),
    }
}

/// Scenario (b): acceleration-limited rest-to-rest motion produces a
/// feasible, symmetric profile pinned to zero at both ends.
#[test]
fn acceleration_limited_rest_to_rest_is_feasible_and_symmetric_at_boundary() {
    let path = straight_line_path();
    let ss = linspace(0.0, 1.0, 21);
    let constraint = joint_acceleration_constraint(&path, &ss, &[1.0]);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    solver.set_goal_interval(0.0).unwrap();

    assert!(solver.solve_controllable_sets(toppra::EPS_K));
    assert!(solver.solve_reachable_sets());

    let (_, x) = solver.solve_topp(false, 1e-6).expect("rest-to-rest should be feasible");
    assert!(x[0] <= toppra::TINY);
    assert!((x[x.len() - 1]).abs() < 1e-2);
    assert!(x.iter().all(|&xi| xi >= -toppra::SUPERTINY));
}

/// Reachability passes succeed across a range of grid resolutions for the
/// same velocity-only problem.
#[rstest]
#[case(6)]
#[case(11)]
#[case(41)]
fn velocity_only_scales_across_grid_resolutions(#[case] n: usize) {
    let path = straight_line_path();
    let ss = linspace(0.0, 1.0, n);
    let constraint = joint_velocity_constraint(&path, &ss, &[1.0]);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    solver.set_goal_interval(0.0).unwrap();

    assert!(solver.solve_controllable_sets(toppra::EPS_K));
    assert!(solver.solve_reachable_sets());
    assert!(solver.solve_topp(false, 1e-6).is_ok());
}

/// A two-joint path built from distinct waypoint trajectories still
/// parameterizes under a joint velocity constraint (multi-dof sanity
/// check; dof beyond 1 exercises the `max_j` reduction in
/// `joint_velocity_constraint`).
#[test]
fn two_joint_velocity_constraint_is_parameterizable() {
    let knots = vec![0.0, 0.5, 1.0];
    let waypoints = Mat::from_fn(3, 2, |i, j| if j == 0 { i as E } else { (i as E).powi(2) });
    let path = CubicSplinePath::new(knots, waypoints);
    assert_eq!(path.dof(), 2);

    let ss = linspace(0.0, 1.0, 21);
    let constraint = joint_velocity_constraint(&path, &ss, &[2.0, 2.0]);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    solver.set_goal_interval(0.0).unwrap();

    assert!(solver.solve_controllable_sets(toppra::EPS_K));
    assert!(solver.solve_topp(false, 1e-6).is_ok());
}

/// Scenario (d): a single 6-face wrench cone. Checks that the assembled
/// Type-II row count matches the face count and that the start interval
/// projects to a nonempty feasible set at a gravity-supportable stage
/// (here, every stage: the zero wrench trivially satisfies any homogeneous
/// cone, so the torque-balance equality and the cone inequalities are
/// jointly feasible everywhere).
#[test]
fn contact_stability_six_face_wrench_cone_is_feasible() {
    let path = straight_line_path();
    let ss = linspace(0.0, 1.0, 11);
    let n1 = ss.len();

    // Opaque inverse-dynamics stand-ins (dof=1): no velocity/acceleration
    // contribution to joint torque, so the torque-balance equality reduces
    // to `v_torque = J_wrench^T * v_wrench`.
    let decompose: Box<toppra::constraint::torque::InvDynDecompose<'static>> =
        Box::new(|_q: &[E], _qd: &[E]| (vec![0.0], vec![0.0], vec![0.0]));
    let full: Box<toppra::constraint::torque::InvDynFull<'static>> =
        Box::new(|_q: &[E], _qd: &[E], _qdd: &[E]| vec![0.0]);

    // Wrench = [fx, fy, fz, tz]. Six homogeneous faces: a linearized
    // Coulomb friction pyramid on (fx, fy) against the normal force fz
    // (4 faces), plus a linearized torsional-friction cone on tz against
    // fz (2 faces).
    let mu = 1.0;
    let mu_t = 0.5;
    let wrench_faces = Mat::from_fn(6, 4, |r, c| match (r, c) {
        (0, 0) => 1.0,
        (0, 2) => -mu,
        (1, 0) => -1.0,
        (1, 2) => -mu,
        (2, 1) => 1.0,
        (2, 2) => -mu,
        (3, 1) => -1.0,
        (3, 2) => -mu,
        (4, 3) => 1.0,
        (4, 2) => -mu_t,
        (5, 3) => -1.0,
        (5, 2) => -mu_t,
        _ => 0.0,
    });

    // Contact wrench's z-force alone loads the single joint.
    let wrench_jacobians: Vec<Mat<E>> =
        (0..n1).map(|_| Mat::from_fn(1, 4, |_, c| if c == 2 { 1.0 } else { 0.0 })).collect();

    let torque_bnd = [100.0];

    let constraint = contact_stability_constraint(
        &path,
        &ss,
        &decompose,
        &full,
        wrench_jacobians,
        wrench_faces,
        &torque_bnd,
    );
    assert_eq!(constraint.niq(), 6);

    let mut solver = ReachabilityAnalysis::new(&[constraint], false).unwrap();
    solver.set_start_interval(0.0).unwrap();
    solver.set_goal_interval(0.0).unwrap();

    assert!(solver.solve_reachable_sets());
    let l = solver.reachable_sets();
    assert!(!l.is_empty());
    assert!(l[0].low <= l[0].high + toppra::SUPERTINY);
}
