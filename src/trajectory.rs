//! Trajectory reconstruction (spec §4.F): gridpoint sampling of the
//! `(ss, u, x)` triple the reachability solver produces, uniform-time
//! resampling, and optional least-squares smoothing that projects the
//! resampled trajectory onto the discrete double-integrator dynamics.

use faer::{Col, Mat};
use problemo::{Problem, ProblemResult};

use crate::E;
use crate::linalg::cholesky::DenseKktSolver;
use crate::linalg::solver::DenseSolver;
use crate::path::Path;

/// Builder for the uniform-time resampling pass: the step `dt` and whether
/// to follow it with least-squares smoothing. Plays the same "plain struct,
/// no solver-variant registry" role here that `SolverOptions` plays for the
/// reachability solver.
pub struct TrajectoryOptions {
    dt: E,
    smooth_eps: Option<E>,
}

impl TrajectoryOptions {
    pub fn new(dt: E) -> Self {
        Self { dt, smooth_eps: None }
    }

    /// Enables the least-squares smoothing pass with the given Tikhonov
    /// weight on consecutive-control differences.
    pub fn with_smoothing(mut self, smooth_eps: E) -> Self {
        self.smooth_eps = Some(smooth_eps);
        self
    }

    /// Resamples `(ss, u, x)` at this builder's `dt`, then smooths if
    /// [`Self::with_smoothing`] was called.
    pub fn build(&self, path: &dyn Path, ss: &[E], u: &[E], x: &[E]) -> Result<Trajectory, Problem> {
        let traj = compute_trajectory_points(path, ss, u, x, self.dt);
        match self.smooth_eps {
            Some(eps) => smooth_trajectory(&traj, self.dt, eps),
            None => Ok(traj),
        }
    }
}

/// A time-sampled trajectory: `t` strictly increasing, `q`/`qd`/`qdd` each
/// `(t.len(), dof)`.
pub struct Trajectory {
    pub t: Vec<E>,
    pub q: Mat<E>,
    pub qd: Mat<E>,
    pub qdd: Mat<E>,
}

/// Builds the gridpoint trajectory directly on the solver's own grid:
/// `sd_i = sqrt(x_i)`, `t` integrated via the trapezoidal relation in `sd`,
/// `sdd` the piecewise-constant `u` extended with its last value at stage N.
pub fn compute_trajectory_gridpoints(path: &dyn Path, ss: &[E], u: &[E], x: &[E]) -> Trajectory {
    let n1 = ss.len();
    let n = n1 - 1;
    assert_eq!(x.len(), n1);
    assert_eq!(u.len(), n);

    let sd: Vec<E> = x.iter().map(|&xi| xi.max(0.0).sqrt()).collect();
    let mut t = vec![0.0; n1];
    for i in 0..n {
        let ds = ss[i + 1] - ss[i];
        t[i + 1] = t[i] + 2.0 * ds / (sd[i] + sd[i + 1]);
    }
    let sdd: Vec<E> = (0..n1).map(|i| if i < n { u[i] } else { u[n - 1] }).collect();

    let q = path.eval(ss);
    let qs = path.evald(ss);
    let qss = path.evaldd(ss);
    let dof = path.dof();

    let qd = Mat::from_fn(n1, dof, |i, j| qs[(i, j)] * sd[i]);
    let qdd = Mat::from_fn(n1, dof, |i, j| qs[(i, j)] * sdd[i] + qss[(i, j)] * sd[i] * sd[i]);

    Trajectory { t, q, qd, qdd }
}

/// Locates the segment `i` such that `t in [ts[i], ts[i+1])`, clamping to
/// the last segment for `t >= ts[N]`.
fn locate_segment(ts: &[E], t: E) -> usize {
    let n = ts.len() - 1;
    if t <= ts[0] {
        return 0;
    }
    if t >= ts[n] {
        return n - 1;
    }
    match ts.binary_search_by(|probe| probe.partial_cmp(&t).unwrap()) {
        Ok(i) => i.min(n - 1),
        Err(i) => i.saturating_sub(1).min(n - 1),
    }
}

/// Resamples the gridpoint trajectory at a uniform time step `dt`, covering
/// `[t_0, t_N]`. Within segment `i`, `u_i` is held piecewise-constant:
/// `sd_k = sd_i + (t - t_i)*u_i`, `s_k = s_i + (x_k - x_i)/(2*u_i)`
/// (falling back to `s_k = s_i + sd_i*(t - t_i)` when `u_i` is ~0).
pub fn compute_trajectory_points(
    path: &dyn Path,
    ss: &[E],
    u: &[E],
    x: &[E],
    dt: E,
) -> Trajectory {
    let grid = compute_trajectory_gridpoints(path, ss, u, x);
    let t0 = grid.t[0];
    let t_n = *grid.t.last().unwrap();
    let n_samples = ((t_n - t0) / dt).floor() as usize + 1;

    let mut t_samples = Vec::with_capacity(n_samples + 1);
    let mut k = 0;
    loop {
        let t = t0 + dt * k as E;
        if t >= t_n {
            break;
        }
        t_samples.push(t);
        k += 1;
    }
    t_samples.push(t_n);

    let sd: Vec<E> = x.iter().map(|&xi| xi.max(0.0).sqrt()).collect();
    let dof = path.dof();
    let n_out = t_samples.len();
    let mut s_samples = vec![0.0; n_out];
    let mut sd_samples = vec![0.0; n_out];
    let mut u_samples = vec![0.0; n_out];

    for (k, &t) in t_samples.iter().enumerate() {
        let i = locate_segment(&grid.t, t);
        let dt_local = t - grid.t[i];
        let ui = u[i];
        let sd_k = sd[i] + dt_local * ui;
        let x_k = sd_k * sd_k;
        let s_k = if ui.abs() > crate::TINY {
            ss[i] + (x_k - x[i]) / (2.0 * ui)
        } else {
            ss[i] + sd[i] * dt_local
        };
        s_samples[k] = s_k;
        sd_samples[k] = sd_k;
        u_samples[k] = ui;
    }

    let q = path.eval(&s_samples);
    let qs = path.evald(&s_samples);
    let qss = path.evaldd(&s_samples);

    let qd = Mat::from_fn(n_out, dof, |i, j| qs[(i, j)] * sd_samples[i]);
    let qdd = Mat::from_fn(n_out, dof, |i, j| {
        qs[(i, j)] * u_samples[i] + qss[(i, j)] * sd_samples[i] * sd_samples[i]
    });

    Trajectory { t: t_samples, q, qd, qdd }
}

/// Precomputed, joint-independent geometry of the smoothing QP: powers of
/// the discrete double-integrator transition `A = [[1,dt],[0,1]]` and the
/// `Phi` matrix mapping stacked per-joint accelerations `u_0..u_{M-1}` to
/// the deviation of `z_1..z_{K-1}` from the zero-input response.
struct SmoothingGeometry {
    /// `a_pow[k]` is `A^k`, a flattened 2x2 row-major matrix.
    a_pow: Vec<[E; 4]>,
    /// `b` = `[dt^2/2, dt]`.
    b: [E; 2],
    /// Number of samples `K`; `M = K - 1` controls.
    k_samples: usize,
}

impl SmoothingGeometry {
    fn new(dt: E, k_samples: usize) -> Self {
        let a = [1.0, dt, 0.0, 1.0];
        let mut a_pow = Vec::with_capacity(k_samples);
        a_pow.push([1.0, 0.0, 0.0, 1.0]);
        for _ in 1..k_samples {
            let prev = a_pow.last().unwrap();
            // prev * a (both row-major 2x2).
            let next = [
                prev[0] * a[0] + prev[1] * a[2],
                prev[0] * a[1] + prev[1] * a[3],
                prev[2] * a[0] + prev[3] * a[2],
                prev[2] * a[1] + prev[3] * a[3],
            ];
            a_pow.push(next);
        }
        Self { a_pow, b: [dt * dt / 2.0, dt], k_samples }
    }

    fn apply_a(&self, pow: usize, z: [E; 2]) -> [E; 2] {
        let a = &self.a_pow[pow];
        [a[0] * z[0] + a[1] * z[1], a[2] * z[0] + a[3] * z[1]]
    }

    fn apply_a_b(&self, pow: usize) -> [E; 2] {
        // A^pow * B.
        self.apply_a(pow, self.b)
    }
}

/// Solves the per-joint smoothing QP: minimize
/// `||Phi*u + Psi*x0 - Xd||^2 + eps*||Delta u||^2` subject to the terminal
/// equality `z_{K-1} = Xd_{K-1}` exactly, where `z_k` evolves under the
/// discrete double integrator `z_{k+1} = A*z_k + B*u_k`.
///
/// Returns the recovered `(q, qd)` states (length `K`) and the optimal
/// control `u` (length `K-1`, duplicated once to produce a length-`K`
/// `qdd` series).
#[allow(non_snake_case)]
fn smooth_joint(
    geom: &SmoothingGeometry,
    q_desired: &[E],
    qd_desired: &[E],
    smooth_eps: E,
) -> Result<(Vec<E>, Vec<E>, Vec<E>), Problem> {
    let k_samples = geom.k_samples;
    let m = k_samples - 1;
    let x0 = [q_desired[0], qd_desired[0]];

    // Phi: (2*(K-1), M). Row-block k (k=1..K-1, row index k-1) has, in
    // column j (j=0..k-1), the 2x1 block A^{k-1-j}*B.
    let phi = Mat::from_fn(2 * m, m, |r, j| {
        let k = r / 2 + 1;
        let comp = r % 2;
        if j <= k - 1 {
            geom.apply_a_b(k - 1 - j)[comp]
        } else {
            0.0
        }
    });

    // r = Psi*x0 - Xd, stacked over k=1..K-1.
    let r = Col::from_fn(2 * m, |idx| {
        let k = idx / 2 + 1;
        let comp = idx % 2;
        let a_x0 = geom.apply_a(k, x0)[comp];
        let desired = if comp == 0 { q_desired[k] } else { qd_desired[k] };
        a_x0 - desired
    });

    // Finite-difference operator D: (M-1, M), (Du)_j = u_j - u_{j-1}.
    let d_rows = m.saturating_sub(1);

    // H = 2*(Phi^T Phi + eps*D^T D), g = 2*Phi^T r.
    let h = Mat::from_fn(m, m, |a, b| {
        let mut acc = 0.0;
        for row in 0..2 * m {
            acc += phi[(row, a)] * phi[(row, b)];
        }
        let mut reg = 0.0;
        if smooth_eps > 0.0 {
            for row in 0..d_rows {
                let da = if row == a { 1.0 } else if row + 1 == a { -1.0 } else { 0.0 };
                let db = if row == b { 1.0 } else if row + 1 == b { -1.0 } else { 0.0 };
                reg += da * db;
            }
        }
        2.0 * (acc + smooth_eps * reg)
    });
    let g = Col::from_fn(m, |a| {
        let mut acc = 0.0;
        for row in 0..2 * m {
            acc += phi[(row, a)] * r[row];
        }
        2.0 * acc
    });

    // Terminal equality: Phi_last*u = Xd_{K-1} - A^{K-1}*x0.
    let a_last = geom.apply_a(k_samples - 1, x0);
    let eq = Mat::from_fn(2, m, |comp, j| phi[(2 * (m - 1) + comp, j)]);
    let b_eq = Col::from_fn(2, |comp| {
        let desired = if comp == 0 { q_desired[k_samples - 1] } else { qd_desired[k_samples - 1] };
        desired - a_last[comp]
    });

    let dim = m + 2;
    let kkt = Mat::from_fn(dim, dim, |row, col| {
        if row < m && col < m {
            h[(row, col)]
        } else if row < m && col >= m {
            eq[(col - m, row)]
        } else if row >= m && col < m {
            eq[(row - m, col)]
        } else {
            0.0
        }
    });
    let rhs = Mat::from_fn(dim, 1, |row, _| {
        if row < m {
            -g[row]
        } else {
            b_eq[row - m]
        }
    });

    let mut solver = DenseKktSolver::new();
    solver.factorize(kkt.as_ref())?;
    let sol = solver.solve(rhs.as_ref())?;
    let u_opt: Vec<E> = (0..m).map(|j| sol[(j, 0)]).collect();

    // Forward-simulate the optimal controls through the exact double
    // integrator to recover states satisfying the dynamics exactly.
    let mut q = vec![0.0; k_samples];
    let mut qd = vec![0.0; k_samples];
    q[0] = x0[0];
    qd[0] = x0[1];
    for j in 0..m {
        let z = [q[j], qd[j]];
        let a_z = geom.apply_a(1, z);
        let b_u = [geom.b[0] * u_opt[j], geom.b[1] * u_opt[j]];
        q[j + 1] = a_z[0] + b_u[0];
        qd[j + 1] = a_z[1] + b_u[1];
    }

    Ok((q, qd, u_opt))
}

/// Runs [`smooth_joint`] independently for every joint, replacing `traj`'s
/// `q`/`qd`/`qdd` in place with the smoothed, dynamics-exact series. `dt`
/// must be the uniform step `traj` was sampled with.
pub fn smooth_trajectory(traj: &Trajectory, dt: E, smooth_eps: E) -> Result<Trajectory, Problem> {
    let k_samples = traj.t.len();
    if k_samples < 2 {
        return Err("trajectory must have at least two samples to smooth".gloss());
    }
    let dof = traj.q.ncols();
    let geom = SmoothingGeometry::new(dt, k_samples);

    let mut q = Mat::<E>::zeros(k_samples, dof);
    let mut qd = Mat::<E>::zeros(k_samples, dof);
    let mut qdd = Mat::<E>::zeros(k_samples, dof);

    for j in 0..dof {
        let q_desired: Vec<E> = (0..k_samples).map(|i| traj.q[(i, j)]).collect();
        let qd_desired: Vec<E> = (0..k_samples).map(|i| traj.qd[(i, j)]).collect();
        let (q_j, qd_j, u_j) = smooth_joint(&geom, &q_desired, &qd_desired, smooth_eps)?;
        for i in 0..k_samples {
            q[(i, j)] = q_j[i];
            qd[(i, j)] = qd_j[i];
        }
        let m = k_samples - 1;
        for i in 0..m {
            qdd[(i, j)] = u_j[i];
        }
        qdd[(m, j)] = u_j[m - 1];
    }

    Ok(Trajectory { t: traj.t.clone(), q, qd, qdd })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CubicSplinePath;

    #[test]
    fn gridpoint_time_is_strictly_increasing_and_matches_trapezoid() {
        let knots = vec![0.0, 1.0];
        let waypoints = Mat::from_fn(2, 1, |i, _| i as E);
        let path = CubicSplinePath::new(knots, waypoints);
        let ss: Vec<E> = (0..=10).map(|i| i as E / 10.0).collect();
        let u = vec![0.0; 10];
        let x = vec![1.0; 11];

        let traj = compute_trajectory_gridpoints(&path, &ss, &u, &x);
        for i in 0..10 {
            assert!(traj.t[i + 1] > traj.t[i]);
            let ds = ss[i + 1] - ss[i];
            let sd_i = x[i].sqrt();
            let sd_ip1 = x[i + 1].sqrt();
            let expected = 2.0 * ds / (sd_i + sd_ip1);
            assert!((traj.t[i + 1] - traj.t[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn smoothing_with_zero_epsilon_reproduces_unsmoothed_trajectory_when_consistent() {
        // Build a trajectory that is already an exact double-integrator
        // rollout, so the smoother (zero eps) should reproduce it within
        // numerical tolerance.
        let dt = 0.1;
        let k_samples = 6;
        let geom = SmoothingGeometry::new(dt, k_samples);
        let u_true = vec![0.3, -0.1, 0.2, 0.05, -0.2];
        let mut q = vec![0.0; k_samples];
        let mut qd = vec![0.0; k_samples];
        for j in 0..k_samples - 1 {
            let z = [q[j], qd[j]];
            let a_z = geom.apply_a(1, z);
            q[j + 1] = a_z[0] + geom.b[0] * u_true[j];
            qd[j + 1] = a_z[1] + geom.b[1] * u_true[j];
        }

        let (q_s, qd_s, _) = smooth_joint(&geom, &q, &qd, 0.0).unwrap();
        for i in 0..k_samples {
            assert!((q_s[i] - q[i]).abs() < 1e-6, "q mismatch at {i}");
            assert!((qd_s[i] - qd[i]).abs() < 1e-6, "qd mismatch at {i}");
        }
    }

    #[test]
    fn smoothed_states_satisfy_double_integrator_exactly() {
        let dt = 0.2;
        let k_samples = 5;
        let geom = SmoothingGeometry::new(dt, k_samples);
        let q_desired = vec![0.0, 0.3, 0.5, 1.1, 1.4];
        let qd_desired = vec![0.0, 1.0, 0.8, 1.5, 0.9];

        let (q, qd, u) = smooth_joint(&geom, &q_desired, &qd_desired, 1e-3).unwrap();
        for k in 0..k_samples - 1 {
            let q_next = q[k] + dt * qd[k] + 0.5 * dt * dt * u[k];
            let qd_next = qd[k] + dt * u[k];
            assert!((q_next - q[k + 1]).abs() < 1e-9);
            assert!((qd_next - qd[k + 1]).abs() < 1e-9);
        }
        // Terminal state pinned exactly.
        assert!((q[k_samples - 1] - q_desired[k_samples - 1]).abs() < 1e-6);
        assert!((qd[k_samples - 1] - qd_desired[k_samples - 1]).abs() < 1e-6);
    }
}
