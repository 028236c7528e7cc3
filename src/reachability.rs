//! The reachability solver (spec §4.E): the backward controllable-set pass,
//! the forward reachable-set pass, and the greedy forward TOPP pass, all
//! threaded through two warm-started [`QpBackend`] instances over the
//! tensors [`assemble`] produces.

use faer::{Col, Mat};
use tracing::{debug, warn};

use crate::error::ToppraError;
use crate::qp::assembly::{self, QpTensors, NOP};
use crate::qp::backend::{DenseActiveSetQp, QpBackend};
use crate::{constraint::PathConstraint, E, EPS_K, INFTY, NWSR_CNST, SUPERTINY, TINY};

/// A closed interval `[low, high]`, always reported with `low <= high`
/// (modulo the `SUPERTINY` numerical slack the spec's invariants allow).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub low: E,
    pub high: E,
}

impl Interval {
    pub fn new(low: E, high: E) -> Self {
        Self { low, high }
    }

    pub fn point(v: E) -> Self {
        Self { low: v, high: v }
    }

    /// `true` when `low > high` beyond the numerical slack, i.e. genuinely
    /// empty rather than a degenerate (single-point) interval.
    pub fn is_empty(&self) -> bool {
        self.low > self.high + SUPERTINY
    }

    fn validate(&self) -> Result<(), ToppraError> {
        if self.low < 0.0 || self.low > self.high {
            return Err(ToppraError::InvalidInterval { low: self.low, high: self.high });
        }
        Ok(())
    }

    /// Placeholder used for controllable/reachable entries not yet (or no
    /// longer) populated; filtered out by the `K`/`L` accessors.
    fn unset() -> Self {
        Self { low: -INFTY, high: -INFTY }
    }
}

impl From<E> for Interval {
    fn from(v: E) -> Self {
        Interval::point(v)
    }
}

impl From<(E, E)> for Interval {
    fn from((low, high): (E, E)) -> Self {
        Interval::new(low, high)
    }
}

/// The reachability solver: owns the assembled per-stage tensors and the
/// two warm-started QP instances (`solver_up` maximizes, `solver_down`
/// minimizes), and runs the three recursions of spec §4.E.
pub struct ReachabilityAnalysis<Q: QpBackend = DenseActiveSetQp> {
    tensors: QpTensors,
    solver_up: Q,
    solver_down: Q,
    i0: Interval,
    i_n: Interval,
    k: Vec<Interval>,
    l: Vec<Interval>,
    slack_vars: Option<Vec<Col<E>>>,
    verbose: bool,
}

impl<Q: QpBackend> ReachabilityAnalysis<Q> {
    /// Validates the common grid across `constraints`, assembles the
    /// per-stage tensors, and allocates the two QP instances.
    pub fn new(constraints: &[PathConstraint], verbose: bool) -> Result<Self, ToppraError> {
        let tensors = assembly::assemble(constraints)?;
        let n1 = tensors.n_stages;
        let solver_up = Q::new(tensors.nV, tensors.nC);
        let solver_down = Q::new(tensors.nV, tensors.nC);

        if verbose {
            debug!(
                n_stages = n1,
                nV = tensors.nV,
                nC = tensors.nC,
                "reachability solver assembled"
            );
        }

        let default_interval = Interval::new(0.0, crate::DEFAULT_INTERVAL_WIDTH);
        Ok(Self {
            tensors,
            solver_up,
            solver_down,
            i0: default_interval,
            i_n: default_interval,
            k: vec![Interval::unset(); n1],
            l: vec![Interval::unset(); n1],
            slack_vars: None,
            verbose,
        })
    }

    pub fn n_stages(&self) -> usize {
        self.tensors.n_stages
    }

    pub fn set_start_interval(&mut self, v: impl Into<Interval>) -> Result<(), ToppraError> {
        let iv = v.into();
        iv.validate()?;
        self.i0 = iv;
        Ok(())
    }

    pub fn set_goal_interval(&mut self, v: impl Into<Interval>) -> Result<(), ToppraError> {
        let iv = v.into();
        iv.validate()?;
        self.i_n = iv;
        Ok(())
    }

    /// Controllable sets with `low >= -TINY`, i.e. entries a backward pass
    /// actually populated (unset placeholders are filtered out).
    pub fn controllable_sets(&self) -> Vec<Interval> {
        self.k.iter().copied().filter(|iv| iv.low >= -TINY).collect()
    }

    /// Reachable sets with `low >= -TINY`.
    pub fn reachable_sets(&self) -> Vec<Interval> {
        self.l.iter().copied().filter(|iv| iv.low >= -TINY).collect()
    }

    /// Per-stage slack solutions from the most recent
    /// `solve_topp(save_solutions=true, ..)`, if any.
    pub fn slack_vars(&self) -> Option<&[Col<E>]> {
        self.slack_vars.as_deref()
    }

    /// Zeroes the operational rows (top [`NOP`] rows of every stage's `A`,
    /// `lA`, `hA`) plus the working objective baseline. Every primitive
    /// kind must follow a reset before it writes its own operational rows.
    fn reset_operational_rows(&mut self) {
        for i in 0..self.tensors.n_stages {
            for r in 0..NOP {
                for c in 0..self.tensors.nV {
                    self.tensors.A[i][(r, c)] = 0.0;
                }
                self.tensors.lA[i][r] = -INFTY;
                self.tensors.hA[i][r] = INFTY;
            }
        }
        self.tensors.h_base = Mat::<E>::zeros(self.tensors.nV, self.tensors.nV);
        self.tensors.g_base = Col::<E>::zeros(self.tensors.nV);
    }

    fn log_failure(&self, op: &str, i: usize, xmin: E, xmax: E, init: bool) {
        warn!(op, stage = i, xmin, xmax, warm_start = !init, "QP primitive failed");
    }

    /// Primitive 1: the one-step predecessor set of `[xmin, xmax]` at stage `i`.
    fn one_step(&mut self, i: usize, xmin: E, xmax: E, init: bool) -> Option<Interval> {
        let ds = self.tensors.ds[i];
        self.tensors.A[i][(0, 1)] = 1.0;
        self.tensors.A[i][(0, 0)] = 2.0 * ds;
        self.tensors.lA[i][0] = xmin;
        self.tensors.hA[i][0] = xmax;

        let h_base = self.tensors.h_base.clone();
        let mut g = self.tensors.g_base.clone();
        g[1] = -1.0;
        let status_up = self.call(&h_base, &g, i, init, true);
        g[1] = 1.0;
        let status_down = self.call(&h_base, &g, i, init, false);

        if !status_up.is_successful() || !status_down.is_successful() {
            self.log_failure("one_step", i, xmin, xmax, init);
            return None;
        }
        let xmax_i = self.solver_up.get_primal()[1];
        let xmin_i = self.solver_down.get_primal()[1];
        Some(Interval::new(xmin_i, xmax_i))
    }

    /// Primitive 2: max/min of `x + 2*Ds_i*u` subject to `xmin <= x <= xmax`.
    fn reach(&mut self, i: usize, xmin: E, xmax: E, init: bool) -> Option<(E, E)> {
        let ds = self.tensors.ds[i];
        self.tensors.A[i][(0, 1)] = 1.0;
        self.tensors.A[i][(0, 0)] = 0.0;
        self.tensors.lA[i][0] = xmin;
        self.tensors.hA[i][0] = xmax;

        let h_base = self.tensors.h_base.clone();
        let mut g = self.tensors.g_base.clone();
        g[0] = -2.0 * ds;
        g[1] = -1.0;
        let status_up = self.call(&h_base, &g, i, init, true);
        g[0] = 2.0 * ds;
        g[1] = 1.0;
        let status_down = self.call(&h_base, &g, i, init, false);

        if !status_up.is_successful() || !status_down.is_successful() {
            self.log_failure("reach", i, xmin, xmax, init);
            return None;
        }
        let p_up = self.solver_up.get_primal();
        let p_down = self.solver_down.get_primal();
        let xmax_i = p_up[1] + 2.0 * ds * p_up[0];
        let xmin_i = p_down[1] + 2.0 * ds * p_down[0];
        Some((xmin_i, xmax_i))
    }

    /// Primitive 3: project `[xmin, xmax]` back onto the feasible set of `x`
    /// at stage `i`.
    fn proj_x_admissible(&mut self, i: usize, xmin: E, xmax: E, init: bool) -> Option<Interval> {
        self.tensors.A[i][(0, 1)] = 1.0;
        self.tensors.A[i][(0, 0)] = 0.0;
        self.tensors.lA[i][0] = xmin;
        self.tensors.hA[i][0] = xmax;

        let h_base = self.tensors.h_base.clone();
        let mut g = self.tensors.g_base.clone();
        g[0] = 0.0;
        g[1] = -1.0;
        let status_up = self.call(&h_base, &g, i, init, true);
        g[1] = 1.0;
        let status_down = self.call(&h_base, &g, i, init, false);

        if !status_up.is_successful() || !status_down.is_successful() {
            self.log_failure("proj_x_admissible", i, xmin, xmax, init);
            return None;
        }
        let mut xmax_i = self.solver_up.get_primal()[1];
        let xmin_i = self.solver_down.get_primal()[1];
        debug_assert!(xmin_i <= xmax_i + SUPERTINY);
        if xmin_i > xmax_i {
            xmax_i = xmin_i;
        }
        Some(Interval::new(xmin_i, xmax_i))
    }

    /// Primitive 4: the forward TOPP step. Maximizes `u` subject to `x`
    /// pinned to `x` and `x + 2*Ds_i*u` bounded by `[xmin, xmax]`.
    fn greedy_step(
        &mut self,
        i: usize,
        x: E,
        xmin: E,
        xmax: E,
        init: bool,
        reg: E,
    ) -> Option<(E, E)> {
        self.tensors.lA[i][0] = x;
        self.tensors.hA[i][0] = x;
        self.tensors.lA[i][1] = xmin;
        self.tensors.hA[i][1] = xmax;

        let mut g = self.tensors.g_base.clone();
        g[0] = -1.0;
        let mut h = self.tensors.h_base.clone();
        let nv = self.tensors.nV - 2;
        if nv > 0 {
            for k in 0..nv {
                h[(2 + k, 2 + k)] += reg;
            }
        }

        let status = self.call(&h, &g, i, init, true);
        if !status.is_successful() {
            self.log_failure("greedy_step", i, xmin, xmax, init);
            return None;
        }
        let primal = self.solver_up.get_primal();
        let u = primal[0];
        let mut x_next = x + 2.0 * self.tensors.ds[i] * u;
        debug_assert!(x_next + SUPERTINY >= 0.0);
        if x_next < 0.0 {
            x_next += SUPERTINY;
        }
        Some((u, x_next))
    }

    /// Symmetric counterpart of [`Self::greedy_step`], minimizing `u`
    /// instead of maximizing it. Implemented per spec §9's open question,
    /// intentionally not wired into any of the three public passes.
    pub fn least_greedy_step(
        &mut self,
        i: usize,
        x: E,
        xmin: E,
        xmax: E,
        init: bool,
        reg: E,
    ) -> Option<(E, E)> {
        self.reset_operational_rows();
        self.tensors.A[i][(0, 0)] = 0.0;
        self.tensors.A[i][(0, 1)] = 1.0;
        self.tensors.lA[i][0] = x;
        self.tensors.hA[i][0] = x;
        self.tensors.A[i][(1, 0)] = 2.0 * self.tensors.ds[i];
        self.tensors.A[i][(1, 1)] = 1.0;
        self.tensors.lA[i][1] = xmin;
        self.tensors.hA[i][1] = xmax;

        let mut g = self.tensors.g_base.clone();
        g[0] = 1.0;
        let mut h = self.tensors.h_base.clone();
        let nv = self.tensors.nV - 2;
        if nv > 0 {
            for k in 0..nv {
                h[(2 + k, 2 + k)] += reg;
            }
        }

        let status = self.call(&h, &g, i, init, true);
        if !status.is_successful() {
            self.log_failure("least_greedy_step", i, xmin, xmax, init);
            return None;
        }
        let primal = self.solver_up.get_primal();
        let u = primal[0];
        let mut x_next = x + 2.0 * self.tensors.ds[i] * u;
        if x_next < 0.0 {
            x_next += SUPERTINY;
        }
        Some((u, x_next))
    }

    fn call(&mut self, h: &Mat<E>, g: &Col<E>, i: usize, init: bool, up: bool) -> crate::qp::backend::QpStatus {
        let a = &self.tensors.A[i];
        let l = &self.tensors.l[i];
        let h_bounds = &self.tensors.h[i];
        let la = &self.tensors.lA[i];
        let ha = &self.tensors.hA[i];
        let solver = if up { &mut self.solver_up } else { &mut self.solver_down };
        if init {
            solver.init(h, g, a, l, h_bounds, la, ha, NWSR_CNST)
        } else {
            solver.hotstart(h, g, a, l, h_bounds, la, ha, NWSR_CNST)
        }
    }

    /// Backward pass: populates the controllable sets `K`.
    pub fn solve_controllable_sets(&mut self, eps: E) -> bool {
        self.reset_operational_rows();
        let n = self.tensors.n_stages - 1;
        match self.proj_x_admissible(n, self.i_n.low, self.i_n.high, true) {
            None => {
                warn!("failed to project the goal interval to feasibility");
                return false;
            }
            Some(iv) => self.k[n] = iv,
        }

        for i in (0..n).rev() {
            let init = i == n - 1;
            let (klow, khigh) = (self.k[i + 1].low, self.k[i + 1].high);
            match self.one_step(i, klow, khigh, init) {
                None => {
                    warn!(stage = i, "controllable set K(i) computation failed");
                    return false;
                }
                Some(mut iv) => {
                    iv.high -= eps;
                    iv.low = iv.low.max(0.0);
                    self.k[i] = iv;
                }
            }
        }
        if self.verbose {
            debug!(k0_low = self.k[0].low, k0_high = self.k[0].high, "controllable sets computed");
        }
        true
    }

    /// Forward pass: populates the reachable sets `L`.
    pub fn solve_reachable_sets(&mut self) -> bool {
        self.reset_operational_rows();
        match self.proj_x_admissible(0, self.i0.low, self.i0.high, true) {
            None => {
                warn!("failed to project the start interval to feasibility");
                return false;
            }
            Some(iv) => self.l[0] = iv,
        }

        for i in 0..self.tensors.n_stages - 1 {
            let init = i <= 1;
            let (llow, lhigh) = (self.l[i].low, self.l[i].high);
            let Some((xmin_nx, xmax_nx)) = self.reach(i, llow, lhigh, init) else {
                warn!(stage = i, "forward propagation from L(i) failed");
                return false;
            };
            match self.proj_x_admissible(i + 1, xmin_nx, xmax_nx, init) {
                None => {
                    warn!(stage = i + 1, "projection for L(i) failed");
                    return false;
                }
                Some(iv) => self.l[i + 1] = iv,
            }
        }
        true
    }

    /// Forward TOPP pass. Re-runs the backward controllable-set pass (as
    /// the original implementation does) to check the `NotParameterizable`
    /// precondition before computing the greedy forward profile.
    pub fn solve_topp(&mut self, save_solutions: bool, reg: E) -> Result<(Vec<E>, Vec<E>), ToppraError> {
        let controllable_sets_ok = self.solve_controllable_sets(EPS_K);
        let start_in_k0 = controllable_sets_ok
            && !(self.k[0].high < self.i0.low || self.k[0].low > self.i0.high);

        if !controllable_sets_ok || !start_in_k0 {
            return Err(ToppraError::NotParameterizable { controllable_sets_ok, start_in_k0 });
        }

        let n = self.tensors.n_stages - 1;
        self.reset_operational_rows();
        for i in 0..self.tensors.n_stages {
            self.tensors.A[i][(0, 1)] = 1.0;
            self.tensors.A[i][(0, 0)] = 0.0;
            self.tensors.A[i][(1, 1)] = 1.0;
            if i < n {
                self.tensors.A[i][(1, 0)] = 2.0 * self.tensors.ds[i];
            }
        }

        let mut xs = vec![0.0; n + 1];
        let mut us = vec![0.0; n];
        let mut slack_vars = if save_solutions { Some(Vec::with_capacity(n)) } else { None };

        xs[0] = self.k[0].high.min(self.i0.high);
        // Warm-start call: re-initializes the solver after the operational
        // row *structure* changed from the K/L passes; its result is thrown away.
        let _ = self.greedy_step(0, xs[0], self.k[1].low, self.k[1].high, true, reg);

        for i in 0..n {
            let (klow, khigh) = (self.k[i + 1].low, self.k[i + 1].high);
            match self.greedy_step(i, xs[i], klow, khigh, false, reg) {
                None => {
                    return Err(ToppraError::QpSolveFailed {
                        stage: i,
                        xmin: klow,
                        xmax: khigh,
                        warm_start: true,
                    });
                }
                Some((u, x_next)) => {
                    us[i] = u;
                    xs[i + 1] = x_next;
                    if let Some(store) = slack_vars.as_mut() {
                        let primal = self.solver_up.get_primal();
                        let nv = self.tensors.nV - 2;
                        store.push(Col::from_fn(nv, |k| primal[2 + k]));
                    }
                }
            }
        }

        if save_solutions {
            self.slack_vars = slack_vars;
        }
        Ok((us, xs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A two-segment solver (ss=[0,1,2], Ds=1 everywhere) with a single
    /// canonical constraint packing `x <= 1`, `u <= 1`, `u >= -1` — enough
    /// to bound every primitive's optimum without a slack.
    fn bounded_solver() -> ReachabilityAnalysis<DenseActiveSetQp> {
        let ss = vec![0.0, 1.0, 2.0];
        let n1 = ss.len();
        let a = Mat::from_fn(n1, 3, |_, r| match r {
            1 => 1.0,
            2 => -1.0,
            _ => 0.0,
        });
        let b = Mat::from_fn(n1, 3, |_, r| if r == 0 { 1.0 } else { 0.0 });
        let c = Mat::from_fn(n1, 3, |_, _| -1.0);
        let pc = PathConstraint::new(ss, Some((a, b, c)), None, None, None);
        ReachabilityAnalysis::new(&[pc], false).unwrap()
    }

    #[test]
    fn reset_operational_rows_zeroes_scratch_rows_and_baseline() {
        let mut solver = bounded_solver();
        solver.tensors.A[0][(0, 0)] = 7.0;
        solver.tensors.lA[0][0] = 3.0;
        solver.tensors.hA[0][0] = 4.0;
        solver.tensors.h_base[(0, 0)] = 9.0;
        solver.tensors.g_base[0] = 5.0;

        solver.reset_operational_rows();

        for i in 0..solver.tensors.n_stages {
            for r in 0..NOP {
                for c in 0..solver.tensors.nV {
                    assert_eq!(solver.tensors.A[i][(r, c)], 0.0);
                }
                assert_eq!(solver.tensors.lA[i][r], -INFTY);
                assert_eq!(solver.tensors.hA[i][r], INFTY);
            }
        }
        assert_eq!(solver.tensors.h_base[(0, 0)], 0.0);
        assert_eq!(solver.tensors.g_base[0], 0.0);
    }

    #[test]
    fn one_step_respects_the_canonical_x_bound() {
        let mut solver = bounded_solver();
        solver.reset_operational_rows();
        let iv = solver.one_step(0, 0.0, 1.0, true).expect("feasible predecessor set");
        assert!((iv.high - 1.0).abs() < 1e-6);
        assert!(iv.low.abs() < 1e-6);
    }

    #[test]
    fn reach_maximizes_and_minimizes_the_one_step_image() {
        let mut solver = bounded_solver();
        solver.reset_operational_rows();
        // x in [0,1], u in [-1,1], Ds=1: max(x+2u)=1+2=3, min(x+2u)=0-2=-2.
        let (xmin, xmax) = solver.reach(0, 0.0, 1.0, true).expect("feasible reach image");
        assert!((xmax - 3.0).abs() < 1e-6);
        assert!((xmin - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn proj_x_admissible_intersects_with_the_canonical_bound() {
        let mut solver = bounded_solver();
        solver.reset_operational_rows();
        let iv = solver
            .proj_x_admissible(0, -1.0, 2.0, true)
            .expect("feasible projection");
        assert!(iv.low.abs() < 1e-6);
        assert!((iv.high - 1.0).abs() < 1e-6);
    }

    #[test]
    fn greedy_step_maximizes_u_within_the_predecessor_window() {
        let mut solver = bounded_solver();
        solver.reset_operational_rows();
        // greedy_step only rewrites the operational *bounds*; the pinning
        // structure of A (written once per solve_topp call, see §4.E) must
        // already be in place.
        let ds = solver.tensors.ds[0];
        solver.tensors.A[0][(0, 1)] = 1.0;
        solver.tensors.A[0][(0, 0)] = 0.0;
        solver.tensors.A[0][(1, 1)] = 1.0;
        solver.tensors.A[0][(1, 0)] = 2.0 * ds;

        // x=0.5 pinned; x+2u in [0,3] => u in [-0.25, 1.25], capped by u<=1.
        let (u, x_next) = solver.greedy_step(0, 0.5, 0.0, 3.0, true, 0.0).expect("feasible step");
        assert!((u - 1.0).abs() < 1e-6);
        assert!((x_next - 2.5).abs() < 1e-6);
    }

    #[test]
    fn backward_forward_and_topp_passes_agree_on_this_bounded_problem() {
        let mut solver = bounded_solver();
        solver.set_start_interval(0.0).unwrap();
        solver.set_goal_interval(0.0).unwrap();

        assert!(solver.solve_controllable_sets(EPS_K));
        assert!(solver.solve_reachable_sets());
        let (u, x) = solver.solve_topp(false, 1e-6).expect("bounded problem is parameterizable");
        assert_eq!(u.len(), 2);
        assert_eq!(x.len(), 3);
        assert!(x[0].abs() < 1e-6);
        for &xi in &x {
            assert!(xi >= -SUPERTINY);
            assert!(xi <= 1.0 + TINY);
        }
    }
}
