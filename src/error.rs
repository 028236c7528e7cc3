//! Error taxonomy for the reachability solver.
//!
//! Mirrors the error-handling idiom used throughout the rest of the crate's
//! lineage: a `derive_more`-backed enum carrying the specific failure.
//! Lower-level plumbing (`linalg::cholesky`) instead surfaces ad hoc
//! failures directly as a [`problemo::Problem`] via `.gloss()`, since there
//! is no richer variant set worth naming at that layer.

use derive_more::{Display, Error};

/// Failures the reachability solver can report.
///
/// `NumericalClamp` situations (K_i.high clamped by `EPS_K`, K_i.low
/// clamped to zero, a slightly negative `x_next` pushed up to `SUPERTINY`)
/// are not represented here: they are intentional, silent corrections, not
/// errors.
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum ToppraError {
    /// A start/goal interval endpoint was negative, or `low > high`.
    #[display("invalid interval [{low}, {high}]: expected 0 <= low <= high")]
    InvalidInterval { low: f64, high: f64 },

    /// Two constraints in the same set were discretized on different grids.
    #[display("constraint grid mismatch: max |ss_a - ss_b| = {max_abs_diff:e}")]
    GridMismatch { max_abs_diff: f64 },

    /// A constraint set was empty, or referenced a grid with fewer than 2 points.
    #[display("constraint set is empty or its grid has fewer than 2 points")]
    DegenerateGrid,

    /// One of the two per-stage QP solves did not return a successful status.
    #[display(
        "QP solve failed at stage {stage} (warm_start={warm_start}): xmin={xmin:e}, xmax={xmax:e}"
    )]
    QpSolveFailed {
        stage: usize,
        xmin: f64,
        xmax: f64,
        warm_start: bool,
    },

    /// `solve_topp` was called but the backward pass found no admissible path.
    #[display(
        "path is not time-parameterizable: controllable_sets_ok={controllable_sets_ok}, start_in_k0={start_in_k0}"
    )]
    NotParameterizable {
        controllable_sets_ok: bool,
        start_in_k0: bool,
    },
}
