//! Time-optimal path parameterization by reachability analysis (TOPP-RA).
//!
//! Given a geometric path in joint space and a set of second-order path
//! constraints (actuator limits, kinodynamic bounds, contact stability),
//! this crate computes the fastest traversal of that path that respects
//! every constraint. The core algorithm discretizes the path parameter onto
//! a grid and threads a sequence of small, warm-started quadratic programs
//! through three recursions: a backward pass for the controllable sets, a
//! forward pass for the reachable sets, and a greedy forward pass producing
//! the time-optimal control profile.
//!
//! Robot dynamics, geometric path interpolation beyond the bundled spline,
//! and the numerical internals of the QP backend are all swappable via
//! traits; this crate owns only the reachability recursions and the
//! constraint/QP bookkeeping around them.

pub mod constraint;
pub mod error;
pub mod linalg;
pub mod path;
pub mod qp;
pub mod reachability;
pub mod trajectory;

/// Floating-point element type used throughout the crate.
pub type E = f64;
/// Index type used for sizes and offsets.
pub type I = usize;

/// Working-set recalculation budget `nWSR` passed to the QP backend on
/// every `init`/`hotstart` call.
pub const NWSR_CNST: I = 1000;

/// Guards against over-reporting the controllable-set boundary by a hair;
/// subtracted from `K_i.high` after each backward step.
pub const EPS_K: E = 1e-14;

/// Comparisons against zero beyond this margin are treated as genuine
/// violations rather than numerical noise.
pub const SUPERTINY: E = 1e-16;
/// General-purpose small tolerance (interval feasibility, grid equality).
pub const TINY: E = 1e-8;
/// Margin used to decide whether a controllable/reachable row is reported.
pub const SMALL: E = 1e-5;
/// Stand-in for +/- infinity in QP bounds.
pub const INFTY: E = 1e8;
/// Default half-width of the start/goal squared-velocity interval.
pub const DEFAULT_INTERVAL_WIDTH: E = 1e-4;
