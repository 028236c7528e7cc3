use faer::{Mat, MatMut, MatRef};
use problemo::Problem;

use crate::E;

/// Trait for dense symmetric linear solvers backing the per-stage KKT systems of the
/// default QP backend.
///
/// Unlike `amadavan-copters`' sparse `Solver` trait (built for large LP/NLP
/// augmented systems with an AMD-permuted symbolic phase), the systems this
/// crate solves are small and dense and change their active set, not their
/// sparsity pattern, between calls: `factorize` and `refactorize` are the
/// same operation, and there is no separate symbolic-analysis phase.
pub trait DenseSolver {
    fn new() -> Self
    where
        Self: Sized;

    /// Factorizes the dense symmetric matrix `mat`. Returns `Ok(())` on success, or an
    /// error if `mat` is not positive definite.
    fn factorize(&mut self, mat: MatRef<E>) -> Result<(), Problem>;

    /// Re-factorizes after the active working set changed; equivalent to `factorize`
    /// for the dense case, kept distinct so callers can express intent.
    fn refactorize(&mut self, mat: MatRef<E>) -> Result<(), Problem> {
        self.factorize(mat)
    }

    /// Solves the linear system in place for the given right-hand side `b`.
    fn solve_in_place(&self, b: &mut MatMut<E>) -> Result<(), Problem>;

    /// Solves the linear system for the given right-hand side `b` and returns the
    /// solution.
    fn solve(&self, b: MatRef<E>) -> Result<Mat<E>, Problem>;
}
