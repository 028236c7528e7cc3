//! Dense factorization backing the default QP backend's KKT solves.
//!
//! `amadavan-copters`'s [`SimplicialSparseCholesky`]/`SupernodalSparseCholesky`
//! solve large, sparse, positive-definite systems via AMD-permuted LDLT. The
//! per-stage active-set KKT system here,
//!
//! ```text
//! [ H + reg*I   A_w^T ] [ dx ]   [ -g ]
//! [ A_w         0     ] [ dy ] = [  0 ]
//! ```
//!
//! is small and dense but symmetric *indefinite* (a saddle-point system), so
//! plain Cholesky does not apply; this module keeps the teacher's
//! factorize-then-solve shape but backs it with `faer`'s dense
//! partial-pivoting LU, which is the concrete method for our (small,
//! nonsingular, sign-indefinite) case.
use faer::linalg::solvers::{PartialPivLu, Solve};
use faer::{Mat, MatMut, MatRef};
use problemo::{Problem, ProblemResult};

use crate::E;
use crate::linalg::solver::DenseSolver;

/// Factorizes the dense KKT matrix of the currently active working set and solves for
/// a right-hand side.
pub struct DenseKktSolver {
    lu: Option<PartialPivLu<E>>,
}

impl DenseSolver for DenseKktSolver {
    fn new() -> Self {
        Self { lu: None }
    }

    fn factorize(&mut self, mat: MatRef<E>) -> Result<(), Problem> {
        if mat.nrows() != mat.ncols() {
            return Err("KKT matrix passed to factorize is not square".gloss());
        }
        self.lu = Some(mat.partial_piv_lu());
        Ok(())
    }

    fn solve_in_place(&self, b: &mut MatMut<E>) -> Result<(), Problem> {
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| "solve_in_place called before factorize".gloss())?;
        lu.solve_in_place(b.rb_mut());
        Ok(())
    }

    fn solve(&self, b: MatRef<E>) -> Result<Mat<E>, Problem> {
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| "solve called before factorize".gloss())?;
        Ok(lu.solve(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn solves_indefinite_saddle_point_system() {
        // H = [[2, 0], [0, 2]], A = [1, -1] (single equality row): classic
        // equality-constrained QP KKT matrix, indefinite.
        let kkt = mat![[2.0, 0.0, 1.0], [0.0, 2.0, -1.0], [1.0, -1.0, 0.0]];
        let rhs = mat![[-1.0], [-1.0], [0.0]];

        let mut solver = DenseKktSolver::new();
        solver.factorize(kkt.as_ref()).unwrap();
        let x = solver.solve(rhs.as_ref()).unwrap();

        let residual = &kkt * &x - &rhs;
        for i in 0..residual.nrows() {
            assert!(residual[(i, 0)].abs() < 1e-9);
        }
    }

    #[test]
    fn uninitialized_solve_errors() {
        let solver = DenseKktSolver::new();
        let rhs = mat![[1.0], [2.0]];
        assert!(solver.solve(rhs.as_ref()).is_err());
    }
}
