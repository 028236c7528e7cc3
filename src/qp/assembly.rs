//! Packs an ordered list of [`PathConstraint`]s sharing one grid into the
//! per-stage QP tensors `A, lA, hA, l, h` plus the stage-invariant `H, g`
//! baseline, in the row order spec §4.D requires: operational rows first,
//! then canonical, then Type-I equalities, then Type-II.

use faer::{Col, Mat};

use crate::constraint::{PathConstraint, PathConstraintKind};
use crate::error::ToppraError;
use crate::{E, INFTY};

/// Number of operational (solver-driven scratch) rows reserved at the top of
/// every stage's constraint matrix.
pub const NOP: usize = 3;

/// Per-stage QP tensors for an assembled constraint set.
#[allow(non_snake_case)]
pub struct QpTensors {
    /// Number of grid points, N+1.
    pub n_stages: usize,
    /// Number of primal variables per stage, nv_total + 2.
    pub nV: usize,
    /// Number of constraint rows per stage, nop + nm_total + neq_total + niq_total.
    pub nC: usize,
    /// Per-stage constraint matrix, (nC, nV).
    pub A: Vec<Mat<E>>,
    /// Per-stage lower constraint bound, length nC.
    pub lA: Vec<Col<E>>,
    /// Per-stage upper constraint bound, length nC.
    pub hA: Vec<Col<E>>,
    /// Per-stage lower variable bound, length nV.
    pub l: Vec<Col<E>>,
    /// Per-stage upper variable bound, length nV.
    pub h: Vec<Col<E>>,
    /// Path segment widths, Ds[i] = ss[i+1]-ss[i], length N.
    pub ds: Vec<E>,
    /// Stage-invariant Hessian baseline (nV, nV), zero: no constraint block
    /// contributes a cost term. Cloned and mutated per QP primitive (e.g.
    /// the greedy-step Tikhonov term on the slack sub-block).
    pub h_base: Mat<E>,
    /// Stage-invariant linear-objective baseline (nV), zero; each QP
    /// primitive fills its own objective before calling the backend.
    pub g_base: Col<E>,
}

/// Packs `constraints` (which must all share one grid) into [`QpTensors`].
/// Constraints are re-sorted by [`PathConstraintKind`] before packing so row
/// ranges are contiguous and deterministic.
#[allow(non_snake_case)]
pub fn assemble(constraints: &[PathConstraint]) -> Result<QpTensors, ToppraError> {
    let first = constraints.first().ok_or(ToppraError::DegenerateGrid)?;
    if first.n_stages() < 2 {
        return Err(ToppraError::DegenerateGrid);
    }
    let ss = first.ss().to_vec();
    for c in &constraints[1..] {
        c.check_grid(&ss)?;
    }

    let mut ordered: Vec<&PathConstraint> = constraints.iter().collect();
    ordered.sort_by_key(|c| c.kind());

    let nm_total: usize = ordered.iter().map(|c| c.nm()).sum();
    let neq_total: usize = ordered.iter().map(|c| c.neq()).sum();
    let niq_total: usize = ordered.iter().map(|c| c.niq()).sum();
    let nv_total: usize = ordered.iter().map(|c| c.nv()).sum();

    let n_stages = ss.len();
    let nV = nv_total + 2;
    let nC = NOP + nm_total + neq_total + niq_total;

    let mut A = Vec::with_capacity(n_stages);
    let mut lA = Vec::with_capacity(n_stages);
    let mut hA = Vec::with_capacity(n_stages);
    let mut l = Vec::with_capacity(n_stages);
    let mut h = Vec::with_capacity(n_stages);

    // Column offsets into the slack sub-block, assigned in sorted order so
    // a constraint's own D/G blocks land in its own columns.
    let mut col_offsets = Vec::with_capacity(ordered.len());
    let mut col = 2usize;
    for c in &ordered {
        col_offsets.push(col);
        col += c.nv();
    }

    for stage in 0..n_stages {
        let mut a_stage = Mat::<E>::zeros(nC, nV);
        let mut la_stage = Col::<E>::from_fn(nC, |_| -INFTY);
        let mut ha_stage = Col::<E>::from_fn(nC, |_| INFTY);

        let mut row = NOP;

        // Canonical rows: a*u + b*x <= -c.
        for (k, c) in ordered.iter().enumerate() {
            if c.kind() != PathConstraintKind::Canonical {
                continue;
            }
            for r in 0..c.nm() {
                a_stage[(row, 0)] = c.a()[(stage, r)];
                a_stage[(row, 1)] = c.b()[(stage, r)];
                ha_stage[row] = -c.c()[(stage, r)];
                row += 1;
            }
            let _ = k;
        }

        // Type-I equality rows: abar*u + bbar*x - D*v = -cbar.
        for (k, c) in ordered.iter().enumerate() {
            if c.kind() != PathConstraintKind::TypeI {
                continue;
            }
            let col_off = col_offsets[k];
            let d = c.d_at(stage);
            for r in 0..c.neq() {
                a_stage[(row, 0)] = c.abar()[(stage, r)];
                a_stage[(row, 1)] = c.bbar()[(stage, r)];
                for v in 0..c.nv() {
                    a_stage[(row, col_off + v)] = -d[(r, v)];
                }
                let bound = -c.cbar()[(stage, r)];
                la_stage[row] = bound;
                ha_stage[row] = bound;
                row += 1;
            }
        }

        // Type-II rows: lG <= G*v <= hG.
        for (k, c) in ordered.iter().enumerate() {
            if c.kind() != PathConstraintKind::TypeII {
                continue;
            }
            let col_off = col_offsets[k];
            let g = c.g_at(stage);
            for r in 0..c.niq() {
                for v in 0..c.nv() {
                    a_stage[(row, col_off + v)] = g[(r, v)];
                }
                la_stage[row] = c.lg()[(stage, r)];
                ha_stage[row] = c.hg()[(stage, r)];
                row += 1;
            }
        }
        debug_assert_eq!(row, nC);

        let mut l_stage = Col::<E>::from_fn(nV, |_| -INFTY);
        let mut h_stage = Col::<E>::from_fn(nV, |_| INFTY);
        l_stage[1] = 0.0;
        for (k, c) in ordered.iter().enumerate() {
            let col_off = col_offsets[k];
            for v in 0..c.nv() {
                l_stage[col_off + v] = c.l()[(stage, v)];
                h_stage[col_off + v] = c.h()[(stage, v)];
            }
        }

        A.push(a_stage);
        lA.push(la_stage);
        hA.push(ha_stage);
        l.push(l_stage);
        h.push(h_stage);
    }

    let ds: Vec<E> = ss.windows(2).map(|w| w[1] - w[0]).collect();

    Ok(QpTensors {
        n_stages,
        nV,
        nC,
        A,
        lA,
        hA,
        l,
        h,
        ds,
        h_base: Mat::<E>::zeros(nV, nV),
        g_base: Col::<E>::zeros(nV),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    #[test]
    fn packs_single_canonical_constraint() {
        let ss = vec![0.0, 1.0, 2.0];
        let a = Mat::from_fn(3, 1, |_, _| 1.0);
        let b = Mat::from_fn(3, 1, |_, _| 2.0);
        let c = Mat::from_fn(3, 1, |_, _| -3.0);
        let pc = crate::constraint::PathConstraint::new(ss, Some((a, b, c)), None, None, None);

        let tensors = assemble(&[pc]).unwrap();
        assert_eq!(tensors.nV, 2);
        assert_eq!(tensors.nC, NOP + 1);
        assert_eq!(tensors.A[0][(NOP, 0)], 1.0);
        assert_eq!(tensors.A[0][(NOP, 1)], 2.0);
        assert_eq!(tensors.hA[0][NOP], 3.0);
        assert_eq!(tensors.l[0][1], 0.0);
    }

    #[test]
    fn rejects_mismatched_grids() {
        let pc1 = crate::constraint::PathConstraint::new(
            vec![0.0, 1.0],
            Some((Mat::zeros(2, 1), Mat::zeros(2, 1), Mat::zeros(2, 1))),
            None,
            None,
            None,
        );
        let pc2 = crate::constraint::PathConstraint::new(
            vec![0.0, 2.0],
            Some((Mat::zeros(2, 1), Mat::zeros(2, 1), Mat::zeros(2, 1))),
            None,
            None,
            None,
        );
        assert!(assemble(&[pc1, pc2]).is_err());
    }
}
