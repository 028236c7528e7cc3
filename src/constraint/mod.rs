//! Discretized path constraints: the four coefficient blocks every
//! constraint carries, their classification, and first-order
//! half-step interpolation.

pub mod acceleration;
pub mod contact;
pub mod torque;
pub mod velocity;

use faer::Mat;

use crate::error::ToppraError;
use crate::{E, TINY};

/// Classification of a [`PathConstraint`] by which blocks it uses, in the
/// order assembly packs rows: `Canonical < TypeI < TypeII`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathConstraintKind {
    Canonical = 0,
    TypeI = 1,
    TypeII = 2,
}

/// A single discretized path constraint, carrying up to four independent
/// blocks defined on every grid point. Constructed once from a path and a
/// dynamics/geometry model, then immutable.
#[allow(non_snake_case)]
#[derive(Clone)]
pub struct PathConstraint {
    ss: Vec<E>,

    // Canonical: a*u + b*x + c <= 0, shape (N+1, nm).
    a: Mat<E>,
    b: Mat<E>,
    c: Mat<E>,

    // Type-I equalities: abar*u + bbar*x + cbar = D*v, shape (N+1, neq);
    // D is one (neq, nv) matrix per stage.
    abar: Mat<E>,
    bbar: Mat<E>,
    cbar: Mat<E>,
    D: Vec<Mat<E>>,

    // Slack box: l <= v <= h, shape (N+1, nv).
    l: Mat<E>,
    h: Mat<E>,

    // Type-II inequalities: lG <= G*v <= hG; G is one (niq, nv) matrix per stage.
    G: Vec<Mat<E>>,
    lG: Mat<E>,
    hG: Mat<E>,
}

impl PathConstraint {
    /// Builds a constraint from whichever blocks are present; absent blocks
    /// default to zero-width matrices with `N+1` rows.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn new(
        ss: Vec<E>,
        canonical: Option<(Mat<E>, Mat<E>, Mat<E>)>,
        type_i: Option<(Mat<E>, Mat<E>, Mat<E>, Vec<Mat<E>>)>,
        slack_box: Option<(Mat<E>, Mat<E>)>,
        type_ii: Option<(Vec<Mat<E>>, Mat<E>, Mat<E>)>,
    ) -> Self {
        let n1 = ss.len();
        let zero_cols = |cols: usize| Mat::<E>::zeros(n1, cols);
        let zero_tensor = || vec![Mat::<E>::zeros(0, 0); n1];

        let (a, b, c) = canonical.unwrap_or_else(|| (zero_cols(0), zero_cols(0), zero_cols(0)));
        let (abar, bbar, cbar, D) =
            type_i.unwrap_or_else(|| (zero_cols(0), zero_cols(0), zero_cols(0), zero_tensor()));
        let nv = D.iter().map(|d| d.ncols()).max().unwrap_or(0);
        let (l, h) = slack_box.unwrap_or_else(|| (zero_cols(nv), zero_cols(nv)));
        let (G, lG, hG) = type_ii.unwrap_or_else(|| (zero_tensor(), zero_cols(0), zero_cols(0)));

        Self {
            ss,
            a,
            b,
            c,
            abar,
            bbar,
            cbar,
            D,
            l,
            h,
            G,
            lG,
            hG,
        }
    }

    pub fn ss(&self) -> &[E] {
        &self.ss
    }

    pub fn n_stages(&self) -> usize {
        self.ss.len()
    }

    pub fn nm(&self) -> usize {
        self.a.ncols()
    }

    pub fn neq(&self) -> usize {
        self.abar.ncols()
    }

    pub fn niq(&self) -> usize {
        self.lG.ncols()
    }

    pub fn nv(&self) -> usize {
        self.l.ncols()
    }

    pub fn kind(&self) -> PathConstraintKind {
        if self.nm() > 0 {
            PathConstraintKind::Canonical
        } else if self.niq() == 0 {
            PathConstraintKind::TypeI
        } else {
            PathConstraintKind::TypeII
        }
    }

    pub fn a(&self) -> &Mat<E> {
        &self.a
    }
    pub fn b(&self) -> &Mat<E> {
        &self.b
    }
    pub fn c(&self) -> &Mat<E> {
        &self.c
    }
    pub fn abar(&self) -> &Mat<E> {
        &self.abar
    }
    pub fn bbar(&self) -> &Mat<E> {
        &self.bbar
    }
    pub fn cbar(&self) -> &Mat<E> {
        &self.cbar
    }
    pub fn d_at(&self, stage: usize) -> &Mat<E> {
        &self.D[stage]
    }
    pub fn l(&self) -> &Mat<E> {
        &self.l
    }
    pub fn h(&self) -> &Mat<E> {
        &self.h
    }
    pub fn g_at(&self, stage: usize) -> &Mat<E> {
        &self.G[stage]
    }
    pub fn lg(&self) -> &Mat<E> {
        &self.lG
    }
    pub fn hg(&self) -> &Mat<E> {
        &self.hG
    }

    /// Checks that `self.ss` matches `ss` within `TINY`, the grid-consistency
    /// invariant every constraint sharing a solver instance must satisfy.
    pub fn check_grid(&self, ss: &[E]) -> Result<(), ToppraError> {
        if self.ss.len() != ss.len() {
            return Err(ToppraError::GridMismatch {
                max_abs_diff: E::INFINITY,
            });
        }
        let max_abs_diff = self
            .ss
            .iter()
            .zip(ss)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, E::max);
        if max_abs_diff > TINY {
            return Err(ToppraError::GridMismatch { max_abs_diff });
        }
        Ok(())
    }

    /// Produces the first-order half-step interpolation of this constraint,
    /// following `interpolate_constraint` in the original implementation:
    /// every row block doubles in width, packing the constraint felt at the
    /// current and the next collocation point side by side. Canonical rows
    /// fold the next stage into the *current* stage's `(u, x)` coordinates
    /// via the identity `x_{i+1} = x_i + 2*Ds_i*u_i`; Type-I/Type-II slack
    /// blocks instead double the slack dimension itself (`v` becomes
    /// `[v_i; v_{i+1}]`), with `D`/`G` block-diagonal across the two halves
    /// so the left and right slack copies stay independent. Row `N` has no
    /// successor and replicates its own left half into the right half.
    #[allow(non_snake_case)]
    pub fn interpolate(&self) -> Self {
        let n1 = self.n_stages();
        let n = n1 - 1;
        let nm = self.nm();
        let neq = self.neq();
        let niq = self.niq();
        let nv = self.nv();

        let ds = |i: usize| self.ss[i + 1] - self.ss[i];

        // Row i < N: right half evaluates the block at stage i+1 (biased by
        // `right_bias` for the a-block, via x_{i+1} = x_i + 2*Ds_i*u_i). Row
        // N has no successor, so it replicates its own left half.
        let double_canonical = |left: &Mat<E>, right_bias: Option<&Mat<E>>| -> Mat<E> {
            let cols = left.ncols();
            Mat::from_fn(n1, 2 * cols, |i, j| {
                if j < cols {
                    left[(i, j)]
                } else {
                    let jj = j - cols;
                    if i == n {
                        left[(i, jj)]
                    } else {
                        let base = left[(i + 1, jj)];
                        match right_bias {
                            Some(bias) => base + 2.0 * ds(i) * bias[(i + 1, jj)],
                            None => base,
                        }
                    }
                }
            })
        };

        // Same row-doubling shape as `double_canonical`, but without the
        // collocation bias: used for the slack-box bounds, whose right half
        // is a plain copy of row i+1 (or, at row N, of row N itself).
        let double_plain = |left: &Mat<E>| double_canonical(left, None);

        let a_new = if nm > 0 {
            double_canonical(&self.a, Some(&self.b))
        } else {
            Mat::zeros(n1, 0)
        };
        let b_new = if nm > 0 { double_plain(&self.b) } else { Mat::zeros(n1, 0) };
        let c_new = if nm > 0 { double_plain(&self.c) } else { Mat::zeros(n1, 0) };

        let abar_new = if neq > 0 {
            double_canonical(&self.abar, Some(&self.bbar))
        } else {
            Mat::zeros(n1, 0)
        };
        let bbar_new = if neq > 0 { double_plain(&self.bbar) } else { Mat::zeros(n1, 0) };
        let cbar_new = if neq > 0 { double_plain(&self.cbar) } else { Mat::zeros(n1, 0) };

        let l_new = if nv > 0 { double_plain(&self.l) } else { Mat::zeros(n1, 0) };
        let h_new = if nv > 0 { double_plain(&self.h) } else { Mat::zeros(n1, 0) };

        // Block-diagonal: top-left quadrant is D_i (or G_i), bottom-right
        // quadrant is D_{i+1} (or G_{i+1}); off-diagonal quadrants are zero
        // since the left and right slack copies don't interact.
        let block_diagonal = |rows: usize, left_blocks: &[Mat<E>]| -> Vec<Mat<E>> {
            (0..n1)
                .map(|i| {
                    let next = (i + 1).min(n);
                    let top = &left_blocks[i];
                    let bottom = &left_blocks[next];
                    Mat::from_fn(2 * rows, 2 * nv, |r, c| {
                        if r < rows && c < nv {
                            top[(r, c)]
                        } else if r >= rows && c >= nv {
                            bottom[(r - rows, c - nv)]
                        } else {
                            0.0
                        }
                    })
                })
                .collect()
        };

        let D_new: Vec<Mat<E>> = if neq > 0 {
            block_diagonal(neq, &self.D)
        } else {
            vec![Mat::zeros(0, 0); n1]
        };
        let G_new: Vec<Mat<E>> = if niq > 0 {
            block_diagonal(niq, &self.G)
        } else {
            vec![Mat::zeros(0, 0); n1]
        };

        let lG_new = if niq > 0 { double_plain(&self.lG) } else { Mat::zeros(n1, 0) };
        let hG_new = if niq > 0 { double_plain(&self.hG) } else { Mat::zeros(n1, 0) };

        Self {
            ss: self.ss.clone(),
            a: a_new,
            b: b_new,
            c: c_new,
            abar: abar_new,
            bbar: bbar_new,
            cbar: cbar_new,
            D: D_new,
            l: l_new,
            h: h_new,
            G: G_new,
            lG: lG_new,
            hG: hG_new,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_canonical_type_i_type_ii() {
        let ss = vec![0.0, 1.0, 2.0];
        let canonical = PathConstraint::new(
            ss.clone(),
            Some((Mat::zeros(3, 1), Mat::zeros(3, 1), Mat::zeros(3, 1))),
            None,
            None,
            None,
        );
        assert_eq!(canonical.kind(), PathConstraintKind::Canonical);

        let type_i = PathConstraint::new(
            ss.clone(),
            None,
            Some((
                Mat::zeros(3, 1),
                Mat::zeros(3, 1),
                Mat::zeros(3, 1),
                vec![Mat::zeros(1, 2); 3],
            )),
            Some((Mat::zeros(3, 2), Mat::zeros(3, 2))),
            None,
        );
        assert_eq!(type_i.kind(), PathConstraintKind::TypeI);

        let type_ii = PathConstraint::new(
            ss,
            None,
            None,
            Some((Mat::zeros(3, 2), Mat::zeros(3, 2))),
            Some((vec![Mat::zeros(1, 2); 3], Mat::zeros(3, 1), Mat::zeros(3, 1))),
        );
        assert_eq!(type_ii.kind(), PathConstraintKind::TypeII);
    }

    #[test]
    fn interpolation_doubles_canonical_width_and_satisfies_right_half() {
        let ss = vec![0.0, 0.5, 1.0, 1.5];
        let n1 = ss.len();
        let a = Mat::from_fn(n1, 1, |i, _| 1.0 + i as E);
        let b = Mat::from_fn(n1, 1, |i, _| 0.5 * i as E);
        let c = Mat::from_fn(n1, 1, |i, _| -(i as E));

        let pc = PathConstraint::new(ss.clone(), Some((a.clone(), b.clone(), c.clone())), None, None, None);
        let interp = pc.interpolate();

        assert_eq!(interp.nm(), 2);
        assert_eq!(interp.n_stages(), n1);

        let n = n1 - 1;
        for i in 0..n {
            let ds = ss[i + 1] - ss[i];
            let expected_a = a[(i + 1, 0)] + 2.0 * ds * b[(i + 1, 0)];
            assert!((interp.a()[(i, 1)] - expected_a).abs() < 1e-12);
            assert!((interp.b()[(i, 1)] - b[(i + 1, 0)]).abs() < 1e-12);
            assert!((interp.c()[(i, 1)] - c[(i + 1, 0)]).abs() < 1e-12);
        }
    }
}
