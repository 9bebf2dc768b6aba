//! Inverse hybridization matrix with Schur-complement fast updates.

use std::cmp::Ordering;

use ctqmc_core::{Bath, BathEntry, FlavoredOperator, Link, Operator, Spin};
use nalgebra::{DMatrix, DVector};
use tracing::warn;

#[derive(Debug, Clone)]
enum Pending {
    Insert {
        annihilator: FlavoredOperator,
        creator: FlavoredOperator,
        row: usize,
        column: usize,
        inverse_column: DVector<f64>,
        inverse_row: DVector<f64>,
        ratio: f64,
    },
    Erase {
        row: usize,
        column: usize,
        ratio: f64,
    },
}

/// Bath holding `M = F^-1` for `F_ij = -Delta(tau_i - tau_j)`.
///
/// Rows of `F` are annihilators and columns are creators, both kept in
/// canonical `(site, spin, time)` order. `M` is indexed the other way round:
/// `M[creator, annihilator]`. The determinant of `F` in this canonical layout
/// is tracked incrementally and refreshed on every rebuild.
#[derive(Debug, Clone)]
pub struct HybMatrix {
    annihilators: Vec<FlavoredOperator>,
    creators: Vec<FlavoredOperator>,
    inverse: DMatrix<f64>,
    det: f64,
    pending: Option<Pending>,
}

impl Default for HybMatrix {
    fn default() -> Self {
        Self {
            annihilators: Vec::new(),
            creators: Vec::new(),
            inverse: DMatrix::zeros(0, 0),
            det: 1.0,
            pending: None,
        }
    }
}

fn canonical_position(ops: &[FlavoredOperator], op: &FlavoredOperator) -> usize {
    ops.partition_point(|existing| existing.canonical_cmp(op) == Ordering::Less)
}

fn find(ops: &[FlavoredOperator], site: usize, spin: Spin, time: f64) -> Option<usize> {
    ops.iter()
        .position(|entry| entry.site == site && entry.spin == spin && entry.op.time == time)
}

fn permutation_sign(row: usize, column: usize) -> f64 {
    if (row + column) % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn sign_of(value: f64) -> i32 {
    if value < 0.0 {
        -1
    } else {
        1
    }
}

fn matrix_element<L: Link>(link: &L, annihilator: &FlavoredOperator, creator: &FlavoredOperator) -> f64 {
    -link.hybridization(annihilator, creator)
}

impl HybMatrix {
    /// Matrix dimension (number of operator pairs).
    pub fn size(&self) -> usize {
        self.annihilators.len()
    }

    /// Inverse matrix in `[creator, annihilator]` layout.
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    fn hybridization_matrix<L: Link>(&self, link: &L) -> DMatrix<f64> {
        let n = self.size();
        DMatrix::from_fn(n, n, |i, j| {
            matrix_element(link, &self.annihilators[i], &self.creators[j])
        })
    }
}

impl Bath for HybMatrix {
    fn add(&mut self, site: usize, spin: Spin, op: &Operator) {
        let entry = FlavoredOperator::new(site, spin, *op);
        let position = canonical_position(&self.annihilators, &entry);
        self.annihilators.insert(position, entry);
    }

    fn add_dagg(&mut self, site: usize, spin: Spin, op: &Operator) {
        let entry = FlavoredOperator::new(site, spin, *op);
        let position = canonical_position(&self.creators, &entry);
        self.creators.insert(position, entry);
    }

    fn insert<L: Link>(
        &mut self,
        site: usize,
        spin: Spin,
        annihilator: &Operator,
        creator: &Operator,
        link: &L,
    ) -> f64 {
        let annihilator = FlavoredOperator::new(site, spin, *annihilator);
        let creator = FlavoredOperator::new(site, spin, *creator);

        let n = self.size();
        let new_column = DVector::from_fn(n, |i, _| matrix_element(link, &self.annihilators[i], &creator));
        let new_row = DVector::from_fn(n, |j, _| matrix_element(link, &annihilator, &self.creators[j]));
        let corner = matrix_element(link, &annihilator, &creator);

        // M u is indexed by creator, v^T M by annihilator.
        let inverse_column = &self.inverse * &new_column;
        let inverse_row = self.inverse.tr_mul(&new_row);
        let schur = corner - new_row.dot(&inverse_column);

        let row = canonical_position(&self.annihilators, &annihilator);
        let column = canonical_position(&self.creators, &creator);
        self.pending = Some(Pending::Insert {
            annihilator,
            creator,
            row,
            column,
            inverse_column,
            inverse_row,
            ratio: permutation_sign(row, column) * schur,
        });
        schur.abs().ln()
    }

    fn erase(
        &mut self,
        site: usize,
        spin: Spin,
        annihilator_time: f64,
        creator_time: f64,
    ) -> f64 {
        let row = find(&self.annihilators, site, spin, annihilator_time);
        let column = find(&self.creators, site, spin, creator_time);
        let (Some(row), Some(column)) = (row, column) else {
            warn!(site, ?spin, annihilator_time, creator_time, "erase of unregistered operator pair");
            self.pending = None;
            return f64::NEG_INFINITY;
        };
        let element = self.inverse[(column, row)];
        self.pending = Some(Pending::Erase {
            row,
            column,
            ratio: permutation_sign(row, column) * element,
        });
        element.abs().ln()
    }

    fn accept_insert(&mut self) -> i32 {
        let Some(Pending::Insert {
            annihilator,
            creator,
            row,
            column,
            inverse_column,
            inverse_row,
            ratio,
        }) = self.pending.take()
        else {
            return 1;
        };
        let schur = ratio * permutation_sign(row, column);
        let inv_schur = 1.0 / schur;

        let n = self.size();
        let mut updated = &self.inverse + (&inverse_column * inverse_row.transpose()) * inv_schur;
        updated = updated.insert_column(row, 0.0).insert_row(column, 0.0);
        for r in 0..=n {
            if r == column {
                continue;
            }
            let old = if r < column { r } else { r - 1 };
            updated[(r, row)] = -inverse_column[old] * inv_schur;
        }
        for c in 0..=n {
            if c == row {
                continue;
            }
            let old = if c < row { c } else { c - 1 };
            updated[(column, c)] = -inverse_row[old] * inv_schur;
        }
        updated[(column, row)] = inv_schur;

        self.inverse = updated;
        self.annihilators.insert(row, annihilator);
        self.creators.insert(column, creator);
        self.det *= ratio;
        sign_of(ratio)
    }

    fn reject_insert(&mut self) {
        self.pending = None;
    }

    fn accept_erase(&mut self) -> i32 {
        let Some(Pending::Erase { row, column, ratio }) = self.pending.take() else {
            return 1;
        };
        let pivot = self.inverse[(column, row)];
        let column_vec = self.inverse.column(row).clone_owned();
        let row_vec = self.inverse.row(column).clone_owned();
        let updated = &self.inverse - (&column_vec * &row_vec) / pivot;
        self.inverse = updated.remove_row(column).remove_column(row);
        self.annihilators.remove(row);
        self.creators.remove(column);
        self.det *= ratio;
        sign_of(ratio)
    }

    fn reject_erase(&mut self) {
        self.pending = None;
    }

    fn rebuild<L: Link>(&mut self, link: &L) -> i32 {
        self.pending = None;
        let n = self.size();
        if n != self.creators.len() {
            warn!(
                annihilators = n,
                creators = self.creators.len(),
                "unbalanced operator registration; bath left empty"
            );
            self.inverse = DMatrix::zeros(0, 0);
            self.det = 0.0;
            return 1;
        }
        if n == 0 {
            self.inverse = DMatrix::zeros(0, 0);
            self.det = 1.0;
            return 1;
        }
        let lu = self.hybridization_matrix(link).lu();
        self.det = lu.determinant();
        match lu.try_inverse() {
            Some(inverse) => self.inverse = inverse,
            None => {
                warn!(size = n, "singular hybridization matrix on rebuild");
                self.inverse = DMatrix::zeros(n, n);
            }
        }
        sign_of(self.det)
    }

    fn det(&self) -> f64 {
        self.det
    }

    fn entries(&self) -> Box<dyn Iterator<Item = BathEntry> + '_> {
        let n = self.size();
        Box::new((0..n).flat_map(move |i| {
            (0..n).map(move |j| BathEntry {
                annihilator: self.annihilators[i],
                creator: self.creators[j],
                inverse: self.inverse[(j, i)],
            })
        }))
    }

    fn registered(&self) -> Vec<FlavoredOperator> {
        self.annihilators
            .iter()
            .chain(self.creators.iter())
            .copied()
            .collect()
    }
}
