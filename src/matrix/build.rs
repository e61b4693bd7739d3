use crate::error::GblasError;
use crate::matrix::store::Store;
use crate::matrix::Matrix;
use crate::ops::BinaryOp;
use crate::types::{TypeCode, ValueStore};
use rayon::prelude::*;

/// Tuple counts above which the build sort runs on the rayon pool
const PARALLEL_SORT_THRESHOLD: usize = 8192;

impl Matrix {
    /// Bulk construction from parallel index/value arrays
    ///
    /// `dup` resolves duplicate positions as an ordered fold; `None` keeps
    /// the last write. The matrix must be empty.
    pub fn build(
        &mut self,
        rows: &[u64],
        cols: &[u64],
        values: &ValueStore,
        dup: Option<&BinaryOp>,
    ) -> Result<(), GblasError> {
        build_from_parts(self, rows, cols, values.clone(), dup)?;
        self.conform()
    }

    /// The inverse of build: every entry as (rows, cols, values) in storage
    /// order
    pub fn extract_tuples(&mut self) -> Result<(Vec<u64>, Vec<u64>, ValueStore), GblasError> {
        self.finish()?;
        extract_parts(self)
    }

    /// Pattern-only extraction; value materialization is skipped
    pub fn extract_pattern(&mut self) -> Result<(Vec<u64>, Vec<u64>), GblasError> {
        self.finish()?;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for_each_position(self, |r, c, _| {
            rows.push(r);
            cols.push(c);
        });
        Ok((rows, cols))
    }
}

/// Walk every present entry of a drained matrix in storage order
pub(crate) fn for_each_position(m: &Matrix, mut f: impl FnMut(u64, u64, usize)) {
    debug_assert!(!m.has_deferred_work());
    let inner_dim = m.inner_dim() as usize;
    match &m.store {
        Store::Hyper { .. } | Store::Sparse { .. } => {
            let read = m.sparse_read().unwrap();
            for v in 0..read.nvec() {
                let outer = read.outer_id(v);
                for p in read.range(v) {
                    let (r, c) = m.to_row_col(outer, read.idx[p]);
                    f(r, c, p);
                }
            }
        }
        Store::Bitmap { present, .. } => {
            for (cell, &b) in present.iter().enumerate() {
                if b != 0 {
                    let (outer, inner) = ((cell / inner_dim) as u64, (cell % inner_dim) as u64);
                    let (r, c) = m.to_row_col(outer, inner);
                    f(r, c, cell);
                }
            }
        }
        Store::Full { .. } => {
            let cells = (m.outer_dim() * m.inner_dim()) as usize;
            for cell in 0..cells {
                let (outer, inner) = ((cell / inner_dim) as u64, (cell % inner_dim) as u64);
                let (r, c) = m.to_row_col(outer, inner);
                f(r, c, cell);
            }
        }
    }
}

/// Extract (rows, cols, values) from a drained matrix, expanding iso values
pub(crate) fn extract_parts(
    m: &Matrix,
) -> Result<(Vec<u64>, Vec<u64>, ValueStore), GblasError> {
    let n = m.nvals_finished() as usize;
    let mut rows = Vec::with_capacity(n);
    let mut cols = Vec::with_capacity(n);
    let mut values = ValueStore::with_capacity(&m.ty, n);
    for_each_position(m, |r, c, p| {
        rows.push(r);
        cols.push(c);
        values.push(m.value_at(p));
    });
    Ok((rows, cols, values))
}

/// Sort, deduplicate, and load tuples into a sparse store
pub(crate) fn build_from_parts(
    m: &mut Matrix,
    rows: &[u64],
    cols: &[u64],
    values: ValueStore,
    dup: Option<&BinaryOp>,
) -> Result<(), GblasError> {
    if rows.len() != cols.len() || rows.len() != values.len() {
        return Err(GblasError::DimensionMismatch(format!(
            "tuple arrays of lengths {}, {}, {}",
            rows.len(),
            cols.len(),
            values.len()
        )));
    }
    if m.pending.is_some() || m.nvals_would_be_nonzero() {
        return Err(GblasError::OutputNotEmpty);
    }
    for (&r, &c) in rows.iter().zip(cols.iter()) {
        if r >= m.nrows || c >= m.ncols {
            return Err(GblasError::IndexOutOfBounds(format!(
                "tuple ({}, {}) in a {}x{} matrix",
                r, c, m.nrows, m.ncols
            )));
        }
    }
    // incoming values are cast to the matrix domain lazily, entry by entry
    let needs_cast = values.type_code() != m.ty.code();
    if needs_cast
        && (values.type_code() == TypeCode::Udt || m.ty.code() == TypeCode::Udt)
    {
        return Err(GblasError::DomainMismatch(
            "tuple values do not match the matrix's user-defined type".to_string(),
        ));
    }

    let keys: Vec<(u64, u64)> = rows
        .iter()
        .zip(cols.iter())
        .map(|(&r, &c)| m.to_outer_inner(r, c))
        .collect();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    if order.len() >= PARALLEL_SORT_THRESHOLD {
        order.par_sort_by_key(|&p| keys[p]);
    } else {
        order.sort_by_key(|&p| keys[p]);
    }

    let outer_dim = m.outer_dim() as usize;
    let mut ptr = vec![0u64; outer_dim + 1];
    let mut idx = Vec::with_capacity(order.len());
    let mut packed = ValueStore::with_capacity(&m.ty, order.len());
    let mut iso = true;

    let mut t = 0usize;
    while t < order.len() {
        let key = keys[order[t]];
        let mut acc = fetch(&values, order[t], m, needs_cast)?;
        t += 1;
        while t < order.len() && keys[order[t]] == key {
            let v = fetch(&values, order[t], m, needs_cast)?;
            acc = match dup {
                Some(op) => op.apply(&acc, &v)?.cast_or_keep(m.ty.code())?,
                None => v,
            };
            t += 1;
        }
        if !packed.is_empty() && packed.get(0) != acc {
            iso = false;
        }
        ptr[key.0 as usize + 1] += 1;
        idx.push(key.1);
        packed.push(acc);
    }
    for o in 0..outer_dim {
        ptr[o + 1] += ptr[o];
    }

    let iso = iso && !packed.is_empty();
    if iso {
        packed.truncate(1);
    }
    m.load_sparse(ptr, idx, packed, iso, false);
    Ok(())
}

fn fetch(
    values: &ValueStore,
    p: usize,
    m: &Matrix,
    needs_cast: bool,
) -> Result<crate::types::ScalarValue, GblasError> {
    let v = values.get(p);
    if needs_cast {
        v.cast(m.ty.code())
    } else {
        Ok(v)
    }
}

impl Matrix {
    /// Entry-count probe that works without draining (build precondition)
    fn nvals_would_be_nonzero(&self) -> bool {
        match &self.store {
            Store::Hyper { idx, .. } | Store::Sparse { idx, .. } => {
                idx.len() as u64 > self.nzombies
            }
            Store::Bitmap { nvals, .. } => *nvals > 0,
            Store::Full { .. } => true,
        }
    }
}
