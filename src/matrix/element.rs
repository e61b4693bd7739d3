use crate::error::GblasError;
use crate::matrix::pending::PendingTuples;
use crate::matrix::store::Store;
use crate::matrix::{dezombie, is_zombie, zombie, Matrix};
use crate::types::{ScalarValue, TypeCode};

impl Matrix {
    fn check_bounds(&self, row: u64, col: u64) -> Result<(), GblasError> {
        if row >= self.nrows || col >= self.ncols {
            return Err(GblasError::IndexOutOfBounds(format!(
                "({}, {}) in a {}x{} matrix",
                row, col, self.nrows, self.ncols
            )));
        }
        Ok(())
    }

    fn coerce(&self, value: ScalarValue) -> Result<ScalarValue, GblasError> {
        if self.ty.code() == TypeCode::Udt {
            match &value {
                ScalarValue::Udt(bytes) if bytes.len() == self.ty.size() => Ok(value),
                _ => Err(GblasError::DomainMismatch(
                    "value does not match the matrix's user-defined type".to_string(),
                )),
            }
        } else {
            value.cast(self.ty.code())
        }
    }

    /// Storage position of (row, col) in a sparse or hypersparse store,
    /// tolerating zombies and jumbled order
    fn search_entry(&self, row: u64, col: u64) -> Option<(usize, bool)> {
        let (outer, inner) = self.to_outer_inner(row, col);
        let read = self.sparse_read()?;
        let v = match (&self.hyper_hash, read.vec_ids) {
            (Some(hash), Some(ids)) => hash.lookup(outer, ids)?,
            _ => read.find_outer(outer)?,
        };
        let range = read.range(v);
        if self.jumbled {
            for p in range {
                if dezombie(read.idx[p]) == inner {
                    return Some((p, is_zombie(read.idx[p])));
                }
            }
            None
        } else {
            // zombies keep their slot; search the dezombied keys
            let (mut lo, mut hi) = (range.start, range.end);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if dezombie(read.idx[mid]) < inner {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if lo < read.ptr[v + 1] as usize && dezombie(read.idx[lo]) == inner {
                Some((lo, is_zombie(read.idx[lo])))
            } else {
                None
            }
        }
    }

    /// Write one entry; appends a pending tuple when the position is absent
    /// from a sparse store
    pub fn set_element(
        &mut self,
        row: u64,
        col: u64,
        value: ScalarValue,
    ) -> Result<(), GblasError> {
        self.check_bounds(row, col)?;
        let value = self.coerce(value)?;
        let (outer, inner) = self.to_outer_inner(row, col);
        let inner_dim = self.inner_dim() as usize;
        match &mut self.store {
            Store::Bitmap { present, nvals, .. } => {
                let cell = outer as usize * inner_dim + inner as usize;
                if present[cell] == 0 {
                    present[cell] = 1;
                    *nvals += 1;
                }
                self.write_dense_value(cell, value);
            }
            Store::Full { .. } => {
                let cell = outer as usize * inner_dim + inner as usize;
                self.write_dense_value(cell, value);
            }
            Store::Hyper { .. } | Store::Sparse { .. } => match self.search_entry(row, col) {
                Some((p, was_zombie)) => {
                    if was_zombie {
                        if let Store::Hyper { idx, .. } | Store::Sparse { idx, .. } =
                            &mut self.store
                        {
                            idx[p] = dezombie(idx[p]);
                        }
                        self.nzombies -= 1;
                    }
                    self.write_sparse_value(p, value);
                }
                None => {
                    if matches!(&self.pending, Some(pending) if !pending.compatible(&None)) {
                        self.finish()?;
                        return self.set_element(row, col, value);
                    }
                    if self.pending.is_none() {
                        self.pending = Some(PendingTuples::new(self, None));
                    }
                    let pending = self.pending.as_mut().unwrap();
                    pending.rows.push(row);
                    pending.cols.push(col);
                    pending.values.push(value);
                }
            },
        }
        self.honor_blocking_mode()
    }

    fn write_dense_value(&mut self, cell: usize, value: ScalarValue) {
        if self.iso {
            if self.store.values().get(0) == value {
                return;
            }
            self.expand_iso();
        }
        self.store.values_mut().set(cell, value);
    }

    fn write_sparse_value(&mut self, p: usize, value: ScalarValue) {
        if self.iso {
            if self.store.values().get(0) == value {
                return;
            }
            self.expand_iso();
        }
        self.store.values_mut().set(p, value);
    }

    /// Remove one entry; marks a zombie instead of shifting arrays
    pub fn remove_element(&mut self, row: u64, col: u64) -> Result<(), GblasError> {
        self.check_bounds(row, col)?;
        let (outer, inner) = self.to_outer_inner(row, col);
        let inner_dim = self.inner_dim() as usize;
        match &mut self.store {
            Store::Bitmap { present, nvals, .. } => {
                let cell = outer as usize * inner_dim + inner as usize;
                if present[cell] != 0 {
                    present[cell] = 0;
                    *nvals -= 1;
                }
            }
            Store::Full { .. } => {
                self.to_form(crate::matrix::Form::Bitmap)?;
                return self.remove_element(row, col);
            }
            Store::Hyper { .. } | Store::Sparse { .. } => {
                // a pending tuple may shadow this position; drain first
                if self.pending.is_some() {
                    self.finish()?;
                    return self.remove_element(row, col);
                }
                if let Some((p, false)) = self.search_entry(row, col) {
                    if let Store::Hyper { idx, .. } | Store::Sparse { idx, .. } = &mut self.store {
                        idx[p] = zombie(idx[p]);
                    }
                    self.nzombies += 1;
                }
            }
        }
        self.honor_blocking_mode()
    }

    /// Read one entry; `Ok(None)` when the position holds no value
    ///
    /// Pending tuples at this position are folded with a targeted scan; the
    /// list is not drained.
    pub fn extract_element(&self, row: u64, col: u64) -> Result<Option<ScalarValue>, GblasError> {
        self.check_bounds(row, col)?;
        let (outer, inner) = self.to_outer_inner(row, col);
        let inner_dim = self.inner_dim() as usize;
        let base = match &self.store {
            Store::Bitmap {
                present, values, ..
            } => {
                let cell = outer as usize * inner_dim + inner as usize;
                if present[cell] != 0 {
                    Some(if self.iso { values.get(0) } else { values.get(cell) })
                } else {
                    None
                }
            }
            Store::Full { values } => {
                let cell = outer as usize * inner_dim + inner as usize;
                Some(if self.iso { values.get(0) } else { values.get(cell) })
            }
            Store::Hyper { .. } | Store::Sparse { .. } => self
                .search_entry(row, col)
                .filter(|&(_, z)| !z)
                .map(|(p, _)| self.value_at(p)),
        };
        match &self.pending {
            Some(pending) => pending.fold_at(row, col, base),
            None => Ok(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::WaitMode;
    use crate::types::ScalarType;

    #[test]
    fn read_sees_pending_without_draining() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(2, 3, ScalarValue::Int32(5)).unwrap();
        if crate::context::mode() == crate::context::Mode::NonBlocking {
            assert!(m.has_deferred_work());
        }
        assert_eq!(
            m.extract_element(2, 3).unwrap(),
            Some(ScalarValue::Int32(5))
        );
    }

    #[test]
    fn read_skips_zombies() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(1, 1, ScalarValue::Int32(5)).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        m.remove_element(1, 1).unwrap();
        assert_eq!(m.extract_element(1, 1).unwrap(), None);
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        assert!(matches!(
            m.extract_element(4, 0).unwrap_err(),
            GblasError::IndexOutOfBounds(_)
        ));
    }

    #[test]
    fn values_are_cast_to_the_matrix_domain() {
        let mut m = Matrix::new(&ScalarType::fp64(), 2, 2).unwrap();
        m.set_element(0, 0, ScalarValue::Int32(3)).unwrap();
        assert_eq!(
            m.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Fp64(3.0))
        );
    }

    #[test]
    fn overwrite_in_bitmap_form_is_direct() {
        let mut m = Matrix::new(&ScalarType::int32(), 2, 2).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                m.set_element(r, c, ScalarValue::Int32(1)).unwrap();
            }
        }
        m.wait(WaitMode::Materialize).unwrap();
        m.remove_element(0, 1).unwrap();
        m.set_element(0, 0, ScalarValue::Int32(9)).unwrap();
        assert!(!m.has_deferred_work());
        assert_eq!(
            m.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(9))
        );
    }
}
