use crate::error::GblasError;
use crate::matrix::store::Store;
use crate::matrix::{Matrix, Orientation};
use crate::types::ScalarValue;
use crate::vector::Vector;

/// Outcome of a cursor step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorStatus {
    /// Positioned on a present entry
    Success,
    /// Valid position with nothing there (empty vector or end-of-vector)
    NoValue,
    /// Past the end of the traversal
    Exhausted,
}

/// Cursor over the outer vectors of a matrix in one traversal order
///
/// Borrows the matrix immutably for its whole lifetime, so mutating the
/// object while a cursor is attached is rejected at compile time. The
/// object must be materialized before attaching.
struct OuterCursor<'a> {
    m: &'a Matrix,
    outer: u64,
    /// Storage position (sparse) or cell index (bitmap/full)
    p: usize,
    p_end: usize,
    valid: bool,
}

impl<'a> OuterCursor<'a> {
    fn attach(m: &'a Matrix) -> Result<OuterCursor<'a>, GblasError> {
        if m.has_deferred_work() {
            return Err(GblasError::InvalidObject(
                "object has deferred work; materialize it before iterating".to_string(),
            ));
        }
        Ok(OuterCursor {
            m,
            outer: 0,
            p: 0,
            p_end: 0,
            valid: false,
        })
    }

    /// Position on outer vector `k`
    fn seek(&mut self, k: u64) -> CursorStatus {
        if k >= self.m.outer_dim() {
            self.valid = false;
            return CursorStatus::Exhausted;
        }
        self.outer = k;
        match &self.m.store {
            Store::Hyper { .. } | Store::Sparse { .. } => {
                let read = self.m.sparse_read().unwrap();
                match read.find_outer(k) {
                    Some(v) => {
                        self.p = read.ptr[v] as usize;
                        self.p_end = read.ptr[v + 1] as usize;
                    }
                    None => {
                        self.p = 0;
                        self.p_end = 0;
                    }
                }
            }
            Store::Bitmap { present, .. } => {
                let inner = self.m.inner_dim() as usize;
                let start = k as usize * inner;
                self.p_end = start + inner;
                self.p = start;
                while self.p < self.p_end && present[self.p] == 0 {
                    self.p += 1;
                }
            }
            Store::Full { .. } => {
                let inner = self.m.inner_dim() as usize;
                self.p = k as usize * inner;
                self.p_end = self.p + inner;
            }
        }
        self.valid = self.p < self.p_end;
        if self.valid {
            CursorStatus::Success
        } else {
            CursorStatus::NoValue
        }
    }

    /// Advance to the next outer vector
    fn next_vector(&mut self) -> CursorStatus {
        self.seek(self.outer + 1)
    }

    /// Advance within the current vector
    fn next_entry(&mut self) -> CursorStatus {
        if self.p >= self.p_end {
            self.valid = false;
            return CursorStatus::NoValue;
        }
        self.p += 1;
        if let Store::Bitmap { present, .. } = &self.m.store {
            while self.p < self.p_end && present[self.p] == 0 {
                self.p += 1;
            }
        }
        self.valid = self.p < self.p_end;
        if self.valid {
            CursorStatus::Success
        } else {
            CursorStatus::NoValue
        }
    }

    fn inner_index(&self) -> u64 {
        assert!(self.valid, "cursor is not on an entry");
        match &self.m.store {
            Store::Hyper { idx, .. } | Store::Sparse { idx, .. } => idx[self.p],
            Store::Bitmap { .. } | Store::Full { .. } => {
                (self.p % self.m.inner_dim() as usize) as u64
            }
        }
    }

    fn value(&self) -> ScalarValue {
        assert!(self.valid, "cursor is not on an entry");
        self.m.value_at(self.p)
    }
}

/// Cursor over the rows of a row-oriented matrix
pub struct RowIterator<'a> {
    cursor: OuterCursor<'a>,
}

impl<'a> RowIterator<'a> {
    /// The matrix must be stored by row; a column-oriented matrix does not
    /// permit row traversal
    pub fn attach(m: &'a Matrix) -> Result<RowIterator<'a>, GblasError> {
        if m.orientation() != Orientation::ByRow {
            return Err(GblasError::InvalidValue(
                "matrix is not stored by row".to_string(),
            ));
        }
        Ok(RowIterator {
            cursor: OuterCursor::attach(m)?,
        })
    }

    pub fn seek_row(&mut self, row: u64) -> CursorStatus {
        self.cursor.seek(row)
    }

    pub fn next_row(&mut self) -> CursorStatus {
        self.cursor.next_vector()
    }

    pub fn next_entry(&mut self) -> CursorStatus {
        self.cursor.next_entry()
    }

    pub fn row_index(&self) -> u64 {
        self.cursor.outer
    }

    pub fn col_index(&self) -> u64 {
        self.cursor.inner_index()
    }

    pub fn value(&self) -> ScalarValue {
        self.cursor.value()
    }
}

/// Cursor over the columns of a column-oriented matrix
pub struct ColIterator<'a> {
    cursor: OuterCursor<'a>,
}

impl<'a> ColIterator<'a> {
    pub fn attach(m: &'a Matrix) -> Result<ColIterator<'a>, GblasError> {
        if m.orientation() != Orientation::ByCol {
            return Err(GblasError::InvalidValue(
                "matrix is not stored by column".to_string(),
            ));
        }
        Ok(ColIterator {
            cursor: OuterCursor::attach(m)?,
        })
    }

    pub fn seek_col(&mut self, col: u64) -> CursorStatus {
        self.cursor.seek(col)
    }

    pub fn next_col(&mut self) -> CursorStatus {
        self.cursor.next_vector()
    }

    pub fn next_entry(&mut self) -> CursorStatus {
        self.cursor.next_entry()
    }

    pub fn col_index(&self) -> u64 {
        self.cursor.outer
    }

    pub fn row_index(&self) -> u64 {
        self.cursor.inner_index()
    }

    pub fn value(&self) -> ScalarValue {
        self.cursor.value()
    }
}

/// Cursor over every entry of a matrix, in storage order, in any
/// orientation
pub struct MatrixEntryIterator<'a> {
    cursor: OuterCursor<'a>,
    started: bool,
}

impl<'a> MatrixEntryIterator<'a> {
    pub fn attach(m: &'a Matrix) -> Result<MatrixEntryIterator<'a>, GblasError> {
        Ok(MatrixEntryIterator {
            cursor: OuterCursor::attach(m)?,
            started: false,
        })
    }

    /// Step to the next entry, crossing vector boundaries
    pub fn next(&mut self) -> CursorStatus {
        let status = if !self.started {
            self.started = true;
            self.cursor.seek(0)
        } else {
            self.cursor.next_entry()
        };
        match status {
            CursorStatus::Success => CursorStatus::Success,
            _ => loop {
                match self.cursor.next_vector() {
                    CursorStatus::Success => break CursorStatus::Success,
                    CursorStatus::NoValue => continue,
                    CursorStatus::Exhausted => break CursorStatus::Exhausted,
                }
            },
        }
    }

    pub fn row_index(&self) -> u64 {
        let (r, _) = self
            .cursor
            .m
            .to_row_col(self.cursor.outer, self.cursor.inner_index());
        r
    }

    pub fn col_index(&self) -> u64 {
        let (_, c) = self
            .cursor
            .m
            .to_row_col(self.cursor.outer, self.cursor.inner_index());
        c
    }

    pub fn value(&self) -> ScalarValue {
        self.cursor.value()
    }
}

/// Cursor over the entries of a vector
pub struct VectorEntryIterator<'a> {
    inner: MatrixEntryIterator<'a>,
}

impl<'a> VectorEntryIterator<'a> {
    pub fn attach(v: &'a Vector) -> Result<VectorEntryIterator<'a>, GblasError> {
        Ok(VectorEntryIterator {
            inner: MatrixEntryIterator::attach(v.as_matrix())?,
        })
    }

    pub fn next(&mut self) -> CursorStatus {
        self.inner.next()
    }

    pub fn index(&self) -> u64 {
        self.inner.row_index()
    }

    pub fn value(&self) -> ScalarValue {
        self.inner.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Form, WaitMode};
    use crate::types::{ScalarType, ScalarValue};

    fn sample() -> Matrix {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 4).unwrap();
        m.set_element(0, 1, ScalarValue::Int32(1)).unwrap();
        m.set_element(0, 3, ScalarValue::Int32(2)).unwrap();
        m.set_element(2, 0, ScalarValue::Int32(3)).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        m
    }

    #[test]
    fn attach_requires_materialization() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        m.set_element(0, 0, ScalarValue::Int32(1)).unwrap();
        if m.has_deferred_work() {
            assert!(MatrixEntryIterator::attach(&m).is_err());
        }
    }

    #[test]
    fn entry_iterator_visits_everything_then_exhausts() {
        let m = sample();
        let mut it = MatrixEntryIterator::attach(&m).unwrap();
        let mut seen = Vec::new();
        loop {
            match it.next() {
                CursorStatus::Success => {
                    seen.push((it.row_index(), it.col_index(), it.value()))
                }
                CursorStatus::Exhausted => break,
                CursorStatus::NoValue => unreachable!("next crosses empty vectors"),
            }
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&(0, 3, ScalarValue::Int32(2))));
        assert_eq!(it.next(), CursorStatus::Exhausted);
    }

    #[test]
    fn row_iterator_requires_row_orientation() {
        let m = sample();
        // freshly built matrices are column-oriented
        assert!(RowIterator::attach(&m).is_err());
        let mut by_row = m.dup();
        by_row.reorient(Orientation::ByRow).unwrap();
        let mut it = RowIterator::attach(&by_row).unwrap();
        assert_eq!(it.seek_row(0), CursorStatus::Success);
        assert_eq!(it.col_index(), 1);
        assert_eq!(it.next_entry(), CursorStatus::Success);
        assert_eq!(it.col_index(), 3);
        assert_eq!(it.next_entry(), CursorStatus::NoValue);
        // row 1 is empty
        assert_eq!(it.next_row(), CursorStatus::NoValue);
        assert_eq!(it.next_row(), CursorStatus::Success);
        assert_eq!(it.row_index(), 2);
        assert_eq!(it.seek_row(3), CursorStatus::Exhausted);
    }

    #[test]
    fn col_iterator_walks_a_column() {
        let m = sample();
        let mut it = ColIterator::attach(&m).unwrap();
        assert_eq!(it.seek_col(3), CursorStatus::Success);
        assert_eq!(it.row_index(), 0);
        assert_eq!(it.value(), ScalarValue::Int32(2));
        assert_eq!(it.seek_col(2), CursorStatus::NoValue);
    }

    #[test]
    fn bitmap_iteration_skips_absent_cells() {
        let mut m = sample();
        m.to_form(Form::Bitmap).unwrap();
        let mut it = MatrixEntryIterator::attach(&m).unwrap();
        let mut count = 0;
        while it.next() == CursorStatus::Success {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn vector_cursor_reports_indices() {
        let mut v = crate::vector::Vector::new(&ScalarType::fp64(), 6).unwrap();
        v.set_element(2, ScalarValue::Fp64(0.5)).unwrap();
        v.set_element(5, ScalarValue::Fp64(1.5)).unwrap();
        v.wait(WaitMode::Materialize).unwrap();
        let mut it = VectorEntryIterator::attach(&v).unwrap();
        assert_eq!(it.next(), CursorStatus::Success);
        assert_eq!(it.index(), 2);
        assert_eq!(it.next(), CursorStatus::Success);
        assert_eq!(it.index(), 5);
        assert_eq!(it.value(), ScalarValue::Fp64(1.5));
        assert_eq!(it.next(), CursorStatus::Exhausted);
    }
}
