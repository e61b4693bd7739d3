/// Bulk construction from tuples and the inverse extraction
pub mod build;
/// Element-level set, remove, and extract
pub mod element;
/// Storage-form conversions and the form-selection controller
pub mod form;
/// Pack/unpack: atomic ownership transfer of interior arrays
pub mod pack;
/// Pending tuples, zombies, jumbled order, and materialization
pub mod pending;
/// Serialization to and from a self-describing byte blob
pub mod serialize;
/// The four storage forms
pub mod store;

#[cfg(feature = "json_export")]
/// Human-readable JSON dump for debugging
pub mod json_export;

use crate::error::GblasError;
use crate::types::{ScalarType, ScalarValue, TypeCode, ValueStore, INDEX_MAX};
use pending::PendingTuples;
use store::{HyperHash, Store};

/// Default fraction of non-empty outer vectors below which a matrix goes
/// hypersparse
pub const DEFAULT_HYPER_SWITCH: f64 = 0.0625;
/// Default density above which a matrix goes bitmap
pub const DEFAULT_BITMAP_SWITCH: f64 = 0.04;

/// Which dimension the outer arrays run over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// CSR-like: outer vectors are rows
    ByRow,
    /// CSC-like: outer vectors are columns
    ByCol,
}

impl Orientation {
    pub fn opposite(self) -> Orientation {
        match self {
            Orientation::ByRow => Orientation::ByCol,
            Orientation::ByCol => Orientation::ByRow,
        }
    }
}

/// The four interchangeable storage forms
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Form {
    Hypersparse,
    Sparse,
    Bitmap,
    Full,
}

impl Form {
    pub(crate) fn rank(self) -> usize {
        match self {
            Form::Hypersparse => 0,
            Form::Sparse => 1,
            Form::Bitmap => 2,
            Form::Full => 3,
        }
    }

    pub(crate) fn from_rank(rank: usize) -> Form {
        match rank {
            0 => Form::Hypersparse,
            1 => Form::Sparse,
            2 => Form::Bitmap,
            _ => Form::Full,
        }
    }
}

/// Bitmask of storage forms a matrix is permitted to take
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SparsityControl(pub u8);

impl SparsityControl {
    pub const HYPERSPARSE: SparsityControl = SparsityControl(1);
    pub const SPARSE: SparsityControl = SparsityControl(2);
    pub const BITMAP: SparsityControl = SparsityControl(4);
    pub const FULL: SparsityControl = SparsityControl(8);
    pub const AUTO: SparsityControl = SparsityControl(15);

    pub fn allows(self, form: Form) -> bool {
        self.0 & (1u8 << form.rank()) != 0
    }

    pub fn union(self, other: SparsityControl) -> SparsityControl {
        SparsityControl(self.0 | other.0)
    }
}

/// Sentinel bit marking a removed-but-not-compacted entry in an inner index
pub(crate) const ZOMBIE_BIT: u64 = 1u64 << 63;

pub(crate) fn zombie(idx: u64) -> u64 {
    idx | ZOMBIE_BIT
}

pub(crate) fn is_zombie(idx: u64) -> bool {
    idx & ZOMBIE_BIT != 0
}

pub(crate) fn dezombie(idx: u64) -> u64 {
    idx & !ZOMBIE_BIT
}

/// The polymorphic sparse container
///
/// An m×n collection of typed entries in one of four storage forms, able to
/// carry deferred work (pending tuples, zombies, jumbled order) between
/// operations.
#[derive(Clone, Debug)]
pub struct Matrix {
    pub(crate) ty: ScalarType,
    pub(crate) nrows: u64,
    pub(crate) ncols: u64,
    pub(crate) orientation: Orientation,
    pub(crate) store: Store,
    /// All present entries share the single stored value
    pub(crate) iso: bool,
    /// Inner indices within a vector may be unsorted
    pub(crate) jumbled: bool,
    pub(crate) nzombies: u64,
    pub(crate) pending: Option<PendingTuples>,
    pub(crate) sparsity_control: SparsityControl,
    pub(crate) hyper_switch: f64,
    pub(crate) bitmap_switch: f64,
    pub(crate) hyper_hash: Option<HyperHash>,
}

impl Matrix {
    /// An empty matrix of the given domain and shape
    pub fn new(ty: &ScalarType, nrows: u64, ncols: u64) -> Result<Matrix, GblasError> {
        if nrows == 0 || ncols == 0 {
            return Err(GblasError::InvalidValue(
                "matrix dimensions must be nonzero".to_string(),
            ));
        }
        if nrows > INDEX_MAX || ncols > INDEX_MAX {
            return Err(GblasError::InvalidIndex(format!(
                "dimension {}x{} exceeds the 2^60 ceiling",
                nrows, ncols
            )));
        }
        let cfg = crate::context::global_config();
        Ok(Matrix {
            ty: ty.clone(),
            nrows,
            ncols,
            orientation: Orientation::ByCol,
            store: Store::empty_hyper(ty),
            iso: false,
            jumbled: false,
            nzombies: 0,
            pending: None,
            sparsity_control: SparsityControl::AUTO,
            hyper_switch: cfg.hyper_switch,
            bitmap_switch: cfg.bitmap_switch,
            hyper_hash: None,
        })
    }

    /// Deep copy, deferred work included
    pub fn dup(&self) -> Matrix {
        self.clone()
    }

    /// Drop all entries, keeping shape, type, and settings
    pub fn clear(&mut self) {
        self.store = Store::empty_hyper(&self.ty);
        self.iso = false;
        self.jumbled = false;
        self.nzombies = 0;
        self.pending = None;
        self.hyper_hash = None;
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn ncols(&self) -> u64 {
        self.ncols
    }

    pub fn mat_type(&self) -> &ScalarType {
        &self.ty
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn form(&self) -> Form {
        self.store.form()
    }

    pub fn is_iso(&self) -> bool {
        self.iso
    }

    pub fn is_jumbled(&self) -> bool {
        self.jumbled
    }

    pub fn sparsity_control(&self) -> SparsityControl {
        self.sparsity_control
    }

    /// Restrict the permitted storage forms and reconform immediately
    pub fn set_sparsity_control(&mut self, control: SparsityControl) -> Result<(), GblasError> {
        if control.0 == 0 || control.0 > SparsityControl::AUTO.0 {
            return Err(GblasError::InvalidValue(
                "sparsity control must permit at least one form".to_string(),
            ));
        }
        self.sparsity_control = control;
        self.finish()?;
        self.conform()
    }

    pub fn set_hyper_switch(&mut self, switch: f64) -> Result<(), GblasError> {
        if !(0.0..=1.0).contains(&switch) {
            return Err(GblasError::InvalidValue(
                "hyper_switch must lie in [0,1]".to_string(),
            ));
        }
        self.hyper_switch = switch;
        Ok(())
    }

    pub fn set_bitmap_switch(&mut self, switch: f64) -> Result<(), GblasError> {
        if !(0.0..=1.0).contains(&switch) {
            return Err(GblasError::InvalidValue(
                "bitmap_switch must lie in [0,1]".to_string(),
            ));
        }
        self.bitmap_switch = switch;
        Ok(())
    }

    /// Number of stored entries; drains deferred work first
    pub fn nvals(&mut self) -> Result<u64, GblasError> {
        self.finish()?;
        Ok(self.nvals_finished())
    }

    /// Entry count of a drained matrix
    pub(crate) fn nvals_finished(&self) -> u64 {
        debug_assert!(!self.has_deferred_work());
        match &self.store {
            Store::Hyper { idx, .. } | Store::Sparse { idx, .. } => idx.len() as u64,
            Store::Bitmap { nvals, .. } => *nvals,
            Store::Full { .. } => self.outer_dim() * self.inner_dim(),
        }
    }

    pub(crate) fn has_deferred_work(&self) -> bool {
        self.pending.is_some() || self.nzombies > 0 || self.jumbled
    }

    /// Length of the outer dimension under the current orientation
    pub(crate) fn outer_dim(&self) -> u64 {
        match self.orientation {
            Orientation::ByRow => self.nrows,
            Orientation::ByCol => self.ncols,
        }
    }

    pub(crate) fn inner_dim(&self) -> u64 {
        match self.orientation {
            Orientation::ByRow => self.ncols,
            Orientation::ByCol => self.nrows,
        }
    }

    /// Map a logical (row, col) onto (outer, inner)
    pub(crate) fn to_outer_inner(&self, row: u64, col: u64) -> (u64, u64) {
        match self.orientation {
            Orientation::ByRow => (row, col),
            Orientation::ByCol => (col, row),
        }
    }

    /// Map (outer, inner) back onto logical (row, col)
    pub(crate) fn to_row_col(&self, outer: u64, inner: u64) -> (u64, u64) {
        match self.orientation {
            Orientation::ByRow => (outer, inner),
            Orientation::ByCol => (inner, outer),
        }
    }

    /// Value at storage position `p`, honoring the iso flag
    pub(crate) fn value_at(&self, p: usize) -> ScalarValue {
        let values = self.store.values();
        if self.iso {
            values.get(0)
        } else {
            values.get(p)
        }
    }

    /// Expand the single iso value into a dense value array
    pub(crate) fn expand_iso(&mut self) {
        if !self.iso {
            return;
        }
        let n = match &self.store {
            Store::Hyper { idx, .. } | Store::Sparse { idx, .. } => idx.len(),
            Store::Bitmap { present, .. } => present.len(),
            Store::Full { .. } => (self.outer_dim() * self.inner_dim()) as usize,
        };
        let value = self.store.values().get(0);
        *self.store.values_mut() = ValueStore::repeat(&self.ty, &value, n);
        self.iso = false;
    }

    /// Drain pending tuples, compact zombies, and sort jumbled vectors
    ///
    /// Leaves the storage form untouched; [Matrix::conform] chooses the form.
    pub(crate) fn finish(&mut self) -> Result<(), GblasError> {
        pending::materialize(self)
    }

    /// Finish and pick the storage form; the closure of all deferred fixes
    pub fn wait(&mut self, mode: WaitMode) -> Result<(), GblasError> {
        match mode {
            WaitMode::Complete => Ok(()),
            WaitMode::Materialize => {
                self.finish()?;
                self.conform()
            }
        }
    }

    /// Apply the blocking-mode policy after a mutation
    pub(crate) fn honor_blocking_mode(&mut self) -> Result<(), GblasError> {
        if crate::context::mode() == crate::context::Mode::Blocking {
            self.wait(WaitMode::Materialize)?;
        }
        Ok(())
    }

    /// Borrow the sparse arrays if the store is hypersparse or sparse
    pub(crate) fn sparse_read(&self) -> Option<store::SparseRead<'_>> {
        self.store.sparse_read(self.iso)
    }

    /// Replace content with freshly assembled sparse arrays
    ///
    /// `ptr` must cover every outer vector (`outer_dim + 1` entries).
    pub(crate) fn load_sparse(
        &mut self,
        ptr: Vec<u64>,
        idx: Vec<u64>,
        values: ValueStore,
        iso: bool,
        jumbled: bool,
    ) {
        debug_assert_eq!(ptr.len() as u64, self.outer_dim() + 1);
        self.store = Store::Sparse { ptr, idx, values };
        self.iso = iso;
        self.jumbled = jumbled;
        self.nzombies = 0;
        self.pending = None;
        self.hyper_hash = None;
    }

    /// Logical transpose: swapped shape, flipped orientation, same arrays
    pub fn transposed(&self) -> Matrix {
        let mut t = self.clone();
        t.nrows = self.ncols;
        t.ncols = self.nrows;
        t.orientation = self.orientation.opposite();
        // pending tuples hold logical coordinates
        if let Some(p) = &mut t.pending {
            std::mem::swap(&mut p.rows, &mut p.cols);
        }
        t
    }

    /// Grow or shrink; entries outside the new shape are dropped
    pub fn resize(&mut self, nrows: u64, ncols: u64) -> Result<(), GblasError> {
        if nrows == 0 || ncols == 0 || nrows > INDEX_MAX || ncols > INDEX_MAX {
            return Err(GblasError::InvalidIndex(format!(
                "resize to {}x{} is out of range",
                nrows, ncols
            )));
        }
        self.finish()?;
        let (rows, cols, values) = build::extract_parts(self)?;
        let mut kept_rows = Vec::new();
        let mut kept_cols = Vec::new();
        let mut keep = Vec::new();
        for (p, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            if r < nrows && c < ncols {
                kept_rows.push(r);
                kept_cols.push(c);
                keep.push(p);
            }
        }
        let kept_values = values.gather(&keep);
        let mut fresh = Matrix::new(&self.ty, nrows, ncols)?;
        fresh.orientation = self.orientation;
        fresh.sparsity_control = self.sparsity_control;
        fresh.hyper_switch = self.hyper_switch;
        fresh.bitmap_switch = self.bitmap_switch;
        build::build_from_parts(&mut fresh, &kept_rows, &kept_cols, kept_values, None)?;
        *self = fresh;
        Ok(())
    }

    /// All entries as (row, col, value) triples sorted by (row, col)
    ///
    /// Drains deferred work; intended for tests and logical comparison.
    pub fn sorted_triples(&mut self) -> Result<Vec<(u64, u64, ScalarValue)>, GblasError> {
        self.finish()?;
        let (rows, cols, values) = build::extract_parts(self)?;
        let mut triples: Vec<(u64, u64, ScalarValue)> = rows
            .iter()
            .zip(cols.iter())
            .enumerate()
            .map(|(p, (&r, &c))| (r, c, values.get(p)))
            .collect();
        triples.sort_by_key(|&(r, c, _)| (r, c));
        Ok(triples)
    }

    /// Logical equality: same domain, shape, pattern, and values, regardless
    /// of storage form or orientation
    pub fn eq_matrix(&mut self, other: &mut Matrix) -> Result<bool, GblasError> {
        if self.ty.code() != other.ty.code()
            || self.nrows != other.nrows
            || self.ncols != other.ncols
        {
            return Ok(false);
        }
        if self.ty.code() == TypeCode::Udt && self.ty != other.ty {
            return Ok(false);
        }
        Ok(self.sorted_triples()? == other.sorted_triples()?)
    }
}

impl Matrix {
    /// Expand an FP64 matrix into a dense nalgebra matrix
    ///
    /// A debugging and verification bridge; absent entries read as zero.
    pub fn to_dense(&mut self) -> Result<nalgebra::DMatrix<f64>, GblasError> {
        if self.ty.code() != TypeCode::Fp64 {
            return Err(GblasError::DomainMismatch(
                "dense expansion is defined for fp64 matrices".to_string(),
            ));
        }
        let mut dense = nalgebra::DMatrix::<f64>::zeros(self.nrows as usize, self.ncols as usize);
        for (r, c, v) in self.sorted_triples()? {
            if let ScalarValue::Fp64(x) = v {
                dense[(r as usize, c as usize)] = x;
            }
        }
        Ok(dense)
    }

    /// Build an FP64 matrix from a dense nalgebra matrix; exact zeros are
    /// dropped
    pub fn from_dense(dense: &nalgebra::DMatrix<f64>) -> Result<Matrix, GblasError> {
        let mut m = Matrix::new(&ScalarType::fp64(), dense.nrows() as u64, dense.ncols() as u64)?;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = ValueStore::new(&ScalarType::fp64());
        for c in 0..dense.ncols() {
            for r in 0..dense.nrows() {
                let x = dense[(r, c)];
                if x != 0.0 {
                    rows.push(r as u64);
                    cols.push(c as u64);
                    values.push(ScalarValue::Fp64(x));
                }
            }
        }
        m.build(&rows, &cols, &values, None)?;
        Ok(m)
    }
}

/// What `wait` must establish
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// A happens-before barrier for observers; need not drain
    Complete,
    /// Drain pending work and choose a storage form
    Materialize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_matrix_is_empty_hypersparse() {
        let mut m = Matrix::new(&ScalarType::fp64(), 10, 10).unwrap();
        assert_eq!(m.form(), Form::Hypersparse);
        assert_eq!(m.nvals().unwrap(), 0);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(Matrix::new(&ScalarType::fp64(), 0, 4).is_err());
    }

    #[test]
    fn dimension_ceiling_is_enforced() {
        let err = Matrix::new(&ScalarType::bool_type(), INDEX_MAX + 1, 2).unwrap_err();
        assert!(matches!(err, GblasError::InvalidIndex(_)));
    }

    #[test]
    fn transpose_is_a_metadata_flip() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 5).unwrap();
        m.set_element(1, 4, ScalarValue::Int32(9)).unwrap();
        let mut t = m.transposed();
        assert_eq!((t.nrows(), t.ncols()), (5, 3));
        assert_eq!(
            t.extract_element(4, 1).unwrap(),
            Some(ScalarValue::Int32(9))
        );
    }

    #[test]
    fn resize_truncates_outside_entries() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(0, 0, ScalarValue::Int32(1)).unwrap();
        m.set_element(3, 3, ScalarValue::Int32(2)).unwrap();
        m.resize(2, 2).unwrap();
        assert_eq!(m.nvals().unwrap(), 1);
        assert_eq!(
            m.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(1))
        );
    }

    #[test]
    fn sparsity_control_must_permit_something() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        assert!(m.set_sparsity_control(SparsityControl(0)).is_err());
    }
}
