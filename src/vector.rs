use crate::descriptor::ImportTrust;
use crate::error::GblasError;
use crate::matrix::pack::{BitmapArrays, FullArrays, SparseArrays};
use crate::matrix::{Form, Matrix, WaitMode};
use crate::ops::BinaryOp;
use crate::types::{ScalarType, ScalarValue, ValueStore};

/// An n×1 matrix in a single-vector storage form
///
/// Every operation delegates to the matrix core; the wrapper fixes the
/// shape and strips the column index from the API.
#[derive(Clone, Debug)]
pub struct Vector {
    pub(crate) m: Matrix,
}

/// Caller-side arrays of a sparse vector
#[derive(Debug)]
pub struct VectorSparseArrays {
    pub idx: Vec<u64>,
    pub values: ValueStore,
    pub iso: bool,
    pub jumbled: bool,
}

impl Vector {
    pub fn new(ty: &ScalarType, size: u64) -> Result<Vector, GblasError> {
        Ok(Vector {
            m: Matrix::new(ty, size, 1)?,
        })
    }

    pub fn dup(&self) -> Vector {
        self.clone()
    }

    pub fn size(&self) -> u64 {
        self.m.nrows()
    }

    pub fn vec_type(&self) -> &ScalarType {
        self.m.mat_type()
    }

    pub fn form(&self) -> Form {
        self.m.form()
    }

    pub fn is_iso(&self) -> bool {
        self.m.is_iso()
    }

    pub fn nvals(&mut self) -> Result<u64, GblasError> {
        self.m.nvals()
    }

    pub fn clear(&mut self) {
        self.m.clear()
    }

    pub fn resize(&mut self, size: u64) -> Result<(), GblasError> {
        self.m.resize(size, 1)
    }

    pub fn wait(&mut self, mode: WaitMode) -> Result<(), GblasError> {
        self.m.wait(mode)
    }

    pub fn set_element(&mut self, i: u64, value: ScalarValue) -> Result<(), GblasError> {
        self.m.set_element(i, 0, value)
    }

    pub fn remove_element(&mut self, i: u64) -> Result<(), GblasError> {
        self.m.remove_element(i, 0)
    }

    pub fn extract_element(&self, i: u64) -> Result<Option<ScalarValue>, GblasError> {
        self.m.extract_element(i, 0)
    }

    pub fn build(
        &mut self,
        indices: &[u64],
        values: &ValueStore,
        dup: Option<&BinaryOp>,
    ) -> Result<(), GblasError> {
        let cols = vec![0u64; indices.len()];
        self.m.build(indices, &cols, values, dup)
    }

    pub fn extract_tuples(&mut self) -> Result<(Vec<u64>, ValueStore), GblasError> {
        let (rows, _cols, values) = self.m.extract_tuples()?;
        Ok((rows, values))
    }

    pub fn eq_vector(&mut self, other: &mut Vector) -> Result<bool, GblasError> {
        self.m.eq_matrix(&mut other.m)
    }

    /// Pack sparse arrays (CSC with a single vector)
    pub fn pack_sparse(
        &mut self,
        arrays: VectorSparseArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        let nvals = arrays.idx.len() as u64;
        self.m.pack_csc(
            SparseArrays {
                ptr: vec![0, nvals],
                idx: arrays.idx,
                values: arrays.values,
                iso: arrays.iso,
                jumbled: arrays.jumbled,
            },
            trust,
        )
    }

    pub fn unpack_sparse(&mut self) -> Result<VectorSparseArrays, GblasError> {
        let out = self.m.unpack_csc()?;
        Ok(VectorSparseArrays {
            idx: out.idx,
            values: out.values,
            iso: out.iso,
            jumbled: out.jumbled,
        })
    }

    pub fn pack_bitmap(
        &mut self,
        arrays: BitmapArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        self.m.pack_bitmap_c(arrays, trust)
    }

    pub fn unpack_bitmap(&mut self) -> Result<BitmapArrays, GblasError> {
        self.m.unpack_bitmap_c()
    }

    pub fn pack_full(&mut self, arrays: FullArrays) -> Result<(), GblasError> {
        self.m.pack_full(arrays)
    }

    pub fn unpack_full(&mut self) -> Result<FullArrays, GblasError> {
        self.m.unpack_full()
    }

    /// View as the underlying n×1 matrix
    pub fn as_matrix(&self) -> &Matrix {
        &self.m
    }

    pub fn as_matrix_mut(&mut self) -> &mut Matrix {
        &mut self.m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_is_a_single_column() {
        let mut v = Vector::new(&ScalarType::fp64(), 10).unwrap();
        v.set_element(3, ScalarValue::Fp64(2.5)).unwrap();
        assert_eq!(v.nvals().unwrap(), 1);
        assert_eq!(
            v.extract_element(3).unwrap(),
            Some(ScalarValue::Fp64(2.5))
        );
        assert_eq!(v.as_matrix().ncols(), 1);
    }

    #[test]
    fn sparse_pack_round_trip() {
        let mut v = Vector::new(&ScalarType::int32(), 6).unwrap();
        let mut values = ValueStore::new(&ScalarType::int32());
        values.push(ScalarValue::Int32(4));
        values.push(ScalarValue::Int32(9));
        v.pack_sparse(
            VectorSparseArrays {
                idx: vec![1, 5],
                values,
                iso: false,
                jumbled: false,
            },
            ImportTrust::Secure,
        )
        .unwrap();
        assert_eq!(v.extract_element(5).unwrap(), Some(ScalarValue::Int32(9)));
        let out = v.unpack_sparse().unwrap();
        assert_eq!(out.idx, vec![1, 5]);
        assert_eq!(v.nvals().unwrap(), 0);
    }
}
