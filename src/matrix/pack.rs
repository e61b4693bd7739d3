use crate::descriptor::ImportTrust;
use crate::error::GblasError;
use crate::matrix::store::{HyperHash, Store};
use crate::matrix::{Form, Matrix, Orientation};
use crate::types::ValueStore;

/// Caller-side arrays of a sparse (CSR/CSC) matrix
///
/// Packing moves these into the matrix; unpacking moves them back out. The
/// move is atomic: after a successful pack the caller no longer holds the
/// arrays, and after an unpack the matrix is alive but contentless.
#[derive(Debug)]
pub struct SparseArrays {
    pub ptr: Vec<u64>,
    pub idx: Vec<u64>,
    pub values: ValueStore,
    pub iso: bool,
    pub jumbled: bool,
}

/// Caller-side arrays of a hypersparse (HyperCSR/HyperCSC) matrix
#[derive(Debug)]
pub struct HyperArrays {
    pub vec_ids: Vec<u64>,
    pub ptr: Vec<u64>,
    pub idx: Vec<u64>,
    pub values: ValueStore,
    pub iso: bool,
    pub jumbled: bool,
}

/// Caller-side arrays of a bitmap (BitmapR/BitmapC) matrix
#[derive(Debug)]
pub struct BitmapArrays {
    pub present: Vec<u8>,
    pub values: ValueStore,
    pub nvals: u64,
    pub iso: bool,
}

/// Caller-side value array of a full matrix or vector
#[derive(Debug)]
pub struct FullArrays {
    pub values: ValueStore,
    pub iso: bool,
}

impl Matrix {
    /// Pack CSC arrays; previous content (deferred work included) is dropped
    pub fn pack_csc(&mut self, arrays: SparseArrays, trust: ImportTrust) -> Result<(), GblasError> {
        self.pack_sparse(arrays, Orientation::ByCol, trust)
    }

    pub fn pack_csr(&mut self, arrays: SparseArrays, trust: ImportTrust) -> Result<(), GblasError> {
        self.pack_sparse(arrays, Orientation::ByRow, trust)
    }

    pub fn pack_hyper_csc(
        &mut self,
        arrays: HyperArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        self.pack_hyper(arrays, Orientation::ByCol, trust)
    }

    pub fn pack_hyper_csr(
        &mut self,
        arrays: HyperArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        self.pack_hyper(arrays, Orientation::ByRow, trust)
    }

    pub fn pack_bitmap_c(
        &mut self,
        arrays: BitmapArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        self.pack_bitmap(arrays, Orientation::ByCol, trust)
    }

    pub fn pack_bitmap_r(
        &mut self,
        arrays: BitmapArrays,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        self.pack_bitmap(arrays, Orientation::ByRow, trust)
    }

    pub fn pack_full(&mut self, arrays: FullArrays) -> Result<(), GblasError> {
        let cells = (self.nrows * self.ncols) as usize;
        let expected = if arrays.iso { 1 } else { cells };
        if arrays.values.len() != expected {
            return Err(GblasError::InsufficientSpace(format!(
                "full pack needs {} values, got {}",
                expected,
                arrays.values.len()
            )));
        }
        self.check_value_domain(&arrays.values)?;
        self.reset_deferred();
        self.orientation = Orientation::ByCol;
        self.store = Store::Full {
            values: arrays.values,
        };
        self.iso = arrays.iso;
        Ok(())
    }

    fn pack_sparse(
        &mut self,
        arrays: SparseArrays,
        orientation: Orientation,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        let outer = match orientation {
            Orientation::ByRow => self.nrows,
            Orientation::ByCol => self.ncols,
        };
        let inner = match orientation {
            Orientation::ByRow => self.ncols,
            Orientation::ByCol => self.nrows,
        };
        if arrays.ptr.len() as u64 != outer + 1 {
            return Err(GblasError::InvalidValue(format!(
                "sparse pack needs {} vector pointers, got {}",
                outer + 1,
                arrays.ptr.len()
            )));
        }
        self.check_packed_values(&arrays.values, arrays.idx.len(), arrays.iso)?;
        if trust == ImportTrust::Secure {
            check_ptr(&arrays.ptr, arrays.idx.len())?;
            check_idx(&arrays.ptr, &arrays.idx, inner, arrays.jumbled)?;
        }
        self.reset_deferred();
        self.orientation = orientation;
        self.store = Store::Sparse {
            ptr: arrays.ptr,
            idx: arrays.idx,
            values: arrays.values,
        };
        self.iso = arrays.iso;
        self.jumbled = arrays.jumbled;
        Ok(())
    }

    fn pack_hyper(
        &mut self,
        arrays: HyperArrays,
        orientation: Orientation,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        let outer = match orientation {
            Orientation::ByRow => self.nrows,
            Orientation::ByCol => self.ncols,
        };
        let inner = match orientation {
            Orientation::ByRow => self.ncols,
            Orientation::ByCol => self.nrows,
        };
        if arrays.ptr.len() != arrays.vec_ids.len() + 1 {
            return Err(GblasError::InvalidValue(
                "hypersparse pack needs one pointer per listed vector".to_string(),
            ));
        }
        self.check_packed_values(&arrays.values, arrays.idx.len(), arrays.iso)?;
        if trust == ImportTrust::Secure {
            check_ptr(&arrays.ptr, arrays.idx.len())?;
            check_idx(&arrays.ptr, &arrays.idx, inner, arrays.jumbled)?;
            if !arrays.vec_ids.windows(2).all(|w| w[0] < w[1]) {
                return Err(GblasError::InvalidObject(
                    "hypersparse vector ids must be strictly increasing".to_string(),
                ));
            }
            if arrays.vec_ids.last().is_some_and(|&j| j >= outer) {
                return Err(GblasError::IndexOutOfBounds(
                    "hypersparse vector id beyond the outer dimension".to_string(),
                ));
            }
        }
        self.reset_deferred();
        self.orientation = orientation;
        self.store = Store::Hyper {
            vec_ids: arrays.vec_ids,
            ptr: arrays.ptr,
            idx: arrays.idx,
            values: arrays.values,
        };
        self.iso = arrays.iso;
        self.jumbled = arrays.jumbled;
        Ok(())
    }

    fn pack_bitmap(
        &mut self,
        arrays: BitmapArrays,
        orientation: Orientation,
        trust: ImportTrust,
    ) -> Result<(), GblasError> {
        let cells = (self.nrows * self.ncols) as usize;
        if arrays.present.len() != cells {
            return Err(GblasError::InsufficientSpace(format!(
                "bitmap pack needs {} presence bytes, got {}",
                cells,
                arrays.present.len()
            )));
        }
        let expected = if arrays.iso { 1 } else { cells };
        if arrays.values.len() != expected {
            return Err(GblasError::InsufficientSpace(format!(
                "bitmap pack needs {} values, got {}",
                expected,
                arrays.values.len()
            )));
        }
        self.check_value_domain(&arrays.values)?;
        if trust == ImportTrust::Secure {
            let counted = arrays.present.iter().filter(|&&b| b != 0).count() as u64;
            if counted != arrays.nvals {
                return Err(GblasError::InvalidObject(format!(
                    "bitmap claims {} entries but {} cells are present",
                    arrays.nvals, counted
                )));
            }
        }
        self.reset_deferred();
        self.orientation = orientation;
        self.store = Store::Bitmap {
            present: arrays.present,
            values: arrays.values,
            nvals: arrays.nvals,
        };
        self.iso = arrays.iso;
        Ok(())
    }

    /// Unpack CSC arrays, converting first when the form differs; the matrix
    /// stays alive with no content
    pub fn unpack_csc(&mut self) -> Result<SparseArrays, GblasError> {
        self.unpack_sparse(Orientation::ByCol)
    }

    pub fn unpack_csr(&mut self) -> Result<SparseArrays, GblasError> {
        self.unpack_sparse(Orientation::ByRow)
    }

    pub fn unpack_hyper_csc(&mut self) -> Result<HyperArrays, GblasError> {
        self.unpack_hyper(Orientation::ByCol)
    }

    pub fn unpack_hyper_csr(&mut self) -> Result<HyperArrays, GblasError> {
        self.unpack_hyper(Orientation::ByRow)
    }

    pub fn unpack_bitmap_c(&mut self) -> Result<BitmapArrays, GblasError> {
        self.unpack_bitmap(Orientation::ByCol)
    }

    pub fn unpack_bitmap_r(&mut self) -> Result<BitmapArrays, GblasError> {
        self.unpack_bitmap(Orientation::ByRow)
    }

    pub fn unpack_full(&mut self) -> Result<FullArrays, GblasError> {
        self.finish()?;
        self.to_form(Form::Full)?;
        if self.form() != Form::Full {
            return Err(GblasError::InvalidValue(
                "matrix has empty cells; a full unpack is impossible".to_string(),
            ));
        }
        let iso = self.iso;
        if let Store::Full { values } = std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty)) {
            self.iso = false;
            Ok(FullArrays { values, iso })
        } else {
            unreachable!()
        }
    }

    fn unpack_sparse(&mut self, orientation: Orientation) -> Result<SparseArrays, GblasError> {
        self.finish()?;
        self.reorient(orientation)?;
        self.to_form(Form::Sparse)?;
        let (iso, jumbled) = (self.iso, self.jumbled);
        if let Store::Sparse { ptr, idx, values } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            self.iso = false;
            self.jumbled = false;
            Ok(SparseArrays {
                ptr,
                idx,
                values,
                iso,
                jumbled,
            })
        } else {
            unreachable!()
        }
    }

    fn unpack_hyper(&mut self, orientation: Orientation) -> Result<HyperArrays, GblasError> {
        self.finish()?;
        self.reorient(orientation)?;
        self.to_form(Form::Hypersparse)?;
        let (iso, jumbled) = (self.iso, self.jumbled);
        self.hyper_hash = None;
        if let Store::Hyper {
            vec_ids,
            ptr,
            idx,
            values,
        } = std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            self.iso = false;
            self.jumbled = false;
            Ok(HyperArrays {
                vec_ids,
                ptr,
                idx,
                values,
                iso,
                jumbled,
            })
        } else {
            unreachable!()
        }
    }

    fn unpack_bitmap(&mut self, orientation: Orientation) -> Result<BitmapArrays, GblasError> {
        self.finish()?;
        self.reorient(orientation)?;
        self.to_form(Form::Bitmap)?;
        let iso = self.iso;
        if let Store::Bitmap {
            present,
            values,
            nvals,
        } = std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            self.iso = false;
            Ok(BitmapArrays {
                present,
                values,
                nvals,
                iso,
            })
        } else {
            unreachable!()
        }
    }

    /// Detach the hypersparse lookup hash; the matrix remains valid and the
    /// hash is rebuilt on demand
    pub fn unpack_hyper_hash(&mut self) -> Result<Option<HyperHash>, GblasError> {
        Ok(self.hyper_hash.take())
    }

    /// Re-attach a previously unpacked hash; invalid on a non-hypersparse
    /// matrix
    pub fn pack_hyper_hash(&mut self, hash: HyperHash) -> Result<(), GblasError> {
        if self.form() != Form::Hypersparse {
            return Err(GblasError::InvalidValue(
                "hyper hash belongs to a hypersparse matrix".to_string(),
            ));
        }
        self.hyper_hash = Some(hash);
        Ok(())
    }

    fn reset_deferred(&mut self) {
        self.pending = None;
        self.nzombies = 0;
        self.jumbled = false;
        self.hyper_hash = None;
    }

    fn check_value_domain(&self, values: &ValueStore) -> Result<(), GblasError> {
        if values.type_code() != self.ty.code() {
            return Err(GblasError::DomainMismatch(
                "packed values do not match the matrix domain".to_string(),
            ));
        }
        Ok(())
    }

    fn check_packed_values(
        &self,
        values: &ValueStore,
        nvals: usize,
        iso: bool,
    ) -> Result<(), GblasError> {
        self.check_value_domain(values)?;
        let expected = if iso { 1 } else { nvals };
        if values.len() != expected {
            return Err(GblasError::InsufficientSpace(format!(
                "pack needs {} values, got {}",
                expected,
                values.len()
            )));
        }
        Ok(())
    }
}

fn check_ptr(ptr: &[u64], nvals: usize) -> Result<(), GblasError> {
    if ptr.first() != Some(&0) {
        return Err(GblasError::InvalidObject(
            "vector pointers must start at zero".to_string(),
        ));
    }
    if !ptr.windows(2).all(|w| w[0] <= w[1]) {
        return Err(GblasError::InvalidObject(
            "vector pointers must be monotone".to_string(),
        ));
    }
    if ptr.last() != Some(&(nvals as u64)) {
        return Err(GblasError::InvalidObject(
            "vector pointers must end at the entry count".to_string(),
        ));
    }
    Ok(())
}

fn check_idx(ptr: &[u64], idx: &[u64], inner: u64, jumbled: bool) -> Result<(), GblasError> {
    for v in 0..ptr.len() - 1 {
        let range = ptr[v] as usize..ptr[v + 1] as usize;
        for p in range.clone() {
            if idx[p] >= inner {
                return Err(GblasError::IndexOutOfBounds(
                    "inner index beyond the inner dimension".to_string(),
                ));
            }
        }
        if !jumbled && !idx[range].windows(2).all(|w| w[0] < w[1]) {
            return Err(GblasError::InvalidObject(
                "inner indices must be strictly increasing per vector".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScalarType, ScalarValue};

    fn int_store(vals: &[i32]) -> ValueStore {
        let mut s = ValueStore::new(&ScalarType::int32());
        for &v in vals {
            s.push(ScalarValue::Int32(v));
        }
        s
    }

    #[test]
    fn csc_pack_unpack_round_trip() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let arrays = SparseArrays {
            ptr: vec![0, 1, 2, 3],
            idx: vec![0, 2, 1],
            values: int_store(&[10, 20, 30]),
            iso: false,
            jumbled: false,
        };
        m.pack_csc(arrays, ImportTrust::Secure).unwrap();
        assert_eq!(m.nvals().unwrap(), 3);
        assert_eq!(
            m.extract_element(2, 1).unwrap(),
            Some(ScalarValue::Int32(20))
        );

        let out = m.unpack_csc().unwrap();
        assert_eq!(m.nvals().unwrap(), 0);
        assert_eq!(out.ptr, vec![0, 1, 2, 3]);
        assert_eq!(out.idx, vec![0, 2, 1]);

        m.pack_csc(out, ImportTrust::Secure).unwrap();
        assert_eq!(
            m.extract_element(2, 1).unwrap(),
            Some(ScalarValue::Int32(20))
        );
    }

    #[test]
    fn secure_pack_rejects_bad_pointers() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let arrays = SparseArrays {
            ptr: vec![0, 2, 1, 3],
            idx: vec![0, 1, 2],
            values: int_store(&[1, 2, 3]),
            iso: false,
            jumbled: false,
        };
        assert!(matches!(
            m.pack_csc(arrays, ImportTrust::Secure).unwrap_err(),
            GblasError::InvalidObject(_)
        ));
    }

    #[test]
    fn fast_pack_skips_the_deep_check() {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let arrays = SparseArrays {
            ptr: vec![0, 1, 1, 1],
            idx: vec![0],
            values: int_store(&[1]),
            iso: false,
            jumbled: false,
        };
        m.pack_csr(arrays, ImportTrust::Fast).unwrap();
        assert_eq!(m.nvals().unwrap(), 1);
    }

    #[test]
    fn bitmap_round_trip() {
        let mut m = Matrix::new(&ScalarType::int32(), 2, 2).unwrap();
        let arrays = BitmapArrays {
            present: vec![1, 0, 0, 1],
            values: int_store(&[5, 0, 0, 8]),
            nvals: 2,
            iso: false,
        };
        m.pack_bitmap_c(arrays, ImportTrust::Secure).unwrap();
        assert_eq!(
            m.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(8))
        );
        let out = m.unpack_bitmap_c().unwrap();
        assert_eq!(out.nvals, 2);
        assert_eq!(m.nvals().unwrap(), 0);
    }

    #[test]
    fn hyper_round_trip_and_hash_transfer() {
        let mut m = Matrix::new(&ScalarType::int32(), 100, 100).unwrap();
        let arrays = HyperArrays {
            vec_ids: vec![7, 50],
            ptr: vec![0, 1, 3],
            idx: vec![3, 0, 99],
            values: int_store(&[1, 2, 3]),
            iso: false,
            jumbled: false,
        };
        m.pack_hyper_csc(arrays, ImportTrust::Secure).unwrap();
        assert_eq!(
            m.extract_element(99, 50).unwrap(),
            Some(ScalarValue::Int32(3))
        );
        let hash = m.unpack_hyper_hash().unwrap();
        // no hash was built for so small a vector list
        assert!(hash.is_none());
        let out = m.unpack_hyper_csc().unwrap();
        assert_eq!(out.vec_ids, vec![7, 50]);
        assert_eq!(m.nvals().unwrap(), 0);
    }

    #[test]
    fn unpack_converts_the_form_first() {
        let mut m = Matrix::new(&ScalarType::int32(), 2, 2).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                m.set_element(r, c, ScalarValue::Int32((r * 2 + c) as i32))
                    .unwrap();
            }
        }
        // fully dense; the natural form is full, but a CSR unpack still works
        let out = m.unpack_csr().unwrap();
        assert_eq!(out.ptr, vec![0, 2, 4]);
        assert_eq!(out.idx, vec![0, 1, 0, 1]);
    }
}
