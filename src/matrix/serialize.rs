use crate::descriptor::{Compression, Descriptor};
use crate::error::GblasError;
use crate::matrix::store::Store;
use crate::matrix::{Form, Matrix, Orientation, WaitMode};
use crate::types::{ScalarType, TypeCode, ValueStore};
use bytes::{Buf, BufMut, BytesMut};

const MAGIC: &[u8; 8] = b"GBLSBLOB";
/// Any blob produced by version N is readable by every version >= N
const BLOB_VERSION: u32 = 1;

impl Matrix {
    /// Produce a self-describing transportable byte blob
    ///
    /// Deferred work is materialized first, so the blob always describes a
    /// drained matrix. Only the `None` compression codec has a built-in
    /// backend.
    pub fn serialize(&mut self, desc: &Descriptor) -> Result<Vec<u8>, GblasError> {
        match desc.compression {
            Compression::None => {}
            other => {
                return Err(GblasError::NotImplemented(format!(
                    "compression codec {:?} has no backend",
                    other
                )))
            }
        }
        self.wait(WaitMode::Materialize)?;

        let mut buf = BytesMut::with_capacity(64 + self.store.values().len() * 8);
        buf.put_slice(MAGIC);
        buf.put_u32_le(BLOB_VERSION);
        buf.put_u8(0); // compression: none
        buf.put_i32_le(0); // compression level
        buf.put_u8(self.ty.code() as u8);
        if self.ty.code() == TypeCode::Udt {
            let name = self.ty.name().as_bytes();
            buf.put_u16_le(name.len() as u16);
            buf.put_slice(name);
            buf.put_u64_le(self.ty.size() as u64);
        }
        buf.put_u64_le(self.nrows);
        buf.put_u64_le(self.ncols);
        buf.put_u8(match self.orientation {
            Orientation::ByRow => 0,
            Orientation::ByCol => 1,
        });
        buf.put_u8(self.form().rank() as u8);
        buf.put_u8(self.iso as u8);

        match &self.store {
            Store::Hyper {
                vec_ids,
                ptr,
                idx,
                values,
            } => {
                buf.put_u64_le(vec_ids.len() as u64);
                buf.put_u64_le(idx.len() as u64);
                put_index_array(&mut buf, vec_ids);
                put_index_array(&mut buf, ptr);
                put_index_array(&mut buf, idx);
                put_values(&mut buf, values);
            }
            Store::Sparse { ptr, idx, values } => {
                buf.put_u64_le(idx.len() as u64);
                put_index_array(&mut buf, ptr);
                put_index_array(&mut buf, idx);
                put_values(&mut buf, values);
            }
            Store::Bitmap {
                present,
                values,
                nvals,
            } => {
                buf.put_u64_le(*nvals);
                buf.put_slice(present);
                put_values(&mut buf, values);
            }
            Store::Full { values } => {
                put_values(&mut buf, values);
            }
        }
        Ok(buf.to_vec())
    }

    /// Rebuild a matrix from a blob; user-defined types need a matching
    /// caller-supplied handle
    pub fn deserialize(
        blob: &[u8],
        type_hint: Option<&ScalarType>,
    ) -> Result<Matrix, GblasError> {
        let mut buf = blob;
        if buf.remaining() < MAGIC.len() || &buf[..MAGIC.len()] != MAGIC {
            return Err(GblasError::InvalidValue(
                "blob does not start with the serialization magic".to_string(),
            ));
        }
        buf.advance(MAGIC.len());
        let version = get_u32(&mut buf)?;
        if version > BLOB_VERSION {
            return Err(GblasError::InvalidValue(format!(
                "blob version {} is newer than this engine",
                version
            )));
        }
        let compression = get_u8(&mut buf)?;
        let _level = get_i32(&mut buf)?;
        if compression != 0 {
            return Err(GblasError::NotImplemented(
                "compressed blob has no codec backend".to_string(),
            ));
        }
        let code = TypeCode::from_u8(get_u8(&mut buf)?).ok_or_else(|| {
            GblasError::InvalidValue("blob names an unknown type code".to_string())
        })?;
        let ty = if code == TypeCode::Udt {
            let name_len = get_u16(&mut buf)? as usize;
            if buf.remaining() < name_len {
                return Err(truncated());
            }
            let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
            buf.advance(name_len);
            let size = get_u64(&mut buf)? as usize;
            let hint = type_hint.ok_or_else(|| {
                GblasError::NullPointer("type handle for a user-defined blob".to_string())
            })?;
            if hint.code() != TypeCode::Udt || hint.size() != size {
                return Err(GblasError::DomainMismatch(format!(
                    "blob type {} ({} bytes) does not match the supplied handle",
                    name, size
                )));
            }
            hint.clone()
        } else {
            ScalarType::builtin(code)
        };
        let nrows = get_u64(&mut buf)?;
        let ncols = get_u64(&mut buf)?;
        let orientation = match get_u8(&mut buf)? {
            0 => Orientation::ByRow,
            _ => Orientation::ByCol,
        };
        let form = Form::from_rank(get_u8(&mut buf)? as usize);
        let iso = get_u8(&mut buf)? != 0;

        let mut m = Matrix::new(&ty, nrows, ncols)?;
        m.orientation = orientation;
        m.iso = iso;
        let cells = (m.outer_dim() * m.inner_dim()) as usize;
        m.store = match form {
            Form::Hypersparse => {
                let k = get_u64(&mut buf)? as usize;
                let nvals = get_u64(&mut buf)? as usize;
                let vec_ids = get_index_array(&mut buf, k)?;
                let ptr = get_index_array(&mut buf, k + 1)?;
                let idx = get_index_array(&mut buf, nvals)?;
                let values = get_values(&mut buf, &ty, if iso { 1 } else { nvals })?;
                Store::Hyper {
                    vec_ids,
                    ptr,
                    idx,
                    values,
                }
            }
            Form::Sparse => {
                let nvals = get_u64(&mut buf)? as usize;
                let ptr = get_index_array(&mut buf, m.outer_dim() as usize + 1)?;
                let idx = get_index_array(&mut buf, nvals)?;
                let values = get_values(&mut buf, &ty, if iso { 1 } else { nvals })?;
                Store::Sparse { ptr, idx, values }
            }
            Form::Bitmap => {
                let nvals = get_u64(&mut buf)?;
                if buf.remaining() < cells {
                    return Err(truncated());
                }
                let present = buf[..cells].to_vec();
                buf.advance(cells);
                let values = get_values(&mut buf, &ty, if iso { 1 } else { cells })?;
                Store::Bitmap {
                    present,
                    values,
                    nvals,
                }
            }
            Form::Full => {
                let values = get_values(&mut buf, &ty, if iso { 1 } else { cells })?;
                Store::Full { values }
            }
        };
        Ok(m)
    }
}

fn put_index_array(buf: &mut BytesMut, arr: &[u64]) {
    for &v in arr {
        buf.put_u64_le(v);
    }
}

fn get_index_array(buf: &mut &[u8], n: usize) -> Result<Vec<u64>, GblasError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(get_u64(buf)?);
    }
    Ok(out)
}

fn put_values(buf: &mut BytesMut, values: &ValueStore) {
    buf.put_u64_le(values.len() as u64);
    match values {
        ValueStore::Bool(v) => v.iter().for_each(|&x| buf.put_u8(x as u8)),
        ValueStore::Int8(v) => v.iter().for_each(|&x| buf.put_i8(x)),
        ValueStore::Int16(v) => v.iter().for_each(|&x| buf.put_i16_le(x)),
        ValueStore::Int32(v) => v.iter().for_each(|&x| buf.put_i32_le(x)),
        ValueStore::Int64(v) => v.iter().for_each(|&x| buf.put_i64_le(x)),
        ValueStore::UInt8(v) => v.iter().for_each(|&x| buf.put_u8(x)),
        ValueStore::UInt16(v) => v.iter().for_each(|&x| buf.put_u16_le(x)),
        ValueStore::UInt32(v) => v.iter().for_each(|&x| buf.put_u32_le(x)),
        ValueStore::UInt64(v) => v.iter().for_each(|&x| buf.put_u64_le(x)),
        ValueStore::Fp32(v) => v.iter().for_each(|&x| buf.put_f32_le(x)),
        ValueStore::Fp64(v) => v.iter().for_each(|&x| buf.put_f64_le(x)),
        ValueStore::Fc32(v) => v.iter().for_each(|&x| {
            buf.put_f32_le(x.re);
            buf.put_f32_le(x.im);
        }),
        ValueStore::Fc64(v) => v.iter().for_each(|&x| {
            buf.put_f64_le(x.re);
            buf.put_f64_le(x.im);
        }),
        ValueStore::Udt { data, .. } => buf.put_slice(data),
    }
}

fn get_values(buf: &mut &[u8], ty: &ScalarType, n: usize) -> Result<ValueStore, GblasError> {
    let stored = get_u64(buf)? as usize;
    if stored != n {
        return Err(GblasError::InvalidValue(format!(
            "blob holds {} values where {} belong",
            stored, n
        )));
    }
    let mut out = ValueStore::with_capacity(ty, n);
    match &mut out {
        ValueStore::Bool(v) => {
            for _ in 0..n {
                v.push(get_u8(buf)? != 0);
            }
        }
        ValueStore::Int8(v) => {
            for _ in 0..n {
                v.push(get_u8(buf)? as i8);
            }
        }
        ValueStore::Int16(v) => {
            for _ in 0..n {
                v.push(get_u16(buf)? as i16);
            }
        }
        ValueStore::Int32(v) => {
            for _ in 0..n {
                v.push(get_i32(buf)?);
            }
        }
        ValueStore::Int64(v) => {
            for _ in 0..n {
                v.push(get_u64(buf)? as i64);
            }
        }
        ValueStore::UInt8(v) => {
            for _ in 0..n {
                v.push(get_u8(buf)?);
            }
        }
        ValueStore::UInt16(v) => {
            for _ in 0..n {
                v.push(get_u16(buf)?);
            }
        }
        ValueStore::UInt32(v) => {
            for _ in 0..n {
                v.push(get_u32(buf)?);
            }
        }
        ValueStore::UInt64(v) => {
            for _ in 0..n {
                v.push(get_u64(buf)?);
            }
        }
        ValueStore::Fp32(v) => {
            for _ in 0..n {
                v.push(get_f32(buf)?);
            }
        }
        ValueStore::Fp64(v) => {
            for _ in 0..n {
                v.push(get_f64(buf)?);
            }
        }
        ValueStore::Fc32(v) => {
            for _ in 0..n {
                let re = get_f32(buf)?;
                let im = get_f32(buf)?;
                v.push(num_complex::Complex32::new(re, im));
            }
        }
        ValueStore::Fc64(v) => {
            for _ in 0..n {
                let re = get_f64(buf)?;
                let im = get_f64(buf)?;
                v.push(num_complex::Complex64::new(re, im));
            }
        }
        ValueStore::Udt { data, size } => {
            let bytes = n * *size;
            if buf.remaining() < bytes {
                return Err(truncated());
            }
            data.extend_from_slice(&buf[..bytes]);
            buf.advance(bytes);
        }
    }
    Ok(out)
}

fn truncated() -> GblasError {
    GblasError::InvalidValue("blob is truncated".to_string())
}

macro_rules! checked_get {
    ($name:ident, $t:ty, $get:ident, $bytes:expr) => {
        fn $name(buf: &mut &[u8]) -> Result<$t, GblasError> {
            if buf.remaining() < $bytes {
                return Err(truncated());
            }
            Ok(buf.$get())
        }
    };
}

checked_get!(get_u8, u8, get_u8, 1);
checked_get!(get_u16, u16, get_u16_le, 2);
checked_get!(get_u32, u32, get_u32_le, 4);
checked_get!(get_i32, i32, get_i32_le, 4);
checked_get!(get_u64, u64, get_u64_le, 8);
checked_get!(get_f32, f32, get_f32_le, 4);
checked_get!(get_f64, f64, get_f64_le, 8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarValue;

    fn round_trip(m: &mut Matrix) -> Matrix {
        let blob = m.serialize(&Descriptor::new()).unwrap();
        Matrix::deserialize(&blob, None).unwrap()
    }

    #[test]
    fn round_trip_over_every_form() {
        let entries = [(0u64, 0u64, 1), (1, 2, 5), (2, 1, -3), (3, 3, 9)];
        let mut reference = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        for &(r, c, v) in &entries {
            reference.set_element(r, c, ScalarValue::Int32(v)).unwrap();
        }
        reference.wait(WaitMode::Materialize).unwrap();
        for form in [Form::Hypersparse, Form::Sparse, Form::Bitmap] {
            let mut m = reference.dup();
            m.to_form(form).unwrap();
            let mut back = round_trip(&mut m);
            assert_eq!(back.form(), form);
            assert!(back.eq_matrix(&mut reference).unwrap());
        }
    }

    #[test]
    fn round_trip_full_form() {
        let mut m = Matrix::new(&ScalarType::fp64(), 2, 2).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                m.set_element(r, c, ScalarValue::Fp64((r + c) as f64)).unwrap();
            }
        }
        m.wait(WaitMode::Materialize).unwrap();
        assert_eq!(m.form(), Form::Full);
        let mut back = round_trip(&mut m);
        assert!(back.eq_matrix(&mut m).unwrap());
    }

    #[test]
    fn blob_forces_materialization_of_pending_work() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(1, 1, ScalarValue::Int32(5)).unwrap();
        m.set_element(2, 2, ScalarValue::Int32(6)).unwrap();
        let blob = m.serialize(&Descriptor::new()).unwrap();
        let mut back = Matrix::deserialize(&blob, None).unwrap();
        assert!(!back.has_deferred_work());
        assert_eq!(back.nvals().unwrap(), 2);
    }

    #[test]
    fn iso_matrix_serializes_one_value() {
        let mut m = Matrix::new(&ScalarType::bool_type(), 8, 8).unwrap();
        let mut vals = ValueStore::new(&ScalarType::bool_type());
        for _ in 0..3 {
            vals.push(ScalarValue::Bool(true));
        }
        m.build(&[0, 3, 7], &[1, 4, 2], &vals, None).unwrap();
        assert!(m.is_iso());
        let mut back = round_trip(&mut m);
        assert!(back.is_iso());
        assert!(back.eq_matrix(&mut m).unwrap());
    }

    #[test]
    fn udt_blob_requires_a_matching_handle() {
        let ty = ScalarType::new_udt(4, "quad", None).unwrap();
        let mut m = Matrix::new(&ty, 2, 2).unwrap();
        m.set_element(0, 1, ScalarValue::Udt(vec![1, 2, 3, 4])).unwrap();
        let blob = m.serialize(&Descriptor::new()).unwrap();
        assert!(Matrix::deserialize(&blob, None).is_err());
        let wrong = ScalarType::new_udt(8, "oct", None).unwrap();
        assert!(Matrix::deserialize(&blob, Some(&wrong)).is_err());
        let mut back = Matrix::deserialize(&blob, Some(&ty)).unwrap();
        assert!(back.eq_matrix(&mut m).unwrap());
    }

    #[test]
    fn compression_codecs_are_pluggable_backends() {
        let mut m = Matrix::new(&ScalarType::int32(), 2, 2).unwrap();
        let mut desc = Descriptor::new();
        desc.compression = Compression::Lz4;
        assert!(matches!(
            m.serialize(&desc).unwrap_err(),
            GblasError::NotImplemented(_)
        ));
    }

    #[test]
    fn garbage_blob_is_rejected() {
        assert!(Matrix::deserialize(b"not a blob", None).is_err());
    }
}
