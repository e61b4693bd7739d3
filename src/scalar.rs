use crate::error::GblasError;
use crate::matrix::Matrix;
use crate::types::{ScalarType, ScalarValue};

/// A 1×1 matrix: either empty or holding one value of its type
#[derive(Clone, Debug)]
pub struct Scalar {
    pub(crate) m: Matrix,
}

impl Scalar {
    pub fn new(ty: &ScalarType) -> Result<Scalar, GblasError> {
        Ok(Scalar {
            m: Matrix::new(ty, 1, 1)?,
        })
    }

    pub fn from_value(ty: &ScalarType, value: ScalarValue) -> Result<Scalar, GblasError> {
        let mut s = Scalar::new(ty)?;
        s.set(value)?;
        Ok(s)
    }

    pub fn scalar_type(&self) -> &ScalarType {
        self.m.mat_type()
    }

    pub fn set(&mut self, value: ScalarValue) -> Result<(), GblasError> {
        self.m.set_element(0, 0, value)
    }

    pub fn clear(&mut self) -> Result<(), GblasError> {
        self.m.remove_element(0, 0)
    }

    /// `Ok(None)` when the scalar holds no entry
    pub fn value(&self) -> Result<Option<ScalarValue>, GblasError> {
        self.m.extract_element(0, 0)
    }

    pub fn nvals(&mut self) -> Result<u64, GblasError> {
        self.m.nvals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scalar_has_no_value() {
        let s = Scalar::new(&ScalarType::fp64()).unwrap();
        assert_eq!(s.value().unwrap(), None);
    }

    #[test]
    fn set_then_clear() {
        let mut s = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(3)).unwrap();
        assert_eq!(s.value().unwrap(), Some(ScalarValue::Int32(3)));
        s.clear().unwrap();
        assert_eq!(s.value().unwrap(), None);
        assert_eq!(s.nvals().unwrap(), 0);
    }
}
