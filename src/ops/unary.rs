use crate::error::GblasError;
use crate::types::{ScalarType, ScalarValue, TypeCode};
use std::fmt;
use std::sync::Arc;

/// Builtin unary operator families
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinUnary {
    Identity,
    /// Additive inverse
    Ainv,
    /// Multiplicative inverse; integer 1/0 saturates like division
    Minv,
    Lnot,
    Bnot,
    Abs,
    /// `one(x) = 1` regardless of x
    One,
}

/// Positional unary operators read the entry coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionalUnary {
    PositionI,
    PositionI1,
    PositionJ,
    PositionJ1,
}

type UserUnaryFn = Arc<dyn Fn(&ScalarValue) -> ScalarValue + Send + Sync>;

#[derive(Clone)]
enum UnaryKind {
    Builtin(BuiltinUnary),
    Positional(PositionalUnary),
    User(UserUnaryFn),
}

struct UnaryInner {
    name: String,
    kind: UnaryKind,
    ztype: ScalarType,
    xtype: ScalarType,
    definition: Option<String>,
}

/// A unary operator object `z = f(x)`
#[derive(Clone)]
pub struct UnaryOp {
    inner: Arc<UnaryInner>,
}

impl fmt::Debug for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnaryOp({})", self.inner.name)
    }
}

impl UnaryOp {
    fn builtin(name: &str, op: BuiltinUnary, z: ScalarType, x: ScalarType) -> Self {
        UnaryOp {
            inner: Arc::new(UnaryInner {
                name: format!("{}_{}", name, x.name()),
                kind: UnaryKind::Builtin(op),
                ztype: z,
                xtype: x,
                definition: None,
            }),
        }
    }

    pub fn identity(ty: &ScalarType) -> Self {
        Self::builtin("identity", BuiltinUnary::Identity, ty.clone(), ty.clone())
    }

    pub fn ainv(ty: &ScalarType) -> Self {
        Self::builtin("ainv", BuiltinUnary::Ainv, ty.clone(), ty.clone())
    }

    pub fn minv(ty: &ScalarType) -> Self {
        Self::builtin("minv", BuiltinUnary::Minv, ty.clone(), ty.clone())
    }

    pub fn lnot() -> Self {
        let b = ScalarType::bool_type();
        Self::builtin("lnot", BuiltinUnary::Lnot, b.clone(), b)
    }

    pub fn bnot(ty: &ScalarType) -> Result<Self, GblasError> {
        if !ty.code().is_integer() {
            return Err(GblasError::DomainMismatch(
                "bnot is defined on integer domains only".to_string(),
            ));
        }
        Ok(Self::builtin("bnot", BuiltinUnary::Bnot, ty.clone(), ty.clone()))
    }

    /// Absolute value; complex domains produce their real counterpart
    pub fn abs(ty: &ScalarType) -> Self {
        let z = match ty.code() {
            TypeCode::Fc32 => ScalarType::fp32(),
            TypeCode::Fc64 => ScalarType::fp64(),
            _ => ty.clone(),
        };
        Self::builtin("abs", BuiltinUnary::Abs, z, ty.clone())
    }

    pub fn one(ty: &ScalarType) -> Self {
        Self::builtin("one", BuiltinUnary::One, ty.clone(), ty.clone())
    }

    /// A positional operator; `ty` must be Int32 or Int64
    pub fn positional(which: PositionalUnary, ty: &ScalarType) -> Result<Self, GblasError> {
        if !matches!(ty.code(), TypeCode::Int32 | TypeCode::Int64) {
            return Err(GblasError::DomainMismatch(
                "positional operators produce int32 or int64".to_string(),
            ));
        }
        Ok(UnaryOp {
            inner: Arc::new(UnaryInner {
                name: format!("{:?}_{}", which, ty.name()).to_lowercase(),
                kind: UnaryKind::Positional(which),
                ztype: ty.clone(),
                xtype: ty.clone(),
                definition: None,
            }),
        })
    }

    pub fn new_user(
        name: impl Into<String>,
        f: impl Fn(&ScalarValue) -> ScalarValue + Send + Sync + 'static,
        ztype: &ScalarType,
        xtype: &ScalarType,
        definition: Option<String>,
    ) -> Self {
        UnaryOp {
            inner: Arc::new(UnaryInner {
                name: name.into(),
                kind: UnaryKind::User(Arc::new(f)),
                ztype: ztype.clone(),
                xtype: xtype.clone(),
                definition,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ztype(&self) -> &ScalarType {
        &self.inner.ztype
    }

    pub fn xtype(&self) -> &ScalarType {
        &self.inner.xtype
    }

    pub fn is_positional(&self) -> bool {
        matches!(self.inner.kind, UnaryKind::Positional(_))
    }

    pub fn jit_capable(&self) -> bool {
        match &self.inner.kind {
            UnaryKind::Builtin(_) | UnaryKind::Positional(_) => true,
            UnaryKind::User(_) => self.inner.definition.is_some(),
        }
    }

    pub fn apply(&self, x: &ScalarValue) -> Result<ScalarValue, GblasError> {
        match &self.inner.kind {
            UnaryKind::User(f) => Ok(f(x)),
            UnaryKind::Positional(_) => Err(GblasError::DomainMismatch(
                "positional operator applied to a value".to_string(),
            )),
            UnaryKind::Builtin(op) => {
                let xc = x.cast_or_keep(self.inner.xtype.code())?;
                apply_builtin(*op, &xc, self.inner.ztype.code())
            }
        }
    }

    pub fn apply_positional(&self, i: u64, j: u64) -> Result<ScalarValue, GblasError> {
        let which = match self.inner.kind {
            UnaryKind::Positional(which) => which,
            _ => {
                return Err(GblasError::DomainMismatch(
                    "operator is not positional".to_string(),
                ))
            }
        };
        let v = match which {
            PositionalUnary::PositionI => i as i64,
            PositionalUnary::PositionI1 => i as i64 + 1,
            PositionalUnary::PositionJ => j as i64,
            PositionalUnary::PositionJ1 => j as i64 + 1,
        };
        Ok(match self.inner.ztype.code() {
            TypeCode::Int32 => ScalarValue::Int32(v as i32),
            _ => ScalarValue::Int64(v),
        })
    }
}

fn apply_builtin(
    op: BuiltinUnary,
    x: &ScalarValue,
    ztype: TypeCode,
) -> Result<ScalarValue, GblasError> {
    use ScalarValue::*;
    if x.type_code() == TypeCode::Udt && op != BuiltinUnary::Identity {
        return Err(GblasError::DomainMismatch(
            "builtin unary operator on an opaque domain".to_string(),
        ));
    }
    Ok(match op {
        BuiltinUnary::Identity => x.clone(),
        BuiltinUnary::One => ScalarValue::one(ztype),
        BuiltinUnary::Lnot => Bool(!x.truthy()),
        BuiltinUnary::Ainv => match x {
            Bool(v) => Bool(*v),
            Int8(v) => Int8(v.wrapping_neg()),
            Int16(v) => Int16(v.wrapping_neg()),
            Int32(v) => Int32(v.wrapping_neg()),
            Int64(v) => Int64(v.wrapping_neg()),
            UInt8(v) => UInt8(v.wrapping_neg()),
            UInt16(v) => UInt16(v.wrapping_neg()),
            UInt32(v) => UInt32(v.wrapping_neg()),
            UInt64(v) => UInt64(v.wrapping_neg()),
            Fp32(v) => Fp32(-v),
            Fp64(v) => Fp64(-v),
            Fc32(v) => Fc32(-v),
            Fc64(v) => Fc64(-v),
            Udt(_) => {
                return Err(GblasError::DomainMismatch(
                    "ainv on an opaque domain".to_string(),
                ))
            }
        },
        BuiltinUnary::Minv => {
            let one = ScalarValue::one(x.type_code());
            crate::ops::binary::BinaryOp::div(&ScalarType::builtin(x.type_code()))
                .apply(&one, x)?
        }
        BuiltinUnary::Abs => match x {
            Bool(v) => Bool(*v),
            Int8(v) => Int8(v.wrapping_abs()),
            Int16(v) => Int16(v.wrapping_abs()),
            Int32(v) => Int32(v.wrapping_abs()),
            Int64(v) => Int64(v.wrapping_abs()),
            UInt8(v) => UInt8(*v),
            UInt16(v) => UInt16(*v),
            UInt32(v) => UInt32(*v),
            UInt64(v) => UInt64(*v),
            Fp32(v) => Fp32(v.abs()),
            Fp64(v) => Fp64(v.abs()),
            Fc32(v) => Fp32(v.norm()),
            Fc64(v) => Fp64(v.norm()),
            Udt(_) => {
                return Err(GblasError::DomainMismatch(
                    "abs on an opaque domain".to_string(),
                ))
            }
        },
        BuiltinUnary::Bnot => match x {
            Int8(v) => Int8(!v),
            Int16(v) => Int16(!v),
            Int32(v) => Int32(!v),
            Int64(v) => Int64(!v),
            UInt8(v) => UInt8(!v),
            UInt16(v) => UInt16(!v),
            UInt32(v) => UInt32(!v),
            UInt64(v) => UInt64(!v),
            _ => {
                return Err(GblasError::DomainMismatch(
                    "bnot on a non-integer domain".to_string(),
                ))
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ainv_negates() {
        let op = UnaryOp::ainv(&ScalarType::int32());
        assert_eq!(op.apply(&ScalarValue::Int32(4)).unwrap(), ScalarValue::Int32(-4));
    }

    #[test]
    fn minv_of_integer_zero_saturates() {
        let op = UnaryOp::minv(&ScalarType::int32());
        assert_eq!(
            op.apply(&ScalarValue::Int32(0)).unwrap(),
            ScalarValue::Int32(i32::MAX)
        );
    }

    #[test]
    fn abs_of_complex_is_real() {
        use num_complex::Complex64;
        let op = UnaryOp::abs(&ScalarType::builtin(TypeCode::Fc64));
        assert_eq!(op.ztype().code(), TypeCode::Fp64);
        assert_eq!(
            op.apply(&ScalarValue::Fc64(Complex64::new(3.0, 4.0))).unwrap(),
            ScalarValue::Fp64(5.0)
        );
    }

    #[test]
    fn position_j_reads_column() {
        let op = UnaryOp::positional(PositionalUnary::PositionJ1, &ScalarType::int64()).unwrap();
        assert_eq!(op.apply_positional(3, 7).unwrap(), ScalarValue::Int64(8));
    }
}
