use crate::error::GblasError;
use crate::types::{ScalarType, ScalarValue, TypeCode};
use std::fmt;
use std::sync::Arc;

/// Builtin index-unary operator families `z = f(x, i, j, thunk)`
///
/// The index-valued and structural families ignore `x` entirely; the value
/// predicates ignore the coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinIndexUnary {
    /// `z = i + thunk`
    RowIndex,
    /// `z = j + thunk`
    ColIndex,
    /// `z = j - i + thunk`
    DiagIndex,
    /// `j <= i + thunk`
    Tril,
    /// `j >= i + thunk`
    Triu,
    /// `j == i + thunk`
    Diag,
    /// `j != i + thunk`
    Offdiag,
    /// `j <= thunk`
    ColLe,
    /// `j > thunk`
    ColGt,
    /// `i <= thunk`
    RowLe,
    /// `i > thunk`
    RowGt,
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
}

impl BuiltinIndexUnary {
    fn ignores_value(self) -> bool {
        !matches!(
            self,
            BuiltinIndexUnary::ValueEq
                | BuiltinIndexUnary::ValueNe
                | BuiltinIndexUnary::ValueLt
                | BuiltinIndexUnary::ValueLe
                | BuiltinIndexUnary::ValueGt
                | BuiltinIndexUnary::ValueGe
        )
    }
}

type UserIndexUnaryFn =
    Arc<dyn Fn(&ScalarValue, u64, u64, &ScalarValue) -> ScalarValue + Send + Sync>;

#[derive(Clone)]
enum IndexUnaryKind {
    Builtin(BuiltinIndexUnary),
    User(UserIndexUnaryFn),
}

struct IndexUnaryInner {
    name: String,
    kind: IndexUnaryKind,
    ztype: ScalarType,
    xtype: ScalarType,
    /// Thunk domain
    ytype: ScalarType,
    definition: Option<String>,
}

/// An index-unary operator object, the workhorse of apply-with-index and
/// select
#[derive(Clone)]
pub struct IndexUnaryOp {
    inner: Arc<IndexUnaryInner>,
}

impl fmt::Debug for IndexUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IndexUnaryOp({})", self.inner.name)
    }
}

impl IndexUnaryOp {
    /// An index-valued builtin (rowindex, colindex, diagindex); `ty` must be
    /// Int32 or Int64
    pub fn index_valued(which: BuiltinIndexUnary, ty: &ScalarType) -> Result<Self, GblasError> {
        if !matches!(
            which,
            BuiltinIndexUnary::RowIndex | BuiltinIndexUnary::ColIndex | BuiltinIndexUnary::DiagIndex
        ) {
            return Err(GblasError::InvalidValue(
                "operator family is not index-valued".to_string(),
            ));
        }
        if !matches!(ty.code(), TypeCode::Int32 | TypeCode::Int64) {
            return Err(GblasError::DomainMismatch(
                "index-valued operators produce int32 or int64".to_string(),
            ));
        }
        Ok(IndexUnaryOp {
            inner: Arc::new(IndexUnaryInner {
                name: format!("{:?}_{}", which, ty.name()).to_lowercase(),
                kind: IndexUnaryKind::Builtin(which),
                ztype: ty.clone(),
                xtype: ty.clone(),
                ytype: ScalarType::int64(),
                definition: None,
            }),
        })
    }

    pub fn rowindex() -> Self {
        Self::index_valued(BuiltinIndexUnary::RowIndex, &ScalarType::int64()).unwrap()
    }

    pub fn colindex() -> Self {
        Self::index_valued(BuiltinIndexUnary::ColIndex, &ScalarType::int64()).unwrap()
    }

    pub fn diagindex() -> Self {
        Self::index_valued(BuiltinIndexUnary::DiagIndex, &ScalarType::int64()).unwrap()
    }

    /// A structural predicate (tril, triu, diag, offdiag, rowle, ...)
    pub fn structural(which: BuiltinIndexUnary) -> Result<Self, GblasError> {
        if !matches!(
            which,
            BuiltinIndexUnary::Tril
                | BuiltinIndexUnary::Triu
                | BuiltinIndexUnary::Diag
                | BuiltinIndexUnary::Offdiag
                | BuiltinIndexUnary::ColLe
                | BuiltinIndexUnary::ColGt
                | BuiltinIndexUnary::RowLe
                | BuiltinIndexUnary::RowGt
        ) {
            return Err(GblasError::InvalidValue(
                "operator family is not structural".to_string(),
            ));
        }
        Ok(IndexUnaryOp {
            inner: Arc::new(IndexUnaryInner {
                name: format!("{:?}", which).to_lowercase(),
                kind: IndexUnaryKind::Builtin(which),
                ztype: ScalarType::bool_type(),
                xtype: ScalarType::bool_type(),
                ytype: ScalarType::int64(),
                definition: None,
            }),
        })
    }

    pub fn tril() -> Self {
        Self::structural(BuiltinIndexUnary::Tril).unwrap()
    }

    pub fn triu() -> Self {
        Self::structural(BuiltinIndexUnary::Triu).unwrap()
    }

    pub fn diag() -> Self {
        Self::structural(BuiltinIndexUnary::Diag).unwrap()
    }

    pub fn offdiag() -> Self {
        Self::structural(BuiltinIndexUnary::Offdiag).unwrap()
    }

    /// A value predicate over `ty`; complex domains admit eq/ne only
    pub fn value_predicate(
        which: BuiltinIndexUnary,
        ty: &ScalarType,
    ) -> Result<Self, GblasError> {
        let ordered = matches!(
            which,
            BuiltinIndexUnary::ValueLt
                | BuiltinIndexUnary::ValueLe
                | BuiltinIndexUnary::ValueGt
                | BuiltinIndexUnary::ValueGe
        );
        let equality = matches!(which, BuiltinIndexUnary::ValueEq | BuiltinIndexUnary::ValueNe);
        if !ordered && !equality {
            return Err(GblasError::InvalidValue(
                "operator family is not a value predicate".to_string(),
            ));
        }
        if ordered && (ty.code().is_complex() || ty.code() == TypeCode::Udt) {
            return Err(GblasError::DomainMismatch(
                "ordered value predicates need an ordered domain".to_string(),
            ));
        }
        Ok(IndexUnaryOp {
            inner: Arc::new(IndexUnaryInner {
                name: format!("{:?}_{}", which, ty.name()).to_lowercase(),
                kind: IndexUnaryKind::Builtin(which),
                ztype: ScalarType::bool_type(),
                xtype: ty.clone(),
                ytype: ty.clone(),
                definition: None,
            }),
        })
    }

    pub fn valueeq(ty: &ScalarType) -> Self {
        Self::value_predicate(BuiltinIndexUnary::ValueEq, ty).unwrap()
    }

    pub fn valuene(ty: &ScalarType) -> Self {
        Self::value_predicate(BuiltinIndexUnary::ValueNe, ty).unwrap()
    }

    pub fn new_user(
        name: impl Into<String>,
        f: impl Fn(&ScalarValue, u64, u64, &ScalarValue) -> ScalarValue + Send + Sync + 'static,
        ztype: &ScalarType,
        xtype: &ScalarType,
        ytype: &ScalarType,
        definition: Option<String>,
    ) -> Self {
        IndexUnaryOp {
            inner: Arc::new(IndexUnaryInner {
                name: name.into(),
                kind: IndexUnaryKind::User(Arc::new(f)),
                ztype: ztype.clone(),
                xtype: xtype.clone(),
                ytype: ytype.clone(),
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

    pub fn ytype(&self) -> &ScalarType {
        &self.inner.ytype
    }

    /// Whether the operator never dereferences the entry value
    pub fn is_positional(&self) -> bool {
        match &self.inner.kind {
            IndexUnaryKind::Builtin(op) => op.ignores_value(),
            IndexUnaryKind::User(_) => false,
        }
    }

    pub fn jit_capable(&self) -> bool {
        match &self.inner.kind {
            IndexUnaryKind::Builtin(_) => true,
            IndexUnaryKind::User(_) => self.inner.definition.is_some(),
        }
    }

    pub fn apply(
        &self,
        x: &ScalarValue,
        i: u64,
        j: u64,
        thunk: &ScalarValue,
    ) -> Result<ScalarValue, GblasError> {
        match &self.inner.kind {
            IndexUnaryKind::User(f) => Ok(f(x, i, j, thunk)),
            IndexUnaryKind::Builtin(op) => {
                use BuiltinIndexUnary::*;
                let (i, j) = (i as i64, j as i64);
                let k = match op {
                    ValueEq | ValueNe | ValueLt | ValueLe | ValueGt | ValueGe => 0,
                    _ => match thunk.cast_or_keep(TypeCode::Int64)? {
                        ScalarValue::Int64(t) => t,
                        _ => 0,
                    },
                };
                let z = match op {
                    RowIndex => return int_result(i + k, self.inner.ztype.code()),
                    ColIndex => return int_result(j + k, self.inner.ztype.code()),
                    DiagIndex => return int_result(j - i + k, self.inner.ztype.code()),
                    Tril => j <= i + k,
                    Triu => j >= i + k,
                    Diag => j == i + k,
                    Offdiag => j != i + k,
                    ColLe => j <= k,
                    ColGt => j > k,
                    RowLe => i <= k,
                    RowGt => i > k,
                    ValueEq | ValueNe | ValueLt | ValueLe | ValueGt | ValueGe => {
                        let cmp_op = match op {
                            ValueEq => crate::ops::binary::BinaryOp::eq(&self.inner.xtype),
                            ValueNe => crate::ops::binary::BinaryOp::ne(&self.inner.xtype),
                            ValueLt => crate::ops::binary::BinaryOp::lt(&self.inner.xtype)?,
                            ValueLe => crate::ops::binary::BinaryOp::le(&self.inner.xtype)?,
                            ValueGt => crate::ops::binary::BinaryOp::gt(&self.inner.xtype)?,
                            ValueGe => crate::ops::binary::BinaryOp::ge(&self.inner.xtype)?,
                            _ => unreachable!(),
                        };
                        return cmp_op.apply(x, thunk);
                    }
                };
                Ok(ScalarValue::Bool(z))
            }
        }
    }
}

fn int_result(v: i64, code: TypeCode) -> Result<ScalarValue, GblasError> {
    Ok(match code {
        TypeCode::Int32 => ScalarValue::Int32(v as i32),
        _ => ScalarValue::Int64(v),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tril_keeps_lower_triangle() {
        let op = IndexUnaryOp::tril();
        let zero = ScalarValue::Int64(0);
        let x = ScalarValue::Bool(true);
        assert_eq!(op.apply(&x, 2, 1, &zero).unwrap(), ScalarValue::Bool(true));
        assert_eq!(op.apply(&x, 1, 2, &zero).unwrap(), ScalarValue::Bool(false));
        assert!(op.is_positional());
    }

    #[test]
    fn rowindex_offsets_by_thunk() {
        let op = IndexUnaryOp::rowindex();
        let x = ScalarValue::Fp64(9.0);
        assert_eq!(
            op.apply(&x, 5, 0, &ScalarValue::Int64(1)).unwrap(),
            ScalarValue::Int64(6)
        );
    }

    #[test]
    fn value_predicate_compares_against_thunk() {
        let op =
            IndexUnaryOp::value_predicate(BuiltinIndexUnary::ValueGt, &ScalarType::fp64()).unwrap();
        assert!(!op.is_positional());
        assert_eq!(
            op.apply(&ScalarValue::Fp64(2.0), 0, 0, &ScalarValue::Fp64(1.0)).unwrap(),
            ScalarValue::Bool(true)
        );
    }

    #[test]
    fn ordered_predicate_rejects_complex() {
        let fc = ScalarType::builtin(TypeCode::Fc32);
        assert!(IndexUnaryOp::value_predicate(BuiltinIndexUnary::ValueLt, &fc).is_err());
    }
}
