use crate::error::GblasError;
use crate::ops::binary::{BinaryOp, BuiltinBinary};
use crate::types::{ScalarType, ScalarValue, TypeCode};
use std::fmt;
use std::sync::Arc;

struct MonoidInner {
    op: BinaryOp,
    identity: ScalarValue,
    terminal: Option<ScalarValue>,
    /// The `any` monoid: every value is terminal
    any: bool,
}

/// A monoid: an associative binary operator on `T×T→T` with an identity and
/// an optional terminal value
///
/// A terminal value `z` satisfies `op(z, x) = z` for all `x`; a reducer that
/// reaches it may stop scanning.
#[derive(Clone)]
pub struct Monoid {
    inner: Arc<MonoidInner>,
}

impl fmt::Debug for Monoid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Monoid({})", self.inner.op.name())
    }
}

impl Monoid {
    /// Build a monoid over `op`; validates the domain restriction, the
    /// identity type, and rejects positional operators
    pub fn new(
        op: &BinaryOp,
        identity: ScalarValue,
        terminal: Option<ScalarValue>,
    ) -> Result<Monoid, GblasError> {
        if op.is_positional() {
            return Err(GblasError::DomainMismatch(
                "a positional operator cannot form a monoid".to_string(),
            ));
        }
        if op.ztype() != op.xtype() || op.ztype() != op.ytype() {
            return Err(GblasError::DomainMismatch(format!(
                "monoid operator must be T x T -> T, got {}",
                op.name()
            )));
        }
        let code = op.ztype().code();
        let identity = if code == TypeCode::Udt {
            identity
        } else {
            identity.cast(code)?
        };
        let terminal = match terminal {
            Some(t) if code != TypeCode::Udt => Some(t.cast(code)?),
            other => other,
        };
        Ok(Monoid {
            inner: Arc::new(MonoidInner {
                op: op.clone(),
                identity,
                terminal,
                any: op.builtin_opcode() == Some(BuiltinBinary::Any),
            }),
        })
    }

    pub fn plus(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(&BinaryOp::plus(ty), ScalarValue::zero(ty.code()), None)
    }

    /// Integer times has terminal 0; floating-point times has none
    pub fn times(ty: &ScalarType) -> Result<Monoid, GblasError> {
        let terminal = if ty.code().is_integer() {
            Some(ScalarValue::zero(ty.code()))
        } else {
            None
        };
        Self::new(&BinaryOp::times(ty), ScalarValue::one(ty.code()), terminal)
    }

    pub fn min(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(
            &BinaryOp::min(ty)?,
            ScalarValue::max_value(ty.code()),
            Some(ScalarValue::min_value(ty.code())),
        )
    }

    pub fn max(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(
            &BinaryOp::max(ty)?,
            ScalarValue::min_value(ty.code()),
            Some(ScalarValue::max_value(ty.code())),
        )
    }

    pub fn lor() -> Monoid {
        Self::new(
            &BinaryOp::lor(),
            ScalarValue::Bool(false),
            Some(ScalarValue::Bool(true)),
        )
        .unwrap()
    }

    pub fn land() -> Monoid {
        Self::new(
            &BinaryOp::land(),
            ScalarValue::Bool(true),
            Some(ScalarValue::Bool(false)),
        )
        .unwrap()
    }

    pub fn lxor() -> Monoid {
        Self::new(&BinaryOp::lxor(), ScalarValue::Bool(false), None).unwrap()
    }

    pub fn eq_bool() -> Monoid {
        Self::new(
            &BinaryOp::new_user(
                "eq_bool",
                |x, y| ScalarValue::Bool(x.truthy() == y.truthy()),
                &ScalarType::bool_type(),
                &ScalarType::bool_type(),
                &ScalarType::bool_type(),
                None,
            ),
            ScalarValue::Bool(true),
            None,
        )
        .unwrap()
    }

    /// The `any` monoid: keeps an arbitrary operand and short-circuits
    /// immediately
    pub fn any(ty: &ScalarType) -> Result<Monoid, GblasError> {
        if ty.code() == TypeCode::Udt {
            return Err(GblasError::DomainMismatch(
                "any monoid needs a builtin identity".to_string(),
            ));
        }
        Self::new(&BinaryOp::any(ty), ScalarValue::zero(ty.code()), None)
    }

    pub fn bor(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(&BinaryOp::bor(ty)?, ScalarValue::zero(ty.code()), None)
    }

    pub fn band(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(
            &BinaryOp::band(ty)?,
            ScalarValue::max_value(ty.code()),
            Some(ScalarValue::zero(ty.code())),
        )
    }

    pub fn bxor(ty: &ScalarType) -> Result<Monoid, GblasError> {
        Self::new(&BinaryOp::bxor(ty)?, ScalarValue::zero(ty.code()), None)
    }

    pub fn op(&self) -> &BinaryOp {
        &self.inner.op
    }

    pub fn identity(&self) -> &ScalarValue {
        &self.inner.identity
    }

    pub fn terminal(&self) -> Option<&ScalarValue> {
        self.inner.terminal.as_ref()
    }

    /// The monoid's domain
    pub fn monoid_type(&self) -> &ScalarType {
        self.inner.op.ztype()
    }

    /// Whether the running value allows the reduction to stop
    pub fn is_terminal(&self, v: &ScalarValue) -> bool {
        if self.inner.any {
            return true;
        }
        match &self.inner.terminal {
            Some(t) => t == v,
            None => false,
        }
    }

    /// Fold one more contribution into the accumulator
    pub fn fold(&self, acc: &ScalarValue, v: &ScalarValue) -> Result<ScalarValue, GblasError> {
        self.inner.op.apply(acc, v)
    }
}
