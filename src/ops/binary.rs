use crate::error::GblasError;
use crate::types::{ScalarType, ScalarValue, TypeCode};
use num_complex::{Complex32, Complex64};
use std::fmt;
use std::sync::Arc;

/// Builtin binary operator families
///
/// Each family is instantiated over a domain at construction; the same
/// opcode drives every domain through one generic body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinBinary {
    First,
    Second,
    Pair,
    Any,
    Plus,
    Minus,
    RMinus,
    Times,
    Div,
    RDiv,
    Min,
    Max,
    Lor,
    Land,
    Lxor,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Bor,
    Band,
    Bxor,
    Bxnor,
}

/// Positional binary operators read indices, never values
///
/// The `1` variants are one-based. In a multiply `c(i,j) += a(i,k)*b(k,j)`,
/// `first` refers to the A entry at (i,k) and `second` to the B entry at
/// (k,j).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionalBinary {
    FirstI,
    FirstI1,
    FirstJ,
    FirstJ1,
    SecondI,
    SecondI1,
    SecondJ,
    SecondJ1,
}

type UserBinaryFn = Arc<dyn Fn(&ScalarValue, &ScalarValue) -> ScalarValue + Send + Sync>;

#[derive(Clone)]
pub(crate) enum BinaryKind {
    Builtin(BuiltinBinary),
    Positional(PositionalBinary),
    User(UserBinaryFn),
}

struct BinaryInner {
    name: String,
    kind: BinaryKind,
    ztype: ScalarType,
    xtype: ScalarType,
    ytype: ScalarType,
    /// C-source body for JIT-style backends
    definition: Option<String>,
}

/// A binary operator object `z = f(x,y)`
#[derive(Clone)]
pub struct BinaryOp {
    inner: Arc<BinaryInner>,
}

impl fmt::Debug for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BinaryOp({})", self.inner.name)
    }
}

impl BinaryOp {
    fn builtin(name: &str, op: BuiltinBinary, z: ScalarType, x: ScalarType, y: ScalarType) -> Self {
        BinaryOp {
            inner: Arc::new(BinaryInner {
                name: format!("{}_{}", name, x.name()),
                kind: BinaryKind::Builtin(op),
                ztype: z,
                xtype: x,
                ytype: y,
                definition: None,
            }),
        }
    }

    fn same_domain(name: &str, op: BuiltinBinary, ty: &ScalarType) -> Self {
        Self::builtin(name, op, ty.clone(), ty.clone(), ty.clone())
    }

    fn predicate(name: &str, op: BuiltinBinary, ty: &ScalarType) -> Self {
        Self::builtin(name, op, ScalarType::bool_type(), ty.clone(), ty.clone())
    }

    pub fn first(ty: &ScalarType) -> Self {
        Self::same_domain("first", BuiltinBinary::First, ty)
    }

    pub fn second(ty: &ScalarType) -> Self {
        Self::same_domain("second", BuiltinBinary::Second, ty)
    }

    /// `pair(x,y) = 1`, the structural multiplier
    pub fn pair(ty: &ScalarType) -> Self {
        Self::same_domain("pair", BuiltinBinary::Pair, ty)
    }

    /// `any(x,y)` keeps an arbitrary operand (the current one here)
    pub fn any(ty: &ScalarType) -> Self {
        Self::same_domain("any", BuiltinBinary::Any, ty)
    }

    pub fn plus(ty: &ScalarType) -> Self {
        Self::same_domain("plus", BuiltinBinary::Plus, ty)
    }

    pub fn minus(ty: &ScalarType) -> Self {
        Self::same_domain("minus", BuiltinBinary::Minus, ty)
    }

    pub fn rminus(ty: &ScalarType) -> Self {
        Self::same_domain("rminus", BuiltinBinary::RMinus, ty)
    }

    pub fn times(ty: &ScalarType) -> Self {
        Self::same_domain("times", BuiltinBinary::Times, ty)
    }

    pub fn div(ty: &ScalarType) -> Self {
        Self::same_domain("div", BuiltinBinary::Div, ty)
    }

    pub fn rdiv(ty: &ScalarType) -> Self {
        Self::same_domain("rdiv", BuiltinBinary::RDiv, ty)
    }

    pub fn min(ty: &ScalarType) -> Result<Self, GblasError> {
        if ty.code().is_complex() || ty.code() == TypeCode::Udt {
            return Err(GblasError::DomainMismatch(
                "min is defined on ordered domains only".to_string(),
            ));
        }
        Ok(Self::same_domain("min", BuiltinBinary::Min, ty))
    }

    pub fn max(ty: &ScalarType) -> Result<Self, GblasError> {
        if ty.code().is_complex() || ty.code() == TypeCode::Udt {
            return Err(GblasError::DomainMismatch(
                "max is defined on ordered domains only".to_string(),
            ));
        }
        Ok(Self::same_domain("max", BuiltinBinary::Max, ty))
    }

    pub fn lor() -> Self {
        Self::same_domain("lor", BuiltinBinary::Lor, &ScalarType::bool_type())
    }

    pub fn land() -> Self {
        Self::same_domain("land", BuiltinBinary::Land, &ScalarType::bool_type())
    }

    pub fn lxor() -> Self {
        Self::same_domain("lxor", BuiltinBinary::Lxor, &ScalarType::bool_type())
    }

    pub fn eq(ty: &ScalarType) -> Self {
        Self::predicate("eq", BuiltinBinary::Eq, ty)
    }

    pub fn ne(ty: &ScalarType) -> Self {
        Self::predicate("ne", BuiltinBinary::Ne, ty)
    }

    pub fn gt(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::ordered_predicate("gt", BuiltinBinary::Gt, ty)
    }

    pub fn lt(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::ordered_predicate("lt", BuiltinBinary::Lt, ty)
    }

    pub fn ge(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::ordered_predicate("ge", BuiltinBinary::Ge, ty)
    }

    pub fn le(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::ordered_predicate("le", BuiltinBinary::Le, ty)
    }

    fn ordered_predicate(
        name: &str,
        op: BuiltinBinary,
        ty: &ScalarType,
    ) -> Result<Self, GblasError> {
        if ty.code().is_complex() || ty.code() == TypeCode::Udt {
            return Err(GblasError::DomainMismatch(format!(
                "{} is defined on ordered domains only",
                name
            )));
        }
        Ok(Self::predicate(name, op, ty))
    }

    pub fn bor(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::bitwise("bor", BuiltinBinary::Bor, ty)
    }

    pub fn band(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::bitwise("band", BuiltinBinary::Band, ty)
    }

    pub fn bxor(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::bitwise("bxor", BuiltinBinary::Bxor, ty)
    }

    pub fn bxnor(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::bitwise("bxnor", BuiltinBinary::Bxnor, ty)
    }

    fn bitwise(name: &str, op: BuiltinBinary, ty: &ScalarType) -> Result<Self, GblasError> {
        if !ty.code().is_integer() {
            return Err(GblasError::DomainMismatch(format!(
                "{} is defined on integer domains only",
                name
            )));
        }
        Ok(Self::same_domain(name, op, ty))
    }

    /// A positional operator; `ty` must be Int32 or Int64
    pub fn positional(which: PositionalBinary, ty: &ScalarType) -> Result<Self, GblasError> {
        if !matches!(ty.code(), TypeCode::Int32 | TypeCode::Int64) {
            return Err(GblasError::DomainMismatch(
                "positional operators produce int32 or int64".to_string(),
            ));
        }
        Ok(BinaryOp {
            inner: Arc::new(BinaryInner {
                name: format!("{:?}_{}", which, ty.name()).to_lowercase(),
                kind: BinaryKind::Positional(which),
                ztype: ty.clone(),
                xtype: ty.clone(),
                ytype: ty.clone(),
                definition: None,
            }),
        })
    }

    pub fn firsti(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::positional(PositionalBinary::FirstI, ty)
    }

    pub fn firstj(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::positional(PositionalBinary::FirstJ, ty)
    }

    pub fn secondi(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::positional(PositionalBinary::SecondI, ty)
    }

    pub fn secondj(ty: &ScalarType) -> Result<Self, GblasError> {
        Self::positional(PositionalBinary::SecondJ, ty)
    }

    /// A user operator; without a definition it is interpreted only
    pub fn new_user(
        name: impl Into<String>,
        f: impl Fn(&ScalarValue, &ScalarValue) -> ScalarValue + Send + Sync + 'static,
        ztype: &ScalarType,
        xtype: &ScalarType,
        ytype: &ScalarType,
        definition: Option<String>,
    ) -> Self {
        BinaryOp {
            inner: Arc::new(BinaryInner {
                name: name.into(),
                kind: BinaryKind::User(Arc::new(f)),
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

    pub fn definition(&self) -> Option<&str> {
        self.inner.definition.as_deref()
    }

    pub fn is_positional(&self) -> bool {
        matches!(self.inner.kind, BinaryKind::Positional(_))
    }

    pub fn jit_capable(&self) -> bool {
        match &self.inner.kind {
            BinaryKind::Builtin(_) | BinaryKind::Positional(_) => true,
            BinaryKind::User(_) => self.inner.definition.is_some(),
        }
    }

    pub(crate) fn builtin_opcode(&self) -> Option<BuiltinBinary> {
        match self.inner.kind {
            BinaryKind::Builtin(op) => Some(op),
            _ => None,
        }
    }

    /// Whether `f(x,y)` ignores `y` entirely (first/any) or `x` (second)
    pub(crate) fn ignores_input(&self) -> (bool, bool) {
        match self.inner.kind {
            BinaryKind::Builtin(BuiltinBinary::First) | BinaryKind::Builtin(BuiltinBinary::Any) => {
                (false, true)
            }
            BinaryKind::Builtin(BuiltinBinary::Second) => (true, false),
            BinaryKind::Builtin(BuiltinBinary::Pair) => (true, true),
            _ => (false, false),
        }
    }

    /// The operator with its operands swapped: `flipped(x,y) = f(y,x)`
    ///
    /// Used to reformulate `u'⊗A` as `A'⊗u` without changing semantics.
    pub(crate) fn flipped(&self) -> BinaryOp {
        use BuiltinBinary::*;
        let flip_builtin = |op: BuiltinBinary| match op {
            First => Second,
            Second => First,
            Minus => RMinus,
            RMinus => Minus,
            Div => RDiv,
            RDiv => Div,
            Gt => Lt,
            Lt => Gt,
            Ge => Le,
            Le => Ge,
            symmetric => symmetric,
        };
        let flip_positional = |op: PositionalBinary| match op {
            PositionalBinary::FirstI => PositionalBinary::SecondI,
            PositionalBinary::FirstI1 => PositionalBinary::SecondI1,
            PositionalBinary::FirstJ => PositionalBinary::SecondJ,
            PositionalBinary::FirstJ1 => PositionalBinary::SecondJ1,
            PositionalBinary::SecondI => PositionalBinary::FirstI,
            PositionalBinary::SecondI1 => PositionalBinary::FirstI1,
            PositionalBinary::SecondJ => PositionalBinary::FirstJ,
            PositionalBinary::SecondJ1 => PositionalBinary::FirstJ1,
        };
        let kind = match &self.inner.kind {
            BinaryKind::Builtin(op) => BinaryKind::Builtin(flip_builtin(*op)),
            BinaryKind::Positional(op) => BinaryKind::Positional(flip_positional(*op)),
            BinaryKind::User(f) => {
                let f = f.clone();
                BinaryKind::User(Arc::new(move |x: &ScalarValue, y: &ScalarValue| f(y, x)))
            }
        };
        BinaryOp {
            inner: Arc::new(BinaryInner {
                name: format!("flipped_{}", self.inner.name),
                kind,
                ztype: self.inner.ztype.clone(),
                xtype: self.inner.ytype.clone(),
                ytype: self.inner.xtype.clone(),
                definition: None,
            }),
        }
    }

    /// Apply to two values, casting inputs to the operator domains
    pub fn apply(&self, x: &ScalarValue, y: &ScalarValue) -> Result<ScalarValue, GblasError> {
        match &self.inner.kind {
            BinaryKind::User(f) => Ok(f(x, y)),
            BinaryKind::Positional(_) => Err(GblasError::DomainMismatch(
                "positional operator applied to values".to_string(),
            )),
            BinaryKind::Builtin(op) => {
                match op {
                    // first/second/pair/any tolerate mixed domains
                    BuiltinBinary::First | BuiltinBinary::Any => {
                        return x.cast_or_keep(self.inner.ztype.code());
                    }
                    BuiltinBinary::Second => return y.cast_or_keep(self.inner.ztype.code()),
                    BuiltinBinary::Pair => {
                        return Ok(ScalarValue::one(self.inner.ztype.code()));
                    }
                    _ => {}
                }
                let xc = x.cast_or_keep(self.inner.xtype.code())?;
                let yc = y.cast_or_keep(self.inner.ytype.code())?;
                apply_builtin(*op, &xc, &yc)
            }
        }
    }

    /// Apply a positional operator to the two entry coordinates
    pub fn apply_positional(
        &self,
        xi: u64,
        xj: u64,
        yi: u64,
        yj: u64,
    ) -> Result<ScalarValue, GblasError> {
        let which = match self.inner.kind {
            BinaryKind::Positional(which) => which,
            _ => {
                return Err(GblasError::DomainMismatch(
                    "operator is not positional".to_string(),
                ))
            }
        };
        let v = match which {
            PositionalBinary::FirstI => xi as i64,
            PositionalBinary::FirstI1 => xi as i64 + 1,
            PositionalBinary::FirstJ => xj as i64,
            PositionalBinary::FirstJ1 => xj as i64 + 1,
            PositionalBinary::SecondI => yi as i64,
            PositionalBinary::SecondI1 => yi as i64 + 1,
            PositionalBinary::SecondJ => yj as i64,
            PositionalBinary::SecondJ1 => yj as i64 + 1,
        };
        Ok(match self.inner.ztype.code() {
            TypeCode::Int32 => ScalarValue::Int32(v as i32),
            _ => ScalarValue::Int64(v),
        })
    }
}

impl ScalarValue {
    /// Cast, but pass user-defined values through untouched so user
    /// operators see their own representation
    pub(crate) fn cast_or_keep(&self, to: TypeCode) -> Result<ScalarValue, GblasError> {
        if self.type_code() == TypeCode::Udt || to == TypeCode::Udt {
            Ok(self.clone())
        } else {
            self.cast(to)
        }
    }
}

/// Integer division saturates instead of trapping: max for a positive or
/// zero dividend over zero, min for a negative one, zero for 0/0.
trait Arith: Copy {
    fn a_add(self, o: Self) -> Self;
    fn a_sub(self, o: Self) -> Self;
    fn a_mul(self, o: Self) -> Self;
    fn a_div(self, o: Self) -> Self;
    fn a_min(self, o: Self) -> Self;
    fn a_max(self, o: Self) -> Self;
}

macro_rules! int_arith {
    ($t:ty) => {
        impl Arith for $t {
            fn a_add(self, o: Self) -> Self {
                self.wrapping_add(o)
            }
            fn a_sub(self, o: Self) -> Self {
                self.wrapping_sub(o)
            }
            fn a_mul(self, o: Self) -> Self {
                self.wrapping_mul(o)
            }
            fn a_div(self, o: Self) -> Self {
                if o == 0 {
                    if self == 0 {
                        0
                    } else if self > 0 {
                        <$t>::MAX
                    } else {
                        <$t>::MIN
                    }
                } else {
                    self.wrapping_div(o)
                }
            }
            fn a_min(self, o: Self) -> Self {
                self.min(o)
            }
            fn a_max(self, o: Self) -> Self {
                self.max(o)
            }
        }
    };
}

int_arith!(i8);
int_arith!(i16);
int_arith!(i32);
int_arith!(i64);
int_arith!(u8);
int_arith!(u16);
int_arith!(u32);
int_arith!(u64);

macro_rules! float_arith {
    ($t:ty) => {
        impl Arith for $t {
            fn a_add(self, o: Self) -> Self {
                self + o
            }
            fn a_sub(self, o: Self) -> Self {
                self - o
            }
            fn a_mul(self, o: Self) -> Self {
                self * o
            }
            fn a_div(self, o: Self) -> Self {
                self / o
            }
            fn a_min(self, o: Self) -> Self {
                self.min(o)
            }
            fn a_max(self, o: Self) -> Self {
                self.max(o)
            }
        }
    };
}

float_arith!(f32);
float_arith!(f64);

macro_rules! complex_arith {
    ($t:ty) => {
        impl Arith for $t {
            fn a_add(self, o: Self) -> Self {
                self + o
            }
            fn a_sub(self, o: Self) -> Self {
                self - o
            }
            fn a_mul(self, o: Self) -> Self {
                self * o
            }
            fn a_div(self, o: Self) -> Self {
                self / o
            }
            // ordered operators are rejected at construction for complex
            fn a_min(self, _o: Self) -> Self {
                self
            }
            fn a_max(self, _o: Self) -> Self {
                self
            }
        }
    };
}

complex_arith!(Complex32);
complex_arith!(Complex64);

fn arith_go<T: Arith>(op: BuiltinBinary, a: T, b: T) -> T {
    match op {
        BuiltinBinary::Plus => a.a_add(b),
        BuiltinBinary::Minus => a.a_sub(b),
        BuiltinBinary::RMinus => b.a_sub(a),
        BuiltinBinary::Times => a.a_mul(b),
        BuiltinBinary::Div => a.a_div(b),
        BuiltinBinary::RDiv => b.a_div(a),
        BuiltinBinary::Min => a.a_min(b),
        BuiltinBinary::Max => a.a_max(b),
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn bool_arith(op: BuiltinBinary, a: bool, b: bool) -> bool {
    match op {
        BuiltinBinary::Plus | BuiltinBinary::Max => a || b,
        BuiltinBinary::Times | BuiltinBinary::Min => a && b,
        BuiltinBinary::Minus | BuiltinBinary::RMinus => a != b,
        BuiltinBinary::Div => a,
        BuiltinBinary::RDiv => b,
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn apply_builtin(
    op: BuiltinBinary,
    x: &ScalarValue,
    y: &ScalarValue,
) -> Result<ScalarValue, GblasError> {
    use BuiltinBinary::*;
    match op {
        Plus | Minus | RMinus | Times | Div | RDiv | Min | Max => match (x, y) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => {
                Ok(ScalarValue::Bool(bool_arith(op, *a, *b)))
            }
            (ScalarValue::Int8(a), ScalarValue::Int8(b)) => {
                Ok(ScalarValue::Int8(arith_go(op, *a, *b)))
            }
            (ScalarValue::Int16(a), ScalarValue::Int16(b)) => {
                Ok(ScalarValue::Int16(arith_go(op, *a, *b)))
            }
            (ScalarValue::Int32(a), ScalarValue::Int32(b)) => {
                Ok(ScalarValue::Int32(arith_go(op, *a, *b)))
            }
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => {
                Ok(ScalarValue::Int64(arith_go(op, *a, *b)))
            }
            (ScalarValue::UInt8(a), ScalarValue::UInt8(b)) => {
                Ok(ScalarValue::UInt8(arith_go(op, *a, *b)))
            }
            (ScalarValue::UInt16(a), ScalarValue::UInt16(b)) => {
                Ok(ScalarValue::UInt16(arith_go(op, *a, *b)))
            }
            (ScalarValue::UInt32(a), ScalarValue::UInt32(b)) => {
                Ok(ScalarValue::UInt32(arith_go(op, *a, *b)))
            }
            (ScalarValue::UInt64(a), ScalarValue::UInt64(b)) => {
                Ok(ScalarValue::UInt64(arith_go(op, *a, *b)))
            }
            (ScalarValue::Fp32(a), ScalarValue::Fp32(b)) => {
                Ok(ScalarValue::Fp32(arith_go(op, *a, *b)))
            }
            (ScalarValue::Fp64(a), ScalarValue::Fp64(b)) => {
                Ok(ScalarValue::Fp64(arith_go(op, *a, *b)))
            }
            (ScalarValue::Fc32(a), ScalarValue::Fc32(b)) => {
                Ok(ScalarValue::Fc32(arith_go(op, *a, *b)))
            }
            (ScalarValue::Fc64(a), ScalarValue::Fc64(b)) => {
                Ok(ScalarValue::Fc64(arith_go(op, *a, *b)))
            }
            _ => Err(GblasError::DomainMismatch(
                "arithmetic on mismatched or opaque domains".to_string(),
            )),
        },
        Eq => Ok(ScalarValue::Bool(x == y)),
        Ne => Ok(ScalarValue::Bool(x != y)),
        Gt | Lt | Ge | Le => {
            let ord = partial_cmp_values(x, y)?;
            Ok(ScalarValue::Bool(match op {
                Gt => ord == std::cmp::Ordering::Greater,
                Lt => ord == std::cmp::Ordering::Less,
                Ge => ord != std::cmp::Ordering::Less,
                Le => ord != std::cmp::Ordering::Greater,
                _ => unreachable!(),
            }))
        }
        Lor | Land | Lxor => {
            let (a, b) = (x.truthy(), y.truthy());
            Ok(ScalarValue::Bool(match op {
                Lor => a || b,
                Land => a && b,
                Lxor => a != b,
                _ => unreachable!(),
            }))
        }
        Bor | Band | Bxor | Bxnor => bitwise_builtin(op, x, y),
        First | Second | Pair | Any => unreachable!("handled before casting"),
    }
}

fn partial_cmp_values(
    x: &ScalarValue,
    y: &ScalarValue,
) -> Result<std::cmp::Ordering, GblasError> {
    macro_rules! cmp_arm {
        ($a:expr, $b:expr) => {
            $a.partial_cmp($b)
                .ok_or_else(|| GblasError::InvalidValue("unordered comparison (NaN)".to_string()))
        };
    }
    match (x, y) {
        (ScalarValue::Bool(a), ScalarValue::Bool(b)) => cmp_arm!(a, b),
        (ScalarValue::Int8(a), ScalarValue::Int8(b)) => cmp_arm!(a, b),
        (ScalarValue::Int16(a), ScalarValue::Int16(b)) => cmp_arm!(a, b),
        (ScalarValue::Int32(a), ScalarValue::Int32(b)) => cmp_arm!(a, b),
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => cmp_arm!(a, b),
        (ScalarValue::UInt8(a), ScalarValue::UInt8(b)) => cmp_arm!(a, b),
        (ScalarValue::UInt16(a), ScalarValue::UInt16(b)) => cmp_arm!(a, b),
        (ScalarValue::UInt32(a), ScalarValue::UInt32(b)) => cmp_arm!(a, b),
        (ScalarValue::UInt64(a), ScalarValue::UInt64(b)) => cmp_arm!(a, b),
        (ScalarValue::Fp32(a), ScalarValue::Fp32(b)) => cmp_arm!(a, b),
        (ScalarValue::Fp64(a), ScalarValue::Fp64(b)) => cmp_arm!(a, b),
        _ => Err(GblasError::DomainMismatch(
            "comparison on mismatched or unordered domains".to_string(),
        )),
    }
}

fn bitwise_builtin(
    op: BuiltinBinary,
    x: &ScalarValue,
    y: &ScalarValue,
) -> Result<ScalarValue, GblasError> {
    macro_rules! bit_arm {
        ($variant:ident, $a:expr, $b:expr) => {
            Ok(ScalarValue::$variant(match op {
                BuiltinBinary::Bor => $a | $b,
                BuiltinBinary::Band => $a & $b,
                BuiltinBinary::Bxor => $a ^ $b,
                BuiltinBinary::Bxnor => !($a ^ $b),
                _ => unreachable!(),
            }))
        };
    }
    match (x, y) {
        (ScalarValue::Int8(a), ScalarValue::Int8(b)) => bit_arm!(Int8, a, b),
        (ScalarValue::Int16(a), ScalarValue::Int16(b)) => bit_arm!(Int16, a, b),
        (ScalarValue::Int32(a), ScalarValue::Int32(b)) => bit_arm!(Int32, a, b),
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => bit_arm!(Int64, a, b),
        (ScalarValue::UInt8(a), ScalarValue::UInt8(b)) => bit_arm!(UInt8, a, b),
        (ScalarValue::UInt16(a), ScalarValue::UInt16(b)) => bit_arm!(UInt16, a, b),
        (ScalarValue::UInt32(a), ScalarValue::UInt32(b)) => bit_arm!(UInt32, a, b),
        (ScalarValue::UInt64(a), ScalarValue::UInt64(b)) => bit_arm!(UInt64, a, b),
        _ => Err(GblasError::DomainMismatch(
            "bitwise operator on a non-integer domain".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_int32() {
        let op = BinaryOp::plus(&ScalarType::int32());
        assert_eq!(
            op.apply(&ScalarValue::Int32(5), &ScalarValue::Int32(7)).unwrap(),
            ScalarValue::Int32(12)
        );
    }

    #[test]
    fn inputs_are_cast_to_op_domain() {
        let op = BinaryOp::plus(&ScalarType::fp64());
        assert_eq!(
            op.apply(&ScalarValue::Int32(2), &ScalarValue::Fp32(0.5)).unwrap(),
            ScalarValue::Fp64(2.5)
        );
    }

    #[test]
    fn integer_division_by_zero_saturates() {
        let op = BinaryOp::div(&ScalarType::int32());
        assert_eq!(
            op.apply(&ScalarValue::Int32(3), &ScalarValue::Int32(0)).unwrap(),
            ScalarValue::Int32(i32::MAX)
        );
        assert_eq!(
            op.apply(&ScalarValue::Int32(-3), &ScalarValue::Int32(0)).unwrap(),
            ScalarValue::Int32(i32::MIN)
        );
        assert_eq!(
            op.apply(&ScalarValue::Int32(0), &ScalarValue::Int32(0)).unwrap(),
            ScalarValue::Int32(0)
        );
    }

    #[test]
    fn float_division_by_zero_is_ieee() {
        let op = BinaryOp::div(&ScalarType::fp64());
        assert_eq!(
            op.apply(&ScalarValue::Fp64(1.0), &ScalarValue::Fp64(0.0)).unwrap(),
            ScalarValue::Fp64(f64::INFINITY)
        );
    }

    #[test]
    fn pair_returns_one() {
        let op = BinaryOp::pair(&ScalarType::bool_type());
        assert_eq!(
            op.apply(&ScalarValue::Bool(false), &ScalarValue::Bool(false)).unwrap(),
            ScalarValue::Bool(true)
        );
    }

    #[test]
    fn positional_reads_indices() {
        let op = BinaryOp::secondj(&ScalarType::int64()).unwrap();
        assert!(op.is_positional());
        assert_eq!(
            op.apply_positional(4, 9, 9, 2).unwrap(),
            ScalarValue::Int64(2)
        );
    }

    #[test]
    fn min_rejects_complex() {
        assert!(BinaryOp::min(&ScalarType::builtin(TypeCode::Fc64)).is_err());
    }

    #[test]
    fn user_op_runs_closure() {
        let ty = ScalarType::int32();
        let op = BinaryOp::new_user(
            "sum_of_squares",
            |x, y| match (x, y) {
                (ScalarValue::Int32(a), ScalarValue::Int32(b)) => ScalarValue::Int32(a * a + b * b),
                _ => unreachable!(),
            },
            &ty,
            &ty,
            &ty,
            None,
        );
        assert!(!op.jit_capable());
        assert_eq!(
            op.apply(&ScalarValue::Int32(3), &ScalarValue::Int32(4)).unwrap(),
            ScalarValue::Int32(25)
        );
    }
}
