use crate::error::GblasError;
use num_complex::{Complex32, Complex64};
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

/// Largest valid row or column dimension
pub const INDEX_MAX: u64 = 1u64 << 60;

/// Code identifying a scalar domain
///
/// The discriminants are stable; they are written into serialization blobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    Udt = 0,
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    UInt8 = 6,
    UInt16 = 7,
    UInt32 = 8,
    UInt64 = 9,
    Fp32 = 10,
    Fp64 = 11,
    Fc32 = 12,
    Fc64 = 13,
}

impl TypeCode {
    pub const ALL_BUILTIN: [TypeCode; 13] = [
        TypeCode::Bool,
        TypeCode::Int8,
        TypeCode::Int16,
        TypeCode::Int32,
        TypeCode::Int64,
        TypeCode::UInt8,
        TypeCode::UInt16,
        TypeCode::UInt32,
        TypeCode::UInt64,
        TypeCode::Fp32,
        TypeCode::Fp64,
        TypeCode::Fc32,
        TypeCode::Fc64,
    ];

    pub fn from_u8(code: u8) -> Option<TypeCode> {
        match code {
            0 => Some(TypeCode::Udt),
            1 => Some(TypeCode::Bool),
            2 => Some(TypeCode::Int8),
            3 => Some(TypeCode::Int16),
            4 => Some(TypeCode::Int32),
            5 => Some(TypeCode::Int64),
            6 => Some(TypeCode::UInt8),
            7 => Some(TypeCode::UInt16),
            8 => Some(TypeCode::UInt32),
            9 => Some(TypeCode::UInt64),
            10 => Some(TypeCode::Fp32),
            11 => Some(TypeCode::Fp64),
            12 => Some(TypeCode::Fc32),
            13 => Some(TypeCode::Fc64),
            _ => None,
        }
    }

    /// Size in bytes of one value of this domain (builtin codes only)
    pub fn size(self) -> usize {
        match self {
            TypeCode::Udt => 0,
            TypeCode::Bool | TypeCode::Int8 | TypeCode::UInt8 => 1,
            TypeCode::Int16 | TypeCode::UInt16 => 2,
            TypeCode::Int32 | TypeCode::UInt32 | TypeCode::Fp32 => 4,
            TypeCode::Int64 | TypeCode::UInt64 | TypeCode::Fp64 | TypeCode::Fc32 => 8,
            TypeCode::Fc64 => 16,
        }
    }

    pub fn is_builtin(self) -> bool {
        self != TypeCode::Udt
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeCode::Int8
                | TypeCode::Int16
                | TypeCode::Int32
                | TypeCode::Int64
                | TypeCode::UInt8
                | TypeCode::UInt16
                | TypeCode::UInt32
                | TypeCode::UInt64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            TypeCode::UInt8 | TypeCode::UInt16 | TypeCode::UInt32 | TypeCode::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeCode::Fp32 | TypeCode::Fp64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, TypeCode::Fc32 | TypeCode::Fc64)
    }
}

struct TypeInfo {
    code: TypeCode,
    size: usize,
    name: String,
    /// C-source body for JIT-style backends; `None` routes to the
    /// interpreted path
    definition: Option<String>,
}

/// Handle to a scalar domain in the type registry
///
/// Built-in domains are process-lifetime singletons; cloning a handle is a
/// reference-count bump. User-defined types compare equal only to themselves.
#[derive(Clone)]
pub struct ScalarType {
    info: Arc<TypeInfo>,
}

static BUILTIN_TYPES: OnceLock<Vec<ScalarType>> = OnceLock::new();

impl ScalarType {
    /// Singleton handle for a builtin domain
    pub fn builtin(code: TypeCode) -> ScalarType {
        assert!(code.is_builtin(), "Udt has no singleton handle");
        let all = BUILTIN_TYPES.get_or_init(|| {
            TypeCode::ALL_BUILTIN
                .iter()
                .map(|&code| ScalarType {
                    info: Arc::new(TypeInfo {
                        code,
                        size: code.size(),
                        name: format!("{:?}", code).to_lowercase(),
                        definition: None,
                    }),
                })
                .collect()
        });
        all.iter().find(|t| t.code() == code).unwrap().clone()
    }

    pub fn bool_type() -> ScalarType {
        Self::builtin(TypeCode::Bool)
    }

    pub fn int32() -> ScalarType {
        Self::builtin(TypeCode::Int32)
    }

    pub fn int64() -> ScalarType {
        Self::builtin(TypeCode::Int64)
    }

    pub fn uint64() -> ScalarType {
        Self::builtin(TypeCode::UInt64)
    }

    pub fn fp32() -> ScalarType {
        Self::builtin(TypeCode::Fp32)
    }

    pub fn fp64() -> ScalarType {
        Self::builtin(TypeCode::Fp64)
    }

    /// Register a user-defined type of `size` bytes
    ///
    /// A type created without a definition cannot participate in compiled
    /// kernels; the interpreted path handles it.
    pub fn new_udt(
        size: usize,
        name: impl Into<String>,
        definition: Option<String>,
    ) -> Result<ScalarType, GblasError> {
        if size == 0 {
            return Err(GblasError::InvalidValue(
                "user-defined type size must be nonzero".to_string(),
            ));
        }
        Ok(ScalarType {
            info: Arc::new(TypeInfo {
                code: TypeCode::Udt,
                size,
                name: name.into(),
                definition,
            }),
        })
    }

    pub fn code(&self) -> TypeCode {
        self.info.code
    }

    pub fn size(&self) -> usize {
        self.info.size
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn definition(&self) -> Option<&str> {
        self.info.definition.as_deref()
    }

    /// Whether a compiled backend could specialize kernels for this type
    pub fn jit_capable(&self) -> bool {
        self.info.code.is_builtin() || self.info.definition.is_some()
    }
}

impl PartialEq for ScalarType {
    fn eq(&self, other: &Self) -> bool {
        if self.info.code == TypeCode::Udt || other.info.code == TypeCode::Udt {
            Arc::ptr_eq(&self.info, &other.info)
        } else {
            self.info.code == other.info.code
        }
    }
}

impl Eq for ScalarType {}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ScalarType({})", self.info.name)
    }
}

/// One typed value
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Fp32(f32),
    Fp64(f64),
    Fc32(Complex32),
    Fc64(Complex64),
    Udt(Vec<u8>),
}

impl ScalarValue {
    pub fn type_code(&self) -> TypeCode {
        match self {
            ScalarValue::Bool(_) => TypeCode::Bool,
            ScalarValue::Int8(_) => TypeCode::Int8,
            ScalarValue::Int16(_) => TypeCode::Int16,
            ScalarValue::Int32(_) => TypeCode::Int32,
            ScalarValue::Int64(_) => TypeCode::Int64,
            ScalarValue::UInt8(_) => TypeCode::UInt8,
            ScalarValue::UInt16(_) => TypeCode::UInt16,
            ScalarValue::UInt32(_) => TypeCode::UInt32,
            ScalarValue::UInt64(_) => TypeCode::UInt64,
            ScalarValue::Fp32(_) => TypeCode::Fp32,
            ScalarValue::Fp64(_) => TypeCode::Fp64,
            ScalarValue::Fc32(_) => TypeCode::Fc32,
            ScalarValue::Fc64(_) => TypeCode::Fc64,
            ScalarValue::Udt(_) => TypeCode::Udt,
        }
    }

    /// The additive zero of a builtin domain
    pub fn zero(code: TypeCode) -> ScalarValue {
        match code {
            TypeCode::Bool => ScalarValue::Bool(false),
            TypeCode::Int8 => ScalarValue::Int8(0),
            TypeCode::Int16 => ScalarValue::Int16(0),
            TypeCode::Int32 => ScalarValue::Int32(0),
            TypeCode::Int64 => ScalarValue::Int64(0),
            TypeCode::UInt8 => ScalarValue::UInt8(0),
            TypeCode::UInt16 => ScalarValue::UInt16(0),
            TypeCode::UInt32 => ScalarValue::UInt32(0),
            TypeCode::UInt64 => ScalarValue::UInt64(0),
            TypeCode::Fp32 => ScalarValue::Fp32(0.0),
            TypeCode::Fp64 => ScalarValue::Fp64(0.0),
            TypeCode::Fc32 => ScalarValue::Fc32(Complex32::new(0.0, 0.0)),
            TypeCode::Fc64 => ScalarValue::Fc64(Complex64::new(0.0, 0.0)),
            TypeCode::Udt => panic!("zero of a user-defined type is unknown"),
        }
    }

    /// The multiplicative one of a builtin domain
    pub fn one(code: TypeCode) -> ScalarValue {
        match code {
            TypeCode::Bool => ScalarValue::Bool(true),
            TypeCode::Int8 => ScalarValue::Int8(1),
            TypeCode::Int16 => ScalarValue::Int16(1),
            TypeCode::Int32 => ScalarValue::Int32(1),
            TypeCode::Int64 => ScalarValue::Int64(1),
            TypeCode::UInt8 => ScalarValue::UInt8(1),
            TypeCode::UInt16 => ScalarValue::UInt16(1),
            TypeCode::UInt32 => ScalarValue::UInt32(1),
            TypeCode::UInt64 => ScalarValue::UInt64(1),
            TypeCode::Fp32 => ScalarValue::Fp32(1.0),
            TypeCode::Fp64 => ScalarValue::Fp64(1.0),
            TypeCode::Fc32 => ScalarValue::Fc32(Complex32::new(1.0, 0.0)),
            TypeCode::Fc64 => ScalarValue::Fc64(Complex64::new(1.0, 0.0)),
            TypeCode::Udt => panic!("one of a user-defined type is unknown"),
        }
    }

    /// Smallest value of an ordered builtin domain (min-monoid terminal)
    pub fn min_value(code: TypeCode) -> ScalarValue {
        match code {
            TypeCode::Bool => ScalarValue::Bool(false),
            TypeCode::Int8 => ScalarValue::Int8(i8::MIN),
            TypeCode::Int16 => ScalarValue::Int16(i16::MIN),
            TypeCode::Int32 => ScalarValue::Int32(i32::MIN),
            TypeCode::Int64 => ScalarValue::Int64(i64::MIN),
            TypeCode::UInt8 => ScalarValue::UInt8(0),
            TypeCode::UInt16 => ScalarValue::UInt16(0),
            TypeCode::UInt32 => ScalarValue::UInt32(0),
            TypeCode::UInt64 => ScalarValue::UInt64(0),
            TypeCode::Fp32 => ScalarValue::Fp32(f32::NEG_INFINITY),
            TypeCode::Fp64 => ScalarValue::Fp64(f64::NEG_INFINITY),
            _ => panic!("domain is not ordered"),
        }
    }

    /// Largest value of an ordered builtin domain (max-monoid terminal)
    pub fn max_value(code: TypeCode) -> ScalarValue {
        match code {
            TypeCode::Bool => ScalarValue::Bool(true),
            TypeCode::Int8 => ScalarValue::Int8(i8::MAX),
            TypeCode::Int16 => ScalarValue::Int16(i16::MAX),
            TypeCode::Int32 => ScalarValue::Int32(i32::MAX),
            TypeCode::Int64 => ScalarValue::Int64(i64::MAX),
            TypeCode::UInt8 => ScalarValue::UInt8(u8::MAX),
            TypeCode::UInt16 => ScalarValue::UInt16(u16::MAX),
            TypeCode::UInt32 => ScalarValue::UInt32(u32::MAX),
            TypeCode::UInt64 => ScalarValue::UInt64(u64::MAX),
            TypeCode::Fp32 => ScalarValue::Fp32(f32::INFINITY),
            TypeCode::Fp64 => ScalarValue::Fp64(f64::INFINITY),
            _ => panic!("domain is not ordered"),
        }
    }

    /// Truthiness used by valued masks: `value != 0`
    pub fn truthy(&self) -> bool {
        match self {
            ScalarValue::Bool(v) => *v,
            ScalarValue::Int8(v) => *v != 0,
            ScalarValue::Int16(v) => *v != 0,
            ScalarValue::Int32(v) => *v != 0,
            ScalarValue::Int64(v) => *v != 0,
            ScalarValue::UInt8(v) => *v != 0,
            ScalarValue::UInt16(v) => *v != 0,
            ScalarValue::UInt32(v) => *v != 0,
            ScalarValue::UInt64(v) => *v != 0,
            ScalarValue::Fp32(v) => *v != 0.0,
            ScalarValue::Fp64(v) => *v != 0.0,
            ScalarValue::Fc32(v) => v.re != 0.0 || v.im != 0.0,
            ScalarValue::Fc64(v) => v.re != 0.0 || v.im != 0.0,
            ScalarValue::Udt(bytes) => bytes.iter().any(|&b| b != 0),
        }
    }

    fn to_i64(&self) -> i64 {
        match self {
            ScalarValue::Bool(v) => *v as i64,
            ScalarValue::Int8(v) => *v as i64,
            ScalarValue::Int16(v) => *v as i64,
            ScalarValue::Int32(v) => *v as i64,
            ScalarValue::Int64(v) => *v,
            ScalarValue::UInt8(v) => *v as i64,
            ScalarValue::UInt16(v) => *v as i64,
            ScalarValue::UInt32(v) => *v as i64,
            ScalarValue::UInt64(v) => *v as i64,
            ScalarValue::Fp32(v) => round_to_i64(*v as f64),
            ScalarValue::Fp64(v) => round_to_i64(*v),
            ScalarValue::Fc32(v) => round_to_i64(v.re as f64),
            ScalarValue::Fc64(v) => round_to_i64(v.re),
            ScalarValue::Udt(_) => 0,
        }
    }

    fn to_u64(&self) -> u64 {
        match self {
            ScalarValue::UInt64(v) => *v,
            ScalarValue::UInt8(v) => *v as u64,
            ScalarValue::UInt16(v) => *v as u64,
            ScalarValue::UInt32(v) => *v as u64,
            ScalarValue::Fp32(v) => round_to_u64(*v as f64),
            ScalarValue::Fp64(v) => round_to_u64(*v),
            ScalarValue::Fc32(v) => round_to_u64(v.re as f64),
            ScalarValue::Fc64(v) => round_to_u64(v.re),
            other => other.to_i64() as u64,
        }
    }

    fn to_f64(&self) -> f64 {
        match self {
            ScalarValue::Bool(v) => *v as u8 as f64,
            ScalarValue::Int8(v) => *v as f64,
            ScalarValue::Int16(v) => *v as f64,
            ScalarValue::Int32(v) => *v as f64,
            ScalarValue::Int64(v) => *v as f64,
            ScalarValue::UInt8(v) => *v as f64,
            ScalarValue::UInt16(v) => *v as f64,
            ScalarValue::UInt32(v) => *v as f64,
            ScalarValue::UInt64(v) => *v as f64,
            ScalarValue::Fp32(v) => *v as f64,
            ScalarValue::Fp64(v) => *v,
            ScalarValue::Fc32(v) => v.re as f64,
            ScalarValue::Fc64(v) => v.re,
            ScalarValue::Udt(_) => 0.0,
        }
    }

    /// Typecast to another builtin domain
    ///
    /// C-style semantics: float→integer rounds to nearest and clamps,
    /// anything→bool is `!= 0`, real→complex takes a zero imaginary part,
    /// complex→real drops the imaginary part. Casting a user-defined value to
    /// any other domain (or vice versa) is a domain error.
    pub fn cast(&self, to: TypeCode) -> Result<ScalarValue, GblasError> {
        if self.type_code() == to {
            return Ok(self.clone());
        }
        if self.type_code() == TypeCode::Udt || to == TypeCode::Udt {
            return Err(GblasError::DomainMismatch(
                "user-defined types cannot be typecast".to_string(),
            ));
        }
        Ok(match to {
            TypeCode::Bool => ScalarValue::Bool(self.truthy()),
            TypeCode::Int8 => ScalarValue::Int8(clamp_i64(self.to_i64(), i8::MIN as i64, i8::MAX as i64) as i8),
            TypeCode::Int16 => ScalarValue::Int16(clamp_i64(self.to_i64(), i16::MIN as i64, i16::MAX as i64) as i16),
            TypeCode::Int32 => ScalarValue::Int32(clamp_i64(self.to_i64(), i32::MIN as i64, i32::MAX as i64) as i32),
            TypeCode::Int64 => ScalarValue::Int64(self.to_i64()),
            TypeCode::UInt8 => ScalarValue::UInt8(self.to_u64().min(u8::MAX as u64) as u8),
            TypeCode::UInt16 => ScalarValue::UInt16(self.to_u64().min(u16::MAX as u64) as u16),
            TypeCode::UInt32 => ScalarValue::UInt32(self.to_u64().min(u32::MAX as u64) as u32),
            TypeCode::UInt64 => ScalarValue::UInt64(self.to_u64()),
            TypeCode::Fp32 => ScalarValue::Fp32(self.to_f64() as f32),
            TypeCode::Fp64 => ScalarValue::Fp64(self.to_f64()),
            TypeCode::Fc32 => match self {
                ScalarValue::Fc64(v) => ScalarValue::Fc32(Complex32::new(v.re as f32, v.im as f32)),
                other => ScalarValue::Fc32(Complex32::new(other.to_f64() as f32, 0.0)),
            },
            TypeCode::Fc64 => match self {
                ScalarValue::Fc32(v) => ScalarValue::Fc64(Complex64::new(v.re as f64, v.im as f64)),
                other => ScalarValue::Fc64(Complex64::new(other.to_f64(), 0.0)),
            },
            TypeCode::Udt => unreachable!(),
        })
    }
}

fn round_to_i64(v: f64) -> i64 {
    if v.is_nan() {
        0
    } else if v >= i64::MAX as f64 {
        i64::MAX
    } else if v <= i64::MIN as f64 {
        i64::MIN
    } else {
        v.round() as i64
    }
}

fn round_to_u64(v: f64) -> u64 {
    if v.is_nan() || v <= 0.0 {
        0
    } else if v >= u64::MAX as f64 {
        u64::MAX
    } else {
        v.round() as u64
    }
}

fn clamp_i64(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

/// Typed value array backing every storage form
///
/// One vector variant per builtin domain keeps the values contiguous and
/// lets pack/unpack and serialization move whole arrays; user-defined values
/// live in a flat byte buffer with a fixed stride.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueStore {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Fp32(Vec<f32>),
    Fp64(Vec<f64>),
    Fc32(Vec<Complex32>),
    Fc64(Vec<Complex64>),
    Udt { data: Vec<u8>, size: usize },
}

impl ValueStore {
    pub fn new(ty: &ScalarType) -> ValueStore {
        Self::with_capacity(ty, 0)
    }

    pub fn with_capacity(ty: &ScalarType, cap: usize) -> ValueStore {
        match ty.code() {
            TypeCode::Bool => ValueStore::Bool(Vec::with_capacity(cap)),
            TypeCode::Int8 => ValueStore::Int8(Vec::with_capacity(cap)),
            TypeCode::Int16 => ValueStore::Int16(Vec::with_capacity(cap)),
            TypeCode::Int32 => ValueStore::Int32(Vec::with_capacity(cap)),
            TypeCode::Int64 => ValueStore::Int64(Vec::with_capacity(cap)),
            TypeCode::UInt8 => ValueStore::UInt8(Vec::with_capacity(cap)),
            TypeCode::UInt16 => ValueStore::UInt16(Vec::with_capacity(cap)),
            TypeCode::UInt32 => ValueStore::UInt32(Vec::with_capacity(cap)),
            TypeCode::UInt64 => ValueStore::UInt64(Vec::with_capacity(cap)),
            TypeCode::Fp32 => ValueStore::Fp32(Vec::with_capacity(cap)),
            TypeCode::Fp64 => ValueStore::Fp64(Vec::with_capacity(cap)),
            TypeCode::Fc32 => ValueStore::Fc32(Vec::with_capacity(cap)),
            TypeCode::Fc64 => ValueStore::Fc64(Vec::with_capacity(cap)),
            TypeCode::Udt => ValueStore::Udt {
                data: Vec::with_capacity(cap * ty.size()),
                size: ty.size(),
            },
        }
    }

    pub fn type_code(&self) -> TypeCode {
        match self {
            ValueStore::Bool(_) => TypeCode::Bool,
            ValueStore::Int8(_) => TypeCode::Int8,
            ValueStore::Int16(_) => TypeCode::Int16,
            ValueStore::Int32(_) => TypeCode::Int32,
            ValueStore::Int64(_) => TypeCode::Int64,
            ValueStore::UInt8(_) => TypeCode::UInt8,
            ValueStore::UInt16(_) => TypeCode::UInt16,
            ValueStore::UInt32(_) => TypeCode::UInt32,
            ValueStore::UInt64(_) => TypeCode::UInt64,
            ValueStore::Fp32(_) => TypeCode::Fp32,
            ValueStore::Fp64(_) => TypeCode::Fp64,
            ValueStore::Fc32(_) => TypeCode::Fc32,
            ValueStore::Fc64(_) => TypeCode::Fc64,
            ValueStore::Udt { .. } => TypeCode::Udt,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueStore::Bool(v) => v.len(),
            ValueStore::Int8(v) => v.len(),
            ValueStore::Int16(v) => v.len(),
            ValueStore::Int32(v) => v.len(),
            ValueStore::Int64(v) => v.len(),
            ValueStore::UInt8(v) => v.len(),
            ValueStore::UInt16(v) => v.len(),
            ValueStore::UInt32(v) => v.len(),
            ValueStore::UInt64(v) => v.len(),
            ValueStore::Fp32(v) => v.len(),
            ValueStore::Fp64(v) => v.len(),
            ValueStore::Fc32(v) => v.len(),
            ValueStore::Fc64(v) => v.len(),
            ValueStore::Udt { data, size } => data.len() / size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> ScalarValue {
        match self {
            ValueStore::Bool(v) => ScalarValue::Bool(v[i]),
            ValueStore::Int8(v) => ScalarValue::Int8(v[i]),
            ValueStore::Int16(v) => ScalarValue::Int16(v[i]),
            ValueStore::Int32(v) => ScalarValue::Int32(v[i]),
            ValueStore::Int64(v) => ScalarValue::Int64(v[i]),
            ValueStore::UInt8(v) => ScalarValue::UInt8(v[i]),
            ValueStore::UInt16(v) => ScalarValue::UInt16(v[i]),
            ValueStore::UInt32(v) => ScalarValue::UInt32(v[i]),
            ValueStore::UInt64(v) => ScalarValue::UInt64(v[i]),
            ValueStore::Fp32(v) => ScalarValue::Fp32(v[i]),
            ValueStore::Fp64(v) => ScalarValue::Fp64(v[i]),
            ValueStore::Fc32(v) => ScalarValue::Fc32(v[i]),
            ValueStore::Fc64(v) => ScalarValue::Fc64(v[i]),
            ValueStore::Udt { data, size } => {
                ScalarValue::Udt(data[i * size..(i + 1) * size].to_vec())
            }
        }
    }

    /// Push a value; the value's domain must match the store's
    pub fn push(&mut self, value: ScalarValue) {
        match (self, value) {
            (ValueStore::Bool(v), ScalarValue::Bool(x)) => v.push(x),
            (ValueStore::Int8(v), ScalarValue::Int8(x)) => v.push(x),
            (ValueStore::Int16(v), ScalarValue::Int16(x)) => v.push(x),
            (ValueStore::Int32(v), ScalarValue::Int32(x)) => v.push(x),
            (ValueStore::Int64(v), ScalarValue::Int64(x)) => v.push(x),
            (ValueStore::UInt8(v), ScalarValue::UInt8(x)) => v.push(x),
            (ValueStore::UInt16(v), ScalarValue::UInt16(x)) => v.push(x),
            (ValueStore::UInt32(v), ScalarValue::UInt32(x)) => v.push(x),
            (ValueStore::UInt64(v), ScalarValue::UInt64(x)) => v.push(x),
            (ValueStore::Fp32(v), ScalarValue::Fp32(x)) => v.push(x),
            (ValueStore::Fp64(v), ScalarValue::Fp64(x)) => v.push(x),
            (ValueStore::Fc32(v), ScalarValue::Fc32(x)) => v.push(x),
            (ValueStore::Fc64(v), ScalarValue::Fc64(x)) => v.push(x),
            (ValueStore::Udt { data, size }, ScalarValue::Udt(bytes)) => {
                assert_eq!(bytes.len(), *size, "UDT value has the wrong stride");
                data.extend_from_slice(&bytes);
            }
            (store, value) => panic!(
                "value domain {:?} does not match store domain {:?}",
                value.type_code(),
                store.type_code()
            ),
        }
    }

    pub fn set(&mut self, i: usize, value: ScalarValue) {
        match (self, value) {
            (ValueStore::Bool(v), ScalarValue::Bool(x)) => v[i] = x,
            (ValueStore::Int8(v), ScalarValue::Int8(x)) => v[i] = x,
            (ValueStore::Int16(v), ScalarValue::Int16(x)) => v[i] = x,
            (ValueStore::Int32(v), ScalarValue::Int32(x)) => v[i] = x,
            (ValueStore::Int64(v), ScalarValue::Int64(x)) => v[i] = x,
            (ValueStore::UInt8(v), ScalarValue::UInt8(x)) => v[i] = x,
            (ValueStore::UInt16(v), ScalarValue::UInt16(x)) => v[i] = x,
            (ValueStore::UInt32(v), ScalarValue::UInt32(x)) => v[i] = x,
            (ValueStore::UInt64(v), ScalarValue::UInt64(x)) => v[i] = x,
            (ValueStore::Fp32(v), ScalarValue::Fp32(x)) => v[i] = x,
            (ValueStore::Fp64(v), ScalarValue::Fp64(x)) => v[i] = x,
            (ValueStore::Fc32(v), ScalarValue::Fc32(x)) => v[i] = x,
            (ValueStore::Fc64(v), ScalarValue::Fc64(x)) => v[i] = x,
            (ValueStore::Udt { data, size }, ScalarValue::Udt(bytes)) => {
                assert_eq!(bytes.len(), *size, "UDT value has the wrong stride");
                data[i * *size..(i + 1) * *size].copy_from_slice(&bytes);
            }
            (store, value) => panic!(
                "value domain {:?} does not match store domain {:?}",
                value.type_code(),
                store.type_code()
            ),
        }
    }

    /// A store holding `n` copies of `value` (expanding an iso matrix)
    pub fn repeat(ty: &ScalarType, value: &ScalarValue, n: usize) -> ValueStore {
        let mut out = ValueStore::with_capacity(ty, n);
        for _ in 0..n {
            out.push(value.clone());
        }
        out
    }

    /// A store filled with the domain's zero (bitmap holes)
    pub fn zeros(ty: &ScalarType, n: usize) -> ValueStore {
        match ty.code() {
            TypeCode::Udt => ValueStore::Udt {
                data: vec![0u8; n * ty.size()],
                size: ty.size(),
            },
            code => Self::repeat(ty, &ScalarValue::zero(code), n),
        }
    }

    pub fn clear(&mut self) {
        match self {
            ValueStore::Bool(v) => v.clear(),
            ValueStore::Int8(v) => v.clear(),
            ValueStore::Int16(v) => v.clear(),
            ValueStore::Int32(v) => v.clear(),
            ValueStore::Int64(v) => v.clear(),
            ValueStore::UInt8(v) => v.clear(),
            ValueStore::UInt16(v) => v.clear(),
            ValueStore::UInt32(v) => v.clear(),
            ValueStore::UInt64(v) => v.clear(),
            ValueStore::Fp32(v) => v.clear(),
            ValueStore::Fp64(v) => v.clear(),
            ValueStore::Fc32(v) => v.clear(),
            ValueStore::Fc64(v) => v.clear(),
            ValueStore::Udt { data, .. } => data.clear(),
        }
    }

    pub fn truncate(&mut self, n: usize) {
        match self {
            ValueStore::Bool(v) => v.truncate(n),
            ValueStore::Int8(v) => v.truncate(n),
            ValueStore::Int16(v) => v.truncate(n),
            ValueStore::Int32(v) => v.truncate(n),
            ValueStore::Int64(v) => v.truncate(n),
            ValueStore::UInt8(v) => v.truncate(n),
            ValueStore::UInt16(v) => v.truncate(n),
            ValueStore::UInt32(v) => v.truncate(n),
            ValueStore::UInt64(v) => v.truncate(n),
            ValueStore::Fp32(v) => v.truncate(n),
            ValueStore::Fp64(v) => v.truncate(n),
            ValueStore::Fc32(v) => v.truncate(n),
            ValueStore::Fc64(v) => v.truncate(n),
            ValueStore::Udt { data, size } => data.truncate(n * *size),
        }
    }

    /// Append another store of the same domain, draining it
    pub fn append(&mut self, other: &mut ValueStore) {
        match (self, other) {
            (ValueStore::Bool(a), ValueStore::Bool(b)) => a.append(b),
            (ValueStore::Int8(a), ValueStore::Int8(b)) => a.append(b),
            (ValueStore::Int16(a), ValueStore::Int16(b)) => a.append(b),
            (ValueStore::Int32(a), ValueStore::Int32(b)) => a.append(b),
            (ValueStore::Int64(a), ValueStore::Int64(b)) => a.append(b),
            (ValueStore::UInt8(a), ValueStore::UInt8(b)) => a.append(b),
            (ValueStore::UInt16(a), ValueStore::UInt16(b)) => a.append(b),
            (ValueStore::UInt32(a), ValueStore::UInt32(b)) => a.append(b),
            (ValueStore::UInt64(a), ValueStore::UInt64(b)) => a.append(b),
            (ValueStore::Fp32(a), ValueStore::Fp32(b)) => a.append(b),
            (ValueStore::Fp64(a), ValueStore::Fp64(b)) => a.append(b),
            (ValueStore::Fc32(a), ValueStore::Fc32(b)) => a.append(b),
            (ValueStore::Fc64(a), ValueStore::Fc64(b)) => a.append(b),
            (ValueStore::Udt { data: a, .. }, ValueStore::Udt { data: b, .. }) => a.append(b),
            _ => panic!("cannot append stores of different domains"),
        }
    }

    /// Gather `keep[0..]` positions into a fresh store (zombie compaction,
    /// sort permutations)
    pub fn gather(&self, keep: &[usize]) -> ValueStore {
        match self {
            ValueStore::Bool(v) => ValueStore::Bool(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Int8(v) => ValueStore::Int8(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Int16(v) => ValueStore::Int16(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Int32(v) => ValueStore::Int32(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Int64(v) => ValueStore::Int64(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::UInt8(v) => ValueStore::UInt8(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::UInt16(v) => ValueStore::UInt16(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::UInt32(v) => ValueStore::UInt32(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::UInt64(v) => ValueStore::UInt64(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Fp32(v) => ValueStore::Fp32(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Fp64(v) => ValueStore::Fp64(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Fc32(v) => ValueStore::Fc32(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Fc64(v) => ValueStore::Fc64(keep.iter().map(|&p| v[p]).collect()),
            ValueStore::Udt { data, size } => {
                let mut out = Vec::with_capacity(keep.len() * size);
                for &p in keep {
                    out.extend_from_slice(&data[p * size..(p + 1) * size]);
                }
                ValueStore::Udt {
                    data: out,
                    size: *size,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_singletons_compare_equal() {
        assert_eq!(ScalarType::fp64(), ScalarType::builtin(TypeCode::Fp64));
        assert_ne!(ScalarType::fp64(), ScalarType::fp32());
    }

    #[test]
    fn udt_handles_are_identity_equal() {
        let a = ScalarType::new_udt(16, "pair", None).unwrap();
        let b = ScalarType::new_udt(16, "pair", None).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(!a.jit_capable());
    }

    #[test]
    fn float_to_int_cast_rounds_and_clamps() {
        assert_eq!(
            ScalarValue::Fp64(2.6).cast(TypeCode::Int32).unwrap(),
            ScalarValue::Int32(3)
        );
        assert_eq!(
            ScalarValue::Fp64(1e12).cast(TypeCode::Int8).unwrap(),
            ScalarValue::Int8(i8::MAX)
        );
        assert_eq!(
            ScalarValue::Fp64(f64::NAN).cast(TypeCode::Int32).unwrap(),
            ScalarValue::Int32(0)
        );
        assert_eq!(
            ScalarValue::Fp64(-1.0).cast(TypeCode::UInt16).unwrap(),
            ScalarValue::UInt16(0)
        );
    }

    #[test]
    fn cast_to_bool_is_nonzero_test() {
        assert_eq!(
            ScalarValue::Int32(-7).cast(TypeCode::Bool).unwrap(),
            ScalarValue::Bool(true)
        );
        assert_eq!(
            ScalarValue::Fp32(0.0).cast(TypeCode::Bool).unwrap(),
            ScalarValue::Bool(false)
        );
    }

    #[test]
    fn complex_real_round_trip() {
        let z = ScalarValue::Fp64(-4.5).cast(TypeCode::Fc64).unwrap();
        assert_eq!(z, ScalarValue::Fc64(Complex64::new(-4.5, 0.0)));
        assert_eq!(z.cast(TypeCode::Fp64).unwrap(), ScalarValue::Fp64(-4.5));
    }

    #[test]
    fn store_push_get_gather() {
        let ty = ScalarType::int32();
        let mut store = ValueStore::new(&ty);
        for x in [5, -2, 9] {
            store.push(ScalarValue::Int32(x));
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(1), ScalarValue::Int32(-2));
        let picked = store.gather(&[2, 0]);
        assert_eq!(picked.get(0), ScalarValue::Int32(9));
        assert_eq!(picked.get(1), ScalarValue::Int32(5));
    }

    #[test]
    fn udt_store_uses_fixed_stride() {
        let ty = ScalarType::new_udt(4, "quad", None).unwrap();
        let mut store = ValueStore::new(&ty);
        store.push(ScalarValue::Udt(vec![1, 2, 3, 4]));
        store.push(ScalarValue::Udt(vec![5, 6, 7, 8]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1), ScalarValue::Udt(vec![5, 6, 7, 8]));
    }

    #[test]
    #[should_panic]
    fn store_rejects_mismatched_domain() {
        let mut store = ValueStore::new(&ScalarType::int32());
        store.push(ScalarValue::Fp64(1.0));
    }
}
