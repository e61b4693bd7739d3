use crate::error::GblasError;
use crate::ops::binary::BinaryOp;
use crate::ops::monoid::Monoid;
use crate::types::{ScalarType, ScalarValue};
use std::fmt;
use std::sync::Arc;

struct SemiringInner {
    add: Monoid,
    mult: BinaryOp,
}

/// A semiring: the additive monoid and multiplicative operator of a
/// generalized matrix product
#[derive(Clone)]
pub struct Semiring {
    inner: Arc<SemiringInner>,
}

impl fmt::Debug for Semiring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Semiring({}, {})",
            self.inner.add.op().name(),
            self.inner.mult.name()
        )
    }
}

impl Semiring {
    /// Pair a monoid with a multiplier; the multiplier's output type must
    /// equal the monoid's type
    pub fn new(add: &Monoid, mult: &BinaryOp) -> Result<Semiring, GblasError> {
        if mult.ztype() != add.monoid_type() {
            return Err(GblasError::DomainMismatch(format!(
                "multiplier {} does not produce the monoid domain",
                mult.name()
            )));
        }
        Ok(Semiring {
            inner: Arc::new(SemiringInner {
                add: add.clone(),
                mult: mult.clone(),
            }),
        })
    }

    /// Conventional arithmetic: `plus_times`
    pub fn plus_times(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::plus(ty)?, &BinaryOp::times(ty))
    }

    /// Tropical semiring for shortest paths: `min_plus`
    pub fn min_plus(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::min(ty)?, &BinaryOp::plus(ty))
    }

    pub fn max_plus(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::max(ty)?, &BinaryOp::plus(ty))
    }

    pub fn min_first(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::min(ty)?, &BinaryOp::first(ty))
    }

    pub fn min_second(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::min(ty)?, &BinaryOp::second(ty))
    }

    /// Boolean reachability: `lor_land`
    pub fn lor_land() -> Semiring {
        Self::new(&Monoid::lor(), &BinaryOp::land()).unwrap()
    }

    /// Structural reachability with early exit: `any_pair`
    pub fn any_pair(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::any(ty)?, &BinaryOp::pair(ty))
    }

    /// Per-entry intersection counting: `plus_pair`
    pub fn plus_pair(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::plus(ty)?, &BinaryOp::pair(ty))
    }

    /// Parent-id propagation for BFS trees: `any_secondi`
    pub fn any_secondi(ty: &ScalarType) -> Result<Semiring, GblasError> {
        Self::new(&Monoid::any(ty)?, &BinaryOp::secondi(ty)?)
    }

    /// The same semiring with the multiplier's operands swapped
    pub(crate) fn with_flipped_mult(&self) -> Result<Semiring, GblasError> {
        Semiring::new(&self.inner.add, &self.inner.mult.flipped())
    }

    pub fn add(&self) -> &Monoid {
        &self.inner.add
    }

    pub fn mult(&self) -> &BinaryOp {
        &self.inner.mult
    }

    /// The semiring's output domain (the monoid type)
    pub fn semiring_type(&self) -> &ScalarType {
        self.inner.add.monoid_type()
    }

    pub fn identity(&self) -> &ScalarValue {
        self.inner.add.identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarValue;

    #[test]
    fn multiplier_domain_is_validated() {
        let add = Monoid::plus(&ScalarType::fp64()).unwrap();
        let mult = BinaryOp::times(&ScalarType::int32());
        assert!(Semiring::new(&add, &mult).is_err());
    }

    #[test]
    fn min_plus_combines_like_shortest_paths() {
        let sr = Semiring::min_plus(&ScalarType::fp64()).unwrap();
        let edge = sr
            .mult()
            .apply(&ScalarValue::Fp64(2.0), &ScalarValue::Fp64(3.0))
            .unwrap();
        assert_eq!(edge, ScalarValue::Fp64(5.0));
        let best = sr.add().fold(&ScalarValue::Fp64(10.0), &edge).unwrap();
        assert_eq!(best, ScalarValue::Fp64(5.0));
    }

    #[test]
    fn any_pair_is_structural() {
        let sr = Semiring::any_pair(&ScalarType::bool_type()).unwrap();
        assert!(sr.mult().ignores_input() == (true, true));
    }
}
