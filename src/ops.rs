/// Binary operators `z = f(x,y)`, including the positional family
pub mod binary;
/// Index-unary operators `z = f(x,i,j,y)` for apply and select
pub mod index_unary;
/// Monoids: associative binary operators with identity and optional terminal
pub mod monoid;
/// Semirings: an additive monoid paired with a multiplicative operator
pub mod semiring;
/// Unary operators `z = f(x)`
pub mod unary;

pub use binary::{BinaryOp, BuiltinBinary, PositionalBinary};
pub use index_unary::{BuiltinIndexUnary, IndexUnaryOp};
pub use monoid::Monoid;
pub use semiring::Semiring;
pub use unary::{BuiltinUnary, PositionalUnary, UnaryOp};
