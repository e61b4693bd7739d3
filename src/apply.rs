use crate::descriptor::Descriptor;
use crate::error::{record, GblasError};
use crate::exec;
use crate::matrix::store::Store;
use crate::matrix::{Form, Matrix, Orientation};
use crate::ops::{BinaryOp, IndexUnaryOp, UnaryOp};
use crate::scalar::Scalar;
use crate::types::{ScalarValue, ValueStore};
use crate::vector::Vector;
use std::borrow::Cow;

/// `C⟨M⟩ ⊕= f(A)` entry by entry
pub fn apply_unary(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &UnaryOp,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    record(apply_unary_inner(c, mask, accum, op, a, desc))
}

fn apply_unary_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &UnaryOp,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let a_eff = prepared_input(c, a, desc)?;
    let ztype = op.ztype().clone();

    // a value-only operator on an iso input touches one value
    if a_eff.is_iso() && !op.is_positional() && !a_eff.store_is_empty() {
        let z = op.apply(&a_eff.value_at(0))?.cast_or_keep(ztype.code())?;
        let t = iso_like(&a_eff, &ztype, z)?;
        return exec::apply_mask_accum(c, mask, accum, t, desc);
    }

    let t = map_entries(&a_eff, &ztype, |v, i, j| {
        if op.is_positional() {
            op.apply_positional(i, j)
        } else {
            op.apply(v)
        }
    })?;
    exec::apply_mask_accum(c, mask, accum, t, desc)
}

/// `C⟨M⟩ ⊕= f(x, A)` with the scalar bound to the first operand
pub fn apply_binary_first(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    x: &Scalar,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let x = x.value()?.ok_or(GblasError::EmptyObject)?;
    record(apply_bound_inner(c, mask, accum, op, a, desc, Bound::First(x)))
}

/// `C⟨M⟩ ⊕= f(A, y)` with the scalar bound to the second operand
pub fn apply_binary_second(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    y: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let y = y.value()?.ok_or(GblasError::EmptyObject)?;
    record(apply_bound_inner(c, mask, accum, op, a, desc, Bound::Second(y)))
}

enum Bound {
    First(ScalarValue),
    Second(ScalarValue),
}

fn apply_bound_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    desc: &Descriptor,
    bound: Bound,
) -> Result<(), GblasError> {
    let a_eff = prepared_input(c, a, desc)?;
    let ztype = op.ztype().clone();

    if a_eff.is_iso() && !op.is_positional() && !a_eff.store_is_empty() {
        let av = a_eff.value_at(0);
        let z = match &bound {
            Bound::First(x) => op.apply(x, &av)?,
            Bound::Second(y) => op.apply(&av, y)?,
        }
        .cast_or_keep(ztype.code())?;
        let t = iso_like(&a_eff, &ztype, z)?;
        return exec::apply_mask_accum(c, mask, accum, t, desc);
    }

    let t = map_entries(&a_eff, &ztype, |v, i, j| {
        if op.is_positional() {
            op.apply_positional(i, j, i, j)
        } else {
            match &bound {
                Bound::First(x) => op.apply(x, v),
                Bound::Second(y) => op.apply(v, y),
            }
        }
    })?;
    exec::apply_mask_accum(c, mask, accum, t, desc)
}

/// `C⟨M⟩ ⊕= f(A(i,j), i, j, y)`
pub fn apply_index_unary(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &IndexUnaryOp,
    a: &Matrix,
    thunk: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let thunk = thunk.value()?.ok_or(GblasError::EmptyObject)?;
    record(apply_index_inner(c, mask, accum, op, a, &thunk, desc))
}

fn apply_index_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &IndexUnaryOp,
    a: &Matrix,
    thunk: &ScalarValue,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let a_eff = prepared_input(c, a, desc)?;
    let ztype = op.ztype().clone();
    let t = map_entries(&a_eff, &ztype, |v, i, j| op.apply(v, i, j, thunk))?;
    exec::apply_mask_accum(c, mask, accum, t, desc)
}

/// Keep exactly the entries where the boolean-valued index-unary operator
/// holds; values pass through unchanged
pub fn select(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &IndexUnaryOp,
    a: &Matrix,
    thunk: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let thunk = thunk.value()?.ok_or(GblasError::EmptyObject)?;
    record(select_inner(c, mask, accum, op, a, &thunk, desc))
}

fn select_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &IndexUnaryOp,
    a: &Matrix,
    thunk: &ScalarValue,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let a_eff = prepared_input(c, a, desc)?;
    let read = a_eff.sparse_read().expect("input normalized to sparse");
    let ty = a_eff.mat_type().clone();

    let mut ptr = Vec::with_capacity(read.nvec() + 1);
    ptr.push(0u64);
    let mut idx = Vec::new();
    let mut values = ValueStore::new(&ty);
    for v in 0..read.nvec() {
        let col = read.outer_id(v);
        for p in read.range(v) {
            let (row, col) = (read.idx[p], col);
            let keep = op
                .apply(&read.value(p), row, col, thunk)?
                .cast(crate::types::TypeCode::Bool)?;
            if keep == ScalarValue::Bool(true) {
                idx.push(row);
                values.push(read.value(p));
            }
        }
        ptr.push(idx.len() as u64);
    }
    let mut t = Matrix::new(&ty, a_eff.nrows(), a_eff.ncols())?;
    t.load_sparse(ptr, idx, values, false, false);
    exec::apply_mask_accum(c, mask, accum, t, desc)
}

/// Vector forms

pub fn apply_unary_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    op: &UnaryOp,
    u: &Vector,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    apply_unary(&mut w.m, mask.map(|m| &m.m), accum, op, &u.m, desc)
}

pub fn select_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    op: &IndexUnaryOp,
    u: &Vector,
    thunk: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    select(&mut w.m, mask.map(|m| &m.m), accum, op, &u.m, thunk, desc)
}

/// Orient, drain, and sparsify the input of an entry-wise walk
fn prepared_input<'a>(
    c: &Matrix,
    a: &'a Matrix,
    desc: &Descriptor,
) -> Result<Cow<'a, Matrix>, GblasError> {
    let (a_rows, a_cols) = if desc.transpose_a {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    if a_rows != c.nrows() || a_cols != c.ncols() {
        return Err(GblasError::DimensionMismatch(format!(
            "input is {}x{}, output is {}x{}",
            a_rows, a_cols,
            c.nrows(),
            c.ncols()
        )));
    }
    let mut a_eff = exec::oriented_input(a, desc.transpose_a, Orientation::ByCol)?;
    if a_eff.form() == Form::Hypersparse {
        a_eff.to_mut().to_form(Form::Sparse)?;
    }
    Ok(a_eff)
}

/// A result with the input's pattern and a single shared value
fn iso_like(
    a_eff: &Matrix,
    ztype: &crate::types::ScalarType,
    z: ScalarValue,
) -> Result<Matrix, GblasError> {
    let mut t = Matrix::new(ztype, a_eff.nrows(), a_eff.ncols())?;
    if let Store::Sparse { ptr, idx, .. } = &a_eff.store {
        let mut values = ValueStore::new(ztype);
        values.push(z);
        t.load_sparse(ptr.clone(), idx.clone(), values, true, false);
    }
    Ok(t)
}

/// Map every entry of a sparse ByCol input through `f(value, row, col)`
fn map_entries(
    a_eff: &Matrix,
    ztype: &crate::types::ScalarType,
    mut f: impl FnMut(&ScalarValue, u64, u64) -> Result<ScalarValue, GblasError>,
) -> Result<Matrix, GblasError> {
    let read = a_eff.sparse_read().expect("input normalized to sparse");
    let zcode = ztype.code();
    let mut values = ValueStore::with_capacity(ztype, read.idx.len());
    for v in 0..read.nvec() {
        let col = read.outer_id(v);
        for p in read.range(v) {
            let z = f(&read.value(p), read.idx[p], col)?;
            values.push(z.cast_or_keep(zcode)?);
        }
    }
    let mut t = Matrix::new(ztype, a_eff.nrows(), a_eff.ncols())?;
    if let Store::Sparse { ptr, idx, .. } = &a_eff.store {
        t.load_sparse(ptr.clone(), idx.clone(), values, false, false);
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::WaitMode;
    use crate::ops::BuiltinIndexUnary;
    use crate::types::ScalarType;

    fn int_matrix(entries: &[(u64, u64, i32)]) -> Matrix {
        let mut m = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        for &(r, c, v) in entries {
            m.set_element(r, c, ScalarValue::Int32(v)).unwrap();
        }
        m.wait(WaitMode::Materialize).unwrap();
        m
    }

    #[test]
    fn unary_apply_maps_every_entry() {
        let a = int_matrix(&[(0, 0, 3), (2, 1, -4)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let ainv = UnaryOp::ainv(&ScalarType::int32());
        apply_unary(&mut c, None, None, &ainv, &a, &Descriptor::new()).unwrap();
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(-3))
        );
        assert_eq!(
            c.extract_element(2, 1).unwrap(),
            Some(ScalarValue::Int32(4))
        );
    }

    #[test]
    fn bound_binary_applies_the_scalar_side() {
        let a = int_matrix(&[(0, 0, 3), (1, 1, 5)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let minus = BinaryOp::minus(&ScalarType::int32());
        let x = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(10)).unwrap();
        apply_binary_first(&mut c, None, None, &minus, &x, &a, &Descriptor::new()).unwrap();
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(7))
        );
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(5))
        );
    }

    #[test]
    fn select_tril_filters_the_upper_triangle() {
        let a = int_matrix(&[(0, 0, 1), (0, 2, 2), (2, 0, 3), (1, 1, 4)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let tril = IndexUnaryOp::tril();
        let zero = Scalar::from_value(&ScalarType::int64(), ScalarValue::Int64(0)).unwrap();
        select(&mut c, None, None, &tril, &a, &zero, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 3);
        assert_eq!(c.extract_element(0, 2).unwrap(), None);
        assert_eq!(
            c.extract_element(2, 0).unwrap(),
            Some(ScalarValue::Int32(3))
        );
    }

    #[test]
    fn select_by_value_threshold() {
        let a = int_matrix(&[(0, 0, 1), (1, 1, 8), (2, 2, 5)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let gt = IndexUnaryOp::value_predicate(BuiltinIndexUnary::ValueGt, &ScalarType::int32())
            .unwrap();
        let four = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(4)).unwrap();
        select(&mut c, None, None, &gt, &a, &four, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 2);
        assert_eq!(c.extract_element(0, 0).unwrap(), None);
    }

    #[test]
    fn rowindex_apply_is_positional() {
        let a = int_matrix(&[(0, 1, 99), (2, 2, 99)]);
        let mut c = Matrix::new(&ScalarType::int64(), 3, 3).unwrap();
        let op = IndexUnaryOp::rowindex();
        let zero = Scalar::from_value(&ScalarType::int64(), ScalarValue::Int64(0)).unwrap();
        apply_index_unary(&mut c, None, None, &op, &a, &zero, &Descriptor::new()).unwrap();
        assert_eq!(
            c.extract_element(0, 1).unwrap(),
            Some(ScalarValue::Int64(0))
        );
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int64(2))
        );
    }

    #[test]
    fn iso_input_stays_iso_through_a_value_op() {
        let mut a = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        let mut vals = ValueStore::new(&ScalarType::int32());
        for _ in 0..3 {
            vals.push(ScalarValue::Int32(5));
        }
        a.build(&[0, 1, 2], &[0, 1, 2], &vals, None).unwrap();
        assert!(a.is_iso());
        let mut c = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        let ainv = UnaryOp::ainv(&ScalarType::int32());
        apply_unary(&mut c, None, None, &ainv, &a, &Descriptor::new()).unwrap();
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(-5))
        );
    }
}
