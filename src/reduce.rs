use crate::descriptor::Descriptor;
use crate::error::{record, GblasError};
use crate::exec;
use crate::matrix::{Form, Matrix, Orientation};
use crate::ops::{BinaryOp, Monoid};
use crate::scalar::Scalar;
use crate::types::{ScalarValue, ValueStore};
use crate::vector::Vector;

/// `w⟨m⟩ ⊕= Σ_monoid A(i,:)` row-wise; the transpose flag picks the
/// column-wise direction
///
/// A row with no entries contributes no entry to `w`.
pub fn reduce_to_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    monoid: &Monoid,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    record(reduce_vector_inner(w, mask, accum, monoid, a, desc))
}

fn reduce_vector_inner(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    monoid: &Monoid,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let reduced_dim = if desc.transpose_a {
        a.ncols()
    } else {
        a.nrows()
    };
    if w.size() != reduced_dim {
        return Err(GblasError::DimensionMismatch(format!(
            "reduction of {} vectors into a length-{} vector",
            reduced_dim,
            w.size()
        )));
    }

    // fold runs along the outer vectors of a row-oriented view; the
    // hypersparse and sparse forms share it
    let a_eff = exec::oriented_input(a, desc.transpose_a, Orientation::ByRow)?;
    let read = a_eff.sparse_read().expect("input normalized to a sparse view");
    let ty = monoid.monoid_type().clone();

    let mut idx = Vec::new();
    let mut values = ValueStore::new(&ty);
    for v in 0..read.nvec() {
        let mut acc: Option<ScalarValue> = None;
        for p in read.range(v) {
            let entry = read.value(p).cast_or_keep(ty.code())?;
            acc = Some(match acc {
                Some(prev) => monoid.fold(&prev, &entry)?,
                None => entry,
            });
            if monoid.is_terminal(acc.as_ref().unwrap()) {
                break;
            }
        }
        if let Some(total) = acc {
            idx.push(read.outer_id(v));
            values.push(total.cast_or_keep(ty.code())?);
        }
    }

    let mut t = Matrix::new(&ty, reduced_dim, 1)?;
    t.load_sparse(vec![0, idx.len() as u64], idx, values, false, false);
    exec::apply_mask_accum(&mut w.m, mask.map(|m| &m.m), accum, t, desc)
}

/// Fold every entry of a matrix into a scalar; an empty matrix reduces to
/// the monoid identity
pub fn reduce_matrix_to_scalar(
    s: &mut Scalar,
    accum: Option<&BinaryOp>,
    monoid: &Monoid,
    a: &Matrix,
) -> Result<(), GblasError> {
    record(reduce_scalar_inner(s, accum, monoid, a))
}

/// Vector counterpart of [reduce_matrix_to_scalar]
pub fn reduce_vector_to_scalar(
    s: &mut Scalar,
    accum: Option<&BinaryOp>,
    monoid: &Monoid,
    u: &Vector,
) -> Result<(), GblasError> {
    record(reduce_scalar_inner(s, accum, monoid, &u.m))
}

fn reduce_scalar_inner(
    s: &mut Scalar,
    accum: Option<&BinaryOp>,
    monoid: &Monoid,
    a: &Matrix,
) -> Result<(), GblasError> {
    let mut a_eff = a.dup();
    a_eff.finish()?;
    if matches!(a_eff.form(), Form::Bitmap | Form::Full) {
        a_eff.to_form(Form::Sparse)?;
    }
    let ty = monoid.monoid_type().clone();

    let mut acc: Option<ScalarValue> = None;
    if let Some(read) = a_eff.sparse_read() {
        'outer: for v in 0..read.nvec() {
            for p in read.range(v) {
                let entry = read.value(p).cast_or_keep(ty.code())?;
                acc = Some(match acc {
                    Some(prev) => monoid.fold(&prev, &entry)?,
                    None => entry,
                });
                if monoid.is_terminal(acc.as_ref().unwrap()) {
                    break 'outer;
                }
            }
        }
    }
    let total = acc.unwrap_or_else(|| monoid.identity().clone());

    let combined = match (accum, s.value()?) {
        (Some(op), Some(old)) => op
            .apply(&old, &total)?
            .cast_or_keep(s.scalar_type().code())?,
        _ => total,
    };
    s.set(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::WaitMode;
    use crate::types::ScalarType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn row_reduce_sums_each_row() {
        let mut a = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        a.set_element(0, 0, ScalarValue::Int32(1)).unwrap();
        a.set_element(0, 2, ScalarValue::Int32(2)).unwrap();
        a.set_element(2, 1, ScalarValue::Int32(7)).unwrap();
        a.wait(WaitMode::Materialize).unwrap();
        let mut w = Vector::new(&ScalarType::int32(), 3).unwrap();
        let plus = Monoid::plus(&ScalarType::int32()).unwrap();
        reduce_to_vector(&mut w, None, None, &plus, &a, &Descriptor::new()).unwrap();
        assert_eq!(w.extract_element(0).unwrap(), Some(ScalarValue::Int32(3)));
        // row 1 is empty: no entry
        assert_eq!(w.extract_element(1).unwrap(), None);
        assert_eq!(w.extract_element(2).unwrap(), Some(ScalarValue::Int32(7)));
    }

    #[test]
    fn column_reduce_uses_the_transpose_flag() {
        let mut a = Matrix::new(&ScalarType::int32(), 2, 3).unwrap();
        a.set_element(0, 1, ScalarValue::Int32(4)).unwrap();
        a.set_element(1, 1, ScalarValue::Int32(5)).unwrap();
        a.wait(WaitMode::Materialize).unwrap();
        let mut w = Vector::new(&ScalarType::int32(), 3).unwrap();
        let plus = Monoid::plus(&ScalarType::int32()).unwrap();
        reduce_to_vector(
            &mut w,
            None,
            None,
            &plus,
            &a,
            &Descriptor::new().with_transpose_a(),
        )
        .unwrap();
        assert_eq!(w.extract_element(1).unwrap(), Some(ScalarValue::Int32(9)));
    }

    #[test]
    fn empty_matrix_reduces_to_the_identity() {
        let a = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let mut s = Scalar::new(&ScalarType::int32()).unwrap();
        let plus = Monoid::plus(&ScalarType::int32()).unwrap();
        reduce_matrix_to_scalar(&mut s, None, &plus, &a).unwrap();
        assert_eq!(s.value().unwrap(), Some(ScalarValue::Int32(0)));
    }

    #[test]
    fn scalar_accumulates_into_prior_value() {
        let mut a = Matrix::new(&ScalarType::int32(), 2, 2).unwrap();
        a.set_element(0, 0, ScalarValue::Int32(5)).unwrap();
        a.wait(WaitMode::Materialize).unwrap();
        let mut s = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(100)).unwrap();
        let plus_m = Monoid::plus(&ScalarType::int32()).unwrap();
        let plus_op = BinaryOp::plus(&ScalarType::int32());
        reduce_matrix_to_scalar(&mut s, Some(&plus_op), &plus_m, &a).unwrap();
        assert_eq!(s.value().unwrap(), Some(ScalarValue::Int32(105)));
    }

    #[test]
    fn terminal_stops_dereferencing_later_entries() {
        // every row of the 5x5 boolean matrix holds at least one true; the
        // lor terminal means entries after the first true in a row are never
        // read by the operator
        let ty = ScalarType::bool_type();
        let mut a = Matrix::new(&ty, 5, 5).unwrap();
        for r in 0..5u64 {
            for c in 0..5u64 {
                a.set_element(r, c, ScalarValue::Bool(c == 4 || (r + c) % 2 == 0))
                    .unwrap();
            }
        }
        a.wait(WaitMode::Materialize).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let counting_lor = BinaryOp::new_user(
            "counting_lor",
            move |x, y| {
                counter.fetch_add(1, Ordering::SeqCst);
                ScalarValue::Bool(x.truthy() || y.truthy())
            },
            &ty,
            &ty,
            &ty,
            None,
        );
        let monoid = Monoid::new(
            &counting_lor,
            ScalarValue::Bool(false),
            Some(ScalarValue::Bool(true)),
        )
        .unwrap();

        let mut w = Vector::new(&ty, 5).unwrap();
        reduce_to_vector(&mut w, None, None, &monoid, &a, &Descriptor::new()).unwrap();
        for r in 0..5 {
            assert_eq!(w.extract_element(r).unwrap(), Some(ScalarValue::Bool(true)));
        }
        // a full fold would call the operator 4 times per row; the terminal
        // cuts at least the rows whose first entry is already true
        assert!(calls.load(Ordering::SeqCst) < 20);
    }

    #[test]
    fn monoid_without_terminal_folds_everything() {
        let ty = ScalarType::bool_type();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let counting_lxor = BinaryOp::new_user(
            "counting_lxor",
            move |x, y| {
                counter.fetch_add(1, Ordering::SeqCst);
                ScalarValue::Bool(x.truthy() != y.truthy())
            },
            &ty,
            &ty,
            &ty,
            None,
        );
        let monoid = Monoid::new(&counting_lxor, ScalarValue::Bool(false), None).unwrap();
        let mut u = Vector::new(&ty, 6).unwrap();
        for i in 0..6 {
            u.set_element(i, ScalarValue::Bool(true)).unwrap();
        }
        u.wait(WaitMode::Materialize).unwrap();
        let mut s = Scalar::new(&ty).unwrap();
        reduce_vector_to_scalar(&mut s, None, &monoid, &u).unwrap();
        assert_eq!(s.value().unwrap(), Some(ScalarValue::Bool(false)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
