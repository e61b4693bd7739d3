use crate::context;
use crate::descriptor::Descriptor;
use crate::error::{record, GblasError};
use crate::exec::{self, split_ranges};
use crate::matrix::{Form, Matrix, Orientation};
use crate::ops::BinaryOp;
use crate::scalar::Scalar;
use crate::types::{ScalarValue, ValueStore};
use crate::vector::Vector;
use rayon::prelude::*;

/// Set-intersection element-wise multiply: `T(i,j) = op(A(i,j), B(i,j))`
/// wherever both inputs have the entry
pub fn ewise_mult(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    record(ewise_inner(c, mask, accum, op, a, b, desc, EwiseKind::Mult))
}

/// Set-union element-wise add; a lone value is copied through unmodified
pub fn ewise_add(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    record(ewise_inner(c, mask, accum, op, a, b, desc, EwiseKind::Add))
}

/// Always-apply union: a lone A value meets `beta`, a lone B value meets
/// `alpha`
pub fn ewise_union(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    alpha: &Scalar,
    b: &Matrix,
    beta: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let alpha = alpha
        .value()?
        .ok_or(GblasError::EmptyObject)?;
    let beta = beta
        .value()?
        .ok_or(GblasError::EmptyObject)?;
    record(ewise_inner(
        c,
        mask,
        accum,
        op,
        a,
        b,
        desc,
        EwiseKind::Union { alpha, beta },
    ))
}

#[derive(Clone)]
enum EwiseKind {
    Mult,
    Add,
    Union { alpha: ScalarValue, beta: ScalarValue },
}

#[allow(clippy::too_many_arguments)]
fn ewise_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
    kind: EwiseKind,
) -> Result<(), GblasError> {
    let (a_rows, a_cols) = if desc.transpose_a {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    let (b_rows, b_cols) = if desc.transpose_b {
        (b.ncols(), b.nrows())
    } else {
        (b.nrows(), b.ncols())
    };
    if a_rows != b_rows || a_cols != b_cols || a_rows != c.nrows() || a_cols != c.ncols() {
        return Err(GblasError::DimensionMismatch(format!(
            "element-wise inputs {}x{} and {}x{} into a {}x{} output",
            a_rows, a_cols, b_rows, b_cols,
            c.nrows(),
            c.ncols()
        )));
    }

    let mut a_eff = exec::oriented_input(a, desc.transpose_a, Orientation::ByCol)?;
    if a_eff.form() == Form::Hypersparse {
        a_eff.to_mut().to_form(Form::Sparse)?;
    }
    let mut b_eff = exec::oriented_input(b, desc.transpose_b, Orientation::ByCol)?;
    if b_eff.form() == Form::Hypersparse {
        b_eff.to_mut().to_form(Form::Sparse)?;
    }

    let ztype = op.ztype().clone();
    let outer = a_cols as usize;
    let work = (a_eff.nvals_finished() + b_eff.nvals_finished()) as usize + outer;
    let ranges = split_ranges(outer, context::task_count(work, desc));

    let run = |range: std::ops::Range<usize>| -> Result<Segment, GblasError> {
        merge_range(&a_eff, &b_eff, op, &kind, &ztype, range)
    };
    let segments = if ranges.len() <= 1 {
        vec![run(0..outer)?]
    } else {
        ranges
            .into_par_iter()
            .map(run)
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut t = Matrix::new(&ztype, a_rows, a_cols)?;
    let mut ptr = Vec::with_capacity(outer + 1);
    ptr.push(0u64);
    let mut idx = Vec::new();
    let mut values = ValueStore::new(&ztype);
    for mut seg in segments {
        for count in seg.counts {
            ptr.push(ptr.last().unwrap() + count);
        }
        idx.append(&mut seg.idx);
        values.append(&mut seg.values);
    }
    t.load_sparse(ptr, idx, values, false, false);

    exec::apply_mask_accum(c, mask, accum, t, desc)
}

struct Segment {
    counts: Vec<u64>,
    idx: Vec<u64>,
    values: ValueStore,
}

fn merge_range(
    a: &Matrix,
    b: &Matrix,
    op: &BinaryOp,
    kind: &EwiseKind,
    ztype: &crate::types::ScalarType,
    range: std::ops::Range<usize>,
) -> Result<Segment, GblasError> {
    let a_read = a.sparse_read().expect("A normalized to sparse");
    let b_read = b.sparse_read().expect("B normalized to sparse");
    let positional = op.is_positional();
    let zcode = ztype.code();

    let mut seg = Segment {
        counts: Vec::with_capacity(range.len()),
        idx: Vec::new(),
        values: ValueStore::new(ztype),
    };

    for o in range {
        let before = seg.idx.len();
        let mut ap = a_read.ptr[o] as usize;
        let a_end = a_read.ptr[o + 1] as usize;
        let mut bp = b_read.ptr[o] as usize;
        let b_end = b_read.ptr[o + 1] as usize;

        while ap < a_end || bp < b_end {
            let ai = if ap < a_end { Some(a_read.idx[ap]) } else { None };
            let bi = if bp < b_end { Some(b_read.idx[bp]) } else { None };
            let i = match (ai, bi) {
                (Some(x), Some(y)) => x.min(y),
                (Some(x), None) => x,
                (None, Some(y)) => y,
                (None, None) => unreachable!(),
            };
            let in_a = ai == Some(i);
            let in_b = bi == Some(i);
            let (row, col) = (i, o as u64);

            let emit: Option<ScalarValue> = match (in_a, in_b, kind) {
                (true, true, _) => Some(if positional {
                    op.apply_positional(row, col, row, col)?
                } else {
                    op.apply(&a_read.value(ap), &b_read.value(bp))?
                }),
                (true, false, EwiseKind::Add) => {
                    Some(a_read.value(ap).cast_or_keep(zcode)?)
                }
                (false, true, EwiseKind::Add) => {
                    Some(b_read.value(bp).cast_or_keep(zcode)?)
                }
                (true, false, EwiseKind::Union { beta, .. }) => Some(if positional {
                    op.apply_positional(row, col, row, col)?
                } else {
                    op.apply(&a_read.value(ap), beta)?
                }),
                (false, true, EwiseKind::Union { alpha, .. }) => Some(if positional {
                    op.apply_positional(row, col, row, col)?
                } else {
                    op.apply(alpha, &b_read.value(bp))?
                }),
                (_, _, EwiseKind::Mult) => None,
                (false, false, _) => unreachable!(),
            };

            if let Some(v) = emit {
                seg.idx.push(i);
                seg.values.push(v.cast_or_keep(zcode)?);
            }
            if in_a {
                ap += 1;
            }
            if in_b {
                bp += 1;
            }
        }
        seg.counts.push((seg.idx.len() - before) as u64);
    }
    Ok(seg)
}

/// Vector form of [ewise_mult]
pub fn ewise_mult_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    u: &Vector,
    v: &Vector,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    ewise_mult(&mut w.m, mask.map(|m| &m.m), accum, op, &u.m, &v.m, desc)
}

/// Vector form of [ewise_add]
pub fn ewise_add_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    u: &Vector,
    v: &Vector,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    ewise_add(&mut w.m, mask.map(|m| &m.m), accum, op, &u.m, &v.m, desc)
}

/// Vector form of [ewise_union]
#[allow(clippy::too_many_arguments)]
pub fn ewise_union_vector(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    op: &BinaryOp,
    u: &Vector,
    alpha: &Scalar,
    v: &Vector,
    beta: &Scalar,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    ewise_union(
        &mut w.m,
        mask.map(|m| &m.m),
        accum,
        op,
        &u.m,
        alpha,
        &v.m,
        beta,
        desc,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::WaitMode;
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
    fn add_pattern_is_the_union() {
        let a = int_matrix(&[(0, 0, 1), (1, 1, 2)]);
        let b = int_matrix(&[(1, 1, 10), (2, 2, 20)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let plus = BinaryOp::plus(&ScalarType::int32());
        ewise_add(&mut c, None, None, &plus, &a, &b, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 3);
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(1))
        );
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(12))
        );
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int32(20))
        );
    }

    #[test]
    fn mult_pattern_is_the_intersection() {
        let a = int_matrix(&[(0, 0, 3), (1, 1, 2), (0, 2, 5)]);
        let b = int_matrix(&[(1, 1, 10), (2, 2, 20), (0, 2, 2)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let times = BinaryOp::times(&ScalarType::int32());
        ewise_mult(&mut c, None, None, &times, &a, &b, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 2);
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(20))
        );
        assert_eq!(
            c.extract_element(0, 2).unwrap(),
            Some(ScalarValue::Int32(10))
        );
        assert_eq!(c.extract_element(0, 0).unwrap(), None);
    }

    #[test]
    fn union_applies_defaults_on_lone_sides() {
        let a = int_matrix(&[(0, 0, 1)]);
        let b = int_matrix(&[(2, 2, 20)]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let minus = BinaryOp::minus(&ScalarType::int32());
        let alpha = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(100)).unwrap();
        let beta = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(7)).unwrap();
        ewise_union(
            &mut c,
            None,
            None,
            &minus,
            &a,
            &alpha,
            &b,
            &beta,
            &Descriptor::new(),
        )
        .unwrap();
        // lone a: minus(1, beta) ; lone b: minus(alpha, 20)
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(-6))
        );
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int32(80))
        );
    }

    #[test]
    fn union_requires_both_defaults() {
        let a = int_matrix(&[]);
        let b = int_matrix(&[]);
        let mut c = Matrix::new(&ScalarType::int32(), 3, 3).unwrap();
        let op = BinaryOp::plus(&ScalarType::int32());
        let alpha = Scalar::from_value(&ScalarType::int32(), ScalarValue::Int32(0)).unwrap();
        let empty = Scalar::new(&ScalarType::int32()).unwrap();
        assert_eq!(
            ewise_union(&mut c, None, None, &op, &a, &alpha, &b, &empty, &Descriptor::new())
                .unwrap_err(),
            GblasError::EmptyObject
        );
    }

    #[test]
    fn vector_wrappers_delegate() {
        let mut u = Vector::new(&ScalarType::int32(), 4).unwrap();
        let mut v = Vector::new(&ScalarType::int32(), 4).unwrap();
        u.set_element(0, ScalarValue::Int32(1)).unwrap();
        v.set_element(0, ScalarValue::Int32(2)).unwrap();
        v.set_element(3, ScalarValue::Int32(9)).unwrap();
        let mut w = Vector::new(&ScalarType::int32(), 4).unwrap();
        let plus = BinaryOp::plus(&ScalarType::int32());
        ewise_add_vector(&mut w, None, None, &plus, &u, &v, &Descriptor::new()).unwrap();
        assert_eq!(w.nvals().unwrap(), 2);
        assert_eq!(w.extract_element(0).unwrap(), Some(ScalarValue::Int32(3)));
    }
}
