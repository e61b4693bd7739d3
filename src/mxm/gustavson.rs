use crate::context;
use crate::descriptor::{Descriptor, MxmMethod};
use crate::error::GblasError;
use crate::exec::split_ranges;
use crate::matrix::store::SparseRead;
use crate::matrix::Matrix;
use crate::ops::Semiring;
use crate::types::{ScalarValue, ValueStore};
use rayon::prelude::*;

/// One task's share of the product, in ascending column order
pub(crate) struct ColSegment {
    /// (column id, entries emitted for it)
    pub cols: Vec<(u64, u64)>,
    pub idx: Vec<u64>,
    pub values: ValueStore,
    pub jumbled: bool,
}

/// Assemble per-task segments into a ByCol sparse product matrix
pub(crate) fn assemble(
    semiring: &Semiring,
    nrows: u64,
    ncols: u64,
    segments: Vec<ColSegment>,
    iso_value: Option<ScalarValue>,
) -> Result<Matrix, GblasError> {
    let ty = semiring.semiring_type();
    let mut t = Matrix::new(ty, nrows, ncols)?;
    let mut ptr = vec![0u64; ncols as usize + 1];
    for seg in &segments {
        for &(col, count) in &seg.cols {
            ptr[col as usize + 1] = count;
        }
    }
    for o in 0..ncols as usize {
        ptr[o + 1] += ptr[o];
    }
    let nvals_total = *ptr.last().unwrap() as usize;
    let mut idx = Vec::with_capacity(nvals_total);
    let jumbled = segments.iter().any(|s| s.jumbled);
    let iso = iso_value.is_some() && nvals_total > 0;
    let mut values = match iso_value {
        Some(v) if iso => {
            let mut store = ValueStore::new(ty);
            store.push(v);
            store
        }
        _ => ValueStore::with_capacity(ty, nvals_total),
    };
    for mut seg in segments {
        idx.append(&mut seg.idx);
        if !iso {
            values.append(&mut seg.values);
        }
    }
    t.load_sparse(ptr, idx, values, iso, jumbled);
    Ok(t)
}

/// The saxpy driver: walks the columns of B, scattering each into a
/// workspace; the flavor (dense Gustavson workspace vs hash table) is chosen
/// per task unless the descriptor pinned one
pub(crate) fn saxpy_multiply(
    a: &Matrix,
    b: &Matrix,
    semiring: &Semiring,
    desc: &Descriptor,
    method: MxmMethod,
    iso_value: Option<ScalarValue>,
) -> Result<Matrix, GblasError> {
    let a_read = a.sparse_read().expect("A normalized to a sparse view");
    let b_read = b.sparse_read().expect("B normalized to a sparse view");
    let c_nrows = a.nrows();

    let flops: u64 = (0..b_read.nvec())
        .map(|v| {
            b_read.range(v)
                .map(|p| vector_len(&a_read, b_read.idx[p]))
                .sum::<u64>()
        })
        .sum();
    let ntasks = context::task_count(flops as usize + b_read.nvec(), desc);
    let ranges = split_ranges(b_read.nvec(), ntasks);

    let run = |range: std::ops::Range<usize>| -> Result<ColSegment, GblasError> {
        task_multiply(
            &a_read,
            &b_read,
            c_nrows,
            semiring,
            method,
            iso_value.as_ref(),
            range,
        )
    };
    let segments = if ranges.len() <= 1 {
        vec![run(0..b_read.nvec())?]
    } else {
        ranges
            .into_par_iter()
            .map(run)
            .collect::<Result<Vec<_>, _>>()?
    };
    assemble(semiring, c_nrows, b.ncols(), segments, iso_value)
}

fn vector_len(read: &SparseRead, j: u64) -> u64 {
    match read.find_outer(j) {
        Some(v) => (read.ptr[v + 1] - read.ptr[v]) as u64,
        None => 0,
    }
}

fn task_multiply(
    a_read: &SparseRead,
    b_read: &SparseRead,
    c_nrows: u64,
    semiring: &Semiring,
    method: MxmMethod,
    iso_value: Option<&ScalarValue>,
    range: std::ops::Range<usize>,
) -> Result<ColSegment, GblasError> {
    let mut seg = ColSegment {
        cols: Vec::with_capacity(range.len()),
        idx: Vec::new(),
        values: ValueStore::new(semiring.semiring_type()),
        jumbled: false,
    };
    let mut workspace: Option<Workspace> = None;

    for v in range {
        let col = b_read.outer_id(v);
        let before = seg.idx.len();
        let flops: u64 = b_read
            .range(v)
            .map(|p| vector_len(a_read, b_read.idx[p]))
            .sum();
        let use_hash = match method {
            MxmMethod::Gustavson => false,
            MxmMethod::Hash => true,
            // a dense workspace pays off when the output dimension is small
            // relative to the work done per column
            _ => c_nrows > flops.max(256) * super::GUSTAVSON_WORKSPACE_RATIO,
        };
        if use_hash {
            super::hash::hash_column(a_read, b_read, v, col, semiring, iso_value, flops, &mut seg)?;
            seg.jumbled = true;
        } else {
            let ws = workspace
                .get_or_insert_with(|| Workspace::new(c_nrows as usize, semiring));
            gather_column(a_read, b_read, v, col, semiring, iso_value, ws, &mut seg)?;
        }
        seg.cols.push((col, (seg.idx.len() - before) as u64));
    }
    Ok(seg)
}

/// Dense scatter workspace in the Gustavson style: a stamp array tracks
/// which slots belong to the current column, so nothing is cleared between
/// columns
struct Workspace {
    mark: Vec<u64>,
    work: Vec<ScalarValue>,
    touched: Vec<u64>,
    stamp: u64,
}

impl Workspace {
    fn new(n: usize, semiring: &Semiring) -> Workspace {
        Workspace {
            mark: vec![0; n],
            work: vec![semiring.identity().clone(); n],
            touched: Vec::new(),
            stamp: 0,
        }
    }
}

fn gather_column(
    a_read: &SparseRead,
    b_read: &SparseRead,
    v: usize,
    col: u64,
    semiring: &Semiring,
    iso_value: Option<&ScalarValue>,
    ws: &mut Workspace,
    seg: &mut ColSegment,
) -> Result<(), GblasError> {
    ws.stamp += 1;
    ws.touched.clear();
    let add = semiring.add();
    let mult = semiring.mult();
    let positional = mult.is_positional();

    for p in b_read.range(v) {
        let k = b_read.idx[p];
        let av = match a_read.find_outer(k) {
            Some(ak) => ak,
            None => continue,
        };
        let bv = if positional || iso_value.is_some() {
            None
        } else {
            Some(b_read.value(p))
        };
        for q in a_read.range(av) {
            let i = a_read.idx[q];
            let slot = i as usize;
            if ws.mark[slot] != ws.stamp {
                ws.mark[slot] = ws.stamp;
                ws.touched.push(i);
                if iso_value.is_none() {
                    ws.work[slot] = contribution(a_read, q, i, k, col, mult, &bv, positional)?;
                }
            } else if iso_value.is_none() {
                if add.is_terminal(&ws.work[slot]) {
                    continue;
                }
                let prod = contribution(a_read, q, i, k, col, mult, &bv, positional)?;
                ws.work[slot] = add.fold(&ws.work[slot], &prod)?;
            }
        }
    }

    ws.touched.sort_unstable();
    for &i in &ws.touched {
        seg.idx.push(i);
        if iso_value.is_none() {
            seg.values.push(
                ws.work[i as usize]
                    .cast_or_keep(semiring.semiring_type().code())?,
            );
        }
    }
    Ok(())
}

/// One multiplier application `a(i,k) ⊗ b(k,j)`
pub(super) fn contribution(
    a_read: &SparseRead,
    q: usize,
    i: u64,
    k: u64,
    col: u64,
    mult: &crate::ops::BinaryOp,
    bv: &Option<ScalarValue>,
    positional: bool,
) -> Result<ScalarValue, GblasError> {
    if positional {
        mult.apply_positional(i, k, k, col)
    } else {
        let av = a_read.value(q);
        mult.apply(&av, bv.as_ref().expect("value path carries b"))
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Descriptor, MxmMethod};
    use crate::matrix::{Matrix, WaitMode};
    use crate::mxm::mxm;
    use crate::ops::{BinaryOp, Monoid, Semiring};
    use crate::types::{ScalarType, ScalarValue};

    #[test]
    fn positional_multiplier_never_reads_values() {
        // secondi over int64: c(i,j) folds the k index of each b entry
        let ty = ScalarType::int64();
        let sr = Semiring::new(
            &Monoid::min(&ty).unwrap(),
            &BinaryOp::secondi(&ty).unwrap(),
        )
        .unwrap();
        let mut a = Matrix::new(&ty, 2, 3).unwrap();
        a.set_element(0, 1, ScalarValue::Int64(999)).unwrap();
        a.set_element(0, 2, ScalarValue::Int64(999)).unwrap();
        a.wait(WaitMode::Materialize).unwrap();
        let mut b = Matrix::new(&ty, 3, 1).unwrap();
        b.set_element(1, 0, ScalarValue::Int64(999)).unwrap();
        b.set_element(2, 0, ScalarValue::Int64(999)).unwrap();
        b.wait(WaitMode::Materialize).unwrap();
        let mut c = Matrix::new(&ty, 2, 1).unwrap();
        mxm(
            &mut c,
            None,
            None,
            &sr,
            &a,
            &b,
            &Descriptor::new().with_mxm_method(MxmMethod::Gustavson),
        )
        .unwrap();
        // contributions at k=1 and k=2; min picks 1
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int64(1))
        );
    }

    #[test]
    fn terminal_stops_the_fold_without_changing_the_result() {
        let ty = ScalarType::bool_type();
        let sr = Semiring::lor_land();
        let mut a = Matrix::new(&ty, 1, 3).unwrap();
        for k in 0..3 {
            a.set_element(0, k, ScalarValue::Bool(true)).unwrap();
        }
        a.wait(WaitMode::Materialize).unwrap();
        let mut b = Matrix::new(&ty, 3, 1).unwrap();
        for k in 0..3 {
            b.set_element(k, 0, ScalarValue::Bool(true)).unwrap();
        }
        b.wait(WaitMode::Materialize).unwrap();
        let mut c = Matrix::new(&ty, 1, 1).unwrap();
        mxm(
            &mut c,
            None,
            None,
            &sr,
            &a,
            &b,
            &Descriptor::new().with_mxm_method(MxmMethod::Gustavson),
        )
        .unwrap();
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Bool(true))
        );
    }
}
