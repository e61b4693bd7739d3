use super::gustavson::{assemble, ColSegment};
use crate::context;
use crate::descriptor::Descriptor;
use crate::error::GblasError;
use crate::exec::{self, split_ranges};
use crate::matrix::store::SparseRead;
use crate::matrix::{Matrix, Orientation};
use crate::ops::Semiring;
use crate::types::{ScalarValue, ValueStore};
use rayon::prelude::*;

/// `C(i,j) = Σ A(i,:) ⊗ B(:,j)` by merging two sorted sparse vectors
///
/// A arrives row-oriented and B column-oriented. A present, non-complemented
/// mask pins the candidate set; otherwise every output cell is probed, which
/// the selector only allows for tiny outputs.
pub(crate) fn multiply(
    a: &Matrix,
    b: &Matrix,
    mask: Option<&Matrix>,
    semiring: &Semiring,
    desc: &Descriptor,
    iso_value: Option<ScalarValue>,
) -> Result<Matrix, GblasError> {
    let a_read = a.sparse_read().expect("A normalized to a sparse view");
    let b_read = b.sparse_read().expect("B normalized to a sparse view");
    let c_nrows = a.nrows();
    let c_ncols = b.ncols();

    let mask_n = match mask {
        Some(m) if !desc.mask.complement => Some(exec::sparse_mask(m, Orientation::ByCol)?),
        _ => None,
    };

    let ntasks = context::task_count(
        (c_ncols as usize).max(mask_n.as_ref().map_or(0, |m| m.nvals_finished() as usize)),
        desc,
    );
    let ranges = split_ranges(c_ncols as usize, ntasks);

    let run = |range: std::ops::Range<usize>| -> Result<ColSegment, GblasError> {
        let mut seg = ColSegment {
            cols: Vec::with_capacity(range.len()),
            idx: Vec::new(),
            values: ValueStore::new(semiring.semiring_type()),
            jumbled: false,
        };
        for j in range {
            let before = seg.idx.len();
            match &mask_n {
                Some(m) => {
                    let m_read = m.sparse_read().expect("mask normalized to sparse");
                    for p in m_read.range(j) {
                        // a valued mask admits only truthy entries
                        if !desc.mask.structural && !m_read.value(p).truthy() {
                            continue;
                        }
                        let i = m_read.idx[p];
                        dot_entry(
                            &a_read,
                            &b_read,
                            i,
                            j as u64,
                            semiring,
                            iso_value.as_ref(),
                            &mut seg,
                        )?;
                    }
                }
                None => {
                    for i in 0..c_nrows {
                        dot_entry(
                            &a_read,
                            &b_read,
                            i,
                            j as u64,
                            semiring,
                            iso_value.as_ref(),
                            &mut seg,
                        )?;
                    }
                }
            }
            seg.cols.push((j as u64, (seg.idx.len() - before) as u64));
        }
        Ok(seg)
    };

    let segments = if ranges.len() <= 1 {
        vec![run(0..c_ncols as usize)?]
    } else {
        ranges
            .into_par_iter()
            .map(run)
            .collect::<Result<Vec<_>, _>>()?
    };
    assemble(semiring, c_nrows, c_ncols, segments, iso_value)
}

/// Merge A(i,:) against B(:,j); emits nothing when the patterns do not
/// intersect
fn dot_entry(
    a_read: &SparseRead,
    b_read: &SparseRead,
    i: u64,
    j: u64,
    semiring: &Semiring,
    iso_value: Option<&ScalarValue>,
    seg: &mut ColSegment,
) -> Result<(), GblasError> {
    let av = match a_read.find_outer(i) {
        Some(v) => v,
        None => return Ok(()),
    };
    let bv = match b_read.find_outer(j) {
        Some(v) => v,
        None => return Ok(()),
    };
    let add = semiring.add();
    let mult = semiring.mult();
    let positional = mult.is_positional();

    let mut ap = a_read.ptr[av] as usize;
    let a_end = a_read.ptr[av + 1] as usize;
    let mut bp = b_read.ptr[bv] as usize;
    let b_end = b_read.ptr[bv + 1] as usize;
    let mut acc: Option<ScalarValue> = None;

    while ap < a_end && bp < b_end {
        let ak = a_read.idx[ap];
        let bk = b_read.idx[bp];
        if ak < bk {
            ap += 1;
        } else if bk < ak {
            bp += 1;
        } else {
            if iso_value.is_some() {
                // pattern-only: one intersection proves the entry exists
                acc = Some(iso_value.unwrap().clone());
                break;
            }
            let prod = if positional {
                mult.apply_positional(i, ak, ak, j)?
            } else {
                mult.apply(&a_read.value(ap), &b_read.value(bp))?
            };
            acc = Some(match acc {
                Some(prev) => add.fold(&prev, &prod)?,
                None => prod,
            });
            if add.is_terminal(acc.as_ref().unwrap()) {
                break;
            }
            ap += 1;
            bp += 1;
        }
    }

    if let Some(v) = acc {
        seg.idx.push(i);
        if iso_value.is_none() {
            seg.values
                .push(v.cast_or_keep(semiring.semiring_type().code())?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Descriptor, MxmMethod};
    use crate::matrix::{Matrix, WaitMode};
    use crate::mxm::mxm;
    use crate::ops::Semiring;
    use crate::types::{ScalarType, ScalarValue};

    #[test]
    fn masked_dot_computes_only_the_mask_pattern() {
        let ty = ScalarType::fp64();
        let sr = Semiring::plus_times(&ty).unwrap();
        let mut a = Matrix::new(&ty, 3, 3).unwrap();
        let mut b = Matrix::new(&ty, 3, 3).unwrap();
        for k in 0..3 {
            for l in 0..3 {
                a.set_element(k, l, ScalarValue::Fp64((k + l) as f64 + 1.0))
                    .unwrap();
                b.set_element(k, l, ScalarValue::Fp64((k * l) as f64 + 1.0))
                    .unwrap();
            }
        }
        a.wait(WaitMode::Materialize).unwrap();
        b.wait(WaitMode::Materialize).unwrap();
        let mut mask = Matrix::new(&ScalarType::bool_type(), 3, 3).unwrap();
        mask.set_element(0, 2, ScalarValue::Bool(true)).unwrap();
        mask.wait(WaitMode::Materialize).unwrap();

        let mut c = Matrix::new(&ty, 3, 3).unwrap();
        mxm(
            &mut c,
            Some(&mask),
            None,
            &sr,
            &a,
            &b,
            &Descriptor::new().with_mxm_method(MxmMethod::Dot),
        )
        .unwrap();
        assert_eq!(c.nvals().unwrap(), 1);
        // row 0 of a = [1,2,3]; col 2 of b = [1,3,5]; dot = 1+6+15
        assert_eq!(
            c.extract_element(0, 2).unwrap(),
            Some(ScalarValue::Fp64(22.0))
        );
    }
}
