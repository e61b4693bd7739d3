use super::gustavson::{contribution, ColSegment};
use crate::error::GblasError;
use crate::matrix::store::SparseRead;
use crate::ops::Semiring;
use crate::types::ScalarValue;

const EMPTY: u64 = u64::MAX;
/// Slots per expected output entry; power-of-two sizing keeps probing a
/// mask-and-add
const LOAD_FACTOR: u64 = 2;

/// Scatter one column of the product into an open-addressed table
///
/// Sized from the per-column flop estimate; the gathered output is left in
/// probe order, so the caller marks the result jumbled.
pub(crate) fn hash_column(
    a_read: &SparseRead,
    b_read: &SparseRead,
    v: usize,
    col: u64,
    semiring: &Semiring,
    iso_value: Option<&ScalarValue>,
    flops: u64,
    seg: &mut ColSegment,
) -> Result<(), GblasError> {
    let est = flops.max(1).min(a_read.idx.len() as u64 + 1);
    let cap = ((est * LOAD_FACTOR).max(4) as usize).next_power_of_two();
    let mask = cap as u64 - 1;
    let mut keys = vec![EMPTY; cap];
    let mut vals: Vec<ScalarValue> = Vec::new();
    if iso_value.is_none() {
        vals = vec![semiring.identity().clone(); cap];
    }
    let mut occupied: Vec<usize> = Vec::new();

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
            let mut slot = (i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) & mask;
            loop {
                if keys[slot as usize] == EMPTY {
                    keys[slot as usize] = i;
                    occupied.push(slot as usize);
                    if iso_value.is_none() {
                        vals[slot as usize] =
                            contribution(a_read, q, i, k, col, mult, &bv, positional)?;
                    }
                    break;
                }
                if keys[slot as usize] == i {
                    if iso_value.is_none() && !add.is_terminal(&vals[slot as usize]) {
                        let prod = contribution(a_read, q, i, k, col, mult, &bv, positional)?;
                        vals[slot as usize] = add.fold(&vals[slot as usize], &prod)?;
                    }
                    break;
                }
                slot = (slot + 1) & mask;
            }
        }
    }

    for &slot in &occupied {
        seg.idx.push(keys[slot]);
        if iso_value.is_none() {
            seg.values
                .push(vals[slot].cast_or_keep(semiring.semiring_type().code())?);
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
    fn hash_kernel_matches_gustavson_on_a_wide_product() {
        let ty = ScalarType::fp64();
        let sr = Semiring::plus_times(&ty).unwrap();
        let n = 50;
        let mut a = Matrix::new(&ty, n, n).unwrap();
        let mut b = Matrix::new(&ty, n, n).unwrap();
        for i in 0..n {
            a.set_element(i, (i * 7 + 3) % n, ScalarValue::Fp64(i as f64 + 1.0))
                .unwrap();
            a.set_element(i, (i * 13 + 1) % n, ScalarValue::Fp64(2.0)).unwrap();
            b.set_element((i * 5) % n, i, ScalarValue::Fp64(1.5)).unwrap();
            b.set_element((i * 11 + 2) % n, i, ScalarValue::Fp64(-1.0))
                .unwrap();
        }
        a.wait(WaitMode::Materialize).unwrap();
        b.wait(WaitMode::Materialize).unwrap();

        let mut c_hash = Matrix::new(&ty, n, n).unwrap();
        mxm(
            &mut c_hash,
            None,
            None,
            &sr,
            &a,
            &b,
            &Descriptor::new().with_mxm_method(MxmMethod::Hash),
        )
        .unwrap();
        let mut c_gus = Matrix::new(&ty, n, n).unwrap();
        mxm(
            &mut c_gus,
            None,
            None,
            &sr,
            &a,
            &b,
            &Descriptor::new().with_mxm_method(MxmMethod::Gustavson),
        )
        .unwrap();
        assert!(c_hash.eq_matrix(&mut c_gus).unwrap());
    }
}
