use crate::context;
use crate::descriptor::{Descriptor, MaskMode};
use crate::error::GblasError;
use crate::matrix::{Form, Matrix, Orientation};
use crate::ops::BinaryOp;
use crate::types::{ScalarValue, ValueStore};
use rayon::prelude::*;
use std::borrow::Cow;

/// The universal update `C⟨M,z,r⟩ ← C ⊕ T`
///
/// Every algebraic operation produces a raw result `T` and hands it here;
/// this is the single point where mask, accumulator, and replace semantics
/// are interpreted.
pub(crate) fn apply_mask_accum(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    t: Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    if t.nrows() != c.nrows() || t.ncols() != c.ncols() {
        return Err(GblasError::DimensionMismatch(format!(
            "result is {}x{}, output is {}x{}",
            t.nrows(),
            t.ncols(),
            c.nrows(),
            c.ncols()
        )));
    }
    if let Some(m) = mask {
        if m.nrows() != c.nrows() || m.ncols() != c.ncols() {
            return Err(GblasError::DimensionMismatch(format!(
                "mask is {}x{}, output is {}x{}",
                m.nrows(),
                m.ncols(),
                c.nrows(),
                c.ncols()
            )));
        }
    }

    let orientation = c.orientation();
    c.finish()?;
    c.to_form(Form::Sparse)?;

    let mut t = t;
    t.finish()?;
    t.reorient(orientation)?;
    t.to_form(Form::Sparse)?;

    let mask_n = match mask {
        Some(m) => Some(sparse_mask(m, orientation)?),
        None => None,
    };

    let outer = c.outer_dim() as usize;
    let work = (c.nvals_finished() + t.nvals_finished()) as usize + outer;
    let ntasks = context::task_count(work, desc);

    let c_read: &Matrix = c;
    let segments: Vec<Segment> = if ntasks <= 1 {
        vec![merge_range(c_read, &t, mask_n.as_deref(), accum, desc, 0..outer)?]
    } else {
        let bounds = split_ranges(outer, ntasks);
        bounds
            .into_par_iter()
            .map(|range| merge_range(c_read, &t, mask_n.as_deref(), accum, desc, range))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut ptr = Vec::with_capacity(outer + 1);
    ptr.push(0u64);
    let mut idx = Vec::new();
    let mut values = ValueStore::new(c.mat_type());
    for mut seg in segments {
        for count in seg.counts {
            ptr.push(ptr.last().unwrap() + count);
        }
        idx.append(&mut seg.idx);
        values.append(&mut seg.values);
    }
    c.load_sparse(ptr, idx, values, false, false);
    c.conform()?;
    if crate::context::mode() == crate::context::Mode::Blocking {
        c.wait(crate::matrix::WaitMode::Materialize)?;
    }
    Ok(())
}

pub(crate) fn split_ranges(outer: usize, ntasks: usize) -> Vec<std::ops::Range<usize>> {
    let ntasks = ntasks.min(outer.max(1));
    let per = outer / ntasks;
    let extra = outer % ntasks;
    let mut ranges = Vec::with_capacity(ntasks);
    let mut start = 0;
    for task in 0..ntasks {
        let len = per + usize::from(task < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

struct Segment {
    counts: Vec<u64>,
    idx: Vec<u64>,
    values: ValueStore,
}

fn merge_range(
    c: &Matrix,
    t: &Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    desc: &Descriptor,
    range: std::ops::Range<usize>,
) -> Result<Segment, GblasError> {
    let c_read = c.sparse_read().expect("output normalized to sparse");
    let t_read = t.sparse_read().expect("result normalized to sparse");
    let m_read = mask.map(|m| (m, m.sparse_read().expect("mask normalized to sparse")));
    let ctype = c.mat_type().code();

    let mut counts = Vec::with_capacity(range.len());
    let mut idx = Vec::new();
    let mut values = ValueStore::new(c.mat_type());

    for o in range {
        let before = idx.len();
        let mut cp = c_read.ptr[o] as usize;
        let c_end = c_read.ptr[o + 1] as usize;
        let mut tp = t_read.ptr[o] as usize;
        let t_end = t_read.ptr[o + 1] as usize;

        let mut mask_cursor = m_read.as_ref().map(|(m, read)| MaskCursor {
            read: *read,
            iso: m.is_iso(),
            pos: read.ptr[o] as usize,
            end: read.ptr[o + 1] as usize,
            mode: desc.mask,
        });

        while cp < c_end || tp < t_end {
            let ci = if cp < c_end { Some(c_read.idx[cp]) } else { None };
            let ti = if tp < t_end { Some(t_read.idx[tp]) } else { None };
            let i = match (ci, ti) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => unreachable!(),
            };
            let in_c = ci == Some(i);
            let in_t = ti == Some(i);
            let allowed = match &mut mask_cursor {
                Some(cursor) => cursor.allows(i),
                None => true,
            };

            let keep: Option<ScalarValue> = match (in_c, in_t) {
                (true, true) => {
                    if allowed {
                        let tv = t_read.value(tp);
                        Some(match accum {
                            Some(op) => {
                                op.apply(&c_read.value(cp), &tv)?.cast_or_keep(ctype)?
                            }
                            None => tv.cast_or_keep(ctype)?,
                        })
                    } else if desc.replace {
                        None
                    } else {
                        Some(c_read.value(cp))
                    }
                }
                (false, true) => {
                    if allowed {
                        Some(t_read.value(tp).cast_or_keep(ctype)?)
                    } else {
                        None
                    }
                }
                (true, false) => {
                    if allowed {
                        // without an accumulator T replaces C here: absence
                        // of a T entry clears the position
                        if accum.is_some() {
                            Some(c_read.value(cp))
                        } else {
                            None
                        }
                    } else if desc.replace {
                        None
                    } else {
                        Some(c_read.value(cp))
                    }
                }
                (false, false) => unreachable!(),
            };

            if let Some(v) = keep {
                idx.push(i);
                values.push(v);
            }
            if in_c {
                cp += 1;
            }
            if in_t {
                tp += 1;
            }
        }
        counts.push((idx.len() - before) as u64);
    }
    Ok(Segment {
        counts,
        idx,
        values,
    })
}

/// Monotone cursor over one mask vector
struct MaskCursor<'a> {
    read: crate::matrix::store::SparseRead<'a>,
    iso: bool,
    pos: usize,
    end: usize,
    mode: MaskMode,
}

impl<'a> MaskCursor<'a> {
    /// Whether the mask admits inner position `i`
    ///
    /// Structural masks use presence only; valued masks need a truthy entry;
    /// a missing entry under a valued mask behaves as false. Complement
    /// inverts the answer.
    fn allows(&mut self, i: u64) -> bool {
        while self.pos < self.end && self.read.idx[self.pos] < i {
            self.pos += 1;
        }
        let present = self.pos < self.end && self.read.idx[self.pos] == i;
        let base = if self.mode.structural {
            present
        } else {
            present
                && if self.iso {
                    self.read.values.get(0).truthy()
                } else {
                    self.read.values.get(self.pos).truthy()
                }
        };
        base != self.mode.complement
    }
}

/// Shared shape handling for the logical transposes of two-input operations
///
/// Borrows the input untouched when it is already drained and laid out
/// right; otherwise a converted copy is made. Kernels read hypersparse and
/// sparse through one view; only the dense forms need rewriting.
pub(crate) fn oriented_input<'a>(
    m: &'a Matrix,
    transpose: bool,
    target: Orientation,
) -> Result<Cow<'a, Matrix>, GblasError> {
    if !transpose
        && m.orientation() == target
        && !m.has_deferred_work()
        && m.sparse_read().is_some()
    {
        return Ok(Cow::Borrowed(m));
    }
    let mut out = if transpose { m.transposed() } else { m.dup() };
    out.finish()?;
    out.reorient(target)?;
    if matches!(out.form(), Form::Bitmap | Form::Full) {
        out.to_form(Form::Sparse)?;
    }
    Ok(Cow::Owned(out))
}

/// A mask normalized to a plain sparse store in the given orientation
pub(crate) fn sparse_mask<'a>(
    m: &'a Matrix,
    orientation: Orientation,
) -> Result<Cow<'a, Matrix>, GblasError> {
    if m.orientation() == orientation && !m.has_deferred_work() && m.form() == Form::Sparse {
        return Ok(Cow::Borrowed(m));
    }
    let mut n = m.dup();
    n.finish()?;
    n.reorient(orientation)?;
    n.to_form(Form::Sparse)?;
    Ok(Cow::Owned(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::WaitMode;
    use crate::types::ScalarType;

    fn int_matrix(nrows: u64, ncols: u64, entries: &[(u64, u64, i32)]) -> Matrix {
        let mut m = Matrix::new(&ScalarType::int32(), nrows, ncols).unwrap();
        for &(r, c, v) in entries {
            m.set_element(r, c, ScalarValue::Int32(v)).unwrap();
        }
        m.wait(WaitMode::Materialize).unwrap();
        m
    }

    #[test]
    fn no_mask_no_accum_replaces_the_pattern() {
        let mut c = int_matrix(3, 3, &[(0, 0, 1), (1, 1, 2)]);
        let t = int_matrix(3, 3, &[(2, 2, 30)]);
        apply_mask_accum(&mut c, None, None, t, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 1);
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int32(30))
        );
        assert_eq!(c.extract_element(0, 0).unwrap(), None);
    }

    #[test]
    fn accumulator_unions_old_and_new() {
        let mut c = int_matrix(3, 3, &[(0, 0, 1), (1, 1, 2)]);
        let t = int_matrix(3, 3, &[(0, 0, 10), (2, 2, 30)]);
        let plus = BinaryOp::plus(&ScalarType::int32());
        apply_mask_accum(&mut c, None, Some(&plus), t, &Descriptor::new()).unwrap();
        assert_eq!(c.nvals().unwrap(), 3);
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(11))
        );
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(2))
        );
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int32(30))
        );
    }

    #[test]
    fn mask_with_replace_and_accum() {
        // the S6 scenario: plus accumulation under a mask, replace set
        let mut c = int_matrix(3, 3, &[(0, 0, 1), (1, 1, 2)]);
        let t = int_matrix(3, 3, &[(0, 0, 10), (2, 2, 30)]);
        let mask = {
            let mut m = Matrix::new(&ScalarType::bool_type(), 3, 3).unwrap();
            m.set_element(0, 0, ScalarValue::Bool(true)).unwrap();
            m.set_element(2, 2, ScalarValue::Bool(true)).unwrap();
            m.wait(WaitMode::Materialize).unwrap();
            m
        };
        let plus = BinaryOp::plus(&ScalarType::int32());
        let desc = Descriptor::new().with_replace();
        apply_mask_accum(&mut c, Some(&mask), Some(&plus), t, &desc).unwrap();
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(11))
        );
        assert_eq!(
            c.extract_element(2, 2).unwrap(),
            Some(ScalarValue::Int32(30))
        );
        // cleared by replace: the mask misses (1,1)
        assert_eq!(c.extract_element(1, 1).unwrap(), None);
        assert_eq!(c.nvals().unwrap(), 2);
    }

    #[test]
    fn complemented_structural_mask_touches_only_holes() {
        let mut c = int_matrix(2, 2, &[(0, 0, 5)]);
        let t = int_matrix(2, 2, &[(0, 0, 7), (1, 1, 9)]);
        let mask = int_matrix(2, 2, &[(0, 0, 0)]); // value irrelevant
        let desc = Descriptor::new()
            .with_structural_mask()
            .with_complement_mask();
        apply_mask_accum(&mut c, Some(&mask), None, t, &desc).unwrap();
        // (0,0) is mask-excluded: C keeps its old entry
        assert_eq!(
            c.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(5))
        );
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(9))
        );
    }

    #[test]
    fn valued_mask_ignores_falsy_entries() {
        let mut c = int_matrix(2, 2, &[]);
        let t = int_matrix(2, 2, &[(0, 0, 1), (1, 1, 2)]);
        let mask = int_matrix(2, 2, &[(0, 0, 0), (1, 1, 3)]);
        apply_mask_accum(&mut c, Some(&mask), None, t, &Descriptor::new()).unwrap();
        assert_eq!(c.extract_element(0, 0).unwrap(), None);
        assert_eq!(
            c.extract_element(1, 1).unwrap(),
            Some(ScalarValue::Int32(2))
        );
    }
}
