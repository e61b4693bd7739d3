/// Dot-product kernel: one sparse merge per output entry
pub mod dot;
/// Saxpy kernel with a dense stamp-marked workspace
pub mod gustavson;
/// Saxpy kernel with an open-addressed hash workspace
pub mod hash;

use crate::descriptor::{Descriptor, MxmMethod};
use crate::error::{record, GblasError};
use crate::exec;
use crate::matrix::{Matrix, Orientation};
use crate::ops::{BinaryOp, BuiltinBinary, Semiring};
use crate::types::ScalarValue;
use crate::vector::Vector;
use log::debug;

/// Workspace size per unit of flops below which Gustavson beats the hash
/// kernel
const GUSTAVSON_WORKSPACE_RATIO: u64 = 4;
/// Output cell count under which the dot kernel is always reasonable
const TINY_OUTPUT_CELLS: u64 = 4096;

/// `C⟨M⟩ ⊕= A ⊗ B` over a semiring, with optional logical transposition of
/// either input
pub fn mxm(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    semiring: &Semiring,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    record(mxm_inner(c, mask, accum, semiring, a, b, desc))
}

fn mxm_inner(
    c: &mut Matrix,
    mask: Option<&Matrix>,
    accum: Option<&BinaryOp>,
    semiring: &Semiring,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
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
    if a_cols != b_rows {
        return Err(GblasError::DimensionMismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            a_rows, a_cols, b_rows, b_cols
        )));
    }
    if c.nrows() != a_rows || c.ncols() != b_cols {
        return Err(GblasError::DimensionMismatch(format!(
            "product is {}x{}, output is {}x{}",
            a_rows, b_cols,
            c.nrows(),
            c.ncols()
        )));
    }

    let method = select_method(c, mask, a, b, desc);
    debug!("mxm method: {:?}", method);

    let iso_value = iso_product(semiring, a, b)?;

    let t = match method {
        MxmMethod::Dot => {
            let a_eff = exec::oriented_input(a, desc.transpose_a, Orientation::ByRow)?;
            let b_eff = exec::oriented_input(b, desc.transpose_b, Orientation::ByCol)?;
            dot::multiply(&a_eff, &b_eff, mask, semiring, desc, iso_value)?
        }
        MxmMethod::Gustavson | MxmMethod::Hash | MxmMethod::Saxpy => {
            let a_eff = exec::oriented_input(a, desc.transpose_a, Orientation::ByCol)?;
            let b_eff = exec::oriented_input(b, desc.transpose_b, Orientation::ByCol)?;
            saxpy(&a_eff, &b_eff, semiring, desc, method, iso_value)?
        }
        MxmMethod::Default => unreachable!("selector always picks a method"),
    };

    exec::apply_mask_accum(c, mask, accum, t, desc)
}

/// `w⟨m⟩ ⊕= A ⊗ u`
pub fn mxv(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    semiring: &Semiring,
    a: &Matrix,
    u: &Vector,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let mut d = desc.clone();
    d.transpose_b = false;
    mxm(
        &mut w.m,
        mask.map(|m| &m.m),
        accum,
        semiring,
        a,
        &u.m,
        &d,
    )
}

/// `w'⟨m'⟩ ⊕= u' ⊗ A`, computed as `A' ⊗ u` with the multiplier flipped
pub fn vxm(
    w: &mut Vector,
    mask: Option<&Vector>,
    accum: Option<&BinaryOp>,
    semiring: &Semiring,
    u: &Vector,
    a: &Matrix,
    desc: &Descriptor,
) -> Result<(), GblasError> {
    let flipped = semiring.with_flipped_mult()?;
    let mut d = desc.clone();
    // the matrix is the second input of vxm; its transpose request folds
    // into the A' of the reformulation
    d.transpose_a = !desc.transpose_b;
    d.transpose_b = false;
    mxm(
        &mut w.m,
        mask.map(|m| &m.m),
        accum,
        &flipped,
        a,
        &u.m,
        &d,
    )
}

/// The whole-operation algorithm choice; the saxpy flavor is refined per
/// task inside the kernel
fn select_method(
    c: &Matrix,
    mask: Option<&Matrix>,
    a: &Matrix,
    b: &Matrix,
    desc: &Descriptor,
) -> MxmMethod {
    if desc.mxm_method != MxmMethod::Default {
        return desc.mxm_method;
    }
    let cells = c.nrows().saturating_mul(c.ncols());
    if cells <= TINY_OUTPUT_CELLS {
        return MxmMethod::Dot;
    }
    if let Some(m) = mask {
        // a sparse, non-complemented mask pins the output pattern; dotting
        // into it beats computing the whole product
        if !desc.mask.complement {
            let mask_nvals = match m.sparse_read() {
                Some(read) => read.idx.len() as u64,
                None => cells,
            };
            if mask_nvals.saturating_mul(16) < cells {
                return MxmMethod::Dot;
            }
        }
    }
    let a_eff_rowwise = (a.orientation() == Orientation::ByRow) != desc.transpose_a;
    let b_eff_colwise = (b.orientation() == Orientation::ByCol) != desc.transpose_b;
    if a_eff_rowwise && b_eff_colwise && cells <= TINY_OUTPUT_CELLS * 64 {
        return MxmMethod::Dot;
    }
    MxmMethod::Saxpy
}

/// The iso fast path: both inputs iso under an idempotent monoid makes the
/// product iso with value `a ⊗ b`; only the pattern is computed
fn iso_product(
    semiring: &Semiring,
    a: &Matrix,
    b: &Matrix,
) -> Result<Option<ScalarValue>, GblasError> {
    if semiring.mult().is_positional() {
        return Ok(None);
    }
    if !a.is_iso() || !b.is_iso() {
        return Ok(None);
    }
    let idempotent = matches!(
        semiring.add().op().builtin_opcode(),
        Some(
            BuiltinBinary::Min
                | BuiltinBinary::Max
                | BuiltinBinary::Lor
                | BuiltinBinary::Land
                | BuiltinBinary::Bor
                | BuiltinBinary::Band
                | BuiltinBinary::Any
        )
    );
    if !idempotent {
        return Ok(None);
    }
    if a.store_is_empty() || b.store_is_empty() {
        return Ok(None);
    }
    let v = semiring.mult().apply(&a.value_at(0), &b.value_at(0))?;
    Ok(Some(v.cast_or_keep(semiring.semiring_type().code())?))
}

impl Matrix {
    pub(crate) fn store_is_empty(&self) -> bool {
        self.store.values().is_empty()
    }
}

/// Run the saxpy family, choosing Gustavson or hash per task
fn saxpy(
    a: &Matrix,
    b: &Matrix,
    semiring: &Semiring,
    desc: &Descriptor,
    method: MxmMethod,
    iso_value: Option<ScalarValue>,
) -> Result<Matrix, GblasError> {
    gustavson::saxpy_multiply(a, b, semiring, desc, method, iso_value)
}
