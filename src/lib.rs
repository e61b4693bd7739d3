//! Sparse linear algebra over user-selectable semirings.
//!
//! Matrices and vectors hold typed sparse entries in one of four
//! interchangeable storage forms; every operation runs through the masked,
//! accumulated update `C⟨M,z,r⟩ = C ⊕ f(A,B)`. Graph algorithms are
//! expressed as products over non-standard semirings: min-plus for shortest
//! paths, any-pair for BFS frontiers.

extern crate bytes;
extern crate nalgebra;
extern crate num_complex;
extern crate rayon;
extern crate smallvec;

#[cfg(feature = "json_export")]
#[macro_use]
extern crate json;

/// Apply and select over single entries
pub mod apply;
/// Global mode, configuration defaults, and stackable per-thread contexts
pub mod context;
/// Per-call settings: mask handling, transposes, algorithm hints
pub mod descriptor;
/// The engine-wide error taxonomy
pub mod error;
/// Element-wise union, intersection, and always-apply union
pub mod ewise;
/// Row, column, and entry cursors
pub mod iter;
/// The polymorphic sparse container and its storage forms
pub mod matrix;
/// The matrix multiply engine and its three kernels
pub mod mxm;
/// Operator, monoid, and semiring objects
pub mod ops;
/// Monoid reductions to vectors and scalars
pub mod reduce;
/// 1×1 matrices
pub mod scalar;
/// The scalar type registry and typed value storage
pub mod types;
/// n×1 matrices
pub mod vector;

mod exec;

/// Convenient Re-Exports
pub mod prelude {
    pub use crate::apply::{
        apply_binary_first, apply_binary_second, apply_index_unary, apply_unary,
        apply_unary_vector, select, select_vector,
    };
    pub use crate::context::{init, Context, Mode};
    pub use crate::descriptor::{Compression, Descriptor, ImportTrust, MaskMode, MxmMethod};
    pub use crate::error::{last_error, GblasError};
    pub use crate::ewise::{
        ewise_add, ewise_add_vector, ewise_mult, ewise_mult_vector, ewise_union,
        ewise_union_vector,
    };
    pub use crate::iter::{
        ColIterator, CursorStatus, MatrixEntryIterator, RowIterator, VectorEntryIterator,
    };
    pub use crate::matrix::{Form, Matrix, Orientation, SparsityControl, WaitMode};
    pub use crate::mxm::{mxm, mxv, vxm};
    pub use crate::ops::{
        BinaryOp, BuiltinIndexUnary, IndexUnaryOp, Monoid, Semiring, UnaryOp,
    };
    pub use crate::reduce::{reduce_matrix_to_scalar, reduce_to_vector, reduce_vector_to_scalar};
    pub use crate::scalar::Scalar;
    pub use crate::types::{ScalarType, ScalarValue, TypeCode};
    pub use crate::vector::Vector;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    /// Four-node cycle BFS: each step moves the frontier one hop under the
    /// complement of the visited set, until everything is reached.
    #[test]
    fn bfs_over_a_cycle() {
        let ty = ScalarType::bool_type();
        let mut a = Matrix::new(&ty, 4, 4).unwrap();
        for (r, c) in [(0u64, 1u64), (1, 2), (2, 3), (3, 0)] {
            a.set_element(r, c, ScalarValue::Bool(true)).unwrap();
        }
        a.wait(WaitMode::Materialize).unwrap();

        let mut frontier = Vector::new(&ty, 4).unwrap();
        frontier.set_element(0, ScalarValue::Bool(true)).unwrap();
        let mut visited = frontier.dup();

        let semiring = Semiring::lor_land();
        let lor = BinaryOp::lor();
        let step_desc = Descriptor::new().with_transpose_a().with_complement_mask();

        for step in 0..4 {
            let mut next = Vector::new(&ty, 4).unwrap();
            mxv(
                &mut next,
                Some(&visited),
                None,
                &semiring,
                &a,
                &frontier,
                &step_desc,
            )
            .unwrap();
            if step == 0 {
                // only node 1 is newly reachable from node 0
                assert_eq!(next.nvals().unwrap(), 1);
                assert_eq!(
                    next.extract_element(1).unwrap(),
                    Some(ScalarValue::Bool(true))
                );
            }
            let old = visited.dup();
            ewise_add_vector(
                &mut visited,
                None,
                None,
                &lor,
                &old,
                &next,
                &Descriptor::new(),
            )
            .unwrap();
            frontier = next;
        }

        assert_eq!(visited.nvals().unwrap(), 4);
        for i in 0..4 {
            assert_eq!(
                visited.extract_element(i).unwrap(),
                Some(ScalarValue::Bool(true))
            );
        }
    }

    /// One-step and two-step relaxation over the tropical semiring.
    #[test]
    fn shortest_path_relaxation() {
        let ty = ScalarType::fp64();
        let mut a = Matrix::new(&ty, 3, 3).unwrap();
        a.set_element(0, 1, ScalarValue::Fp64(2.0)).unwrap();
        a.set_element(1, 2, ScalarValue::Fp64(3.0)).unwrap();
        a.set_element(0, 2, ScalarValue::Fp64(10.0)).unwrap();
        a.wait(WaitMode::Materialize).unwrap();

        let mut v = Vector::new(&ty, 3).unwrap();
        v.set_element(0, ScalarValue::Fp64(0.0)).unwrap();

        let semiring = Semiring::min_plus(&ty).unwrap();
        let desc = Descriptor::new().with_transpose_a();
        let mut d = Vector::new(&ty, 3).unwrap();
        mxv(&mut d, None, None, &semiring, &a, &v, &desc).unwrap();
        assert_eq!(d.extract_element(1).unwrap(), Some(ScalarValue::Fp64(2.0)));
        assert_eq!(d.extract_element(2).unwrap(), Some(ScalarValue::Fp64(10.0)));

        // keep the source distance and relax once more
        let min = BinaryOp::min(&ty).unwrap();
        let old = d.dup();
        ewise_add_vector(&mut d, None, None, &min, &old, &v, &Descriptor::new()).unwrap();
        let mut d2 = Vector::new(&ty, 3).unwrap();
        mxv(&mut d2, None, None, &semiring, &a, &d, &desc).unwrap();
        assert_eq!(d2.extract_element(2).unwrap(), Some(ScalarValue::Fp64(5.0)));
    }

    /// Integer semirings associate exactly: (A·B)·D == A·(B·D).
    #[test]
    fn product_associativity() {
        let ty = ScalarType::int64();
        let semiring = Semiring::plus_times(&ty).unwrap();
        let n = 8;
        let mk = |seed: u64| {
            let mut m = Matrix::new(&ty, n, n).unwrap();
            for i in 0..n {
                m.set_element(i, (i * seed + 1) % n, ScalarValue::Int64((i + seed) as i64))
                    .unwrap();
                m.set_element((i * 3 + seed) % n, i, ScalarValue::Int64(2)).unwrap();
            }
            m.wait(WaitMode::Materialize).unwrap();
            m
        };
        let (a, b, d) = (mk(2), mk(3), mk(5));

        let mut ab = Matrix::new(&ty, n, n).unwrap();
        mxm(&mut ab, None, None, &semiring, &a, &b, &Descriptor::new()).unwrap();
        let mut ab_d = Matrix::new(&ty, n, n).unwrap();
        mxm(&mut ab_d, None, None, &semiring, &ab, &d, &Descriptor::new()).unwrap();

        let mut bd = Matrix::new(&ty, n, n).unwrap();
        mxm(&mut bd, None, None, &semiring, &b, &d, &Descriptor::new()).unwrap();
        let mut a_bd = Matrix::new(&ty, n, n).unwrap();
        mxm(&mut a_bd, None, None, &semiring, &a, &bd, &Descriptor::new()).unwrap();

        assert!(ab_d.eq_matrix(&mut a_bd).unwrap());
    }

    /// Density growth flips a matrix to bitmap; removals flip it back.
    #[test]
    fn form_tracks_density_across_edits() {
        let ty = ScalarType::fp64();
        let mut m = Matrix::new(&ty, 1000, 1000).unwrap();
        m.set_bitmap_switch(0.02).unwrap();

        let mut inserted = Vec::new();
        for i in 0..1000u64 {
            for j in 0..25u64 {
                let (r, c) = (i, (i + j) % 1000);
                m.set_element(r, c, ScalarValue::Fp64(1.0)).unwrap();
                inserted.push((r, c));
            }
        }
        m.wait(WaitMode::Materialize).unwrap();
        assert_eq!(m.form(), Form::Bitmap);

        for &(r, c) in inserted.iter().skip(1000) {
            m.remove_element(r, c).unwrap();
        }
        m.wait(WaitMode::Materialize).unwrap();
        assert!(matches!(m.form(), Form::Sparse | Form::Hypersparse));
    }

    /// The dense bridge matches the sparse product.
    #[test]
    fn dense_bridge_agrees_with_mxm() {
        let ty = ScalarType::fp64();
        let semiring = Semiring::plus_times(&ty).unwrap();
        let mut a = Matrix::new(&ty, 3, 3).unwrap();
        let mut b = Matrix::new(&ty, 3, 3).unwrap();
        for i in 0..3u64 {
            a.set_element(i, (i + 1) % 3, ScalarValue::Fp64(i as f64 + 1.0))
                .unwrap();
            b.set_element((i + 2) % 3, i, ScalarValue::Fp64(2.0)).unwrap();
        }
        a.wait(WaitMode::Materialize).unwrap();
        b.wait(WaitMode::Materialize).unwrap();

        let mut c = Matrix::new(&ty, 3, 3).unwrap();
        mxm(&mut c, None, None, &semiring, &a, &b, &Descriptor::new()).unwrap();

        let dense = a.to_dense().unwrap() * b.to_dense().unwrap();
        let mut expected = Matrix::from_dense(&dense).unwrap();
        assert!(c.eq_matrix(&mut expected).unwrap());
    }
}
