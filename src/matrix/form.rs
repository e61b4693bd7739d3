use crate::error::GblasError;
use crate::matrix::store::{HyperHash, Store};
use crate::matrix::{Form, Matrix, Orientation};
use crate::types::ValueStore;
use log::debug;
use smallvec::SmallVec;

/// Vector count above which a hypersparse matrix carries a lookup hash
const HYPER_HASH_THRESHOLD: usize = 1024;

impl Matrix {
    /// Number of non-empty outer vectors
    pub(crate) fn count_nonempty(&self) -> u64 {
        match &self.store {
            Store::Hyper { vec_ids, .. } => vec_ids.len() as u64,
            Store::Sparse { ptr, .. } => {
                ptr.windows(2).filter(|w| w[1] > w[0]).count() as u64
            }
            Store::Bitmap { present, .. } => {
                let inner = self.inner_dim() as usize;
                present
                    .chunks(inner)
                    .filter(|chunk| chunk.iter().any(|&b| b != 0))
                    .count() as u64
            }
            Store::Full { .. } => self.outer_dim(),
        }
    }

    /// Pick the storage form from the transition rules and the density
    /// thresholds, gated by the sparsity control
    ///
    /// Runs at the end of any operation that materializes the matrix; the
    /// matrix must already be drained.
    pub fn conform(&mut self) -> Result<(), GblasError> {
        debug_assert!(!self.has_deferred_work());
        let ideal = self.ideal_form();
        let target = nearest_permitted(ideal, self.sparsity_control);
        if target != self.form() {
            debug!(
                "form transition {:?} -> {:?} (ideal {:?})",
                self.form(),
                target,
                ideal
            );
            self.to_form(target)?;
        }
        self.refresh_hyper_hash();
        Ok(())
    }

    fn ideal_form(&self) -> Form {
        let outer = self.outer_dim();
        let inner = self.inner_dim();
        let nvals = self.nvals_finished();
        if nvals == outer.saturating_mul(inner) {
            return Form::Full;
        }
        let density = nvals as f64 / (outer as f64 * inner as f64);
        if density > self.bitmap_switch {
            return Form::Bitmap;
        }
        let k = self.count_nonempty() as f64;
        match self.form() {
            // hysteresis: leave hypersparse only when clearly past the switch
            Form::Hypersparse => {
                if outer <= 1 || k > 2.0 * outer as f64 * self.hyper_switch {
                    Form::Sparse
                } else {
                    Form::Hypersparse
                }
            }
            _ => {
                if outer > 1 && k <= outer as f64 * self.hyper_switch {
                    Form::Hypersparse
                } else {
                    Form::Sparse
                }
            }
        }
    }

    /// Convert to `target`, stepping through adjacent forms
    ///
    /// A full target silently stops at bitmap when some cell is absent.
    pub(crate) fn to_form(&mut self, target: Form) -> Result<(), GblasError> {
        debug_assert!(!self.has_deferred_work());
        loop {
            let current = self.form();
            if current == target {
                return Ok(());
            }
            let stepped = match (current, target) {
                (Form::Hypersparse, _) => {
                    self.hyper_to_sparse();
                    true
                }
                (Form::Sparse, Form::Hypersparse) => {
                    self.sparse_to_hyper();
                    true
                }
                (Form::Sparse, _) => {
                    self.sparse_to_bitmap();
                    true
                }
                (Form::Bitmap, Form::Full) => self.bitmap_to_full(),
                (Form::Bitmap, _) => {
                    self.bitmap_to_sparse();
                    true
                }
                (Form::Full, _) => {
                    self.full_to_bitmap();
                    true
                }
            };
            if !stepped {
                return Ok(());
            }
        }
    }

    fn refresh_hyper_hash(&mut self) {
        match &self.store {
            Store::Hyper { vec_ids, .. } if vec_ids.len() >= HYPER_HASH_THRESHOLD => {
                self.hyper_hash = Some(HyperHash::build(vec_ids));
            }
            _ => self.hyper_hash = None,
        }
    }

    fn hyper_to_sparse(&mut self) {
        let outer = self.outer_dim() as usize;
        if let Store::Hyper {
            vec_ids,
            ptr,
            idx,
            values,
        } = std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            let mut full_ptr = vec![0u64; outer + 1];
            for (k, &j) in vec_ids.iter().enumerate() {
                full_ptr[j as usize + 1] = ptr[k + 1] - ptr[k];
            }
            for o in 0..outer {
                full_ptr[o + 1] += full_ptr[o];
            }
            self.store = Store::Sparse {
                ptr: full_ptr,
                idx,
                values,
            };
        }
        self.hyper_hash = None;
    }

    fn sparse_to_hyper(&mut self) {
        if let Store::Sparse { ptr, idx, values } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            let mut vec_ids = Vec::new();
            let mut new_ptr = vec![0u64];
            for (o, w) in ptr.windows(2).enumerate() {
                if w[1] > w[0] {
                    vec_ids.push(o as u64);
                    new_ptr.push(w[1]);
                }
            }
            self.store = Store::Hyper {
                vec_ids,
                ptr: new_ptr,
                idx,
                values,
            };
        }
    }

    fn sparse_to_bitmap(&mut self) {
        let inner = self.inner_dim() as usize;
        let outer = self.outer_dim() as usize;
        let iso = self.iso;
        if let Store::Sparse { ptr, idx, values } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            let cells = outer * inner;
            let mut present = vec![0u8; cells];
            let nvals = idx.len() as u64;
            let dense_values = if iso {
                values
            } else {
                let mut dense = ValueStore::zeros(&self.ty, cells);
                for o in 0..outer {
                    for p in ptr[o] as usize..ptr[o + 1] as usize {
                        dense.set(o * inner + idx[p] as usize, values.get(p));
                    }
                }
                dense
            };
            for o in 0..outer {
                for p in ptr[o] as usize..ptr[o + 1] as usize {
                    present[o * inner + idx[p] as usize] = 1;
                }
            }
            self.store = Store::Bitmap {
                present,
                values: dense_values,
                nvals,
            };
        }
    }

    fn bitmap_to_sparse(&mut self) {
        let inner = self.inner_dim() as usize;
        let outer = self.outer_dim() as usize;
        let iso = self.iso;
        if let Store::Bitmap {
            present,
            values,
            nvals,
        } = std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            let mut ptr = Vec::with_capacity(outer + 1);
            let mut idx = Vec::with_capacity(nvals as usize);
            let mut packed = if iso {
                values.clone()
            } else {
                ValueStore::with_capacity(&self.ty, nvals as usize)
            };
            ptr.push(0u64);
            for o in 0..outer {
                for i in 0..inner {
                    let cell = o * inner + i;
                    if present[cell] != 0 {
                        idx.push(i as u64);
                        if !iso {
                            packed.push(values.get(cell));
                        }
                    }
                }
                ptr.push(idx.len() as u64);
            }
            self.store = Store::Sparse {
                ptr,
                idx,
                values: packed,
            };
            self.jumbled = false;
        }
    }

    /// Returns false (and leaves the bitmap in place) when a cell is absent
    fn bitmap_to_full(&mut self) -> bool {
        let cells = (self.outer_dim() * self.inner_dim()) as u64;
        match &self.store {
            Store::Bitmap { nvals, .. } if *nvals == cells => {}
            _ => return false,
        }
        if let Store::Bitmap { values, .. } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            self.store = Store::Full { values };
        }
        true
    }

    fn full_to_bitmap(&mut self) {
        let cells = (self.outer_dim() * self.inner_dim()) as usize;
        if let Store::Full { values } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            self.store = Store::Bitmap {
                present: vec![1u8; cells],
                values,
                nvals: cells as u64,
            };
        }
    }

    /// Rebuild the storage arrays over the opposite outer dimension
    ///
    /// The logical matrix is unchanged; a bucket pass keeps the cost at
    /// O(nvals + outer + inner). Output vectors come out sorted even when
    /// the input was jumbled.
    pub(crate) fn reorient(&mut self, target: Orientation) -> Result<(), GblasError> {
        if self.orientation == target {
            return Ok(());
        }
        self.finish()?;
        let old_inner = self.inner_dim() as usize;
        let old_outer = self.outer_dim() as usize;
        match &self.store {
            Store::Bitmap { .. } | Store::Full { .. } => {
                self.reorient_dense(target, old_outer, old_inner);
                return Ok(());
            }
            _ => {}
        }
        self.to_form_for_reorient();
        let iso = self.iso;
        if let Store::Sparse { ptr, idx, values } =
            std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty))
        {
            let nvals = idx.len();
            let mut new_ptr = vec![0u64; old_inner + 1];
            for &i in &idx {
                new_ptr[i as usize + 1] += 1;
            }
            for v in 0..old_inner {
                new_ptr[v + 1] += new_ptr[v];
            }
            let mut cursor: Vec<u64> = new_ptr[..old_inner].to_vec();
            let mut new_idx = vec![0u64; nvals];
            let mut perm = vec![0usize; nvals];
            for o in 0..old_outer {
                for p in ptr[o] as usize..ptr[o + 1] as usize {
                    let i = idx[p] as usize;
                    let slot = cursor[i] as usize;
                    cursor[i] += 1;
                    new_idx[slot] = o as u64;
                    perm[slot] = p;
                }
            }
            let new_values = if iso { values } else { values.gather(&perm) };
            self.orientation = target;
            self.store = Store::Sparse {
                ptr: new_ptr,
                idx: new_idx,
                values: new_values,
            };
            self.jumbled = false;
            self.hyper_hash = None;
        }
        Ok(())
    }

    fn to_form_for_reorient(&mut self) {
        if matches!(self.store, Store::Hyper { .. }) {
            self.hyper_to_sparse();
        }
    }

    fn reorient_dense(&mut self, target: Orientation, old_outer: usize, old_inner: usize) {
        let iso = self.iso;
        let transpose_cell = |o: usize, i: usize| i * old_outer + o;
        match std::mem::replace(&mut self.store, Store::empty_hyper(&self.ty)) {
            Store::Bitmap {
                present,
                values,
                nvals,
            } => {
                let mut new_present = vec![0u8; present.len()];
                let mut keep = vec![0usize; present.len()];
                for o in 0..old_outer {
                    for i in 0..old_inner {
                        let from = o * old_inner + i;
                        let to = transpose_cell(o, i);
                        new_present[to] = present[from];
                        keep[to] = from;
                    }
                }
                let new_values = if iso { values } else { values.gather(&keep) };
                self.store = Store::Bitmap {
                    present: new_present,
                    values: new_values,
                    nvals,
                };
            }
            Store::Full { values } => {
                let new_values = if iso {
                    values
                } else {
                    let mut keep = vec![0usize; old_outer * old_inner];
                    for o in 0..old_outer {
                        for i in 0..old_inner {
                            keep[transpose_cell(o, i)] = o * old_inner + i;
                        }
                    }
                    values.gather(&keep)
                };
                self.store = Store::Full { values: new_values };
            }
            other => self.store = other,
        }
        self.orientation = target;
    }
}

/// The permitted form closest in rank to the ideal; ties go to the sparser
/// side
fn nearest_permitted(ideal: Form, control: crate::matrix::SparsityControl) -> Form {
    if control.allows(ideal) {
        return ideal;
    }
    let candidates: SmallVec<[Form; 4]> = (0..4usize)
        .map(Form::from_rank)
        .filter(|&f| control.allows(f))
        .collect();
    *candidates
        .iter()
        .min_by_key(|f| {
            let d = f.rank() as isize - ideal.rank() as isize;
            (d.abs(), f.rank())
        })
        .expect("sparsity control permits at least one form")
}
