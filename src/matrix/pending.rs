use crate::error::GblasError;
use crate::matrix::store::Store;
use crate::matrix::{dezombie, is_zombie, Matrix};
use crate::ops::BinaryOp;
use crate::types::{ScalarValue, ValueStore};
use log::debug;

/// Tuples not yet merged into the main storage
///
/// `op == None` resolves duplicates by last write wins (element-set
/// semantics); `Some(op)` folds duplicates and combines with an existing
/// entry through the operator.
#[derive(Clone, Debug)]
pub struct PendingTuples {
    pub(crate) rows: Vec<u64>,
    pub(crate) cols: Vec<u64>,
    pub(crate) values: ValueStore,
    pub(crate) op: Option<BinaryOp>,
}

impl PendingTuples {
    pub(crate) fn new(m: &Matrix, op: Option<BinaryOp>) -> PendingTuples {
        PendingTuples {
            rows: Vec::new(),
            cols: Vec::new(),
            values: ValueStore::new(&m.ty),
            op,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether a new deferred write with `op` can join this list
    pub(crate) fn compatible(&self, op: &Option<BinaryOp>) -> bool {
        match (&self.op, op) {
            (None, None) => true,
            (Some(a), Some(b)) => a.name() == b.name(),
            _ => false,
        }
    }

    /// Fold the pending writes for one position, in insertion order, on top
    /// of an optional existing value
    pub(crate) fn fold_at(
        &self,
        row: u64,
        col: u64,
        base: Option<ScalarValue>,
    ) -> Result<Option<ScalarValue>, GblasError> {
        let mut acc = base;
        for p in 0..self.len() {
            if self.rows[p] == row && self.cols[p] == col {
                let v = self.values.get(p);
                acc = Some(match (&acc, &self.op) {
                    (Some(prev), Some(op)) => op.apply(prev, &v)?,
                    _ => v,
                });
            }
        }
        Ok(acc)
    }
}

/// Drain all three kinds of deferred state: sort jumbled vectors, compact
/// zombies, then merge pending tuples
///
/// The storage form is left as-is (sparse when a merge ran); the form
/// controller runs separately.
pub(crate) fn materialize(m: &mut Matrix) -> Result<(), GblasError> {
    if !m.has_deferred_work() {
        return Ok(());
    }
    debug!(
        "materialize: pending={} zombies={} jumbled={}",
        m.pending.as_ref().map_or(0, |p| p.len()),
        m.nzombies,
        m.jumbled
    );
    if m.jumbled {
        sort_jumbled(m);
    }
    if m.nzombies > 0 {
        compact_zombies(m);
    }
    if let Some(pending) = m.pending.take() {
        merge_pending(m, pending)?;
    }
    Ok(())
}

/// Sort inner indices within each vector; zombie-bit entries sort high and
/// stay inside their vector
fn sort_jumbled(m: &mut Matrix) {
    let iso = m.iso;
    if let Store::Hyper { ptr, idx, values, .. } | Store::Sparse { ptr, idx, values } =
        &mut m.store
    {
        let mut perm: Vec<usize> = (0..idx.len()).collect();
        for v in 0..ptr.len() - 1 {
            let range = ptr[v] as usize..ptr[v + 1] as usize;
            perm[range.clone()].sort_by_key(|&p| idx[p]);
        }
        let sorted_idx: Vec<u64> = perm.iter().map(|&p| idx[p]).collect();
        *idx = sorted_idx;
        if !iso {
            *values = values.gather(&perm);
        }
    }
    m.jumbled = false;
}

/// Drop zombie slots and rebuild the vector pointers
fn compact_zombies(m: &mut Matrix) {
    let iso = m.iso;
    if let Store::Hyper { ptr, idx, values, .. } | Store::Sparse { ptr, idx, values } =
        &mut m.store
    {
        let mut keep = Vec::with_capacity(idx.len() - m.nzombies as usize);
        let mut new_ptr = Vec::with_capacity(ptr.len());
        new_ptr.push(0u64);
        for v in 0..ptr.len() - 1 {
            for p in ptr[v] as usize..ptr[v + 1] as usize {
                if !is_zombie(idx[p]) {
                    keep.push(p);
                }
            }
            new_ptr.push(keep.len() as u64);
        }
        *idx = keep.iter().map(|&p| idx[p]).collect();
        *ptr = new_ptr;
        if !iso {
            *values = values.gather(&keep);
        }
    }
    // a hypersparse store may now list empty vectors; prune them
    if let Store::Hyper {
        vec_ids,
        ptr,
        idx,
        values,
    } = std::mem::replace(&mut m.store, Store::empty_hyper(&m.ty))
    {
        let mut kept_ids = Vec::with_capacity(vec_ids.len());
        let mut kept_ptr = vec![0u64];
        for (k, &j) in vec_ids.iter().enumerate() {
            if ptr[k + 1] > ptr[k] {
                kept_ids.push(j);
                kept_ptr.push(ptr[k + 1]);
            }
        }
        m.store = Store::Hyper {
            vec_ids: kept_ids,
            ptr: kept_ptr,
            idx,
            values,
        };
        m.hyper_hash = None;
    }
    m.nzombies = 0;
}

/// Merge the pending list into the main storage with a per-vector join
fn merge_pending(m: &mut Matrix, pending: PendingTuples) -> Result<(), GblasError> {
    debug_assert!(!m.jumbled && m.nzombies == 0);
    // the merge writes a plain sparse store; the form controller may
    // re-compress afterwards
    m.to_form(crate::matrix::Form::Sparse)?;

    // replace-style pending values that all equal the iso value keep the
    // matrix iso; a folding dup op can produce new values
    if m.iso {
        let iso_value = m.store.values().get(0);
        let uniform = pending.op.is_none()
            && (0..pending.len()).all(|p| pending.values.get(p) == iso_value);
        if !uniform {
            m.expand_iso();
        }
    }
    let iso = m.iso;

    // stable sort by (outer, inner) keeps insertion order for duplicates
    let mut order: Vec<usize> = (0..pending.len()).collect();
    let keys: Vec<(u64, u64)> = (0..pending.len())
        .map(|p| m.to_outer_inner(pending.rows[p], pending.cols[p]))
        .collect();
    order.sort_by_key(|&p| keys[p]);

    let outer = m.outer_dim() as usize;
    if let Store::Sparse { ptr, idx, values } =
        std::mem::replace(&mut m.store, Store::empty_hyper(&m.ty))
    {
        let mut new_ptr = Vec::with_capacity(outer + 1);
        let mut new_idx = Vec::with_capacity(idx.len() + pending.len());
        let mut new_values = ValueStore::with_capacity(&m.ty, idx.len() + pending.len());
        new_ptr.push(0u64);

        let mut t = 0usize;
        for o in 0..outer {
            let mut p = ptr[o] as usize;
            let p_end = ptr[o + 1] as usize;
            loop {
                // fold runs of equal pending keys first
                let next_pending = if t < order.len() && keys[order[t]].0 == o as u64 {
                    Some(keys[order[t]].1)
                } else {
                    None
                };
                match (p < p_end, next_pending) {
                    (false, None) => break,
                    (true, Some(pi)) if idx[p] < pi => {
                        new_idx.push(idx[p]);
                        if !iso {
                            new_values.push(values.get(p));
                        }
                        p += 1;
                    }
                    (true, Some(pi)) if idx[p] > pi => {
                        let folded = fold_run(&pending, &order, &keys, &mut t, None)?;
                        new_idx.push(pi);
                        if !iso {
                            new_values.push(folded);
                        }
                    }
                    (true, Some(pi)) => {
                        let existing = if iso { None } else { Some(values.get(p)) };
                        let folded = fold_run(&pending, &order, &keys, &mut t, existing)?;
                        new_idx.push(pi);
                        if !iso {
                            new_values.push(folded);
                        }
                        p += 1;
                    }
                    (true, None) => {
                        new_idx.push(idx[p]);
                        if !iso {
                            new_values.push(values.get(p));
                        }
                        p += 1;
                    }
                    (false, Some(pi)) => {
                        let folded = fold_run(&pending, &order, &keys, &mut t, None)?;
                        new_idx.push(pi);
                        if !iso {
                            new_values.push(folded);
                        }
                    }
                }
            }
            new_ptr.push(new_idx.len() as u64);
        }
        if iso {
            new_values = values;
        }
        m.store = Store::Sparse {
            ptr: new_ptr,
            idx: new_idx,
            values: new_values,
        };
    }
    Ok(())
}

/// Fold the run of pending tuples sharing the key at `order[*t]`, advancing
/// the cursor past the run
fn fold_run(
    pending: &PendingTuples,
    order: &[usize],
    keys: &[(u64, u64)],
    t: &mut usize,
    existing: Option<ScalarValue>,
) -> Result<ScalarValue, GblasError> {
    let key = keys[order[*t]];
    let mut acc = existing;
    while *t < order.len() && keys[order[*t]] == key {
        let v = pending.values.get(order[*t]);
        acc = Some(match (&acc, &pending.op) {
            (Some(prev), Some(op)) => op.apply(prev, &v)?,
            _ => v,
        });
        *t += 1;
    }
    Ok(acc.expect("run is nonempty"))
}

#[cfg(test)]
mod tests {
    use crate::matrix::{Form, Matrix, WaitMode};
    use crate::types::{ScalarType, ScalarValue};

    #[test]
    fn set_then_wait_merges_pending() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(1, 2, ScalarValue::Int32(5)).unwrap();
        m.set_element(0, 0, ScalarValue::Int32(1)).unwrap();
        m.set_element(1, 2, ScalarValue::Int32(7)).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        assert!(!m.has_deferred_work());
        assert_eq!(m.nvals().unwrap(), 2);
        // last write wins
        assert_eq!(
            m.extract_element(1, 2).unwrap(),
            Some(ScalarValue::Int32(7))
        );
    }

    #[test]
    fn remove_then_wait_compacts_zombies() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        for c in 0..4 {
            m.set_element(0, c, ScalarValue::Int32(c as i32)).unwrap();
        }
        m.wait(WaitMode::Materialize).unwrap();
        m.remove_element(0, 1).unwrap();
        m.remove_element(0, 3).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        assert_eq!(m.nvals().unwrap(), 2);
        assert_eq!(m.extract_element(0, 1).unwrap(), None);
        assert_eq!(
            m.extract_element(0, 2).unwrap(),
            Some(ScalarValue::Int32(2))
        );
    }

    #[test]
    fn set_remove_sequences_settle_to_distinct_survivors() {
        let mut m = Matrix::new(&ScalarType::int32(), 10, 10).unwrap();
        for i in 0..10u64 {
            m.set_element(i, i, ScalarValue::Int32(i as i32)).unwrap();
        }
        m.wait(WaitMode::Materialize).unwrap();
        for i in (0..10u64).step_by(2) {
            m.remove_element(i, i).unwrap();
        }
        m.set_element(0, 0, ScalarValue::Int32(100)).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        assert_eq!(m.nvals().unwrap(), 6);
        assert_eq!(
            m.extract_element(0, 0).unwrap(),
            Some(ScalarValue::Int32(100))
        );
        assert_eq!(m.extract_element(2, 2).unwrap(), None);
    }

    #[test]
    fn complete_wait_leaves_work_deferred() {
        let mut m = Matrix::new(&ScalarType::int32(), 4, 4).unwrap();
        m.set_element(1, 2, ScalarValue::Int32(5)).unwrap();
        if crate::context::mode() == crate::context::Mode::NonBlocking {
            m.wait(WaitMode::Complete).unwrap();
            assert!(m.has_deferred_work());
        }
    }

    #[test]
    fn uniform_pending_keeps_iso() {
        let mut m = Matrix::new(&ScalarType::bool_type(), 8, 8).unwrap();
        m.set_element(0, 0, ScalarValue::Bool(true)).unwrap();
        m.wait(WaitMode::Materialize).unwrap();
        assert!(m.form() == Form::Hypersparse || m.form() == Form::Sparse);
    }
}
