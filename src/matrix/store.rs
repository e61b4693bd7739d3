use crate::matrix::Form;
use crate::types::{ScalarType, ValueStore};

/// Interior arrays of one storage form
///
/// Bitmap and full lay cells out outer-major: cell (outer, inner) lives at
/// `outer * inner_dim + inner`. Bitmap values at cells with `present == 0`
/// are indeterminate; readers must gate on `present`.
#[derive(Clone, Debug)]
pub enum Store {
    Hyper {
        /// Ids of the non-empty outer vectors, strictly increasing
        vec_ids: Vec<u64>,
        /// `ptr.len() == vec_ids.len() + 1`
        ptr: Vec<u64>,
        idx: Vec<u64>,
        values: ValueStore,
    },
    Sparse {
        /// `ptr.len() == outer_dim + 1`
        ptr: Vec<u64>,
        idx: Vec<u64>,
        values: ValueStore,
    },
    Bitmap {
        /// Byte per cell, 1 = present
        present: Vec<u8>,
        values: ValueStore,
        nvals: u64,
    },
    Full {
        values: ValueStore,
    },
}

impl Store {
    pub fn empty_hyper(ty: &ScalarType) -> Store {
        Store::Hyper {
            vec_ids: Vec::new(),
            ptr: vec![0],
            idx: Vec::new(),
            values: ValueStore::new(ty),
        }
    }

    pub fn form(&self) -> Form {
        match self {
            Store::Hyper { .. } => Form::Hypersparse,
            Store::Sparse { .. } => Form::Sparse,
            Store::Bitmap { .. } => Form::Bitmap,
            Store::Full { .. } => Form::Full,
        }
    }

    pub fn values(&self) -> &ValueStore {
        match self {
            Store::Hyper { values, .. }
            | Store::Sparse { values, .. }
            | Store::Bitmap { values, .. }
            | Store::Full { values } => values,
        }
    }

    pub fn values_mut(&mut self) -> &mut ValueStore {
        match self {
            Store::Hyper { values, .. }
            | Store::Sparse { values, .. }
            | Store::Bitmap { values, .. }
            | Store::Full { values } => values,
        }
    }

    /// Borrow as a uniform sparse view; None for bitmap and full
    pub(crate) fn sparse_read(&self, iso: bool) -> Option<SparseRead<'_>> {
        match self {
            Store::Hyper {
                vec_ids,
                ptr,
                idx,
                values,
            } => Some(SparseRead {
                vec_ids: Some(vec_ids),
                ptr,
                idx,
                values,
                iso,
            }),
            Store::Sparse { ptr, idx, values } => Some(SparseRead {
                vec_ids: None,
                ptr,
                idx,
                values,
                iso,
            }),
            _ => None,
        }
    }
}

/// Read-only view over a hypersparse or sparse store
///
/// `nvec` outer vectors; the v-th has id `outer_id(v)` and spans storage
/// positions `range(v)`.
#[derive(Clone, Copy)]
pub(crate) struct SparseRead<'a> {
    pub vec_ids: Option<&'a [u64]>,
    pub ptr: &'a [u64],
    pub idx: &'a [u64],
    pub values: &'a ValueStore,
    pub iso: bool,
}

impl<'a> SparseRead<'a> {
    pub fn nvec(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn outer_id(&self, v: usize) -> u64 {
        match self.vec_ids {
            Some(ids) => ids[v],
            None => v as u64,
        }
    }

    pub fn range(&self, v: usize) -> std::ops::Range<usize> {
        self.ptr[v] as usize..self.ptr[v + 1] as usize
    }

    /// Position of outer vector `j` in the vector list
    pub fn find_outer(&self, j: u64) -> Option<usize> {
        match self.vec_ids {
            Some(ids) => ids.binary_search(&j).ok(),
            None => {
                if (j as usize) < self.nvec() {
                    Some(j as usize)
                } else {
                    None
                }
            }
        }
    }

    pub fn value(&self, p: usize) -> crate::types::ScalarValue {
        if self.iso {
            self.values.get(0)
        } else {
            self.values.get(p)
        }
    }
}

/// Open-addressed map from outer-vector id to its position in `vec_ids`
///
/// Owned by the parent matrix; rebuilt whenever the hypersparse vector list
/// changes.
#[derive(Clone, Debug)]
pub struct HyperHash {
    /// Slot holds a position into `vec_ids`, or `u64::MAX` when empty
    slots: Vec<u64>,
    mask: u64,
}

const EMPTY_SLOT: u64 = u64::MAX;

impl HyperHash {
    pub fn build(vec_ids: &[u64]) -> HyperHash {
        let cap = (vec_ids.len().max(1) * 4).next_power_of_two();
        let mask = cap as u64 - 1;
        let mut slots = vec![EMPTY_SLOT; cap];
        for (k, &j) in vec_ids.iter().enumerate() {
            let mut slot = hash_index(j) & mask;
            while slots[slot as usize] != EMPTY_SLOT {
                slot = (slot + 1) & mask;
            }
            slots[slot as usize] = k as u64;
        }
        HyperHash { slots, mask }
    }

    /// Position of id `j`, verified against the vector list
    pub fn lookup(&self, j: u64, vec_ids: &[u64]) -> Option<usize> {
        let mut slot = hash_index(j) & self.mask;
        loop {
            let k = self.slots[slot as usize];
            if k == EMPTY_SLOT {
                return None;
            }
            if vec_ids[k as usize] == j {
                return Some(k as usize);
            }
            slot = (slot + 1) & self.mask;
        }
    }
}

fn hash_index(j: u64) -> u64 {
    j.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_right(23)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyper_hash_finds_every_vector() {
        let vec_ids: Vec<u64> = vec![3, 17, 254, 255, 1000, 65536];
        let hash = HyperHash::build(&vec_ids);
        for (k, &j) in vec_ids.iter().enumerate() {
            assert_eq!(hash.lookup(j, &vec_ids), Some(k));
        }
        assert_eq!(hash.lookup(4, &vec_ids), None);
    }

    #[test]
    fn sparse_read_spans_vectors() {
        let ty = ScalarType::int32();
        let mut values = ValueStore::new(&ty);
        for x in [1, 2, 3] {
            values.push(crate::types::ScalarValue::Int32(x));
        }
        let store = Store::Sparse {
            ptr: vec![0, 2, 2, 3],
            idx: vec![0, 4, 1],
            values,
        };
        let read = store.sparse_read(false).unwrap();
        assert_eq!(read.nvec(), 3);
        assert_eq!(read.range(0), 0..2);
        assert_eq!(read.range(1), 2..2);
        assert_eq!(read.find_outer(2), Some(2));
        assert_eq!(read.find_outer(9), None);
    }
}
