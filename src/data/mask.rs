//! ArrayMask: selection of the overlap entities of a full local array.
//!
//! The mask stores, for every full-array slot, either `0` (excluded) or the
//! 1-based position of the slot in masked iteration order. Masked iteration
//! order is ascending full-array index. `apply` packs masked values into a
//! (possibly permuted) buffer; `to_full` is its inverse and only touches
//! masked slots.

use crate::coupling_error::CouplingError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayMask {
    map: Vec<usize>,
    size: usize,
}

impl ArrayMask {
    /// Build from a boolean selection over the full array.
    pub fn new(selected: &[bool]) -> Self {
        let mut size = 0;
        let map = selected
            .iter()
            .map(|&s| {
                if s {
                    size += 1;
                    size
                } else {
                    0
                }
            })
            .collect();
        Self { map, size }
    }

    /// Mask that selects every slot of a `len`-long array.
    pub fn all(len: usize) -> Self {
        Self {
            map: (1..=len).collect(),
            size: len,
        }
    }

    /// Number of selected entities.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Length of the full array the mask was built over.
    #[inline]
    pub fn full_len(&self) -> usize {
        self.map.len()
    }

    /// Position of full slot `i` in masked order, if selected.
    #[inline]
    pub fn masked_index(&self, i: usize) -> Option<usize> {
        match self.map.get(i) {
            Some(&m) if m > 0 => Some(m - 1),
            _ => None,
        }
    }

    /// Raw `full → 1-based masked index` map (`0` = excluded).
    pub fn map(&self) -> &[usize] {
        &self.map
    }

    /// Full-array indices of the selected slots, in masked order.
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.map
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m > 0)
            .map(|(i, _)| i)
    }

    /// Pack masked values of `full` into `out`.
    ///
    /// With `permutation`, masked entity `j` lands at entity slot
    /// `permutation[j]`; without it, at slot `j`. Each entity carries
    /// `components` consecutive values.
    pub fn apply<T: Copy>(
        &self,
        full: &[T],
        out: &mut [T],
        permutation: Option<&[usize]>,
        components: usize,
    ) -> Result<(), CouplingError> {
        self.check_lengths(full.len(), out.len(), permutation, components)?;
        for (j, i) in self.selected().enumerate() {
            let slot = match permutation {
                Some(p) => p[j],
                None => j,
            };
            out[slot * components..(slot + 1) * components]
                .copy_from_slice(&full[i * components..(i + 1) * components]);
        }
        Ok(())
    }

    /// Unpack `packed` into the masked slots of `full`; other slots are untouched.
    pub fn to_full<T: Copy>(
        &self,
        packed: &[T],
        full: &mut [T],
        permutation: Option<&[usize]>,
        components: usize,
    ) -> Result<(), CouplingError> {
        self.check_lengths(full.len(), packed.len(), permutation, components)?;
        for (j, i) in self.selected().enumerate() {
            let slot = match permutation {
                Some(p) => p[j],
                None => j,
            };
            full[i * components..(i + 1) * components]
                .copy_from_slice(&packed[slot * components..(slot + 1) * components]);
        }
        Ok(())
    }

    fn check_lengths(
        &self,
        full: usize,
        packed: usize,
        permutation: Option<&[usize]>,
        components: usize,
    ) -> Result<(), CouplingError> {
        if full != self.map.len() * components {
            return Err(CouplingError::InvalidConfig(format!(
                "mask covers {} entities x {components} components, array has {full} values",
                self.map.len()
            )));
        }
        if packed != self.size * components {
            return Err(CouplingError::InvalidConfig(format!(
                "packed buffer holds {packed} values, mask selects {} x {components}",
                self.size
            )));
        }
        if let Some(p) = permutation {
            if p.len() != self.size {
                return Err(CouplingError::InvalidConfig(format!(
                    "permutation has {} entries for {} masked entities",
                    p.len(),
                    self.size
                )));
            }
            if let Some(&bad) = p.iter().find(|&&s| s >= self.size) {
                return Err(CouplingError::InvalidConfig(format!(
                    "permutation slot {bad} out of range {}",
                    self.size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_is_one_based() {
        let m = ArrayMask::new(&[false, true, true, false, true]);
        assert_eq!(m.size(), 3);
        assert_eq!(m.map(), &[0, 1, 2, 0, 3]);
        assert_eq!(m.masked_index(4), Some(2));
        assert_eq!(m.masked_index(0), None);
        assert_eq!(m.selected().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn apply_with_permutation() {
        let m = ArrayMask::new(&[true, false, true, true]);
        let full = [10, 20, 30, 40];
        let mut out = [0; 3];
        m.apply(&full, &mut out, Some(&[2, 0, 1]), 1).unwrap();
        assert_eq!(out, [30, 40, 10]);
    }

    #[test]
    fn to_full_touches_only_masked_slots() {
        let m = ArrayMask::new(&[true, false, true]);
        let mut full = [0.0, 9.0, 0.0];
        m.to_full(&[1.0, 2.0], &mut full, Some(&[1, 0]), 1).unwrap();
        assert_eq!(full, [2.0, 9.0, 1.0]);
    }

    #[test]
    fn vector_components_move_together() {
        let m = ArrayMask::new(&[false, true, true]);
        let full = [0, 0, 1, 2, 3, 4];
        let mut out = [0; 4];
        m.apply(&full, &mut out, Some(&[1, 0]), 2).unwrap();
        assert_eq!(out, [3, 4, 1, 2]);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let m = ArrayMask::all(3);
        let mut out = [0; 2];
        assert!(m.apply(&[1, 2, 3], &mut out, None, 1).is_err());
        let mut out = [0; 3];
        assert!(m.apply(&[1, 2, 3], &mut out, Some(&[0, 1, 5]), 1).is_err());
    }
}
