use std::fmt;

/// Number of slots a value occupies in an [`OffsetVec`]
pub trait Width {
    fn width(&self) -> usize;
}

/// Slot offset into an [`OffsetVec`]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Append-only vector numbered by slots rather than by position
///
/// The constant pool is numbered this way: entries take one slot, except `Long` and `Double`
/// which take two, and numbering starts at 1 (or after the last entry of a shared pool).
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    entries: Vec<(Offset, T)>,
    next: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    pub fn new_starting_at(first: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next: first,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next pushed value will get
    pub fn offset_len(&self) -> Offset {
        self.next
    }

    pub fn push(&mut self, value: T) -> Offset {
        let offset = self.next;
        self.next = Offset(offset.0 + value.width());
        self.entries.push((offset, value));
        offset
    }

    /// Entry at some position (not offset), along with its offset
    pub fn get_index(&self, index: usize) -> Option<(Offset, &T)> {
        self.entries.get(index).map(|(offset, value)| (*offset, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, value)| (*offset, value))
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(offset, value)| (offset.0, value)))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Entry {
        Int(i32),
        Long(i64),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Int(_) => 1,
                Entry::Long(_) => 2,
            }
        }
    }

    #[test]
    fn wide_entries_skip_a_slot() {
        let mut pool = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(pool.push(Entry::Int(7)), Offset(1));
        assert_eq!(pool.push(Entry::Long(-1)), Offset(2));
        assert_eq!(pool.push(Entry::Int(8)), Offset(4));
        assert_eq!(pool.offset_len(), Offset(5));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get_index(2), Some((Offset(4), &Entry::Int(8))));

        let offsets: Vec<usize> = pool.iter().map(|(offset, _)| offset.0).collect();
        assert_eq!(offsets, vec![1, 2, 4]);
    }
}
