use std::fmt;

/// Opaque position marker in a method body
///
/// Labels are handles into the label table of whoever created them: `owner` identifies that table
/// and `index` the slot in it. Labels from a parsed method body use the bytecode offset as the
/// index, so that the same position always maps to the same label. A label can be handed to any
/// code builder, not just the one which created it; the writer maps foreign labels to its own
/// slots the first time it sees them.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label {
    pub(crate) owner: u64,
    pub(crate) index: u32,
}

impl Label {
    pub(crate) const fn new(owner: u64, index: u32) -> Label {
        Label { owner, index }
    }
}

/// Generates new labels
pub trait LabelGenerator {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator for a single label table
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct LabelArena {
    owner: u64,
    next: u32,
}

impl LabelArena {
    /// Owner ids of builder-made labels have their high bit set, so they can never collide with
    /// the labels of a parsed method body
    pub const BUILDER_OWNER_BIT: u64 = 1 << 63;

    pub fn new() -> LabelArena {
        LabelArena {
            owner: crate::util::fresh_id() | Self::BUILDER_OWNER_BIT,
            next: 0,
        }
    }
}

impl Default for LabelArena {
    fn default() -> Self {
        LabelArena::new()
    }
}

impl LabelGenerator for LabelArena {
    fn fresh_label(&mut self) -> Label {
        let to_return = Label::new(self.owner, self.next);
        self.next += 1;
        to_return
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner & LabelArena::BUILDER_OWNER_BIT == 0 {
            formatter.write_fmt(format_args!("@{}", self.index))
        } else {
            formatter.write_fmt(format_args!("l{}", self.index))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arenas_do_not_share_labels() {
        let mut first = LabelArena::new();
        let mut second = LabelArena::new();
        let a = first.fresh_label();
        let b = second.fresh_label();
        assert_ne!(a, b, "labels from different arenas must differ");
        assert_ne!(first.fresh_label(), a);
        assert_eq!(format!("{:?}", a), "l0");
        assert_eq!(format!("{:?}", Label::new(7 << 32, 12)), "@12");
    }
}
