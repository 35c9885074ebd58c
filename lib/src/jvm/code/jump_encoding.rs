//! Lay out code, widening jumps which don't fit in 16 bits
//!
//! This module is responsible for fixing jumps that require bigger relative offsets than the jump
//! instruction supports. The general idea is to switch to a `goto_w` based encoding for all jumps
//! that don't fit in the signed 16-bit offset that most jump instructions have.
//!
//! ### Termination
//!
//! This is a tricky problem because the wide encodings are themselves longer than the initial
//! jump instruction, so widening one jump risks pushing other jumps out of range (and the padding
//! of `tableswitch`/`lookupswitch` shifts around too). We iterate to a fixpoint: lay everything
//! out, widen any jump which doesn't fit, and repeat. We know the process will finish because the
//! set of widened jumps only ever grows (a widened jump is never narrowed again) and it is bounded
//! by the number of jumps.
//!
//! ### Rewriting
//!
//! There are three categories of 16-bit jumps that need to be rewritten: `goto`, `jsr`, and
//! `if*`. The first two have direct `_w` counterparts. Conditional branches don't, so they get
//! reversed to skip over a `goto_w`:
//!
//! ```text,ignore,no_run
//!                           ifnot* L1
//!     if* L2                goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```
//!
//! The reversed branch always jumps exactly 8 bytes forward (over itself and the `goto_w`).

use super::Opcode;
use crate::jvm::{Error, ShortJumps};
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<i64> =
    RangeInclusive::new(i16::MIN as i64, i16::MAX as i64);

/// Largest permitted size of a method body
pub const MAX_CODE_LENGTH: usize = 65535;

/// Size information needed to lay out one item of code
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LayoutItem {
    /// Run of bytes whose size doesn't depend on position
    Fixed(usize),

    /// Branch to the start of another item (or to the end of the code, if the index is the number
    /// of items)
    Branch { opcode: Opcode, target: usize },

    TableSwitch { targets: usize },
    LookupSwitch { pairs: usize },
}

/// Offsets of every item, and which branches need a wide encoding
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    /// Offset of each item, followed by the total code length
    pub offsets: Vec<usize>,

    /// Per item: does the branch use a wide encoding (always `false` for non-branches)
    pub widened: Vec<bool>,
}

/// Padding after a switch opcode at `offset`, so that its operands are 4-byte aligned
pub(crate) fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Size of a branch, depending on whether it is widened
pub(crate) fn branch_size(opcode: Opcode, widened: bool) -> usize {
    match opcode {
        Opcode::GotoW | Opcode::JsrW => 5,
        Opcode::Goto | Opcode::Jsr if widened => 5,
        _ if widened => 8,
        _ => 3,
    }
}

fn item_size(item: &LayoutItem, offset: usize, widened: bool) -> usize {
    match item {
        LayoutItem::Fixed(size) => *size,
        LayoutItem::Branch { opcode, .. } => branch_size(*opcode, widened),
        LayoutItem::TableSwitch { targets } => 1 + switch_padding(offset) + 12 + 4 * targets,
        LayoutItem::LookupSwitch { pairs } => 1 + switch_padding(offset) + 8 + 8 * pairs,
    }
}

/// Compute final offsets, widening oversized branches until everything fits
///
/// The `small_jump_range` parameter should always be `SIGNED_16BIT_JUMP_RANGE` - it is a
/// parameter only for unit testing purposes.
pub(crate) fn lay_out(
    items: &[LayoutItem],
    policy: ShortJumps,
    small_jump_range: &RangeInclusive<i64>,
) -> Result<Layout, Error> {
    let mut widened = vec![false; items.len()];
    loop {
        let mut offsets = Vec::with_capacity(items.len() + 1);
        let mut offset = 0;
        for (item, wide) in items.iter().zip(&widened) {
            offsets.push(offset);
            offset += item_size(item, offset, *wide);
        }
        offsets.push(offset);

        let mut changed = false;
        for (index, item) in items.iter().enumerate() {
            if let LayoutItem::Branch { opcode, target } = item {
                if widened[index] || matches!(opcode, Opcode::GotoW | Opcode::JsrW) {
                    continue;
                }
                let distance = offsets[*target] as i64 - offsets[index] as i64;
                if small_jump_range.contains(&distance) {
                    continue;
                }
                if policy == ShortJumps::Fail {
                    return Err(Error::ShortJumpOverflow {
                        offset: offsets[index],
                        distance,
                    });
                }
                log::debug!(
                    "Widening {:?} at offset {} (distance {})",
                    opcode,
                    offsets[index],
                    distance
                );
                widened[index] = true;
                changed = true;
            }
        }

        if !changed {
            if offset > MAX_CODE_LENGTH {
                return Err(Error::CodeTooLarge(offset));
            }
            return Ok(Layout { offsets, widened });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Tiny jump range, so that tests don't need tens of kilobytes of code
    const SMALL: RangeInclusive<i64> = RangeInclusive::new(-10, 10);

    fn branch(opcode: Opcode, target: usize) -> LayoutItem {
        LayoutItem::Branch { opcode, target }
    }

    #[test]
    fn no_jumps() {
        let layout = lay_out(
            &[LayoutItem::Fixed(3), LayoutItem::Fixed(1)],
            ShortJumps::Fix,
            &SMALL,
        )
        .unwrap();
        assert_eq!(layout.offsets, vec![0, 3, 4]);
        assert_eq!(layout.widened, vec![false, false]);
    }

    #[test]
    fn non_oversized_jumps() {
        let items = vec![
            branch(Opcode::Ifeq, 2),
            LayoutItem::Fixed(7),
            branch(Opcode::Goto, 0),
        ];
        let layout = lay_out(&items, ShortJumps::Fail, &SMALL).unwrap();
        assert_eq!(layout.offsets, vec![0, 3, 10, 13]);
        assert_eq!(layout.widened, vec![false, false, false]);
    }

    #[test]
    fn oversized_forward_ifeq() {
        let items = vec![
            branch(Opcode::Ifeq, 2),
            LayoutItem::Fixed(20),
            LayoutItem::Fixed(1),
        ];
        let layout = lay_out(&items, ShortJumps::Fix, &SMALL).unwrap();
        assert_eq!(layout.offsets, vec![0, 8, 28, 29]);
        assert_eq!(layout.widened, vec![true, false, false]);

        assert!(matches!(
            lay_out(&items, ShortJumps::Fail, &SMALL),
            Err(Error::ShortJumpOverflow {
                offset: 0,
                distance: 23
            })
        ));
    }

    #[test]
    fn oversized_back_goto() {
        let items = vec![LayoutItem::Fixed(11), branch(Opcode::Goto, 0)];
        let layout = lay_out(&items, ShortJumps::Fix, &SMALL).unwrap();
        assert_eq!(layout.offsets, vec![0, 11, 16]);
        assert_eq!(layout.widened, vec![false, true]);
    }

    #[test]
    fn wide_opcodes_are_never_widened() {
        let items = vec![branch(Opcode::GotoW, 2), LayoutItem::Fixed(100), LayoutItem::Fixed(1)];
        let layout = lay_out(&items, ShortJumps::Fail, &SMALL).unwrap();
        assert_eq!(layout.offsets, vec![0, 5, 105, 106]);
    }

    #[test]
    fn chain_of_rewrites() {
        // The first jump is just in range until the second one gets widened
        let items = vec![
            branch(Opcode::Ifne, 3),
            branch(Opcode::Ifeq, 4),
            LayoutItem::Fixed(4),
            LayoutItem::Fixed(5),
            LayoutItem::Fixed(1),
        ];
        let layout = lay_out(&items, ShortJumps::Fix, &SMALL).unwrap();
        assert_eq!(layout.widened, vec![true, true, false, false, false]);
        assert_eq!(layout.offsets, vec![0, 8, 16, 20, 25, 26]);
    }

    #[test]
    fn switch_padding_moves_with_layout() {
        let items = vec![
            branch(Opcode::Goto, 2),
            LayoutItem::TableSwitch { targets: 1 },
            LayoutItem::Fixed(1),
        ];
        let layout = lay_out(&items, ShortJumps::Fix, &RangeInclusive::new(-100, 100)).unwrap();
        assert_eq!(switch_padding(3), 0);
        assert_eq!(layout.offsets, vec![0, 3, 3 + 1 + 12 + 4, 21]);
        assert_eq!(switch_padding(0), 3);
    }

    #[test]
    fn code_too_large() {
        let items = vec![LayoutItem::Fixed(MAX_CODE_LENGTH + 1)];
        assert!(matches!(
            lay_out(&items, ShortJumps::Fix, &SIGNED_16BIT_JUMP_RANGE),
            Err(Error::CodeTooLarge(65536))
        ));
    }
}
