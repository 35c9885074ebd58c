//! Label-based `StackMapTable` frames
//!
//! Stack maps are never computed here. A parsed table is decoded into frames whose positions are
//! labels (instead of offset deltas), so that after the code around them is re-laid out, the
//! frames can be encoded again with fresh deltas. The shape of each frame is kept, but whether the
//! short or `_extended` form gets used is decided from the new deltas.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.4

use super::Label;
use crate::jvm::binary::{ByteReader, ByteWriter, Serialize};
use crate::jvm::constants::{Constant, ConstantPool, ConstantPoolBuilder, PoolEntry};
use crate::jvm::Error;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type (a class constant)
    Object(PoolEntry),

    /// Object created by the `new` instruction at the label, whose `<init>` hasn't been called yet
    Uninitialized(Label),
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::UninitializedThis
                | VerificationType::Object(_)
                | VerificationType::Uninitialized(_)
        )
    }
}

/// Shape of a frame, relative to the previous frame
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FrameShape {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack,

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack(VerificationType),

    /// Frame is like the previous frame, but without the last `k` locals (1 to 3)
    /// Tags: 248-250
    ChopLocalsNoStack(u8),

    /// Frame is like the previous frame, but with 1 to 3 extra locals
    /// Tags: 252-254
    AppendLocalsNoStack(Vec<VerificationType>),

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

/// Frame at a position in the code
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackMapFrame {
    pub target: Label,
    pub shape: FrameShape,
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::malformed("StackMapTable", reason)
}

/// Decode a `StackMapTable` attribute body
///
/// `label_at` maps bytecode offsets to labels.
pub(crate) fn decode_frames(
    reader: ByteReader<'_>,
    offset: usize,
    pool: &ConstantPool,
    code_length: u32,
    label_at: &mut dyn FnMut(u32) -> Label,
) -> Result<Vec<StackMapFrame>, Error> {
    let count = reader.u2(offset)?;
    let mut position = offset + 2;
    let mut previous: Option<u32> = None;
    let mut frames = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let frame_type = reader.u1(position)?;
        position += 1;
        let (delta, shape) = match frame_type {
            0..=63 => (frame_type as u16, FrameShape::SameLocalsNoStack),
            64..=127 => {
                let stack = decode_type(reader, &mut position, pool, code_length, label_at)?;
                (frame_type as u16 - 64, FrameShape::SameLocalsOneStack(stack))
            }
            247 => {
                let delta = reader.u2(position)?;
                position += 2;
                let stack = decode_type(reader, &mut position, pool, code_length, label_at)?;
                (delta, FrameShape::SameLocalsOneStack(stack))
            }
            248..=250 => {
                let delta = reader.u2(position)?;
                position += 2;
                (delta, FrameShape::ChopLocalsNoStack(251 - frame_type))
            }
            251 => {
                let delta = reader.u2(position)?;
                position += 2;
                (delta, FrameShape::SameLocalsNoStack)
            }
            252..=254 => {
                let delta = reader.u2(position)?;
                position += 2;
                let locals = (0..frame_type - 251)
                    .map(|_| decode_type(reader, &mut position, pool, code_length, label_at))
                    .collect::<Result<Vec<_>, Error>>()?;
                (delta, FrameShape::AppendLocalsNoStack(locals))
            }
            255 => {
                let delta = reader.u2(position)?;
                position += 2;
                let mut types = |position: &mut usize| -> Result<Vec<VerificationType>, Error> {
                    let count = reader.u2(*position)?;
                    *position += 2;
                    (0..count)
                        .map(|_| decode_type(reader, position, pool, code_length, label_at))
                        .collect()
                };
                let locals = types(&mut position)?;
                let stack = types(&mut position)?;
                (delta, FrameShape::Full { locals, stack })
            }
            other => return Err(malformed(format!("reserved frame type {}", other))),
        };

        let target = match previous {
            None => delta as u32,
            Some(previous) => previous + delta as u32 + 1,
        };
        if target >= code_length {
            return Err(malformed(format!("frame at {} is past the end of the code", target)));
        }
        previous = Some(target);
        frames.push(StackMapFrame {
            target: label_at(target),
            shape,
        });
    }
    Ok(frames)
}

fn decode_type(
    reader: ByteReader<'_>,
    position: &mut usize,
    pool: &ConstantPool,
    code_length: u32,
    label_at: &mut dyn FnMut(u32) -> Label,
) -> Result<VerificationType, Error> {
    let tag = reader.u1(*position)?;
    *position += 1;
    Ok(match tag {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => {
            let class = pool.typed_entry(reader.u2(*position)?, Constant::CLASS)?;
            *position += 2;
            VerificationType::Object(class)
        }
        8 => {
            let offset = reader.u2(*position)? as u32;
            *position += 2;
            if offset >= code_length {
                return Err(malformed(format!("uninitialized type at bad offset {}", offset)));
            }
            VerificationType::Uninitialized(label_at(offset))
        }
        other => return Err(malformed(format!("bad verification type tag {}", other))),
    })
}

fn encode_type(
    verification_type: &VerificationType,
    pool: &mut ConstantPoolBuilder,
    offset_of: &dyn Fn(Label) -> Result<u32, Error>,
    writer: &mut ByteWriter,
) -> Result<(), Error> {
    match verification_type {
        VerificationType::Top => 0u8.serialize(writer),
        VerificationType::Integer => 1u8.serialize(writer),
        VerificationType::Float => 2u8.serialize(writer),
        VerificationType::Double => 3u8.serialize(writer),
        VerificationType::Long => 4u8.serialize(writer),
        VerificationType::Null => 5u8.serialize(writer),
        VerificationType::UninitializedThis => 6u8.serialize(writer),
        VerificationType::Object(class) => {
            7u8.serialize(writer);
            pool.index_of(class)?.serialize(writer);
        }
        VerificationType::Uninitialized(label) => {
            8u8.serialize(writer);
            writer.write_u2(offset_of(*label)?);
        }
    };
    Ok(())
}

fn encode_types(
    types: &[VerificationType],
    pool: &mut ConstantPoolBuilder,
    offset_of: &dyn Fn(Label) -> Result<u32, Error>,
    writer: &mut ByteWriter,
) -> Result<(), Error> {
    for verification_type in types {
        encode_type(verification_type, pool, offset_of, writer)?;
    }
    Ok(())
}

/// Encode frames into a `StackMapTable` attribute body
///
/// Frames must end up at strictly increasing offsets.
pub(crate) fn encode_frames(
    frames: &[StackMapFrame],
    pool: &mut ConstantPoolBuilder,
    offset_of: &dyn Fn(Label) -> Result<u32, Error>,
    writer: &mut ByteWriter,
) -> Result<(), Error> {
    crate::jvm::errors::u16_count("stack map frames", frames.len())?.serialize(writer);
    let mut previous: Option<u32> = None;

    for frame in frames {
        let offset = offset_of(frame.target)?;
        let delta = match previous {
            None => offset,
            Some(previous) if offset > previous => offset - previous - 1,
            Some(_) => return Err(malformed(format!("frames out of order at offset {}", offset))),
        };
        previous = Some(offset);
        let delta = u16::try_from(delta).map_err(|_| Error::OperandOverflow {
            what: "a stack map frame offset",
            value: delta as i64,
        })?;

        match &frame.shape {
            // `same_frame` and `same_frame_extended`
            FrameShape::SameLocalsNoStack => {
                if delta <= 63 {
                    (delta as u8).serialize(writer);
                } else {
                    251u8.serialize(writer);
                    delta.serialize(writer);
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            FrameShape::SameLocalsOneStack(stack) => {
                if delta <= 63 {
                    (delta as u8 + 64).serialize(writer);
                } else {
                    247u8.serialize(writer);
                    delta.serialize(writer);
                }
                encode_type(stack, pool, offset_of, writer)?;
            }

            // `chop_frame`
            FrameShape::ChopLocalsNoStack(chopped) => {
                if !(1..=3).contains(chopped) {
                    return Err(malformed("chop frames remove 1 to 3 locals"));
                }
                (251 - chopped).serialize(writer);
                delta.serialize(writer);
            }

            // `append_frame`
            FrameShape::AppendLocalsNoStack(locals) => {
                if !(1..=3).contains(&locals.len()) {
                    return Err(malformed("append frames add 1 to 3 locals"));
                }
                (251 + locals.len() as u8).serialize(writer);
                delta.serialize(writer);
                encode_types(locals, pool, offset_of, writer)?;
            }

            // `full_frame`
            FrameShape::Full { locals, stack } => {
                255u8.serialize(writer);
                delta.serialize(writer);
                crate::jvm::errors::u16_count("frame locals", locals.len())?.serialize(writer);
                encode_types(locals, pool, offset_of, writer)?;
                crate::jvm::errors::u16_count("frame stack entries", stack.len())?
                    .serialize(writer);
                encode_types(stack, pool, offset_of, writer)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelArena, LabelGenerator};
    use std::collections::HashMap;

    #[test]
    fn deltas_pick_frame_forms() {
        let mut labels = LabelArena::new();
        let (a, b, c) = (labels.fresh_label(), labels.fresh_label(), labels.fresh_label());
        let offsets: HashMap<Label, u32> = vec![(a, 5), (b, 200), (c, 203)].into_iter().collect();
        let frames = vec![
            StackMapFrame {
                target: a,
                shape: FrameShape::SameLocalsNoStack,
            },
            StackMapFrame {
                target: b,
                shape: FrameShape::SameLocalsOneStack(VerificationType::Integer),
            },
            StackMapFrame {
                target: c,
                shape: FrameShape::ChopLocalsNoStack(2),
            },
        ];

        let mut pool = ConstantPoolBuilder::new();
        let mut writer = ByteWriter::new();
        let offset_of = |label: Label| offsets.get(&label).copied().ok_or(Error::UnboundLabel(label));
        encode_frames(&frames, &mut pool, &offset_of, &mut writer).unwrap();
        assert_eq!(
            writer.as_bytes(),
            &[0, 3, 5, 247, 0, 194, 1, 249, 0, 2],
            "short same frame, extended one-stack frame, then a chop frame"
        );
    }

    #[test]
    fn frames_must_be_ordered() {
        let mut labels = LabelArena::new();
        let (a, b) = (labels.fresh_label(), labels.fresh_label());
        let frames = vec![
            StackMapFrame {
                target: a,
                shape: FrameShape::SameLocalsNoStack,
            },
            StackMapFrame {
                target: b,
                shape: FrameShape::SameLocalsNoStack,
            },
        ];
        let offset_of = |_: Label| Ok(4);
        let result = encode_frames(
            &frames,
            &mut ConstantPoolBuilder::new(),
            &offset_of,
            &mut ByteWriter::new(),
        );
        assert!(matches!(result, Err(Error::MalformedAttribute { .. })));
    }
}
