use super::{scan_attributes, AttributeRange, ClassReader};
use crate::jvm::binary::ByteReader;
use crate::jvm::code::{
    decode_frames, jump_encoding::switch_padding, jump_encoding::MAX_CODE_LENGTH, CodeHints,
    ExceptionCatch, Instruction, Label, LocalVariable, LocalVariableType, Opcode, OpcodeKind,
    TypeKind, WIDE_PREFIX,
};
use crate::jvm::constants::{Constant, ConstantPool, PoolEntry};
use crate::jvm::elements::{CodeElement, CompoundElement};
use crate::jvm::{DebugElements, Error, LineNumbers, StackMaps};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A method body
///
/// A bound body is decoded in full every time it is traversed. Its elements come out in this
/// order:
///
///   1. exception catches
///   2. local variables, then local variable types
///   3. instructions, each preceded by the label bound at its offset (if anything refers to it)
///      and by its line numbers
///   4. the label at the end of the code
///   5. the stack map table
///   6. any other attributes
///
/// Labels of a bound body are keyed by bytecode offset, so every traversal produces the same
/// labels.
#[derive(Clone)]
pub struct CodeModel {
    source: CodeSource,
}

#[derive(Clone)]
enum CodeSource {
    Bound {
        reader: Arc<ClassReader>,
        attribute: AttributeRange,
    },
    Buffered {
        elements: Vec<CodeElement>,
        hints: CodeHints,
    },
}

impl CodeModel {
    pub(crate) fn bound(reader: Arc<ClassReader>, attribute: AttributeRange) -> CodeModel {
        CodeModel {
            source: CodeSource::Bound { reader, attribute },
        }
    }

    pub(crate) fn buffered(elements: Vec<CodeElement>, hints: CodeHints) -> CodeModel {
        CodeModel {
            source: CodeSource::Buffered { elements, hints },
        }
    }

    pub(crate) fn bound_source(&self) -> Option<(&Arc<ClassReader>, &AttributeRange)> {
        match &self.source {
            CodeSource::Bound { reader, attribute } => Some((reader, attribute)),
            CodeSource::Buffered { .. } => None,
        }
    }

    /// Frame sizes and attribute order to carry over when this body is re-encoded
    pub(crate) fn hints(&self) -> Result<CodeHints, Error> {
        match &self.source {
            CodeSource::Bound { reader, attribute } => {
                let layout = CodeLayout::scan(reader, attribute)?;
                Ok(CodeHints {
                    max_stack: layout.max_stack,
                    max_locals: layout.max_locals,
                    attribute_order: layout.attributes.into_iter().map(|a| a.name).collect(),
                })
            }
            CodeSource::Buffered { hints, .. } => Ok(hints.clone()),
        }
    }

    pub fn max_stack(&self) -> Result<u16, Error> {
        Ok(self.hints()?.max_stack)
    }

    pub fn max_locals(&self) -> Result<u16, Error> {
        Ok(self.hints()?.max_locals)
    }
}

impl CompoundElement for CodeModel {
    type Element = CodeElement;

    fn for_each_element(
        &self,
        callback: &mut dyn FnMut(CodeElement) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let decoded;
        let elements = match &self.source {
            CodeSource::Bound { reader, attribute } => {
                decoded = decode_code(reader, attribute)?;
                &decoded
            }
            CodeSource::Buffered { elements, .. } => elements,
        };
        for element in elements {
            callback(element.clone())?;
        }
        Ok(())
    }
}

impl fmt::Debug for CodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            CodeSource::Bound { attribute, .. } => {
                write!(f, "CodeModel(Code@{:?})", attribute.payload)
            }
            CodeSource::Buffered { elements, .. } => {
                write!(f, "CodeModel({} elements)", elements.len())
            }
        }
    }
}

/// Outline of a `Code` attribute
struct CodeLayout {
    max_stack: u16,
    max_locals: u16,

    /// Range of the bytecode in the class file
    code: Range<usize>,
    exception_table: usize,
    exception_count: usize,
    attributes: Vec<AttributeRange>,
}

impl CodeLayout {
    fn scan(reader: &ClassReader, attribute: &AttributeRange) -> Result<CodeLayout, Error> {
        let bytes = reader.reader();
        let start = attribute.payload.start;
        let max_stack = bytes.u2(start)?;
        let max_locals = bytes.u2(start + 2)?;
        let code_length = bytes.u4(start + 4)? as usize;
        if code_length > MAX_CODE_LENGTH {
            return Err(Error::malformed(
                "Code",
                format!("code length {} is too large", code_length),
            ));
        }
        let code = start + 8..start + 8 + code_length;
        bytes.bytes(code.start, code_length)?;

        let exception_count = bytes.u2(code.end)? as usize;
        let exception_table = code.end + 2;
        let mut offset = exception_table + 8 * exception_count;
        let attributes = scan_attributes(bytes, reader.pool(), &mut offset)?;
        if offset != attribute.payload.end {
            return Err(Error::malformed(
                "Code",
                "contents do not match the attribute length",
            ));
        }
        Ok(CodeLayout {
            max_stack,
            max_locals,
            code,
            exception_table,
            exception_count,
            attributes,
        })
    }
}

/// Decodes instructions, keeping track of which offsets get referred to
struct CodeDecoder<'r> {
    bytes: ByteReader<'r>,
    pool: &'r ConstantPool,
    code_start: usize,
    code_length: usize,
    owner: u64,

    /// For every offset (plus the end of the code), the first offset that refers to it
    referenced: Vec<Option<usize>>,
}

impl<'r> CodeDecoder<'r> {
    fn label(&mut self, from: usize, target: i64) -> Result<Label, Error> {
        if target < 0 || target > self.code_length as i64 {
            return Err(Error::BadBranchTarget {
                offset: from,
                target,
            });
        }
        let slot = &mut self.referenced[target as usize];
        if slot.is_none() {
            *slot = Some(from);
        }
        Ok(Label::new(self.owner, target as u32))
    }

    fn entry(&self, index: u16, tag: u8) -> Result<PoolEntry, Error> {
        self.pool.typed_entry(index, tag)
    }

    /// Decode the instruction at `pc`, returning it along with its size
    fn instruction(&mut self, pc: usize) -> Result<(Instruction, usize), Error> {
        let at = self.code_start + pc;
        let bytes = self.bytes;
        let byte = bytes.u1(at)?;
        if byte == WIDE_PREFIX {
            return self.wide_instruction(pc);
        }
        let opcode = Opcode::from_bytecode(byte).ok_or(Error::BadOpcode {
            opcode: byte,
            offset: pc,
        })?;

        let instruction = match opcode.kind() {
            OpcodeKind::Load | OpcodeKind::Store => {
                let slot = match opcode.intrinsic_slot() {
                    Some(slot) => slot,
                    None => bytes.u1(at + 1)? as u16,
                };
                if opcode.kind() == OpcodeKind::Load {
                    Instruction::Load { opcode, slot }
                } else {
                    Instruction::Store { opcode, slot }
                }
            }
            OpcodeKind::Increment => Instruction::Increment {
                opcode,
                slot: bytes.u1(at + 1)? as u16,
                constant: bytes.s1(at + 2)? as i16,
            },
            OpcodeKind::Branch => {
                let offset = if opcode == Opcode::GotoW {
                    bytes.i32(at + 1)? as i64
                } else {
                    bytes.s2(at + 1)? as i64
                };
                Instruction::Branch {
                    opcode,
                    target: self.label(pc, pc as i64 + offset)?,
                }
            }
            OpcodeKind::DiscontinuedJsr => {
                let offset = if opcode == Opcode::JsrW {
                    bytes.i32(at + 1)? as i64
                } else {
                    bytes.s2(at + 1)? as i64
                };
                Instruction::Jsr {
                    opcode,
                    target: self.label(pc, pc as i64 + offset)?,
                }
            }
            OpcodeKind::DiscontinuedRet => Instruction::Ret {
                opcode,
                slot: bytes.u1(at + 1)? as u16,
            },
            OpcodeKind::TableSwitch => {
                let start = at + 1 + switch_padding(pc);
                let default = self.label(pc, pc as i64 + bytes.i32(start)? as i64)?;
                let low = bytes.i32(start + 4)?;
                let high = bytes.i32(start + 8)?;
                if high < low {
                    return Err(Error::malformed(
                        "Code",
                        format!("tableswitch at offset {} has bounds {}..={}", pc, low, high),
                    ));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                bytes.bytes(start + 12, count.saturating_mul(4))?;
                let mut targets = Vec::with_capacity(count);
                for i in 0..count {
                    let offset = bytes.i32(start + 12 + 4 * i)? as i64;
                    targets.push(self.label(pc, pc as i64 + offset)?);
                }
                let size = start + 12 + 4 * count - at;
                return Ok((
                    Instruction::TableSwitch {
                        low,
                        high,
                        default,
                        targets,
                    },
                    size,
                ));
            }
            OpcodeKind::LookupSwitch => {
                let start = at + 1 + switch_padding(pc);
                let default = self.label(pc, pc as i64 + bytes.i32(start)? as i64)?;
                let pairs = bytes.i32(start + 4)?;
                let pairs = usize::try_from(pairs).map_err(|_| {
                    Error::malformed(
                        "Code",
                        format!("lookupswitch at offset {} has {} pairs", pc, pairs),
                    )
                })?;
                bytes.bytes(start + 8, pairs.saturating_mul(8))?;
                let mut cases = Vec::with_capacity(pairs);
                for i in 0..pairs {
                    let key = bytes.i32(start + 8 + 8 * i)?;
                    let offset = bytes.i32(start + 12 + 8 * i)? as i64;
                    cases.push((key, self.label(pc, pc as i64 + offset)?));
                }
                let size = start + 8 + 8 * pairs - at;
                return Ok((Instruction::LookupSwitch { default, cases }, size));
            }
            OpcodeKind::Return => Instruction::Return(opcode),
            OpcodeKind::ThrowException => Instruction::Throw,
            OpcodeKind::FieldAccess => Instruction::FieldAccess {
                opcode,
                field: self.entry(bytes.u2(at + 1)?, Constant::FIELD_REF)?,
            },
            OpcodeKind::Invoke => {
                let index = bytes.u2(at + 1)?;
                let method = match self.pool.tag(index)? {
                    Constant::INTERFACE_METHOD_REF => {
                        self.entry(index, Constant::INTERFACE_METHOD_REF)?
                    }
                    _ => self.entry(index, Constant::METHOD_REF)?,
                };
                let count = if opcode == Opcode::Invokeinterface {
                    bytes.u1(at + 3)?
                } else {
                    0
                };
                Instruction::Invoke {
                    opcode,
                    method,
                    count,
                }
            }
            OpcodeKind::InvokeDynamic => {
                Instruction::InvokeDynamic(self.entry(bytes.u2(at + 1)?, Constant::INVOKE_DYNAMIC)?)
            }
            OpcodeKind::NewObject => {
                Instruction::NewObject(self.entry(bytes.u2(at + 1)?, Constant::CLASS)?)
            }
            OpcodeKind::NewPrimitiveArray => {
                let code = bytes.u1(at + 1)?;
                let kind = TypeKind::from_newarray_code(code).ok_or_else(|| {
                    Error::malformed("Code", format!("newarray of unknown type {}", code))
                })?;
                Instruction::NewPrimitiveArray(kind)
            }
            OpcodeKind::NewReferenceArray => {
                Instruction::NewReferenceArray(self.entry(bytes.u2(at + 1)?, Constant::CLASS)?)
            }
            OpcodeKind::NewMultiArray => Instruction::NewMultiArray {
                class: self.entry(bytes.u2(at + 1)?, Constant::CLASS)?,
                dimensions: bytes.u1(at + 3)?,
            },
            OpcodeKind::TypeCheck => Instruction::TypeCheck {
                opcode,
                class: self.entry(bytes.u2(at + 1)?, Constant::CLASS)?,
            },
            OpcodeKind::ArrayLoad => Instruction::ArrayLoad(opcode),
            OpcodeKind::ArrayStore => Instruction::ArrayStore(opcode),
            OpcodeKind::Stack => Instruction::Stack(opcode),
            OpcodeKind::Operator => Instruction::Operator(opcode),
            OpcodeKind::Convert => Instruction::Convert(opcode),
            OpcodeKind::Monitor => Instruction::Monitor(opcode),
            OpcodeKind::Nop => Instruction::Nop,
            OpcodeKind::Constant => match opcode {
                Opcode::Bipush => Instruction::ConstantArgument {
                    opcode,
                    value: bytes.s1(at + 1)? as i16,
                },
                Opcode::Sipush => Instruction::ConstantArgument {
                    opcode,
                    value: bytes.s2(at + 1)?,
                },
                Opcode::Ldc => Instruction::ConstantLoad {
                    opcode,
                    constant: self.pool.pool_entry(bytes.u1(at + 1)? as u16)?,
                },
                Opcode::LdcW | Opcode::Ldc2W => Instruction::ConstantLoad {
                    opcode,
                    constant: self.pool.pool_entry(bytes.u2(at + 1)?)?,
                },
                _ => Instruction::ConstantIntrinsic(opcode),
            },
        };

        let size = opcode.size().ok_or(Error::BadOpcode {
            opcode: byte,
            offset: pc,
        })?;
        Ok((instruction, size))
    }

    fn wide_instruction(&mut self, pc: usize) -> Result<(Instruction, usize), Error> {
        let at = self.code_start + pc;
        let byte = self.bytes.u1(at + 1)?;
        let opcode = Opcode::wide_from_bytecode(byte).ok_or(Error::BadOpcode {
            opcode: byte,
            offset: pc + 1,
        })?;
        let slot = self.bytes.u2(at + 2)?;
        let instruction = match opcode.kind() {
            OpcodeKind::Load => Instruction::Load { opcode, slot },
            OpcodeKind::Store => Instruction::Store { opcode, slot },
            OpcodeKind::Increment => Instruction::Increment {
                opcode,
                slot,
                constant: self.bytes.s2(at + 4)?,
            },
            _ => Instruction::Ret { opcode, slot },
        };
        let size = opcode.size().unwrap_or(4);
        Ok((instruction, size))
    }
}

/// Decode a bound `Code` attribute into its elements
fn decode_code(
    reader: &Arc<ClassReader>,
    attribute: &AttributeRange,
) -> Result<Vec<CodeElement>, Error> {
    let layout = CodeLayout::scan(reader, attribute)?;
    let pool = reader.pool();
    let settings = reader.settings();
    let bytes = reader.reader();
    let code_length = layout.code.len();
    let owner = ((pool.id() & 0x7FFF_FFFF) << 32) | (attribute.payload.start as u64 & 0xFFFF_FFFF);
    let mut decoder = CodeDecoder {
        bytes,
        pool,
        code_start: layout.code.start,
        code_length,
        owner,
        referenced: vec![None; code_length + 1],
    };

    // Instructions
    let mut instructions = vec![];
    let mut starts = vec![false; code_length + 1];
    starts[code_length] = true;
    let mut pc = 0;
    while pc < code_length {
        let (instruction, size) = decoder.instruction(pc)?;
        if pc + size > code_length {
            return Err(Error::malformed(
                "Code",
                format!("instruction at offset {} runs past the end of the code", pc),
            ));
        }
        starts[pc] = true;
        instructions.push((pc, instruction));
        pc += size;
    }

    // Exception table
    let mut catches = Vec::with_capacity(layout.exception_count);
    for i in 0..layout.exception_count {
        let entry = layout.exception_table + 8 * i;
        let start = bytes.u2(entry)? as i64;
        let end = bytes.u2(entry + 2)? as i64;
        let handler = bytes.u2(entry + 4)? as i64;
        let catch_type = match bytes.u2(entry + 6)? {
            0 => None,
            index => Some(pool.typed_entry(index, Constant::CLASS)?),
        };
        catches.push(ExceptionCatch {
            handler: decoder.label(handler as usize, handler)?,
            start: decoder.label(start as usize, start)?,
            end: decoder.label(end as usize, end)?,
            catch_type,
        });
    }

    // Code attributes
    let mut lines: Vec<Vec<u16>> = vec![vec![]; code_length];
    let mut variables = vec![];
    let mut variable_types = vec![];
    let mut frames = None;
    let mut others = vec![];
    for code_attribute in &layout.attributes {
        let payload = code_attribute.payload.clone();
        match code_attribute.name.as_str() {
            "LineNumberTable" => {
                if settings.line_numbers == LineNumbers::Drop {
                    continue;
                }
                let count = bytes.u2(payload.start)? as usize;
                check_table_length("LineNumberTable", &payload, 4, count)?;
                for i in 0..count {
                    let entry = payload.start + 2 + 4 * i;
                    let pc = bytes.u2(entry)? as usize;
                    let line = bytes.u2(entry + 2)?;
                    if pc < code_length && starts[pc] {
                        lines[pc].push(line);
                    } else {
                        log::debug!("Dropping line number {} at bad offset {}", line, pc);
                    }
                }
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                if settings.debug_elements == DebugElements::Drop {
                    continue;
                }
                let count = bytes.u2(payload.start)? as usize;
                check_table_length(&code_attribute.name, &payload, 10, count)?;
                for i in 0..count {
                    let entry = payload.start + 2 + 10 * i;
                    let start_pc = bytes.u2(entry)? as i64;
                    let length = bytes.u2(entry + 2)? as i64;
                    let start = decoder.label(start_pc as usize, start_pc)?;
                    let end = decoder.label(start_pc as usize, start_pc + length)?;
                    let name = pool.typed_entry(bytes.u2(entry + 4)?, Constant::UTF8)?;
                    let descriptor = pool.typed_entry(bytes.u2(entry + 6)?, Constant::UTF8)?;
                    let slot = bytes.u2(entry + 8)?;
                    if code_attribute.name == "LocalVariableTable" {
                        variables.push(LocalVariable {
                            slot,
                            name,
                            descriptor,
                            start,
                            end,
                        });
                    } else {
                        variable_types.push(LocalVariableType {
                            slot,
                            name,
                            signature: descriptor,
                            start,
                            end,
                        });
                    }
                }
            }
            "StackMapTable" => {
                if settings.stack_maps == StackMaps::Drop || frames.is_some() {
                    continue;
                }
                let mut targets = vec![];
                let decoded = decode_frames(
                    bytes,
                    payload.start,
                    pool,
                    code_length as u32,
                    &mut |offset| {
                        targets.push(offset);
                        Label::new(owner, offset)
                    },
                )?;
                for target in targets {
                    decoder.label(target as usize, target as i64)?;
                }
                frames = Some(decoded);
            }
            _ => others.push(reader.bound_attribute(code_attribute)),
        }
    }

    // Everything referred to must be the start of an instruction (or the end of the code)
    for (target, from) in decoder.referenced.iter().enumerate() {
        if let Some(from) = from {
            if !starts[target] {
                return Err(Error::BadBranchTarget {
                    offset: *from,
                    target: target as i64,
                });
            }
        }
    }

    let mut elements = Vec::with_capacity(
        catches.len() + variables.len() + variable_types.len() + 2 * instructions.len() + 2,
    );
    elements.extend(catches.into_iter().map(CodeElement::ExceptionCatch));
    elements.extend(variables.into_iter().map(CodeElement::LocalVariable));
    elements.extend(variable_types.into_iter().map(CodeElement::LocalVariableType));
    for (pc, instruction) in instructions {
        if decoder.referenced[pc].is_some() {
            elements.push(CodeElement::LabelTarget(Label::new(owner, pc as u32)));
        }
        for line in &lines[pc] {
            elements.push(CodeElement::LineNumber(*line));
        }
        elements.push(CodeElement::Instruction(instruction));
    }
    elements.push(CodeElement::LabelTarget(Label::new(owner, code_length as u32)));
    if let Some(frames) = frames {
        elements.push(CodeElement::StackMapTable(frames));
    }
    elements.extend(others.into_iter().map(CodeElement::Attribute));
    log::trace!("Decoded {} code elements", elements.len());
    Ok(elements)
}

fn check_table_length(
    name: &str,
    payload: &Range<usize>,
    entry_size: usize,
    count: usize,
) -> Result<(), Error> {
    if payload.len() == 2 + entry_size * count {
        Ok(())
    } else {
        Err(Error::malformed(
            name,
            format!("{} entries do not fit in {} bytes", count, payload.len()),
        ))
    }
}
