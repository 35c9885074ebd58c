use super::jump_encoding::{lay_out, Layout, LayoutItem, SIGNED_16BIT_JUMP_RANGE};
use super::stack_depth::{max_stack, stack_effect, Flow};
use super::stack_map::encode_frames;
use super::{
    ExceptionCatch, Instruction, Label, LocalVariable, LocalVariableType, Opcode, OpcodeKind,
    StackMapFrame, WIDE_PREFIX,
};
use crate::jvm::attributes::{write_attribute, AttributeList};
use crate::jvm::binary::{ByteWriter, Serialize};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::descriptors::{field_type_kind, MethodDescriptor};
use crate::jvm::elements::CodeElement;
use crate::jvm::errors::u16_count;
use crate::jvm::{DeadLabels, DebugElements, Error, LineNumbers, Settings, StackMaps};
use std::collections::HashMap;
use std::ops::{Range, RangeInclusive};

/// What is known about a method body before it gets re-encoded
///
/// When code comes from a parsed method, its original `max_stack`/`max_locals` are kept as lower
/// bounds and its attributes are written back in their original order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CodeHints {
    pub max_stack: u16,
    pub max_locals: u16,

    /// Names of the code attributes, in the order they should be written
    pub attribute_order: Vec<String>,
}

enum ItemKind {
    /// Instruction whose encoding doesn't depend on where it ends up
    Plain(Range<usize>),
    Branch { opcode: Opcode, target: Label },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch { default: Label, cases: Vec<(i32, Label)> },
}

struct Item {
    kind: ItemKind,
    delta: i32,
    falls_through: bool,
}

/// Lowers code elements to the bytes of a `Code` attribute
///
/// Instructions are encoded as they arrive, except for the ones that refer to labels: those stay
/// symbolic until every label is bound and the final layout is known. Labels from any source are
/// accepted, and are mapped to positions in the item list as they get bound.
pub(crate) struct CodeWriter<'a> {
    pool: &'a mut ConstantPoolBuilder,
    settings: &'a Settings,

    /// Encoding of all plain instructions, back to back
    bytes: ByteWriter,
    items: Vec<Item>,

    /// Item index each label is bound in front of
    bound: HashMap<Label, usize>,

    line_numbers: Vec<(usize, u16)>,
    local_variables: Vec<LocalVariable>,
    local_variable_types: Vec<LocalVariableType>,
    catches: Vec<ExceptionCatch>,
    stack_map: Option<Vec<StackMapFrame>>,
    attributes: AttributeList,
    max_locals: u16,
}

impl<'a> CodeWriter<'a> {
    pub fn new(pool: &'a mut ConstantPoolBuilder, settings: &'a Settings) -> CodeWriter<'a> {
        CodeWriter {
            pool,
            settings,
            bytes: ByteWriter::new(),
            items: vec![],
            bound: HashMap::new(),
            line_numbers: vec![],
            local_variables: vec![],
            local_variable_types: vec![],
            catches: vec![],
            stack_map: None,
            attributes: AttributeList::new(),
            max_locals: 0,
        }
    }

    pub fn accept(&mut self, element: CodeElement) -> Result<(), Error> {
        match element {
            CodeElement::Instruction(instruction) => self.push_instruction(instruction)?,
            CodeElement::LabelTarget(label) => {
                if self.bound.insert(label, self.items.len()).is_some() {
                    return Err(Error::LabelAlreadyBound(label));
                }
            }
            CodeElement::LineNumber(line) => {
                if self.settings.line_numbers == LineNumbers::Pass {
                    self.line_numbers.push((self.items.len(), line));
                }
            }
            CodeElement::LocalVariable(variable) => {
                let size = field_type_kind(variable.descriptor.as_utf8()?)?.slot_size();
                self.use_locals(variable.slot, size);
                if self.settings.debug_elements == DebugElements::Pass {
                    self.local_variables.push(variable);
                }
            }
            CodeElement::LocalVariableType(variable) => {
                if self.settings.debug_elements == DebugElements::Pass {
                    self.local_variable_types.push(variable);
                }
            }
            CodeElement::ExceptionCatch(catch) => self.catches.push(catch),
            CodeElement::StackMapTable(frames) => {
                if self.settings.stack_maps == StackMaps::Keep {
                    self.stack_map = Some(frames);
                }
            }
            CodeElement::Attribute(attribute) => {
                write_attribute(&attribute, self.pool, self.settings, &mut self.attributes)?
            }
        }
        Ok(())
    }

    fn use_locals(&mut self, slot: u16, size: u16) {
        self.max_locals = self.max_locals.max(slot.saturating_add(size));
    }

    fn push_instruction(&mut self, instruction: Instruction) -> Result<(), Error> {
        let delta = stack_effect(&instruction)?;
        let falls_through = !instruction.is_unconditional_branch();
        let kind = match instruction {
            Instruction::Branch { opcode, target } | Instruction::Jsr { opcode, target } => {
                ItemKind::Branch { opcode, target }
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                if high < low || (high as i64 - low as i64 + 1) != targets.len() as i64 {
                    return Err(Error::malformed(
                        "Code",
                        format!("tableswitch {}..={} has {} targets", low, high, targets.len()),
                    ));
                }
                ItemKind::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                }
            }
            Instruction::LookupSwitch { default, mut cases } => {
                cases.sort_by_key(|(key, _)| *key);
                ItemKind::LookupSwitch { default, cases }
            }
            other => {
                let start = self.bytes.position();
                self.encode_plain(&other)?;
                ItemKind::Plain(start..self.bytes.position())
            }
        };
        self.items.push(Item {
            kind,
            delta,
            falls_through,
        });
        Ok(())
    }

    /// Encode a load, store, or `ret`, upgrading to the `wide` form if the slot needs it
    fn encode_local(&mut self, opcode: Opcode, slot: u16) -> Result<(), Error> {
        let kind = opcode.primary_type_kind();
        let opcode = match opcode.intrinsic_slot() {
            Some(intrinsic) if intrinsic != slot => match opcode.kind() {
                OpcodeKind::Load => Opcode::load(kind, slot)?,
                _ => Opcode::store(kind, slot)?,
            },
            _ => opcode,
        };
        let width = match opcode.kind() {
            OpcodeKind::DiscontinuedRet => 1,
            _ => kind.slot_size(),
        };
        self.use_locals(slot, width);

        if opcode.intrinsic_slot().is_some() {
            self.bytes.write_u1(opcode.bytecode() as u32);
        } else if opcode.is_wide() || slot > 255 {
            self.bytes.write_u1(WIDE_PREFIX as u32);
            self.bytes.write_u1(opcode.bytecode() as u32);
            slot.serialize(&mut self.bytes);
        } else {
            self.bytes.write_u1(opcode.bytecode() as u32);
            self.bytes.write_u1(slot as u32);
        }
        Ok(())
    }

    fn encode_plain(&mut self, instruction: &Instruction) -> Result<(), Error> {
        match instruction {
            Instruction::Load { opcode, slot }
            | Instruction::Store { opcode, slot }
            | Instruction::Ret { opcode, slot } => self.encode_local(*opcode, *slot)?,
            Instruction::Increment {
                opcode,
                slot,
                constant,
            } => {
                self.use_locals(*slot, 1);
                let narrow = i8::try_from(*constant).ok().filter(|_| *slot <= 255);
                match narrow {
                    Some(constant) if !opcode.is_wide() => {
                        self.bytes.write_u1(Opcode::Iinc.bytecode() as u32);
                        self.bytes.write_u1(*slot as u32);
                        self.bytes.write_u1(constant as u8 as u32);
                    }
                    _ => {
                        self.bytes.write_u1(WIDE_PREFIX as u32);
                        self.bytes.write_u1(Opcode::Iinc.bytecode() as u32);
                        slot.serialize(&mut self.bytes);
                        self.bytes.write_u2(*constant as u16 as u32);
                    }
                }
            }
            Instruction::FieldAccess { opcode, field: entry }
            | Instruction::TypeCheck {
                opcode,
                class: entry,
            } => {
                let index = self.pool.index_of(entry)?;
                self.bytes.write_u1(opcode.bytecode() as u32);
                index.serialize(&mut self.bytes);
            }
            Instruction::Invoke {
                opcode,
                method,
                count,
            } => {
                let index = self.pool.index_of(method)?;
                self.bytes.write_u1(opcode.bytecode() as u32);
                index.serialize(&mut self.bytes);
                if *opcode == Opcode::Invokeinterface {
                    let count = match count {
                        0 => {
                            let descriptor = MethodDescriptor::parse(&method.as_member()?.descriptor)?;
                            1 + descriptor.parameter_slots() as u32
                        }
                        count => *count as u32,
                    };
                    self.bytes.write_u1(count);
                    self.bytes.write_u1(0);
                }
            }
            Instruction::InvokeDynamic(call_site) => {
                let index = self.pool.index_of(call_site)?;
                self.bytes.write_u1(Opcode::Invokedynamic.bytecode() as u32);
                index.serialize(&mut self.bytes);
                self.bytes.write_u2(0);
            }
            Instruction::NewObject(class) | Instruction::NewReferenceArray(class) => {
                let index = self.pool.index_of(class)?;
                self.bytes.write_u1(instruction.opcode().bytecode() as u32);
                index.serialize(&mut self.bytes);
            }
            Instruction::NewPrimitiveArray(kind) => {
                let code = kind.newarray_code().ok_or(Error::WrongOpcode {
                    opcode: Opcode::Newarray,
                    shape: "an array of references or void",
                })?;
                self.bytes.write_u1(Opcode::Newarray.bytecode() as u32);
                self.bytes.write_u1(code as u32);
            }
            Instruction::NewMultiArray { class, dimensions } => {
                let index = self.pool.index_of(class)?;
                self.bytes.write_u1(Opcode::Multianewarray.bytecode() as u32);
                index.serialize(&mut self.bytes);
                self.bytes.write_u1(*dimensions as u32);
            }
            Instruction::ConstantArgument { opcode, value } => {
                self.bytes.write_u1(opcode.bytecode() as u32);
                if *opcode == Opcode::Bipush {
                    let byte = i8::try_from(*value).map_err(|_| Error::OperandOverflow {
                        what: "bipush",
                        value: *value as i64,
                    })?;
                    self.bytes.write_u1(byte as u8 as u32);
                } else {
                    self.bytes.write_u2(*value as u16 as u32);
                }
            }
            Instruction::ConstantLoad { opcode, constant } => {
                let index = self.pool.index_of(constant)?;
                let opcode = if constant.constant().is_wide() {
                    Opcode::Ldc2W
                } else if *opcode == Opcode::Ldc && index > 255 {
                    Opcode::LdcW
                } else if *opcode == Opcode::Ldc2W {
                    Opcode::LdcW
                } else {
                    *opcode
                };
                self.bytes.write_u1(opcode.bytecode() as u32);
                if opcode == Opcode::Ldc {
                    self.bytes.write_u1(index as u32);
                } else {
                    index.serialize(&mut self.bytes);
                }
            }
            Instruction::Throw
            | Instruction::Nop
            | Instruction::Return(_)
            | Instruction::ArrayLoad(_)
            | Instruction::ArrayStore(_)
            | Instruction::Stack(_)
            | Instruction::Operator(_)
            | Instruction::Convert(_)
            | Instruction::Monitor(_)
            | Instruction::ConstantIntrinsic(_) => {
                self.bytes.write_u1(instruction.opcode().bytecode() as u32)
            }
            Instruction::Branch { .. }
            | Instruction::Jsr { .. }
            | Instruction::TableSwitch { .. }
            | Instruction::LookupSwitch { .. } => {
                unreachable!("label-referencing instructions are laid out separately")
            }
        }
        Ok(())
    }

    fn position_of(&self, label: Label) -> Result<usize, Error> {
        self.bound
            .get(&label)
            .copied()
            .ok_or(Error::UnboundLabel(label))
    }

    /// Keep a pseudo-instruction only if all its labels are bound (subject to the dead label
    /// policy)
    fn keep_range(&self, labels: &[Label], what: &str) -> Result<bool, Error> {
        match labels.iter().find(|label| !self.bound.contains_key(label)) {
            None => Ok(true),
            Some(label) if self.settings.dead_labels == DeadLabels::Drop => {
                log::debug!("Dropping {} with unbound label {:?}", what, label);
                Ok(false)
            }
            Some(label) => Err(Error::UnboundLabel(*label)),
        }
    }

    fn layout_items(&self) -> Result<Vec<LayoutItem>, Error> {
        self.items
            .iter()
            .map(|item| {
                Ok(match &item.kind {
                    ItemKind::Plain(range) => LayoutItem::Fixed(range.len()),
                    ItemKind::Branch { opcode, target } => LayoutItem::Branch {
                        opcode: *opcode,
                        target: self.position_of(*target)?,
                    },
                    ItemKind::TableSwitch {
                        default, targets, ..
                    } => {
                        self.position_of(*default)?;
                        for target in targets {
                            self.position_of(*target)?;
                        }
                        LayoutItem::TableSwitch {
                            targets: targets.len(),
                        }
                    }
                    ItemKind::LookupSwitch { default, cases } => {
                        self.position_of(*default)?;
                        for (_, target) in cases {
                            self.position_of(*target)?;
                        }
                        LayoutItem::LookupSwitch { pairs: cases.len() }
                    }
                })
            })
            .collect()
    }

    /// Finish the method body, producing the full `Code` attribute (name and length included)
    ///
    /// `initial_locals` is the number of slots taken up by the receiver and parameters.
    pub fn finish(
        mut self,
        initial_locals: u16,
        hints: Option<&CodeHints>,
    ) -> Result<Vec<u8>, Error> {
        self.finish_with_range(initial_locals, hints, &SIGNED_16BIT_JUMP_RANGE)
    }

    fn finish_with_range(
        &mut self,
        initial_locals: u16,
        hints: Option<&CodeHints>,
        small_jump_range: &RangeInclusive<i64>,
    ) -> Result<Vec<u8>, Error> {
        // Ranges with dead labels are dropped before anything gets laid out
        let catches = std::mem::take(&mut self.catches);
        let mut kept_catches = vec![];
        for catch in catches {
            if self.keep_range(&[catch.start, catch.end, catch.handler], "exception catch")? {
                kept_catches.push(catch);
            }
        }
        let variables = std::mem::take(&mut self.local_variables);
        let mut kept_variables = vec![];
        for variable in variables {
            if self.keep_range(&[variable.start, variable.end], "local variable")? {
                kept_variables.push(variable);
            }
        }
        let variable_types = std::mem::take(&mut self.local_variable_types);
        let mut kept_variable_types = vec![];
        for variable in variable_types {
            if self.keep_range(&[variable.start, variable.end], "local variable type")? {
                kept_variable_types.push(variable);
            }
        }

        let layout = lay_out(&self.layout_items()?, self.settings.short_jumps, small_jump_range)?;
        let code = self.emit_code(&layout)?;
        let code_length = code.len();
        let bound = &self.bound;
        let offset_of = |label: Label| -> Result<usize, Error> {
            let position = bound.get(&label).ok_or(Error::UnboundLabel(label))?;
            Ok(layout.offsets[*position])
        };

        // Exception table
        let mut exception_table = ByteWriter::new();
        let mut exception_count: u16 = 0;
        let mut handlers = vec![];
        for catch in &kept_catches {
            let (start, end) = (offset_of(catch.start)?, offset_of(catch.end)?);
            if start == end {
                log::debug!("Dropping empty exception range at offset {}", start);
                continue;
            }
            if start > end {
                return Err(Error::malformed("Code", "exception range ends before it starts"));
            }
            handlers.push(bound[&catch.handler]);
            (start as u16).serialize(&mut exception_table);
            (end as u16).serialize(&mut exception_table);
            (offset_of(catch.handler)? as u16).serialize(&mut exception_table);
            self.pool
                .index_of_opt(catch.catch_type.as_ref())?
                .serialize(&mut exception_table);
            exception_count += 1;
        }

        // Frame sizes
        let flows: Vec<Flow> = self
            .items
            .iter()
            .map(|item| self.flow(item))
            .collect::<Result<_, Error>>()?;
        let hinted_stack = hints.map_or(0, |hints| hints.max_stack);
        let hinted_locals = hints.map_or(0, |hints| hints.max_locals);
        let max_stack = max_stack(&flows, &handlers).max(hinted_stack);
        let max_locals = self.max_locals.max(initial_locals).max(hinted_locals);

        // Generated attributes
        let mut attributes = AttributeList::new();
        if !self.line_numbers.is_empty() {
            let mut body = ByteWriter::new();
            let lines: Vec<(usize, u16)> = self
                .line_numbers
                .iter()
                .map(|(position, line)| (layout.offsets[*position], *line))
                .filter(|(offset, _)| *offset < code_length)
                .collect();
            u16_count("line numbers", lines.len())?.serialize(&mut body);
            for (offset, line) in lines {
                (offset as u16).serialize(&mut body);
                line.serialize(&mut body);
            }
            push_generated(self.pool, &mut attributes, "LineNumberTable", body)?;
        }
        if !kept_variables.is_empty() {
            let mut body = ByteWriter::new();
            u16_count("local variables", kept_variables.len())?.serialize(&mut body);
            for variable in &kept_variables {
                let range = variable_range(offset_of(variable.start)?, offset_of(variable.end)?)?;
                range.0.serialize(&mut body);
                range.1.serialize(&mut body);
                self.pool.index_of(&variable.name)?.serialize(&mut body);
                self.pool.index_of(&variable.descriptor)?.serialize(&mut body);
                variable.slot.serialize(&mut body);
            }
            push_generated(self.pool, &mut attributes, "LocalVariableTable", body)?;
        }
        if !kept_variable_types.is_empty() {
            let mut body = ByteWriter::new();
            u16_count("local variable types", kept_variable_types.len())?.serialize(&mut body);
            for variable in &kept_variable_types {
                let range = variable_range(offset_of(variable.start)?, offset_of(variable.end)?)?;
                range.0.serialize(&mut body);
                range.1.serialize(&mut body);
                self.pool.index_of(&variable.name)?.serialize(&mut body);
                self.pool.index_of(&variable.signature)?.serialize(&mut body);
                variable.slot.serialize(&mut body);
            }
            push_generated(self.pool, &mut attributes, "LocalVariableTypeTable", body)?;
        }
        if let Some(frames) = self.stack_map.take() {
            let mut body = ByteWriter::new();
            let frame_offset = |label: Label| -> Result<u32, Error> { Ok(offset_of(label)? as u32) };
            encode_frames(&frames, self.pool, &frame_offset, &mut body)?;
            push_generated(self.pool, &mut attributes, "StackMapTable", body)?;
        }
        attributes.append(std::mem::take(&mut self.attributes));
        if let Some(hints) = hints.filter(|hints| !hints.attribute_order.is_empty()) {
            attributes.sort_by_name_key(|name| {
                hints
                    .attribute_order
                    .iter()
                    .position(|original| original == name)
                    .unwrap_or(usize::MAX)
            });
        }

        // `Code` attribute itself
        let mut writer = ByteWriter::with_capacity(code_length + 32);
        self.pool.intern_utf8("Code")?.serialize(&mut writer);
        let length = writer.begin_length();
        max_stack.serialize(&mut writer);
        max_locals.serialize(&mut writer);
        (code_length as u32).serialize(&mut writer);
        writer.write_bytes(&code);
        exception_count.serialize(&mut writer);
        writer.write_bytes(exception_table.as_bytes());
        attributes.write(&mut writer)?;
        writer.end_length(length);
        Ok(writer.into_bytes())
    }

    fn flow(&self, item: &Item) -> Result<Flow, Error> {
        let mut flow = Flow {
            delta: item.delta,
            falls_through: item.falls_through,
            ..Flow::default()
        };
        match &item.kind {
            ItemKind::Plain(_) => (),
            ItemKind::Branch { opcode, target } => {
                let target = self.position_of(*target)?;
                if matches!(opcode, Opcode::Jsr | Opcode::JsrW) {
                    flow.subroutines.push(target);
                } else {
                    flow.jumps.push(target);
                }
            }
            ItemKind::TableSwitch {
                default, targets, ..
            } => {
                flow.jumps.push(self.position_of(*default)?);
                for target in targets {
                    flow.jumps.push(self.position_of(*target)?);
                }
            }
            ItemKind::LookupSwitch { default, cases } => {
                flow.jumps.push(self.position_of(*default)?);
                for (_, target) in cases {
                    flow.jumps.push(self.position_of(*target)?);
                }
            }
        }
        Ok(flow)
    }

    fn emit_code(&self, layout: &Layout) -> Result<Vec<u8>, Error> {
        let total = layout.offsets[self.items.len()];
        let mut code = ByteWriter::with_capacity(total);
        let relative = |from: usize, label: Label| -> Result<u32, Error> {
            let to = layout.offsets[self.position_of(label)?];
            Ok((to as i64 - from as i64) as i32 as u32)
        };

        for (index, item) in self.items.iter().enumerate() {
            let offset = layout.offsets[index];
            match &item.kind {
                ItemKind::Plain(range) => {
                    code.write_bytes(&self.bytes.as_bytes()[range.clone()]);
                }
                ItemKind::Branch { opcode, target } => {
                    let distance = relative(offset, *target)?;
                    match (opcode, layout.widened[index]) {
                        (Opcode::GotoW | Opcode::JsrW, _) => {
                            code.write_u1(opcode.bytecode() as u32);
                            code.write_u4(distance);
                        }
                        (Opcode::Goto, true) | (Opcode::Jsr, true) => {
                            let wide = if *opcode == Opcode::Goto {
                                Opcode::GotoW
                            } else {
                                Opcode::JsrW
                            };
                            code.write_u1(wide.bytecode() as u32);
                            code.write_u4(distance);
                        }
                        (_, true) => {
                            code.write_u1(opcode.reverse_branch()?.bytecode() as u32);
                            code.write_u2(8);
                            code.write_u1(Opcode::GotoW.bytecode() as u32);
                            code.write_u4(relative(offset + 3, *target)?);
                        }
                        (_, false) => {
                            code.write_u1(opcode.bytecode() as u32);
                            code.write_u2(distance as i32 as i16 as u16 as u32);
                        }
                    }
                }
                ItemKind::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                } => {
                    code.write_u1(Opcode::Tableswitch.bytecode() as u32);
                    write_padding(&mut code, offset);
                    code.write_u4(relative(offset, *default)?);
                    code.write_u4(*low as u32);
                    code.write_u4(*high as u32);
                    for target in targets {
                        code.write_u4(relative(offset, *target)?);
                    }
                }
                ItemKind::LookupSwitch { default, cases } => {
                    code.write_u1(Opcode::Lookupswitch.bytecode() as u32);
                    write_padding(&mut code, offset);
                    code.write_u4(relative(offset, *default)?);
                    code.write_u4(cases.len() as u32);
                    for (key, target) in cases {
                        code.write_u4(*key as u32);
                        code.write_u4(relative(offset, *target)?);
                    }
                }
            }
        }
        Ok(code.into_bytes())
    }
}

fn push_generated(
    pool: &mut ConstantPoolBuilder,
    attributes: &mut AttributeList,
    name: &str,
    body: ByteWriter,
) -> Result<(), Error> {
    let mut writer = ByteWriter::new();
    crate::jvm::attributes::encode_raw(name, body.as_bytes(), pool, &mut writer)?;
    attributes.push(name, true, writer.into_bytes());
    Ok(())
}

fn write_padding(code: &mut ByteWriter, offset: usize) {
    for _ in 0..super::jump_encoding::switch_padding(offset) {
        code.write_u1(0);
    }
}

/// Start and length of a local variable range
fn variable_range(start: usize, end: usize) -> Result<(u16, u16), Error> {
    if end < start {
        return Err(Error::malformed(
            "LocalVariableTable",
            "variable range ends before it starts",
        ));
    }
    Ok((start as u16, (end - start) as u16))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelArena, LabelGenerator, TypeKind};
    use crate::jvm::ShortJumps;

    fn parts(code: &[u8]) -> (u16, u16, &[u8]) {
        // name(2) length(4) max_stack(2) max_locals(2) code_length(4)
        let max_stack = u16::from_be_bytes([code[6], code[7]]);
        let max_locals = u16::from_be_bytes([code[8], code[9]]);
        let length = u32::from_be_bytes([code[10], code[11], code[12], code[13]]) as usize;
        (max_stack, max_locals, &code[14..14 + length])
    }

    #[test]
    fn simple_body() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        writer
            .accept(CodeElement::Instruction(Instruction::load(TypeKind::Long, 1).unwrap()))
            .unwrap();
        writer
            .accept(CodeElement::Instruction(Instruction::return_value(TypeKind::Long)))
            .unwrap();
        let bytes = writer.finish(3, None).unwrap();
        let (max_stack, max_locals, code) = parts(&bytes);
        assert_eq!((max_stack, max_locals), (2, 3));
        assert_eq!(code, &[0x1f, 0xad]);
    }

    #[test]
    fn wide_locals_are_upgraded() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        writer
            .accept(CodeElement::Instruction(Instruction::Load {
                opcode: Opcode::Iload,
                slot: 300,
            }))
            .unwrap();
        writer
            .accept(CodeElement::Instruction(Instruction::Return(Opcode::Ireturn)))
            .unwrap();
        let bytes = writer.finish(0, None).unwrap();
        let (_, max_locals, code) = parts(&bytes);
        assert_eq!(max_locals, 301);
        assert_eq!(code, &[0xc4, 0x15, 0x01, 0x2c, 0xac]);
    }

    #[test]
    fn labels_are_bound_once() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        let label = LabelArena::new().fresh_label();
        writer.accept(CodeElement::LabelTarget(label)).unwrap();
        assert!(matches!(
            writer.accept(CodeElement::LabelTarget(label)),
            Err(Error::LabelAlreadyBound(_))
        ));
    }

    #[test]
    fn unbound_branch_targets_fail() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        let label = LabelArena::new().fresh_label();
        writer
            .accept(CodeElement::Instruction(Instruction::branch(Opcode::Goto, label).unwrap()))
            .unwrap();
        assert!(matches!(writer.finish(0, None), Err(Error::UnboundLabel(_))));
    }

    #[test]
    fn dead_exception_ranges() {
        let mut labels = LabelArena::new();
        let (start, end, handler) = (labels.fresh_label(), labels.fresh_label(), labels.fresh_label());
        let elements = || {
            vec![
                CodeElement::ExceptionCatch(ExceptionCatch {
                    handler,
                    start,
                    end,
                    catch_type: None,
                }),
                CodeElement::LabelTarget(start),
                CodeElement::Instruction(Instruction::Nop),
                CodeElement::LabelTarget(end),
                CodeElement::Instruction(Instruction::Return(Opcode::Return)),
            ]
        };

        let mut settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        for element in elements() {
            writer.accept(element).unwrap();
        }
        assert!(matches!(writer.finish(0, None), Err(Error::UnboundLabel(_))));

        settings.dead_labels = DeadLabels::Drop;
        let mut writer = CodeWriter::new(&mut pool, &settings);
        for element in elements() {
            writer.accept(element).unwrap();
        }
        let bytes = writer.finish(0, None).unwrap();
        let (_, _, code) = parts(&bytes);
        assert_eq!(code, &[0x00, 0xb1]);
        // exception table is empty
        assert_eq!(&bytes[16..18], &[0, 0]);
    }

    #[test]
    fn exception_table_layout() {
        let mut labels = LabelArena::new();
        let (start, end, handler) = (labels.fresh_label(), labels.fresh_label(), labels.fresh_label());
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        let elements = vec![
            CodeElement::ExceptionCatch(ExceptionCatch {
                handler,
                start,
                end,
                catch_type: None,
            }),
            CodeElement::LabelTarget(start),
            CodeElement::Instruction(Instruction::Nop),
            CodeElement::LabelTarget(end),
            CodeElement::Instruction(Instruction::Return(Opcode::Return)),
            CodeElement::LabelTarget(handler),
            CodeElement::Instruction(Instruction::Throw),
        ];
        for element in elements {
            writer.accept(element).unwrap();
        }
        let bytes = writer.finish(0, None).unwrap();
        let (max_stack, _, code) = parts(&bytes);
        assert_eq!(max_stack, 1);
        assert_eq!(code, &[0x00, 0xb1, 0xbf]);

        // u2 count, then start, end, handler, and catch type, then no attributes
        assert_eq!(
            &bytes[17..],
            &[0, 1, 0, 0, 0, 1, 0, 2, 0, 0, 0, 0]
        );
        let length = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
        assert_eq!(length, bytes.len() - 6);
    }

    #[test]
    fn widened_conditional_branch() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut writer = CodeWriter::new(&mut pool, &settings);
        let target = LabelArena::new().fresh_label();
        let elements = vec![
            CodeElement::Instruction(Instruction::int_constant(0)),
            CodeElement::Instruction(Instruction::branch(Opcode::Ifeq, target).unwrap()),
            CodeElement::Instruction(Instruction::Nop),
            CodeElement::Instruction(Instruction::Nop),
            CodeElement::LabelTarget(target),
            CodeElement::Instruction(Instruction::Return(Opcode::Return)),
        ];
        for element in elements {
            writer.accept(element).unwrap();
        }
        let bytes = writer
            .finish_with_range(0, None, &RangeInclusive::new(-2, 2))
            .unwrap();
        let (max_stack, _, code) = parts(&bytes);
        assert_eq!(max_stack, 1);
        // iconst_0; ifne +8; goto_w +7 (to the return); nop; nop; return
        assert_eq!(
            code,
            &[0x03, 0x9a, 0, 8, 0xc8, 0, 0, 0, 7, 0x00, 0x00, 0xb1]
        );

        let strict = Settings {
            short_jumps: ShortJumps::Fail,
            ..Settings::default()
        };
        let mut writer = CodeWriter::new(&mut pool, &strict);
        writer
            .accept(CodeElement::Instruction(Instruction::branch(Opcode::Goto, target).unwrap()))
            .unwrap();
        writer.accept(CodeElement::Instruction(Instruction::Nop)).unwrap();
        writer.accept(CodeElement::Instruction(Instruction::Nop)).unwrap();
        writer.accept(CodeElement::LabelTarget(target)).unwrap();
        assert!(matches!(
            writer.finish_with_range(0, None, &RangeInclusive::new(-2, 2)),
            Err(Error::ShortJumpOverflow { .. })
        ));
    }
}
