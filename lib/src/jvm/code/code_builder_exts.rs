use super::{
    CodeBuilder, ExceptionCatch, Instruction, Label, LocalVariable, LocalVariableType, Opcode,
    TypeKind,
};
use crate::jvm::constants::{Constant, DynamicRef};
use crate::jvm::descriptors::{field_type_kind, require_class_name};
use crate::jvm::elements::CodeElement;
use crate::jvm::Error;

/// Convenience operations on top of [`CodeBuilder::with`]
///
/// These pick the right opcode (and constant pool entries) for what is being done, so callers
/// rarely need to name an [`Opcode`] directly.
pub trait CodeBuilderExts {
    /// Push a constant, using the most compact encoding
    ///
    /// `int`s use `iconst_<n>`, `bipush`, or `sipush` when they fit, and `long`/`float`/`double`
    /// use their `<t>const_<n>` forms for the few values that have one. Everything else is loaded
    /// from the constant pool.
    fn load_constant(&mut self, constant: Constant) -> Result<&mut Self, Error>;

    fn aconst_null(&mut self) -> Result<&mut Self, Error>;

    /// Load a local variable of some kind
    fn load_local(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error>;

    /// Store into a local variable of some kind
    fn store_local(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error>;

    /// Return a value of some kind (`Void` for a plain `return`)
    fn return_value(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;

    /// Convert the value on top of the stack
    ///
    /// Conversions to `byte`, `char`, and `short` from a non-`int` go through `int`. Converting a
    /// kind to itself emits nothing.
    fn conversion(&mut self, from: TypeKind, to: TypeKind) -> Result<&mut Self, Error>;

    fn get_field(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn put_field(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn get_static(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn put_static(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;

    /// Invoke a method (`is_interface` decides the kind of method reference)
    fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<&mut Self, Error>;

    fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str)
        -> Result<&mut Self, Error>;
    fn invoke_dynamic(&mut self, call_site: DynamicRef) -> Result<&mut Self, Error>;

    fn new_object(&mut self, class: &str) -> Result<&mut Self, Error>;

    /// New array of a primitive kind (`newarray`)
    fn new_primitive_array(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;

    /// New array of some class or array type (`anewarray`)
    fn new_reference_array(&mut self, class: &str) -> Result<&mut Self, Error>;

    /// New multi-dimensional array, from its array descriptor
    fn new_multi_array(&mut self, descriptor: &str, dimensions: u8) -> Result<&mut Self, Error>;

    fn checkcast(&mut self, class: &str) -> Result<&mut Self, Error>;
    fn instanceof(&mut self, class: &str) -> Result<&mut Self, Error>;
    fn iinc(&mut self, slot: u16, delta: i16) -> Result<&mut Self, Error>;
    fn athrow(&mut self) -> Result<&mut Self, Error>;
    fn arraylength(&mut self) -> Result<&mut Self, Error>;
    fn array_load(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;
    fn array_store(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;

    /// Pop a value of some kind (`pop2` for `long` and `double`)
    fn pop(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;

    /// Duplicate a value of some kind (`dup2` for `long` and `double`)
    fn dup(&mut self, kind: TypeKind) -> Result<&mut Self, Error>;
    fn swap(&mut self) -> Result<&mut Self, Error>;

    /// Arithmetic, bitwise, or comparison operator
    fn operator(&mut self, opcode: Opcode) -> Result<&mut Self, Error>;

    fn branch(&mut self, opcode: Opcode, target: Label) -> Result<&mut Self, Error>;
    fn goto_(&mut self, target: Label) -> Result<&mut Self, Error>;

    fn line_number(&mut self, line: u16) -> Result<&mut Self, Error>;
    fn local_variable(
        &mut self,
        slot: u16,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
    ) -> Result<&mut Self, Error>;
    fn local_variable_type(
        &mut self,
        slot: u16,
        name: &str,
        signature: &str,
        start: Label,
        end: Label,
    ) -> Result<&mut Self, Error>;

    /// Exception table entry for one class of exceptions
    fn exception_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        class: &str,
    ) -> Result<&mut Self, Error>;

    /// Exception table entry catching everything
    fn exception_catch_all(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
    ) -> Result<&mut Self, Error>;
}

impl<'b> CodeBuilderExts for CodeBuilder<'b> {
    fn load_constant(&mut self, constant: Constant) -> Result<&mut Self, Error> {
        let intrinsic = match &constant {
            Constant::Integer(value) => return self.with(Instruction::int_constant(*value)),
            Constant::Long(0) => Some(Opcode::Lconst0),
            Constant::Long(1) => Some(Opcode::Lconst1),
            Constant::Float(bits) if *bits == 0f32.to_bits() => Some(Opcode::Fconst0),
            Constant::Float(bits) if *bits == 1f32.to_bits() => Some(Opcode::Fconst1),
            Constant::Float(bits) if *bits == 2f32.to_bits() => Some(Opcode::Fconst2),
            Constant::Double(bits) if *bits == 0f64.to_bits() => Some(Opcode::Dconst0),
            Constant::Double(bits) if *bits == 1f64.to_bits() => Some(Opcode::Dconst1),
            _ => None,
        };
        match intrinsic {
            Some(opcode) => self.with(Instruction::ConstantIntrinsic(opcode)),
            None => {
                if !constant.is_loadable() {
                    return Err(Error::WrongOpcode {
                        opcode: Opcode::Ldc,
                        shape: "a load of a non-loadable constant",
                    });
                }
                let entry = self.constant_pool().constant_entry(constant)?;
                self.with(Instruction::constant_load(entry))
            }
        }
    }

    fn aconst_null(&mut self) -> Result<&mut Self, Error> {
        self.with(Instruction::ConstantIntrinsic(Opcode::AconstNull))
    }

    fn load_local(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error> {
        self.with(Instruction::load(kind, slot)?)
    }

    fn store_local(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error> {
        self.with(Instruction::store(kind, slot)?)
    }

    fn return_value(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        self.with(Instruction::return_value(kind))
    }

    fn conversion(&mut self, from: TypeKind, to: TypeKind) -> Result<&mut Self, Error> {
        use TypeKind::*;
        let illegal = Error::IllegalConversion { from, to };
        let narrowing = match to {
            Byte => Some(Opcode::I2b),
            Char => Some(Opcode::I2c),
            Short => Some(Opcode::I2s),
            _ => None,
        };
        let target = if narrowing.is_some() { Int } else { to };
        let widening = match (from.as_computational(), target) {
            (Int, Long) => Some(Opcode::I2l),
            (Int, Float) => Some(Opcode::I2f),
            (Int, Double) => Some(Opcode::I2d),
            (Long, Int) => Some(Opcode::L2i),
            (Long, Float) => Some(Opcode::L2f),
            (Long, Double) => Some(Opcode::L2d),
            (Float, Int) => Some(Opcode::F2i),
            (Float, Long) => Some(Opcode::F2l),
            (Float, Double) => Some(Opcode::F2d),
            (Double, Int) => Some(Opcode::D2i),
            (Double, Long) => Some(Opcode::D2l),
            (Double, Float) => Some(Opcode::D2f),
            (Int, Int) | (Long, Long) | (Float, Float) | (Double, Double) => None,
            _ => return Err(illegal),
        };
        if from == Boolean || to == Boolean {
            return Err(illegal);
        }

        if let Some(opcode) = widening {
            self.with(Instruction::Convert(opcode))?;
        }
        if let Some(opcode) = narrowing {
            if from != to {
                self.with(Instruction::Convert(opcode))?;
            }
        }
        Ok(self)
    }

    fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self, Error> {
        field_access(self, Opcode::Getfield, owner, name, descriptor)
    }

    fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self, Error> {
        field_access(self, Opcode::Putfield, owner, name, descriptor)
    }

    fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self, Error> {
        field_access(self, Opcode::Getstatic, owner, name, descriptor)
    }

    fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self, Error> {
        field_access(self, Opcode::Putstatic, owner, name, descriptor)
    }

    fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<&mut Self, Error> {
        require_class_name(owner)?;
        let pool = self.constant_pool();
        let method = if is_interface {
            pool.interface_method_ref_entry(owner, name, descriptor)?
        } else {
            pool.method_ref_entry(owner, name, descriptor)?
        };
        self.with(Instruction::invoke(opcode, method)?)
    }

    fn invoke_virtual(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self, Error> {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor, false)
    }

    fn invoke_static(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self, Error> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, false)
    }

    fn invoke_special(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self, Error> {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor, false)
    }

    fn invoke_interface(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self, Error> {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor, true)
    }

    fn invoke_dynamic(&mut self, call_site: DynamicRef) -> Result<&mut Self, Error> {
        let entry = self.constant_pool().invoke_dynamic_entry(call_site)?;
        self.with(Instruction::InvokeDynamic(entry))
    }

    fn new_object(&mut self, class: &str) -> Result<&mut Self, Error> {
        require_class_name(class)?;
        let entry = self.constant_pool().class_entry(class)?;
        self.with(Instruction::NewObject(entry))
    }

    fn new_primitive_array(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        if kind.newarray_code().is_none() {
            return Err(Error::WrongOpcode {
                opcode: Opcode::Newarray,
                shape: "an array of a non-primitive kind",
            });
        }
        self.with(Instruction::NewPrimitiveArray(kind))
    }

    fn new_reference_array(&mut self, class: &str) -> Result<&mut Self, Error> {
        require_class_name(class)?;
        let entry = self.constant_pool().class_entry(class)?;
        self.with(Instruction::NewReferenceArray(entry))
    }

    fn new_multi_array(&mut self, descriptor: &str, dimensions: u8) -> Result<&mut Self, Error> {
        require_class_name(descriptor)?;
        let depth = descriptor.bytes().take_while(|byte| *byte == b'[').count();
        if dimensions == 0 || depth < dimensions as usize {
            return Err(Error::BadDescriptor(descriptor.to_owned()));
        }
        let class = self.constant_pool().class_entry(descriptor)?;
        self.with(Instruction::NewMultiArray { class, dimensions })
    }

    fn checkcast(&mut self, class: &str) -> Result<&mut Self, Error> {
        type_check(self, Opcode::Checkcast, class)
    }

    fn instanceof(&mut self, class: &str) -> Result<&mut Self, Error> {
        type_check(self, Opcode::Instanceof, class)
    }

    fn iinc(&mut self, slot: u16, delta: i16) -> Result<&mut Self, Error> {
        self.with(Instruction::increment(slot, delta))
    }

    fn athrow(&mut self) -> Result<&mut Self, Error> {
        self.with(Instruction::Throw)
    }

    fn arraylength(&mut self) -> Result<&mut Self, Error> {
        self.with(Instruction::Operator(Opcode::Arraylength))
    }

    fn array_load(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        self.with(Instruction::ArrayLoad(Opcode::array_load(kind)?))
    }

    fn array_store(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        self.with(Instruction::ArrayStore(Opcode::array_store(kind)?))
    }

    fn pop(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        let opcode = if kind.slot_size() == 2 {
            Opcode::Pop2
        } else {
            Opcode::Pop
        };
        self.with(Instruction::Stack(opcode))
    }

    fn dup(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        let opcode = if kind.slot_size() == 2 {
            Opcode::Dup2
        } else {
            Opcode::Dup
        };
        self.with(Instruction::Stack(opcode))
    }

    fn swap(&mut self) -> Result<&mut Self, Error> {
        self.with(Instruction::Stack(Opcode::Swap))
    }

    fn operator(&mut self, opcode: Opcode) -> Result<&mut Self, Error> {
        if opcode.kind() != super::OpcodeKind::Operator {
            return Err(Error::WrongOpcode {
                opcode,
                shape: "an operator",
            });
        }
        self.with(Instruction::Operator(opcode))
    }

    fn branch(&mut self, opcode: Opcode, target: Label) -> Result<&mut Self, Error> {
        self.with(Instruction::branch(opcode, target)?)
    }

    fn goto_(&mut self, target: Label) -> Result<&mut Self, Error> {
        self.with(Instruction::branch(Opcode::Goto, target)?)
    }

    fn line_number(&mut self, line: u16) -> Result<&mut Self, Error> {
        self.with(CodeElement::LineNumber(line))
    }

    fn local_variable(
        &mut self,
        slot: u16,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
    ) -> Result<&mut Self, Error> {
        field_type_kind(descriptor)?;
        let name = self.constant_pool().utf8_entry(name)?;
        let descriptor = self.constant_pool().utf8_entry(descriptor)?;
        self.with(CodeElement::LocalVariable(LocalVariable {
            slot,
            name,
            descriptor,
            start,
            end,
        }))
    }

    fn local_variable_type(
        &mut self,
        slot: u16,
        name: &str,
        signature: &str,
        start: Label,
        end: Label,
    ) -> Result<&mut Self, Error> {
        let name = self.constant_pool().utf8_entry(name)?;
        let signature = self.constant_pool().utf8_entry(signature)?;
        self.with(CodeElement::LocalVariableType(LocalVariableType {
            slot,
            name,
            signature,
            start,
            end,
        }))
    }

    fn exception_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        class: &str,
    ) -> Result<&mut Self, Error> {
        require_class_name(class)?;
        let catch_type = self.constant_pool().class_entry(class)?;
        self.with(CodeElement::ExceptionCatch(ExceptionCatch {
            handler,
            start,
            end,
            catch_type: Some(catch_type),
        }))
    }

    fn exception_catch_all(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
    ) -> Result<&mut Self, Error> {
        self.with(CodeElement::ExceptionCatch(ExceptionCatch {
            handler,
            start,
            end,
            catch_type: None,
        }))
    }
}

fn field_access<'c, 'b>(
    code: &'c mut CodeBuilder<'b>,
    opcode: Opcode,
    owner: &str,
    name: &str,
    descriptor: &str,
) -> Result<&'c mut CodeBuilder<'b>, Error> {
    require_class_name(owner)?;
    field_type_kind(descriptor)?;
    let field = code
        .constant_pool()
        .field_ref_entry(owner, name, descriptor)?;
    code.with(Instruction::field_access(opcode, field)?)
}

fn type_check<'c, 'b>(
    code: &'c mut CodeBuilder<'b>,
    opcode: Opcode,
    class: &str,
) -> Result<&'c mut CodeBuilder<'b>, Error> {
    require_class_name(class)?;
    let class = code.constant_pool().class_entry(class)?;
    code.with(Instruction::type_check(opcode, class)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::builder::BufferedCodeSink;
    use crate::jvm::constants::ConstantPoolBuilder;
    use crate::jvm::elements::CompoundElement;
    use crate::jvm::model::MethodInfo;
    use crate::jvm::{MethodAccessFlags, Settings};
    use std::sync::Arc;

    fn emitted(
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<Vec<Instruction>, Error> {
        let mut pool = ConstantPoolBuilder::new();
        let method = MethodInfo::new("f", "()V", MethodAccessFlags::STATIC)?;
        let mut sink =
            BufferedCodeSink::new(&mut pool, Arc::new(Settings::default()), Arc::new(method));
        CodeBuilder::build(&mut sink, handler)?;
        Ok(sink
            .into_model(None)
            .elements()?
            .into_iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(instruction) => Some(instruction),
                _ => None,
            })
            .collect())
    }

    fn opcodes(instructions: &[Instruction]) -> Vec<Opcode> {
        instructions.iter().map(Instruction::opcode).collect()
    }

    #[test]
    fn constants_use_compact_forms() {
        let instructions = emitted(|code| {
            code.load_constant(Constant::Integer(5))?
                .load_constant(Constant::Integer(100))?
                .load_constant(Constant::Integer(1000))?
                .load_constant(Constant::Integer(100_000))?
                .load_constant(Constant::Long(1))?
                .load_constant(Constant::Long(7))?
                .load_constant(Constant::float(2.0))?
                .load_constant(Constant::float(-0.0))?
                .load_constant(Constant::String(String::from("hi")))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&instructions),
            vec![
                Opcode::Iconst5,
                Opcode::Bipush,
                Opcode::Sipush,
                Opcode::Ldc,
                Opcode::Lconst1,
                Opcode::Ldc2W,
                Opcode::Fconst2,
                Opcode::Ldc,
                Opcode::Ldc
            ],
            "negative zero has no fconst form"
        );
    }

    #[test]
    fn conversions() {
        let instructions = emitted(|code| {
            code.conversion(TypeKind::Long, TypeKind::Byte)?
                .conversion(TypeKind::Char, TypeKind::Double)?
                .conversion(TypeKind::Int, TypeKind::Int)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&instructions),
            vec![Opcode::L2i, Opcode::I2b, Opcode::I2d]
        );

        let result = emitted(|code| {
            code.conversion(TypeKind::Reference, TypeKind::Int)?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(Error::IllegalConversion {
                from: TypeKind::Reference,
                to: TypeKind::Int
            })
        ));
    }

    #[test]
    fn class_operands_reject_primitives() {
        let result = emitted(|code| {
            code.new_reference_array("I")?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::PrimitiveWhereClassRequired(name)) if name == "I"));

        let instructions = emitted(|code| {
            code.new_reference_array("[I")?.new_multi_array("[[Ljava/lang/String;", 2)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&instructions),
            vec![Opcode::Anewarray, Opcode::Multianewarray]
        );
    }

    #[test]
    fn invokeinterface_count_comes_from_the_descriptor() {
        let instructions = emitted(|code| {
            code.invoke_interface("java/util/Map", "put", "(Ljava/lang/Object;J)V")?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            instructions[0],
            Instruction::Invoke {
                opcode: Opcode::Invokeinterface,
                count: 4,
                ..
            }
        ));
    }
}
