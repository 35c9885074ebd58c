use super::{Label, Opcode, OpcodeKind, TypeKind};
use crate::jvm::constants::{Constant, PoolEntry};
use crate::jvm::Error;

/// A single bytecode instruction
///
/// Every variant carries the exact opcode it was (or will be) encoded with, including the
/// `wide`-prefixed and `_w` forms. That is what lets an unmodified method body re-encode to the
/// same bytes. When an operand no longer fits the opcode (eg. a local slot above 255 with a plain
/// `iload`), the writer upgrades the encoding rather than failing.
///
/// Constructors check that the opcode has the right [`OpcodeKind`] for the shape of instruction
/// they build, returning [`Error::WrongOpcode`] otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Load { opcode: Opcode, slot: u16 },
    Store { opcode: Opcode, slot: u16 },
    Increment { opcode: Opcode, slot: u16, constant: i16 },
    Branch { opcode: Opcode, target: Label },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch { default: Label, cases: Vec<(i32, Label)> },
    Return(Opcode),
    Throw,
    FieldAccess { opcode: Opcode, field: PoolEntry },

    /// Method invocation (`count` is the `invokeinterface` argument count byte, `0` otherwise)
    Invoke {
        opcode: Opcode,
        method: PoolEntry,
        count: u8,
    },
    InvokeDynamic(PoolEntry),
    NewObject(PoolEntry),
    NewPrimitiveArray(TypeKind),
    NewReferenceArray(PoolEntry),
    NewMultiArray { class: PoolEntry, dimensions: u8 },
    TypeCheck { opcode: Opcode, class: PoolEntry },
    ArrayLoad(Opcode),
    ArrayStore(Opcode),
    Stack(Opcode),
    Operator(Opcode),
    Convert(Opcode),
    Monitor(Opcode),
    Nop,

    /// Constant baked into the opcode (eg. `iconst_2`, `aconst_null`)
    ConstantIntrinsic(Opcode),

    /// `bipush` or `sipush`
    ConstantArgument { opcode: Opcode, value: i16 },

    /// `ldc`, `ldc_w`, or `ldc2_w`
    ConstantLoad { opcode: Opcode, constant: PoolEntry },

    Jsr { opcode: Opcode, target: Label },
    Ret { opcode: Opcode, slot: u16 },
}

fn expect_kind(opcode: Opcode, kind: OpcodeKind, shape: &'static str) -> Result<(), Error> {
    if opcode.kind() == kind {
        Ok(())
    } else {
        Err(Error::WrongOpcode { opcode, shape })
    }
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Load { opcode, .. }
            | Instruction::Store { opcode, .. }
            | Instruction::Increment { opcode, .. }
            | Instruction::Branch { opcode, .. }
            | Instruction::FieldAccess { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::TypeCheck { opcode, .. }
            | Instruction::ConstantArgument { opcode, .. }
            | Instruction::ConstantLoad { opcode, .. }
            | Instruction::Jsr { opcode, .. }
            | Instruction::Ret { opcode, .. } => *opcode,
            Instruction::Return(opcode)
            | Instruction::ArrayLoad(opcode)
            | Instruction::ArrayStore(opcode)
            | Instruction::Stack(opcode)
            | Instruction::Operator(opcode)
            | Instruction::Convert(opcode)
            | Instruction::Monitor(opcode)
            | Instruction::ConstantIntrinsic(opcode) => *opcode,
            Instruction::TableSwitch { .. } => Opcode::Tableswitch,
            Instruction::LookupSwitch { .. } => Opcode::Lookupswitch,
            Instruction::Throw => Opcode::Athrow,
            Instruction::InvokeDynamic(_) => Opcode::Invokedynamic,
            Instruction::NewObject(_) => Opcode::New,
            Instruction::NewPrimitiveArray(_) => Opcode::Newarray,
            Instruction::NewReferenceArray(_) => Opcode::Anewarray,
            Instruction::NewMultiArray { .. } => Opcode::Multianewarray,
            Instruction::Nop => Opcode::Nop,
        }
    }

    /// Does control never fall through to the next instruction?
    pub fn is_unconditional_branch(&self) -> bool {
        self.opcode().is_unconditional_branch()
    }

    /// Labels this instruction may jump to
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } | Instruction::Jsr { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Instruction::LookupSwitch { default, cases } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, label)| *label))
                .collect(),
            _ => vec![],
        }
    }

    /// Load from a local, using the most compact encoding
    pub fn load(kind: TypeKind, slot: u16) -> Result<Instruction, Error> {
        Ok(Instruction::Load {
            opcode: Opcode::load(kind, slot)?,
            slot,
        })
    }

    /// Store to a local, using the most compact encoding
    pub fn store(kind: TypeKind, slot: u16) -> Result<Instruction, Error> {
        Ok(Instruction::Store {
            opcode: Opcode::store(kind, slot)?,
            slot,
        })
    }

    pub fn increment(slot: u16, constant: i16) -> Instruction {
        let opcode = if slot > 255 || i8::try_from(constant).is_err() {
            Opcode::IincW
        } else {
            Opcode::Iinc
        };
        Instruction::Increment {
            opcode,
            slot,
            constant,
        }
    }

    /// Branch to a label (`goto` or a conditional branch)
    pub fn branch(opcode: Opcode, target: Label) -> Result<Instruction, Error> {
        expect_kind(opcode, OpcodeKind::Branch, "a branch")?;
        Ok(Instruction::Branch { opcode, target })
    }

    pub fn return_value(kind: TypeKind) -> Instruction {
        Instruction::Return(Opcode::return_of(kind))
    }

    pub fn field_access(opcode: Opcode, field: PoolEntry) -> Result<Instruction, Error> {
        expect_kind(opcode, OpcodeKind::FieldAccess, "a field access")?;
        Ok(Instruction::FieldAccess { opcode, field })
    }

    /// Method invocation (the `invokeinterface` count is computed from the descriptor)
    pub fn invoke(opcode: Opcode, method: PoolEntry) -> Result<Instruction, Error> {
        expect_kind(opcode, OpcodeKind::Invoke, "an invocation")?;
        let count = if opcode == Opcode::Invokeinterface {
            let descriptor = &method.as_member()?.descriptor;
            let parameters = crate::jvm::MethodDescriptor::parse(descriptor)?;
            1 + parameters.parameter_slots() as u8
        } else {
            0
        };
        Ok(Instruction::Invoke {
            opcode,
            method,
            count,
        })
    }

    pub fn type_check(opcode: Opcode, class: PoolEntry) -> Result<Instruction, Error> {
        expect_kind(opcode, OpcodeKind::TypeCheck, "a type check")?;
        Ok(Instruction::TypeCheck { opcode, class })
    }

    /// Instruction without operands, picked by its opcode kind
    pub fn simple(opcode: Opcode) -> Result<Instruction, Error> {
        Ok(match opcode.kind() {
            OpcodeKind::ArrayLoad => Instruction::ArrayLoad(opcode),
            OpcodeKind::ArrayStore => Instruction::ArrayStore(opcode),
            OpcodeKind::Stack => Instruction::Stack(opcode),
            OpcodeKind::Operator => Instruction::Operator(opcode),
            OpcodeKind::Convert => Instruction::Convert(opcode),
            OpcodeKind::Monitor => Instruction::Monitor(opcode),
            OpcodeKind::Return => Instruction::Return(opcode),
            OpcodeKind::ThrowException => Instruction::Throw,
            OpcodeKind::Nop => Instruction::Nop,
            OpcodeKind::Constant if opcode.size() == Some(1) => {
                Instruction::ConstantIntrinsic(opcode)
            }
            _ => {
                return Err(Error::WrongOpcode {
                    opcode,
                    shape: "an instruction without operands",
                })
            }
        })
    }

    /// Load a constant from the pool (`ldc2_w` for wide constants, `ldc` otherwise)
    pub fn constant_load(constant: PoolEntry) -> Instruction {
        let opcode = if constant.constant().is_wide() {
            Opcode::Ldc2W
        } else {
            Opcode::Ldc
        };
        Instruction::ConstantLoad { opcode, constant }
    }

    /// Most compact instruction that pushes an `int`
    pub fn int_constant(value: i32) -> Instruction {
        match value {
            -1 => Instruction::ConstantIntrinsic(Opcode::IconstM1),
            0 => Instruction::ConstantIntrinsic(Opcode::Iconst0),
            1 => Instruction::ConstantIntrinsic(Opcode::Iconst1),
            2 => Instruction::ConstantIntrinsic(Opcode::Iconst2),
            3 => Instruction::ConstantIntrinsic(Opcode::Iconst3),
            4 => Instruction::ConstantIntrinsic(Opcode::Iconst4),
            5 => Instruction::ConstantIntrinsic(Opcode::Iconst5),
            -128..=127 => Instruction::ConstantArgument {
                opcode: Opcode::Bipush,
                value: value as i16,
            },
            -32768..=32767 => Instruction::ConstantArgument {
                opcode: Opcode::Sipush,
                value: value as i16,
            },
            _ => Instruction::constant_load(PoolEntry::new(Constant::Integer(value))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelArena, LabelGenerator};

    #[test]
    fn shapes_are_checked() {
        let label = LabelArena::new().fresh_label();
        assert!(Instruction::branch(Opcode::Ifnull, label).is_ok());
        assert!(matches!(
            Instruction::branch(Opcode::Iadd, label),
            Err(Error::WrongOpcode { opcode: Opcode::Iadd, .. })
        ));
        assert!(Instruction::simple(Opcode::Ldc).is_err());
        assert_eq!(
            Instruction::simple(Opcode::Dup2X1).unwrap(),
            Instruction::Stack(Opcode::Dup2X1)
        );
    }

    #[test]
    fn compact_int_constants() {
        assert_eq!(
            Instruction::int_constant(4),
            Instruction::ConstantIntrinsic(Opcode::Iconst4)
        );
        assert_eq!(Instruction::int_constant(-100).opcode(), Opcode::Bipush);
        assert_eq!(Instruction::int_constant(1000).opcode(), Opcode::Sipush);
        assert_eq!(Instruction::int_constant(1 << 20).opcode(), Opcode::Ldc);
        assert_eq!(Instruction::increment(3, 200).opcode(), Opcode::IincW);
        assert_eq!(Instruction::increment(3, -1).opcode(), Opcode::Iinc);
    }

    #[test]
    fn interface_invoke_count() {
        let method = PoolEntry::new(Constant::InterfaceMethodRef(
            crate::jvm::constants::MemberRef::new("java/util/List", "set", "(ILjava/lang/Object;)Ljava/lang/Object;"),
        ));
        match Instruction::invoke(Opcode::Invokeinterface, method).unwrap() {
            Instruction::Invoke { count, .. } => assert_eq!(count, 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
