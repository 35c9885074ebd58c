//! Operand stack depth analysis
//!
//! This is not verification: types are never tracked, only how many stack slots every instruction
//! pops and pushes. Every instruction is visited once, with the height it is first reached at.
//! For well-formed code that is the only possible height anyway.

use super::{Instruction, Opcode, TypeKind};
use crate::jvm::constants::Constant;
use crate::jvm::descriptors::{field_type_kind, MethodDescriptor};
use crate::jvm::Error;

/// Net change in stack height (in slots) caused by an instruction
///
/// For `jsr`, this is the change seen when execution returns (zero): the return address only
/// lives on the stack at the subroutine.
pub(crate) fn stack_effect(instruction: &Instruction) -> Result<i32, Error> {
    use Opcode::*;
    let size = |kind: TypeKind| kind.slot_size() as i32;
    Ok(match instruction {
        Instruction::Load { opcode, .. } => size(opcode.primary_type_kind()),
        Instruction::Store { opcode, .. } => -size(opcode.primary_type_kind()),
        Instruction::Increment { .. } | Instruction::Nop => 0,
        Instruction::Branch { opcode, .. } => match opcode {
            Goto | GotoW => 0,
            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => -1,
            _ => -2,
        },
        Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => -1,
        Instruction::Return(opcode) => -size(opcode.primary_type_kind()),
        Instruction::Throw => -1,
        Instruction::FieldAccess { opcode, field } => {
            let kind = field_type_kind(&field.as_member()?.descriptor)?;
            match opcode {
                Getstatic => size(kind),
                Putstatic => -size(kind),
                Getfield => size(kind) - 1,
                _ => -size(kind) - 1,
            }
        }
        Instruction::Invoke { opcode, method, .. } => {
            let descriptor = MethodDescriptor::parse(&method.as_member()?.descriptor)?;
            let receiver = if *opcode == Invokestatic { 0 } else { 1 };
            size(descriptor.return_type) - descriptor.parameter_slots() as i32 - receiver
        }
        Instruction::InvokeDynamic(call_site) => {
            let descriptor = match call_site.constant() {
                Constant::InvokeDynamic(dynamic) => MethodDescriptor::parse(&dynamic.descriptor)?,
                other => {
                    return Err(Error::UnexpectedConstant {
                        index: call_site.origin().map_or(0, |(_, index)| index),
                        expected: Constant::tag_name(Constant::INVOKE_DYNAMIC),
                        found: Constant::tag_name(other.tag()),
                    })
                }
            };
            size(descriptor.return_type) - descriptor.parameter_slots() as i32
        }
        Instruction::NewObject(_) => 1,
        Instruction::NewPrimitiveArray(_)
        | Instruction::NewReferenceArray(_)
        | Instruction::TypeCheck { .. } => 0,
        Instruction::NewMultiArray { dimensions, .. } => 1 - *dimensions as i32,
        Instruction::ArrayLoad(opcode) => size(opcode.primary_type_kind()) - 2,
        Instruction::ArrayStore(opcode) => -size(opcode.primary_type_kind()) - 2,
        Instruction::Stack(opcode) => match opcode {
            Pop => -1,
            Pop2 => -2,
            Dup | DupX1 | DupX2 => 1,
            Dup2 | Dup2X1 | Dup2X2 => 2,
            _ => 0,
        },
        Instruction::Operator(opcode) => match opcode {
            Ineg | Lneg | Fneg | Dneg | Arraylength => 0,
            Lshl | Lshr | Lushr => -1,
            Lcmp | Dcmpl | Dcmpg => -3,
            Fcmpl | Fcmpg => -1,
            other => -size(other.primary_type_kind()),
        },
        Instruction::Convert(opcode) => match opcode {
            I2l | I2d | F2l | F2d => 1,
            L2i | L2f | D2i | D2f => -1,
            _ => 0,
        },
        Instruction::Monitor(_) => -1,
        Instruction::ConstantIntrinsic(opcode) => size(opcode.primary_type_kind()),
        Instruction::ConstantArgument { .. } => 1,
        Instruction::ConstantLoad { constant, .. } => {
            if constant.constant().is_wide() {
                2
            } else {
                1
            }
        }
        Instruction::Jsr { .. } | Instruction::Ret { .. } => 0,
    })
}

/// How control leaves one item of code
#[derive(Clone, Debug, Default)]
pub(crate) struct Flow {
    /// Net change in stack height
    pub delta: i32,

    /// Does execution continue with the next item?
    pub falls_through: bool,

    /// Items that can be jumped to (with the height after `delta`)
    pub jumps: Vec<usize>,

    /// Items called as subroutines (entered with one extra slot for the return address)
    pub subroutines: Vec<usize>,
}

/// Largest stack height reached
///
/// `handlers` are the items that start exception handlers, which are entered with just the
/// exception on the stack.
pub(crate) fn max_stack(flows: &[Flow], handlers: &[usize]) -> u16 {
    let mut heights: Vec<Option<i32>> = vec![None; flows.len()];
    let mut worklist: Vec<(usize, i32)> = vec![(0, 0)];
    worklist.extend(handlers.iter().map(|handler| (*handler, 1)));
    let mut max = 0;

    while let Some((index, height)) = worklist.pop() {
        let seen = match heights.get_mut(index) {
            Some(seen) => seen,
            None => continue,
        };
        if seen.is_some() {
            continue;
        }
        *seen = Some(height);

        let flow = &flows[index];
        let after = (height + flow.delta).max(0);
        max = max.max(height).max(after);
        worklist.extend(flow.jumps.iter().map(|target| (*target, after)));
        for subroutine in &flow.subroutines {
            max = max.max(after + 1);
            worklist.push((*subroutine, after + 1));
        }
        if flow.falls_through {
            worklist.push((index + 1, after));
        }
    }
    u16::try_from(max).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::constants::{MemberRef, PoolEntry};

    fn straight(delta: i32) -> Flow {
        Flow {
            delta,
            falls_through: true,
            ..Flow::default()
        }
    }

    #[test]
    fn invocation_effects() {
        let method = PoolEntry::new(Constant::MethodRef(MemberRef::new(
            "java/lang/Math",
            "max",
            "(JJ)J",
        )));
        let invoke = Instruction::invoke(Opcode::Invokestatic, method.clone()).unwrap();
        assert_eq!(stack_effect(&invoke).unwrap(), -2);
        let invoke = Instruction::invoke(Opcode::Invokevirtual, method).unwrap();
        assert_eq!(stack_effect(&invoke).unwrap(), -3);

        let field = PoolEntry::new(Constant::FieldRef(MemberRef::new("A", "d", "D")));
        let put = Instruction::field_access(Opcode::Putfield, field).unwrap();
        assert_eq!(stack_effect(&put).unwrap(), -3);
    }

    #[test]
    fn operator_effects() {
        assert_eq!(stack_effect(&Instruction::Operator(Opcode::Ladd)).unwrap(), -2);
        assert_eq!(stack_effect(&Instruction::Operator(Opcode::Lshl)).unwrap(), -1);
        assert_eq!(stack_effect(&Instruction::Operator(Opcode::Dcmpg)).unwrap(), -3);
        assert_eq!(stack_effect(&Instruction::Convert(Opcode::D2i)).unwrap(), -1);
        assert_eq!(stack_effect(&Instruction::ArrayStore(Opcode::Lastore)).unwrap(), -4);
    }

    #[test]
    fn branches_and_handlers() {
        // 0: push 2, 1: ifeq -> 3, 2: push 1 then return, 3: return
        let flows = vec![
            straight(2),
            Flow {
                delta: -1,
                falls_through: true,
                jumps: vec![3],
                ..Flow::default()
            },
            Flow {
                delta: 1,
                falls_through: false,
                ..Flow::default()
            },
            Flow::default(),
        ];
        assert_eq!(max_stack(&flows, &[]), 2);

        // Handler pushing two more on top of the exception
        let handler = vec![straight(0), straight(2)];
        assert_eq!(max_stack(&handler, &[1]), 3);
    }
}
