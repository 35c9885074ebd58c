use super::{CatchBuilder, Instruction, Label, Opcode, TypeKind};
use crate::jvm::builder::CodeSink;
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{CodeElement, CompoundElement};
use crate::jvm::model::{CodeModel, MethodInfo};
use crate::jvm::transform::{ChainedSink, CodeTransform};
use crate::jvm::{Error, Settings};

/// Builder for method bodies
///
/// At its core, this just passes [`CodeElement`]s on to wherever the body is going. On top of
/// that, it provides structured scaffolding (blocks, `if`/`else`, `try`/`catch`) which takes care
/// of the labels and branches those constructs need.
///
/// ### Scopes
///
/// Every builder has an innermost scope, delimited by a start label and an end label. The
/// top-level scope spans the whole body. Each structured construct runs its handlers with a child
/// builder whose scope is the construct: for a block, the end label is the label that breaks out
/// of the block. Local slots handed out by [`CodeBuilder::allocate_local`] inside a child scope
/// are free again once the scope exits (the high-water mark is still what ends up in
/// `max_locals`).
///
/// ### Reachability
///
/// The builder tracks whether the current position can be reached by falling through from the
/// previous instruction. That is an approximation: binding any label makes the position
/// reachable again. It is only used to avoid emitting a `goto` after code that never falls
/// through (eg. a `then` branch ending in `return`).
pub struct CodeBuilder<'b> {
    pub(crate) sink: &'b mut dyn CodeSink,
    scope: Scope,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Scope {
    start: Label,
    end: Label,

    /// Instructions emitted through this scope (including nested scopes)
    instructions: usize,
}

impl<'b> CodeBuilder<'b> {
    /// Run `handler` on a fresh top-level builder, bracketed by the body's start and end labels
    pub(crate) fn build(
        sink: &'b mut dyn CodeSink,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let start = sink.new_label();
        let end = sink.new_label();
        let mut builder = CodeBuilder {
            sink,
            scope: Scope {
                start,
                end,
                instructions: 0,
            },
        };
        builder.label_target(start)?;
        handler(&mut builder)?;
        builder.label_target(end)?;
        Ok(())
    }

    /// Builder feeding a different sink, but in the same scope as an existing builder
    pub(crate) fn with_scope(sink: &'b mut dyn CodeSink, scope: Scope) -> CodeBuilder<'b> {
        CodeBuilder {
            sink,
            scope: Scope {
                instructions: 0,
                ..scope
            },
        }
    }

    pub(crate) fn scope(&self) -> Scope {
        self.scope
    }

    /// Add an element
    pub fn with(&mut self, element: impl Into<CodeElement>) -> Result<&mut Self, Error> {
        let element = element.into();
        if let CodeElement::Instruction(_) = element {
            self.scope.instructions += 1;
        }
        self.sink.accept(element)?;
        Ok(self)
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.sink.constant_pool()
    }

    pub fn settings(&self) -> &Settings {
        self.sink.settings()
    }

    /// Method whose body is being built
    pub fn method(&self) -> &MethodInfo {
        self.sink.method()
    }

    /// Slot of `this` (fails for static methods)
    pub fn receiver_slot(&self) -> Result<u16, Error> {
        self.method().receiver_slot()
    }

    /// Slot of a parameter, by its index in the method descriptor
    pub fn parameter_slot(&self, index: usize) -> Result<u16, Error> {
        self.method().parameter_slot(index)
    }

    /// Fresh label, not bound yet
    pub fn new_label(&mut self) -> Label {
        self.sink.new_label()
    }

    /// Fresh label, bound at the current position
    pub fn new_bound_label(&mut self) -> Result<Label, Error> {
        let label = self.new_label();
        self.label_target(label)?;
        Ok(label)
    }

    /// Bind a label at the current position
    pub fn label_target(&mut self, label: Label) -> Result<&mut Self, Error> {
        self.with(CodeElement::LabelTarget(label))
    }

    /// Allocate a local variable slot for a value of some kind
    pub fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        self.sink.allocate_local(kind.slot_size())
    }

    /// Start label of the innermost scope
    pub fn start_label(&self) -> Label {
        self.scope.start
    }

    /// End label of the innermost scope
    pub fn end_label(&self) -> Label {
        self.scope.end
    }

    /// Label which breaks out of the innermost scope
    pub fn break_label(&self) -> Label {
        self.scope.end
    }

    /// Can the current position be reached by falling through?
    pub fn is_reachable(&self) -> bool {
        self.sink.is_reachable()
    }

    /// Run a handler in a child scope `[start, end]`, returning how many instructions it emitted
    pub(super) fn child(
        &mut self,
        start: Label,
        end: Label,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<usize, Error> {
        let saved_local = self.sink.next_local();
        let mut child = CodeBuilder {
            sink: &mut *self.sink,
            scope: Scope {
                start,
                end,
                instructions: 0,
            },
        };
        handler(&mut child)?;
        let instructions = child.scope.instructions;
        self.scope.instructions += instructions;
        self.sink.restore_next_local(saved_local);
        Ok(instructions)
    }

    /// Nested block: `break_label()` inside the handler jumps to just after the block
    pub fn block(
        &mut self,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let break_label = self.new_label();
        let start = self.new_bound_label()?;
        self.child(start, break_label, handler)?;
        self.label_target(break_label)
    }

    /// Run `handler` only if the condition of `opcode` holds
    ///
    /// The condition is checked by branching over the block with the reversed opcode.
    pub fn if_then(
        &mut self,
        opcode: Opcode,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let reversed = reverse_condition(opcode)?;
        let break_label = self.new_label();
        self.with(Instruction::branch(reversed, break_label)?)?;
        let start = self.new_bound_label()?;
        self.child(start, break_label, handler)?;
        self.label_target(break_label)
    }

    /// Run `then_handler` if the condition of `opcode` holds, `else_handler` otherwise
    pub fn if_then_else(
        &mut self,
        opcode: Opcode,
        then_handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
        else_handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let reversed = reverse_condition(opcode)?;
        let else_label = self.new_label();
        let break_label = self.new_label();
        self.with(Instruction::branch(reversed, else_label)?)?;

        let then_start = self.new_bound_label()?;
        self.child(then_start, break_label, then_handler)?;
        if self.is_reachable() {
            self.with(Instruction::branch(Opcode::Goto, break_label)?)?;
        }

        self.label_target(else_label)?;
        self.child(else_label, break_label, else_handler)?;
        self.label_target(break_label)
    }

    /// Protected block, followed by its exception handlers
    ///
    /// The try body must emit at least one instruction. Handlers are registered on the
    /// [`CatchBuilder`] and their exception table entries appear in registration order.
    pub fn trying(
        &mut self,
        try_handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
        catches_handler: impl FnOnce(&mut CatchBuilder<'_, 'b>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let break_label = self.new_label();
        let try_end = self.new_label();
        let try_start = self.new_bound_label()?;
        if self.child(try_start, break_label, try_handler)? == 0 {
            return Err(Error::EmptyTryBlock);
        }
        let body_reachable = self.is_reachable();
        self.label_target(try_end)?;

        let mut catches = CatchBuilder::new(self, try_start, try_end, break_label, body_reachable);
        catches_handler(&mut catches)?;
        self.label_target(break_label)
    }

    /// Run `handler` with a builder whose elements go through `transform` before reaching this one
    pub fn transforming(
        &mut self,
        transform: &mut dyn CodeTransform,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        transform.at_start(self)?;
        let scope = self.scope;
        let mut sink = ChainedSink::new(&mut *transform, &mut *self);
        let mut inner = CodeBuilder::with_scope(&mut sink, scope);
        handler(&mut inner)?;
        let instructions = inner.scope.instructions;
        self.scope.instructions += instructions;
        transform.at_end(self)?;
        Ok(self)
    }

    /// Run a transform over the elements of a method body, feeding the results into this builder
    pub fn transform(
        &mut self,
        code: &CodeModel,
        transform: &mut dyn CodeTransform,
    ) -> Result<&mut Self, Error> {
        transform.at_start(self)?;
        code.for_each_element(&mut |element| transform.accept(self, element))?;
        transform.at_end(self)?;
        Ok(self)
    }
}

fn reverse_condition(opcode: Opcode) -> Result<Opcode, Error> {
    if !opcode.is_conditional_branch() {
        return Err(Error::NotConditionalBranch(opcode));
    }
    opcode.reverse_branch()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::builder::BufferedCodeSink;
    use crate::jvm::MethodAccessFlags;
    use std::sync::Arc;

    fn build_body(
        descriptor: &str,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<(Vec<CodeElement>, u16), Error> {
        let mut pool = ConstantPoolBuilder::new();
        let method = MethodInfo::new("f", descriptor, MethodAccessFlags::STATIC)?;
        let mut sink =
            BufferedCodeSink::new(&mut pool, Arc::new(Settings::default()), Arc::new(method));
        CodeBuilder::build(&mut sink, handler)?;
        let model = sink.into_model(None);
        Ok((model.elements()?, model.max_locals()?))
    }

    fn opcodes(elements: &[CodeElement]) -> Vec<Opcode> {
        elements
            .iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(instruction) => Some(instruction.opcode()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn if_then_branches_over_the_block() {
        let (elements, _) = build_body("(I)V", |code| {
            code.with(Instruction::load(TypeKind::Int, 0)?)?;
            code.if_then(Opcode::Iflt, |then| {
                then.with(Instruction::simple(Opcode::Nop)?)?;
                Ok(())
            })?;
            code.with(Instruction::simple(Opcode::Return)?)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&elements),
            vec![Opcode::Iload0, Opcode::Ifge, Opcode::Nop, Opcode::Return],
            "the reversed opcode guards the block"
        );
    }

    #[test]
    fn if_then_guard_is_the_negated_condition() {
        use Opcode::*;
        let guards = [
            (Ifeq, Ifne),
            (Ifne, Ifeq),
            (Iflt, Ifge),
            (Ifge, Iflt),
            (Ifgt, Ifle),
            (Ifle, Ifgt),
            (IfIcmpeq, IfIcmpne),
            (IfIcmpne, IfIcmpeq),
            (IfIcmplt, IfIcmpge),
            (IfIcmpge, IfIcmplt),
            (IfIcmpgt, IfIcmple),
            (IfIcmple, IfIcmpgt),
            (IfAcmpeq, IfAcmpne),
            (IfAcmpne, IfAcmpeq),
            (Ifnull, Ifnonnull),
            (Ifnonnull, Ifnull),
        ];
        for (condition, guard) in guards {
            let operands = if matches!(
                condition,
                IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne
            ) {
                2
            } else {
                1
            };
            let operand = if matches!(condition, IfAcmpeq | IfAcmpne | Ifnull | Ifnonnull) {
                AconstNull
            } else {
                Iconst0
            };
            let (elements, _) = build_body("()V", |code| {
                for _ in 0..operands {
                    code.with(Instruction::simple(operand)?)?;
                }
                code.if_then(condition, |then| {
                    then.with(Instruction::simple(Nop)?)?;
                    Ok(())
                })?;
                code.with(Instruction::simple(Return)?)?;
                Ok(())
            })
            .unwrap();
            assert_eq!(opcodes(&elements)[operands], guard, "guard of {:?}", condition);
        }
    }

    #[test]
    fn if_then_requires_a_conditional_branch() {
        let result = build_body("()V", |code| {
            code.if_then(Opcode::Goto, |_| Ok(()))?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::NotConditionalBranch(Opcode::Goto))));
    }

    #[test]
    fn if_then_else_skips_goto_after_return() {
        let (elements, _) = build_body("(I)I", |code| {
            code.with(Instruction::load(TypeKind::Int, 0)?)?;
            code.if_then_else(
                Opcode::Ifeq,
                |then| {
                    then.with(Instruction::int_constant(1))?;
                    then.with(Instruction::return_value(TypeKind::Int))?;
                    Ok(())
                },
                |otherwise| {
                    otherwise.with(Instruction::int_constant(2))?;
                    Ok(())
                },
            )?;
            code.with(Instruction::return_value(TypeKind::Int))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&elements),
            vec![
                Opcode::Iload0,
                Opcode::Ifne,
                Opcode::Iconst1,
                Opcode::Ireturn,
                Opcode::Iconst2,
                Opcode::Ireturn
            ]
        );
    }

    #[test]
    fn block_locals_are_reused() {
        let (_, max_locals) = build_body("(J)V", |code| {
            code.block(|inner| {
                assert_eq!(inner.allocate_local(TypeKind::Double)?, 2);
                Ok(())
            })?;
            assert_eq!(code.allocate_local(TypeKind::Int)?, 2, "block slots are freed");
            code.with(Instruction::simple(Opcode::Return)?)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(max_locals, 4);
    }

    #[test]
    fn empty_try_block_fails() {
        let result = build_body("()V", |code| {
            code.trying(|_| Ok(()), |catches| {
                catches.catching_all(|handler| {
                    handler.with(Instruction::simple(Opcode::Athrow)?)?;
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::EmptyTryBlock)));
    }

    #[test]
    fn break_label_leaves_the_block() {
        let (elements, _) = build_body("()V", |code| {
            code.block(|inner| {
                let exit = inner.break_label();
                inner.with(Instruction::branch(Opcode::Goto, exit)?)?;
                Ok(())
            })?;
            code.with(Instruction::simple(Opcode::Return)?)?;
            Ok(())
        })
        .unwrap();
        let goto_target = elements.iter().find_map(|element| match element {
            CodeElement::Instruction(Instruction::Branch { target, .. }) => Some(*target),
            _ => None,
        });
        let return_position = elements
            .iter()
            .position(|element| matches!(element, CodeElement::Instruction(Instruction::Return(_))))
            .unwrap();
        assert!(
            matches!(
                elements[return_position - 1],
                CodeElement::LabelTarget(label) if Some(label) == goto_target
            ),
            "break label is bound right after the block"
        );
    }
}
