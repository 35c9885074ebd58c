use super::{CodeBuilder, ExceptionCatch, Instruction, Label, Opcode};
use crate::jvm::constants::PoolEntry;
use crate::jvm::descriptors::require_class_name;
use crate::jvm::elements::CodeElement;
use crate::jvm::Error;

/// Registers the exception handlers of a [`CodeBuilder::trying`] block
///
/// Each clause catches a set of exception types (or everything, for a catch-all) and no two
/// clauses may catch the same type. The handler code is emitted right away, one handler after
/// the other. Whatever comes right before a handler (the try body or the previous handler)
/// jumps past the whole `try`/`catch` if it completes normally; the last one falls through.
pub struct CatchBuilder<'a, 'b> {
    code: &'a mut CodeBuilder<'b>,
    try_start: Label,
    try_end: Label,
    break_label: Label,
    caught: Vec<String>,
    catch_all: bool,
    falls_through: bool,
}

impl<'a, 'b> CatchBuilder<'a, 'b> {
    pub(super) fn new(
        code: &'a mut CodeBuilder<'b>,
        try_start: Label,
        try_end: Label,
        break_label: Label,
        falls_through: bool,
    ) -> CatchBuilder<'a, 'b> {
        CatchBuilder {
            code,
            try_start,
            try_end,
            break_label,
            caught: vec![],
            catch_all: false,
            falls_through,
        }
    }

    /// Handle exceptions of one class (by internal name)
    pub fn catching(
        &mut self,
        exception: &str,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.catching_multi(&[exception], handler)
    }

    /// Handle exceptions of any of several classes with the same handler
    ///
    /// An empty set of classes is a catch-all.
    pub fn catching_multi(
        &mut self,
        exceptions: &[&str],
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        if exceptions.is_empty() {
            return self.catching_all(handler);
        }
        for (i, exception) in exceptions.iter().enumerate() {
            require_class_name(exception)?;
            if self.caught.iter().any(|caught| caught == exception)
                || exceptions[..i].contains(exception)
            {
                return Err(Error::DuplicateCatchType((*exception).to_owned()));
            }
        }
        self.caught
            .extend(exceptions.iter().map(|exception| (*exception).to_owned()));

        let mut catch_types = Vec::with_capacity(exceptions.len());
        for exception in exceptions {
            catch_types.push(Some(self.code.constant_pool().class_entry(*exception)?));
        }
        self.clause(catch_types, handler)
    }

    /// Handle every exception (at most one catch-all per `try`)
    pub fn catching_all(
        &mut self,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        if self.catch_all {
            return Err(Error::DuplicateCatchAll);
        }
        self.catch_all = true;
        self.clause(vec![None], handler)
    }

    fn clause(
        &mut self,
        catch_types: Vec<Option<PoolEntry>>,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        if self.falls_through {
            self.code
                .with(Instruction::branch(Opcode::Goto, self.break_label)?)?;
        }

        let handler_label = self.code.new_label();
        for catch_type in catch_types {
            self.code.with(CodeElement::ExceptionCatch(ExceptionCatch {
                handler: handler_label,
                start: self.try_start,
                end: self.try_end,
                catch_type,
            }))?;
        }

        self.code.label_target(handler_label)?;
        self.code.child(handler_label, self.break_label, handler)?;
        self.falls_through = self.code.is_reachable();
        Ok(self)
    }
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

    fn build_catches(
        handler: impl FnOnce(&mut CatchBuilder<'_, '_>) -> Result<(), Error>,
    ) -> Result<Vec<CodeElement>, Error> {
        let mut pool = ConstantPoolBuilder::new();
        let method = MethodInfo::new("f", "()V", MethodAccessFlags::STATIC)?;
        let mut sink =
            BufferedCodeSink::new(&mut pool, Arc::new(Settings::default()), Arc::new(method));
        CodeBuilder::build(&mut sink, |code| {
            code.trying(
                |body| {
                    body.with(Instruction::simple(Opcode::Nop)?)?;
                    Ok(())
                },
                handler,
            )?;
            code.with(Instruction::simple(Opcode::Return)?)?;
            Ok(())
        })?;
        sink.into_model(None).elements()
    }

    fn pop_handler(code: &mut CodeBuilder<'_>) -> Result<(), Error> {
        code.with(Instruction::simple(Opcode::Pop)?)?;
        Ok(())
    }

    #[test]
    fn catch_types_are_exclusive() {
        let result = build_catches(|catches| {
            catches.catching("java/lang/Exception", pop_handler)?;
            catches.catching_multi(
                &["java/lang/Error", "java/lang/Exception"],
                pop_handler,
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::DuplicateCatchType(name)) if name == "java/lang/Exception"));

        let result = build_catches(|catches| {
            catches.catching_all(pop_handler)?;
            catches.catching_all(pop_handler)?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::DuplicateCatchAll)));
    }

    #[test]
    fn catches_keep_registration_order() {
        let elements = build_catches(|catches| {
            catches.catching_multi(&["java/lang/Error", "java/lang/RuntimeException"], pop_handler)?;
            catches.catching_all(pop_handler)?;
            Ok(())
        })
        .unwrap();
        let catch_types: Vec<Option<String>> = elements
            .iter()
            .filter_map(|element| match element {
                CodeElement::ExceptionCatch(catch) => Some(
                    catch
                        .catch_type
                        .as_ref()
                        .map(|entry| entry.as_class().unwrap().to_owned()),
                ),
                _ => None,
            })
            .collect();
        assert_eq!(
            catch_types,
            vec![
                Some(String::from("java/lang/Error")),
                Some(String::from("java/lang/RuntimeException")),
                None
            ]
        );
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
    fn only_code_followed_by_a_handler_jumps_past_the_catches() {
        let single = build_catches(|catches| {
            catches.catching_all(pop_handler)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&single),
            vec![Opcode::Nop, Opcode::Goto, Opcode::Pop, Opcode::Return]
        );

        let double = build_catches(|catches| {
            catches.catching("java/lang/Error", pop_handler)?;
            catches.catching_all(pop_handler)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&double),
            vec![
                Opcode::Nop,
                Opcode::Goto,
                Opcode::Pop,
                Opcode::Goto,
                Opcode::Pop,
                Opcode::Return
            ]
        );

        let none = build_catches(|_| Ok(())).unwrap();
        assert_eq!(opcodes(&none), vec![Opcode::Nop, Opcode::Return]);
    }

    #[test]
    fn handlers_which_do_not_complete_normally_skip_the_jump() {
        let elements = build_catches(|catches| {
            catches.catching("java/lang/Error", |code| {
                code.with(Instruction::simple(Opcode::Athrow)?)?;
                Ok(())
            })?;
            catches.catching_all(pop_handler)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            opcodes(&elements),
            vec![
                Opcode::Nop,
                Opcode::Goto,
                Opcode::Athrow,
                Opcode::Pop,
                Opcode::Return
            ]
        );
    }
}
