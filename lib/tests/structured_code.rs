use classkit::jvm::code::{CodeBuilder, CodeBuilderExts, Instruction, Opcode, TypeKind};
use classkit::jvm::constants::Constant;
use classkit::jvm::elements::{CodeElement, CompoundElement};
use classkit::jvm::*;

/// Build `pkg/Code` with a single static method, returning the elements of its body as read back
fn build_static(
    settings: Settings,
    descriptor: &str,
    handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
) -> Result<Vec<CodeElement>, Error> {
    let context = ClassFile::with_settings(settings);
    let bytes = context.build("pkg/Code", |class| {
        class.with_method_body("f", descriptor, MethodAccessFlags::STATIC, handler)?;
        Ok(())
    })?;
    let class = context.parse(bytes)?;
    let method = class
        .find_method("f", descriptor)?
        .expect("method should exist");
    method.code().expect("method should have code").elements()
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
fn if_then_else_with_returning_branches() {
    let elements = build_static(Settings::default(), "(II)I", |code| {
        let a = code.parameter_slot(0)?;
        let b = code.parameter_slot(1)?;
        let (start, end) = (code.start_label(), code.end_label());
        code.local_variable(a, "a", "I", start, end)?
            .local_variable(b, "b", "I", start, end)?
            .load_local(TypeKind::Int, a)?
            .load_local(TypeKind::Int, b)?
            .if_then_else(
                Opcode::IfIcmpgt,
                |then| {
                    then.load_local(TypeKind::Int, a)?
                        .return_value(TypeKind::Int)?;
                    Ok(())
                },
                |otherwise| {
                    otherwise
                        .load_local(TypeKind::Int, b)?
                        .return_value(TypeKind::Int)?;
                    Ok(())
                },
            )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        opcodes(&elements),
        vec![
            Opcode::Iload0,
            Opcode::Iload1,
            Opcode::IfIcmple,
            Opcode::Iload0,
            Opcode::Ireturn,
            Opcode::Iload1,
            Opcode::Ireturn,
        ]
    );

    let mut names = vec![];
    for element in &elements {
        if let CodeElement::LocalVariable(local) = element {
            names.push((local.slot, local.name.as_utf8().unwrap().to_owned()));
        }
    }
    assert_eq!(names, vec![(0, String::from("a")), (1, String::from("b"))]);
}

#[test]
fn try_catch_produces_exception_table() {
    let elements = build_static(Settings::default(), "(II)I", |code| {
        code.trying(
            |body| {
                body.load_local(TypeKind::Int, 0)?
                    .load_local(TypeKind::Int, 1)?
                    .operator(Opcode::Idiv)?
                    .return_value(TypeKind::Int)?;
                Ok(())
            },
            |catches| {
                catches
                    .catching("java/lang/ArithmeticException", |handler| {
                        handler
                            .pop(TypeKind::Reference)?
                            .load_constant(Constant::Integer(0))?
                            .return_value(TypeKind::Int)?;
                        Ok(())
                    })?
                    .catching_all(|handler| {
                        handler.athrow()?;
                        Ok(())
                    })?;
                Ok(())
            },
        )?;
        Ok(())
    })
    .unwrap();

    // Neither the body nor the handlers fall through, so there are no `goto`s
    assert_eq!(
        opcodes(&elements),
        vec![
            Opcode::Iload0,
            Opcode::Iload1,
            Opcode::Idiv,
            Opcode::Ireturn,
            Opcode::Pop,
            Opcode::Iconst0,
            Opcode::Ireturn,
            Opcode::Athrow,
        ]
    );

    let catch_types: Vec<Option<String>> = elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::ExceptionCatch(catch) => Some(
                catch
                    .catch_type
                    .as_ref()
                    .map(|class| class.as_class().unwrap().to_owned()),
            ),
            _ => None,
        })
        .collect();
    assert_eq!(
        catch_types,
        vec![Some(String::from("java/lang/ArithmeticException")), None]
    );
}

#[test]
fn try_block_must_not_be_empty() {
    let result = build_static(Settings::default(), "()V", |code| {
        code.trying(
            |_| Ok(()),
            |catches| {
                catches.catching_all(|handler| {
                    handler.athrow()?;
                    Ok(())
                })?;
                Ok(())
            },
        )?;
        code.return_value(TypeKind::Void)?;
        Ok(())
    });
    assert!(matches!(result, Err(Error::EmptyTryBlock)));
}

/// `if (0 != 0) { <lots of nops> }`, with a branch too long for a 16-bit offset
fn long_conditional(code: &mut CodeBuilder<'_>) -> Result<(), Error> {
    code.load_constant(Constant::Integer(0))?
        .if_then(Opcode::Ifne, |body| {
            for _ in 0..40_000 {
                body.with(Instruction::simple(Opcode::Nop)?)?;
            }
            Ok(())
        })?
        .return_value(TypeKind::Void)?;
    Ok(())
}

#[test]
fn long_branches_are_widened() {
    let elements = build_static(Settings::default(), "()V", long_conditional).unwrap();
    let opcodes = opcodes(&elements);

    // `ifeq far` becomes `ifne +8; goto_w far`
    assert_eq!(
        &opcodes[..4],
        &[Opcode::Iconst0, Opcode::Ifne, Opcode::GotoW, Opcode::Nop]
    );
    assert_eq!(opcodes.last(), Some(&Opcode::Return));
    assert_eq!(opcodes.len(), 40_004);
}

#[test]
fn long_branches_fail_when_strict() {
    let settings = Settings {
        short_jumps: ShortJumps::Fail,
        ..Settings::default()
    };
    let result = build_static(settings, "()V", long_conditional);
    assert!(matches!(result, Err(Error::ShortJumpOverflow { .. })));
}

#[test]
fn unbound_labels_in_debug_ranges() {
    let build_with_dangling_range = |settings: Settings| {
        build_static(settings, "(I)V", |code| {
            let start = code.start_label();
            let never_bound = code.new_label();
            code.local_variable(0, "x", "I", start, never_bound)?
                .return_value(TypeKind::Void)?;
            Ok(())
        })
    };

    assert!(matches!(
        build_with_dangling_range(Settings::default()),
        Err(Error::UnboundLabel(_))
    ));

    let elements = build_with_dangling_range(Settings {
        dead_labels: DeadLabels::Drop,
        ..Settings::default()
    })
    .unwrap();
    assert!(!elements
        .iter()
        .any(|element| matches!(element, CodeElement::LocalVariable(_))));
    assert_eq!(opcodes(&elements), vec![Opcode::Return]);
}

#[test]
fn branch_targets_must_be_bound() {
    let result = build_static(
        Settings {
            dead_labels: DeadLabels::Drop,
            ..Settings::default()
        },
        "()V",
        |code| {
            let nowhere = code.new_label();
            code.goto_(nowhere)?;
            Ok(())
        },
    );
    assert!(matches!(result, Err(Error::UnboundLabel(_))));
}
