use classkit::jvm::builder::ClassBuilder;
use classkit::jvm::code::{CodeBuilder, CodeBuilderExts, Instruction, Opcode, TypeKind};
use classkit::jvm::constants::Constant;
use classkit::jvm::elements::{ClassElement, CodeElement, CompoundElement};
use classkit::jvm::model::ClassModel;
use classkit::jvm::transform::{
    class_transform, code_transform, dropping_methods, stateful, transforming_code,
    transforming_methods,
};
use classkit::jvm::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn sample_class(context: &ClassFile) -> ClassModel {
    let bytes = context
        .build("pkg/Sample", |class| {
            class.with_method_body(
                "main",
                "([Ljava/lang/String;)V",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                |code| {
                    code.get_static("java/lang/System", "out", "Ljava/io/PrintStream;")?
                        .load_constant(Constant::String(String::from("Hello world")))?
                        .invoke_virtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")?
                        .return_value(TypeKind::Void)?;
                    Ok(())
                },
            )?;
            class.with_method_body("helper", "()V", MethodAccessFlags::STATIC, |code| {
                code.with(Instruction::simple(Opcode::Nop)?)?
                    .return_value(TypeKind::Void)?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    context.parse(bytes).unwrap()
}

fn method_names(class: &ClassModel) -> Vec<String> {
    class
        .methods()
        .unwrap()
        .iter()
        .map(|method| method.name().unwrap().to_owned())
        .collect()
}

fn code_elements(class: &ClassModel, name: &str, descriptor: &str) -> Vec<CodeElement> {
    class
        .find_method(name, descriptor)
        .unwrap()
        .unwrap()
        .code()
        .unwrap()
        .elements()
        .unwrap()
}

/// Logs the methods it sees, passing every element through
struct Recorder {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
    add_method_at_end: bool,
}

impl ClassTransform for Recorder {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        if let ClassElement::Method(method) = &element {
            self.log
                .borrow_mut()
                .push(format!("{}:method {}", self.name, method.name()?));
        }
        builder.with(element)?;
        Ok(())
    }

    fn at_start(&mut self, _builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        self.log.borrow_mut().push(format!("{}:start", self.name));
        Ok(())
    }

    fn at_end(&mut self, builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        self.log.borrow_mut().push(format!("{}:end", self.name));
        if self.add_method_at_end {
            builder.with_method_body("added", "()V", MethodAccessFlags::STATIC, |code| {
                code.return_value(TypeKind::Void)?;
                Ok(())
            })?;
        }
        Ok(())
    }
}

#[test]
fn chained_transforms_see_each_others_output() {
    let context = ClassFile::new();
    let class = sample_class(&context);
    let log = Rc::new(RefCell::new(vec![]));

    let first = Recorder {
        name: "a",
        log: log.clone(),
        add_method_at_end: true,
    };
    let second = Recorder {
        name: "b",
        log: log.clone(),
        add_method_at_end: false,
    };
    let bytes = context
        .transform(&class, &mut first.and_then(second))
        .unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "a:start",
            "b:start",
            "a:method main",
            "b:method main",
            "a:method helper",
            "b:method helper",
            "a:end",
            "b:method added",
            "b:end",
        ]
    );
    assert_eq!(
        method_names(&context.parse(bytes).unwrap()),
        vec!["main", "helper", "added"]
    );
}

#[test]
fn class_transform_can_drop_and_replace_elements() {
    let context = ClassFile::new();
    let class = sample_class(&context);

    let finalize = class_transform(|builder, element| {
        match element {
            ClassElement::AccessFlags(flags) => {
                builder.with_flags(flags | ClassAccessFlags::FINAL)?;
            }
            other => {
                builder.with(other)?;
            }
        }
        Ok(())
    });
    let drop_helper =
        dropping_methods(|method| method.name().map_or(false, |name| name == "helper"));
    let mut transform = ClassTransform::and_then(finalize, drop_helper);
    let rebuilt = context
        .parse(context.transform(&class, &mut transform).unwrap())
        .unwrap();

    assert!(rebuilt.flags().contains(ClassAccessFlags::FINAL));
    assert_eq!(method_names(&rebuilt), vec!["main"]);
}

/// Replaces every constant load with the string "Goodbye"
fn goodbye() -> impl ClassTransform {
    transforming_methods(transforming_code(code_transform(|code, element| {
        match element {
            CodeElement::Instruction(Instruction::ConstantLoad { .. }) => {
                code.load_constant(Constant::String(String::from("Goodbye")))?;
            }
            other => {
                code.with(other)?;
            }
        }
        Ok(())
    })))
}

fn line_numbering() -> impl ClassTransform {
    transforming_methods(transforming_code(stateful(|| LineNumbering {
        next_line: 1,
    })))
}

#[test]
fn code_transform_rewrites_constants() {
    let context = ClassFile::new();
    let class = sample_class(&context);

    let rebuilt = context
        .parse(context.transform(&class, &mut goodbye()).unwrap())
        .unwrap();

    let strings: Vec<String> = code_elements(&rebuilt, "main", "([Ljava/lang/String;)V")
        .into_iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(Instruction::ConstantLoad { constant, .. }) => {
                match constant.constant() {
                    Constant::String(string) => Some(string.clone()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect();
    assert_eq!(strings, vec![String::from("Goodbye")]);

    // Untouched method bodies come out the same
    let helper_opcodes: Vec<Opcode> = code_elements(&rebuilt, "helper", "()V")
        .into_iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(instruction) => Some(instruction.opcode()),
            _ => None,
        })
        .collect();
    assert_eq!(helper_opcodes, vec![Opcode::Nop, Opcode::Return]);
}

/// Numbers instructions with fake line numbers
struct LineNumbering {
    next_line: u16,
}

impl CodeTransform for LineNumbering {
    fn accept(&mut self, code: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        if let CodeElement::Instruction(_) = element {
            code.line_number(self.next_line)?;
            self.next_line += 1;
        }
        code.with(element)?;
        Ok(())
    }
}

#[test]
fn stateful_transforms_start_fresh_for_every_method() {
    let context = ClassFile::new();
    let class = sample_class(&context);

    let rebuilt = context
        .parse(context.transform(&class, &mut line_numbering()).unwrap())
        .unwrap();

    let lines = |name: &str, descriptor: &str| -> Vec<u16> {
        code_elements(&rebuilt, name, descriptor)
            .into_iter()
            .filter_map(|element| match element {
                CodeElement::LineNumber(line) => Some(line),
                _ => None,
            })
            .collect()
    };
    assert_eq!(lines("main", "([Ljava/lang/String;)V"), vec![1, 2, 3, 4]);
    assert_eq!(lines("helper", "()V"), vec![1, 2]);
}

#[test]
fn chaining_matches_running_transforms_one_after_the_other() {
    let context = ClassFile::new();
    let class = sample_class(&context);

    let chained = context
        .transform(&class, &mut ClassTransform::and_then(goodbye(), line_numbering()))
        .unwrap();

    let intermediate = context
        .parse(context.transform(&class, &mut goodbye()).unwrap())
        .unwrap();
    let sequential = context
        .transform(&intermediate, &mut line_numbering())
        .unwrap();

    assert_eq!(chained, sequential);
}

/// `LineNumbering`, except that it gives up on the third instruction while `fail` is set
struct FlakyLineNumbering {
    next_line: u16,
    fail: Rc<Cell<bool>>,
}

impl CodeTransform for FlakyLineNumbering {
    fn accept(&mut self, code: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        if let CodeElement::Instruction(_) = element {
            if self.next_line == 3 && self.fail.get() {
                return Err(Error::EmptyTryBlock);
            }
            code.line_number(self.next_line)?;
            self.next_line += 1;
        }
        code.with(element)?;
        Ok(())
    }
}

#[test]
fn stateful_transforms_recover_from_failed_traversals() {
    let context = ClassFile::new();
    let class = sample_class(&context);

    let fail = Rc::new(Cell::new(true));
    let factory_fail = fail.clone();
    let mut transform = transforming_methods(transforming_code(stateful(move || {
        FlakyLineNumbering {
            next_line: 1,
            fail: factory_fail.clone(),
        }
    })));
    assert!(matches!(
        context.transform(&class, &mut transform),
        Err(Error::EmptyTryBlock)
    ));

    // Same transform value, but the half-finished state is gone
    fail.set(false);
    let rebuilt = context
        .parse(context.transform(&class, &mut transform).unwrap())
        .unwrap();
    let lines: Vec<u16> = code_elements(&rebuilt, "main", "([Ljava/lang/String;)V")
        .into_iter()
        .filter_map(|element| match element {
            CodeElement::LineNumber(line) => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![1, 2, 3, 4]);
}
