use classkit::jvm::attributes::AttributeValue;
use classkit::jvm::code::{CodeBuilderExts, Instruction, Opcode, TypeKind};
use classkit::jvm::constants::Constant;
use classkit::jvm::elements::{CodeElement, CompoundElement};
use classkit::jvm::model::ClassModel;
use classkit::jvm::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `pkg/Hello` with a `main` printing a greeting
fn hello_class(context: &ClassFile) -> Result<Vec<u8>, Error> {
    context.build("pkg/Hello", |class| {
        class.with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)?;
        let source = class.constant_pool().utf8_entry("Hello.java")?;
        class.with_attribute(AttributeValue::SourceFile(source))?;
        class.with_method_body(
            "main",
            "([Ljava/lang/String;)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |code| {
                code.line_number(3)?
                    .get_static("java/lang/System", "out", "Ljava/io/PrintStream;")?
                    .load_constant(Constant::String(String::from("Hello world")))?
                    .invoke_virtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")?
                    .line_number(4)?
                    .return_value(TypeKind::Void)?;
                Ok(())
            },
        )?;
        Ok(())
    })
}

/// A class with a bit of everything: fields, branches, a loop, and a `try`/`catch`
fn busy_class(context: &ClassFile) -> Result<Vec<u8>, Error> {
    context.build("pkg/Busy", |class| {
        class.with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)?;
        class.with_interfaces(&["java/lang/Runnable"])?;
        class.with_field("count", "I", FieldAccessFlags::PRIVATE, |_| Ok(()))?;
        class.with_field(
            "LIMIT",
            "J",
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            |field| {
                let limit = field.constant_pool().constant_entry(Constant::Long(1 << 40))?;
                field.with_attribute(AttributeValue::ConstantValue(limit))?;
                Ok(())
            },
        )?;
        class.with_method_body("run", "()V", MethodAccessFlags::PUBLIC, |code| {
            let counter = code.allocate_local(TypeKind::Int)?;
            code.load_constant(Constant::Integer(0))?
                .store_local(TypeKind::Int, counter)?;
            let head = code.new_bound_label()?;
            let exit = code.new_label();
            code.load_local(TypeKind::Int, counter)?
                .load_constant(Constant::Integer(1000))?
                .branch(Opcode::IfIcmpge, exit)?
                .iinc(counter, 1)?
                .goto_(head)?
                .label_target(exit)?;
            code.trying(
                |body| {
                    body.load_local(TypeKind::Reference, 0)?
                        .load_local(TypeKind::Int, counter)?
                        .put_field("pkg/Busy", "count", "I")?;
                    Ok(())
                },
                |catches| {
                    catches.catching("java/lang/RuntimeException", |handler| {
                        handler.pop(TypeKind::Reference)?;
                        Ok(())
                    })?;
                    Ok(())
                },
            )?;
            code.return_value(TypeKind::Void)?;
            Ok(())
        })?;
        Ok(())
    })
}

fn opcodes(class: &ClassModel, name: &str, descriptor: &str) -> Vec<Opcode> {
    let method = class
        .find_method(name, descriptor)
        .unwrap()
        .expect("method should exist");
    method
        .code()
        .expect("method should have code")
        .elements()
        .unwrap()
        .into_iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(instruction) => Some(instruction.opcode()),
            _ => None,
        })
        .collect()
}

#[test]
fn hello_world_reads_back() {
    init_logging();
    let context = ClassFile::new();
    let class = context.parse(hello_class(&context).unwrap()).unwrap();

    assert_eq!(class.name().unwrap(), "pkg/Hello");
    assert_eq!(class.version(), Version::DEFAULT);
    assert_eq!(
        class.flags(),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER
    );
    assert_eq!(
        class.superclass().unwrap().unwrap().as_class().unwrap(),
        "java/lang/Object"
    );
    assert_eq!(
        opcodes(&class, "main", "([Ljava/lang/String;)V"),
        vec![
            Opcode::Getstatic,
            Opcode::Ldc,
            Opcode::Invokevirtual,
            Opcode::Return
        ]
    );

    let main = class
        .find_method("main", "([Ljava/lang/String;)V")
        .unwrap()
        .unwrap();
    assert!(main.flags().contains(MethodAccessFlags::STATIC));
    let code = main.code().unwrap();
    assert_eq!(code.max_stack().unwrap(), 2);
    assert_eq!(code.max_locals().unwrap(), 1);

    let lines: Vec<u16> = code
        .elements()
        .unwrap()
        .into_iter()
        .filter_map(|element| match element {
            CodeElement::LineNumber(line) => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![3, 4]);
}

#[test]
fn identity_transform_is_byte_exact() {
    init_logging();
    let context = ClassFile::new();
    for bytes in [hello_class(&context).unwrap(), busy_class(&context).unwrap()] {
        let class = context.parse(bytes.clone()).unwrap();
        let copied = context.transform(&class, &mut Identity).unwrap();
        assert_eq!(copied, bytes);
    }
}

#[test]
fn identity_transform_into_new_pool_keeps_structure() {
    init_logging();
    let original_context = ClassFile::new();
    let bytes = busy_class(&original_context).unwrap();
    let original = original_context.parse(bytes).unwrap();

    let context = ClassFile::with_settings(Settings {
        constant_pool_sharing: ConstantPoolSharing::New,
        ..Settings::default()
    });
    let copied = context
        .parse(context.transform(&original, &mut Identity).unwrap())
        .unwrap();

    assert_eq!(copied.name().unwrap(), "pkg/Busy");
    assert_eq!(copied.flags(), original.flags());
    let interfaces: Vec<String> = copied
        .interfaces()
        .unwrap()
        .iter()
        .map(|interface| interface.as_class().unwrap().to_owned())
        .collect();
    assert_eq!(interfaces, vec![String::from("java/lang/Runnable")]);

    let field_names: Vec<String> = copied
        .fields()
        .unwrap()
        .iter()
        .map(|field| field.name().unwrap().to_owned())
        .collect();
    assert_eq!(field_names, vec![String::from("count"), String::from("LIMIT")]);

    assert_eq!(
        opcodes(&copied, "run", "()V"),
        opcodes(&original, "run", "()V")
    );
    let catches = copied
        .find_method("run", "()V")
        .unwrap()
        .unwrap()
        .code()
        .unwrap()
        .elements()
        .unwrap()
        .into_iter()
        .filter(|element| matches!(element, CodeElement::ExceptionCatch(_)))
        .count();
    assert_eq!(catches, 1);
}

#[test]
fn dropping_line_numbers_on_copy() {
    init_logging();
    let bytes = hello_class(&ClassFile::new()).unwrap();

    let context = ClassFile::with_settings(Settings {
        line_numbers: LineNumbers::Drop,
        ..Settings::default()
    });
    let class = context.parse(bytes.clone()).unwrap();
    let copied = context.transform(&class, &mut Identity).unwrap();
    assert!(copied.len() < bytes.len());

    let reread = ClassFile::new().parse(copied).unwrap();
    let main = reread
        .find_method("main", "([Ljava/lang/String;)V")
        .unwrap()
        .unwrap();
    let elements = main.code().unwrap().elements().unwrap();
    assert!(!elements
        .iter()
        .any(|element| matches!(element, CodeElement::LineNumber(_))));
    assert!(elements
        .iter()
        .any(|element| matches!(element, CodeElement::Instruction(Instruction::Return(_)))));
}

#[test]
fn malformed_inputs_are_rejected() {
    init_logging();
    let context = ClassFile::new();
    assert!(matches!(
        context.parse(vec![0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]),
        Err(Error::BadMagic(0xCAFEBABF))
    ));
    assert!(matches!(
        context.parse(vec![0xCA, 0xFE]),
        Err(Error::UnexpectedEof { .. })
    ));

    let mut bytes = hello_class(&context).unwrap();
    bytes.truncate(bytes.len() - 3);
    assert!(context.parse(bytes).is_err());
}
