use classkit::jvm::code::{CodeBuilderExts, TypeKind};
use classkit::jvm::constants::Constant;
use classkit::jvm::elements::{ClassElement, CodeElement, CompoundElement};
use classkit::jvm::model::ClassModel;
use classkit::jvm::transform::{
    class_transform, dropping_code_elements, transforming_code, transforming_methods,
};
use classkit::jvm::*;

use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Class(#[from] Error),
}

fn main() -> Result<(), CliError> {
    env_logger::init();

    let input = || {
        Arg::new("INPUT")
            .help("Class file to read")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .index(1)
    };
    let output = || {
        Arg::new("OUTPUT")
            .help("Where to write the rewritten class")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .index(2)
    };
    let flag = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .action(ArgAction::SetTrue)
            .help(help)
    };

    let matches = command!()
        .about("Inspect and rewrite JVM class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("dump")
                .about("Print the structure of a class")
                .arg(input()),
        )
        .subcommand(
            Command::new("copy")
                .about("Rebuild a class through the identity transform")
                .arg(input())
                .arg(output())
                .arg(flag("new-pool", "Re-intern every constant into a fresh pool"))
                .arg(flag("strict-jumps", "Fail instead of rewriting oversized branches"))
                .arg(flag("drop-debug", "Drop local variable tables"))
                .arg(flag("drop-unknown", "Drop attributes without a known format")),
        )
        .subcommand(
            Command::new("strip-debug")
                .about("Remove line numbers, local variables, and the source file name")
                .arg(input())
                .arg(output()),
        )
        .subcommand(
            Command::new("hello")
                .about("Generate a class whose `main` prints a greeting")
                .arg(output().index(1))
                .arg(
                    Arg::new("class")
                        .long("class")
                        .value_name("CLASS_NAME")
                        .help("Internal name of the generated class (eg. `foo/bar/Baz`)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("dump", matches)) => dump(matches),
        Some(("copy", matches)) => copy(matches),
        Some(("strip-debug", matches)) => strip_debug(matches),
        Some(("hello", matches)) => hello(matches),
        _ => unreachable!("a subcommand is required"),
    }
}

fn read_class(context: &ClassFile, matches: &ArgMatches) -> Result<ClassModel, CliError> {
    let path = path_arg(matches, "INPUT");
    log::info!("Reading '{}'", path.display());
    let bytes = fs::read(&path).map_err(|source| CliError::Io { path, source })?;
    Ok(context.parse(bytes)?)
}

fn write_class(matches: &ArgMatches, bytes: Vec<u8>) -> Result<(), CliError> {
    let path = path_arg(matches, "OUTPUT");
    log::info!("Writing '{}' ({} bytes)", path.display(), bytes.len());
    fs::write(&path, bytes).map_err(|source| CliError::Io { path, source })
}

fn path_arg(matches: &ArgMatches, name: &str) -> PathBuf {
    matches
        .get_one::<PathBuf>(name)
        .cloned()
        .unwrap_or_default()
}

fn dump(matches: &ArgMatches) -> Result<(), CliError> {
    let class = read_class(&ClassFile::new(), matches)?;

    println!("class {} (version {})", class.name()?, class.version());
    println!("  flags: {:?}", class.flags());
    if let Some(superclass) = class.superclass()? {
        println!("  extends: {}", superclass.as_class()?);
    }
    for interface in class.interfaces()? {
        println!("  implements: {}", interface.as_class()?);
    }
    for field in class.fields()? {
        println!(
            "  field {} {} {:?}",
            field.name()?,
            field.descriptor()?,
            field.flags()
        );
    }
    for method in class.methods()? {
        println!(
            "  method {}{} {:?}",
            method.name()?,
            method.descriptor()?,
            method.flags()
        );
        let code = match method.code() {
            Some(code) => code,
            None => continue,
        };
        println!(
            "    max_stack={} max_locals={}",
            code.max_stack()?,
            code.max_locals()?
        );
        code.for_each_element(&mut |element| {
            match element {
                CodeElement::Instruction(instruction) => println!("      {:?}", instruction),
                CodeElement::StackMapTable(frames) => {
                    println!("      // {} stack map frames", frames.len())
                }
                other => println!("    {:?}", other),
            }
            Ok(())
        })?;
    }
    for attribute in class.attributes() {
        println!("  attribute {:?}", attribute);
    }
    Ok(())
}

fn copy(matches: &ArgMatches) -> Result<(), CliError> {
    let mut settings = Settings::default();
    if matches.get_flag("new-pool") {
        settings.constant_pool_sharing = ConstantPoolSharing::New;
    }
    if matches.get_flag("strict-jumps") {
        settings.short_jumps = ShortJumps::Fail;
    }
    if matches.get_flag("drop-debug") {
        settings.debug_elements = DebugElements::Drop;
    }
    if matches.get_flag("drop-unknown") {
        settings.attributes = AttributesPolicy::DropUnknown;
    }
    log::debug!("Copying with {:?}", settings.constant_pool_sharing);

    let context = ClassFile::with_settings(settings);
    let class = read_class(&context, matches)?;
    let bytes = context.transform(&class, &mut Identity)?;
    write_class(matches, bytes)
}

fn strip_debug(matches: &ArgMatches) -> Result<(), CliError> {
    let context = ClassFile::new();
    let class = read_class(&context, matches)?;

    let mut stripped = 0usize;
    let bytes = {
        let drop_source_file = class_transform(|builder, element| match element {
            ClassElement::Attribute(attribute) if attribute.name() == "SourceFile" => Ok(()),
            other => builder.with(other).map(|_| ()),
        });
        let drop_debug_elements =
            transforming_methods(transforming_code(dropping_code_elements(|element| {
                let debug = matches!(
                    element,
                    CodeElement::LineNumber(_)
                        | CodeElement::LocalVariable(_)
                        | CodeElement::LocalVariableType(_)
                );
                if debug {
                    stripped += 1;
                }
                debug
            })));
        let mut transform = ClassTransform::and_then(drop_source_file, drop_debug_elements);
        context.transform(&class, &mut transform)?
    };
    log::info!("Dropped {} debug elements from {}", stripped, class.name()?);
    write_class(matches, bytes)
}

fn hello(matches: &ArgMatches) -> Result<(), CliError> {
    let name = matches
        .get_one::<String>("class")
        .map(String::as_str)
        .unwrap_or("Hello");
    let bytes = ClassFile::new().build(name, |class| {
        class.with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)?;
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
        Ok(())
    })?;
    write_class(matches, bytes)
}
