//! Read, build, and transform JVM class files
//!
//! ### Simple example
//!
//! Consider the following Java class:
//!
//! ```java,ignore,no_run
//! package pkg;
//!
//! public class Hello {
//!     public static void main(String[] args) {
//!         System.out.println("Hello world");
//!     }
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows:
//!
//! ```
//! use classkit::jvm::code::{CodeBuilderExts, TypeKind};
//! use classkit::jvm::constants::Constant;
//! use classkit::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let context = ClassFile::new();
//! let bytes = context.build("pkg/Hello", |class| {
//!     class.with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)?;
//!     class.with_method_body(
//!         "main",
//!         "([Ljava/lang/String;)V",
//!         MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!         |code| {
//!             code.get_static("java/lang/System", "out", "Ljava/io/PrintStream;")?
//!                 .load_constant(Constant::String(String::from("Hello world")))?
//!                 .invoke_virtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")?
//!                 .return_value(TypeKind::Void)?;
//!             Ok(())
//!         },
//!     )?;
//!     Ok(())
//! })?;
//!
//! // Reading it back yields the same structure
//! let class = context.parse(bytes)?;
//! assert_eq!(class.name()?, "pkg/Hello");
//! # Ok(())
//! # }
//! ```
//!
//! ### Transforming classes
//!
//! Existing classes are rebuilt by streaming their elements through a chain of transforms (see
//! [`transform`]). Elements which pass through untouched are copied as-is, so an [`Identity`]
//! transform reproduces the input byte for byte.

mod access_flags;
pub mod attributes;
pub mod binary;
pub mod builder;
pub mod code;
pub mod constants;
mod context;
mod descriptors;
pub mod elements;
mod errors;
pub mod model;
mod settings;
pub mod transform;
mod version;

pub use access_flags::*;
pub use context::ClassFile;
pub use descriptors::*;
pub use errors::*;
pub use settings::*;
pub use transform::{
    ClassTransform, CodeTransform, FieldTransform, Identity, MethodTransform,
};
pub use version::*;
