//! Elements: the pieces every class file structure is made of
//!
//! Each structure (class, field, method, method body) is an ordered sequence of elements from a
//! closed set. Models expose these sequences (see [`CompoundElement`]) and builders consume them,
//! so that reading, building, and transforming all speak the same vocabulary.

use crate::jvm::attributes::Attribute;
use crate::jvm::code::{
    ExceptionCatch, Instruction, Label, LocalVariable, LocalVariableType, StackMapFrame,
};
use crate::jvm::constants::PoolEntry;
use crate::jvm::model::{CodeModel, FieldModel, MethodModel};
use crate::jvm::{ClassAccessFlags, Error, FieldAccessFlags, MethodAccessFlags, Version};

/// Element of a class
#[derive(Clone, Debug)]
pub enum ClassElement {
    /// Exactly once (last one wins, `PUBLIC` if absent)
    AccessFlags(ClassAccessFlags),

    /// Exactly once (last one wins, [`Version::DEFAULT`] if absent)
    Version(Version),

    /// At most once (last one wins, `java/lang/Object` if absent)
    Superclass(PoolEntry),

    /// At most once (last one wins)
    Interfaces(Vec<PoolEntry>),
    Field(FieldModel),
    Method(MethodModel),
    Attribute(Attribute),
}

/// Element of a field
#[derive(Clone, Debug)]
pub enum FieldElement {
    AccessFlags(FieldAccessFlags),
    Attribute(Attribute),
}

/// Element of a method
#[derive(Clone, Debug)]
pub enum MethodElement {
    AccessFlags(MethodAccessFlags),

    /// At most once (last one wins)
    Code(CodeModel),
    Attribute(Attribute),
}

/// Element of a method body
#[derive(Clone, Debug)]
pub enum CodeElement {
    Instruction(Instruction),

    /// Binds a label to the position of the next instruction
    LabelTarget(Label),

    /// Source line of the next instruction
    LineNumber(u16),
    LocalVariable(LocalVariable),
    LocalVariableType(LocalVariableType),
    ExceptionCatch(ExceptionCatch),

    /// Frames of an existing `StackMapTable`, at most once
    StackMapTable(Vec<StackMapFrame>),
    Attribute(Attribute),
}

/// Any element, of any structure
#[derive(Clone, Debug)]
pub enum ClassFileElement {
    Class(ClassElement),
    Field(FieldElement),
    Method(MethodElement),
    Code(CodeElement),
}

impl From<ClassElement> for ClassFileElement {
    fn from(element: ClassElement) -> ClassFileElement {
        ClassFileElement::Class(element)
    }
}

impl From<FieldElement> for ClassFileElement {
    fn from(element: FieldElement) -> ClassFileElement {
        ClassFileElement::Field(element)
    }
}

impl From<MethodElement> for ClassFileElement {
    fn from(element: MethodElement) -> ClassFileElement {
        ClassFileElement::Method(element)
    }
}

impl From<CodeElement> for ClassFileElement {
    fn from(element: CodeElement) -> ClassFileElement {
        ClassFileElement::Code(element)
    }
}

impl From<Instruction> for CodeElement {
    fn from(instruction: Instruction) -> CodeElement {
        CodeElement::Instruction(instruction)
    }
}

impl From<Attribute> for ClassElement {
    fn from(attribute: Attribute) -> ClassElement {
        ClassElement::Attribute(attribute)
    }
}

impl From<Attribute> for FieldElement {
    fn from(attribute: Attribute) -> FieldElement {
        FieldElement::Attribute(attribute)
    }
}

impl From<Attribute> for MethodElement {
    fn from(attribute: Attribute) -> MethodElement {
        MethodElement::Attribute(attribute)
    }
}

impl From<Attribute> for CodeElement {
    fn from(attribute: Attribute) -> CodeElement {
        CodeElement::Attribute(attribute)
    }
}

/// Ordered, replayable sequence of elements
///
/// Models backed by parsed bytes decode their elements on every traversal, so a malformed region
/// is only reported once something actually walks over it.
pub trait CompoundElement {
    type Element;

    /// Deliver every element, in order, stopping at the first error
    fn for_each_element(
        &self,
        callback: &mut dyn FnMut(Self::Element) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Collect all elements
    fn elements(&self) -> Result<Vec<Self::Element>, Error> {
        let mut elements = vec![];
        self.for_each_element(&mut |element| {
            elements.push(element);
            Ok(())
        })?;
        Ok(elements)
    }
}
