use super::{ClassReader, CodeModel, MemberRange, MemberSource};
use crate::jvm::constants::{Constant, PoolEntry};
use crate::jvm::elements::{CompoundElement, MethodElement};
use crate::jvm::{Error, MethodAccessFlags, MethodDescriptor};
use std::fmt;
use std::sync::Arc;

/// A method: its name and descriptor, plus the elements which make up the rest of it
#[derive(Clone)]
pub struct MethodModel {
    name: PoolEntry,
    descriptor: PoolEntry,
    source: MemberSource<MethodElement>,
}

impl MethodModel {
    pub(crate) fn bound(reader: &Arc<ClassReader>, index: usize) -> Result<MethodModel, Error> {
        let range = &reader.methods()[index];
        let pool = reader.pool();
        Ok(MethodModel {
            name: pool.typed_entry(range.name_index, Constant::UTF8)?,
            descriptor: pool.typed_entry(range.descriptor_index, Constant::UTF8)?,
            source: MemberSource::Bound {
                reader: reader.clone(),
                index,
            },
        })
    }

    pub(crate) fn buffered(
        name: PoolEntry,
        descriptor: PoolEntry,
        elements: Vec<MethodElement>,
    ) -> MethodModel {
        MethodModel {
            name,
            descriptor,
            source: MemberSource::Buffered(elements),
        }
    }

    pub fn name(&self) -> Result<&str, Error> {
        self.name.as_utf8()
    }

    pub fn descriptor(&self) -> Result<&str, Error> {
        self.descriptor.as_utf8()
    }

    pub fn name_entry(&self) -> &PoolEntry {
        &self.name
    }

    pub fn descriptor_entry(&self) -> &PoolEntry {
        &self.descriptor
    }

    /// Access flags (the last ones given, for a buffered method)
    pub fn flags(&self) -> MethodAccessFlags {
        match &self.source {
            MemberSource::Bound { reader, index } => {
                MethodAccessFlags::from_bits_truncate(reader.methods()[*index].flags)
            }
            MemberSource::Buffered(elements) => elements
                .iter()
                .rev()
                .find_map(|element| match element {
                    MethodElement::AccessFlags(flags) => Some(*flags),
                    _ => None,
                })
                .unwrap_or_else(MethodAccessFlags::empty),
        }
    }

    /// Method body, if the method has one
    pub fn code(&self) -> Option<CodeModel> {
        match &self.source {
            MemberSource::Bound { reader, index } => reader.methods()[*index]
                .attributes
                .iter()
                .find(|attribute| attribute.name == "Code")
                .map(|attribute| CodeModel::bound(reader.clone(), attribute.clone())),
            MemberSource::Buffered(elements) => {
                elements.iter().rev().find_map(|element| match element {
                    MethodElement::Code(code) => Some(code.clone()),
                    _ => None,
                })
            }
        }
    }

    /// Name, descriptor, and flags of the method, as seen by code builders
    pub fn info(&self) -> Result<MethodInfo, Error> {
        MethodInfo::new(self.name()?, self.descriptor()?, self.flags())
    }

    pub(crate) fn bound_source(&self) -> Option<(&Arc<ClassReader>, &MemberRange)> {
        match &self.source {
            MemberSource::Bound { reader, index } => Some((reader, &reader.methods()[*index])),
            MemberSource::Buffered(_) => None,
        }
    }
}

impl CompoundElement for MethodModel {
    type Element = MethodElement;

    fn for_each_element(
        &self,
        callback: &mut dyn FnMut(MethodElement) -> Result<(), Error>,
    ) -> Result<(), Error> {
        match &self.source {
            MemberSource::Bound { reader, index } => {
                let range = &reader.methods()[*index];
                callback(MethodElement::AccessFlags(
                    MethodAccessFlags::from_bits_truncate(range.flags),
                ))?;
                for attribute in &range.attributes {
                    let element = if attribute.name == "Code" {
                        MethodElement::Code(CodeModel::bound(reader.clone(), attribute.clone()))
                    } else {
                        MethodElement::Attribute(reader.bound_attribute(attribute))
                    };
                    callback(element)?;
                }
            }
            MemberSource::Buffered(elements) => {
                for element in elements {
                    callback(element.clone())?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MethodModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodModel")
            .field("name", &self.name.constant().to_string())
            .field("descriptor", &self.descriptor.constant().to_string())
            .field("flags", &self.flags())
            .finish()
    }
}

/// What code builders know about the method they are building the body of
///
/// The local variable layout follows from this: the receiver (for instance methods) is in slot
/// `0`, followed by the parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    name: String,
    descriptor: String,
    flags: MethodAccessFlags,
    parsed: MethodDescriptor,
}

impl MethodInfo {
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        flags: MethodAccessFlags,
    ) -> Result<MethodInfo, Error> {
        let descriptor = descriptor.into();
        let parsed = MethodDescriptor::parse(&descriptor)?;
        Ok(MethodInfo {
            name: name.into(),
            descriptor,
            flags,
            parsed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn flags(&self) -> MethodAccessFlags {
        self.flags
    }

    pub fn method_descriptor(&self) -> &MethodDescriptor {
        &self.parsed
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    /// Slot holding `this`
    pub fn receiver_slot(&self) -> Result<u16, Error> {
        if self.is_static() {
            Err(Error::NoReceiver)
        } else {
            Ok(0)
        }
    }

    /// Slot holding a parameter (by index in the descriptor, not by slot)
    pub fn parameter_slot(&self, index: usize) -> Result<u16, Error> {
        Ok(self.receiver_width() + self.parsed.parameter_offset(index)?)
    }

    /// First slot not taken up by the receiver or the parameters
    pub fn first_free_slot(&self) -> u16 {
        self.receiver_width() + self.parsed.parameter_slots()
    }

    fn receiver_width(&self) -> u16 {
        if self.is_static() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn local_layout() {
        let instance = MethodInfo::new("f", "(JI)V", MethodAccessFlags::PUBLIC).unwrap();
        assert_eq!(instance.receiver_slot().unwrap(), 0);
        assert_eq!(instance.parameter_slot(0).unwrap(), 1);
        assert_eq!(instance.parameter_slot(1).unwrap(), 3);
        assert_eq!(instance.first_free_slot(), 4);

        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
        let main = MethodInfo::new("main", "([Ljava/lang/String;)V", flags).unwrap();
        assert!(matches!(main.receiver_slot(), Err(Error::NoReceiver)));
        assert_eq!(main.parameter_slot(0).unwrap(), 0);
        assert!(matches!(
            main.parameter_slot(1),
            Err(Error::ParameterOutOfRange { index: 1, count: 1 })
        ));
        assert_eq!(main.first_free_slot(), 1);
    }
}
