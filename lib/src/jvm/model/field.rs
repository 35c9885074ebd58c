use super::{ClassReader, MemberRange, MemberSource};
use crate::jvm::constants::{Constant, PoolEntry};
use crate::jvm::elements::{CompoundElement, FieldElement};
use crate::jvm::{Error, FieldAccessFlags};
use std::fmt;
use std::sync::Arc;

/// A field: its name and descriptor, plus the elements which make up the rest of it
#[derive(Clone)]
pub struct FieldModel {
    name: PoolEntry,
    descriptor: PoolEntry,
    source: MemberSource<FieldElement>,
}

impl FieldModel {
    pub(crate) fn bound(reader: &Arc<ClassReader>, index: usize) -> Result<FieldModel, Error> {
        let range = &reader.fields()[index];
        let pool = reader.pool();
        Ok(FieldModel {
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
        elements: Vec<FieldElement>,
    ) -> FieldModel {
        FieldModel {
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

    /// Access flags (the last ones given, for a buffered field)
    pub fn flags(&self) -> FieldAccessFlags {
        match &self.source {
            MemberSource::Bound { reader, index } => {
                FieldAccessFlags::from_bits_truncate(reader.fields()[*index].flags)
            }
            MemberSource::Buffered(elements) => elements
                .iter()
                .rev()
                .find_map(|element| match element {
                    FieldElement::AccessFlags(flags) => Some(*flags),
                    _ => None,
                })
                .unwrap_or_else(FieldAccessFlags::empty),
        }
    }

    /// Parsed class and location of the field, if the field is bound
    pub(crate) fn bound_source(&self) -> Option<(&Arc<ClassReader>, &MemberRange)> {
        match &self.source {
            MemberSource::Bound { reader, index } => Some((reader, &reader.fields()[*index])),
            MemberSource::Buffered(_) => None,
        }
    }
}

impl CompoundElement for FieldModel {
    type Element = FieldElement;

    fn for_each_element(
        &self,
        callback: &mut dyn FnMut(FieldElement) -> Result<(), Error>,
    ) -> Result<(), Error> {
        match &self.source {
            MemberSource::Bound { reader, index } => {
                let range = &reader.fields()[*index];
                callback(FieldElement::AccessFlags(
                    FieldAccessFlags::from_bits_truncate(range.flags),
                ))?;
                for attribute in &range.attributes {
                    callback(FieldElement::Attribute(reader.bound_attribute(attribute)))?;
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

impl fmt::Debug for FieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldModel")
            .field("name", &self.name.constant().to_string())
            .field("descriptor", &self.descriptor.constant().to_string())
            .field("flags", &self.flags())
            .finish()
    }
}
