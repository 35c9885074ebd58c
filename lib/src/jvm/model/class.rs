use super::{ClassReader, FieldModel, MethodModel};
use crate::jvm::attributes::Attribute;
use crate::jvm::constants::{Constant, ConstantPool, PoolEntry};
use crate::jvm::elements::{ClassElement, CompoundElement};
use crate::jvm::{ClassAccessFlags, Error, Settings, Version};
use std::fmt;
use std::sync::Arc;

/// A parsed class
///
/// Only the outline of the class (where members and attributes start and end) is decoded up
/// front. Members, attributes, and method bodies are decoded when they are asked for.
#[derive(Clone)]
pub struct ClassModel {
    reader: Arc<ClassReader>,
}

impl ClassModel {
    /// Parse a class file
    pub fn parse(bytes: impl Into<Arc<[u8]>>, settings: Arc<Settings>) -> Result<ClassModel, Error> {
        let reader = ClassReader::parse(bytes.into(), settings)?;
        Ok(ClassModel { reader })
    }

    pub fn reader(&self) -> &Arc<ClassReader> {
        &self.reader
    }

    pub fn constant_pool(&self) -> &Arc<ConstantPool> {
        self.reader.pool()
    }

    pub fn version(&self) -> Version {
        self.reader.version()
    }

    pub fn flags(&self) -> ClassAccessFlags {
        ClassAccessFlags::from_bits_truncate(self.reader.flags())
    }

    pub fn this_class(&self) -> Result<PoolEntry, Error> {
        self.reader
            .pool()
            .typed_entry(self.reader.this_class(), Constant::CLASS)
    }

    /// Internal name of the class (eg. `java/lang/String`)
    pub fn name(&self) -> Result<&str, Error> {
        self.reader.pool().class_name(self.reader.this_class())
    }

    /// Superclass (`None` only for `java/lang/Object` and module descriptors)
    pub fn superclass(&self) -> Result<Option<PoolEntry>, Error> {
        match self.reader.super_class() {
            0 => Ok(None),
            index => Ok(Some(self.reader.pool().typed_entry(index, Constant::CLASS)?)),
        }
    }

    pub fn interfaces(&self) -> Result<Vec<PoolEntry>, Error> {
        self.reader
            .interfaces()
            .iter()
            .map(|index| self.reader.pool().typed_entry(*index, Constant::CLASS))
            .collect()
    }

    pub fn fields(&self) -> Result<Vec<FieldModel>, Error> {
        (0..self.reader.fields().len())
            .map(|index| FieldModel::bound(&self.reader, index))
            .collect()
    }

    pub fn methods(&self) -> Result<Vec<MethodModel>, Error> {
        (0..self.reader.methods().len())
            .map(|index| MethodModel::bound(&self.reader, index))
            .collect()
    }

    /// Class attributes (`BootstrapMethods` excluded, since it belongs to the constant pool)
    pub fn attributes(&self) -> Vec<Attribute> {
        self.reader
            .attributes()
            .iter()
            .map(|attribute| self.reader.bound_attribute(attribute))
            .collect()
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Result<Option<MethodModel>, Error> {
        for method in self.methods()? {
            if method.name()? == name && method.descriptor()? == descriptor {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }
}

impl CompoundElement for ClassModel {
    type Element = ClassElement;

    fn for_each_element(
        &self,
        callback: &mut dyn FnMut(ClassElement) -> Result<(), Error>,
    ) -> Result<(), Error> {
        callback(ClassElement::AccessFlags(self.flags()))?;
        callback(ClassElement::Version(self.version()))?;
        if let Some(superclass) = self.superclass()? {
            callback(ClassElement::Superclass(superclass))?;
        }
        callback(ClassElement::Interfaces(self.interfaces()?))?;
        for index in 0..self.reader.fields().len() {
            callback(ClassElement::Field(FieldModel::bound(&self.reader, index)?))?;
        }
        for index in 0..self.reader.methods().len() {
            callback(ClassElement::Method(MethodModel::bound(&self.reader, index)?))?;
        }
        for attribute in self.reader.attributes() {
            callback(ClassElement::Attribute(self.reader.bound_attribute(attribute)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ClassModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassModel")
            .field("name", &self.name().unwrap_or("<malformed>"))
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("fields", &self.reader.fields().len())
            .field("methods", &self.reader.methods().len())
            .finish()
    }
}
