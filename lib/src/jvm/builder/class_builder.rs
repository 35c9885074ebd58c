use super::{
    BufferedFieldSink, BufferedMethodSink, ClassSink, FieldBuilder, MethodBuilder,
};
use crate::jvm::attributes::{Attribute, AttributeValue};
use crate::jvm::constants::{ConstantPoolBuilder, PoolEntry};
use crate::jvm::descriptors::{field_type_kind, require_class_name};
use crate::jvm::elements::{ClassElement, CompoundElement};
use crate::jvm::model::{ClassModel, FieldModel, MethodInfo, MethodModel};
use crate::jvm::transform::{ClassTransform, FieldTransform, MethodTransform};
use crate::jvm::{
    ClassAccessFlags, ClassHierarchyResolver, Error, FieldAccessFlags, MethodAccessFlags,
    Settings, Version,
};
use std::sync::Arc;

/// Builder for a class
///
/// Class elements have these cardinalities:
///
///   - access flags and version: exactly once (the last one given wins, with defaults of
///     `PUBLIC` and [`Version::DEFAULT`])
///   - superclass and interfaces: at most once (the last one given wins, the superclass defaults
///     to `java/lang/Object`)
///   - fields, methods, and attributes: any number, kept in order (except for attributes that
///     only allow one instance, where a later instance replaces an earlier one)
///
/// Members are handed to the sink as soon as their own builder is done, so a class builder never
/// holds onto more than one member at a time.
pub struct ClassBuilder<'b> {
    pub(crate) sink: &'b mut dyn ClassSink,
}

impl<'b> ClassBuilder<'b> {
    pub(crate) fn new(sink: &'b mut dyn ClassSink) -> ClassBuilder<'b> {
        ClassBuilder { sink }
    }

    /// Add an element
    pub fn with(&mut self, element: impl Into<ClassElement>) -> Result<&mut Self, Error> {
        self.sink.accept(element.into())?;
        Ok(self)
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.sink.constant_pool()
    }

    pub fn settings(&self) -> &Settings {
        self.sink.settings()
    }

    pub fn class_hierarchy_resolver(&self) -> &dyn ClassHierarchyResolver {
        self.sink.settings().class_hierarchy_resolver.as_ref()
    }

    /// Internal name of the class being built
    pub fn this_class(&self) -> &str {
        self.sink.this_class()
    }

    pub fn with_flags(&mut self, flags: ClassAccessFlags) -> Result<&mut Self, Error> {
        self.with(ClassElement::AccessFlags(flags))
    }

    pub fn with_version(&mut self, version: Version) -> Result<&mut Self, Error> {
        self.with(ClassElement::Version(version))
    }

    /// Set the superclass, by internal name
    pub fn with_superclass(&mut self, name: &str) -> Result<&mut Self, Error> {
        require_class_name(name)?;
        let entry = self.constant_pool().class_entry(name)?;
        self.with(ClassElement::Superclass(entry))
    }

    /// Set the interfaces, by internal name
    pub fn with_interfaces(&mut self, names: &[&str]) -> Result<&mut Self, Error> {
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            require_class_name(name)?;
            entries.push(self.constant_pool().class_entry(*name)?);
        }
        self.with(ClassElement::Interfaces(entries))
    }

    pub fn with_attribute(&mut self, value: AttributeValue) -> Result<&mut Self, Error> {
        self.with(ClassElement::Attribute(Attribute::Value(value)))
    }

    /// Add a field, building its remaining elements with `handler`
    pub fn with_field(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: FieldAccessFlags,
        handler: impl FnOnce(&mut FieldBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        field_type_kind(descriptor)?;
        let name_entry = self.constant_pool().utf8_entry(name)?;
        let descriptor_entry = self.constant_pool().utf8_entry(descriptor)?;
        let model = self.buffer_field(name_entry, descriptor_entry, |builder| {
            builder.with_flags(flags)?;
            handler(builder)
        })?;
        self.with(ClassElement::Field(model))
    }

    /// Add a method, building its remaining elements with `handler`
    pub fn with_method(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
        handler: impl FnOnce(&mut MethodBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let info = MethodInfo::new(name, descriptor, flags)?;
        let name_entry = self.constant_pool().utf8_entry(name)?;
        let descriptor_entry = self.constant_pool().utf8_entry(descriptor)?;
        let model = self.buffer_method(name_entry, descriptor_entry, info, |builder| {
            builder.with_flags(flags)?;
            handler(builder)
        })?;
        self.with(ClassElement::Method(model))
    }

    /// Add a method whose body is built with `handler`
    pub fn with_method_body(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
        handler: impl FnOnce(&mut crate::jvm::code::CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.with_method(name, descriptor, flags, |method| {
            method.with_code(handler)?;
            Ok(())
        })
    }

    /// Rebuild a field through a transform
    pub fn transform_field(
        &mut self,
        field: &FieldModel,
        transform: &mut dyn FieldTransform,
    ) -> Result<&mut Self, Error> {
        let model = self.buffer_field(
            field.name_entry().clone(),
            field.descriptor_entry().clone(),
            |builder| builder.transform(field, transform).map(|_| ()),
        )?;
        self.with(ClassElement::Field(model))
    }

    /// Rebuild a method through a transform
    pub fn transform_method(
        &mut self,
        method: &MethodModel,
        transform: &mut dyn MethodTransform,
    ) -> Result<&mut Self, Error> {
        let model = self.buffer_method(
            method.name_entry().clone(),
            method.descriptor_entry().clone(),
            method.info()?,
            |builder| builder.transform(method, transform).map(|_| ()),
        )?;
        self.with(ClassElement::Method(model))
    }

    /// Run a transform over the elements of a class, feeding the results into this builder
    pub fn transform(
        &mut self,
        class: &ClassModel,
        transform: &mut dyn ClassTransform,
    ) -> Result<&mut Self, Error> {
        transform.at_start(self)?;
        class.for_each_element(&mut |element| transform.accept(self, element))?;
        transform.at_end(self)?;
        Ok(self)
    }

    fn buffer_field(
        &mut self,
        name: PoolEntry,
        descriptor: PoolEntry,
        handler: impl FnOnce(&mut FieldBuilder<'_>) -> Result<(), Error>,
    ) -> Result<FieldModel, Error> {
        let settings = self.sink.settings().clone();
        let mut sink = BufferedFieldSink::new(self.sink.constant_pool(), settings);
        handler(&mut FieldBuilder::new(&mut sink))?;
        Ok(FieldModel::buffered(name, descriptor, sink.into_elements()))
    }

    fn buffer_method(
        &mut self,
        name: PoolEntry,
        descriptor: PoolEntry,
        info: MethodInfo,
        handler: impl FnOnce(&mut MethodBuilder<'_>) -> Result<(), Error>,
    ) -> Result<MethodModel, Error> {
        let settings = self.sink.settings().clone();
        let mut sink = BufferedMethodSink::new(self.sink.constant_pool(), settings, Arc::new(info));
        handler(&mut MethodBuilder::new(&mut sink))?;
        Ok(MethodModel::buffered(name, descriptor, sink.into_elements()))
    }
}
