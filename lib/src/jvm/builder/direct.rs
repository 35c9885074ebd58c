use super::ClassSink;
use crate::jvm::attributes::{write_attribute, AttributeList};
use crate::jvm::binary::{ByteWriter, Serialize};
use crate::jvm::code::CodeWriter;
use crate::jvm::constants::{ConstantPoolBuilder, PoolEntry};
use crate::jvm::elements::{ClassElement, CompoundElement, FieldElement, MethodElement};
use crate::jvm::errors::u16_count;
use crate::jvm::model::{ClassReader, CodeModel, FieldModel, MethodInfo, MethodModel, MAGIC};
use crate::jvm::{
    ClassAccessFlags, Error, FieldAccessFlags, MethodAccessFlags, Settings, Version,
};
use std::sync::Arc;

/// Terminal class sink: writes members into class file bytes as they arrive
///
/// Members which come straight out of a parsed class are copied verbatim whenever that is
/// equivalent to re-encoding them (same constant pool, and nothing dropped on either side).
pub(crate) struct DirectClassWriter {
    pool: ConstantPoolBuilder,
    settings: Arc<Settings>,
    this_class: PoolEntry,
    this_name: String,
    version: Version,
    flags: ClassAccessFlags,
    superclass: Option<PoolEntry>,
    interfaces: Vec<PoolEntry>,
    field_count: usize,
    fields: ByteWriter,
    method_count: usize,
    methods: ByteWriter,
    attributes: AttributeList,
}

impl DirectClassWriter {
    pub fn new(
        pool: ConstantPoolBuilder,
        settings: Arc<Settings>,
        this_class: PoolEntry,
    ) -> Result<DirectClassWriter, Error> {
        let this_name = this_class.as_class()?.to_owned();
        Ok(DirectClassWriter {
            pool,
            settings,
            this_class,
            this_name,
            version: Version::DEFAULT,
            flags: ClassAccessFlags::PUBLIC,
            superclass: None,
            interfaces: vec![],
            field_count: 0,
            fields: ByteWriter::new(),
            method_count: 0,
            methods: ByteWriter::new(),
            attributes: AttributeList::new(),
        })
    }

    /// Can a member parsed by `reader` be copied verbatim into this class?
    fn can_copy_from(&self, reader: &ClassReader) -> bool {
        self.pool.is_compatible_with(reader.pool())
            && self.settings.keeps_everything()
            && reader.settings().keeps_everything()
    }

    fn write_field(&mut self, field: &FieldModel) -> Result<(), Error> {
        if let Some((reader, range)) = field.bound_source() {
            if self.can_copy_from(reader) {
                self.fields.write_bytes(&reader.bytes()[range.range.clone()]);
                self.field_count += 1;
                return Ok(());
            }
        }

        let mut flags = FieldAccessFlags::empty();
        let mut attributes = AttributeList::new();
        field.for_each_element(&mut |element| match element {
            FieldElement::AccessFlags(new_flags) => {
                flags = new_flags;
                Ok(())
            }
            FieldElement::Attribute(attribute) => {
                write_attribute(&attribute, &mut self.pool, &self.settings, &mut attributes)
            }
        })?;

        flags.serialize(&mut self.fields);
        self.pool.index_of(field.name_entry())?.serialize(&mut self.fields);
        self.pool.index_of(field.descriptor_entry())?.serialize(&mut self.fields);
        attributes.write(&mut self.fields)?;
        self.field_count += 1;
        Ok(())
    }

    fn write_method(&mut self, method: &MethodModel) -> Result<(), Error> {
        if let Some((reader, range)) = method.bound_source() {
            if self.can_copy_from(reader) {
                self.methods.write_bytes(&reader.bytes()[range.range.clone()]);
                self.method_count += 1;
                return Ok(());
            }
        }

        let info = method.info()?;
        let mut flags = MethodAccessFlags::empty();
        let mut attributes = AttributeList::new();
        method.for_each_element(&mut |element| match element {
            MethodElement::AccessFlags(new_flags) => {
                flags = new_flags;
                Ok(())
            }
            MethodElement::Code(code) => self.write_code(&info, &code, &mut attributes),
            MethodElement::Attribute(attribute) => {
                write_attribute(&attribute, &mut self.pool, &self.settings, &mut attributes)
            }
        })?;

        flags.serialize(&mut self.methods);
        self.pool.index_of(method.name_entry())?.serialize(&mut self.methods);
        self.pool.index_of(method.descriptor_entry())?.serialize(&mut self.methods);
        attributes.write(&mut self.methods)?;
        self.method_count += 1;
        Ok(())
    }

    fn write_code(
        &mut self,
        method: &MethodInfo,
        code: &CodeModel,
        attributes: &mut AttributeList,
    ) -> Result<(), Error> {
        if let Some((reader, range)) = code.bound_source() {
            if self.can_copy_from(reader) {
                let bytes = reader.bytes()[range.full_range()].to_vec();
                attributes.push("Code", false, bytes);
                return Ok(());
            }
        }

        let hints = code.hints()?;
        let mut writer = CodeWriter::new(&mut self.pool, &self.settings);
        code.for_each_element(&mut |element| writer.accept(element))?;
        let bytes = writer.finish(method.first_free_slot(), Some(&hints))?;
        log::trace!(
            "Encoded code of {}{} ({} bytes)",
            method.name(),
            method.descriptor(),
            bytes.len()
        );
        attributes.push("Code", false, bytes);
        Ok(())
    }

    /// Assemble the class file
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        let this_index = self.pool.index_of(&self.this_class)?;
        let super_index = match &self.superclass {
            Some(superclass) => self.pool.index_of(superclass)?,
            None if self.this_name == "java/lang/Object"
                || self.flags.contains(ClassAccessFlags::MODULE) =>
            {
                0
            }
            None => {
                let object = self.pool.class_entry("java/lang/Object")?;
                self.pool.index_of(&object)?
            }
        };
        let interface_indices = self
            .interfaces
            .iter()
            .map(|interface| self.pool.index_of(interface))
            .collect::<Result<Vec<u16>, Error>>()?;

        // Bootstrap methods are only final once every other constant has been interned
        if let Some((name_index, body)) = self.pool.bootstrap_methods_attribute()? {
            let mut attribute = ByteWriter::with_capacity(body.len() + 6);
            name_index.serialize(&mut attribute);
            let length = u32::try_from(body.len()).map_err(|_| Error::TooMany {
                what: "attribute bytes",
                count: body.len(),
            })?;
            length.serialize(&mut attribute);
            attribute.write_bytes(&body);
            match self.pool.bootstrap_methods_position() {
                Some(position) => {
                    self.attributes
                        .insert(position, "BootstrapMethods", attribute.into_bytes())
                }
                None => self
                    .attributes
                    .push("BootstrapMethods", false, attribute.into_bytes()),
            }
        }

        let mut writer = ByteWriter::with_capacity(
            self.fields.position() + self.methods.position() + 1024,
        );
        MAGIC.serialize(&mut writer);
        self.version.serialize(&mut writer);
        self.pool.write(&mut writer);
        self.flags.serialize(&mut writer);
        this_index.serialize(&mut writer);
        super_index.serialize(&mut writer);
        u16_count("interfaces", interface_indices.len())?.serialize(&mut writer);
        for index in interface_indices {
            index.serialize(&mut writer);
        }
        u16_count("fields", self.field_count)?.serialize(&mut writer);
        writer.write_bytes(self.fields.as_bytes());
        u16_count("methods", self.method_count)?.serialize(&mut writer);
        writer.write_bytes(self.methods.as_bytes());
        self.attributes.write(&mut writer)?;

        log::debug!(
            "Wrote class {} ({} fields, {} methods, {} bytes)",
            self.this_name,
            self.field_count,
            self.method_count,
            writer.position()
        );
        Ok(writer.into_bytes())
    }
}

impl ClassSink for DirectClassWriter {
    fn accept(&mut self, element: ClassElement) -> Result<(), Error> {
        match element {
            ClassElement::AccessFlags(flags) => self.flags = flags,
            ClassElement::Version(version) => self.version = version,
            ClassElement::Superclass(superclass) => self.superclass = Some(superclass),
            ClassElement::Interfaces(interfaces) => self.interfaces = interfaces,
            ClassElement::Field(field) => self.write_field(&field)?,
            ClassElement::Method(method) => self.write_method(&method)?,
            ClassElement::Attribute(attribute) => write_attribute(
                &attribute,
                &mut self.pool,
                &self.settings,
                &mut self.attributes,
            )?,
        }
        Ok(())
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        &mut self.pool
    }

    fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    fn this_class(&self) -> &str {
        &self.this_name
    }
}
