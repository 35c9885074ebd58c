use super::{AttributeMapper, AttributeStability, AttributeValue, InnerClass, MethodParameter};
use crate::jvm::binary::{ByteReader, ByteWriter, Serialize};
use crate::jvm::constants::{Constant, ConstantPool, ConstantPoolBuilder, PoolEntry};
use crate::jvm::errors::u16_count;
use crate::jvm::{Error, InnerClassAccessFlags};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Mapper for one of the attributes defined by the JVM specification
#[derive(Copy, Clone)]
struct StandardMapper {
    name: &'static str,
    stability: AttributeStability,
    allow_multiple: bool,
}

/// Attributes which are never handled as standalone values: they get exploded into elements of
/// the structure they belong to (or into the constant pool, for `BootstrapMethods`)
const STRUCTURAL: &[&str] = &[
    "Code",
    "StackMapTable",
    "LineNumberTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
    "BootstrapMethods",
];

const STANDARD: &[StandardMapper] = &[
    StandardMapper::new("ConstantValue", AttributeStability::CpRefs, false),
    StandardMapper::new("Code", AttributeStability::Labels, false),
    StandardMapper::new("StackMapTable", AttributeStability::Labels, false),
    StandardMapper::new("Exceptions", AttributeStability::CpRefs, false),
    StandardMapper::new("InnerClasses", AttributeStability::CpRefs, false),
    StandardMapper::new("EnclosingMethod", AttributeStability::CpRefs, false),
    StandardMapper::new("Synthetic", AttributeStability::Stateless, false),
    StandardMapper::new("Signature", AttributeStability::CpRefs, false),
    StandardMapper::new("SourceFile", AttributeStability::CpRefs, false),
    StandardMapper::new("SourceDebugExtension", AttributeStability::Stateless, false),
    StandardMapper::new("LineNumberTable", AttributeStability::Labels, true),
    StandardMapper::new("LocalVariableTable", AttributeStability::Labels, true),
    StandardMapper::new("LocalVariableTypeTable", AttributeStability::Labels, true),
    StandardMapper::new("Deprecated", AttributeStability::Stateless, false),
    StandardMapper::new("BootstrapMethods", AttributeStability::CpRefs, false),
    StandardMapper::new("NestHost", AttributeStability::CpRefs, false),
    StandardMapper::new("NestMembers", AttributeStability::CpRefs, false),
    StandardMapper::new("PermittedSubclasses", AttributeStability::CpRefs, false),
    StandardMapper::new("MethodParameters", AttributeStability::CpRefs, false),
];

/// Look up the built-in mapper for a standard attribute
pub fn standard_mapper(name: &str) -> Option<Arc<dyn AttributeMapper>> {
    static TABLE: OnceLock<HashMap<&'static str, Arc<dyn AttributeMapper>>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            STANDARD
                .iter()
                .map(|mapper| {
                    let shared: Arc<dyn AttributeMapper> = Arc::new(*mapper);
                    (mapper.name, shared)
                })
                .collect()
        })
        .get(name)
        .cloned()
}

impl StandardMapper {
    const fn new(
        name: &'static str,
        stability: AttributeStability,
        allow_multiple: bool,
    ) -> StandardMapper {
        StandardMapper {
            name,
            stability,
            allow_multiple,
        }
    }

    fn read_classes(
        &self,
        pool: &ConstantPool,
        payload: ByteReader<'_>,
        count: usize,
        offset: usize,
    ) -> Result<Vec<PoolEntry>, Error> {
        (0..count)
            .map(|i| pool.typed_entry(payload.u2(offset + 2 * i)?, Constant::CLASS))
            .collect()
    }

    fn write_entries(
        &self,
        entries: &[PoolEntry],
        pool: &mut ConstantPoolBuilder,
        writer: &mut ByteWriter,
    ) -> Result<(), Error> {
        u16_count("attribute entries", entries.len())?.serialize(writer);
        for entry in entries {
            pool.index_of(entry)?.serialize(writer);
        }
        Ok(())
    }

    fn check_length(&self, payload: ByteReader<'_>, expected: usize) -> Result<(), Error> {
        if payload.len() == expected {
            Ok(())
        } else {
            Err(Error::malformed(
                self.name,
                format!("length is {}, expected {}", payload.len(), expected),
            ))
        }
    }
}

impl AttributeMapper for StandardMapper {
    fn name(&self) -> &str {
        self.name
    }

    fn stability(&self) -> AttributeStability {
        self.stability
    }

    fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    fn read(&self, pool: &ConstantPool, payload: ByteReader<'_>) -> Result<AttributeValue, Error> {
        let value = match self.name {
            "ConstantValue" => {
                self.check_length(payload, 2)?;
                AttributeValue::ConstantValue(pool.pool_entry(payload.u2(0)?)?)
            }
            "Exceptions" | "NestMembers" | "PermittedSubclasses" => {
                let count = payload.u2(0)? as usize;
                self.check_length(payload, 2 + 2 * count)?;
                let classes = self.read_classes(pool, payload, count, 2)?;
                match self.name {
                    "Exceptions" => AttributeValue::Exceptions(classes),
                    "NestMembers" => AttributeValue::NestMembers(classes),
                    _ => AttributeValue::PermittedSubclasses(classes),
                }
            }
            "InnerClasses" => {
                let count = payload.u2(0)? as usize;
                self.check_length(payload, 2 + 8 * count)?;
                let mut classes = Vec::with_capacity(count);
                for i in 0..count {
                    let offset = 2 + 8 * i;
                    classes.push(InnerClass {
                        inner_class: pool.typed_entry(payload.u2(offset)?, Constant::CLASS)?,
                        outer_class: pool.pool_entry_opt(payload.u2(offset + 2)?)?,
                        inner_name: pool.pool_entry_opt(payload.u2(offset + 4)?)?,
                        flags: InnerClassAccessFlags::from_bits_truncate(payload.u2(offset + 6)?),
                    });
                }
                AttributeValue::InnerClasses(classes)
            }
            "EnclosingMethod" => {
                self.check_length(payload, 4)?;
                AttributeValue::EnclosingMethod {
                    class: pool.typed_entry(payload.u2(0)?, Constant::CLASS)?,
                    method: pool.pool_entry_opt(payload.u2(2)?)?,
                }
            }
            "Synthetic" => {
                self.check_length(payload, 0)?;
                AttributeValue::Synthetic
            }
            "Deprecated" => {
                self.check_length(payload, 0)?;
                AttributeValue::Deprecated
            }
            "Signature" | "SourceFile" => {
                self.check_length(payload, 2)?;
                let utf8 = pool.typed_entry(payload.u2(0)?, Constant::UTF8)?;
                if self.name == "Signature" {
                    AttributeValue::Signature(utf8)
                } else {
                    AttributeValue::SourceFile(utf8)
                }
            }
            "SourceDebugExtension" => {
                AttributeValue::SourceDebugExtension(payload.copy_bytes(0, payload.len())?)
            }
            "NestHost" => {
                self.check_length(payload, 2)?;
                AttributeValue::NestHost(pool.typed_entry(payload.u2(0)?, Constant::CLASS)?)
            }
            "MethodParameters" => {
                let count = payload.u1(0)? as usize;
                self.check_length(payload, 1 + 4 * count)?;
                let mut parameters = Vec::with_capacity(count);
                for i in 0..count {
                    let offset = 1 + 4 * i;
                    parameters.push(MethodParameter {
                        name: pool.pool_entry_opt(payload.u2(offset)?)?,
                        flags: payload.u2(offset + 2)?,
                    });
                }
                AttributeValue::MethodParameters(parameters)
            }
            name if STRUCTURAL.contains(&name) => {
                return Err(Error::malformed(
                    name,
                    "only readable as part of the structure it belongs to",
                ))
            }
            name => return Err(Error::MissingAttributeMapper(name.to_owned())),
        };
        Ok(value)
    }

    fn write(
        &self,
        value: &AttributeValue,
        pool: &mut ConstantPoolBuilder,
        writer: &mut ByteWriter,
    ) -> Result<(), Error> {
        match value {
            AttributeValue::ConstantValue(entry)
            | AttributeValue::Signature(entry)
            | AttributeValue::SourceFile(entry)
            | AttributeValue::NestHost(entry) => pool.index_of(entry)?.serialize(writer),
            AttributeValue::Exceptions(entries)
            | AttributeValue::NestMembers(entries)
            | AttributeValue::PermittedSubclasses(entries) => {
                self.write_entries(entries, pool, writer)?
            }
            AttributeValue::InnerClasses(classes) => {
                u16_count("inner classes", classes.len())?.serialize(writer);
                for class in classes {
                    pool.index_of(&class.inner_class)?.serialize(writer);
                    pool.index_of_opt(class.outer_class.as_ref())?.serialize(writer);
                    pool.index_of_opt(class.inner_name.as_ref())?.serialize(writer);
                    class.flags.bits().serialize(writer);
                }
            }
            AttributeValue::EnclosingMethod { class, method } => {
                pool.index_of(class)?.serialize(writer);
                pool.index_of_opt(method.as_ref())?.serialize(writer);
            }
            AttributeValue::Synthetic | AttributeValue::Deprecated => (),
            AttributeValue::SourceDebugExtension(bytes) => writer.write_bytes(bytes),
            AttributeValue::MethodParameters(parameters) => {
                let count = u8::try_from(parameters.len()).map_err(|_| Error::TooMany {
                    what: "method parameters",
                    count: parameters.len(),
                })?;
                count.serialize(writer);
                for parameter in parameters {
                    pool.index_of_opt(parameter.name.as_ref())?.serialize(writer);
                    parameter.flags.serialize(writer);
                }
            }
            AttributeValue::Unknown { name, .. } => {
                return Err(Error::MissingAttributeMapper(name.clone()))
            }
            AttributeValue::Custom(custom) => {
                return Err(Error::MissingAttributeMapper(custom.mapper.name().to_owned()))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_covers_standard_attributes() {
        for name in ["Code", "ConstantValue", "SourceFile", "MethodParameters", "NestHost"] {
            let mapper = standard_mapper(name).expect("standard mapper");
            assert_eq!(mapper.name(), name);
        }
        assert!(standard_mapper("RuntimeVisibleAnnotations").is_none());
        assert_eq!(
            standard_mapper("Deprecated").unwrap().stability(),
            AttributeStability::Stateless
        );
        assert!(standard_mapper("LineNumberTable").unwrap().allow_multiple());
        assert!(!standard_mapper("SourceFile").unwrap().allow_multiple());
    }

    #[test]
    fn exceptions_are_rewritten_against_the_new_pool() {
        let mapper = standard_mapper("Exceptions").unwrap();
        let mut pool = ConstantPoolBuilder::new();
        pool.utf8_entry("padding").unwrap();
        let value = AttributeValue::Exceptions(vec![
            PoolEntry::new(Constant::Class("java/io/IOException".to_owned())),
        ]);
        let mut writer = ByteWriter::new();
        mapper.write(&value, &mut pool, &mut writer).unwrap();

        // count 1, then the class entry (its utf8 name is interned first, at index 2)
        assert_eq!(writer.as_bytes(), &[0, 1, 0, 3]);
    }

    #[test]
    fn structural_attributes_are_not_values() {
        let bytes: Arc<[u8]> = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0, 1].into();
        let empty = ConstantPool::parse(bytes, 1).unwrap();
        let mapper = standard_mapper("LineNumberTable").unwrap();
        assert!(mapper.read(&empty, ByteReader::new(&[0, 0])).is_err());

        let mapper = standard_mapper("Synthetic").unwrap();
        assert!(matches!(
            mapper.read(&empty, ByteReader::new(&[])),
            Ok(AttributeValue::Synthetic)
        ));
        assert!(mapper.read(&empty, ByteReader::new(&[1])).is_err());
    }
}
