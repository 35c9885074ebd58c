use super::{Attribute, AttributeMapper, AttributeStability, AttributeValue};
use crate::jvm::binary::{ByteReader, ByteWriter, Serialize};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::errors::u16_count;
use crate::jvm::{AttributesPolicy, Error, Settings};
use std::sync::Arc;

/// Encoded attributes of one structure, in order
///
/// Attributes which don't allow multiples replace an earlier attribute with the same name, in the
/// position of that earlier attribute.
#[derive(Default, Debug)]
pub(crate) struct AttributeList {
    entries: Vec<(String, Vec<u8>)>,
}

impl AttributeList {
    pub fn new() -> AttributeList {
        AttributeList::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Add an encoded attribute (`bytes` includes the name index and length)
    pub fn push(&mut self, name: &str, allow_multiple: bool, bytes: Vec<u8>) {
        if !allow_multiple {
            if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| existing == name) {
                log::debug!("Replacing earlier {} attribute", name);
                entry.1 = bytes;
                return;
            }
        }
        self.entries.push((name.to_owned(), bytes));
    }

    /// Insert an encoded attribute at a position (or at the end, if the position is past it)
    pub fn insert(&mut self, position: usize, name: &str, bytes: Vec<u8>) {
        let position = position.min(self.entries.len());
        self.entries.insert(position, (name.to_owned(), bytes));
    }

    /// Move all attributes of another list to the end of this one
    pub fn append(&mut self, mut other: AttributeList) {
        self.entries.append(&mut other.entries);
    }

    /// Reorder attributes by a key computed from their names (the sort is stable)
    pub fn sort_by_name_key<K: Ord>(&mut self, key: impl Fn(&str) -> K) {
        self.entries.sort_by_key(|(name, _)| key(name));
    }

    /// Write `attributes_count` and the attributes
    pub fn write(&self, writer: &mut ByteWriter) -> Result<(), Error> {
        u16_count("attributes", self.entries.len())?.serialize(writer);
        for (_, bytes) in &self.entries {
            writer.write_bytes(bytes);
        }
        Ok(())
    }
}

/// Does the attributes policy keep attributes of this stability?
fn policy_keeps(policy: AttributesPolicy, stability: AttributeStability) -> bool {
    match policy {
        AttributesPolicy::PassAll => true,
        AttributesPolicy::DropUnknown => stability != AttributeStability::Unknown,
        AttributesPolicy::DropUnstable => !matches!(
            stability,
            AttributeStability::Unknown | AttributeStability::Unstable
        ),
    }
}

/// Write an attribute header and a payload produced by a mapper
fn encode_value(
    name: &str,
    value: &AttributeValue,
    mapper: &dyn AttributeMapper,
    pool: &mut ConstantPoolBuilder,
    writer: &mut ByteWriter,
) -> Result<(), Error> {
    pool.intern_utf8(name)?.serialize(writer);
    let length = writer.begin_length();
    mapper.write(value, pool, writer)?;
    writer.end_length(length);
    Ok(())
}

/// Write an attribute header followed by opaque payload bytes
pub(crate) fn encode_raw(
    name: &str,
    payload: &[u8],
    pool: &mut ConstantPoolBuilder,
    writer: &mut ByteWriter,
) -> Result<(), Error> {
    pool.intern_utf8(name)?.serialize(writer);
    u32::try_from(payload.len())
        .map_err(|_| Error::TooMany {
            what: "attribute bytes",
            count: payload.len(),
        })?
        .serialize(writer);
    writer.write_bytes(payload);
    Ok(())
}

/// Encode an attribute into a list, unless the attributes policy drops it
pub(crate) fn write_attribute(
    attribute: &Attribute,
    pool: &mut ConstantPoolBuilder,
    settings: &Settings,
    list: &mut AttributeList,
) -> Result<(), Error> {
    let name = attribute.name();
    let mapper: Option<Arc<dyn AttributeMapper>> = match attribute {
        Attribute::Value(AttributeValue::Custom(custom)) => Some(custom.mapper.clone()),
        _ => settings.mapper_for(name),
    };
    let stability = mapper
        .as_ref()
        .map_or(AttributeStability::Unknown, |mapper| mapper.stability());
    if !policy_keeps(settings.attributes, stability) {
        log::debug!("Dropping {} attribute ({:?})", name, stability);
        return Ok(());
    }
    let allow_multiple = mapper.as_ref().map_or(true, |mapper| mapper.allow_multiple());

    let mut writer = ByteWriter::new();
    match (attribute, &mapper) {
        (Attribute::Bound(bound), _)
            if pool.is_compatible_with(bound.reader.pool())
                && stability != AttributeStability::Labels =>
        {
            writer.write_bytes(bound.raw_bytes());
        }
        (Attribute::Bound(bound), Some(mapper))
            if matches!(
                stability,
                AttributeStability::CpRefs | AttributeStability::Labels
            ) =>
        {
            let value = mapper.read(bound.reader.pool(), ByteReader::new(bound.payload()))?;
            encode_value(name, &value, mapper.as_ref(), pool, &mut writer)?;
        }
        (Attribute::Bound(bound), _) => encode_raw(name, bound.payload(), pool, &mut writer)?,
        (Attribute::Value(AttributeValue::Unknown { payload, .. }), _) => {
            encode_raw(name, payload, pool, &mut writer)?
        }
        (Attribute::Value(value), Some(mapper)) => {
            encode_value(name, value, mapper.as_ref(), pool, &mut writer)?
        }
        (Attribute::Value(_), None) => return Err(Error::MissingAttributeMapper(name.to_owned())),
    }
    list.push(name, allow_multiple, writer.into_bytes());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::constants::{Constant, PoolEntry};

    #[test]
    fn single_attributes_are_replaced_in_place() {
        let mut list = AttributeList::new();
        list.push("SourceFile", false, vec![1]);
        list.push("Custom", true, vec![2]);
        list.push("SourceFile", false, vec![3]);
        list.push("Custom", true, vec![4]);
        assert_eq!(list.len(), 3);

        let mut writer = ByteWriter::new();
        list.write(&mut writer).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 3, 3, 2, 4]);
    }

    #[test]
    fn policies_drop_unknown_attributes() {
        let unknown = Attribute::Value(AttributeValue::Unknown {
            name: String::from("Vendor"),
            payload: vec![9, 9],
        });
        let deprecated = Attribute::Value(AttributeValue::Deprecated);
        let mut settings = Settings::default();

        let mut pool = ConstantPoolBuilder::new();
        let mut list = AttributeList::new();
        write_attribute(&unknown, &mut pool, &settings, &mut list).unwrap();
        assert_eq!(list.len(), 1);

        settings.attributes = AttributesPolicy::DropUnknown;
        let mut list = AttributeList::new();
        write_attribute(&unknown, &mut pool, &settings, &mut list).unwrap();
        write_attribute(&deprecated, &mut pool, &settings, &mut list).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn values_are_encoded_with_their_mapper() {
        let settings = Settings::default();
        let mut pool = ConstantPoolBuilder::new();
        let mut list = AttributeList::new();
        let source = Attribute::Value(AttributeValue::SourceFile(PoolEntry::new(
            Constant::Utf8(String::from("Hello.java")),
        )));
        write_attribute(&source, &mut pool, &settings, &mut list).unwrap();

        let mut writer = ByteWriter::new();
        list.write(&mut writer).unwrap();
        // count, name #1 ("SourceFile"), length 2, value #2 ("Hello.java")
        assert_eq!(writer.as_bytes(), &[0, 1, 0, 1, 0, 0, 0, 2, 0, 2]);
    }
}
