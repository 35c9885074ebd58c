use crate::jvm::attributes::{Attribute, BoundAttribute};
use crate::jvm::binary::ByteReader;
use crate::jvm::constants::{BootstrapTable, ConstantPool};
use crate::jvm::{Error, Settings, Version};
use crate::util::fresh_id;
use std::ops::Range;
use std::sync::Arc;

/// Magic number at the start of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Location of an attribute in the class file
#[derive(Clone, Debug)]
pub(crate) struct AttributeRange {
    pub name_index: u16,

    /// Decoded name (names are needed up front to recognize `Code` and friends)
    pub name: String,

    /// Bytes after the name index and length
    pub payload: Range<usize>,
}

impl AttributeRange {
    /// Range of the whole attribute, header included
    pub fn full_range(&self) -> Range<usize> {
        self.payload.start - 6..self.payload.end
    }
}

/// Location of a field or method in the class file
#[derive(Clone, Debug)]
pub(crate) struct MemberRange {
    /// Range of the whole `field_info` or `method_info`
    pub range: Range<usize>,
    pub flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeRange>,
}

/// Parsed structure of a class file
///
/// The structure (where every member and attribute starts and ends) is scanned eagerly, but
/// nothing inside attributes or method bodies is decoded until it is asked for. The reader owns
/// the class bytes, so models that come out of it can be held onto independently of the buffer
/// that was parsed.
pub struct ClassReader {
    bytes: Arc<[u8]>,
    settings: Arc<Settings>,
    pool: Arc<ConstantPool>,
    version: Version,
    flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberRange>,
    methods: Vec<MemberRange>,

    /// Class attributes, except `BootstrapMethods` (which belongs to the pool)
    attributes: Vec<AttributeRange>,
}

impl ClassReader {
    pub fn parse(bytes: Arc<[u8]>, settings: Arc<Settings>) -> Result<Arc<ClassReader>, Error> {
        let id = fresh_id();
        let reader = ByteReader::new(&bytes);
        let magic = reader.u4(0)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::new(reader.u2(6)?, reader.u2(4)?);
        if !version.is_supported() {
            return Err(Error::UnsupportedVersion {
                major: version.major_version,
                minor: version.minor_version,
            });
        }

        let mut pool = ConstantPool::parse(bytes.clone(), id)?;
        let mut offset = pool.end_offset();
        let flags = reader.u2(offset)?;
        let this_class = reader.u2(offset + 2)?;
        let super_class = reader.u2(offset + 4)?;
        let interface_count = reader.u2(offset + 6)? as usize;
        offset += 8;
        let interfaces = (0..interface_count)
            .map(|i| reader.u2(offset + 2 * i))
            .collect::<Result<Vec<u16>, Error>>()?;
        offset += 2 * interface_count;

        let fields = scan_members(reader, &pool, &mut offset)?;
        let methods = scan_members(reader, &pool, &mut offset)?;
        let mut attributes = scan_attributes(reader, &pool, &mut offset)?;
        if offset != bytes.len() {
            return Err(Error::malformed(
                "class file",
                format!("{} trailing bytes", bytes.len() - offset),
            ));
        }

        if let Some(position) = attributes.iter().position(|a| a.name == "BootstrapMethods") {
            let attribute = attributes.remove(position);
            let table = scan_bootstrap_methods(reader, attribute, position)?;
            pool.set_bootstrap_table(table);
        }
        log::trace!(
            "Scanned class file: {} fields, {} methods, {} attributes",
            fields.len(),
            methods.len(),
            attributes.len()
        );

        Ok(Arc::new(ClassReader {
            bytes,
            settings,
            pool: Arc::new(pool),
            version,
            flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        }))
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn pool(&self) -> &Arc<ConstantPool> {
        &self.pool
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.bytes)
    }

    pub(crate) fn flags(&self) -> u16 {
        self.flags
    }

    pub(crate) fn this_class(&self) -> u16 {
        self.this_class
    }

    pub(crate) fn super_class(&self) -> u16 {
        self.super_class
    }

    pub(crate) fn interfaces(&self) -> &[u16] {
        &self.interfaces
    }

    pub(crate) fn fields(&self) -> &[MemberRange] {
        &self.fields
    }

    pub(crate) fn methods(&self) -> &[MemberRange] {
        &self.methods
    }

    pub(crate) fn attributes(&self) -> &[AttributeRange] {
        &self.attributes
    }

    /// Wrap an attribute range into a lazily decoded attribute
    pub(crate) fn bound_attribute(self: &Arc<Self>, range: &AttributeRange) -> Attribute {
        Attribute::Bound(BoundAttribute {
            reader: self.clone(),
            name: range.name.clone(),
            payload: range.payload.clone(),
        })
    }
}

fn scan_members(
    reader: ByteReader<'_>,
    pool: &ConstantPool,
    offset: &mut usize,
) -> Result<Vec<MemberRange>, Error> {
    let count = reader.u2(*offset)?;
    *offset += 2;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = *offset;
        let flags = reader.u2(start)?;
        let name_index = reader.u2(start + 2)?;
        let descriptor_index = reader.u2(start + 4)?;
        *offset += 6;
        let attributes = scan_attributes(reader, pool, offset)?;
        members.push(MemberRange {
            range: start..*offset,
            flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

pub(crate) fn scan_attributes(
    reader: ByteReader<'_>,
    pool: &ConstantPool,
    offset: &mut usize,
) -> Result<Vec<AttributeRange>, Error> {
    let count = reader.u2(*offset)?;
    *offset += 2;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.u2(*offset)?;
        let length = reader.u4(*offset + 2)? as usize;
        let start = *offset + 6;
        reader.bytes(start, length)?;
        attributes.push(AttributeRange {
            name_index,
            name: pool.utf8(name_index)?.to_owned(),
            payload: start..start + length,
        });
        *offset = start + length;
    }
    Ok(attributes)
}

fn scan_bootstrap_methods(
    reader: ByteReader<'_>,
    attribute: AttributeRange,
    position: usize,
) -> Result<BootstrapTable, Error> {
    let count = reader.u2(attribute.payload.start)?;
    let mut offset = attribute.payload.start + 2;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(offset);
        let arguments = reader.u2(offset + 2)? as usize;
        offset += 4 + 2 * arguments;
    }
    if offset != attribute.payload.end {
        return Err(Error::malformed(
            "BootstrapMethods",
            "entries do not match the attribute length",
        ));
    }
    Ok(BootstrapTable {
        position,
        name_index: attribute.name_index,
        entries,
    })
}
