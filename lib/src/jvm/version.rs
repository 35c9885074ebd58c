use crate::jvm::binary::{ByteWriter, Serialize};
use std::fmt;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::new(52, 0);

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version::new(55, 0);

    /// JVM class file version corresponding to Java SE 17 (released September 2021)
    pub const JAVA17: Version = Version::new(61, 0);

    /// JVM class file version corresponding to Java SE 21 (released September 2023)
    pub const JAVA21: Version = Version::new(65, 0);

    /// Oldest major version that can be parsed (JDK 1.0.2)
    pub const MIN_MAJOR: u16 = 45;

    /// Newest major version that can be parsed (Java SE 25)
    pub const MAX_MAJOR: u16 = 69;

    /// Version given to classes that are built without ever being told a version
    pub const DEFAULT: Version = Version::JAVA21;

    pub const fn new(major_version: u16, minor_version: u16) -> Version {
        Version {
            major_version,
            minor_version,
        }
    }

    pub fn is_supported(&self) -> bool {
        (Version::MIN_MAJOR..=Version::MAX_MAJOR).contains(&self.major_version)
    }

    /// Class files before Java 6 have no stack map frames and may still use `jsr`/`ret`
    pub fn has_stack_maps(&self) -> bool {
        self.major_version >= 50
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}

impl Serialize for Version {
    fn serialize(&self, writer: &mut ByteWriter) {
        self.minor_version.serialize(writer);
        self.major_version.serialize(writer);
    }
}
