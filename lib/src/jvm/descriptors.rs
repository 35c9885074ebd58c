use crate::jvm::code::TypeKind;
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};

impl Width for TypeKind {
    fn width(&self) -> usize {
        self.slot_size() as usize
    }
}

/// Shape of a method descriptor, reduced to what code generation needs
///
/// Only the kinds of the parameters and return value are kept (class names are not). That is
/// enough to lay out local variable slots and to compute the stack effect of invocations.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.3.3
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodDescriptor {
    /// Parameters, keyed by their local slot offset (relative to the first parameter)
    pub parameters: OffsetVec<TypeKind>,

    /// Return kind (`Void` for `V`)
    pub return_type: TypeKind,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, Error> {
        let bad = || Error::BadDescriptor(descriptor.to_owned());
        let rest = descriptor.strip_prefix('(').ok_or_else(bad)?;
        let close = rest.find(')').ok_or_else(bad)?;
        let (mut params, ret) = (&rest[..close], &rest[close + 1..]);

        let mut parameters = OffsetVec::new();
        while !params.is_empty() {
            let len = field_descriptor_len(params).ok_or_else(bad)?;
            parameters.push(TypeKind::from_descriptor(&params[..len])?);
            params = &params[len..];
        }

        let return_type = if ret == "V" {
            TypeKind::Void
        } else {
            match field_descriptor_len(ret) {
                Some(len) if len == ret.len() => TypeKind::from_descriptor(ret)?,
                _ => return Err(bad()),
            }
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Number of local variable slots taken up by the parameters
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.offset_len().0 as u16
    }

    /// Slot offset of a parameter (relative to the first parameter)
    pub fn parameter_offset(&self, index: usize) -> Result<u16, Error> {
        self.parameters
            .get_index(index)
            .map(|(Offset(offset), _)| offset as u16)
            .ok_or(Error::ParameterOutOfRange {
                index,
                count: self.parameters.len(),
            })
    }
}

/// Length of the field descriptor at the start of `descriptor`
fn field_descriptor_len(descriptor: &str) -> Option<usize> {
    let bytes = descriptor.as_bytes();
    let dims = bytes.iter().take_while(|b| **b == b'[').count();
    match bytes.get(dims)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(dims + 1),
        b'L' => {
            let semi = descriptor[dims..].find(';')?;
            (semi > 1).then_some(dims + semi + 1)
        }
        _ => None,
    }
}

/// Check that a string is a complete field descriptor, returning the kind of value it describes
pub fn field_type_kind(descriptor: &str) -> Result<TypeKind, Error> {
    match field_descriptor_len(descriptor) {
        Some(len) if len == descriptor.len() => TypeKind::from_descriptor(descriptor),
        _ => Err(Error::BadDescriptor(descriptor.to_owned())),
    }
}

/// Check that a name can be used where the class file wants a class constant
///
/// Class constants hold either an internal name (`java/lang/String`) or an array descriptor
/// (`[I`). A primitive descriptor is never valid there.
pub fn require_class_name(name: &str) -> Result<(), Error> {
    match name {
        "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" | "V" => {
            Err(Error::PrimitiveWhereClassRequired(name.to_owned()))
        }
        "" => Err(Error::BadDescriptor(String::new())),
        _ if name.starts_with('[') => field_type_kind(name).map(|_| ()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_method_descriptors() {
        let descriptor = MethodDescriptor::parse("(IJ[Ljava/lang/String;D)Z").unwrap();
        let kinds: Vec<TypeKind> = descriptor.parameters.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TypeKind::Int,
                TypeKind::Long,
                TypeKind::Reference,
                TypeKind::Double
            ]
        );
        assert_eq!(descriptor.return_type, TypeKind::Boolean);
        assert_eq!(descriptor.parameter_slots(), 6);
        assert_eq!(descriptor.parameter_offset(2).unwrap(), 3);
        assert!(descriptor.parameter_offset(4).is_err());

        let main = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(main.return_type, TypeKind::Void);
        assert_eq!(main.parameter_slots(), 1);
    }

    #[test]
    fn reject_bad_descriptors() {
        for bad in ["", "()", "(I", "I)V", "(L;)V", "(Q)V", "()VV", "([)V", "()Ljava/lang/Object"] {
            assert!(MethodDescriptor::parse(bad).is_err(), "{:?} should not parse", bad);
        }
        assert!(field_type_kind("Ljava/lang/Object;").is_ok());
        assert!(field_type_kind("II").is_err());
    }

    #[test]
    fn class_names() {
        assert!(require_class_name("java/lang/Object").is_ok());
        assert!(require_class_name("[[I").is_ok());
        match require_class_name("I") {
            Err(Error::PrimitiveWhereClassRequired(name)) => assert_eq!(name, "I"),
            other => panic!("expected primitive error, got {:?}", other),
        }
    }
}
