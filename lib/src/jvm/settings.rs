use crate::jvm::attributes::AttributeMapper;
use std::sync::Arc;

/// Options which control parsing, building, and transforming
///
/// The same settings are used for the whole of a `parse`/`build`/`transform` call, including all
/// of the nested field, method, and code builders.
#[derive(Clone)]
pub struct Settings {
    /// Should a transformed class extend the constant pool of the class it came from?
    ///
    /// Sharing keeps every index of the original class valid, which means that untouched parts of
    /// the class can be copied verbatim and that an identity transform is byte-for-byte exact.
    pub constant_pool_sharing: ConstantPoolSharing,

    /// What to do with 16-bit branches whose offset doesn't fit
    pub short_jumps: ShortJumps,

    /// What to do with exception ranges and local variable ranges whose labels are never bound
    ///
    /// Branch targets must always be bound, regardless of this setting.
    pub dead_labels: DeadLabels,

    /// Which attributes to keep when copying or re-encoding
    pub attributes: AttributesPolicy,

    /// Should local variable (and local variable type) tables be kept?
    pub debug_elements: DebugElements,

    /// Should line number tables be kept?
    pub line_numbers: LineNumbers,

    /// Should existing stack map tables be kept (re-encoded against the new code layout)?
    ///
    /// Stack maps are never computed: code that is built from scratch and needs a stack map
    /// table must add one explicitly.
    pub stack_maps: StackMaps,

    /// Extra attribute mappers, consulted before the standard ones
    pub attribute_mappers: Vec<Arc<dyn AttributeMapper>>,

    /// Class hierarchy information, made available to builders and transforms
    pub class_hierarchy_resolver: Arc<dyn ClassHierarchyResolver>,
}

impl Settings {
    /// Are these settings such that copying parsed bytes verbatim drops nothing?
    pub(crate) fn keeps_everything(&self) -> bool {
        self.attributes == AttributesPolicy::PassAll
            && self.debug_elements == DebugElements::Pass
            && self.line_numbers == LineNumbers::Pass
            && self.stack_maps == StackMaps::Keep
    }

    /// Find a mapper by attribute name: user mappers first, then the standard ones
    pub fn mapper_for(&self, name: &str) -> Option<Arc<dyn AttributeMapper>> {
        self.attribute_mappers
            .iter()
            .find(|mapper| mapper.name() == name)
            .cloned()
            .or_else(|| crate::jvm::attributes::standard_mapper(name))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            constant_pool_sharing: ConstantPoolSharing::Shared,
            short_jumps: ShortJumps::Fix,
            dead_labels: DeadLabels::Fail,
            attributes: AttributesPolicy::PassAll,
            debug_elements: DebugElements::Pass,
            line_numbers: LineNumbers::Pass,
            stack_maps: StackMaps::Keep,
            attribute_mappers: vec![],
            class_hierarchy_resolver: Arc::new(DefaultClassHierarchyResolver),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstantPoolSharing {
    /// Extend the pool of the class being transformed
    Shared,

    /// Start from an empty pool (every constant is re-interned)
    New,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShortJumps {
    /// Rewrite oversized branches into `goto_w` based sequences
    Fix,

    /// Fail with [`crate::jvm::Error::ShortJumpOverflow`]
    Fail,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeadLabels {
    /// Fail with [`crate::jvm::Error::UnboundLabel`]
    Fail,

    /// Silently drop the range
    Drop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributesPolicy {
    /// Keep every attribute, including ones no mapper knows about
    PassAll,

    /// Drop attributes no mapper knows about
    DropUnknown,

    /// Drop attributes which are unknown or whose contents can't be trusted after a transform
    DropUnstable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebugElements {
    Pass,
    Drop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineNumbers {
    Pass,
    Drop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackMaps {
    Keep,
    Drop,
}

/// Source of class hierarchy information
///
/// Nothing in this crate queries the resolver itself: it is threaded through the builders so that
/// transforms (eg. ones which compute stack maps) can reach it.
pub trait ClassHierarchyResolver: Send + Sync {
    /// Internal name of the superclass (`None` for `java/lang/Object`, or if unknown)
    fn superclass_of(&self, class: &str) -> Option<String>;

    /// Is the class an interface? (`None` if unknown)
    fn is_interface(&self, class: &str) -> Option<bool>;
}

/// Resolver that only knows a handful of core `java.lang` classes
pub struct DefaultClassHierarchyResolver;

impl DefaultClassHierarchyResolver {
    const KNOWN: &'static [(&'static str, Option<&'static str>, bool)] = &[
        ("java/lang/Object", None, false),
        ("java/lang/String", Some("java/lang/Object"), false),
        ("java/lang/Throwable", Some("java/lang/Object"), false),
        ("java/lang/Exception", Some("java/lang/Throwable"), false),
        ("java/lang/RuntimeException", Some("java/lang/Exception"), false),
        ("java/lang/Error", Some("java/lang/Throwable"), false),
        ("java/lang/CharSequence", Some("java/lang/Object"), true),
        ("java/lang/Comparable", Some("java/lang/Object"), true),
        ("java/lang/Runnable", Some("java/lang/Object"), true),
    ];

    fn lookup(class: &str) -> Option<&'static (&'static str, Option<&'static str>, bool)> {
        Self::KNOWN.iter().find(|(name, _, _)| *name == class)
    }
}

impl ClassHierarchyResolver for DefaultClassHierarchyResolver {
    fn superclass_of(&self, class: &str) -> Option<String> {
        Self::lookup(class).and_then(|(_, superclass, _)| superclass.map(str::to_owned))
    }

    fn is_interface(&self, class: &str) -> Option<bool> {
        Self::lookup(class).map(|(_, _, is_interface)| *is_interface)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_resolver() {
        let resolver = DefaultClassHierarchyResolver;
        assert_eq!(
            resolver.superclass_of("java/lang/RuntimeException").as_deref(),
            Some("java/lang/Exception")
        );
        assert_eq!(resolver.superclass_of("java/lang/Object"), None);
        assert_eq!(resolver.is_interface("java/lang/Runnable"), Some(true));
        assert_eq!(resolver.is_interface("com/example/Unknown"), None);
    }

    #[test]
    fn default_settings_keep_everything() {
        let mut settings = Settings::default();
        assert!(settings.keeps_everything());
        settings.line_numbers = LineNumbers::Drop;
        assert!(!settings.keeps_everything());
    }
}
