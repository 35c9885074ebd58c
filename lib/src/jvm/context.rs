use crate::jvm::builder::{ClassBuilder, DirectClassWriter};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::descriptors::require_class_name;
use crate::jvm::model::ClassModel;
use crate::jvm::transform::ClassTransform;
use crate::jvm::{ConstantPoolSharing, Error, Settings};
use std::sync::Arc;

/// Entry point for parsing, building, and transforming classes under some [`Settings`]
///
/// ```
/// use classkit::jvm::{ClassFile, Identity};
///
/// # fn copy(bytes: Vec<u8>) -> Result<(), classkit::jvm::Error> {
/// let context = ClassFile::new();
/// let class = context.parse(bytes.clone())?;
/// let copied = context.transform(&class, &mut Identity)?;
/// assert_eq!(copied, bytes);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ClassFile {
    settings: Arc<Settings>,
}

impl ClassFile {
    pub fn new() -> ClassFile {
        ClassFile::default()
    }

    pub fn with_settings(settings: Settings) -> ClassFile {
        ClassFile {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Parse class file bytes
    ///
    /// This only checks the outline of the class. Malformed contents (eg. a bad instruction in a
    /// method body) are reported when that part of the model is traversed.
    pub fn parse(&self, bytes: impl Into<Arc<[u8]>>) -> Result<ClassModel, Error> {
        ClassModel::parse(bytes, self.settings.clone())
    }

    /// Build a class from scratch, given its internal name
    pub fn build(
        &self,
        this_class: &str,
        handler: impl FnOnce(&mut ClassBuilder<'_>) -> Result<(), Error>,
    ) -> Result<Vec<u8>, Error> {
        require_class_name(this_class)?;
        let mut pool = ConstantPoolBuilder::new();
        let this_entry = pool.class_entry(this_class)?;
        let mut writer = DirectClassWriter::new(pool, self.settings.clone(), this_entry)?;
        handler(&mut ClassBuilder::new(&mut writer))?;
        writer.finish()
    }

    /// Rebuild a parsed class through a transform
    ///
    /// With [`ConstantPoolSharing::Shared`], the new class extends the constant pool of the old
    /// one, so anything the transform passes through unchanged keeps its exact encoding.
    pub fn transform(
        &self,
        class: &ClassModel,
        transform: &mut dyn ClassTransform,
    ) -> Result<Vec<u8>, Error> {
        let pool = match self.settings.constant_pool_sharing {
            ConstantPoolSharing::Shared => {
                ConstantPoolBuilder::shared(class.constant_pool().clone())?
            }
            ConstantPoolSharing::New => ConstantPoolBuilder::new(),
        };
        let mut writer = DirectClassWriter::new(pool, self.settings.clone(), class.this_class()?)?;
        log::debug!(
            "Transforming class {} ({:?} constant pool)",
            class.name()?,
            self.settings.constant_pool_sharing
        );
        ClassBuilder::new(&mut writer).transform(class, transform)?;
        writer.finish()
    }
}
