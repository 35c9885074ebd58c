use super::FieldSink;
use crate::jvm::attributes::{Attribute, AttributeValue};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{CompoundElement, FieldElement};
use crate::jvm::model::FieldModel;
use crate::jvm::transform::FieldTransform;
use crate::jvm::{Error, FieldAccessFlags, Settings};

/// Builder for the elements of a field (everything but its name and descriptor)
pub struct FieldBuilder<'b> {
    pub(crate) sink: &'b mut dyn FieldSink,
}

impl<'b> FieldBuilder<'b> {
    pub(crate) fn new(sink: &'b mut dyn FieldSink) -> FieldBuilder<'b> {
        FieldBuilder { sink }
    }

    pub fn with(&mut self, element: impl Into<FieldElement>) -> Result<&mut Self, Error> {
        self.sink.accept(element.into())?;
        Ok(self)
    }

    pub fn with_flags(&mut self, flags: FieldAccessFlags) -> Result<&mut Self, Error> {
        self.with(FieldElement::AccessFlags(flags))
    }

    pub fn with_attribute(&mut self, value: AttributeValue) -> Result<&mut Self, Error> {
        self.with(FieldElement::Attribute(Attribute::Value(value)))
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.sink.constant_pool()
    }

    pub fn settings(&self) -> &Settings {
        self.sink.settings()
    }

    /// Run a transform over the elements of a field, feeding the results into this builder
    pub fn transform(
        &mut self,
        field: &FieldModel,
        transform: &mut dyn FieldTransform,
    ) -> Result<&mut Self, Error> {
        transform.at_start(self)?;
        field.for_each_element(&mut |element| transform.accept(self, element))?;
        transform.at_end(self)?;
        Ok(self)
    }
}
