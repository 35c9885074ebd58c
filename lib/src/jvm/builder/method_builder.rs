use super::{BufferedCodeSink, MethodSink};
use crate::jvm::attributes::{Attribute, AttributeValue};
use crate::jvm::code::{CodeBuilder, CodeHints};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{CompoundElement, MethodElement};
use crate::jvm::model::{CodeModel, MethodInfo, MethodModel};
use crate::jvm::transform::{CodeTransform, MethodTransform};
use crate::jvm::{Error, MethodAccessFlags, Settings};

/// Builder for the elements of a method (everything but its name and descriptor)
///
/// Whether the method is static decides the layout of its local variables, so access flags which
/// flip `ACC_STATIC` relative to the flags the method was declared with are rejected.
pub struct MethodBuilder<'b> {
    pub(crate) sink: &'b mut dyn MethodSink,
}

impl<'b> MethodBuilder<'b> {
    pub(crate) fn new(sink: &'b mut dyn MethodSink) -> MethodBuilder<'b> {
        MethodBuilder { sink }
    }

    pub fn with(&mut self, element: impl Into<MethodElement>) -> Result<&mut Self, Error> {
        let element = element.into();
        if let MethodElement::AccessFlags(flags) = &element {
            let method = self.sink.method();
            if flags.contains(MethodAccessFlags::STATIC) != method.is_static() {
                return Err(Error::StaticFlagMutation(method.name().to_owned()));
            }
        }
        self.sink.accept(element)?;
        Ok(self)
    }

    pub fn with_flags(&mut self, flags: MethodAccessFlags) -> Result<&mut Self, Error> {
        self.with(MethodElement::AccessFlags(flags))
    }

    pub fn with_attribute(&mut self, value: AttributeValue) -> Result<&mut Self, Error> {
        self.with(MethodElement::Attribute(Attribute::Value(value)))
    }

    /// Build the method body
    pub fn with_code(
        &mut self,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let code = self.buffer_code(None, handler)?;
        self.with(MethodElement::Code(code))
    }

    /// Rebuild a method body through a transform
    ///
    /// The `max_stack`/`max_locals` of the original body, and the order of its attributes, carry
    /// over to the rebuilt body.
    pub fn transform_code(
        &mut self,
        code: &CodeModel,
        transform: &mut dyn CodeTransform,
    ) -> Result<&mut Self, Error> {
        let hints = code.hints()?;
        let rebuilt = self.buffer_code(Some(hints), |builder| {
            builder.transform(code, transform).map(|_| ())
        })?;
        self.with(MethodElement::Code(rebuilt))
    }

    /// Run a transform over the elements of a method, feeding the results into this builder
    pub fn transform(
        &mut self,
        method: &MethodModel,
        transform: &mut dyn MethodTransform,
    ) -> Result<&mut Self, Error> {
        transform.at_start(self)?;
        method.for_each_element(&mut |element| transform.accept(self, element))?;
        transform.at_end(self)?;
        Ok(self)
    }

    /// Name, descriptor, and flags the method was declared with
    pub fn method(&self) -> &MethodInfo {
        self.sink.method()
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.sink.constant_pool()
    }

    pub fn settings(&self) -> &Settings {
        self.sink.settings()
    }

    fn buffer_code(
        &mut self,
        hints: Option<CodeHints>,
        handler: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
    ) -> Result<CodeModel, Error> {
        let settings = self.sink.settings().clone();
        let method = self.sink.method().clone();
        let mut sink = BufferedCodeSink::new(self.sink.constant_pool(), settings, method);
        CodeBuilder::build(&mut sink, handler)?;
        Ok(sink.into_model(hints))
    }
}
