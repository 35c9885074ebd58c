//! Transforms: element-by-element rewriting of class file structures
//!
//! A transform sees every element of a model (in order) along with the builder the result is
//! going into, and decides what to emit: the element unchanged, something else, several things,
//! or nothing at all. Before the first element and after the last one, it also gets a chance to
//! emit elements of its own (`at_start`/`at_end`).
//!
//! Transforms compose with `and_then`. In `first.and_then(second)`, `first` is handed a builder
//! whose `with` feeds each element straight into `second` (which then writes into the real
//! builder). No intermediate model is materialized, so chains of transforms stay streaming.

use crate::jvm::builder::{
    ClassBuilder, ClassSink, CodeSink, FieldBuilder, FieldSink, MethodBuilder, MethodSink,
};
use crate::jvm::code::{CodeBuilder, Label};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{ClassElement, CodeElement, FieldElement, MethodElement};
use crate::jvm::model::{FieldModel, MethodInfo, MethodModel};
use crate::jvm::{Error, Settings};
use std::sync::Arc;

pub trait ClassTransform {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement)
        -> Result<(), Error>;

    fn at_start(&mut self, _builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn at_end(&mut self, _builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn and_then<T: ClassTransform>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen::new(self, next)
    }
}

pub trait FieldTransform {
    fn accept(&mut self, builder: &mut FieldBuilder<'_>, element: FieldElement)
        -> Result<(), Error>;

    fn at_start(&mut self, _builder: &mut FieldBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn at_end(&mut self, _builder: &mut FieldBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn and_then<T: FieldTransform>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen::new(self, next)
    }
}

pub trait MethodTransform {
    fn accept(
        &mut self,
        builder: &mut MethodBuilder<'_>,
        element: MethodElement,
    ) -> Result<(), Error>;

    fn at_start(&mut self, _builder: &mut MethodBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn at_end(&mut self, _builder: &mut MethodBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn and_then<T: MethodTransform>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen::new(self, next)
    }
}

pub trait CodeTransform {
    fn accept(&mut self, builder: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error>;

    fn at_start(&mut self, _builder: &mut CodeBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn at_end(&mut self, _builder: &mut CodeBuilder<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn and_then<T: CodeTransform>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen::new(self, next)
    }
}

/// Two transforms, one after the other
///
/// The order of callbacks is: `first.at_start`, `second.at_start`, then for every element
/// `first.accept` (which calls `second.accept` for whatever it emits), then `first.at_end` (whose
/// emissions also go through `second.accept`), and finally `second.at_end`.
pub struct AndThen<A, B> {
    first: A,
    second: B,
}

impl<A, B> AndThen<A, B> {
    pub fn new(first: A, second: B) -> AndThen<A, B> {
        AndThen { first, second }
    }
}

/// Sink that hands every element to a transform, which writes into a downstream builder
pub(crate) struct ChainedSink<'a, T: ?Sized, B> {
    next: &'a mut T,
    downstream: &'a mut B,
}

impl<'a, T: ?Sized, B> ChainedSink<'a, T, B> {
    pub fn new(next: &'a mut T, downstream: &'a mut B) -> ChainedSink<'a, T, B> {
        ChainedSink { next, downstream }
    }
}

impl<'a, 'b, T: ClassTransform + ?Sized> ClassSink for ChainedSink<'a, T, ClassBuilder<'b>> {
    fn accept(&mut self, element: ClassElement) -> Result<(), Error> {
        self.next.accept(self.downstream, element)
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.downstream.sink.constant_pool()
    }

    fn settings(&self) -> &Arc<Settings> {
        self.downstream.sink.settings()
    }

    fn this_class(&self) -> &str {
        self.downstream.sink.this_class()
    }
}

impl<'a, 'b, T: FieldTransform + ?Sized> FieldSink for ChainedSink<'a, T, FieldBuilder<'b>> {
    fn accept(&mut self, element: FieldElement) -> Result<(), Error> {
        self.next.accept(self.downstream, element)
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.downstream.sink.constant_pool()
    }

    fn settings(&self) -> &Arc<Settings> {
        self.downstream.sink.settings()
    }
}

impl<'a, 'b, T: MethodTransform + ?Sized> MethodSink for ChainedSink<'a, T, MethodBuilder<'b>> {
    fn accept(&mut self, element: MethodElement) -> Result<(), Error> {
        self.next.accept(self.downstream, element)
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.downstream.sink.constant_pool()
    }

    fn settings(&self) -> &Arc<Settings> {
        self.downstream.sink.settings()
    }

    fn method(&self) -> &Arc<MethodInfo> {
        self.downstream.sink.method()
    }
}

impl<'a, 'b, T: CodeTransform + ?Sized> CodeSink for ChainedSink<'a, T, CodeBuilder<'b>> {
    fn accept(&mut self, element: CodeElement) -> Result<(), Error> {
        self.next.accept(self.downstream, element)
    }

    fn new_label(&mut self) -> Label {
        self.downstream.sink.new_label()
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.downstream.sink.constant_pool()
    }

    fn settings(&self) -> &Arc<Settings> {
        self.downstream.sink.settings()
    }

    fn method(&self) -> &Arc<MethodInfo> {
        self.downstream.sink.method()
    }

    fn allocate_local(&mut self, size: u16) -> Result<u16, Error> {
        self.downstream.sink.allocate_local(size)
    }

    fn next_local(&self) -> u16 {
        self.downstream.sink.next_local()
    }

    fn restore_next_local(&mut self, slot: u16) {
        self.downstream.sink.restore_next_local(slot)
    }

    fn is_reachable(&self) -> bool {
        self.downstream.sink.is_reachable()
    }
}

impl<A: ClassTransform, B: ClassTransform> ClassTransform for AndThen<A, B> {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, builder);
        self.first.accept(&mut ClassBuilder::new(&mut sink), element)
    }

    fn at_start(&mut self, builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_start(&mut ClassBuilder::new(&mut sink))?;
        self.second.at_start(builder)
    }

    fn at_end(&mut self, builder: &mut ClassBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_end(&mut ClassBuilder::new(&mut sink))?;
        self.second.at_end(builder)
    }
}

impl<A: FieldTransform, B: FieldTransform> FieldTransform for AndThen<A, B> {
    fn accept(&mut self, builder: &mut FieldBuilder<'_>, element: FieldElement) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, builder);
        self.first.accept(&mut FieldBuilder::new(&mut sink), element)
    }

    fn at_start(&mut self, builder: &mut FieldBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_start(&mut FieldBuilder::new(&mut sink))?;
        self.second.at_start(builder)
    }

    fn at_end(&mut self, builder: &mut FieldBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_end(&mut FieldBuilder::new(&mut sink))?;
        self.second.at_end(builder)
    }
}

impl<A: MethodTransform, B: MethodTransform> MethodTransform for AndThen<A, B> {
    fn accept(
        &mut self,
        builder: &mut MethodBuilder<'_>,
        element: MethodElement,
    ) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, builder);
        self.first.accept(&mut MethodBuilder::new(&mut sink), element)
    }

    fn at_start(&mut self, builder: &mut MethodBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_start(&mut MethodBuilder::new(&mut sink))?;
        self.second.at_start(builder)
    }

    fn at_end(&mut self, builder: &mut MethodBuilder<'_>) -> Result<(), Error> {
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first.at_end(&mut MethodBuilder::new(&mut sink))?;
        self.second.at_end(builder)
    }
}

impl<A: CodeTransform, B: CodeTransform> CodeTransform for AndThen<A, B> {
    fn accept(&mut self, builder: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        let scope = builder.scope();
        let mut sink = ChainedSink::new(&mut self.second, builder);
        self.first
            .accept(&mut CodeBuilder::with_scope(&mut sink, scope), element)
    }

    fn at_start(&mut self, builder: &mut CodeBuilder<'_>) -> Result<(), Error> {
        let scope = builder.scope();
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first
            .at_start(&mut CodeBuilder::with_scope(&mut sink, scope))?;
        self.second.at_start(builder)
    }

    fn at_end(&mut self, builder: &mut CodeBuilder<'_>) -> Result<(), Error> {
        let scope = builder.scope();
        let mut sink = ChainedSink::new(&mut self.second, &mut *builder);
        self.first
            .at_end(&mut CodeBuilder::with_scope(&mut sink, scope))?;
        self.second.at_end(builder)
    }
}

/// Transform that passes every element through unchanged
///
/// As a class transform, this leaves members which came out of a parsed class untouched, so
/// they can be copied verbatim.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl ClassTransform for Identity {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        builder.with(element).map(|_| ())
    }
}

impl FieldTransform for Identity {
    fn accept(&mut self, builder: &mut FieldBuilder<'_>, element: FieldElement) -> Result<(), Error> {
        builder.with(element).map(|_| ())
    }
}

impl MethodTransform for Identity {
    fn accept(
        &mut self,
        builder: &mut MethodBuilder<'_>,
        element: MethodElement,
    ) -> Result<(), Error> {
        builder.with(element).map(|_| ())
    }
}

impl CodeTransform for Identity {
    fn accept(&mut self, builder: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        builder.with(element).map(|_| ())
    }
}

/// Transform backed by a closure over `(builder, element)`
pub struct TransformFn<F>(F);

/// Class transform from a closure
pub fn class_transform<F>(accept: F) -> TransformFn<F>
where
    F: FnMut(&mut ClassBuilder<'_>, ClassElement) -> Result<(), Error>,
{
    TransformFn(accept)
}

/// Field transform from a closure
pub fn field_transform<F>(accept: F) -> TransformFn<F>
where
    F: FnMut(&mut FieldBuilder<'_>, FieldElement) -> Result<(), Error>,
{
    TransformFn(accept)
}

/// Method transform from a closure
pub fn method_transform<F>(accept: F) -> TransformFn<F>
where
    F: FnMut(&mut MethodBuilder<'_>, MethodElement) -> Result<(), Error>,
{
    TransformFn(accept)
}

/// Code transform from a closure
pub fn code_transform<F>(accept: F) -> TransformFn<F>
where
    F: FnMut(&mut CodeBuilder<'_>, CodeElement) -> Result<(), Error>,
{
    TransformFn(accept)
}

impl<F> ClassTransform for TransformFn<F>
where
    F: FnMut(&mut ClassBuilder<'_>, ClassElement) -> Result<(), Error>,
{
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        (self.0)(builder, element)
    }
}

impl<F> FieldTransform for TransformFn<F>
where
    F: FnMut(&mut FieldBuilder<'_>, FieldElement) -> Result<(), Error>,
{
    fn accept(&mut self, builder: &mut FieldBuilder<'_>, element: FieldElement) -> Result<(), Error> {
        (self.0)(builder, element)
    }
}

impl<F> MethodTransform for TransformFn<F>
where
    F: FnMut(&mut MethodBuilder<'_>, MethodElement) -> Result<(), Error>,
{
    fn accept(
        &mut self,
        builder: &mut MethodBuilder<'_>,
        element: MethodElement,
    ) -> Result<(), Error> {
        (self.0)(builder, element)
    }
}

impl<F> CodeTransform for TransformFn<F>
where
    F: FnMut(&mut CodeBuilder<'_>, CodeElement) -> Result<(), Error>,
{
    fn accept(&mut self, builder: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        (self.0)(builder, element)
    }
}

/// Transform whose state is rebuilt for every traversal
///
/// Every traversal starts from a fresh state out of the factory, even when an earlier traversal
/// failed before reaching its end. The state is dropped once the traversal ends, so one instance
/// can be reused across many models.
pub struct Stateful<F, T> {
    factory: F,
    current: Option<T>,
}

/// Stateful transform from a factory of transforms
pub fn stateful<F, T>(factory: F) -> Stateful<F, T>
where
    F: FnMut() -> T,
{
    Stateful {
        factory,
        current: None,
    }
}

impl<F: FnMut() -> T, T> Stateful<F, T> {
    fn current(&mut self) -> &mut T {
        let factory = &mut self.factory;
        self.current.get_or_insert_with(factory)
    }
}

macro_rules! stateful_transform {
    ($transform:ident, $builder:ident, $element:ident) => {
        impl<F: FnMut() -> T, T: $transform> $transform for Stateful<F, T> {
            fn accept(
                &mut self,
                builder: &mut $builder<'_>,
                element: $element,
            ) -> Result<(), Error> {
                self.current().accept(builder, element)
            }

            fn at_start(&mut self, builder: &mut $builder<'_>) -> Result<(), Error> {
                self.current.insert((self.factory)()).at_start(builder)
            }

            fn at_end(&mut self, builder: &mut $builder<'_>) -> Result<(), Error> {
                match self.current.take() {
                    Some(mut current) => current.at_end(builder),
                    None => Ok(()),
                }
            }
        }
    };
}

stateful_transform!(ClassTransform, ClassBuilder, ClassElement);
stateful_transform!(FieldTransform, FieldBuilder, FieldElement);
stateful_transform!(MethodTransform, MethodBuilder, MethodElement);
stateful_transform!(CodeTransform, CodeBuilder, CodeElement);

/// Class transform which runs a method transform over every method
pub struct TransformingMethods<T>(T);

pub fn transforming_methods<T: MethodTransform>(transform: T) -> TransformingMethods<T> {
    TransformingMethods(transform)
}

impl<T: MethodTransform> ClassTransform for TransformingMethods<T> {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        let result = match element {
            ClassElement::Method(method) => builder.transform_method(&method, &mut self.0),
            other => builder.with(other),
        };
        result.map(|_| ())
    }
}

/// Class transform which runs a field transform over every field
pub struct TransformingFields<T>(T);

pub fn transforming_fields<T: FieldTransform>(transform: T) -> TransformingFields<T> {
    TransformingFields(transform)
}

impl<T: FieldTransform> ClassTransform for TransformingFields<T> {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        let result = match element {
            ClassElement::Field(field) => builder.transform_field(&field, &mut self.0),
            other => builder.with(other),
        };
        result.map(|_| ())
    }
}

/// Method transform which runs a code transform over the method body
pub struct TransformingCode<T>(T);

pub fn transforming_code<T: CodeTransform>(transform: T) -> TransformingCode<T> {
    TransformingCode(transform)
}

impl<T: CodeTransform> MethodTransform for TransformingCode<T> {
    fn accept(
        &mut self,
        builder: &mut MethodBuilder<'_>,
        element: MethodElement,
    ) -> Result<(), Error> {
        let result = match element {
            MethodElement::Code(code) => builder.transform_code(&code, &mut self.0),
            other => builder.with(other),
        };
        result.map(|_| ())
    }
}

/// Class transform which drops methods matching a predicate
pub struct DroppingMethods<P>(P);

pub fn dropping_methods<P: FnMut(&MethodModel) -> bool>(predicate: P) -> DroppingMethods<P> {
    DroppingMethods(predicate)
}

impl<P: FnMut(&MethodModel) -> bool> ClassTransform for DroppingMethods<P> {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        match element {
            ClassElement::Method(method) if (self.0)(&method) => {
                log::debug!("Dropping method {}", method.name()?);
                Ok(())
            }
            other => builder.with(other).map(|_| ()),
        }
    }
}

/// Class transform which drops fields matching a predicate
pub struct DroppingFields<P>(P);

pub fn dropping_fields<P: FnMut(&FieldModel) -> bool>(predicate: P) -> DroppingFields<P> {
    DroppingFields(predicate)
}

impl<P: FnMut(&FieldModel) -> bool> ClassTransform for DroppingFields<P> {
    fn accept(&mut self, builder: &mut ClassBuilder<'_>, element: ClassElement) -> Result<(), Error> {
        match element {
            ClassElement::Field(field) if (self.0)(&field) => {
                log::debug!("Dropping field {}", field.name()?);
                Ok(())
            }
            other => builder.with(other).map(|_| ()),
        }
    }
}

/// Code transform which drops elements matching a predicate
pub struct DroppingCodeElements<P>(P);

pub fn dropping_code_elements<P: FnMut(&CodeElement) -> bool>(
    predicate: P,
) -> DroppingCodeElements<P> {
    DroppingCodeElements(predicate)
}

impl<P: FnMut(&CodeElement) -> bool> CodeTransform for DroppingCodeElements<P> {
    fn accept(&mut self, builder: &mut CodeBuilder<'_>, element: CodeElement) -> Result<(), Error> {
        if (self.0)(&element) {
            Ok(())
        } else {
            builder.with(element).map(|_| ())
        }
    }
}
