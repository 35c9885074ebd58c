use super::{CodeSink, FieldSink, MethodSink};
use crate::jvm::code::{CodeHints, Label, LabelArena, LabelGenerator};
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{CodeElement, FieldElement, MethodElement};
use crate::jvm::model::{CodeModel, MethodInfo};
use crate::jvm::{Error, Settings};
use std::collections::HashSet;
use std::sync::Arc;

/// Collects the elements of a field
pub(crate) struct BufferedFieldSink<'a> {
    pool: &'a mut ConstantPoolBuilder,
    settings: Arc<Settings>,
    elements: Vec<FieldElement>,
}

impl<'a> BufferedFieldSink<'a> {
    pub fn new(pool: &'a mut ConstantPoolBuilder, settings: Arc<Settings>) -> Self {
        BufferedFieldSink {
            pool,
            settings,
            elements: vec![],
        }
    }

    pub fn into_elements(self) -> Vec<FieldElement> {
        self.elements
    }
}

impl<'a> FieldSink for BufferedFieldSink<'a> {
    fn accept(&mut self, element: FieldElement) -> Result<(), Error> {
        self.elements.push(element);
        Ok(())
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.pool
    }

    fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }
}

/// Collects the elements of a method
pub(crate) struct BufferedMethodSink<'a> {
    pool: &'a mut ConstantPoolBuilder,
    settings: Arc<Settings>,
    method: Arc<MethodInfo>,
    elements: Vec<MethodElement>,
}

impl<'a> BufferedMethodSink<'a> {
    pub fn new(
        pool: &'a mut ConstantPoolBuilder,
        settings: Arc<Settings>,
        method: Arc<MethodInfo>,
    ) -> Self {
        BufferedMethodSink {
            pool,
            settings,
            method,
            elements: vec![],
        }
    }

    pub fn into_elements(self) -> Vec<MethodElement> {
        self.elements
    }
}

impl<'a> MethodSink for BufferedMethodSink<'a> {
    fn accept(&mut self, element: MethodElement) -> Result<(), Error> {
        self.elements.push(element);
        Ok(())
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.pool
    }

    fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }
}

/// Collects the elements of a method body
///
/// Labels are checked for double binding as soon as they get bound. Whether every referenced
/// label ends up bound is only known once the body is written.
pub(crate) struct BufferedCodeSink<'a> {
    pool: &'a mut ConstantPoolBuilder,
    settings: Arc<Settings>,
    method: Arc<MethodInfo>,
    elements: Vec<CodeElement>,
    labels: LabelArena,
    bound: HashSet<Label>,
    next_local: u16,
    reachable: bool,

    /// High-water mark of allocated local slots
    max_locals: u16,
}

impl<'a> BufferedCodeSink<'a> {
    pub fn new(
        pool: &'a mut ConstantPoolBuilder,
        settings: Arc<Settings>,
        method: Arc<MethodInfo>,
    ) -> Self {
        let max_locals = method.first_free_slot();
        BufferedCodeSink {
            pool,
            settings,
            method,
            elements: vec![],
            labels: LabelArena::new(),
            bound: HashSet::new(),
            next_local: max_locals,
            reachable: true,
            max_locals,
        }
    }

    /// Package up the body, carrying over hints from the body it was transformed from (if any)
    pub fn into_model(self, hints: Option<CodeHints>) -> CodeModel {
        let mut hints = hints.unwrap_or_default();
        hints.max_locals = hints.max_locals.max(self.max_locals);
        CodeModel::buffered(self.elements, hints)
    }
}

impl<'a> CodeSink for BufferedCodeSink<'a> {
    fn accept(&mut self, element: CodeElement) -> Result<(), Error> {
        match &element {
            CodeElement::LabelTarget(label) => {
                if !self.bound.insert(*label) {
                    return Err(Error::LabelAlreadyBound(*label));
                }
                self.reachable = true;
            }
            CodeElement::Instruction(instruction) => {
                self.reachable = !instruction.is_unconditional_branch();
            }
            _ => (),
        }
        self.elements.push(element);
        Ok(())
    }

    fn new_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder {
        self.pool
    }

    fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    fn allocate_local(&mut self, size: u16) -> Result<u16, Error> {
        let slot = self.next_local;
        self.next_local = slot.checked_add(size).ok_or(Error::TooMany {
            what: "local variable slots",
            count: slot as usize + size as usize,
        })?;
        self.max_locals = self.max_locals.max(self.next_local);
        Ok(slot)
    }

    fn next_local(&self) -> u16 {
        self.next_local
    }

    fn restore_next_local(&mut self, slot: u16) {
        self.next_local = slot;
    }

    fn is_reachable(&self) -> bool {
        self.reachable
    }
}
