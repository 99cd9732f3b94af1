//! Test support: a recording in-memory rendering context.
//!
//! [`RecordingContext`] implements [`GlContext`] without any device API,
//! recording every call so tests can assert on program lifecycles,
//! attribute enable/disable traffic, uniform writes and texture-unit
//! bindings. A uniform or attribute is "active" when its symbol occurs in
//! the compiled source, which is enough to exercise the compiled-away
//! no-op paths.

use std::collections::HashMap;

use crate::backend::{
    CompileFailure, ContextId, GlContext, ProgramHandle, TextureHandle, UniformData,
    UniformLocation,
};

/// One compiled program kept by the recording context.
#[derive(Debug, Clone)]
pub struct RecordedProgram {
    pub handle: ProgramHandle,
    pub vertex: String,
    pub fragment: String,
    pub attribute_bindings: Vec<(String, u32)>,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    id: u64,
    next_handle: u64,
    /// Live programs by handle.
    programs: HashMap<u64, RecordedProgram>,
    /// Attribute locations assigned per program.
    attribute_indices: HashMap<(u64, String), u32>,
    uniform_indices: HashMap<(u64, String), u64>,
    /// Queue a failure for the next compile call.
    pub fail_next_compile: Option<CompileFailure>,
    // Recorded traffic.
    pub compiled: Vec<ProgramHandle>,
    pub deleted: Vec<ProgramHandle>,
    pub used: Vec<ProgramHandle>,
    pub enabled_attributes: Vec<u32>,
    pub disabled_attributes: Vec<u32>,
    pub uniform_writes: Vec<(UniformLocation, UniformData)>,
    pub texture_bindings: Vec<(u32, Option<TextureHandle>)>,
}

impl RecordingContext {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            // Namespace handles by context so two contexts never hand out
            // the same program handle.
            next_handle: id * 1000,
            ..Self::default()
        }
    }

    pub fn program(&self, handle: ProgramHandle) -> Option<&RecordedProgram> {
        self.programs.get(&handle.0)
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    fn next_free_attribute_index(&self, program: u64) -> u32 {
        let mut index = 0;
        while self
            .attribute_indices
            .iter()
            .any(|((p, _), i)| *p == program && *i == index)
        {
            index += 1;
        }
        index
    }
}

impl GlContext for RecordingContext {
    fn context_id(&self) -> ContextId {
        ContextId(self.id)
    }

    fn compile_program(
        &mut self,
        vertex: &str,
        fragment: &str,
        attribute_bindings: &[(String, u32)],
    ) -> Result<ProgramHandle, CompileFailure> {
        if let Some(failure) = self.fail_next_compile.take() {
            return Err(failure);
        }
        self.next_handle += 1;
        let handle = ProgramHandle(self.next_handle);
        self.programs.insert(
            handle.0,
            RecordedProgram {
                handle,
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                attribute_bindings: attribute_bindings.to_vec(),
            },
        );
        for (symbol, index) in attribute_bindings {
            self.attribute_indices
                .insert((handle.0, symbol.clone()), *index);
        }
        self.compiled.push(handle);
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        self.deleted.push(program);
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.used.push(program);
    }

    fn uniform_location(
        &mut self,
        program: ProgramHandle,
        symbol: &str,
    ) -> Option<UniformLocation> {
        let recorded = self.programs.get(&program.0)?;
        if !recorded.vertex.contains(symbol) && !recorded.fragment.contains(symbol) {
            return None;
        }
        let key = (program.0, symbol.to_string());
        if let Some(&index) = self.uniform_indices.get(&key) {
            return Some(UniformLocation(index));
        }
        let index = program.0 * 1000 + self.uniform_indices.len() as u64;
        self.uniform_indices.insert(key, index);
        Some(UniformLocation(index))
    }

    fn attribute_location(&mut self, program: ProgramHandle, symbol: &str) -> Option<u32> {
        let recorded = self.programs.get(&program.0)?;
        if !recorded.vertex.contains(symbol) {
            return None;
        }
        let key = (program.0, symbol.to_string());
        if let Some(&index) = self.attribute_indices.get(&key) {
            return Some(index);
        }
        let index = self.next_free_attribute_index(program.0);
        self.attribute_indices.insert(key, index);
        Some(index)
    }

    fn set_uniform(&mut self, location: UniformLocation, data: &UniformData) {
        self.uniform_writes.push((location, data.clone()));
    }

    fn enable_attribute(&mut self, index: u32) {
        self.enabled_attributes.push(index);
    }

    fn disable_attribute(&mut self, index: u32) {
        self.disabled_attributes.push(index);
    }

    fn bind_texture(&mut self, slot: u32, texture: Option<TextureHandle>) {
        self.texture_bindings.push((slot, texture));
    }
}
