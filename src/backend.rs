//! GPU context abstraction layer.
//!
//! The engine never talks to a device API directly; everything it needs from
//! the GPU is expressed through the [`GlContext`] trait. One logical shader
//! may be bound against several independent contexts over its lifetime
//! (multi-canvas rendering), so every context carries a stable identity and
//! all compiled state is keyed by it.

use std::fmt;

/// Stable identity of a rendering context. Derived program and location
/// caches are keyed by this, never stored shader-globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a linked GPU program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Opaque handle to a uniform location within a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u64);

/// Opaque handle to a texture object owned by the caller's texture system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// The stage a compile/link failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStage::Vertex => write!(f, "vertex"),
            CompileStage::Fragment => write!(f, "fragment"),
            CompileStage::Link => write!(f, "link"),
        }
    }
}

/// A failed compile or link, as reported by the driver.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub stage: CompileStage,
    pub log: String,
}

/// Wire-level uniform payload handed to the context. The variant is decided
/// once from the declaration's wire format, not re-inspected per draw.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Int(i32),
    Float(f32),
    /// `components` is 1..=4; flat data for both single values and arrays.
    FloatVec { components: u8, values: Vec<f32> },
    IntVec { components: u8, values: Vec<i32> },
    /// Column-major matrix data, `dim` is 2..=4.
    Matrix { dim: u8, values: Vec<f32> },
}

/// Core capabilities required from any rendering context.
///
/// `compile_program` receives explicit attribute bindings to apply before
/// linking; the engine uses this to force the POSITION attribute (or the
/// first declared attribute) to location 0, which some drivers require.
pub trait GlContext {
    fn context_id(&self) -> ContextId;

    fn compile_program(
        &mut self,
        vertex: &str,
        fragment: &str,
        attribute_bindings: &[(String, u32)],
    ) -> Result<ProgramHandle, CompileFailure>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn use_program(&mut self, program: ProgramHandle);

    /// Location of an active uniform, or `None` when the permutation
    /// compiled the symbol away.
    fn uniform_location(&mut self, program: ProgramHandle, symbol: &str)
        -> Option<UniformLocation>;

    /// Location of an active vertex attribute.
    fn attribute_location(&mut self, program: ProgramHandle, symbol: &str) -> Option<u32>;

    fn set_uniform(&mut self, location: UniformLocation, data: &UniformData);

    fn enable_attribute(&mut self, index: u32);

    fn disable_attribute(&mut self, index: u32);

    /// Binds (or unbinds, for `None`) a texture to the given unit.
    fn bind_texture(&mut self, slot: u32, texture: Option<TextureHandle>);
}
