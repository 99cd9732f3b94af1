//! GLSL shader composition, permutation and uniform-binding engine.
//!
//! Turns a library of reusable GLSL text chunks and typed declarations into
//! compiled, context-specific GPU programs: recursive `@import` expansion,
//! declaration scanning with semantic classification, `#define` permutation
//! headers, bounded loop unrolling, per-context program caching with a
//! dirty-invalidation protocol, and draw-time uniform/attribute/texture-unit
//! binding. The GPU itself sits behind the [`backend::GlContext`] trait.

// --- Private/Internal Modules ---
mod binder;
mod program;
mod unroll;

// --- Public Modules ---
pub mod backend;
pub mod chunk;
pub mod declaration;
pub mod defines;
pub mod error;
pub mod semantics;
pub mod shader;
pub mod test_utils;

// --- Public Re-exports --- //
pub use backend::{
    CompileFailure, CompileStage, ContextId, GlContext, ProgramHandle, TextureHandle,
    UniformData, UniformLocation,
};
pub use binder::DrawState;
pub use chunk::ChunkLibrary;
pub use declaration::{Declaration, DeclaredType, UniformValue};
pub use defines::DefineValue;
pub use error::ShaderError;
pub use semantics::{
    AttributeTemplate, MatrixSemanticEntry, ResolvedDeclarations, SemanticEntry, UniformTemplate,
    ATTRIBUTE_SEMANTICS, MATRIX_SEMANTICS, UNIFORM_SEMANTICS,
};
pub use shader::{Shader, ShaderStage};
