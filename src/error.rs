//! Error types for shader construction, processing and compilation.

use crate::backend::CompileStage;
use thiserror::Error;

/// Errors surfaced by shader processing and compilation.
///
/// The soft/recoverable conditions (unresolved `@import` targets, setting a
/// uniform with no active location) are *not* represented here; those are
/// logged and absorbed where they occur.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// Import expansion exceeded the maximum nesting depth, which in practice
    /// means a chunk imports itself directly or indirectly.
    #[error("import depth exceeded while expanding chunk '{0}' (import cycle?)")]
    ImportDepthExceeded(String),

    /// A declaration carried an annotation that is neither a known semantic,
    /// the `unconfigurable` marker, nor a valid default literal for its type.
    /// This halts shader construction: it indicates an authoring mistake.
    #[error("unknown semantic '{semantic}' on declaration '{symbol}'")]
    UnknownSemantic { symbol: String, semantic: String },

    /// A loop-unroll bound named a symbol found neither in the define set nor
    /// among the light counts.
    #[error("cannot resolve loop bound '{0}' from defines or light counts")]
    UnresolvedLoopBound(String),

    /// GPU compile or link failure. Carries the driver log paired with the
    /// offending stage's source, each line prefixed by its 1-based number.
    /// The previously working program (if any) stays installed.
    #[error("{stage} stage failed to compile:\n{log}\n{annotated_source}")]
    Compile {
        stage: CompileStage,
        log: String,
        annotated_source: String,
    },

    /// A draw-time operation needed a compiled program for a context that has
    /// none (bind was never called, or compilation failed).
    #[error("no compiled program for context {0}")]
    NotCompiled(u64),
}
