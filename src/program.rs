//! Per-context compiled-program cache.
//!
//! A shader keeps one [`ContextCache`] per rendering context it has been
//! bound against. Programs, cached locations and the enabled-attribute set
//! live here, never in shader-global fields, so two contexts sharing one
//! logical shader cannot observe each other's state.

use std::collections::HashMap;

use log::{debug, error};

use crate::backend::{CompileStage, GlContext, ProgramHandle, UniformLocation};
use crate::error::ShaderError;
use crate::semantics::ResolvedDeclarations;

/// Derived, context-specific state for one rendering context.
#[derive(Debug)]
pub(crate) struct ContextCache {
    pub program: Option<ProgramHandle>,
    pub uniform_locations: HashMap<String, UniformLocation>,
    pub attribute_locations: HashMap<String, u32>,
    pub program_dirty: bool,
    /// Stage of the last failed compile. While set (and not re-dirtied) the
    /// same broken permutation is not recompiled every frame.
    pub last_failure: Option<CompileStage>,
}

impl Default for ContextCache {
    fn default() -> Self {
        Self {
            program: None,
            uniform_locations: HashMap::new(),
            attribute_locations: HashMap::new(),
            program_dirty: true,
            last_failure: None,
        }
    }
}

impl ContextCache {
    pub fn invalidate(&mut self) {
        self.program_dirty = true;
        self.last_failure = None;
        self.uniform_locations.clear();
        self.attribute_locations.clear();
    }
}

/// Compiles and links the processed stage texts for one context, replacing
/// any previous program on success.
///
/// On failure the previous program (if any) stays installed and usable, so a
/// hot edit that introduces a bug does not blank the screen; the returned
/// error pairs the driver log with the offending stage's source annotated by
/// 1-based line numbers.
pub(crate) fn compile(
    cache: &mut ContextCache,
    ctx: &mut dyn GlContext,
    vertex: &str,
    fragment: &str,
    resolved: &ResolvedDeclarations,
) -> Result<(), ShaderError> {
    let bindings: Vec<(String, u32)> = resolved
        .location_zero_attribute()
        .map(|symbol| vec![(symbol.to_string(), 0)])
        .unwrap_or_default();

    match ctx.compile_program(vertex, fragment, &bindings) {
        Ok(program) => {
            if let Some(old) = cache.program.take() {
                ctx.delete_program(old);
            }
            cache.uniform_locations.clear();
            cache.attribute_locations.clear();
            for (symbol, _, _) in resolved.uniform_symbols() {
                if let Some(location) = ctx.uniform_location(program, &symbol) {
                    cache.uniform_locations.insert(symbol, location);
                }
            }
            cache.program = Some(program);
            cache.program_dirty = false;
            cache.last_failure = None;
            debug!(
                "compiled program for context {}, cached {} uniform locations",
                ctx.context_id(),
                cache.uniform_locations.len()
            );
            Ok(())
        }
        Err(failure) => {
            // Not retried until the shader is dirtied again.
            cache.program_dirty = false;
            cache.last_failure = Some(failure.stage);
            error!(
                "{} stage failed to compile for context {}: {}",
                failure.stage,
                ctx.context_id(),
                failure.log
            );
            // A link error implicates both stages; annotate both.
            let annotated_source = match failure.stage {
                CompileStage::Vertex => annotate_lines(vertex),
                CompileStage::Fragment => annotate_lines(fragment),
                CompileStage::Link => format!(
                    "vertex:\n{}\nfragment:\n{}",
                    annotate_lines(vertex),
                    annotate_lines(fragment)
                ),
            };
            Err(ShaderError::Compile {
                stage: failure.stage,
                log: failure.log,
                annotated_source,
            })
        }
    }
}

/// Prefixes every line of `source` with its 1-based number, matching the
/// driver log convention.
pub(crate) fn annotate_lines(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotates_with_one_based_line_numbers() {
        assert_eq!(
            annotate_lines("void main() {\n}\n"),
            "1: void main() {\n2: }"
        );
    }

    #[test]
    fn fresh_cache_is_dirty_and_empty() {
        let cache = ContextCache::default();
        assert!(cache.program_dirty);
        assert!(cache.program.is_none());
    }

    #[test]
    fn link_failure_annotates_both_stages() {
        use crate::backend::CompileFailure;
        use crate::test_utils::RecordingContext;

        let mut ctx = RecordingContext::new(1);
        ctx.fail_next_compile = Some(CompileFailure {
            stage: CompileStage::Link,
            log: "varying mismatch".to_string(),
        });
        let mut cache = ContextCache::default();
        let err = compile(
            &mut cache,
            &mut ctx,
            "void main() { v(); }",
            "void main() { f(); }",
            &ResolvedDeclarations::default(),
        )
        .unwrap_err();
        match err {
            ShaderError::Compile {
                stage,
                annotated_source,
                ..
            } => {
                assert_eq!(stage, CompileStage::Link);
                assert!(annotated_source.contains("vertex:\n1: void main() { v(); }"));
                assert!(annotated_source.contains("fragment:\n1: void main() { f(); }"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalidate_clears_locations_and_failure_memo() {
        let mut cache = ContextCache::default();
        cache.program_dirty = false;
        cache.last_failure = Some(CompileStage::Fragment);
        cache
            .uniform_locations
            .insert("color".to_string(), UniformLocation(7));
        cache.invalidate();
        assert!(cache.program_dirty);
        assert!(cache.last_failure.is_none());
        assert!(cache.uniform_locations.is_empty());
    }
}
