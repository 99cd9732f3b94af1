//! The shader object tying source text, permutation state and per-context
//! programs together.
//!
//! A [`Shader`] owns user-supplied vertex/fragment text (which may contain
//! `@import` directives) plus the mutable permutation state: per-stage
//! defines, texture-enable flags and light counts. Any mutation marks the
//! derived state dirty; the next [`Shader::bind`] recomputes the processed
//! code and recompiles for the bound context only.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::backend::{GlContext, TextureHandle, UniformData};
use crate::binder::{self, DrawState};
use crate::chunk::ChunkLibrary;
use crate::declaration::{self, Declaration, UniformValue};
use crate::defines::{self, DefineValue, Defines};
use crate::error::ShaderError;
use crate::program::{self, ContextCache};
use crate::semantics::{self, ResolvedDeclarations, UniformTemplate};
use crate::unroll;

/// The two programmable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Default, Clone)]
struct StageState {
    source: String,
    user_defines: Defines,
    /// `#define` defaults found in the source, rebuilt on every recompute.
    source_defines: Defines,
}

#[derive(Debug, Clone)]
struct ProcessedCode {
    vertex: String,
    fragment: String,
}

/// A logical shader. May be bound against several independent rendering
/// contexts; all compiled state is keyed per context.
#[derive(Debug, Default)]
pub struct Shader {
    vertex: StageState,
    fragment: StageState,
    /// Texture symbols the user asked to enable. Effective only for
    /// declared samplers.
    enabled_textures: HashSet<String>,
    /// Declared sampler symbols, declaration order.
    texture_symbols: Vec<String>,
    light_counts: Vec<(String, u32)>,
    code_dirty: bool,
    processed: Option<ProcessedCode>,
    resolved: Option<ResolvedDeclarations>,
    contexts: HashMap<u64, ContextCache>,
    attached: usize,
    texture_cursor: u32,
}

impl Shader {
    pub fn new(vertex_source: &str, fragment_source: &str) -> Self {
        Self {
            vertex: StageState {
                source: vertex_source.to_string(),
                ..StageState::default()
            },
            fragment: StageState {
                source: fragment_source.to_string(),
                ..StageState::default()
            },
            code_dirty: true,
            ..Self::default()
        }
    }

    // --- source mutation ---------------------------------------------------

    pub fn set_vertex(&mut self, source: &str) {
        self.vertex.source = source.to_string();
        self.dirty();
    }

    pub fn set_fragment(&mut self, source: &str) {
        self.fragment.source = source.to_string();
        self.dirty();
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex.source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment.source
    }

    // --- permutation state -------------------------------------------------

    fn stage_mut(&mut self, stage: ShaderStage) -> &mut StageState {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Fragment => &mut self.fragment,
        }
    }

    pub fn define(&mut self, stage: ShaderStage, name: &str, value: DefineValue) {
        if self.stage_mut(stage).user_defines.set(name, value) {
            self.dirty();
        }
    }

    pub fn undefine(&mut self, stage: ShaderStage, name: &str) {
        if self.stage_mut(stage).user_defines.unset(name) {
            self.dirty();
        }
    }

    pub fn get_define(&self, stage: ShaderStage, name: &str) -> Option<&DefineValue> {
        match stage {
            ShaderStage::Vertex => self.vertex.user_defines.get(name),
            ShaderStage::Fragment => self.fragment.user_defines.get(name),
        }
    }

    /// Records the enable intent for `symbol`. Only toggles of declared
    /// samplers change the processed output, so only those dirty the shader;
    /// the intent is kept either way and takes effect if a later source edit
    /// declares the sampler.
    pub fn enable_texture(&mut self, symbol: &str) {
        if self.enabled_textures.insert(symbol.to_string()) && self.is_declared_sampler(symbol) {
            self.dirty();
        }
    }

    pub fn disable_texture(&mut self, symbol: &str) {
        if self.enabled_textures.remove(symbol) && self.is_declared_sampler(symbol) {
            self.dirty();
        }
    }

    fn is_declared_sampler(&self, symbol: &str) -> bool {
        self.texture_symbols.iter().any(|s| s == symbol)
    }

    pub fn is_texture_enabled(&self, symbol: &str) -> bool {
        self.enabled_textures.contains(symbol)
    }

    /// Sets the derived count define for one light type, e.g.
    /// `("POINT_LIGHT", 2)` yields `#define POINT_LIGHT_COUNT 2` in both
    /// stage headers.
    pub fn set_light_count(&mut self, light_type: &str, count: u32) {
        match self.light_counts.iter_mut().find(|(t, _)| t == light_type) {
            Some((_, existing)) => {
                if *existing != count {
                    *existing = count;
                    self.dirty();
                }
            }
            None => {
                self.light_counts.push((light_type.to_string(), count));
                self.dirty();
            }
        }
    }

    // --- dirty protocol ----------------------------------------------------

    /// Invalidates the processed code, the program and the location caches
    /// in every context this shader has ever been used with. Shared across
    /// every material attached to this shader.
    pub fn dirty(&mut self) {
        self.code_dirty = true;
        for cache in self.contexts.values_mut() {
            cache.invalidate();
        }
    }

    pub fn is_code_dirty(&self) -> bool {
        self.code_dirty
    }

    // --- processing --------------------------------------------------------

    /// Recomputes the processed stage code: import expansion, declaration
    /// scanning, semantic resolution, header injection and loop unrolling.
    /// A no-op when nothing is dirty.
    ///
    /// Hard errors (unknown semantic, import cycle, unresolvable loop
    /// bound) abort and leave the shader dirty; there is no partially
    /// usable state.
    pub fn process(&mut self, chunks: &ChunkLibrary) -> Result<(), ShaderError> {
        if !self.code_dirty {
            return Ok(());
        }

        let vertex_expanded = chunks.expand(&self.vertex.source)?;
        let fragment_expanded = chunks.expand(&self.fragment.source)?;

        let vertex_parsed = declaration::parse_stage(&vertex_expanded);
        let fragment_parsed = declaration::parse_stage(&fragment_expanded);

        // Both stages share one program; merge declarations, first
        // occurrence wins.
        let uniforms = merge_declarations(&vertex_parsed.uniforms, &fragment_parsed.uniforms);
        let attributes =
            merge_declarations(&vertex_parsed.attributes, &fragment_parsed.attributes);
        let resolved = semantics::resolve(&uniforms, &attributes)?;

        self.texture_symbols.clear();
        for decl in uniforms.iter().filter(|d| d.ty.is_sampler()) {
            if !self.texture_symbols.contains(&decl.symbol) {
                self.texture_symbols.push(decl.symbol.clone());
            }
        }
        let texture_status = self.texture_status_owned();

        self.vertex.source_defines = collect_defines(&vertex_parsed.source_defines);
        self.fragment.source_defines = collect_defines(&fragment_parsed.source_defines);

        let vertex_code = assemble_stage(
            &self.vertex,
            &vertex_parsed.stripped,
            &texture_status,
            &self.light_counts,
        )?;
        let fragment_code = assemble_stage(
            &self.fragment,
            &fragment_parsed.stripped,
            &texture_status,
            &self.light_counts,
        )?;

        self.resolved = Some(resolved);
        self.processed = Some(ProcessedCode {
            vertex: vertex_code,
            fragment: fragment_code,
        });
        self.code_dirty = false;
        for cache in self.contexts.values_mut() {
            cache.invalidate();
        }
        debug!("recomputed processed code ({} samplers)", self.texture_symbols.len());
        Ok(())
    }

    fn texture_status_owned(&self) -> Vec<(String, bool)> {
        self.texture_symbols
            .iter()
            .map(|s| (s.clone(), self.enabled_textures.contains(s)))
            .collect()
    }

    // --- binding -----------------------------------------------------------

    /// Prepares this shader for drawing on `ctx`: recomputes dirty code,
    /// recompiles the context's program when needed and resets the
    /// texture-slot cursor. The cursor reset is unconditional so a draw
    /// that failed mid-way cannot leak slot assignments into the next one.
    pub fn bind(
        &mut self,
        ctx: &mut dyn GlContext,
        chunks: &ChunkLibrary,
    ) -> Result<(), ShaderError> {
        self.texture_cursor = 0;
        if self.code_dirty {
            self.process(chunks)?;
        }
        let id = ctx.context_id().0;
        let cache = self.contexts.entry(id).or_default();
        if cache.program_dirty {
            if let (Some(processed), Some(resolved)) = (&self.processed, &self.resolved) {
                program::compile(cache, ctx, &processed.vertex, &processed.fragment, resolved)?;
            }
        }
        if let Some(handle) = cache.program {
            ctx.use_program(handle);
        }
        Ok(())
    }

    /// Releases the compiled program and cache entry for `ctx` only; other
    /// contexts keep their programs and locations.
    pub fn dispose(&mut self, ctx: &mut dyn GlContext) {
        if let Some(cache) = self.contexts.remove(&ctx.context_id().0) {
            if let Some(handle) = cache.program {
                ctx.delete_program(handle);
            }
        }
    }

    pub fn program(&self, ctx: &dyn GlContext) -> Option<crate::backend::ProgramHandle> {
        self.contexts
            .get(&ctx.context_id().0)
            .and_then(|cache| cache.program)
    }

    // --- material attachment ----------------------------------------------

    /// Reference-counts materials sharing this shader.
    pub fn attach(&mut self) {
        self.attached += 1;
    }

    pub fn detach(&mut self) {
        self.attached = self.attached.saturating_sub(1);
    }

    pub fn is_attached(&self) -> bool {
        self.attached > 0
    }

    // --- draw-time binding -------------------------------------------------

    /// See [`binder::enable_attributes`]. `state` is the caller's per-context
    /// draw state; it must be the same object for every shader drawing on
    /// `ctx`, so stale indices enabled by a previously bound shader get
    /// disabled here.
    pub fn enable_attributes(
        &mut self,
        ctx: &mut dyn GlContext,
        state: &mut DrawState,
        symbols: &[&str],
    ) -> Result<Vec<Option<u32>>, ShaderError> {
        let id = ctx.context_id().0;
        let cache = self
            .contexts
            .get_mut(&id)
            .ok_or(ShaderError::NotCompiled(id))?;
        binder::enable_attributes(cache, state, ctx, symbols)
    }

    /// Writes one uniform value. Unknown symbols and symbols the current
    /// permutation compiled away are silent no-ops returning `Ok(false)`.
    /// Texture values allocate sequential units from the draw-state cursor.
    pub fn set_uniform(
        &mut self,
        ctx: &mut dyn GlContext,
        symbol: &str,
        value: &UniformValue,
    ) -> Result<bool, ShaderError> {
        let id = ctx.context_id().0;
        let Some((ty, _array)) = self.resolved.as_ref().and_then(|r| r.uniform_type(symbol))
        else {
            debug!("uniform '{symbol}' is not declared, skipping");
            return Ok(false);
        };
        let cache = self.contexts.get(&id).ok_or(ShaderError::NotCompiled(id))?;
        match value {
            UniformValue::Texture(handle) => {
                if !ty.is_sampler() {
                    debug!("uniform '{symbol}' is not a sampler, skipping texture bind");
                    return Ok(false);
                }
                let Some(&location) = cache.uniform_locations.get(symbol) else {
                    debug!("sampler '{symbol}' has no active location, skipping");
                    return Ok(false);
                };
                let slot = self.texture_cursor;
                ctx.bind_texture(slot, Some(*handle));
                self.texture_cursor += 1;
                ctx.set_uniform(location, &UniformData::Int(slot as i32));
                Ok(true)
            }
            UniformValue::TextureArray(handles) => {
                if !ty.is_sampler() {
                    debug!("uniform '{symbol}' is not a sampler, skipping texture bind");
                    return Ok(false);
                }
                let Some(&location) = cache.uniform_locations.get(symbol) else {
                    debug!("sampler '{symbol}' has no active location, skipping");
                    return Ok(false);
                };
                let mut slots = Vec::with_capacity(handles.len());
                for handle in handles {
                    let slot = self.texture_cursor;
                    ctx.bind_texture(slot, Some(*handle));
                    self.texture_cursor += 1;
                    slots.push(slot as i32);
                }
                ctx.set_uniform(
                    location,
                    &UniformData::IntVec {
                        components: 1,
                        values: slots,
                    },
                );
                Ok(true)
            }
            _ => Ok(binder::set_uniform(cache, ctx, symbol, ty, value)),
        }
    }

    /// Binds `texture` (or unbinds, for `None`) to the unit at the current
    /// draw-state cursor and advances the cursor. Returns the slot used.
    pub fn take_current_texture_slot(
        &mut self,
        ctx: &mut dyn GlContext,
        texture: Option<TextureHandle>,
    ) -> u32 {
        let slot = self.texture_cursor;
        ctx.bind_texture(slot, texture);
        self.texture_cursor += 1;
        slot
    }

    pub fn current_texture_slot(&self) -> u32 {
        self.texture_cursor
    }

    /// Restarts slot numbering, letting a caller share texture units across
    /// several shader/material pairs within one draw call.
    pub fn reset_texture_slot(&mut self, slot: u32) {
        self.texture_cursor = slot;
    }

    // --- queries -----------------------------------------------------------

    /// Processed vertex text; `None` until the first successful
    /// [`Shader::process`].
    pub fn processed_vertex(&self) -> Option<&str> {
        self.processed.as_ref().map(|p| p.vertex.as_str())
    }

    pub fn processed_fragment(&self) -> Option<&str> {
        self.processed.as_ref().map(|p| p.fragment.as_str())
    }

    /// The classified declaration surface; `None` until processed.
    pub fn declarations(&self) -> Option<&ResolvedDeclarations> {
        self.resolved.as_ref()
    }

    pub fn material_uniforms(&self) -> &[UniformTemplate] {
        self.resolved
            .as_ref()
            .map(|r| r.material_uniforms.as_slice())
            .unwrap_or(&[])
    }

    /// Per-shader texture-enable table in declaration order. Samplers
    /// default to disabled.
    pub fn texture_status(&self) -> Vec<(&str, bool)> {
        self.texture_symbols
            .iter()
            .map(|s| (s.as_str(), self.enabled_textures.contains(s)))
            .collect()
    }

    /// Declared samplers currently enabled, declaration order.
    pub fn enabled_textures(&self) -> Vec<&str> {
        self.texture_symbols
            .iter()
            .filter(|s| self.enabled_textures.contains(*s))
            .map(String::as_str)
            .collect()
    }
}

fn merge_declarations(first: &[Declaration], second: &[Declaration]) -> Vec<Declaration> {
    let mut merged: Vec<Declaration> = Vec::with_capacity(first.len() + second.len());
    for decl in first.iter().chain(second) {
        if !merged.iter().any(|d| d.symbol == decl.symbol) {
            merged.push(decl.clone());
        }
    }
    merged
}

fn collect_defines(entries: &[(String, DefineValue)]) -> Defines {
    let mut defines = Defines::new();
    for (name, value) in entries {
        defines.set(name, value.clone());
    }
    defines
}

/// Header injection and loop unrolling for one stage. Loop bounds see the
/// user defines first, then source defaults, then the light counts.
fn assemble_stage(
    stage: &StageState,
    stripped: &str,
    texture_status: &[(String, bool)],
    light_counts: &[(String, u32)],
) -> Result<String, ShaderError> {
    let header = defines::compute_header(
        &stage.user_defines,
        &stage.source_defines,
        texture_status,
        light_counts,
    );
    let mut effective = stage.user_defines.clone();
    for (name, value) in stage.source_defines.iter() {
        if !effective.contains(name) {
            effective.set(name, value.clone());
        }
    }
    let body = unroll::unroll_loops(stripped, &effective, light_counts)?;
    Ok(format!("{header}\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = "uniform vec3 color : [1, 1, 1];\n\
                            uniform sampler2D diffuseMap;\n\
                            void main() { gl_FragColor = vec4(color, 1.0); }\n";

    fn make_shader() -> Shader {
        Shader::new("attribute vec3 position : POSITION;\nvoid main() {}\n", FRAGMENT)
    }

    #[test]
    fn samplers_default_to_disabled() {
        let mut shader = make_shader();
        shader.process(&ChunkLibrary::new()).unwrap();
        assert_eq!(shader.texture_status(), vec![("diffuseMap", false)]);
        assert!(shader.enabled_textures().is_empty());
    }

    #[test]
    fn enabling_a_texture_adds_exactly_one_define_line() {
        let chunks = ChunkLibrary::new();
        let mut shader = make_shader();
        shader.process(&chunks).unwrap();
        let disabled = shader.processed_fragment().unwrap().to_string();

        shader.enable_texture("diffuseMap");
        shader.process(&chunks).unwrap();
        let enabled = shader.processed_fragment().unwrap().to_string();

        assert!(!disabled.contains("DIFFUSEMAP_ENABLED"));
        // The enabled text is the disabled text plus exactly one define line.
        let without_flag: Vec<&str> = enabled
            .lines()
            .filter(|l| *l != "#define DIFFUSEMAP_ENABLED")
            .collect();
        assert_eq!(enabled.lines().count(), without_flag.len() + 1);
        assert_eq!(without_flag, disabled.lines().collect::<Vec<_>>());
    }

    #[test]
    fn toggling_twice_restores_processed_text_byte_for_byte() {
        let chunks = ChunkLibrary::new();
        let mut shader = make_shader();
        shader.process(&chunks).unwrap();
        let original = shader.processed_fragment().unwrap().to_string();

        shader.enable_texture("diffuseMap");
        shader.process(&chunks).unwrap();
        shader.disable_texture("diffuseMap");
        shader.process(&chunks).unwrap();
        assert_eq!(shader.processed_fragment().unwrap(), original);
    }

    #[test]
    fn toggling_an_undeclared_texture_does_not_dirty() {
        let chunks = ChunkLibrary::new();
        let mut shader = make_shader();
        shader.process(&chunks).unwrap();
        shader.enable_texture("normalMap");
        assert!(!shader.is_code_dirty());
        shader.disable_texture("normalMap");
        assert!(!shader.is_code_dirty());
        shader.enable_texture("diffuseMap");
        assert!(shader.is_code_dirty());
    }

    #[test]
    fn texture_intent_survives_until_the_sampler_is_declared() {
        let chunks = ChunkLibrary::new();
        let mut shader = Shader::new("void main() {}", "void main() {}");
        shader.enable_texture("normalMap");
        shader.process(&chunks).unwrap();
        assert!(shader.texture_status().is_empty());

        shader.set_fragment("uniform sampler2D normalMap;\nvoid main() {}\n");
        shader.process(&chunks).unwrap();
        assert_eq!(shader.texture_status(), vec![("normalMap", true)]);
    }

    #[test]
    fn source_mutation_marks_code_dirty() {
        let chunks = ChunkLibrary::new();
        let mut shader = make_shader();
        shader.process(&chunks).unwrap();
        assert!(!shader.is_code_dirty());
        shader.set_fragment("void main() {}\n");
        assert!(shader.is_code_dirty());
    }

    #[test]
    fn unknown_semantic_aborts_processing() {
        let mut shader = Shader::new("void main() {}", "uniform float x : FOOBAR;\nvoid main() {}");
        let err = shader.process(&ChunkLibrary::new()).unwrap_err();
        assert!(matches!(err, ShaderError::UnknownSemantic { .. }));
        // No partially usable state.
        assert!(shader.processed_fragment().is_none());
        assert!(shader.is_code_dirty());
    }

    #[test]
    fn attach_detach_reference_counting() {
        let mut shader = make_shader();
        assert!(!shader.is_attached());
        shader.attach();
        shader.attach();
        shader.detach();
        assert!(shader.is_attached());
        shader.detach();
        assert!(!shader.is_attached());
        shader.detach();
        assert!(!shader.is_attached());
    }

    #[test]
    fn light_counts_surface_in_both_headers() {
        let chunks = ChunkLibrary::new();
        let mut shader = make_shader();
        shader.set_light_count("POINT_LIGHT", 2);
        shader.set_light_count("SPOT_LIGHT", 0);
        shader.process(&chunks).unwrap();
        for processed in [shader.processed_vertex(), shader.processed_fragment()] {
            let text = processed.unwrap();
            assert!(text.contains("#define POINT_LIGHT_COUNT 2\n"));
            assert!(!text.contains("SPOT_LIGHT_COUNT"));
        }
    }

    #[test]
    fn source_defines_are_defaults_not_overrides() {
        let chunks = ChunkLibrary::new();
        let mut shader = Shader::new(
            "void main() {}",
            "#define ALPHA_TEST_THRESHOLD 0.5\nvoid main() {}",
        );
        shader.define(
            ShaderStage::Fragment,
            "ALPHA_TEST_THRESHOLD",
            DefineValue::Number(0.9),
        );
        shader.process(&chunks).unwrap();
        let text = shader.processed_fragment().unwrap();
        assert!(text.contains("#define ALPHA_TEST_THRESHOLD 0.9\n"));
        assert!(!text.contains("0.5"));
    }
}
