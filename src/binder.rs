//! Draw-time uniform, attribute and texture-unit binding.
//!
//! These helpers operate on a context's [`ContextCache`] during a draw.
//! Setting a uniform whose symbol has no cached location is a silent no-op;
//! that happens legitimately when a permutation compiles the uniform away.

use std::collections::HashSet;

use log::debug;

use crate::backend::{GlContext, UniformData};
use crate::declaration::{DeclaredType, UniformValue};
use crate::error::ShaderError;
use crate::program::ContextCache;

/// Per-context draw state shared by every shader drawing on that context.
///
/// The enabled-attribute set has to outlive any single shader: an index
/// enabled by the previously bound shader must be disabled when the next
/// shader does not use it, even though that shader never enabled it. The
/// caller owns one `DrawState` per context identity and passes it to every
/// attribute-enable call on that context.
#[derive(Debug, Default)]
pub struct DrawState {
    enabled_attributes: HashSet<u32>,
}

impl DrawState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled_attributes(&self) -> &HashSet<u32> {
        &self.enabled_attributes
    }
}

/// Resolves attribute locations for `symbols` and synchronizes the
/// context's enabled-attribute set against them: newly used indices are
/// enabled, stale ones from a previously bound shader are disabled, and
/// indices staying in use across consecutive draws are left alone.
///
/// Returns one location per requested symbol; `None` for attributes the
/// linked program does not expose.
pub(crate) fn enable_attributes(
    cache: &mut ContextCache,
    state: &mut DrawState,
    ctx: &mut dyn GlContext,
    symbols: &[&str],
) -> Result<Vec<Option<u32>>, ShaderError> {
    let program = cache
        .program
        .ok_or_else(|| ShaderError::NotCompiled(ctx.context_id().0))?;

    let mut locations = Vec::with_capacity(symbols.len());
    let mut wanted = HashSet::new();
    for &symbol in symbols {
        let location = match cache.attribute_locations.get(symbol) {
            Some(&cached) => Some(cached),
            None => {
                let queried = ctx.attribute_location(program, symbol);
                if let Some(index) = queried {
                    cache.attribute_locations.insert(symbol.to_string(), index);
                }
                queried
            }
        };
        if let Some(index) = location {
            wanted.insert(index);
        }
        locations.push(location);
    }

    for &index in &wanted {
        if !state.enabled_attributes.contains(&index) {
            ctx.enable_attribute(index);
        }
    }
    for &index in &state.enabled_attributes {
        if !wanted.contains(&index) {
            ctx.disable_attribute(index);
        }
    }
    state.enabled_attributes = wanted;

    Ok(locations)
}

/// Writes one uniform value through the cached location. Returns false when
/// the symbol has no active location (no-op).
///
/// Texture values are not handled here; the shader allocates their units
/// through the draw-state cursor and writes the slot index as an int.
pub(crate) fn set_uniform(
    cache: &ContextCache,
    ctx: &mut dyn GlContext,
    symbol: &str,
    ty: DeclaredType,
    value: &UniformValue,
) -> bool {
    let Some(&location) = cache.uniform_locations.get(symbol) else {
        debug!("uniform '{symbol}' has no active location, skipping");
        return false;
    };
    let data = match wire_data(ty, value) {
        Some(data) => data,
        None => {
            debug!(
                "uniform '{symbol}' value shape does not match declared type {ty:?}, skipping"
            );
            return false;
        }
    };
    ctx.set_uniform(location, &data);
    true
}

/// Converts a typed value into its wire payload according to the declared
/// type. The declared type decides the dispatch; the value only supplies
/// the data.
fn wire_data(ty: DeclaredType, value: &UniformValue) -> Option<UniformData> {
    match (ty, value) {
        (DeclaredType::Bool, UniformValue::Bool(b)) => Some(UniformData::Int(i32::from(*b))),
        (DeclaredType::Bool | DeclaredType::Int, UniformValue::Int(i)) => {
            Some(UniformData::Int(*i))
        }
        (DeclaredType::Float, UniformValue::Float(f)) => Some(UniformData::Float(*f)),
        (DeclaredType::Float, UniformValue::FloatArray(values)) => Some(UniformData::FloatVec {
            components: 1,
            values: values.clone(),
        }),
        (DeclaredType::Vec2 | DeclaredType::Vec3 | DeclaredType::Vec4, UniformValue::FloatArray(values)) => {
            Some(UniformData::FloatVec {
                components: ty.component_count() as u8,
                values: values.clone(),
            })
        }
        (DeclaredType::IVec2 | DeclaredType::IVec3 | DeclaredType::IVec4, UniformValue::IntArray(values)) => {
            Some(UniformData::IntVec {
                components: ty.component_count() as u8,
                values: values.clone(),
            })
        }
        (DeclaredType::Int, UniformValue::IntArray(values)) => Some(UniformData::IntVec {
            components: 1,
            values: values.clone(),
        }),
        (DeclaredType::Mat2, UniformValue::FloatArray(values)) => Some(UniformData::Matrix {
            dim: 2,
            values: values.clone(),
        }),
        (DeclaredType::Mat3, UniformValue::FloatArray(values)) => Some(UniformData::Matrix {
            dim: 3,
            values: values.clone(),
        }),
        (DeclaredType::Mat4, UniformValue::FloatArray(values)) => Some(UniformData::Matrix {
            dim: 4,
            values: values.clone(),
        }),
        _ => None,
    }
}
