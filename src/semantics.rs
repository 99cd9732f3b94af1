//! Semantic classification of scanned declarations.
//!
//! A declaration's `: annotation` text is classified into one of three
//! closed vocabularies (attribute semantics, matrix semantics, generic
//! uniform semantics), the `unconfigurable` marker, or a default-value
//! literal for the declared type. Anything else is a hard error naming the
//! offending symbol: it signals a shader-authoring mistake, not a runtime
//! condition.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::declaration::{Declaration, DeclaredType, UniformValue};
use crate::error::ShaderError;

/// Vertex attribute semantics. Fixed external contract, case-sensitive.
pub const ATTRIBUTE_SEMANTICS: &[&str] = &[
    "POSITION",
    "NORMAL",
    "BINORMAL",
    "TANGENT",
    "TEXCOORD",
    "TEXCOORD_0",
    "TEXCOORD_1",
    "COLOR",
    "JOINT",
    "WEIGHT",
];

/// Transform matrix semantics: WORLD, VIEW, PROJECTION, their products and
/// inverses. A `TRANSPOSE` suffix on any of these is recognized dynamically
/// and records a back-reference to the non-transposed name.
pub const MATRIX_SEMANTICS: &[&str] = &[
    "WORLD",
    "VIEW",
    "PROJECTION",
    "WORLDVIEW",
    "VIEWPROJECTION",
    "WORLDVIEWPROJECTION",
    "WORLDINVERSE",
    "VIEWINVERSE",
    "PROJECTIONINVERSE",
    "WORLDVIEWINVERSE",
    "VIEWPROJECTIONINVERSE",
    "WORLDVIEWPROJECTIONINVERSE",
];

/// Engine-supplied generic uniform semantics.
pub const UNIFORM_SEMANTICS: &[&str] = &[
    "SKIN_MATRIX",
    "VIEWPORT",
    "VIEWPORT_SIZE",
    "WINDOW_SIZE",
    "DEVICEPIXELRATIO",
    "NEAR",
    "FAR",
    "TIME",
];

/// Declarations carrying this annotation are excluded from the
/// material-facing surface but bound to no semantic; their values are fixed
/// by light-type header chunks.
pub const UNCONFIGURABLE: &str = "unconfigurable";

static ATTRIBUTE_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ATTRIBUTE_SEMANTICS.iter().copied().collect());
static MATRIX_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| MATRIX_SEMANTICS.iter().copied().collect());
static UNIFORM_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| UNIFORM_SEMANTICS.iter().copied().collect());

/// A uniform kept on the configurable surface (or internal, for
/// `unconfigurable` declarations), with its synthesized default.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformTemplate {
    pub symbol: String,
    pub ty: DeclaredType,
    pub array: bool,
    default: Option<UniformValue>,
}

impl UniformTemplate {
    pub fn wire_format(&self) -> &'static str {
        self.ty.wire_format(self.array)
    }

    /// Materializes the declared default by value. Shaders sharing a
    /// declaration never observe each other's mutations of the default.
    pub fn default_value(&self) -> Option<UniformValue> {
        self.default.clone()
    }
}

/// An attribute declaration surviving on the binding surface.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTemplate {
    pub symbol: String,
    pub ty: DeclaredType,
    pub semantic: Option<String>,
}

/// A symbol claimed by an attribute or generic uniform semantic.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEntry {
    pub symbol: String,
    pub ty: DeclaredType,
    pub array: bool,
}

/// A symbol claimed by a matrix semantic. Transposed variants keep a
/// back-reference to their non-transposed counterpart so the renderer can
/// derive one from the other.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSemanticEntry {
    pub symbol: String,
    pub ty: DeclaredType,
    pub array: bool,
    pub transpose: bool,
    pub semantic_no_transpose: String,
}

/// The classified declaration surface of one shader.
///
/// Invariant: a symbol claimed by one of the semantic maps never also
/// appears among the material-configurable uniforms.
#[derive(Debug, Default, Clone)]
pub struct ResolvedDeclarations {
    /// Material-configurable uniforms, first-occurrence order.
    pub material_uniforms: Vec<UniformTemplate>,
    /// `unconfigurable` uniforms: compiled and located, but hidden from the
    /// material surface.
    pub internal_uniforms: Vec<UniformTemplate>,
    /// All attribute declarations, in declaration order.
    pub attributes: Vec<AttributeTemplate>,
    /// Attribute semantic → claimed symbol.
    pub attribute_semantics: HashMap<String, SemanticEntry>,
    /// Matrix semantic → claimed symbol with transpose data.
    pub matrix_semantics: HashMap<String, MatrixSemanticEntry>,
    /// Generic uniform semantic → claimed symbol.
    pub uniform_semantics: HashMap<String, SemanticEntry>,
}

impl ResolvedDeclarations {
    pub fn material_uniform(&self, symbol: &str) -> Option<&UniformTemplate> {
        self.material_uniforms.iter().find(|u| u.symbol == symbol)
    }

    /// Every uniform symbol the linked program may expose, with its declared
    /// type: material, internal, and semantic-claimed alike. Used to cache
    /// locations once per context after a successful link.
    pub fn uniform_symbols(&self) -> Vec<(String, DeclaredType, bool)> {
        let mut symbols = Vec::new();
        for u in self.material_uniforms.iter().chain(&self.internal_uniforms) {
            symbols.push((u.symbol.clone(), u.ty, u.array));
        }
        for entry in self.uniform_semantics.values() {
            symbols.push((entry.symbol.clone(), entry.ty, entry.array));
        }
        for entry in self.matrix_semantics.values() {
            symbols.push((entry.symbol.clone(), entry.ty, entry.array));
        }
        symbols
    }

    /// Declared type of any uniform symbol, regardless of which surface
    /// claimed it.
    pub fn uniform_type(&self, symbol: &str) -> Option<(DeclaredType, bool)> {
        self.material_uniforms
            .iter()
            .chain(&self.internal_uniforms)
            .find(|u| u.symbol == symbol)
            .map(|u| (u.ty, u.array))
            .or_else(|| {
                self.uniform_semantics
                    .values()
                    .find(|e| e.symbol == symbol)
                    .map(|e| (e.ty, e.array))
            })
            .or_else(|| {
                self.matrix_semantics
                    .values()
                    .find(|e| e.symbol == symbol)
                    .map(|e| (e.ty, e.array))
            })
    }

    /// The symbol that must be forced to attribute location 0 before
    /// linking: POSITION when present, the first declared attribute
    /// otherwise.
    pub fn location_zero_attribute(&self) -> Option<&str> {
        self.attribute_semantics
            .get("POSITION")
            .map(|e| e.symbol.as_str())
            .or_else(|| self.attributes.first().map(|a| a.symbol.as_str()))
    }
}

/// Classifies uniform and attribute declarations into the shader's surfaces.
///
/// Hard-fails on the first annotation matching no vocabulary, no marker and
/// no valid default literal; shader construction must not proceed with a
/// partially-resolved surface.
pub fn resolve(
    uniforms: &[Declaration],
    attributes: &[Declaration],
) -> Result<ResolvedDeclarations, ShaderError> {
    let mut resolved = ResolvedDeclarations::default();

    for decl in uniforms {
        match decl.annotation.as_deref() {
            None => resolved.material_uniforms.push(UniformTemplate {
                symbol: decl.symbol.clone(),
                ty: decl.ty,
                array: decl.array,
                default: None,
            }),
            Some(UNCONFIGURABLE) => resolved.internal_uniforms.push(UniformTemplate {
                symbol: decl.symbol.clone(),
                ty: decl.ty,
                array: decl.array,
                default: None,
            }),
            Some(text) if ATTRIBUTE_SET.contains(text) => {
                resolved.attribute_semantics.insert(
                    text.to_string(),
                    SemanticEntry {
                        symbol: decl.symbol.clone(),
                        ty: decl.ty,
                        array: decl.array,
                    },
                );
            }
            Some(text) if is_matrix_semantic(text) => {
                let (transpose, base) = split_transpose(text);
                resolved.matrix_semantics.insert(
                    text.to_string(),
                    MatrixSemanticEntry {
                        symbol: decl.symbol.clone(),
                        ty: decl.ty,
                        array: decl.array,
                        transpose,
                        semantic_no_transpose: base.to_string(),
                    },
                );
            }
            Some(text) if UNIFORM_SET.contains(text) => {
                resolved.uniform_semantics.insert(
                    text.to_string(),
                    SemanticEntry {
                        symbol: decl.symbol.clone(),
                        ty: decl.ty,
                        array: decl.array,
                    },
                );
            }
            Some(text) => match parse_default_literal(decl.ty, text) {
                Some(default) => resolved.material_uniforms.push(UniformTemplate {
                    symbol: decl.symbol.clone(),
                    ty: decl.ty,
                    array: decl.array,
                    default: Some(default),
                }),
                None => {
                    return Err(ShaderError::UnknownSemantic {
                        symbol: decl.symbol.clone(),
                        semantic: text.to_string(),
                    })
                }
            },
        }
    }

    for decl in attributes {
        if let Some(text) = decl.annotation.as_deref() {
            if !ATTRIBUTE_SET.contains(text) {
                return Err(ShaderError::UnknownSemantic {
                    symbol: decl.symbol.clone(),
                    semantic: text.to_string(),
                });
            }
            resolved.attribute_semantics.insert(
                text.to_string(),
                SemanticEntry {
                    symbol: decl.symbol.clone(),
                    ty: decl.ty,
                    array: false,
                },
            );
        }
        resolved.attributes.push(AttributeTemplate {
            symbol: decl.symbol.clone(),
            ty: decl.ty,
            semantic: decl.annotation.clone(),
        });
    }

    Ok(resolved)
}

fn is_matrix_semantic(text: &str) -> bool {
    let (_, base) = split_transpose(text);
    MATRIX_SET.contains(base)
}

fn split_transpose(text: &str) -> (bool, &str) {
    match text.strip_suffix("TRANSPOSE") {
        // INVERSETRANSPOSE strips to a stored ...INVERSE name; a bare stored
        // name ending in TRANSPOSE does not exist, so stripping is safe.
        Some(base) if MATRIX_SET.contains(base) => (true, base),
        _ => (false, text),
    }
}

/// Parses the annotation as a default literal for the declared type: an
/// array literal for vector/matrix types, a bool/int/float literal for
/// scalars. Samplers admit no default literal.
fn parse_default_literal(ty: DeclaredType, text: &str) -> Option<UniformValue> {
    match ty {
        DeclaredType::Bool => text.parse::<bool>().ok().map(UniformValue::Bool),
        DeclaredType::Int => text.parse::<i32>().ok().map(UniformValue::Int),
        DeclaredType::Float => text.parse::<f32>().ok().map(UniformValue::Float),
        DeclaredType::Vec2
        | DeclaredType::Vec3
        | DeclaredType::Vec4
        | DeclaredType::Mat2
        | DeclaredType::Mat3
        | DeclaredType::Mat4 => {
            let values = parse_array_literal(text)?;
            if values.len() != ty.component_count() {
                return None;
            }
            Some(UniformValue::FloatArray(values))
        }
        DeclaredType::IVec2 | DeclaredType::IVec3 | DeclaredType::IVec4 => {
            let values = parse_array_literal(text)?;
            if values.len() != ty.component_count() {
                return None;
            }
            let ints = values.iter().map(|v| *v as i32).collect();
            Some(UniformValue::IntArray(ints))
        }
        DeclaredType::Sampler2D | DeclaredType::SamplerCube => None,
    }
}

fn parse_array_literal(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut values = Vec::new();
    for part in inner.split(',') {
        values.push(part.trim().parse::<f32>().ok()?);
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(symbol: &str, ty: DeclaredType, annotation: Option<&str>) -> Declaration {
        Declaration {
            symbol: symbol.to_string(),
            ty,
            array: false,
            annotation: annotation.map(str::to_string),
        }
    }

    #[test]
    fn plain_uniform_stays_configurable() {
        let resolved = resolve(&[uniform("opacity", DeclaredType::Float, None)], &[]).unwrap();
        assert!(resolved.material_uniform("opacity").is_some());
    }

    #[test]
    fn default_literal_is_materialized_by_value() {
        let resolved =
            resolve(&[uniform("color", DeclaredType::Vec3, Some("[1, 2, 3]"))], &[]).unwrap();
        let template = resolved.material_uniform("color").unwrap();
        let a = template.default_value().unwrap();
        let b = template.default_value().unwrap();
        assert_eq!(a, UniformValue::FloatArray(vec![1.0, 2.0, 3.0]));
        // Two materializations are independent values.
        if let (UniformValue::FloatArray(mut va), UniformValue::FloatArray(vb)) = (a, b) {
            va[0] = 99.0;
            assert_eq!(vb[0], 1.0);
        } else {
            panic!("expected float arrays");
        }
    }

    #[test]
    fn matrix_semantic_with_transpose_back_reference() {
        let resolved = resolve(
            &[uniform(
                "worldViewIT",
                DeclaredType::Mat4,
                Some("WORLDVIEWINVERSETRANSPOSE"),
            )],
            &[],
        )
        .unwrap();
        let entry = resolved
            .matrix_semantics
            .get("WORLDVIEWINVERSETRANSPOSE")
            .unwrap();
        assert!(entry.transpose);
        assert_eq!(entry.semantic_no_transpose, "WORLDVIEWINVERSE");
        assert!(resolved.material_uniform("worldViewIT").is_none());
    }

    #[test]
    fn non_transposed_matrix_semantic() {
        let resolved =
            resolve(&[uniform("world", DeclaredType::Mat4, Some("WORLD"))], &[]).unwrap();
        let entry = resolved.matrix_semantics.get("WORLD").unwrap();
        assert!(!entry.transpose);
        assert_eq!(entry.semantic_no_transpose, "WORLD");
    }

    #[test]
    fn generic_uniform_semantic_leaves_material_surface() {
        let resolved = resolve(&[uniform("now", DeclaredType::Float, Some("TIME"))], &[]).unwrap();
        assert!(resolved.material_uniform("now").is_none());
        assert_eq!(resolved.uniform_semantics.get("TIME").unwrap().symbol, "now");
    }

    #[test]
    fn unconfigurable_is_internal() {
        let resolved = resolve(
            &[uniform("shadowBias", DeclaredType::Float, Some(UNCONFIGURABLE))],
            &[],
        )
        .unwrap();
        assert!(resolved.material_uniform("shadowBias").is_none());
        assert_eq!(resolved.internal_uniforms[0].symbol, "shadowBias");
    }

    #[test]
    fn unknown_semantic_fails_naming_the_text() {
        let err = resolve(&[uniform("x", DeclaredType::Float, Some("FOOBAR"))], &[]).unwrap_err();
        match err {
            ShaderError::UnknownSemantic { symbol, semantic } => {
                assert_eq!(symbol, "x");
                assert_eq!(semantic, "FOOBAR");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_arity_array_literal_is_rejected() {
        let err =
            resolve(&[uniform("color", DeclaredType::Vec3, Some("[1, 2]"))], &[]).unwrap_err();
        assert!(matches!(err, ShaderError::UnknownSemantic { .. }));
    }

    #[test]
    fn attribute_semantic_claims_symbol() {
        let attr = Declaration {
            symbol: "pos".to_string(),
            ty: DeclaredType::Vec3,
            array: false,
            annotation: Some("POSITION".to_string()),
        };
        let resolved = resolve(&[], &[attr]).unwrap();
        assert_eq!(
            resolved.attribute_semantics.get("POSITION").unwrap().symbol,
            "pos"
        );
        assert_eq!(resolved.location_zero_attribute(), Some("pos"));
    }

    #[test]
    fn attribute_with_unknown_semantic_fails() {
        let attr = Declaration {
            symbol: "pos".to_string(),
            ty: DeclaredType::Vec3,
            array: false,
            annotation: Some("POSITON".to_string()),
        };
        let err = resolve(&[], &[attr]).unwrap_err();
        assert!(matches!(err, ShaderError::UnknownSemantic { .. }));
    }

    #[test]
    fn first_attribute_is_location_zero_fallback() {
        let attr = Declaration {
            symbol: "uv".to_string(),
            ty: DeclaredType::Vec2,
            array: false,
            annotation: None,
        };
        let resolved = resolve(&[], &[attr]).unwrap();
        assert_eq!(resolved.location_zero_attribute(), Some("uv"));
    }
}
