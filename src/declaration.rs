//! Declaration scanning for shader stage text.
//!
//! The parser extracts `uniform`, `attribute` and `#define` declarations
//! from expanded (but not yet header-injected) stage source using pattern
//! matching. It deliberately stops short of a full GLSL tokenizer; the
//! patterns live behind this module boundary so a real tokenizer could
//! replace them without touching semantic resolution or caching.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::TextureHandle;
use crate::defines::DefineValue;

/// The closed set of declarable GLSL types. Anything else in a declaration
/// position is ignored by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
}

impl DeclaredType {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }

    /// Number of scalar components a single value of this type carries.
    /// Samplers bind through texture units and report 1.
    pub fn component_count(self) -> usize {
        match self {
            Self::Bool | Self::Int | Self::Float | Self::Sampler2D | Self::SamplerCube => 1,
            Self::Vec2 | Self::IVec2 => 2,
            Self::Vec3 | Self::IVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Fixed declared-type to wire-format table. Array declarations append
    /// a `v` suffix.
    pub fn wire_format(self, array: bool) -> &'static str {
        match (self, array) {
            (Self::Bool | Self::Int, false) => "1i",
            (Self::Bool | Self::Int, true) => "1iv",
            (Self::Sampler2D | Self::SamplerCube, false) => "t",
            (Self::Sampler2D | Self::SamplerCube, true) => "tv",
            (Self::Float, false) => "1f",
            (Self::Float, true) => "1fv",
            (Self::Vec2, false) => "2f",
            (Self::Vec2, true) => "2fv",
            (Self::Vec3, false) => "3f",
            (Self::Vec3, true) => "3fv",
            (Self::Vec4, false) => "4f",
            (Self::Vec4, true) => "4fv",
            (Self::IVec2, false) => "2i",
            (Self::IVec2, true) => "2iv",
            (Self::IVec3, false) => "3i",
            (Self::IVec3, true) => "3iv",
            (Self::IVec4, false) => "4i",
            (Self::IVec4, true) => "4iv",
            (Self::Mat2, _) => "m2",
            (Self::Mat3, _) => "m3",
            (Self::Mat4, _) => "m4",
        }
    }
}

/// A uniform value, tagged once at declaration time. Binding dispatches on
/// this closed set instead of re-inspecting the value shape at every draw.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    IntArray(Vec<i32>),
    /// Flat float data for vectors, matrices and their arrays.
    FloatArray(Vec<f32>),
    Texture(TextureHandle),
    TextureArray(Vec<TextureHandle>),
}

/// One scanned `uniform`/`attribute` declaration. The `annotation` text
/// after a `:` is left uninterpreted here; the semantic resolver decides
/// whether it names a semantic, the `unconfigurable` marker, or a default
/// literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub symbol: String,
    pub ty: DeclaredType,
    pub array: bool,
    pub annotation: Option<String>,
}

impl Declaration {
    pub fn wire_format(&self) -> &'static str {
        self.ty.wire_format(self.array)
    }
}

/// Scan result for one shader stage.
#[derive(Debug, Default, Clone)]
pub struct ParsedStage {
    /// Uniform declarations in first-occurrence order.
    pub uniforms: Vec<Declaration>,
    /// Attribute declarations in first-occurrence order.
    pub attributes: Vec<Declaration>,
    /// `#define` lines found in the source. These are defaults: they are
    /// folded into the stage define set only when the user has not already
    /// set the symbol.
    pub source_defines: Vec<(String, DefineValue)>,
    /// Stage text with the scanned `#define` lines stripped, so re-emitting
    /// them through the header cannot double-define a symbol.
    pub stripped: String,
}

impl ParsedStage {
    /// Sampler uniforms, in declaration order. Each becomes an entry in the
    /// per-shader texture-enable table, defaulting to disabled.
    pub fn samplers(&self) -> impl Iterator<Item = &Declaration> {
        self.uniforms.iter().filter(|d| d.ty.is_sampler())
    }
}

static UNIFORM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"uniform\s+(bool|float|int|vec2|vec3|vec4|ivec2|ivec3|ivec4|mat2|mat3|mat4|sampler2D|samplerCube)\s+([\w,\s]+?)(\[[^\]]*\])?\s*(?::\s*([^;]+?))?\s*;",
    )
    .unwrap()
});

static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"attribute\s+(float|int|vec2|vec3|vec4)\s+(\w+)\s*(?::\s*(\w+))?\s*;").unwrap()
});

static DEFINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#define[ \t]+(\w+)(?:[ \t]+([\w.-]+))?[ \t]*;?[ \t]*$").unwrap()
});

/// Scans one stage's expanded text for declarations.
///
/// Deterministic: identical input yields an identical declaration set in
/// first-occurrence order.
pub fn parse_stage(text: &str) -> ParsedStage {
    let mut parsed = ParsedStage::default();

    for caps in UNIFORM_RE.captures_iter(text) {
        let Some(ty) = DeclaredType::parse(&caps[1]) else {
            continue;
        };
        let array = caps.get(3).is_some();
        let annotation = caps.get(4).map(|m| m.as_str().trim().to_string());
        // One `uniform vec3 a, b;` line declares each listed symbol.
        for symbol in caps[2].split(',') {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            parsed.uniforms.push(Declaration {
                symbol: symbol.to_string(),
                ty,
                array,
                annotation: annotation.clone(),
            });
        }
    }

    for caps in ATTRIBUTE_RE.captures_iter(text) {
        let Some(ty) = DeclaredType::parse(&caps[1]) else {
            continue;
        };
        parsed.attributes.push(Declaration {
            symbol: caps[2].to_string(),
            ty,
            array: false,
            annotation: caps.get(3).map(|m| m.as_str().to_string()),
        });
    }

    for caps in DEFINE_RE.captures_iter(text) {
        let value = match caps.get(2) {
            Some(m) => DefineValue::parse(m.as_str()),
            None => DefineValue::Flag,
        };
        parsed.source_defines.push((caps[1].to_string(), value));
    }
    parsed.stripped = DEFINE_RE.replace_all(text, "").into_owned();

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_uniform_with_annotation() {
        let parsed = parse_stage("uniform vec3 color : [1, 2, 3];");
        assert_eq!(parsed.uniforms.len(), 1);
        let decl = &parsed.uniforms[0];
        assert_eq!(decl.symbol, "color");
        assert_eq!(decl.ty, DeclaredType::Vec3);
        assert!(!decl.array);
        assert_eq!(decl.annotation.as_deref(), Some("[1, 2, 3]"));
    }

    #[test]
    fn scans_comma_separated_symbols() {
        let parsed = parse_stage("uniform float weightA, weightB;");
        let symbols: Vec<_> = parsed.uniforms.iter().map(|d| d.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["weightA", "weightB"]);
    }

    #[test]
    fn scans_array_suffix() {
        let parsed = parse_stage("uniform mat4 skinMatrix[JOINT_COUNT] : SKIN_MATRIX;");
        let decl = &parsed.uniforms[0];
        assert!(decl.array);
        assert_eq!(decl.wire_format(), "m4");
        assert_eq!(decl.annotation.as_deref(), Some("SKIN_MATRIX"));
    }

    #[test]
    fn scans_attribute_with_semantic() {
        let parsed = parse_stage("attribute vec3 position : POSITION;\nattribute vec2 uv;");
        assert_eq!(parsed.attributes.len(), 2);
        assert_eq!(parsed.attributes[0].annotation.as_deref(), Some("POSITION"));
        assert_eq!(parsed.attributes[1].annotation, None);
    }

    #[test]
    fn scans_and_strips_defines() {
        let parsed = parse_stage("#define SHADOW_CASTER\n#define PCF_KERNEL_SIZE 4\nvoid main() {}\n");
        assert_eq!(
            parsed.source_defines,
            vec![
                ("SHADOW_CASTER".to_string(), DefineValue::Flag),
                ("PCF_KERNEL_SIZE".to_string(), DefineValue::Number(4.0)),
            ]
        );
        assert!(!parsed.stripped.contains("#define"));
        assert!(parsed.stripped.contains("void main()"));
    }

    #[test]
    fn samplers_are_listed_in_declaration_order() {
        let parsed =
            parse_stage("uniform sampler2D diffuseMap;\nuniform float level;\nuniform samplerCube envMap;");
        let samplers: Vec<_> = parsed.samplers().map(|d| d.symbol.as_str()).collect();
        assert_eq!(samplers, vec!["diffuseMap", "envMap"]);
    }

    #[test]
    fn wire_format_table() {
        assert_eq!(DeclaredType::Bool.wire_format(false), "1i");
        assert_eq!(DeclaredType::Sampler2D.wire_format(false), "t");
        assert_eq!(DeclaredType::Float.wire_format(false), "1f");
        assert_eq!(DeclaredType::Vec3.wire_format(false), "3f");
        assert_eq!(DeclaredType::Vec3.wire_format(true), "3fv");
        assert_eq!(DeclaredType::IVec2.wire_format(false), "2i");
        assert_eq!(DeclaredType::Mat4.wire_format(false), "m4");
        assert_eq!(DeclaredType::Float.wire_format(true), "1fv");
    }

    #[test]
    fn identical_input_yields_identical_declarations() {
        let src = "uniform vec4 tint : [1,1,1,1];\nattribute vec3 normal : NORMAL;\n#define X 1\n";
        let a = parse_stage(src);
        let b = parse_stage(src);
        assert_eq!(a.uniforms, b.uniforms);
        assert_eq!(a.attributes, b.attributes);
        assert_eq!(a.source_defines, b.source_defines);
    }
}
