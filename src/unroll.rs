//! Bounded loop unrolling for light arrays.
//!
//! GLSL ES 1.0 restricts loop indices into uniform arrays, so light loops
//! are authored against a fixed marker pattern and flattened before
//! compilation:
//!
//! ```text
//! for (int _idx_ = 0; _idx_ < POINT_LIGHT_COUNT; _idx_++) {{
//!     diffuse += lightColor[_idx_] * falloff(float(_idx_));
//! }}
//! ```
//!
//! Each bound is an integer literal or a symbol resolved first against the
//! stage defines, then against the light counts. The body is emitted
//! `end - start` times, each copy in its own scope, with `float(_idx_)`
//! rewritten to a one-decimal float literal and `_idx_` to the integer.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::defines::{DefineValue, Defines};
use crate::error::ShaderError;

static LOOP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)for\s*\(\s*int\s+_idx_\s*=\s*([\w-]+)\s*;\s*_idx_\s*<\s*([\w-]+)\s*;\s*_idx_\s*\+\+\s*\)\s*\{\{(.*?)\}\}",
    )
    .unwrap()
});

/// Expands every loop marker in `text`. Fails if a bound symbol resolves
/// against neither the defines nor the light counts.
pub fn unroll_loops(
    text: &str,
    defines: &Defines,
    light_counts: &[(String, u32)],
) -> Result<String, ShaderError> {
    let mut error = None;
    let out = LOOP_RE.replace_all(text, |caps: &Captures<'_>| {
        if error.is_some() {
            return String::new();
        }
        let start = match resolve_bound(&caps[1], defines, light_counts) {
            Ok(n) => n,
            Err(e) => {
                error = Some(e);
                return String::new();
            }
        };
        let end = match resolve_bound(&caps[2], defines, light_counts) {
            Ok(n) => n,
            Err(e) => {
                error = Some(e);
                return String::new();
            }
        };
        let body = &caps[3];
        let mut expanded = String::new();
        for i in start..end {
            expanded.push('{');
            expanded.push_str(
                &body
                    .replace("float(_idx_)", &format!("{i}.0"))
                    .replace("_idx_", &i.to_string()),
            );
            expanded.push_str("}\n");
        }
        expanded
    });
    match error {
        Some(e) => Err(e),
        None => Ok(out.into_owned()),
    }
}

fn resolve_bound(
    token: &str,
    defines: &Defines,
    light_counts: &[(String, u32)],
) -> Result<i64, ShaderError> {
    if let Ok(n) = token.parse::<i64>() {
        return Ok(n);
    }
    if let Some(DefineValue::Number(n)) = defines.get(token) {
        return Ok(*n as i64);
    }
    if let Some(light_type) = token.strip_suffix("_COUNT") {
        if let Some((_, count)) = light_counts.iter().find(|(t, _)| t == light_type) {
            return Ok(i64::from(*count));
        }
    }
    Err(ShaderError::UnresolvedLoopBound(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lights() -> Vec<(String, u32)> {
        Vec::new()
    }

    #[test]
    fn literal_bounds_expand_scoped_copies() {
        let out = unroll_loops(
            "for (int _idx_ = 0; _idx_ < 3; _idx_++) {{v += a[_idx_];}}",
            &Defines::new(),
            &no_lights(),
        )
        .unwrap();
        assert_eq!(out, "{v += a[0];}\n{v += a[1];}\n{v += a[2];}\n");
    }

    #[test]
    fn float_of_index_becomes_one_decimal_literal() {
        let out = unroll_loops(
            "for (int _idx_ = 0; _idx_ < 2; _idx_++) {{w = float(_idx_) * s[_idx_];}}",
            &Defines::new(),
            &no_lights(),
        )
        .unwrap();
        assert_eq!(out, "{w = 0.0 * s[0];}\n{w = 1.0 * s[1];}\n");
    }

    #[test]
    fn define_bound_of_zero_expands_to_nothing() {
        let mut defines = Defines::new();
        defines.set("LIGHT_N", DefineValue::Number(0.0));
        let out = unroll_loops(
            "for (int _idx_ = 0; _idx_ < LIGHT_N; _idx_++) {{x();}}",
            &defines,
            &no_lights(),
        )
        .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn bound_falls_through_to_light_counts() {
        let lights = vec![("POINT_LIGHT".to_string(), 2)];
        let out = unroll_loops(
            "for (int _idx_ = 0; _idx_ < POINT_LIGHT_COUNT; _idx_++) {{p(_idx_);}}",
            &Defines::new(),
            &lights,
        )
        .unwrap();
        assert_eq!(out, "{p(0);}\n{p(1);}\n");
    }

    #[test]
    fn defines_win_over_light_counts() {
        let mut defines = Defines::new();
        defines.set("POINT_LIGHT_COUNT", DefineValue::Number(1.0));
        let lights = vec![("POINT_LIGHT".to_string(), 3)];
        let out = unroll_loops(
            "for (int _idx_ = 0; _idx_ < POINT_LIGHT_COUNT; _idx_++) {{p();}}",
            &defines,
            &lights,
        )
        .unwrap();
        assert_eq!(out, "{p();}\n");
    }

    #[test]
    fn unresolvable_bound_is_a_hard_error() {
        let err = unroll_loops(
            "for (int _idx_ = 0; _idx_ < MYSTERY_COUNT; _idx_++) {{x();}}",
            &Defines::new(),
            &no_lights(),
        )
        .unwrap_err();
        match err {
            ShaderError::UnresolvedLoopBound(token) => assert_eq!(token, "MYSTERY_COUNT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_without_markers_passes_through() {
        let src = "for (int i = 0; i < 4; i++) { regular(); }";
        let out = unroll_loops(src, &Defines::new(), &no_lights()).unwrap();
        assert_eq!(out, src);
    }
}
