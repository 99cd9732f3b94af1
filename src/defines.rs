//! Conditional-compilation defines and header synthesis.
//!
//! Each stage carries a define set selecting one shader permutation.
//! Texture-enable flags and per-light-type counts are derived entries;
//! everything else comes from explicit `define`/`undefine` calls or from
//! `#define` defaults found in the source.

use log::warn;

/// Value of a conditional-compilation symbol. `Flag` is "defined with no
/// value".
#[derive(Debug, Clone, PartialEq)]
pub enum DefineValue {
    Flag,
    Bool(bool),
    Number(f64),
}

impl DefineValue {
    /// Parses a source-declared define value. Text that is neither a bool
    /// nor a number degrades to a bare flag.
    pub fn parse(text: &str) -> Self {
        if let Ok(b) = text.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(n) = text.parse::<f64>() {
            return Self::Number(n);
        }
        warn!("define value '{text}' is neither bool nor number, treating as bare flag");
        Self::Flag
    }

    fn header_suffix(&self) -> String {
        match self {
            Self::Flag => String::new(),
            Self::Bool(b) => format!(" {b}"),
            // `{}` on f64 prints integral values without a decimal point.
            Self::Number(n) => format!(" {n}"),
        }
    }
}

/// An insertion-ordered define set. Small by nature; lookups scan linearly.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Defines {
    entries: Vec<(String, DefineValue)>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a symbol, overwriting its value but keeping its original
    /// position when already present. Returns true if anything changed.
    pub fn set(&mut self, name: &str, value: DefineValue) -> bool {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => {
                if *existing == value {
                    false
                } else {
                    *existing = value;
                    true
                }
            }
            None => {
                self.entries.push((name.to_string(), value));
                true
            }
        }
    }

    /// Removes a symbol. Returns true if it was present.
    pub fn unset(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&DefineValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefineValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Synthesizes the `#define` header for one stage.
///
/// Line order: derived light-type counts (only counts above zero), enabled
/// texture flags as `<SYMBOL_UPPERCASE>_ENABLED`, then user defines followed
/// by source-declared defaults the user has not overridden.
pub fn compute_header(
    user_defines: &Defines,
    source_defines: &Defines,
    texture_status: &[(String, bool)],
    light_counts: &[(String, u32)],
) -> String {
    let mut header = String::new();
    for (light_type, count) in light_counts {
        if *count > 0 {
            header.push_str(&format!("#define {light_type}_COUNT {count}\n"));
        }
    }
    for (symbol, enabled) in texture_status {
        if *enabled {
            header.push_str(&format!("#define {}_ENABLED\n", symbol.to_uppercase()));
        }
    }
    for (name, value) in user_defines.iter() {
        header.push_str(&format!("#define {name}{}\n", value.header_suffix()));
    }
    for (name, value) in source_defines.iter() {
        if !user_defines.contains(name) {
            header.push_str(&format!("#define {name}{}\n", value.header_suffix()));
        }
    }
    header
}
