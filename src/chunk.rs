//! Chunk registry and `@import` expansion.
//!
//! A chunk is a named, reusable block of GLSL text. Modules that ship
//! reusable fragments register them once at startup, either one at a time
//! via [`ChunkLibrary::register`] or in bulk from a text blob containing
//! `@export <dotted.name> ... @end` blocks. Shader sources reference chunks
//! with `@import <dotted.name>` directives, which expand recursively.
//!
//! The registry is an explicit, constructor-injected object rather than
//! process-wide state, so independent engine instances can carry independent
//! chunk sets.

use std::collections::HashMap;

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ShaderError;

/// Maximum `@import` nesting depth. Exceeding it means a chunk imports
/// itself directly or indirectly, which is reported as a hard error instead
/// of recursing until resources are exhausted.
pub const MAX_IMPORT_DEPTH: usize = 32;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@import\s+([0-9a-zA-Z_]+(?:\.[0-9a-zA-Z_]+)*)").unwrap()
});

static EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)@export\s+([0-9a-zA-Z_]+(?:\.[0-9a-zA-Z_]+)*)\s*\n(.*?)@end").unwrap()
});

/// Registry mapping dotted hierarchical names to blocks of GLSL text.
///
/// Entries are only ever added or overwritten (last writer wins), never
/// removed; registration is expected to happen during application startup.
#[derive(Debug, Default, Clone)]
pub struct ChunkLibrary {
    chunks: HashMap<String, String>,
}

impl ChunkLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `text` under the dotted path `name`. Re-registering a path
    /// overwrites the previous text.
    pub fn register(&mut self, name: &str, text: &str) {
        self.chunks.insert(name.to_string(), text.to_string());
    }

    /// Scans a text blob for `@export <name> ... @end` blocks and registers
    /// each one. Returns the names registered, in order of appearance.
    pub fn register_exports(&mut self, blob: &str) -> Vec<String> {
        let mut names = Vec::new();
        for caps in EXPORT_RE.captures_iter(blob) {
            let name = caps[1].to_string();
            self.register(&name, &caps[2]);
            names.push(name);
        }
        names
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.chunks.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Replaces every `@import <name>` directive in `source` with the
    /// registered chunk text, recursively, so chunks may import other
    /// chunks. An unresolved name substitutes empty text and logs a warning;
    /// the caller still gets output that will fail at GPU compile time with
    /// a line-numbered message. Text containing no directives is returned
    /// unchanged.
    pub fn expand(&self, source: &str) -> Result<String, ShaderError> {
        self.expand_at_depth(source, 0)
    }

    fn expand_at_depth(&self, source: &str, depth: usize) -> Result<String, ShaderError> {
        if !source.contains("@import") {
            return Ok(source.to_string());
        }
        let mut out = String::with_capacity(source.len());
        let mut tail = 0;
        for caps in IMPORT_RE.captures_iter(source) {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            let name = &caps[1];
            out.push_str(&source[tail..whole.start()]);
            match self.resolve(name) {
                Some(text) => {
                    if depth + 1 >= MAX_IMPORT_DEPTH {
                        return Err(ShaderError::ImportDepthExceeded(name.to_string()));
                    }
                    out.push_str(&self.expand_at_depth(text, depth + 1)?);
                }
                None => {
                    warn!("unresolved @import '{name}', substituting empty text");
                }
            }
            tail = whole.end();
        }
        out.push_str(&source[tail..]);
        Ok(out)
    }
}
