use crate::dom::Element;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a resource came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl DebugInfo {
    /// Location of `element` in `file`, if the parser recorded one.
    pub fn of(file: &Path, element: &Element) -> Option<Self> {
        element.position.map(|pos| Self {
            file: file.to_path_buf(),
            line: pos.line,
            column: pos.column,
        })
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.file.display(), self.line, self.column)
    }
}

/// One keyed top-level resource, already rewritten into the merged namespace table.
#[derive(Debug, Clone)]
pub struct ResourceElement {
    pub key: String,
    pub element: Element,
    /// Keys referenced from anywhere in the subtree, deduplicated, first-seen order
    pub used_keys: Vec<String>,
    pub debug_info: Option<DebugInfo>,
}

impl ResourceElement {
    pub fn new(key: String, element: Element, used_keys: Vec<String>) -> Self {
        Self {
            key,
            element,
            used_keys,
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, debug_info: Option<DebugInfo>) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Source location if known, otherwise the element's own markup.
    pub fn describe(&self) -> String {
        match &self.debug_info {
            Some(info) => info.to_string(),
            None => self
                .element
                .to_compact_string()
                .unwrap_or_else(|_| format!("<{}>", self.element.name)),
        }
    }
}
