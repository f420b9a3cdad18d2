use crate::diagnostics::{Diagnostic, Logger};
use crate::error::Result;
use crate::models::ResourceElement;
use rustc_hash::FxHashMap;

/// What happened when a resource was offered to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// Same key, structurally identical content; skipped silently
    DuplicateIdentical,
    /// Same key, different content; skipped with a warning
    DuplicateDiffering,
}

/// Keyed resources in discovery order. First-seen wins for every key.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    resources: Vec<ResourceElement>,
    by_key: FxHashMap<String, usize>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: ResourceElement, logger: &dyn Logger) -> Result<Insertion> {
        let Some(&existing) = self.by_key.get(&resource.key) else {
            self.by_key.insert(resource.key.clone(), self.resources.len());
            self.resources.push(resource);
            return Ok(Insertion::Added);
        };

        let first = &self.resources[existing];
        if first.element.same_content(&resource.element)? {
            logger.log(&Diagnostic::DuplicateKeyIdentical {
                key: resource.key.clone(),
                location: resource.describe(),
            });
            Ok(Insertion::DuplicateIdentical)
        } else {
            logger.log(&Diagnostic::DuplicateKeyDiffering {
                key: resource.key.clone(),
                first: first.describe(),
                duplicate: resource.describe(),
            });
            Ok(Insertion::DuplicateDiffering)
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResourceElement> {
        self.by_key.get(key).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn into_resources(self) -> Vec<ResourceElement> {
        self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Level, RecordingLogger};
    use crate::dom::{Element, Node, QName};
    use crate::models::DebugInfo;
    use std::path::PathBuf;

    fn color(key: &str, value: &str, file: &str, line: usize) -> ResourceElement {
        let mut e = Element::new(QName::local("Color"));
        e.set_attribute(QName::prefixed("x", "Key"), key);
        e.children.push(Node::Text(value.to_string()));
        ResourceElement::new(key.to_string(), e, vec![]).with_debug_info(Some(DebugInfo {
            file: PathBuf::from(file),
            line,
            column: 5,
        }))
    }

    #[test]
    fn first_insert_is_added() {
        let logger = RecordingLogger::new();
        let mut index = ResourceIndex::new();
        assert!(index.is_empty());
        assert_eq!(
            index.insert(color("A", "#FF0000", "a.xaml", 3), &logger).unwrap(),
            Insertion::Added
        );
        assert!(index.contains("A"));
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
        assert!(logger.records().is_empty());
    }

    #[test]
    fn identical_duplicate_is_silent() {
        let logger = RecordingLogger::new();
        let mut index = ResourceIndex::new();
        index.insert(color("A", "#FF0000", "a.xaml", 3), &logger).unwrap();
        let outcome = index.insert(color("A", "#FF0000", "b.xaml", 8), &logger).unwrap();
        assert_eq!(outcome, Insertion::DuplicateIdentical);
        assert_eq!(index.len(), 1);
        assert!(logger.warnings().is_empty());
        assert_eq!(logger.at_level(Level::Debug).len(), 1);
    }

    #[test]
    fn differing_duplicate_warns_with_both_locations_and_keeps_first() {
        let logger = RecordingLogger::new();
        let mut index = ResourceIndex::new();
        index.insert(color("A", "#FF0000", "a.xaml", 3), &logger).unwrap();
        let outcome = index.insert(color("A", "#00FF00", "b.xaml", 8), &logger).unwrap();
        assert_eq!(outcome, Insertion::DuplicateDiffering);

        let warnings = logger.warnings();
        assert_eq!(warnings.len(), 1);
        let msg = warnings[0].to_string();
        assert!(msg.contains("a.xaml(3,5)"));
        assert!(msg.contains("b.xaml(8,5)"));

        let kept = index.get("A").unwrap();
        assert_eq!(kept.element.children, vec![Node::Text("#FF0000".to_string())]);
    }

    #[test]
    fn discovery_order_is_preserved() {
        let logger = RecordingLogger::new();
        let mut index = ResourceIndex::new();
        for key in ["C", "A", "B"] {
            index.insert(color(key, "#000000", "a.xaml", 1), &logger).unwrap();
        }
        let keys: Vec<_> = index.into_resources().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["C", "A", "B"]);
    }
}
