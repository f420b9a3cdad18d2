//! Namespace reconciliation across independently authored inputs.
//!
//! The merged root accumulates prefix bindings in a [`NamespaceTable`] that is
//! passed into [`reconcile`] and handed back with the rewritten document. A
//! prefix bound to a different URI than the one already in the table is a hard
//! conflict; a URI already known under another prefix is adopted by renaming
//! the new document's prefix throughout its subtree with [`rename_prefixes`].

use crate::config::MARKUP_COMPATIBILITY_NAMESPACE;
use crate::dom::{Attribute, Element, Node, QName};
use crate::error::{CombineError, Result};
use crate::parser::InputDocument;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Attributes whose plain (non markup-extension) values hold `prefix:Type` references.
const TYPE_REFERENCE_ATTRIBUTES: &[&str] = &[
    "Property",
    "TargetType",
    "DataType",
    "TargetProperty",
    "Storyboard.TargetProperty",
];

/// `prefix:` at the start of the value or after a separator.
static PREFIX_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s{(,=])([A-Za-z_][A-Za-z0-9_.\-]*):").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    /// Empty for the default namespace
    pub prefix: String,
    pub uri: String,
    /// File that introduced the binding
    pub origin: PathBuf,
}

/// Ordered prefix bindings of the merged root. Insertion order is the order in
/// which bindings were first seen.
#[derive(Debug, Clone, Default)]
pub struct NamespaceTable {
    bindings: Vec<NamespaceBinding>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &[NamespaceBinding] {
        &self.bindings
    }

    pub fn binding(&self, prefix: &str) -> Option<&NamespaceBinding> {
        self.bindings.iter().find(|b| b.prefix == prefix)
    }

    /// Resolves a prefix (`None` = default namespace) to its URI.
    pub fn uri_for(&self, prefix: Option<&str>) -> Option<&str> {
        self.binding(prefix.unwrap_or("")).map(|b| b.uri.as_str())
    }

    /// First named (non-default) prefix bound to `uri`.
    pub fn named_prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| !b.prefix.is_empty() && b.uri == uri)
            .map(|b| b.prefix.as_str())
    }

    pub fn insert(&mut self, prefix: &str, uri: &str, origin: &Path) {
        self.bindings.push(NamespaceBinding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            origin: origin.to_path_buf(),
        });
    }

    /// Root attributes declaring every binding, default namespace first.
    pub fn declarations(&self) -> Vec<Attribute> {
        let default = self.bindings.iter().filter(|b| b.prefix.is_empty());
        let named = self.bindings.iter().filter(|b| !b.prefix.is_empty());
        default
            .chain(named)
            .map(|b| {
                let name = if b.prefix.is_empty() {
                    QName::local("xmlns")
                } else {
                    QName::prefixed("xmlns", &b.prefix)
                };
                Attribute::new(name, b.uri.clone())
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRename {
    pub from: String,
    pub to: String,
    pub uri: String,
}

/// Result of folding one document into the table.
#[derive(Debug)]
pub struct Reconciliation {
    pub table: NamespaceTable,
    pub document: InputDocument,
    pub renames: Vec<PrefixRename>,
}

/// Folds the root namespace declarations of `document` into `table`.
pub fn reconcile(mut table: NamespaceTable, document: InputDocument) -> Result<Reconciliation> {
    let mut renames = Vec::new();

    for (prefix, uri) in document.root.namespace_declarations() {
        if let Some(existing) = table.binding(prefix) {
            if existing.uri == uri {
                continue;
            }
            return Err(CombineError::NamespaceConflict {
                prefix: prefix.to_string(),
                first_file: existing.origin.clone(),
                first_uri: existing.uri.clone(),
                second_file: document.path.clone(),
                second_uri: uri.to_string(),
            });
        }

        if !prefix.is_empty() {
            if let Some(target) = table.named_prefix_for(uri) {
                renames.push(PrefixRename {
                    from: prefix.to_string(),
                    to: target.to_string(),
                    uri: uri.to_string(),
                });
                continue;
            }
        }

        table.insert(prefix, uri, &document.path);
    }

    let document = if renames.is_empty() {
        document
    } else {
        let map: FxHashMap<String, String> = renames
            .iter()
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect();
        let mut root = rename_prefixes(&document.root, &map);
        root.attributes.retain(|a| match a.namespace_declaration() {
            Some((prefix, _)) => !map.contains_key(prefix),
            None => true,
        });
        InputDocument {
            path: document.path,
            root,
        }
    };

    Ok(Reconciliation {
        table,
        document,
        renames,
    })
}

/// Returns a copy of `element` with every prefix in `renames` replaced.
///
/// Covers element and attribute names, `prefix:` tokens inside markup
/// extensions and type-reference attributes, and `mc:Ignorable` lists. The
/// declarations on `element` itself are the ones being renamed; a descendant
/// that redeclares a prefix keeps its own meaning for that subtree.
pub fn rename_prefixes(element: &Element, renames: &FxHashMap<String, String>) -> Element {
    if renames.is_empty() {
        return element.clone();
    }
    let outer = Scope::default();
    let scope = enter(&outer, element);
    rename_in_scope(element, renames, &scope)
}

/// Prefix to URI bindings visible at an element, as written in the source.
type Scope<'a> = FxHashMap<&'a str, &'a str>;

fn enter<'s, 'a>(parent: &'s Scope<'a>, element: &'a Element) -> Cow<'s, Scope<'a>> {
    if element.namespace_declarations().next().is_none() {
        return Cow::Borrowed(parent);
    }
    let mut scope = parent.clone();
    scope.extend(element.namespace_declarations());
    Cow::Owned(scope)
}

fn rename_descendant(element: &Element, renames: &FxHashMap<String, String>, parent: &Scope<'_>) -> Element {
    let scope = enter(parent, element);
    let shadowed: Vec<&str> = element
        .namespace_declarations()
        .map(|(prefix, _)| prefix)
        .filter(|prefix| renames.contains_key(*prefix))
        .collect();
    if shadowed.is_empty() {
        return rename_in_scope(element, renames, &scope);
    }
    let mut narrowed = renames.clone();
    for prefix in shadowed {
        narrowed.remove(prefix);
    }
    if narrowed.is_empty() {
        return element.clone();
    }
    rename_in_scope(element, &narrowed, &scope)
}

fn rename_in_scope(element: &Element, active: &FxHashMap<String, String>, scope: &Scope<'_>) -> Element {
    let attributes = element
        .attributes
        .iter()
        .map(|attr| {
            if attr.is_namespace_declaration() {
                return attr.clone();
            }
            let name = rename_qname(&attr.name, active);
            let value = if is_ignorable_list(attr, scope) {
                rename_ignorable(&attr.value, active)
            } else if attr.value.trim_start().starts_with('{')
                || TYPE_REFERENCE_ATTRIBUTES.contains(&attr.name.local.as_str())
            {
                rewrite_prefix_tokens(&attr.value, active).into_owned()
            } else {
                attr.value.clone()
            };
            Attribute::new(name, value)
        })
        .collect();

    let children = element
        .children
        .iter()
        .map(|child| match child {
            Node::Element(e) => Node::Element(rename_descendant(e, active, scope)),
            other => other.clone(),
        })
        .collect();

    Element {
        name: rename_qname(&element.name, active),
        attributes,
        children,
        position: element.position,
    }
}

fn rename_qname(name: &QName, renames: &FxHashMap<String, String>) -> QName {
    match name.prefix().and_then(|p| renames.get(p)) {
        Some(to) => QName::prefixed(to, &name.local),
        None => name.clone(),
    }
}

/// Replaces `old:` tokens with `new:` in an attribute value.
pub fn rewrite_prefix_tokens<'a>(value: &'a str, renames: &FxHashMap<String, String>) -> Cow<'a, str> {
    PREFIX_TOKEN_REGEX.replace_all(value, |caps: &Captures<'_>| {
        let prefix = &caps[2];
        let replacement = renames.get(prefix).map_or(prefix, String::as_str);
        format!("{}{}:", &caps[1], replacement)
    })
}

/// `Ignorable` in the markup compatibility namespace, whatever its prefix.
fn is_ignorable_list(attr: &Attribute, scope: &Scope<'_>) -> bool {
    attr.name.local == "Ignorable"
        && attr
            .name
            .prefix()
            .and_then(|prefix| scope.get(prefix))
            .is_some_and(|uri| *uri == MARKUP_COMPATIBILITY_NAMESPACE)
}

fn rename_ignorable(value: &str, renames: &FxHashMap<String, String>) -> String {
    value
        .split_whitespace()
        .map(|token| renames.get(token).map_or(token, String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
