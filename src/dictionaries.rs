//! `MergedDictionaries` and `ThemeDictionaries` sections of the inputs.
//!
//! Both are property elements of the root (`ResourceDictionary.MergedDictionaries`)
//! and never become keyed resources. Merged dictionary references are
//! aggregated into a single section; theme dictionaries are merged per theme
//! key.

use crate::diagnostics::{location, Diagnostic, Logger};
use crate::dom::{Element, Node, QName};
use crate::error::Result;
use crate::extract;
use crate::index::{Insertion, ResourceIndex};
use crate::models::{DebugInfo, ResourceElement};
use crate::namespace::NamespaceTable;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

pub const MERGED_DICTIONARIES_SUFFIX: &str = ".MergedDictionaries";
pub const THEME_DICTIONARIES_SUFFIX: &str = ".ThemeDictionaries";

/// Prefixes that make a `Source` value resolvable against the files of a run.
const APPLICATION_URI_PREFIXES: &[&str] = &["ms-appx:///", "pack://application:,,,/"];
const COMPONENT_MARKER: &str = ";component/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    MergedDictionaries,
    ThemeDictionaries,
}

/// Classifies a top-level child of an input root.
pub fn section_kind(element: &Element) -> Option<Section> {
    let local = element.name.local.as_str();
    if local.ends_with(MERGED_DICTIONARIES_SUFFIX) {
        Some(Section::MergedDictionaries)
    } else if local.ends_with(THEME_DICTIONARIES_SUFFIX) {
        Some(Section::ThemeDictionaries)
    } else {
        None
    }
}

/// The path part of a dictionary `Source`, relative to the project root.
///
/// ```text
/// /Assembly;component/Themes/Colors.xaml  -> Themes/Colors.xaml
/// ms-appx:///Themes/Colors.xaml           -> Themes/Colors.xaml
/// pack://application:,,,/Themes/Colors.xaml -> Themes/Colors.xaml
/// /Themes/Colors.xaml                     -> Themes/Colors.xaml
/// ```
///
/// Anything else (relative paths, foreign schemes) is not recognized.
pub fn relative_source(source: &str) -> Option<&str> {
    let source = source.trim();
    let relative = if let Some((_, rest)) = source.split_once(COMPONENT_MARKER) {
        rest
    } else if let Some(rest) = APPLICATION_URI_PREFIXES
        .iter()
        .find_map(|prefix| source.strip_prefix(prefix))
    {
        rest
    } else {
        source.strip_prefix('/')?
    };
    let relative = relative.trim_start_matches('/');
    (!relative.is_empty()).then_some(relative)
}

/// Files taking part in a combine run: every input plus the target.
#[derive(Debug, Clone, Default)]
pub struct RunPaths {
    normalized: Vec<String>,
}

impl RunPaths {
    pub fn new<'a>(sources: impl IntoIterator<Item = &'a PathBuf>, target: &Path) -> Self {
        let normalized = sources
            .into_iter()
            .map(|p| normalize(&p.to_string_lossy()))
            .chain(std::iter::once(normalize(&target.to_string_lossy())))
            .collect();
        Self { normalized }
    }

    /// True when some run path ends with `relative` on a path-segment boundary.
    pub fn contains_relative(&self, relative: &str) -> bool {
        let wanted = normalize(relative);
        let wanted = wanted.trim_start_matches("./");
        let suffix = format!("/{}", wanted);
        self.normalized
            .iter()
            .any(|path| path == wanted || path.ends_with(&suffix))
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Aggregated `MergedDictionaries` section of the output.
#[derive(Debug, Default)]
pub struct MergedDictionaries {
    name: Option<QName>,
    children: Vec<Element>,
    sources: FxHashSet<String>,
}

impl MergedDictionaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the children of one input's `MergedDictionaries` section.
    ///
    /// Plain references (`<ResourceDictionary Source="..."/>`) are kept once per
    /// `Source`, unless they point at a file of this run. Inline dictionaries
    /// and anything else are carried over as they are.
    pub fn absorb(&mut self, section: &Element, file: &Path, run: &RunPaths, logger: &dyn Logger) {
        self.name.get_or_insert_with(|| section.name.clone());

        for child in section.child_elements() {
            let Some(source) = plain_reference(child) else {
                self.children.push(child.clone());
                continue;
            };

            match relative_source(source) {
                None => logger.log(&Diagnostic::MergedDictionaryUnresolved {
                    source: source.to_string(),
                    file: file.to_path_buf(),
                }),
                Some(relative) if run.contains_relative(relative) => {
                    logger.log(&Diagnostic::MergedDictionaryRedundant {
                        source: source.to_string(),
                        file: file.to_path_buf(),
                    })
                }
                Some(_) => {
                    if self.sources.insert(source.to_string()) {
                        self.children.push(child.clone());
                    }
                }
            }
        }
    }

    /// Number of distinct external references kept.
    pub fn reference_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn into_element(self) -> Option<Element> {
        if self.is_empty() {
            return None;
        }
        let name = self.name?;
        let mut section = Element::new(name);
        for child in self.children {
            section.push_element(child);
        }
        Some(section)
    }
}

/// `Source` of a dictionary that is only a reference, with no inline content.
fn plain_reference(element: &Element) -> Option<&str> {
    if element.name.local != "ResourceDictionary" || element.has_element_children() {
        return None;
    }
    element.attribute("Source").filter(|s| !s.trim().is_empty())
}

enum ThemeChild {
    Keyed(String),
    Other(Node),
}

struct Theme {
    container: Element,
    index: ResourceIndex,
    children: Vec<ThemeChild>,
}

/// Theme dictionaries merged per theme key (`Default`, `Light`, `HighContrast`...).
#[derive(Default)]
pub struct ThemeDictionaries {
    name: Option<QName>,
    themes: Vec<Theme>,
    by_key: FxHashMap<String, usize>,
}

impl ThemeDictionaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one input's `ThemeDictionaries` section in.
    ///
    /// The first dictionary seen for a theme key provides the container
    /// element. Keyed children then follow the same first-seen-wins rule as
    /// top-level resources, scoped to their theme. Returns the number of theme
    /// dictionaries dropped for lack of a key.
    pub fn absorb(
        &mut self,
        section: &Element,
        file: &Path,
        namespaces: &NamespaceTable,
        logger: &dyn Logger,
    ) -> Result<usize> {
        self.name.get_or_insert_with(|| section.name.clone());
        let mut dropped = 0;

        for dictionary in section.child_elements() {
            let Some(theme_key) = extract::resource_key(dictionary, namespaces) else {
                logger.log(&Diagnostic::UnkeyedElementDropped {
                    element: dictionary.name.to_string(),
                    location: describe(file, dictionary),
                });
                dropped += 1;
                continue;
            };

            let slot = match self.by_key.get(&theme_key) {
                Some(&slot) => slot,
                None => {
                    let mut container = Element::new(dictionary.name.clone());
                    container.attributes = dictionary.attributes.clone();
                    container.position = dictionary.position;
                    self.themes.push(Theme {
                        container,
                        index: ResourceIndex::new(),
                        children: Vec::new(),
                    });
                    self.by_key.insert(theme_key, self.themes.len() - 1);
                    self.themes.len() - 1
                }
            };
            let theme = &mut self.themes[slot];

            for node in &dictionary.children {
                let Node::Element(child) = node else {
                    theme.children.push(ThemeChild::Other(node.clone()));
                    continue;
                };
                let Some(key) = extract::resource_key(child, namespaces) else {
                    theme.children.push(ThemeChild::Other(node.clone()));
                    continue;
                };
                let resource = ResourceElement::new(key.clone(), child.clone(), Vec::new())
                    .with_debug_info(DebugInfo::of(file, child));
                if theme.index.insert(resource, logger)? == Insertion::Added {
                    theme.children.push(ThemeChild::Keyed(key));
                }
            }
        }

        Ok(dropped)
    }

    /// Number of distinct theme keys.
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn into_element(self) -> Option<Element> {
        if self.is_empty() {
            return None;
        }
        let mut section = Element::new(self.name?);
        for theme in self.themes {
            let Theme {
                mut container,
                index,
                children,
            } = theme;
            for child in children {
                match child {
                    ThemeChild::Keyed(key) => {
                        if let Some(resource) = index.get(&key) {
                            container.push_element(resource.element.clone());
                        }
                    }
                    ThemeChild::Other(node) => container.children.push(node),
                }
            }
            section.push_element(container);
        }
        Some(section)
    }
}

fn describe(file: &Path, element: &Element) -> String {
    location(DebugInfo::of(file, element).as_ref(), || file.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingLogger;
    use crate::parser::InputDocument;

    const ROOT: &str = r#"xmlns="http://schemas.microsoft.com/winfx/2006/xaml/presentation" xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml""#;

    fn doc(path: &str, body: &str) -> InputDocument {
        InputDocument::parse(path, &format!("<ResourceDictionary {}>{}</ResourceDictionary>", ROOT, body))
            .unwrap()
    }

    fn table() -> NamespaceTable {
        let mut t = NamespaceTable::new();
        t.insert("", "http://schemas.microsoft.com/winfx/2006/xaml/presentation", Path::new("a.xaml"));
        t.insert("x", "http://schemas.microsoft.com/winfx/2006/xaml", Path::new("a.xaml"));
        t
    }

    fn first_section(doc: &InputDocument) -> &Element {
        doc.root.child_elements().next().unwrap()
    }

    #[test]
    fn section_kind_by_suffix() {
        let d = doc(
            "a.xaml",
            "<ResourceDictionary.MergedDictionaries/><ResourceDictionary.ThemeDictionaries/><Color x:Key=\"A\"/>",
        );
        let kinds: Vec<_> = d.root.child_elements().map(section_kind).collect();
        assert_eq!(
            kinds,
            vec![Some(Section::MergedDictionaries), Some(Section::ThemeDictionaries), None]
        );
    }

    #[test]
    fn relative_source_shapes() {
        assert_eq!(relative_source("/MyLib;component/Themes/Colors.xaml"), Some("Themes/Colors.xaml"));
        assert_eq!(relative_source("ms-appx:///Themes/Colors.xaml"), Some("Themes/Colors.xaml"));
        assert_eq!(
            relative_source("pack://application:,,,/Themes/Colors.xaml"),
            Some("Themes/Colors.xaml")
        );
        assert_eq!(relative_source("/Themes/Colors.xaml"), Some("Themes/Colors.xaml"));
        assert_eq!(relative_source("Colors.xaml"), None);
        assert_eq!(relative_source("https://example.com/a.xaml"), None);
    }

    #[test]
    fn run_paths_match_on_segment_boundary_ignoring_case() {
        let sources = vec![PathBuf::from("/repo/src/Themes/Colors.xaml")];
        let run = RunPaths::new(&sources, Path::new("/repo/src/Themes/Generic.xaml"));
        assert!(run.contains_relative("themes/colors.xaml"));
        assert!(run.contains_relative("Themes\\Generic.xaml"));
        assert!(!run.contains_relative("emes/Colors.xaml"));
        assert!(!run.contains_relative("Themes/Other.xaml"));
    }

    #[test]
    fn merged_references_are_deduplicated_and_filtered() {
        let logger = RecordingLogger::new();
        let sources = vec![PathBuf::from("/repo/Themes/Button.xaml")];
        let run = RunPaths::new(&sources, Path::new("/repo/Themes/Generic.xaml"));
        let mut merged = MergedDictionaries::new();

        let a = doc(
            "/repo/Themes/Button.xaml",
            r#"<ResourceDictionary.MergedDictionaries>
                <ResourceDictionary Source="ms-appx:///Shared/Colors.xaml"/>
                <ResourceDictionary Source="ms-appx:///Themes/Generic.xaml"/>
                <ResourceDictionary Source="Local.xaml"/>
            </ResourceDictionary.MergedDictionaries>"#,
        );
        let b = doc(
            "/repo/Themes/Button.xaml",
            r#"<ResourceDictionary.MergedDictionaries>
                <ResourceDictionary Source="ms-appx:///Shared/Colors.xaml"/>
                <ResourceDictionary><Color x:Key="Inline">Red</Color></ResourceDictionary>
            </ResourceDictionary.MergedDictionaries>"#,
        );
        merged.absorb(first_section(&a), &a.path, &run, &logger);
        merged.absorb(first_section(&b), &b.path, &run, &logger);

        assert_eq!(merged.reference_count(), 1);
        let section = merged.into_element().unwrap();
        assert_eq!(section.name.local, "ResourceDictionary.MergedDictionaries");
        let children: Vec<_> = section.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attribute("Source"), Some("ms-appx:///Shared/Colors.xaml"));
        assert!(children[1].has_element_children());

        // Local.xaml is unrecognized
        assert_eq!(logger.warnings().len(), 1);
    }

    #[test]
    fn empty_merged_section_is_not_emitted() {
        let merged = MergedDictionaries::new();
        assert!(merged.is_empty());
        assert!(merged.into_element().is_none());
    }

    #[test]
    fn theme_dictionaries_merge_per_key() {
        let logger = RecordingLogger::new();
        let mut themes = ThemeDictionaries::new();
        let a = doc(
            "a.xaml",
            r#"<ResourceDictionary.ThemeDictionaries>
                <ResourceDictionary x:Key="Light"><Color x:Key="Fg">Black</Color></ResourceDictionary>
                <ResourceDictionary x:Key="Dark"><Color x:Key="Fg">White</Color></ResourceDictionary>
            </ResourceDictionary.ThemeDictionaries>"#,
        );
        let b = doc(
            "b.xaml",
            r#"<ResourceDictionary.ThemeDictionaries>
                <ResourceDictionary x:Key="Light">
                    <Color x:Key="Fg">Gray</Color>
                    <Color x:Key="Bg">White</Color>
                </ResourceDictionary>
            </ResourceDictionary.ThemeDictionaries>"#,
        );
        let dropped = themes.absorb(first_section(&a), &a.path, &table(), &logger).unwrap();
        assert_eq!(dropped, 0);
        themes.absorb(first_section(&b), &b.path, &table(), &logger).unwrap();
        assert_eq!(themes.len(), 2);
        assert!(!themes.is_empty());

        let section = themes.into_element().unwrap();
        let dictionaries: Vec<_> = section.child_elements().collect();
        assert_eq!(dictionaries[0].attribute("x:Key"), Some("Light"));
        let light: Vec<_> = dictionaries[0]
            .child_elements()
            .map(|c| (c.attribute("x:Key").unwrap(), c.children.clone()))
            .collect();
        assert_eq!(
            light,
            vec![
                ("Fg", vec![Node::Text("Black".into())]),
                ("Bg", vec![Node::Text("White".into())]),
            ]
        );
        assert_eq!(dictionaries[1].attribute("x:Key"), Some("Dark"));

        // Fg differs between a.xaml and b.xaml within the Light theme
        assert_eq!(logger.warnings().len(), 1);
    }

    #[test]
    fn unkeyed_theme_dictionary_is_dropped() {
        let logger = RecordingLogger::new();
        let mut themes = ThemeDictionaries::new();
        let a = doc(
            "a.xaml",
            r#"<ResourceDictionary.ThemeDictionaries><ResourceDictionary/></ResourceDictionary.ThemeDictionaries>"#,
        );
        let dropped = themes.absorb(first_section(&a), &a.path, &table(), &logger).unwrap();
        assert_eq!(dropped, 1);
        assert!(themes.is_empty());
        assert!(themes.into_element().is_none());
        assert_eq!(logger.warnings().len(), 1);
    }
}
