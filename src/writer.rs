//! Assembly and persistence of the combined dictionary.

use crate::config::{CombineOptions, RetryPolicy, INDENT_SIZE, MARKUP_COMPATIBILITY_NAMESPACE};
use crate::diagnostics::{Diagnostic, Logger};
use crate::dom::{self, sanitize_comment, Attribute, Element, Node, QName};
use crate::error::{CombineError, Result};
use crate::files;
use crate::models::ResourceElement;
use crate::namespace::NamespaceTable;
use quick_xml::events::{BytesDecl, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Everything needed to render the output, in final order.
#[derive(Debug)]
pub struct MergedDocument {
    pub root_name: QName,
    pub namespaces: NamespaceTable,
    /// `mc:Ignorable` tokens, first-seen order
    pub ignorable: Vec<String>,
    /// Source paths for the header, relative to the target directory
    pub source_files: Vec<String>,
    pub merged_dictionaries: Option<Element>,
    pub theme_dictionaries: Option<Element>,
    pub resources: Vec<ResourceElement>,
}

impl MergedDocument {
    /// Root element: namespace declarations, header comments, merged
    /// dictionaries, theme dictionaries, then resources.
    pub fn to_element(&self, options: &CombineOptions) -> Element {
        let mut root = Element::new(self.root_name.clone());
        root.attributes = self.namespaces.declarations();
        if !self.ignorable.is_empty() {
            if let Some(prefix) = self.namespaces.named_prefix_for(MARKUP_COMPATIBILITY_NAMESPACE) {
                root.attributes.push(Attribute::new(
                    QName::prefixed(prefix, "Ignorable"),
                    self.ignorable.join(" "),
                ));
            }
        }

        if options.write_file_header {
            root.children
                .push(Node::Comment(format!(" {} ", sanitize_comment(&options.file_header))));
            if options.include_source_files_in_file_header && !self.source_files.is_empty() {
                root.children.push(Node::Comment(self.sources_comment()));
            }
        }

        if let Some(merged) = &self.merged_dictionaries {
            root.push_element(merged.clone());
        }
        if let Some(themes) = &self.theme_dictionaries {
            root.push_element(themes.clone());
        }
        for resource in &self.resources {
            root.push_element(resource.element.clone());
        }
        root
    }

    fn sources_comment(&self) -> String {
        let outer = " ".repeat(INDENT_SIZE);
        let inner = " ".repeat(INDENT_SIZE * 2);
        let mut text = format!("\n{}Source files:\n", inner);
        for file in &self.source_files {
            text.push_str(&inner);
            text.push_str(&sanitize_comment(file));
            text.push('\n');
        }
        text.push_str(&outer);
        text
    }

    /// Serialized document: XML declaration, indented tree, trailing newline.
    pub fn render(&self, options: &CombineOptions) -> Result<String> {
        let root = self.to_element(options);
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        dom::line_break(&mut writer, 0)?;
        dom::write_indented(&mut writer, &root, INDENT_SIZE)?;

        let mut text = String::from_utf8(writer.into_inner()).map_err(|e| CombineError::Serialize {
            reason: e.to_string(),
        })?;
        text.push('\n');
        Ok(text)
    }
}

/// What happened to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Created,
    Updated,
    /// Content matched byte for byte; the file was not touched
    Unchanged,
}

impl WriteStatus {
    pub fn written(self) -> bool {
        self != WriteStatus::Unchanged
    }
}

/// Writes `content` to `target` unless it already holds exactly that text.
///
/// Parent directories are created as needed. The new content goes to a
/// sibling temp file first and is renamed over the target, so readers never
/// observe a half-written dictionary.
pub fn write_if_changed(
    target: &Path,
    content: &str,
    retry: RetryPolicy,
    logger: &dyn Logger,
) -> Result<WriteStatus> {
    let status = match files::read_to_string_shared_with_retry(target, retry) {
        Ok(existing) if existing == content => {
            logger.log(&Diagnostic::DocumentUnchanged {
                path: target.to_path_buf(),
            });
            return Ok(WriteStatus::Unchanged);
        }
        Ok(_) => WriteStatus::Updated,
        Err(e) if e.kind() == io::ErrorKind::NotFound => WriteStatus::Created,
        // not text we produced; overwrite it
        Err(e) if e.kind() == io::ErrorKind::InvalidData => WriteStatus::Updated,
        Err(source) => {
            return Err(CombineError::Read {
                path: target.to_path_buf(),
                source,
            })
        }
    };

    let write_error = |source: io::Error| CombineError::Write {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let tmp_path = temp_path(target);
    fs::write(&tmp_path, content).map_err(write_error)?;
    if let Err(source) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_error(source));
    }

    logger.log(&Diagnostic::DocumentSaved {
        path: target.to_path_buf(),
    });
    Ok(status)
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.tmp", name))
}

/// `source` relative to `base`, climbing with `..` where needed, with `/`
/// separators. A source on a different root stays as given.
pub fn display_path(source: &Path, base: &Path) -> String {
    let relative = if source.has_root() == base.has_root() {
        relative_path(source, base)
    } else {
        // one side is relative to the working directory
        match (std::path::absolute(source), std::path::absolute(base)) {
            (Ok(source), Ok(base)) => relative_path(&source, &base),
            _ => None,
        }
    };
    relative
        .unwrap_or_else(|| source.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    let path: Vec<Component<'_>> = path.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = path.iter().zip(&base).take_while(|(a, b)| a == b).count();

    let rooted = path
        .first()
        .is_some_and(|c| matches!(c, Component::Prefix(_) | Component::RootDir));
    if common == 0 && rooted {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in &base[common..] {
        match component {
            Component::CurDir => {}
            Component::Normal(_) => relative.push(".."),
            // cannot climb out of an unknown directory
            _ => return None,
        }
    }
    relative.extend(&path[common..]);
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PRESENTATION_NAMESPACE;
    use crate::diagnostics::RecordingLogger;
    use std::time::Duration;
    use tempfile::TempDir;

    const X: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

    fn color(key: &str, value: &str) -> ResourceElement {
        let mut e = Element::new(QName::local("Color"));
        e.set_attribute(QName::prefixed("x", "Key"), key);
        e.children.push(Node::Text(value.to_string()));
        ResourceElement::new(key.to_string(), e, vec![])
    }

    fn document() -> MergedDocument {
        let mut namespaces = NamespaceTable::new();
        namespaces.insert("", PRESENTATION_NAMESPACE, Path::new("a.xaml"));
        namespaces.insert("x", X, Path::new("a.xaml"));
        MergedDocument {
            root_name: QName::local("ResourceDictionary"),
            namespaces,
            ignorable: vec![],
            source_files: vec!["Colors.xaml".into(), "Controls/Button.xaml".into()],
            merged_dictionaries: None,
            theme_dictionaries: None,
            resources: vec![color("A", "#FF0000"), color("B", "#00FF00")],
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn render_layout() {
        let text = document().render(&CombineOptions::default()).unwrap();
        let expected = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ResourceDictionary xmlns="{p}" xmlns:x="{x}">
    <!-- {h} -->
    <!--
        Source files:
        Colors.xaml
        Controls/Button.xaml
    -->
    <Color x:Key="A">#FF0000</Color>
    <Color x:Key="B">#00FF00</Color>
</ResourceDictionary>
"#,
            p = PRESENTATION_NAMESPACE,
            x = X,
            h = crate::config::DEFAULT_FILE_HEADER
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn header_can_be_disabled() {
        let options = CombineOptions {
            write_file_header: false,
            ..Default::default()
        };
        let text = document().render(&options).unwrap();
        assert!(!text.contains("<!--"));

        let options = CombineOptions {
            include_source_files_in_file_header: false,
            ..Default::default()
        };
        let text = document().render(&options).unwrap();
        assert_eq!(text.matches("<!--").count(), 1);
    }

    #[test]
    fn ignorable_follows_namespace_declarations() {
        let mut doc = document();
        doc.namespaces
            .insert("mc", MARKUP_COMPATIBILITY_NAMESPACE, Path::new("a.xaml"));
        doc.ignorable = vec!["d".into(), "local".into()];
        let root = doc.to_element(&CombineOptions::default());
        let last = root.attributes.last().unwrap();
        assert_eq!(last.name.to_string(), "mc:Ignorable");
        assert_eq!(last.value, "d local");
    }

    #[test]
    fn sections_precede_resources() {
        let mut doc = document();
        doc.merged_dictionaries = Some(Element::new(QName::local("ResourceDictionary.MergedDictionaries")));
        doc.theme_dictionaries = Some(Element::new(QName::local("ResourceDictionary.ThemeDictionaries")));
        let options = CombineOptions {
            write_file_header: false,
            ..Default::default()
        };
        let root = doc.to_element(&options);
        let names: Vec<_> = root.child_elements().map(|e| e.name.local.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ResourceDictionary.MergedDictionaries",
                "ResourceDictionary.ThemeDictionaries",
                "Color",
                "Color"
            ]
        );
    }

    #[test]
    fn write_if_changed_reports_each_outcome() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Themes").join("Generic.xaml");
        let logger = RecordingLogger::new();

        assert_eq!(
            write_if_changed(&target, "<a/>\n", fast_retry(), &logger).unwrap(),
            WriteStatus::Created
        );
        assert_eq!(
            write_if_changed(&target, "<a/>\n", fast_retry(), &logger).unwrap(),
            WriteStatus::Unchanged
        );
        assert_eq!(
            write_if_changed(&target, "<b/>\n", fast_retry(), &logger).unwrap(),
            WriteStatus::Updated
        );
        assert_eq!(fs::read_to_string(&target).unwrap(), "<b/>\n");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn unchanged_target_keeps_its_mtime() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Generic.xaml");
        let logger = RecordingLogger::new();
        write_if_changed(&target, "<a/>\n", fast_retry(), &logger).unwrap();
        let before = fs::metadata(&target).unwrap().modified().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        write_if_changed(&target, "<a/>\n", fast_retry(), &logger).unwrap();
        let after = fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn display_path_is_relative_with_forward_slashes() {
        let base = Path::new("/repo/Themes");
        assert_eq!(display_path(Path::new("/repo/Themes/Controls/Button.xaml"), base), "Controls/Button.xaml");
        assert_eq!(display_path(Path::new("/repo/Themes/Colors.xaml"), base), "Colors.xaml");
    }

    #[test]
    fn display_path_climbs_to_sibling_and_parent_directories() {
        let base = Path::new("/home/alice/repo/src/Themes");
        assert_eq!(
            display_path(Path::new("/home/alice/repo/src/Controls/Button.xaml"), base),
            "../Controls/Button.xaml"
        );
        assert_eq!(display_path(Path::new("/home/alice/repo/Shared.xaml"), base), "../../Shared.xaml");
        assert_eq!(display_path(Path::new("/etc/Colors.xaml"), base), "../../../../../etc/Colors.xaml");
    }

    #[test]
    fn display_path_without_target_directory_keeps_relative_source() {
        assert_eq!(display_path(Path::new("Themes/Colors.xaml"), Path::new("")), "Themes/Colors.xaml");
        assert_eq!(display_path(Path::new("Colors.xaml"), Path::new("Themes")), "../Colors.xaml");
    }
}
