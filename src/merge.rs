//! The combine pipeline: load, reconcile, index, order, render, write.

use crate::config::{CombineOptions, MARKUP_COMPATIBILITY_NAMESPACE, PRESENTATION_NAMESPACE};
use crate::diagnostics::{location, Diagnostic, Logger};
use crate::dictionaries::{section_kind, MergedDictionaries, RunPaths, Section, ThemeDictionaries};
use crate::dom::{Element, QName};
use crate::error::{CombineError, Result};
use crate::extract;
use crate::index::{Insertion, ResourceIndex};
use crate::models::{DebugInfo, ResourceElement};
use crate::namespace::{self, NamespaceTable};
use crate::parser::{self, InputDocument};
use crate::sequence;
use crate::stats::CombineStats;
use crate::writer::{self, MergedDocument, WriteStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_ROOT_NAME: &str = "ResourceDictionary";

/// Result of one combine run.
#[derive(Debug, Clone, Serialize)]
pub struct CombineOutcome {
    pub target: PathBuf,
    pub status: WriteStatus,
    pub stats: CombineStats,
}

/// Merges resource dictionaries into one. Holds no state between runs.
pub struct Combiner<'a> {
    options: CombineOptions,
    logger: &'a dyn Logger,
}

impl<'a> Combiner<'a> {
    pub fn new(options: CombineOptions, logger: &'a dyn Logger) -> Self {
        Self { options, logger }
    }

    /// Combines the files listed in `manifest` into `target`.
    pub fn combine_manifest(&self, manifest: &Path, target: &Path) -> Result<CombineOutcome> {
        let sources = parser::read_manifest(manifest)?;
        self.combine(&sources, target)
    }

    /// Combines `sources` into `target`. Every source must exist; the first
    /// missing one fails the run before anything is parsed.
    pub fn combine(&self, sources: &[PathBuf], target: &Path) -> Result<CombineOutcome> {
        let mut sources = sources.to_vec();
        sources.sort();
        sources.dedup();

        if let Some(missing) = sources.iter().find(|p| !p.exists()) {
            return Err(CombineError::SourceNotFound {
                path: missing.clone(),
            });
        }

        let documents = sources
            .iter()
            .map(|path| {
                self.logger.log(&Diagnostic::LoadingFile { path: path.clone() });
                InputDocument::load(path)
            })
            .collect::<Result<Vec<_>>>()?;

        self.combine_documents(documents, target)
    }

    /// Combines already parsed documents and writes the result if it changed.
    pub fn combine_documents(&self, documents: Vec<InputDocument>, target: &Path) -> Result<CombineOutcome> {
        let (document, stats) = self.merge(documents, target)?;
        let content = document.render(&self.options)?;
        let status = writer::write_if_changed(target, &content, self.options.read_retry, self.logger)?;

        info!(
            path = %target.display(),
            files = stats.source_files,
            resources = stats.resources,
            status = ?status,
            "Combine complete"
        );

        Ok(CombineOutcome {
            target: target.to_path_buf(),
            status,
            stats,
        })
    }

    /// Builds the merged document without touching the file system.
    ///
    /// Documents are processed in path order. `target` is only used to
    /// recognize self-references in merged dictionaries and to make header
    /// paths relative.
    pub fn merge(
        &self,
        mut documents: Vec<InputDocument>,
        target: &Path,
    ) -> Result<(MergedDocument, CombineStats)> {
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        documents.dedup_by(|a, b| a.path == b.path);

        let run = RunPaths::new(documents.iter().map(|d| &d.path), target);
        let target_dir = target.parent().unwrap_or_else(|| Path::new(""));

        let mut stats = CombineStats {
            source_files: documents.len() as u64,
            ..Default::default()
        };
        let mut table = NamespaceTable::new();
        let mut index = ResourceIndex::new();
        let mut merged = MergedDictionaries::new();
        let mut themes = ThemeDictionaries::new();
        let mut root_name: Option<QName> = None;
        let mut ignorable: Vec<String> = Vec::new();
        let mut source_files: Vec<String> = Vec::new();

        for document in documents {
            source_files.push(writer::display_path(&document.path, target_dir));

            let reconciled = namespace::reconcile(table, document)?;
            table = reconciled.table;
            let document = reconciled.document;
            for rename in reconciled.renames {
                self.logger.log(&Diagnostic::NamespacePrefixRenamed {
                    file: document.path.clone(),
                    from: rename.from,
                    to: rename.to,
                    uri: rename.uri,
                });
                stats.namespace_renames += 1;
            }

            root_name.get_or_insert_with(|| document.root.name.clone());
            for token in ignorable_tokens(&document.root, &table) {
                if !ignorable.contains(&token) {
                    ignorable.push(token);
                }
            }

            let mut merged_ignored = false;
            for child in document.root.child_elements() {
                match section_kind(child) {
                    Some(Section::MergedDictionaries) if self.options.import_merged_dictionaries => {
                        merged.absorb(child, &document.path, &run, self.logger);
                    }
                    Some(Section::MergedDictionaries) => {
                        if !merged_ignored {
                            self.logger.log(&Diagnostic::MergedDictionariesIgnored {
                                file: document.path.clone(),
                            });
                            merged_ignored = true;
                        }
                    }
                    Some(Section::ThemeDictionaries) => {
                        let dropped = themes.absorb(child, &document.path, &table, self.logger)?;
                        stats.unkeyed_dropped += dropped as u64;
                    }
                    None => self.add_resource(child, &document.path, &table, &mut index, &mut stats)?,
                }
            }
        }

        let root_name = root_name.unwrap_or_else(|| QName::local(DEFAULT_ROOT_NAME));
        if root_name.prefix().is_none() && table.uri_for(None).is_none() {
            table.insert("", PRESENTATION_NAMESPACE, target);
        }

        let sequenced = sequence::sequence(index.into_resources(), self.options.cycle_policy, self.logger)?;
        stats.resources = sequenced.resources.len() as u64;
        stats.cycles_broken = sequenced.broken_cycles.len() as u64;
        stats.merged_dictionary_references = merged.reference_count() as u64;
        stats.theme_dictionaries = themes.len() as u64;

        source_files.sort();

        let document = MergedDocument {
            root_name,
            namespaces: table,
            ignorable,
            source_files,
            merged_dictionaries: merged.into_element(),
            theme_dictionaries: themes.into_element(),
            resources: sequenced.resources,
        };
        Ok((document, stats))
    }

    fn add_resource(
        &self,
        element: &Element,
        file: &Path,
        table: &NamespaceTable,
        index: &mut ResourceIndex,
        stats: &mut CombineStats,
    ) -> Result<()> {
        let debug_info = DebugInfo::of(file, element);

        let Some(key) = extract::resource_key(element, table) else {
            self.logger.log(&Diagnostic::UnkeyedElementDropped {
                element: element.name.to_string(),
                location: location(debug_info.as_ref(), || file.display().to_string()),
            });
            stats.unkeyed_dropped += 1;
            return Ok(());
        };

        let resource = ResourceElement::new(key, element.clone(), extract::used_keys(element))
            .with_debug_info(debug_info);
        match index.insert(resource, self.logger)? {
            Insertion::Added => {}
            Insertion::DuplicateIdentical => stats.duplicates_identical += 1,
            Insertion::DuplicateDiffering => stats.duplicates_differing += 1,
        }
        Ok(())
    }
}

/// Tokens of the root's `mc:Ignorable`, whatever prefix the markup
/// compatibility namespace goes by.
fn ignorable_tokens(root: &Element, table: &NamespaceTable) -> Vec<String> {
    root.attributes
        .iter()
        .filter(|a| a.name.local == "Ignorable")
        .filter(|a| {
            let Some(prefix) = a.name.prefix() else {
                return false;
            };
            let uri = root
                .namespace_declarations()
                .find(|(p, _)| *p == prefix)
                .map(|(_, uri)| uri)
                .or_else(|| table.uri_for(Some(prefix)));
            uri == Some(MARKUP_COMPATIBILITY_NAMESPACE)
        })
        .flat_map(|a| a.value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CyclePolicy;
    use crate::diagnostics::RecordingLogger;

    const HEAD: &str = r#"<ResourceDictionary xmlns="http://schemas.microsoft.com/winfx/2006/xaml/presentation" xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml""#;

    fn doc(path: &str, attrs: &str, body: &str) -> InputDocument {
        InputDocument::parse(path, &format!("{} {}>{}</ResourceDictionary>", HEAD, attrs, body)).unwrap()
    }

    fn keys(document: &MergedDocument) -> Vec<&str> {
        document.resources.iter().map(|r| r.key.as_str()).collect()
    }

    #[test]
    fn resources_are_ordered_across_files() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let docs = vec![
            doc("b.xaml", "", r#"<SolidColorBrush x:Key="Brush" Color="{StaticResource Accent}"/>"#),
            doc("a.xaml", "", r#"<Style x:Key="Style"><Setter Property="Background" Value="{StaticResource Brush}"/></Style>"#),
            doc("c.xaml", "", r#"<Color x:Key="Accent">#FF0000</Color>"#),
        ];
        let (merged, stats) = combiner.merge(docs, Path::new("out/Generic.xaml")).unwrap();
        assert_eq!(keys(&merged), vec!["Accent", "Brush", "Style"]);
        assert_eq!(stats.source_files, 3);
        assert_eq!(stats.resources, 3);
        assert_eq!(merged.source_files, vec!["../a.xaml", "../b.xaml", "../c.xaml"]);
    }

    #[test]
    fn source_list_is_relative_to_the_target_directory() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let docs = vec![
            doc("/home/alice/repo/src/Controls/Button.xaml", "", ""),
            doc("/home/alice/repo/src/Themes/Colors.xaml", "", ""),
        ];
        let (merged, _) = combiner
            .merge(docs, Path::new("/home/alice/repo/src/Themes/Generic.xaml"))
            .unwrap();
        assert_eq!(merged.source_files, vec!["../Controls/Button.xaml", "Colors.xaml"]);
    }

    #[test]
    fn unkeyed_elements_are_dropped_with_location() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let docs = vec![doc("a.xaml", "", r#"<Border Background="Red"/><Color x:Key="A">Red</Color>"#)];
        let (merged, stats) = combiner.merge(docs, Path::new("Generic.xaml")).unwrap();
        assert_eq!(keys(&merged), vec!["A"]);
        assert_eq!(stats.unkeyed_dropped, 1);
        let warnings = logger.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("a.xaml(1,"));
    }

    #[test]
    fn duplicates_are_counted_by_kind() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let docs = vec![
            doc("a.xaml", "", r#"<Color x:Key="A">Red</Color><Color x:Key="B">Red</Color>"#),
            doc("b.xaml", "", r#"<Color x:Key="A">Red</Color><Color x:Key="B">Blue</Color>"#),
        ];
        let (merged, stats) = combiner.merge(docs, Path::new("Generic.xaml")).unwrap();
        assert_eq!(keys(&merged), vec!["A", "B"]);
        assert_eq!(stats.duplicates_identical, 1);
        assert_eq!(stats.duplicates_differing, 1);
        assert_eq!(logger.warnings().len(), 1);
    }

    #[test]
    fn renamed_prefix_is_applied_to_resources() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let docs = vec![
            doc("a.xaml", r#"xmlns:local="using:App.Controls""#, r#"<local:Widget x:Key="W1"/>"#),
            doc(
                "b.xaml",
                r#"xmlns:controls="using:App.Controls""#,
                r#"<Style x:Key="S" TargetType="controls:Widget"/>"#,
            ),
        ];
        let (merged, stats) = combiner.merge(docs, Path::new("Generic.xaml")).unwrap();
        assert_eq!(stats.namespace_renames, 1);
        let style = &merged.resources[1].element;
        assert_eq!(style.attribute("TargetType"), Some("local:Widget"));
        assert!(merged.namespaces.binding("controls").is_none());
    }

    #[test]
    fn ignorable_tokens_are_unioned() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let mc = r#"xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" xmlns:d="urn:d""#;
        let docs = vec![
            doc("a.xaml", &format!(r#"{} mc:Ignorable="d""#, mc), ""),
            doc(
                "b.xaml",
                &format!(r#"{} xmlns:e="urn:e" mc:Ignorable="d e""#, mc),
                "",
            ),
        ];
        let (merged, _) = combiner.merge(docs, Path::new("Generic.xaml")).unwrap();
        assert_eq!(merged.ignorable, vec!["d", "e"]);
    }

    #[test]
    fn merged_dictionaries_follow_the_option() {
        let body = r#"<ResourceDictionary.MergedDictionaries>
            <ResourceDictionary Source="ms-appx:///Shared/Colors.xaml"/>
        </ResourceDictionary.MergedDictionaries>"#;

        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let (merged, _) = combiner
            .merge(vec![doc("a.xaml", "", body)], Path::new("Generic.xaml"))
            .unwrap();
        assert!(merged.merged_dictionaries.is_none());

        let options = CombineOptions {
            import_merged_dictionaries: true,
            ..Default::default()
        };
        let combiner = Combiner::new(options, &logger);
        let (merged, stats) = combiner
            .merge(vec![doc("a.xaml", "", body)], Path::new("Generic.xaml"))
            .unwrap();
        assert!(merged.merged_dictionaries.is_some());
        assert_eq!(stats.merged_dictionary_references, 1);
    }

    #[test]
    fn strict_cycle_policy_fails_the_merge() {
        let logger = RecordingLogger::new();
        let options = CombineOptions {
            cycle_policy: CyclePolicy::Strict,
            ..Default::default()
        };
        let combiner = Combiner::new(options, &logger);
        let docs = vec![doc(
            "a.xaml",
            "",
            r#"<Style x:Key="A" BasedOn="{StaticResource B}"/><Style x:Key="B" BasedOn="{StaticResource A}"/>"#,
        )];
        let err = combiner.merge(docs, Path::new("Generic.xaml")).unwrap_err();
        assert!(matches!(err, CombineError::ReferenceCycle { .. }));
    }

    #[test]
    fn no_documents_yield_an_empty_dictionary() {
        let logger = RecordingLogger::new();
        let combiner = Combiner::new(CombineOptions::default(), &logger);
        let (merged, stats) = combiner.merge(Vec::new(), Path::new("Generic.xaml")).unwrap();
        assert_eq!(merged.root_name, QName::local("ResourceDictionary"));
        assert_eq!(merged.namespaces.uri_for(None), Some(PRESENTATION_NAMESPACE));
        assert!(merged.resources.is_empty());
        assert_eq!(stats, CombineStats::default());
    }
}
