//! Non-fatal reporting.
//!
//! The merge engine never prints. Everything it wants to say is a
//! [`Diagnostic`] handed to a [`Logger`]; the CLI plugs in [`TracingLogger`],
//! tests and the JSON report use [`RecordingLogger`].

use crate::models::DebugInfo;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    Debug,
    Info,
    InfoImportant,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    LoadingFile {
        path: PathBuf,
    },
    /// A prefix was rewritten to the one already bound to the same namespace.
    NamespacePrefixRenamed {
        file: PathBuf,
        from: String,
        to: String,
        uri: String,
    },
    /// Same key, same content: the later copy is skipped silently.
    DuplicateKeyIdentical {
        key: String,
        location: String,
    },
    /// Same key, different content: first-seen wins.
    DuplicateKeyDiffering {
        key: String,
        first: String,
        duplicate: String,
    },
    UnkeyedElementDropped {
        element: String,
        location: String,
    },
    MergedDictionariesIgnored {
        file: PathBuf,
    },
    /// The referenced dictionary is one of the files being combined (or the target).
    MergedDictionaryRedundant {
        source: String,
        file: PathBuf,
    },
    MergedDictionaryUnresolved {
        source: String,
        file: PathBuf,
    },
    ReferenceCycle {
        keys: Vec<String>,
        placed: String,
    },
    ResourcePlaced {
        key: String,
    },
    DocumentSaved {
        path: PathBuf,
    },
    DocumentUnchanged {
        path: PathBuf,
    },
}

impl Diagnostic {
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::LoadingFile { .. }
            | Diagnostic::DuplicateKeyIdentical { .. }
            | Diagnostic::MergedDictionariesIgnored { .. }
            | Diagnostic::MergedDictionaryRedundant { .. }
            | Diagnostic::ResourcePlaced { .. } => Level::Debug,
            Diagnostic::NamespacePrefixRenamed { .. } | Diagnostic::DocumentUnchanged { .. } => {
                Level::Info
            }
            Diagnostic::DocumentSaved { .. } => Level::InfoImportant,
            Diagnostic::DuplicateKeyDiffering { .. }
            | Diagnostic::UnkeyedElementDropped { .. }
            | Diagnostic::MergedDictionaryUnresolved { .. }
            | Diagnostic::ReferenceCycle { .. } => Level::Warn,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::LoadingFile { .. } => "loading_file",
            Diagnostic::NamespacePrefixRenamed { .. } => "namespace_prefix_renamed",
            Diagnostic::DuplicateKeyIdentical { .. } => "duplicate_key_identical",
            Diagnostic::DuplicateKeyDiffering { .. } => "duplicate_key_differing",
            Diagnostic::UnkeyedElementDropped { .. } => "unkeyed_element_dropped",
            Diagnostic::MergedDictionariesIgnored { .. } => "merged_dictionaries_ignored",
            Diagnostic::MergedDictionaryRedundant { .. } => "merged_dictionary_redundant",
            Diagnostic::MergedDictionaryUnresolved { .. } => "merged_dictionary_unresolved",
            Diagnostic::ReferenceCycle { .. } => "reference_cycle",
            Diagnostic::ResourcePlaced { .. } => "resource_placed",
            Diagnostic::DocumentSaved { .. } => "document_saved",
            Diagnostic::DocumentUnchanged { .. } => "document_unchanged",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::LoadingFile { path } => write!(f, "Loading resource \"{}\"", path.display()),
            Diagnostic::NamespacePrefixRenamed {
                file,
                from,
                to,
                uri,
            } => write!(
                f,
                "Prefix \"{}\" in \"{}\" renamed to \"{}\" (namespace \"{}\")",
                from,
                file.display(),
                to,
                uri
            ),
            Diagnostic::DuplicateKeyIdentical { key, location } => write!(
                f,
                "Skipping identical duplicate of key \"{}\" at {}",
                key, location
            ),
            Diagnostic::DuplicateKeyDiffering {
                key,
                first,
                duplicate,
            } => write!(
                f,
                "Key \"{}\" is declared with different content at {} and {}; keeping the first",
                key, first, duplicate
            ),
            Diagnostic::UnkeyedElementDropped { element, location } => write!(
                f,
                "Dropping element <{}> at {} because it has no key",
                element, location
            ),
            Diagnostic::MergedDictionariesIgnored { file } => write!(
                f,
                "Ignoring merged dictionaries declared in \"{}\"",
                file.display()
            ),
            Diagnostic::MergedDictionaryRedundant { source, file } => write!(
                f,
                "Skipping merged dictionary \"{}\" from \"{}\" because it is part of this combine run",
                source,
                file.display()
            ),
            Diagnostic::MergedDictionaryUnresolved { source, file } => write!(
                f,
                "Skipping merged dictionary \"{}\" from \"{}\" because its source path is not recognized",
                source,
                file.display()
            ),
            Diagnostic::ReferenceCycle { keys, placed } => write!(
                f,
                "Reference cycle between [{}]; placing \"{}\" first",
                keys.join(", "),
                placed
            ),
            Diagnostic::ResourcePlaced { key } => write!(f, "Adding resource \"{}\"", key),
            Diagnostic::DocumentSaved { path } => {
                write!(f, "Resource Dictionary saved to \"{}\".", path.display())
            }
            Diagnostic::DocumentUnchanged { path } => write!(
                f,
                "Resource Dictionary \"{}\" is unchanged. No new file written.",
                path.display()
            ),
        }
    }
}

/// Sink for non-fatal conditions. Shared across batch jobs, hence `Sync`.
pub trait Logger: Send + Sync {
    fn log(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`. Debug and Info sit below the default
/// INFO filter so they only show up with `-v`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, diagnostic: &Diagnostic) {
        let kind = diagnostic.kind();
        match diagnostic.level() {
            Level::Debug => trace!(kind, "{}", diagnostic),
            Level::Info => debug!(kind, "{}", diagnostic),
            Level::InfoImportant => info!(kind, "{}", diagnostic),
            Level::Warn => warn!(kind, "{}", diagnostic),
            Level::Error => error!(kind, "{}", diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory, optionally echoing to `tracing`.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<Diagnostic>>,
    echo: bool,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            echo: true,
        }
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn at_level(&self, level: Level) -> Vec<Diagnostic> {
        self.records()
            .into_iter()
            .filter(|d| d.level() == level)
            .collect()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.at_level(Level::Warn)
    }
}

impl Logger for RecordingLogger {
    fn log(&self, diagnostic: &Diagnostic) {
        if self.echo {
            TracingLogger.log(diagnostic);
        }
        match self.records.lock() {
            Ok(mut records) => records.push(diagnostic.clone()),
            Err(poisoned) => poisoned.into_inner().push(diagnostic.clone()),
        }
    }
}

/// Helper for the duplicate-key and unkeyed diagnostics, which carry locations as text.
pub fn location(info: Option<&DebugInfo>, fallback: impl FnOnce() -> String) -> String {
    info.map(ToString::to_string).unwrap_or_else(fallback)
}
