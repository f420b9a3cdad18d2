use std::time::Duration;

/// Default namespace of WPF / WinUI resource dictionaries
pub const PRESENTATION_NAMESPACE: &str = "http://schemas.microsoft.com/winfx/2006/xaml/presentation";

/// Namespace of the XAML language directives (`x:Key`, `x:Name`, ...)
pub const XAML_NAMESPACE: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

/// Markup compatibility namespace, home of `mc:Ignorable`
pub const MARKUP_COMPATIBILITY_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/markup-compatibility/2006";

/// Substring of a conditional namespace URI that gates content on an API contract
pub const API_CONTRACT_MARKER: &str = "IsApiContract";

pub const DEFAULT_FILE_HEADER: &str =
    "This file was generated by xaml-combine. Changes to this file will be lost when it is regenerated.";

/// Attempts made to read an existing target before giving up
pub const READ_RETRY_ATTEMPTS: u16 = 5;

pub const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long to wait for another process holding the same target file
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spaces per nesting level in the rendered output
pub const INDENT_SIZE: usize = 4;

/// What the sequencer does when no pending resource can be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Break the cycle at its earliest-discovered member and keep going
    #[default]
    Permissive,
    /// Fail the merge with [`crate::error::CombineError::ReferenceCycle`]
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u16,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: READ_RETRY_ATTEMPTS,
            delay: READ_RETRY_DELAY,
        }
    }
}

/// Options recognized by a single combine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineOptions {
    /// Aggregate `MergedDictionaries` references from the inputs into the output
    pub import_merged_dictionaries: bool,
    pub write_file_header: bool,
    pub file_header: String,
    /// Append the sorted source list as a second header comment
    pub include_source_files_in_file_header: bool,
    pub cycle_policy: CyclePolicy,
    /// Retry behavior when reading an existing target for change detection
    pub read_retry: RetryPolicy,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            import_merged_dictionaries: false,
            write_file_header: true,
            file_header: DEFAULT_FILE_HEADER.to_string(),
            include_source_files_in_file_header: true,
            cycle_policy: CyclePolicy::default(),
            read_retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = CombineOptions::default();
        assert!(!options.import_merged_dictionaries);
        assert!(options.write_file_header);
        assert!(options.include_source_files_in_file_header);
        assert_eq!(options.file_header, DEFAULT_FILE_HEADER);
        assert_eq!(options.cycle_policy, CyclePolicy::Permissive);
        assert_eq!(options.read_retry.attempts, READ_RETRY_ATTEMPTS);
    }
}
