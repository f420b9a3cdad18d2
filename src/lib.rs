//! xaml-combine: merge XAML resource dictionaries into one
//!
//! Large WPF / UWP / WinUI libraries split their theme resources across many
//! small dictionaries for maintainability, then ship a single `Generic.xaml`
//! for lookup performance. This crate produces that single dictionary:
//!
//! 1. **Load** -- Parse every source file into an owned tree with source
//!    positions ([`parser`], [`dom`])
//! 2. **Reconcile** -- Fold each file's namespace prefixes into one table,
//!    renaming prefixes that duplicate a known namespace ([`namespace`])
//! 3. **Index** -- Key every top-level resource and collect the keys it
//!    references; first-seen wins on duplicates ([`extract`], [`markup`],
//!    [`index`])
//! 4. **Order** -- Place each resource after everything it references, so
//!    `StaticResource` lookups resolve at load time ([`sequence`])
//! 5. **Assemble** -- Header, merged and theme dictionaries, resources
//!    ([`dictionaries`], [`writer`])
//! 6. **Write** -- Only when the content changed, under a cross-process lock
//!    per target ([`writer`], [`lock`])
//!
//! Everything non-fatal is reported as a [`diagnostics::Diagnostic`] through a
//! caller-supplied [`diagnostics::Logger`]; fatal conditions are
//! [`error::CombineError`].
//!
//! # Example Usage
//!
//! ```bash
//! # Combine the files listed in a manifest
//! xaml-combine combine -s Themes/Generic.txt -t Themes/Generic.xaml
//!
//! # Several targets at once, importing merged dictionary references
//! xaml-combine batch --md -j Light.txt=Themes/Light.xaml -j Dark.txt=Themes/Dark.xaml
//! ```

pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod dictionaries;
pub mod dom;
pub mod error;
pub mod extract;
pub mod files;
pub mod index;
pub mod lock;
pub mod markup;
pub mod merge;
pub mod models;
pub mod namespace;
pub mod parser;
pub mod sequence;
pub mod stats;
pub mod writer;

pub use config::CombineOptions;
pub use error::{CombineError, Result};
pub use merge::{CombineOutcome, Combiner};
