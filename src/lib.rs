//! # Svelte CSF Stories Compiler (native)
//!
//! Rewrites the Svelte compiler output of a `*.stories.svelte` file so every
//! `<Story />` can be rendered in isolation with its documentation.
//!
//! ## Pipeline Invariants
//!
//! 1. **Single Metadata Declaration**: the module script declares
//!    `const { Story } = defineMeta({ ... })` exactly once. The callee is the
//!    binding imported from the addon package, called with one object literal.
//!
//! 2. **Positional Correlation**: the i-th `<Story />` of the source is the i-th
//!    story call of the compiled output. Source and compiled counts must match
//!    (SCSF-CORRELATION).
//!
//! 3. **Two Call Shapes, One Accessor**: `Story(node, props)` and
//!    `$.validate_component(Story)(node, props)` both expose their props object
//!    through `story_props_object_expression`.
//!
//! 4. **Author Wins**: an explicit `parameters.docs.description.{component|story}`
//!    is never overwritten by a comment. A warning is recorded instead.
//!
//! 5. **Path Reuse**: `parameters`, `docs` and `description` levels are created on
//!    first use and never duplicated.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod ast_utils;
mod compile;
mod compiled;
mod correlate;
mod define_meta;
mod diagnostics;
mod discovery;
mod logging;
mod parse;
mod text;
mod transform;
mod visitor;


// Internal Rust-to-Rust API (for bundler plugins)
pub use compile::{
    compile_stories_batch, compile_stories_internal, transform_compiled_program, BatchEntry,
    CompileOptions, CompileResult, StoryEntry, DEFAULT_PACKAGE_NAME,
};
pub use define_meta::MetaSummary;
pub use diagnostics::{CompilerError, CompilerWarning};
pub use discovery::{discover_story_files, is_stories_file, read_stories_file};
pub use logging::{init_logging, LoggingConfig};
pub use parse::{extract_source_nodes, SourceNodeSet, SourceStory};
pub use transform::TransformContext;

#[cfg(feature = "napi")]
pub use compile::{compile_stories_batch_native, compile_stories_native};
#[cfg(feature = "napi")]
pub use discovery::discover_story_files_native;
#[cfg(feature = "napi")]
pub use logging::init_logging_native;
#[cfg(feature = "napi")]
pub use parse::extract_source_nodes_native;

#[cfg(feature = "napi")]
#[napi]
pub fn compile_bridge() -> String {
    "Svelte CSF Native Bridge Connected".to_string()
}
