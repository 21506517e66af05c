//! Per-file pipeline and batch driver.
//!
//! source text ─► extract_source_nodes ─┐
//!                                      ├─► correlate ─► mutators ─► codegen
//! compiled text ─► extract_compiled_nodes ┘

#[cfg(feature = "napi")]
use napi_derive::napi;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_ast::AstBuilder;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compiled::{
    extract_compiled_nodes, for_each_story_node, meta_object_mut, story_props_object_expression,
};
use crate::correlate::correlate;
use crate::define_meta::MetaSummary;
use crate::diagnostics::{CompilerError, CompilerWarning, INV_CORRELATION, PARSE_ERROR};
use crate::parse::{extract_source_nodes, SourceNodeSet};
use crate::text::dedent;
use crate::transform::{
    insert_create_import, insert_define_meta_description, insert_story_description,
    insert_svelte_csf_to_story_parameters, TransformContext,
};

pub const DEFAULT_PACKAGE_NAME: &str = "@storybook/addon-svelte-csf";

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS & RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Path of the stories file, used in every diagnostic.
    pub filename: String,
    /// Original `*.stories.svelte` source.
    pub source: String,
    /// Svelte client output for `source`, development or production.
    pub compiled: String,
    /// Addon package that exports `defineMeta` and the runtime.
    #[serde(default)]
    pub package_name: Option<String>,
}

impl CompileOptions {
    pub fn package_name(&self) -> &str {
        self.package_name.as_deref().unwrap_or(DEFAULT_PACKAGE_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct StoryEntry {
    pub name: Option<String>,
    pub export_name: Option<String>,
    /// Description inferred from the comment above the story, before any
    /// explicit description takes precedence.
    pub description: Option<String>,
    pub raw_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub warnings: Vec<CompilerWarning>,
    pub meta: MetaSummary,
    pub stories: Vec<StoryEntry>,
    pub import_inserted: bool,
}

/// Outcome for one file of a batch. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub filename: String,
    pub result: Option<CompileResult>,
    pub error: Option<CompilerError>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Apply every mutation to the parsed compiled module. Returns whether the
/// runtime import was inserted.
pub fn transform_compiled_program<'a>(
    allocator: &'a Allocator,
    source: &SourceNodeSet,
    program: &mut Program<'a>,
    package_name: &str,
    ctx: &mut TransformContext<'_>,
) -> Result<bool, CompilerError> {
    let ast = AstBuilder::new(allocator);
    let filename = ctx.filename;

    let compiled = extract_compiled_nodes(program, package_name, filename)?;
    let pairs = correlate(&source.story_components, &compiled.stories, filename)?;
    tracing::debug!(
        file = %filename,
        stories = pairs.len(),
        story_component = %compiled.story_local,
        meta_call_start = compiled.meta_call.start,
        "correlated story call sites"
    );

    let meta_object = meta_object_mut(program, &compiled, filename)?;
    insert_define_meta_description(ast, meta_object, source.meta_description.as_deref(), ctx)?;

    for_each_story_node(program, &compiled.story_local, |index, node| {
        let pair = pairs
            .get(index)
            .filter(|pair| pair.compiled.span == node.span())
            .ok_or_else(|| {
                CompilerError::new(
                    INV_CORRELATION,
                    "Story call sites changed while transforming.",
                    filename,
                    0,
                    0,
                )
            })?;
        tracing::trace!(file = %filename, index = pair.index, story = ?pair.source.label(), "transforming story");
        let props = story_props_object_expression(node, filename)?;
        insert_story_description(ast, props, pair.source, ctx)?;
        insert_svelte_csf_to_story_parameters(ast, props, pair.source, ctx)
    })?;

    Ok(insert_create_import(ast, program, package_name))
}

/// Transform the compiled output of one stories file.
pub fn compile_stories_internal(options: &CompileOptions) -> Result<CompileResult, CompilerError> {
    let span = tracing::debug_span!("compile_stories", file = %options.filename);
    let _guard = span.enter();

    let package_name = options.package_name();
    let source = extract_source_nodes(&options.source, &options.filename, package_name)?;

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &options.compiled, SourceType::mjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(CompilerError::new(
            PARSE_ERROR,
            &format!("Failed to parse compiled output: {}", error),
            &options.filename,
            0,
            0,
        ));
    }
    let mut program = ret.program;

    let mut ctx = TransformContext::new(&options.filename);
    let import_inserted =
        transform_compiled_program(&allocator, &source, &mut program, package_name, &mut ctx)?;
    let code = Codegen::new().build(&program).code;

    let stories = source
        .story_components
        .iter()
        .map(|story| StoryEntry {
            name: story.name.clone(),
            export_name: story.export_name.clone(),
            description: story.comment.as_deref().map(dedent),
            raw_code: story.raw_children.clone(),
        })
        .collect();

    tracing::debug!(
        file = %options.filename,
        warnings = ctx.warnings.len(),
        import_inserted,
        "transformed stories file"
    );

    Ok(CompileResult {
        code,
        warnings: ctx.warnings,
        meta: source.meta,
        stories,
        import_inserted,
    })
}

/// Transform many independent stories files in parallel. A failing file yields
/// an entry carrying its error; the other files are unaffected.
pub fn compile_stories_batch(inputs: &[CompileOptions]) -> Vec<BatchEntry> {
    inputs
        .par_iter()
        .map(|options| match compile_stories_internal(options) {
            Ok(result) => BatchEntry {
                filename: options.filename.clone(),
                result: Some(result),
                error: None,
            },
            Err(error) => {
                tracing::error!(file = %options.filename, code = %error.code, "{}", error);
                BatchEntry {
                    filename: options.filename.clone(),
                    result: None,
                    error: Some(error),
                }
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn compile_stories_native(options_json: String) -> napi::Result<serde_json::Value> {
    let options: CompileOptions = serde_json::from_str(&options_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid compile options: {}", e)))?;
    let result = compile_stories_internal(&options).map_err(|e| {
        let payload = serde_json::to_string(&e).unwrap_or_else(|_| e.to_string());
        napi::Error::from_reason(payload)
    })?;
    serde_json::to_value(result).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_stories_batch_native(inputs_json: String) -> napi::Result<serde_json::Value> {
    let inputs: Vec<CompileOptions> = serde_json::from_str(&inputs_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid batch input: {}", e)))?;
    serde_json::to_value(compile_stories_batch(&inputs))
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}
