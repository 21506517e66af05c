//! Mutators applied to the compiled tree.
//!
//! Each mutator touches one object literal of the compiled module and is safe to
//! re-run: description insertion never overwrites, levels of
//! `parameters.docs.description` are created once and reused.

use oxc_ast::ast::*;
use oxc_ast::{AstBuilder, NONE};
use oxc_span::SPAN;

use crate::ast_utils::{
    create_object_expression, create_property, create_string_literal, ensure_description,
    ensure_parameters, find_property_index, PropertyShapeError,
};
use crate::diagnostics::{
    CompilerError, CompilerWarning, INV_PROPERTY_SHAPE, WARN_DESCRIPTION_EXPLICIT,
};
use crate::parse::SourceStory;
use crate::text::dedent;

pub const CREATE_STORY_FNS: &str = "createStoryFns";
pub const SVELTE_CSF: &str = "__svelteCsf";
pub const RAW_CODE: &str = "rawCode";
const COMPONENT: &str = "component";
const STORY: &str = "story";

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-file state shared by the mutators.
#[derive(Debug)]
pub struct TransformContext<'f> {
    pub filename: &'f str,
    pub warnings: Vec<CompilerWarning>,
}

impl<'f> TransformContext<'f> {
    pub fn new(filename: &'f str) -> Self {
        Self {
            filename,
            warnings: Vec::new(),
        }
    }

    /// Record a non-fatal diagnostic and log it.
    pub fn warn(&mut self, code: &str, message: String, story: Option<&str>) {
        let warning = CompilerWarning {
            code: code.to_string(),
            message,
            file: self.filename.to_string(),
            story: story.map(str::to_string),
        };
        tracing::warn!(code = %warning.code, file = %warning.file, "{}", warning);
        self.warnings.push(warning);
    }

    fn shape_error(&self, error: PropertyShapeError, target: &str) -> CompilerError {
        CompilerError::with_details(
            INV_PROPERTY_SHAPE,
            &format!("In {}: {}.", target, error),
            self.filename,
            0,
            0,
            None,
            vec!["Write parameters and parameters.docs inline as object literals.".to_string()],
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

enum DescriptionTarget<'s> {
    Component,
    Story(Option<&'s str>),
}

impl DescriptionTarget<'_> {
    fn key(&self) -> &'static str {
        match self {
            DescriptionTarget::Component => COMPONENT,
            DescriptionTarget::Story(_) => STORY,
        }
    }

    fn label(&self) -> String {
        match self {
            DescriptionTarget::Component => "defineMeta()".to_string(),
            DescriptionTarget::Story(Some(name)) => format!("<Story name=\"{}\" />", name),
            DescriptionTarget::Story(None) => "One of <Story /> component(s)".to_string(),
        }
    }

    fn comment_kind(&self) -> &'static str {
        match self {
            DescriptionTarget::Component => "JSDoc comment",
            DescriptionTarget::Story(_) => "HTML comment",
        }
    }
}

fn insert_description<'a>(
    ast: AstBuilder<'a>,
    object: &mut ObjectExpression<'a>,
    comment: &str,
    target: DescriptionTarget<'_>,
    ctx: &mut TransformContext<'_>,
) -> Result<(), CompilerError> {
    let description =
        ensure_description(ast, object).map_err(|e| ctx.shape_error(e, &target.label()))?;

    if find_property_index(target.key(), description).is_some() {
        let story = match &target {
            DescriptionTarget::Story(name) => *name,
            DescriptionTarget::Component => None,
        };
        ctx.warn(
            WARN_DESCRIPTION_EXPLICIT,
            format!(
                "{} already has explicitly set description. Ignoring the {} above.",
                target.label(),
                target.comment_kind()
            ),
            story,
        );
        return Ok(());
    }

    let value = create_string_literal(ast, &dedent(comment));
    description
        .properties
        .push(create_property(ast, target.key(), value));
    Ok(())
}

/// Insert the comment leading `defineMeta()` as
/// `parameters.docs.description.component` of its argument.
pub fn insert_define_meta_description<'a>(
    ast: AstBuilder<'a>,
    meta_object: &mut ObjectExpression<'a>,
    comment: Option<&str>,
    ctx: &mut TransformContext<'_>,
) -> Result<(), CompilerError> {
    match comment {
        Some(comment) => {
            insert_description(ast, meta_object, comment, DescriptionTarget::Component, ctx)
        }
        None => Ok(()),
    }
}

/// Insert the HTML comment above a `<Story />` as
/// `parameters.docs.description.story` of its compiled props.
pub fn insert_story_description<'a>(
    ast: AstBuilder<'a>,
    props: &mut ObjectExpression<'a>,
    story: &SourceStory,
    ctx: &mut TransformContext<'_>,
) -> Result<(), CompilerError> {
    match story.comment.as_deref() {
        Some(comment) => insert_description(
            ast,
            props,
            comment,
            DescriptionTarget::Story(story.label()),
            ctx,
        ),
        None => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERNAL LINKAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Push `__svelteCsf: { rawCode }` into the story's `parameters`.
pub fn insert_svelte_csf_to_story_parameters<'a>(
    ast: AstBuilder<'a>,
    props: &mut ObjectExpression<'a>,
    story: &SourceStory,
    ctx: &mut TransformContext<'_>,
) -> Result<(), CompilerError> {
    let parameters = ensure_parameters(ast, props)
        .map_err(|e| ctx.shape_error(e, &DescriptionTarget::Story(story.label()).label()))?;

    let raw_code = create_string_literal(ast, &story.raw_children);
    let mut linkage = ast.vec();
    linkage.push(create_property(ast, RAW_CODE, raw_code));
    parameters.properties.push(create_property(
        ast,
        SVELTE_CSF,
        create_object_expression(ast, Some(linkage)),
    ));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT INJECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Module path of the runtime `createStoryFns` export.
pub fn create_story_fns_path(package_name: &str) -> String {
    format!("{}/internal/create-story-fns", package_name)
}

/// `import { createStoryFns } from '<package>/internal/create-story-fns';`
pub fn create_import<'a>(ast: AstBuilder<'a>, package_name: &str) -> Statement<'a> {
    let path = ast.allocator.alloc_str(&create_story_fns_path(package_name));
    let specifier = ast.import_declaration_specifier_import_specifier(
        SPAN,
        ast.module_export_name_identifier_name(SPAN, CREATE_STORY_FNS),
        ast.binding_identifier(SPAN, CREATE_STORY_FNS),
        ImportOrExportKind::Value,
    );
    let mut specifiers = ast.vec();
    specifiers.push(specifier);
    Statement::ImportDeclaration(ast.alloc_import_declaration(
        SPAN,
        Some(specifiers),
        ast.string_literal(SPAN, path, None),
        None,
        NONE,
        ImportOrExportKind::Value,
    ))
}

/// Whether `program` already imports `createStoryFns` from the runtime path.
pub fn has_create_story_fns_import(program: &Program<'_>, package_name: &str) -> bool {
    let path = create_story_fns_path(package_name);
    program.body.iter().any(|stmt| {
        let Statement::ImportDeclaration(import_decl) = stmt else {
            return false;
        };
        import_decl.source.value.as_str() == path
            && import_decl.specifiers.as_ref().is_some_and(|specifiers| {
                specifiers.iter().any(|s| {
                    matches!(
                        s,
                        ImportDeclarationSpecifier::ImportSpecifier(s)
                            if s.local.name.as_str() == CREATE_STORY_FNS
                    )
                })
            })
    })
}

/// Insert the runtime import at the top of the module unless already present.
/// Returns whether it was inserted.
pub fn insert_create_import<'a>(
    ast: AstBuilder<'a>,
    program: &mut Program<'a>,
    package_name: &str,
) -> bool {
    if has_create_story_fns_import(program, package_name) {
        return false;
    }
    program.body.insert(0, create_import(ast, package_name));
    true
}
