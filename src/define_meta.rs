//! `defineMeta()` analysis shared by the source and the compiled tree.
//!
//! The module script of a stories file and the compiled module both contain
//!
//! ```js
//! import { defineMeta } from '@storybook/addon-svelte-csf';
//! const { Story } = defineMeta({ title: 'Atoms/Button', component: Button });
//! ```
//!
//! with the same shape, so every lookup here works on either `Program`.

use oxc_ast::ast::*;
use oxc_span::{GetSpan, Span};
use std::collections::HashMap;

use crate::ast_utils::{find_property, string_property_value};
use crate::diagnostics::{
    CompilerError, INV_META_ARGUMENT, INV_META_DUPLICATE, INV_META_MISSING, INV_STORY_BINDING,
};
use crate::text::js_comment_text;

pub const DEFINE_META: &str = "defineMeta";
pub const STORY: &str = "Story";

/// Static metadata read from the `defineMeta()` argument, for indexers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "napi", napi_derive::napi(object))]
#[serde(rename_all = "camelCase")]
pub struct MetaSummary {
    pub title: Option<String>,
    pub tags: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT & DECLARATION LOOKUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Local name bound to `defineMeta` imported from `package_name`.
pub fn find_define_meta_import(program: &Program<'_>, package_name: &str) -> Option<String> {
    for stmt in &program.body {
        let Statement::ImportDeclaration(import_decl) = stmt else {
            continue;
        };
        if import_decl.source.value.as_str() != package_name {
            continue;
        }
        let Some(specifiers) = &import_decl.specifiers else {
            continue;
        };
        for specifier in specifiers {
            if let ImportDeclarationSpecifier::ImportSpecifier(s) = specifier {
                let imported = match &s.imported {
                    ModuleExportName::IdentifierName(id) => id.name.as_str(),
                    ModuleExportName::StringLiteral(lit) => lit.value.as_str(),
                    _ => continue,
                };
                if imported == DEFINE_META {
                    return Some(s.local.name.to_string());
                }
            }
        }
    }
    None
}

fn is_identifier(expression: &Expression<'_>, name: &str) -> bool {
    matches!(expression, Expression::Identifier(id) if id.name.as_str() == name)
}

/// Indices of top-level variable declarations initialized by a `defineMeta`-looking
/// call. Both the imported local name and the exported name are accepted here so
/// that a call through a shadowing identifier is caught by
/// [`define_meta_first_argument`] instead of being silently skipped.
pub fn find_define_meta_declarations(program: &Program<'_>, import_local: &str) -> Vec<usize> {
    program
        .body
        .iter()
        .enumerate()
        .filter_map(|(index, stmt)| {
            let Statement::VariableDeclaration(decl) = stmt else {
                return None;
            };
            let init = decl.declarations.first()?.init.as_ref()?;
            match init {
                Expression::CallExpression(call)
                    if is_identifier(&call.callee, import_local)
                        || is_identifier(&call.callee, DEFINE_META) =>
                {
                    Some(index)
                }
                _ => None,
            }
        })
        .collect()
}

/// Index of the single `defineMeta()` declaration.
pub fn find_unique_define_meta_declaration(
    program: &Program<'_>,
    import_local: &str,
    filename: &str,
) -> Result<usize, CompilerError> {
    let declarations = find_define_meta_declarations(program, import_local);
    match declarations.as_slice() {
        [index] => Ok(*index),
        [] => Err(CompilerError::with_details(
            INV_META_MISSING,
            "No `const { Story } = defineMeta({...})` declaration found.",
            filename,
            0,
            0,
            None,
            vec!["Declare the metadata in the module script of the stories file.".to_string()],
        )),
        [_, second, ..] => {
            let span = program.body[*second].span();
            Err(CompilerError::with_details(
                INV_META_DUPLICATE,
                "defineMeta() is called more than once.",
                filename,
                0,
                0,
                Some(snippet(program.source_text, span)),
                vec![],
            ))
        }
    }
}

fn snippet(source: &str, span: Span) -> String {
    source
        .get(span.start as usize..span.end as usize)
        .unwrap_or_default()
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIRST ARGUMENT
// ═══════════════════════════════════════════════════════════════════════════════

fn first_argument_error(filename: &str) -> CompilerError {
    CompilerError::with_details(
        INV_META_ARGUMENT,
        "Internal error while trying to get first argument from defineMeta.",
        filename,
        0,
        0,
        None,
        vec![
            "defineMeta() must be called through its imported name.".to_string(),
            "defineMeta() accepts exactly one argument, an object literal.".to_string(),
        ],
    )
}

/// The object literal passed to `defineMeta()`.
///
/// The callee must be the identifier bound by the `defineMeta` import; the
/// call must have exactly one argument, itself an object literal.
pub fn define_meta_first_argument<'r, 'a>(
    declaration: &'r VariableDeclaration<'a>,
    import_local: &str,
    filename: &str,
) -> Result<&'r ObjectExpression<'a>, CompilerError> {
    if let Some(Expression::CallExpression(call)) =
        declaration.declarations.first().and_then(|d| d.init.as_ref())
    {
        if is_identifier(&call.callee, import_local) && call.arguments.len() == 1 {
            if let Argument::ObjectExpression(object) = &call.arguments[0] {
                return Ok(&**object);
            }
        }
    }
    Err(first_argument_error(filename))
}

pub fn define_meta_first_argument_mut<'r, 'a>(
    declaration: &'r mut VariableDeclaration<'a>,
    import_local: &str,
    filename: &str,
) -> Result<&'r mut ObjectExpression<'a>, CompilerError> {
    if let Some(Expression::CallExpression(call)) = declaration
        .declarations
        .first_mut()
        .and_then(|d| d.init.as_mut())
    {
        if is_identifier(&call.callee, import_local) && call.arguments.len() == 1 {
            if let Argument::ObjectExpression(object) = &mut call.arguments[0] {
                return Ok(&mut **object);
            }
        }
    }
    Err(first_argument_error(filename))
}

/// Selected identifier-keyed properties of the `defineMeta()` argument.
pub fn extract_define_meta_properties<'r, 'a>(
    object: &'r ObjectExpression<'a>,
    names: &[&str],
) -> HashMap<String, &'r ObjectProperty<'a>> {
    names
        .iter()
        .filter_map(|name| find_property(name, object).map(|p| (name.to_string(), p)))
        .collect()
}

pub fn meta_summary(object: &ObjectExpression<'_>) -> MetaSummary {
    let properties = extract_define_meta_properties(object, &["title", "tags"]);

    let title = properties
        .get("title")
        .and_then(|_| string_property_value("title", object));

    let tags = match properties.get("tags").map(|p| &p.value) {
        Some(Expression::ArrayExpression(array)) => array
            .elements
            .iter()
            .filter_map(|element| match element {
                ArrayExpressionElement::StringLiteral(s) => Some(s.value.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    MetaSummary { title, tags }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORY BINDING & LEADING COMMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Local name of the `Story` component destructured from the `defineMeta()` result.
pub fn story_binding_name(
    declaration: &VariableDeclaration<'_>,
    filename: &str,
) -> Result<String, CompilerError> {
    let missing = || {
        CompilerError::with_details(
            INV_STORY_BINDING,
            "The result of defineMeta() must be destructured to obtain `Story`.",
            filename,
            0,
            0,
            None,
            vec!["const { Story } = defineMeta({ ... });".to_string()],
        )
    };

    let declarator = declaration.declarations.first().ok_or_else(missing)?;
    let BindingPattern::ObjectPattern(pattern) = &declarator.id else {
        return Err(missing());
    };

    for property in &pattern.properties {
        if property.computed {
            continue;
        }
        match &property.key {
            PropertyKey::StaticIdentifier(key) if key.name.as_str() == STORY => {}
            _ => continue,
        }
        let binding = match &property.value {
            BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
            BindingPattern::AssignmentPattern(assign) => match &assign.left {
                BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
                _ => None,
            },
            _ => None,
        };
        return binding.ok_or_else(missing);
    }

    Err(missing())
}

/// Text of the first comment leading the top-level statement at `index`, with
/// its delimiters removed. A comment on the same line as the previous
/// statement trails that statement and is not considered.
pub fn leading_comment(program: &Program<'_>, index: usize) -> Option<String> {
    let statement = program.body.get(index)?;
    let start = statement.span().start;
    let previous_end = if index == 0 {
        0
    } else {
        program.body[index - 1].span().end
    };
    let source = program.source_text;

    program
        .comments
        .iter()
        .filter(|c| c.span.start >= previous_end && c.span.end <= start)
        .find(|c| {
            index == 0
                || source
                    .get(previous_end as usize..c.span.start as usize)
                    .is_some_and(|gap| gap.contains('\n'))
        })
        .map(|c| js_comment_text(comment_source(source, c.span)))
}

/// Full source of a comment including delimiters, whether `span` covers the
/// delimiters or only the comment content.
fn comment_source(source: &str, span: Span) -> &str {
    let (mut start, mut end) = (span.start as usize, span.end as usize);
    let text = source.get(start..end).unwrap_or_default();
    if text.starts_with("//") || text.starts_with("/*") {
        return text;
    }
    match start.checked_sub(2).and_then(|s| source.get(s..start)) {
        Some("//") => start -= 2,
        Some("/*") => {
            start -= 2;
            if source.get(end..end + 2) == Some("*/") {
                end += 2;
            }
        }
        _ => {}
    }
    source.get(start..end).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    const PACKAGE: &str = "@storybook/addon-svelte-csf";

    fn with_program<R>(source: &str, f: impl for<'a> FnOnce(&mut Program<'a>) -> R) -> R {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        assert!(ret.errors.is_empty());
        let mut program = ret.program;
        f(&mut program)
    }

    fn declaration<'r, 'a>(program: &'r Program<'a>, index: usize) -> &'r VariableDeclaration<'a> {
        match &program.body[index] {
            Statement::VariableDeclaration(decl) => decl,
            _ => panic!("expected a variable declaration"),
        }
    }

    #[test]
    fn test_import_binding_follows_rename() {
        let source = "import { defineMeta as dm } from '@storybook/addon-svelte-csf';\nconst { Story } = dm({});";
        with_program(source, |program| {
            assert_eq!(find_define_meta_import(program, PACKAGE), Some("dm".to_string()));
            assert_eq!(find_define_meta_import(program, "other"), None);
            let index = find_unique_define_meta_declaration(program, "dm", "a.svelte").unwrap();
            assert_eq!(index, 1);
        });
    }

    #[test]
    fn test_first_argument_requires_import_binding() {
        let source = "import { defineMeta as dm } from '@storybook/addon-svelte-csf';\nconst { Story } = defineMeta({ title: 'x' });";
        with_program(source, |program| {
            let index = find_unique_define_meta_declaration(program, "dm", "a.svelte").unwrap();
            let err = define_meta_first_argument(declaration(program, index), "dm", "a.svelte")
                .unwrap_err();
            assert_eq!(err.code, INV_META_ARGUMENT);
            assert_eq!(err.file, "a.svelte");
        });
    }

    #[test]
    fn test_first_argument_requires_single_object_literal() {
        for call in ["defineMeta()", "defineMeta(meta)", "defineMeta({}, {})"] {
            let source = format!("const {{ Story }} = {};", call);
            with_program(&source, |program| {
                assert!(define_meta_first_argument(declaration(program, 0), DEFINE_META, "a").is_err());
            });
        }
        with_program("const { Story } = defineMeta({ title: 'x' });", |program| {
            let object = define_meta_first_argument(declaration(program, 0), DEFINE_META, "a").unwrap();
            assert_eq!(object.properties.len(), 1);
        });
    }

    #[test]
    fn test_missing_and_duplicate_declarations() {
        with_program("const a = 1;", |program| {
            let err = find_unique_define_meta_declaration(program, DEFINE_META, "a").unwrap_err();
            assert_eq!(err.code, INV_META_MISSING);
        });
        with_program(
            "const { Story } = defineMeta({});\nconst { Story: Other } = defineMeta({});",
            |program| {
                let err = find_unique_define_meta_declaration(program, DEFINE_META, "a").unwrap_err();
                assert_eq!(err.code, INV_META_DUPLICATE);
            },
        );
    }

    #[test]
    fn test_story_binding_name() {
        with_program("const { Story } = defineMeta({});", |program| {
            assert_eq!(story_binding_name(declaration(program, 0), "a").unwrap(), "Story");
        });
        with_program("const { meta, Story: ButtonStory } = defineMeta({});", |program| {
            assert_eq!(
                story_binding_name(declaration(program, 0), "a").unwrap(),
                "ButtonStory"
            );
        });
        with_program("const meta = defineMeta({});", |program| {
            let err = story_binding_name(declaration(program, 0), "a").unwrap_err();
            assert_eq!(err.code, INV_STORY_BINDING);
        });
    }

    #[test]
    fn test_meta_summary() {
        with_program(
            "const { Story } = defineMeta({ title: 'Atoms/Button', tags: ['autodocs', dynamic] });",
            |program| {
                let object = define_meta_first_argument(declaration(program, 0), DEFINE_META, "a").unwrap();
                let properties = extract_define_meta_properties(object, &["title", "args"]);
                assert!(properties.contains_key("title"));
                assert!(!properties.contains_key("args"));
                assert_eq!(
                    meta_summary(object),
                    MetaSummary {
                        title: Some("Atoms/Button".to_string()),
                        tags: vec!["autodocs".to_string()],
                    }
                );
            },
        );
    }

    #[test]
    fn test_leading_comment() {
        let source = "import { defineMeta } from '@storybook/addon-svelte-csf'; // trailing\n\n/**\n * Button docs\n */\n// second\nconst { Story } = defineMeta({});";
        with_program(source, |program| {
            assert_eq!(leading_comment(program, 1), Some("\n Button docs\n ".to_string()));
            assert_eq!(leading_comment(program, 0), None);
        });
        with_program("const { Story } = defineMeta({});", |program| {
            assert_eq!(leading_comment(program, 0), None);
        });
    }
}
