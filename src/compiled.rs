//! Compiled-tree extraction.
//!
//! The Svelte compiler turns every `<Story />` of a stories file into one of two
//! call shapes inside the component function:
//!
//! ```js
//! Story(node_1, { name: 'Primary' });                          // production
//! $.validate_component(Story)(node_1, { name: 'Primary' });    // development
//! ```
//!
//! Both carry the story props as the second positional argument. Call sites are
//! found in source order; a story call is never descended into.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, walk_mut, Visit, VisitMut};
use oxc_span::{GetSpan, Span};

use crate::define_meta::{
    define_meta_first_argument, define_meta_first_argument_mut, find_define_meta_import,
    find_unique_define_meta_declaration, story_binding_name,
};
use crate::diagnostics::{CompilerError, INV_META_MISSING, INV_STORY_PROPS};

const VALIDATE_COMPONENT: &str = "validate_component";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryCallShape {
    /// `Story(node, { ... })`
    Plain,
    /// `$.validate_component(Story)(node, { ... })`
    Validated,
}

/// One compiled `<Story />` call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledStoryNode {
    pub shape: StoryCallShape,
    /// Expression statement span for a validated call in statement position,
    /// call expression span otherwise.
    pub span: Span,
}

/// Mutable handle on a story call site, in either of its compiled shapes.
pub enum StoryNodeRef<'r, 'a> {
    Call(&'r mut CallExpression<'a>),
    Statement(&'r mut ExpressionStatement<'a>),
}

impl StoryNodeRef<'_, '_> {
    pub fn span(&self) -> Span {
        match self {
            StoryNodeRef::Call(call) => call.span,
            StoryNodeRef::Statement(statement) => statement.span,
        }
    }
}

/// Located nodes of the compiled module.
#[derive(Debug, Clone)]
pub struct CompiledNodeSet {
    /// Local name of the `defineMeta` import in the compiled module.
    pub import_local: String,
    /// Local name of the destructured `Story` component in the compiled module.
    pub story_local: String,
    /// Index of the `defineMeta()` declaration in `Program::body`.
    pub meta_declaration: usize,
    pub meta_call: Span,
    pub stories: Vec<CompiledStoryNode>,
}

fn is_identifier(expression: &Expression<'_>, name: &str) -> bool {
    matches!(expression, Expression::Identifier(id) if id.name.as_str() == name)
}

/// Shape of `call` when it invokes the story component `story_local`.
pub fn story_call_shape(call: &CallExpression<'_>, story_local: &str) -> Option<StoryCallShape> {
    if is_identifier(&call.callee, story_local) {
        return Some(StoryCallShape::Plain);
    }
    let Expression::CallExpression(inner) = &call.callee else {
        return None;
    };
    let validates = match &inner.callee {
        Expression::StaticMemberExpression(member) => {
            member.property.name.as_str() == VALIDATE_COMPONENT
        }
        Expression::Identifier(id) => id.name.as_str() == VALIDATE_COMPONENT,
        _ => false,
    };
    let wraps_story = matches!(
        inner.arguments.first(),
        Some(Argument::Identifier(id)) if id.name.as_str() == story_local
    );
    (validates && wraps_story).then_some(StoryCallShape::Validated)
}

fn statement_story_call<'r, 'a>(
    statement: &'r ExpressionStatement<'a>,
    story_local: &str,
) -> Option<&'r CallExpression<'a>> {
    match &statement.expression {
        Expression::CallExpression(call)
            if story_call_shape(call, story_local) == Some(StoryCallShape::Validated) =>
        {
            Some(&**call)
        }
        _ => None,
    }
}

fn props_argument_error(filename: &str) -> CompilerError {
    CompilerError::with_details(
        INV_STORY_PROPS,
        "Internal error. Failed to extract Story props as object expression from the compiled code.",
        filename,
        0,
        0,
        None,
        vec!["Compile the stories file with the Svelte 5 client compiler.".to_string()],
    )
}

fn second_argument_object<'r, 'a>(call: &'r CallExpression<'a>) -> Option<&'r ObjectExpression<'a>> {
    match call.arguments.get(1)? {
        Argument::ObjectExpression(object) => Some(&**object),
        _ => None,
    }
}

fn second_argument_object_mut<'r, 'a>(
    call: &'r mut CallExpression<'a>,
) -> Option<&'r mut ObjectExpression<'a>> {
    match call.arguments.get_mut(1)? {
        Argument::ObjectExpression(object) => Some(&mut **object),
        _ => None,
    }
}

/// The props object literal passed to a compiled story call.
pub fn story_props_object_expression<'r, 'a>(
    node: StoryNodeRef<'r, 'a>,
    filename: &str,
) -> Result<&'r mut ObjectExpression<'a>, CompilerError> {
    let call = match node {
        StoryNodeRef::Call(call) => Some(call),
        StoryNodeRef::Statement(statement) => match &mut statement.expression {
            Expression::CallExpression(call) => Some(&mut **call),
            _ => None,
        },
    };
    call.and_then(second_argument_object_mut)
        .ok_or_else(|| props_argument_error(filename))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATING STORY CALLS
// ═══════════════════════════════════════════════════════════════════════════════

struct StoryCallFinder<'s> {
    story_local: &'s str,
    filename: &'s str,
    source: &'s str,
    stories: Vec<CompiledStoryNode>,
    error: Option<CompilerError>,
}

impl StoryCallFinder<'_> {
    fn record(&mut self, shape: StoryCallShape, span: Span, call: &CallExpression<'_>) {
        if self.error.is_none() && second_argument_object(call).is_none() {
            let mut error = props_argument_error(self.filename);
            let (line, column) = crate::diagnostics::line_column(self.source, span.start as usize);
            error.line = line;
            error.column = column;
            error.context = self
                .source
                .get(span.start as usize..span.end as usize)
                .map(str::to_string);
            self.error = Some(error);
        }
        self.stories.push(CompiledStoryNode { shape, span });
    }
}

impl<'a> Visit<'a> for StoryCallFinder<'_> {
    fn visit_expression_statement(&mut self, it: &ExpressionStatement<'a>) {
        if let Some(call) = statement_story_call(it, self.story_local) {
            self.record(StoryCallShape::Validated, it.span, call);
            return;
        }
        walk::walk_expression_statement(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(shape) = story_call_shape(it, self.story_local) {
            self.record(shape, it.span, it);
            return;
        }
        walk::walk_call_expression(self, it);
    }
}

/// Story call sites of `program` in source order.
pub fn find_story_calls(
    program: &Program<'_>,
    story_local: &str,
    filename: &str,
) -> Result<Vec<CompiledStoryNode>, CompilerError> {
    let mut finder = StoryCallFinder {
        story_local,
        filename,
        source: program.source_text,
        stories: Vec::new(),
        error: None,
    };
    finder.visit_program(program);
    match finder.error {
        Some(error) => Err(error),
        None => Ok(finder.stories),
    }
}

/// Locate the `defineMeta()` call and every story call site of the compiled module.
pub fn extract_compiled_nodes(
    program: &Program<'_>,
    package_name: &str,
    filename: &str,
) -> Result<CompiledNodeSet, CompilerError> {
    let import_local = find_define_meta_import(program, package_name).ok_or_else(|| {
        CompilerError::new(
            INV_META_MISSING,
            &format!(
                "The compiled output does not import defineMeta from '{}'.",
                package_name
            ),
            filename,
            0,
            0,
        )
    })?;

    let meta_declaration = find_unique_define_meta_declaration(program, &import_local, filename)?;
    let Statement::VariableDeclaration(declaration) = &program.body[meta_declaration] else {
        return Err(CompilerError::new(
            INV_META_MISSING,
            "defineMeta() declaration is not a variable declaration.",
            filename,
            0,
            0,
        ));
    };
    define_meta_first_argument(declaration, &import_local, filename)?;
    let meta_call = declaration
        .declarations
        .first()
        .and_then(|d| d.init.as_ref())
        .map(GetSpan::span)
        .unwrap_or(declaration.span);
    let story_local = story_binding_name(declaration, filename)?;
    let stories = find_story_calls(program, &story_local, filename)?;

    Ok(CompiledNodeSet {
        import_local,
        story_local,
        meta_declaration,
        meta_call,
        stories,
    })
}

/// The object literal passed to the compiled `defineMeta()` call.
pub fn meta_object_mut<'r, 'a>(
    program: &'r mut Program<'a>,
    nodes: &CompiledNodeSet,
    filename: &str,
) -> Result<&'r mut ObjectExpression<'a>, CompilerError> {
    match program.body.get_mut(nodes.meta_declaration) {
        Some(Statement::VariableDeclaration(declaration)) => {
            define_meta_first_argument_mut(declaration, &nodes.import_local, filename)
        }
        _ => Err(CompilerError::new(
            INV_META_MISSING,
            "defineMeta() declaration moved while transforming.",
            filename,
            0,
            0,
        )),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MUTATING STORY CALLS
// ═══════════════════════════════════════════════════════════════════════════════

struct StoryCallMutator<'s, F> {
    story_local: &'s str,
    index: usize,
    error: Option<CompilerError>,
    on_story: F,
}

impl<'s, F> StoryCallMutator<'s, F> {
    fn next_index(&mut self) -> Option<usize> {
        let index = self.index;
        self.index += 1;
        self.error.is_none().then_some(index)
    }
}

impl<'a, F> VisitMut<'a> for StoryCallMutator<'_, F>
where
    F: FnMut(usize, StoryNodeRef<'_, 'a>) -> Result<(), CompilerError>,
{
    fn visit_expression_statement(&mut self, it: &mut ExpressionStatement<'a>) {
        if statement_story_call(it, self.story_local).is_some() {
            if let Some(index) = self.next_index() {
                if let Err(error) = (self.on_story)(index, StoryNodeRef::Statement(it)) {
                    self.error = Some(error);
                }
            }
            return;
        }
        walk_mut::walk_expression_statement(self, it);
    }

    fn visit_call_expression(&mut self, it: &mut CallExpression<'a>) {
        if story_call_shape(it, self.story_local).is_some() {
            if let Some(index) = self.next_index() {
                if let Err(error) = (self.on_story)(index, StoryNodeRef::Call(it)) {
                    self.error = Some(error);
                }
            }
            return;
        }
        walk_mut::walk_call_expression(self, it);
    }
}

/// Visit every story call site of `program` in the order [`find_story_calls`]
/// reports them. Stops calling `on_story` after its first error.
/// Returns the number of call sites.
pub fn for_each_story_node<'a, F>(
    program: &mut Program<'a>,
    story_local: &str,
    on_story: F,
) -> Result<usize, CompilerError>
where
    F: FnMut(usize, StoryNodeRef<'_, 'a>) -> Result<(), CompilerError>,
{
    let mut mutator = StoryCallMutator {
        story_local,
        index: 0,
        error: None,
        on_story,
    };
    mutator.visit_program(program);
    match mutator.error {
        Some(error) => Err(error),
        None => Ok(mutator.index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    const PACKAGE: &str = "@storybook/addon-svelte-csf";

    const PROD: &str = r#"import * as $ from 'svelte/internal/client';
import { defineMeta } from '@storybook/addon-svelte-csf';
const { Story } = defineMeta({ title: 'Button' });
export default function Button_stories($$anchor) {
  var fragment = root();
  var node = $.first_child(fragment);
  Story(node, { name: 'Primary' });
  var node_1 = $.sibling(node, 2);
  {
    Story(node_1, {
      name: 'Secondary',
      children: ($$anchor, $$slotProps) => {
        var button = root_1();
        $.append($$anchor, button);
      },
      $$slots: { default: true }
    });
  }
  $.append($$anchor, fragment);
}
"#;

    const DEV: &str = r#"import * as $ from 'svelte/internal/client';
import { defineMeta as dm } from '@storybook/addon-svelte-csf';
const { Story: S } = dm({ title: 'Button' });
export default function Button_stories($$anchor) {
  var node = $.first_child(fragment);
  $.validate_component(S)(node, { name: 'Primary' });
  if (condition) {
    $.validate_component(S)(node_1, { name: 'Conditional' });
  }
  $.each(node_2, 17, () => items, $.index, ($$anchor, item) => {
    $.validate_component(S)($$anchor, { name: 'Looped' });
  });
}
"#;

    fn with_program<R>(source: &str, f: impl for<'a> FnOnce(&mut Program<'a>) -> R) -> R {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        assert!(ret.errors.is_empty(), "{:?}", ret.errors);
        let mut program = ret.program;
        f(&mut program)
    }

    fn story_name(object: &ObjectExpression<'_>) -> Option<String> {
        crate::ast_utils::string_property_value("name", object)
    }

    #[test]
    fn test_extract_production_calls() {
        with_program(PROD, |program| {
            let nodes = extract_compiled_nodes(program, PACKAGE, "a.svelte").unwrap();
            assert_eq!(nodes.import_local, "defineMeta");
            assert_eq!(nodes.story_local, "Story");
            assert_eq!(nodes.meta_declaration, 2);
            assert_eq!(nodes.stories.len(), 2);
            assert!(nodes.stories.iter().all(|s| s.shape == StoryCallShape::Plain));
            assert!(nodes.stories[0].span.start < nodes.stories[1].span.start);
        });
    }

    #[test]
    fn test_extract_development_calls() {
        with_program(DEV, |program| {
            let nodes = extract_compiled_nodes(program, PACKAGE, "a.svelte").unwrap();
            assert_eq!(nodes.import_local, "dm");
            assert_eq!(nodes.story_local, "S");
            assert_eq!(nodes.stories.len(), 3);
            assert!(nodes
                .stories
                .iter()
                .all(|s| s.shape == StoryCallShape::Validated));
        });
    }

    #[test]
    fn test_props_accessor_covers_both_shapes() {
        for (source, local, expected) in [
            (PROD, "Story", vec!["Primary", "Secondary"]),
            (DEV, "S", vec!["Primary", "Conditional", "Looped"]),
        ] {
            with_program(source, |program| {
                let mut names = Vec::new();
                let count = for_each_story_node(program, local, |index, node| {
                    let props = story_props_object_expression(node, "a.svelte")?;
                    assert_eq!(index, names.len());
                    names.push(story_name(props).unwrap_or_default());
                    Ok(())
                })
                .unwrap();
                assert_eq!(count, expected.len());
                assert_eq!(names, expected);
            });
        }
    }

    #[test]
    fn test_non_object_props_is_fatal() {
        let source = "import { defineMeta } from '@storybook/addon-svelte-csf';\nconst { Story } = defineMeta({});\nStory(node, props);";
        with_program(source, |program| {
            let err = extract_compiled_nodes(program, PACKAGE, "Bad.stories.svelte").unwrap_err();
            assert_eq!(err.code, INV_STORY_PROPS);
            assert_eq!(err.file, "Bad.stories.svelte");
            assert_eq!(err.line, 3);
            assert_eq!(err.context.as_deref(), Some("Story(node, props)"));
        });
    }

    #[test]
    fn test_missing_compiled_import() {
        with_program("const { Story } = defineMeta({});", |program| {
            let err = extract_compiled_nodes(program, PACKAGE, "a.svelte").unwrap_err();
            assert_eq!(err.code, INV_META_MISSING);
        });
    }

    #[test]
    fn test_meta_object_mut() {
        with_program(PROD, |program| {
            let nodes = extract_compiled_nodes(program, PACKAGE, "a.svelte").unwrap();
            let object = meta_object_mut(program, &nodes, "a.svelte").unwrap();
            assert_eq!(
                crate::ast_utils::string_property_value("title", object),
                Some("Button".to_string())
            );
        });
    }

    #[test]
    fn test_unrelated_calls_are_ignored() {
        assert!(with_program("Other(node, {}); $.validate_component(Other)(node, {});", |program| {
            find_story_calls(program, "Story", "a").unwrap().is_empty()
        }));
    }
}
