//! Object-literal helpers shared by every mutator.
//!
//! All functions operate only on the node passed in. Lookups match plain
//! identifier keys (`{ parameters: ... }`); computed, string-literal and
//! spread entries never match.

use oxc_allocator::Vec as ArenaVec;
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_span::SPAN;

pub const PARAMETERS: &str = "parameters";
pub const DOCS: &str = "docs";
pub const DESCRIPTION: &str = "description";

/// A documentation property exists but does not hold an object literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyShapeError {
    #[error("property `{key}` must be an object literal")]
    NotAnObject { key: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn create_property<'a>(
    ast: AstBuilder<'a>,
    key: &str,
    value: Expression<'a>,
) -> ObjectPropertyKind<'a> {
    let key_atom = ast.allocator.alloc_str(key);
    ast.object_property_kind_object_property(
        SPAN,
        PropertyKind::Init,
        PropertyKey::StaticIdentifier(ast.alloc(ast.identifier_name(SPAN, key_atom))),
        value,
        false,
        false,
        false,
    )
}

pub fn create_object_expression<'a>(
    ast: AstBuilder<'a>,
    properties: Option<ArenaVec<'a, ObjectPropertyKind<'a>>>,
) -> Expression<'a> {
    ast.expression_object(SPAN, properties.unwrap_or_else(|| ast.vec()))
}

pub fn create_string_literal<'a>(ast: AstBuilder<'a>, value: &str) -> Expression<'a> {
    let value_atom = ast.allocator.alloc_str(value);
    ast.expression_string_literal(SPAN, value_atom, None)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOKUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Index of the first property named `key`.
pub fn find_property_index(key: &str, object: &ObjectExpression<'_>) -> Option<usize> {
    object.properties.iter().position(|property| match property {
        ObjectPropertyKind::ObjectProperty(p) if !p.computed => {
            matches!(&p.key, PropertyKey::StaticIdentifier(id) if id.name.as_str() == key)
        }
        _ => false,
    })
}

pub fn find_property<'r, 'a>(
    key: &str,
    object: &'r ObjectExpression<'a>,
) -> Option<&'r ObjectProperty<'a>> {
    let index = find_property_index(key, object)?;
    match &object.properties[index] {
        ObjectPropertyKind::ObjectProperty(p) => Some(&**p),
        ObjectPropertyKind::SpreadProperty(_) => None,
    }
}

/// Object literal held by property `key`, `None` when the property is absent.
pub fn property_object_value<'r, 'a>(
    key: &str,
    object: &'r ObjectExpression<'a>,
) -> Result<Option<&'r ObjectExpression<'a>>, PropertyShapeError> {
    let Some(property) = find_property(key, object) else {
        return Ok(None);
    };
    match &property.value {
        Expression::ObjectExpression(value) => Ok(Some(&**value)),
        _ => Err(PropertyShapeError::NotAnObject {
            key: key.to_string(),
        }),
    }
}

pub fn parameters_property_value<'r, 'a>(
    object: &'r ObjectExpression<'a>,
) -> Result<Option<&'r ObjectExpression<'a>>, PropertyShapeError> {
    property_object_value(PARAMETERS, object)
}

pub fn docs_property_value<'r, 'a>(
    object: &'r ObjectExpression<'a>,
) -> Result<Option<&'r ObjectExpression<'a>>, PropertyShapeError> {
    match parameters_property_value(object)? {
        Some(parameters) => property_object_value(DOCS, parameters),
        None => Ok(None),
    }
}

pub fn description_property_value<'r, 'a>(
    object: &'r ObjectExpression<'a>,
) -> Result<Option<&'r ObjectExpression<'a>>, PropertyShapeError> {
    match docs_property_value(object)? {
        Some(docs) => property_object_value(DESCRIPTION, docs),
        None => Ok(None),
    }
}

/// String value of property `key`, when it is a string literal.
pub fn string_property_value(key: &str, object: &ObjectExpression<'_>) -> Option<String> {
    match &find_property(key, object)?.value {
        Expression::StringLiteral(s) => Some(s.value.to_string()),
        Expression::TemplateLiteral(t) if t.expressions.is_empty() && t.quasis.len() == 1 => t
            .quasis[0]
            .value
            .cooked
            .as_ref()
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENSURE-PATH
// ═══════════════════════════════════════════════════════════════════════════════

/// Object literal held by property `key`, created (empty) when absent.
/// An existing property is reused, never duplicated.
pub fn ensure_object_property<'r, 'a>(
    ast: AstBuilder<'a>,
    key: &str,
    object: &'r mut ObjectExpression<'a>,
) -> Result<&'r mut ObjectExpression<'a>, PropertyShapeError> {
    let index = match find_property_index(key, object) {
        Some(index) => index,
        None => {
            object
                .properties
                .push(create_property(ast, key, create_object_expression(ast, None)));
            object.properties.len() - 1
        }
    };

    match &mut object.properties[index] {
        ObjectPropertyKind::ObjectProperty(property) => match &mut property.value {
            Expression::ObjectExpression(value) => Ok(&mut **value),
            _ => Err(PropertyShapeError::NotAnObject {
                key: key.to_string(),
            }),
        },
        ObjectPropertyKind::SpreadProperty(_) => Err(PropertyShapeError::NotAnObject {
            key: key.to_string(),
        }),
    }
}

pub fn ensure_parameters<'r, 'a>(
    ast: AstBuilder<'a>,
    object: &'r mut ObjectExpression<'a>,
) -> Result<&'r mut ObjectExpression<'a>, PropertyShapeError> {
    ensure_object_property(ast, PARAMETERS, object)
}

pub fn ensure_docs<'r, 'a>(
    ast: AstBuilder<'a>,
    object: &'r mut ObjectExpression<'a>,
) -> Result<&'r mut ObjectExpression<'a>, PropertyShapeError> {
    let parameters = ensure_parameters(ast, object)?;
    ensure_object_property(ast, DOCS, parameters)
}

/// `parameters.docs.description`, creating each missing level.
pub fn ensure_description<'r, 'a>(
    ast: AstBuilder<'a>,
    object: &'r mut ObjectExpression<'a>,
) -> Result<&'r mut ObjectExpression<'a>, PropertyShapeError> {
    let docs = ensure_docs(ast, object)?;
    ensure_object_property(ast, DESCRIPTION, docs)
}
