#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_META_MISSING: &str = "SCSF-META-MISSING";
pub const INV_META_DUPLICATE: &str = "SCSF-META-DUPLICATE";
pub const INV_META_ARGUMENT: &str = "SCSF-META-ARGUMENT";
pub const INV_STORY_BINDING: &str = "SCSF-STORY-BINDING";
pub const INV_STORY_PROPS: &str = "SCSF-STORY-PROPS";
pub const INV_PROPERTY_SHAPE: &str = "SCSF-PROPERTY-SHAPE";
pub const INV_CORRELATION: &str = "SCSF-CORRELATION";
pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const IO_ERROR: &str = "IO_ERROR";

pub const WARN_DESCRIPTION_EXPLICIT: &str = "SCSF-DESCRIPTION-EXPLICIT";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_META_MISSING => "Every stories file declares its metadata with exactly one defineMeta() call.",
        INV_META_DUPLICATE => "Every stories file declares its metadata with exactly one defineMeta() call.",
        INV_META_ARGUMENT => {
            "defineMeta() is invoked through its imported binding with a single object literal."
        }
        INV_STORY_BINDING => "The Story component is obtained by destructuring the defineMeta() result.",
        INV_STORY_PROPS => "Every compiled <Story /> invocation receives its props as an object literal.",
        INV_PROPERTY_SHAPE => {
            "parameters, parameters.docs and parameters.docs.description are object literals."
        }
        INV_CORRELATION => "Every <Story /> in the source has exactly one compiled invocation, in order.",
        PARSE_ERROR => "Source and compiled code are syntactically valid.",
        IO_ERROR => "Stories files are readable.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Fatal, file-scoped failure. Aborts the transform of one stories file.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} Stories file: {file}")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        let error_type = match code {
            PARSE_ERROR => "PARSE_ERROR",
            IO_ERROR => "IO_ERROR",
            _ => "STRUCTURAL_INVARIANT_VIOLATION",
        };
        CompilerError {
            code: code.to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    /// Error positioned at a byte offset of `source`.
    pub fn at_offset(code: &str, message: &str, file: &str, source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        Self::new(code, message, file, line, column)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER WARNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-fatal policy diagnostic. Processing continues after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerWarning {
    pub code: String,
    pub message: String,
    pub file: String,
    /// Story name when the warning concerns one `<Story />` and its name is static.
    pub story: Option<String>,
}

impl std::fmt::Display for CompilerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Stories file: {}", self.message, self.file)
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() as u32 + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    (line, (offset - line_start) as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let source = "a\nbc\ndef";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 3), (2, 2));
        assert_eq!(line_column(source, 5), (3, 1));
        assert_eq!(line_column(source, 100), (3, 4));
    }

    #[test]
    fn test_error_carries_guarantee_and_file() {
        let err = CompilerError::new(INV_CORRELATION, "Story count mismatch.", "Button.stories.svelte", 1, 1);
        assert_eq!(err.error_type, "STRUCTURAL_INVARIANT_VIOLATION");
        assert!(err.guarantee.contains("in order"));
        assert_eq!(
            err.to_string(),
            "[SCSF-CORRELATION] Story count mismatch. Stories file: Button.stories.svelte"
        );
    }

    #[test]
    fn test_error_serializes_camel_case() {
        let err = CompilerError::new(PARSE_ERROR, "boom", "a.svelte", 2, 3);
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["errorType"], "PARSE_ERROR");
        assert_eq!(value["line"], 2);
    }
}
