//! Comment text normalization.
//!
//! Descriptions inferred from comments are inserted as plain strings. The only
//! transformations are removing the comment delimiters (and the `*` gutter of
//! `/** */` doc comments) and removing common indentation.

/// Remove the common leading indentation of `text`, then trim it.
///
/// Lines that start without whitespace do not take part in computing the common
/// indentation, so a comment whose first line follows its opening delimiter
/// directly still dedents its continuation lines.
pub fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();

    let min_indent = lines
        .iter()
        .filter_map(|line| {
            let indent = leading_whitespace(line);
            let rest = &line[indent..];
            if indent > 0 && !rest.trim().is_empty() {
                Some(indent)
            } else {
                None
            }
        })
        .min();

    let Some(min_indent) = min_indent else {
        return text.trim().to_string();
    };

    lines
        .iter()
        .map(|line| {
            let strip = leading_whitespace(line).min(min_indent);
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Byte length of the leading run of spaces and tabs.
fn leading_whitespace(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Text content of a JavaScript comment, given its full source slice.
pub fn js_comment_text(raw: &str) -> String {
    if let Some(body) = raw.strip_prefix("//") {
        return body.trim_end_matches('\r').to_string();
    }

    let inner = raw
        .strip_prefix("/*")
        .and_then(|rest| rest.strip_suffix("*/"))
        .unwrap_or(raw);

    match inner.strip_prefix('*') {
        Some(doc) => doc
            .split('\n')
            .map(|line| {
                let trimmed = line.trim_start_matches([' ', '\t']);
                match trimmed.strip_prefix('*') {
                    Some(rest) if !trimmed.starts_with("*/") => rest,
                    _ => line,
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => inner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_uniform_indent() {
        assert_eq!(dedent("  line1\n  line2"), "line1\nline2");
    }

    #[test]
    fn test_dedent_keeps_relative_indent() {
        assert_eq!(dedent("\n    a\n      b\n    c\n"), "a\n  b\nc");
    }

    #[test]
    fn test_dedent_first_line_without_indent() {
        assert_eq!(dedent("Title\n    more text\n    end"), "Title\nmore text\nend");
    }

    #[test]
    fn test_dedent_single_line() {
        assert_eq!(dedent(" First story "), "First story");
        assert_eq!(dedent(""), "");
    }

    #[test]
    fn test_line_comment_text() {
        assert_eq!(dedent(&js_comment_text("// Some description")), "Some description");
    }

    #[test]
    fn test_block_comment_text() {
        assert_eq!(dedent(&js_comment_text("/* plain block */")), "plain block");
    }

    #[test]
    fn test_doc_comment_gutter_removed() {
        let raw = "/**\n * This is a button.\n *   - indented item\n */";
        assert_eq!(dedent(&js_comment_text(raw)), "This is a button.\n  - indented item");
    }
}
