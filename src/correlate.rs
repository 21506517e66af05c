//! Position-based pairing of source stories with compiled call sites.
//!
//! The compiler emits story calls in the same order the `<Story />` elements
//! appear in the source, so the i-th source story belongs to the i-th call site.
//! There is no other identity shared by the two trees.

use crate::compiled::CompiledStoryNode;
use crate::diagnostics::{CompilerError, INV_CORRELATION};
use crate::parse::SourceStory;

#[derive(Debug, Clone, Copy)]
pub struct StoryPair<'s> {
    pub index: usize,
    pub source: &'s SourceStory,
    pub compiled: CompiledStoryNode,
}

pub fn correlate<'s>(
    source: &'s [SourceStory],
    compiled: &[CompiledStoryNode],
    filename: &str,
) -> Result<Vec<StoryPair<'s>>, CompilerError> {
    if source.len() != compiled.len() {
        let names: Vec<&str> = source.iter().map(|s| s.label().unwrap_or("<unnamed>")).collect();
        return Err(CompilerError::with_details(
            INV_CORRELATION,
            &format!(
                "Found {} <Story /> component(s) in the source but {} in the compiled output.",
                source.len(),
                compiled.len()
            ),
            filename,
            0,
            0,
            Some(format!("source stories: [{}]", names.join(", "))),
            vec![
                "Declare every <Story /> at a position the compiler renders unconditionally.".to_string(),
                "Pass the compiled output of this exact source.".to_string(),
            ],
        ));
    }

    Ok(source
        .iter()
        .zip(compiled.iter().copied())
        .enumerate()
        .map(|(index, (source, compiled))| StoryPair {
            index,
            source,
            compiled,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::StoryCallShape;
    use crate::parse::MarkupSpan;
    use oxc_span::Span;

    fn source_story(name: &str, start: usize) -> SourceStory {
        SourceStory {
            name: Some(name.to_string()),
            export_name: None,
            comment: None,
            raw_children: String::new(),
            span: MarkupSpan::new(start, start + 10),
        }
    }

    fn call(start: u32) -> CompiledStoryNode {
        CompiledStoryNode {
            shape: StoryCallShape::Plain,
            span: Span::new(start, start + 5),
        }
    }

    #[test]
    fn test_pairs_in_order() {
        let source = vec![source_story("A", 0), source_story("B", 20)];
        let compiled = vec![call(100), call(300)];
        let pairs = correlate(&source, &compiled, "a.svelte").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].source.name.as_deref(), Some("A"));
        assert_eq!(pairs[0].compiled.span.start, 100);
        assert_eq!(pairs[1].index, 1);
        assert_eq!(pairs[1].source.name.as_deref(), Some("B"));
        assert_eq!(pairs[1].compiled.span.start, 300);
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let source = vec![source_story("A", 0), source_story("B", 20)];
        let err = correlate(&source, &[call(100)], "Button.stories.svelte").unwrap_err();
        assert_eq!(err.code, INV_CORRELATION);
        assert_eq!(err.file, "Button.stories.svelte");
        assert_eq!(err.context.as_deref(), Some("source stories: [A, B]"));
    }

    #[test]
    fn test_empty_is_fine() {
        assert!(correlate(&[], &[], "a.svelte").unwrap().is_empty());
    }
}
