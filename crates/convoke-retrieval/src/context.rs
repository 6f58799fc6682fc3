//! Context assembly.
//!
//! Retrieved snippets are concatenated in descending score order under a
//! character budget and prepended to the prompt as a system-role
//! instruction.  Snippets that would overflow the budget are trimmed at a
//! char boundary; anything after the budget is dropped.

use crate::store::SearchHit;

/// System instruction placed ahead of the assembled context.
pub const CONTEXT_INSTRUCTION: &str =
    "Answer using the following context. If the context is insufficient, say so.";

/// Separator between snippets.
const SNIPPET_SEPARATOR: &str = "\n---\n";

/// Assemble retrieved texts into one context block.
///
/// `hits` are assumed best-first (the store contract).  Returns the block
/// without the instruction header; [`build_system_prompt`] adds it.
pub fn assemble_context(hits: &[SearchHit], budget_chars: usize) -> String {
    let mut out = String::new();

    for hit in hits {
        if hit.text.is_empty() {
            continue;
        }

        let separator = if out.is_empty() { "" } else { SNIPPET_SEPARATOR };
        let remaining = budget_chars.saturating_sub(out.chars().count() + separator.chars().count());
        if remaining == 0 {
            break;
        }

        out.push_str(separator);
        if hit.text.chars().count() <= remaining {
            out.push_str(&hit.text);
        } else {
            out.extend(hit.text.chars().take(remaining));
            break;
        }
    }

    out
}

/// The full system prompt: instruction plus assembled context.
pub fn build_system_prompt(context: &str) -> String {
    format!("{CONTEXT_INSTRUCTION}\n\n{context}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(score: f32, text: &str) -> SearchHit {
        SearchHit {
            score,
            text: text.into(),
            metadata: json!({"text": text}),
        }
    }

    #[test]
    fn concatenates_in_given_order() {
        let hits = vec![hit(0.9, "first snippet"), hit(0.8, "second snippet")];
        let context = assemble_context(&hits, 1_000);
        assert_eq!(context, "first snippet\n---\nsecond snippet");
    }

    #[test]
    fn budget_truncates_overflowing_snippet() {
        let hits = vec![hit(0.9, "abcdefghij"), hit(0.8, "never included")];
        let context = assemble_context(&hits, 6);
        assert_eq!(context, "abcdef");
    }

    #[test]
    fn empty_snippets_are_skipped() {
        let hits = vec![hit(0.9, ""), hit(0.8, "real")];
        assert_eq!(assemble_context(&hits, 100), "real");
    }

    #[test]
    fn multibyte_text_trims_at_char_boundary() {
        let hits = vec![hit(0.9, "αβγδε")];
        let context = assemble_context(&hits, 3);
        assert_eq!(context, "αβγ");
    }

    #[test]
    fn system_prompt_carries_instruction() {
        let prompt = build_system_prompt("ctx");
        assert!(prompt.starts_with(CONTEXT_INSTRUCTION));
        assert!(prompt.ends_with("ctx"));
    }
}
