//! Answer prompt assembly.
//!
//! Builds the single prompt handed to the language model: numbered
//! source excerpts, the user's question, and the grounding instruction
//! set. Keeping this in core means the exact prompt is testable without
//! any model in the loop.

use crate::models::ScoredPassage;

/// Reply used when retrieval finds nothing to ground an answer in.
/// Also the phrasing the model is instructed to fall back to.
pub const NO_CONTEXT_REPLY: &str =
    "I don't have enough information in the provided sources to answer that.";

/// Build the answer-generation prompt from retrieved passages.
///
/// Excerpts are numbered `[1]..[k]` in retrieval order so the model can
/// cite them. The instruction block pins style, length, and the
/// grounding-only-in-context rule.
pub fn build_answer_prompt(question: &str, passages: &[ScoredPassage]) -> String {
    let mut prompt = String::from("You answer questions using only the numbered source excerpts below.\n\n");

    for (i, p) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n\n", i + 1, p.chunk.text.trim()));
    }

    prompt.push_str(&format!("Question: {}\n\n", question.trim()));
    prompt.push_str("Instructions:\n");
    prompt.push_str("- Answer in plain prose, at most 6 sentences.\n");
    prompt.push_str("- Use only facts stated in the excerpts; do not add outside knowledge.\n");
    prompt.push_str("- Cite the excerpt numbers you used, like [2].\n");
    prompt.push_str(&format!(
        "- If the excerpts do not contain the answer, reply exactly: \"{}\"\n",
        NO_CONTEXT_REPLY
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassageChunk;

    fn passage(seq: i64, text: &str) -> ScoredPassage {
        ScoredPassage {
            chunk: PassageChunk {
                document_id: "d1".to_string(),
                seq,
                text: text.to_string(),
                hash: String::new(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_prompt_numbers_excerpts_in_order() {
        let prompt = build_answer_prompt(
            "What is the capital?",
            &[passage(0, "Paris is the capital of France."), passage(1, "France is in Europe.")],
        );
        let first = prompt.find("[1] Paris is the capital").unwrap();
        let second = prompt.find("[2] France is in Europe").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_prompt_contains_question_and_refusal() {
        let prompt = build_answer_prompt("What is the capital?", &[passage(0, "Some text.")]);
        assert!(prompt.contains("Question: What is the capital?"));
        assert!(prompt.contains(NO_CONTEXT_REPLY));
        assert!(prompt.contains("only facts stated in the excerpts"));
    }

    #[test]
    fn test_prompt_trims_passage_whitespace() {
        let prompt = build_answer_prompt("q", &[passage(0, "  padded text  ")]);
        assert!(prompt.contains("[1] padded text\n"));
    }
}
