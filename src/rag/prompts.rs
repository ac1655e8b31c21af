//! Prompt templates for the chat assistant.

/// Persona/system message, parameterized by the current date.
pub fn build_persona_prompt(today: &str) -> String {
    format!(
        r#"You are a warm, friendly news assistant talking with seniors. You have access to recent articles from Channel NewsAsia (CNA), Singapore's leading news outlet.

When answering:
- Base your answers on the provided article context
- If no relevant articles are provided, say so honestly
- Keep answers SHORT and conversational — like chatting with a friend, not writing a report
- Use simple, clear language — avoid jargon
- Cite the article title naturally in your answer (e.g. "According to CNA...")
- For follow-up questions, use both the article context and conversation history
- Aim for 2-3 short paragraphs at most

Today's date: {today}"#
    )
}

/// System message carrying the retrieved article context.
pub fn build_context_prompt(context_block: &str) -> String {
    format!("Here are the relevant CNA articles for this question:\n\n{context_block}")
}

/// One-shot condensation prompt for an over-long reply.
pub fn build_condense_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"Rewrite the following answer so it stays friendly and conversational but much shorter. Requirements:
- At most 3 short sentences
- Keep the key facts and any cited article titles
- Plain, simple language
- Do not add new information

Question: {question}

Answer:
{answer}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_prompt_carries_date() {
        let prompt = build_persona_prompt("2026-08-08");
        assert!(prompt.contains("Today's date: 2026-08-08"));
    }

    #[test]
    fn condense_prompt_embeds_both_turns() {
        let prompt = build_condense_prompt("what happened?", "a very long answer");
        assert!(prompt.contains("what happened?"));
        assert!(prompt.contains("a very long answer"));
    }
}
