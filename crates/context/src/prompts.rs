//! Prompt catalogue
//!
//! Every workflow stage selects its template by ([`PromptKind`], [`ModelFamily`]).
//! The instruction text is shared across families; the family only decides
//! the framing (Llama chat headers vs. a plain prompt with an answer cue).

use hybridrag_common::ModelFamily;

/// Workflow stage a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    ReformQuestion,
    SummarizeConversation,
    ExtractEntities,
    GradeRelevance,
    GradeHallucination,
    GradeUsefulness,
    GroundedAnswer,
    FallbackAnswer,
}

impl PromptKind {
    pub const ALL: [PromptKind; 8] = [
        PromptKind::ReformQuestion,
        PromptKind::SummarizeConversation,
        PromptKind::ExtractEntities,
        PromptKind::GradeRelevance,
        PromptKind::GradeHallucination,
        PromptKind::GradeUsefulness,
        PromptKind::GroundedAnswer,
        PromptKind::FallbackAnswer,
    ];

    /// Variables a template of this kind expects
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            PromptKind::ReformQuestion => &["chat_history", "question"],
            PromptKind::SummarizeConversation => &["summary", "new_lines"],
            PromptKind::ExtractEntities => &["question"],
            PromptKind::GradeRelevance => &["document", "question"],
            PromptKind::GradeHallucination => {
                &["generation", "documents", "relationships", "summary"]
            }
            PromptKind::GradeUsefulness => &["generation", "question"],
            PromptKind::GroundedAnswer => &["context", "relationships", "question"],
            PromptKind::FallbackAnswer => &["summary", "history", "question"],
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            PromptKind::ReformQuestion => REFORM_QUESTION,
            PromptKind::SummarizeConversation => SUMMARIZE_CONVERSATION,
            PromptKind::ExtractEntities => EXTRACT_ENTITIES,
            PromptKind::GradeRelevance => GRADE_RELEVANCE,
            PromptKind::GradeHallucination => GRADE_HALLUCINATION,
            PromptKind::GradeUsefulness => GRADE_USEFULNESS,
            PromptKind::GroundedAnswer => GROUNDED_ANSWER,
            PromptKind::FallbackAnswer => FALLBACK_ANSWER,
        }
    }

    /// Text the model continues from
    fn cue(&self) -> &'static str {
        match self {
            PromptKind::ReformQuestion => "Standalone question:",
            PromptKind::SummarizeConversation => "New summary:",
            PromptKind::ExtractEntities => "Entities:",
            _ => "Answer:",
        }
    }
}

const REFORM_QUESTION: &str = "\
You are given the recent history of a conversation and a follow up input from the user.
If the follow up input refers to something in the history, rewrite it as a standalone
question that can be understood without the history. If it does not, return the input unchanged.

Return only the question. No preamble, no explanation.

Example:
Chat history:
Human: Have you heard of Ada Lovelace?
AI: Yes. She wrote what is considered the first computer program, for Babbage's Analytical Engine.
Human: When was she born?
AI: She was born in 1815.

Follow up input: And Charles Babbage?

Standalone question: When was Charles Babbage born?

Chat history:
{chat_history}

Follow up input: {question}";

const SUMMARIZE_CONVERSATION: &str = "\
Progressively summarize the conversation. Extend the current summary with the new lines
and return the new summary only. No preamble, no explanation.

Example:
Current summary:
The human asks which database the team uses. The AI says it is PostgreSQL.

New lines of conversation:
Human: Why PostgreSQL?
AI: Because it supports vector search through the pgvector extension.

New summary:
The human asks which database the team uses. The AI says it is PostgreSQL, chosen because
it supports vector search through the pgvector extension.

Current summary:
{summary}

New lines of conversation:
{new_lines}";

const EXTRACT_ENTITIES: &str = "\
You extract named entities from a question. Return a single JSON list of strings and
nothing else.

Examples:
question: Who founded Northwind Traders?
entities: [\"Northwind Traders\"]

question: Did Alice work with Bob on the audit?
entities: [\"Alice\", \"Bob\"]

question: {question}";

const GRADE_RELEVANCE: &str = "\
You grade whether a retrieved document is relevant to a user question. A document that
contains keywords or topics related to the question is relevant; this is a loose filter
meant only to drop retrieval mistakes.

Document:
------- BEGIN DOCUMENT -------
{document}
------- END DOCUMENT -------

Question: {question}

Reply with a JSON object with a single key 'score' whose value is 'yes' or 'no'.
No preamble, no explanation.";

const GRADE_HALLUCINATION: &str = "\
You grade whether an answer is grounded in and supported by the given evidence: retrieved
context, relationships between entities and a summary of the conversation so far.

Answer:
------- BEGIN ANSWER -------
{generation}
------- END ANSWER -------

Evidence:
------- BEGIN EVIDENCE -------
{documents}

{relationships}

{summary}
------- END EVIDENCE -------

Reply with a JSON object with a single key 'score' whose value is 'yes' if the answer is
supported by the evidence and 'no' otherwise. No preamble, no explanation.";

const GRADE_USEFULNESS: &str = "\
You grade whether an answer resolves a question.

Answer:
------- BEGIN ANSWER -------
{generation}
------- END ANSWER -------

Question:
------- BEGIN QUESTION -------
{question}
------- END QUESTION -------

Reply with a JSON object with a single key 'score' whose value is 'yes' if the answer is
useful to resolve the question and 'no' otherwise. No preamble, no explanation.";

const GROUNDED_ANSWER: &str = "\
You are an assistant for question answering. Answer the question using the context below
as if it were your own knowledge; do not mention that a context was provided. If the
context does not contain the answer, say that you don't know. Be as detailed as the
context allows.

Context:
------- BEGIN CONTEXT -------
{context}

{relationships}
------- END CONTEXT -------

Question: {question}";

const FALLBACK_ANSWER: &str = "\
You are an assistant for question answering. Use the conversation summary and the recent
messages below for context when they help. If you don't know the answer, say so. Be as
detailed as you can.

Conversation summary:
------- BEGIN SUMMARY -------
{summary}
------- END SUMMARY -------

Recent messages:
------- BEGIN HISTORY -------
{history}
------- END HISTORY -------

Question: {question}";

/// Build the template text for a stage and model family
pub fn template(kind: PromptKind, family: ModelFamily) -> String {
    match family {
        ModelFamily::Llama => format!(
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{}<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n",
            kind.instructions()
        ),
        ModelFamily::Other => format!("{}\n\n{}", kind.instructions(), kind.cue()),
    }
}

/// Render a prompt, substituting `{name}` placeholders in one pass.
///
/// Substituted values are never re-scanned, so user text containing
/// `{question}` stays literal. Unknown placeholders are left as-is.
pub fn render(kind: PromptKind, family: ModelFamily, vars: &[(&str, &str)]) -> String {
    let template = template(kind, family);
    let capacity = template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>();
    let mut out = String::with_capacity(capacity);
    let mut rest = template.as_str();

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_template_declares_its_variables() {
        for kind in PromptKind::ALL {
            for family in [ModelFamily::Llama, ModelFamily::Other] {
                let text = template(kind, family);
                for var in kind.variables() {
                    assert!(
                        text.contains(&format!("{{{}}}", var)),
                        "{:?}/{:?} is missing {{{}}}",
                        kind,
                        family,
                        var
                    );
                }
            }
        }
    }

    #[test]
    fn test_family_changes_framing_only() {
        let llama = template(PromptKind::GradeRelevance, ModelFamily::Llama);
        let other = template(PromptKind::GradeRelevance, ModelFamily::Other);

        assert!(llama.starts_with("<|begin_of_text|>"));
        assert!(!other.contains("<|"));
        assert!(other.ends_with("Answer:"));
        assert!(llama.contains(GRADE_RELEVANCE));
        assert!(other.contains(GRADE_RELEVANCE));
    }

    #[test]
    fn test_render_is_single_pass() {
        let prompt = render(
            PromptKind::GradeUsefulness,
            ModelFamily::Other,
            &[("generation", "use {question} literally"), ("question", "What?")],
        );

        assert!(prompt.contains("use {question} literally"));
        assert!(prompt.contains("What?"));
    }

    #[test]
    fn test_render_keeps_literal_braces() {
        let prompt = render(
            PromptKind::ExtractEntities,
            ModelFamily::Other,
            &[("question", "what is {x} in \"a}b\"?")],
        );
        assert!(prompt.contains("what is {x} in \"a}b\"?"));
        assert!(prompt.contains("[\"Alice\", \"Bob\"]"));
    }
}
