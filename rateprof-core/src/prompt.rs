//! Prompt assembly: the fixed instructions, the retrieval summary, and the
//! augmented message list handed to the completion service.

use std::fmt::Write;

use crate::models::{ChatMessage, RetrievalMatch};

pub const SYSTEM_PROMPT: &str = r#"You are the Rate My Professor assistant. Students describe what they are
looking for in a professor: a subject, a teaching style, how assignments are
graded, research interests, or anything else that matters to them.

Every student message is followed by the three professors that best match it,
retrieved automatically from a database of reviews. Use those results to
answer:

- Recommend the matching professors in the order they were retrieved.
- For each one give the name, the subject, the star rating, and a short
  summary of why they fit the request, drawing on the review when there is one.
- If none of the retrieved professors fit, say so plainly and suggest how the
  student could rephrase the question.
- Never invent professors, ratings or reviews that are not in the results.

Keep answers friendly and concise, and invite the student to ask follow-up
questions about any of the professors.
"#;

pub const RESULTS_HEADER: &str = "\n\nReturned results from vector db (done automatically):";

/// Render matches as one block per professor, in retrieval order. With no
/// matches only the header remains.
pub fn format_matches(matches: &[RetrievalMatch]) -> String {
    let mut out = String::from(RESULTS_HEADER);
    for m in matches {
        out.push_str("\n\n");
        let _ = writeln!(out, "Professor: {}", m.id);
        if let Some(review) = &m.metadata.review {
            let _ = writeln!(out, "Review: {}", review);
        }
        let _ = writeln!(out, "Subject: {}", m.metadata.subject);
        let _ = write!(out, "Stars: {}", m.metadata.stars);
    }
    out
}

/// System prompt, then prior history untouched, then the latest user text
/// with `summary` appended.
pub fn augment(
    system_prompt: &str,
    history: &[ChatMessage],
    latest_content: &str,
    summary: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(format!("{}{}", latest_content, summary)));
    messages
}
