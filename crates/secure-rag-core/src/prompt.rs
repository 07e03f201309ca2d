//! Prompt assembly for grounded chat.

use crate::models::{ChatMessage, DocumentChunk};

const SYSTEM_PREAMBLE: &str = "You are a secure AI assistant for an enterprise company.
Use the following pieces of retrieved context to answer the user's question.
If the answer is not in the context, say that you don't know based on internal documents.
Always cite the source filename when using information.";

/// Render one retrieved chunk as a labelled context block.
pub fn render_source_block(chunk: &DocumentChunk) -> String {
    format!(
        "--- SOURCE ({}) ---\n{}",
        chunk.metadata.source_label(),
        chunk.content
    )
}

/// Build the system prompt from retrieved chunks, kept in rank order.
pub fn build_system_prompt(context: &[DocumentChunk]) -> String {
    let context_str = context
        .iter()
        .map(render_source_block)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{}\n\nCONTEXT:\n{}\n", SYSTEM_PREAMBLE, context_str)
}

/// Assemble the message list sent to the model: the system prompt, the
/// prior history verbatim, then the current query as a user message.
pub fn assemble_messages(
    system_prompt: String,
    history: &[ChatMessage],
    query: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(query));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, Role};

    #[test]
    fn test_blocks_cite_filename_in_rank_order() {
        let ctx = vec![
            DocumentChunk::new("d1", 0, "VPN is mandatory.", ChunkMetadata::for_file("security.pdf")),
            DocumentChunk::new("d2", 3, "Lunch is at noon.", ChunkMetadata::default()),
        ];
        let prompt = build_system_prompt(&ctx);
        let expected_context = "--- SOURCE (security.pdf) ---\nVPN is mandatory.\n\n--- SOURCE (unknown source) ---\nLunch is at noon.";
        assert!(prompt.contains(expected_context), "{}", prompt);
        assert!(prompt.starts_with("You are a secure AI assistant"));
        assert!(prompt.contains("don't know"));
        assert!(prompt.contains("cite the source filename"));
    }

    #[test]
    fn test_empty_context_still_instructs_model() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.ends_with("CONTEXT:\n\n"));
    }

    #[test]
    fn test_messages_preserve_history_order() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::system("operator note"),
        ];
        let messages = assemble_messages("SYS".to_string(), &history, "second");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0], ChatMessage::system("SYS"));
        assert_eq!(&messages[1..4], history.as_slice());
        assert_eq!(messages[4].role, Role::User);
        assert_eq!(messages[4].content, "second");
    }
}
