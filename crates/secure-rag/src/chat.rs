//! Retrieval-augmented chat: retrieve, build the grounded prompt, stream.

use futures::stream::BoxStream;
use tracing::{debug, Instrument};

use secure_rag_core::models::ChatMessage;
use secure_rag_core::prompt::{assemble_messages, build_system_prompt};

use crate::error::RagResult;
use crate::index::VectorIndex;
use crate::llm::{LlmClient, StreamEvent};

#[derive(Clone)]
pub struct RagChatService {
    index: VectorIndex,
    llm: LlmClient,
}

impl RagChatService {
    pub fn new(index: VectorIndex, llm: LlmClient) -> Self {
        Self { index, llm }
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Answer `query` given the prior `history`.
    ///
    /// Retrieval happens before the stream is returned, so retrieval
    /// failures surface as `Err` and never as a partial stream.
    pub async fn chat_stream(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> RagResult<BoxStream<'static, StreamEvent>> {
        let span = tracing::info_span!("chat", messages = history.len() + 1);
        async move {
            let context = self
                .index
                .retrieve(query, self.index.default_top_k())
                .await?;
            debug!(sources = context.len(), "context retrieved");

            let system_prompt = build_system_prompt(&context);
            let messages = assemble_messages(system_prompt, history, query);
            Ok(self.llm.stream_chat(messages))
        }
        .instrument(span)
        .await
    }
}
