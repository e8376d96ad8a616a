use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::error::{RagweaveError, Result};
use crate::models::StoredObject;
use crate::store::DocumentStore;

/// Separator placed between retrieved chunks in the context message
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Prefix that sends a question to the model without retrieval
pub const NO_RAG_PREFIX: &str = "!norag";

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using the \
document excerpts below. If the excerpts do not contain the answer, say so.\n\nExcerpts:\n\n";

/// One message of a chat completion conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request structure for the chat completions API
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Response structure from the chat completions API
#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for any OpenAI-compatible chat completions endpoint
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagweaveError::Chat(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &ChatConfig, api_key: String) -> Result<Self> {
        Self::new(&config.base_url, api_key, config.model.clone())
    }

    /// Send a conversation and return the model's reply
    ///
    /// # Arguments
    ///
    /// * `messages` - Full conversation, oldest first
    ///
    /// # Returns
    ///
    /// Content of the first choice
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagweaveError::Chat(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RagweaveError::Chat(format!("Chat API error {}: {}", status, body)));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RagweaveError::Chat(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagweaveError::Chat("Chat API returned no choices".to_string()))
    }
}

/// Join the text of retrieved chunks into one context block.
pub fn format_context(hits: &[StoredObject]) -> String {
    hits.iter()
        .filter_map(StoredObject::text)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Messages for one turn: optional context as a system message, the
/// history, then the question.
pub fn build_messages(context: Option<&str>, history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(context) = context {
        messages.push(ChatMessage::system(format!("{}{}", SYSTEM_PROMPT, context)));
    }
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(question));
    messages
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub answer: String,
    /// Chunks the answer was grounded on; empty for `!norag` questions
    pub sources: Vec<StoredObject>,
}

/// Retrieval-augmented conversation that keeps its own history.
pub struct ChatSession {
    client: ChatClient,
    store: Arc<dyn DocumentStore>,
    chunk_class: String,
    k: usize,
    neighbors: usize,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        client: ChatClient,
        store: Arc<dyn DocumentStore>,
        chunk_class: String,
        k: usize,
        neighbors: usize,
    ) -> Self {
        Self {
            client,
            store,
            chunk_class,
            k,
            neighbors,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Answer one question, retrieving context unless it starts with `!norag`.
    pub async fn ask(&mut self, input: &str) -> Result<ChatReply> {
        let input = input.trim();
        let (question, use_rag) = match input.strip_prefix(NO_RAG_PREFIX) {
            Some(rest) => (rest.trim(), false),
            None => (input, true),
        };
        if question.is_empty() {
            return Err(RagweaveError::InvalidInput("empty question".to_string()));
        }

        let sources = if use_rag {
            self.store
                .search_near_text(&self.chunk_class, question, self.k, self.neighbors)
                .await?
        } else {
            Vec::new()
        };
        log::debug!("Retrieved {} chunk(s) for question", sources.len());

        let context = use_rag.then(|| format_context(&sources));
        let messages = build_messages(context.as_deref(), &self.history, question);
        let answer = self.client.complete(&messages).await?;

        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer.clone()));

        Ok(ChatReply { answer, sources })
    }
}

/// `exit` / `quit` (any case) end an interactive session.
pub fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "exit" | "quit")
}
