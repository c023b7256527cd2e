use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Text fragments of one streamed reply, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, ModelError>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API key is not configured")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Malformed stream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Response blocked: {0}")]
    Blocked(String),
    #[error("Model returned an empty reply")]
    EmptyReply,
}

/// A chat-capable language model with one session per conversation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `text` in the session for `conversation_id`, creating the session
    /// on first use.
    async fn send_message_stream(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<FragmentStream, ModelError>;
}
