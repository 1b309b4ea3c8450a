//! Execution context handed to a running tool.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An in-flight state patch published by a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    /// The call this patch belongs to.
    pub call_id: String,
    /// Free-form patch merged into the tool part's metadata.
    pub patch: Value,
}

/// Context for one tool execution.
///
/// Cancellation is cooperative: tools must poll [`is_cancelled`]
/// (or await [`cancelled`]) and exit promptly when signaled.
///
/// [`is_cancelled`]: Self::is_cancelled
/// [`cancelled`]: Self::cancelled
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Owning session.
    pub session_id: String,
    /// The call id this execution answers.
    pub call_id: String,
    cancel: CancellationToken,
    partial_tx: Option<mpsc::Sender<PartialUpdate>>,
}

impl ToolContext {
    /// Create a context.
    pub fn new(session_id: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            call_id: call_id.into(),
            cancel: CancellationToken::new(),
            partial_tx: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach the partial-update channel.
    pub fn with_partial_channel(mut self, tx: mpsc::Sender<PartialUpdate>) -> Self {
        self.partial_tx = Some(tx);
        self
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The raw cancellation token (for `tokio::select!` in tools).
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publish in-flight state. May briefly wait when the owning session's
    /// queue is full; silently drops the patch if no consumer is attached.
    pub async fn publish_partial(&self, patch: Value) {
        let Some(tx) = &self.partial_tx else {
            return;
        };
        let update = PartialUpdate {
            call_id: self.call_id.clone(),
            patch,
        };
        if tx.send(update).await.is_err() {
            debug!(call_id = %self.call_id, "Partial-update consumer gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_visible_to_tool() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new("s1", "c1").with_cancel_token(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_publish_partial_delivers() {
        let (tx, mut rx) = mpsc::channel(4);
        let ctx = ToolContext::new("s1", "c1").with_partial_channel(tx);

        ctx.publish_partial(serde_json::json!({"progress": 50})).await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update.call_id, "c1");
        assert_eq!(update.patch["progress"], 50);
    }

    #[tokio::test]
    async fn test_publish_partial_without_channel_is_noop() {
        let ctx = ToolContext::new("s1", "c1");
        ctx.publish_partial(serde_json::json!({})).await;
    }
}
