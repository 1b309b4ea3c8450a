//! Provider and model traits.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::Result;
use crate::request::GenerateRequest;
use crate::response::StreamEvent;

/// A streaming response: neutral events until end-of-stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A concrete model handle bound to one provider.
#[async_trait]
pub trait Model: Send + Sync {
    /// The provider this model belongs to.
    fn provider_id(&self) -> &str;

    /// The model id within the provider.
    fn model_id(&self) -> &str;

    /// Make a streaming request.
    ///
    /// A `2xx` response yields the event stream; every other outcome is an
    /// [`SdkError`](crate::error::SdkError) classified for the retry
    /// transport. The returned stream owns the response body.
    async fn stream(&self, request: GenerateRequest) -> Result<EventStream>;
}

/// A provider that can mint model handles.
pub trait Provider: Send + Sync {
    /// Registry key for this provider.
    fn name(&self) -> &str;

    /// Create a model handle.
    fn model(&self, model_id: &str) -> Result<Arc<dyn Model>>;
}
