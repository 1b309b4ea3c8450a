//! Deadline-bounded view over a provider event stream.

use std::time::Duration;
use std::time::Instant;

use futures::StreamExt;
use strand_sdk::StreamEvent;
use strand_sdk::provider::EventStream;

use crate::error::ApiError;

/// A provider event stream bounded by two deadlines:
///
/// - **per-chunk**: how long the reader may block between frames
/// - **per-step**: total time the stream may stay open
///
/// Expiry of either surfaces [`ApiError::StreamTimeout`], which is terminal
/// for the step.
pub struct UnifiedStream {
    inner: EventStream,
    chunk_timeout: Duration,
    step_deadline: Instant,
    step_timeout: Duration,
}

impl UnifiedStream {
    /// Wrap a stream; the step clock starts now.
    pub fn new(inner: EventStream, chunk_timeout: Duration, step_timeout: Duration) -> Self {
        Self {
            inner,
            chunk_timeout,
            step_deadline: Instant::now() + step_timeout,
            step_timeout,
        }
    }

    /// Next event, or `None` at end-of-stream.
    pub async fn next(&mut self) -> Option<Result<StreamEvent, ApiError>> {
        let now = Instant::now();
        if now >= self.step_deadline {
            return Some(Err(ApiError::StreamTimeout(self.step_timeout)));
        }

        let window = self
            .chunk_timeout
            .min(self.step_deadline.duration_since(now));

        match tokio::time::timeout(window, self.inner.next()).await {
            Ok(Some(Ok(event))) => Some(Ok(event)),
            Ok(Some(Err(error))) => Some(Err(error.into())),
            Ok(None) => None,
            Err(_) => {
                let exceeded = if Instant::now() >= self.step_deadline {
                    self.step_timeout
                } else {
                    self.chunk_timeout
                };
                Some(Err(ApiError::StreamTimeout(exceeded)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::FinishReason;
    use strand_protocol::TokenUsage;

    fn stream_of(events: Vec<StreamEvent>) -> EventStream {
        Box::pin(futures::stream::iter(events.into_iter().map(Ok)))
    }

    #[tokio::test]
    async fn test_passes_events_through() {
        let mut stream = UnifiedStream::new(
            stream_of(vec![
                StreamEvent::TextDelta {
                    delta: "hi".to_string(),
                },
                StreamEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: TokenUsage::new(1, 1),
                },
            ]),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        assert!(matches!(
            stream.next().await,
            Some(Ok(StreamEvent::TextDelta { .. }))
        ));
        assert!(matches!(
            stream.next().await,
            Some(Ok(StreamEvent::Finish { .. }))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_chunk_timeout_fires() {
        let mut stream = UnifiedStream::new(
            Box::pin(futures::stream::pending()),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );
        match stream.next().await {
            Some(Err(ApiError::StreamTimeout(d))) => assert_eq!(d, Duration::from_millis(20)),
            other => panic!("expected chunk timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_deadline_fires_even_with_slow_drip() {
        // Events arrive steadily, each under the chunk timeout, but the step
        // deadline still bounds the total stream lifetime.
        let ticks = futures::stream::unfold(0u32, |n| async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            Some((
                Ok(StreamEvent::TextDelta {
                    delta: format!("t{n}"),
                }),
                n + 1,
            ))
        });
        let mut stream = UnifiedStream::new(
            Box::pin(ticks),
            Duration::from_millis(200),
            Duration::from_millis(80),
        );

        let mut saw_timeout = false;
        for _ in 0..50 {
            match stream.next().await {
                Some(Ok(_)) => continue,
                Some(Err(ApiError::StreamTimeout(_))) => {
                    saw_timeout = true;
                    break;
                }
                other => panic!("unexpected item: {other:?}"),
            }
        }
        assert!(saw_timeout, "step deadline never fired");
    }
}
