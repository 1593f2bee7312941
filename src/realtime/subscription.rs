use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::ChatEvent;

/// Handle for an open change-event channel. Events are pulled by polling
/// it as a `Stream`; dropping the handle releases the subscription, which
/// is how callers unsubscribe.
pub struct Subscription {
    inner: BroadcastStream<ChatEvent>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<ChatEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(rx),
        }
    }
}

impl Stream for Subscription {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    // A slow consumer missed events. Delivery is at-least-once
                    // and consumers resync from the store, so skipping is safe.
                    tracing::warn!("chat subscription lagged, skipped {} events", skipped);
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
