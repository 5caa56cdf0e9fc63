use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::buffer::Buffer;
use crate::error::BoxError;
use crate::key::KeySet;
use crate::{FetchError, FetchReply, FetchRequest, Record};

/// The paginated backend.
///
/// Implementations answer "`size` items starting `offset` items after `anchor`" (see
/// [`FetchRequest`]). They may return a bare list or a [`crate::Page`]; a reply that is short
/// without being a last page is fine, the array keeps asking until it has what it needs.
#[async_trait]
pub trait ChunkSource<T: Record>: Send + Sync + 'static {
    async fn fetch(&self, request: FetchRequest<T::Index>) -> Result<FetchReply<T>, BoxError>;
}

/// A [`ChunkSource`] backed by an async closure. See [`source_fn`].
pub struct FnSource<F>(F);

/// Wraps an async closure as a [`ChunkSource`].
pub fn source_fn<F>(f: F) -> FnSource<F> {
    FnSource(f)
}

#[async_trait]
impl<T, F, Fut> ChunkSource<T> for FnSource<F>
where
    T: Record,
    F: Fn(FetchRequest<T::Index>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchReply<T>, BoxError>> + Send + 'static,
{
    async fn fetch(&self, request: FetchRequest<T::Index>) -> Result<FetchReply<T>, BoxError> {
        (self.0)(request).await
    }
}

impl<F> core::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FnSource(..)")
    }
}

/// One logical fetch, possibly made of several source calls.
#[derive(Debug)]
pub(crate) struct Chunk<T> {
    pub(crate) items: Vec<T>,
    pub(crate) end_reached: bool,
}

impl<T: Record> Chunk<T> {
    /// Drops records that are already in `buffer`. Returns how many were dropped.
    pub(crate) fn retain_new(&mut self, buffer: &Buffer<T>) -> usize {
        buffer.retain_new(&mut self.items)
    }
}

pub(crate) struct FetchAdapter<T: Record> {
    source: Arc<dyn ChunkSource<T>>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<T: Record> FetchAdapter<T> {
    pub(crate) fn new(
        source: Arc<dyn ChunkSource<T>>,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            timeout,
            cancel,
        }
    }

    /// Fetches `size` records around `anchor`, looping over short non-terminal replies.
    ///
    /// A chunk lying entirely before the anchor (`offset + size <= 0`) keeps extending backward
    /// from its first record; any other chunk extends forward from its last record with
    /// `offset = 1`. Records repeated across calls are dropped.
    pub(crate) async fn fetch_chunk(
        &self,
        anchor: Option<T::Index>,
        size: usize,
        offset: i64,
    ) -> Result<Chunk<T>, FetchError> {
        let backward = offset < 0 && offset.saturating_add(size as i64) <= 0;
        let mut items = VecDeque::<T>::with_capacity(size);
        let mut seen = KeySet::<T::Id>::default();
        let mut request = FetchRequest {
            anchor,
            size,
            offset,
        };
        let mut calls = 0usize;

        let end_reached = loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let requested = request.size;
            rtrace!(
                anchor = ?request.anchor,
                size = request.size,
                offset = request.offset,
                "source fetch"
            );
            let batch = self.call(request).await?.into_batch(requested);
            calls += 1;

            let before = items.len();
            if backward {
                for item in batch.items.into_iter().rev() {
                    if seen.insert(item.id()) {
                        items.push_front(item);
                    }
                }
            } else {
                for item in batch.items {
                    if seen.insert(item.id()) {
                        items.push_back(item);
                    }
                }
            }
            let added = items.len() - before;

            if batch.end_reached {
                break true;
            }
            if items.len() >= size {
                break false;
            }
            if added == 0 {
                rwarn!(
                    calls,
                    collected = items.len(),
                    size,
                    "source made no progress on a non-terminal reply; treating as end of data"
                );
                break true;
            }

            let remaining = size - items.len();
            request = if backward {
                FetchRequest {
                    anchor: items.front().map(Record::index),
                    size: remaining,
                    offset: -(remaining as i64),
                }
            } else {
                FetchRequest {
                    anchor: items.back().map(Record::index),
                    size: remaining,
                    offset: 1,
                }
            };
        };

        rdebug!(
            calls,
            collected = items.len(),
            size,
            end_reached,
            "fetch_chunk"
        );
        let _ = calls;
        Ok(Chunk {
            items: items.into(),
            end_reached,
        })
    }

    async fn call(&self, request: FetchRequest<T::Index>) -> Result<FetchReply<T>, FetchError> {
        let fetch = self.source.fetch(request);
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fetch).await {
                    Ok(reply) => reply.map_err(FetchError::rejected),
                    Err(_) => Err(FetchError::TimedOut(limit)),
                },
                None => fetch.await.map_err(FetchError::rejected),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            reply = bounded => reply,
        }
    }
}
