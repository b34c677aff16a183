//! Stream Relay
//!
//! Cooperative, chunk-at-a-time relay from a provider token stream to the
//! HTTP response body. Chunks are forwarded in arrival order with no
//! whole-response buffering; the relayed text is accumulated on the side
//! so a completed response can be written back to the cache. A mid-stream
//! error or idle timeout terminates the body with an error signal rather
//! than silently truncating.

use axum::body::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CachedReply, TtlCache};
use crate::providers::{ProviderKind, TokenStream};

/// Terminal state of one in-flight provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Completed,
    Failed,
}

/// One in-flight provider call, alive for the duration of a single
/// request and discarded once the response completes.
pub struct StreamSession {
    pub provider: ProviderKind,
    pub model: String,
    pub started_at: Instant,
    pub bytes_relayed: usize,
    pub state: SessionState,
}

impl StreamSession {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            started_at: Instant::now(),
            bytes_relayed: 0,
            state: SessionState::Pending,
        }
    }
}

/// Instructions for caching the fully-relayed response text
pub struct CacheWriteback {
    pub cache: TtlCache<CachedReply>,
    pub key: String,
}

struct RelayState {
    tokens: TokenStream,
    session: StreamSession,
    accumulated: String,
    writeback: Option<CacheWriteback>,
    idle_timeout: Duration,
    finished: bool,
}

/// Turn a provider token stream into an HTTP body stream.
pub fn relay(
    tokens: TokenStream,
    session: StreamSession,
    idle_timeout: Duration,
    writeback: Option<CacheWriteback>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    let state = RelayState {
        tokens,
        session,
        accumulated: String::new(),
        writeback,
        idle_timeout,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        match timeout(state.idle_timeout, state.tokens.next()).await {
            Ok(Some(Ok(chunk))) => {
                state.session.state = SessionState::Streaming;
                state.session.bytes_relayed += chunk.len();
                state.accumulated.push_str(&chunk);
                Some((Ok(Bytes::from(chunk)), state))
            }
            Ok(Some(Err(e))) => {
                state.session.state = SessionState::Failed;
                state.finished = true;
                warn!(
                    provider = state.session.provider.as_str(),
                    bytes = state.session.bytes_relayed,
                    "mid-stream failure: {e}"
                );
                Some((Err(std::io::Error::other(e.to_string())), state))
            }
            Ok(None) => {
                state.session.state = SessionState::Completed;
                state.finished = true;
                info!(
                    provider = state.session.provider.as_str(),
                    model = %state.session.model,
                    bytes = state.session.bytes_relayed,
                    elapsed_ms = state.session.started_at.elapsed().as_millis() as u64,
                    "stream completed"
                );

                if let Some(wb) = state.writeback.take() {
                    if !state.accumulated.is_empty() {
                        let reply = CachedReply {
                            text: std::mem::take(&mut state.accumulated),
                            provider: state.session.provider.as_str().to_string(),
                            model: state.session.model.clone(),
                        };
                        wb.cache.insert(wb.key, reply).await;
                        debug!("response cached");
                    }
                }
                None
            }
            Err(_) => {
                state.session.state = SessionState::Failed;
                state.finished = true;
                warn!(
                    provider = state.session.provider.as_str(),
                    "idle timeout after {}ms mid-stream",
                    state.idle_timeout.as_millis()
                );
                Some((
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "provider stream stalled",
                    )),
                    state,
                ))
            }
        }
    })
}
