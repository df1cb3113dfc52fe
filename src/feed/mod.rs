mod sse;

use crate::config::BackendConfig;
use crate::identity::Identity;
use crate::store::MessageRow;
use crate::thread::Message;
use crate::utils::http::streaming_http_client;
use futures_util::StreamExt;
use sse::SseParser;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const BASE_RECONNECT_DELAY_S: u64 = 5;
const MAX_RECONNECT_DELAY_S: u64 = 60;

/// Calculate exponential backoff delay for reconnection attempts.
fn backoff_delay(attempt: u32, base_delay_secs: u64, max_delay_secs: u64) -> u64 {
    let delay = (base_delay_secs as f64 * 2.0_f64.powi(attempt as i32)) as u64;
    delay.min(max_delay_secs)
}

/// Client for the backend's SSE insert feed on the messages table.
///
/// The subscription request carries the participant, so the server only
/// streams inserts for conversations the subscriber is part of.
pub struct ChangeFeed {
    http: reqwest::Client,
    feed_url: String,
    active: Arc<AtomicUsize>,
}

impl ChangeFeed {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            http: streaming_http_client(),
            feed_url: format!(
                "{}{}",
                backend.base_url.trim_end_matches('/'),
                backend.feed_path
            ),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of live subscriptions. Teardown paths assert this returns to
    /// zero.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Open a subscription scoped to `identity`'s conversations.
    ///
    /// A background reader parses the stream and delivers each inserted row
    /// as a domain [`Message`]. The reader reconnects with exponential
    /// backoff on stream errors; feed failures are logged, never surfaced.
    pub fn subscribe(&self, identity: &Identity) -> FeedSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.active.fetch_add(1, Ordering::SeqCst);

        let http = self.http.clone();
        let url = self.feed_url.clone();
        let user_id = identity.user_id.clone();
        let task = tokio::spawn(async move {
            run_reader(http, url, user_id, tx).await;
        });

        FeedSubscription {
            rx,
            task,
            active: self.active.clone(),
            released: false,
        }
    }
}

async fn run_reader(
    http: reqwest::Client,
    url: String,
    user_id: String,
    tx: mpsc::UnboundedSender<Message>,
) {
    let mut reconnect_attempt = 0u32;
    loop {
        if tx.is_closed() {
            break;
        }

        let response = match http
            .get(&url)
            .query(&[("participant", user_id.as_str())])
            .header("Authorization", &user_id)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("change feed rejected with status {}", resp.status());
                let delay = backoff_delay(
                    reconnect_attempt,
                    BASE_RECONNECT_DELAY_S,
                    MAX_RECONNECT_DELAY_S,
                );
                reconnect_attempt += 1;
                tokio::time::sleep(Duration::from_secs(delay)).await;
                continue;
            }
            Err(err) => {
                warn!("change feed connect failed: {}", err);
                let delay = backoff_delay(
                    reconnect_attempt,
                    BASE_RECONNECT_DELAY_S,
                    MAX_RECONNECT_DELAY_S,
                );
                reconnect_attempt += 1;
                tokio::time::sleep(Duration::from_secs(delay)).await;
                continue;
            }
        };

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    reconnect_attempt = 0;
                    let text = String::from_utf8_lossy(&bytes);
                    for event in parser.push(&text) {
                        if event.event_type.as_deref() != Some("insert") {
                            continue;
                        }
                        match serde_json::from_str::<MessageRow>(&event.data) {
                            Ok(row) => {
                                if tx.send(row.into()).is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                debug!("ignoring unparseable feed event: {}", err);
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!("change feed stream error: {}", err);
                    break;
                }
            }
        }

        if tx.is_closed() {
            break;
        }
        let delay = backoff_delay(
            reconnect_attempt,
            BASE_RECONNECT_DELAY_S,
            MAX_RECONNECT_DELAY_S,
        );
        reconnect_attempt += 1;
        debug!("change feed disconnected, reconnecting in {}s", delay);
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }
}

/// Handle to a live feed subscription.
///
/// Released exactly once: either by calling [`unsubscribe`] or on drop,
/// whichever comes first. Leaking the reader task past teardown is a defect.
///
/// [`unsubscribe`]: FeedSubscription::unsubscribe
pub struct FeedSubscription {
    rx: mpsc::UnboundedReceiver<Message>,
    task: JoinHandle<()>,
    active: Arc<AtomicUsize>,
    released: bool,
}

impl FeedSubscription {
    /// Next pushed insert, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.task.abort();
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
