use crate::errors::MessagingError;
use crate::feed::ChangeFeed;
use crate::identity::{Identity, TokenService, resolve_identity};
use crate::session::SessionContext;
use crate::store::{FetchResult, MessageStoreClient, SendOutcome};
use crate::thread::{Message, merge_messages};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Messaging view state machine.
///
/// Start with a token present moves `Unauthenticated` to `Loading`; the
/// first successful fetch moves `Loading` to `Ready`; a missing or invalid
/// token drops back to `Unauthenticated`. Thread selection and
/// back-navigation toggle between `Ready` and `ThreadOpen`. Teardown is
/// valid from any state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewState {
    #[default]
    Unauthenticated,
    Loading,
    Ready,
    ThreadOpen(String),
}

/// Snapshot published to consumers after every state change.
#[derive(Debug, Clone, Default)]
pub struct InboxState {
    pub view: ViewState,
    /// Authoritative merged message set; inbox and thread views are derived
    /// from it with [`crate::thread::latest_per_correspondent`] and
    /// [`crate::thread::build_thread`].
    pub messages: Vec<Message>,
    /// Panel-local error text from the most recent failed refresh. Cleared
    /// by the next successful one.
    pub last_error: Option<String>,
}

/// Owns the poll loop, the feed consumer, and the shared state cell.
///
/// Poll, push, and send responses all converge through the same merge step,
/// so the three producers can race freely without losing rows. `stop`
/// cancels both background tasks and releases the feed subscription.
pub struct InboxSyncService {
    client: Arc<MessageStoreClient>,
    feed: Arc<ChangeFeed>,
    session: Arc<SessionContext>,
    tokens: Arc<dyn TokenService>,
    poll_interval: Duration,
    feed_enabled: bool,
    state_tx: watch::Sender<InboxState>,
    running: Arc<Mutex<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InboxSyncService {
    pub fn new(
        client: Arc<MessageStoreClient>,
        feed: Arc<ChangeFeed>,
        session: Arc<SessionContext>,
        tokens: Arc<dyn TokenService>,
        poll_interval: Duration,
        feed_enabled: bool,
    ) -> Self {
        let (state_tx, _) = watch::channel(InboxState::default());
        Self {
            client,
            feed,
            session,
            tokens,
            poll_interval,
            feed_enabled,
            state_tx,
            running: Arc::new(Mutex::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Watch state snapshots as they are published.
    pub fn subscribe_state(&self) -> watch::Receiver<InboxState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> InboxState {
        self.state_tx.borrow().clone()
    }

    /// Resolve the session identity and spawn the poll loop plus the feed
    /// consumer. Fails with `Unauthenticated` (leaving no background work
    /// behind) when no usable token is stored.
    pub async fn start(&self) -> Result<(), MessagingError> {
        let token = self.session.token();
        if token.is_none() {
            self.state_tx
                .send_modify(|s| s.view = ViewState::Unauthenticated);
            return Err(MessagingError::Unauthenticated);
        }

        self.state_tx.send_modify(|s| {
            s.view = ViewState::Loading;
            s.last_error = None;
        });

        let identity = match resolve_identity(self.tokens.as_ref(), token.as_deref()).await {
            Ok(identity) => identity,
            Err(err) => {
                self.state_tx
                    .send_modify(|s| s.view = ViewState::Unauthenticated);
                return Err(err);
            }
        };
        self.session.set_identity(identity.clone());

        *self.running.lock().await = true;
        let mut tasks = self.tasks.lock().await;

        {
            let client = self.client.clone();
            let session = self.session.clone();
            let state_tx = self.state_tx.clone();
            let running = self.running.clone();
            let interval = self.poll_interval;
            let identity = identity.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    if !*running.lock().await {
                        break;
                    }
                    refresh_once(&client, &session, &identity, &state_tx).await;
                    tokio::time::sleep(interval).await;
                }
            }));
        }

        if self.feed_enabled {
            let feed = self.feed.clone();
            let state_tx = self.state_tx.clone();
            let running = self.running.clone();
            tasks.push(tokio::spawn(async move {
                let mut sub = feed.subscribe(&identity);
                loop {
                    if !*running.lock().await {
                        break;
                    }
                    match sub.recv().await {
                        Some(msg) => apply_push(&state_tx, msg),
                        None => break,
                    }
                }
                sub.unsubscribe();
            }));
        }

        info!(
            "inbox sync started (poll every {:?}, feed {})",
            self.poll_interval,
            if self.feed_enabled { "on" } else { "off" }
        );
        Ok(())
    }

    /// Teardown, valid from any state: cancel the poll loop and the feed
    /// consumer, releasing the subscription. Idempotent.
    pub async fn stop(&self) {
        *self.running.lock().await = false;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        info!("inbox sync stopped");
    }

    /// Select a conversation: persist the partner, switch the view, and
    /// refresh immediately rather than waiting out the poll interval.
    pub async fn open_thread(&self, partner_id: &str) -> Result<(), MessagingError> {
        self.session.select_partner(partner_id)?;
        self.state_tx
            .send_modify(|s| s.view = ViewState::ThreadOpen(partner_id.to_string()));
        if let Some(identity) = self.session.identity() {
            refresh_once(&self.client, &self.session, &identity, &self.state_tx).await;
        }
        Ok(())
    }

    /// Back-navigation out of the open thread. View-only: the message set
    /// keeps the thread's rows.
    pub fn close_thread(&self) {
        self.state_tx.send_modify(|s| {
            if matches!(s.view, ViewState::ThreadOpen(_)) {
                s.view = ViewState::Ready;
            }
        });
    }

    /// Send `text` to the selected partner.
    ///
    /// Without a live identity or a selected conversation this is a silent
    /// no-op, as is empty input (handled by the store client). A transport
    /// failure is logged and swallowed; the caller keeps the draft for
    /// retry and no error state is published.
    pub async fn send_message(&self, text: &str) -> Result<(), MessagingError> {
        let Some(identity) = self.session.identity() else {
            debug!("send ignored: no active session");
            return Ok(());
        };
        let Some(partner_id) = self.session.partner_id() else {
            debug!("send ignored: no conversation selected");
            return Ok(());
        };

        match self
            .client
            .send(&identity, &partner_id, &identity.username, text)
            .await
        {
            Ok(SendOutcome::Sent(thread)) => {
                self.state_tx.send_modify(|s| {
                    let existing = std::mem::take(&mut s.messages);
                    s.messages = merge_messages(thread, existing);
                });
                refresh_once(&self.client, &self.session, &identity, &self.state_tx).await;
                Ok(())
            }
            Ok(SendOutcome::Skipped) => Ok(()),
            Err(err) => {
                error!("message send failed: {}", err);
                Ok(())
            }
        }
    }
}

/// One authoritative fetch: the result becomes the new base, merged with
/// whatever the feed delivered in the meantime.
async fn refresh_once(
    client: &MessageStoreClient,
    session: &SessionContext,
    identity: &Identity,
    state_tx: &watch::Sender<InboxState>,
) {
    match client.fetch_all(identity).await {
        Ok(FetchResult {
            messages,
            partner_display_name,
        }) => {
            if let Some(name) = partner_display_name {
                session.cache_partner_name(&name);
            }
            state_tx.send_modify(|s| {
                let existing = std::mem::take(&mut s.messages);
                s.messages = merge_messages(messages, existing);
                s.last_error = None;
                if s.view == ViewState::Loading {
                    s.view = ViewState::Ready;
                }
            });
        }
        Err(err) => {
            warn!("inbox refresh failed: {}", err);
            state_tx.send_modify(|s| s.last_error = Some(err.to_string()));
        }
    }
}

fn apply_push(state_tx: &watch::Sender<InboxState>, msg: Message) {
    state_tx.send_modify(|s| {
        let existing = std::mem::take(&mut s.messages);
        s.messages = merge_messages(existing, [msg]);
    });
}

#[cfg(test)]
mod tests;
