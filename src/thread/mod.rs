use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A single chat line between two users.
///
/// `sent_at` is assigned by the Backend Data Service at insert time; the
/// client never orders by anything else. Messages are immutable once
/// created and are never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Row identity used to collapse the same message arriving via both the
    /// poll fetch and the realtime feed. The wire carries no dedicated
    /// message id, so the full row is the key.
    fn row_key(&self) -> (String, String, i64, String) {
        (
            self.sender_id.clone(),
            self.recipient_id.clone(),
            self.sent_at.timestamp_micros(),
            self.body.clone(),
        )
    }
}

/// Inbox view: the most recent message from each correspondent.
///
/// Messages sent by the current user are dropped; the remainder are grouped
/// by sender and the entry with the latest `sent_at` wins per group. On
/// equal timestamps the first-encountered entry is kept (deliberately
/// arbitrary). Output order is implementation-defined; callers must not
/// assume any ordering.
pub fn latest_per_correspondent(messages: &[Message], current_user: &str) -> Vec<Message> {
    let mut latest: HashMap<&str, &Message> = HashMap::new();
    for msg in messages.iter().filter(|m| m.sender_id != current_user) {
        match latest.get(msg.sender_id.as_str()) {
            Some(existing) if existing.sent_at >= msg.sent_at => {}
            _ => {
                latest.insert(&msg.sender_id, msg);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// One open conversation, oldest first.
///
/// Membership mixes two predicates: the partner's messages (`sender ==
/// partner`) and the current user's messages to that partner (`sender ==
/// current_user && recipient == partner`). Both arms are required for the
/// thread to show both sides. The sort is stable, so equal timestamps keep
/// their fetch order.
pub fn build_thread(messages: &[Message], current_user: &str, partner: &str) -> Vec<Message> {
    let mut thread: Vec<Message> = messages
        .iter()
        .filter(|m| {
            m.sender_id == partner || (m.sender_id == current_user && m.recipient_id == partner)
        })
        .cloned()
        .collect();
    thread.sort_by_key(|m| m.sent_at);
    thread
}

/// Merge freshly arrived messages into the authoritative set.
///
/// The poll fetch, the realtime feed, and send responses all converge here,
/// so a row observed twice (fetched and pushed) appears once. Result is
/// sorted ascending by `sent_at` (stable).
pub fn merge_messages(base: Vec<Message>, incoming: impl IntoIterator<Item = Message>) -> Vec<Message> {
    let mut merged = base;
    let mut seen: HashSet<(String, String, i64, String)> =
        merged.iter().map(Message::row_key).collect();
    for msg in incoming {
        if seen.insert(msg.row_key()) {
            merged.push(msg);
        }
    }
    merged.sort_by_key(|m| m.sent_at);
    merged
}
