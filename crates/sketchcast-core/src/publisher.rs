//! Outbound snapshot publishing.
//!
//! Snapshots produced while drawing pass through a [`Throttle`] so the relay
//! sees at most one update per window. The clear sentinel bypasses it.
//! Messages are queued as JSON and drained by the connection owner.
//! Updates produced before the join announcement are held back (latest
//! wins) and released right after it, since the relay drops updates from
//! connections that have not joined.

use crate::codec::Snapshot;
use crate::session::SessionId;
use crate::sync::ClientMessage;
use crate::throttle::{DEFAULT_THROTTLE_WINDOW, Throttle};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

pub struct SnapshotPublisher {
    user_id: SessionId,
    throttle: Throttle<Snapshot>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    /// Set by `teardown`; nothing is queued afterwards.
    closed: bool,
    /// Set once the join announcement is queued.
    joined: bool,
    /// Latest update produced before the join.
    held: Option<Snapshot>,
}

impl SnapshotPublisher {
    pub fn new(user_id: SessionId) -> Self {
        Self::with_window(user_id, DEFAULT_THROTTLE_WINDOW)
    }

    pub fn with_window(user_id: SessionId, window: Duration) -> Self {
        Self {
            user_id,
            throttle: Throttle::new(window),
            outgoing: Vec::new(),
            closed: false,
            joined: false,
            held: None,
        }
    }

    pub fn user_id(&self) -> &SessionId {
        &self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Queue the join announcement for a freshly established connection,
    /// followed by the latest update held back while waiting for it.
    pub fn join(&mut self, room: &str) {
        if self.closed {
            return;
        }
        self.queue(&ClientMessage::Join {
            user_id: self.user_id.to_string(),
            room: room.to_string(),
        });
        self.joined = true;
        if let Some(snapshot) = self.held.take() {
            self.queue_update(snapshot);
        }
    }

    /// Submit the snapshot taken after a rasterized segment.
    ///
    /// Returns true if the rate limit let it through rather than holding it
    /// for the next window.
    pub fn submit(&mut self, snapshot: Snapshot, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        match self.throttle.submit(snapshot, now) {
            Some(snapshot) => {
                self.queue_update(snapshot);
                true
            }
            None => false,
        }
    }

    /// Release the held-back snapshot once its window has elapsed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        match self.throttle.poll(now) {
            Some(snapshot) => {
                self.queue_update(snapshot);
                true
            }
            None => false,
        }
    }

    /// Publish the held-back snapshot now, so the final state of a stroke is
    /// never lost to the rate limit.
    pub fn flush_on_stroke_end(&mut self, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        match self.throttle.flush(now) {
            Some(snapshot) => {
                self.queue_update(snapshot);
                true
            }
            None => false,
        }
    }

    /// Publish the clear sentinel immediately, discarding any held-back
    /// snapshot of the pre-clear surface.
    pub fn clear(&mut self) {
        if self.closed {
            return;
        }
        self.throttle.cancel();
        self.queue_update(Snapshot::clear());
    }

    /// Stop publishing. Held-back and queued messages are discarded.
    pub fn teardown(&mut self) {
        self.closed = true;
        self.throttle.cancel();
        self.outgoing.clear();
        self.held = None;
    }

    /// Check whether a snapshot is waiting for its window.
    pub fn has_pending(&self) -> bool {
        self.throttle.has_pending()
    }

    /// When the held-back snapshot becomes eligible, if there is one.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue_update(&mut self, snapshot: Snapshot) {
        if !self.joined {
            self.held = Some(snapshot);
            return;
        }
        let msg = ClientMessage::Update {
            data_url: snapshot.into_string(),
            user_id: self.user_id.to_string(),
        };
        self.queue(&msg);
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to serialize outgoing message: {}", e),
        }
    }
}
