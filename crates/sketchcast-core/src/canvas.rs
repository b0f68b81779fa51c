//! The paint canvas component.
//!
//! [`PaintCanvas`] owns everything scoped to one mounted drawing surface:
//! the raster, the draw-state machine, the snapshot publisher and
//! subscriber, and the relay connection. The host feeds it pointer events
//! and calls [`PaintCanvas::tick`] from its event loop.

use crate::codec;
use crate::color::PenColor;
use crate::config::RelayConfig;
use crate::publisher::SnapshotPublisher;
use crate::session::SessionId;
use crate::storage::{DRAWING_KEY, SnapshotStore, StorageError, StorageResult};
use crate::subscriber::{Received, SnapshotSubscriber};
use crate::surface::{PixelSurface, RasterImage, RasterSurface};
use crate::sync::{ConnectionState, PlatformWebSocket, SyncError, SyncEvent, Transport};
use crate::throttle::DEFAULT_THROTTLE_WINDOW;
use crate::tools::{ToolKind, ToolManager};
use kurbo::Point;
use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

/// How drawings leave this canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Publish snapshots to a relay and apply everything it broadcasts.
    Networked(RelayConfig),
    /// Stay offline; only the snapshot store (if any) persists drawings.
    LocalOnly,
}

pub struct PaintCanvas<S: RasterSurface = PixelSurface, T: Transport = PlatformWebSocket> {
    session: SessionId,
    mode: SyncMode,
    throttle_window: Duration,
    /// `None` until mounted and after teardown.
    surface: Option<S>,
    tools: ToolManager,
    publisher: SnapshotPublisher,
    subscriber: SnapshotSubscriber,
    /// Only present while mounted in networked mode.
    transport: Option<T>,
    store: Option<Arc<dyn SnapshotStore>>,
    /// Room confirmed by the relay.
    room: Option<String>,
}

impl<S: RasterSurface, T: Transport> PaintCanvas<S, T> {
    /// Create an unmounted canvas with a fresh session identity.
    pub fn new(mode: SyncMode) -> Self {
        let session = SessionId::new();
        // Nothing can be received before mount; the worker is started there.
        let subscriber = SnapshotSubscriber::closed();
        let mut publisher = SnapshotPublisher::new(session.clone());
        publisher.teardown();

        Self {
            session,
            mode,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            surface: None,
            tools: ToolManager::new(),
            publisher,
            subscriber,
            transport: None,
            store: None,
            room: None,
        }
    }

    /// Persist drawings through `store` for [`save`](Self::save) and [`load`](Self::load).
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the outbound rate-limit window.
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    // --- Lifecycle ---

    /// Mount onto `surface`, constructing the platform transport.
    pub fn mount(&mut self, surface: S) -> Result<(), SyncError>
    where
        T: Default,
    {
        self.mount_with(surface, T::default())
    }

    /// Mount onto `surface` using an injected transport.
    ///
    /// In networked mode the transport is connected to the configured relay;
    /// if that fails nothing is mounted. In local-only mode the transport is
    /// dropped unused.
    pub fn mount_with(&mut self, surface: S, mut transport: T) -> Result<(), SyncError> {
        if self.is_mounted() {
            self.teardown();
        }

        if let SyncMode::Networked(config) = &self.mode {
            log::info!(
                "Connecting session {} to {} (room {})",
                self.session,
                config.relay_url(),
                config.room()
            );
            transport.connect(config.relay_url())?;
            self.transport = Some(transport);
        }

        self.publisher = SnapshotPublisher::with_window(self.session.clone(), self.throttle_window);
        self.subscriber = SnapshotSubscriber::new();
        self.surface = Some(surface);
        Ok(())
    }

    /// Unmount: stop publishing, close the connection and release the
    /// surface. Pending rate-limited snapshots and in-flight decodes are
    /// discarded.
    pub fn teardown(&mut self) -> Option<S> {
        self.publisher.teardown();
        self.subscriber.close();
        self.tools.pointer_up();
        self.room = None;
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
        let surface = self.surface.take();
        if surface.is_some() {
            log::info!("Canvas for session {} torn down", self.session);
        }
        surface
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    // --- Accessors ---

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn mode(&self) -> &SyncMode {
        &self.mode
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Room confirmed by the relay, if joined.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport
            .as_ref()
            .map_or(ConnectionState::Disconnected, |t| t.state())
    }

    // --- Tool controls ---

    pub fn toggle_eraser(&mut self) {
        self.tools.toggle_eraser();
    }

    pub fn set_color(&mut self, color: PenColor) {
        self.tools.set_color(color);
    }

    pub fn set_width(&mut self, width: f64) -> bool {
        self.tools.set_width(width)
    }

    pub fn current_tool(&self) -> ToolKind {
        self.tools.current_tool()
    }

    // --- Pointer input ---

    pub fn pointer_down(&mut self, point: Point) {
        if self.surface.is_none() {
            return;
        }
        self.tools.pointer_down(point);
    }

    /// Extend the stroke and publish the result. Returns true if a segment
    /// was drawn.
    pub fn pointer_move(&mut self, point: Point, now: Instant) -> bool {
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        let Some(segment) = self.tools.pointer_move(point) else {
            return false;
        };
        surface.stroke_segment(segment.from, segment.to, &segment.style);
        self.publish(now);
        true
    }

    /// End the stroke, publishing its final state even if the rate-limit
    /// window is still closed.
    pub fn pointer_up(&mut self, now: Instant) {
        if self.tools.pointer_up() {
            self.publisher.flush_on_stroke_end(now);
            self.flush_outgoing();
        }
    }

    /// Blank the surface and tell every peer to do the same.
    ///
    /// The clear counts as the newest applied snapshot, so images still
    /// decoding (from the relay or from `load`) are discarded.
    pub fn clear(&mut self) {
        if self.surface.is_none() {
            return;
        }
        self.receive_snapshot(codec::Snapshot::clear());
        if self.transport.is_some() {
            self.publisher.clear();
            self.flush_outgoing();
        }
    }

    // --- Event loop ---

    /// Drive background work: relay events, finished decodes and trailing
    /// rate-limited emissions.
    pub fn tick(&mut self, now: Instant) {
        self.process_events();
        if let Some(image) = self.subscriber.poll() {
            self.apply_image(&image);
        }
        self.publisher.tick(now);
        self.flush_outgoing();
    }

    /// Like [`tick`](Self::tick) but waits up to `timeout` for in-flight
    /// decodes to finish.
    pub fn settle(&mut self, timeout: Duration) {
        self.process_events();
        if let Some(image) = self.subscriber.wait(timeout) {
            self.apply_image(&image);
        }
        self.flush_outgoing();
    }

    /// When the next trailing emission is due, so hosts can schedule a tick.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.publisher.next_deadline()
    }

    /// React to one event from the relay connection.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Connected => {
                let room = match &self.mode {
                    SyncMode::Networked(config) => config.room().to_string(),
                    SyncMode::LocalOnly => return,
                };
                log::info!("Connected; joining room {} as {}", room, self.session);
                self.publisher.join(&room);
                self.flush_outgoing();
            }
            SyncEvent::JoinedRoom { room, peer_count, snapshot } => {
                log::info!("Joined room {} ({} peers)", room, peer_count);
                self.room = Some(room);
                if let Some(snapshot) = snapshot {
                    self.receive_snapshot(snapshot);
                }
            }
            SyncEvent::SnapshotReceived { snapshot, .. } => {
                self.receive_snapshot(snapshot);
            }
            SyncEvent::PeerJoined { user_id } => log::info!("Peer {} joined", user_id),
            SyncEvent::PeerLeft { user_id } => log::info!("Peer {} left", user_id),
            SyncEvent::Disconnected => {
                log::info!("Disconnected from relay");
                self.room = None;
            }
            SyncEvent::Error { message } => log::warn!("Relay error: {}", message),
        }
    }

    // --- Local persistence ---

    /// Save the current surface under the fixed drawing key.
    pub async fn save(&self) -> StorageResult<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StorageError::Unavailable("No snapshot store configured".to_string()))?;
        let surface = self.surface.as_ref().ok_or(StorageError::NotMounted)?;
        let snapshot =
            codec::encode(surface).map_err(|e| StorageError::Serialization(e.to_string()))?;
        store.save(DRAWING_KEY, &snapshot).await
    }

    /// Load the saved drawing. The image is decoded like a relay snapshot
    /// and shows up on a later `tick`/`settle`. Returns false if nothing
    /// was saved.
    pub async fn load(&mut self) -> StorageResult<bool> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| StorageError::Unavailable("No snapshot store configured".to_string()))?;
        if self.surface.is_none() {
            return Err(StorageError::NotMounted);
        }
        match store.load(DRAWING_KEY).await? {
            Some(snapshot) => {
                self.receive_snapshot(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Internals ---

    fn process_events(&mut self) {
        let events = match self.transport.as_mut() {
            Some(transport) => transport.poll_events(),
            None => return,
        };
        for event in events {
            self.handle_event(event);
        }
    }

    fn receive_snapshot(&mut self, snapshot: codec::Snapshot) {
        if let Received::Clear { .. } = self.subscriber.receive(snapshot) {
            if let Some(surface) = self.surface.as_mut() {
                surface.clear();
            }
        }
    }

    fn apply_image(&mut self, image: &RasterImage) {
        if let Some(surface) = self.surface.as_mut() {
            surface.replace(image);
        }
    }

    fn publish(&mut self, now: Instant) {
        if self.transport.is_none() {
            return;
        }
        let Some(surface) = self.surface.as_ref() else {
            return;
        };
        match codec::encode(surface) {
            Ok(snapshot) => {
                self.publisher.submit(snapshot, now);
                self.flush_outgoing();
            }
            Err(e) => log::warn!("Failed to encode snapshot: {}", e),
        }
    }

    fn flush_outgoing(&mut self) {
        let outgoing = self.publisher.take_outgoing();
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        for msg in outgoing {
            if let Err(e) = transport.send(&msg) {
                log::debug!("Dropping outgoing message: {}", e);
            }
        }
    }
}

impl<S: RasterSurface, T: Transport> Drop for PaintCanvas<S, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
