//! Inbound snapshot handling.
//!
//! Every inbound snapshot gets a sequence number on receipt. Clears take
//! effect immediately; images are decoded off the caller's path and only
//! applied if nothing newer has been applied in the meantime.

use crate::codec::{self, CodecError, Snapshot};
use crate::surface::RasterImage;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// A snapshot waiting to be decoded.
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub seq: u64,
    pub snapshot: Snapshot,
}

/// The outcome of decoding a [`PendingSnapshot`].
#[derive(Debug)]
pub struct DecodedSnapshot {
    pub seq: u64,
    pub result: Result<RasterImage, CodecError>,
}

impl PendingSnapshot {
    pub fn decode(self) -> DecodedSnapshot {
        DecodedSnapshot {
            seq: self.seq,
            result: codec::decode(&self.snapshot),
        }
    }
}

/// What the caller must do with a freshly received snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Clear the surface now.
    Clear { seq: u64 },
    /// The image is being decoded; collect it with `poll` or `wait`.
    Decoding { seq: u64 },
    /// The subscriber is closed and ignored the snapshot.
    Ignored,
}

pub struct SnapshotSubscriber {
    next_seq: u64,
    /// Sequence number of the last snapshot written to the surface.
    last_applied: Option<u64>,
    worker: DecodeWorker,
    closed: bool,
}

impl SnapshotSubscriber {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            last_applied: None,
            worker: DecodeWorker::spawn(),
            closed: false,
        }
    }

    /// A subscriber that starts out closed and never starts a worker.
    pub fn closed() -> Self {
        Self {
            next_seq: 1,
            last_applied: None,
            worker: DecodeWorker::stopped(),
            closed: true,
        }
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of snapshots still being decoded.
    pub fn in_flight(&self) -> usize {
        self.worker.in_flight()
    }

    /// Accept a snapshot from the relay (or from local storage).
    pub fn receive(&mut self, snapshot: Snapshot) -> Received {
        if self.closed {
            return Received::Ignored;
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        if snapshot.is_clear() {
            self.last_applied = Some(seq);
            Received::Clear { seq }
        } else {
            self.worker.submit(PendingSnapshot { seq, snapshot });
            Received::Decoding { seq }
        }
    }

    /// Collect finished decodes without blocking. Returns the newest image
    /// that should be drawn, if any.
    pub fn poll(&mut self) -> Option<RasterImage> {
        let finished = self.worker.try_collect();
        self.accept_all(finished)
    }

    /// Block until every in-flight decode has finished or `timeout` passes,
    /// then behave like [`poll`](Self::poll).
    pub fn wait(&mut self, timeout: Duration) -> Option<RasterImage> {
        let finished = self.worker.collect_until(Instant::now() + timeout);
        self.accept_all(finished)
    }

    /// Decide whether a decoded snapshot may be applied. Stale results (older
    /// than what was last applied) and decode failures are dropped.
    pub fn accept(&mut self, decoded: DecodedSnapshot) -> Option<RasterImage> {
        if self.closed {
            return None;
        }
        if self.last_applied.is_some_and(|last| decoded.seq <= last) {
            log::debug!("Dropping stale snapshot #{}", decoded.seq);
            return None;
        }
        match decoded.result {
            Ok(image) => {
                self.last_applied = Some(decoded.seq);
                Some(image)
            }
            Err(e) => {
                log::warn!("Dropping undecodable snapshot #{}: {}", decoded.seq, e);
                None
            }
        }
    }

    /// Stop accepting snapshots. Decodes still in flight are never applied.
    pub fn close(&mut self) {
        self.closed = true;
        self.worker.shutdown();
    }

    fn accept_all(&mut self, mut finished: Vec<DecodedSnapshot>) -> Option<RasterImage> {
        finished.sort_by_key(|d| d.seq);
        let mut newest = None;
        for decoded in finished {
            if let Some(image) = self.accept(decoded) {
                newest = Some(image);
            }
        }
        newest
    }
}

impl Default for SnapshotSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Decode worker
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod worker {
    use super::*;
    use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
    use std::thread::{self, JoinHandle};

    /// Decodes snapshots on a background thread.
    pub struct DecodeWorker {
        job_tx: Option<Sender<PendingSnapshot>>,
        result_rx: Option<Receiver<DecodedSnapshot>>,
        in_flight: usize,
        _thread: Option<JoinHandle<()>>,
    }

    impl DecodeWorker {
        pub fn spawn() -> Self {
            let (job_tx, job_rx) = channel::<PendingSnapshot>();
            let (result_tx, result_rx) = channel::<DecodedSnapshot>();

            let handle = thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if result_tx.send(job.decode()).is_err() {
                        break;
                    }
                }
                log::debug!("Decode worker exiting");
            });

            Self {
                job_tx: Some(job_tx),
                result_rx: Some(result_rx),
                in_flight: 0,
                _thread: Some(handle),
            }
        }

        pub fn stopped() -> Self {
            Self {
                job_tx: None,
                result_rx: None,
                in_flight: 0,
                _thread: None,
            }
        }

        pub fn submit(&mut self, job: PendingSnapshot) {
            if let Some(ref tx) = self.job_tx {
                if tx.send(job).is_ok() {
                    self.in_flight += 1;
                }
            }
        }

        pub fn in_flight(&self) -> usize {
            self.in_flight
        }

        pub fn try_collect(&mut self) -> Vec<DecodedSnapshot> {
            let mut out = Vec::new();
            if let Some(ref rx) = self.result_rx {
                while let Ok(decoded) = rx.try_recv() {
                    out.push(decoded);
                }
            }
            self.in_flight = self.in_flight.saturating_sub(out.len());
            out
        }

        pub fn collect_until(&mut self, deadline: Instant) -> Vec<DecodedSnapshot> {
            let mut out = Vec::new();
            if let Some(ref rx) = self.result_rx {
                while out.len() < self.in_flight {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(remaining) {
                        Ok(decoded) => out.push(decoded),
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                            break;
                        }
                    }
                }
            }
            self.in_flight = self.in_flight.saturating_sub(out.len());
            out
        }

        pub fn shutdown(&mut self) {
            // Dropping the job sender ends the thread once its queue drains.
            self.job_tx = None;
            self.result_rx = None;
            self._thread = None;
            self.in_flight = 0;
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod worker {
    use super::*;

    /// Decodes snapshots inline; results are handed out on the next poll,
    /// matching the deferred behavior of the threaded worker.
    pub struct DecodeWorker {
        finished: Vec<DecodedSnapshot>,
        open: bool,
    }

    impl DecodeWorker {
        pub fn spawn() -> Self {
            Self {
                finished: Vec::new(),
                open: true,
            }
        }

        pub fn stopped() -> Self {
            Self {
                finished: Vec::new(),
                open: false,
            }
        }

        pub fn submit(&mut self, job: PendingSnapshot) {
            if self.open {
                self.finished.push(job.decode());
            }
        }

        pub fn in_flight(&self) -> usize {
            self.finished.len()
        }

        pub fn try_collect(&mut self) -> Vec<DecodedSnapshot> {
            std::mem::take(&mut self.finished)
        }

        pub fn collect_until(&mut self, _deadline: Instant) -> Vec<DecodedSnapshot> {
            self.try_collect()
        }

        pub fn shutdown(&mut self) {
            self.open = false;
            self.finished.clear();
        }
    }
}

use worker::DecodeWorker;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{PixelSurface, RasterSurface};

    const WAIT: Duration = Duration::from_secs(5);

    fn drawn_snapshot() -> Snapshot {
        let mut surface = PixelSurface::new(16, 16);
        surface.stroke_segment(
            kurbo::Point::new(2.0, 2.0),
            kurbo::Point::new(14.0, 14.0),
            &Default::default(),
        );
        codec::encode(&surface).unwrap()
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut sub = SnapshotSubscriber::new();
        assert_eq!(sub.receive(Snapshot::clear()), Received::Clear { seq: 1 });
        assert_eq!(sub.receive(drawn_snapshot()), Received::Decoding { seq: 2 });
        assert_eq!(sub.receive(Snapshot::clear()), Received::Clear { seq: 3 });
    }

    #[test]
    fn test_decoded_snapshot_is_applied() {
        let mut sub = SnapshotSubscriber::new();
        sub.receive(drawn_snapshot());
        let image = sub.wait(WAIT).expect("decoded image");
        assert_eq!(image.width, 16);
        assert_eq!(sub.last_applied(), Some(1));
        assert_eq!(sub.in_flight(), 0);
    }

    #[test]
    fn test_clear_after_image_wins() {
        let mut sub = SnapshotSubscriber::new();
        sub.receive(drawn_snapshot());
        assert_eq!(sub.receive(Snapshot::clear()), Received::Clear { seq: 2 });

        // The earlier image finishes decoding after the clear; it must not resurface.
        assert!(sub.wait(WAIT).is_none());
        assert_eq!(sub.last_applied(), Some(2));
    }

    #[test]
    fn test_stale_decode_is_dropped() {
        let mut sub = SnapshotSubscriber::new();
        let newer = PendingSnapshot { seq: 5, snapshot: drawn_snapshot() }.decode();
        let older = PendingSnapshot { seq: 3, snapshot: drawn_snapshot() }.decode();

        assert!(sub.accept(newer).is_some());
        assert!(sub.accept(older).is_none());
        assert_eq!(sub.last_applied(), Some(5));
    }

    #[test]
    fn test_undecodable_snapshot_is_dropped() {
        let mut sub = SnapshotSubscriber::new();
        sub.receive(Snapshot::from_data_url("data:image/png;base64,aGVsbG8="));
        assert!(sub.wait(WAIT).is_none());
        assert_eq!(sub.last_applied(), None);
    }

    #[test]
    fn test_newest_of_batch_is_returned() {
        let mut sub = SnapshotSubscriber::new();
        let mut wide = PixelSurface::new(32, 8);
        wide.stroke_segment(
            kurbo::Point::new(0.0, 4.0),
            kurbo::Point::new(32.0, 4.0),
            &Default::default(),
        );
        sub.receive(drawn_snapshot());
        sub.receive(codec::encode(&wide).unwrap());

        let image = sub.wait(WAIT).unwrap();
        assert_eq!(image.width, 32);
        assert_eq!(sub.last_applied(), Some(2));
    }

    #[test]
    fn test_closed_subscriber_applies_nothing() {
        let mut sub = SnapshotSubscriber::new();
        sub.receive(drawn_snapshot());
        sub.close();

        assert!(sub.wait(WAIT).is_none());
        assert_eq!(sub.receive(Snapshot::clear()), Received::Ignored);
        let late = PendingSnapshot { seq: 9, snapshot: drawn_snapshot() }.decode();
        assert!(sub.accept(late).is_none());
    }

    #[test]
    fn test_closed_constructor_ignores_everything() {
        let mut sub = SnapshotSubscriber::closed();
        assert!(sub.is_closed());
        assert_eq!(sub.receive(drawn_snapshot()), Received::Ignored);
        assert_eq!(sub.in_flight(), 0);
        assert!(sub.wait(Duration::from_millis(10)).is_none());
    }
}
