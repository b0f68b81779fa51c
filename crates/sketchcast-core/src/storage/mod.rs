//! Storage abstraction for local snapshot persistence.

mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod local;

pub use memory::MemoryStore;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorageStore;

use crate::codec::Snapshot;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Key of the single saved drawing.
pub const DRAWING_KEY: &str = "drawing";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Nothing to save: the canvas is not mounted")]
    NotMounted,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for snapshot storage backends.
///
/// Each key holds at most one snapshot; saving replaces it.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait SnapshotStore: Send + Sync {
    /// Save a snapshot under `key`.
    fn save(&self, key: &str, snapshot: &Snapshot) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the snapshot under `key`, if any.
    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Snapshot>>>;

    /// Delete the snapshot under `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// Trait for snapshot storage backends (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait SnapshotStore {
    /// Save a snapshot under `key`.
    fn save(&self, key: &str, snapshot: &Snapshot) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the snapshot under `key`, if any.
    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Snapshot>>>;

    /// Delete the snapshot under `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// Minimal executor for driving storage futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
