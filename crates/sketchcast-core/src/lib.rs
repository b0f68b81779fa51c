//! SketchCast Core Library
//!
//! Freehand drawing surface with whole-image snapshot sync for SketchCast.

pub mod canvas;
pub mod codec;
pub mod color;
pub mod config;
pub mod publisher;
pub mod session;
pub mod storage;
pub mod subscriber;
pub mod surface;
pub mod sync;
pub mod throttle;
pub mod tools;

pub use canvas::{PaintCanvas, SyncMode};
pub use codec::{CodecError, Snapshot};
pub use color::{PALETTE, PenColor};
pub use config::{ConfigError, RelayConfig};
pub use publisher::SnapshotPublisher;
pub use session::SessionId;
pub use storage::{DRAWING_KEY, MemoryStore, SnapshotStore, StorageError};
pub use subscriber::SnapshotSubscriber;
pub use surface::{Composite, PixelSurface, RasterImage, RasterSurface, StrokeStyle};
pub use sync::{
    ClientMessage, ConnectionState, PlatformWebSocket, ServerMessage, SyncError, SyncEvent,
    Transport,
};
pub use throttle::Throttle;
pub use tools::{DrawState, ToolKind, ToolManager};
