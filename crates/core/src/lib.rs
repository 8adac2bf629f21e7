//! Core library for the Frame Kit components.
//!
//! Two cooperating pieces live here: a shared [`FrameClock`] that fans frame
//! timing out to registered callbacks, and a [`SpriteSheetPlayer`] that steps
//! through a sprite atlas at a fixed cadence. Everything the host provides
//! (time, per-frame scheduling, asset loading, drawing) sits behind a trait so
//! the same code runs against a real host or the in-memory doubles used by
//! the tests.

pub mod assets;
pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod schedule;
pub mod sprite;
pub mod surface;
pub mod time;

pub use assets::{
    AssetLoader, Bitmap, BitmapCallback, FetchCallback, FetchResponse, FrameMap, FrameRect,
    MemoryAssetLoader,
};
pub use clock::{frame_callback, FrameCallback, FrameClock, FrameTimingEvent};
pub use config::{AppConfig, ClockConfig, LoadFailurePolicy, PlayerConfig};
pub use error::{FrameKitError, LoadFailure, Result};
pub use host::HostServices;
pub use schedule::{
    FrameRequestCallback, FrameRequestId, FrameScheduler, LoopState, ManualFrameScheduler,
};
pub use sprite::{PlayerState, SpriteSheetPlayer, SpriteSource, UpdateMode};
pub use surface::{
    DrawCommand, DrawLog, DrawSurface, Rect, RecordingSurface, RecordingSurfaceHost, SurfaceHost,
};
pub use time::{ManualTimeSource, MonotonicTimeSource, TimeSource};
