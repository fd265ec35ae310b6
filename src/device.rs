//! Device access port
//!
//! The four transport primitives the core consumes: tree dump, screenshot,
//! tap, swipe. Everything above this trait is transport-agnostic; the ADB
//! implementation lives in [`crate::adb`], and tests script a mock.
//!
//! All primitives are fire-and-forget at the interaction level: a failed tap
//! needs no rollback, and a workflow aborted between calls leaves no in-flight
//! state on the device.

use async_trait::async_trait;

use crate::error::Result;
use crate::geometry::Viewport;

/// Raw serialized UI-tree snapshot as produced by the device
///
/// Kept as the raw string so the dump (the dominant per-step cost) can be
/// taken once and parsed/queried many times by [`crate::tree::TreeSnapshot`].
pub type RawTree = String;

/// Transport primitives for one physical device
#[async_trait]
pub trait Device: Send + Sync {
    /// Stable identity of the device (used to name its persisted cache file)
    fn id(&self) -> &str;

    /// Screen dimensions
    fn viewport(&self) -> Viewport;

    /// Dump the current UI tree
    async fn dump_ui_tree(&self) -> Result<RawTree>;

    /// Capture the screen as encoded PNG bytes
    async fn capture_screen(&self) -> Result<Vec<u8>>;

    /// Tap at absolute screen coordinates
    async fn tap(&self, x: i32, y: i32) -> Result<()>;

    /// Swipe from (x1, y1) to (x2, y2) over `duration_ms`
    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()>;

    /// Send a keycode (enter, back). Default implementations exist so pure
    /// pointer transports only implement the four primitives.
    async fn key_event(&self, _keycode: u32) -> Result<()> {
        Ok(())
    }

    /// Type a text string into the focused input
    async fn input_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Launch an app/activity with a URL intent
    async fn open_url(&self, _url: &str, _package: &str) -> Result<()> {
        Ok(())
    }
}
