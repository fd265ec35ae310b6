//! # Tapir
//!
//! Human-like mobile search automation over ADB.
//!
//! Tapir drives a real Android browser through a search portal: it opens the
//! portal, survives first-run dialogs, types a query, scrolls until the
//! target domain's result is on screen, classifies the result block into
//! clickable parts (domain, title, description) and clicks one of them with
//! human-like placement and timing, then verifies the page actually changed.
//!
//! ## Features
//!
//! - **Dual-strategy location** - structured UI-tree queries with pixel
//!   template matching as the fallback, and as the only strategy on browsers
//!   whose accessibility tree hides web content
//! - **Two cache tiers** - an in-process TTL memo plus a persisted per-device
//!   file, so stable elements (search box, dialog buttons) skip the costly
//!   tree dump entirely
//! - **State-machine waits** - every step samples the screen through a small
//!   loading/prompt/ready/failed machine with per-step retry policies
//! - **Unbiased clicking** - kind-first weighted selection so pages with many
//!   description nodes do not skew which part of a result gets clicked
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tapir::{AdbDevice, BrowserProfile, Locator, SearchWorkflow, WorkflowConfig};
//!
//! #[tokio::main]
//! async fn main() -> tapir::Result<()> {
//!     let device = AdbDevice::connect("adb", "127.0.0.1:6555").await?;
//!     let profile = BrowserProfile::builtin_or_chrome("chrome");
//!
//!     let locator = Locator::new(&device, profile);
//!     let mut workflow = SearchWorkflow::new(&device, locator, WorkflowConfig::default());
//!
//!     let outcome = workflow.run("사이드컷 헤어샵", "sidecut.co.kr").await?;
//!     println!("clicked the {} after {} scrolls", outcome.clicked, outcome.scrolls);
//!     Ok(())
//! }
//! ```

pub mod adb;
pub mod cache;
pub mod classify;
pub mod device;
pub mod element;
pub mod error;
pub mod geometry;
pub mod human;
pub mod keyboard;
pub mod locator;
pub mod matcher;
pub mod profile;
pub mod scroll;
pub mod state;
pub mod tree;
pub mod workflow;

// Re-exports
pub use adb::AdbDevice;
pub use cache::{DeviceCache, QuerySignature, TtlCache};
pub use classify::{ClassifierConfig, LinkCandidate, LinkKind};
pub use device::Device;
pub use element::{Element, ElementSource};
pub use error::{Error, Result};
pub use geometry::{Region, Viewport};
pub use locator::Locator;
pub use matcher::TemplateMatch;
pub use profile::{BrowserProfile, SearchDirection};
pub use scroll::{ScrollConfig, ScrollHint, Scroller};
pub use state::{Backoff, PageState, RetryPolicy, StateDetector, StepSignature};
pub use tree::{Query, TreeSnapshot};
pub use workflow::{SearchWorkflow, VisitOutcome, WorkflowConfig};
