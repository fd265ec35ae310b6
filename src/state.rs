//! Page state detection and retry policy
//!
//! Each workflow step waits on a small state machine: the screen is sampled
//! repeatedly and classified as loading, showing a first-run prompt, ready,
//! or definitively failed. The retry policy decides whether that sampling is
//! allowed to give up: steps like first-run dismissal retry indefinitely
//! because "failed" is not a valid terminal state for them, while post-action
//! waits are bounded so a dead page cannot hang a session.

use image::GrayImage;
use std::time::Duration;

use crate::cache::DeviceCache;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::human;
use crate::matcher;
use crate::tree::{Query, TreeSnapshot};

/// Delay schedule between samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^attempt`, capped
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay before the given retry attempt (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, cap } => {
                let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
                exp.min(*cap)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(500))
    }
}

/// Whether a sampling loop must eventually give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Never times out; only a definitive negative signal terminates
    Unbounded { backoff: Backoff },
    /// Gives up after `max_attempts` samples
    Bounded { max_attempts: u32, backoff: Backoff },
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        RetryPolicy::Unbounded {
            backoff: Backoff::default(),
        }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        RetryPolicy::Bounded {
            max_attempts,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        match self {
            RetryPolicy::Unbounded { .. } => RetryPolicy::Unbounded { backoff },
            RetryPolicy::Bounded { max_attempts, .. } => RetryPolicy::Bounded {
                max_attempts,
                backoff,
            },
        }
    }

    pub fn backoff(&self) -> Backoff {
        match self {
            RetryPolicy::Unbounded { backoff } | RetryPolicy::Bounded { backoff, .. } => *backoff,
        }
    }

    /// `None` for unbounded policies
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            RetryPolicy::Unbounded { .. } => None,
            RetryPolicy::Bounded { max_attempts, .. } => Some(*max_attempts),
        }
    }
}

/// Classification of one screen sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Loading,
    PromptVisible,
    Ready,
    Failed,
}

impl std::fmt::Display for PageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PageState::Loading => "loading",
            PageState::PromptVisible => "prompt_visible",
            PageState::Ready => "ready",
            PageState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What "ready" and "failed" look like for one step
#[derive(Default)]
pub struct StepSignature {
    pub name: String,
    /// Tree query whose presence marks the step ready
    pub ready_query: Option<Query>,
    /// Raw-snapshot substrings any of which marks the step ready
    pub ready_markers: Vec<String>,
    /// Template whose on-screen presence marks the step ready
    /// (used when the tree does not expose web content)
    pub ready_template: Option<GrayImage>,
    /// First-run dialog button labels, in dismissal order
    pub prompt_labels: Vec<String>,
    /// Raw-snapshot substrings marking a definitive failure (error page)
    pub error_markers: Vec<String>,
}

impl StepSignature {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Samples the screen until a step signature resolves
///
/// Owns the prompt-dismissal bookkeeping for one step: the last-dismissed
/// region, and whether any prompt has been handled yet.
pub struct StateDetector<'d, 'c> {
    device: &'d dyn Device,
    /// Sample with the template matcher instead of tree queries for the
    /// ready signal (coordinate-only browsers)
    template_mode: bool,
    /// Persisted first-run button regions and the browser name keying them
    persisted: Option<(&'c mut DeviceCache, String)>,
    last_dismissed: Option<Region>,
    dismissed_any: bool,
}

impl<'d, 'c> StateDetector<'d, 'c> {
    pub fn new(device: &'d dyn Device) -> Self {
        Self {
            device,
            template_mode: false,
            persisted: None,
            last_dismissed: None,
            dismissed_any: false,
        }
    }

    /// Prefer the ready template over tree queries when sampling
    pub fn template_mode(mut self, enabled: bool) -> Self {
        self.template_mode = enabled;
        self
    }

    /// Remember dismissed first-run buttons across sessions
    ///
    /// A cached button region is replayed before the first tree dump, and
    /// every fresh dismissal is written through under
    /// `("first_run", browser, label, viewport)`.
    pub fn with_persisted(mut self, cache: &'c mut DeviceCache, browser: impl Into<String>) -> Self {
        self.persisted = Some((cache, browser.into()));
        self
    }

    /// Drive sampling until `Ready`, `Failed`, or policy exhaustion
    ///
    /// `Failed` comes only from an explicit error marker; a bounded policy
    /// running out of attempts is an [`Error::StepFailed`] carrying the step
    /// name and last observed state.
    pub async fn wait_ready(
        &mut self,
        signature: &StepSignature,
        policy: RetryPolicy,
    ) -> Result<PageState> {
        let mut attempt: u32 = 0;
        let mut last_state = PageState::Loading;

        loop {
            match self.sample(signature).await? {
                PageState::Ready => {
                    tracing::debug!(step = %signature.name, attempt, "ready");
                    return Ok(PageState::Ready);
                }
                PageState::Failed => {
                    tracing::warn!(step = %signature.name, attempt, "error marker present");
                    return Ok(PageState::Failed);
                }
                state => last_state = state,
            }

            if let Some(max) = policy.max_attempts() {
                if attempt + 1 >= max {
                    return Err(Error::step_failed(
                        &signature.name,
                        max,
                        last_state.to_string(),
                    ));
                }
            }

            tokio::time::sleep(policy.backoff().delay(attempt)).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Take one sample and classify it, dismissing a visible prompt
    async fn sample(&mut self, signature: &StepSignature) -> Result<PageState> {
        // A persisted button region from an earlier session replays before
        // the first dump; the dump is the cost the cache exists to skip.
        if !self.dismissed_any {
            if let Some(region) = self.cached_prompt_region(signature) {
                tracing::info!(step = %signature.name, "replaying cached first-run dismissal");
                human::tap_region(self.device, &region).await?;
                self.last_dismissed = Some(region);
                self.dismissed_any = true;
                return Ok(PageState::PromptVisible);
            }
        }

        // Native dialogs are exposed in the tree on every browser; only web
        // content needs the template path. Dumps taken mid-transition can be
        // truncated, so a parse failure counts as "not ready yet".
        let raw = self.device.dump_ui_tree().await?;
        let tree = match TreeSnapshot::parse(&raw) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!(step = %signature.name, error = %e, "unreadable sample");
                return Ok(PageState::Loading);
            }
        };

        if !signature.error_markers.is_empty() && tree.contains_any(&signature.error_markers) {
            return Ok(PageState::Failed);
        }

        if let Some((label_idx, button)) = tree.find_button(&signature.prompt_labels) {
            if self.last_dismissed == Some(button.region) {
                // Same region resurfacing before anything new appeared: the
                // tap landed and the dump is stale. Tapping again would hit
                // whatever sits under the closing dialog.
                tracing::debug!(step = %signature.name, "prompt already handled, advancing");
                return Ok(PageState::Ready);
            }
            tracing::info!(
                step = %signature.name,
                label = %signature.prompt_labels[label_idx],
                "dismissing first-run prompt"
            );
            human::tap_region(self.device, &button.region).await?;
            let viewport = self.device.viewport();
            if let Some((cache, browser)) = &mut self.persisted {
                cache.insert(
                    "first_run",
                    browser,
                    &signature.prompt_labels[label_idx],
                    viewport,
                    button.region,
                )?;
            }
            self.last_dismissed = Some(button.region);
            self.dismissed_any = true;
            return Ok(PageState::PromptVisible);
        }

        if self.is_ready(signature, &tree).await? {
            return Ok(PageState::Ready);
        }

        // The ready-signal text is not reliably detectable on every browser;
        // once a prompt has been dismissed, its disappearance is itself
        // evidence of the transition.
        if self.dismissed_any {
            return Ok(PageState::Ready);
        }

        Ok(PageState::Loading)
    }

    fn cached_prompt_region(&self, signature: &StepSignature) -> Option<Region> {
        let (cache, browser) = self.persisted.as_ref()?;
        let viewport = self.device.viewport();
        signature
            .prompt_labels
            .iter()
            .find_map(|label| cache.get("first_run", browser, label, viewport))
    }

    async fn is_ready(&self, signature: &StepSignature, tree: &TreeSnapshot) -> Result<bool> {
        // No ready signal configured: the step is ready as soon as nothing
        // blocks it (prompt handling already ran before this point)
        if signature.ready_query.is_none()
            && signature.ready_markers.is_empty()
            && signature.ready_template.is_none()
        {
            return Ok(true);
        }
        if self.template_mode {
            if let Some(template) = &signature.ready_template {
                let png = self.device.capture_screen().await?;
                let screen = matcher::decode_screenshot(&png)?;
                return Ok(
                    matcher::find_template(&screen, template, matcher::DEFAULT_THRESHOLD)?
                        .is_some(),
                );
            }
        }
        if let Some(query) = &signature.ready_query {
            if !tree.find(query).is_empty() {
                return Ok(true);
            }
        }
        if !signature.ready_markers.is_empty() && tree.contains_any(&signature.ready_markers) {
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let b = Backoff::Fixed(Duration::from_millis(300));
        assert_eq!(b.delay(0), Duration::from_millis(300));
        assert_eq!(b.delay(7), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(5),
        };
        assert_eq!(b.delay(0), Duration::from_millis(500));
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(3), Duration::from_secs(4));
        assert_eq!(b.delay(4), Duration::from_secs(5));
        assert_eq!(b.delay(30), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_attempts() {
        assert_eq!(RetryPolicy::unbounded().max_attempts(), None);
        assert_eq!(RetryPolicy::bounded(5).max_attempts(), Some(5));
    }
}
