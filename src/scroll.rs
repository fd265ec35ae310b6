//! Compensated scrolling
//!
//! Swipes are randomized so the scroll cadence looks human, but the
//! randomness is debt-accounted: each swipe's deviation from the base
//! distance is carried forward and paid back by the next one, so N swipes
//! travel close to N x base pixels. That is what makes externally computed
//! scroll distances usable at all.
//!
//! Externally computed distances are still unreliable predictors of final
//! position, so hint application performs only half the computed swipes
//! before the caller switches to incremental search-and-scroll.

use async_trait::async_trait;

use crate::device::Device;
use crate::error::Result;
use crate::geometry::Viewport;
use crate::human;
use crate::profile::BrowserProfile;

/// Swipe distance parameters
#[derive(Debug, Clone, Copy)]
pub struct ScrollConfig {
    /// Nominal distance per swipe in pixels
    pub base_distance: i32,
    /// Max deviation from the nominal distance
    pub jitter: i32,
    /// Swipe gesture duration range in ms
    pub duration_ms: (u32, u32),
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            base_distance: 400,
            jitter: 100,
            duration_ms: (300, 600),
        }
    }
}

/// Optional external coordinate-calculation service
///
/// Chromium-family only; supplies a suggested total scroll distance for a
/// (query, domain) pair. The core treats the suggestion as a rough starting
/// point, never as ground truth.
#[async_trait]
pub trait ScrollHint: Send + Sync {
    async fn suggested_scroll(
        &self,
        query: &str,
        domain: &str,
        viewport: Viewport,
    ) -> Result<Option<f64>>;
}

/// Debt-accounted scroller for one device session
pub struct Scroller<'d> {
    device: &'d dyn Device,
    config: ScrollConfig,
    debt: i32,
}

impl<'d> Scroller<'d> {
    pub fn new(device: &'d dyn Device) -> Self {
        Self::with_config(device, ScrollConfig::default())
    }

    pub fn with_config(device: &'d dyn Device, config: ScrollConfig) -> Self {
        Self {
            device,
            config,
            debt: 0,
        }
    }

    /// Accumulated deviation from `swipes x base_distance`
    pub fn debt(&self) -> i32 {
        self.debt
    }

    /// Start a new scroll sequence
    pub fn reset_debt(&mut self) {
        self.debt = 0;
    }

    fn scroll_x(&self) -> i32 {
        self.device.viewport().width as i32 / 2 + human::random_i32(-30, 30)
    }

    fn duration(&self) -> u32 {
        human::random_range(self.config.duration_ms.0 as u64, self.config.duration_ms.1 as u64)
            as u32
    }

    /// One randomized downward swipe, paying back accumulated debt
    ///
    /// Returns the distance actually swiped.
    pub async fn scroll_down_compensated(&mut self) -> Result<i32> {
        let base = self.config.base_distance;
        let jitter = self.config.jitter;

        let target = base - self.debt;
        let mut min_dist = (base - jitter).max(target - jitter / 2);
        // Capped at base: the hint math assumes base-distance swipes, and
        // overshooting past the target is costlier than falling short
        let mut max_dist = base.min(target + jitter / 2);
        if min_dist > max_dist {
            std::mem::swap(&mut min_dist, &mut max_dist);
        }

        let actual = human::random_i32(min_dist, max_dist);
        self.debt += actual - base;

        self.swipe_down(actual).await?;
        Ok(actual)
    }

    /// One downward swipe of roughly `distance` px (uncompensated)
    pub async fn scroll_down(&self, distance: i32) -> Result<i32> {
        self.swipe_down(distance).await?;
        Ok(distance)
    }

    /// One upward swipe of roughly `distance` px
    pub async fn scroll_up(&self, distance: i32) -> Result<()> {
        let vp = self.device.viewport();
        let start_y = (vp.height as f64 * 0.28) as i32;
        let end_y = (start_y + distance).min(vp.height as i32 - 1);
        self.device
            .swipe(self.scroll_x(), start_y, self.scroll_x(), end_y, self.duration())
            .await
    }

    async fn swipe_down(&self, distance: i32) -> Result<()> {
        let vp = self.device.viewport();
        let start_y = (vp.height as f64 * 0.76) as i32;
        let end_y = (start_y - distance).max(1);
        self.device
            .swipe(self.scroll_x(), start_y, self.scroll_x(), end_y, self.duration())
            .await
    }

    /// Convert a suggested total distance into swipes and perform half
    ///
    /// Applies the profile's scroll factor, then executes 50% of the
    /// computed swipes with compensation. Returns the number performed;
    /// the caller continues with incremental search in the profile's
    /// search direction.
    pub async fn apply_hint(&mut self, hint_px: f64, profile: &BrowserProfile) -> Result<u32> {
        let corrected = hint_px * profile.scroll_factor;
        let full_swipes = (corrected / self.config.base_distance as f64).floor() as i64;
        if full_swipes <= 0 {
            return Ok(0);
        }
        let half = ((full_swipes / 2).max(1)) as u32;
        tracing::info!(
            hint_px,
            scroll_factor = profile.scroll_factor,
            full_swipes,
            performing = half,
            "applying scroll hint"
        );

        self.reset_debt();
        for i in 0..half {
            self.scroll_down_compensated().await?;
            human::maybe_reading_pause().await;
            if (i + 1) % 5 == 0 {
                tracing::debug!(done = i + 1, of = half, debt = self.debt, "hint scroll progress");
            }
        }
        Ok(half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct SwipeRecorder {
        viewport: Viewport,
        swipes: Mutex<Vec<(i32, i32, i32, i32)>>,
    }

    impl SwipeRecorder {
        fn new() -> Self {
            Self {
                viewport: Viewport::new(720, 1440),
                swipes: Mutex::new(Vec::new()),
            }
        }

        fn distances(&self) -> Vec<i32> {
            self.swipes
                .lock()
                .unwrap()
                .iter()
                .map(|(_, y1, _, y2)| y1 - y2)
                .collect()
        }
    }

    #[async_trait]
    impl Device for SwipeRecorder {
        fn id(&self) -> &str {
            "recorder"
        }
        fn viewport(&self) -> Viewport {
            self.viewport
        }
        async fn dump_ui_tree(&self) -> Result<String> {
            unreachable!("scroller never dumps the tree")
        }
        async fn capture_screen(&self) -> Result<Vec<u8>> {
            unreachable!("scroller never captures the screen")
        }
        async fn tap(&self, _x: i32, _y: i32) -> Result<()> {
            Ok(())
        }
        async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, _ms: u32) -> Result<()> {
            self.swipes.lock().unwrap().push((x1, y1, x2, y2));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_compensated_total_tracks_base() {
        let device = SwipeRecorder::new();
        let mut scroller = Scroller::new(&device);

        const N: i32 = 20;
        for _ in 0..N {
            scroller.scroll_down_compensated().await.unwrap();
        }

        let total: i32 = device.distances().iter().sum();
        let expected = N * scroller.config.base_distance;
        // Residual error is at most the final unpaid debt
        assert!(
            (total - expected).abs() <= scroller.config.jitter,
            "total {} vs expected {}",
            total,
            expected
        );
        assert_eq!(total - expected, scroller.debt());
    }

    #[tokio::test]
    async fn test_swipes_vary_but_stay_bounded() {
        let device = SwipeRecorder::new();
        let mut scroller = Scroller::new(&device);

        for _ in 0..30 {
            scroller.scroll_down_compensated().await.unwrap();
        }
        let distances = device.distances();
        let base = scroller.config.base_distance;
        let jitter = scroller.config.jitter;
        for d in &distances {
            assert!(*d <= base, "swipe {} exceeds base cap", d);
            assert!(*d >= base - 2 * jitter, "swipe {} implausibly short", d);
        }
    }

    #[tokio::test]
    async fn test_apply_hint_performs_half_the_swipes() {
        let device = SwipeRecorder::new();
        let mut scroller = Scroller::new(&device);
        let profile = BrowserProfile::builtin("chrome").unwrap();

        // 4000px hint * 1.1 factor = 4400px = 11 swipes -> 5 performed
        let performed = scroller.apply_hint(4000.0, &profile).await.unwrap();
        assert_eq!(performed, 5);
        assert_eq!(device.distances().len(), 5);
    }

    #[tokio::test]
    async fn test_apply_hint_zero_for_tiny_distance() {
        let device = SwipeRecorder::new();
        let mut scroller = Scroller::new(&device);
        let profile = BrowserProfile::builtin("firefox").unwrap();

        let performed = scroller.apply_hint(100.0, &profile).await.unwrap();
        assert_eq!(performed, 0);
        assert!(device.distances().is_empty());
    }
}
