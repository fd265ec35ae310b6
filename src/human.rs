//! Human-like interaction timing
//!
//! Randomized tap placement, inter-action delays, and occasional reading
//! pauses so the click/scroll cadence does not look machine-generated.

use rand::Rng;
use std::cell::RefCell;
use std::time::Duration;
use tokio::time::sleep;

use crate::device::Device;
use crate::error::Result;
use crate::geometry::Region;

// Thread-local RNG
thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::thread_rng());
}

/// Tap placement jitter in pixels (x, y)
pub const TAP_JITTER: (i32, i32) = (15, 10);
/// Fraction of a region excluded per side when picking a tap point
pub const TAP_MARGIN: f32 = 0.15;
/// Probability of a reading pause after a scroll
pub const READING_PAUSE_PROBABILITY: f64 = 0.1;

pub fn random_range(min: u64, max: u64) -> u64 {
    RNG.with(|rng| rng.borrow_mut().gen_range(min..=max))
}

pub fn random_i32(min: i32, max: i32) -> i32 {
    RNG.with(|rng| rng.borrow_mut().gen_range(min..=max))
}

pub fn random_bool(probability: f64) -> bool {
    RNG.with(|rng| rng.borrow_mut().gen_bool(probability))
}

pub fn with_rng<T>(f: impl FnOnce(&mut rand::rngs::ThreadRng) -> T) -> T {
    RNG.with(|rng| f(&mut rng.borrow_mut()))
}

/// Sleep a uniformly random duration
pub async fn delay_ms(min: u64, max: u64) {
    sleep(Duration::from_millis(random_range(min, max))).await;
}

/// Natural pause like reading
pub async fn reading_pause() {
    delay_ms(2000, 4000).await;
}

/// Roll for an occasional reading pause, otherwise a short settle delay
pub async fn maybe_reading_pause() {
    if random_bool(READING_PAUSE_PROBABILITY) {
        tracing::debug!("reading pause");
        reading_pause().await;
    } else {
        delay_ms(100, 200).await;
    }
}

/// Type a query, routing Hangul through the on-screen keyboard
///
/// `input text` cannot inject Hangul key events, so any text containing
/// Korean goes through [`crate::keyboard`] tap by tap; everything else is
/// injected directly.
pub async fn type_text(device: &dyn Device, text: &str) -> Result<()> {
    if crate::keyboard::contains_hangul(text) {
        crate::keyboard::type_korean(device, text).await?;
    } else {
        device.input_text(text).await?;
    }
    delay_ms(300, 500).await;
    Ok(())
}

/// Tap at a point with placement jitter, then a short settle delay
pub async fn tap_jittered(device: &dyn Device, x: i32, y: i32) -> Result<()> {
    let vp = device.viewport();
    let jx = (x + random_i32(-TAP_JITTER.0, TAP_JITTER.0)).clamp(0, vp.width.saturating_sub(1) as i32);
    let jy = (y + random_i32(-TAP_JITTER.1, TAP_JITTER.1)).clamp(0, vp.height.saturating_sub(1) as i32);
    device.tap(jx, jy).await?;
    delay_ms(100, 300).await;
    Ok(())
}

/// Tap a uniformly random point inside a region's inset interior
pub async fn tap_region(device: &dyn Device, region: &Region) -> Result<()> {
    let (x, y) = with_rng(|rng| region.random_point_inset(TAP_MARGIN, rng));
    device.tap(x, y).await?;
    delay_ms(100, 300).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RawTree;
    use crate::geometry::Viewport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct TapLogger {
        viewport: Viewport,
        taps: Mutex<Vec<(i32, i32)>>,
        typed: Mutex<Vec<String>>,
    }

    impl TapLogger {
        fn new(viewport: Viewport) -> Self {
            Self {
                viewport,
                taps: Mutex::new(Vec::new()),
                typed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Device for TapLogger {
        fn id(&self) -> &str {
            "taplogger"
        }
        fn viewport(&self) -> Viewport {
            self.viewport
        }
        async fn dump_ui_tree(&self) -> Result<RawTree> {
            Ok(String::new())
        }
        async fn capture_screen(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn tap(&self, x: i32, y: i32) -> Result<()> {
            self.taps.lock().unwrap().push((x, y));
            Ok(())
        }
        async fn swipe(&self, _: i32, _: i32, _: i32, _: i32, _: u32) -> Result<()> {
            Ok(())
        }
        async fn input_text(&self, text: &str) -> Result<()> {
            self.typed.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_tap_stays_inside_screen() {
        let device = TapLogger::new(Viewport::new(100, 100));
        for _ in 0..50 {
            tap_jittered(&device, 99, 99).await.unwrap();
            tap_jittered(&device, 0, 0).await.unwrap();
        }
        for (x, y) in device.taps.lock().unwrap().iter() {
            // Pixel coordinates run 0..width, so 99 is the last valid column
            assert!((0..=99).contains(x));
            assert!((0..=99).contains(y));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_text_injects_plain_text_whole() {
        let device = TapLogger::new(Viewport::new(720, 1440));
        type_text(&device, "sidecut salon").await.unwrap();
        assert_eq!(*device.typed.lock().unwrap(), vec!["sidecut salon"]);
        assert!(device.taps.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_text_taps_keyboard_for_korean() {
        let device = TapLogger::new(Viewport::new(720, 1440));
        type_text(&device, "헤어샵").await.unwrap();
        // Every jamo lands as a key tap; nothing reaches text injection
        assert!(device.typed.lock().unwrap().is_empty());
        assert_eq!(device.taps.lock().unwrap().len(), decompose_len("헤어샵"));
    }

    fn decompose_len(text: &str) -> usize {
        crate::keyboard::decompose(text).len()
    }

    #[test]
    fn test_random_range_inclusive() {
        for _ in 0..100 {
            let v = random_range(3, 5);
            assert!((3..=5).contains(&v));
        }
    }

    #[test]
    fn test_random_i32_symmetric() {
        let mut seen_neg = false;
        let mut seen_pos = false;
        for _ in 0..500 {
            let v = random_i32(-15, 15);
            assert!((-15..=15).contains(&v));
            seen_neg |= v < 0;
            seen_pos |= v > 0;
        }
        assert!(seen_neg && seen_pos);
    }
}
