//! ADB transport
//!
//! Implements [`Device`] by shelling out to the `adb` binary. Screenshots
//! come over `exec-out screencap -p` as raw PNG bytes; the UI tree comes from
//! `uiautomator dump`; taps and swipes are `input` shell commands.
//!
//! No debugging protocol is ever opened toward the device, so nothing here
//! is observable server-side beyond ordinary input events.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::device::{Device, RawTree};
use crate::error::{Error, Result};
use crate::geometry::Viewport;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A device reached through `adb -s <address>`
pub struct AdbDevice {
    adb_path: String,
    address: String,
    viewport: Viewport,
    command_timeout: Duration,
}

impl AdbDevice {
    /// Connect to a device at `address` (e.g. `"98.98.125.37:20920"`)
    ///
    /// Issues `adb connect` and reads the reported screen size.
    pub async fn connect(adb_path: &str, address: &str) -> Result<Self> {
        let mut device = Self {
            adb_path: adb_path.to_string(),
            address: address.to_string(),
            viewport: Viewport::new(0, 0),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        };

        let out = device.run(&["connect", address]).await?;
        let text = String::from_utf8_lossy(&out);
        if text.contains("cannot") || text.contains("failed") {
            return Err(Error::device(format!("adb connect {}: {}", address, text.trim())));
        }

        device.viewport = device.detect_screen_size().await?;
        tracing::info!(address, viewport = %device.viewport, "adb device connected");
        Ok(device)
    }

    /// Build without probing the transport (screen size supplied by config)
    pub fn with_viewport(adb_path: &str, address: &str, viewport: Viewport) -> Self {
        Self {
            adb_path: adb_path.to_string(),
            address: address.to_string(),
            viewport,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new(&self.adb_path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| Error::device(format!("adb {} timed out", args.join(" "))))?
        .map_err(|e| Error::device_io(format!("adb {}", args.join(" ")), e))?;

        if !output.status.success() {
            return Err(Error::device(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn shell(&self, command: &str) -> Result<String> {
        let out = self.run(&["-s", &self.address, "shell", command]).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn detect_screen_size(&self) -> Result<Viewport> {
        // "Physical size: 720x1440"
        let out = self.shell("wm size").await?;
        let dims = out
            .lines()
            .find_map(|line| line.rsplit(' ').next())
            .and_then(|s| s.trim().split_once('x'))
            .and_then(|(w, h)| Some(Viewport::new(w.parse().ok()?, h.parse().ok()?)));
        dims.ok_or_else(|| Error::device(format!("could not parse screen size from: {}", out.trim())))
    }
}

#[async_trait]
impl Device for AdbDevice {
    fn id(&self) -> &str {
        &self.address
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn dump_ui_tree(&self) -> Result<RawTree> {
        self.shell("uiautomator dump /sdcard/screen.xml").await?;
        let xml = self.shell("cat /sdcard/screen.xml").await?;
        tracing::debug!(bytes = xml.len(), "ui tree dumped");
        Ok(xml)
    }

    async fn capture_screen(&self) -> Result<Vec<u8>> {
        let png = self
            .run(&["-s", &self.address, "exec-out", "screencap", "-p"])
            .await?;
        if png.is_empty() {
            return Err(Error::device("screencap returned no data"));
        }
        tracing::debug!(bytes = png.len(), "screen captured");
        Ok(png)
    }

    async fn tap(&self, x: i32, y: i32) -> Result<()> {
        let x = x.clamp(0, self.viewport.width.saturating_sub(1) as i32);
        let y = y.clamp(0, self.viewport.height.saturating_sub(1) as i32);
        tracing::debug!(x, y, "tap");
        self.shell(&format!("input tap {} {}", x, y)).await?;
        Ok(())
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()> {
        tracing::debug!(x1, y1, x2, y2, duration_ms, "swipe");
        self.shell(&format!(
            "input swipe {} {} {} {} {}",
            x1, y1, x2, y2, duration_ms
        ))
        .await?;
        Ok(())
    }

    async fn key_event(&self, keycode: u32) -> Result<()> {
        self.shell(&format!("input keyevent {}", keycode)).await?;
        Ok(())
    }

    async fn input_text(&self, text: &str) -> Result<()> {
        // `input text` treats spaces as separators; %s is the documented escape
        let escaped = text.replace(' ', "%s");
        self.shell(&format!("input text \"{}\"", escaped)).await?;
        Ok(())
    }

    async fn open_url(&self, url: &str, package: &str) -> Result<()> {
        self.shell(&format!(
            "am start -a android.intent.action.VIEW -d \"{}\" -p {}",
            url, package
        ))
        .await?;
        Ok(())
    }
}

/// Android keycodes used by the workflow
pub mod keycodes {
    pub const ENTER: u32 = 66;
    pub const BACK: u32 = 4;
    pub const HOME: u32 = 3;
}
