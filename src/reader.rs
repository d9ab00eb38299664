//! On-screen balance reader.
//!
//! The ETCMC GETH GUI shows the node's balance as `ETCPOW Balance: 42.5` in the
//! top-right corner of its window. The reader captures the primary monitor,
//! crops that corner, runs OCR on it and parses the number.
//!
//! This only works while the GUI runs fullscreen at the resolution the
//! [`CaptureRegion`] was measured for. A wrong region never produces a number, so
//! [`BalanceReader::read_balance`] keeps retrying until someone fixes the window.
//!
//! Every attempt leaves [`SCREEN_FILE`] and [`CROPPED_FILE`] in the working
//! directory; the notifier attaches the cropped one to the balance report.

use std::path::Path;
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbaImage};
use tokio::{task, time};

use crate::config::{CaptureRegion, Settings};
use crate::utils;

/// Label preceding the number in the GUI.
pub const BALANCE_LABEL: &str = "ETCPOW Balance: ";

/// Full screen capture of the latest attempt.
pub const SCREEN_FILE: &str = "screen.png";

/// Cropped balance region of the latest attempt.
pub const CROPPED_FILE: &str = "cropped.png";

/// Text recognition backed by `ocr-rs` (PaddleOCR models).
pub struct Ocr {
    engine: ocr_rs::OcrEngine,
}

impl Ocr {
    /// Loads the latin models from `dir`.
    ///
    /// The directory must contain `detection.mnn`, `latin_recognition.mnn` and
    /// `latin_charset.txt`.
    pub fn from_dir(dir: &Path) -> Result<Self, String> {
        let detection = dir.join("detection.mnn");
        let recognition = dir.join("latin_recognition.mnn");
        let charset = dir.join("latin_charset.txt");

        let missing: Vec<String> = [&detection, &recognition, &charset]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            log::error!("OCR model files missing dir={} files={:?}", dir.display(), missing);
            return Err(format!("OCR model files not found: {}", missing.join(", ")));
        }

        let thread_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let start = Instant::now();
        let engine = ocr_rs::OcrEngine::new(
            detection,
            recognition,
            charset,
            Some(ocr_rs::OcrEngineConfig {
                backend: ocr_rs::Backend::CPU,
                thread_count: thread_count as i32,
                // The label is small, light-on-dark text.
                precision_mode: ocr_rs::PrecisionMode::High,
                enable_parallel: thread_count > 1,
                min_result_confidence: 0.5,
                ..Default::default()
            }),
        )
        .map_err(|e| {
            log::error!("Failed to initialize OCR engine dir={}: {}", dir.display(), e);
            format!("Failed to initialize OCR engine: {e}")
        })?;

        log::info!(
            "OCR engine ready dir={} threads={} duration_ms={}",
            dir.display(),
            thread_count,
            start.elapsed().as_millis()
        );
        Ok(Self { engine })
    }

    /// Recognizes all text in `image`, fragments joined by single spaces.
    pub fn get_text(&self, image: &RgbaImage) -> Result<String, String> {
        let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let input = ocr_rs::preprocess::rgb_to_image(rgb.as_raw(), rgb.width(), rgb.height());

        let results = self
            .engine
            .recognize(&input)
            .map_err(|e| format!("OCR failed: {e}"))?;

        Ok(results
            .into_iter()
            .map(|r| r.text)
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Captures the primary monitor, or the first one if none reports as primary.
pub fn capture_screen() -> Result<RgbaImage, String> {
    let mut monitors = xcap::Monitor::all().map_err(|e| format!("Failed to list monitors: {e}"))?;
    if monitors.is_empty() {
        return Err("No monitor available for capture".to_string());
    }

    let index = monitors
        .iter()
        .position(|m| m.is_primary().unwrap_or(false))
        .unwrap_or(0);
    let monitor = monitors.swap_remove(index);

    let frame = monitor
        .capture_image()
        .map_err(|e| format!("Screen capture failed: {e}"))?;
    let (width, height) = (frame.width(), frame.height());

    RgbaImage::from_raw(width, height, frame.into_raw())
        .ok_or_else(|| format!("Screen capture returned a malformed {width}x{height} frame"))
}

/// Cuts the balance region out of a full-screen frame.
///
/// The region is anchored to the right edge and clamped to the frame.
pub fn crop_balance_region(frame: &RgbaImage, region: &CaptureRegion) -> Result<RgbaImage, String> {
    let (width, height) = frame.dimensions();
    let x = width.saturating_sub(region.width);
    let top = region.top.min(height);
    let bottom = region.bottom.min(height);

    if x >= width || bottom <= top {
        return Err(format!(
            "Capture region {region:?} lies outside the {width}x{height} screen"
        ));
    }

    Ok(image::imageops::crop_imm(frame, x, top, width - x, bottom - top).to_image())
}

/// Extracts the balance from recognized text such as `ETCPOW Balance: 42.5`.
pub fn parse_balance(text: &str) -> Result<f64, String> {
    let number = text.trim().replace(BALANCE_LABEL, "");
    let number = number.trim().replace(',', "");

    if number.is_empty() {
        return Err(format!("No balance in recognized text {text:?}"));
    }

    let balance: f64 = number
        .parse()
        .map_err(|e| format!("Could not parse {number:?} as a balance: {e}"))?;

    if !balance.is_finite() || balance < 0.0 {
        return Err(format!("Implausible balance {balance} read from {text:?}"));
    }
    Ok(balance)
}

/// Calls `attempt` until it yields a balance, sleeping `retry_delay` after every failure.
///
/// There is no attempt limit.
pub async fn read_until_valid<F>(mut attempt: F, retry_delay: Duration) -> f64
where
    F: FnMut() -> Result<f64, String>,
{
    let mut failures: u64 = 0;
    loop {
        match attempt() {
            Ok(balance) => {
                if failures > 0 {
                    log::info!("Balance readable again after failures={}", failures);
                }
                return balance;
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "Unreadable balance attempt={} retry_in_secs={}: {}",
                    failures,
                    retry_delay.as_secs_f64(),
                    e
                );
                eprintln!("[{}] {e}", utils::format_datetime(&chrono::Local::now()));
                time::sleep(retry_delay).await;
            }
        }
    }
}

/// Reads the node balance off the screen.
pub struct BalanceReader {
    ocr: Ocr,
    region: CaptureRegion,
    retry_delay: Duration,
}

impl BalanceReader {
    /// Creates a reader from an initialised OCR engine.
    pub fn new(ocr: Ocr, region: CaptureRegion, retry_delay: Duration) -> Self {
        Self {
            ocr,
            region,
            retry_delay,
        }
    }

    /// Loads the OCR models and takes region and back-off from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        let ocr = Ocr::from_dir(&settings.ocr_dir)?;
        Ok(Self::new(ocr, settings.capture, settings.retry_delay()))
    }

    /// Blocks until the screen shows a parseable balance.
    ///
    /// Capture, OCR and PNG encoding are blocking; they run through
    /// `block_in_place`, which needs the multi-threaded runtime.
    pub async fn read_balance(&self) -> f64 {
        read_until_valid(|| task::block_in_place(|| self.attempt()), self.retry_delay).await
    }

    fn attempt(&self) -> Result<f64, String> {
        let start = Instant::now();
        let frame = capture_screen()?;
        save_png(&frame, Path::new(SCREEN_FILE))?;

        let cropped = crop_balance_region(&frame, &self.region)?;
        save_png(&cropped, Path::new(CROPPED_FILE))?;

        let text = self.ocr.get_text(&cropped)?;
        log::debug!(
            "OCR finished text={:?} duration_ms={}",
            text,
            start.elapsed().as_millis()
        );

        let balance = parse_balance(&text)?;
        log::info!("Read balance tokens={}", balance);
        Ok(balance)
    }
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<(), String> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn parses_labelled_balance() {
        assert_eq!(parse_balance("ETCPOW Balance: 42.5"), Ok(42.5));
        assert_eq!(parse_balance("  ETCPOW Balance: 100  "), Ok(100.0));
        assert_eq!(parse_balance("7.25"), Ok(7.25));
        assert_eq!(parse_balance("ETCPOW Balance: 1,204.75"), Ok(1204.75));
    }

    #[test]
    fn rejects_unreadable_text() {
        assert!(parse_balance("").is_err());
        assert!(parse_balance("ETCPOW Balance: ").is_err());
        assert!(parse_balance("ETCPOW Ba1ance: 42.5").is_err());
        assert!(parse_balance("ETCPOW Balance: 4 2.5").is_err());
        assert!(parse_balance("ETCPOW Balance: -3").is_err());
        assert!(parse_balance("inf").is_err());
    }

    #[test]
    fn crops_top_right_corner() {
        let mut frame = RgbaImage::new(1920, 1080);
        frame.put_pixel(1720, 27, Rgba([255, 0, 0, 255]));
        frame.put_pixel(1919, 57, Rgba([0, 255, 0, 255]));

        let cropped = crop_balance_region(&frame, &CaptureRegion::default()).unwrap();
        assert_eq!(cropped.dimensions(), (200, 31));
        assert_eq!(*cropped.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*cropped.get_pixel(199, 30), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn crop_is_clamped_to_small_screens() {
        let frame = RgbaImage::new(150, 40);
        let cropped = crop_balance_region(&frame, &CaptureRegion::default()).unwrap();
        assert_eq!(cropped.dimensions(), (150, 13));

        let tiny = RgbaImage::new(150, 20);
        assert!(crop_balance_region(&tiny, &CaptureRegion::default()).is_err());
    }

    #[tokio::test]
    async fn retries_once_per_failed_attempt() {
        let texts = ["", "ETCPOW Balance: ??", "ETCPOW Balance: 42.5"];
        let calls = Cell::new(0usize);

        let balance = read_until_valid(
            || {
                let text = texts[calls.get()];
                calls.set(calls.get() + 1);
                parse_balance(text)
            },
            Duration::ZERO,
        )
        .await;

        assert_eq!(balance, 42.5);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_attempts_run_in_place() {
        let calls = Cell::new(0usize);
        let balance = read_until_valid(
            || {
                task::block_in_place(|| {
                    calls.set(calls.get() + 1);
                    std::thread::sleep(Duration::from_millis(5));
                    parse_balance(if calls.get() < 2 { "" } else { "ETCPOW Balance: 12.5" })
                })
            },
            Duration::ZERO,
        )
        .await;
        assert_eq!(balance, 12.5);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn first_valid_read_returns_immediately() {
        let calls = Cell::new(0usize);
        let balance = read_until_valid(
            || {
                calls.set(calls.get() + 1);
                Ok(95.0)
            },
            Duration::from_secs(3600),
        )
        .await;
        assert_eq!(balance, 95.0);
        assert_eq!(calls.get(), 1);
    }
}
