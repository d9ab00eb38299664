//! Node settings: loading, first-run wizard and persistence.
//!
//! Settings live in a single JSON file next to the binary (by default
//! `config.json`). The file layout is shared with earlier releases of the tool,
//! which is why some keys keep their camelCase spelling:
//!
//! ```json
//! {
//!   "fiat": "usd",
//!   "discordWebhook": "https://discord.com/api/webhooks/...",
//!   "node_name": "rig-01",
//!   "delay": 7200.0,
//!   "estimated_daily_earnings": 8.2,
//!   "discord_user_id": null
//! }
//! ```
//!
//! Settings are read once at startup and never mutated afterwards; the loop gets
//! its own copy and passes references down to each component.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fiat currencies the price API is queried with.
pub const FIAT_CURRENCIES: [&str; 9] = ["usd", "aud", "brl", "cad", "chf", "clp", "cny", "eur", "gbp"];

/// Default location of the settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config.json";

fn default_ocr_dir() -> PathBuf {
    PathBuf::from("ocr")
}

fn default_retry_delay() -> f64 {
    10.0
}

/// Screen region holding the balance label, anchored to the top-right corner.
///
/// The defaults match the ETCMC GETH GUI running fullscreen. Any other layout or
/// resolution needs its own values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRegion {
    /// Width of the region, measured leftwards from the right screen edge.
    pub width: u32,
    /// First row of the region.
    pub top: u32,
    /// Row just past the region.
    pub bottom: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            width: 200,
            top: 27,
            bottom: 58,
        }
    }
}

/// Operator settings, immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Fiat currency code, one of [`FIAT_CURRENCIES`].
    pub fiat: String,
    /// Discord webhook the reports are posted to.
    #[serde(rename = "discordWebhook")]
    pub webhook_url: String,
    /// Free-form label shown as the author of every report.
    pub node_name: String,
    /// Seconds between two reports.
    #[serde(rename = "delay")]
    pub delay_secs: f64,
    /// Expected ETCPOW tokens mined per day.
    pub estimated_daily_earnings: f64,
    /// Discord user pinged with every balance report.
    #[serde(default)]
    pub discord_user_id: Option<String>,
    #[serde(default)]
    pub capture: CaptureRegion,
    /// Directory holding the OCR model files.
    #[serde(default = "default_ocr_dir")]
    pub ocr_dir: PathBuf,
    /// Seconds to wait before re-reading the screen after an unreadable balance.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Timeout in seconds for price and webhook requests. Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<f64>,
}

impl Settings {
    /// Builds settings from the values the wizard asks for, every optional key at its default.
    pub fn new(
        fiat: impl Into<String>,
        webhook_url: impl Into<String>,
        node_name: impl Into<String>,
        delay_secs: f64,
        estimated_daily_earnings: f64,
        discord_user_id: Option<String>,
    ) -> Self {
        Self {
            fiat: fiat.into(),
            webhook_url: webhook_url.into(),
            node_name: node_name.into(),
            delay_secs,
            estimated_daily_earnings,
            discord_user_id,
            capture: CaptureRegion::default(),
            ocr_dir: default_ocr_dir(),
            retry_delay: default_retry_delay(),
            request_timeout: None,
        }
    }

    /// Interval between two reports.
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    /// Back-off after an unreadable balance.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }

    /// Timeout applied to price and webhook requests, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs_f64)
    }

    /// Mention id with blank values treated as absent.
    pub fn mention(&self) -> Option<&str> {
        self.discord_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Checks the invariants the rest of the program relies on.
    pub fn validate(&self) -> Result<(), String> {
        if !is_supported_fiat(&self.fiat) {
            return Err(format!(
                "unsupported fiat '{}', expected one of {:?}",
                self.fiat, FIAT_CURRENCIES
            ));
        }
        if self.webhook_url.trim().is_empty() {
            return Err("discordWebhook must not be empty".to_string());
        }
        if !is_positive(self.delay_secs) || !fits_duration(self.delay_secs) {
            return Err(format!("delay must be a positive number of seconds, got {}", self.delay_secs));
        }
        if !is_positive(self.estimated_daily_earnings) {
            return Err(format!(
                "estimated_daily_earnings must be positive, got {}",
                self.estimated_daily_earnings
            ));
        }
        if self.retry_delay < 0.0 || !fits_duration(self.retry_delay) {
            return Err(format!("retry_delay must be a non-negative number of seconds, got {}", self.retry_delay));
        }
        match self.request_timeout {
            Some(timeout) if !is_positive(timeout) || !fits_duration(timeout) => {
                return Err(format!("request_timeout must be a positive number of seconds, got {timeout}"));
            }
            _ => {}
        }
        if self.capture.width == 0 || self.capture.bottom <= self.capture.top {
            return Err(format!("capture region is empty: {:?}", self.capture));
        }
        Ok(())
    }

    /// Reads and validates a settings file. Any problem is fatal to the caller.
    pub fn load(path: &Path) -> Result<Self, String> {
        log::info!("Loading settings file={}", path.display());

        let data = fs::read_to_string(path).map_err(|e| {
            log::error!("Failed to read settings file={}: {}", path.display(), e);
            format!("Failed to read {}: {e}", path.display())
        })?;

        let settings: Settings = serde_json::from_str(&data).map_err(|e| {
            log::error!("Failed to parse settings file={}: {}", path.display(), e);
            format!("Invalid settings in {}: {e}", path.display())
        })?;

        settings
            .validate()
            .map_err(|e| format!("Invalid settings in {}: {e}", path.display()))?;

        log::debug!(
            "Loaded settings node={} fiat={} delay_secs={}",
            settings.node_name,
            settings.fiat,
            settings.delay_secs
        );
        Ok(settings)
    }

    /// Writes the settings as pretty JSON.
    ///
    /// Writes to a sibling temp file first and renames it over the target so an
    /// interrupted save never leaves a truncated file behind.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;

        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        fs::write(&temp_path, data).map_err(|e| {
            log::error!("Failed to write temp file file={}: {}", temp_path.display(), e);
            format!("Failed to write {}: {e}", temp_path.display())
        })?;

        if let Err(e) = fs::rename(&temp_path, path) {
            log::error!("Failed to rename temp file to {} : {}", path.display(), e);
            let _ = fs::remove_file(&temp_path);
            return Err(format!("Failed to write {}: {e}", path.display()));
        }

        log::info!("Saved settings file={}", path.display());
        Ok(())
    }
}

/// Returns `true` for codes in [`FIAT_CURRENCIES`]. Matching is exact.
pub fn is_supported_fiat(code: &str) -> bool {
    FIAT_CURRENCIES.contains(&code)
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// `Duration::from_secs_f64` panics on values it cannot represent.
fn fits_duration(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok()
}

/// Loads the settings file at `path`, or runs the first-run wizard on the
/// terminal and saves its answers there.
///
/// With `force_setup` the wizard runs even if the file already exists.
pub fn load_or_create_settings(path: &Path, force_setup: bool) -> Result<Settings, String> {
    if path.exists() && !force_setup {
        return Settings::load(path);
    }

    log::info!("Starting setup wizard file={}", path.display());
    let stdin = io::stdin();
    let stdout = io::stdout();
    let settings = run_wizard(&mut stdin.lock(), &mut stdout.lock())?;
    settings.save(path)?;
    Ok(settings)
}

/// Asks for every setting on `output`, reading answers from `input`.
///
/// Invalid answers are reported and asked again. Running out of input is an error.
pub fn run_wizard<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Settings, String> {
    let fiat = loop {
        writeln!(output, "Please enter the name of the fiat you want the price to be converted")
            .map_err(write_err)?;
        let answer = prompt(input, output, &format!("Available fiats {FIAT_CURRENCIES:?} :"))?;
        let code = answer.to_lowercase();
        if is_supported_fiat(&code) {
            break code;
        }
        writeln!(output, "'{answer}' is not a supported fiat.").map_err(write_err)?;
    };

    let node_name = prompt(input, output, "Enter a name for your node:")?;

    let webhook_url = loop {
        let answer = prompt(input, output, "Enter the link of discord webhook : ")?;
        if !answer.is_empty() {
            break answer;
        }
        writeln!(output, "The webhook link is required.").map_err(write_err)?;
    };

    let estimated_daily_earnings = prompt_positive(
        input,
        output,
        "Enter the estimated daily ETCPOW Token earnings (Example: 8.2): ",
    )?;

    let user_id = prompt(input, output, "Enter your Discord User ID for @ pings (optional): ")?;
    let discord_user_id = (!user_id.is_empty()).then_some(user_id);

    let delay_minutes = loop {
        let minutes = prompt_positive(input, output, "Please enter the refresh time in minutes : ")?;
        if fits_duration(minutes * 60.0) {
            break minutes;
        }
        writeln!(output, "{minutes} minutes is too long.").map_err(write_err)?;
    };

    Ok(Settings::new(
        fiat,
        webhook_url,
        node_name,
        delay_minutes * 60.0,
        estimated_daily_earnings,
        discord_user_id,
    ))
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, text: &str) -> Result<String, String> {
    write!(output, "{text}").map_err(write_err)?;
    output.flush().map_err(write_err)?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read answer: {e}"))?;
    if read == 0 {
        return Err("Setup aborted: input closed".to_string());
    }
    Ok(line.trim().to_string())
}

fn prompt_positive<R: BufRead, W: Write>(input: &mut R, output: &mut W, text: &str) -> Result<f64, String> {
    loop {
        let answer = prompt(input, output, text)?;
        match answer.parse::<f64>() {
            Ok(value) if is_positive(value) => return Ok(value),
            Ok(value) => writeln!(output, "{value} is not a positive number.").map_err(write_err)?,
            Err(e) => writeln!(output, "'{answer}': {e}").map_err(write_err)?,
        }
    }
}

fn write_err(e: io::Error) -> String {
    format!("Failed to write prompt: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn wizard(answers: &str) -> (Result<Settings, String>, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = run_wizard(&mut input, &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("etcmc-monitor-{}-{name}", std::process::id()))
    }

    #[test]
    fn wizard_accepts_every_supported_fiat() {
        for fiat in FIAT_CURRENCIES {
            let (result, _) = wizard(&format!("{fiat}\nrig\nhttps://hook\n8.2\n\n60\n"));
            assert_eq!(result.unwrap().fiat, fiat);
        }
    }

    #[test]
    fn wizard_reprompts_on_unsupported_fiat() {
        let (result, output) = wizard("btc\nUSDT\n\nEUR\nrig\nhttps://hook\n8.2\n\n60\n");
        assert_eq!(result.unwrap().fiat, "eur");
        assert_eq!(output.matches("Available fiats").count(), 4);
        assert!(output.contains("'btc' is not a supported fiat."));
    }

    #[test]
    fn wizard_builds_settings() {
        let (result, _) = wizard("usd\nrig-01\nhttps://hook\nabc\n-1\n8.2\n1234\n0\nten\n120\n");
        let expected = Settings::new("usd", "https://hook", "rig-01", 7200.0, 8.2, Some("1234".into()));
        assert_eq!(result.unwrap(), expected);
    }

    #[test]
    fn wizard_reprompts_on_empty_webhook() {
        let (result, output) = wizard("usd\nrig\n\nhttps://hook\n8.2\n\n60\n");
        assert_eq!(result.unwrap().webhook_url, "https://hook");
        assert_eq!(output.matches("The webhook link is required.").count(), 1);
        assert_eq!(output.matches("Enter the link of discord webhook").count(), 2);
    }

    #[test]
    fn wizard_reprompts_on_unrepresentable_delay() {
        let (result, output) = wizard("usd\nrig\nhttps://hook\n8.2\n\n1e30\n30\n");
        assert_eq!(result.unwrap().delay_secs, 1800.0);
        assert!(output.contains("minutes is too long."));
    }

    #[test]
    fn wizard_fails_when_input_runs_out() {
        let (result, _) = wizard("btc\n");
        assert!(result.unwrap_err().contains("input closed"));
    }

    #[test]
    fn settings_round_trip_through_file() {
        let path = temp_path("roundtrip.json");
        let settings = Settings::new("gbp", "https://hook", "rig", 3600.0, 5.0, None);
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
        assert_eq!(load_or_create_settings(&path, false).unwrap(), settings);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reads_legacy_file_layout() {
        let json = r#"{
            "fiat": "usd",
            "discordWebhook": "https://hook",
            "node_name": "rig",
            "delay": 7200.0,
            "estimated_daily_earnings": 8.2,
            "discord_user_id": null
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings, Settings::new("usd", "https://hook", "rig", 7200.0, 8.2, None));
        assert_eq!(settings.capture, CaptureRegion { width: 200, top: 27, bottom: 58 });
        assert_eq!(settings.delay(), Duration::from_secs(7200));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let path = temp_path("missing.json");
        fs::write(&path, r#"{"fiat": "usd", "node_name": "rig", "delay": 60, "estimated_daily_earnings": 1}"#).unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(err.contains("discordWebhook"), "{err}");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = Settings::new("usd", "https://hook", "rig", 60.0, 1.0, None);

        let mut s = base.clone();
        s.fiat = "btc".into();
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.delay_secs = 0.0;
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.estimated_daily_earnings = -2.0;
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.capture.bottom = s.capture.top;
        assert!(s.validate().is_err());

        let mut s = base.clone();
        s.request_timeout = Some(0.0);
        assert!(s.validate().is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let base = Settings::new("usd", "https://hook", "rig", 60.0, 1.0, None);

        let mut s = base.clone();
        s.delay_secs = 1e30;
        assert!(s.validate().unwrap_err().contains("delay"));

        let mut s = base.clone();
        s.retry_delay = 1e30;
        assert!(s.validate().unwrap_err().contains("retry_delay"));

        let mut s = base.clone();
        s.request_timeout = Some(1e30);
        assert!(s.validate().unwrap_err().contains("request_timeout"));

        let mut s = base;
        s.retry_delay = f64::INFINITY;
        assert!(s.validate().is_err());
    }

    #[test]
    fn blank_mention_counts_as_absent() {
        let mut s = Settings::new("usd", "https://hook", "rig", 60.0, 1.0, Some("  ".into()));
        assert_eq!(s.mention(), None);
        s.discord_user_id = Some("42".into());
        assert_eq!(s.mention(), Some("42"));
    }
}
