//! The polling loop.
//!
//! Every iteration reads the balance off the screen, prices it, picks the report
//! for the node's state and posts it, then sleeps for the configured delay:
//!
//! ```text
//! STARTUP -> POLLING -> (READY | IN_PROGRESS) -> NOTIFY -> SLEEP -> POLLING ...
//! ```
//!
//! Nothing is remembered between iterations, so an unchanged balance is reported
//! again on every pass.

use std::fmt::Display;
use std::path::Path;

use chrono::{DateTime, Local, TimeZone};
use tokio::time;

use crate::config::Settings;
use crate::estimate::{self, WITHDRAW_THRESHOLD};
use crate::notifier::{self, BalanceFigures, Embed, Notifier};
use crate::price::{MarketSnapshot, PriceClient};
use crate::reader::{BalanceReader, CROPPED_FILE};
use crate::utils;

/// Which report a balance calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// At or above the withdrawal threshold.
    WithdrawReady,
    /// Still mining towards the threshold.
    InProgress,
}

impl NodeState {
    pub fn of(tokens: f64) -> Self {
        if tokens >= WITHDRAW_THRESHOLD {
            NodeState::WithdrawReady
        } else {
            NodeState::InProgress
        }
    }
}

/// Builds the report for one iteration as of `now`.
///
/// Withdraw-ready balances skip the estimator entirely; its projection would
/// lie in the past.
pub fn build_report<Tz>(settings: &Settings, tokens: f64, value: f64, market: &MarketSnapshot, now: DateTime<Tz>) -> Embed
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let next_update = chrono::Duration::from_std(settings.delay())
        .ok()
        .and_then(|delay| now.clone().checked_add_signed(delay))
        .map_or_else(|| "Unknown".to_string(), |at| utils::format_datetime(&at));

    let figures = BalanceFigures {
        node_name: &settings.node_name,
        fiat: &settings.fiat,
        tokens,
        value,
        market,
        next_update,
    };

    match NodeState::of(tokens) {
        NodeState::WithdrawReady => notifier::withdraw_ready_embed(&figures),
        NodeState::InProgress => {
            let estimate = estimate::estimate(tokens, settings.estimated_daily_earnings, now);
            let withdraw_date = estimate
                .eta
                .as_ref()
                .map_or_else(|| "Unknown".to_string(), utils::format_datetime);
            notifier::current_balance_embed(&figures, estimate.remaining, &withdraw_date)
        }
    }
}

/// Owns the components driven by the loop.
pub struct Monitor {
    settings: Settings,
    reader: BalanceReader,
    prices: PriceClient,
    notifier: Notifier,
}

impl Monitor {
    /// Loads the OCR models and prepares both HTTP clients.
    pub fn new(settings: Settings) -> Result<Self, String> {
        let timeout = settings.request_timeout();
        let reader = BalanceReader::from_settings(&settings)?;
        let prices = PriceClient::new(timeout)?;
        let notifier = Notifier::new(
            settings.webhook_url.clone(),
            settings.mention().map(str::to_string),
            timeout,
        )?;

        Ok(Self {
            settings,
            reader,
            prices,
            notifier,
        })
    }

    /// Posts the one-time "monitoring started" message.
    pub async fn announce_start(&self) -> Result<(), String> {
        log::info!("Announcing start node={}", self.settings.node_name);
        self.notifier
            .announce(notifier::startup_embed(&self.settings.node_name, self.settings.delay()))
            .await
    }

    /// Runs a single POLLING -> NOTIFY pass.
    pub async fn poll_once(&self) -> Result<(), String> {
        let tokens = self.reader.read_balance().await;
        let (value, market) = self.prices.convert(tokens, &self.settings.fiat).await?;

        let state = NodeState::of(tokens);
        log::info!(
            "Balance report node={} tokens={} value={} fiat={} state={:?}",
            self.settings.node_name,
            tokens,
            value,
            self.settings.fiat,
            state
        );

        let embed = build_report(&self.settings, tokens, value, &market, Local::now());
        let file_name = notifier::attachment_name(value, &self.settings.fiat);
        self.notifier
            .notify(embed, Path::new(CROPPED_FILE), &file_name)
            .await
    }

    /// Polls forever. Returns only when an iteration fails.
    pub async fn run(&self) -> Result<(), String> {
        println!(
            "Monitoring {} every {}s...",
            self.settings.node_name, self.settings.delay_secs
        );

        loop {
            self.poll_once().await?;
            log::debug!("Sleeping delay_secs={}", self.settings.delay_secs);
            time::sleep(self.settings.delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn market(rate: f64) -> MarketSnapshot {
        MarketSnapshot {
            rate,
            market_cap: Some(250000.0),
            volume_24h: Some(1234.5),
            change_24h: Some(1.5),
            last_updated_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn threshold_routes_to_withdraw_ready() {
        assert_eq!(NodeState::of(99.999), NodeState::InProgress);
        assert_eq!(NodeState::of(100.0), NodeState::WithdrawReady);
        assert_eq!(NodeState::of(250.0), NodeState::WithdrawReady);
    }

    #[test]
    fn in_progress_report() {
        let settings = Settings::new("usd", "https://hook", "rig", 3600.0, 5.0, None);
        let market = market(2.0);
        let embed = build_report(&settings, 95.0, market.value_of(95.0), &market, now());

        assert_eq!(embed.title, "Current Balance: **190.0 USD**");
        assert_eq!(embed.get_field("Remaining Tokens:").unwrap().value, "**5.0**");
        assert_eq!(embed.get_field("POW Tokens:").unwrap().value, "**95.0**");
        assert_eq!(embed.get_field("~Estimated Withdraw:").unwrap().value, "12:00PM, 10-20-26");
        assert_eq!(embed.get_field("Next Update:").unwrap().value, "01:00PM, 10-19-26");
        assert!(embed.get_field("ETCPOW Tokens").is_none());
    }

    #[test]
    fn ready_report_skips_estimate() {
        let settings = Settings::new("eur", "https://hook", "rig", 7200.0, 5.0, None);
        let market = market(0.5);
        let embed = build_report(&settings, 100.0, market.value_of(100.0), &market, now());

        assert_eq!(embed.title, "Withdraw Ready! **50.0 EUR**");
        assert_eq!(embed.get_field("ETCPOW Tokens").unwrap().value, "**100.0**");
        assert_eq!(embed.get_field("Next Update:").unwrap().value, "02:00PM, 10-19-26");
        assert!(embed.get_field("Remaining Tokens:").is_none());
        assert!(embed.get_field("~Estimated Withdraw:").is_none());
    }
}
