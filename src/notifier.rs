//! Discord webhook notifications.
//!
//! Reports are sent as a single embed. Balance reports also carry the cropped
//! balance screenshot as a file attachment which the embed shows inline via an
//! `attachment://` URL.
//!
//! Delivery is fire-and-forget: the webhook's response status is logged but a
//! rejected message does not fail the loop. Only transport errors propagate.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::price::{MarketSnapshot, TOKEN_PAGE_URL};
use crate::utils;

/// Logo shown next to the node name.
const ICON_URL: &str = "https://images.squarespace-cdn.com/content/v1/64189e78e28fe362e04402a3/4acfcefe-68b5-444f-9ac7-b7ee4392ceb3/ETCMC_LOGO-removebg-preview.png";

pub const COLOR_STARTUP: u32 = 0xFFA500;
pub const COLOR_WITHDRAW_READY: u32 = 0x00FF00;
pub const COLOR_CURRENT_BALANCE: u32 = 0x00FFFF;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

/// A Discord embed as accepted by the webhook API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    /// ISO 8601 timestamp shown in the embed footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    /// Creates an embed with only a title and accent color.
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            author: None,
            fields: Vec::new(),
            image: None,
            timestamp: None,
        }
    }

    /// Sets the text shown under the title.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the node as author, with the token logo and a link to its price page.
    pub fn node_author(mut self, node_name: &str, badge: &str) -> Self {
        self.author = Some(EmbedAuthor {
            name: format!("{} {badge}", node_name.to_uppercase()),
            url: TOKEN_PAGE_URL.to_string(),
            icon_url: ICON_URL.to_string(),
        });
        self
    }

    /// Appends a labelled value. Inline fields share a row with their neighbours.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Shows the attached file `file_name` as the embed image.
    pub fn attachment_image(mut self, file_name: &str) -> Self {
        self.image = Some(EmbedImage {
            url: format!("attachment://{file_name}"),
        });
        self
    }

    /// Stamps the embed with a Unix timestamp (seconds). Out-of-range values are ignored.
    pub fn unix_timestamp(mut self, secs: Option<i64>) -> Self {
        self.timestamp = secs
            .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
            .map(|dt| dt.to_rfc3339());
        self
    }

    #[cfg(test)]
    pub fn get_field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Body of a webhook post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub embeds: Vec<Embed>,
}

/// Figures shared by both balance reports.
#[derive(Debug, Clone)]
pub struct BalanceFigures<'a> {
    pub node_name: &'a str,
    pub fiat: &'a str,
    pub tokens: f64,
    /// `tokens` converted to `fiat`.
    pub value: f64,
    pub market: &'a MarketSnapshot,
    pub next_update: String,
}

impl BalanceFigures<'_> {
    fn fiat_upper(&self) -> String {
        self.fiat.to_uppercase()
    }

    fn price(&self) -> String {
        format!("**{} {}**", self.market.rate, self.fiat_upper())
    }

    fn volume(&self) -> String {
        let fiat = self.fiat_upper();
        utils::format_optional(self.market.volume_24h, |v| format!("{} {fiat}", utils::format_thousands(v, 2)))
    }

    fn total(&self) -> String {
        format!("**{} {}**", utils::format_amount(self.value), self.fiat_upper())
    }
}

/// One-time announcement sent when monitoring starts.
pub fn startup_embed(node_name: &str, delay: Duration) -> Embed {
    let hours = delay.as_secs_f64() / 3600.0;
    Embed::new("Monitoring Node Status", COLOR_STARTUP)
        .description(format!(
            "Balance updates will be sent every {} hours",
            utils::format_amount(hours)
        ))
        .node_author(node_name, "✅")
}

/// Report for a node that reached the withdrawal threshold.
pub fn withdraw_ready_embed(figures: &BalanceFigures<'_>) -> Embed {
    Embed::new(
        format!("Withdraw Ready! **{} {}**", utils::format_amount(figures.value), figures.fiat_upper()),
        COLOR_WITHDRAW_READY,
    )
    .node_author(figures.node_name, "💰")
    .field("ETCPOW Tokens", format!("**{}**", utils::format_reading(figures.tokens)), true)
    .field("Token Price", figures.price(), true)
    .field("Trading Volume", figures.volume(), true)
    .field("Total Value", figures.total(), true)
    .field("Next Update:", figures.next_update.clone(), true)
    .unix_timestamp(figures.market.last_updated_at)
}

/// Report for a node still mining towards the threshold.
pub fn current_balance_embed(figures: &BalanceFigures<'_>, remaining: f64, withdraw_date: &str) -> Embed {
    let fiat = figures.fiat_upper();
    let change = utils::format_optional(figures.market.change_24h, |c| format!("**{c:.2}%**"));
    let market_cap = utils::format_optional(figures.market.market_cap, |c| {
        format!("{} {fiat}", utils::format_thousands(c, 2))
    });

    Embed::new(
        format!("Current Balance: **{} {fiat}**", utils::format_amount(figures.value)),
        COLOR_CURRENT_BALANCE,
    )
    .node_author(figures.node_name, "⛏️")
    .field("POW Tokens:", format!("**{}**", utils::format_reading(figures.tokens)), true)
    .field("Remaining Tokens:", format!("**{}**", utils::format_amount(remaining)), true)
    .field("Token Price:", figures.price(), true)
    .field("24h Change:", change, true)
    .field("Trading Volume:", figures.volume(), false)
    .field("Market Cap:", market_cap, true)
    .field("~Estimated Withdraw:", withdraw_date, true)
    .field("Next Update:", figures.next_update.clone(), true)
    .unix_timestamp(figures.market.last_updated_at)
}

/// Name under which the screenshot is attached, e.g. `12.345_usd.png`.
pub fn attachment_name(value: f64, fiat: &str) -> String {
    format!("{}_{fiat}.png", utils::format_amount(value))
}

/// Posts messages to one Discord webhook.
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
    mention: Option<String>,
}

impl Notifier {
    /// Creates a notifier. `mention` is a Discord user id pinged with every balance report.
    pub fn new(webhook_url: impl Into<String>, mention: Option<String>, timeout: Option<Duration>) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            mention,
        })
    }

    /// Wraps a balance report into a message pinging the configured user.
    pub fn balance_message(&self, embed: Embed) -> WebhookMessage {
        WebhookMessage {
            content: self
                .mention
                .as_deref()
                .map(|id| format!("<@{id}>"))
                .unwrap_or_default(),
            embeds: vec![embed],
        }
    }

    /// Posts an embed without attachment or mention.
    pub async fn announce(&self, embed: Embed) -> Result<(), String> {
        let message = WebhookMessage {
            content: String::new(),
            embeds: vec![embed],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                log::error!("Webhook request failed: {}", e);
                format!("Webhook request failed: {e}")
            })?;

        log_delivery(response.status(), start);
        Ok(())
    }

    /// Posts a balance report with the image at `image_path` attached as `file_name`.
    pub async fn notify(&self, embed: Embed, image_path: &Path, file_name: &str) -> Result<(), String> {
        let image = tokio::fs::read(image_path).await.map_err(|e| {
            log::error!("Failed to read attachment file={}: {}", image_path.display(), e);
            format!("Failed to read {}: {e}", image_path.display())
        })?;

        let message = self.balance_message(embed.attachment_image(file_name));
        let payload = serde_json::to_string(&message).map_err(|e| format!("Failed to serialize message: {e}"))?;

        let part = reqwest::multipart::Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .map_err(|e| format!("Invalid attachment type: {e}"))?;
        let form = reqwest::multipart::Form::new()
            .text("payload_json", payload)
            .part("files[0]", part);

        let start = Instant::now();
        let response = self
            .client
            .post(&self.webhook_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("Webhook request failed attachment={}: {}", file_name, e);
                format!("Webhook request failed: {e}")
            })?;

        log_delivery(response.status(), start);
        Ok(())
    }
}

fn log_delivery(status: reqwest::StatusCode, start: Instant) {
    if status.is_success() {
        log::debug!("Webhook delivered status={} duration_ms={}", status, start.elapsed().as_millis());
    } else {
        log::warn!("Webhook rejected message status={} duration_ms={}", status, start.elapsed().as_millis());
    }
}
