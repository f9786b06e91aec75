use serde::Serialize;

use crate::db::DeviceClass;
use crate::error::AppError;

const TITLE_PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub cid: String,
    pub author: String,
    pub content: String,
}

/// Native push for one mobile device.
#[async_trait::async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, class: DeviceClass, device: &str, note: &PushNotification) -> Result<(), AppError>;
}

/// Email-to-SMS gateway plus carrier lookup.
#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, gateway: &str, content: &str, subject: &str) -> Result<(), AppError>;
    /// Carrier name for an E.164 number, if known.
    async fn lookup_carrier(&self, phone: &str) -> Result<Option<String>, AppError>;
}

/// Logs instead of talking to a provider.
#[derive(Debug, Clone, Default)]
pub struct LogPushSender;

#[async_trait::async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, class: DeviceClass, device: &str, note: &PushNotification) -> Result<(), AppError> {
        tracing::info!(class = class.as_str(), device, title = %note.title, "push notification");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSmsSender;

#[async_trait::async_trait]
impl SmsSender for LogSmsSender {
    async fn send_sms(&self, gateway: &str, content: &str, subject: &str) -> Result<(), AppError> {
        tracing::info!(gateway, subject, len = content.len(), "sms notification");
        Ok(())
    }

    async fn lookup_carrier(&self, phone: &str) -> Result<Option<String>, AppError> {
        tracing::warn!(phone, "no carrier lookup provider configured");
        Ok(None)
    }
}

/// Email-to-SMS domain for a carrier name.
pub fn gateway_for_carrier(carrier: &str) -> Option<&'static str> {
    match carrier {
        "T-Mobile USA, Inc." => Some("tmomail.net"),
        "Verizon Wireless" => Some("vtext.com"),
        "Sprint Spectrum, L.P." => Some("messaging.sprintpcs.com"),
        "AT&T Mobility" => Some("txt.att.net"),
        "Virgin Mobile - Sprint Reseller" => Some("vmobl.com"),
        _ => None,
    }
}

/// Gateway address for a formatted number, e.g. `5551234567@vtext.com`.
pub fn sms_gateway_address(phone: &str, domain: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    // Gateways want the national number without the leading country code.
    let national = if digits.len() == 11 && digits.starts_with('1') { &digits[1..] } else { &digits[..] };
    format!("{}@{}", national, domain)
}

/// Normalize a user-supplied number to `+` followed by 11 or 12 digits.
pub fn format_phone_number(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | '.' | '(' | ')') && !c.is_whitespace())
        .collect();
    let digits = cleaned.strip_prefix('+')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.starts_with("911") || digits.starts_with("1911") {
        return None;
    }
    if !(12..=13).contains(&cleaned.len()) {
        return None;
    }
    Some(cleaned)
}

/// Notification title for a message preview.
pub fn push_title(author: &str, content: &str) -> String {
    if content.chars().count() < 4 {
        return format!("{} - {}", author, content);
    }
    if content.starts_with("<a") {
        return format!("{} sent you a link!", author);
    }
    if content.starts_with("<img") {
        return format!("{} sent you a picture!", author);
    }
    let preview: String = content.chars().take(TITLE_PREVIEW_CHARS).collect();
    format!("{} - {}", author, preview)
}
