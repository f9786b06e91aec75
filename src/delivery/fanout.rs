use std::sync::Arc;

use crate::db::{ChatMessage, DeviceClass, UserRecord};
use crate::delivery::bus::NotificationBus;
use crate::delivery::push::{push_title, PushNotification, PushSender, SmsSender};

/// What one delivery actually reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub web: usize,
    pub mobile: usize,
    pub sms: usize,
}

/// Resolves a user's registered channels and delivers to each of them.
///
/// Failures are logged and isolated per device; they never abort the
/// remaining channels.
#[derive(Clone)]
pub struct Fanout {
    bus: Arc<dyn NotificationBus>,
    push: Arc<dyn PushSender>,
    sms: Arc<dyn SmsSender>,
}

impl Fanout {
    pub fn new(bus: Arc<dyn NotificationBus>, push: Arc<dyn PushSender>, sms: Arc<dyn SmsSender>) -> Self {
        Fanout { bus, push, sms }
    }

    /// Publish a state-change payload to the user's web sessions only.
    pub async fn publish_web(&self, user: &UserRecord, payload: &str) -> usize {
        let mut reached = 0;
        for token in &user.devices.web {
            match self.bus.publish(token, payload).await {
                Ok(true) => reached += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(user = %user.username, token = %token, "web publish failed: {}", e),
            }
        }
        reached
    }

    /// Deliver a chat message: web always, native push unless `exclude_self`,
    /// SMS only when the recipient has no device of any class.
    pub async fn deliver(
        &self,
        recipient: &UserRecord,
        message: &ChatMessage,
        subject: &str,
        exclude_self: bool,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let payload = message.wire().to_string();
        report.web = self.publish_web(recipient, &payload).await;

        if exclude_self {
            return report;
        }

        let note = PushNotification {
            title: push_title(&message.f_username, &message.content),
            cid: message.cid.clone(),
            author: message.f_username.clone(),
            content: message.content.clone(),
        };
        for class in DeviceClass::MOBILE {
            for device in recipient.devices.list(class) {
                match self.push.send(class, device, &note).await {
                    Ok(()) => report.mobile += 1,
                    Err(e) => tracing::warn!(
                        user = %recipient.username,
                        class = class.as_str(),
                        device = %device,
                        "push failed: {}", e
                    ),
                }
            }
        }

        if !recipient.devices.has_any() && !recipient.phone_gateway.is_empty() {
            let body = format!("{}: {}", message.f_username, message.content);
            match self.sms.send_sms(&recipient.phone_gateway, &body, subject).await {
                Ok(()) => report.sms += 1,
                Err(e) => tracing::error!(user = %recipient.username, "sms fallback failed: {}", e),
            }
        }

        report
    }
}
