use std::sync::Arc;

use crate::config::{Config, DEFAULT_PROFILE_PIC};
use crate::db::StateStore;
use crate::delivery::{Fanout, NotificationBus, PushSender, SmsSender};

/// Values applied to freshly created accounts.
#[derive(Debug, Clone)]
pub struct AccountDefaults {
    pub quota: i64,
    pub profile_pic: String,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        AccountDefaults {
            quota: 2_000_000,
            profile_pic: DEFAULT_PROFILE_PIC.to_string(),
        }
    }
}

impl From<&Config> for AccountDefaults {
    fn from(config: &Config) -> Self {
        AccountDefaults {
            quota: config.default_quota,
            profile_pic: config.default_profile_pic.clone(),
        }
    }
}

/// Everything a session actor, handler or the sweep needs, passed explicitly.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<dyn NotificationBus>,
    pub sms: Arc<dyn SmsSender>,
    pub fanout: Fanout,
    pub defaults: AccountDefaults,
}

impl Services {
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn NotificationBus>,
        push: Arc<dyn PushSender>,
        sms: Arc<dyn SmsSender>,
        defaults: AccountDefaults,
    ) -> Self {
        let fanout = Fanout::new(bus.clone(), push, sms.clone());
        Services { store, bus, sms, fanout, defaults }
    }

    /// Publish `payload` to the web sessions of `handle`, if the user exists.
    pub async fn notify_user(&self, handle: &str, payload: &str) -> usize {
        match self.store.get_user(handle).await {
            Ok(Some(user)) => self.fanout.publish_web(&user, payload).await,
            Ok(None) => 0,
            Err(e) => {
                tracing::error!(user = handle, "notify lookup failed: {}", e);
                0
            }
        }
    }
}
