pub mod bus;
pub mod fanout;
pub mod push;

pub use bus::{LocalBus, NotificationBus};
pub use fanout::{DeliveryReport, Fanout};
pub use push::{
    format_phone_number, gateway_for_carrier, push_title, sms_gateway_address, LogPushSender,
    LogSmsSender, PushNotification, PushSender, SmsSender,
};
