#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use convo_server::crypto::Digest;
use convo_server::db::{DeviceClass, MemoryStore, StateStore, UserRecord};
use convo_server::delivery::{LocalBus, NotificationBus, PushNotification, PushSender, SmsSender};
use convo_server::error::AppError;
use convo_server::services::{AccountDefaults, Services};

#[derive(Clone, Default)]
pub struct RecordingPush {
    pub sent: Arc<Mutex<Vec<(DeviceClass, String, PushNotification)>>>,
}

#[async_trait::async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, class: DeviceClass, device: &str, note: &PushNotification) -> Result<(), AppError> {
        if device.starts_with("panic") {
            panic!("push client crashed on {}", device);
        }
        if device.starts_with("broken") {
            return Err(AppError::Delivery("device rejected".into()));
        }
        self.sent.lock().await.push((class, device.to_string(), note.clone()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSms {
    pub sent: Arc<Mutex<Vec<(String, String, String)>>>,
    pub carrier: Option<String>,
}

#[async_trait::async_trait]
impl SmsSender for RecordingSms {
    async fn send_sms(&self, gateway: &str, content: &str, subject: &str) -> Result<(), AppError> {
        self.sent.lock().await.push((gateway.into(), content.into(), subject.into()));
        Ok(())
    }

    async fn lookup_carrier(&self, _phone: &str) -> Result<Option<String>, AppError> {
        Ok(self.carrier.clone())
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub bus: LocalBus,
    pub push: RecordingPush,
    pub sms: RecordingSms,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_carrier(Some("Verizon Wireless".to_string()))
    }

    pub fn with_carrier(carrier: Option<String>) -> Self {
        let store = MemoryStore::new();
        let bus = LocalBus::new();
        let push = RecordingPush::default();
        let sms = RecordingSms { carrier, ..Default::default() };
        let services = Services::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(push.clone()),
            Arc::new(sms.clone()),
            AccountDefaults::default(),
        );
        Harness { store, bus, push, sms, services }
    }

    /// Store a user with password "password1" and no devices.
    pub async fn user(&self, name: &str) -> UserRecord {
        let mut user = UserRecord::new(name);
        user.password = Digest::new("password1").unwrap();
        user.quota = 100;
        self.store.put_user(&user).await.unwrap();
        user
    }

    /// Bind a web token for `name` and return its notification receiver.
    pub async fn web_device(&self, name: &str, token: &str) -> mpsc::UnboundedReceiver<String> {
        let mut user = self.store.get_user(name).await.unwrap().unwrap();
        user.devices.register(DeviceClass::Web, token);
        self.store.put_user(&user).await.unwrap();
        self.bus.subscribe(token).await
    }

    pub async fn get(&self, name: &str) -> UserRecord {
        self.store.get_user(name).await.unwrap().unwrap()
    }
}

/// Everything currently queued on a receiver, parsed as JSON.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        out.push(serde_json::from_str(&raw).unwrap());
    }
    out
}

pub fn cmds(values: &[Value]) -> Vec<String> {
    values.iter().map(|v| v["cmd"].as_str().unwrap_or_default().to_string()).collect()
}

/// A session actor driven over channels, as the WebSocket bridge does.
pub struct Client {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<String>,
    pub task: tokio::task::JoinHandle<()>,
}

impl Client {
    pub fn connect(services: &Services, token: &str) -> Self {
        let (tx, in_rx) = mpsc::channel(32);
        let (out_tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(convo_server::session::run_session(
            services.clone(),
            token.to_string(),
            in_rx,
            out_tx,
        ));
        Client { tx, rx, task }
    }

    pub async fn send(&self, payload: Value) {
        self.tx.send(payload.to_string()).await.unwrap();
    }

    pub async fn recv(&mut self) -> Value {
        let raw = tokio::time::timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("timed out waiting for session output")
            .expect("session closed");
        serde_json::from_str(&raw).unwrap()
    }

    /// Send and wait for the reply.
    pub async fn call(&mut self, payload: Value) -> Value {
        self.send(payload).await;
        self.recv().await
    }

    pub async fn close(self) {
        drop(self.tx);
        drop(self.rx);
        tokio::time::timeout(Duration::from_secs(60), self.task)
            .await
            .expect("session did not shut down")
            .unwrap();
    }
}
