use crate::db::DeviceClass;
use crate::error::AppError;
use crate::services::Services;
use crate::session::command::DeviceCmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Add,
    Change,
    Remove,
}

/// Apply a native device registration change and echo the user JSON to web
/// sessions under `cmd`.
pub async fn update_device(
    svc: &Services,
    handle: &str,
    class: DeviceClass,
    change: DeviceChange,
    cmd: &DeviceCmd,
    name: &str,
) -> Result<String, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(String::new());
    };

    let changed = match change {
        DeviceChange::Add => user.devices.register(class, &cmd.device),
        DeviceChange::Change => {
            let removed = user.devices.remove(class, &cmd.old_device);
            user.devices.register(class, &cmd.device) || removed
        }
        DeviceChange::Remove => user.devices.remove(class, &cmd.device),
    };

    if changed {
        svc.store.put_user(&user).await?;
        tracing::debug!(user = %user.username, class = class.as_str(), ?change, "device registry updated");
    }
    let payload = user.client_json(name).to_string();
    svc.fanout.publish_web(&user, &payload).await;
    Ok(String::new())
}

pub async fn remove_web_device(svc: &Services, handle: &str, cmd: &DeviceCmd) -> Result<String, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(String::new());
    };
    if user.devices.remove(DeviceClass::Web, &cmd.device) {
        svc.store.put_user(&user).await?;
    }
    Ok(user.client_json("RemoveWebDev").to_string())
}

/// Drop a session token on disconnect. Safe to call repeatedly.
pub async fn remove_web_token(svc: &Services, handle: &str, token: &str) -> Result<(), AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(());
    };
    if user.devices.remove(DeviceClass::Web, token) {
        svc.store.put_user(&user).await?;
    }
    Ok(())
}
