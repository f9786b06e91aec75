use serde_json::{json, Value};

use crate::crypto::{normalize_answer, Digest};
use crate::db::{DeviceClass, SecurityQuestion, UserRecord};
use crate::delivery::{format_phone_number, gateway_for_carrier, sms_gateway_address};
use crate::error::AppError;
use crate::services::Services;
use crate::session::command::{AnswerCmd, CreateUserCmd, LoginCmd, ResetPasswordCmd, UserCmd};

pub const MIN_PASSWORD_LEN: usize = 6;
const REQUIRED_ANSWERS: usize = 2;

/// Outcome of one payload during the authentication phase.
#[derive(Debug, PartialEq)]
pub enum AuthStep {
    /// Stay unauthenticated, optionally replying.
    Continue(Option<String>),
    /// Logged in as `handle`; `reply` goes to the client first.
    LoggedIn { handle: String, reply: String },
}

/// Validate and sanitize a handle
pub fn validate_username(username: &str) -> Result<String, AppError> {
    let trimmed = username.trim();

    if trimmed.len() < 3 || trimmed.len() > 32 {
        return Err(AppError::Auth("Username must be 3-32 characters".to_string()));
    }

    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Auth("Username must be alphanumeric, underscore, or hyphen".to_string()));
    }

    Ok(trimmed.to_string())
}

fn error_reply(cmd: &str, message: &str) -> String {
    json!({ "cmd": cmd, "error": message }).to_string()
}

/// Resolve the SMS gateway for a formatted number through the carrier lookup.
pub async fn resolve_gateway(svc: &Services, phone: &str) -> Result<Option<String>, AppError> {
    let Some(carrier) = svc.sms.lookup_carrier(phone).await? else {
        return Ok(None);
    };
    Ok(gateway_for_carrier(&carrier).map(|domain| sms_gateway_address(phone, domain)))
}

fn parse_security_questions(raw: &str) -> Result<Vec<SecurityQuestion>, AppError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let answers: Vec<AnswerCmd> = serde_json::from_str(raw)
        .map_err(|e| AppError::Malformed(format!("invalid secQuests: {}", e)))?;
    answers
        .into_iter()
        .map(|a| -> Result<SecurityQuestion, AppError> {
            Ok(SecurityQuestion {
                question: a.question,
                answer: Digest::new(&normalize_answer(&a.answer))?,
            })
        })
        .collect()
}

pub async fn create_user(svc: &Services, token: &str, cmd: CreateUserCmd) -> Result<AuthStep, AppError> {
    let username = match validate_username(&cmd.username) {
        Ok(u) => u,
        Err(AppError::Auth(msg)) => return Ok(AuthStep::Continue(Some(error_reply("CreateUser", &msg)))),
        Err(e) => return Err(e),
    };
    if cmd.password.len() < MIN_PASSWORD_LEN {
        return Ok(AuthStep::Continue(Some(error_reply(
            "CreateUser",
            "Password must be at least 6 characters.",
        ))));
    }
    if svc.store.get_user(&username).await?.is_some() {
        return Ok(AuthStep::Continue(Some(error_reply("CreateUser", "Username already taken."))));
    }
    let email = cmd.email.trim().to_string();
    if !email.is_empty() && svc.store.find_user_by_email(&email).await?.is_some() {
        return Ok(AuthStep::Continue(Some(error_reply("CreateUser", "Email already registered."))));
    }

    let mut user = UserRecord::new(&username);
    user.password = Digest::new(&cmd.password)?;
    user.email = email;
    user.quota = svc.defaults.quota;
    user.profile_pic = svc.defaults.profile_pic.clone();
    user.sec_quests = parse_security_questions(&cmd.sec_quests)?;
    if let Some(phone) = format_phone_number(&cmd.phone) {
        user.phone_gateway = resolve_gateway(svc, &phone).await?.unwrap_or_default();
        user.phone = phone;
    }
    user.devices.register(DeviceClass::Web, token);

    svc.store.put_user(&user).await?;
    tracing::info!(user = %user.username, "account created");

    Ok(AuthStep::LoggedIn {
        handle: user.username.clone(),
        reply: user.client_json("CreateUser").to_string(),
    })
}

pub async fn validate_user(svc: &Services, token: &str, cmd: LoginCmd) -> Result<AuthStep, AppError> {
    let failed = || AuthStep::Continue(Some(error_reply("ValidateUser", "Invalid username or password.")));

    let Some(mut user) = svc.store.get_user(&cmd.username).await? else {
        return Ok(failed());
    };
    if !user.password.verify(&cmd.password)? {
        tracing::debug!(user = %user.username, "bad password");
        return Ok(failed());
    }

    user.devices.register(DeviceClass::Web, token);
    // Bring each membership cursor up to the conversation's last change.
    for membership in user.cids.iter_mut() {
        if let Some(convo) = svc.store.get_conversation(&membership.cid).await? {
            membership.m_time = convo.m_time;
        }
    }
    svc.store.put_user(&user).await?;
    tracing::info!(user = %user.username, "session validated");

    Ok(AuthStep::LoggedIn {
        handle: user.username.clone(),
        reply: user.client_json("ValidateUser").to_string(),
    })
}

/// Security questions for an account, or the payload echoed back if unknown.
pub async fn password_reset_questions(svc: &Services, cmd: UserCmd, raw: &Value) -> Result<String, AppError> {
    let Some(user) = svc.store.get_user(&cmd.username).await? else {
        return Ok(raw.to_string());
    };
    let questions: Vec<&str> = user.sec_quests.iter().map(|q| q.question.as_str()).collect();
    Ok(json!({
        "cmd": "GetPasswordResetUser",
        "Username": user.username,
        "Questions": questions,
    })
    .to_string())
}

pub async fn reset_password(svc: &Services, cmd: ResetPasswordCmd) -> Result<String, AppError> {
    let reply = |ok: bool| json!({ "cmd": "ResetUserPassword", "success": ok.to_string() }).to_string();

    if cmd.new_password.len() < MIN_PASSWORD_LEN {
        return Ok(reply(false));
    }
    let Some(mut user) = svc.store.get_user(&cmd.username).await? else {
        return Ok(reply(false));
    };

    let mut matched = 0;
    for answer in &cmd.answers {
        let Some(stored) = user.sec_quests.iter().find(|q| q.question == answer.question) else {
            continue;
        };
        if stored.answer.verify(&normalize_answer(&answer.answer))? {
            matched += 1;
        }
    }
    if matched < REQUIRED_ANSWERS {
        tracing::info!(user = %user.username, matched, "password reset refused");
        return Ok(reply(false));
    }

    user.password = Digest::new(&cmd.new_password)?;
    svc.store.put_user(&user).await?;
    tracing::info!(user = %user.username, "password reset");
    Ok(reply(true))
}
