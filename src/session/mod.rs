//! One actor per connection: an authentication phase, then a dispatch loop
//! that serializes every command for its user.

pub mod account;
pub mod actor;
pub mod auth;
pub mod command;
pub mod devices;
pub mod dispatch;
pub mod mailbox;
pub mod scheduled;

pub use actor::run_session;
pub use command::{Command, ParseError};
pub use dispatch::{dispatch, handle_payload, SessionCtx, BAD_COMMAND};
