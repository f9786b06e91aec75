pub mod api;
pub mod clock;
pub mod config;
pub mod convo;
pub mod crypto;
pub mod db;
pub mod delivery;
pub mod error;
pub mod friends;
pub mod services;
pub mod session;
pub mod supervisor;
pub mod sweep;
