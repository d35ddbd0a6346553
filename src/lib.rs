//! Relay Bot. Anonymous room and owner inbox over Telegram.

pub mod channels;
pub mod config;
pub mod error;
pub mod health;
pub mod relay;
pub mod store;
