//! # telebot-client
//!
//! Telegram Bot API long-polling layer: [`TelegramConfig`] from the environment, [`TelegramClient`]
//! for `getUpdates`, and the background polling daemon filling the client's update queue.
//! The client is an [`UpdateSource`](telebot_core::UpdateSource) of decoded
//! [`Content`](telebot_core::Content), so it plugs straight into `telebot_wait::wait_for`.

mod client;
mod config;
mod daemon;

pub use client::{TelegramClient, TOKEN_LENGTH};
pub use config::TelegramConfig;
