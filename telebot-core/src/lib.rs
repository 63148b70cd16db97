//! # telebot-core
//!
//! Core types shared by the client and the wait engine: [`Update`] and its [`Content`] variants,
//! chat/user/file types, the error enums, the [`UpdateSource`] trait with its in-memory
//! [`UpdateQueue`], and tracing initialization.

pub mod error;
pub mod logger;
pub mod source;
pub mod types;

pub use error::{
    ApiError, ApiErrorKind, PredicateError, Result, TelebotError, WaitError, WaitResult,
};
pub use logger::init_tracing;
pub use source::{UpdateQueue, UpdateSource};
pub use types::{
    Audio, CallbackQuery, Chat, Content, Document, Entity, FileRef, Message, PhotoSize, Sticker,
    Update, UpdateKind, User,
};
