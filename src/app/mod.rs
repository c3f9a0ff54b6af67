//! The document-chat application.
//!
//! This module drives chat sessions on top of the client library:
//!
//! - Restoring the last chat on start
//! - Lazy chat creation on first upload
//! - Document validation and upload
//! - Questions, answers and automatic titles
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`controller`]: the session lifecycle state machine
//! - [`commands`]: slash command parsing
//! - [`render`]: terminal output

mod commands;
mod config;
mod controller;
mod render;

pub use commands::{AppCommand, help_text, parse_command};
pub use config::{AppArgs, AppConfig, PASSWORD_ENV};
pub use controller::{
    DocChat, GREETING, MAX_AUTO_TITLE_CHARS, SessionState, UploadReport, title_from_message,
    upload_confirmation,
};
pub use render::{PlainTextRenderer, Renderer};
