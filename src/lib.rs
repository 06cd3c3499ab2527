//! NAO Agent - Voice-driven conversational agent for the NAO robot
//!
//! This library provides the core functionality for the agent:
//! - Speech segmentation, transcription and trigger-phrase gating
//! - A turn runner that lets a hosted language model call tools
//! - Tools for robot posture, jokes, weather, web search and human input
//! - Per-thread session memory in `SQLite`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Microphone ─▶ Segmenter ─▶ Transcriber ─▶ Trigger   │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ request text
//! ┌────────────────────────▼─────────────────────────────┐
//! │                    Turn Runner                        │
//! │   Session Memory  │  Model Gateway  ⇄  Tool Registry  │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ reply
//! ┌────────────────────────▼─────────────────────────────┐
//! │         Output Sink (console │ speech │ robot)        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod robot;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
