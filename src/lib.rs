//! Marcus: a personalized AI chat backend that dispatches each turn to
//! OpenAI, Anthropic or Gemini, with web and file search side paths.

pub mod api;
pub mod config;
pub mod conversation;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod llm;
pub mod markup;
pub mod message;
pub mod personalization;
pub mod tools;

pub use error::{Error, Result};
