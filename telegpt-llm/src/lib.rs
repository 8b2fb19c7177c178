//! LLM backends for TeleGPT.
//!
//! Pure HTTP clients behind a single [`Backend`] trait, plus the
//! [`BackendRegistry`] that is built once at startup and handed to the bot.

mod anthropic;
mod backend;
mod catalog;
mod client;
mod error;
mod openai;
mod registry;
mod types;

pub use backend::{Backend, ProviderBackend};
pub use catalog::{ModelKind, Provider};
pub use client::ProviderClient;
pub use error::{LlmError, Result};
pub use registry::{BackendRegistry, ModelSettings, ProviderKeys};
pub use types::{ChatMessage, ChatResponse, GenerationParams, Role, Usage};
