//! Assistants API surface.
//!
//! [`AssistantsApi`] is the seam between the conversation layer and the remote
//! service; [`OpenAiClient`] implements it over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use convo::api::{AssistantsApi, OpenAiClient};
//!
//! let client = OpenAiClient::new(api_key);
//! let thread = client.create_thread().await?;
//! ```

mod client;
mod error;
mod http;
pub mod models;
mod types;

pub use client::{AssistantsApi, DEFAULT_BASE_URL, OpenAiClient};
pub use error::{Error, format_api_error};
pub use models::Model;
pub use types::*;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the organization id.
pub const ORGANIZATION_ENV: &str = "OPENAI_ORGANIZATION";
/// Environment variable overriding the API endpoint.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
