//! Shared HTTP plumbing for the Assistants API.

mod client;

pub use client::{Credentials, HttpClient};
