#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
