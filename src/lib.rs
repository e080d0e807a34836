//! gemchat is a terminal client for the Gemini `generateContent` API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`auth`] stores the API key in the system keyring (or in memory) and
//!   runs the interactive auth/deauth prompts.
//! - [`core`] owns the conversation, request construction, the HTTP
//!   transport and the [`core::session::ChatSession`] that ties them together.
//! - [`api`] defines the JSON payloads exchanged with the endpoint.
//! - [`cli`] parses arguments and runs the line-oriented chat loop.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
