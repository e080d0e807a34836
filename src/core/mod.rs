pub mod config;
pub mod conversation;
pub mod keyring;
pub mod message;
pub mod request;
pub mod session;
pub mod transport;
