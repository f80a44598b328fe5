#![forbid(unsafe_code)]

//! Client for analysis services that speak newline-delimited JSON over stdio.
//!
//! A [`session::Session`] launches the service through a
//! [`transport::Transport`], runs the [`handshake`], registers its
//! subscriptions and analysis root, and hands the inbound stream to a
//! [`dispatcher::Dispatcher`] until interrupted.

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod errors;
pub mod handshake;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use errors::{AppError, Result};
