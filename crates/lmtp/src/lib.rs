//! LMTP session engine.
//!
//! `transport` frames bytes into commands and dot-stuffed body lines,
//! `grammar` parses each command's argument syntax, `session` holds the
//! per-connection state machine, `router` decides local vs. proxy per
//! recipient, `payload` accumulates and traces the message body, `delivery`
//! fans the composed message out to its recipients, and `session::dispatcher`
//! wires all of the above into the per-connection command loop.

pub mod config;
pub mod delivery;
pub mod error;
pub mod grammar;
pub mod payload;
pub mod reply;
pub mod router;
pub mod session;
pub mod transport;

pub use config::LmtpConfig;
pub use error::Error;
pub use session::dispatcher::Dispatcher;
