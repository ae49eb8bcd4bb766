//! Minimal Chrome DevTools Protocol plumbing: enough to drive one headless
//! page through navigation, script evaluation and text input.

pub mod chrome;
pub mod client;
pub mod error;
pub mod session;

pub use chrome::ChromeProcess;
pub use client::Connection;
pub use error::CdpError;
pub use session::PageSession;
