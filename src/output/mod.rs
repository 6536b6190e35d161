//! Output abstraction layer that routes to plain text or JSON based on mode.

pub mod context;

pub use context::{OutputContext, OutputMode};
