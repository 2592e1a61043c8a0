//! Request handlers for the streaming gateway.

pub mod stream;

pub use stream::{StreamError, stream_handler};
