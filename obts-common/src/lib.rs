// obts-common - Shared wire types and framing for the OpenBTS component clients
//
// This crate defines the JSON request/response messages, the status-code
// partition, and the ZMTP framing spoken by both the client and the mock backend.

pub mod error;
pub mod types;
pub mod protocol;
pub mod status;
pub mod zmtp;

// Re-export for convenience
pub use error::*;
pub use types::*;
pub use protocol::*;
pub use status::*;
