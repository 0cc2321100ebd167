//! Language Server Protocol front end.
//!
//! Speaks JSON-RPC 2.0 with `Content-Length` framing over stdio so any LSP
//! editor can host the reference links and hash hovers.

/// Language server implementation.
pub mod server;

/// JSON-RPC 2.0 types and message framing.
pub mod transport;

/// `file://` URI conversions.
pub mod uri;

pub use server::{LspServer, OpenDocument};
pub use transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
