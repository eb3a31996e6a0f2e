//! Language server protocol support: framing, messages and the client.

pub mod client;
pub mod codec;
pub mod message;
pub mod pending;
pub mod registry;

pub use client::Client;
pub use codec::{decode, encode, is_complete, Frame, FrameCodec};
pub use message::{ErrorCode, Incoming, Message, Params, Response, ResponseError};
pub use pending::{IdGenerator, PendingRequests};
pub use registry::ClientRegistry;
