pub mod call;
pub mod connection;
pub mod handle;
pub mod ice;
pub mod payload;
pub mod types;

pub use call::{Call, CallDirection, CallState};
pub use handle::Peer;
pub use types::{IceCandidate, SdpPayload, ServerConfig};
