pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::PeerConfig;
pub use error::{Error, Result};
pub use events::{EventBus, PeerEvent};
pub use media::{LocalMedia, MediaBackend, MediaConstraints, SampleBackend};
pub use peer::{Call, CallDirection, CallState, IceCandidate, Peer, SdpPayload, ServerConfig};
pub use session::Session;
pub use signaling::{SignalMessage, SignalingClient};
