use crate::peer::call::CallState;

/// Ошибки клиента звонков
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signaling failure: {0}")]
    Signaling(String),

    #[error("signaling channel closed")]
    SignalingClosed,

    #[error("peer id is not assigned yet")]
    NotOpen,

    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    /// Локальный поток ещё не выдан платформой
    #[error("local media is not ready")]
    MediaNotReady,

    #[error("media request rejected: {0}")]
    MediaDenied(String),

    #[error("unknown call: {0}")]
    UnknownCall(String),

    #[error("invalid call state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("bad signaling payload: {0}")]
    Payload(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Webrtc(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
