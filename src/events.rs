use crate::logger::log;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use webrtc::track::track_remote::TrackRemote;

/// События клиента. Вместо блокирующих диалогов и прямых callback-ов
/// приложение подписывается на шину и само решает, что показывать.
#[derive(Clone)]
pub enum PeerEvent {
    /// Сигнальный сервер выдал наш ID
    Open { peer_id: String },
    /// Локальный медиапоток получен
    MediaReady,
    /// Платформа отказала в захвате медиа
    MediaError { reason: String },
    IncomingCall { call_id: String, from: String },
    CallConnected { call_id: String },
    CallClosed { call_id: String },
    CallFailed { call_id: String, reason: String },
    ConnectionProblem { call_id: String },
    ConnectionRecovering { call_id: String },
    ConnectionRecovered { call_id: String },
    /// Пришла удалённая дорожка — отдаём её приложению для вывода
    RemoteStream {
        call_id: String,
        track: Arc<TrackRemote>,
    },
    SignalError { message: String },
    Disconnected,
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::Open { peer_id } => write!(f, "Open({peer_id})"),
            PeerEvent::MediaReady => write!(f, "MediaReady"),
            PeerEvent::MediaError { reason } => write!(f, "MediaError({reason})"),
            PeerEvent::IncomingCall { call_id, from } => {
                write!(f, "IncomingCall({call_id} from {from})")
            }
            PeerEvent::CallConnected { call_id } => write!(f, "CallConnected({call_id})"),
            PeerEvent::CallClosed { call_id } => write!(f, "CallClosed({call_id})"),
            PeerEvent::CallFailed { call_id, reason } => {
                write!(f, "CallFailed({call_id}: {reason})")
            }
            PeerEvent::ConnectionProblem { call_id } => write!(f, "ConnectionProblem({call_id})"),
            PeerEvent::ConnectionRecovering { call_id } => {
                write!(f, "ConnectionRecovering({call_id})")
            }
            PeerEvent::ConnectionRecovered { call_id } => {
                write!(f, "ConnectionRecovered({call_id})")
            }
            PeerEvent::RemoteStream { call_id, track } => {
                write!(f, "RemoteStream({call_id}, {})", track.kind())
            }
            PeerEvent::SignalError { message } => write!(f, "SignalError({message})"),
            PeerEvent::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Шина событий поверх broadcast-канала
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PeerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: PeerEvent) {
        log(&format!("emit event: {:?}", event));
        // отсутствие подписчиков — не ошибка
        let _ = self.tx.send(event);
    }

    pub fn emit_open(&self, peer_id: &str) {
        self.emit(PeerEvent::Open {
            peer_id: peer_id.to_string(),
        });
    }

    pub fn emit_media_ready(&self) {
        self.emit(PeerEvent::MediaReady);
    }

    pub fn emit_media_error(&self, reason: &str) {
        self.emit(PeerEvent::MediaError {
            reason: reason.to_string(),
        });
    }

    pub fn emit_incoming_call(&self, call_id: &str, from: &str) {
        self.emit(PeerEvent::IncomingCall {
            call_id: call_id.to_string(),
            from: from.to_string(),
        });
    }

    pub fn emit_connected(&self, call_id: &str) {
        self.emit(PeerEvent::CallConnected {
            call_id: call_id.to_string(),
        });
    }

    pub fn emit_call_closed(&self, call_id: &str) {
        self.emit(PeerEvent::CallClosed {
            call_id: call_id.to_string(),
        });
    }

    pub fn emit_call_failed(&self, call_id: &str, reason: &str) {
        self.emit(PeerEvent::CallFailed {
            call_id: call_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn emit_connection_problem(&self, call_id: &str) {
        self.emit(PeerEvent::ConnectionProblem {
            call_id: call_id.to_string(),
        });
    }

    pub fn emit_connection_recovering(&self, call_id: &str) {
        self.emit(PeerEvent::ConnectionRecovering {
            call_id: call_id.to_string(),
        });
    }

    pub fn emit_connection_recovered(&self, call_id: &str) {
        self.emit(PeerEvent::ConnectionRecovered {
            call_id: call_id.to_string(),
        });
    }

    pub fn emit_remote_stream(&self, call_id: &str, track: Arc<TrackRemote>) {
        self.emit(PeerEvent::RemoteStream {
            call_id: call_id.to_string(),
            track,
        });
    }

    pub fn emit_signal_error(&self, message: &str) {
        self.emit(PeerEvent::SignalError {
            message: message.to_string(),
        });
    }

    pub fn emit_disconnected(&self) {
        self.emit(PeerEvent::Disconnected);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
