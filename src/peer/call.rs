use crate::error::{Error, Result};
use crate::logger::log;
use crate::peer::types::{IceCandidate, SdpPayload};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use webrtc::peer_connection::RTCPeerConnection;

/// Жизненный цикл звонка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Requesting,
    Connected,
    Closed,
    Failed,
}

impl CallState {
    /// Разрешённые переходы конечного автомата
    pub fn can_transition(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Idle, Requesting)
                | (Requesting, Connected)
                | (Requesting, Closed)
                | (Requesting, Failed)
                | (Connected, Closed)
                | (Connected, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Closed | CallState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Один звонок: соединение, его состояние и всё сопутствующее.
/// Каждый звонок владеет своим, а не глобальным, состоянием.
pub struct Call {
    pub id: String,
    pub remote_peer: String,
    pub direction: CallDirection,
    state: Mutex<CallState>,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
    /// Offer входящего звонка до ответа приложения
    pending_offer: Mutex<Option<SdpPayload>>,
    /// Кандидаты, полученные до установки remote description
    pending_remote_candidates: Mutex<Vec<IceCandidate>>,
    /// Локальные кандидаты соединения (для диагностики)
    local_candidates: Mutex<Vec<IceCandidate>>,
    /// Отложенная задача для graceful disconnect
    disconnect_task: Mutex<Option<JoinHandle<()>>>,
    was_connected: Mutex<bool>,
}

impl Call {
    pub fn new(id: String, remote_peer: String, direction: CallDirection) -> Arc<Self> {
        Arc::new(Self {
            id,
            remote_peer,
            direction,
            state: Mutex::new(CallState::Idle),
            pc: Mutex::new(None),
            pending_offer: Mutex::new(None),
            pending_remote_candidates: Mutex::new(Vec::new()),
            local_candidates: Mutex::new(Vec::new()),
            disconnect_task: Mutex::new(None),
            was_connected: Mutex::new(false),
        })
    }

    pub fn state(&self) -> CallState {
        *self.state.lock().unwrap()
    }

    /// Переход состояния; незаконный переход — ошибка, а не тихая порча
    pub fn transition(&self, next: CallState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition(next) {
            return Err(Error::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        log(&format!("call {}: {:?} -> {:?}", self.id, *state, next));
        *state = next;
        Ok(())
    }

    pub fn attach_pc(&self, pc: Arc<RTCPeerConnection>) {
        *self.pc.lock().unwrap() = Some(pc);
    }

    pub fn pc(&self) -> Option<Arc<RTCPeerConnection>> {
        self.pc.lock().unwrap().clone()
    }

    pub fn set_pending_offer(&self, offer: SdpPayload) {
        *self.pending_offer.lock().unwrap() = Some(offer);
    }

    pub fn take_pending_offer(&self) -> Option<SdpPayload> {
        self.pending_offer.lock().unwrap().take()
    }

    pub fn queue_remote_candidate(&self, candidate: IceCandidate) {
        self.pending_remote_candidates.lock().unwrap().push(candidate);
    }

    pub fn drain_remote_candidates(&self) -> Vec<IceCandidate> {
        self.pending_remote_candidates
            .lock()
            .unwrap()
            .drain(..)
            .collect()
    }

    pub fn push_local_candidate(&self, candidate: IceCandidate) -> usize {
        let mut candidates = self.local_candidates.lock().unwrap();
        candidates.push(candidate);
        candidates.len()
    }

    pub fn local_candidates(&self) -> Vec<IceCandidate> {
        self.local_candidates.lock().unwrap().clone()
    }

    pub fn has_disconnect_task(&self) -> bool {
        self.disconnect_task.lock().unwrap().is_some()
    }

    pub fn store_disconnect_task(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.disconnect_task.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Отменяет отложенный disconnect, если он был
    pub fn abort_disconnect_task(&self) {
        if let Some(handle) = self.disconnect_task.lock().unwrap().take() {
            log(&format!("call {}: aborting pending disconnect task", self.id));
            handle.abort();
        }
    }

    /// Помечает звонок установленным; возвращает прежнее значение флага
    pub fn mark_connected(&self) -> bool {
        let mut was = self.was_connected.lock().unwrap();
        std::mem::replace(&mut *was, true)
    }

    pub fn was_connected(&self) -> bool {
        *self.was_connected.lock().unwrap()
    }

    /// Локальное закрытие соединения, без сигналинга
    pub async fn close(&self) {
        self.abort_disconnect_task();
        if let Some(pc) = self.pc() {
            if let Err(e) = pc.close().await {
                log(&format!("call {}: failed to close connection: {e}", self.id));
            }
        }
    }
}
