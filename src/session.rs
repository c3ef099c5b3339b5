use crate::media::LocalMedia;
use crate::peer::call::Call;
use crate::peer::types::IceCandidate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Явное состояние клиента: выданный ID, локальный медиапоток и живые
/// звонки. Одна структура вместо набора глобальных переменных.
pub struct Session {
    peer_id: Mutex<Option<String>>,
    local_media: Mutex<Option<Arc<LocalMedia>>>,
    calls: Mutex<HashMap<String, Arc<Call>>>,
    /// Кандидаты, пришедшие раньше своего offer-а
    orphan_candidates: Mutex<Vec<IceCandidate>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            peer_id: Mutex::new(None),
            local_media: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            orphan_candidates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_peer_id(&self, id: String) {
        *self.peer_id.lock().unwrap() = Some(id);
    }

    pub fn peer_id(&self) -> Option<String> {
        self.peer_id.lock().unwrap().clone()
    }

    pub fn set_media(&self, media: Arc<LocalMedia>) {
        *self.local_media.lock().unwrap() = Some(media);
    }

    pub fn media(&self) -> Option<Arc<LocalMedia>> {
        self.local_media.lock().unwrap().clone()
    }

    /// Отпускает локальный поток; дорожки живут, пока живы звонки
    pub fn clear_media(&self) {
        *self.local_media.lock().unwrap() = None;
    }

    /// Готовность локального потока — до неё звонки запрещены
    pub fn media_ready(&self) -> bool {
        self.local_media.lock().unwrap().is_some()
    }

    pub fn register_call(&self, call: Arc<Call>) {
        self.calls.lock().unwrap().insert(call.id.clone(), call);
    }

    pub fn call(&self, id: &str) -> Option<Arc<Call>> {
        self.calls.lock().unwrap().get(id).cloned()
    }

    pub fn remove_call(&self, id: &str) -> Option<Arc<Call>> {
        self.calls.lock().unwrap().remove(id)
    }

    pub fn calls(&self) -> Vec<Arc<Call>> {
        self.calls.lock().unwrap().values().cloned().collect()
    }

    pub fn queue_orphan_candidate(&self, candidate: IceCandidate) {
        self.orphan_candidates.lock().unwrap().push(candidate);
    }

    /// Забрать отложенные кандидаты конкретного звонка
    pub fn take_orphan_candidates(&self, call_id: &str) -> Vec<IceCandidate> {
        let mut orphans = self.orphan_candidates.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) =
            orphans.drain(..).partition(|c| c.call_id == call_id);
        *orphans = rest;
        matching
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaBackend, MediaConstraints, SampleBackend};
    use crate::peer::call::CallDirection;

    #[test]
    fn media_ready_flips_on_grant() {
        let session = Session::new();
        assert!(!session.media_ready());

        let media = SampleBackend.open(&MediaConstraints::default()).unwrap();
        session.set_media(Arc::new(media));
        assert!(session.media_ready());

        session.clear_media();
        assert!(!session.media_ready());
    }

    #[test]
    fn calls_are_registered_and_removed() {
        let session = Session::new();
        let call = Call::new("c1".into(), "bob".into(), CallDirection::Outbound);
        session.register_call(call.clone());

        assert!(session.call("c1").is_some());
        assert_eq!(session.calls().len(), 1);

        assert!(session.remove_call("c1").is_some());
        assert!(session.call("c1").is_none());
        assert!(session.remove_call("c1").is_none());
    }

    #[test]
    fn orphan_candidates_are_matched_by_call() {
        let session = Session::new();
        let cand = |call_id: &str| IceCandidate {
            candidate: "candidate:0 1 udp 1 127.0.0.1 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            call_id: call_id.into(),
        };

        session.queue_orphan_candidate(cand("c1"));
        session.queue_orphan_candidate(cand("c2"));
        session.queue_orphan_candidate(cand("c1"));

        assert_eq!(session.take_orphan_candidates("c1").len(), 2);
        assert_eq!(session.take_orphan_candidates("c1").len(), 0);
        assert_eq!(session.take_orphan_candidates("c2").len(), 1);
    }
}
