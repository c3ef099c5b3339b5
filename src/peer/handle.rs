use crate::config::{self, PeerConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, PeerEvent};
use crate::logger::log;
use crate::media::{LocalMedia, MediaBackend, MediaConstraints};
use crate::peer::call::{Call, CallDirection, CallState};
use crate::peer::connection::new_peer;
use crate::peer::ice::{add_remote_candidate, apply_pending_candidates};
use crate::peer::payload::{decode_sdp, encode_sdp};
use crate::peer::types::SdpPayload;
use crate::session::Session;
use crate::signaling::{SignalMessage, SignalingClient};
use crate::utils::{random_id, validate_peer_id};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Клиент звонков: сигналинг, сессия и шина событий в одном месте.
/// ID выдаёт сигнальный сервер (событие Open), звонки адресуются по ID.
pub struct Peer {
    config: PeerConfig,
    session: Arc<Session>,
    signaling: SignalingClient,
    events: EventBus,
}

impl Peer {
    /// Подключение к сигнальному серверу по WebSocket
    pub async fn connect(config: PeerConfig) -> Result<Arc<Self>> {
        if let Some(servers) = &config.ice_servers {
            config::validate_ice_servers(servers)?;
        }
        let (signaling, inbound) = SignalingClient::connect_ws(&config.signaling_url).await?;
        Ok(Self::spawn(config, signaling, inbound))
    }

    /// Тот же клиент поверх готовой пары каналов (тесты, встраивание)
    pub fn with_transport(
        config: PeerConfig,
        outbound: mpsc::Sender<SignalMessage>,
        inbound: mpsc::Receiver<SignalMessage>,
    ) -> Result<Arc<Self>> {
        if let Some(servers) = &config.ice_servers {
            config::validate_ice_servers(servers)?;
        }
        Ok(Self::spawn(
            config,
            SignalingClient::from_channel(outbound),
            inbound,
        ))
    }

    fn spawn(
        config: PeerConfig,
        signaling: SignalingClient,
        inbound: mpsc::Receiver<SignalMessage>,
    ) -> Arc<Self> {
        let peer = Arc::new(Self {
            config,
            session: Arc::new(Session::new()),
            signaling,
            events: EventBus::new(),
        });

        let router = peer.clone();
        tokio::spawn(async move { router.route(inbound).await });

        peer
    }

    /// Подписка на события клиента
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Наш ID, если сервер его уже выдал
    pub fn peer_id(&self) -> Option<String> {
        self.session.peer_id()
    }

    pub fn is_open(&self) -> bool {
        self.session.peer_id().is_some()
    }

    /// Есть ли хоть один установленный звонок
    pub fn is_connected(&self) -> bool {
        self.session
            .calls()
            .iter()
            .any(|call| call.state() == CallState::Connected)
    }

    pub fn call_handle(&self, call_id: &str) -> Option<Arc<Call>> {
        self.session.call(call_id)
    }

    /// Запрос локального медиапотока. Отказ платформы — событие и
    /// ошибка, процесс продолжает жить.
    pub fn start_media(
        &self,
        backend: &dyn MediaBackend,
        constraints: MediaConstraints,
    ) -> Result<()> {
        match backend.open(&constraints) {
            Ok(media) => {
                self.session.set_media(Arc::new(media));
                self.events.emit_media_ready();
                Ok(())
            }
            Err(e) => {
                log(&format!("media request failed: {e}"));
                self.events.emit_media_error(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn local_media(&self) -> Option<Arc<LocalMedia>> {
        self.session.media()
    }

    /// Исходящий звонок на выданный сервером ID
    pub async fn call(&self, remote_id: &str) -> Result<Arc<Call>> {
        validate_peer_id(remote_id)?;
        let from = self.session.peer_id().ok_or(Error::NotOpen)?;
        // до готовности локального потока звонки запрещены
        let media = self.session.media().ok_or(Error::MediaNotReady)?;

        let call = Call::new(random_id(), remote_id.to_string(), CallDirection::Outbound);
        self.session.register_call(call.clone());
        call.transition(CallState::Requesting)?;

        match self.dial(&call, media, from).await {
            Ok(()) => Ok(call),
            Err(e) => {
                log(&format!("outbound call {} failed to start: {e}", call.id));
                let _ = call.transition(CallState::Failed);
                self.events.emit_call_failed(&call.id, &e.to_string());
                self.session.remove_call(&call.id);
                call.close().await;
                Err(e)
            }
        }
    }

    async fn dial(&self, call: &Arc<Call>, media: Arc<LocalMedia>, from: String) -> Result<()> {
        let pc = new_peer(
            call.clone(),
            media,
            from.clone(),
            &self.config,
            self.signaling.clone(),
            self.events.clone(),
        )
        .await?;
        call.attach_pc(pc.clone());

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Signaling("local description missing after offer".into()))?;

        let payload = SdpPayload {
            sdp: local,
            id: call.id.clone(),
            ts: chrono::Utc::now().timestamp(),
        };
        self.signaling
            .send(SignalMessage::Offer {
                from,
                to: call.remote_peer.clone(),
                payload: encode_sdp(&payload)?,
            })
            .await
    }

    /// Ответ на входящий звонок (когда auto_answer выключен)
    pub async fn answer(&self, call_id: &str) -> Result<()> {
        let call = self
            .session
            .call(call_id)
            .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;
        let my_id = self.session.peer_id().ok_or(Error::NotOpen)?;
        let media = self.session.media().ok_or(Error::MediaNotReady)?;
        let offer = call
            .take_pending_offer()
            .ok_or_else(|| Error::Signaling("no pending offer for this call".into()))?;

        match self.answer_call(&call, media, my_id, offer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_call(&call, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Завершение звонка с уведомлением удалённой стороны
    pub async fn hangup(&self, call_id: &str) -> Result<()> {
        let call = self
            .session
            .remove_call(call_id)
            .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;

        if let Some(from) = self.session.peer_id() {
            let _ = self
                .signaling
                .send(SignalMessage::Bye {
                    from,
                    to: call.remote_peer.clone(),
                    call_id: call.id.clone(),
                })
                .await;
        }

        if !call.state().is_terminal() {
            call.transition(CallState::Closed)?;
            self.events.emit_call_closed(&call.id);
        }
        call.close().await;
        Ok(())
    }

    /// Полное отключение: все звонки, сигналинг и локальный поток
    pub async fn disconnect(&self) {
        for call in self.session.calls() {
            if let Err(e) = self.hangup(&call.id).await {
                log(&format!("hangup during disconnect failed: {e}"));
            }
        }
        self.signaling.close();
        self.session.clear_media();
        self.events.emit_disconnected();
    }

    /// Цикл обработки входящих сообщений сигналинга
    async fn route(&self, mut inbound: mpsc::Receiver<SignalMessage>) {
        while let Some(msg) = inbound.recv().await {
            if let Err(e) = self.handle_message(msg).await {
                // ошибка одного сообщения не роняет цикл
                log(&format!("signal handling error: {e}"));
                self.events.emit_signal_error(&e.to_string());
            }
        }
        log("signaling channel closed");
        self.events.emit_disconnected();
    }

    async fn handle_message(&self, msg: SignalMessage) -> Result<()> {
        match msg {
            SignalMessage::Open { peer_id } => {
                log(&format!("assigned peer id: {peer_id}"));
                self.session.set_peer_id(peer_id.clone());
                // вместо блокирующего диалога — событие для UI
                self.events.emit_open(&peer_id);
                Ok(())
            }
            SignalMessage::Offer { from, payload, .. } => self.handle_offer(from, payload).await,
            SignalMessage::Answer { payload, .. } => self.handle_answer(payload).await,
            SignalMessage::Candidate { candidate, .. } => {
                match self.session.call(&candidate.call_id) {
                    Some(call) => {
                        add_remote_candidate(&call, candidate).await;
                    }
                    None => {
                        // кандидат обогнал свой offer — придержим
                        log(&format!(
                            "candidate for not-yet-known call {}, queuing",
                            candidate.call_id
                        ));
                        self.session.queue_orphan_candidate(candidate);
                    }
                }
                Ok(())
            }
            SignalMessage::Bye { call_id, .. } => self.handle_bye(call_id).await,
            SignalMessage::Error { message } => {
                log(&format!("signaling server error: {message}"));
                self.events.emit_signal_error(&message);
                Ok(())
            }
        }
    }

    /// Входящий звонок
    async fn handle_offer(&self, from: String, payload: String) -> Result<()> {
        let offer = decode_sdp(&payload)?;
        let my_id = self.session.peer_id().ok_or(Error::NotOpen)?;

        // до готовности медиа входящие не обслуживаем
        let media = match self.session.media() {
            Some(media) => media,
            None => {
                log(&format!(
                    "declining call {} from {}: local media not ready",
                    offer.id, from
                ));
                let _ = self
                    .signaling
                    .send(SignalMessage::Bye {
                        from: my_id,
                        to: from,
                        call_id: offer.id.clone(),
                    })
                    .await;
                self.events
                    .emit_call_failed(&offer.id, "local media not ready");
                // отказ уже оформлен, для цикла это не ошибка
                return Ok(());
            }
        };

        let call = Call::new(offer.id.clone(), from.clone(), CallDirection::Inbound);
        self.session.register_call(call.clone());
        call.transition(CallState::Requesting)?;

        // кандидаты, успевшие прийти раньше offer-а
        for candidate in self.session.take_orphan_candidates(&call.id) {
            call.queue_remote_candidate(candidate);
        }

        self.events.emit_incoming_call(&call.id, &from);

        if !self.config.auto_answer {
            // приложение ответит само через answer()
            call.set_pending_offer(offer);
            return Ok(());
        }

        match self.answer_call(&call, media, my_id, offer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_call(&call, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Отвечаем на offer локальным потоком
    async fn answer_call(
        &self,
        call: &Arc<Call>,
        media: Arc<LocalMedia>,
        my_id: String,
        offer: SdpPayload,
    ) -> Result<()> {
        let pc = new_peer(
            call.clone(),
            media,
            my_id.clone(),
            &self.config,
            self.signaling.clone(),
            self.events.clone(),
        )
        .await?;
        call.attach_pc(pc.clone());

        pc.set_remote_description(offer.sdp).await?;
        apply_pending_candidates(call).await;

        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Signaling("local description missing after answer".into()))?;

        let payload = SdpPayload {
            sdp: local,
            id: call.id.clone(),
            ts: chrono::Utc::now().timestamp(),
        };
        self.signaling
            .send(SignalMessage::Answer {
                from: my_id,
                to: call.remote_peer.clone(),
                payload: encode_sdp(&payload)?,
            })
            .await
    }

    async fn handle_answer(&self, payload: String) -> Result<()> {
        let answer = decode_sdp(&payload)?;
        let call = self
            .session
            .call(&answer.id)
            .ok_or_else(|| Error::UnknownCall(answer.id.clone()))?;
        let pc = call
            .pc()
            .ok_or_else(|| Error::Signaling("answer for a call without connection".into()))?;

        pc.set_remote_description(answer.sdp).await?;
        apply_pending_candidates(&call).await;
        Ok(())
    }

    /// Удалённая сторона положила трубку или отклонила звонок
    async fn handle_bye(&self, call_id: String) -> Result<()> {
        let call = self
            .session
            .remove_call(&call_id)
            .ok_or(Error::UnknownCall(call_id))?;

        let declined = call.state() == CallState::Requesting;
        if !call.state().is_terminal() {
            let next = if declined {
                CallState::Failed
            } else {
                CallState::Closed
            };
            let _ = call.transition(next);
        }
        call.close().await;

        if declined {
            // отклонили до установления — для звонящего это отказ
            self.events
                .emit_call_failed(&call.id, "call declined by remote peer");
        } else {
            self.events.emit_call_closed(&call.id);
        }
        Ok(())
    }

    async fn fail_call(&self, call: &Arc<Call>, reason: &str) {
        let _ = call.transition(CallState::Failed);
        self.events.emit_call_failed(&call.id, reason);
        self.session.remove_call(&call.id);
        call.close().await;
    }
}
