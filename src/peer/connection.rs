use crate::config::{self, PeerConfig, GRACE_PERIOD};
use crate::error::Result;
use crate::events::EventBus;
use crate::logger::{dump_candidate, dump_selected_pair, log};
use crate::media::LocalMedia;
use crate::peer::call::{Call, CallState};
use crate::peer::ice::analyze_candidates;
use crate::peer::types::{IceCandidate, ServerConfig};
use crate::signaling::{SignalMessage, SignalingClient};
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use tokio::time::sleep;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

/// Создаём соединение звонка: медиадвижок, ICE и обработчики состояний.
/// Локальные дорожки добавляются до offer/answer.
pub async fn new_peer(
    call: Arc<Call>,
    media: Arc<LocalMedia>,
    local_peer_id: String,
    config: &PeerConfig,
    signaling: SignalingClient,
    events: EventBus,
) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(
        api.new_peer_connection(rtc_config(config.ice_servers.clone()))
            .await?,
    );

    // Локальные кандидаты уходят в сигналинг по мере сбора (Trickle-ICE)
    let cand_call = call.clone();
    let cand_signaling = signaling.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let call = cand_call.clone();
        let signaling = cand_signaling.clone();
        let from = local_peer_id.clone();
        Box::pin(async move {
            match cand {
                Some(c) => {
                    dump_candidate("LOCAL", &c).await;

                    if let Ok(init) = c.to_json() {
                        let candidate = IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            call_id: call.id.clone(),
                        };

                        let total = call.push_local_candidate(candidate.clone());
                        log(&format!("Added ICE candidate, total count: {}", total));

                        let msg = SignalMessage::Candidate {
                            from,
                            to: call.remote_peer.clone(),
                            candidate,
                        };
                        if let Err(e) = signaling.send(msg).await {
                            log(&format!("Failed to forward local candidate: {e}"));
                        }
                    }
                }
                None => {
                    // cand == None означает конец сбора
                    log("ICE candidate gathering completed (null candidate received)");
                    analyze_candidates(&call.local_candidates());
                }
            }
        })
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        log(&format!("ICE gathering state changed to: {:?}", state));
        Box::pin(async {})
    }));

    // делаем копию для обработчика состояний
    let pc_state = pc.clone();
    let st_call = call.clone();
    let st_events = events.clone();

    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        log(&format!("Peer connection state changed to: {:?}", st));

        match st {
            RTCPeerConnectionState::Connected => {
                st_call.abort_disconnect_task();

                if !st_call.mark_connected() {
                    match st_call.transition(CallState::Connected) {
                        Ok(()) => st_events.emit_connected(&st_call.id),
                        Err(e) => log(&format!("cannot mark call connected: {e}")),
                    }
                } else {
                    // соединение пережило обрыв
                    st_events.emit_connection_recovered(&st_call.id);
                    st_events.emit_connected(&st_call.id);
                }
            }

            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                if st_call.state().is_terminal() {
                    return Box::pin(async {});
                }

                log(&format!("Peer connection {:?} - starting grace period", st));

                // уже ожидаем? – ничего не делаем
                if st_call.has_disconnect_task() {
                    log("Disconnect task already pending, ignoring");
                    return Box::pin(async {});
                }

                let pc_stats = pc_state.clone();
                tokio::spawn(async move {
                    dump_selected_pair(&pc_stats, "BEFORE-FAIL").await;
                });

                // Уведомляем о проблемах с подключением
                st_events.emit_connection_problem(&st_call.id);

                // ставим отложенную проверку
                let handle = tokio::spawn({
                    let call = st_call.clone();
                    let events = st_events.clone();
                    let pc = pc_state.clone();
                    async move {
                        log(&format!(
                            "Grace period started, waiting {} s",
                            GRACE_PERIOD.as_secs()
                        ));
                        events.emit_connection_recovering(&call.id);
                        sleep(GRACE_PERIOD).await;

                        let state_now = pc.connection_state();
                        log(&format!("Grace over ➜ state={:?}", state_now));

                        // если соединение так и не восстановилось — звонок не удался
                        if state_now != RTCPeerConnectionState::Connected {
                            if call.transition(CallState::Failed).is_ok() {
                                events.emit_call_failed(&call.id, "connection did not recover");
                            }
                        } else {
                            log("Connection recovered during grace period");
                        }
                    }
                });
                st_call.store_disconnect_task(handle);
            }

            RTCPeerConnectionState::Closed => {
                st_call.abort_disconnect_task();
                // если переход уже сделан (hangup), второй раз не сообщаем
                match st_call.transition(CallState::Closed) {
                    Ok(()) => st_events.emit_call_closed(&st_call.id),
                    Err(_) => log("Peer connection closed for an already finished call"),
                }
            }

            _ => {
                log(&format!("Peer connection state: {:?} - ignoring", st));
            }
        }
        Box::pin(async {})
    }));

    // Удалённые дорожки отдаём приложению событием
    let track_call_id = call.id.clone();
    let track_events = events.clone();
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        log(&format!("Remote track arrived: kind={}", track.kind()));
        track_events.emit_remote_stream(&track_call_id, track);
        Box::pin(async {})
    }));

    attach_local_tracks(&pc, &media).await?;

    Ok(pc)
}

/// Добавляет локальные дорожки и дренирует RTCP от их sender-ов
async fn attach_local_tracks(pc: &Arc<RTCPeerConnection>, media: &Arc<LocalMedia>) -> Result<()> {
    for track in media.tracks() {
        let sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
        });
    }
    Ok(())
}

/// Создает конфигурацию для peer connection
fn rtc_config(custom_servers: Option<Vec<ServerConfig>>) -> RTCConfiguration {
    let ice_servers = match custom_servers {
        // Используем пользовательские серверы
        Some(servers) => to_rtc_ice_servers(servers),
        // Или дефолтные
        None => to_rtc_ice_servers(config::DEFAULT_ICE_SERVERS.clone()),
    };

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Конвертация конфигурации серверов в формат webrtc
pub fn to_rtc_ice_servers(servers: Vec<ServerConfig>) -> Vec<RTCIceServer> {
    servers
        .into_iter()
        .map(|config| {
            let url = add_ice_url_scheme(&config);

            RTCIceServer {
                urls: vec![url],
                username: config.username.unwrap_or_default(),
                credential: config.credential.unwrap_or_default(),
            }
        })
        .collect()
}
