use crate::logger::log;
use crate::peer::call::Call;
use crate::peer::types::{IceCandidate, ServerConfig};
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: None,
    }
}

/// Применяет ICE кандидат от удалённой стороны
pub async fn add_remote_candidate(call: &Arc<Call>, candidate: IceCandidate) -> bool {
    log(&format!("add_remote_candidate called: {:?}", candidate));

    let pc = match call.pc() {
        Some(pc) => pc,
        None => {
            // соединения ещё нет — откладываем
            log("no peer connection yet, queuing candidate");
            call.queue_remote_candidate(candidate);
            return true;
        }
    };

    // Если remote description уже установлен, применяем кандидат сразу
    if pc.remote_description().await.is_some() {
        match pc.add_ice_candidate(candidate_init(candidate)).await {
            Ok(_) => {
                log("Successfully added ICE candidate");
                true
            }
            Err(e) => {
                log(&format!("Failed to add ICE candidate: {:?}", e));
                false
            }
        }
    } else {
        // Если remote description еще не установлен, сохраняем кандидат
        log("Remote description not set yet, queuing candidate");
        call.queue_remote_candidate(candidate);
        true
    }
}

/// Применяет все отложенные кандидаты после установки remote description
pub async fn apply_pending_candidates(call: &Arc<Call>) {
    let pc = match call.pc() {
        Some(pc) => pc,
        None => return,
    };

    for candidate in call.drain_remote_candidates() {
        log(&format!("Applying pending candidate: {:?}", candidate));
        if let Err(e) = pc.add_ice_candidate(candidate_init(candidate)).await {
            log(&format!("Failed to apply pending candidate: {:?}", e));
        }
    }
}

/// Сводка по собранным кандидатам
pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    log(&format!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    ));

    if relay_count == 0 {
        log("WARNING: No TURN relay candidates found! Connection through NAT may fail.");
    }
}

/// Проверка доступности ICE сервера: поднимаем одноразовое соединение
/// и смотрим, приходят ли с этого сервера кандидаты нужного типа
pub async fn check_ice_server_availability(config: ServerConfig) -> bool {
    log(&format!(
        "check_ice_server_availability called with config: {:?}",
        config
    ));

    let url = add_ice_url_scheme(&config);

    let ice_server = RTCIceServer {
        urls: vec![url],
        username: config.username.clone().unwrap_or_default(),
        credential: config.credential.clone().unwrap_or_default(),
    };

    let rtc_config = RTCConfiguration {
        ice_servers: vec![ice_server],
        ..Default::default()
    };

    let api = APIBuilder::new().build();
    match api.new_peer_connection(rtc_config).await {
        Ok(peer_connection) => {
            check_via_ice_gathering(peer_connection.into(), &config.r#type).await
        }
        Err(e) => {
            log(&format!("Failed to create peer connection: {:?}", e));
            false
        }
    }
}

async fn check_via_ice_gathering(
    peer_connection: Arc<RTCPeerConnection>,
    server_type: &str,
) -> bool {
    let (state_tx, mut state_rx) = mpsc::channel(10);

    // Подписываемся на изменения состояния gathering
    peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
        let tx = state_tx.clone();
        log(&format!("ICE gathering state changed to: {:?}", state));
        tokio::spawn(async move {
            let _ = tx.send(state).await;
        });
        Box::pin(async {})
    }));

    // Подписываемся на ICE кандидатов
    let (candidate_tx, mut candidate_rx) = mpsc::channel(10);
    let server_type_clone = server_type.to_string();

    peer_connection.on_ice_candidate(Box::new(move |candidate| {
        let tx = candidate_tx.clone();
        let server_type = server_type_clone.clone();

        Box::pin(async move {
            if let Some(c) = candidate {
                // Для STUN серверов ищем srflx кандидатов,
                // для TURN серверов — relay
                let matched = c
                    .to_json()
                    .map(|json| {
                        (server_type == "stun" && json.candidate.contains("srflx"))
                            || (server_type == "turn" && json.candidate.contains("relay"))
                    })
                    .unwrap_or(false);

                if matched {
                    log("Found matching candidate for server type");
                    let _ = tx.send(true).await;
                }
            } else {
                log("Received null candidate (gathering complete)");
            }
        })
    }));

    // Data channel нужен только чтобы запустить ICE gathering
    if let Err(e) = peer_connection.create_data_channel("probe", None).await {
        log(&format!("Failed to create data channel: {:?}", e));
        return false;
    }

    let offer = match peer_connection.create_offer(None).await {
        Ok(offer) => offer,
        Err(e) => {
            log(&format!("Failed to create offer: {:?}", e));
            return false;
        }
    };
    if let Err(e) = peer_connection.set_local_description(offer).await {
        log(&format!("Failed to set local description: {:?}", e));
        return false;
    }

    // Ждем результат с таймаутом
    let check_timeout = Duration::from_secs(10);

    let available = tokio::select! {
        // Ждем подходящего кандидата
        result = timeout(check_timeout, candidate_rx.recv()) => {
            matches!(result, Ok(Some(true)))
        }
        // Или конца сбора без единого подходящего
        _ = async {
            while let Some(state) = state_rx.recv().await {
                if state == RTCIceGathererState::Complete {
                    log("ICE gathering completed without a matching candidate");
                    break;
                }
            }
        } => false
    };

    let _ = peer_connection.close().await;
    available
}
