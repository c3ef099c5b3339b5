use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;

/// Логирование с временными метками
pub fn log(msg: &str) {
    // Проверяем конфигурацию логирования
    if crate::config::LOGGING_ENABLED {
        #[cfg(debug_assertions)]
        {
            // В режиме разработки дополнительно проверяем dev::ENABLE_LOGGING
            if !crate::config::dev::ENABLE_LOGGING {
                return;
            }
        }

        let now = chrono::Local::now();
        println!("PEERCALL: [{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), msg);
    }
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub async fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        log(&format!(
            "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index, init.username_fragment
        ));
    }
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        match v {
            webrtc::stats::StatsReportType::CandidatePair(pair) => {
                if pair.nominated {
                    log(&format!(
                        "STATS {moment}: {}:{}  type: {:?}  bytes={}/{} state={:?}",
                        pair.local_candidate_id,
                        pair.remote_candidate_id,
                        pair.stats_type,
                        pair.bytes_sent,
                        pair.bytes_received,
                        pair.state
                    ));
                }
            }
            _ => {}
        }
    }
}
