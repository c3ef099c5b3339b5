use crate::error::{Error, Result};
use crate::logger::log;
use crate::peer::types::IceCandidate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Сообщения сигнального канала. Адресация — по выданным сервером ID.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Сервер выдал клиенту ID
    Open { peer_id: String },
    /// Приглашение в звонок; payload — закодированный SDP
    Offer {
        from: String,
        to: String,
        payload: String,
    },
    Answer {
        from: String,
        to: String,
        payload: String,
    },
    /// Trickle-ICE кандидат
    Candidate {
        from: String,
        to: String,
        candidate: IceCandidate,
    },
    /// Завершение или отклонение звонка
    Bye {
        from: String,
        to: String,
        call_id: String,
    },
    Error { message: String },
}

/// Клиентская сторона сигналинга. Исходящие сообщения идут в канал;
/// транспорт за ним — WebSocket или пара каналов в тестах.
#[derive(Clone)]
pub struct SignalingClient {
    outbound: Arc<Mutex<Option<mpsc::Sender<SignalMessage>>>>,
}

impl SignalingClient {
    /// Клиент поверх готового канала (тесты, встраивание)
    pub fn from_channel(outbound: mpsc::Sender<SignalMessage>) -> Self {
        Self {
            outbound: Arc::new(Mutex::new(Some(outbound))),
        }
    }

    /// Подключение к сигнальному серверу по WebSocket
    pub async fn connect_ws(url: &str) -> Result<(Self, mpsc::Receiver<SignalMessage>)> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| Error::Signaling(e.to_string()))?;
        log(&format!("signaling connected: {url}"));

        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<SignalMessage>(64);
        let (in_tx, in_rx) = mpsc::channel::<SignalMessage>(64);

        // насос исходящих
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        log(&format!("Failed to serialize signal message: {e}"));
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    log(&format!("Signaling send failed: {e}"));
                    break;
                }
            }
        });

        // насос входящих
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        log(&format!("Signaling receive failed: {e}"));
                        break;
                    }
                };

                match frame {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        // битое сообщение не роняет цикл
                        Err(e) => log(&format!("Dropping malformed signal message: {e}")),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            // in_tx дропается — получатель увидит закрытие канала
        });

        Ok((Self::from_channel(out_tx), in_rx))
    }

    pub async fn send(&self, msg: SignalMessage) -> Result<()> {
        let tx = self
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::SignalingClosed)?;
        tx.send(msg).await.map_err(|_| Error::SignalingClosed)
    }

    /// Закрывает исходящую сторону; насосы транспорта завершаются сами,
    /// когда последний отправитель уходит
    pub fn close(&self) {
        self.outbound.lock().unwrap().take();
    }
}
