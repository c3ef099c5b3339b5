//! Интеграционные тесты жизненного цикла звонка: выдача ID, защита
//! готовностью медиа, отклонение, полный звонок между двумя клиентами
//! через сигнальный хаб в памяти.

use bytes::Bytes;
use peercall::{
    CallState, Error, MediaBackend, MediaConstraints, Peer, PeerConfig, PeerEvent, SampleBackend,
    SignalMessage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Мини-сервер сигналинга: выдаёт ID при подключении и маршрутизирует
/// сообщения по полю `to`
struct TestNet {
    hub_tx: mpsc::Sender<SignalMessage>,
    clients: Arc<Mutex<HashMap<String, mpsc::Sender<SignalMessage>>>>,
}

impl TestNet {
    fn new() -> Self {
        let (hub_tx, mut hub_rx) = mpsc::channel::<SignalMessage>(256);
        let clients: Arc<Mutex<HashMap<String, mpsc::Sender<SignalMessage>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let routing = clients.clone();
        tokio::spawn(async move {
            while let Some(msg) = hub_rx.recv().await {
                let (from, to) = match &msg {
                    SignalMessage::Offer { from, to, .. }
                    | SignalMessage::Answer { from, to, .. }
                    | SignalMessage::Candidate { from, to, .. }
                    | SignalMessage::Bye { from, to, .. } => (from.clone(), to.clone()),
                    _ => continue,
                };

                let target = routing.lock().unwrap().get(&to).cloned();
                match target {
                    Some(tx) => {
                        let _ = tx.send(msg).await;
                    }
                    None => {
                        // адресата нет — отправителю уходит ошибка
                        let sender = routing.lock().unwrap().get(&from).cloned();
                        if let Some(tx) = sender {
                            let _ = tx
                                .send(SignalMessage::Error {
                                    message: format!("peer {to} not found"),
                                })
                                .await;
                        }
                    }
                }
            }
        });

        Self { hub_tx, clients }
    }

    /// Подключает клиента и выдаёт ему ID
    async fn join(&self, id: &str, config: PeerConfig) -> Arc<Peer> {
        let (in_tx, in_rx) = mpsc::channel(256);
        self.clients
            .lock()
            .unwrap()
            .insert(id.to_string(), in_tx.clone());

        let peer = Peer::with_transport(config, self.hub_tx.clone(), in_rx).unwrap();
        in_tx
            .send(SignalMessage::Open {
                peer_id: id.to_string(),
            })
            .await
            .unwrap();

        while peer.peer_id().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        peer
    }
}

/// Без STUN: для loopback-тестов хватает host-кандидатов
fn local_config() -> PeerConfig {
    PeerConfig {
        ice_servers: Some(Vec::new()),
        ..Default::default()
    }
}

async fn wait_for(
    rx: &mut broadcast::Receiver<PeerEvent>,
    what: &str,
    pred: impl Fn(&PeerEvent) -> bool,
) -> PeerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event bus closed while waiting for {what}")
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Платформа отказала в доступе к камере/микрофону
struct DenyBackend;

impl MediaBackend for DenyBackend {
    fn open(&self, _constraints: &MediaConstraints) -> peercall::Result<peercall::LocalMedia> {
        Err(Error::MediaDenied("permission dismissed by user".into()))
    }
}

#[tokio::test]
async fn assigned_id_arrives_as_event_not_a_dialog() {
    let (in_tx, in_rx) = mpsc::channel(16);
    let (out_tx, _out_rx) = mpsc::channel(16);
    let peer = Peer::with_transport(local_config(), out_tx, in_rx).unwrap();

    // подписка до выдачи ID
    let mut events = peer.subscribe();
    assert!(!peer.is_open());

    in_tx
        .send(SignalMessage::Open {
            peer_id: "srv-42".into(),
        })
        .await
        .unwrap();

    let event = wait_for(&mut events, "Open", |e| matches!(e, PeerEvent::Open { .. })).await;
    match event {
        PeerEvent::Open { peer_id } => assert_eq!(peer_id, "srv-42"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(peer.peer_id().as_deref(), Some("srv-42"));
    assert!(peer.is_open());
}

#[tokio::test]
async fn call_before_media_grant_is_rejected() {
    let net = TestNet::new();
    let peer = net.join("alice", local_config()).await;

    assert!(matches!(peer.call("bob").await, Err(Error::MediaNotReady)));
}

#[tokio::test]
async fn empty_or_malformed_target_id_is_rejected_client_side() {
    let net = TestNet::new();
    let peer = net.join("alice", local_config()).await;
    peer.start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();

    assert!(matches!(peer.call("").await, Err(Error::InvalidPeerId(_))));
    assert!(matches!(
        peer.call("bad id!").await,
        Err(Error::InvalidPeerId(_))
    ));
}

#[tokio::test]
async fn media_denial_is_an_error_not_a_crash() {
    let net = TestNet::new();
    let peer = net.join("alice", local_config()).await;
    let mut events = peer.subscribe();

    let err = peer
        .start_media(&DenyBackend, MediaConstraints::default())
        .unwrap_err();
    assert!(matches!(err, Error::MediaDenied(_)));

    wait_for(&mut events, "MediaError", |e| {
        matches!(e, PeerEvent::MediaError { .. })
    })
    .await;

    // клиент жив: со второй попытки медиа выдаётся
    peer.start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    wait_for(&mut events, "MediaReady", |e| {
        matches!(e, PeerEvent::MediaReady)
    })
    .await;
}

#[tokio::test]
async fn inbound_call_before_callee_media_is_declined() {
    let net = TestNet::new();
    let alice = net.join("alice", local_config()).await;
    // bob подключён, но медиа ещё не запрашивал
    let _bob = net.join("bob", local_config()).await;

    alice
        .start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    let mut alice_events = alice.subscribe();

    let call = alice.call("bob").await.unwrap();
    assert_eq!(call.state(), CallState::Requesting);

    let event = wait_for(&mut alice_events, "CallFailed", |e| {
        matches!(e, PeerEvent::CallFailed { .. })
    })
    .await;
    match event {
        PeerEvent::CallFailed { call_id, .. } => assert_eq!(call_id, call.id),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(call.state(), CallState::Failed);
    assert!(alice.call_handle(&call.id).is_none());
}

#[tokio::test]
async fn call_to_unknown_peer_reports_signal_error() {
    let net = TestNet::new();
    let alice = net.join("alice", local_config()).await;
    alice
        .start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    let mut events = alice.subscribe();

    alice.call("ghost").await.unwrap();

    wait_for(&mut events, "SignalError", |e| {
        matches!(e, PeerEvent::SignalError { .. })
    })
    .await;
}

#[tokio::test]
async fn call_lifecycle_reaches_connected_streams_and_closes() {
    let net = TestNet::new();
    let alice = net.join("alice", local_config()).await;
    let bob = net.join("bob", local_config()).await;

    alice
        .start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    bob.start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();

    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    let call = alice.call("bob").await.unwrap();

    wait_for(&mut bob_events, "bob IncomingCall", |e| {
        matches!(e, PeerEvent::IncomingCall { .. })
    })
    .await;
    wait_for(&mut alice_events, "alice CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;
    wait_for(&mut bob_events, "bob CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;

    assert_eq!(call.state(), CallState::Connected);
    assert!(alice.is_connected());
    assert!(bob.is_connected());

    // шлём кадры, пока у боба не появится удалённая дорожка
    let media = alice.local_media().unwrap();
    let writer = tokio::spawn(async move {
        loop {
            let _ = media
                .write_video(Bytes::from_static(&[0u8; 1200]), Duration::from_millis(33))
                .await;
            tokio::time::sleep(Duration::from_millis(33)).await;
        }
    });

    let event = wait_for(&mut bob_events, "bob RemoteStream", |e| {
        matches!(e, PeerEvent::RemoteStream { .. })
    })
    .await;
    match event {
        PeerEvent::RemoteStream { call_id, .. } => assert_eq!(call_id, call.id),
        other => panic!("unexpected event: {other:?}"),
    }
    writer.abort();

    // кладём трубку — закрываются обе стороны
    alice.hangup(&call.id).await.unwrap();
    assert_eq!(call.state(), CallState::Closed);
    assert!(alice.call_handle(&call.id).is_none());

    wait_for(&mut bob_events, "bob CallClosed", |e| {
        matches!(e, PeerEvent::CallClosed { .. })
    })
    .await;
}

#[tokio::test]
async fn disconnect_closes_calls_signaling_and_media() {
    let net = TestNet::new();
    let alice = net.join("alice", local_config()).await;
    let bob = net.join("bob", local_config()).await;

    alice
        .start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    bob.start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();

    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    let call = alice.call("bob").await.unwrap();
    wait_for(&mut alice_events, "alice CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;
    wait_for(&mut bob_events, "bob CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;

    alice.disconnect().await;

    wait_for(&mut alice_events, "alice Disconnected", |e| {
        matches!(e, PeerEvent::Disconnected)
    })
    .await;
    assert_eq!(call.state(), CallState::Closed);
    assert!(!alice.is_connected());
    assert!(alice.local_media().is_none());

    // удалённая сторона узнаёт о завершении через Bye
    wait_for(&mut bob_events, "bob CallClosed", |e| {
        matches!(e, PeerEvent::CallClosed { .. })
    })
    .await;

    // поток отпущен, сигналинг закрыт — новый звонок не начать
    assert!(matches!(alice.call("bob").await, Err(Error::MediaNotReady)));
}

#[tokio::test]
async fn manual_answer_connects_when_auto_answer_is_off() {
    let net = TestNet::new();
    let alice = net.join("alice", local_config()).await;
    let bob = net
        .join(
            "bob",
            PeerConfig {
                auto_answer: false,
                ..local_config()
            },
        )
        .await;

    alice
        .start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();
    bob.start_media(&SampleBackend, MediaConstraints::default())
        .unwrap();

    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    let call = alice.call("bob").await.unwrap();

    let event = wait_for(&mut bob_events, "bob IncomingCall", |e| {
        matches!(e, PeerEvent::IncomingCall { .. })
    })
    .await;
    let (call_id, from) = match event {
        PeerEvent::IncomingCall { call_id, from } => (call_id, from),
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(from, "alice");
    assert_eq!(call_id, call.id);

    bob.answer(&call_id).await.unwrap();

    wait_for(&mut alice_events, "alice CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;
    wait_for(&mut bob_events, "bob CallConnected", |e| {
        matches!(e, PeerEvent::CallConnected { .. })
    })
    .await;
    assert_eq!(call.state(), CallState::Connected);
}
