//! Integration tests for the rendezvous runtime
//!
//! Two or more runtimes share a loopback medium and are driven through their
//! handles, observing only app events and the radios' externally visible
//! state. Timers run on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use peerconnect_core::{
    AppEvent, AppEventReceiver, EndpointId, Identity, MemoryIdentityStore, MemoryPeerStore,
    PeerConnectError, PeerRecord, PeerStore, RendezvousConfig, SessionState,
    SwitchableRadioGate, Timestamp, Transport, TransportError,
};
use peerconnect_runtime::{
    LoopbackMedium, LoopbackTransport, RendezvousHandle, RuntimeBuilder,
    STATUS_CONNECTION_REJECTED,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_test::{assert_err, assert_ok};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

struct Device {
    radio: LoopbackTransport,
    handle: RendezvousHandle,
    events: AppEventReceiver,
    store: Arc<MemoryPeerStore>,
    identity: Identity,
}

impl Device {
    async fn start(medium: &LoopbackMedium, name: Option<&str>) -> Self {
        Self::start_with(medium, name, Arc::new(MemoryPeerStore::new())).await
    }

    async fn start_with(
        medium: &LoopbackMedium,
        name: Option<&str>,
        store: Arc<MemoryPeerStore>,
    ) -> Self {
        let identity_store = match name {
            Some(name) => MemoryIdentityStore::with_name(name),
            None => MemoryIdentityStore::new(),
        };
        let radio = medium.station();
        let mut handle = RuntimeBuilder::new(Arc::new(radio.clone()))
            .with_peer_store(store.clone())
            .with_identity_store(Arc::new(identity_store))
            .build_and_start()
            .await
            .expect("runtime should start");
        let mut events = handle.take_app_event_receiver().unwrap();
        let identity = match wait_for(&mut events, |e| matches!(e, AppEvent::Ready { .. })).await {
            AppEvent::Ready { identity } => identity,
            _ => unreachable!(),
        };
        Self {
            radio,
            handle,
            events,
            store,
            identity,
        }
    }
}

/// Wait for the first app event matching `predicate`
async fn wait_for<F>(events: &mut AppEventReceiver, mut predicate: F) -> AppEvent
where
    F: FnMut(&AppEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("app event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for app event")
}

fn lists_online(event: &AppEvent, name: &str) -> bool {
    matches!(event, AppEvent::PeerListChanged(view)
        if view.online.iter().any(|p| p.display_name == name))
}

/// Bring `host` and `joiner` to a connected session
async fn connect(host: &mut Device, joiner: &mut Device) -> EndpointId {
    host.handle.host().await.unwrap();
    joiner.handle.join().await.unwrap();
    let host_name = host.identity.name().to_string();
    wait_for(&mut joiner.events, |e| lists_online(e, &host_name)).await;

    let host_endpoint = host.radio.endpoint_id().unwrap();
    joiner.handle.select_peer(host_endpoint.clone()).await.unwrap();

    futures::join!(
        wait_for(&mut host.events, |e| matches!(e, AppEvent::SessionStarted { .. })),
        wait_for(&mut joiner.events, |e| matches!(e, AppEvent::SessionStarted { .. })),
    );
    host_endpoint
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_end_to_end_host_join_select_chat() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;

    x.handle.host().await.unwrap();
    y.handle.join().await.unwrap();

    wait_for(&mut y.events, |e| lists_online(e, "X")).await;
    let x_endpoint = x.radio.endpoint_id().unwrap();
    y.handle.select_peer(x_endpoint.clone()).await.unwrap();

    match wait_for(&mut y.events, |e| matches!(e, AppEvent::SessionStarted { .. })).await {
        AppEvent::SessionStarted {
            endpoint_id,
            peer_name,
        } => {
            assert_eq!(endpoint_id, x_endpoint);
            assert_eq!(peer_name, "X");
        }
        _ => unreachable!(),
    }
    wait_for(&mut x.events, |e| {
        matches!(e, AppEvent::StatusChanged { state: SessionState::Connected, text } if text == "Connected to Y")
    })
    .await;

    x.handle.send_text("hi").await.unwrap();
    match wait_for(&mut y.events, |e| matches!(e, AppEvent::MessageReceived(_))).await {
        AppEvent::MessageReceived(message) => {
            assert_eq!(message.sender_name(), "X");
            assert_eq!(message.body(), "hi");
        }
        _ => unreachable!(),
    }

    assert!(!x.radio.is_advertising());
    assert!(!y.radio.is_discovering());
    assert_eq!(x.radio.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_only_session_peer_stays_online_after_select() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let z = Device::start(&medium, Some("Z")).await;
    let mut y = Device::start(&medium, Some("Y")).await;

    x.handle.host().await.unwrap();
    z.handle.host().await.unwrap();
    y.handle.join().await.unwrap();
    wait_for(&mut y.events, |e| {
        matches!(e, AppEvent::PeerListChanged(view) if view.online.len() == 2)
    })
    .await;

    let x_endpoint = x.radio.endpoint_id().unwrap();
    y.handle.select_peer(x_endpoint.clone()).await.unwrap();
    wait_for(&mut y.events, |e| matches!(e, AppEvent::SessionStarted { .. })).await;

    match wait_for(&mut y.events, |e| matches!(e, AppEvent::PeerListChanged(_))).await {
        AppEvent::PeerListChanged(view) => {
            assert!(!y.radio.is_discovering());
            let online: Vec<_> = view.online.iter().map(|p| p.display_name.as_str()).collect();
            assert_eq!(online, vec!["X"]);
            assert_eq!(view.online[0].endpoint_id, x_endpoint);
        }
        _ => unreachable!(),
    }
    assert!(z.radio.is_advertising());
    wait_for(&mut x.events, |e| matches!(e, AppEvent::SessionStarted { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn test_send_echoes_message_to_sender() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    connect(&mut x, &mut y).await;

    y.handle.send_text("hello back").await.unwrap();
    match wait_for(&mut y.events, |e| matches!(e, AppEvent::MessageSent(_))).await {
        AppEvent::MessageSent(message) => {
            assert_eq!(message.sender_name(), "Y");
            assert_eq!(message.body(), "hello back");
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_handshake_resets_both_sides() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, None).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    assert!(x.identity.is_generated());

    x.handle.host().await.unwrap();
    x.radio.reject_next_handshake(STATUS_CONNECTION_REJECTED);
    y.handle.join().await.unwrap();
    let x_name = x.identity.name().to_string();
    wait_for(&mut y.events, |e| lists_online(e, &x_name)).await;
    y.handle
        .select_peer(x.radio.endpoint_id().unwrap())
        .await
        .unwrap();

    let error = wait_for(&mut x.events, |e| matches!(e, AppEvent::Error { .. })).await;
    assert!(matches!(error, AppEvent::Error { message } if message.contains("8004")));

    match wait_for(&mut x.events, |e| matches!(e, AppEvent::Ready { .. })).await {
        AppEvent::Ready { identity } => {
            assert!(identity.is_generated());
            assert_ne!(identity.name(), x_name);
        }
        _ => unreachable!(),
    }
    wait_for(&mut y.events, |e| matches!(e, AppEvent::Ready { .. })).await;

    for radio in [&x.radio, &y.radio] {
        assert!(!radio.is_advertising());
        assert!(!radio.is_discovering());
        assert_eq!(radio.connection_count(), 0);
    }

    // Idle and ready again
    assert_ok!(x.handle.host().await);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_resets_peer_and_keeps_saved_name() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    connect(&mut x, &mut y).await;

    y.handle.disconnect().await.unwrap();

    wait_for(&mut x.events, |e| {
        matches!(e, AppEvent::StatusChanged { state: SessionState::Idle, .. })
    })
    .await;
    match wait_for(&mut x.events, |e| matches!(e, AppEvent::Ready { .. })).await {
        AppEvent::Ready { identity } => assert_eq!(identity.name(), "X"),
        _ => unreachable!(),
    }
    assert_eq!(x.radio.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_commands_rejected_while_settling() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;

    x.handle.host().await.unwrap();
    x.handle.disconnect().await.unwrap();
    assert!(matches!(
        x.handle.join().await,
        Err(PeerConnectError::InvalidState { .. })
    ));

    wait_for(&mut x.events, |e| matches!(e, AppEvent::Ready { .. })).await;
    x.handle.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pulse_finds_late_advertiser() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;

    y.handle.join().await.unwrap();
    assert_eq!(y.radio.discover_calls(), 1);

    // X starts after Y's discovery window opened
    x.handle.host().await.unwrap();
    wait_for(&mut y.events, |e| lists_online(e, "X")).await;
    assert!(y.radio.discover_calls() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_pulse_after_leaving_discovery() {
    let medium = LoopbackMedium::new();
    let mut y = Device::start(&medium, Some("Y")).await;

    y.handle.join().await.unwrap();
    y.handle.disconnect().await.unwrap();
    wait_for(&mut y.events, |e| matches!(e, AppEvent::Ready { .. })).await;

    tokio::time::sleep(RendezvousConfig::default().pulse_interval * 4).await;
    assert_eq!(y.radio.discover_calls(), 1);
    assert!(!y.radio.is_discovering());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_keeps_session() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    connect(&mut x, &mut y).await;

    let y_endpoint = y.radio.endpoint_id().unwrap();
    x.radio.send(&y_endpoint, vec![0xFF, 0x00]).await.unwrap();
    x.handle.send_text("still here").await.unwrap();

    match wait_for(&mut y.events, |e| matches!(e, AppEvent::MessageReceived(_))).await {
        AppEvent::MessageReceived(message) => assert_eq!(message.body(), "still here"),
        _ => unreachable!(),
    }
    assert_eq!(y.radio.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_connected_session() {
    let medium = LoopbackMedium::new();
    let x = Device::start(&medium, Some("X")).await;
    assert!(matches!(
        x.handle.send_text("nobody").await,
        Err(PeerConnectError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_select_unknown_peer_keeps_discovering() {
    let medium = LoopbackMedium::new();
    let y = Device::start(&medium, Some("Y")).await;
    y.handle.join().await.unwrap();

    let result = y.handle.select_peer(EndpointId::from("E404")).await;
    assert!(matches!(
        result,
        Err(PeerConnectError::Transport(TransportError::EndpointNotFound { .. }))
    ));
    assert!(y.radio.is_discovering());
}

// ----------------------------------------------------------------------------
// Transport and radio failures
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_advertise_failure_returns_to_idle() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;

    x.radio.fail_next_advertise();
    let err = assert_err!(x.handle.host().await);
    assert!(err.is_transport());
    wait_for(&mut x.events, |e| matches!(e, AppEvent::Error { .. })).await;

    // Not auto-retried; the caller retries
    assert!(!x.radio.is_advertising());
    assert_ok!(x.handle.host().await);
    assert!(x.radio.is_advertising());
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_stays_discovering() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;

    x.handle.host().await.unwrap();
    y.handle.join().await.unwrap();
    wait_for(&mut y.events, |e| lists_online(e, "X")).await;

    y.radio.fail_next_connect();
    let x_endpoint = x.radio.endpoint_id().unwrap();
    assert!(y.handle.select_peer(x_endpoint.clone()).await.is_err());
    assert!(y.radio.is_discovering());

    y.handle.select_peer(x_endpoint).await.unwrap();
    wait_for(&mut y.events, |e| matches!(e, AppEvent::SessionStarted { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn test_radio_unavailable_is_surfaced() {
    let medium = LoopbackMedium::new();
    let radio = medium.station();
    let gate = Arc::new(SwitchableRadioGate::new(false));
    let handle = RuntimeBuilder::new(Arc::new(radio.clone()))
        .with_radio_gate(gate.clone())
        .build_and_start()
        .await
        .unwrap();

    assert!(matches!(
        handle.host().await,
        Err(PeerConnectError::RadioUnavailable { .. })
    ));
    assert!(!radio.is_advertising());

    gate.set_ready(true);
    handle.host().await.unwrap();
    assert!(radio.is_advertising());
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_startup_clears_stale_online_flags() {
    let store = Arc::new(MemoryPeerStore::with_records(vec![PeerRecord {
        endpoint_id: EndpointId::from("old"),
        name: "Ghost".to_string(),
        last_seen_at: Timestamp::new(1),
        online: true,
    }]));
    let medium = LoopbackMedium::new();
    let device = Device::start_with(&medium, Some("X"), store.clone()).await;

    let all = device.store.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all[0].online);
}

#[tokio::test(start_paused = true)]
async fn test_session_is_recorded_then_marked_offline() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    let x_endpoint = connect(&mut x, &mut y).await;

    assert!(y.store.exists(&x_endpoint).await.unwrap());
    let records = y.store.list_all().await.unwrap();
    assert_eq!(records[0].name, "X");
    assert!(records[0].online);

    y.handle.disconnect().await.unwrap();
    let records = y.store.list_all().await.unwrap();
    assert!(!records[0].online);

    // History shows X offline once the radio is idle
    let offline_view = |e: &AppEvent| {
        matches!(e, AppEvent::PeerListChanged(view) if view.online.is_empty() && !view.offline.is_empty())
    };
    match wait_for(&mut y.events, offline_view).await {
        AppEvent::PeerListChanged(view) => {
            assert!(view.online.is_empty());
            assert_eq!(view.offline.len(), 1);
            assert_eq!(view.offline[0].name, "X");
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_does_not_block_session() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, Some("X")).await;
    let mut y = Device::start(&medium, Some("Y")).await;
    y.store.set_available(false);

    connect(&mut x, &mut y).await;
    x.handle.send_text("hi").await.unwrap();
    wait_for(&mut y.events, |e| matches!(e, AppEvent::MessageReceived(_))).await;
}

#[tokio::test(start_paused = true)]
async fn test_set_name_applies_when_idle() {
    let medium = LoopbackMedium::new();
    let mut x = Device::start(&medium, None).await;

    x.handle.set_name("Ada").await.unwrap();
    match wait_for(&mut x.events, |e| matches!(e, AppEvent::Ready { .. })).await {
        AppEvent::Ready { identity } => {
            assert_eq!(identity.name(), "Ada");
            assert!(!identity.is_generated());
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_blank_name_is_rejected_as_invalid() {
    let medium = LoopbackMedium::new();
    let x = Device::start(&medium, None).await;

    let result = x.handle.set_name("   ").await;
    assert!(matches!(result, Err(PeerConnectError::InvalidName { .. })));
    assert!(x.handle.is_running());
}
