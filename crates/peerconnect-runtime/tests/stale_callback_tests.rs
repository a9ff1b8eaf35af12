//! Callbacks from a previous session generation must not touch current state

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peerconnect_core::{
    AppEvent, AppEventReceiver, ConnectionOutcome, EndpointId, EventSink, Identity,
    PeerConnectError, Transport, TransportError, TransportEvent, TransportResult,
};
use peerconnect_runtime::RuntimeBuilder;
use tokio::sync::broadcast::error::RecvError;

/// Transport that succeeds at everything and keeps every sink it was given
#[derive(Default)]
struct RecordingTransport {
    sinks: Mutex<Vec<EventSink>>,
}

impl RecordingTransport {
    fn sink(&self, index: usize) -> EventSink {
        self.sinks.lock().unwrap()[index].clone()
    }

    fn latest_sink(&self) -> EventSink {
        self.sinks.lock().unwrap().last().cloned().unwrap()
    }

    fn record(&self, sink: EventSink) {
        self.sinks.lock().unwrap().push(sink);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn advertise(
        &self,
        _identity: &Identity,
        _namespace: &str,
        sink: EventSink,
    ) -> TransportResult<()> {
        self.record(sink);
        Ok(())
    }

    async fn discover(&self, _namespace: &str, sink: EventSink) -> TransportResult<()> {
        self.record(sink);
        Ok(())
    }

    async fn request_connection(
        &self,
        _identity: &Identity,
        _endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()> {
        self.record(sink);
        Ok(())
    }

    async fn accept_connection(
        &self,
        _endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()> {
        self.record(sink);
        Ok(())
    }

    async fn send(&self, endpoint_id: &EndpointId, _payload: Vec<u8>) -> TransportResult<()> {
        Err(TransportError::EndpointNotFound {
            endpoint_id: endpoint_id.to_string(),
        })
    }

    async fn stop_advertising(&self) {}

    async fn stop_discovery(&self) {}

    async fn stop_all_endpoints(&self) {}
}

async fn wait_for<F>(events: &mut AppEventReceiver, mut predicate: F) -> AppEvent
where
    F: FnMut(&AppEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
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

fn found(id: &str, name: &str) -> TransportEvent {
    TransportEvent::Found {
        endpoint_id: EndpointId::from(id),
        name: name.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_found_is_ignored_after_reset() {
    let transport = Arc::new(RecordingTransport::default());
    let mut handle = RuntimeBuilder::new(transport.clone())
        .build_and_start()
        .await
        .unwrap();
    let mut events = handle.take_app_event_receiver().unwrap();
    wait_for(&mut events, |e| matches!(e, AppEvent::Ready { .. })).await;

    handle.join().await.unwrap();
    let old_sink = transport.sink(0);

    handle.disconnect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, AppEvent::Ready { .. })).await;
    handle.join().await.unwrap();
    let current_sink = transport.latest_sink();
    assert!(current_sink.generation() > old_sink.generation());

    // Events are handled in order, so seeing E2 means E1 was already dropped
    old_sink.emit(found("E1", "Old"));
    current_sink.emit(found("E2", "New"));

    match wait_for(&mut events, |e| {
        matches!(e, AppEvent::PeerListChanged(view) if !view.online.is_empty())
    })
    .await
    {
        AppEvent::PeerListChanged(view) => {
            assert_eq!(view.online.len(), 1);
            assert_eq!(view.online[0].display_name, "New");
        }
        _ => unreachable!(),
    }

    let result = handle.select_peer(EndpointId::from("E1")).await;
    assert!(matches!(
        result,
        Err(PeerConnectError::Transport(TransportError::EndpointNotFound { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stale_connection_result_is_ignored_after_cancel() {
    let transport = Arc::new(RecordingTransport::default());
    let mut handle = RuntimeBuilder::new(transport.clone())
        .build_and_start()
        .await
        .unwrap();
    let mut events = handle.take_app_event_receiver().unwrap();
    wait_for(&mut events, |e| matches!(e, AppEvent::Ready { .. })).await;

    handle.join().await.unwrap();
    transport.latest_sink().emit(found("E1", "Far"));
    wait_for(&mut events, |e| {
        matches!(e, AppEvent::PeerListChanged(view) if !view.online.is_empty())
    })
    .await;

    handle.select_peer(EndpointId::from("E1")).await.unwrap();
    let connect_sink = transport.latest_sink();

    // User cancels while the handshake is pending
    handle.disconnect().await.unwrap();
    connect_sink.emit(TransportEvent::Result {
        endpoint_id: EndpointId::from("E1"),
        outcome: ConnectionOutcome::Ok,
    });

    wait_for(&mut events, |e| matches!(e, AppEvent::Ready { .. })).await;
    let result = handle.send_text("anyone?").await;
    assert!(matches!(result, Err(PeerConnectError::InvalidState { .. })));

    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, AppEvent::SessionStarted { .. }));
    }
}
