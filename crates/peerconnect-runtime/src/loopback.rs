//! In-process loopback radio
//!
//! A [`LoopbackMedium`] is a shared piece of "air"; every
//! [`LoopbackTransport`] attached to it is one device's radio. It behaves
//! like a nearby-connections stack closely enough to exercise the state
//! machine end to end:
//!
//! - discovery windows are one-shot: only advertisers present when
//!   `discover` is called are reported
//! - a radio gets a fresh endpoint id for every radio session, dropped when
//!   all endpoints are stopped while idle
//! - a handshake raises `Initiated` on both sides and completes only after
//!   both accepted
//!
//! Each radio also carries one-shot failure injection for tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use peerconnect_core::{
    ConnectionOutcome, EndpointId, EventSink, Identity, Transport, TransportError, TransportEvent,
    TransportResult,
};
use tracing::{debug, trace};

/// Failure code reported for a refused or abandoned handshake
pub const STATUS_CONNECTION_REJECTED: i32 = 8004;

type StationId = u64;

// ----------------------------------------------------------------------------
// Medium
// ----------------------------------------------------------------------------

/// Shared radio space connecting every attached [`LoopbackTransport`]
#[derive(Debug, Clone, Default)]
pub struct LoopbackMedium {
    inner: Arc<Mutex<MediumState>>,
}

impl LoopbackMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new radio to the medium
    pub fn station(&self) -> LoopbackTransport {
        let id = {
            let mut state = lock(&self.inner);
            state.next_station += 1;
            let id = state.next_station;
            state.stations.insert(id, Station::default());
            id
        };
        LoopbackTransport {
            station: id,
            medium: self.inner.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MediumState {
    next_station: StationId,
    next_endpoint: u64,
    stations: HashMap<StationId, Station>,
    connections: Vec<Connection>,
}

#[derive(Debug, Default)]
struct Station {
    endpoint_id: Option<EndpointId>,
    advertisement: Option<Advertisement>,
    discovery: Option<Discovery>,
    faults: Faults,
    discover_calls: usize,
}

#[derive(Debug)]
struct Advertisement {
    namespace: String,
    name: String,
    sink: EventSink,
}

#[derive(Debug)]
struct Discovery {
    namespace: String,
    sink: EventSink,
    reported: HashSet<StationId>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_advertise: bool,
    fail_discover: bool,
    fail_connect: bool,
    reject_handshake: Option<i32>,
}

/// One end of a pending or established connection
#[derive(Debug)]
struct Side {
    station: StationId,
    endpoint_id: EndpointId,
    lifecycle: EventSink,
    payload: Option<EventSink>,
}

#[derive(Debug)]
struct Connection {
    sides: [Side; 2],
    established: bool,
}

impl Connection {
    /// Index of `station`'s side when its peer is `peer`
    fn side_of(&self, station: StationId, peer: &EndpointId) -> Option<usize> {
        (0..2).find(|&i| self.sides[i].station == station && &self.sides[1 - i].endpoint_id == peer)
    }

    fn involves(&self, station: StationId) -> bool {
        self.sides.iter().any(|side| side.station == station)
    }

    fn both_accepted(&self) -> bool {
        self.sides.iter().all(|side| side.payload.is_some())
    }
}

/// Callbacks collected under the lock and raised after it is released
type Deliveries = Vec<(EventSink, TransportEvent)>;

fn deliver(deliveries: Deliveries) {
    for (sink, event) in deliveries {
        trace!("Loopback delivering {} from {}", event.kind(), event.endpoint_id());
        sink.emit(event);
    }
}

fn lock(inner: &Mutex<MediumState>) -> MutexGuard<'_, MediumState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MediumState {
    fn station_mut(&mut self, id: StationId) -> TransportResult<&mut Station> {
        self.stations.get_mut(&id).ok_or(TransportError::Shutdown)
    }

    /// Endpoint id of `id`, minting one if the radio session is new
    fn ensure_endpoint(&mut self, id: StationId) -> TransportResult<EndpointId> {
        if let Some(existing) = self.station_mut(id)?.endpoint_id.clone() {
            return Ok(existing);
        }
        self.next_endpoint += 1;
        let endpoint_id = EndpointId::new(format!("E{}", self.next_endpoint));
        self.station_mut(id)?.endpoint_id = Some(endpoint_id.clone());
        Ok(endpoint_id)
    }

    fn advertiser(&self, endpoint_id: &EndpointId) -> Option<(StationId, &Advertisement)> {
        self.stations.iter().find_map(|(id, station)| {
            match (&station.endpoint_id, &station.advertisement) {
                (Some(eid), Some(ad)) if eid == endpoint_id => Some((*id, ad)),
                _ => None,
            }
        })
    }
}

// ----------------------------------------------------------------------------
// Loopback Transport
// ----------------------------------------------------------------------------

/// One device's radio on a [`LoopbackMedium`]
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    station: StationId,
    medium: Arc<Mutex<MediumState>>,
}

impl LoopbackTransport {
    fn with_station<R>(&self, f: impl FnOnce(&mut Station) -> R) -> Option<R> {
        lock(&self.medium).stations.get_mut(&self.station).map(f)
    }

    /// Current endpoint id, if a radio session is open
    pub fn endpoint_id(&self) -> Option<EndpointId> {
        self.with_station(|s| s.endpoint_id.clone()).flatten()
    }

    pub fn is_advertising(&self) -> bool {
        self.with_station(|s| s.advertisement.is_some()).unwrap_or(false)
    }

    pub fn is_discovering(&self) -> bool {
        self.with_station(|s| s.discovery.is_some()).unwrap_or(false)
    }

    /// Total `discover` calls accepted so far
    pub fn discover_calls(&self) -> usize {
        self.with_station(|s| s.discover_calls).unwrap_or(0)
    }

    /// Established connections this radio takes part in
    pub fn connection_count(&self) -> usize {
        lock(&self.medium)
            .connections
            .iter()
            .filter(|c| c.established && c.involves(self.station))
            .count()
    }

    pub fn fail_next_advertise(&self) {
        self.with_station(|s| s.faults.fail_advertise = true);
    }

    pub fn fail_next_discover(&self) {
        self.with_station(|s| s.faults.fail_discover = true);
    }

    pub fn fail_next_connect(&self) {
        self.with_station(|s| s.faults.fail_connect = true);
    }

    /// Make the next handshake involving this radio fail with `code`
    pub fn reject_next_handshake(&self, code: i32) {
        self.with_station(|s| s.faults.reject_handshake = Some(code));
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn advertise(
        &self,
        identity: &Identity,
        namespace: &str,
        sink: EventSink,
    ) -> TransportResult<()> {
        let mut state = lock(&self.medium);
        let station = state.station_mut(self.station)?;
        if std::mem::take(&mut station.faults.fail_advertise) {
            return Err(TransportError::AdvertiseFailed {
                reason: "injected failure".to_string(),
            });
        }
        let endpoint_id = state.ensure_endpoint(self.station)?;
        state.station_mut(self.station)?.advertisement = Some(Advertisement {
            namespace: namespace.to_string(),
            name: identity.name().to_string(),
            sink,
        });
        debug!("Loopback {} advertising as {}", endpoint_id, identity);
        Ok(())
    }

    async fn discover(&self, namespace: &str, sink: EventSink) -> TransportResult<()> {
        let deliveries = {
            let mut state = lock(&self.medium);
            let station = state.station_mut(self.station)?;
            if std::mem::take(&mut station.faults.fail_discover) {
                return Err(TransportError::DiscoveryFailed {
                    reason: "injected failure".to_string(),
                });
            }
            station.discover_calls += 1;
            state.ensure_endpoint(self.station)?;

            let visible: Vec<(StationId, EndpointId, String)> = state
                .stations
                .iter()
                .filter(|(id, _)| **id != self.station)
                .filter_map(|(id, other)| match (&other.endpoint_id, &other.advertisement) {
                    (Some(eid), Some(ad)) if ad.namespace == namespace => {
                        Some((*id, eid.clone(), ad.name.clone()))
                    }
                    _ => None,
                })
                .collect();

            let deliveries: Deliveries = visible
                .iter()
                .map(|(_, endpoint_id, name)| {
                    (
                        sink.clone(),
                        TransportEvent::Found {
                            endpoint_id: endpoint_id.clone(),
                            name: name.clone(),
                        },
                    )
                })
                .collect();

            state.station_mut(self.station)?.discovery = Some(Discovery {
                namespace: namespace.to_string(),
                sink,
                reported: visible.into_iter().map(|(id, _, _)| id).collect(),
            });
            deliveries
        };
        deliver(deliveries);
        Ok(())
    }

    async fn request_connection(
        &self,
        identity: &Identity,
        endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()> {
        let deliveries = {
            let mut state = lock(&self.medium);
            let station = state.station_mut(self.station)?;
            if std::mem::take(&mut station.faults.fail_connect) {
                return Err(TransportError::ConnectionFailed {
                    endpoint_id: endpoint_id.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            let own_endpoint = state.ensure_endpoint(self.station)?;

            let (target, target_name, target_sink) = state
                .advertiser(endpoint_id)
                .filter(|(id, _)| *id != self.station)
                .map(|(id, ad)| (id, ad.name.clone(), ad.sink.clone()))
                .ok_or_else(|| TransportError::EndpointNotFound {
                    endpoint_id: endpoint_id.to_string(),
                })?;

            state.connections.push(Connection {
                sides: [
                    Side {
                        station: self.station,
                        endpoint_id: own_endpoint.clone(),
                        lifecycle: sink.clone(),
                        payload: None,
                    },
                    Side {
                        station: target,
                        endpoint_id: endpoint_id.clone(),
                        lifecycle: target_sink.clone(),
                        payload: None,
                    },
                ],
                established: false,
            });

            vec![
                (
                    target_sink,
                    TransportEvent::Initiated {
                        endpoint_id: own_endpoint,
                        peer_name: identity.name().to_string(),
                    },
                ),
                (
                    sink,
                    TransportEvent::Initiated {
                        endpoint_id: endpoint_id.clone(),
                        peer_name: target_name,
                    },
                ),
            ]
        };
        deliver(deliveries);
        Ok(())
    }

    async fn accept_connection(
        &self,
        endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()> {
        let deliveries = {
            let mut state = lock(&self.medium);
            let station = self.station;
            let (index, side) = state
                .connections
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.established)
                .find_map(|(i, c)| c.side_of(station, endpoint_id).map(|side| (i, side)))
                .ok_or_else(|| TransportError::EndpointNotFound {
                    endpoint_id: endpoint_id.to_string(),
                })?;

            state.connections[index].sides[side].payload = Some(sink);
            if !state.connections[index].both_accepted() {
                return Ok(());
            }

            let stations = [
                state.connections[index].sides[0].station,
                state.connections[index].sides[1].station,
            ];
            let rejection = stations.iter().find_map(|id| {
                state
                    .stations
                    .get_mut(id)
                    .and_then(|s| s.faults.reject_handshake.take())
            });

            let outcome = match rejection {
                Some(code) => ConnectionOutcome::Failed(code),
                None => ConnectionOutcome::Ok,
            };
            let deliveries: Deliveries = {
                let sides = &state.connections[index].sides;
                (0..2)
                    .map(|i| {
                        (
                            sides[i].lifecycle.clone(),
                            TransportEvent::Result {
                                endpoint_id: sides[1 - i].endpoint_id.clone(),
                                outcome,
                            },
                        )
                    })
                    .collect()
            };

            if rejection.is_some() {
                state.connections.remove(index);
            } else {
                state.connections[index].established = true;
            }
            deliveries
        };
        deliver(deliveries);
        Ok(())
    }

    async fn send(&self, endpoint_id: &EndpointId, bytes: Vec<u8>) -> TransportResult<()> {
        let (sink, own_endpoint) = {
            let state = lock(&self.medium);
            state
                .connections
                .iter()
                .filter(|c| c.established)
                .find_map(|c| {
                    c.side_of(self.station, endpoint_id).and_then(|side| {
                        c.sides[1 - side]
                            .payload
                            .clone()
                            .map(|sink| (sink, c.sides[side].endpoint_id.clone()))
                    })
                })
                .ok_or_else(|| TransportError::EndpointNotFound {
                    endpoint_id: endpoint_id.to_string(),
                })?
        };
        sink.emit(TransportEvent::Payload {
            endpoint_id: own_endpoint,
            bytes,
        });
        Ok(())
    }

    async fn stop_advertising(&self) {
        let deliveries = {
            let mut state = lock(&self.medium);
            let own_endpoint = state.stations.get_mut(&self.station).and_then(|station| {
                station
                    .advertisement
                    .take()
                    .and_then(|_| station.endpoint_id.clone())
            });
            let Some(own_endpoint) = own_endpoint else {
                return;
            };

            let mut deliveries = Deliveries::new();
            for other in state.stations.values_mut() {
                if let Some(discovery) = other.discovery.as_mut() {
                    if discovery.reported.remove(&self.station) {
                        deliveries.push((
                            discovery.sink.clone(),
                            TransportEvent::Lost {
                                endpoint_id: own_endpoint.clone(),
                            },
                        ));
                    }
                }
            }
            deliveries
        };
        deliver(deliveries);
    }

    async fn stop_discovery(&self) {
        self.with_station(|s| s.discovery = None);
    }

    async fn stop_all_endpoints(&self) {
        let deliveries = {
            let mut state = lock(&self.medium);
            let station = self.station;
            let (dropped, kept): (Vec<Connection>, Vec<Connection>) =
                std::mem::take(&mut state.connections)
                    .into_iter()
                    .partition(|c| c.involves(station));
            state.connections = kept;

            if let Some(own) = state.stations.get_mut(&station) {
                if own.advertisement.is_none() && own.discovery.is_none() {
                    own.endpoint_id = None;
                }
            }

            dropped
                .into_iter()
                .filter_map(|c| {
                    let index = c.sides.iter().position(|side| side.station != station)?;
                    let [first, second] = c.sides;
                    let (other, own) = if index == 0 { (first, second) } else { (second, first) };
                    let event = if c.established {
                        TransportEvent::Disconnected {
                            endpoint_id: own.endpoint_id,
                        }
                    } else {
                        TransportEvent::Result {
                            endpoint_id: own.endpoint_id,
                            outcome: ConnectionOutcome::Failed(STATUS_CONNECTION_REJECTED),
                        }
                    };
                    Some((other.lifecycle, event))
                })
                .collect::<Deliveries>()
        };
        deliver(deliveries);
    }
}
