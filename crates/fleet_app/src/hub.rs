//! Websocket broadcast hub.
//!
//! The hub lives on the simulation task. Connections arrive over a channel
//! from the HTTP layer and are served through bounded per-client queues, so a
//! slow browser never blocks a tick: frames are offered with `try_send` and a
//! client whose queue stays full for too long is dropped.
//!
//! Each client has its own `rendered` map from entity to the graphic revision
//! it last received in full. Entities missing from the map, or rendered at an
//! older revision, are sent in full on the next delta; the rest are sent only
//! while their body is awake.

use std::collections::HashMap;

use axum::body::Bytes;
use fleet_component::Entity;
use fleet_net::{EntityRecord, FrameEncoder, FrameKind, NetError};
use fleet_sim::World;
use fleet_sim::record::{self, Visible};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the [`Hub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each client's outgoing frame queue.
    pub client_queue: usize,
    /// A client whose queue is full for more than this many consecutive
    /// ticks is dropped.
    pub max_stalled_ticks: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue: 64,
            max_stalled_ticks: 30,
        }
    }
}

/// A freshly upgraded websocket, handed from the HTTP layer to the hub.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    frames: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Create a connection and the receiving end of its frame queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (frames, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                frames,
            },
            rx,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Full,
    Closed,
}

#[derive(Debug)]
struct Client {
    id: Uuid,
    frames: mpsc::Sender<Bytes>,
    rendered: HashMap<Entity, u32>,
    /// Dead IDs this client has drawn but not yet been told about.
    pending_dead: Vec<Entity>,
    /// Set when a delta was lost; the next delta resends everything in full.
    stale: bool,
    stalled: u32,
    closed: bool,
}

impl Client {
    fn new(connection: Connection) -> Self {
        Self {
            id: connection.id,
            frames: connection.frames,
            rendered: HashMap::new(),
            pending_dead: Vec::new(),
            stale: false,
            stalled: 0,
            closed: false,
        }
    }

    fn offer(&mut self, frame: Vec<u8>) -> Delivery {
        match self.frames.try_send(Bytes::from(frame)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => {
                self.closed = true;
                Delivery::Closed
            }
        }
    }

    fn queue_full(&self) -> bool {
        self.frames.capacity() == 0
    }
}

/// What one broadcast did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastStats {
    pub clients: usize,
    pub dead: usize,
    pub dropped: usize,
}

/// The set of connected clients and the global frame counter.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    clients: Vec<Client>,
    frame_counter: u64,
}

impl Hub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            clients: Vec::new(),
            frame_counter: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Number of connected clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Counter stamped on the next frame.
    #[must_use]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Register a client and queue a full snapshot of the world for it.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if an entity cannot be encoded.
    pub fn accept(&mut self, connection: Connection, world: &World) -> Result<(), NetError> {
        let mut encoder = FrameEncoder::new(FrameKind::Snapshot, self.frame_counter);
        let mut rendered = HashMap::new();
        for Visible {
            entity, revision, ..
        } in record::visible(world)
        {
            if let Some(full) = record::full_record(world, entity) {
                encoder.push(&full)?;
                rendered.insert(entity, revision);
            }
        }
        let entities = encoder.record_count();

        let mut client = Client::new(connection);
        match client.offer(encoder.finish()) {
            Delivery::Sent => client.rendered = rendered,
            Delivery::Full => client.stale = true,
            Delivery::Closed => {
                debug!(client = %client.id, "client left before its snapshot");
                return Ok(());
            }
        }

        let id = client.id;
        self.clients.push(client);
        info!(
            client = %id,
            entities,
            clients = self.clients.len(),
            "client connected"
        );
        Ok(())
    }

    /// Send this tick's delta and dead frames to every client.
    ///
    /// Drains the world's deleted set. Clients that went away or stayed
    /// stalled for too long are removed.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if an entity cannot be encoded. Nothing is
    /// recovered: a non-finite transform means the simulation is broken.
    pub fn tick(&mut self, world: &mut World) -> Result<BroadcastStats, NetError> {
        let frame = self.frame_counter;
        let dead = world.drain_deleted();
        let visible: Vec<Visible> = record::visible(world).collect();

        for client in &mut self.clients {
            for entity in &dead {
                if client.rendered.remove(entity).is_some() {
                    client.pending_dead.push(*entity);
                }
            }

            let mut delta = FrameEncoder::new(FrameKind::Delta, frame);
            let mut fresh = Vec::new();
            for v in &visible {
                let resend = client.stale || client.rendered.get(&v.entity) != Some(&v.revision);
                let record = if resend {
                    fresh.push((v.entity, v.revision));
                    record::full_record(world, v.entity)
                } else if v.awake {
                    record::delta_record(world, v.entity)
                } else {
                    None
                };
                if let Some(record) = record {
                    delta.push(&record)?;
                }
            }
            if !delta.is_empty() {
                match client.offer(delta.finish()) {
                    Delivery::Sent => {
                        client.rendered.extend(fresh);
                        client.stale = false;
                    }
                    Delivery::Full => client.stale = true,
                    Delivery::Closed => continue,
                }
            }

            if !client.pending_dead.is_empty() {
                let mut frame_dead = FrameEncoder::new(FrameKind::Dead, frame);
                for entity in &client.pending_dead {
                    frame_dead.push(&EntityRecord::id_only(*entity))?;
                }
                match client.offer(frame_dead.finish()) {
                    Delivery::Sent => client.pending_dead.clear(),
                    Delivery::Full => {}
                    Delivery::Closed => continue,
                }
            }

            if client.queue_full() {
                client.stalled += 1;
            } else {
                client.stalled = 0;
            }
        }

        let before = self.clients.len();
        let max_stalled = self.config.max_stalled_ticks;
        self.clients.retain(|client| {
            if client.closed {
                info!(client = %client.id, "client disconnected");
                false
            } else if client.stalled > max_stalled {
                warn!(
                    client = %client.id,
                    stalled_ticks = client.stalled,
                    "dropping slow client"
                );
                false
            } else {
                true
            }
        });

        self.frame_counter += 1;
        Ok(BroadcastStats {
            clients: self.clients.len(),
            dead: dead.len(),
            dropped: before - self.clients.len(),
        })
    }

    /// Drop every client. Their write tasks see the queue close and hang up.
    pub fn close(&mut self) {
        if !self.is_empty() {
            info!(clients = self.len(), "closing all clients");
        }
        self.clients.clear();
    }
}
