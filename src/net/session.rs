//! Game session - owns the simulation timeline and broadcasts state
//!
//! The session is the single serialization boundary of the server: world,
//! entity registry, connection roster and the retained last-broadcast
//! snapshot all live behind one `RwLock`. Connection events and the tick
//! loop each take the write lock, so no connection event can interleave
//! with a tick in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::game::clock::SimulationClock;
use crate::game::constants::net::STATS_INTERVAL_SECS;
use crate::game::input;
use crate::game::registry::{ConnectionId, CubeRegistry, RegistryError};
use crate::game::world::PhysicsWorld;
use crate::net::protocol::{encode, Controls, WorldSnapshot};

/// Shared writer half of a client's stream. `None` once the stream is gone.
pub type SharedWriter = Arc<RwLock<Option<wtransport::SendStream>>>;

/// A connected client's output channel
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub writer: SharedWriter,
}

/// Shared session state advanced by the tick loop
pub struct GameSession {
    world: PhysicsWorld,
    cubes: CubeRegistry,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    clock: SimulationClock,
    last_broadcast: Option<WorldSnapshot>,
    debug_render: bool,
}

impl GameSession {
    pub fn new(debug_render: bool) -> Self {
        Self {
            world: PhysicsWorld::new(),
            cubes: CubeRegistry::new(),
            connections: HashMap::new(),
            clock: SimulationClock::new(Instant::now()),
            last_broadcast: None,
            debug_render,
        }
    }

    /// Register a newly opened connection and create its cube.
    ///
    /// A duplicate id is a lifecycle-tracking bug: the error propagates and
    /// the existing entity is left untouched.
    pub fn add_connection(
        &mut self,
        id: ConnectionId,
        writer: SharedWriter,
    ) -> Result<(), RegistryError> {
        let cube = self.cubes.create(id, &mut self.world)?;
        self.connections.insert(id, ConnectionHandle { id, writer });
        info!("New connection: {} (color #{:06x})", id, cube.color);
        Ok(())
    }

    /// Tear down a closed connection and destroy its cube.
    ///
    /// Duplicate close notifications are benign and only logged.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        let had_connection = self.connections.remove(&id).is_some();
        let had_cube = self.cubes.destroy(id, &mut self.world);
        if had_connection || had_cube {
            info!("Connection closed: {}", id);
        } else {
            warn!("Connection closed but id not found: {}", id);
        }
    }

    /// Apply the latest control state for `id`; ignored when already closed.
    pub fn apply_intent(&mut self, id: ConnectionId, controls: &Controls) {
        input::apply_controls(id, controls, &self.cubes, &mut self.world);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn body_count(&self) -> usize {
        self.world.body_count()
    }

    /// Run one tick: advance simulated time to `now`, capture the world,
    /// and gate on change.
    ///
    /// Returns the snapshot only when it differs from the last broadcast
    /// one (the very first capture always differs from "none"). A settled
    /// world with an unchanged roster produces no output at all.
    pub fn tick(&mut self, now: Instant) -> Option<WorldSnapshot> {
        debug_assert_eq!(self.cubes.len(), self.connections.len());

        self.clock.advance(now, &mut self.world);
        let snapshot = WorldSnapshot::capture(&self.world, &self.cubes, self.debug_render);

        if self.last_broadcast.as_ref() == Some(&snapshot) {
            return None;
        }
        self.last_broadcast = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Clone the writer handles of every open connection.
    fn writers(&self) -> Vec<(ConnectionId, SharedWriter)> {
        self.connections
            .values()
            .map(|conn| (conn.id, conn.writer.clone()))
            .collect()
    }
}

/// Send an encoded snapshot to every open connection.
///
/// Each send runs in its own task: a failed or slow connection never delays
/// the others, and the tick loop never waits on completion.
fn broadcast(payload: Vec<u8>, writers: Vec<(ConnectionId, SharedWriter)>) {
    let len_bytes = (payload.len() as u32).to_le_bytes();

    for (id, writer) in writers {
        let payload = payload.clone();
        tokio::spawn(async move {
            let mut guard = writer.write().await;
            let Some(stream) = guard.as_mut() else {
                debug!("Broadcast to {}: writer already gone", id);
                return;
            };
            if let Err(e) = stream.write_all(&len_bytes).await {
                warn!("Broadcast to {}: failed to write length: {}", id, e);
                return;
            }
            if let Err(e) = stream.write_all(&payload).await {
                warn!("Broadcast to {}: failed to write payload: {}", id, e);
            }
        });
    }
}

/// Start the tick loop background task.
pub fn start_game_loop(session: Arc<RwLock<GameSession>>, tick_hz: u32) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(1000 / u64::from(tick_hz)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Simulation loop started at {} Hz", tick_hz);
        let started = Instant::now();
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            // Step, capture, compare and collect writers under one lock so a
            // connection closing concurrently cannot end up in the outgoing
            // roster with a destroyed entity.
            let outgoing = {
                let mut session_guard = session.write().await;
                session_guard.tick(Instant::now()).and_then(|snapshot| {
                    match encode(&snapshot) {
                        Ok(payload) => Some((payload, session_guard.writers())),
                        Err(e) => {
                            warn!("Failed to encode snapshot: {}", e);
                            None
                        }
                    }
                })
            };

            if let Some((payload, writers)) = outgoing {
                broadcast(payload, writers);
            }

            if tick_count % (u64::from(tick_hz) * STATS_INTERVAL_SECS) == 0 {
                let session_guard = session.read().await;
                info!(
                    "Session: {}s, tick {}, {} connections, {} bodies",
                    started.elapsed().as_secs(),
                    tick_count,
                    session_guard.connection_count(),
                    session_guard.body_count()
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_writer() -> SharedWriter {
        Arc::new(RwLock::new(None))
    }

    fn settle(session: &mut GameSession, start: Instant) -> Instant {
        // Drive ~15 s of simulated time in 100 ms slices; far beyond what a
        // falling cube needs to land and fall asleep.
        let mut now = start;
        for _ in 0..150 {
            now += Duration::from_millis(100);
            session.tick(now);
        }
        now
    }

    #[test]
    fn test_entity_connection_bijection() {
        let mut session = GameSession::new(false);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        session.add_connection(a, test_writer()).unwrap();
        session.add_connection(b, test_writer()).unwrap();
        assert_eq!(session.connection_count(), 2);
        assert_eq!(session.body_count(), 2);

        session.remove_connection(a);
        assert_eq!(session.connection_count(), 1);
        assert_eq!(session.body_count(), 1);

        // Duplicate close: benign.
        session.remove_connection(a);
        assert_eq!(session.connection_count(), 1);
        assert_eq!(session.body_count(), 1);

        // Duplicate open: loud failure, state untouched.
        assert!(session.add_connection(b, test_writer()).is_err());
        assert_eq!(session.connection_count(), 1);
        assert_eq!(session.body_count(), 1);
    }

    #[test]
    fn test_first_snapshot_is_always_sent() {
        let mut session = GameSession::new(false);
        let now = Instant::now();

        // Even an empty world broadcasts once.
        assert!(session.tick(now).is_some());
        // No elapsed time, no change: silent.
        assert!(session.tick(now).is_none());
    }

    #[test]
    fn test_settled_world_goes_silent_until_roster_changes() {
        let mut session = GameSession::new(false);
        let id = Uuid::new_v4();
        session.add_connection(id, test_writer()).unwrap();

        let now = settle(&mut session, Instant::now());

        // At rest: consecutive ticks produce nothing.
        assert!(session.tick(now + Duration::from_millis(100)).is_none());
        assert!(session.tick(now + Duration::from_millis(200)).is_none());

        // A roster change alone triggers a broadcast.
        session.remove_connection(id);
        let snapshot = session
            .tick(now + Duration::from_millis(300))
            .expect("roster change must broadcast");
        assert!(snapshot.connection_ids.is_empty());
        assert!(snapshot.cubes.is_empty());
    }

    #[test]
    fn test_move_scenario() {
        let mut session = GameSession::new(false);
        let id = Uuid::new_v4();
        session.add_connection(id, test_writer()).unwrap();

        // Freshly spawned: at spawn height in the first capture.
        let t0 = Instant::now();
        let spawn = session.tick(t0 + Duration::from_millis(1)).unwrap();
        assert!(spawn.cubes[&id].position.y > 9.0);
        assert_eq!(spawn.connection_ids, vec![id]);

        // Settles near the ground and goes quiet.
        let now = settle(&mut session, t0);
        let rest_z = session.last_broadcast.as_ref().unwrap().cubes[&id].position.z;
        assert!(session.last_broadcast.as_ref().unwrap().cubes[&id].position.y < 1.0);
        assert!(session.tick(now + Duration::from_millis(100)).is_none());

        // Forward intent pushes the cube toward -z on the next ticks.
        session.apply_intent(
            id,
            &Controls {
                forward: true,
                backward: false,
                left: false,
                right: false,
            },
        );
        let mut moved = None;
        for i in 1..=30 {
            if let Some(snapshot) = session.tick(now + Duration::from_millis(100 + i * 50)) {
                moved = Some(snapshot);
            }
        }
        let moved = moved.expect("an accelerating cube must broadcast");
        assert!(
            moved.cubes[&id].position.z < rest_z,
            "z should strictly decrease: {} vs {}",
            moved.cubes[&id].position.z,
            rest_z
        );
    }

    #[test]
    fn test_intent_for_closed_connection_is_ignored() {
        let mut session = GameSession::new(false);
        let id = Uuid::new_v4();
        session.add_connection(id, test_writer()).unwrap();
        session.remove_connection(id);

        session.apply_intent(
            id,
            &Controls {
                forward: true,
                backward: false,
                left: false,
                right: false,
            },
        );
        assert_eq!(session.body_count(), 0);
    }

    #[test]
    fn test_debug_payload_present_in_every_snapshot_when_enabled() {
        let mut session = GameSession::new(true);
        let id = Uuid::new_v4();
        session.add_connection(id, test_writer()).unwrap();

        let snapshot = session.tick(Instant::now() + Duration::from_millis(10)).unwrap();
        let data = snapshot.debug_data.expect("debug payload must be present");
        assert_eq!(data.vertices.len() / 3, data.colors.len() / 4);
    }
}
