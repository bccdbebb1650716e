//! Wire protocol
//!
//! JSON message types exchanged with clients, plus the snapshotter that
//! materializes the world into the outbound state shape. Snapshots are plain
//! value types compared by structural equality; the broadcaster relies on
//! that to suppress redundant sends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::registry::{ConnectionId, CubeRegistry};
use crate::game::world::PhysicsWorld;

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Latest control state for the sender's cube
    Move { controls: Controls },
    /// Catch-all for message types this server does not handle
    #[serde(other)]
    Unknown,
}

/// Held-key state for one connection. Latest value wins; there is no queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

/// Three-component wire vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One cube's transform and display color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeState {
    pub position: Vec3,
    /// Orientation as euler angles
    pub rotation: Vec3,
    pub color: u32,
}

/// Raw wireframe buffers from the world's debug renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugData {
    pub vertices: Vec<f32>,
    pub colors: Vec<f32>,
}

/// Immutable capture of the world: roster plus per-cube state.
///
/// `connection_ids` is the sorted set of open connections and `cubes` an
/// ordered map over the same ids, so two captures of an unchanged world are
/// structurally identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_data: Option<DebugData>,
    pub connection_ids: Vec<ConnectionId>,
    pub cubes: BTreeMap<ConnectionId, CubeState>,
}

impl WorldSnapshot {
    /// Materialize the current world into a snapshot.
    ///
    /// Reads every registered cube's transform and color. The debug payload
    /// is only rendered when `debug_enabled`; it is large and never computed
    /// otherwise. Does not mutate any component state.
    pub fn capture(world: &PhysicsWorld, registry: &CubeRegistry, debug_enabled: bool) -> Self {
        let mut connection_ids: Vec<ConnectionId> = registry.iter().map(|(id, _)| *id).collect();
        connection_ids.sort_unstable();

        let mut cubes = BTreeMap::new();
        for (id, cube) in registry.iter() {
            if let Some((position, (rx, ry, rz))) = world.transform(cube.body) {
                cubes.insert(
                    *id,
                    CubeState {
                        position: Vec3 {
                            x: position.x,
                            y: position.y,
                            z: position.z,
                        },
                        rotation: Vec3 { x: rx, y: ry, z: rz },
                        color: cube.color,
                    },
                );
            }
        }

        let debug_data = if debug_enabled {
            let buffers = world.debug_buffers();
            Some(DebugData {
                vertices: buffers.vertices,
                colors: buffers.colors,
            })
        } else {
            None
        };

        Self {
            debug_data,
            connection_ids,
            cubes,
        }
    }
}

/// Encode a message as JSON bytes
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(message).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message from JSON bytes
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
