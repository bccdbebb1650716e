//! Entity registry
//!
//! Maps connection identifiers to their simulated cube. The registry owns
//! the entity lifecycle: a cube is created when a connection opens and
//! destroyed when it closes. Physics handles are external resources, so
//! create/destroy are explicit and never left to drop glue.

use std::collections::HashMap;

use rand::Rng;
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use uuid::Uuid;

use crate::game::constants::cube;
use crate::game::world::PhysicsWorld;

/// Identifier of one open client connection. Never reused within a process
/// lifetime.
pub type ConnectionId = Uuid;

/// A connection's simulated representative: body + collider + display color.
#[derive(Debug, Clone, Copy)]
pub struct Cube {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    /// Immutable display color, packed 0xRRGGBB. Assigned at creation.
    pub color: u32,
}

/// Registry lifecycle errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Creating an entity for an id that already has one indicates a
    /// lifecycle-tracking bug upstream.
    #[error("connection {0} already has an entity")]
    AlreadyRegistered(ConnectionId),
}

/// Connection id → cube mapping.
#[derive(Default)]
pub struct CubeRegistry {
    cubes: HashMap<ConnectionId, Cube>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a cube for a newly opened connection.
    ///
    /// Spawns a dynamic body at a randomized offset at fixed height, with a
    /// fixed-size collider and a random color. Fails if `id` is already
    /// registered; an existing entity is never overwritten.
    pub fn create(&mut self, id: ConnectionId, world: &mut PhysicsWorld) -> Result<Cube, RegistryError> {
        if self.cubes.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        let mut rng = rand::thread_rng();
        let x = rng.gen_range(-cube::SPAWN_RANGE..cube::SPAWN_RANGE);
        let z = rng.gen_range(-cube::SPAWN_RANGE..cube::SPAWN_RANGE);
        let (body, collider) = world.spawn_cube_body(x, cube::SPAWN_HEIGHT, z);
        let color = rng.gen_range(0..cube::COLOR_RANGE);

        let entry = Cube { body, collider, color };
        self.cubes.insert(id, entry);
        Ok(entry)
    }

    /// Remove `id`'s cube from the world and the registry.
    ///
    /// Returns false when `id` is absent; duplicate close notifications
    /// reach here and must not be fatal.
    pub fn destroy(&mut self, id: ConnectionId, world: &mut PhysicsWorld) -> bool {
        match self.cubes.remove(&id) {
            Some(entry) => {
                world.remove_body(entry.body);
                true
            }
            None => false,
        }
    }

    /// Look up `id`'s cube. Absence is a normal condition: a message may
    /// arrive after the connection closed.
    pub fn get(&self, id: ConnectionId) -> Option<&Cube> {
        self.cubes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &Cube)> {
        self.cubes.iter()
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spawns_at_height() {
        let mut world = PhysicsWorld::new();
        let mut registry = CubeRegistry::new();
        let id = Uuid::new_v4();

        let entry = registry.create(id, &mut world).unwrap();
        let (position, _) = world.transform(entry.body).unwrap();
        assert_eq!(position.y, cube::SPAWN_HEIGHT);
        assert!(position.x.abs() <= cube::SPAWN_RANGE);
        assert!(position.z.abs() <= cube::SPAWN_RANGE);
        assert!(entry.color < cube::COLOR_RANGE);
    }

    #[test]
    fn test_duplicate_create_is_error() {
        let mut world = PhysicsWorld::new();
        let mut registry = CubeRegistry::new();
        let id = Uuid::new_v4();

        registry.create(id, &mut world).unwrap();
        assert!(matches!(
            registry.create(id, &mut world),
            Err(RegistryError::AlreadyRegistered(other)) if other == id
        ));
        // The original entity survives untouched.
        assert_eq!(registry.len(), 1);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_destroy_releases_world_resources() {
        let mut world = PhysicsWorld::new();
        let mut registry = CubeRegistry::new();
        let id = Uuid::new_v4();

        registry.create(id, &mut world).unwrap();
        assert!(registry.destroy(id, &mut world));
        assert!(registry.get(id).is_none());
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.collider_count(), 1);

        // Duplicate close: reported via the return value, not fatal.
        assert!(!registry.destroy(id, &mut world));
    }

    #[test]
    fn test_lifecycle_sequences_keep_bijection() {
        let mut world = PhysicsWorld::new();
        let mut registry = CubeRegistry::new();
        let ids: Vec<ConnectionId> = (0..4).map(|_| Uuid::new_v4()).collect();

        for id in &ids {
            registry.create(*id, &mut world).unwrap();
        }
        assert_eq!(registry.len(), 4);
        assert_eq!(world.body_count(), 4);

        registry.destroy(ids[1], &mut world);
        registry.destroy(ids[3], &mut world);
        assert_eq!(registry.len(), 2);
        assert_eq!(world.body_count(), 2);
        assert!(registry.get(ids[0]).is_some());
        assert!(registry.get(ids[1]).is_none());
        assert!(registry.get(ids[2]).is_some());
        assert!(registry.get(ids[3]).is_none());
    }
}
