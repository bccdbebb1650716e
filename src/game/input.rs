//! Input routing
//!
//! Translates a connection's latest control state into a force on its cube.
//! Intents are level-triggered (held keys), so the previous force is reset
//! before the new one is applied; stale forces never survive into the next
//! message.

use nalgebra::{vector, Vector3};

use crate::game::constants::cube::MOVE_FORCE;
use crate::game::registry::{ConnectionId, CubeRegistry};
use crate::game::world::PhysicsWorld;
use crate::net::protocol::Controls;

/// Map a control state onto a world-space force vector.
///
/// Opposite keys resolve with a fixed priority: right beats left, backward
/// beats forward. The vertical axis is always zero; gravity and contacts own
/// it.
pub fn force_for(controls: &Controls) -> Vector3<f32> {
    let x = if controls.right {
        1.0
    } else if controls.left {
        -1.0
    } else {
        0.0
    };
    let z = if controls.backward {
        1.0
    } else if controls.forward {
        -1.0
    } else {
        0.0
    };
    vector![x * MOVE_FORCE, 0.0, z * MOVE_FORCE]
}

/// Apply the latest control state for `id`.
///
/// An unknown id is ignored: the connection may have closed between message
/// send and processing, which is not an error.
pub fn apply_controls(
    id: ConnectionId,
    controls: &Controls,
    registry: &CubeRegistry,
    world: &mut PhysicsWorld,
) {
    let Some(cube) = registry.get(id) else {
        return;
    };
    world.set_control_force(cube.body, force_for(controls));
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn controls(forward: bool, backward: bool, left: bool, right: bool) -> Controls {
        Controls {
            forward,
            backward,
            left,
            right,
        }
    }

    #[test]
    fn test_single_axis_mapping() {
        assert_eq!(
            force_for(&controls(true, false, false, false)),
            vector![0.0, 0.0, -MOVE_FORCE]
        );
        assert_eq!(
            force_for(&controls(false, true, false, false)),
            vector![0.0, 0.0, MOVE_FORCE]
        );
        assert_eq!(
            force_for(&controls(false, false, true, false)),
            vector![-MOVE_FORCE, 0.0, 0.0]
        );
        assert_eq!(
            force_for(&controls(false, false, false, true)),
            vector![MOVE_FORCE, 0.0, 0.0]
        );
        assert_eq!(force_for(&controls(false, false, false, false)), vector![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_opposite_keys_tie_break_is_fixed() {
        // Backward wins over forward: +z every time.
        let both_z = controls(true, true, false, false);
        for _ in 0..3 {
            assert_eq!(force_for(&both_z), vector![0.0, 0.0, MOVE_FORCE]);
        }
        // Right wins over left: +x every time.
        let both_x = controls(false, false, true, true);
        for _ in 0..3 {
            assert_eq!(force_for(&both_x), vector![MOVE_FORCE, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_apply_is_idempotent_within_a_tick() {
        let mut world = PhysicsWorld::new();
        let mut registry = CubeRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(id, &mut world).unwrap();

        let forward = controls(true, false, false, false);
        apply_controls(id, &forward, &registry, &mut world);
        let once = world.user_force(entry.body).unwrap();
        apply_controls(id, &forward, &registry, &mut world);
        let twice = world.user_force(entry.body).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, vector![0.0, 0.0, -MOVE_FORCE]);
    }

    #[test]
    fn test_unknown_connection_is_ignored() {
        let mut world = PhysicsWorld::new();
        let registry = CubeRegistry::new();
        // Must not panic or create anything.
        apply_controls(Uuid::new_v4(), &controls(true, false, false, false), &registry, &mut world);
        assert_eq!(world.body_count(), 0);
    }
}
