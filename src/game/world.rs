//! Physics world wrapper
//!
//! Wraps the rapier3d boilerplate into a single struct owning the body and
//! collider sets plus the dynamics pipeline. The rest of the server treats
//! this as an opaque simulation: create/remove bodies, apply forces, step,
//! query transforms.

use rapier3d::pipeline::{DebugRenderBackend, DebugRenderObject, DebugRenderPipeline};
use rapier3d::prelude::*;

use crate::game::constants::{cube, physics};

/// Line-list buffers produced by the debug renderer.
///
/// `vertices` holds two points per line, three components each; `colors`
/// holds one 4-component color per vertex. Clients feed these straight into
/// a wireframe overlay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugRenderBuffers {
    pub vertices: Vec<f32>,
    pub colors: Vec<f32>,
}

impl DebugRenderBackend for DebugRenderBuffers {
    fn draw_line(
        &mut self,
        _object: DebugRenderObject,
        a: Point<Real>,
        b: Point<Real>,
        color: [f32; 4],
    ) {
        self.vertices
            .extend_from_slice(&[a.x, a.y, a.z, b.x, b.y, b.z]);
        self.colors.extend_from_slice(&color);
        self.colors.extend_from_slice(&color);
    }
}

/// The shared physical world: bodies, colliders, gravity, integration.
pub struct PhysicsWorld {
    gravity: Vector<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl PhysicsWorld {
    /// Create a world with downward gravity and the fixed ground slab.
    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = physics::TIME_STEP;

        let mut colliders = ColliderSet::new();
        let [gx, gy, gz] = physics::GROUND_HALF_EXTENTS;
        colliders.insert(ColliderBuilder::cuboid(gx, gy, gz).build());

        Self {
            gravity: vector![0.0, physics::GRAVITY_Y, 0.0],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// Advance the simulation by one fixed step.
    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    /// Create a dynamic cube body at the given position and return its
    /// handles.
    pub fn spawn_cube_body(&mut self, x: f32, y: f32, z: f32) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y, z])
            .build();
        let body_handle = self.bodies.insert(body);

        let collider =
            ColliderBuilder::cuboid(cube::HALF_EXTENT, cube::HALF_EXTENT, cube::HALF_EXTENT)
                .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);

        (body_handle, collider_handle)
    }

    /// Remove a body and its attached collider from the simulation.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Replace any previously applied force on `handle` with `force`.
    ///
    /// Reset-then-add, so the force reflects only the latest control state.
    /// No-op when the body no longer exists.
    pub fn set_control_force(&mut self, handle: RigidBodyHandle, force: Vector<f32>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.reset_forces(true);
            body.add_force(force, true);
        }
    }

    /// Current translation and euler-angle orientation of a body.
    pub fn transform(&self, handle: RigidBodyHandle) -> Option<(Vector<f32>, (f32, f32, f32))> {
        let body = self.bodies.get(handle)?;
        Some((*body.translation(), body.rotation().euler_angles()))
    }

    /// Accumulated user force on a body (for inspection).
    pub fn user_force(&self, handle: RigidBodyHandle) -> Option<Vector<f32>> {
        self.bodies.get(handle).map(|body| body.user_force())
    }

    /// Render the whole scene as wireframe line buffers.
    ///
    /// Only called when the debug payload is enabled; the pipeline is built
    /// per call so the cost is zero otherwise.
    pub fn debug_buffers(&self) -> DebugRenderBuffers {
        let mut buffers = DebugRenderBuffers::default();
        let mut pipeline = DebugRenderPipeline::default();
        pipeline.render(
            &mut buffers,
            &self.bodies,
            &self.colliders,
            &self.impulse_joints,
            &self.multibody_joints,
            &self.narrow_phase,
        );
        buffers
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
