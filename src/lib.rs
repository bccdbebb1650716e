//! Cube Arena Server Library
//!
//! An authoritative multiplayer sandbox server: each connection gets a
//! physical cube in a shared rapier3d world, advanced on a fixed timestep
//! and broadcast to every client over WebTransport whenever the world
//! actually changes.

pub mod config;
pub mod game;
pub mod net;
