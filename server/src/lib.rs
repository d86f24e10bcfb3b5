//! # Arena Game Server Library
//!
//! This library provides the authoritative server for the arena game. It owns
//! the canonical world, advances it on fixed ticks and keeps every connected
//! client up to date with per-client deltas.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All gameplay decisions happen here. Clients send inputs; the server moves
//! players, resolves contacts, awards coins and ends lives, and clients
//! conform to what it reports.
//!
//! ### Entity Lifecycle
//! Coins and ice spikes are kept at their configured densities. Entities move
//! through `Spawning → Active → Removed → Destroyed`; a removed entity stays
//! in the world for exactly one more sync round so clients see its final
//! state, such as who collected a coin.
//!
//! ### Delta Synchronization
//! Each client receives a full snapshot once and incremental diffs after
//! that, containing only changed declared fields, first-sight entities,
//! removals and the flags raised since its last message. Each flag reaches
//! each client exactly once.
//!
//! ## Architecture Design
//!
//! ### Single Authoritative Loop
//! One task owns the [`simulation::Simulation`]. Connection tasks forward
//! decoded packets to it over a channel, and it queues them until the next
//! tick, so the world never changes between ticks and no tick ever overlaps
//! another.
//!
//! ### Tick Phases
//! A tick applies queued inputs, updates every entity, resolves collisions in
//! insertion order, runs the lifecycle (despawns, respawns, pending spawns)
//! and finally captures one frame that every client's diff is computed from.
//!
//! ## Module Organization
//!
//! - `config`: game tuning with JSON loading and validation
//! - `entity`, `player`, `coin`, `ice_spike`, `physics`: the entity model
//! - `collision`: target-set contact detection and dispatch
//! - `lifecycle`: spawn placement, respawn and deferred spawns
//! - `game`: the world and its tick
//! - `sync`: per-client delta computation
//! - `client_manager`: the roster and input queues
//! - `stats`: the persistence sink for finished games
//! - `simulation`: the session tying all of the above together
//! - `network`: WebSocket transport and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//! use server::stats::LogStatsSink;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::default();
//!     let mut server = Server::new("127.0.0.1:8080", config, Arc::new(LogStatsSink)).await?;
//!
//!     // Accepts WebSocket clients and ticks at the configured rate until
//!     // the process is stopped.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod coin;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod game;
pub mod ice_spike;
pub mod lifecycle;
pub mod network;
pub mod physics;
pub mod player;
pub mod simulation;
pub mod stats;
pub mod sync;

pub use error::{ConfigError, ServerError};
