//! # StashFlow - item distribution for RPG storage networks
//!
//! The player picks a master container, binds ordered filters to destination containers and
//! lets the engine sort items between them. The same state drives a periodic sales cycle
//! that sells from a designated container and credits the gold back.
//!
//! ## Features
//!
//! - **Data-driven filters**: `[Filter:ID]` INI sections compiled into trait predicates
//! - **Deterministic pipeline**: position-ordered, claim-based routing with contention
//!   reporting for dry runs
//! - **Networks**: multiple named networks, presets, tags and container lists behind one lock
//! - **Co-save persistence**: versioned binary records with per-record skip on mismatch
//! - **Sales**: generic and per-vendor sell cycles with jittered timers
//! - **Cross-plugin API**: network list and network container queries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stashflow::app::App;
//! use stashflow::config::ini::ConfigDir;
//! use stashflow::host::{MemoryHost, WorldFixture};
//!
//! fn main() -> anyhow::Result<()> {
//!     let world = WorldFixture::load("world.toml")?;
//!     let host = Arc::new(MemoryHost::from_fixture(world));
//!     let app = App::load(&ConfigDir::new("config"), host);
//!     app.new_game();
//!     for name in app.manager.list() {
//!         let report = app.distributor().distribute(&name)?;
//!         println!("{name}: moved {}", report.moved);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`host`] - host-engine facade and the in-memory world
//! - [`config`] - INI parsing, settings and identifier pools
//! - [`filter`] - trait evaluator and filter registry
//! - [`container`] - container sources and the picker
//! - [`network`] - network manager, presets, validation, persistence
//! - [`distribute`] - pipeline, distribute, predict, whoosh
//! - [`sales`] - sell cycles and triggers
//! - [`api`] - cross-plugin messages
//! - [`app`] - the owner of all of the above

pub mod api;
pub mod app;
pub mod config;
pub mod container;
pub mod distribute;
pub mod errors;
pub mod filter;
pub mod host;
pub mod network;
pub mod sales;
