//! Core library surface for the manufacturers database.
//!
//! The store, cache, controller and session modules form the core: they know
//! nothing about terminals and can be driven from tests or other front ends.
//! Charts, reports and exports sit on top of record snapshots, and `ui` is
//! the terminal front end the binary runs.
pub mod cache;
pub mod chart;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod report;
pub mod session;
pub mod store;
pub mod tasks;
pub mod ui;

/// Typed failures reported by the core.
pub use error::{Result, StoreError};

/// The record type and its column/validation vocabulary.
pub use models::{Column, Manufacturer, ValidationError};

/// One document's data and the set of open documents.
pub use controller::{ControllerOptions, IdPolicy, ManufacturerController};
pub use session::{Document, DocumentId, DocumentManager};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
