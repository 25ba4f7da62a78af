//! Sensor Telemetry Dashboard Session
//!
//! Thin client over an external managed backend: resolves a session
//! identity (anonymous or token-based), opens a bounded live subscription
//! over the most recent sensor readings, and maintains render-ready view
//! state from full-snapshot notifications. Durability, consistency, and
//! real-time delivery all belong to the backend; this crate only turns its
//! feed into stable UI state.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod readings;
pub mod remote;
pub mod session;
pub mod view_model;

pub use backend::{AuthBackend, DataBackend, SubscriptionHandle};
pub use config::{load_config, AuthConfig, BackendConfig, Config, QueryConfig};
pub use error::{DashboardError, Result};
pub use events::{Identity, SessionEvent};
pub use readings::{Reading, ReadingDocument, ReadingQuery, READING_LIMIT};
pub use remote::RemoteGateway;
pub use session::DashboardSession;
pub use view_model::{LiveReadingViewModel, RenderMode, ViewEvent, ViewState};
