//! Lattice Bus — in-process event bus with cross-process fan-out, a
//! lease-based service registry, and per-instance health monitoring.
//!
//! Independently started service instances coordinate through a shared
//! external pub/sub + key-value store without calling one another. The
//! store is optional and strictly best-effort: when it is absent or
//! unreachable, the bus keeps dispatching locally and the registry degrades
//! to logged no-ops.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod store;

// Re-export key types for convenient access.
pub use bus::{handler_fn, EventBus, EventHandler, Middleware};
pub use config::{BusConfig, MonitorConfig, RegistryConfig};
pub use error::BusError;
pub use monitor::{HealthMonitor, HealthProbe, MonitorState};
pub use registry::ServiceRegistry;
pub use store::{CoordinationStore, MemoryStore, StoreError, StoreHandle};
