//! Domain layer with core entities, errors, and port definitions.

/// Connectivity state and transitions.
pub mod connectivity;
/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use connectivity::{Connectivity, ConnectivityEvent};
pub use errors::{RemoteError, StoreError};
