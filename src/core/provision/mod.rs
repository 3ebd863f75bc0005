//! Shadow database provisioning
//!
//! - [`provisioner`] - drop-then-create of the shadow database
//! - [`events`] - after-created / after-dropped lifecycle signals

pub mod events;
pub mod provisioner;

pub use events::{DatabaseEvent, DatabaseEventKind, DatabaseEventListener, EventDispatcher};
pub use provisioner::DatabaseProvisioner;
