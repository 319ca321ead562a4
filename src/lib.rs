//! healyri-dispatch - Event-triggered emergency dispatch engine
//!
//! When a new emergency request appears in the document store, the engine
//! picks the nearest available facility (and, when one is close enough, a
//! verified driver) and moves the request to `dispatched` in a single atomic
//! write together with its audit events.
//!
//! # Architecture
//!
//! - Every dispatch is one independent, stateless invocation
//! - The request update is conditioned on the request still being `created`
//! - Driver lookup failures degrade to "no driver"; they never block a dispatch
//! - Requests left in `created` are picked up again by a sweep
//!
//! # Modules
//!
//! - `core`: Dispatch logic (Selector, Audit, Dispatcher, Trigger)
//! - `domain`: Data structures (EmergencyRequest, Facility, Driver, DispatchEvent)
//! - `store`: Document store boundary (memory and file backends)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Dispatch a single request
//! healyri-dispatch dispatch <emergency-id>
//!
//! # Retry everything still waiting
//! healyri-dispatch sweep
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{DispatchOutcome, Dispatcher};
pub use domain::{Coordinates, DispatchEvent, DispatchEventType, EmergencyRequest, EmergencyStatus};
pub use store::{DocumentStore, FileStore, MemoryStore};
