//! # fabric-rti-core
//!
//! The eventstream definition-builder engine behind the Fabric RTI tool
//! surface. A caller starts a named session, grows a typed graph of sources,
//! streams, operators, and destinations through validated append-only
//! operations, checks it with a pure validator, and finally packages it into
//! the base64 multi-part payload the item creation API expects.
//!
//! Everything here is local and synchronous: no network I/O, no persistence.
//! Session state lives in memory for the life of the process.
//!
//! ```
//! use fabric_rti_core::catalog::SampleDataKind;
//! use fabric_rti_core::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let sid = store.start("Demo", None).unwrap().session_id;
//! store.add_sample_data_source(&sid, Some("S1"), SampleDataKind::Bicycles).unwrap();
//! store.add_default_stream(&sid, "Str1", &["S1".to_string()]).unwrap();
//! assert!(store.validate(&sid).unwrap().is_valid);
//! let request = store.package(&sid).unwrap();
//! assert_eq!(request.definition.parts.len(), 2);
//! ```

pub mod catalog;
pub mod definition;
pub mod error;
pub mod packaging;
pub mod session;
pub mod validator;

pub use catalog::{COMPATIBILITY_LEVEL, catalog_snapshot};
pub use definition::{EventhouseConfig, EventstreamDefinition, IngestionMode};
pub use error::BuilderError;
pub use packaging::CreateEventstreamRequest;
pub use session::{BuilderSession, SessionStore, SessionStatus};
pub use validator::{ValidationReport, validate};
