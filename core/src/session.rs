//! Builder sessions: named, in-memory contexts each holding one in-progress
//! eventstream definition.
//!
//! The store is the only mutation path into a definition graph. Every
//! operation resolves the session, validates its inputs, applies an
//! all-or-nothing append, and returns a summary of the updated graph. State is
//! process-lifetime only; after a restart every session id is unknown.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{OperatorKind, SampleDataKind};
use crate::definition::{
    CategoryCounts, EventhouseConfig, EventstreamDefinition, NodeCategory, sequential_name,
};
use crate::error::BuilderError;
use crate::packaging::{self, CreateEventstreamRequest};
use crate::validator::{self, ValidationReport};

/// Lifecycle state of a builder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Building,
    Valid,
    Invalid,
    Created,
    Error,
}

/// One builder session. Cloned snapshots of this struct are what inspection
/// operations return; the stored copy never escapes the lock.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderSession {
    pub session_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: SessionStatus,
    pub definition: EventstreamDefinition,
}

/// Result of starting a session.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub session_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SessionStatus,
    pub next_steps: Vec<String>,
}

/// Summary returned by every graph-mutating operation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeAdded {
    pub session_id: String,
    pub node_added: String,
    pub node_type: String,
    pub category: &'static str,
    pub counts: CategoryCounts,
}

/// Validation outcome for a session, including the per-category counts the
/// original service reported alongside.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub session_id: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: CategoryCounts,
}

/// Process-wide store of builder sessions behind one coarse lock. Concurrent
/// callers against the same session serialize instead of racing; the catalog
/// they validate against is immutable and shared freely.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, BuilderSession>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BuilderSession>> {
        // A poisoned lock means a panic mid-append; the graph itself is
        // append-only so the data is still coherent.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new builder session with an empty definition graph.
    pub fn start(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<StartResponse, BuilderError> {
        if name.trim().is_empty() {
            return Err(BuilderError::validation_field(
                "'name' must not be empty",
                "name",
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = BuilderSession {
            session_id: session_id.clone(),
            name: name.to_string(),
            description: description.clone(),
            created_at: now,
            last_updated: now,
            status: SessionStatus::Building,
            definition: EventstreamDefinition::empty(),
        };
        self.lock().insert(session_id.clone(), session);

        info!(session_id = %session_id, name = %name, "started eventstream builder session");

        Ok(StartResponse {
            session_id,
            name: name.to_string(),
            description,
            status: SessionStatus::Building,
            next_steps: vec![
                "Add sources with eventstream_add_sample_data_source or eventstream_add_custom_endpoint_source".to_string(),
                "Wire them into a stream with eventstream_add_default_stream, then optionally eventstream_add_derived_stream".to_string(),
                "Add destinations with eventstream_add_eventhouse_destination or eventstream_add_custom_endpoint_destination".to_string(),
                "Check the graph with eventstream_validate_definition".to_string(),
                "Create the item with eventstream_create_from_definition".to_string(),
            ],
        })
    }

    /// Run `apply` against the named session under the lock, bumping
    /// `last_updated` only when it succeeds.
    fn with_session<T>(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut BuilderSession) -> Result<T, BuilderError>,
    ) -> Result<T, BuilderError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BuilderError::SessionNotFound(session_id.to_string()))?;
        let result = apply(session)?;
        session.last_updated = Utc::now();
        Ok(result)
    }

    fn read_session<T>(
        &self,
        session_id: &str,
        read: impl FnOnce(&BuilderSession) -> T,
    ) -> Result<T, BuilderError> {
        let sessions = self.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| BuilderError::SessionNotFound(session_id.to_string()))?;
        Ok(read(session))
    }

    /// Read-only snapshot of a session (metadata plus current graph).
    pub fn snapshot(&self, session_id: &str) -> Result<BuilderSession, BuilderError> {
        self.read_session(session_id, Clone::clone)
    }

    /// Reset the definition to empty while keeping id, name, and description.
    pub fn clear(&self, session_id: &str) -> Result<(), BuilderError> {
        self.with_session(session_id, |session| {
            session.definition = EventstreamDefinition::empty();
            session.status = SessionStatus::Building;
            info!(session_id = %session.session_id, "cleared eventstream definition");
            Ok(())
        })
    }

    /// Drop a session entirely.
    pub fn remove(&self, session_id: &str) -> Result<(), BuilderError> {
        self.lock()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| BuilderError::SessionNotFound(session_id.to_string()))
    }

    /// Evict sessions idle for longer than `max_idle`. Never called
    /// implicitly; hosts with long uptimes decide their own policy.
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_updated >= cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, "purged idle eventstream builder sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn summarize(session: &BuilderSession, category: NodeCategory, name: &str, kind: &str) -> NodeAdded {
        NodeAdded {
            session_id: session.session_id.clone(),
            node_added: name.to_string(),
            node_type: kind.to_string(),
            category: category.as_str(),
            counts: session.definition.counts(),
        }
    }

    pub fn add_sample_data_source(
        &self,
        session_id: &str,
        name: Option<&str>,
        sample_type: SampleDataKind,
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            let name = match name {
                Some(explicit) => explicit.to_string(),
                None => sequential_name(
                    &format!("{}-source", sample_type.as_str().to_lowercase()),
                    &session.definition.source_names(),
                ),
            };
            session.definition.add_sample_data_source(&name, sample_type)?;
            info!(session_id = %session.session_id, source = %name, "added sample data source");
            Ok(Self::summarize(session, NodeCategory::Source, &name, "SampleData"))
        })
    }

    pub fn add_custom_endpoint_source(
        &self,
        session_id: &str,
        name: Option<&str>,
        endpoint_url: &str,
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            let name = match name {
                Some(explicit) => explicit.to_string(),
                None => sequential_name(
                    &format!("{}-source", session.name),
                    &session.definition.source_names(),
                ),
            };
            session
                .definition
                .add_custom_endpoint_source(&name, endpoint_url)?;
            info!(session_id = %session.session_id, source = %name, "added custom endpoint source");
            Ok(Self::summarize(session, NodeCategory::Source, &name, "CustomEndpoint"))
        })
    }

    pub fn add_default_stream(
        &self,
        session_id: &str,
        name: &str,
        input_sources: &[String],
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            session.definition.add_default_stream(name, input_sources)?;
            info!(session_id = %session.session_id, stream = %name, "added default stream");
            Ok(Self::summarize(session, NodeCategory::Stream, name, "DefaultStream"))
        })
    }

    /// Add a derived stream. When `input_names` is absent or empty and the
    /// graph holds exactly one stream and no operators, the new stream is
    /// connected to that stream automatically.
    pub fn add_derived_stream(
        &self,
        session_id: &str,
        name: &str,
        input_names: Option<&[String]>,
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            let explicit = input_names.filter(|names| !names.is_empty());
            let inputs: Vec<String> = match explicit {
                Some(names) => names.to_vec(),
                None => {
                    let streams = session.definition.stream_names();
                    let operators = session.definition.operator_names();
                    if streams.len() == 1 && operators.is_empty() {
                        info!(
                            session_id = %session.session_id,
                            stream = %name,
                            upstream = %streams[0],
                            "auto-connecting derived stream to the only existing stream"
                        );
                        vec![streams[0].to_string()]
                    } else {
                        return Err(BuilderError::validation_field(
                            format!(
                                "'input_names' must be specified when multiple streams or operators exist; available streams: [{}], operators: [{}]",
                                streams.join(", "),
                                operators.join(", ")
                            ),
                            "input_names",
                        ));
                    }
                }
            };
            session.definition.add_derived_stream(name, &inputs)?;
            info!(session_id = %session.session_id, stream = %name, "added derived stream");
            Ok(Self::summarize(session, NodeCategory::Stream, name, "DerivedStream"))
        })
    }

    pub fn add_operator(
        &self,
        session_id: &str,
        name: &str,
        kind: OperatorKind,
        input_names: &[String],
        properties: Value,
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            session
                .definition
                .add_operator(name, kind, input_names, properties)?;
            info!(session_id = %session.session_id, operator = %name, kind = kind.as_str(), "added operator");
            Ok(Self::summarize(session, NodeCategory::Operator, name, kind.as_str()))
        })
    }

    pub fn add_eventhouse_destination(
        &self,
        session_id: &str,
        name: Option<&str>,
        config: EventhouseConfig,
        input_streams: &[String],
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            let name = match name {
                Some(explicit) => explicit.to_string(),
                None => format!("{}-eventhouse-destination", session.name),
            };
            session
                .definition
                .add_eventhouse_destination(&name, config, input_streams)?;
            info!(session_id = %session.session_id, destination = %name, "added Eventhouse destination");
            Ok(Self::summarize(session, NodeCategory::Destination, &name, "Eventhouse"))
        })
    }

    pub fn add_custom_endpoint_destination(
        &self,
        session_id: &str,
        name: Option<&str>,
        endpoint_url: &str,
        input_streams: &[String],
    ) -> Result<NodeAdded, BuilderError> {
        self.with_session(session_id, |session| {
            let name = match name {
                Some(explicit) => explicit.to_string(),
                None => sequential_name(
                    &format!("{}-destination", session.name),
                    &session.definition.destination_names(),
                ),
            };
            session
                .definition
                .add_custom_endpoint_destination(&name, endpoint_url, input_streams)?;
            info!(session_id = %session.session_id, destination = %name, "added custom endpoint destination");
            Ok(Self::summarize(session, NodeCategory::Destination, &name, "CustomEndpoint"))
        })
    }

    /// Validate the session's graph, recording the outcome on the session.
    /// The underlying check is pure; only the session status moves.
    pub fn validate(&self, session_id: &str) -> Result<ValidationOutcome, BuilderError> {
        self.with_session(session_id, |session| {
            let report: ValidationReport = validator::validate(&session.definition);
            session.status = if report.is_valid {
                SessionStatus::Valid
            } else {
                SessionStatus::Invalid
            };
            info!(
                session_id = %session.session_id,
                is_valid = report.is_valid,
                errors = report.errors.len(),
                "validated eventstream definition"
            );
            Ok(ValidationOutcome {
                session_id: session.session_id.clone(),
                is_valid: report.is_valid,
                errors: report.errors,
                warnings: report.warnings,
                summary: session.definition.counts(),
            })
        })
    }

    /// Package the session's graph for transmission. Re-validates first and
    /// refuses to serialize an invalid graph; no network is touched here.
    pub fn package(&self, session_id: &str) -> Result<CreateEventstreamRequest, BuilderError> {
        self.read_session(session_id, packaging::package)?
    }

    /// Record that the external create call succeeded.
    pub fn mark_created(&self, session_id: &str, item_id: Option<String>) {
        let _ = self.with_session(session_id, |session| {
            session.status = SessionStatus::Created;
            info!(
                session_id = %session.session_id,
                item_id = item_id.as_deref().unwrap_or("unknown"),
                "eventstream created from definition"
            );
            Ok(())
        });
    }

    /// Record that the external create call failed.
    pub fn mark_error(&self, session_id: &str) {
        let _ = self.with_session(session_id, |session| {
            session.status = SessionStatus::Error;
            Ok(())
        });
    }
}
