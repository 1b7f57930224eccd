//! Referential and structural integrity checks over a definition graph.
//!
//! `validate` is a pure function: it never mutates the graph and calling it
//! repeatedly on an unchanged definition yields identical results. Builder
//! operations already reject forward references at append time; the validator
//! re-resolves every reference independently so a graph assembled by other
//! means gets the same scrutiny.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::catalog::StreamKind;
use crate::definition::{EventstreamDefinition, NodeCategory};

/// Outcome of a validation pass. Errors block packaging; warnings are
/// architectural guidance only.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(definition: &EventstreamDefinition) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if definition.sources.is_empty() {
        errors.push("At least one source is required".to_string());
    }

    // Upstream index: every name a node may legally reference. Destinations
    // are deliberately absent (nothing may consume a destination).
    let mut upstream: HashMap<&str, NodeCategory> = HashMap::new();
    for source in &definition.sources {
        upstream.insert(source.name.as_str(), NodeCategory::Source);
    }
    for stream in &definition.streams {
        upstream.insert(stream.name.as_str(), NodeCategory::Stream);
    }
    for operator in &definition.operators {
        upstream.insert(operator.name.as_str(), NodeCategory::Operator);
    }

    let mut referenced: HashSet<&str> = HashSet::new();

    for stream in &definition.streams {
        for input in &stream.input_nodes {
            match upstream.get(input.name.as_str()) {
                None => errors.push(format!(
                    "Stream '{}' references unknown node '{}'",
                    stream.name, input.name
                )),
                Some(NodeCategory::Source) => {
                    referenced.insert(input.name.as_str());
                }
                Some(_) if stream.kind == StreamKind::DefaultStream => errors.push(format!(
                    "Stream '{}' input '{}' must reference a source",
                    stream.name, input.name
                )),
                Some(_) => {
                    referenced.insert(input.name.as_str());
                }
            }
        }
    }

    for operator in &definition.operators {
        for input in &operator.input_nodes {
            if upstream.contains_key(input.name.as_str()) {
                referenced.insert(input.name.as_str());
            } else {
                errors.push(format!(
                    "Operator '{}' references unknown node '{}'",
                    operator.name, input.name
                ));
            }
        }
    }

    for destination in &definition.destinations {
        for input in &destination.input_nodes {
            match upstream.get(input.name.as_str()) {
                None => errors.push(format!(
                    "Destination '{}' references unknown node '{}'",
                    destination.name, input.name
                )),
                Some(NodeCategory::Stream) => {
                    referenced.insert(input.name.as_str());
                }
                Some(_) => errors.push(format!(
                    "Destination '{}' input '{}' must reference a stream",
                    destination.name, input.name
                )),
            }
        }
    }

    if !definition.destinations.is_empty() && definition.streams.is_empty() {
        errors.push("At least one stream is required when destinations are defined".to_string());
    } else if definition.streams.is_empty() {
        warnings.push("No streams defined - consider adding at least one stream".to_string());
    }

    if definition.destinations.is_empty() {
        warnings.push("No destinations defined - data will not be persisted".to_string());
    }

    for (category, name) in definition
        .sources
        .iter()
        .map(|s| ("Source", s.name.as_str()))
        .chain(
            definition
                .streams
                .iter()
                .map(|s| ("Stream", s.name.as_str())),
        )
        .chain(
            definition
                .operators
                .iter()
                .map(|o| ("Operator", o.name.as_str())),
        )
    {
        // Terminal streams are expected when no destinations exist yet;
        // everything else unreferenced is probably a wiring mistake.
        if !referenced.contains(name) && !(category == "Stream" && definition.destinations.is_empty())
        {
            warnings.push(format!(
                "Unused component: {category} '{name}' is not referenced by any downstream node"
            ));
        }
    }

    let has_derived = definition
        .streams
        .iter()
        .any(|s| s.kind == StreamKind::DerivedStream);
    if !has_derived {
        let default_names: HashSet<&str> = definition
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::DefaultStream)
            .map(|s| s.name.as_str())
            .collect();
        for destination in &definition.destinations {
            if destination
                .input_nodes
                .iter()
                .any(|input| default_names.contains(input.name.as_str()))
            {
                warnings.push(format!(
                    "Destination '{}' consumes a default stream directly; consider a derived stream for processing",
                    destination.name
                ));
            }
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
