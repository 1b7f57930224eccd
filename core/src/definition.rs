//! The in-progress eventstream definition graph.
//!
//! A definition accumulates typed nodes in four categories. Nodes are appended
//! in call order and may only reference nodes declared before them, which makes
//! the graph a forward-only DAG by construction. Serialization produces exactly
//! the five-key inner document the service expects; the eventstream's name and
//! description never appear here (they belong to the outer transport payload).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{
    COMPATIBILITY_LEVEL, DestinationKind, OperatorKind, SampleDataKind, SourceKind, StreamKind,
};
use crate::error::BuilderError;

/// A by-name reference to an upstream node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputNode {
    pub name: String,
}

impl InputNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Serialization metadata carried by derived streams and Eventhouse
/// destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSerialization {
    #[serde(rename = "type")]
    pub format: String,
    pub properties: SerializationProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationProperties {
    pub encoding: String,
}

impl InputSerialization {
    /// JSON with the given text encoding, the only format the builder emits.
    pub fn json(encoding: impl Into<String>) -> Self {
        Self {
            format: "Json".to_string(),
            properties: SerializationProperties {
                encoding: encoding.into(),
            },
        }
    }
}

impl Default for InputSerialization {
    fn default() -> Self {
        Self::json("UTF8")
    }
}

/// How an Eventhouse destination ingests events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionMode {
    ProcessedIngestion,
    DirectIngestion,
}

impl IngestionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestionMode::ProcessedIngestion => "ProcessedIngestion",
            IngestionMode::DirectIngestion => "DirectIngestion",
        }
    }

    pub fn parse(value: &str) -> Result<Self, BuilderError> {
        match value {
            v if v.eq_ignore_ascii_case("ProcessedIngestion") => Ok(Self::ProcessedIngestion),
            v if v.eq_ignore_ascii_case("DirectIngestion") => Ok(Self::DirectIngestion),
            _ => Err(BuilderError::validation_field(
                format!(
                    "Unknown ingestion mode '{value}'; expected ProcessedIngestion or DirectIngestion"
                ),
                "data_ingestion_mode",
            )),
        }
    }
}

/// A source node. Sources have no inputs, so no `inputNodes` key on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub properties: SourceProperties,
}

/// Per-kind source configuration. Variant order matters: untagged matching
/// tries top to bottom and the keys are disjoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceProperties {
    SampleData {
        #[serde(rename = "type")]
        sample_type: SampleDataKind,
    },
    CustomEndpoint {
        #[serde(rename = "endpointUrl")]
        endpoint_url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub properties: StreamProperties,
    #[serde(rename = "inputNodes")]
    pub input_nodes: Vec<InputNode>,
}

/// Stream configuration. `Derived` must stay first: the untagged deserializer
/// tries variants in order and `Default` accepts any map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamProperties {
    Derived {
        #[serde(rename = "inputSerialization")]
        input_serialization: InputSerialization,
    },
    Default {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OperatorKind,
    /// Operator-specific configuration, passed through as provided.
    pub properties: Value,
    #[serde(rename = "inputNodes")]
    pub input_nodes: Vec<InputNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DestinationKind,
    pub properties: DestinationProperties,
    #[serde(rename = "inputNodes")]
    pub input_nodes: Vec<InputNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationProperties {
    #[serde(rename_all = "camelCase")]
    Eventhouse {
        data_ingestion_mode: IngestionMode,
        workspace_id: String,
        item_id: String,
        database_name: String,
        table_name: String,
        input_serialization: InputSerialization,
    },
    CustomEndpoint {
        #[serde(rename = "endpointUrl")]
        endpoint_url: String,
    },
}

/// Configuration for an Eventhouse destination, gathered before the node is
/// built so the reference checks can run first.
#[derive(Debug, Clone)]
pub struct EventhouseConfig {
    pub workspace_id: String,
    pub item_id: String,
    pub database_name: String,
    pub table_name: String,
    pub data_ingestion_mode: IngestionMode,
    pub encoding: String,
}

/// Node categories, used for conflict reporting and name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Source,
    Stream,
    Destination,
    Operator,
}

impl NodeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeCategory::Source => "source",
            NodeCategory::Stream => "stream",
            NodeCategory::Destination => "destination",
            NodeCategory::Operator => "operator",
        }
    }
}

/// Node counts per category, returned in operation summaries and validation
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub sources: usize,
    pub streams: usize,
    pub destinations: usize,
    pub operators: usize,
}

/// The accumulated definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventstreamDefinition {
    pub sources: Vec<Source>,
    pub streams: Vec<Stream>,
    pub destinations: Vec<Destination>,
    pub operators: Vec<Operator>,
    #[serde(rename = "compatibilityLevel")]
    pub compatibility_level: String,
}

impl EventstreamDefinition {
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            streams: Vec::new(),
            destinations: Vec::new(),
            operators: Vec::new(),
            compatibility_level: COMPATIBILITY_LEVEL.to_string(),
        }
    }

    /// The quick-start skeleton: one unconnected default stream named
    /// `{name}-stream`, to be wired up later in the service UI. This is the
    /// only place a stream exists without inputs.
    pub fn with_default_stream(name: &str) -> Self {
        let mut definition = Self::empty();
        definition.streams.push(Stream {
            name: format!("{name}-stream"),
            kind: StreamKind::DefaultStream,
            properties: StreamProperties::Default {},
            input_nodes: Vec::new(),
        });
        definition
    }

    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            sources: self.sources.len(),
            streams: self.streams.len(),
            destinations: self.destinations.len(),
            operators: self.operators.len(),
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn operator_names(&self) -> Vec<&str> {
        self.operators.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn destination_names(&self) -> Vec<&str> {
        self.destinations.iter().map(|d| d.name.as_str()).collect()
    }

    fn names_in(&self, category: NodeCategory) -> Vec<&str> {
        match category {
            NodeCategory::Source => self.source_names(),
            NodeCategory::Stream => self.stream_names(),
            NodeCategory::Destination => self.destination_names(),
            NodeCategory::Operator => self.operator_names(),
        }
    }

    fn ensure_named(name: &str) -> Result<(), BuilderError> {
        if name.trim().is_empty() {
            return Err(BuilderError::validation_field(
                "'name' must not be empty",
                "name",
            ));
        }
        Ok(())
    }

    fn ensure_unique(&self, category: NodeCategory, name: &str) -> Result<(), BuilderError> {
        if self.names_in(category).contains(&name) {
            return Err(BuilderError::Conflict {
                category: category.as_str(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_streams_exist(&self, context: &str, names: &[String]) -> Result<(), BuilderError> {
        let streams = self.stream_names();
        for name in names {
            if !streams.contains(&name.as_str()) {
                return Err(BuilderError::UnknownNode {
                    context: context.to_string(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn ensure_upstream_exists(&self, context: &str, names: &[String]) -> Result<(), BuilderError> {
        let sources = self.source_names();
        let streams = self.stream_names();
        let operators = self.operator_names();
        for name in names {
            let name = name.as_str();
            if !sources.contains(&name) && !streams.contains(&name) && !operators.contains(&name) {
                return Err(BuilderError::UnknownNode {
                    context: context.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn ensure_non_empty_inputs(names: &[String], field: &str) -> Result<(), BuilderError> {
        if names.is_empty() {
            return Err(BuilderError::validation_field(
                format!("'{field}' must name at least one upstream node"),
                field,
            ));
        }
        Ok(())
    }

    pub fn add_sample_data_source(
        &mut self,
        name: &str,
        sample_type: SampleDataKind,
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        self.ensure_unique(NodeCategory::Source, name)?;
        self.sources.push(Source {
            name: name.to_string(),
            kind: SourceKind::SampleData,
            properties: SourceProperties::SampleData { sample_type },
        });
        Ok(())
    }

    pub fn add_custom_endpoint_source(
        &mut self,
        name: &str,
        endpoint_url: &str,
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        if endpoint_url.trim().is_empty() {
            return Err(BuilderError::validation_field(
                "'url' must not be empty",
                "url",
            ));
        }
        self.ensure_unique(NodeCategory::Source, name)?;
        self.sources.push(Source {
            name: name.to_string(),
            kind: SourceKind::CustomEndpoint,
            properties: SourceProperties::CustomEndpoint {
                endpoint_url: endpoint_url.to_string(),
            },
        });
        Ok(())
    }

    /// A default stream is a direct passthrough fed by one or more sources.
    /// Source references are not resolved here: passthrough wiring is the
    /// validator's job, so a stream declared ahead of its sources still lands
    /// in the graph and gets flagged on validation.
    pub fn add_default_stream(
        &mut self,
        name: &str,
        input_sources: &[String],
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        Self::ensure_non_empty_inputs(input_sources, "input_source_names")?;
        self.ensure_unique(NodeCategory::Stream, name)?;
        self.streams.push(Stream {
            name: name.to_string(),
            kind: StreamKind::DefaultStream,
            properties: StreamProperties::Default {},
            input_nodes: input_sources.iter().map(InputNode::new).collect(),
        });
        Ok(())
    }

    /// A derived stream consumes upstream streams, sources, or operators and
    /// carries serialization metadata.
    pub fn add_derived_stream(
        &mut self,
        name: &str,
        input_names: &[String],
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        Self::ensure_non_empty_inputs(input_names, "input_names")?;
        self.ensure_upstream_exists(&format!("Stream '{name}'"), input_names)?;
        self.ensure_unique(NodeCategory::Stream, name)?;
        self.streams.push(Stream {
            name: name.to_string(),
            kind: StreamKind::DerivedStream,
            properties: StreamProperties::Derived {
                input_serialization: InputSerialization::default(),
            },
            input_nodes: input_names.iter().map(InputNode::new).collect(),
        });
        Ok(())
    }

    pub fn add_operator(
        &mut self,
        name: &str,
        kind: OperatorKind,
        input_names: &[String],
        properties: Value,
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        if !properties.is_object() {
            return Err(BuilderError::validation_field(
                "'properties' must be a JSON object",
                "properties",
            ));
        }
        Self::ensure_non_empty_inputs(input_names, "input_names")?;
        self.ensure_upstream_exists(&format!("Operator '{name}'"), input_names)?;
        self.ensure_unique(NodeCategory::Operator, name)?;
        self.operators.push(Operator {
            name: name.to_string(),
            kind,
            properties,
            input_nodes: input_names.iter().map(InputNode::new).collect(),
        });
        Ok(())
    }

    pub fn add_eventhouse_destination(
        &mut self,
        name: &str,
        config: EventhouseConfig,
        input_streams: &[String],
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        for (value, field) in [
            (&config.workspace_id, "workspace_id"),
            (&config.item_id, "item_id"),
            (&config.database_name, "database_name"),
            (&config.table_name, "table_name"),
        ] {
            if value.trim().is_empty() {
                return Err(BuilderError::validation_field(
                    format!("'{field}' must not be empty"),
                    field,
                ));
            }
        }
        Self::ensure_non_empty_inputs(input_streams, "input_names")?;
        self.ensure_streams_exist(&format!("Destination '{name}'"), input_streams)?;
        self.ensure_unique(NodeCategory::Destination, name)?;
        self.destinations.push(Destination {
            name: name.to_string(),
            kind: DestinationKind::Eventhouse,
            properties: DestinationProperties::Eventhouse {
                data_ingestion_mode: config.data_ingestion_mode,
                workspace_id: config.workspace_id,
                item_id: config.item_id,
                database_name: config.database_name,
                table_name: config.table_name,
                input_serialization: InputSerialization::json(config.encoding),
            },
            input_nodes: input_streams.iter().map(InputNode::new).collect(),
        });
        Ok(())
    }

    pub fn add_custom_endpoint_destination(
        &mut self,
        name: &str,
        endpoint_url: &str,
        input_streams: &[String],
    ) -> Result<(), BuilderError> {
        Self::ensure_named(name)?;
        if endpoint_url.trim().is_empty() {
            return Err(BuilderError::validation_field(
                "'url' must not be empty",
                "url",
            ));
        }
        Self::ensure_non_empty_inputs(input_streams, "input_names")?;
        self.ensure_streams_exist(&format!("Destination '{name}'"), input_streams)?;
        self.ensure_unique(NodeCategory::Destination, name)?;
        self.destinations.push(Destination {
            name: name.to_string(),
            kind: DestinationKind::CustomEndpoint,
            properties: DestinationProperties::CustomEndpoint {
                endpoint_url: endpoint_url.to_string(),
            },
            input_nodes: input_streams.iter().map(InputNode::new).collect(),
        });
        Ok(())
    }
}

/// Pick a name that does not collide with `existing`: `base`, then `base-2`,
/// `base-3`, and so on.
pub fn sequential_name(base: &str, existing: &[&str]) -> String {
    if !existing.contains(&base) {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}-{counter}");
        if !existing.contains(&candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with_source() -> EventstreamDefinition {
        let mut def = EventstreamDefinition::empty();
        def.add_sample_data_source("S1", SampleDataKind::Bicycles)
            .unwrap();
        def
    }

    #[test]
    fn empty_definition_serializes_to_five_keys() {
        let value = serde_json::to_value(EventstreamDefinition::empty()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for key in [
            "sources",
            "streams",
            "destinations",
            "operators",
            "compatibilityLevel",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(value["compatibilityLevel"], "1.0");
    }

    #[test]
    fn sample_source_serializes_without_input_nodes() {
        let def = graph_with_source();
        let value = serde_json::to_value(&def.sources[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "S1",
                "type": "SampleData",
                "properties": { "type": "Bicycles" }
            })
        );
    }

    #[test]
    fn default_stream_defers_source_resolution_to_the_validator() {
        let mut def = graph_with_source();
        def.add_default_stream("Str1", &["Unknown".to_string()])
            .unwrap();
        assert_eq!(def.streams.len(), 1);
        let report = crate::validator::validate(&def);
        assert!(!report.is_valid);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("references unknown node 'Unknown'"))
        );
    }

    #[test]
    fn default_stream_serializes_with_empty_properties() {
        let mut def = graph_with_source();
        def.add_default_stream("Str1", &["S1".to_string()]).unwrap();
        let value = serde_json::to_value(&def.streams[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Str1",
                "type": "DefaultStream",
                "properties": {},
                "inputNodes": [{ "name": "S1" }]
            })
        );
    }

    #[test]
    fn derived_stream_carries_json_serialization() {
        let mut def = graph_with_source();
        def.add_default_stream("Str1", &["S1".to_string()]).unwrap();
        def.add_derived_stream("Derived1", &["Str1".to_string()])
            .unwrap();
        let value = serde_json::to_value(&def.streams[1]).unwrap();
        assert_eq!(
            value["properties"]["inputSerialization"],
            json!({ "type": "Json", "properties": { "encoding": "UTF8" } })
        );
    }

    #[test]
    fn duplicate_source_name_is_a_conflict_and_graph_is_untouched() {
        let mut def = graph_with_source();
        let err = def
            .add_sample_data_source("S1", SampleDataKind::Buses)
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(def.sources.len(), 1);
        // the surviving node is the first one
        assert!(matches!(
            def.sources[0].properties,
            SourceProperties::SampleData {
                sample_type: SampleDataKind::Bicycles
            }
        ));
    }

    #[test]
    fn stream_and_destination_may_share_a_name() {
        let mut def = graph_with_source();
        def.add_default_stream("shared", &["S1".to_string()])
            .unwrap();
        def.add_custom_endpoint_destination(
            "shared",
            "https://example.com/sink",
            &["shared".to_string()],
        )
        .unwrap();
        assert_eq!(def.streams.len(), 1);
        assert_eq!(def.destinations.len(), 1);
    }

    #[test]
    fn destination_before_stream_fails_and_leaves_destinations_empty() {
        let mut def = graph_with_source();
        let err = def
            .add_eventhouse_destination(
                "D1",
                EventhouseConfig {
                    workspace_id: "ws".into(),
                    item_id: "item".into(),
                    database_name: "db".into(),
                    table_name: "tbl".into(),
                    data_ingestion_mode: IngestionMode::ProcessedIngestion,
                    encoding: "UTF8".into(),
                },
                &["Str1".to_string()],
            )
            .unwrap_err();
        assert_eq!(err.code(), "unknown_node");
        assert!(def.destinations.is_empty());
    }

    #[test]
    fn eventhouse_destination_serializes_camel_case_properties() {
        let mut def = graph_with_source();
        def.add_default_stream("Str1", &["S1".to_string()]).unwrap();
        def.add_eventhouse_destination(
            "D1",
            EventhouseConfig {
                workspace_id: "ws-1".into(),
                item_id: "item-1".into(),
                database_name: "db".into(),
                table_name: "tbl".into(),
                data_ingestion_mode: IngestionMode::ProcessedIngestion,
                encoding: "UTF8".into(),
            },
            &["Str1".to_string()],
        )
        .unwrap();
        let value = serde_json::to_value(&def.destinations[0]).unwrap();
        assert_eq!(value["properties"]["dataIngestionMode"], "ProcessedIngestion");
        assert_eq!(value["properties"]["workspaceId"], "ws-1");
        assert_eq!(value["properties"]["itemId"], "item-1");
        assert_eq!(value["properties"]["databaseName"], "db");
        assert_eq!(value["properties"]["tableName"], "tbl");
        assert_eq!(
            value["properties"]["inputSerialization"]["properties"]["encoding"],
            "UTF8"
        );
        assert_eq!(value["inputNodes"], json!([{ "name": "Str1" }]));
    }

    #[test]
    fn operator_inputs_resolve_across_sources_streams_and_operators() {
        let mut def = graph_with_source();
        def.add_default_stream("Str1", &["S1".to_string()]).unwrap();
        def.add_operator(
            "Filter1",
            OperatorKind::Filter,
            &["Str1".to_string()],
            json!({ "conditions": [] }),
        )
        .unwrap();
        def.add_operator(
            "Agg1",
            OperatorKind::Aggregate,
            &["Filter1".to_string()],
            json!({}),
        )
        .unwrap();
        let err = def
            .add_operator(
                "Bad",
                OperatorKind::Union,
                &["D1".to_string()],
                json!({}),
            )
            .unwrap_err();
        assert_eq!(err.code(), "unknown_node");
        assert_eq!(def.operators.len(), 2);
    }

    #[test]
    fn additions_preserve_insertion_order() {
        let mut def = EventstreamDefinition::empty();
        for name in ["A", "B", "C"] {
            def.add_sample_data_source(name, SampleDataKind::Bicycles)
                .unwrap();
        }
        assert_eq!(def.source_names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn sequential_name_skips_taken_suffixes() {
        assert_eq!(sequential_name("demo-source", &[]), "demo-source");
        assert_eq!(
            sequential_name("demo-source", &["demo-source"]),
            "demo-source-2"
        );
        assert_eq!(
            sequential_name("demo-source", &["demo-source", "demo-source-2"]),
            "demo-source-3"
        );
    }
}
