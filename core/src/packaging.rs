//! Converts a validated definition into the multi-part payload the item
//! creation API accepts.
//!
//! Two invariants live here and nowhere else: the inner definition document
//! carries exactly the five graph keys (never the display name or
//! description, which belong to the outer payload), and packaging refuses a
//! graph that does not currently pass validation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::definition::EventstreamDefinition;
use crate::error::BuilderError;
use crate::session::BuilderSession;
use crate::validator;

pub const DEFINITION_PART_PATH: &str = "eventstream.json";
pub const PLATFORM_PART_PATH: &str = ".platform";
pub const EVENTSTREAM_ITEM_TYPE: &str = "Eventstream";
pub const PLATFORM_SCHEMA_URL: &str =
    "https://developer.microsoft.com/json-schemas/fabric/gitIntegration/platformProperties/2.0.0/schema.json";
pub const PLATFORM_CONFIG_VERSION: &str = "2.0";

/// One base64-encoded file inside the item definition.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionPart {
    pub path: &'static str,
    pub payload: String,
    #[serde(rename = "payloadType")]
    pub payload_type: &'static str,
}

impl DefinitionPart {
    fn inline_base64(path: &'static str, document: &Value) -> Self {
        let bytes = document.to_string().into_bytes();
        Self {
            path,
            payload: BASE64.encode(bytes),
            payload_type: "InlineBase64",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDefinition {
    pub parts: Vec<DefinitionPart>,
}

/// The outer transport payload POSTed to `/workspaces/{id}/items`. Display
/// name and description live here, outside the encoded definition.
#[derive(Debug, Clone, Serialize)]
pub struct CreateEventstreamRequest {
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: ItemDefinition,
}

/// Package a session's graph. Fails with a serialization error (embedding the
/// validator's findings) when the graph is not currently valid.
pub fn package(session: &BuilderSession) -> Result<CreateEventstreamRequest, BuilderError> {
    let report = validator::validate(&session.definition);
    if !report.is_valid {
        return Err(BuilderError::Serialization {
            errors: report.errors,
        });
    }
    assemble(
        &session.name,
        session.description.as_deref(),
        &session.definition,
    )
}

/// Package the quick-start skeleton (one empty default stream) without the
/// builder's validation gate — the service accepts it as a starting point.
pub fn package_skeleton(
    name: &str,
    description: Option<&str>,
) -> Result<CreateEventstreamRequest, BuilderError> {
    assemble(
        name,
        description,
        &EventstreamDefinition::with_default_stream(name),
    )
}

fn assemble(
    name: &str,
    description: Option<&str>,
    definition: &EventstreamDefinition,
) -> Result<CreateEventstreamRequest, BuilderError> {
    let inner = serde_json::to_value(definition).map_err(|e| BuilderError::Serialization {
        errors: vec![format!("failed to serialize definition: {e}")],
    })?;
    let platform = platform_document(name, description);

    Ok(CreateEventstreamRequest {
        display_name: name.to_string(),
        item_type: EVENTSTREAM_ITEM_TYPE,
        description: description.map(str::to_string),
        definition: ItemDefinition {
            parts: vec![
                DefinitionPart::inline_base64(DEFINITION_PART_PATH, &inner),
                DefinitionPart::inline_base64(PLATFORM_PART_PATH, &platform),
            ],
        },
    })
}

/// Git-integration platform metadata. `logicalId` is freshly generated per
/// packaging attempt; the service treats it as the item's stable identity
/// within a workspace export.
fn platform_document(display_name: &str, description: Option<&str>) -> Value {
    json!({
        "$schema": PLATFORM_SCHEMA_URL,
        "metadata": {
            "type": EVENTSTREAM_ITEM_TYPE,
            "displayName": display_name,
            "description": description.unwrap_or_default(),
        },
        "config": {
            "version": PLATFORM_CONFIG_VERSION,
            "logicalId": Uuid::new_v4().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SampleDataKind;
    use crate::session::SessionStore;

    fn valid_session() -> (SessionStore, String) {
        let store = SessionStore::new();
        let sid = store
            .start("Demo", Some("demo eventstream".to_string()))
            .unwrap()
            .session_id;
        store
            .add_sample_data_source(&sid, Some("S1"), SampleDataKind::Bicycles)
            .unwrap();
        store
            .add_default_stream(&sid, "Str1", &["S1".to_string()])
            .unwrap();
        (store, sid)
    }

    fn decode_part(part: &DefinitionPart) -> Value {
        let bytes = BASE64.decode(part.payload.as_bytes()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn invalid_graph_refuses_to_package() {
        let store = SessionStore::new();
        let sid = store.start("Empty", None).unwrap().session_id;
        let err = store.package(&sid).unwrap_err();
        assert_eq!(err.code(), "serialization_failed");
        assert!(err.to_string().contains("At least one source is required"));
    }

    #[test]
    fn packaged_request_has_two_named_parts() {
        let (store, sid) = valid_session();
        let request = store.package(&sid).unwrap();
        assert_eq!(request.display_name, "Demo");
        assert_eq!(request.item_type, "Eventstream");
        assert_eq!(request.description.as_deref(), Some("demo eventstream"));
        let paths: Vec<&str> = request.definition.parts.iter().map(|p| p.path).collect();
        assert_eq!(paths, vec!["eventstream.json", ".platform"]);
        assert!(
            request
                .definition
                .parts
                .iter()
                .all(|p| p.payload_type == "InlineBase64")
        );
    }

    #[test]
    fn inner_document_round_trips_with_exactly_five_keys() {
        let (store, sid) = valid_session();
        let request = store.package(&sid).unwrap();
        let inner = decode_part(&request.definition.parts[0]);
        let obj = inner.as_object().unwrap();
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
        assert!(!obj.contains_key("name"));
        assert!(!obj.contains_key("description"));
        assert_eq!(inner["sources"][0]["name"], "S1");
        assert_eq!(inner["streams"][0]["inputNodes"][0]["name"], "S1");
    }

    #[test]
    fn platform_part_carries_schema_metadata_and_fresh_logical_id() {
        let (store, sid) = valid_session();
        let request = store.package(&sid).unwrap();
        let platform = decode_part(&request.definition.parts[1]);
        assert_eq!(platform["$schema"], PLATFORM_SCHEMA_URL);
        assert_eq!(platform["metadata"]["type"], "Eventstream");
        assert_eq!(platform["metadata"]["displayName"], "Demo");
        assert_eq!(platform["metadata"]["description"], "demo eventstream");
        assert_eq!(platform["config"]["version"], "2.0");

        let first_id = platform["config"]["logicalId"].as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&first_id).is_ok());

        let second = store.package(&sid).unwrap();
        let second_platform = decode_part(&second.definition.parts[1]);
        assert_ne!(second_platform["config"]["logicalId"].as_str().unwrap(), first_id);
    }

    #[test]
    fn skeleton_packages_one_default_stream_without_validation() {
        let request = package_skeleton("Quick", None).unwrap();
        let inner = decode_part(&request.definition.parts[0]);
        assert_eq!(inner["sources"], serde_json::json!([]));
        assert_eq!(inner["streams"][0]["name"], "Quick-stream");
        assert_eq!(inner["streams"][0]["type"], "DefaultStream");
        assert_eq!(inner["streams"][0]["inputNodes"], serde_json::json!([]));
        assert!(request.description.is_none());
    }

    #[test]
    fn outer_payload_serializes_the_wire_shape() {
        let (store, sid) = valid_session();
        let value = serde_json::to_value(store.package(&sid).unwrap()).unwrap();
        assert_eq!(value["displayName"], "Demo");
        assert_eq!(value["type"], "Eventstream");
        assert!(value["definition"]["parts"].is_array());
        assert_eq!(value["definition"]["parts"][0]["payloadType"], "InlineBase64");
    }
}
