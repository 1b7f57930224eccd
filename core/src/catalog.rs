//! Static registry of the component types an eventstream definition may use.
//!
//! The catalog is read-only and shared by every session. Builder operations
//! validate their inputs against it; the `list_available_components` tool
//! serves a snapshot of it for discovery.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::BuilderError;

/// Definition schema version stamped into every graph. Versioned together
/// with the catalog: new component kinds mean a new level.
pub const COMPATIBILITY_LEVEL: &str = "1.0";

/// Source component types. The builder constructs `SampleData` and
/// `CustomEndpoint` sources; the remaining kinds are listed for discovery so
/// an agent knows what the service itself supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    SampleData,
    CustomEndpoint,
    AzureEventHub,
    AzureIoTHub,
    AmazonKinesis,
    ApacheKafka,
    ConfluentCloud,
    FabricWorkspaceItemEvents,
    FabricJobEvents,
    FabricOneLakeEvents,
}

impl SourceKind {
    pub const ALL: [SourceKind; 10] = [
        SourceKind::SampleData,
        SourceKind::CustomEndpoint,
        SourceKind::AzureEventHub,
        SourceKind::AzureIoTHub,
        SourceKind::AmazonKinesis,
        SourceKind::ApacheKafka,
        SourceKind::ConfluentCloud,
        SourceKind::FabricWorkspaceItemEvents,
        SourceKind::FabricJobEvents,
        SourceKind::FabricOneLakeEvents,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::SampleData => "SampleData",
            SourceKind::CustomEndpoint => "CustomEndpoint",
            SourceKind::AzureEventHub => "AzureEventHub",
            SourceKind::AzureIoTHub => "AzureIoTHub",
            SourceKind::AmazonKinesis => "AmazonKinesis",
            SourceKind::ApacheKafka => "ApacheKafka",
            SourceKind::ConfluentCloud => "ConfluentCloud",
            SourceKind::FabricWorkspaceItemEvents => "FabricWorkspaceItemEvents",
            SourceKind::FabricJobEvents => "FabricJobEvents",
            SourceKind::FabricOneLakeEvents => "FabricOneLakeEvents",
        }
    }
}

/// Stream component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    DefaultStream,
    DerivedStream,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::DefaultStream, StreamKind::DerivedStream];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::DefaultStream => "DefaultStream",
            StreamKind::DerivedStream => "DerivedStream",
        }
    }
}

/// Destination component types. The builder constructs `Eventhouse` and
/// `CustomEndpoint` destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationKind {
    Eventhouse,
    CustomEndpoint,
    Lakehouse,
}

impl DestinationKind {
    pub const ALL: [DestinationKind; 3] = [
        DestinationKind::Eventhouse,
        DestinationKind::CustomEndpoint,
        DestinationKind::Lakehouse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Eventhouse => "Eventhouse",
            DestinationKind::CustomEndpoint => "CustomEndpoint",
            DestinationKind::Lakehouse => "Lakehouse",
        }
    }
}

/// Processing operator types. Operators are optional; a minimal valid graph
/// has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    Filter,
    Join,
    ManageFields,
    Aggregate,
    GroupBy,
    Union,
    Expand,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 7] = [
        OperatorKind::Filter,
        OperatorKind::Join,
        OperatorKind::ManageFields,
        OperatorKind::Aggregate,
        OperatorKind::GroupBy,
        OperatorKind::Union,
        OperatorKind::Expand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::Filter => "Filter",
            OperatorKind::Join => "Join",
            OperatorKind::ManageFields => "ManageFields",
            OperatorKind::Aggregate => "Aggregate",
            OperatorKind::GroupBy => "GroupBy",
            OperatorKind::Union => "Union",
            OperatorKind::Expand => "Expand",
        }
    }

    pub fn parse(value: &str) -> Result<Self, BuilderError> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .copied()
            .ok_or_else(|| {
                BuilderError::validation_field(
                    format!(
                        "Unknown operator type '{value}'; expected one of: {}",
                        allowed(&Self::ALL.map(Self::as_str))
                    ),
                    "operator_type",
                )
            })
    }
}

/// Built-in synthetic datasets available to `SampleData` sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleDataKind {
    Bicycles,
    Buses,
    SemanticModelLogs,
    #[serde(rename = "SP500Stocks")]
    Sp500Stocks,
    StockMarket,
    YellowTaxi,
}

impl SampleDataKind {
    pub const ALL: [SampleDataKind; 6] = [
        SampleDataKind::Bicycles,
        SampleDataKind::Buses,
        SampleDataKind::SemanticModelLogs,
        SampleDataKind::Sp500Stocks,
        SampleDataKind::StockMarket,
        SampleDataKind::YellowTaxi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SampleDataKind::Bicycles => "Bicycles",
            SampleDataKind::Buses => "Buses",
            SampleDataKind::SemanticModelLogs => "SemanticModelLogs",
            SampleDataKind::Sp500Stocks => "SP500Stocks",
            SampleDataKind::StockMarket => "StockMarket",
            SampleDataKind::YellowTaxi => "YellowTaxi",
        }
    }

    pub fn parse(value: &str) -> Result<Self, BuilderError> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .copied()
            .ok_or_else(|| {
                BuilderError::validation_field(
                    format!(
                        "Unknown sample data type '{value}'; expected one of: {}",
                        allowed(&Self::ALL.map(Self::as_str))
                    ),
                    "sample_type",
                )
            })
    }
}

fn allowed(names: &[&str]) -> String {
    names.join(", ")
}

/// Discovery payload for the `list_available_components` tool.
pub fn catalog_snapshot() -> Value {
    json!({
        "sources": SourceKind::ALL.map(SourceKind::as_str),
        "streams": StreamKind::ALL.map(StreamKind::as_str),
        "destinations": DestinationKind::ALL.map(DestinationKind::as_str),
        "operators": OperatorKind::ALL.map(OperatorKind::as_str),
        "sample_data_types": SampleDataKind::ALL.map(SampleDataKind::as_str),
        "compatibility_level": COMPATIBILITY_LEVEL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_to_wire_strings() {
        assert_eq!(
            serde_json::to_value(SourceKind::SampleData).unwrap(),
            json!("SampleData")
        );
        assert_eq!(
            serde_json::to_value(SampleDataKind::Sp500Stocks).unwrap(),
            json!("SP500Stocks")
        );
        assert_eq!(
            serde_json::to_value(OperatorKind::ManageFields).unwrap(),
            json!("ManageFields")
        );
    }

    #[test]
    fn sample_data_parse_is_case_insensitive() {
        assert_eq!(
            SampleDataKind::parse("bicycles").unwrap(),
            SampleDataKind::Bicycles
        );
        assert_eq!(
            SampleDataKind::parse("YellowTaxi").unwrap(),
            SampleDataKind::YellowTaxi
        );
    }

    #[test]
    fn sample_data_parse_rejects_unknown_and_lists_options() {
        let err = SampleDataKind::parse("Trains").unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("Bicycles"));
        assert!(err.to_string().contains("YellowTaxi"));
    }

    #[test]
    fn operator_parse_round_trips_every_kind() {
        for kind in OperatorKind::ALL {
            assert_eq!(OperatorKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(OperatorKind::parse("Pivot").is_err());
    }

    #[test]
    fn snapshot_lists_every_category() {
        let snapshot = catalog_snapshot();
        assert_eq!(snapshot["sources"].as_array().unwrap().len(), 10);
        assert_eq!(snapshot["streams"].as_array().unwrap().len(), 2);
        assert_eq!(snapshot["destinations"].as_array().unwrap().len(), 3);
        assert_eq!(snapshot["operators"].as_array().unwrap().len(), 7);
        assert_eq!(snapshot["sample_data_types"].as_array().unwrap().len(), 6);
        assert_eq!(snapshot["compatibility_level"], COMPATIBILITY_LEVEL);
    }
}
