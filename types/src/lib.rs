use serde::{Deserialize, Serialize};

pub mod utils;

/// A single `{name, value}` extension attribute carried by a request and its
/// derived widget. Order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherAttribute {
    pub name: String,

    pub value: String,
}

/// The persisted record, derived from a create/update request with the
/// request-only fields (`requestId`, `type`) stripped. The stripping is
/// structural: this type has no place to carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub widget_id: String,

    pub owner: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_attributes: Option<Vec<OtherAttribute>>,
}

/// A request document as it arrives off the wire, before validation. Every
/// field is optional here so that a missing field is a value to report on,
/// not a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWidgetRequest {
    pub request_id: Option<String>,

    #[serde(rename = "type")]
    pub request_type: Option<String>,

    pub widget_id: Option<String>,

    pub owner: Option<String>,

    pub description: Option<String>,

    pub label: Option<String>,

    pub other_attributes: Option<Vec<OtherAttribute>>,
}

/// A validated request: the id used for logging plus the operation to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetRequest {
    pub request_id: String,

    pub operation: Operation,
}

/// The closed set of mutations a request can ask for. Anything else is
/// rejected at the validation boundary and never reaches a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(Widget),
    Update(Widget),
    Delete(WidgetRef),
}

/// Identity of a stored widget, as carried by a delete request. The owner is
/// optional because only create/update requests require one.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetRef {
    pub widget_id: String,

    pub owner: Option<String>,
}
