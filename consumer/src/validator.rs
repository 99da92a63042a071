use tracing::warn;
use types::{Operation, RawWidgetRequest, Widget, WidgetRef, WidgetRequest};

/// Checks a raw request body against the required-field contract and returns
/// the typed request, or `None` when the request must be skipped. Every
/// rejection is logged with the offending field; nothing here ever fails
/// louder than a warning, and a corrupt body is an invalid request, not an
/// error.
///
/// Structural conformance (field types, the shape of `otherAttributes`) is
/// enforced by the decode itself: the typed structs are the schema.
pub fn validate(body: &[u8]) -> Option<WidgetRequest> {
    let raw: RawWidgetRequest = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("request body could not be decoded ({err}), skipping");
            return None;
        }
    };

    let Some(request_id) = raw.request_id else {
        warn!("request is missing required field 'requestId', skipping");
        return None;
    };
    let Some(request_type) = raw.request_type else {
        warn!("request '{request_id}' is missing required field 'type', skipping");
        return None;
    };
    let Some(widget_id) = raw.widget_id else {
        warn!("request '{request_id}' is missing required field 'widgetId', skipping");
        return None;
    };

    let operation = match request_type.as_str() {
        "create" | "update" => {
            let Some(owner) = raw.owner else {
                warn!(
                    "request '{request_id}' is missing required field 'owner', skipping"
                );
                return None;
            };
            // Copy only the fields the request actually carries; an update
            // that omits a previously set optional field drops it.
            let widget = Widget {
                widget_id,
                owner,
                description: raw.description,
                label: raw.label,
                other_attributes: raw.other_attributes,
            };
            if request_type == "create" {
                Operation::Create(widget)
            } else {
                Operation::Update(widget)
            }
        }
        "delete" => Operation::Delete(WidgetRef {
            widget_id,
            owner: raw.owner,
        }),
        other => {
            warn!("request '{request_id}' has invalid type '{other}', skipping");
            return None;
        }
    };

    Some(WidgetRequest {
        request_id,
        operation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_create_request() {
        let body = br#"{
            "requestId": "r1",
            "type": "create",
            "widgetId": "w1",
            "owner": "Jane Doe",
            "description": "demo"
        }"#;

        let request = validate(body).unwrap();
        assert_eq!(request.request_id, "r1");
        assert_eq!(
            request.operation,
            Operation::Create(Widget {
                widget_id: "w1".to_string(),
                owner: "Jane Doe".to_string(),
                description: Some("demo".to_string()),
                label: None,
                other_attributes: None,
            })
        );
    }

    #[test]
    fn test_valid_update_request_keeps_only_present_fields() {
        let body = br#"{
            "requestId": "r2",
            "type": "update",
            "widgetId": "w1",
            "owner": "Jane Doe"
        }"#;

        let request = validate(body).unwrap();
        let Operation::Update(widget) = request.operation else {
            panic!("expected an update operation");
        };
        assert_eq!(widget.description, None);
        assert_eq!(widget.label, None);
        assert_eq!(widget.other_attributes, None);
    }

    #[test]
    fn test_valid_delete_request_without_owner() {
        let body = br#"{"requestId": "r3", "type": "delete", "widgetId": "w1"}"#;

        let request = validate(body).unwrap();
        assert_eq!(
            request.operation,
            Operation::Delete(WidgetRef {
                widget_id: "w1".to_string(),
                owner: None,
            })
        );
    }

    #[test]
    fn test_missing_widget_id_is_rejected() {
        let body = br#"{"requestId": "r4", "type": "create", "owner": "Jane Doe"}"#;
        assert!(validate(body).is_none());
    }

    #[test]
    fn test_create_without_owner_is_rejected() {
        let body = br#"{"requestId": "r5", "type": "create", "widgetId": "w1"}"#;
        assert!(validate(body).is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let body =
            br#"{"requestId": "r6", "type": "upsert", "widgetId": "w1", "owner": "a"}"#;
        assert!(validate(body).is_none());
    }

    #[test]
    fn test_undecodable_body_is_rejected() {
        assert!(validate(b"not json at all").is_none());
        assert!(validate(b"").is_none());
    }

    #[test]
    fn test_wrongly_typed_field_is_rejected() {
        // otherAttributes must be a list of {name, value} pairs
        let body = br#"{
            "requestId": "r7",
            "type": "create",
            "widgetId": "w1",
            "owner": "Jane Doe",
            "otherAttributes": {"color": "red"}
        }"#;
        assert!(validate(body).is_none());
    }
}
