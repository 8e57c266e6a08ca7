use serde_json::{json, Value};

use crate::domain::models::chain::{ChainExtrinsic, EventRecord};

/// Outcome of an extrinsic as reported by its `system` events
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicStatus {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Derives success and error message from the extrinsic's own events.
///
/// Extrinsics without a `system.ExtrinsicSuccess`/`ExtrinsicFailed` event count as successful.
pub fn extrinsic_status<'a>(events: impl IntoIterator<Item = &'a EventRecord>) -> ExtrinsicStatus {
    for event in events {
        if event.is("system", "ExtrinsicSuccess") {
            return ExtrinsicStatus {
                success: true,
                error_message: None,
            };
        }
        if event.is("system", "ExtrinsicFailed") {
            return ExtrinsicStatus {
                success: false,
                error_message: Some(
                    event
                        .data
                        .first()
                        .map(render_dispatch_error)
                        .unwrap_or_else(|| "unknown error".to_string()),
                ),
            };
        }
    }
    ExtrinsicStatus {
        success: true,
        error_message: None,
    }
}

/// Renders a dispatch error as `module.error` when the module error is decoded.
pub fn render_dispatch_error(error: &Value) -> String {
    match error {
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            let module = map.get("module").or_else(|| map.get("Module"));
            match module {
                Some(module) => render_module_error(module),
                None => match map.iter().next() {
                    Some((kind, Value::Null)) => kind.clone(),
                    Some((kind, detail)) => format!("{}.{}", kind, compact(detail)),
                    None => "unknown error".to_string(),
                },
            }
        }
        other => compact(other),
    }
}

fn render_module_error(module: &Value) -> String {
    let pallet = module
        .get("pallet")
        .or_else(|| module.get("section"))
        .and_then(Value::as_str);
    let name = module
        .get("name")
        .or_else(|| module.get("method"))
        .and_then(Value::as_str);
    if let (Some(pallet), Some(name)) = (pallet, name) {
        return format!("{}.{}", pallet, name);
    }

    let index = module.get("index").map(compact);
    let error = module.get("error").map(compact);
    match (index, error) {
        (Some(index), Some(error)) => format!("Module{}.{}", index, error),
        _ => compact(module),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Fee info and signed data columns of an extrinsic row
pub fn fee_columns(extrinsic: &ChainExtrinsic) -> (Option<Value>, Option<Value>) {
    let fee_info = extrinsic.info.clone();
    let signed_data = if extrinsic.is_signed() {
        Some(json!({ "fee": fee_info.clone().unwrap_or(Value::Null) }))
    } else {
        None
    };
    (fee_info, signed_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::chain::Phase;
    use crate::infrastructure::node::fixture;

    #[test]
    fn test_success_event() {
        let events = vec![fixture::event(
            0,
            "system",
            "ExtrinsicSuccess",
            vec![json!({ "weight": "1000" })],
            Phase::ApplyExtrinsic(1),
        )];
        assert_eq!(
            extrinsic_status(&events),
            ExtrinsicStatus {
                success: true,
                error_message: None
            }
        );
    }

    #[test]
    fn test_failed_with_decoded_module_error() {
        let events = vec![
            fixture::event(3, "balances", "Withdraw", vec![], Phase::ApplyExtrinsic(2)),
            fixture::event(
                4,
                "system",
                "ExtrinsicFailed",
                vec![
                    json!({ "module": { "pallet": "balances", "name": "InsufficientBalance" } }),
                    json!({}),
                ],
                Phase::ApplyExtrinsic(2),
            ),
        ];
        let status = extrinsic_status(&events);
        assert!(!status.success);
        assert_eq!(status.error_message.as_deref(), Some("balances.InsufficientBalance"));
    }

    #[test]
    fn test_undecoded_errors_are_still_rendered() {
        assert_eq!(
            render_dispatch_error(&json!({ "module": { "index": 6, "error": "0x02000000" } })),
            "Module6.0x02000000"
        );
        assert_eq!(render_dispatch_error(&json!({ "badOrigin": null })), "badOrigin");
        assert_eq!(
            render_dispatch_error(&json!({ "token": "FundsUnavailable" })),
            "token.FundsUnavailable"
        );
        assert_eq!(render_dispatch_error(&json!("CannotLookup")), "CannotLookup");
    }

    #[test]
    fn test_fee_columns_only_sign_signed_extrinsics() {
        let signed = fixture::extrinsic(1, "balances", "transfer", Some("5A"), json!({}));
        let (fee, signed_data) = fee_columns(&signed);
        assert_eq!(fee.as_ref().unwrap()["partialFee"], "1000");
        assert_eq!(signed_data.unwrap()["fee"]["partialFee"], "1000");

        let inherent = fixture::extrinsic(0, "timestamp", "set", None, json!({ "now": 1 }));
        assert_eq!(fee_columns(&inherent), (None, None));
    }
}
