//! Era and validator attribution for staking rewards and slashes.
//!
//! The account in a `Rewarded`/`Slashed` event says nothing about which validator and era the
//! payout belongs to. That information lives in the enclosing `payoutStakers` call, or, when
//! the call is wrapped in a batch or proxy call, in the nearest preceding `PayoutStarted` event
//! of the same extrinsic.

use serde_json::Value;

use crate::domain::models::chain::{value_to_decimal, value_to_string, ChainExtrinsic, EventRecord};

/// How an attribution was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionSource {
    PayoutCall,
    Batch,
    Proxy,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub era: Option<u32>,
    pub validator_stash: Option<String>,
    pub source: AttributionSource,
}

impl Attribution {
    fn unresolved() -> Self {
        Self {
            era: None,
            validator_stash: None,
            source: AttributionSource::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.source != AttributionSource::Unresolved
    }
}

const BATCH_METHODS: [&str; 3] = ["batch", "batchAll", "forceBatch"];

/// Nesting levels searched for a wrapped payout (proxy around batch around payout)
const MAX_CALL_DEPTH: usize = 3;

pub fn is_reward(event: &EventRecord) -> bool {
    event.is("staking", "Rewarded") || event.is("staking", "Reward")
}

pub fn is_slash(event: &EventRecord) -> bool {
    event.is("staking", "Slashed") || event.is("staking", "Slash")
}

/// Account named by a reward or slash event
pub fn staking_account(event: &EventRecord) -> Option<String> {
    event.data_str(0)
}

/// Amount of a reward or slash event; newer runtimes insert the destination before it
pub fn staking_amount(event: &EventRecord) -> String {
    event
        .data
        .last()
        .filter(|_| event.data.len() > 1)
        .and_then(value_to_decimal)
        .unwrap_or_else(|| "0".to_string())
}

/// Resolves era and validator stash for a staking `event` of the given block.
///
/// `events` is the block-wide event list in chain order.
pub fn attribute(
    extrinsics: &[ChainExtrinsic],
    events: &[EventRecord],
    event: &EventRecord,
) -> Attribution {
    let Some(index) = event.phase.extrinsic_index() else {
        return Attribution::unresolved();
    };
    let Some(extrinsic) = extrinsics.iter().find(|e| e.index == index) else {
        return Attribution::unresolved();
    };

    if extrinsic.is("staking", "payoutStakers") {
        let validator_stash = extrinsic.arg("validator_stash", 0).and_then(value_to_string);
        let era = extrinsic.arg("era", 1).and_then(parse_era);
        return Attribution {
            era,
            validator_stash,
            source: AttributionSource::PayoutCall,
        };
    }

    let source = if extrinsic.section.eq_ignore_ascii_case("utility")
        && BATCH_METHODS
            .iter()
            .any(|method| extrinsic.method.eq_ignore_ascii_case(method))
    {
        AttributionSource::Batch
    } else if extrinsic.is("proxy", "proxy") {
        AttributionSource::Proxy
    } else {
        return Attribution::unresolved();
    };
    if !wraps_payout(extrinsic) {
        return Attribution::unresolved();
    }

    match nearest_payout_started(events, index, event.index) {
        Some(started) => Attribution {
            era: started.data.first().and_then(parse_era),
            validator_stash: started.data_str(1),
            source,
        },
        None => Attribution::unresolved(),
    }
}

/// Whether a batch or proxy extrinsic carries a `payoutStakers` call among its wrapped calls
fn wraps_payout(extrinsic: &ChainExtrinsic) -> bool {
    let calls = extrinsic
        .arg("calls", 0)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    calls
        .iter()
        .chain(extrinsic.arg("call", 2))
        .any(|call| is_or_wraps_payout(call, MAX_CALL_DEPTH))
}

fn is_or_wraps_payout(call: &Value, depth: usize) -> bool {
    if depth == 0 {
        return false;
    }
    if call_name(call).map_or(false, |(section, method)| {
        section.eq_ignore_ascii_case("staking") && method.eq_ignore_ascii_case("payoutStakers")
    }) {
        return true;
    }
    let Some(args) = call.get("args") else {
        return false;
    };
    let nested = args
        .get("calls")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    nested
        .iter()
        .chain(args.get("call"))
        .any(|inner| is_or_wraps_payout(inner, depth - 1))
}

/// (section, method) of a wrapped call, either `{method: {pallet, method}}` or
/// `{section, method}`
fn call_name(call: &Value) -> Option<(&str, &str)> {
    match call.get("method")? {
        Value::Object(method) => Some((
            method.get("pallet")?.as_str()?,
            method.get("method")?.as_str()?,
        )),
        Value::String(method) => Some((
            call.get("section").or_else(|| call.get("pallet"))?.as_str()?,
            method.as_str(),
        )),
        _ => None,
    }
}

/// Highest-indexed `PayoutStarted` of extrinsic `extrinsic_index` emitted before `before`
fn nearest_payout_started(
    events: &[EventRecord],
    extrinsic_index: u32,
    before: u32,
) -> Option<&EventRecord> {
    events
        .iter()
        .filter(|candidate| {
            candidate.index < before
                && candidate.phase.extrinsic_index() == Some(extrinsic_index)
                && candidate.is("staking", "PayoutStarted")
        })
        .max_by_key(|candidate| candidate.index)
}

fn parse_era(value: &Value) -> Option<u32> {
    value_to_decimal(value).and_then(|era| era.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::chain::Phase;
    use crate::infrastructure::node::fixture::{event, extrinsic};
    use serde_json::json;

    fn batch_block() -> (Vec<ChainExtrinsic>, Vec<EventRecord>) {
        let extrinsics = vec![
            extrinsic(0, "timestamp", "set", None, json!({ "now": 1 })),
            extrinsic(
                4,
                "utility",
                "batch",
                Some("5Caller"),
                json!({ "calls": [{ "method": "payoutStakers", "section": "staking", "args": { "validator_stash": "V", "era": 7 } }] }),
            ),
        ];
        let events = vec![
            event(9, "staking", "PayoutStarted", vec![json!(6), json!("OLD")], Phase::ApplyExtrinsic(3)),
            event(10, "staking", "PayoutStarted", vec![json!(7), json!("V")], Phase::ApplyExtrinsic(4)),
            event(11, "staking", "Rewarded", vec![json!("A"), json!("1000")], Phase::ApplyExtrinsic(4)),
        ];
        (extrinsics, events)
    }

    #[test]
    fn test_batch_payout_uses_preceding_payout_started() {
        let (extrinsics, events) = batch_block();
        let attribution = attribute(&extrinsics, &events, &events[2]);

        assert_eq!(attribution.era, Some(7));
        assert_eq!(attribution.validator_stash.as_deref(), Some("V"));
        assert_eq!(attribution.source, AttributionSource::Batch);
        assert_eq!(staking_account(&events[2]).as_deref(), Some("A"));
        assert_eq!(staking_amount(&events[2]), "1000");
    }

    #[test]
    fn test_nearest_payout_started_wins() {
        let (extrinsics, mut events) = batch_block();
        events.insert(
            2,
            event(11, "staking", "PayoutStarted", vec![json!(8), json!("W")], Phase::ApplyExtrinsic(4)),
        );
        events[3].index = 12;
        // later PayoutStarted must not be picked for an earlier reward
        events.push(event(14, "staking", "PayoutStarted", vec![json!(9), json!("X")], Phase::ApplyExtrinsic(4)));

        let attribution = attribute(&extrinsics, &events, &events[3]);
        assert_eq!(attribution.era, Some(8));
        assert_eq!(attribution.validator_stash.as_deref(), Some("W"));
    }

    #[test]
    fn test_direct_payout_call_is_authoritative() {
        let extrinsics = vec![extrinsic(
            2,
            "staking",
            "payoutStakers",
            Some("5Caller"),
            json!({ "validator_stash": "V2", "era": "0x0c" }),
        )];
        let events = vec![
            event(3, "staking", "PayoutStarted", vec![json!(99), json!("IGNORED")], Phase::ApplyExtrinsic(2)),
            event(4, "staking", "Rewarded", vec![json!("N"), json!(5)], Phase::ApplyExtrinsic(2)),
        ];
        let attribution = attribute(&extrinsics, &events, &events[1]);
        assert_eq!(attribution.era, Some(12));
        assert_eq!(attribution.validator_stash.as_deref(), Some("V2"));
        assert_eq!(attribution.source, AttributionSource::PayoutCall);
    }

    #[test]
    fn test_proxy_wrapped_payout() {
        let extrinsics = vec![extrinsic(
            1,
            "proxy",
            "proxy",
            Some("5Proxy"),
            json!({
                "real": "5Real",
                "call": { "method": { "pallet": "utility", "method": "batch" }, "args": { "calls": [
                    { "method": { "pallet": "staking", "method": "payoutStakers" }, "args": { "era": 3 } }
                ] } }
            }),
        )];
        let events = vec![
            event(2, "staking", "PayoutStarted", vec![json!(3), json!("VP")], Phase::ApplyExtrinsic(1)),
            event(3, "staking", "Rewarded", vec![json!("N"), json!("77")], Phase::ApplyExtrinsic(1)),
        ];
        let attribution = attribute(&extrinsics, &events, &events[1]);
        assert_eq!(attribution.source, AttributionSource::Proxy);
        assert_eq!(attribution.era, Some(3));
        assert_eq!(attribution.validator_stash.as_deref(), Some("VP"));
    }

    #[test]
    fn test_unrelated_or_missing_context_is_unresolved() {
        let extrinsics = vec![extrinsic(1, "balances", "transfer", Some("5A"), json!({}))];
        let events = vec![
            event(0, "staking", "PayoutStarted", vec![json!(3), json!("V")], Phase::ApplyExtrinsic(1)),
            event(1, "staking", "Rewarded", vec![json!("A"), json!("1")], Phase::ApplyExtrinsic(1)),
            event(2, "staking", "Rewarded", vec![json!("B"), json!("1")], Phase::Initialization),
        ];
        assert!(!attribute(&extrinsics, &events, &events[1]).is_resolved());
        assert_eq!(attribute(&extrinsics, &events, &events[2]).era, None);

        // batch without any PayoutStarted of its own
        let extrinsics = vec![extrinsic(1, "utility", "batchAll", Some("5A"), json!({}))];
        let attribution = attribute(&extrinsics, &events[1..2], &events[1]);
        assert_eq!(attribution, Attribution::unresolved());
    }

    #[test]
    fn test_batch_without_payout_call_is_unresolved() {
        let (mut extrinsics, events) = batch_block();
        extrinsics[1].args = json!({ "calls": [
            { "method": "transfer", "section": "balances", "args": { "dest": "5B", "value": 1 } }
        ] });
        let attribution = attribute(&extrinsics, &events, &events[2]);
        assert_eq!(attribution, Attribution::unresolved());

        let proxied = vec![extrinsic(
            4,
            "proxy",
            "proxy",
            Some("5Proxy"),
            json!({ "real": "5Real", "call": { "method": { "pallet": "system", "method": "remark" } } }),
        )];
        assert!(!attribute(&proxied, &events, &events[2]).is_resolved());
    }

    #[test]
    fn test_amount_is_last_field() {
        let rewarded = event(
            1,
            "staking",
            "Rewarded",
            vec![json!("A"), json!({ "account": "Z" }), json!("0x03e8")],
            Phase::ApplyExtrinsic(0),
        );
        assert_eq!(staking_amount(&rewarded), "1000");
        assert!(is_reward(&rewarded));
        assert!(!is_slash(&rewarded));
    }
}
