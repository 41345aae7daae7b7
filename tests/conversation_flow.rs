//! Multi-turn conversations through the webhook service

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

use netassist::upstream::TrafficEntry;

#[tokio::test]
async fn test_ambiguous_name_then_pick() {
    let h = harness().await;

    // Turn 1: "main" matches two networks equally well
    let first = h
        .webhook
        .fulfill(turn("listDevices", json!({"network": "main"}), json!([])))
        .await;
    assert_eq!(
        text(&first),
        "Sorry, but there are multiple similarly named networks:\n• Main Office\n• Main Street Branch\n Which network?"
    );
    let followup = first.followup_event_input.clone().expect("follow-up event");
    assert_eq!(followup.name, "listdevices-repromptparams");
    assert_eq!(followup.parameters["invalid-network"], "true");
    assert_eq!(
        followup.parameters["possible-candidates"],
        "Main Office|Main Street Branch"
    );

    // Turn 2: the platform re-enters with the reprompt context; the user says "office"
    let reprompt = json!([{
        "name": context_name("listdevices-repromptparams"),
        "lifespanCount": 1,
        "parameters": Value::Object(followup.parameters.clone()),
    }]);
    let second = h
        .webhook
        .fulfill(turn("listDevices", json!({"network": "office"}), reprompt))
        .await;
    assert_eq!(
        text(&second),
        "Your network, *Main Office*, has the following devices:\n1. Lobby AP\n2. MX64\n3. Door Cam"
    );

    let contexts: Vec<(String, u32)> = second
        .output_contexts
        .iter()
        .map(|c| (c.name.clone(), c.lifespan_count))
        .collect();
    assert_eq!(
        contexts,
        vec![
            (context_name("network"), 5),
            (context_name("listdevices-repromptparams"), 0)
        ]
    );
    assert!(second.followup_event_input.is_none());
}

#[tokio::test]
async fn test_unknown_pick_lists_offered_candidates_again() {
    let h = harness().await;
    let reprompt = json!([{
        "name": context_name("listdevices-repromptparams"),
        "parameters": {
            "invalid-network": "true",
            "possible-candidates": "Main Office|Main Street Branch"
        }
    }]);
    let response = h
        .webhook
        .fulfill(turn("listDevices", json!({"network": "warehouse"}), reprompt))
        .await;
    assert_eq!(
        text(&response),
        "Unable to find the specified network! Please choose again from the following networks:\n• Main Office\n• Main Street Branch"
    );
    assert_eq!(response.output_contexts[0].name, context_name("network"));
    assert_eq!(response.output_contexts[0].lifespan_count, 0);
}

#[tokio::test]
async fn test_confirmed_network_carries_into_data_usage() {
    let h = harness().await;
    *h.api.traffic.lock().unwrap() = vec![TrafficEntry {
        application: Some("YouTube".into()),
        destination: None,
        sent: 1024.0 * 1024.0,
        recv: 1024.0 * 1024.0,
        active_time: 3600,
        num_clients: 2,
    }];
    h.api.traffic_rate_limits.store(2, Ordering::SeqCst);

    let contexts = json!([{
        "name": context_name("network"),
        "lifespanCount": 4,
        "parameters": {"network": "Main Office"}
    }]);
    let response = h
        .webhook
        .fulfill(turn(
            "dataUsage",
            json!({"time-duration": {"amount": 3, "unit": "day"}}),
            contexts,
        ))
        .await;

    // two rate limits, then success
    assert_eq!(h.api.traffic_calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        text(&response),
        "• Total data usage with 2 clients over 3 days: 2 MB\n\
         • Average data usage over 3 days: 1 MB per client\n\
         • Total data sent over 3 days: 1 MB\n\
         • Total data received over 3 days: 1 MB"
    );
    let payload = response.payload.expect("payload");
    assert_eq!(
        payload["speech"],
        "The total data usage with 2 clients over 3 days was 2 MB. \
         On average, most clients used about 1 MB. \
         The total data sent over the same time period was 1 MB and the total data received was 1 MB."
    );
}

#[tokio::test]
async fn test_rate_limits_exhausted_reset_network() {
    let h = harness().await;
    h.api.traffic_rate_limits.store(100, Ordering::SeqCst);

    let response = h
        .webhook
        .fulfill(turn(
            "topTraffic",
            json!({"network": "warehouse", "time-duration": {"amount": 2, "unit": "h"}}),
            json!([]),
        ))
        .await;

    assert_eq!(h.api.traffic_calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        text(&response),
        "The dashboard is busy right now. Please try again in a moment."
    );
    assert_eq!(response.output_contexts[0].name, context_name("network"));
    assert_eq!(response.output_contexts[0].lifespan_count, 0);
}

#[tokio::test]
async fn test_out_of_range_duration_reenters_slot_filling() {
    let h = harness().await;
    let response = h
        .webhook
        .fulfill(turn(
            "dataUsage",
            json!({"network": "warehouse", "time-duration": {"amount": 1, "unit": "h"}}),
            json!([]),
        ))
        .await;

    assert_eq!(
        text(&response),
        "Sorry, but you can only get data usage statistics between 2 hours and 1 month."
    );
    let followup = response.followup_event_input.expect("follow-up event");
    assert_eq!(followup.name, "datausage-repromptparams");
    assert_eq!(followup.parameters["network"], "Warehouse");
    assert_eq!(followup.parameters["invalid-time-duration"], "true");
    assert_eq!(h.api.traffic_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_org_prompts_with_menu() {
    let h = harness().await;
    let response = h
        .webhook
        .fulfill(turn("listAdmins", json!({"org": ""}), json!([])))
        .await;
    assert_eq!(
        text(&response),
        "Which organization? You can choose from the following orgs:\n• Acme Corp\n• Globex"
    );
}

#[tokio::test]
async fn test_unsupported_platform_and_cancel() {
    let h = harness().await;

    let mut request = turn("listOrganizations", json!({}), json!([]));
    request.original_detect_intent_request = serde_json::from_value(json!({"source": "kik"})).ok();
    let rejected = h.webhook.fulfill(request).await;
    assert_eq!(text(&rejected), "This platform is currently not supported.");

    let cancelled: netassist::webhook::WebhookRequest =
        serde_json::from_value(json!({"session": SESSION, "queryResult": {"parameters": {}}}))
            .unwrap();
    let response = h.webhook.fulfill(cancelled).await;
    assert_eq!(serde_json::to_value(&response).unwrap(), json!({}));
}
