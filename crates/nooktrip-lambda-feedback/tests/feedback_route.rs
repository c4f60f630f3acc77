use std::sync::Arc;

use lambda_runtime::{Context, LambdaEvent};
use nooktrip_lambda_shared::test_utils::{
    test_bundle, test_resolver, CountingSecretStore, MemoryStore, TEST_DB_CONNECTION,
};
use nooktrip_lambda_shared::{
    handle_event, Dispatcher, ItineraryRecord, ItineraryStore, OutboundResponse,
};
use serde_json::{json, Value};

fn dispatcher(store: Arc<MemoryStore>) -> Dispatcher {
    let secrets = Arc::new(CountingSecretStore::new(test_bundle()));
    let mut builder = Dispatcher::builder(test_resolver(secrets));
    nooktrip_lambda_feedback::register(&mut builder, store).expect("routes register once");
    builder.build()
}

async fn invoke(dispatcher: &Dispatcher, event: Value) -> OutboundResponse {
    handle_event(dispatcher, LambdaEvent::new(event, Context::default())).await
}

async fn saved_itinerary(store: &MemoryStore) -> String {
    let record = ItineraryRecord::new(None, json!({"destination": "Oslo"}));
    store
        .save_itinerary(TEST_DB_CONNECTION, &record)
        .await
        .expect("memory store accepts writes");
    record.id
}

#[tokio::test]
async fn records_and_lists_feedback() {
    let store = Arc::new(MemoryStore::new());
    let itinerary_id = saved_itinerary(&store).await;
    let dispatcher = dispatcher(store.clone());

    let recorded = invoke(
        &dispatcher,
        json!({
            "httpMethod": "POST",
            "path": "/feedback",
            "body": json!({"itineraryId": itinerary_id, "feedback": "LIKE"}).to_string()
        }),
    )
    .await;
    assert_eq!(recorded.status_code, 200);
    assert_eq!(recorded.body_json().unwrap()["feedback"], "like");

    let listed = invoke(
        &dispatcher,
        json!({
            "httpMethod": "GET",
            "path": "/feedback",
            "queryStringParameters": {"itineraryId": itinerary_id}
        }),
    )
    .await;
    assert_eq!(listed.status_code, 200);
    let body = listed.body_json().unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["itineraryId"], itinerary_id.as_str());
    assert!(entries[0]["createdAt"].is_string());
}

#[tokio::test]
async fn records_feedback_with_snake_case_id() {
    let store = Arc::new(MemoryStore::new());
    let itinerary_id = saved_itinerary(&store).await;
    let dispatcher = dispatcher(store.clone());

    let response = invoke(
        &dispatcher,
        json!({
            "httpMethod": "POST",
            "path": "/feedback",
            "body": json!({"itinerary_id": itinerary_id, "feedback": "dislike"}).to_string()
        }),
    )
    .await;

    assert_eq!(response.status_code, 200);
    let feedback = store.feedback();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].itinerary_id, itinerary_id);
}

#[tokio::test]
async fn lists_empty_array_without_feedback() {
    let dispatcher = dispatcher(Arc::new(MemoryStore::new()));

    let response = invoke(&dispatcher, json!({"httpMethod": "GET", "path": "/feedback"})).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_json().unwrap(), json!([]));
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let dispatcher = dispatcher(store);

    let response = invoke(&dispatcher, json!({"httpMethod": "GET", "path": "/feedback"})).await;

    assert_eq!(response.status_code, 503);
    assert_eq!(response.body_json().unwrap()["error"], "ServiceUnavailableError");
}

#[tokio::test]
async fn unknown_feedback_kind_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = dispatcher(store.clone());

    let response = invoke(
        &dispatcher,
        json!({
            "httpMethod": "POST",
            "path": "/feedback",
            "body": "{\"itineraryId\":\"abc\",\"feedback\":\"meh\"}"
        }),
    )
    .await;

    assert_eq!(response.status_code, 400);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn feedback_for_unknown_itinerary_is_rejected() {
    let dispatcher = dispatcher(Arc::new(MemoryStore::new()));

    let response = invoke(
        &dispatcher,
        json!({
            "httpMethod": "POST",
            "path": "/feedback",
            "body": "{\"itineraryId\":\"ghost\",\"feedback\":\"like\"}"
        }),
    )
    .await;

    assert_eq!(response.status_code, 400);
    assert!(response.body_json().unwrap()["message"]
        .as_str()
        .unwrap()
        .contains("ghost"));
}
