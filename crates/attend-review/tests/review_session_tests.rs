//! Review session end to end against scripted HTTP and stream fakes

use attend_gateway::{endpoints, Method};
use attend_review::{
    ActionDispatcher, EmployeeId, LoadState, ReconnectPolicy, ReviewConfig, ReviewSession, ReviewView, StreamState,
};
use attend_session::ClientError;
use attend_test_utils::{
    anomaly_event, anomaly_json, eventually, pending_event, pending_json, signed_in_gateway,
    signed_out_gateway, updated_event, ScriptedConnector, ScriptedTransport, StreamConnections,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy::default().with_backoff_ms(10, 50)
}

fn serve_snapshot(transport: &ScriptedTransport, pending: &[(&str, f64)]) {
    let items: Vec<_> = pending.iter().map(|(id, c)| pending_json(id, *c)).collect();
    transport.on_json(Method::Get, endpoints::REVIEW_PENDING, 200, json!(items));
    transport.on_json(Method::Get, endpoints::REVIEW_ANOMALIES, 200, json!([]));
}

fn open(transport: &Arc<ScriptedTransport>) -> (ReviewSession, Arc<ScriptedConnector>, StreamConnections) {
    let gateway = signed_in_gateway(transport.clone(), "access-1", "refresh-1");
    let (connector, connections) = ScriptedConnector::new();
    let session = ReviewSession::open(gateway, connector.clone(), &ReviewConfig::default(), fast_reconnect());
    (session, connector, connections)
}

async fn ready_and_live(session: &ReviewSession) -> ReviewView {
    session
        .wait_for(|v| v.is_ready() && v.stream() == &StreamState::Live)
        .await
        .unwrap()
}

fn pending_ids(view: &ReviewView) -> Vec<String> {
    let mut ids: Vec<_> = view.pending_items().iter().map(|i| i.employee_id.to_string()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn buffered_events_replay_after_snapshot() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("A", 0.9), ("B", 0.8)]);
    let snapshot_gate = transport.gate(Method::Get, endpoints::REVIEW_PENDING);
    let (session, _connector, mut connections) = open(&transport);

    let stream = connections.next().await;
    assert_eq!(stream.token, "access-1");
    stream.send(updated_event("B"));
    stream.send(pending_event("C", 0.7));
    session.wait_for(|v| v.buffered_events() == 2).await.unwrap();
    assert_eq!(session.view().pending_len(), 0);

    snapshot_gate.add_permits(1);
    let view = session.wait_for(ReviewView::is_ready).await.unwrap();

    assert_eq!(pending_ids(&view), ["A", "C"]);
    assert_eq!(view.buffered_events(), 0);
}

#[tokio::test]
async fn decided_attendance_leaves_pending_view() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.92)]);
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;
    let ready = session.wait_for(ReviewView::is_ready).await.unwrap();
    assert_eq!(ready.pending_len(), 1);

    stream.send(r#"{"event":"attendance.updated","employee_id":"E1"}"#);

    let view = session.wait_for(|v| v.pending_len() == 0).await.unwrap();
    assert!(view.is_ready());
}

#[tokio::test]
async fn duplicate_events_are_idempotent() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[]);
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();

    stream.send(pending_event("E1", 0.4));
    stream.send(pending_event("E1", 0.6));
    stream.send(anomaly_event(7));
    stream.send(anomaly_event(7));
    stream.send(anomaly_event(8));

    let view = session.wait_for(|v| v.anomaly_len() == 2).await.unwrap();
    assert_eq!(view.pending_len(), 1);
    assert_eq!(view.pending_item(&"E1".into()).unwrap().confidence_score, 0.6);
    let ids: Vec<_> = view.anomalies().map(|a| a.id.to_string()).collect();
    assert_eq!(ids, ["8", "7"]);
}

#[tokio::test]
async fn malformed_frames_are_counted() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.9)]);
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();

    stream.send("garbage");
    stream.send(r#"{"event":"attendance.archived","employee_id":"E1"}"#);

    let view = session.wait_for(|v| v.dropped_events() == 2).await.unwrap();
    assert_eq!(view.pending_len(), 1);
    assert!(stream.is_open());
}

#[tokio::test]
async fn disconnection_reruns_snapshot_then_replay() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("A", 0.9)]);
    let (session, _connector, mut connections) = open(&transport);
    let first = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();

    serve_snapshot(&transport, &[("B", 0.9)]);
    first.fail("connection reset");

    let second = connections.next().await;
    second.send(pending_event("C", 0.5));
    let view = session
        .wait_for(|v| v.is_ready() && v.contains_pending(&"C".into()))
        .await
        .unwrap();

    assert_eq!(pending_ids(&view), ["B", "C"]);
    assert_eq!(transport.count(endpoints::REVIEW_PENDING), 2);
    assert_eq!(view.stream(), &StreamState::Live);
}

#[tokio::test]
async fn refused_connections_retry_with_backoff() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[]);
    let gateway = signed_in_gateway(transport.clone(), "access-1", "refresh-1");
    let (connector, mut connections) = ScriptedConnector::new();
    connector.refuse_next(ClientError::Network("connection refused".into()));
    connector.refuse_next(ClientError::Network("connection refused".into()));
    let session = ReviewSession::open(gateway, connector.clone(), &ReviewConfig::default(), fast_reconnect());

    let _stream = connections.next().await;
    ready_and_live(&session).await;

    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn exhausted_reconnects_wait_for_manual_resync() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("A", 0.9)]);
    let gateway = signed_in_gateway(transport.clone(), "access-1", "refresh-1");
    let (connector, mut connections) = ScriptedConnector::new();
    let session = ReviewSession::open(
        gateway,
        connector.clone(),
        &ReviewConfig::default(),
        ReconnectPolicy::disabled(),
    );

    let first = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();
    first.fail("gone");
    let view = session
        .wait_for(|v| matches!(v.stream(), StreamState::Disconnected(_)))
        .await
        .unwrap();
    assert_eq!(view.pending_len(), 1);
    assert_eq!(connector.attempts(), 1);

    session.resync();
    let _second = connections.next().await;
    session
        .wait_for(|v| v.stream() == &StreamState::Live)
        .await
        .unwrap();
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn snapshot_failure_reported_as_failed_view() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Get, endpoints::REVIEW_PENDING, 500, json!({"error": "boom"}));
    transport.on_json(Method::Get, endpoints::REVIEW_ANOMALIES, 200, json!([anomaly_json(1)]));
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;

    let view = session
        .wait_for(|v| matches!(v.load(), LoadState::Failed(_)))
        .await
        .unwrap();
    assert_eq!(view.pending_len(), 0);
    assert_eq!(view.anomaly_len(), 0);

    stream.send(pending_event("E1", 0.9));
    stream.send(anomaly_event(2));
    // The stream is still delivering; the view stays empty
    assert!(stream.is_open());
    assert_eq!(session.view().pending_len(), 0);
}

#[tokio::test]
async fn signed_out_session_reports_authentication_failure() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("A", 0.9)]);
    let gateway = signed_out_gateway(transport.clone());
    let (connector, _connections) = ScriptedConnector::new();
    let session = ReviewSession::open(gateway, connector.clone(), &ReviewConfig::default(), fast_reconnect());

    let view = session
        .wait_for(|v| {
            matches!(v.load(), LoadState::Failed(_)) && matches!(v.stream(), StreamState::Disconnected(_))
        })
        .await
        .unwrap();

    assert_eq!(view.load(), &LoadState::Failed("not authenticated".into()));
    assert_eq!(connector.attempts(), 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn approve_removes_entry_immediately() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.9), ("E2", 0.8)]);
    transport.on_json(Method::Post, endpoints::REVIEW_APPROVE, 200, json!({"status": "success"}));
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;
    ready_and_live(&session).await;

    session.dispatcher().approve(&"E1".into(), "").await.unwrap();

    assert_eq!(pending_ids(&session.view()), ["E2"]);
    assert_eq!(
        transport.calls_to(endpoints::REVIEW_APPROVE)[0].body,
        Some(json!({"employee_id": "E1", "notes": ""}))
    );
    assert_eq!(
        transport.calls_to(endpoints::REVIEW_APPROVE)[0].bearer.as_deref(),
        Some("access-1")
    );

    // The server's own notification arrives later and changes nothing
    let revision = session.view().revision();
    stream.send(updated_event("E1"));
    let view = session.wait_for(|v| v.revision() > revision).await.unwrap();
    assert_eq!(pending_ids(&view), ["E2"]);
}

#[tokio::test]
async fn failed_reject_leaves_view_unchanged() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.9)]);
    transport.on_json(Method::Post, endpoints::REVIEW_REJECT, 404, json!({"error": "No pending record"}));
    let (session, _connector, mut connections) = open(&transport);
    let _stream = connections.next().await;
    ready_and_live(&session).await;
    let before = session.view().revision();

    let result = session.dispatcher().reject(&"E1".into(), "blurry photo").await;

    assert!(matches!(result, Err(ClientError::Server { status: 404, .. })));
    assert_eq!(session.view().revision(), before);
    assert_eq!(pending_ids(&session.view()), ["E1"]);
    assert_eq!(transport.count(endpoints::REVIEW_REJECT), 1);
}

#[tokio::test]
async fn batch_approve_removes_all_and_clears_selection() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.9), ("E2", 0.8), ("E3", 0.7)]);
    transport.on_json(
        Method::Post,
        endpoints::REVIEW_BATCH_APPROVE,
        200,
        json!({
            "status": "success",
            "approved_count": 1,
            "approved_employee_ids": ["E1"],
            "skipped_employee_ids": ["E2"]
        }),
    );
    let (session, _connector, mut connections) = open(&transport);
    let _stream = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();

    let dispatcher = session.dispatcher();
    assert!(dispatcher.toggle(&"E2".into()));
    assert!(dispatcher.toggle(&"E1".into()));
    assert!(dispatcher.toggle(&"E3".into()));
    assert!(!dispatcher.toggle(&"E3".into()));
    assert_eq!(dispatcher.selected(), vec![EmployeeId::new("E1"), EmployeeId::new("E2")]);

    let report = dispatcher.batch_approve_selected().await.unwrap();

    assert_eq!(report.approved, vec![EmployeeId::new("E1")]);
    assert_eq!(report.skipped, vec![EmployeeId::new("E2")]);
    assert_eq!(pending_ids(&session.view()), ["E3"]);
    assert!(dispatcher.selected().is_empty());
    assert_eq!(
        transport.calls_to(endpoints::REVIEW_BATCH_APPROVE)[0].body,
        Some(json!({"ids": ["E1", "E2"]}))
    );
}

#[tokio::test]
async fn empty_batch_sends_nothing() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[]);
    let (session, _connector, _connections) = open(&transport);

    let report = session.dispatcher().batch_approve_selected().await.unwrap();

    assert!(report.approved.is_empty());
    assert_eq!(transport.count(endpoints::REVIEW_BATCH_APPROVE), 0);
}

#[tokio::test]
async fn close_tears_down_stream() {
    let transport = ScriptedTransport::new();
    serve_snapshot(&transport, &[("E1", 0.9)]);
    let (session, _connector, mut connections) = open(&transport);
    let stream = connections.next().await;
    session.wait_for(ReviewView::is_ready).await.unwrap();
    let mut views = session.subscribe();
    let dispatcher = session.dispatcher();

    session.close().await;

    assert_eq!(views.borrow_and_update().load(), &LoadState::Closed);
    eventually(|| !stream.is_open()).await;

    // Late confirmations are discarded without error
    transport.on_json(Method::Post, endpoints::REVIEW_APPROVE, 200, json!({"status": "success"}));
    dispatcher.approve(&"E1".into(), "").await.unwrap();
}

#[tokio::test]
async fn detached_dispatcher_only_reaches_server() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Post, endpoints::REVIEW_REJECT, 200, json!({"status": "success"}));
    let dispatcher = ActionDispatcher::detached(signed_in_gateway(transport.clone(), "access", "refresh"));

    dispatcher.reject(&"E4".into(), "blurry photo").await.unwrap();

    let calls = transport.calls_to(endpoints::REVIEW_REJECT);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body, Some(json!({"employee_id": "E4", "notes": "blurry photo"})));
}
