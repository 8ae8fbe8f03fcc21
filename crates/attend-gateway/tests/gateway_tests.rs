//! Gateway behaviour against a scripted server

use attend_gateway::{endpoints, ApiRequest, ApiResponse, AuthApi, AuthMode, EmployeeApi, Method};
use attend_session::{ClientError, Session, SessionStore};
use attend_test_utils::{
    eventually, expired_jwt, gateway_with_session, live_jwt, signed_in_gateway, signed_out_gateway,
    ScriptedTransport,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, OnceLock};

#[tokio::test]
async fn concurrent_401s_share_one_renewal() {
    let transport = ScriptedTransport::new();
    transport.on_bearer(Method::Get, endpoints::REVIEW_PENDING, "fresh", json!([]));
    transport.on_json(Method::Post, endpoints::TOKEN_REFRESH, 200, json!({"access": "fresh"}));
    let pending_gate = transport.gate(Method::Get, endpoints::REVIEW_PENDING);
    let refresh_gate = transport.gate(Method::Post, endpoints::TOKEN_REFRESH);
    let gateway = signed_in_gateway(transport.clone(), "stale", "refresh-1");

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .get_json::<Vec<JsonValue>>(endpoints::REVIEW_PENDING)
                    .await
            })
        })
        .collect();

    // Every first send is on the wire before any 401 comes back
    eventually(|| transport.count(endpoints::REVIEW_PENDING) == 8).await;
    pending_gate.add_permits(16);
    eventually(|| gateway.coordinator().is_refreshing()).await;
    refresh_gate.add_permits(1);

    for caller in futures::future::join_all(callers).await {
        assert!(caller.unwrap().unwrap().is_empty());
    }

    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 1);
    assert_eq!(gateway.coordinator().renewal_count(), 1);
    let retries: Vec<_> = transport
        .calls_to(endpoints::REVIEW_PENDING)
        .into_iter()
        .filter(|c| c.bearer.as_deref() == Some("fresh"))
        .collect();
    assert_eq!(retries.len(), 8);
    assert_eq!(
        transport.calls_to(endpoints::TOKEN_REFRESH)[0].body,
        Some(json!({"refresh": "refresh-1"}))
    );
    assert_eq!(gateway.store().get().unwrap().access_token(), "fresh");
}

#[tokio::test]
async fn callers_arriving_mid_renewal_wait_for_it() {
    let renewed = live_jwt("admin");
    let transport = ScriptedTransport::new();
    transport.on_bearer(Method::Get, endpoints::REVIEW_PENDING, renewed.clone(), json!([]));
    transport.on_json(Method::Post, endpoints::TOKEN_REFRESH, 200, json!({"access": renewed}));
    let refresh_gate = transport.gate(Method::Post, endpoints::TOKEN_REFRESH);
    let gateway = gateway_with_session(transport.clone(), Session::new(expired_jwt("admin"), "refresh-1"));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .get_json::<Vec<JsonValue>>(endpoints::REVIEW_PENDING)
                    .await
            })
        })
        .collect();

    // One caller renews, the other seven park before sending anything
    eventually(|| gateway.coordinator().waiting() == 7).await;
    assert_eq!(transport.count(endpoints::REVIEW_PENDING), 0);
    refresh_gate.add_permits(1);

    for caller in futures::future::join_all(callers).await {
        assert!(caller.unwrap().unwrap().is_empty());
    }
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 1);
    let sends = transport.calls_to(endpoints::REVIEW_PENDING);
    assert_eq!(sends.len(), 8);
    assert!(sends.iter().all(|c| c.bearer.as_deref() == Some(renewed.as_str())));
}

#[tokio::test]
async fn second_401_ends_session_without_second_renewal() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Get, endpoints::REVIEW_PENDING, 401, json!({"detail": "nope"}));
    transport.on_json(Method::Post, endpoints::TOKEN_REFRESH, 200, json!({"access": "fresh"}));
    let gateway = signed_in_gateway(transport.clone(), "stale", "refresh-1");

    let result = gateway
        .get_json::<Vec<JsonValue>>(endpoints::REVIEW_PENDING)
        .await;

    assert_eq!(result, Err(ClientError::SessionExpired));
    assert_eq!(transport.count(endpoints::REVIEW_PENDING), 2);
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 1);
    assert!(!gateway.store().is_authenticated());
}

#[tokio::test]
async fn rejected_refresh_token_fails_every_caller() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Get, endpoints::REVIEW_PENDING, 401, json!({}));
    transport.on_json(Method::Post, endpoints::TOKEN_REFRESH, 401, json!({"detail": "blacklisted"}));
    let pending_gate = transport.gate(Method::Get, endpoints::REVIEW_PENDING);
    let gateway = signed_in_gateway(transport.clone(), "stale", "revoked");

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.send(&ApiRequest::get(endpoints::REVIEW_PENDING)).await })
        })
        .collect();
    eventually(|| transport.count(endpoints::REVIEW_PENDING) == 3).await;
    pending_gate.add_permits(3);

    for caller in futures::future::join_all(callers).await {
        let error = caller.unwrap().unwrap_err();
        assert!(error.requires_reauthentication(), "{error:?}");
    }
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 1);
    assert!(!gateway.store().is_authenticated());

    // Nothing left to send with
    let after = gateway.send(&ApiRequest::get(endpoints::REVIEW_PENDING)).await;
    assert_eq!(after, Err(ClientError::Unauthenticated));
    assert_eq!(transport.count(endpoints::REVIEW_PENDING), 3);
}

#[tokio::test]
async fn expired_access_renewed_before_sending() {
    let renewed = live_jwt("admin");
    let transport = ScriptedTransport::new();
    transport.on_bearer(Method::Get, endpoints::REVIEW_PENDING, renewed.clone(), json!([]));
    transport.on_json(
        Method::Post,
        endpoints::TOKEN_REFRESH,
        200,
        json!({"access": renewed, "refresh": "refresh-2"}),
    );
    let gateway = gateway_with_session(transport.clone(), Session::new(expired_jwt("admin"), "refresh-1"));

    let pending: Vec<JsonValue> = gateway.get_json(endpoints::REVIEW_PENDING).await.unwrap();

    assert!(pending.is_empty());
    assert_eq!(transport.count(endpoints::REVIEW_PENDING), 1);
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 1);
    let session = gateway.store().get().unwrap();
    assert_eq!(session.access_token(), renewed);
    assert_eq!(session.refresh_token(), "refresh-2");
}

#[tokio::test]
async fn login_during_final_retry_survives_expiry() {
    let store_slot: Arc<OnceLock<Arc<SessionStore>>> = Arc::new(OnceLock::new());
    let transport = ScriptedTransport::new();
    let slot = store_slot.clone();
    transport.on(Method::Get, endpoints::REVIEW_PENDING, move |call| {
        if call.bearer.as_deref() == Some("fresh") {
            // The user signs in again while the retry is on the wire
            if let Some(store) = slot.get() {
                store.set(Session::new("relogin", "refresh-2"));
            }
        }
        Ok(ApiResponse::new(401, "{}"))
    });
    transport.on_json(Method::Post, endpoints::TOKEN_REFRESH, 200, json!({"access": "fresh"}));
    let gateway = signed_in_gateway(transport.clone(), "stale", "refresh-1");
    let _ = store_slot.set(gateway.store().clone());

    let result = gateway.send(&ApiRequest::get(endpoints::REVIEW_PENDING)).await;

    assert_eq!(result, Err(ClientError::SessionExpired));
    assert_eq!(gateway.store().get().unwrap().access_token(), "relogin");
}

#[tokio::test]
async fn required_auth_without_session_fails_fast() {
    let transport = ScriptedTransport::new();
    let gateway = signed_out_gateway(transport.clone());

    let result = gateway.send(&ApiRequest::get(endpoints::REVIEW_PENDING)).await;

    assert_eq!(result, Err(ClientError::Unauthenticated));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn optional_auth_without_session_sends_anonymously() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Get, endpoints::ATTENDANCE_TODAY, 401, json!({}));
    let gateway = signed_out_gateway(transport.clone());

    let request = ApiRequest::get(endpoints::ATTENDANCE_TODAY).with_auth(AuthMode::Optional);
    let response = gateway.send(&request).await.unwrap();

    // Unauthenticated 401 is handed back, not renewed
    assert_eq!(response.status(), 401);
    assert_eq!(transport.calls()[0].bearer, None);
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 0);
}

#[tokio::test]
async fn business_errors_pass_through() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Post, endpoints::REVIEW_APPROVE, 404, json!({"error": "No pending record"}));
    let gateway = signed_in_gateway(transport.clone(), "access", "refresh");

    let request = ApiRequest::post(endpoints::REVIEW_APPROVE, json!({"employee_id": "E9", "notes": ""}));
    let response = gateway.send(&request).await.unwrap();
    assert_eq!(response.status(), 404);

    let typed = gateway
        .post_json::<_, JsonValue>(endpoints::REVIEW_APPROVE, &json!({"employee_id": "E9"}))
        .await;
    assert!(matches!(typed, Err(ClientError::Server { status: 404, .. })));
    assert!(gateway.store().is_authenticated());
}

#[tokio::test]
async fn login_stores_session_and_logout_clears_it() {
    let transport = ScriptedTransport::new();
    transport.on_json(
        Method::Post,
        endpoints::LOGIN,
        200,
        json!({
            "access": "access-1",
            "refresh": "refresh-1",
            "username": "admin",
            "employee_id": "E0",
            "department": "Ops",
            "designation": "Lead",
            "is_admin": true
        }),
    );
    let gateway = signed_out_gateway(transport.clone());
    let auth = AuthApi::new(gateway.clone());

    let profile = auth.login("admin", "secret").await.unwrap();

    assert!(profile.is_admin);
    assert_eq!(profile.employee_id.as_deref(), Some("E0"));
    assert_eq!(gateway.store().get().unwrap().access_token(), "access-1");
    let calls = transport.calls();
    let call = &calls[0];
    assert_eq!(call.bearer, None);
    assert_eq!(call.body, Some(json!({"username": "admin", "password": "secret"})));

    auth.logout();
    assert!(!gateway.store().is_authenticated());
}

#[tokio::test]
async fn failed_login_leaves_no_session() {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Post, endpoints::LOGIN, 401, json!({"error": "Invalid credentials"}));
    let gateway = signed_out_gateway(transport.clone());

    let result = AuthApi::new(gateway.clone()).login("admin", "wrong").await;

    assert!(matches!(result, Err(ClientError::Server { status: 401, .. })));
    assert!(!gateway.store().is_authenticated());
    assert_eq!(transport.count(endpoints::TOKEN_REFRESH), 0);
}

#[tokio::test]
async fn employee_endpoints_decode() {
    let transport = ScriptedTransport::new();
    transport.on_json(
        Method::Get,
        endpoints::ATTENDANCE_HISTORY,
        200,
        json!([
            {"id": 2, "check_in_time": "2024-03-02T09:00:00Z", "status": "pending", "confidence_score": 0.81},
            {"id": 1, "check_in_time": "2024-03-01T09:00:00Z", "check_out_time": "2024-03-01T17:00:00Z", "status": "approved"}
        ]),
    );
    transport.on_json(
        Method::Post,
        endpoints::ATTENDANCE_CHECKOUT,
        200,
        json!({"status": "success", "message": "Checked out", "check_out_time": "2024-03-02T17:30:00Z"}),
    );
    let gateway = signed_in_gateway(transport.clone(), "access", "refresh");
    let employee = EmployeeApi::new(gateway);

    let history = employee.attendance_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, "pending");
    assert!(history[1].check_out_time.is_some());

    let receipt = employee.check_out().await.unwrap();
    assert_eq!(receipt.status, "success");
    assert_eq!(transport.calls_to(endpoints::ATTENDANCE_CHECKOUT)[0].body, Some(json!({})));
}
