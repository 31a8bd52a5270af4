mod common;

use anyhow::Result;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use splitwise::server::router;
use tower::ServiceExt;

use common::{seed_shared_expenses, test_service};

async fn send(app: &axum::Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_ready_and_greeting() -> Result<()> {
    let (service, temp) = test_service().await?;
    let app = router(service);

    let (status, body) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, get("/ready")).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/greeting")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    std::fs::remove_dir_all(temp.path())?;
    let (status, body) = send(&app, get("/ready")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_create_expense_over_http() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let app = router(service.clone());

    let (status, created) = send(
        &app,
        post_json(
            "/expenses",
            json!({
                "description": "Dinner",
                "amount": 100,
                "payer": "A",
                "participants": ["A", "B", "C"],
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["splits"][0]["owed_amount"], 34);

    let id = created["id"].as_str().unwrap_or_default().to_string();
    let (status, fetched) = send(&app, get(&format!("/expenses/{}", id))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["description"], "Dinner");

    let (status, listed) = send(&app, get("/expenses?participant=B")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));

    assert_eq!(service.snapshot().await?.version, 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_are_client_errors() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let app = router(service.clone());

    let (status, body) = send(
        &app,
        post_json(
            "/expenses",
            json!({
                "description": "Bad",
                "amount": 100,
                "payer": "A",
                "splits": [{"participant": "A", "owed_amount": 60}],
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        post_json(
            "/expenses",
            json!({"description": "Both", "amount": 100, "payer": "A"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json("/payments", json!({"from": "A", "to": "A", "amount": 10})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        get("/expenses/00000000-0000-4000-8000-000000000000"),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(service.snapshot().await?.version, 0);

    Ok(())
}

#[tokio::test]
async fn test_balances_and_settlements_over_http() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed_shared_expenses(&service).await?;
    let app = router(service);

    let (status, balances) = send(&app, get("/balances")).await?;
    assert_eq!(status, StatusCode::OK);
    let nets: Vec<(String, i64)> = balances
        .as_array()
        .into_iter()
        .flatten()
        .map(|b| {
            (
                b["participant"].as_str().unwrap_or_default().to_string(),
                b["net"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        nets,
        vec![
            ("A".to_string(), 4000),
            ("B".to_string(), 1000),
            ("C".to_string(), -5000)
        ]
    );

    let (status, plan) = send(&app, get("/settlements")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan.as_array().map(|p| p.len()), Some(2));

    let (status, payment) = send(
        &app,
        post_json("/payments", json!({"from": "C", "to": "A", "amount": 4000})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["payer"], "C");

    let (_, plan) = send(&app, get("/settlements")).await?;
    assert_eq!(
        plan,
        json!([{"from": "C", "to": "B", "amount": 1000}])
    );

    Ok(())
}

#[tokio::test]
async fn test_busy_ledger_is_service_unavailable() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let config = common::test_config(&temp)
        .with_lock_timeout(std::time::Duration::from_millis(50))
        .with_max_attempts(2);
    let service = splitwise::application::LedgerService::open(&config).await?;
    common::hold_foreign_lease(&service)?;
    let app = router(service.clone());

    let (status, body) = send(
        &app,
        post_json(
            "/expenses",
            json!({
                "description": "Dinner",
                "amount": 100,
                "payer": "A",
                "participants": ["A", "B"],
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("2 attempts")));

    // Liveness and readiness do not wait on the lease.
    let (status, _) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/ready")).await?;
    assert_eq!(status, StatusCode::OK);

    assert!(!service.store().data_path().exists());

    Ok(())
}
