//! Control-surface and operator-path scenarios
//!
//! Toggling, provider testing, reporting snapshots, failover history and
//! the state mirror.

use crate::common::{analyze_payload, frozen_router, mount_ok, mount_status, router, seed};
use inference_router::core::types::{ControlRequest, ProviderStatus};
use inference_router::RouterError;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn toggle_twice_restores_original_state() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "unused").await;
    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    let before = harness.router.list_providers()[0].enabled;
    let after_first = harness.router.toggle_provider("alpha", None).unwrap();
    let after_second = harness.router.toggle_provider("alpha", None).unwrap();

    assert_eq!(after_first, !before);
    assert_eq!(after_second, before);
    assert_eq!(harness.router.list_providers()[0].enabled, before);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn toggle_unknown_provider_errors() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "unused").await;
    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    let err = harness.router.toggle_provider("ghost", None).unwrap_err();
    assert!(matches!(err, RouterError::NoProviderAvailable(_)));

    harness.router.shutdown().await;
}

#[tokio::test]
async fn test_provider_reports_latency_and_counts_attempt() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "pong").await;
    let harness = router(vec![seed("alpha", &upstream, 1)]).await;

    let report = harness.router.test_provider("alpha").await.unwrap();
    assert!(report.ok);
    assert!(report.latency_ms.is_some());
    assert!(report.error.is_none());

    let alpha = &harness.router.list_providers()[0];
    assert_eq!(alpha.success_count, 1);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn successful_test_recovers_invalid_credential_provider() {
    let upstream = MockServer::start().await;
    // First call rejects the credential, later calls accept it.
    Mock::given(method("POST"))
        .and(path(crate::common::CHAT_PATH))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    mount_ok(&upstream, "pong").await;

    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    // Dispatch drives alpha into invalid_credential.
    let _ = harness.router.analyze(analyze_payload()).await;
    assert_eq!(
        harness.router.list_providers()[0].status,
        ProviderStatus::InvalidCredential
    );

    // A passing test restores it to ready.
    let report = harness.router.test_provider("alpha").await.unwrap();
    assert!(report.ok);
    let alpha = &harness.router.list_providers()[0];
    assert_eq!(alpha.status, ProviderStatus::Ready);
    assert!(alpha.has_valid_key);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn failing_test_reports_error() {
    let upstream = MockServer::start().await;
    mount_status(&upstream, 500).await;
    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    let report = harness.router.test_provider("alpha").await.unwrap();
    assert!(!report.ok);
    assert!(report.error.is_some());
    assert_eq!(
        harness.router.list_providers()[0].status,
        ProviderStatus::Cooling
    );

    harness.router.shutdown().await;
}

#[tokio::test]
async fn test_unknown_provider_errors() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "unused").await;
    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    let err = harness.router.test_provider("ghost").await.unwrap_err();
    assert!(matches!(err, RouterError::NoProviderAvailable(_)));

    harness.router.shutdown().await;
}

#[tokio::test]
async fn snapshots_expose_derived_reporting_fields() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    mount_ok(&upstream_a, "fast answer").await;
    mount_status(&upstream_b, 503).await;

    let mut beta = seed("beta", &upstream_b, 2);
    beta.rate_limit_rpm = 1;
    let harness = router(vec![seed("alpha", &upstream_a, 1), beta]).await;

    harness.router.analyze(analyze_payload()).await.unwrap();

    let snapshots = harness.router.list_providers();
    let alpha = snapshots.iter().find(|s| s.name == "alpha").unwrap();
    assert!(alpha.has_valid_key);
    assert!(!alpha.at_rate_limit);
    assert!(alpha.success_rate > 0.99);
    assert_eq!(alpha.minute_usage, 1);
    assert!(alpha.last_used_at.is_some());

    harness.router.shutdown().await;
}

#[tokio::test]
async fn manual_primary_switch_is_logged_once() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "unused").await;
    let (harness, _clock) = frozen_router(vec![
        seed("alpha", &upstream, 1),
        seed("beta", &upstream, 2),
    ])
    .await;

    // First designation has no previous primary: nothing to log.
    harness.router.set_primary("alpha").unwrap();
    assert!(harness.router.failover_history(None).is_empty());

    harness.router.set_primary("beta").unwrap();
    let history = harness.router.failover_history(None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_provider, "alpha");
    assert_eq!(history[0].to_provider, "beta");
    assert!(!history[0].is_automatic);

    let primaries: Vec<_> = harness
        .router
        .list_providers()
        .into_iter()
        .filter(|s| s.is_primary)
        .map(|s| s.name)
        .collect();
    assert_eq!(primaries, vec!["beta"]);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn history_limit_caps_results_newest_first() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "unused").await;
    let (harness, clock) = frozen_router(vec![
        seed("a", &upstream, 1),
        seed("b", &upstream, 2),
        seed("c", &upstream, 3),
    ])
    .await;

    harness.router.set_primary("a").unwrap();
    harness.router.set_primary("b").unwrap();
    clock.advance(Duration::from_secs(2));
    harness.router.set_primary("c").unwrap();

    let capped = harness.router.failover_history(Some(1));
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].to_provider, "c");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn control_messages_round_trip_through_handle() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "the trend is up").await;
    let harness = router(vec![seed("alpha", &upstream, 1)]).await;

    let providers = harness
        .router
        .handle(ControlRequest::ListProviders {})
        .await
        .unwrap();
    assert_eq!(providers[0]["name"], "alpha");
    // Credential references never leave the process.
    assert!(providers[0].get("credential_ref").is_none());

    let toggled = harness
        .router
        .handle(ControlRequest::ToggleProvider {
            name: "alpha".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(toggled["enabled"], false);
    harness.router.toggle_provider("alpha", Some(true)).unwrap();

    let dispatched = harness
        .router
        .handle(ControlRequest::Dispatch {
            action: inference_router::core::types::RequestAction::Analyze,
            payload: analyze_payload(),
        })
        .await
        .unwrap();
    assert_eq!(dispatched["provider_used"], "alpha");

    let history = harness
        .router
        .handle(ControlRequest::GetFailoverHistory { limit: None })
        .await
        .unwrap();
    assert!(history.as_array().unwrap().is_empty());

    harness.router.shutdown().await;
}

#[tokio::test]
async fn auth_header_is_injected_from_credential_store() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(crate::common::CHAT_PATH))
        .and(header("authorization", "Bearer sk-alpha"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let harness = router(vec![seed("alpha", &upstream, 1)]).await;
    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "alpha");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn counters_are_mirrored_to_the_state_store() {
    let upstream = MockServer::start().await;
    mount_ok(&upstream, "mirrored").await;
    let harness = router(vec![seed("alpha", &upstream, 1)]).await;

    harness.router.analyze(analyze_payload()).await.unwrap();

    // The mirror task coalesces updates on a one-second tick; poll past
    // at least two windows.
    let mut mirrored = None;
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let counters = harness.store.mirrored_counters();
        if let Some(snapshot) = counters.get("alpha") {
            if snapshot.success_count == 1 {
                mirrored = Some(snapshot.clone());
                break;
            }
        }
    }
    let mirrored = mirrored.expect("counters never mirrored");
    assert_eq!(mirrored.name, "alpha");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn failover_rows_are_mirrored_to_the_state_store() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    mount_status(&upstream_a, 503).await;
    mount_ok(&upstream_b, "from beta").await;

    let harness = router(vec![seed("alpha", &upstream_a, 1), seed("beta", &upstream_b, 2)]).await;
    harness.router.analyze(analyze_payload()).await.unwrap();

    let mut mirrored = Vec::new();
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        mirrored = harness.store.mirrored_failovers();
        if !mirrored.is_empty() {
            break;
        }
    }
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].from_provider, "alpha");

    harness.router.shutdown().await;
}
