//! End-to-end dispatch scenarios against mock upstreams
//!
//! Covers the happy path, transient failover, rate-limited skips,
//! exhaustion, credential invalidation, deadlines and cancellation.

use crate::common::{
    analyze_payload, frozen_router, mount_ok, mount_status, router, seed, CHAT_PATH,
};
use inference_router::core::types::{
    DispatchContext, DispatchRequest, ErrorKind, FailoverReason, ProviderStatus,
};
use inference_router::core::Clock;
use inference_router::RouterError;
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn happy_path_uses_highest_priority_provider() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "choices": [] }))
                .set_delay(Duration::from_millis(30)),
        )
        .expect(1)
        .mount(&upstream_a)
        .await;
    mount_ok(&upstream_b, "should not be called").await;

    let harness = router(vec![seed("alpha", &upstream_a, 1), seed("beta", &upstream_b, 2)]).await;

    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "alpha");
    assert!(response.latency_ms >= 30);

    let snapshots = harness.router.list_providers();
    let alpha = snapshots.iter().find(|s| s.name == "alpha").unwrap();
    let beta = snapshots.iter().find(|s| s.name == "beta").unwrap();
    assert_eq!(alpha.success_count, 1);
    assert_eq!(alpha.error_count, 0);
    assert!(alpha.total_latency_ms >= 30);
    assert_eq!(beta.success_count, 0);

    assert!(harness.router.failover_history(None).is_empty());

    harness.router.shutdown().await;
}

#[tokio::test]
async fn transient_failure_fails_over_and_cools_down() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    mount_status(&upstream_a, 503).await;
    mount_ok(&upstream_b, "from beta").await;

    let seeds = vec![seed("alpha", &upstream_a, 1), seed("beta", &upstream_b, 2)];
    let (harness, clock) = frozen_router(seeds).await;

    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "beta");

    let snapshots = harness.router.list_providers();
    let alpha = snapshots.iter().find(|s| s.name == "alpha").unwrap();
    assert_eq!(alpha.error_count, 1);
    assert_eq!(alpha.status, ProviderStatus::Cooling);
    // First strike: cooldown is exactly base (30s) from the frozen now.
    assert_eq!(
        alpha.cooldown_until.unwrap(),
        clock.now() + ChronoDuration::seconds(30)
    );

    let history = harness.router.failover_history(None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_provider, "alpha");
    assert_eq!(history[0].to_provider, "beta");
    assert_eq!(history[0].reason, FailoverReason::HealthCheckFailure);
    assert!(history[0].is_automatic);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn rate_limited_provider_is_skipped_without_error_count() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    // Alpha serves exactly its five in-window requests and nothing more.
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .expect(5)
        .mount(&upstream_a)
        .await;
    mount_ok(&upstream_b, "from beta").await;

    let mut alpha_seed = seed("alpha", &upstream_a, 1);
    alpha_seed.rate_limit_rpm = 5;
    let (harness, _clock) = frozen_router(vec![alpha_seed, seed("beta", &upstream_b, 2)]).await;

    for _ in 0..5 {
        let response = harness.router.analyze(analyze_payload()).await.unwrap();
        assert_eq!(response.provider_used, "alpha");
    }

    // Sixth request: alpha denied locally, beta serves.
    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "beta");

    let snapshots = harness.router.list_providers();
    let alpha = snapshots.iter().find(|s| s.name == "alpha").unwrap();
    assert_eq!(alpha.error_count, 0);
    assert_eq!(alpha.success_count, 5);
    assert!(alpha.at_rate_limit);

    let history = harness.router.failover_history(None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, FailoverReason::RateLimited);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn all_candidates_failing_exhausts_with_one_transition_row() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    mount_status(&upstream_a, 500).await;
    mount_status(&upstream_b, 500).await;

    let seeds = vec![seed("alpha", &upstream_a, 1), seed("beta", &upstream_b, 2)];
    let (harness, _clock) = frozen_router(seeds).await;

    let err = harness.router.analyze(analyze_payload()).await.unwrap_err();
    match &err {
        RouterError::AllProvidersExhausted { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].provider, "alpha");
            assert_eq!(attempts[0].kind, ErrorKind::ServerError);
            assert_eq!(attempts[1].provider, "beta");
        }
        other => panic!("expected AllProvidersExhausted, got {:?}", other),
    }

    for name in ["alpha", "beta"] {
        let snap = harness.router.list_providers();
        let provider = snap.iter().find(|s| s.name == name).unwrap();
        assert_eq!(provider.error_count, 1);
        assert_eq!(provider.status, ProviderStatus::Cooling);
    }

    // Two candidates, both failed: exactly one transition row.
    let history = harness.router.failover_history(None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_provider, "alpha");
    assert_eq!(history[0].to_provider, "beta");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn exhaustion_totality_three_candidates_two_rows() {
    let mut upstreams = Vec::new();
    let mut seeds = Vec::new();
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        let upstream = MockServer::start().await;
        mount_status(&upstream, 502).await;
        seeds.push(seed(name, &upstream, i as i32 + 1));
        upstreams.push(upstream);
    }
    let (harness, _clock) = frozen_router(seeds).await;

    let err = harness.router.analyze(analyze_payload()).await.unwrap_err();
    assert!(matches!(err, RouterError::AllProvidersExhausted { .. }));

    let history = harness.router.failover_history(None);
    assert_eq!(history.len(), 2);
    // Newest first: b->c then a->b.
    assert_eq!(history[0].from_provider, "b");
    assert_eq!(history[0].to_provider, "c");
    assert_eq!(history[1].from_provider, "a");
    assert_eq!(history[1].to_provider, "b");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn credential_rejection_invalidates_and_continues() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    mount_status(&upstream_a, 401).await;
    mount_ok(&upstream_b, "from beta").await;

    let seeds = vec![seed("alpha", &upstream_a, 1), seed("beta", &upstream_b, 2)];
    let (harness, _clock) = frozen_router(seeds).await;

    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "beta");

    let snapshots = harness.router.list_providers();
    let alpha = snapshots.iter().find(|s| s.name == "alpha").unwrap();
    assert!(!alpha.has_valid_key);
    assert_eq!(alpha.status, ProviderStatus::InvalidCredential);
    assert_eq!(alpha.error_count, 1);
    // Permanent failure: no cooldown.
    assert!(alpha.cooldown_until.is_none());

    // The invalidated provider is no longer selectable at all.
    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "beta");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn lone_provider_with_rejected_credential_exhausts() {
    let upstream_a = MockServer::start().await;
    mount_status(&upstream_a, 401).await;

    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;

    let err = harness.router.analyze(analyze_payload()).await.unwrap_err();
    match err {
        RouterError::AllProvidersExhausted { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].kind, ErrorKind::CredentialRejected);
        }
        other => panic!("expected AllProvidersExhausted, got {:?}", other),
    }

    harness.router.shutdown().await;
}

#[tokio::test]
async fn no_eligible_provider_fails_fast() {
    let upstream_a = MockServer::start().await;
    mount_ok(&upstream_a, "unused").await;

    let (harness, _clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;
    harness.router.toggle_provider("alpha", Some(false)).unwrap();

    let err = harness.router.analyze(analyze_payload()).await.unwrap_err();
    assert!(matches!(err, RouterError::NoProviderAvailable(_)));
    assert_eq!(err.code(), "no_provider_available");

    harness.router.shutdown().await;
}

#[tokio::test]
async fn elapsed_deadline_skips_remaining_candidates() {
    let upstream_a = MockServer::start().await;
    mount_ok(&upstream_a, "unused").await;

    let (harness, clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;

    let request = DispatchRequest::analyze(analyze_payload(), clock.now());
    let ctx = DispatchContext::with_deadline(clock.now() - ChronoDuration::seconds(1));

    let err = harness.router.dispatch(&request, &ctx).await.unwrap_err();
    match err {
        RouterError::DeadlineExceeded { attempts } => assert!(attempts.is_empty()),
        other => panic!("expected DeadlineExceeded, got {:?}", other),
    }

    // No attempt was dispatched and no failover was logged.
    assert!(harness.router.failover_history(None).is_empty());
    let alpha = &harness.router.list_providers()[0];
    assert_eq!(alpha.success_count + alpha.error_count, 0);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn cancellation_stops_at_boundary_without_failover_rows() {
    let upstream_a = MockServer::start().await;
    mount_ok(&upstream_a, "unused").await;

    let (harness, clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;

    let request = DispatchRequest::analyze(analyze_payload(), clock.now());
    let ctx = DispatchContext::default();
    ctx.cancel.cancel();

    let err = harness.router.dispatch(&request, &ctx).await.unwrap_err();
    assert!(matches!(err, RouterError::Cancelled));
    assert!(harness.router.failover_history(None).is_empty());

    harness.router.shutdown().await;
}

#[tokio::test]
async fn pinned_unknown_provider_is_no_provider_available() {
    let upstream_a = MockServer::start().await;
    mount_ok(&upstream_a, "unused").await;
    let (harness, clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;

    let mut request = DispatchRequest::analyze(analyze_payload(), clock.now());
    request.pinned_provider = Some("nonexistent".to_string());

    let err = harness
        .router
        .dispatch(&request, &DispatchContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NoProviderAvailable(_)));

    harness.router.shutdown().await;
}

#[tokio::test]
async fn malformed_payload_is_rejected_without_attempts() {
    let upstream_a = MockServer::start().await;
    mount_ok(&upstream_a, "unused").await;
    let (harness, clock) = frozen_router(vec![seed("alpha", &upstream_a, 1)]).await;

    let request = DispatchRequest::analyze(serde_json::json!("not an object"), clock.now());
    let err = harness
        .router
        .dispatch(&request, &DispatchContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest(_)));

    let alpha = &harness.router.list_providers()[0];
    assert_eq!(alpha.success_count + alpha.error_count, 0);

    harness.router.shutdown().await;
}

#[tokio::test]
async fn success_resets_cooldown_escalation() {
    // One provider that fails once, then succeeds: the strike counter
    // resets so a later failure cools down from the base again.
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .mount(&upstream)
        .await;

    let (harness, clock) = frozen_router(vec![seed("alpha", &upstream, 1)]).await;

    let err = harness.router.analyze(analyze_payload()).await.unwrap_err();
    assert!(matches!(err, RouterError::AllProvidersExhausted { .. }));

    // Wait out the 30s cooldown, then succeed.
    clock.advance(Duration::from_secs(31));
    let response = harness.router.analyze(analyze_payload()).await.unwrap();
    assert_eq!(response.provider_used, "alpha");

    let alpha = &harness.router.list_providers()[0];
    assert_eq!(alpha.success_count, 1);
    assert_eq!(alpha.error_count, 1);
    assert_eq!(alpha.status, ProviderStatus::Ready);

    harness.router.shutdown().await;
}
