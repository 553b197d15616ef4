//! End-to-end tests through the public API.
//!
//! These tests combine the classifier, the feedback machine, the retry
//! coordinator and the session timer the way an application would.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_feedback::config::{ConfigLoadError, OrchestratorConfig};
use async_feedback::error::classifier::{CONNECTION_TIMEOUT, SERVICE_UNAVAILABLE, SESSION_EXPIRED};
use async_feedback::error::ErrorCategory;
use async_feedback::feedback::{FeedbackConfig, FeedbackError, FeedbackStatus};
use async_feedback::presentation::StatusRenderer;
use async_feedback::retry::{RetryConfig, RetryDecision, RetryError, RetryPolicy};
use async_feedback::session::{HostAction, InputEvent, MemorySessionHost, SessionConfig};
use async_feedback::{Orchestrator, RunMessages};
use tokio_test::{assert_err, assert_ok};

fn orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig {
        feedback: FeedbackConfig::new().with_watchdog(Duration::from_secs(2)),
        retry: RetryConfig::new().with_attempt_timeout(Duration::from_secs(1)),
        session: SessionConfig::new().with_inactivity_window(Duration::from_secs(60)),
        ..OrchestratorConfig::default()
    })
}

// ============================================================================
// Feedback with classification
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_database_failure_never_reaches_the_view() {
    let orchestrator = orchestrator();
    let mut presenter = orchestrator.presenter();

    let result: Result<(), String> = orchestrator
        .run(
            || async {
                Err("PGRST116: relation \"public.wallets\" does not exist".to_string())
            },
            RunMessages::new(),
        )
        .await;
    assert_err!(&result);

    let snapshot = presenter.snapshot();
    assert_eq!(snapshot.status, FeedbackStatus::Error);
    assert_eq!(snapshot.message.as_deref(), Some(SERVICE_UNAVAILABLE));
    let json = assert_ok!(presenter.to_json());
    assert!(!json.contains("wallets"));

    // Error copy stays up for its display window, then reverts.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orchestrator.feedback().status(), FeedbackStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_business_rejection_is_a_warning() {
    let orchestrator = orchestrator();
    let failure = orchestrator.feedback().show_warning("insufficient_funds");

    assert_eq!(failure.category.severity(), async_feedback::error::Severity::Warning);
    assert_eq!(orchestrator.feedback().status(), FeedbackStatus::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_slow_success_keeps_result_and_raises_notice() {
    let orchestrator = orchestrator();
    let mut presenter = orchestrator.presenter();

    let result = orchestrator
        .run(
            || async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok::<_, String>("receipt-81")
            },
            RunMessages::new().with_success("Deposit registered"),
        )
        .await;

    assert_eq!(assert_ok!(result), "receipt-81");
    let snapshot = presenter.snapshot();
    assert_eq!(snapshot.status, FeedbackStatus::Idle);
    assert!(snapshot.connectivity_timeout);

    let line = StatusRenderer::new()
        .with_color(false)
        .with_width(200)
        .render(&snapshot);
    assert!(line.contains("connection slow"));
}

#[tokio::test(start_paused = true)]
async fn test_global_orchestrator_shares_process_wide_status() {
    let orchestrator = Orchestrator::global(OrchestratorConfig::default())
        .expect("global machine installed once");

    async_feedback::feedback::global().show_success("Profile saved");
    assert_eq!(orchestrator.feedback().status(), FeedbackStatus::Success);

    let _: Result<(), String> = orchestrator
        .run(|| async { Err("Session-expired".to_string()) }, RunMessages::new())
        .await;
    assert_eq!(
        async_feedback::feedback::global().state().message.as_deref(),
        Some(SESSION_EXPIRED)
    );

    assert!(matches!(
        Orchestrator::global(OrchestratorConfig::default()),
        Err(FeedbackError::AlreadyInitialized)
    ));
}

// ============================================================================
// Retry coordination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_abandon_returns_timeout_but_work_completes() {
    let orchestrator = orchestrator();
    let committed = Arc::new(AtomicUsize::new(0));

    let runner = orchestrator.clone();
    let counter = Arc::clone(&committed);
    let call = tokio::spawn(async move {
        runner
            .run_resilient(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                },
                RunMessages::new(),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    let presenter = orchestrator.presenter();
    let prompt = orchestrator.retry().pending_prompt().expect("prompt is shown");
    assert_eq!(prompt.attempt, 1);
    assert!(presenter.answer_prompt(RetryDecision::Abandon));

    let error = call.await.unwrap().unwrap_err();
    assert!(matches!(error, RetryError::Abandoned));
    let sanitized = error.sanitized(orchestrator.feedback().classifier());
    assert_eq!(sanitized.display_text, CONNECTION_TIMEOUT);
    assert!(matches!(sanitized.category, ErrorCategory::Timeout(_)));
    assert!(orchestrator.retry().pending_prompt().is_none());

    // The abandoned attempt still commits.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(committed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retries_exhaust_without_prompt() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        retry: RetryConfig::new()
            .with_attempt_timeout(Duration::from_millis(100))
            .with_policy(RetryPolicy::bounded(1)),
        ..OrchestratorConfig::default()
    });

    let runner = orchestrator.clone();
    let call = tokio::spawn(async move {
        runner
            .retry()
            .run_with_timeout(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, String>(())
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(101)).await;
    assert!(orchestrator.retry().retry());
    tokio::time::sleep(Duration::from_millis(101)).await;

    let error = call.await.unwrap().unwrap_err();
    assert!(matches!(error, RetryError::RetriesExhausted { attempts: 2 }));
    assert!(orchestrator.retry().pending_prompt().is_none());
}

// ============================================================================
// Session expiry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_expiry_is_independent_of_calls() {
    let orchestrator = orchestrator();
    let host = MemorySessionHost::new()
        .with_entry("access_token", "secret")
        .with_profile("member-3");
    let timer = orchestrator.session_timer(Arc::new(host.clone()));
    assert!(timer.start());

    // Background calls keep succeeding but never count as presence.
    for _ in 0..7 {
        let _: Result<(), String> = orchestrator.run(|| async { Ok(()) }, RunMessages::new()).await;
        timer.record_input(InputEvent::Background);
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    assert_eq!(timer.logout_count(), 1);
    assert!(!timer.is_active());
    assert_eq!(
        host.actions().last(),
        Some(&HostAction::Redirect("/auth".to_string()))
    );
    assert_eq!(host.entry_count(), 0);
}

// ============================================================================
// Configuration loading
// ============================================================================

#[test]
fn test_load_from_file_with_env_override() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(
        file,
        "[feedback]\nwatchdog_ms = 8000\n\n[retry]\nattempt_timeout_ms = 5000\n\n[session]\nlogin_route = \"/login\""
    )
    .expect("Failed to write config");

    let loaded = OrchestratorConfig::load(file.path()).expect("config loads");
    assert_eq!(loaded.feedback.watchdog, Duration::from_secs(8));
    assert_eq!(loaded.retry.attempt_timeout, Duration::from_secs(5));
    assert_eq!(loaded.session.login_route, "/login");
    assert_eq!(loaded.session.inactivity_window, Duration::from_secs(30 * 60));

    std::env::set_var("FEEDBACK__RETRY__ATTEMPT_TIMEOUT_MS", "30000");
    let overridden = OrchestratorConfig::load(file.path());
    std::env::remove_var("FEEDBACK__RETRY__ATTEMPT_TIMEOUT_MS");

    let overridden = overridden.expect("config loads with override");
    assert_eq!(overridden.retry.attempt_timeout, Duration::from_secs(30));
    assert_eq!(overridden.feedback.watchdog, Duration::from_secs(8));
}

#[test]
fn test_load_rejects_invalid_values() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(file, "[session]\ninactivity_window_ms = 0").expect("Failed to write config");

    let result = OrchestratorConfig::load(file.path());
    assert!(matches!(
        result,
        Err(ConfigLoadError::InvalidValue {
            field: "session.inactivity_window_ms",
            ..
        })
    ));
}
