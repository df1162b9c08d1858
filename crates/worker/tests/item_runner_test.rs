use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    AgentDescriptor, AgentKind, ErrorCategory, InvocationConstraints, ItemOutcome, JobStatus,
    LogLevel, ProgressTracker, RetryPolicy, WorkItemStatus,
};
use orchestrator_errors::{CallFailureKind, FileAccessFailureKind};
use orchestrator_testing_utils::{
    AnalysisOutputBuilder, JobBuilder, MockFileAccess, RetryPolicyBuilder, ScriptedAnalysisProvider,
    ScriptedResponse, TestEnv,
};
use orchestrator_worker::{ItemRunner, RetryExecutor};
use tokio_util::sync::CancellationToken;

const FILE: &str = "src/lib.rs";

struct Fixture {
    tracker: Arc<ProgressTracker>,
    runner: Arc<ItemRunner>,
    provider: ScriptedAnalysisProvider,
    files: MockFileAccess,
}

fn fixture(
    provider: ScriptedAnalysisProvider,
    files: MockFileAccess,
    policy: RetryPolicy,
    timeout: Duration,
) -> Fixture {
    let job = JobBuilder::new()
        .with_files(&[FILE])
        .with_agents(&["security"])
        .build();
    let tracker = Arc::new(ProgressTracker::new(job, policy.max_attempts));
    let executor = RetryExecutor::new(Arc::new(provider.clone()), policy, timeout);
    let runner = Arc::new(ItemRunner::new(Arc::new(files.clone()), executor));
    Fixture {
        tracker,
        runner,
        provider,
        files,
    }
}

fn default_files() -> MockFileAccess {
    MockFileAccess::new().with_file(FILE, "pub fn run() {}")
}

async fn run_single(fixture: &Fixture, agent: &AgentDescriptor) -> WorkItemStatus {
    let token = CancellationToken::new();
    let item = fixture.tracker.admit_next(&token).unwrap();
    fixture
        .runner
        .run(&fixture.tracker, &item, agent, &token)
        .await
        .unwrap();
    fixture.tracker.job().items[0].status
}

#[tokio::test(start_paused = true)]
async fn test_timeout_twice_then_success() {
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![
            ScriptedResponse::Hang,
            ScriptedResponse::Hang,
            ScriptedResponse::Valid,
        ],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new().with_max_attempts(3).build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Succeeded);
    let job = f.tracker.job();
    assert_eq!(job.items[0].attempt_count, 3);
    assert!(job.items[0].result.is_some());
    assert_eq!(f.provider.calls_for(FILE, "security"), 3);
    assert_eq!(f.tracker.status(), JobStatus::Completed);

    let retries = f
        .tracker
        .logs_since(0)
        .into_iter()
        .filter(|entry| entry.message.contains("transient/timeout"))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_attempts() {
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![ScriptedResponse::Fail(CallFailureKind::Network); 5],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new().with_max_attempts(3).build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Failed);
    let job = f.tracker.job();
    let item = &job.items[0];
    assert_eq!(item.attempt_count, 3);
    assert_eq!(
        item.last_error.as_ref().unwrap().category,
        ErrorCategory::TransientCall
    );
    assert_eq!(f.tracker.status(), JobStatus::CompletedWithErrors);
}

#[tokio::test]
async fn test_permanent_failure_stops_immediately() {
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![ScriptedResponse::Fail(CallFailureKind::Auth)],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new().with_max_attempts(5).build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Failed);
    assert_eq!(f.tracker.job().items[0].attempt_count, 1);
    assert_eq!(f.provider.calls_for(FILE, "security"), 1);
    assert!(f
        .tracker
        .logs_since(0)
        .iter()
        .any(|entry| entry.level == LogLevel::Error && entry.message.contains("permanent/auth")));
}

#[tokio::test]
async fn test_missing_field_gets_one_extra_attempt() {
    let invalid = AnalysisOutputBuilder::new(AgentKind::Security)
        .without("risk_level")
        .build();
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![
            ScriptedResponse::Output(invalid.clone()),
            ScriptedResponse::Output(invalid),
            ScriptedResponse::Valid,
        ],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new()
            .with_max_attempts(3)
            .with_schema_retries(1)
            .build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Failed);
    assert_eq!(f.tracker.job().items[0].attempt_count, 2);
    match &f.tracker.results()[0].outcome {
        ItemOutcome::Failed { error } => {
            assert_eq!(error.category, ErrorCategory::Schema);
            assert!(error.message.contains("risk_level"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_schema_failure_recovers_on_retry() {
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![
            ScriptedResponse::Output("I could not produce JSON".to_string()),
            ScriptedResponse::Output(
                AnalysisOutputBuilder::new(AgentKind::Security)
                    .fenced()
                    .build(),
            ),
        ],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new().build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Succeeded);
    assert_eq!(f.tracker.job().items[0].attempt_count, 2);
}

#[tokio::test]
async fn test_file_access_failure_skips_analysis() {
    let provider = ScriptedAnalysisProvider::new();
    let files = MockFileAccess::new().with_failure(FILE, FileAccessFailureKind::PathEscapesRoot);
    let f = fixture(
        provider,
        files,
        RetryPolicyBuilder::new().build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Failed);
    assert_eq!(f.files.reads(), 1);
    assert_eq!(f.provider.total_calls(), 0);
    let job = f.tracker.job();
    let item = &job.items[0];
    assert_eq!(item.attempt_count, 0);
    assert_eq!(
        item.last_error.as_ref().unwrap().category,
        ErrorCategory::FileAccess
    );
}

#[tokio::test]
async fn test_content_over_agent_limit_is_too_large() {
    let agent = AgentDescriptor::builtin(AgentKind::Security).with_constraints(
        InvocationConstraints {
            max_input_bytes: 4,
            timeout: None,
        },
    );
    let f = fixture(
        ScriptedAnalysisProvider::new(),
        default_files(),
        RetryPolicyBuilder::new().build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &agent).await;

    assert_eq!(status, WorkItemStatus::Failed);
    assert_eq!(f.provider.total_calls(), 0);
    let error = f.tracker.job().items[0].last_error.clone().unwrap();
    assert!(error.message.contains("too_large"));
}

#[tokio::test]
async fn test_non_utf8_content_is_unreadable() {
    let files = MockFileAccess::new().with_bytes(FILE, &[0x66, 0x6e, 0x20, 0xff, 0xfe, 0x00]);
    let f = fixture(
        ScriptedAnalysisProvider::new(),
        files,
        RetryPolicyBuilder::new().build(),
        Duration::from_secs(30),
    );

    let status = run_single(&f, &AgentDescriptor::builtin(AgentKind::Security)).await;

    assert_eq!(status, WorkItemStatus::Failed);
    assert_eq!(f.provider.total_calls(), 0);
    let job = f.tracker.job();
    let item = &job.items[0];
    assert_eq!(item.attempt_count, 0);
    let error = item.last_error.clone().unwrap();
    assert_eq!(error.category, ErrorCategory::FileAccess);
    assert!(error.message.contains("unreadable"));
}

#[tokio::test]
async fn test_cancel_during_backoff_wakes_and_cancels() {
    let provider = ScriptedAnalysisProvider::new();
    provider.script(
        FILE,
        "security",
        vec![ScriptedResponse::Fail(CallFailureKind::RateLimit)],
    );
    let f = fixture(
        provider,
        default_files(),
        RetryPolicyBuilder::new()
            .with_base_delay(Duration::from_secs(60))
            .build(),
        Duration::from_secs(30),
    );
    let token = CancellationToken::new();
    let item = f.tracker.admit_next(&token).unwrap();

    let handle = {
        let tracker = f.tracker.clone();
        let runner = f.runner.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let agent = AgentDescriptor::builtin(AgentKind::Security);
            runner.run(&tracker, &item, &agent, &token).await
        })
    };

    let tracker = f.tracker.clone();
    let retrying = TestEnv::wait_for(
        || {
            let status = tracker.job().items[0].status;
            async move { status == WorkItemStatus::Retrying }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(retrying);

    tracker.cancel_pending();
    token.cancel();
    let transition = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("backoff should wake on cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(transition.job_finished, Some(JobStatus::Cancelled));
    let job = tracker.job();
    let item = &job.items[0];
    assert_eq!(item.status, WorkItemStatus::Cancelled);
    assert_eq!(item.attempt_count, 1);
    assert_eq!(f.provider.calls_for(FILE, "security"), 1);
}
