use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    AgentRegistry, ItemOutcome, JobStatus, RetryPolicy, SnapshotStore, WorkItemStatus,
};
use orchestrator_dispatcher::{CancelAcknowledgement, JobController};
use orchestrator_errors::{CallFailureKind, FileAccessFailureKind, OrchestratorError};
use orchestrator_testing_utils::{
    MemorySnapshotStore, MockFileAccess, RetryPolicyBuilder, ScriptedAnalysisProvider,
    ScriptedResponse, TestEnv,
};
use orchestrator_worker::{ItemRunner, RetryExecutor};
use uuid::Uuid;

fn controller(
    provider: &ScriptedAnalysisProvider,
    files: MockFileAccess,
    policy: RetryPolicy,
    max_concurrency: usize,
    snapshots: Option<Arc<dyn SnapshotStore>>,
) -> JobController {
    let executor = RetryExecutor::new(Arc::new(provider.clone()), policy, Duration::from_secs(30));
    let runner = ItemRunner::new(Arc::new(files), executor);
    JobController::new(AgentRegistry::builtin(), runner, snapshots, max_concurrency)
}

fn files_named(names: &[String]) -> MockFileAccess {
    names
        .iter()
        .fold(MockFileAccess::new(), |files, name| files.with_file(name, "fn main() {}"))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    let reached = TestEnv::wait_for(|| {
        let ok = condition();
        async move { ok }
    }, Duration::from_secs(5))
    .await;
    assert!(reached, "condition not reached in time");
}

#[tokio::test]
async fn test_file_access_failure_yields_completed_with_errors() {
    let provider = ScriptedAnalysisProvider::new();
    let files = MockFileAccess::new()
        .with_file("good.rs", "fn ok() {}")
        .with_failure("missing.rs", FileAccessFailureKind::NotFound);
    let controller = controller(&provider, files, RetryPolicyBuilder::new().build(), 4, None);

    let job_id = controller
        .submit_job(
            strings(&["good.rs", "missing.rs"]),
            strings(&["security", "code_quality", "documentation"]),
        )
        .await
        .unwrap();
    let status = controller.wait_for_completion(job_id).await.unwrap();

    assert_eq!(status, JobStatus::CompletedWithErrors);
    let progress = controller.get_progress(job_id).await.unwrap();
    assert_eq!(progress.total, 6);
    assert_eq!(progress.succeeded, 3);
    assert_eq!(progress.failed, 3);
    assert_eq!(progress.percent_complete, 100.0);

    let results = controller.get_results(job_id).await.unwrap();
    let pairs: HashSet<(String, String)> = results
        .iter()
        .map(|r| (r.file_path.clone(), r.agent_key.clone()))
        .collect();
    assert_eq!(pairs.len(), 6);
    for result in &results {
        match (&result.file_path[..], &result.outcome) {
            ("good.rs", ItemOutcome::Succeeded { report }) => {
                assert_eq!(report.agent_key(), result.agent_key)
            }
            ("missing.rs", ItemOutcome::Failed { .. }) => assert_eq!(result.attempt_count, 0),
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!(provider.calls_for("missing.rs", "security"), 0);
}

/// 10 个工作项、并发 4：前 4 个调用阻塞在闸门上时取消作业，然后放行，
/// 在途调用返回 `response`
async fn cancel_with_four_in_flight(response: ScriptedResponse) -> (JobController, Uuid) {
    let names: Vec<String> = (0..10).map(|i| format!("file_{i}.rs")).collect();
    let provider = ScriptedAnalysisProvider::gated();
    for name in &names {
        provider.script(name, "security", vec![response.clone()]);
    }
    let controller = controller(
        &provider,
        files_named(&names),
        RetryPolicyBuilder::new().build(),
        4,
        None,
    );

    let job_id = controller
        .submit_job(names.clone(), strings(&["security"]))
        .await
        .unwrap();
    wait_until(|| provider.total_calls() == 4).await;

    let ack = controller.cancel_job(job_id).await.unwrap();
    assert_eq!(ack, CancelAcknowledgement::Requested { drained: 6 });
    let progress = controller.get_progress(job_id).await.unwrap();
    assert_eq!(progress.cancelled, 6);
    assert_eq!(progress.running, 4);

    provider.release(4);
    assert_eq!(
        controller.wait_for_completion(job_id).await.unwrap(),
        JobStatus::Cancelled
    );
    assert_eq!(provider.total_calls(), 4);
    for name in &names[..4] {
        assert_eq!(provider.calls_for(name, "security"), 1, "{name} was retried");
    }
    (controller, job_id)
}

async fn assert_all_cancelled(controller: &JobController, job_id: Uuid) {
    let progress = controller.get_progress(job_id).await.unwrap();
    assert_eq!(progress.cancelled, 10);
    assert_eq!(progress.succeeded, 0);
    assert_eq!(progress.failed, 0);
    assert_eq!(progress.percent_complete, 100.0);

    let results = controller.get_results(job_id).await.unwrap();
    assert!(results.iter().all(|r| r.outcome == ItemOutcome::Cancelled));
    assert_eq!(results.iter().filter(|r| r.attempt_count == 1).count(), 4);
}

#[tokio::test]
async fn test_cancel_with_transient_failures_in_flight() {
    let (controller, job_id) =
        cancel_with_four_in_flight(ScriptedResponse::Fail(CallFailureKind::Network)).await;
    assert_all_cancelled(&controller, job_id).await;
}

#[tokio::test]
async fn test_in_flight_success_becomes_cancelled() {
    let (controller, job_id) = cancel_with_four_in_flight(ScriptedResponse::Valid).await;
    assert_all_cancelled(&controller, job_id).await;

    let logs = controller.get_logs(job_id, 0).await.unwrap();
    assert_eq!(
        logs.iter()
            .filter(|e| e.message.contains("丢弃第 1 次尝试的成功结果"))
            .count(),
        4
    );
}

#[tokio::test]
async fn test_in_flight_permanent_failure_becomes_cancelled() {
    let (controller, job_id) =
        cancel_with_four_in_flight(ScriptedResponse::Fail(CallFailureKind::Auth)).await;
    assert_all_cancelled(&controller, job_id).await;
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let names = strings(&["a.rs", "b.rs", "c.rs"]);
    let provider = ScriptedAnalysisProvider::gated();
    let controller = controller(
        &provider,
        files_named(&names),
        RetryPolicyBuilder::new().build(),
        1,
        None,
    );
    let job_id = controller
        .submit_job(names, strings(&["security"]))
        .await
        .unwrap();
    wait_until(|| provider.total_calls() == 1).await;

    let first = controller.cancel_job(job_id).await.unwrap();
    let second = controller.cancel_job(job_id).await.unwrap();
    assert_eq!(first, CancelAcknowledgement::Requested { drained: 2 });
    assert_eq!(second, CancelAcknowledgement::AlreadyRequested);
    assert_eq!(controller.get_progress(job_id).await.unwrap().cancelled, 2);

    provider.release(1);
    controller.wait_for_completion(job_id).await.unwrap();
    let third = controller.cancel_job(job_id).await.unwrap();
    assert_eq!(
        third,
        CancelAcknowledgement::AlreadyFinished {
            status: JobStatus::Cancelled
        }
    );
}

#[tokio::test]
async fn test_percent_complete_is_monotone() {
    let names = strings(&["a.rs", "b.rs", "c.rs"]);
    let provider = ScriptedAnalysisProvider::gated();
    let controller = controller(
        &provider,
        files_named(&names),
        RetryPolicyBuilder::new().build(),
        2,
        None,
    );
    let job_id = controller
        .submit_job(names, strings(&["security", "documentation"]))
        .await
        .unwrap();

    let mut observed = Vec::new();
    for finished in 1..=6 {
        provider.release(1);
        loop {
            let summary = controller.get_job(job_id).await.unwrap();
            if summary.progress.finished() >= finished {
                observed.push((summary.progress.percent_complete, summary.status));
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
    controller.wait_for_completion(job_id).await.unwrap();

    assert!(observed.windows(2).all(|w| w[0].0 <= w[1].0), "{observed:?}");
    let (last_percent, last_status) = observed[observed.len() - 1];
    assert_eq!(last_percent, 100.0);
    assert_eq!(last_status, JobStatus::Completed);
    for (percent, status) in &observed[..observed.len() - 1] {
        assert!(*percent < 100.0);
        assert_eq!(*status, JobStatus::Running);
    }
}

#[tokio::test]
async fn test_logs_since_sequence() {
    let provider = ScriptedAnalysisProvider::new();
    let controller = controller(
        &provider,
        files_named(&strings(&["a.rs"])),
        RetryPolicyBuilder::new().build(),
        2,
        None,
    );
    let job_id = controller
        .submit_job(strings(&["a.rs"]), strings(&["security", "performance"]))
        .await
        .unwrap();
    controller.wait_for_completion(job_id).await.unwrap();

    let all = controller.get_logs(job_id, 0).await.unwrap();
    assert!(!all.is_empty());
    for (position, entry) in all.iter().enumerate() {
        assert_eq!(entry.sequence, position as u64 + 1);
        assert_eq!(entry.job_id, job_id);
    }

    let middle = all[all.len() / 2].sequence;
    let tail = controller.get_logs(job_id, middle).await.unwrap();
    assert_eq!(tail.len() as u64, all.len() as u64 - middle);
    assert_eq!(tail[0].sequence, middle + 1);
    assert!(all.iter().any(|e| e.item.is_none()));
}

#[tokio::test]
async fn test_invalid_request_creates_no_job() {
    let provider = ScriptedAnalysisProvider::new();
    let controller = controller(
        &provider,
        MockFileAccess::new(),
        RetryPolicyBuilder::new().build(),
        2,
        None,
    );

    let err = controller
        .submit_job(strings(&["a.rs"]), strings(&["unknown_agent"]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert!(controller.list_jobs().await.is_empty());

    let missing = controller.get_progress(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, OrchestratorError::JobNotFound { .. }));
}

#[tokio::test]
async fn test_snapshots_and_reset() {
    let store = MemorySnapshotStore::new();
    let provider = ScriptedAnalysisProvider::new();
    let controller = controller(
        &provider,
        files_named(&strings(&["a.rs", "b.rs"])),
        RetryPolicyBuilder::new().build(),
        2,
        Some(Arc::new(store.clone())),
    );
    let job_id = controller
        .submit_job(strings(&["a.rs", "b.rs"]), strings(&["security"]))
        .await
        .unwrap();
    controller.wait_for_completion(job_id).await.unwrap();

    let persisted = store.get(job_id).unwrap();
    assert_eq!(persisted.status, JobStatus::Completed);
    assert_eq!(persisted.progress.succeeded, 2);
    assert!(persisted
        .items
        .iter()
        .all(|item| item.status == WorkItemStatus::Succeeded));

    assert_eq!(controller.reset().await, 1);
    assert!(controller.get_progress(job_id).await.is_err());
    let recovered = controller.last_known_state(job_id).await.unwrap();
    assert_eq!(recovered.status, JobStatus::Completed);
    assert_eq!(controller.persisted_snapshots().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_failures_do_not_affect_job() {
    let provider = ScriptedAnalysisProvider::new();
    let controller = controller(
        &provider,
        files_named(&strings(&["a.rs"])),
        RetryPolicyBuilder::new().build(),
        1,
        Some(Arc::new(MemorySnapshotStore::failing())),
    );
    let job_id = controller
        .submit_job(strings(&["a.rs"]), strings(&["code_quality"]))
        .await
        .unwrap();
    assert_eq!(
        controller.wait_for_completion(job_id).await.unwrap(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_new_submission_evicts_only_finished_jobs() {
    let provider = ScriptedAnalysisProvider::gated();
    let names = strings(&["a.rs", "b.rs"]);
    let controller = controller(
        &provider,
        files_named(&names),
        RetryPolicyBuilder::new().build(),
        1,
        None,
    );

    let finished = controller
        .submit_job(strings(&["a.rs"]), strings(&["security"]))
        .await
        .unwrap();
    provider.release(1);
    controller.wait_for_completion(finished).await.unwrap();

    let running = controller
        .submit_job(strings(&["b.rs"]), strings(&["security"]))
        .await
        .unwrap();
    assert!(controller.get_job(finished).await.is_err());
    assert_eq!(controller.list_jobs().await.len(), 1);

    let third = controller
        .submit_job(strings(&["a.rs"]), strings(&["documentation"]))
        .await
        .unwrap();
    let ids: HashSet<Uuid> = controller.list_jobs().await.iter().map(|j| j.id).collect();
    assert_eq!(ids, HashSet::from([running, third]));

    provider.release(2);
    controller.wait_for_completion(running).await.unwrap();
    controller.wait_for_completion(third).await.unwrap();
}
