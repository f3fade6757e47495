//! Integration tests for the orchestrator.
//!
//! Every test drives the public API with `MockEngine`, so no prover binary is
//! needed. Gates hold hosts in `Running` where a test needs overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use trace_prover::ProverError;
use trace_prover::backend::{
    EngineError, EngineFactory, EngineResult, MockConfig, MockEngine, MockGate, MockStats,
    ProvingEngine, mock_digest,
};
use trace_prover::core::{FailureCause, HashKind, JobState, ProofRequest, SlotStatus};
use trace_prover::engine::{Notification, Orchestrator, OrchestratorConfig, RecordingObserver};

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_timeout(Duration::from_secs(10))
        .with_max_hosts(4)
        .with_poll_interval(Duration::from_millis(5))
}

/// Orchestrator over a mock engine, plus its counters and notification log.
fn setup(
    mock: MockConfig,
    config: OrchestratorConfig,
) -> (Orchestrator, Arc<MockStats>, RecordingObserver) {
    let engine = MockEngine::new(mock);
    let stats = engine.stats();
    let observer = RecordingObserver::new();
    let orchestrator = Orchestrator::new(Arc::new(engine), config).with_observer(observer.clone());
    (orchestrator, stats, observer)
}

/// Loads the first `allowed` engines, then refuses.
struct FailAfter {
    inner: MockEngine,
    allowed: usize,
    loads: AtomicUsize,
}

impl EngineFactory for FailAfter {
    fn name(&self) -> &str {
        "fail-after"
    }

    fn load(&self) -> EngineResult<Box<dyn ProvingEngine>> {
        if self.loads.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(EngineError::new("license server unreachable"));
        }
        self.inner.load()
    }
}

/// Panic payload whose destructor panics again, so the host thread dies
/// after its panic was caught and before it can answer.
struct Bomb;

impl Drop for Bomb {
    fn drop(&mut self) {
        panic!("payload destructor panicked");
    }
}

struct DyingHost;

impl EngineFactory for DyingHost {
    fn name(&self) -> &str {
        "dying-host"
    }

    fn load(&self) -> EngineResult<Box<dyn ProvingEngine>> {
        std::panic::panic_any(Bomb)
    }
}

#[test]
fn test_independent_slots_run_concurrently() {
    let gate = MockGate::new();
    let (mut orch, stats, _) = setup(MockConfig::default().with_gate(gate.clone()), config());

    let keccak = orch.submit(ProofRequest::keccak(["7", "8"]).unwrap()).unwrap();
    let sha2 = orch.submit(ProofRequest::sha2("abc").unwrap()).unwrap();
    assert_eq!(orch.state(keccak).unwrap(), JobState::Running);
    assert_eq!(orch.state(sha2).unwrap(), JobState::Running);
    assert_eq!(orch.live_hosts(), 2);

    gate.open();
    orch.run_until_idle();

    assert_eq!(orch.state(keccak).unwrap(), JobState::Succeeded);
    assert_eq!(orch.state(sha2).unwrap(), JobState::Succeeded);
    assert_eq!(
        orch.result(keccak).unwrap().digests(),
        vec![
            mock_digest(HashKind::Keccak, "7").as_str(),
            mock_digest(HashKind::Keccak, "8").as_str()
        ]
    );
    assert_eq!(
        orch.result(sha2).unwrap().digest(),
        Some(mock_digest(HashKind::Sha2, "abc").as_str())
    );
    assert_eq!(stats.loads(), 2);
    assert_eq!(orch.live_hosts(), 0);
}

#[test]
fn test_conflicting_submit_is_rejected_without_a_host() {
    let gate = MockGate::new();
    let (mut orch, stats, observer) =
        setup(MockConfig::default().with_gate(gate.clone()), config());

    let first = orch.submit(ProofRequest::sha2("aa").unwrap()).unwrap();
    let err = orch.submit(ProofRequest::sha3("bb").unwrap()).unwrap_err();
    match err {
        ProverError::AlreadyRunning { kind, active, .. } => {
            assert_eq!(kind, HashKind::Sha3);
            assert_eq!(active, first);
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(orch.jobs().len(), 1);
    assert_eq!(orch.live_hosts(), 1);

    gate.open();
    orch.run_until_idle();
    assert_eq!(stats.loads(), 1);
    assert_eq!(observer.notifications().len(), 1);

    // Once the slot is free the same request goes through.
    let second = orch.submit(ProofRequest::sha3("bb").unwrap()).unwrap();
    assert_eq!(orch.wait(second).unwrap(), JobState::Succeeded);
}

#[test]
fn test_second_keccak_batch_conflicts() {
    let gate = MockGate::new();
    let (mut orch, _, _) = setup(MockConfig::default().with_gate(gate.clone()), config());

    orch.submit(ProofRequest::keccak(["1"]).unwrap()).unwrap();
    let err = orch.submit(ProofRequest::keccak(["2"]).unwrap()).unwrap_err();
    assert!(matches!(err, ProverError::AlreadyRunning { .. }));
    gate.open();
    orch.run_until_idle();
}

#[test]
fn test_timing_and_single_notification() {
    let (mut orch, _, observer) = setup(
        MockConfig::default().with_delay(Duration::from_millis(20)),
        config(),
    );

    let id = orch.submit(ProofRequest::sha3("hello").unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Succeeded);

    let job = orch.job(id).unwrap();
    let started = job.started_at().unwrap();
    let ended = job.ended_at().unwrap();
    assert!(ended >= started);
    assert!(orch.elapsed(id).unwrap() >= Duration::from_millis(20));

    // Exactly one of result / failure.
    assert!(orch.result(id).is_some());
    assert!(orch.failure(id).is_none());
    assert!(orch.result(id).unwrap().auxiliary().is_some());

    // Further pumping never re-notifies.
    orch.pump(Duration::from_millis(10));
    let notes = observer.for_job(id);
    assert_eq!(notes.len(), 1);
    assert!(matches!(notes[0], Notification::Result { .. }));
}

#[test]
fn test_blank_slots_are_pending() {
    let (mut orch, _, _) = setup(MockConfig::default().with_blank_slots(vec![1]), config());

    let id = orch
        .submit(ProofRequest::keccak(["10", "20", "30"]).unwrap())
        .unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Succeeded);

    let result = orch.result(id).unwrap();
    let d0 = mock_digest(HashKind::Keccak, "10");
    let d2 = mock_digest(HashKind::Keccak, "30");
    assert_eq!(
        result.slots(),
        vec![
            SlotStatus::Ready(&d0),
            SlotStatus::Pending,
            SlotStatus::Ready(&d2)
        ]
    );
    assert!(!result.is_complete());
}

#[test]
fn test_short_batch_is_an_execution_failure() {
    let (mut orch, _, _) = setup(MockConfig::default().truncate_batch(), config());

    let id = orch
        .submit(ProofRequest::keccak(["1", "2", "3"]).unwrap())
        .unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);
    let failure = orch.failure(id).unwrap();
    assert_eq!(failure.cause, FailureCause::EngineExecution);
    assert_eq!(failure.message, "engine returned 2 digests for 3 inputs");
    assert!(orch.result(id).is_none());
}

#[test]
fn test_engine_error_reported_verbatim() {
    let (mut orch, _, observer) = setup(MockConfig::default().with_batch_len(25), config());

    let id = orch.submit(ProofRequest::keccak(["1", "2"]).unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);
    let failure = orch.failure(id).unwrap();
    assert_eq!(failure.message, "Input must have exactly 25 elements.");
    assert_eq!(failure.kind, HashKind::Keccak);

    let notes = observer.for_job(id);
    assert_eq!(notes.len(), 1);
    assert!(matches!(notes[0], Notification::Failure { elapsed: Some(_), .. }));
}

#[test]
fn test_load_failure_leaves_earlier_result() {
    let factory = FailAfter {
        inner: MockEngine::default_mock(),
        allowed: 1,
        loads: AtomicUsize::new(0),
    };
    let mut orch = Orchestrator::new(Arc::new(factory), config());

    let first = orch.submit(ProofRequest::sha2("ok").unwrap()).unwrap();
    assert_eq!(orch.wait(first).unwrap(), JobState::Succeeded);
    let before = orch.result(first).cloned().unwrap();

    let second = orch.submit(ProofRequest::sha2("again").unwrap()).unwrap();
    assert_eq!(orch.wait(second).unwrap(), JobState::Failed);
    let failure = orch.failure(second).unwrap();
    assert_eq!(failure.cause, FailureCause::EngineLoad);
    assert_eq!(failure.message, "license server unreachable");

    assert_eq!(orch.state(first).unwrap(), JobState::Succeeded);
    assert_eq!(orch.result(first).unwrap(), &before);
}

#[test]
fn test_load_failure_from_initialize() {
    let (mut orch, _, _) = setup(MockConfig::default().load_fails("no GPU"), config());

    let id = orch.submit(ProofRequest::sha3("x").unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);
    assert_eq!(orch.failure(id).unwrap().cause, FailureCause::EngineLoad);
}

#[test]
fn test_cancel_pending_never_runs() {
    let gate = MockGate::new();
    let (mut orch, stats, observer) = setup(
        MockConfig::default().with_gate(gate.clone()),
        config().with_max_hosts(1),
    );

    let running = orch.submit(ProofRequest::keccak(["1"]).unwrap()).unwrap();
    let queued = orch.submit(ProofRequest::sha2("later").unwrap()).unwrap();
    assert_eq!(orch.state(running).unwrap(), JobState::Running);
    assert_eq!(orch.state(queued).unwrap(), JobState::Pending);
    assert_eq!(orch.active_jobs(), vec![running, queued]);

    assert!(orch.cancel(queued));
    assert_eq!(orch.active_jobs(), vec![running]);
    assert_eq!(orch.state(queued).unwrap(), JobState::Cancelled);
    assert!(orch.job(queued).unwrap().started_at().is_none());
    assert!(orch.elapsed(queued).is_none());

    gate.open();
    orch.run_until_idle();
    assert_eq!(orch.state(running).unwrap(), JobState::Succeeded);
    assert_eq!(orch.state(queued).unwrap(), JobState::Cancelled);
    assert!(orch.active_jobs().is_empty());
    assert_eq!(stats.loads(), 1);
    assert_eq!(
        observer.for_job(queued),
        vec![Notification::Cancelled { id: queued }]
    );
}

#[test]
fn test_pending_job_starts_when_a_host_frees_up() {
    let gate = MockGate::new();
    let (mut orch, _, _) = setup(
        MockConfig::default().with_gate(gate.clone()),
        config().with_max_hosts(1),
    );

    let first = orch.submit(ProofRequest::keccak(["1"]).unwrap()).unwrap();
    let second = orch.submit(ProofRequest::sha2("queued").unwrap()).unwrap();
    assert_eq!(orch.state(second).unwrap(), JobState::Pending);

    gate.open();
    orch.run_until_idle();
    assert_eq!(orch.state(first).unwrap(), JobState::Succeeded);
    assert_eq!(orch.state(second).unwrap(), JobState::Succeeded);
}

#[test]
fn test_cancel_running_discards_late_response() {
    let gate = MockGate::new();
    let (mut orch, stats, observer) =
        setup(MockConfig::default().with_gate(gate.clone()), config());

    let id = orch.submit(ProofRequest::sha3("slow").unwrap()).unwrap();
    assert_eq!(orch.state(id).unwrap(), JobState::Running);

    assert!(orch.cancel(id));
    assert_eq!(orch.state(id).unwrap(), JobState::Cancelled);
    assert_eq!(orch.live_hosts(), 0);
    assert!(!orch.cancel(id));

    // Let the released host finish; its response must be ignored.
    gate.open();
    std::thread::sleep(Duration::from_millis(50));
    for _ in 0..5 {
        orch.pump(Duration::from_millis(5));
    }
    assert_eq!(orch.state(id).unwrap(), JobState::Cancelled);
    assert!(orch.result(id).is_none());
    assert_eq!(observer.for_job(id).len(), 1);
    assert_eq!(stats.loads(), 1);

    // The slot is free again.
    let next = orch.submit(ProofRequest::sha2("next").unwrap()).unwrap();
    assert_eq!(orch.wait(next).unwrap(), JobState::Succeeded);
}

#[test]
fn test_resubmit_after_failure_uses_fresh_host() {
    let (mut orch, stats, _) = setup(MockConfig::default(), config());

    let bad = orch.submit(ProofRequest::keccak(["x"]).unwrap()).unwrap();
    assert_eq!(orch.wait(bad).unwrap(), JobState::Failed);
    assert!(
        orch.failure(bad)
            .unwrap()
            .message
            .starts_with("Failed to parse input value")
    );

    let good = orch.submit(ProofRequest::keccak(["1"]).unwrap()).unwrap();
    assert_ne!(bad, good);
    assert_eq!(orch.wait(good).unwrap(), JobState::Succeeded);
    assert_eq!(stats.loads(), 2);
    assert_eq!(orch.state(bad).unwrap(), JobState::Failed);
}

#[test]
fn test_hung_host_times_out() {
    let (mut orch, _, observer) = setup(
        MockConfig::default().hangs(),
        config().with_timeout(Duration::from_millis(150)),
    );

    let id = orch.submit(ProofRequest::sha2("stuck").unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);

    let failure = orch.failure(id).unwrap();
    assert_eq!(failure.cause, FailureCause::Timeout);
    assert!(orch.elapsed(id).unwrap() >= Duration::from_millis(150));
    assert_eq!(orch.live_hosts(), 0);
    assert_eq!(observer.for_job(id).len(), 1);
}

#[test]
fn test_engine_panic_is_contained() {
    let (mut orch, _, _) = setup(MockConfig::default().panics("prover blew up"), config());

    let id = orch.submit(ProofRequest::sha3("boom").unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);
    let failure = orch.failure(id).unwrap();
    assert_eq!(failure.cause, FailureCause::EngineExecution);
    assert!(failure.message.contains("prover blew up"));

    // Later jobs still get their own host and their own failure.
    let next = orch.submit(ProofRequest::keccak(["3"]).unwrap()).unwrap();
    assert_eq!(orch.wait(next).unwrap(), JobState::Failed);
}

#[test]
fn test_silent_host_exit_is_a_communication_failure() {
    let observer = RecordingObserver::new();
    let mut orch = Orchestrator::new(Arc::new(DyingHost), config()).with_observer(observer.clone());

    let id = orch.submit(ProofRequest::sha2("aa").unwrap()).unwrap();
    assert_eq!(orch.wait(id).unwrap(), JobState::Failed);

    let failure = orch.failure(id).unwrap();
    assert_eq!(failure.cause, FailureCause::Communication);
    assert_eq!(failure.message, "host exited without a response");
    assert_eq!(orch.live_hosts(), 0);
    assert_eq!(observer.for_job(id).len(), 1);

    // The slot is released for the next request.
    let next = orch.submit(ProofRequest::sha3("bb").unwrap()).unwrap();
    assert_ne!(next, id);
}

#[test]
fn test_unsupported_kind_is_rejected() {
    let (mut orch, stats, _) = setup(
        MockConfig::default().with_kinds(vec![HashKind::Keccak]),
        config(),
    );
    let err = orch.submit(ProofRequest::sha2("aa").unwrap()).unwrap_err();
    assert!(matches!(err, ProverError::InvalidRequest(_)));
    assert!(orch.jobs().is_empty());
    assert_eq!(stats.loads(), 0);
}
