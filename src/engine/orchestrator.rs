//! Job orchestrator: the single authority over job lifecycle.
//!
//! The orchestrator lives on one control thread and is the only mutator of
//! the job table. Hosts talk back through a channel the orchestrator owns;
//! `pump` is the step that drains it, reaps dead hosts, enforces timeouts
//! and dispatches pending jobs.
//!
//! Concurrency policy: two jobs conflict iff they write the same result slot
//! (`HashKind::slot`). A submit that conflicts with a pending or running job
//! is rejected with `AlreadyRunning`; nothing is queued and no host is spawned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use im::OrdMap;
use tracing::{debug, info, warn};

use crate::backend::EngineFactory;
use crate::core::{
    EngineInfo, FailureCause, Job, JobFailure, JobId, JobOutcome, JobState, ProofRequest,
    ProofResult, ResultSlot,
};
use crate::{ProverError, ProverResult};

use super::host::ExecutionHost;
use super::observer::{JobObserver, NoopObserver};
use super::protocol::{HostEnvelope, HostResponse, check_value};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Give up on a host after this long. `None` waits forever.
    pub job_timeout: Option<Duration>,
    /// Upper bound on simultaneously running hosts
    pub max_hosts: usize,
    /// How long one `pump` waits for a host message
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            job_timeout: Some(Duration::from_secs(300)), // 5 minute default
            max_hosts: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            poll_interval: Duration::from_millis(25),
        }
    }
}

impl OrchestratorConfig {
    /// Set the job timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    factory: Arc<dyn EngineFactory>,
    jobs: OrdMap<JobId, Job>,
    hosts: HashMap<JobId, ExecutionHost>,
    queue: VecDeque<JobId>,
    next_id: u64,
    outbox: Sender<HostEnvelope>,
    inbox: Receiver<HostEnvelope>,
    observer: Box<dyn JobObserver>,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn EngineFactory>, config: OrchestratorConfig) -> Self {
        let (outbox, inbox) = mpsc::channel();
        Orchestrator {
            config,
            factory,
            jobs: OrdMap::new(),
            hosts: HashMap::new(),
            queue: VecDeque::new(),
            next_id: 1,
            outbox,
            inbox,
            observer: Box::new(NoopObserver),
        }
    }

    /// Replace the observer that receives terminal notifications.
    pub fn with_observer(mut self, observer: impl JobObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            name: self.factory.name().to_string(),
            version: self.factory.version(),
        }
    }

    /// Accept a request. Returns immediately; the host runs asynchronously.
    pub fn submit(&mut self, request: ProofRequest) -> ProverResult<JobId> {
        let kind = request.kind();
        if !self.factory.supports(kind) {
            return Err(ProverError::InvalidRequest(format!(
                "engine '{}' does not support {kind}",
                self.factory.name()
            )));
        }

        let slot = request.slot();
        if let Some(active) = self.conflicting(slot) {
            debug!(%kind, %slot, %active, "rejecting conflicting submit");
            return Err(ProverError::AlreadyRunning { kind, slot, active });
        }

        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.insert(id, Job::new(id, request));
        self.queue.push_back(id);
        info!(job = %id, %kind, %slot, "submitted");

        self.dispatch();
        Ok(id)
    }

    /// Best-effort cancel. Returns false for unknown or already terminal jobs.
    ///
    /// A running host cannot be interrupted: it is released and whatever it
    /// sends later is discarded.
    pub fn cancel(&mut self, id: JobId) -> bool {
        let state = match self.jobs.get(&id) {
            Some(job) => job.state(),
            None => {
                debug!(job = %id, "cancel of unknown job");
                return false;
            }
        };

        match state {
            JobState::Pending => self.queue.retain(|queued| *queued != id),
            JobState::Running => {}
            _ => {
                debug!(job = %id, %state, "cancel of terminal job ignored");
                return false;
            }
        }

        if let Err(e) = self.complete(id, JobOutcome::Cancelled, Instant::now()) {
            warn!(job = %id, "cancel failed: {e}");
            return false;
        }
        self.dispatch();
        true
    }

    /// Process host traffic for up to `wait`. Returns the number of jobs that
    /// reached a terminal state during this call.
    pub fn pump(&mut self, wait: Duration) -> usize {
        let mut finished = 0;

        if !self.hosts.is_empty() {
            match self.inbox.recv_timeout(wait) {
                Ok(envelope) => finished += self.handle(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                // We hold a sender ourselves, so the channel never disconnects.
                Err(RecvTimeoutError::Disconnected) => {}
            }
        }
        finished += self.drain();
        finished += self.reap_dead_hosts();
        finished += self.enforce_timeouts();
        self.dispatch();
        finished
    }

    /// Pump until `id` is terminal and return its final state.
    pub fn wait(&mut self, id: JobId) -> ProverResult<JobState> {
        loop {
            let state = self.state(id)?;
            if state.is_terminal() {
                return Ok(state);
            }
            self.pump(self.config.poll_interval);
        }
    }

    /// Pump until no job is pending or running.
    pub fn run_until_idle(&mut self) {
        while self.has_active() {
            self.pump(self.config.poll_interval);
        }
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Snapshot of the job table, ordered by id.
    pub fn jobs(&self) -> OrdMap<JobId, Job> {
        self.jobs.clone()
    }

    pub fn state(&self, id: JobId) -> ProverResult<JobState> {
        self.jobs
            .get(&id)
            .map(Job::state)
            .ok_or(ProverError::UnknownJob(id))
    }

    pub fn result(&self, id: JobId) -> Option<&ProofResult> {
        self.jobs.get(&id).and_then(Job::result)
    }

    pub fn failure(&self, id: JobId) -> Option<&JobFailure> {
        self.jobs.get(&id).and_then(Job::failure)
    }

    pub fn elapsed(&self, id: JobId) -> Option<Duration> {
        self.jobs.get(&id).and_then(Job::elapsed)
    }

    pub fn active_jobs(&self) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|job| job.state().is_active())
            .map(Job::id)
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.jobs.values().any(|job| job.state().is_active())
    }

    /// Number of hosts currently alive.
    pub fn live_hosts(&self) -> usize {
        self.hosts.len()
    }

    /// Drop a terminal job from the table and hand it back.
    pub fn forget(&mut self, id: JobId) -> ProverResult<Job> {
        let state = self.state(id)?;
        if !state.is_terminal() {
            return Err(ProverError::Message(format!("{id} is still {state}")));
        }
        self.jobs.remove(&id).ok_or(ProverError::UnknownJob(id))
    }

    fn conflicting(&self, slot: ResultSlot) -> Option<JobId> {
        self.jobs
            .values()
            .find(|job| job.state().is_active() && job.request().slot() == slot)
            .map(Job::id)
    }

    fn dispatch(&mut self) {
        while self.hosts.len() < self.config.max_hosts {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let Some(mut job) = self.jobs.get(&id).cloned() else {
                continue;
            };

            let started_at = Instant::now();
            if let Err(e) = job.mark_running(started_at) {
                warn!(job = %id, "not dispatched: {e}");
                continue;
            }
            let spawned = ExecutionHost::start(
                id,
                job.request(),
                Arc::clone(&self.factory),
                self.outbox.clone(),
            );
            let kind = job.kind();
            self.jobs.insert(id, job);

            match spawned {
                Ok(host) => {
                    debug!(job = %id, "host spawned");
                    self.hosts.insert(id, host);
                }
                Err(e) => {
                    let failure =
                        JobFailure::new(kind, FailureCause::Communication, e.to_string());
                    if let Err(e) = self.complete(id, JobOutcome::Failed(failure), Instant::now())
                    {
                        warn!(job = %id, "{e}");
                    }
                }
            }
        }
    }

    fn drain(&mut self) -> usize {
        let mut finished = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            finished += self.handle(envelope);
        }
        finished
    }

    fn handle(&mut self, envelope: HostEnvelope) -> usize {
        let ended_at = Instant::now();
        let HostEnvelope { job: id, response } = envelope;

        let Some(job) = self.jobs.get(&id) else {
            debug!(job = %id, "response for unknown job discarded");
            return 0;
        };
        if job.state() != JobState::Running {
            debug!(job = %id, state = %job.state(), "late response discarded");
            return 0;
        }

        let kind = job.kind();
        let outcome = match response {
            HostResponse::Success { value } => match check_value(job.request(), &value) {
                Ok(()) => JobOutcome::Succeeded(ProofResult::new(kind, value)),
                Err(message) => JobOutcome::Failed(JobFailure::new(
                    kind,
                    FailureCause::EngineExecution,
                    message,
                )),
            },
            HostResponse::Failure { error, stage } => {
                JobOutcome::Failed(JobFailure::new(kind, stage.into(), error))
            }
        };

        match self.complete(id, outcome, ended_at) {
            Ok(()) => 1,
            Err(e) => {
                warn!(job = %id, "{e}");
                0
            }
        }
    }

    /// Fail running jobs whose host exited without sending anything.
    fn reap_dead_hosts(&mut self) -> usize {
        let dead: Vec<JobId> = self
            .hosts
            .values()
            .filter(|host| host.is_finished())
            .map(ExecutionHost::job)
            .collect();
        if dead.is_empty() {
            return 0;
        }

        // A host sends before it exits, so anything it said is queued by now.
        let mut finished = self.drain();
        for id in dead {
            if !self.hosts.contains_key(&id) {
                continue;
            }
            let Some(kind) = self.jobs.get(&id).map(Job::kind) else {
                continue;
            };
            let failure = JobFailure::new(
                kind,
                FailureCause::Communication,
                "host exited without a response",
            );
            if self
                .complete(id, JobOutcome::Failed(failure), Instant::now())
                .is_ok()
            {
                finished += 1;
            }
        }
        finished
    }

    fn enforce_timeouts(&mut self) -> usize {
        let Some(limit) = self.config.job_timeout else {
            return 0;
        };
        let now = Instant::now();
        let expired: Vec<(JobId, crate::core::HashKind)> = self
            .hosts
            .keys()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| job.running_for(now).is_some_and(|d| d >= limit))
            .map(|job| (job.id(), job.kind()))
            .collect();

        let mut finished = 0;
        for (id, kind) in expired {
            warn!(job = %id, timeout_s = limit.as_secs_f64(), "host timed out");
            let failure = JobFailure::timeout(kind, limit);
            if self.complete(id, JobOutcome::Failed(failure), now).is_ok() {
                finished += 1;
            }
        }
        finished
    }

    /// Record the terminal outcome, release the host and notify once.
    fn complete(&mut self, id: JobId, outcome: JobOutcome, ended_at: Instant) -> ProverResult<()> {
        let mut job = self
            .jobs
            .get(&id)
            .cloned()
            .ok_or(ProverError::UnknownJob(id))?;
        job.finish(outcome, ended_at)?;
        self.jobs.insert(id, job.clone());

        if let Some(host) = self.hosts.remove(&id) {
            host.release();
        }

        let elapsed = job.elapsed();
        match job.outcome() {
            Some(JobOutcome::Succeeded(result)) => {
                self.observer
                    .on_result(id, result, elapsed.unwrap_or_default());
            }
            Some(JobOutcome::Failed(failure)) => self.observer.on_failure(id, failure, elapsed),
            Some(JobOutcome::Cancelled) => self.observer.on_cancelled(id),
            None => {}
        }
        Ok(())
    }
}
