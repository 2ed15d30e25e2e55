//! Randomized broadcaster scenarios
//!
//! Drives one broadcaster through a seeded sequence of:
//! - early waiters spawned before any settle call
//! - cancellation of a random subset of them
//! - a burst of competing resolve/reject calls
//! - late waiters created after settlement
//!
//! and records what every waiter observed, so the report can be audited
//! against the broadcast invariants.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use herald_broadcast::{create_with_config, BroadcastConfig, Waiter};
use herald_core::invariants::check_all_invariants;
use herald_core::{
    BroadcastInvariant, Failure, HeraldError, HeraldResult, InvariantCompliant, InvariantViolation,
    Outcome, WaiterId,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Scenario configuration
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Waiters spawned before settlement
    pub early_waiters: usize,
    /// Waiters created after settlement
    pub late_waiters: usize,
    /// Fraction of early waiters cancelled before settlement (0.0 - 1.0)
    pub cancel_rate: f64,
    /// Number of resolve/reject calls issued back to back
    pub settle_attempts: usize,
    /// Probability that an attempt is a reject (0.0 - 1.0)
    pub reject_prob: f64,
    /// How long a notified waiter may take to complete
    pub completion_timeout: Duration,
    /// RNG seed
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            early_waiters: 8,
            late_waiters: 4,
            cancel_rate: 0.25,
            settle_attempts: 3,
            reject_prob: 0.5,
            completion_timeout: Duration::from_secs(1),
            seed: 0x4845_5241_4c44,
        }
    }
}

impl ScenarioConfig {
    /// Three early waiters, one late one, no cancellation
    pub fn small() -> Self {
        ScenarioConfig {
            early_waiters: 3,
            late_waiters: 1,
            cancel_rate: 0.0,
            settle_attempts: 2,
            ..Default::default()
        }
    }

    /// Many waiters, heavy cancellation, long settle burst
    pub fn stress() -> Self {
        ScenarioConfig {
            early_waiters: 256,
            late_waiters: 64,
            cancel_rate: 0.3,
            settle_attempts: 8,
            reject_prob: 0.5,
            completion_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> HeraldResult<()> {
        if !(0.0..=1.0).contains(&self.cancel_rate) {
            return Err(HeraldError::InvalidScenario(format!(
                "cancel_rate {} outside 0.0..=1.0",
                self.cancel_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.reject_prob) {
            return Err(HeraldError::InvalidScenario(format!(
                "reject_prob {} outside 0.0..=1.0",
                self.reject_prob
            )));
        }
        if self.settle_attempts == 0 {
            return Err(HeraldError::InvalidScenario(
                "at least one settle attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// One resolve or reject call
#[derive(Clone, Debug)]
pub enum SettleAttempt {
    Resolve(u64),
    Reject(Failure),
}

impl SettleAttempt {
    pub fn outcome(&self) -> Outcome<u64> {
        match self {
            SettleAttempt::Resolve(value) => Outcome::Success(*value),
            SettleAttempt::Reject(failure) => Outcome::Failure(failure.clone()),
        }
    }
}

/// When a waiter was created relative to settlement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Early,
    Late,
}

/// What one waiter saw
#[derive(Clone, Debug)]
pub struct Observation {
    pub waiter: usize,
    pub phase: Phase,
    pub outcome: Outcome<u64>,
    pub ready_on_first_poll: bool,
}

/// Everything recorded during one scenario run
#[derive(Clone, Debug, Default)]
pub struct ScenarioReport {
    pub seed: u64,
    pub attempts: Vec<SettleAttempt>,
    pub observations: Vec<Observation>,
    pub early_waiters: usize,
    pub cancelled: usize,
    /// Waiters that never completed
    pub stalled: usize,
    /// Registry size once cancellations were processed
    pub registry_after_cancel: usize,
    /// Registry size right after the settle burst
    pub registry_after_settle: usize,
}

/// Same discriminant and same payload; failures must be the same instance.
pub fn same_outcome(a: &Outcome<u64>, b: &Outcome<u64>) -> bool {
    match (a, b) {
        (Outcome::Success(x), Outcome::Success(y)) => x == y,
        (Outcome::Failure(x), Outcome::Failure(y)) => x.same_instance(y),
        _ => false,
    }
}

fn describe(outcome: &Outcome<u64>) -> String {
    match outcome {
        Outcome::Success(value) => format!("success({})", value),
        Outcome::Failure(failure) => format!("failure({})", failure),
    }
}

impl ScenarioReport {
    /// The outcome every waiter should have seen
    pub fn expected_outcome(&self) -> Option<Outcome<u64>> {
        self.attempts.first().map(SettleAttempt::outcome)
    }

    pub fn completed(&self, phase: Phase) -> usize {
        self.observations.iter().filter(|o| o.phase == phase).count()
    }

    /// Audit the report; empty when every invariant held
    pub fn verify(&self) -> Vec<InvariantViolation> {
        check_all_invariants(|invariant| self.check(invariant))
    }

    fn check(&self, invariant: BroadcastInvariant) -> Result<(), String> {
        match invariant {
            BroadcastInvariant::SingleSettlement => {
                let Some(reference) = self.observations.first() else {
                    return Ok(());
                };
                match self
                    .observations
                    .iter()
                    .find(|o| !same_outcome(&o.outcome, &reference.outcome))
                {
                    Some(other) => Err(format!(
                        "waiter {} observed {} but waiter {} observed {}",
                        reference.waiter,
                        describe(&reference.outcome),
                        other.waiter,
                        describe(&other.outcome)
                    )),
                    None => Ok(()),
                }
            }
            BroadcastInvariant::FirstWriterWins => {
                let Some(expected) = self.expected_outcome() else {
                    return if self.observations.is_empty() {
                        Ok(())
                    } else {
                        Err("waiters completed without any settle attempt".to_string())
                    };
                };
                match self
                    .observations
                    .iter()
                    .find(|o| !same_outcome(&o.outcome, &expected))
                {
                    Some(other) => Err(format!(
                        "first attempt was {} but waiter {} observed {}",
                        describe(&expected),
                        other.waiter,
                        describe(&other.outcome)
                    )),
                    None => Ok(()),
                }
            }
            BroadcastInvariant::LateSubscriberEquivalence => {
                let early = self.observations.iter().find(|o| o.phase == Phase::Early);
                for late in self.observations.iter().filter(|o| o.phase == Phase::Late) {
                    if !late.ready_on_first_poll {
                        return Err(format!("late waiter {} suspended", late.waiter));
                    }
                    if let Some(early) = early {
                        if !same_outcome(&early.outcome, &late.outcome) {
                            return Err(format!(
                                "late waiter {} observed {}, early waiter {} observed {}",
                                late.waiter,
                                describe(&late.outcome),
                                early.waiter,
                                describe(&early.outcome)
                            ));
                        }
                    }
                }
                Ok(())
            }
            BroadcastInvariant::NoLostWakeup => {
                if self.stalled > 0 {
                    return Err(format!("{} waiters never completed", self.stalled));
                }
                let expected = self.early_waiters.saturating_sub(self.cancelled);
                let completed = self.completed(Phase::Early);
                if completed != expected {
                    return Err(format!(
                        "{} of {} surviving early waiters completed",
                        completed, expected
                    ));
                }
                Ok(())
            }
            BroadcastInvariant::CancellationCleanup => {
                let expected = self.early_waiters.saturating_sub(self.cancelled);
                if self.registry_after_cancel != expected {
                    return Err(format!(
                        "registry held {} entries after cancelling {} of {} waiters",
                        self.registry_after_cancel, self.cancelled, self.early_waiters
                    ));
                }
                if self.registry_after_settle != 0 {
                    return Err(format!(
                        "registry held {} entries after settlement",
                        self.registry_after_settle
                    ));
                }
                Ok(())
            }
        }
    }
}

impl InvariantCompliant for ScenarioReport {
    fn verify_invariants(&self) -> Result<(), Vec<InvariantViolation>> {
        let violations = self.verify();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Poll once without a task; used to prove a waiter does not suspend
fn poll_now<T: Clone>(waiter: &mut Waiter<T>) -> Poll<Outcome<T>> {
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    Pin::new(waiter).poll(&mut cx)
}

fn waiter_id(index: usize) -> WaiterId {
    WaiterId::new(index as u64)
}

/// Seeded scenario runner
pub struct Scenario {
    config: ScenarioConfig,
    rng: StdRng,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> HeraldResult<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Scenario { config, rng })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Run the scenario. Must be called inside a tokio runtime.
    pub async fn run(&mut self) -> HeraldResult<ScenarioReport> {
        let config = self.config.clone();
        let broadcast_config = BroadcastConfig::new()
            .with_label(format!("scenario-{:x}", config.seed))
            .with_registry_capacity(config.early_waiters);
        let (operation, resolver, rejecter) = create_with_config::<u64>(broadcast_config);

        let mut report = ScenarioReport {
            seed: config.seed,
            early_waiters: config.early_waiters,
            ..Default::default()
        };

        // Early waiters register inside wait(), before the spawn
        let handles: Vec<(usize, JoinHandle<Outcome<u64>>)> = (0..config.early_waiters)
            .map(|index| (index, tokio::spawn(operation.wait())))
            .collect();
        tokio::task::yield_now().await;

        let mut survivors = Vec::with_capacity(handles.len());
        for (index, handle) in handles {
            if !self.rng.gen_bool(config.cancel_rate) {
                survivors.push((index, handle));
                continue;
            }
            handle.abort();
            match handle.await {
                Err(e) if e.is_cancelled() => report.cancelled += 1,
                Err(_) => return Err(HeraldError::WaiterPanicked(waiter_id(index))),
                Ok(outcome) => {
                    // Completed before any settle call: FirstWriterWins will flag it
                    report.observations.push(Observation {
                        waiter: index,
                        phase: Phase::Early,
                        outcome,
                        ready_on_first_poll: false,
                    });
                }
            }
        }
        report.registry_after_cancel = operation.waiter_count();

        for n in 0..config.settle_attempts {
            let attempt = if self.rng.gen_bool(config.reject_prob) {
                SettleAttempt::Reject(Failure::msg(format!("rejection #{}", n)))
            } else {
                SettleAttempt::Resolve(self.rng.gen::<u64>())
            };
            match &attempt {
                SettleAttempt::Resolve(value) => resolver.resolve(*value),
                SettleAttempt::Reject(failure) => rejecter.reject(failure.clone()),
            }
            report.attempts.push(attempt);
        }
        report.registry_after_settle = operation.waiter_count();

        for (index, handle) in survivors {
            match tokio::time::timeout(config.completion_timeout, handle).await {
                Ok(Ok(outcome)) => report.observations.push(Observation {
                    waiter: index,
                    phase: Phase::Early,
                    outcome,
                    ready_on_first_poll: false,
                }),
                Ok(Err(e)) if e.is_panic() => {
                    return Err(HeraldError::WaiterPanicked(waiter_id(index)));
                }
                Ok(Err(_)) | Err(_) => {
                    tracing::warn!(seed = config.seed, waiter = index, "early waiter stalled");
                    report.stalled += 1;
                }
            }
        }

        for offset in 0..config.late_waiters {
            let index = config.early_waiters + offset;
            let mut waiter = operation.wait();
            let (ready_on_first_poll, outcome) = match poll_now(&mut waiter) {
                Poll::Ready(outcome) => (true, outcome),
                Poll::Pending => match tokio::time::timeout(config.completion_timeout, waiter).await {
                    Ok(outcome) => (false, outcome),
                    Err(_) => {
                        tracing::warn!(seed = config.seed, waiter = index, "late waiter stalled");
                        report.stalled += 1;
                        continue;
                    }
                },
            };
            report.observations.push(Observation {
                waiter: index,
                phase: Phase::Late,
                outcome,
                ready_on_first_poll,
            });
        }

        tracing::debug!(
            seed = config.seed,
            cancelled = report.cancelled,
            observed = report.observations.len(),
            stalled = report.stalled,
            "scenario finished"
        );
        Ok(report)
    }

    /// Run and fail on the first broken invariant
    pub async fn run_and_verify(&mut self) -> HeraldResult<ScenarioReport> {
        let report = self.run().await?;
        let mut violations = report.verify();
        match violations.len() {
            0 => Ok(report),
            1 => Err(violations.remove(0).into()),
            n => {
                for violation in &violations {
                    tracing::error!(seed = report.seed, %violation, "invariant violated");
                }
                Err(HeraldError::InvariantViolations(n))
            }
        }
    }
}

/// Run the same configuration once per seed
pub async fn run_seeds<I>(config: ScenarioConfig, seeds: I) -> HeraldResult<Vec<ScenarioReport>>
where
    I: IntoIterator<Item = u64>,
{
    let mut reports = Vec::new();
    for seed in seeds {
        let mut scenario = Scenario::new(config.clone().with_seed(seed))?;
        reports.push(scenario.run_and_verify().await?);
    }
    Ok(reports)
}
