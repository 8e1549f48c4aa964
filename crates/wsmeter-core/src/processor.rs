//! Turns sample requests into publish/fail actions.
//!
//! The processor measures each workspace in turn and produces exactly one
//! [`ProcessingAction`] per request, in request order. Measurement failures
//! never abort the batch; they become `Fail { permanent: true }` actions and
//! are escalated by the scheduler once the whole cycle has been dispatched.

use chrono::Utc;
use tracing::{debug, warn};

use crate::discover::SampleRequest;
use crate::gateway::PublicationGateway;
use crate::measure::SizeMeasurer;
use crate::sample::UsageSample;

/// Outcome of processing one sample request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingAction {
    /// Hand the sample to the publication gateway.
    Publish(UsageSample),
    /// Measurement failed.
    Fail { permanent: bool },
}

/// Aggregate outcome of one scan cycle.
///
/// Samples themselves are not retained; ownership moves to the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleResult {
    scanned: usize,
    published: usize,
    failed: usize,
    permanent_failures: usize,
    publish_errors: usize,
    bytes: u64,
}

impl CycleResult {
    /// True if any workspace in the cycle failed permanently.
    pub fn any_permanent(&self) -> bool {
        self.permanent_failures > 0
    }

    /// Number of requests in the cycle.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Number of samples accepted by the gateway.
    pub fn published(&self) -> usize {
        self.published
    }

    /// Number of failed measurements.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of samples the gateway rejected.
    pub fn publish_errors(&self) -> usize {
        self.publish_errors
    }

    /// Total bytes across published samples.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Measures workspaces and builds usage samples.
pub struct SampleProcessor<M: SizeMeasurer> {
    measurer: M,
}

impl<M: SizeMeasurer> SampleProcessor<M> {
    pub fn new(measurer: M) -> Self {
        Self { measurer }
    }

    /// Returns the measurer.
    pub fn measurer(&self) -> &M {
        &self.measurer
    }

    /// Processes a full batch, one action per request, in order.
    pub fn process<I>(&self, requests: I) -> Vec<ProcessingAction>
    where
        I: IntoIterator<Item = SampleRequest>,
    {
        requests
            .into_iter()
            .map(|request| self.process_one(request))
            .collect()
    }

    fn process_one(&self, request: SampleRequest) -> ProcessingAction {
        let sampled_at = Utc::now();

        match self.measurer.measure(&request.path) {
            Ok(bytes) => {
                debug!("Workspace {}: {} bytes", request.workspace, bytes);
                ProcessingAction::Publish(UsageSample::storage(request.workspace, sampled_at, bytes))
            }
            Err(e) => {
                warn!(
                    "Workspace {} ({}) failed permanently: {}",
                    request.workspace,
                    request.path.display(),
                    e
                );
                ProcessingAction::Fail { permanent: true }
            }
        }
    }

    /// Hands every `Publish` action to `gateway`.
    ///
    /// Gateway errors are logged and counted; they do not make the cycle
    /// fail.
    pub fn dispatch<G>(&self, actions: Vec<ProcessingAction>, gateway: &mut G) -> CycleResult
    where
        G: PublicationGateway + ?Sized,
    {
        let mut result = CycleResult::default();

        for action in actions {
            result.scanned += 1;
            match action {
                ProcessingAction::Publish(sample) => {
                    let workspace = sample.workspace.clone();
                    let rate = sample.rate;
                    match gateway.publish(sample) {
                        Ok(()) => {
                            result.published += 1;
                            result.bytes += rate;
                        }
                        Err(e) => {
                            warn!("Failed to publish sample for {}: {}", workspace, e);
                            result.publish_errors += 1;
                        }
                    }
                }
                ProcessingAction::Fail { permanent } => {
                    result.failed += 1;
                    if permanent {
                        result.permanent_failures += 1;
                    }
                }
            }
        }

        result
    }

    /// Processes `requests` and dispatches the resulting samples.
    pub fn consume<I, G>(&self, requests: I, gateway: &mut G) -> CycleResult
    where
        I: IntoIterator<Item = SampleRequest>,
        G: PublicationGateway + ?Sized,
    {
        let actions = self.process(requests);
        self.dispatch(actions, gateway)
    }
}
