//! [`Adder`]: one add operation, from entry stream to committed pin.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use cairn_placement::{Allocation, Allocator};
use cairn_rpc::ClusterRpc;
use cairn_types::{AddParams, AddState, AddedOutput, Cid, Link, Pin};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::distributor::{DistributionReport, DistributionSettings, Distributor};
use crate::entry::EntrySource;
use crate::error::AddError;
use crate::pin::PinCommitter;
use crate::reconstructor::{ReconstructorConfig, TreeReconstructor};

/// Result of a successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSummary {
    /// Root CID of the added DAG.
    pub root: Cid,
    /// Cumulative encoded size of the DAG.
    pub size: u64,
    /// The pin committed for the root.
    pub pin: Pin,
    /// Distribution totals.
    pub report: DistributionReport,
}

/// Cancels a running [`Adder::add`] from elsewhere.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Stop reading, drop in-flight sends and fail with
    /// [`AddError::Cancelled`]. No pin is committed afterwards.
    ///
    /// Ignored once the pin commit was issued.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A DAG whose blocks all reached their minimum, ready to be pinned.
struct Distributed {
    root: Link,
    allocation: Arc<Allocation>,
    report: DistributionReport,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A single add operation against a cluster.
///
/// The state machine runs `Started → Walking → DagBuilt → Distributed →
/// Pinned`, or ends in `Failed`. [`add`](Self::add) consumes the adder, so
/// a failed operation cannot be resumed; start a new one instead.
pub struct Adder {
    rpc: Arc<dyn ClusterRpc>,
    params: AddParams,
    state: watch::Sender<AddState>,
    abort: Arc<watch::Sender<bool>>,
    outputs: Option<mpsc::UnboundedSender<AddedOutput>>,
}

impl Adder {
    pub fn new(rpc: Arc<dyn ClusterRpc>, params: AddParams) -> Self {
        let (state, _) = watch::channel(AddState::Started);
        let (abort, _) = watch::channel(false);
        Self {
            rpc,
            params,
            state,
            abort: Arc::new(abort),
            outputs: None,
        }
    }

    /// Report every finalised file and directory on `outputs`.
    pub fn with_outputs(mut self, outputs: mpsc::UnboundedSender<AddedOutput>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn params(&self) -> &AddParams {
        &self.params
    }

    /// Current state.
    pub fn state(&self) -> AddState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AddState> {
        self.state.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort.clone(),
        }
    }

    /// Run the operation over `source`.
    ///
    /// Returns the root CID once every block reached its minimum
    /// acknowledgements and the pin was committed. Abort and deadline apply
    /// up to the pin commit; the commit itself always runs to completion.
    #[tracing::instrument(skip_all, fields(name = %self.params.name))]
    pub async fn add<S: EntrySource>(self, source: S) -> Result<AddSummary, AddError> {
        let mut aborted = self.abort.subscribe();
        let deadline = self.params.timeout_ms.map(Duration::from_millis);

        let distributed = {
            let run = self.distribute(source);
            tokio::pin!(run);
            tokio::select! {
                biased;
                _ = wait_for_abort(&mut aborted) => {
                    warn!("add aborted");
                    Err(AddError::Cancelled)
                }
                _ = wait_for_deadline(deadline) => {
                    warn!(timeout_ms = ?self.params.timeout_ms, "add timed out");
                    Err(AddError::Cancelled)
                }
                result = &mut run => result,
            }
        };

        let result = match distributed {
            Ok(distributed) => self.commit(distributed).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(summary) => Ok(summary),
            Err(err) => {
                error!(error = %err, "add failed");
                self.transition(AddState::Failed);
                Err(err)
            }
        }
    }

    async fn distribute<S: EntrySource>(&self, mut source: S) -> Result<Distributed, AddError> {
        self.params.validate()?;
        let (min, max) = (
            self.params.replication_factor_min,
            self.params.replication_factor_max,
        );
        info!(layout = ?self.params.layout, min, max, wrap = self.params.wrap, "add started");

        let allocation = Arc::new(self.allocate(min, max).await?);

        let (tx, rx) = mpsc::channel(self.params.max_outstanding_blocks.max(1));
        let distributor = Distributor::new(
            self.rpc.clone(),
            allocation.clone(),
            DistributionSettings::from(&self.params),
        );
        let mut distribution = AbortOnDrop(tokio::spawn(distributor.run(rx)));

        self.transition(AddState::Walking);
        let mut reconstructor = TreeReconstructor::new(ReconstructorConfig::from(&self.params), tx);
        if let Some(outputs) = &self.outputs {
            reconstructor = reconstructor.with_outputs(outputs.clone());
        }

        let root = tokio::select! {
            walked = walk(&mut source, reconstructor) => match walked {
                Ok(root) => root,
                Err(AddError::DistributorStopped) => {
                    return Err(join(&mut distribution)
                        .await
                        .err()
                        .unwrap_or(AddError::DistributorStopped));
                }
                Err(err) => return Err(err),
            },
            // Distribution only ends early when a block failed.
            joined = join(&mut distribution) => {
                return Err(joined.err().unwrap_or(AddError::DistributorStopped));
            }
        };
        self.transition(AddState::DagBuilt);
        info!(root = %root.cid, size = root.size, "dag built");

        let report = join(&mut distribution).await?;
        self.transition(AddState::Distributed);

        Ok(Distributed {
            root,
            allocation,
            report,
        })
    }

    async fn commit(&self, distributed: Distributed) -> Result<AddSummary, AddError> {
        let Distributed {
            root,
            allocation,
            report,
        } = distributed;
        let holders = report.holders_of(&root.cid);
        if holders.is_empty() {
            return Err(AddError::DistributorStopped);
        }

        let pin = PinCommitter::pin_for(root.cid, &self.params, &allocation, holders);
        let pin = PinCommitter::new(self.rpc.clone()).commit(pin).await?;
        self.transition(AddState::Pinned);

        Ok(AddSummary {
            root: root.cid,
            size: root.size,
            pin,
            report,
        })
    }

    async fn allocate(&self, min: usize, max: usize) -> Result<Allocation, AddError> {
        let eligible = self.rpc.eligible_peers(min, max).await?;
        let allocator = Allocator::with_preferred(self.params.user_allocations.clone());
        let allocation = allocator.allocate(&eligible, min, max)?;
        info!(
            peers = allocation.peers().len(),
            standby = allocation.standby().len(),
            "allocation resolved"
        );
        Ok(allocation)
    }

    fn transition(&self, next: AddState) {
        let current = *self.state.borrow();
        if current.can_transition_to(next) {
            self.state.send_replace(next);
            debug!(from = %current, to = %next, "state transition");
        } else {
            warn!(from = %current, to = %next, "ignored invalid state transition");
        }
    }
}

async fn walk<S: EntrySource>(
    source: &mut S,
    mut reconstructor: TreeReconstructor,
) -> Result<Link, AddError> {
    let mut entries = 0usize;
    while let Some(entry) = source.next_entry().await? {
        reconstructor.push(entry).await?;
        entries += 1;
    }
    let emitted = reconstructor.emitted();
    let root = reconstructor.finish().await?;
    debug!(entries, emitted, "entry stream exhausted");
    Ok(root)
}

async fn join(
    distribution: &mut AbortOnDrop<Result<DistributionReport, AddError>>,
) -> Result<DistributionReport, AddError> {
    (&mut distribution.0)
        .await
        .map_err(|e| AddError::Task(e.to_string()))?
}

async fn wait_for_abort(aborted: &mut watch::Receiver<bool>) {
    if aborted.wait_for(|flag| *flag).await.is_err() {
        pending::<()>().await;
    }
}

async fn wait_for_deadline(deadline: Option<Duration>) {
    match deadline {
        Some(deadline) => tokio::time::sleep(deadline).await,
        None => pending::<()>().await,
    }
}
