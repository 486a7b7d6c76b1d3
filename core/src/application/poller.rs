//! Background polling.
//!
//! Each [`PollGroup`] has at most one collection in flight. Ticks that land
//! while a group is busy are dropped; an explicit refresh request instead
//! sets a single "poll again" bit that is honoured when the in-flight poll is
//! consumed. Collection tasks never touch dashboard state: they only send a
//! [`PollCycle`] through the hand-off channel.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::domain::{AggregateStats, Entity, PollGroup, Snapshot, TableId};
use crate::error::{Error, Result};
use crate::ports::SnapshotProvider;

use super::actions::ActionReport;

/// Messages workers send to the core loop.
#[derive(Debug)]
pub enum CoreMessage {
    /// A poll group finished collecting.
    Polled(PollCycle),
    /// A running action reports progress.
    ActionProgress { action: uuid::Uuid, message: String },
    /// A running action finished.
    ActionFinished(ActionReport),
}

/// The result of one poll of one group, applied atomically.
#[derive(Debug, Clone)]
pub struct PollCycle {
    pub group: PollGroup,
    /// One snapshot per table of the group.
    pub snapshots: Vec<Snapshot>,
    /// Present for the system group when stats could be read.
    pub stats: Option<AggregateStats>,
    pub completed_at: DateTime<Utc>,
}

/// Schedules collection tasks.
pub struct Poller<P> {
    provider: Arc<P>,
    tx: UnboundedSender<CoreMessage>,
    process_limit: usize,
    in_flight: HashSet<PollGroup>,
    refresh_again: HashSet<PollGroup>,
}

impl<P> Poller<P>
where
    P: SnapshotProvider + 'static,
{
    pub fn new(provider: Arc<P>, tx: UnboundedSender<CoreMessage>, process_limit: usize) -> Self {
        Self {
            provider,
            tx,
            process_limit,
            in_flight: HashSet::new(),
            refresh_again: HashSet::new(),
        }
    }

    pub fn is_in_flight(&self, group: PollGroup) -> bool {
        self.in_flight.contains(&group)
    }

    /// Whether a refresh is queued behind an in-flight poll.
    pub fn is_refresh_pending(&self, group: PollGroup) -> bool {
        self.refresh_again.contains(&group)
    }

    /// Regular cadence: start a poll for every idle group. Returns how many
    /// polls were started.
    pub fn tick(&mut self) -> usize {
        let mut started = 0;
        for group in PollGroup::ALL {
            if self.in_flight.contains(&group) {
                debug!(?group, "Poll still in flight, tick dropped");
                continue;
            }
            self.spawn(group);
            started += 1;
        }
        started
    }

    /// Out-of-cycle poll of every group. Busy groups get their refresh bit
    /// set instead of a second concurrent poll.
    pub fn request_refresh(&mut self) {
        for group in PollGroup::ALL {
            if self.in_flight.contains(&group) {
                self.refresh_again.insert(group);
            } else {
                self.spawn(group);
            }
        }
    }

    /// Mark a group's poll as consumed. Returns true when a queued refresh
    /// started a new poll.
    pub fn complete(&mut self, group: PollGroup) -> bool {
        self.in_flight.remove(&group);
        if self.refresh_again.remove(&group) {
            self.spawn(group);
            return true;
        }
        false
    }

    fn spawn(&mut self, group: PollGroup) {
        self.in_flight.insert(group);

        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        let limit = self.process_limit;

        tokio::spawn(async move {
            let cycle = collect(provider.as_ref(), group, limit).await;
            if tx.send(CoreMessage::Polled(cycle)).is_err() {
                debug!(?group, "Core loop gone, poll result discarded");
            }
        });
    }
}

/// Sample every table of `group`. Provider failures become unavailable
/// snapshots; they never abort the cycle.
pub async fn collect<P: SnapshotProvider>(provider: &P, group: PollGroup, limit: usize) -> PollCycle {
    let (snapshots, stats) = match group {
        PollGroup::Dev => {
            let (processes, containers) = tokio::join!(
                provider.list_processes_of_interest(),
                provider.list_containers()
            );
            (
                vec![
                    snapshot(TableId::DevProcesses, processes),
                    snapshot(TableId::Containers, containers),
                ],
                None,
            )
        }
        PollGroup::System => {
            let (processes, stats) = tokio::join!(
                provider.list_all_processes(limit),
                provider.aggregate_stats()
            );
            let stats = match stats {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(error = %e, "Aggregate stats unavailable");
                    None
                }
            };
            (vec![snapshot(TableId::AllProcesses, processes)], stats)
        }
    };

    PollCycle {
        group,
        snapshots,
        stats,
        completed_at: Utc::now(),
    }
}

fn snapshot(table: TableId, result: Result<Vec<Entity>>) -> Snapshot {
    match result {
        Ok(entities) => Snapshot::live(table, entities),
        Err(e) => {
            if e.is_unavailable() {
                debug!(table = %table, error = %e, "Provider unavailable");
            } else {
                warn!(table = %table, error = %e, "Provider failed");
            }
            Snapshot::unavailable(table, unavailable_reason(&e))
        }
    }
}

fn unavailable_reason(error: &Error) -> String {
    match error {
        Error::ProviderUnavailable(reason) | Error::UnsupportedPlatform(reason) => reason.clone(),
        other => other.to_string(),
    }
}
