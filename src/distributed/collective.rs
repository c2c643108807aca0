//! Collective primitives and the in-process group
//!
//! [`Collective`] is the capability the skew probe consumes: a barrier, an
//! all-gather of one `i64` per rank, and a group-wide abort. [`LocalGroup`]
//! implements it for participants that share a process; the rendezvous
//! coordinator bridges remote connections onto the same implementation.
//!
//! Rounds are generation-counted. Each arrival is recorded under a mutex; the
//! last arrival bumps the generation and publishes the round result on a
//! `watch` channel, which releases everyone waiting for a newer generation.
//! Because a round only completes once every rank has arrived, a waiter can
//! never miss its own round's result.

use crate::error::HarnessError;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Group communication used by the skew probe
#[allow(async_fn_in_trait)]
pub trait Collective {
    /// This participant's index, `0..size`
    fn rank(&self) -> usize;

    /// Number of participants in the group
    fn size(&self) -> usize;

    /// Return once every participant has called `barrier`
    async fn barrier(&mut self) -> Result<(), HarnessError>;

    /// Contribute `value`; return every rank's value, indexed by rank
    async fn all_gather(&mut self, value: i64) -> Result<Vec<i64>, HarnessError>;

    /// Abort the whole group
    ///
    /// Every participant blocked in, or later entering, a collective fails
    /// with [`HarnessError::Aborted`].
    async fn abort(&mut self, reason: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundKind {
    Barrier,
    Gather,
}

#[derive(Debug, Clone)]
struct Abort {
    rank: usize,
    reason: String,
}

impl Abort {
    fn to_error(&self) -> HarnessError {
        HarnessError::Aborted {
            rank: self.rank,
            reason: self.reason.clone(),
        }
    }
}

/// Published result of a completed round
#[derive(Debug, Clone, Default)]
struct Round {
    generation: u64,
    gathered: Arc<Vec<i64>>,
    aborted: Option<Abort>,
}

#[derive(Debug)]
struct GroupState {
    generation: u64,
    kind: Option<RoundKind>,
    arrived: usize,
    slots: Vec<Option<i64>>,
    aborted: Option<Abort>,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    state: Mutex<GroupState>,
    tx: watch::Sender<Round>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        // State stays consistent across a panic in another member
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn abort(&self, rank: usize, reason: &str) {
        let mut state = self.lock();
        if state.aborted.is_some() {
            return;
        }
        let abort = Abort {
            rank,
            reason: reason.to_string(),
        };
        state.aborted = Some(abort.clone());
        self.tx.send_modify(|round| round.aborted = Some(abort));
    }
}

/// Factory for in-process groups
pub struct LocalGroup;

impl LocalGroup {
    /// Create a group of `size` members; member `i` has rank `i`
    pub fn new(size: usize) -> Vec<LocalMember> {
        let (tx, _) = watch::channel(Round::default());
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(GroupState {
                generation: 0,
                kind: None,
                arrived: 0,
                slots: vec![None; size],
                aborted: None,
            }),
            tx,
        });

        (0..size)
            .map(|rank| LocalMember {
                rank,
                rx: shared.tx.subscribe(),
                shared: shared.clone(),
            })
            .collect()
    }
}

/// One participant of a [`LocalGroup`]
#[derive(Debug)]
pub struct LocalMember {
    rank: usize,
    shared: Arc<Shared>,
    rx: watch::Receiver<Round>,
}

impl LocalMember {
    /// Join the current round and wait for it to complete
    async fn round(&mut self, kind: RoundKind, value: Option<i64>) -> Result<Arc<Vec<i64>>, HarnessError> {
        let my_generation = {
            let mut state = self.shared.lock();
            if let Some(abort) = &state.aborted {
                return Err(abort.to_error());
            }

            let current_kind = state.kind;
            match current_kind {
                Some(current) if current != kind => {
                    drop(state);
                    let reason = format!("rank {} entered {:?} while the group is in {:?}", self.rank, kind, current);
                    self.shared.abort(self.rank, &reason);
                    return Err(HarnessError::Aborted {
                        rank: self.rank,
                        reason,
                    });
                }
                _ => state.kind = Some(kind),
            }

            if state.slots[self.rank].is_some() {
                return Err(HarnessError::Rendezvous(format!(
                    "rank {} entered the same round twice",
                    self.rank
                )));
            }
            state.slots[self.rank] = Some(value.unwrap_or_default());
            state.arrived += 1;

            let generation = state.generation;
            if state.arrived == self.shared.size {
                let gathered: Vec<i64> = match kind {
                    RoundKind::Gather => state.slots.iter().map(|v| v.unwrap_or_default()).collect(),
                    RoundKind::Barrier => Vec::new(),
                };
                state.generation += 1;
                state.arrived = 0;
                state.kind = None;
                state.slots.iter_mut().for_each(|slot| *slot = None);

                let released = state.generation;
                self.shared.tx.send_modify(|round| {
                    round.generation = released;
                    round.gathered = Arc::new(gathered);
                });
            }
            generation
        };

        let round = self
            .rx
            .wait_for(|round| round.generation > my_generation || round.aborted.is_some())
            .await
            .map_err(|_| HarnessError::Rendezvous("group closed".into()))?
            .clone();

        // A completed round wins over an abort raised after it completed
        if round.generation > my_generation {
            return Ok(round.gathered);
        }
        match round.aborted {
            Some(abort) => Err(abort.to_error()),
            None => Err(HarnessError::Rendezvous("group closed".into())),
        }
    }

    /// Synchronous abort, for callers outside an async context
    pub fn abort_now(&self, reason: &str) {
        self.shared.abort(self.rank, reason);
    }
}

impl Collective for LocalMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    async fn barrier(&mut self) -> Result<(), HarnessError> {
        self.round(RoundKind::Barrier, None).await.map(|_| ())
    }

    async fn all_gather(&mut self, value: i64) -> Result<Vec<i64>, HarnessError> {
        let gathered = self.round(RoundKind::Gather, Some(value)).await?;
        Ok(gathered.as_ref().clone())
    }

    async fn abort(&mut self, reason: &str) {
        self.abort_now(reason);
    }
}
