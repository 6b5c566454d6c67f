//! Registry of workload sessions.
//!
//! The registry maps each workload identity to at most one slot. A slot is
//! `Starting` from the moment a start is admitted until the start settles,
//! then `Running` while it holds the session. Every slot carries the
//! generation of the admission that created it, so a start that settles
//! after its slot was released or replaced can tell that it lost the race
//! and must release its own session.
//!
//! All methods take the lock for a single map mutation and never await while
//! holding it. Session I/O happens outside, on the handles the registry gives
//! back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pwod_core::{ApplicationType, WorkloadSpec, WorkloadUid};
use pwod_session::SessionHandle;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Thread-safe registry of workload sessions.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    slots: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<WorkloadUid, Slot>,
    next_generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    spec: WorkloadSpec,
    phase: Phase,
}

#[derive(Debug)]
enum Phase {
    Starting { cancel: CancellationToken },
    Running(SessionHandle),
}

impl Slot {
    /// Take the slot out of service: cancel a pending start, or hand back
    /// the running session for cleanup.
    fn retire(self) -> Option<SessionHandle> {
        match self.phase {
            Phase::Starting { cancel } => {
                cancel.cancel();
                None
            }
            Phase::Running(handle) => Some(handle),
        }
    }
}

/// Outcome of [`LifecycleRegistry::admit`].
#[derive(Debug)]
pub enum Admission {
    /// A start was admitted; the caller must run it and then settle it.
    Start(PendingStart),
    /// The workload is already starting or running with the same spec.
    Unchanged,
    /// The workload has no proxy and is not tracked.
    NoProxy {
        /// Session of an earlier incarnation of the workload, to clean up.
        retired: Option<SessionHandle>,
    },
}

/// A start admitted into the registry.
#[derive(Debug)]
pub struct PendingStart {
    /// Generation of the slot reserved for this start.
    pub generation: u64,
    /// The handle to start.
    pub handle: SessionHandle,
    /// Fires when the slot is released or replaced before the start settles.
    pub cancel: CancellationToken,
    /// Session replaced by this start, to clean up before starting.
    pub retired: Option<SessionHandle>,
}

/// Outcome of [`LifecycleRegistry::release`].
#[derive(Debug)]
pub enum Release {
    /// Nothing was registered for the workload.
    Unknown,
    /// A start was in flight and has been cancelled.
    Cancelled,
    /// The running session was removed; the caller must clean it up.
    Cleanup(SessionHandle),
}

/// Outcome of [`LifecycleRegistry::settle`].
#[derive(Debug)]
pub enum Settlement {
    /// The session is now registered as running.
    Registered,
    /// The start failed; nothing is registered.
    Discarded,
    /// The session started but its slot is gone; the caller must clean it up.
    Orphaned(SessionHandle),
}

/// Phase of a registry slot, as reported by [`LifecycleRegistry::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    /// A start is in flight.
    Starting,
    /// The session is established.
    Running,
}

/// A point-in-time view of one registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    /// Workload identity.
    pub uid: WorkloadUid,
    /// Workload namespace.
    pub namespace: String,
    /// Workload name.
    pub name: String,
    /// Proxy role.
    pub app_type: ApplicationType,
    /// Slot phase.
    pub phase: SlotPhase,
    /// When the session was established.
    pub started_at: Option<DateTime<Utc>>,
}

impl LifecycleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an observed workload.
    ///
    /// A workload already starting or running with an equal spec is left
    /// alone. A changed spec retires the old slot first. Workloads without
    /// a proxy are never registered. The cancel token of an admitted start
    /// is a child of `parent`.
    pub fn admit(&self, spec: WorkloadSpec, parent: &CancellationToken) -> Admission {
        let mut slots = self.slots.lock();

        let retired = match slots.entries.get(&spec.uid) {
            Some(slot) if slot.spec == spec => return Admission::Unchanged,
            Some(_) => slots.entries.remove(&spec.uid).and_then(Slot::retire),
            None => None,
        };

        if !spec.app_type.has_proxy() {
            return Admission::NoProxy { retired };
        }

        let generation = slots.next_generation;
        slots.next_generation += 1;
        let cancel = parent.child_token();

        slots.entries.insert(
            spec.uid.clone(),
            Slot {
                generation,
                spec: spec.clone(),
                phase: Phase::Starting {
                    cancel: cancel.clone(),
                },
            },
        );

        Admission::Start(PendingStart {
            generation,
            handle: SessionHandle::new(spec),
            cancel,
            retired,
        })
    }

    /// Remove a workload.
    pub fn release(&self, uid: &WorkloadUid) -> Release {
        let removed = self.slots.lock().entries.remove(uid);
        match removed.map(|slot| slot.phase) {
            None => Release::Unknown,
            Some(Phase::Starting { cancel }) => {
                cancel.cancel();
                Release::Cancelled
            }
            Some(Phase::Running(handle)) => Release::Cleanup(handle),
        }
    }

    /// Record the outcome of an admitted start.
    ///
    /// `started` is whether the handle now holds a session. The handle is
    /// registered only if the slot of this `generation` is still waiting for
    /// it.
    pub fn settle(
        &self,
        uid: &WorkloadUid,
        generation: u64,
        handle: SessionHandle,
        started: bool,
    ) -> Settlement {
        let mut slots = self.slots.lock();

        let current = slots.entries.get(uid).is_some_and(|slot| {
            slot.generation == generation && matches!(slot.phase, Phase::Starting { .. })
        });

        if !current {
            return if started {
                Settlement::Orphaned(handle)
            } else {
                Settlement::Discarded
            };
        }

        if !started {
            slots.entries.remove(uid);
            return Settlement::Discarded;
        }

        match slots.entries.get_mut(uid) {
            Some(slot) => {
                slot.phase = Phase::Running(handle);
                Settlement::Registered
            }
            None => Settlement::Orphaned(handle),
        }
    }

    /// Whether a running session is registered for the workload.
    #[must_use]
    pub fn contains(&self, uid: &WorkloadUid) -> bool {
        self.slots
            .lock()
            .entries
            .get(uid)
            .is_some_and(|slot| matches!(slot.phase, Phase::Running(_)))
    }

    /// Whether a start is in flight for the workload.
    #[must_use]
    pub fn is_starting(&self, uid: &WorkloadUid) -> bool {
        self.slots
            .lock()
            .entries
            .get(uid)
            .is_some_and(|slot| matches!(slot.phase, Phase::Starting { .. }))
    }

    /// Number of running sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|slot| matches!(slot.phase, Phase::Running(_)))
            .count()
    }

    /// Number of starts in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|slot| matches!(slot.phase, Phase::Starting { .. }))
            .count()
    }

    /// Whether no session is running or starting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().entries.is_empty()
    }

    /// All slots, ordered by workload identity.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SlotSummary> {
        let slots = self.slots.lock();
        let mut summaries: Vec<SlotSummary> = slots
            .entries
            .values()
            .map(|slot| {
                let (phase, started_at) = match &slot.phase {
                    Phase::Starting { .. } => (SlotPhase::Starting, None),
                    Phase::Running(handle) => (SlotPhase::Running, handle.started_at()),
                };
                SlotSummary {
                    uid: slot.spec.uid.clone(),
                    namespace: slot.spec.namespace.clone(),
                    name: slot.spec.name.clone(),
                    app_type: slot.spec.app_type,
                    phase,
                    started_at,
                }
            })
            .collect();
        drop(slots);
        summaries.sort_by(|a, b| a.uid.cmp(&b.uid));
        summaries
    }
}
