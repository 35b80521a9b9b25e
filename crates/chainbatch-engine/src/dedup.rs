//! In-flight deduplication.
//!
//! Every flush builds a [`DedupPlan`]: the list of unique calls that go
//! upstream and, for every request position, which of those calls answers
//! it. While the upstream call is running its keys stay in the
//! [`InFlightCache`], so a request arriving mid-flush for the same keys is
//! routed onto the running call instead of being issued again. A request
//! that shares only some keys with the running call takes those results from
//! it and sends just its other calls in the next flush.

use std::collections::HashMap;

use chainbatch_core::{BatchKey, CallSpec};

use crate::pending::PendingRequest;

/// Where the result for one request position comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into [`DedupPlan::unique_calls`].
    Upstream(usize),
    /// The call has no destination; it is never sent and settles empty.
    Unresolved,
    /// Answered by an earlier flush the request partially attached to.
    Carried,
}

/// What [`InFlightCache::attach`] did with a mid-flush arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Every resolved call is in flight; the request joined the running call.
    Full,
    /// Some calls are in flight. `in_flight[pos]` is the index of the running
    /// call answering that position; the rest wait for the next flush.
    Partial(Vec<Option<usize>>),
    /// None of its calls are in flight.
    Detached,
}

/// Unique upstream calls for one flush and the routing back to requests.
#[derive(Debug, Default)]
pub struct DedupPlan {
    pub unique_calls: Vec<CallSpec>,
    /// `keys[i]` is the key of `unique_calls[i]`.
    pub keys: Vec<BatchKey>,
    /// One entry per request (in request order), one slot per call position.
    pub routing: Vec<Vec<Slot>>,
    fan_out: Vec<usize>,
}

impl DedupPlan {
    /// Positions answered by each unique call.
    pub fn fan_out(&self) -> &[usize] {
        &self.fan_out
    }

    /// Resolved call positions across all routed requests.
    pub fn routed_calls(&self) -> usize {
        self.fan_out.iter().sum()
    }

    /// Positions served without a call of their own.
    pub fn deduplicated(&self) -> usize {
        self.routed_calls() - self.unique_calls.len()
    }

    fn route(&mut self, slots: Vec<Slot>) {
        for slot in &slots {
            if let Slot::Upstream(i) = slot {
                self.fan_out[*i] += 1;
            }
        }
        self.routing.push(slots);
    }
}

/// Keys of the upstream call currently in flight.
#[derive(Debug, Default)]
pub struct InFlightCache {
    entries: HashMap<BatchKey, usize>,
}

impl InFlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the plan for a flush and mark its keys as in flight.
    pub fn dedupe(&mut self, requests: &[PendingRequest]) -> DedupPlan {
        debug_assert!(self.entries.is_empty(), "previous flush not settled");
        let mut plan = DedupPlan::default();
        for req in requests {
            let mut slots = Vec::with_capacity(req.calls.len());
            for (pos, call) in req.calls.calls().iter().enumerate() {
                if req.carried(pos).is_some() {
                    slots.push(Slot::Carried);
                    continue;
                }
                if !call.is_resolved() {
                    slots.push(Slot::Unresolved);
                    continue;
                }
                let key = call.key();
                let idx = match self.entries.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let idx = plan.unique_calls.len();
                        plan.unique_calls.push(call.clone());
                        plan.keys.push(key.clone());
                        plan.fan_out.push(0);
                        self.entries.insert(key, idx);
                        idx
                    }
                };
                slots.push(Slot::Upstream(idx));
            }
            plan.route(slots);
        }
        plan
    }

    /// Route `request` onto the in-flight call.
    ///
    /// Only a [`Attachment::Full`] result changes `plan`. For a partial match
    /// the caller keeps the request until the running call settles.
    pub fn attach(&self, plan: &mut DedupPlan, request: &PendingRequest) -> Attachment {
        if self.entries.is_empty() {
            return Attachment::Detached;
        }
        let mut in_flight = Vec::with_capacity(request.calls.len());
        let mut missing = 0;
        for call in request.calls.calls() {
            if !call.is_resolved() {
                in_flight.push(None);
                continue;
            }
            let idx = self.entries.get(&call.key()).copied();
            if idx.is_none() {
                missing += 1;
            }
            in_flight.push(idx);
        }

        if missing == 0 {
            let slots = in_flight
                .iter()
                .map(|idx| idx.map_or(Slot::Unresolved, Slot::Upstream))
                .collect();
            plan.route(slots);
            Attachment::Full
        } else if in_flight.iter().any(Option::is_some) {
            Attachment::Partial(in_flight)
        } else {
            Attachment::Detached
        }
    }

    pub fn contains(&self, key: &BatchKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The in-flight call has settled; forget its keys.
    pub fn settle(&mut self) {
        self.entries.clear();
    }
}
