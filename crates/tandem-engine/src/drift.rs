//! Desync detection by random-stream sampling.
//!
//! After every command and every tick, the engine samples the scope's
//! random-stream position into a [`DriftMonitor`]. Every
//! `drift_exchange_interval` ticks the accumulated samples become a
//! [`DriftOpinion`] that is sent to the authority. A [`DriftArbiter`]
//! compares opinions for the same scope and tick and reports the first
//! tick at which two of them disagree.
//!
//! Nothing here repairs a divergence; recovery is a full resync performed
//! by the host.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tandem_core::{PeerId, RngState, ScopeId, TickId};
use tandem_wire::{ByteReader, ByteWriter, WireError};

/// One random-stream sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriftSample {
    /// Tick the sample was taken in.
    pub tick: TickId,
    /// Folded stream position.
    pub value: u64,
}

/// A reported mismatch between two peers' samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Divergence {
    /// Scope whose streams disagree.
    pub scope: ScopeId,
    /// Tick of the first differing sample.
    pub tick: TickId,
    /// Peer whose opinion disagreed with the reference.
    pub peer: PeerId,
}

// ── Monitor ────────────────────────────────────────────────────────

/// Ring buffer of the current sample set of one scope.
#[derive(Debug)]
pub struct DriftMonitor {
    samples: VecDeque<DriftSample>,
    capacity: usize,
    interval: u32,
    ticks_since_exchange: u32,
}

impl DriftMonitor {
    /// A monitor holding at most `capacity` samples and producing an
    /// opinion every `interval` ticks.
    pub fn new(capacity: usize, interval: u32) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            interval: interval.max(1),
            ticks_since_exchange: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn record(&mut self, tick: TickId, state: RngState) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(DriftSample {
            tick,
            value: state.fold(),
        });
    }

    /// Samples accumulated since the last exchange.
    pub fn samples(&self) -> impl Iterator<Item = &DriftSample> {
        self.samples.iter()
    }

    /// Mark the end of `tick`; returns an opinion when an exchange is due
    /// and samples have accumulated.
    pub fn end_tick(&mut self, scope: ScopeId, tick: TickId) -> Option<DriftOpinion> {
        self.ticks_since_exchange += 1;
        if self.ticks_since_exchange < self.interval {
            return None;
        }
        self.ticks_since_exchange = 0;
        if self.samples.is_empty() {
            return None;
        }
        Some(DriftOpinion {
            scope,
            tick,
            samples: self.samples.drain(..).collect(),
        })
    }
}

// ── Opinion ────────────────────────────────────────────────────────

/// A peer's sample set for one scope, closed at one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriftOpinion {
    /// Scope sampled.
    pub scope: ScopeId,
    /// Tick at which the set was closed.
    pub tick: TickId,
    /// Samples in the order they were taken.
    pub samples: Vec<DriftSample>,
}

impl DriftOpinion {
    /// Serialize for [`Transport::send_opinion`](tandem_core::Transport::send_opinion).
    ///
    /// ```text
    /// [scope i32] [tick u32] [count u16] ([tick u32] [value u64])*
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = ByteWriter::new();
        w.write_i32(self.scope.to_wire());
        w.write_u32(self.tick.0);
        w.write_len_u16(self.samples.len())?;
        for s in &self.samples {
            w.write_u32(s.tick.0);
            w.write_u64(s.value);
        }
        Ok(w.into_bytes())
    }

    /// Parse an encoded opinion, rejecting trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(bytes);
        let raw = r.read_i32()?;
        let scope = ScopeId::from_wire(raw).ok_or(WireError::InvalidScope { raw })?;
        let tick = TickId(r.read_u32()?);
        let count = r.read_len_u16()?;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            samples.push(DriftSample {
                tick: TickId(r.read_u32()?),
                value: r.read_u64()?,
            });
        }
        r.finish()?;
        Ok(Self {
            scope,
            tick,
            samples,
        })
    }

    /// Tick of the first sample at which `self` and `other` disagree.
    ///
    /// A set that is a strict prefix of the other disagrees at the first
    /// sample the shorter one lacks.
    pub fn first_difference(&self, other: &DriftOpinion) -> Option<TickId> {
        for (a, b) in self.samples.iter().zip(&other.samples) {
            if a != b {
                return Some(a.tick.min(b.tick));
            }
        }
        let n = self.samples.len().min(other.samples.len());
        self.samples
            .get(n)
            .or_else(|| other.samples.get(n))
            .map(|s| s.tick)
    }
}

// ── Arbiter ────────────────────────────────────────────────────────

/// Compares opinions from several peers.
///
/// The first opinion received for a `(scope, tick)` pair is the reference
/// every later one is compared against. Each `(scope, peer)` pair is
/// reported at most once until [`clear`](Self::clear) is called for the
/// scope, which the host does after resynchronizing it.
#[derive(Debug)]
pub struct DriftArbiter {
    history: usize,
    reference: BTreeMap<(ScopeId, TickId), DriftOpinion>,
    horizon: BTreeMap<ScopeId, TickId>,
    diverged: BTreeSet<(ScopeId, PeerId)>,
}

impl DriftArbiter {
    /// An arbiter remembering `history` reference opinions per scope.
    pub fn new(history: usize) -> Self {
        Self {
            history: history.max(1),
            reference: BTreeMap::new(),
            horizon: BTreeMap::new(),
            diverged: BTreeSet::new(),
        }
    }

    /// Compare `opinion` from `peer` against the reference for its tick.
    pub fn submit(&mut self, peer: PeerId, opinion: DriftOpinion) -> Option<Divergence> {
        let scope = opinion.scope;
        let key = (scope, opinion.tick);
        if self.horizon.get(&scope).is_some_and(|h| opinion.tick < *h) {
            log::debug!(
                "opinion from peer {peer} for {scope} at tick {} is older than the kept history",
                opinion.tick
            );
            return None;
        }

        let Some(reference) = self.reference.get(&key) else {
            self.reference.insert(key, opinion);
            self.evict(scope);
            return None;
        };
        let tick = reference.first_difference(&opinion)?;
        if !self.diverged.insert((scope, peer)) {
            return None;
        }
        log::warn!("peer {peer} diverged in {scope} at tick {tick}");
        Some(Divergence { scope, tick, peer })
    }

    /// Forget everything about `scope`, typically after a resync.
    pub fn clear(&mut self, scope: ScopeId) {
        self.reference.retain(|(s, _), _| *s != scope);
        self.horizon.remove(&scope);
        self.diverged.retain(|(s, _)| *s != scope);
    }

    fn evict(&mut self, scope: ScopeId) {
        let ticks: Vec<TickId> = self
            .reference
            .range((scope, TickId(0))..=(scope, TickId(u32::MAX)))
            .map(|((_, t), _)| *t)
            .collect();
        if ticks.len() <= self.history {
            return;
        }
        let drop = ticks.len() - self.history;
        for t in &ticks[..drop] {
            self.reference.remove(&(scope, *t));
        }
        self.horizon.insert(scope, ticks[drop]);
    }
}
