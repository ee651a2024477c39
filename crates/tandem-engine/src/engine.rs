//! The per-peer synchronization engine.
//!
//! [`SyncEngine`] owns the host world, the handler table, one
//! [`CommandQueue`] and random stream per scope, the change buffer, and
//! the drift monitors. All of it is touched only from the simulation
//! thread; the transport hands messages over through an
//! [`InboundSender`] and the engine drains them between ticks.
//!
//! # Tick lifecycle
//!
//! [`advance`](SyncEngine::advance) drains the inbound channel, then, if
//! the tick limit allows, takes every command due for the scope's next
//! tick, executes them in sequencer order under that scope's
//! [`ExecutionContext`], runs the host's per-tick simulation, and samples
//! the random stream after each step. A failing or panicking command is
//! logged and counted; it never aborts the rest of the tick.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use thiserror::Error;

use tandem_capture::{
    Ambient, Applied, CaptureError, Capturer, ClosureEnv, ClosureHandle, CommandError,
    ExecutionContext, FieldHandle, HandlerTable, OperationHandle,
};
use tandem_core::{Command, PeerId, RngState, ScopeId, ScopeRng, TickId, Transport};
use tandem_registry::Value;

use crate::buffer::{ChangeBuffer, WatchError, WatchOutcome, WatchToken};
use crate::config::{ConfigError, SyncConfig};
use crate::drift::{DriftArbiter, DriftMonitor, DriftOpinion, Divergence};
use crate::inbound::{self, Inbound, InboundSender};
use crate::journal::{JournalError, JournalReader, JournalWriter};
use crate::queue::CommandQueue;
use crate::report::{ReplayOutcome, TickReport};
use crate::simulation::Simulation;

// Compile-time assertion: the engine can move to a dedicated simulation
// thread whenever the world and transport can.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check<W: Send + Sync + 'static, T: Send>() {
        assert_send::<SyncEngine<W, T>>();
    }
};

// ── EngineError ────────────────────────────────────────────────────

/// Errors from engine bookkeeping. Command failures are not among them;
/// those are reported per tick in [`TickReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No such scope.
    #[error("unknown scope {scope}")]
    UnknownScope {
        /// The scope asked for.
        scope: ScopeId,
    },
    /// The scope already exists.
    #[error("scope {scope} already exists")]
    DuplicateScope {
        /// The scope asked for.
        scope: ScopeId,
    },
    /// A journal could not be read or written.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

// ── Scope state ────────────────────────────────────────────────────

struct ScopeState {
    next: TickId,
    rng: ScopeRng,
    queue: CommandQueue,
    drift: DriftMonitor,
    journal: Option<JournalWriter>,
}

type DivergenceListener = Box<dyn FnMut(&Divergence) + Send>;

/// Replayed ticks are history: they feed neither drift nor the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TickMode {
    Live,
    Replay,
}

// ── SyncEngine ─────────────────────────────────────────────────────

/// One peer's view of a lockstep simulation.
pub struct SyncEngine<W, T> {
    config: SyncConfig,
    world: W,
    transport: T,
    table: Arc<HandlerTable<W>>,
    capturer: Capturer<W>,
    scopes: BTreeMap<ScopeId, ScopeState>,
    sender: InboundSender,
    inbound: Receiver<Inbound>,
    tick_limit: Option<TickId>,
    buffer: ChangeBuffer,
    arbiter: DriftArbiter,
    peer: PeerId,
    ambient: Ambient,
    divergences: Vec<Divergence>,
    reported: HashSet<Divergence>,
    listeners: Vec<DivergenceListener>,
}

impl<W: Simulation, T: Transport> SyncEngine<W, T> {
    /// Create an engine with the global scope at tick 0.
    ///
    /// Until the first tick limit arrives, scopes may advance freely.
    pub fn new(
        config: SyncConfig,
        table: Arc<HandlerTable<W>>,
        world: W,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, inbound) = inbound::channel(config.max_inbound_queue);
        let mut engine = Self {
            capturer: Capturer::new(Arc::clone(&table), config.debug_mode),
            arbiter: DriftArbiter::new(config.drift_history),
            config,
            world,
            transport,
            table,
            scopes: BTreeMap::new(),
            sender,
            inbound,
            tick_limit: None,
            buffer: ChangeBuffer::new(),
            peer: PeerId(0),
            ambient: Ambient::default(),
            divergences: Vec::new(),
            reported: HashSet::new(),
            listeners: Vec::new(),
        };
        engine.insert_scope(ScopeId::Global, TickId(0));
        Ok(engine)
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The host world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// The host world, mutably.
    ///
    /// Direct mutations bypass synchronization; use them for setup and
    /// presentation-only state.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// The outbound transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The outbound transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The handler table.
    pub fn table(&self) -> &Arc<HandlerTable<W>> {
        &self.table
    }

    /// Handle for the transport's delivery callbacks.
    pub fn sender(&self) -> InboundSender {
        self.sender.clone()
    }

    /// This peer's id, used when comparing drift opinions.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Set this peer's id.
    pub fn set_peer(&mut self, peer: PeerId) {
        self.peer = peer;
    }

    /// Ambient values captured with commands whose handlers ask for them.
    pub fn ambient_mut(&mut self) -> &mut Ambient {
        &mut self.ambient
    }

    /// Highest tick scopes may simulate, once one has been received.
    pub fn tick_limit(&self) -> Option<TickId> {
        self.tick_limit
    }

    /// Raise the tick limit directly. Lower values are ignored.
    pub fn set_tick_limit(&mut self, tick: TickId) {
        self.tick_limit = Some(self.tick_limit.map_or(tick, |t| t.max(tick)));
    }

    // ── Scopes ─────────────────────────────────────────────────────

    fn insert_scope(&mut self, scope: ScopeId, start: TickId) {
        self.scopes.insert(
            scope,
            ScopeState {
                next: start,
                rng: ScopeRng::for_scope(self.config.seed, scope),
                queue: CommandQueue::new(),
                drift: DriftMonitor::new(
                    self.config.drift_sample_capacity,
                    self.config.drift_exchange_interval,
                ),
                journal: None,
            },
        );
    }

    /// Add a scope whose first simulated tick is `start`.
    pub fn add_scope(&mut self, scope: ScopeId, start: TickId) -> Result<(), EngineError> {
        if self.scopes.contains_key(&scope) {
            return Err(EngineError::DuplicateScope { scope });
        }
        self.insert_scope(scope, start);
        log::info!("scope {scope} added at tick {start}");
        Ok(())
    }

    /// Remove a scope with its queue, drift state, buffered changes and,
    /// through [`Simulation::scope_removed`], its sessions.
    pub fn remove_scope(&mut self, scope: ScopeId) -> Result<(), EngineError> {
        let state = self
            .scopes
            .remove(&scope)
            .ok_or(EngineError::UnknownScope { scope })?;
        self.buffer.remove_scope(scope);
        self.clear_drift(scope);
        self.world.scope_removed(scope);
        log::info!(
            "scope {scope} removed at tick {} with {} queued command(s)",
            state.next,
            state.queue.len()
        );
        Ok(())
    }

    /// Known scopes, in order.
    pub fn scopes(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.scopes.keys().copied()
    }

    /// The next tick `scope` will simulate.
    pub fn next_tick(&self, scope: ScopeId) -> Option<TickId> {
        self.scopes.get(&scope).map(|s| s.next)
    }

    /// The random-stream state of `scope`.
    pub fn rng_state(&self, scope: ScopeId) -> Option<RngState> {
        self.scopes.get(&scope).map(|s| s.rng.state())
    }

    /// Commands waiting in `scope`'s queue.
    pub fn queued(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map_or(0, |s| s.queue.len())
    }

    /// Run `f` inside `scope`'s execution context, drawing from its stream.
    ///
    /// Used to hand work from one scope to another between ticks; the
    /// stream of every other scope is untouched.
    pub fn with_scope<R>(
        &mut self,
        scope: ScopeId,
        f: impl FnOnce(&mut W, &mut ExecutionContext<'_>) -> R,
    ) -> Result<R, EngineError> {
        let state = self
            .scopes
            .get_mut(&scope)
            .ok_or(EngineError::UnknownScope { scope })?;
        let mut ctx = ExecutionContext::new(scope, state.next, &mut state.rng);
        ctx.debug_mode = self.config.debug_mode;
        Ok(f(&mut self.world, &mut ctx))
    }

    // ── Inbound ────────────────────────────────────────────────────

    /// Drain the inbound channel. Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.inbound.try_recv() {
            handled += 1;
            match msg {
                Inbound::Command(cmd) => self.enqueue(cmd),
                Inbound::TickLimit(tick) => self.set_tick_limit(tick),
                Inbound::Opinion { peer, bytes } => match DriftOpinion::decode(&bytes) {
                    Ok(opinion) => {
                        if let Some(d) = self.arbiter.submit(peer, opinion) {
                            self.report_divergence(d);
                        }
                    }
                    Err(e) => log::warn!("malformed drift opinion from peer {peer}: {e}"),
                },
                Inbound::Diverged(d) => self.report_divergence(d),
            }
        }
        handled
    }

    fn enqueue(&mut self, cmd: Command) {
        let Some(state) = self.scopes.get_mut(&cmd.scope) else {
            log::warn!(
                "command for unknown scope {} at tick {} dropped",
                cmd.scope,
                cmd.tick
            );
            return;
        };
        if cmd.tick < state.next {
            log::warn!(
                "command for {} stamped tick {} arrived after the scope reached tick {}",
                cmd.scope,
                cmd.tick,
                state.next
            );
        }
        state.queue.push(cmd);
    }

    // ── Divergence ─────────────────────────────────────────────────

    /// Call `listener` for every divergence reported from now on.
    pub fn on_diverged(&mut self, listener: impl FnMut(&Divergence) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Divergences reported since the last call.
    pub fn take_divergences(&mut self) -> Vec<Divergence> {
        std::mem::take(&mut self.divergences)
    }

    /// Forget drift state of `scope` after the host resynchronized it, so
    /// a later divergence there is reported again.
    pub fn clear_drift(&mut self, scope: ScopeId) {
        self.arbiter.clear(scope);
        self.reported.retain(|d| d.scope != scope);
        self.divergences.retain(|d| d.scope != scope);
    }

    fn report_divergence(&mut self, d: Divergence) {
        if !self.reported.insert(d) {
            return;
        }
        log::warn!("{} diverged at tick {} (peer {})", d.scope, d.tick, d.peer);
        for listener in &mut self.listeners {
            listener(&d);
        }
        self.divergences.push(d);
    }

    // ── Ticks ──────────────────────────────────────────────────────

    /// Drain inbound messages, then simulate the next tick of `scope`.
    ///
    /// Returns `Ok(None)` when the tick limit forbids simulating further.
    pub fn advance(&mut self, scope: ScopeId) -> Result<Option<TickReport>, EngineError> {
        self.pump();
        let next = self
            .next_tick(scope)
            .ok_or(EngineError::UnknownScope { scope })?;
        if self.tick_limit.is_some_and(|limit| next > limit) {
            return Ok(None);
        }
        self.run_tick(scope, TickMode::Live).map(Some)
    }

    /// Advance every scope by one tick where the limit allows.
    pub fn advance_all(&mut self) -> Vec<TickReport> {
        self.pump();
        let scopes: Vec<ScopeId> = self.scopes.keys().copied().collect();
        let mut reports = Vec::with_capacity(scopes.len());
        for scope in scopes {
            match self.advance(scope) {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => log::error!("advancing {scope} failed: {e}"),
            }
        }
        reports
    }

    /// Advance `scope` until it has simulated `tick` or hit the tick limit.
    pub fn run_until(&mut self, scope: ScopeId, tick: TickId) -> Result<Vec<TickReport>, EngineError> {
        let mut reports = Vec::new();
        while self
            .next_tick(scope)
            .ok_or(EngineError::UnknownScope { scope })?
            <= tick
        {
            match self.advance(scope)? {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        Ok(reports)
    }

    fn run_tick(&mut self, scope: ScopeId, mode: TickMode) -> Result<TickReport, EngineError> {
        let Self {
            config,
            world,
            transport,
            table,
            scopes,
            arbiter,
            peer,
            ..
        } = &mut *self;
        let ScopeState {
            next,
            rng,
            queue,
            drift,
            journal,
        } = scopes
            .get_mut(&scope)
            .ok_or(EngineError::UnknownScope { scope })?;
        let tick = *next;
        let live = mode == TickMode::Live;
        let due = queue.take_due(tick);
        let mut report = TickReport::new(scope, tick);
        report.stale = due.stale;

        {
            let mut ctx = ExecutionContext::new(scope, tick, rng);
            ctx.debug_mode = config.debug_mode;
            for cmd in &due.commands {
                match execute(table, world, &mut ctx, cmd) {
                    Ok(Applied::Executed) => report.executed += 1,
                    Ok(Applied::Skipped(reason)) => {
                        log::debug!(
                            "'{}' skipped in {scope} at tick {tick}: {reason:?}",
                            table.name_of(cmd.handler)
                        );
                        report.skipped += 1;
                    }
                    Err(e) => {
                        log::error!(
                            "command '{}' (id {}) failed in {scope} at tick {tick}: {e}",
                            table.name_of(cmd.handler),
                            cmd.handler
                        );
                        report.failed += 1;
                        report.failures.push(e);
                    }
                }
                if live {
                    drift.record(tick, ctx.rng.state());
                }
            }
            world.tick_scope(&mut ctx);
        }
        *next = tick.next();
        let post = rng.state();
        if !live {
            return Ok(report);
        }
        drift.record(tick, post);

        if let Some(j) = journal {
            if let Err(e) = j.record(tick, &due.commands, post) {
                log::error!("journal of {scope} could not record tick {tick}: {e}");
            }
        }

        let divergence = drift.end_tick(scope, tick).and_then(|opinion| {
            match opinion.encode() {
                Ok(bytes) => transport.send_opinion(bytes),
                Err(e) => log::error!("drift opinion of {scope} at tick {tick} too large: {e}"),
            }
            arbiter.submit(*peer, opinion)
        });
        if let Some(d) = divergence {
            self.report_divergence(d);
        }
        Ok(report)
    }

    // ── Capture ────────────────────────────────────────────────────

    /// Capture "set field of `target` to `value`". See [`Capturer::field`].
    pub fn capture_field(
        &mut self,
        handle: FieldHandle,
        scope: ScopeId,
        target: &Value,
        index: Option<i32>,
        value: &Value,
    ) -> Result<bool, CaptureError> {
        self.capturer
            .field(&mut self.transport, handle, scope, &self.ambient, target, index, value)
    }

    /// Capture "invoke operation on `target`". See [`Capturer::operation`].
    pub fn capture_operation(
        &mut self,
        handle: OperationHandle,
        scope: ScopeId,
        target: &Value,
        args: &[Value],
    ) -> Result<bool, CaptureError> {
        self.capturer
            .operation(&mut self.transport, handle, scope, &self.ambient, target, args)
    }

    /// Capture "invoke this action". See [`Capturer::closure`].
    pub fn capture_closure(
        &mut self,
        handle: ClosureHandle,
        scope: ScopeId,
        env: &ClosureEnv,
    ) -> Result<bool, CaptureError> {
        self.capturer
            .closure(&mut self.transport, handle, scope, &self.ambient, env)
    }

    // ── Change buffer ──────────────────────────────────────────────

    /// Open a watch around a local edit. See [`ChangeBuffer::begin_watch`].
    pub fn begin_watch(
        &mut self,
        handle: FieldHandle,
        scope: ScopeId,
        target: &Value,
        index: Option<i32>,
    ) -> Result<WatchToken, WatchError> {
        self.buffer
            .begin_watch(self.table.as_ref(), &mut self.world, handle, scope, target, index)
    }

    /// Close the innermost watch. See [`ChangeBuffer::end_watch`].
    pub fn end_watch(&mut self, token: WatchToken) -> Result<WatchOutcome, WatchError> {
        let scopes = &self.scopes;
        self.buffer.end_watch(
            self.table.as_ref(),
            &mut self.world,
            token,
            Instant::now(),
            |s| scopes.get(&s).map(|st| st.next),
        )
    }

    /// Run `edit` on the world inside a watch of one field.
    pub fn watch<R>(
        &mut self,
        handle: FieldHandle,
        scope: ScopeId,
        target: &Value,
        index: Option<i32>,
        edit: impl FnOnce(&mut W) -> R,
    ) -> Result<(R, WatchOutcome), WatchError> {
        let token = self.begin_watch(handle, scope, target, index)?;
        let out = edit(&mut self.world);
        let outcome = self.end_watch(token)?;
        Ok((out, outcome))
    }

    /// Periodic flush of buffered changes whose interval elapsed.
    pub fn flush(&mut self) -> usize {
        self.flush_buffer(false)
    }

    /// Flush every unsent buffered change now.
    pub fn flush_all(&mut self) -> usize {
        self.flush_buffer(true)
    }

    /// Buffered changes.
    pub fn buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    fn flush_buffer(&mut self, force: bool) -> usize {
        let Self {
            config,
            world,
            transport,
            table,
            capturer,
            scopes,
            buffer,
            ambient,
            ..
        } = &mut *self;
        buffer.flush(
            table.as_ref(),
            &*world,
            Instant::now(),
            |s| scopes.get(&s).map(|st| st.next),
            config.flush_interval,
            force,
            |c| capturer.field(&mut *transport, c.handle, c.scope, ambient, &c.target, c.index, &c.pending),
        )
    }

    // ── Journal ────────────────────────────────────────────────────

    /// Start recording `scope` from its current state.
    pub fn start_journal(&mut self, scope: ScopeId) -> Result<(), EngineError> {
        let state = self
            .scopes
            .get_mut(&scope)
            .ok_or(EngineError::UnknownScope { scope })?;
        state.journal = Some(JournalWriter::new(scope, state.rng.state()));
        Ok(())
    }

    /// Stop recording `scope` and return the journal bytes.
    pub fn take_journal(&mut self, scope: ScopeId) -> Option<Vec<u8>> {
        self.scopes
            .get_mut(&scope)
            .and_then(|s| s.journal.take())
            .map(JournalWriter::into_bytes)
    }

    /// Re-execute a journal against this engine's world and compare the
    /// random-stream state after every tick with the recorded one.
    ///
    /// The journal's scope must exist; its queue is discarded and its
    /// stream rewound to the journal's initial state. The tick limit is
    /// not consulted.
    pub fn replay(&mut self, journal: &[u8]) -> Result<ReplayOutcome, EngineError> {
        let mut reader = JournalReader::open(journal)?;
        let scope = reader.scope();
        {
            let state = self
                .scopes
                .get_mut(&scope)
                .ok_or(EngineError::UnknownScope { scope })?;
            state.rng.restore(reader.initial_state());
            state.queue.clear();
        }

        let mut frames = 0;
        while let Some(frame) = reader.next_frame()? {
            {
                let state = self
                    .scopes
                    .get_mut(&scope)
                    .ok_or(EngineError::UnknownScope { scope })?;
                state.next = frame.tick;
                for cmd in frame.commands {
                    state.queue.push(cmd);
                }
            }
            self.run_tick(scope, TickMode::Replay)?;
            if self.rng_state(scope) != Some(frame.state) {
                log::warn!("replay of {scope} diverged at tick {}", frame.tick);
                return Ok(ReplayOutcome::Diverged {
                    tick: frame.tick,
                    frames,
                });
            }
            frames += 1;
        }
        Ok(ReplayOutcome::Matched { frames })
    }
}

fn execute<W: Simulation>(
    table: &HandlerTable<W>,
    world: &mut W,
    ctx: &mut ExecutionContext<'_>,
    cmd: &Command,
) -> Result<Applied, CommandError> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        table.apply(world, ctx, cmd.handler, &cmd.payload)
    })) {
        Ok(result) => result,
        Err(payload) => Err(CommandError::Panicked {
            handler: table.name_of(cmd.handler).to_string(),
            message: panic_message(&*payload),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
