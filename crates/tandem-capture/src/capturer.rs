//! The capture entry point used by local call sites.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tandem_core::{HandlerId, PendingCommand, ScopeId, Transport};
use tandem_registry::Value;
use tandem_wire::encode_pending;

use crate::closure::ClosureEnv;
use crate::context::Ambient;
use crate::error::CaptureError;
use crate::handler::HandlerMeta;
use crate::table::{ClosureHandle, FieldHandle, HandlerTable, OperationHandle};

/// Turns local mutations into outbound commands.
///
/// Every successful capture returns `Ok(true)`: the caller must suppress
/// the local mutation, which will arrive back through the scheduler like
/// every other peer's. That keeps exactly one code path that mutates
/// simulation state.
pub struct Capturer<W> {
    table: Arc<HandlerTable<W>>,
    debug_mode: bool,
    /// Per throttled handler, the targets captured within its interval,
    /// oldest first.
    last_capture: HashMap<HandlerId, IndexMap<Vec<u8>, Instant>>,
}

impl<W> Capturer<W> {
    /// A capturer over `table`.
    pub fn new(table: Arc<HandlerTable<W>>, debug_mode: bool) -> Self {
        Self {
            table,
            debug_mode,
            last_capture: HashMap::new(),
        }
    }

    /// The handler table.
    pub fn table(&self) -> &Arc<HandlerTable<W>> {
        &self.table
    }

    /// Whether debug-only handlers may be captured.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Toggle debug mode.
    pub fn set_debug_mode(&mut self, on: bool) {
        self.debug_mode = on;
    }

    fn check_debug(&self, meta: &HandlerMeta, name: &str) -> Result<(), CaptureError> {
        if meta.debug_only && !self.debug_mode {
            log::warn!("debug-only handler '{name}' captured outside debug mode");
            return Err(CaptureError::DebugDisabled {
                handler: name.to_string(),
            });
        }
        Ok(())
    }

    fn send<T: Transport>(transport: &mut T, pending: &PendingCommand) {
        transport.send_command(pending.scope, encode_pending(pending));
    }

    /// Capture "set field of `target` to `value`".
    #[allow(clippy::too_many_arguments)]
    pub fn field<T: Transport>(
        &mut self,
        transport: &mut T,
        handle: FieldHandle,
        scope: ScopeId,
        ambient: &Ambient,
        target: &Value,
        index: Option<i32>,
        value: &Value,
    ) -> Result<bool, CaptureError> {
        let (_, h) = self.table.field(handle)?;
        self.check_debug(h.meta(), h.name())?;
        let pending = self
            .table
            .encode_field(handle, scope, ambient, target, index, value)?;
        Self::send(transport, &pending);
        Ok(true)
    }

    /// Capture "invoke operation on `target` with `args`".
    ///
    /// Throttled captures are suppressed and dropped.
    pub fn operation<T: Transport>(
        &mut self,
        transport: &mut T,
        handle: OperationHandle,
        scope: ScopeId,
        ambient: &Ambient,
        target: &Value,
        args: &[Value],
    ) -> Result<bool, CaptureError> {
        let (id, h) = self.table.operation(handle)?;
        self.check_debug(h.meta(), h.name())?;
        let throttle = h.min_interval.map(|i| (i, h.target.clone(), h.name().to_string()));
        let pending = self
            .table
            .encode_operation(handle, scope, ambient, target, args)?;
        if let Some((interval, target_type, name)) = throttle {
            // Key on the encoded target so equal references throttle together.
            let mut key = scope.to_wire().to_le_bytes().to_vec();
            let encoded = self
                .table
                .registry()
                .to_bytes(&target_type, target)
                .map_err(|source| CaptureError::Encode {
                    handler: name.clone(),
                    source,
                })?;
            key.extend_from_slice(&encoded);
            if self.throttled(id, key, interval) {
                log::debug!("'{name}' throttled");
                return Ok(true);
            }
        }
        Self::send(transport, &pending);
        Ok(true)
    }

    /// Capture "invoke this action".
    pub fn closure<T: Transport>(
        &mut self,
        transport: &mut T,
        handle: ClosureHandle,
        scope: ScopeId,
        ambient: &Ambient,
        env: &ClosureEnv,
    ) -> Result<bool, CaptureError> {
        let (_, h) = self.table.closure(handle)?;
        self.check_debug(h.meta(), h.name())?;
        let pending = self.table.encode_closure(handle, scope, ambient, env)?;
        Self::send(transport, &pending);
        Ok(true)
    }

    fn throttled(&mut self, id: HandlerId, key: Vec<u8>, interval: Duration) -> bool {
        self.throttled_at(id, key, interval, Instant::now())
    }

    fn throttled_at(&mut self, id: HandlerId, key: Vec<u8>, interval: Duration, now: Instant) -> bool {
        let recent = self.last_capture.entry(id).or_default();
        let expired = recent
            .values()
            .take_while(|&&at| now.saturating_duration_since(at) >= interval)
            .count();
        recent.drain(..expired);
        if recent.contains_key(&key) {
            return true;
        }
        recent.insert(key, now);
        false
    }
}
