//! Capabilities the correction layer consumes.
//!
//! A runtime integration implements [`HookEngine`] (interception plus
//! chain-refresh notification), [`Platform`] (canonical identities and
//! owning modules) and [`StackWalker`] (the live call stack). The core only
//! registers replacement callables through these seams.

use std::sync::Arc;

use crate::error::{HookError, IntrospectionError};
use crate::types::{CallFrame, ChainSnapshot, MethodId, MethodRef, ModuleInfo};

/// The runtime's "which method runs in this frame" operation.
pub type FrameMethodFn = dyn Fn(&CallFrame) -> Option<MethodId> + Send + Sync;

/// Replacement for [`FrameMethodFn`]; receives the original operation.
pub type FrameMethodHook =
    Arc<dyn Fn(&FrameMethodFn, &CallFrame) -> Option<MethodId> + Send + Sync>;

/// The runtime's "which module is executing (on behalf of my caller)" operation.
pub type CallerModuleFn<'a> = dyn Fn() -> Result<ModuleInfo, IntrospectionError> + Send + Sync + 'a;

/// Chain-based replacement for [`CallerModuleFn`].
///
/// Receives the original operation and the entry of its own chain, which is
/// the frame that marks where redirection plumbing ends on the stack.
pub type CallerModuleHook = Arc<
    dyn Fn(&CallerModuleFn<'_>, MethodRef) -> Result<ModuleInfo, IntrospectionError> + Send + Sync,
>;

/// Replacement swapped in by raw entry-point redirection; no original is passed.
pub type CallerModuleDetour =
    Arc<dyn Fn() -> Result<ModuleInfo, IntrospectionError> + Send + Sync>;

/// Callback fired whenever a redirection chain changes.
pub type ChainHandler = Arc<dyn Fn(&ChainSnapshot) + Send + Sync>;

/// Chain lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainEvent {
    Applied,
    Undone,
}

/// Result of a chain-based interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookInfo {
    /// Entry of the chain the replacement was linked into.
    pub entry: MethodRef,
}

/// Result of a raw entry-point redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDetour {
    /// The redirected entry point.
    pub source: MethodRef,
    /// What now executes in its place.
    pub replacement: MethodRef,
}

/// Interception capability supplied by the detour engine.
pub trait HookEngine: Send + Sync {
    /// Register `handler` for one chain lifecycle event.
    fn subscribe(&self, event: ChainEvent, handler: ChainHandler) -> Result<(), HookError>;

    /// Link `hook` into the chain of the frame-method operation.
    fn hook_frame_method(&self, hook: FrameMethodHook) -> Result<HookInfo, HookError>;

    /// Locate the caller-module entry point.
    fn caller_module_target(&self) -> Result<MethodRef, HookError>;

    /// Whether `method` has a body the engine can build a chain over.
    fn has_body(&self, method: MethodRef) -> bool;

    /// Link `hook` into the chain of the caller-module operation.
    fn hook_caller_module(&self, hook: CallerModuleHook) -> Result<HookInfo, HookError>;

    /// Redirect the caller-module entry point to `replacement`.
    fn detour_caller_module(&self, replacement: CallerModuleDetour)
        -> Result<NativeDetour, HookError>;
}

/// Identity and ownership queries supplied by the platform layer.
pub trait Platform: Send + Sync {
    /// Canonical identity of `method`. Must be pure and deterministic.
    fn identity_of(&self, method: MethodRef) -> MethodId;

    /// Module owning the definition of `method`.
    fn module_of(&self, method: MethodId) -> Option<ModuleInfo>;
}

/// Access to the live call stack of the current thread.
pub trait StackWalker: Send + Sync {
    /// Frames presently on the stack, innermost first.
    fn current_call_frames(&self) -> Vec<CallFrame>;
}
