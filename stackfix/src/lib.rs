//! stackfix: keeps stack introspection truthful while functions are detoured.
//!
//! Once a function is redirected, a stack walk sees the redirection stub
//! instead of the function the caller meant to call. This crate re-hooks the
//! two introspection entry points of a runtime ("which method runs in this
//! frame" and "which module is my caller") and rewrites their answers through
//! an [`IdentityMap`] kept fresh by listening to chain-refresh events.
//!
//! The hook engine, the platform identity layer and the stack walker are
//! consumed through the traits in [`engine`]; nothing here patches code.

pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod install;
pub mod map;
pub mod observer;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use config::Config;
pub use engine::{HookEngine, Platform, StackWalker};
pub use error::{HookError, IntrospectionError};
pub use hooks::caller_module::CallerModuleFix;
pub use hooks::frame_method::FrameMethodFix;
pub use install::{CallerVariant, Installer};
pub use map::IdentityMap;
pub use observer::ChainObserver;
pub use types::{CallFrame, ChainSnapshot, MethodId, MethodRef, ModuleInfo};
