//! stackfix-native: in-process platform backend for native code.
//!
//! Identities are function start addresses, so any address inside a function
//! (or a return address pointing into it) names the same definition. Starts
//! come from `dladdr`, or from the image's symbol table when the function is
//! not exported; an address no symbol covers is its own identity. Stacks come
//! from a frame-pointer walk.

pub mod backtrace;
pub mod symbol;

use log::debug;
use stackfix::{CallFrame, Config, MethodId, MethodRef, ModuleInfo, Platform, StackWalker};

use crate::symbol::SymbolInfo;

/// `Platform` and `StackWalker` over the current process.
#[derive(Debug, Clone)]
pub struct NativePlatform {
    max_depth: usize,
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl NativePlatform {
    pub fn new(config: &Config) -> Self {
        debug!("Native stack walker capturing up to {} frames", config.max_depth);
        Self {
            max_depth: config.max_depth,
        }
    }

    pub fn from_env() -> Self {
        Self::new(&Config::from_env())
    }

    fn module(info: &SymbolInfo) -> ModuleInfo {
        ModuleInfo {
            name: info.module_name().to_string(),
            path: info.module_path.clone(),
            base_address: info.module_base,
        }
    }
}

impl Platform for NativePlatform {
    fn identity_of(&self, method: MethodRef) -> MethodId {
        let start = symbol::resolve(method.0)
            .and_then(|s| s.start)
            .unwrap_or(method.0);
        MethodId(start as u64)
    }

    fn module_of(&self, method: MethodId) -> Option<ModuleInfo> {
        symbol::resolve(method.0 as usize).map(|s| Self::module(&s))
    }
}

impl StackWalker for NativePlatform {
    fn current_call_frames(&self) -> Vec<CallFrame> {
        backtrace::capture_current(self.max_depth)
            .into_iter()
            .map(|ret| {
                // A return address can sit one past the end of a noreturn call.
                let pc = ret.saturating_sub(1);
                match symbol::resolve(pc) {
                    Some(s) => CallFrame::new(
                        Some(MethodId(s.start.unwrap_or(pc) as u64)),
                        Some(Self::module(&s)),
                    ),
                    None => CallFrame::new(Some(MethodId(pc as u64)), None),
                }
            })
            .collect()
    }
}
