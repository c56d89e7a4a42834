use std::sync::Arc;

use crate::engine::{FrameMethodFn, FrameMethodHook};
use crate::map::IdentityMap;
use crate::types::{CallFrame, MethodId};

/// Rewrites "which method runs in this frame" through the identity map.
#[derive(Debug, Clone)]
pub struct FrameMethodFix {
    map: Arc<IdentityMap>,
}

impl FrameMethodFix {
    pub fn new(map: Arc<IdentityMap>) -> Self {
        Self { map }
    }

    /// One lookup, no chasing: `m` maps to its original or stays as is.
    #[inline]
    pub fn correct(&self, method: Option<MethodId>) -> Option<MethodId> {
        let m = method?;
        Some(self.map.get(m).unwrap_or(m))
    }

    pub fn call(&self, orig: &FrameMethodFn, frame: &CallFrame) -> Option<MethodId> {
        self.correct(orig(frame))
    }

    /// Package as a replacement for the engine.
    pub fn into_hook(self) -> FrameMethodHook {
        Arc::new(move |orig: &FrameMethodFn, frame: &CallFrame| self.call(orig, frame))
    }
}
