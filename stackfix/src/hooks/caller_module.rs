use std::sync::{Arc, OnceLock};

use log::debug;

use crate::engine::{CallerModuleDetour, CallerModuleFn, CallerModuleHook, Platform, StackWalker};
use crate::error::IntrospectionError;
use crate::hooks::frame_method::FrameMethodFix;
use crate::types::{MethodId, MethodRef, ModuleInfo};

/// Answers "which module is my caller" from the stack instead of from
/// whatever stub happens to be executing.
///
/// Frames are read innermost first and corrected through the identity map.
/// Everything up to and including the marker frame is redirection plumbing;
/// the frame right after it is the genuine caller.
pub struct CallerModuleFix {
    frames: FrameMethodFix,
    platform: Arc<dyn Platform>,
    walker: Arc<dyn StackWalker>,
    detour_source: OnceLock<MethodId>,
}

impl CallerModuleFix {
    pub fn new(
        frames: FrameMethodFix,
        platform: Arc<dyn Platform>,
        walker: Arc<dyn StackWalker>,
    ) -> Self {
        Self {
            frames,
            platform,
            walker,
            detour_source: OnceLock::new(),
        }
    }

    /// Chain variant: the marker is the entry of our own chain.
    pub fn managed(
        &self,
        _orig: &CallerModuleFn<'_>,
        entry: MethodRef,
    ) -> Result<ModuleInfo, IntrospectionError> {
        self.caller_past(self.platform.identity_of(entry))
    }

    /// Raw-detour variant: the marker is the detoured entry point, which our
    /// replacement's frame is corrected to.
    pub fn native(&self) -> Result<ModuleInfo, IntrospectionError> {
        let marker = *self
            .detour_source
            .get()
            .ok_or(IntrospectionError::DetourNotReady)?;
        self.caller_past(marker)
    }

    /// Remember the detoured entry point. Only the first call has an effect.
    pub fn set_detour_source(&self, source: MethodId) {
        if let Err(rejected) = self.detour_source.set(source) {
            if self.detour_source.get() != Some(&rejected) {
                debug!(
                    "Keeping detour source {:?}, ignoring {}",
                    self.detour_source.get(),
                    rejected
                );
            }
        }
    }

    pub fn detour_source(&self) -> Option<MethodId> {
        self.detour_source.get().copied()
    }

    fn caller_past(&self, marker: MethodId) -> Result<ModuleInfo, IntrospectionError> {
        let frames = self.walker.current_call_frames();
        let mut past = frames
            .iter()
            .map(|f| (self.frames.correct(f.method), f))
            .skip_while(|(m, _)| *m != Some(marker));

        if past.next().is_none() {
            return Err(IntrospectionError::MarkerNotFound(marker));
        }
        let (method, frame) = past.next().ok_or(IntrospectionError::NoCaller(marker))?;

        // A corrected method lives where its original definition lives, not
        // where the frame's stub does.
        method
            .and_then(|m| self.platform.module_of(m))
            .or_else(|| frame.module.clone())
            .ok_or(IntrospectionError::UnknownModule(method))
    }

    pub fn into_hook(self: Arc<Self>) -> CallerModuleHook {
        Arc::new(move |orig: &CallerModuleFn<'_>, entry: MethodRef| self.managed(orig, entry))
    }

    pub fn into_detour(self: Arc<Self>) -> CallerModuleDetour {
        Arc::new(move || self.native())
    }
}
