//! One-shot wiring of the observer and both correction hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info};

use crate::config::Config;
use crate::engine::{HookEngine, Platform, StackWalker};
use crate::error::{HookError, IntrospectionError};
use crate::hooks::caller_module::CallerModuleFix;
use crate::hooks::frame_method::FrameMethodFix;
use crate::map::IdentityMap;
use crate::observer::ChainObserver;

/// Which interception technology ended up covering the caller-module entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerVariant {
    /// Linked into a chain over the target's body.
    Managed,
    /// Entry point swapped by raw redirection; the target has no body.
    Native,
}

/// Sets up stack correction once per process.
///
/// Failures are logged, never returned: whatever attached before the failing
/// step stays active and the installer does not retry.
pub struct Installer {
    engine: Arc<dyn HookEngine>,
    platform: Arc<dyn Platform>,
    walker: Arc<dyn StackWalker>,
    map: Arc<IdentityMap>,
    config: Config,
    installed: AtomicBool,
}

impl Installer {
    /// Installer configured from the environment.
    pub fn new(
        engine: Arc<dyn HookEngine>,
        platform: Arc<dyn Platform>,
        walker: Arc<dyn StackWalker>,
    ) -> Self {
        Self::with_config(engine, platform, walker, Config::from_env())
    }

    pub fn with_config(
        engine: Arc<dyn HookEngine>,
        platform: Arc<dyn Platform>,
        walker: Arc<dyn StackWalker>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            platform,
            walker,
            map: Arc::new(IdentityMap::new()),
            config,
            installed: AtomicBool::new(false),
        }
    }

    /// The map shared by the observer and both hooks.
    pub fn map(&self) -> &Arc<IdentityMap> {
        &self.map
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn install(&self) {
        if self.installed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.config.disabled {
            info!("Stack trace fix disabled by STACKFIX_DISABLE");
            return;
        }

        match self.try_install() {
            Ok(variant) => {
                info!("Stack trace fix applied ({:?} caller-module hook)", variant);
                debug!("Identity map holds {} entries", self.map.len());
            }
            Err(e) => {
                error!("Failed to apply stack trace fix: ({}) {:#}", error_kind(&e), e);
            }
        }
    }

    fn try_install(&self) -> Result<CallerVariant> {
        // Subscribe before hooking so no chain refresh slips in between.
        let observer = Arc::new(ChainObserver::new(self.map.clone(), self.platform.clone()));
        observer
            .subscribe(self.engine.as_ref())
            .context("subscribe to chain refresh")?;

        let frames = FrameMethodFix::new(self.map.clone());
        self.engine
            .hook_frame_method(frames.clone().into_hook())
            .context("hook frame-method lookup")?;

        let target = self
            .engine
            .caller_module_target()
            .context("locate caller-module entry point")?;
        let fix = Arc::new(CallerModuleFix::new(
            frames,
            self.platform.clone(),
            self.walker.clone(),
        ));

        if self.engine.has_body(target) {
            let info = self
                .engine
                .hook_caller_module(fix.into_hook())
                .context("hook caller-module lookup")?;
            debug!("Caller-module hook linked at entry {}", info.entry);
            return Ok(CallerVariant::Managed);
        }

        let detour = self
            .engine
            .detour_caller_module(fix.clone().into_detour())
            .context("detour caller-module entry point")?;
        let source = self.platform.identity_of(detour.source);
        // Raw redirection fires no chain refresh, so record it here. The
        // entry must be visible before the marker is, or the thunk frame
        // would hide the marker.
        self.map.put(self.platform.identity_of(detour.replacement), source);
        fix.set_detour_source(source);
        Ok(CallerVariant::Native)
    }
}

fn error_kind(e: &anyhow::Error) -> &'static str {
    for cause in e.chain() {
        if let Some(h) = cause.downcast_ref::<HookError>() {
            return h.kind();
        }
        if let Some(i) = cause.downcast_ref::<IntrospectionError>() {
            return i.kind();
        }
    }
    "anyhow::Error"
}
