//! Simulated runtime for integration tests.
//!
//! `SimRuntime` plays all three external roles: a detour engine with
//! per-target redirection chains, a platform whose identities are the method
//! addresses, and a per-thread call stack that `call` pushes onto.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stackfix::engine::{
    CallerModuleDetour, CallerModuleHook, ChainEvent, ChainHandler, FrameMethodHook, HookInfo,
    NativeDetour,
};
use stackfix::{
    CallFrame, ChainSnapshot, Config, HookEngine, HookError, Installer, IntrospectionError,
    MethodId, MethodRef, ModuleInfo, Platform, StackWalker,
};

/// The runtime's frame-method entry point.
pub const FRAME_METHOD: MethodRef = MethodRef(0x100);
/// Chain entry created when the frame-method operation is hooked.
pub const FRAME_METHOD_ENTRY: MethodRef = MethodRef(0x110);
/// The runtime's caller-module entry point.
pub const CALLER_MODULE: MethodRef = MethodRef(0x200);
/// Chain entry created when the caller-module operation is hooked.
pub const CALLER_MODULE_ENTRY: MethodRef = MethodRef(0x210);
/// Generated method that invokes the chain-based caller-module replacement.
pub const CALLER_MODULE_HOOK_BODY: MethodRef = MethodRef(0x220);
/// Thunk the caller-module entry point is redirected to when it has no body.
pub const CALLER_MODULE_THUNK: MethodRef = MethodRef(0x230);

/// Interception steps a test can make the engine refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Subscribe,
    FrameMethod,
    CallerTarget,
    CallerModule,
    Detour,
}

thread_local! {
    static STACK: RefCell<Vec<MethodRef>> = const { RefCell::new(Vec::new()) };
}

struct PopOnDrop;

impl Drop for PopOnDrop {
    fn drop(&mut self) {
        STACK.with(|s| s.borrow_mut().pop());
    }
}

fn push_frame(method: MethodRef) -> PopOnDrop {
    STACK.with(|s| s.borrow_mut().push(method));
    PopOnDrop
}

pub fn module(name: &str) -> ModuleInfo {
    ModuleInfo {
        name: name.to_string(),
        path: format!("/sim/{name}.so"),
        base_address: 0,
    }
}

#[derive(Default)]
struct State {
    methods: HashMap<MethodRef, ModuleInfo>,
    chains: HashMap<MethodRef, Vec<MethodRef>>,
}

pub struct SimRuntime {
    state: Mutex<State>,
    handlers: Mutex<HashMap<ChainEvent, Vec<ChainHandler>>>,
    frame_hook: Mutex<Option<FrameMethodHook>>,
    caller_hook: Mutex<Option<CallerModuleHook>>,
    caller_detour: Mutex<Option<CallerModuleDetour>>,
    caller_has_body: bool,
    refused: Mutex<HashSet<Step>>,
    next_address: AtomicUsize,
    attach_calls: AtomicUsize,
}

impl SimRuntime {
    /// Runtime whose caller-module entry point has an inspectable body.
    pub fn managed() -> Arc<Self> {
        Arc::new(Self::new(true))
    }

    /// Runtime whose caller-module entry point can only be redirected raw.
    pub fn native() -> Arc<Self> {
        Arc::new(Self::new(false))
    }

    fn new(caller_has_body: bool) -> Self {
        let mut state = State::default();
        for (m, name) in [
            (FRAME_METHOD, "runtime"),
            (CALLER_MODULE, "runtime"),
            (FRAME_METHOD_ENTRY, "engine"),
            (CALLER_MODULE_ENTRY, "engine"),
            (CALLER_MODULE_HOOK_BODY, "stackfix"),
            (CALLER_MODULE_THUNK, "stackfix"),
        ] {
            state.methods.insert(m, module(name));
        }
        Self {
            state: Mutex::new(state),
            handlers: Mutex::new(HashMap::new()),
            frame_hook: Mutex::new(None),
            caller_hook: Mutex::new(None),
            caller_detour: Mutex::new(None),
            caller_has_body,
            refused: Mutex::new(HashSet::new()),
            next_address: AtomicUsize::new(0x10_000),
            attach_calls: AtomicUsize::new(0),
        }
    }

    pub fn installer(self: &Arc<Self>) -> Installer {
        Installer::with_config(self.clone(), self.clone(), self.clone(), Config::default())
    }

    pub fn refuse(&self, step: Step) {
        self.refused.lock().unwrap().insert(step);
    }

    fn check(&self, step: Step, target: &str) -> Result<(), HookError> {
        if self.refused.lock().unwrap().contains(&step) {
            return Err(HookError::Rejected {
                target: target.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        Ok(())
    }

    /// Number of successful interceptions and subscriptions so far.
    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    /// Define a new method owned by `module_name`.
    pub fn define(&self, module_name: &str) -> MethodRef {
        let m = MethodRef(self.next_address.fetch_add(0x10, Ordering::SeqCst));
        self.state.lock().unwrap().methods.insert(m, module(module_name));
        m
    }

    /// Link a new patch stub (owned by "patches") onto `target`'s chain.
    pub fn apply_chain(&self, target: MethodRef) -> MethodRef {
        let stub = self.define("patches");
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let chain = state.chains.entry(target).or_default();
            chain.push(stub);
            ChainSnapshot {
                original: target,
                end_of_chain: chain.last().copied(),
            }
        };
        self.fire(ChainEvent::Applied, &snapshot);
        stub
    }

    /// Unlink the newest patch stub from `target`'s chain.
    pub fn undo_chain(&self, target: MethodRef) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let chain = state.chains.entry(target).or_default();
            chain.pop();
            ChainSnapshot {
                original: target,
                end_of_chain: chain.last().copied(),
            }
        };
        self.fire(ChainEvent::Undone, &snapshot);
    }

    fn fire(&self, event: ChainEvent, snapshot: &ChainSnapshot) {
        let handlers = self
            .handlers
            .lock()
            .unwrap()
            .get(&event)
            .cloned()
            .unwrap_or_default();
        for h in handlers {
            h(snapshot);
        }
    }

    /// What actually runs when `method` is called.
    pub fn executing(&self, method: MethodRef) -> MethodRef {
        let state = self.state.lock().unwrap();
        state
            .chains
            .get(&method)
            .and_then(|c| c.last().copied())
            .unwrap_or(method)
    }

    /// Call `method`, running `body` with its (possibly patched) frame on the stack.
    pub fn call<R>(&self, method: MethodRef, body: impl FnOnce() -> R) -> R {
        let _frame = push_frame(self.executing(method));
        body()
    }

    pub fn frame(&self, method: MethodRef) -> CallFrame {
        CallFrame::new(Some(self.identity_of(method)), self.module_of(self.identity_of(method)))
    }

    /// The runtime's frame-method entry point, as user code reaches it.
    pub fn frame_method(&self, frame: &CallFrame) -> Option<MethodId> {
        let original = |f: &CallFrame| f.method;
        let hook = self.frame_hook.lock().unwrap().clone();
        match hook {
            Some(h) => h(&original, frame),
            None => original(frame),
        }
    }

    /// The runtime's caller-module entry point, as user code reaches it.
    ///
    /// Unpatched, it reports the module of whatever frame is innermost, which
    /// is a patch stub whenever the caller itself is patched.
    pub fn caller_module(&self) -> Result<ModuleInfo, IntrospectionError> {
        let original = || -> Result<ModuleInfo, IntrospectionError> {
            let frames = self.current_call_frames();
            let innermost = frames.first().ok_or(IntrospectionError::NoCaller(MethodId(0)))?;
            innermost
                .module
                .clone()
                .ok_or(IntrospectionError::UnknownModule(innermost.method))
        };

        let detour = self.caller_detour.lock().unwrap().clone();
        if let Some(d) = detour {
            let _thunk = push_frame(CALLER_MODULE_THUNK);
            return d();
        }
        let hook = self.caller_hook.lock().unwrap().clone();
        match hook {
            Some(h) => {
                let _entry = push_frame(CALLER_MODULE_ENTRY);
                let _body = push_frame(CALLER_MODULE_HOOK_BODY);
                h(&original, CALLER_MODULE_ENTRY)
            }
            None => original(),
        }
    }
}

impl HookEngine for SimRuntime {
    fn subscribe(&self, event: ChainEvent, handler: ChainHandler) -> Result<(), HookError> {
        self.check(Step::Subscribe, "chain events")?;
        self.handlers.lock().unwrap().entry(event).or_default().push(handler);
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn hook_frame_method(&self, hook: FrameMethodHook) -> Result<HookInfo, HookError> {
        self.check(Step::FrameMethod, "frame_method")?;
        let mut slot = self.frame_hook.lock().unwrap();
        if slot.is_some() {
            return Err(HookError::AlreadyAttached("frame_method".to_string()));
        }
        *slot = Some(hook);
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HookInfo {
            entry: FRAME_METHOD_ENTRY,
        })
    }

    fn caller_module_target(&self) -> Result<MethodRef, HookError> {
        self.check(Step::CallerTarget, "caller_module")?;
        Ok(CALLER_MODULE)
    }

    fn has_body(&self, method: MethodRef) -> bool {
        method == CALLER_MODULE && self.caller_has_body
    }

    fn hook_caller_module(&self, hook: CallerModuleHook) -> Result<HookInfo, HookError> {
        self.check(Step::CallerModule, "caller_module")?;
        let mut slot = self.caller_hook.lock().unwrap();
        if slot.is_some() {
            return Err(HookError::AlreadyAttached("caller_module".to_string()));
        }
        *slot = Some(hook);
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HookInfo {
            entry: CALLER_MODULE_ENTRY,
        })
    }

    fn detour_caller_module(
        &self,
        replacement: CallerModuleDetour,
    ) -> Result<NativeDetour, HookError> {
        self.check(Step::Detour, "caller_module")?;
        let mut slot = self.caller_detour.lock().unwrap();
        if slot.is_some() {
            return Err(HookError::AlreadyAttached("caller_module".to_string()));
        }
        *slot = Some(replacement);
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(NativeDetour {
            source: CALLER_MODULE,
            replacement: CALLER_MODULE_THUNK,
        })
    }
}

impl Platform for SimRuntime {
    fn identity_of(&self, method: MethodRef) -> MethodId {
        MethodId(method.0 as u64)
    }

    fn module_of(&self, method: MethodId) -> Option<ModuleInfo> {
        let state = self.state.lock().unwrap();
        state.methods.get(&MethodRef(method.0 as usize)).cloned()
    }
}

impl StackWalker for SimRuntime {
    fn current_call_frames(&self) -> Vec<CallFrame> {
        let raw: Vec<MethodRef> = STACK.with(|s| s.borrow().iter().rev().copied().collect());
        raw.into_iter().map(|m| self.frame(m)).collect()
    }
}

/// Captures log records per thread so parallel tests can count their own.
pub mod logs {
    use std::sync::{Mutex, Once};
    use std::thread::ThreadId;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    struct Capture;

    static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());
    static LOGGER: Capture = Capture;
    static INIT: Once = Once::new();

    impl Log for Capture {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.lock().unwrap().push((
                std::thread::current().id(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    pub fn init() {
        INIT.call_once(|| {
            log::set_logger(&LOGGER).expect("logger already set");
            log::set_max_level(LevelFilter::Trace);
        });
    }

    /// Error-level messages logged by the current thread.
    pub fn errors() -> Vec<String> {
        let me = std::thread::current().id();
        RECORDS
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, l, _)| *t == me && *l == Level::Error)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}
