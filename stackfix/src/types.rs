use core::fmt;

/// A method as the engine and platform name it: its entry address.
///
/// Several references may denote the same function definition (a trampoline
/// and the body it jumps to, an address inside the body); only
/// [`MethodId`] is comparable across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(pub usize);

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Canonical identity of one function definition.
///
/// Produced only by [`Platform::identity_of`](crate::Platform::identity_of).
/// Two identities are equal iff they denote the same definition, whatever
/// redirection stub currently sits in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{:#x}", self.0)
    }
}

/// A loaded image owning methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    pub name: String,
    pub path: String,
    pub base_address: usize,
}

/// One activation record of a stack walk.
///
/// `method` is the raw identity as the walker saw it, before any correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub method: Option<MethodId>,
    pub module: Option<ModuleInfo>,
}

impl CallFrame {
    pub fn new(method: Option<MethodId>, module: Option<ModuleInfo>) -> Self {
        Self { method, module }
    }
}

/// State of one redirection chain at the moment it was refreshed.
///
/// `end_of_chain` is the method that actually executes when `original` is
/// called; `None` when the chain has no links left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub original: MethodRef,
    pub end_of_chain: Option<MethodRef>,
}
