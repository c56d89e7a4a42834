//! Replacements linked over the two introspection entry points.

pub mod caller_module;
pub mod frame_method;
