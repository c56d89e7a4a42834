//! Frame-pointer stack capture for the current thread.
//!
//! Both supported ABIs keep a frame record `[previous fp, return address]` at
//! the frame pointer, so one walker serves both. Requires code built with
//! frame pointers (see the workspace `.cargo/config.toml`).

#[cfg(target_arch = "aarch64")]
const FRAME_ALIGN: usize = 16;
#[cfg(not(target_arch = "aarch64"))]
const FRAME_ALIGN: usize = 8;

/// Read a word from an arbitrary pointer without risking SIGSEGV.
///
/// Uses `process_vm_readv(pid=self)` so unmapped addresses come back as
/// `None` instead of faulting.
#[cfg(target_os = "linux")]
fn safe_read_usize(addr: usize) -> Option<usize> {
    if addr < 0x1000 || addr % core::mem::align_of::<usize>() != 0 {
        return None;
    }
    let mut buf = 0usize;
    let word = core::mem::size_of::<usize>();
    let local = libc::iovec {
        iov_base: &mut buf as *mut usize as *mut libc::c_void,
        iov_len: word,
    };
    let remote = libc::iovec {
        iov_base: addr as *mut libc::c_void,
        iov_len: word,
    };
    let ret = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
    (ret == word as isize).then_some(buf)
}

// No fault-safe read outside Linux; frame records are trusted as-is.
#[cfg(not(target_os = "linux"))]
fn safe_read_usize(addr: usize) -> Option<usize> {
    if addr < 0x1000 || addr % core::mem::align_of::<usize>() != 0 {
        return None;
    }
    Some(unsafe { *(addr as *const usize) })
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn frame_pointer() -> usize {
    let fp: usize;
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn frame_pointer() -> usize {
    let fp: usize;
    unsafe {
        core::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn frame_pointer() -> usize {
    0
}

/// Return addresses on the current stack, innermost first.
///
/// The first entry is the return address into this function's caller.
#[inline(never)]
pub fn capture_current(max_depth: usize) -> Vec<usize> {
    if max_depth == 0 {
        return Vec::new();
    }
    walk(frame_pointer(), max_depth)
}

/// Follow frame records starting at `fp`.
pub fn walk(mut fp: usize, max_depth: usize) -> Vec<usize> {
    let mut frames = Vec::with_capacity(max_depth.min(256));
    while frames.len() < max_depth {
        if fp == 0 || fp % FRAME_ALIGN != 0 {
            break;
        }
        let prev_fp = match safe_read_usize(fp) {
            Some(v) => v,
            None => break,
        };
        let ret_addr = match safe_read_usize(fp + core::mem::size_of::<usize>()) {
            Some(v) => v,
            None => break,
        };
        if ret_addr == 0 {
            break;
        }
        frames.push(ret_addr);
        // Stacks grow down; a record that does not move outward ends the walk.
        if prev_fp <= fp {
            break;
        }
        fp = prev_fp;
    }
    frames
}
