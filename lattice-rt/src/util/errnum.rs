//! POSIX-style error numbers used on the wire.
//!
//! Response messages and the `broker.module-status` payload carry an integer
//! `errnum`. The values below cross process boundaries and are part of the
//! protocol contract, so they are fixed here rather than taken from the
//! platform's libc.

/// No such file or directory (missing plugin image, unknown entry).
pub const ENOENT: i32 = 2;

/// Out of memory.
pub const ENOMEM: i32 = 12;

/// Entry already exists (duplicate registration or creation).
pub const EEXIST: i32 = 17;

/// Invalid argument (null or contradictory inputs, bad state transitions).
pub const EINVAL: i32 = 22;

/// Function not implemented (message into a muted module, unknown service).
pub const ENOSYS: i32 = 38;

/// Connection reset (module entry point failed without setting an error).
pub const ECONNRESET: i32 = 104;

/// Human-readable form of a wire error number, for logs and error messages.
pub fn strerror(errnum: i32) -> &'static str {
    match errnum {
        0 => "success",
        ENOENT => "no such entry",
        ENOMEM => "out of memory",
        EEXIST => "entry exists",
        EINVAL => "invalid argument",
        ENOSYS => "not supported",
        ECONNRESET => "connection reset",
        _ => "unknown error",
    }
}
