//! OS process management for the drover core library
//!
//! Only Unix is supported: processes are placed in their own process group
//! so that stop requests reach every descendant.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
