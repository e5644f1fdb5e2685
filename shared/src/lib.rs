#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
pub mod macros;

pub mod mem;
pub mod paging;
#[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
pub mod serial;
pub mod sizes;
