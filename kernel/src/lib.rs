//! Demand-paged virtual memory for a small x86 kernel: a bounded user frame pool shared by
//! all processes, second-chance eviction to a swap device, lazily loaded file pages and
//! memory-mapped files.
//!
//! The kernel proper supplies the page directory of each process ([`paging::PageDirectory`]),
//! the files backing its pages ([`fs::File`]) and the swap device ([`block::Block`]).

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

mod macros;

pub mod block;
pub mod config;
pub mod drivers;
pub mod fs;
pub mod mem;
pub mod paging;
pub mod swapping;
pub mod sync;
pub mod vm;
