//! Locks used by the virtual-memory subsystem.
//!
//! Every lock here spins; none of the VM paths may sleep while holding one
//! except on swap or file I/O, which the device layer performs synchronously.

pub mod mutex;

pub use mutex::{Mutex, MutexGuard};
