//! Foundation utilities shared by every engine subsystem

pub mod logging;
pub mod memory;
pub mod time;

pub use memory::{LinearAllocator, MemoryTag, MemoryTracker};
pub use time::{Clock, Stopwatch};
