//! Guest physical memory for the console bus fabric.
//!
//! [`SharedGuestRam`] is main RAM: the CPU/bus path writes it while the display production loop
//! samples the framebuffer window from another thread (see [`shared`]).
#![forbid(unsafe_code)]

mod phys;
pub mod shared;

pub use phys::{GuestMemory, GuestMemoryError, GuestMemoryResult};
pub use shared::{GuestRamView, SharedGuestRam};
