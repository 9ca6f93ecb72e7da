//! Core traits and types shared by the CPC emulation crates.
//!
//! Chips talk to memory and I/O through [`Bus`], processors implement
//! [`Cpu`], and every component exposes its state through [`Observable`].

mod bus;
mod cpu;
mod observable;

pub use bus::Bus;
pub use cpu::Cpu;
pub use observable::{Observable, Value};
