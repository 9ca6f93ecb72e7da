//! Instruction-stepped Zilog Z80 CPU.
//!
//! Each call to `step()` executes one whole instruction and charges the
//! Amstrad CPC cost for it: every instruction is stretched to a multiple of
//! four T-states (one "NOP") by the gate array's memory arbitration, so the
//! cycle tables here are the CPC ones, not the datasheet ones.

mod alu;
mod bus;
mod cpu;
mod flags;
mod registers;
mod tables;

pub use bus::Z80Bus;
pub use cpu::{Z80, Z80State};
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
