//! CPU core trait.

use crate::Bus;

/// An instruction-stepped CPU core.
///
/// CPUs execute whole instructions and charge their cost to an internal
/// T-state counter. The machine interleaves other chips between calls to
/// [`Cpu::run_until`], which keeps the chip timing coarse (one scanline
/// half at a time) but deterministic.
///
/// The bus type is a trait parameter so a core can require a richer bus
/// (interrupt acknowledge, trap hooks) than the plain [`Bus`].
pub trait Cpu<B: Bus + ?Sized> {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction and return the T-states it cost.
    fn step(&mut self, bus: &mut B) -> u32;

    /// Execute instructions until the T-state counter reaches `target`.
    ///
    /// The last instruction may overshoot; the overshoot carries into the
    /// next slice.
    fn run_until(&mut self, bus: &mut B, target: u32) {
        while self.t_states() < target {
            self.step(bus);
        }
    }

    /// Current T-state counter.
    fn t_states(&self) -> u32;

    /// Returns the current program counter.
    fn pc(&self) -> u32;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is halted.
    fn is_halted(&self) -> bool;

    /// Raise the maskable interrupt line. Returns true if it was taken
    /// immediately, false if it is being held until interrupts are enabled.
    fn interrupt(&mut self, bus: &mut B, vector: u8) -> bool;

    /// Request a non-maskable interrupt.
    fn nmi(&mut self, bus: &mut B);

    /// Reset the CPU to its initial state.
    fn reset(&mut self);
}
