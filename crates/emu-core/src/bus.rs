//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// Components access memory and peripherals through this trait. The bus
/// handles address decoding and routing to the appropriate device. Memory
/// and I/O are separate address spaces; on the CPC every peripheral is
/// selected by clearing address lines in the 16-bit port number.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte from an I/O port.
    fn io_read(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8);
}
