//! Instruction-level behaviour and CPC timing.

use emu_core::{Bus, Cpu};
use zilog_z80::{CF, HF, NF, PF, Registers, SF, Z80, Z80Bus, ZF};

struct TestBus {
    mem: Vec<u8>,
    io_writes: Vec<(u16, u8)>,
    io_value: u8,
    fd_hooks: Vec<(u8, u8, u8, u8)>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            mem: vec![0; 0x10000],
            io_writes: Vec::new(),
            io_value: 0xFF,
            fd_hooks: Vec::new(),
        }
    }

    fn load(&mut self, addr: u16, code: &[u8]) {
        let start = addr as usize;
        self.mem[start..start + code.len()].copy_from_slice(code);
    }
}

impl Bus for TestBus {
    fn read(&mut self, address: u16) -> u8 {
        self.mem[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.mem[address as usize] = value;
    }

    fn io_read(&mut self, _port: u16) -> u8 {
        self.io_value
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.io_writes.push((port, value));
    }
}

impl Z80Bus for TestBus {
    fn fd_prefix_repeat(&mut self, next: u8, regs: &Registers) {
        self.fd_hooks.push((next, regs.a, regs.b, regs.c));
    }
}

fn run(code: &[u8]) -> (Z80, TestBus) {
    let mut bus = TestBus::new();
    bus.load(0x4000, code);
    let mut cpu = Z80::new();
    cpu.set_pc(0x4000);
    (cpu, bus)
}

fn t(cpu: &Z80) -> u32 {
    cpu.t_states()
}

#[test]
fn unconditional_costs_match_cpc_table() {
    // NOP, LD BC,nn, LD (HL),n, PUSH BC, POP BC, EX (SP),HL, CALL nn
    let cases: &[(&[u8], u32)] = &[
        (&[0x00], 4),
        (&[0x01, 0x34, 0x12], 12),
        (&[0x36, 0x55], 12),
        (&[0xC5], 16),
        (&[0xC1], 12),
        (&[0xE3], 24),
        (&[0xCD, 0x00, 0x80], 20),
        (&[0xCB, 0x06], 16),
        (&[0xCB, 0x46], 12),
        (&[0xED, 0x44], 8),
        (&[0xDD, 0x21, 0x00, 0x00], 16),
        (&[0xDD, 0x7E, 0x05], 20),
        (&[0xDD, 0xCB, 0x01, 0x06], 28),
        (&[0xFD, 0xCB, 0x01, 0x46], 24),
    ];
    for (code, expected) in cases {
        let (mut cpu, mut bus) = run(code);
        let before = t(&cpu);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, *expected, "opcode {code:02X?}");
        assert_eq!(t(&cpu) - before, *expected, "counter for {code:02X?}");
    }
}

#[test]
fn conditional_branch_compensation() {
    // JR NZ taken (Z clear) = 12, not taken = 8
    let (mut cpu, mut bus) = run(&[0x20, 0x02]);
    cpu.set_f(0);
    assert_eq!(cpu.step(&mut bus), 12);
    assert_eq!(cpu.pc(), 0x4004);

    let (mut cpu, mut bus) = run(&[0x20, 0x02]);
    cpu.set_f(ZF);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.pc(), 0x4002);

    // CALL Z taken = 20, RET Z taken = 16, not taken = 8
    let (mut cpu, mut bus) = run(&[0xCC, 0x00, 0x50]);
    bus.load(0x5000, &[0xC8]);
    cpu.set_f(ZF);
    assert_eq!(cpu.step(&mut bus), 20);
    assert_eq!(cpu.step(&mut bus), 16);
    assert_eq!(cpu.pc(), 0x4003);

    let (mut cpu, mut bus) = run(&[0xC8]);
    cpu.set_f(0);
    assert_eq!(cpu.step(&mut bus), 8);
}

#[test]
fn djnz_loop_timing() {
    // LD B,3 ; DJNZ -2
    let (mut cpu, mut bus) = run(&[0x06, 0x03, 0x10, 0xFE]);
    cpu.step(&mut bus);
    let costs: Vec<u32> = (0..3).map(|_| cpu.step(&mut bus)).collect();
    assert_eq!(costs, vec![16, 16, 12]);
    assert_eq!(cpu.pc(), 0x4004);
}

#[test]
fn ldir_copies_and_times_each_iteration() {
    // LDIR with BC=3
    let (mut cpu, mut bus) = run(&[0xED, 0xB0]);
    bus.load(0x8000, &[1, 2, 3]);
    cpu.set_hl(0x8000);
    cpu.set_de(0x9000);
    cpu.set_bc(3);
    let costs: Vec<u32> = (0..3).map(|_| cpu.step(&mut bus)).collect();
    assert_eq!(costs, vec![24, 24, 20]);
    assert_eq!(&bus.mem[0x9000..0x9003], &[1, 2, 3]);
    assert_eq!(cpu.registers().bc(), 0);
    assert_eq!(cpu.registers().f & PF, 0, "P/V clear when BC reaches 0");
    assert_eq!(cpu.pc(), 0x4002);
}

#[test]
fn refresh_counter_counts_m1_cycles() {
    // NOP ; CB 00 ; DD 21 nn ; ED 44
    let (mut cpu, mut bus) = run(&[0x00, 0xCB, 0x00, 0xDD, 0x21, 0, 0, 0xED, 0x44]);
    for _ in 0..4 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.registers().r_value(), 1 + 2 + 2 + 2);
}

#[test]
fn add_sub_flags() {
    // LD A,0x7F ; ADD A,1 ; SUB 0x81
    let (mut cpu, mut bus) = run(&[0x3E, 0x7F, 0xC6, 0x01, 0xD6, 0x81]);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    let regs = cpu.registers();
    assert_eq!(regs.a, 0x80);
    assert_eq!(regs.f & (SF | PF | HF), SF | PF | HF);
    cpu.step(&mut bus);
    let regs = cpu.registers();
    assert_eq!(regs.a, 0xFF);
    assert_eq!(regs.f & (CF | NF | SF), CF | NF | SF);
}

#[test]
fn daa_corrects_bcd_addition() {
    // LD A,0x19 ; ADD A,0x28 ; DAA
    let (mut cpu, mut bus) = run(&[0x3E, 0x19, 0xC6, 0x28, 0x27]);
    for _ in 0..3 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.registers().a, 0x47);
}

#[test]
fn index_displacement_and_halves() {
    // LD IX,0x8000 ; LD (IX-1),0x42 ; LD A,(IX-1) ; LD IXH,0x12 ; LD B,IXH
    let code = [
        0xDD, 0x21, 0x00, 0x80, 0xDD, 0x36, 0xFF, 0x42, 0xDD, 0x7E, 0xFF, 0xDD, 0x26, 0x12, 0xDD,
        0x44,
    ];
    let (mut cpu, mut bus) = run(&code);
    for _ in 0..5 {
        cpu.step(&mut bus);
    }
    assert_eq!(bus.mem[0x7FFF], 0x42);
    let regs = cpu.registers();
    assert_eq!(regs.a, 0x42);
    assert_eq!(regs.ix, 0x1200);
    assert_eq!(regs.b, 0x12);
}

#[test]
fn index_prefix_without_hl_falls_through() {
    // DD 04 = INC B, one NOP for the prefix on top
    let (mut cpu, mut bus) = run(&[0xDD, 0x04]);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.registers().b, 1);
}

#[test]
fn out_uses_full_bc_as_port() {
    // LD BC,0x7F00 ; LD A,0x8D ; OUT (C),A
    let (mut cpu, mut bus) = run(&[0x01, 0x00, 0x7F, 0x3E, 0x8D, 0xED, 0x79]);
    for _ in 0..3 {
        cpu.step(&mut bus);
    }
    assert_eq!(bus.io_writes, vec![(0x7F00, 0x8D)]);
}

#[test]
fn out_n_puts_a_on_high_byte() {
    // LD A,0xF4 ; OUT (0x0E),A
    let (mut cpu, mut bus) = run(&[0x3E, 0xF4, 0xD3, 0x0E]);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(bus.io_writes, vec![(0xF40E, 0xF4)]);
}

#[test]
fn in_r_c_sets_flags() {
    let (mut cpu, mut bus) = run(&[0xED, 0x78]);
    bus.io_value = 0x00;
    cpu.set_f(CF);
    cpu.step(&mut bus);
    let regs = cpu.registers();
    assert_eq!(regs.a, 0);
    assert_eq!(regs.f, ZF | PF | CF);
}

#[test]
fn repeated_fd_prefix_reaches_bus_hook() {
    // LD A,0x8A ; LD BC,0x0203 ; FD FD 77 00
    let (mut cpu, mut bus) = run(&[0x3E, 0x8A, 0x01, 0x03, 0x02, 0xFD, 0xFD, 0x77, 0x00]);
    cpu.set_iy(0x9000);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 4, "redundant prefix costs one NOP");
    assert_eq!(bus.fd_hooks, vec![(0x77, 0x8A, 0x02, 0x03)]);
    // The second FD is decoded as the start of LD (IY+0),A
    cpu.step(&mut bus);
    assert_eq!(bus.mem[0x9000], 0x8A);
}

#[test]
fn rld_rotates_nibbles() {
    let (mut cpu, mut bus) = run(&[0xED, 0x6F]);
    bus.mem[0x8000] = 0x34;
    cpu.set_hl(0x8000);
    cpu.set_a(0x12);
    cpu.step(&mut bus);
    assert_eq!(cpu.registers().a, 0x13);
    assert_eq!(bus.mem[0x8000], 0x42);
}

#[test]
fn exx_and_ex_af() {
    // LD BC,0x1111 ; EXX ; LD BC,0x2222 ; EXX ; EX AF,AF'
    let (mut cpu, mut bus) = run(&[0x01, 0x11, 0x11, 0xD9, 0x01, 0x22, 0x22, 0xD9, 0x08]);
    cpu.set_a(0x55);
    for _ in 0..5 {
        cpu.step(&mut bus);
    }
    let regs = cpu.registers();
    assert_eq!(regs.bc(), 0x1111);
    assert_eq!(regs.bc_alt(), 0x2222);
    assert_eq!(regs.a_alt, 0x55);
}

#[test]
fn run_until_reaches_target() {
    let (mut cpu, mut bus) = run(&[0x00; 64]);
    cpu.run_until(&mut bus, 128);
    assert_eq!(t(&cpu), 128);
    cpu.rebase(100);
    assert_eq!(t(&cpu), 28);
}
