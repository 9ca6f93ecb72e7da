//! General Instrument AY-3-8910 Programmable Sound Generator.
//!
//! Three square-wave tone channels, one shared noise source and one shared
//! envelope, mixed per channel and downsampled to the host sample rate.
//! On the CPC the chip is clocked at 1 MHz and is reached only through the
//! 8255 PPI: port A carries the data bus, port C bits 7-6 carry BDIR/BC1.
//! The chip's own I/O port A (R14) is wired to the keyboard matrix.
//!
//! # Register map
//!
//! | Reg     | Use                       | Bits |
//! |---------|---------------------------|------|
//! | R0-R5   | Tone period A, B, C       | fine 7-0, coarse 3-0 |
//! | R6      | Noise period              | 4-0  |
//! | R7      | Mixer (active low)        | 5-0  |
//! | R8-R10  | Volume A, B, C / envelope | 4-0  |
//! | R11-R12 | Envelope period           | 15-0 |
//! | R13     | Envelope shape            | 3-0  |
//! | R14-R15 | I/O ports                 | 7-0  |

#![allow(clippy::cast_precision_loss)]

use emu_core::{Observable, Value};

/// CPC PSG clock.
pub const CPC_CLOCK: u32 = 1_000_000;

/// Bits implemented by each register; the rest read back as zero.
pub const REGISTER_MASKS: [u8; 16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, 0x1F, 0xFF, 0x1F, 0x1F, 0x1F, 0xFF, 0xFF, 0x0F, 0xFF,
    0xFF,
];

/// DAC output level for each 4-bit volume, normalised to 0.0-1.0.
const VOLUME_TABLE: [f32; 16] = [
    0.0000, 0.0106, 0.0150, 0.0222, 0.0320, 0.0466, 0.0665, 0.1039, 0.1237, 0.1986, 0.2803,
    0.3548, 0.4702, 0.6030, 0.7530, 1.0000,
];

/// Square wave with a 12-bit period.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Tone {
    period: u16,
    counter: u16,
    high: bool,
}

impl Tone {
    /// One tick at clock / 8.
    fn clock(&mut self) {
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.counter = self.period.max(1);
            self.high = !self.high;
        }
    }
}

/// 17-bit LFSR with a 5-bit period.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Noise {
    period: u8,
    counter: u8,
    lfsr: u32,
    high: bool,
}

impl Noise {
    fn new() -> Self {
        Self {
            period: 0,
            counter: 0,
            lfsr: 1,
            high: false,
        }
    }

    /// One tick at clock / 8.
    fn clock(&mut self) {
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.counter = self.period.max(1);
            let feedback = (self.lfsr ^ (self.lfsr >> 3)) & 1;
            self.lfsr = (self.lfsr >> 1) | (feedback << 16);
            self.high = self.lfsr & 1 != 0;
        }
    }
}

/// Envelope: 16 steps per cycle, shape from R13.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Envelope {
    period: u16,
    counter: u16,
    step: u8,
    holding: bool,
    attack: bool,
    shape: u8,
}

impl Envelope {
    /// One tick at clock / 16.
    fn clock(&mut self) {
        if self.holding {
            return;
        }
        self.counter = self.counter.saturating_sub(1);
        if self.counter > 0 {
            return;
        }
        self.counter = self.period.max(1);
        self.step += 1;
        if self.step < 16 {
            return;
        }

        let cont = self.shape & 0x08 != 0;
        let alternate = self.shape & 0x02 != 0;
        let hold = self.shape & 0x01 != 0;
        match (cont, hold) {
            // Shapes 0-7: one ramp then silence
            (false, _) => {
                self.holding = true;
                self.step = 0;
                self.attack = false;
            }
            (true, true) => {
                self.holding = true;
                self.step = 15;
                if alternate {
                    self.attack = !self.attack;
                }
            }
            (true, false) => {
                self.step = 0;
                if alternate {
                    self.attack = !self.attack;
                }
            }
        }
    }

    /// Writing R13 restarts the envelope.
    fn restart(&mut self, shape: u8) {
        self.shape = shape & 0x0F;
        self.step = 0;
        self.counter = self.period.max(1);
        self.holding = false;
        self.attack = shape & 0x04 != 0;
    }

    fn level(&self) -> u8 {
        if self.holding {
            // Shapes 0-7 end silent; hold shapes keep the final level
            return if self.shape & 0x08 != 0 && self.attack { 15 } else { 0 };
        }
        let step = self.step.min(15);
        if self.attack { step } else { 15 - step }
    }
}

/// Stereo placement of the three channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StereoMode {
    /// All channels to both outputs.
    Mono,
    /// A left, B centre, C right (CPC stereo jack).
    #[default]
    Abc,
}

/// AY-3-8910 Programmable Sound Generator.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ay3_8910 {
    regs: [u8; 16],
    selected: u8,

    tone: [Tone; 3],
    noise: Noise,
    envelope: Envelope,
    divider: u32,

    // Downsampling
    accumulator: (f32, f32),
    accumulated: u32,
    phase: f32,
    ticks_per_sample: f32,
    #[cfg_attr(feature = "serde", serde(skip))]
    buffer: Vec<[f32; 2]>,

    stereo: StereoMode,
}

impl Ay3_8910 {
    /// `clock_freq` is the chip input clock in Hz ([`CPC_CLOCK`] on the
    /// CPC), `sample_rate` the host output rate.
    #[must_use]
    pub fn new(clock_freq: u32, sample_rate: u32) -> Self {
        Self {
            regs: [0; 16],
            selected: 0,
            tone: [Tone::default(), Tone::default(), Tone::default()],
            noise: Noise::new(),
            envelope: Envelope::default(),
            divider: 0,
            accumulator: (0.0, 0.0),
            accumulated: 0,
            phase: 0.0,
            ticks_per_sample: clock_freq as f32 / sample_rate.max(1) as f32,
            buffer: Vec::with_capacity(sample_rate as usize / 50 + 1),
            stereo: StereoMode::Abc,
        }
    }

    /// Clear every register and generator. The output buffer is kept.
    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.selected = 0;
        self.tone = [Tone::default(), Tone::default(), Tone::default()];
        self.noise = Noise::new();
        self.envelope = Envelope::default();
        self.divider = 0;
    }

    pub fn set_stereo(&mut self, mode: StereoMode) {
        self.stereo = mode;
    }

    /// Latch a register address. Values above 15 deselect the chip on real
    /// hardware; the CPC glue never sends them, so only the low bits count.
    pub fn select_register(&mut self, reg: u8) {
        self.selected = reg & 0x0F;
    }

    #[must_use]
    pub fn selected_register(&self) -> u8 {
        self.selected
    }

    /// Write the selected register.
    pub fn write_data(&mut self, value: u8) {
        let reg = usize::from(self.selected);
        let value = value & REGISTER_MASKS[reg];
        self.regs[reg] = value;

        match reg {
            0..=5 => {
                let ch = reg / 2;
                self.tone[ch].period =
                    u16::from(self.regs[ch * 2]) | (u16::from(self.regs[ch * 2 + 1]) << 8);
            }
            6 => self.noise.period = value,
            11 | 12 => {
                self.envelope.period = u16::from(self.regs[11]) | (u16::from(self.regs[12]) << 8);
            }
            13 => {
                self.envelope.period = u16::from(self.regs[11]) | (u16::from(self.regs[12]) << 8);
                self.envelope.restart(value);
            }
            _ => {}
        }
    }

    /// Read the selected register.
    #[must_use]
    pub fn read_data(&self) -> u8 {
        self.regs[usize::from(self.selected)]
    }

    /// The full register file (snapshot save).
    #[must_use]
    pub fn registers(&self) -> [u8; 16] {
        self.regs
    }

    /// Load every register as if written in order (snapshot restore).
    /// The selected register is left unchanged.
    pub fn load_registers(&mut self, regs: &[u8; 16]) {
        let selected = self.selected;
        for (reg, &value) in regs.iter().enumerate() {
            self.selected = reg as u8;
            self.write_data(value);
        }
        self.selected = selected;
    }

    /// Advance by one input clock.
    pub fn tick(&mut self) {
        self.divider = self.divider.wrapping_add(1);
        if self.divider.is_multiple_of(8) {
            for tone in &mut self.tone {
                tone.clock();
            }
            self.noise.clock();
        }
        if self.divider.is_multiple_of(16) {
            self.envelope.clock();
        }

        let (left, right) = self.mix();
        self.accumulator.0 += left;
        self.accumulator.1 += right;
        self.accumulated += 1;
        self.phase += 1.0;
        if self.phase >= self.ticks_per_sample {
            self.phase -= self.ticks_per_sample;
            let n = self.accumulated as f32;
            self.buffer.push([self.accumulator.0 / n, self.accumulator.1 / n]);
            self.accumulator = (0.0, 0.0);
            self.accumulated = 0;
        }
    }

    /// Advance by `clocks` input clocks.
    pub fn run(&mut self, clocks: u32) {
        for _ in 0..clocks {
            self.tick();
        }
    }

    fn mix(&self) -> (f32, f32) {
        let mixer = self.regs[7];
        let pan: [(f32, f32); 3] = match self.stereo {
            StereoMode::Mono => [(0.5, 0.5); 3],
            StereoMode::Abc => [(1.0, 0.0), (0.5, 0.5), (0.0, 1.0)],
        };

        let mut out = (0.0f32, 0.0f32);
        for (ch, &(l, r)) in pan.iter().enumerate() {
            let tone = self.tone[ch].high || mixer & (1 << ch) != 0;
            let noise = self.noise.high || mixer & (1 << (ch + 3)) != 0;

            let volume = self.regs[8 + ch];
            let level = if volume & 0x10 != 0 {
                self.envelope.level()
            } else {
                volume & 0x0F
            };
            let amplitude = VOLUME_TABLE[usize::from(level)];
            let on = if tone && noise { amplitude } else { 0.0 };
            let sample = on - amplitude * 0.5;
            out.0 += sample * l;
            out.1 += sample * r;
        }
        // Largest excursion in either mode is 0.75
        (out.0 / 0.75, out.1 / 0.75)
    }

    /// Drain the output buffer. Each sample is `[left, right]`.
    pub fn take_buffer(&mut self) -> Vec<[f32; 2]> {
        std::mem::take(&mut self.buffer)
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// All query paths supported by the PSG.
const PSG_QUERY_PATHS: &[&str] = &[
    "selected",
    "r0",
    "r1",
    "r2",
    "r3",
    "r4",
    "r5",
    "r6",
    "r7",
    "r8",
    "r9",
    "r10",
    "r11",
    "r12",
    "r13",
    "r14",
    "r15",
    "envelope.level",
];

impl Observable for Ay3_8910 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "selected" => Some(self.selected.into()),
            "envelope.level" => Some(self.envelope.level().into()),
            _ => {
                let n = path.strip_prefix('r')?.parse::<usize>().ok()?;
                self.regs.get(n).map(|&v| v.into())
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        PSG_QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;

    fn write(ay: &mut Ay3_8910, reg: u8, value: u8) {
        ay.select_register(reg);
        ay.write_data(value);
    }

    fn energy(buf: &[[f32; 2]], side: usize) -> f32 {
        buf.iter().map(|s| s[side] * s[side]).sum()
    }

    #[test]
    fn registers_are_masked() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 1, 0xFF);
        assert_eq!(ay.read_data(), 0x0F);
        write(&mut ay, 8, 0xFF);
        assert_eq!(ay.read_data(), 0x1F);
        write(&mut ay, 14, 0xAB);
        assert_eq!(ay.read_data(), 0xAB);
    }

    #[test]
    fn samples_at_host_rate() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        // One PAL frame of PSG clocks
        ay.run(CPC_CLOCK / 50);
        let n = ay.take_buffer().len();
        assert!((880..=884).contains(&n), "got {n} samples");
        assert_eq!(ay.buffer_len(), 0);
    }

    #[test]
    fn tone_a_is_left_in_abc() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 0, 0x8E);
        write(&mut ay, 7, 0b0011_1110);
        write(&mut ay, 8, 0x0F);
        ay.run(40_000);
        let buf = ay.take_buffer();
        assert!(energy(&buf, 0) > 0.1, "tone A on the left");
        assert!(energy(&buf, 1) < 0.001, "nothing on the right");
    }

    #[test]
    fn tone_c_is_right_in_abc() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 4, 0x8E);
        write(&mut ay, 7, 0b0011_1011);
        write(&mut ay, 10, 0x0F);
        ay.run(40_000);
        let buf = ay.take_buffer();
        assert!(energy(&buf, 1) > 0.1);
        assert!(energy(&buf, 0) < 0.001);
    }

    #[test]
    fn mono_feeds_both_sides() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        ay.set_stereo(StereoMode::Mono);
        write(&mut ay, 0, 0x8E);
        write(&mut ay, 7, 0b0011_1110);
        write(&mut ay, 8, 0x0F);
        ay.run(40_000);
        let buf = ay.take_buffer();
        assert!(buf.iter().all(|s| (s[0] - s[1]).abs() < f32::EPSILON));
        assert!(energy(&buf, 0) > 0.01);
    }

    #[test]
    fn noise_channel() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 6, 15);
        write(&mut ay, 7, 0b0011_0111);
        write(&mut ay, 8, 0x0F);
        ay.run(40_000);
        let left: Vec<f32> = ay.take_buffer().iter().map(|s| s[0]).collect();
        assert!(left.iter().any(|&s| s > 0.05));
        assert!(left.iter().any(|&s| s < -0.05));
    }

    #[test]
    fn one_shot_envelope_decays_to_silence() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 8, 0x10);
        write(&mut ay, 11, 4);
        write(&mut ay, 13, 0x00);
        assert_eq!(ay.envelope.level(), 15);
        // 16 steps of 4 x 16 clocks
        ay.run(16 * 4 * 16 + 16);
        assert!(ay.envelope.holding);
        assert_eq!(ay.envelope.level(), 0);
    }

    #[test]
    fn sawtooth_envelope_repeats() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 11, 1);
        write(&mut ay, 13, 0x0C);
        let mut wrapped = false;
        let mut last = ay.envelope.level();
        for _ in 0..(40 * 16) {
            ay.tick();
            let level = ay.envelope.level();
            if level < last {
                wrapped = true;
            }
            last = level;
        }
        assert!(wrapped, "rising sawtooth restarts from zero");
        assert!(!ay.envelope.holding);
    }

    #[test]
    fn attack_hold_stays_high() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 11, 1);
        write(&mut ay, 13, 0x0D);
        ay.run(40 * 16);
        assert!(ay.envelope.holding);
        assert_eq!(ay.envelope.level(), 15);
    }

    #[test]
    fn load_registers_replays_writes() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        ay.select_register(14);
        let mut regs = [0u8; 16];
        regs[0] = 0x34;
        regs[1] = 0x12;
        regs[7] = 0x38;
        ay.load_registers(&regs);
        assert_eq!(ay.tone[0].period, 0x234);
        assert_eq!(ay.registers()[1], 0x02);
        assert_eq!(ay.selected_register(), 14);
    }

    #[test]
    fn observable_registers() {
        let mut ay = Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE);
        write(&mut ay, 7, 0x3F);
        assert_eq!(ay.query("r7"), Some(Value::U8(0x3F)));
        assert_eq!(ay.query("selected"), Some(Value::U8(7)));
        assert_eq!(ay.query("r16"), None);
    }
}
