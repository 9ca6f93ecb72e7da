//! Headless capture: PNG screenshots and WAV audio dumps.

#![allow(clippy::cast_possible_truncation)]

use std::error::Error;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use crate::bus::SAMPLE_RATE;
use crate::cpc::Cpc;

/// Save the current framebuffer as a PNG file.
///
/// The framebuffer is ARGB32; the encoder wants RGBA bytes.
pub fn save_screenshot(cpc: &Cpc, path: &Path) -> Result<(), Box<dyn Error>> {
    let width = cpc.framebuffer_width();
    let height = cpc.framebuffer_height();

    let file = fs::File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    let rgba: Vec<u8> = cpc
        .framebuffer()
        .iter()
        .flat_map(|&pixel| {
            [
                (pixel >> 16) as u8,
                (pixel >> 8) as u8,
                pixel as u8,
                0xFF,
            ]
        })
        .collect();
    writer.write_image_data(&rgba)?;
    Ok(())
}

/// Save stereo samples as a 16-bit PCM WAV at the machine's output rate.
/// Input samples are f32 in -1.0..=1.0.
pub fn save_audio(samples: &[[f32; 2]], path: &Path) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in samples {
        for &sample in frame {
            let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer.write_sample(scaled)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpcConfig, ROM_SIZE, RamSize, TitleConfig};

    #[test]
    fn screenshot_has_framebuffer_dimensions() {
        let cpc = Cpc::new(&CpcConfig {
            os_rom: vec![0; ROM_SIZE],
            basic_rom: vec![0; ROM_SIZE],
            amsdos_rom: None,
            ram: RamSize::Kb128,
            title: TitleConfig::default(),
        })
        .expect("valid ROMs");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");
        save_screenshot(&cpc, &path).expect("write png");

        let decoder = png::Decoder::new(fs::File::open(&path).expect("open"));
        let reader = decoder.read_info().expect("png header");
        assert_eq!(reader.info().width, 384);
        assert_eq!(reader.info().height, 272);
    }

    #[test]
    fn audio_written_as_stereo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.wav");
        save_audio(&[[0.5, -0.5], [2.0, -2.0]], &path).expect("write wav");

        let mut reader = hound::WavReader::open(&path).expect("open");
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[2], i16::MAX);
        assert_eq!(samples[3], -i16::MAX);
    }
}
