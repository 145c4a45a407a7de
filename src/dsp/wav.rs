//! WAV encoder — 16-bit PCM RIFF/WAVE container.

use crate::buffer::AudioBuffer;
use crate::error::{PlayerError, Result};

/// Size of the canonical RIFF/WAVE header.
pub const HEADER_LEN: usize = 44;

const BYTES_PER_SAMPLE: usize = 2;

/// Convert a float sample to signed 16-bit.
///
/// Negative values scale by 32768, non-negative by 32767, truncating toward
/// zero. Input is clamped to [-1, 1]; NaN maps to 0.
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a planar float buffer as an interleaved 16-bit PCM WAV file.
///
/// Output is exactly `44 + frames * channels * 2` bytes.
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let channels = buffer.channel_count();
    let frames = buffer.len();
    let sample_rate = buffer.sample_rate();

    let data_len = frames
        .checked_mul(channels * BYTES_PER_SAMPLE)
        .filter(|&n| n <= (u32::MAX - 36) as usize)
        .ok_or_else(|| {
            PlayerError::RenderFailure(format!(
                "{frames} frames x {channels} channels exceeds the WAV size limit"
            ))
        })?;
    let channel_count = u16::try_from(channels)
        .map_err(|_| PlayerError::RenderFailure(format!("{channels} channels is too many for WAV")))?;

    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * BYTES_PER_SAMPLE as u32;
    let block_align = channel_count * BYTES_PER_SAMPLE as u16;
    let data_size = data_len as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(HEADER_LEN + data_len);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channel_count.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk, interleaved per frame
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for i in 0..frames {
        for ch in buffer.channels() {
            buf.extend_from_slice(&sample_to_i16(ch[i]).to_le_bytes());
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sweep(frames: usize, channels: usize, rate: u32) -> AudioBuffer {
        let data = (0..channels)
            .map(|c| {
                (0..frames)
                    .map(|i| (((i + c * 17) % frames) as f32 / frames as f32) * 2.0 - 1.0)
                    .collect()
            })
            .collect();
        AudioBuffer::from_channels(data, rate).unwrap()
    }

    #[test]
    fn wav_header_valid() {
        let wav = encode(&sweep(1000, 2, 48000)).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let riff_size = u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]);
        assert_eq!(riff_size, 36 + 4000);
        let fmt_len = u32::from_le_bytes([wav[16], wav[17], wav[18], wav[19]]);
        assert_eq!(fmt_len, 16);
        let format = u16::from_le_bytes([wav[20], wav[21]]);
        assert_eq!(format, 1);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 48000);
        let byte_rate = u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]);
        assert_eq!(byte_rate, 48000 * 2 * 2);
        let block_align = u16::from_le_bytes([wav[32], wav[33]]);
        assert_eq!(block_align, 4);
        let bits = u16::from_le_bytes([wav[34], wav[35]]);
        assert_eq!(bits, 16);
    }

    #[test]
    fn wav_size_correct() {
        for (frames, channels) in [(0, 1), (1, 1), (441, 2), (1000, 3)] {
            let wav = encode(&sweep(frames, channels, 44100)).unwrap();
            assert_eq!(wav.len(), HEADER_LEN + frames * channels * 2);
            let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
            assert_eq!(data_size as usize, frames * channels * 2);
        }
    }

    #[test]
    fn hound_reads_back_layout_and_samples() {
        let buffer = sweep(2205, 2, 22050);
        let wav = encode(&buffer).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.duration(), 2205);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let original = buffer.to_interleaved();
        assert_eq!(samples.len(), original.len());
        for (i, (&q, &s)) in samples.iter().zip(&original).enumerate() {
            let back = if q < 0 { q as f32 / 32768.0 } else { q as f32 / 32767.0 };
            assert!(
                (back - s).abs() <= 1.0 / 32767.0,
                "sample {i}: {s} came back as {back}"
            );
        }
    }

    #[test]
    fn quantization_endpoints() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(-0.0), 0);
        assert_eq!(sample_to_i16(0.5), 16383);
        assert_eq!(sample_to_i16(-0.5), -16384);
    }

    #[test]
    fn out_of_range_and_nan_are_tamed() {
        assert_eq!(sample_to_i16(1.7), 32767);
        assert_eq!(sample_to_i16(-3.0), -32768);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn samples_are_interleaved_little_endian() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![-1.0, 0.5]], 8000).unwrap();
        let wav = encode(&buffer).unwrap();
        let data: Vec<i16> = wav[HEADER_LEN..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(data, vec![32767, -32768, 0, 16383]);
    }
}
