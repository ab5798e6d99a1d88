//! Sample-rate and byte-framing conversion between the 48 kHz Opus domain
//! and the 16 kHz PCM domain used by the ring buffer and inference services.
//!
//! The 3:1 ratio is exact, so downsampling is a mean over each group of three
//! samples and upsampling repeats each sample three times. All functions are
//! total. The `_into` variants write into caller-provided buffers to keep the
//! per-frame paths allocation-free.

/// Converts 48 kHz mono samples to 16 kHz by averaging groups of three.
pub fn downsample_48_to_16(input: &[i16]) -> Vec<i16> {
    let mut out = vec![0i16; input.len() / 3];
    downsample_48_to_16_into(input, &mut out);
    out
}

/// In-place variant of [`downsample_48_to_16`]. `dst` must hold at least
/// `input.len() / 3` samples. Returns the number of samples written.
pub fn downsample_48_to_16_into(input: &[i16], dst: &mut [i16]) -> usize {
    let n = input.len() / 3;
    for i in 0..n {
        let sum = input[3 * i] as i32 + input[3 * i + 1] as i32 + input[3 * i + 2] as i32;
        dst[i] = (sum / 3) as i16;
    }
    n
}

/// Converts 16 kHz mono samples to 48 kHz by repeating each sample three times.
pub fn upsample_16_to_48(input: &[i16]) -> Vec<i16> {
    let mut out = vec![0i16; input.len() * 3];
    upsample_16_to_48_into(input, &mut out);
    out
}

/// In-place variant of [`upsample_16_to_48`]. `dst` must hold at least
/// `input.len() * 3` samples. Returns the number of samples written.
pub fn upsample_16_to_48_into(input: &[i16], dst: &mut [i16]) -> usize {
    for (i, &s) in input.iter().enumerate() {
        dst[3 * i] = s;
        dst[3 * i + 1] = s;
        dst[3 * i + 2] = s;
    }
    input.len() * 3
}

/// Encodes samples as little-endian 16-bit bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = vec![0u8; samples.len() * 2];
    samples_to_bytes_into(samples, &mut out);
    out
}

/// In-place variant of [`samples_to_bytes`]. `dst` must hold at least
/// `samples.len() * 2` bytes. Returns the number of bytes written.
pub fn samples_to_bytes_into(samples: &[i16], dst: &mut [u8]) -> usize {
    for (i, &s) in samples.iter().enumerate() {
        dst[2 * i..2 * i + 2].copy_from_slice(&s.to_le_bytes());
    }
    samples.len() * 2
}

/// Decodes little-endian 16-bit bytes into samples. A trailing odd byte is
/// ignored.
pub fn bytes_to_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::sine_wave;

    #[test]
    fn downsample_averages_triples() {
        let input = [3, 6, 9, -3, -6, -9, 100];
        assert_eq!(downsample_48_to_16(&input), vec![6, -6]);
    }

    #[test]
    fn downsample_does_not_overflow() {
        let input = [i16::MAX; 6];
        assert_eq!(downsample_48_to_16(&input), vec![i16::MAX, i16::MAX]);
    }

    #[test]
    fn upsample_repeats_each_sample() {
        assert_eq!(upsample_16_to_48(&[1, -2]), vec![1, 1, 1, -2, -2, -2]);
    }

    #[test]
    fn byte_round_trip_is_lossless() {
        let samples = [0, 1, -1, i16::MAX, i16::MIN, 12345];
        assert_eq!(bytes_to_samples(&samples_to_bytes(&samples)), samples);
    }

    #[test]
    fn bytes_to_samples_is_little_endian() {
        assert_eq!(bytes_to_samples(&[0x01, 0x02]), vec![0x0201]);
    }

    #[test]
    fn into_variants_match_allocating_ones() {
        let input: Vec<i16> = (0..96).collect();
        let mut down = vec![0i16; 32];
        assert_eq!(downsample_48_to_16_into(&input, &mut down), 32);
        assert_eq!(down, downsample_48_to_16(&input));

        let mut up = vec![0i16; 96];
        assert_eq!(upsample_16_to_48_into(&down, &mut up), 96);
        assert_eq!(up, upsample_16_to_48(&down));
    }

    // Averaging a group of three identical samples is exact, so a 16 kHz
    // signal survives upsample-then-downsample untouched.
    #[test]
    fn up_then_down_is_identity() {
        let signal = sine_wave(0.1, 200.0);
        assert_eq!(downsample_48_to_16(&upsample_16_to_48(&signal)), signal);
    }

    // Down-then-up replaces each group of three by its repeated mean. For a
    // slowly-varying signal the deviation stays within the local slope: at
    // 200 Hz full scale that is well under 50 counts per sample.
    #[test]
    fn down_then_up_error_is_bounded_for_low_frequencies() {
        let hi = sine_wave_48k(0.1, 200.0);
        let rt = upsample_16_to_48(&downsample_48_to_16(&hi));
        for (a, b) in hi.iter().zip(rt.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 50, "{a} vs {b}");
        }
    }

    fn sine_wave_48k(duration_sec: f64, frequency: f64) -> Vec<i16> {
        let n = (duration_sec * 48000.0) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / 48000.0;
                (16000.0 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i16
            })
            .collect()
    }
}
