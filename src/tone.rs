//! Sine tone source for tests and local smoke runs.

/// Sample rate of generated tones.
pub const TONE_SAMPLE_RATE: usize = 16000;

/// Peak amplitude of generated tones.
pub const TONE_AMPLITUDE: f64 = 16000.0;

/// Produces a sine wave at the given frequency and duration as 16 kHz mono
/// PCM samples.
pub fn sine_wave(duration_sec: f64, frequency: f64) -> Vec<i16> {
    let num_samples = (duration_sec * TONE_SAMPLE_RATE as f64) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / TONE_SAMPLE_RATE as f64;
            (TONE_AMPLITUDE * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_matches_duration() {
        assert_eq!(sine_wave(0.5, 440.0).len(), 8000);
    }

    #[test]
    fn stays_within_amplitude() {
        let samples = sine_wave(0.1, 440.0);
        assert!(samples.iter().all(|&s| s.abs() <= TONE_AMPLITUDE as i16));
        assert!(samples.iter().any(|&s| s > 15000));
    }
}
