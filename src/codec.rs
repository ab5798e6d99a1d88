//! Opus codec wrappers for the per-session audio pipeline.
//!
//! Each session owns exactly one decoder and one encoder. Neither type is
//! thread-safe: the decoder belongs to the inbound media task, the encoder to
//! the playback task. Codec failures are the caller's to count and drop; the
//! wrappers only report them.

use audiopus::{coder, Application, Bitrate, Channels, SampleRate};

use crate::error::Result;

/// Largest decode output Opus permits: 120 ms at 48 kHz mono.
pub const MAX_FRAME_SIZE: usize = 5760;

/// Samples in one 20 ms frame at 48 kHz.
pub const SAMPLES_PER_FRAME: usize = 960;

/// Target encoder bitrate for voice.
const VOICE_BITRATE: i32 = 32_000;

/// Decodes compressed Opus frames to 48 kHz mono PCM, with packet-loss
/// concealment for missing frames.
pub struct OpusDecoder {
    inner: coder::Decoder,
}

impl OpusDecoder {
    pub fn new() -> Result<Self> {
        let inner = coder::Decoder::new(SampleRate::Hz48000, Channels::Mono)?;
        Ok(Self { inner })
    }

    /// Decodes one frame into `out`, returning the sample count. `out` must
    /// hold at least [`MAX_FRAME_SIZE`] samples.
    pub fn decode(&mut self, frame: &[u8], out: &mut [i16]) -> Result<usize> {
        Ok(self.inner.decode(Some(frame), out, false)?)
    }

    /// Synthesizes `expected_samples` of concealment audio from decoder state
    /// without an input frame.
    pub fn decode_plc(&mut self, expected_samples: usize, out: &mut [i16]) -> Result<usize> {
        let n = expected_samples.min(out.len());
        Ok(self.inner.decode(None::<&[u8]>, &mut out[..n], false)?)
    }
}

/// Encodes 20 ms frames of 48 kHz mono PCM to Opus, configured for voice.
pub struct OpusEncoder {
    inner: coder::Encoder,
}

impl OpusEncoder {
    pub fn new() -> Result<Self> {
        let mut inner = coder::Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)?;
        inner.set_bitrate(Bitrate::BitsPerSecond(VOICE_BITRATE))?;
        Ok(Self { inner })
    }

    /// Encodes exactly [`SAMPLES_PER_FRAME`] samples into `out`, returning
    /// the compressed length.
    pub fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize> {
        Ok(self.inner.encode(pcm, out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_frame_round_trip() {
        let mut enc = OpusEncoder::new().unwrap();
        let mut dec = OpusDecoder::new().unwrap();

        let pcm = [0i16; SAMPLES_PER_FRAME];
        let mut packet = [0u8; 1500];
        let len = enc.encode(&pcm, &mut packet).unwrap();
        assert!(len > 0);

        let mut out = [0i16; MAX_FRAME_SIZE];
        let samples = dec.decode(&packet[..len], &mut out).unwrap();
        assert_eq!(samples, SAMPLES_PER_FRAME);
    }

    #[test]
    fn plc_produces_expected_samples() {
        let mut dec = OpusDecoder::new().unwrap();
        let mut out = [0i16; MAX_FRAME_SIZE];
        let samples = dec.decode_plc(SAMPLES_PER_FRAME, &mut out).unwrap();
        assert_eq!(samples, SAMPLES_PER_FRAME);
    }

    #[test]
    fn garbage_frame_is_an_error() {
        let mut dec = OpusDecoder::new().unwrap();
        let mut out = [0i16; MAX_FRAME_SIZE];
        assert!(dec.decode(&[0xFF, 0xFE, 0xFD], &mut out).is_err());
    }
}
