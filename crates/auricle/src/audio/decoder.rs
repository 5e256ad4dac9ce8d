//! Audio decoding using Symphonia
//!
//! Stimuli are short local clips, so they are decoded to interleaved f32
//! PCM in full at registration time. That fixes each clip's measured
//! duration before playback starts (the workflow needs it for
//! listen-through gating) and makes offset/range playback a buffer slice
//! instead of a runtime seek.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SessionError};

use super::types::ClipInfo;

/// A fully decoded clip: interleaved f32 samples plus the output spec
#[derive(Debug, Clone)]
pub struct DecodedClip {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedClip {
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }

    pub fn info(&self) -> ClipInfo {
        ClipInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
            duration: self.duration(),
        }
    }

    /// Frame index for a time offset, clamped to the clip length
    fn frame_at(&self, t: Duration) -> usize {
        let frame = (t.as_secs_f64() * self.sample_rate as f64).round() as usize;
        frame.min(self.frames())
    }

    /// Interleaved samples for [start, end), frame-aligned and clamped.
    ///
    /// A start at or past the clip end wraps to 0, so replay requests
    /// that overshoot restart the clip instead of returning silence.
    pub fn slice(&self, start: Duration, end: Option<Duration>) -> Vec<f32> {
        let ch = self.channels.max(1) as usize;
        let mut start_frame = self.frame_at(start);
        if start_frame >= self.frames() {
            start_frame = 0;
        }
        let end_frame = match end {
            Some(end) => self.frame_at(end).max(start_frame),
            None => self.frames(),
        };
        self.samples[start_frame * ch..end_frame * ch].to_vec()
    }
}

/// Decode a whole audio file into memory
pub fn decode_file(path: &Path) -> Result<DecodedClip> {
    let file = fs::File::open(path)?;
    let hint = path.extension().and_then(|e| e.to_str()).map(str::to_string);
    decode_reader(file, hint.as_deref())
}

/// Decode a whole audio stream into memory, auto-detecting the format
pub fn decode_reader<R: Read + Send + Sync + 'static>(
    reader: R,
    format_hint: Option<&str>,
) -> Result<DecodedClip> {
    let source = ReadOnlySource::new(reader);
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = format_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SessionError::Decode(format!("Probe error: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| SessionError::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SessionError::Decode(format!("Decoder creation error: {e}")))?;

    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(SessionError::Decode(format!("{e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let capacity = decoded.capacity() as u64;

                // The decoder output spec is authoritative; headers can lie
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                if sample_buf
                    .as_ref()
                    .map_or(true, |b| b.capacity() < capacity as usize)
                {
                    sample_buf = Some(SampleBuffer::new(capacity, spec));
                }
                if let Some(buf) = &mut sample_buf {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // Corrupt packet; skip it like a streaming decoder would
                tracing::debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(SessionError::Decode(format!("{e}"))),
        }
    }

    if samples.is_empty() {
        return Err(SessionError::Decode("No audio samples decoded".to_string()));
    }

    Ok(DecodedClip {
        samples: Arc::new(samples),
        channels,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a minimal valid WAV file in memory
    fn make_wav(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let bits_per_sample: u16 = 16;
        let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
        let block_align = channels * (bits_per_sample / 8);
        let data_size = (samples.len() * 2) as u32;
        let file_size = 36 + data_size;

        let mut buf = Vec::new();
        // RIFF header
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        // fmt chunk
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());
        // data chunk
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for &s in samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        buf
    }

    // --- Basic decoding ---

    #[test]
    fn decode_wav_mono() {
        let samples: Vec<i16> = (0..1000).map(|i| (i % 100 * 100) as i16).collect();
        let wav = make_wav(44100, 1, &samples);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        assert_eq!(clip.channels(), 1);
        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.frames(), 1000);
    }

    #[test]
    fn decode_wav_stereo_counts_frames_not_samples() {
        // 500 frames * 2 channels = 1000 interleaved samples
        let samples: Vec<i16> = (0..1000).map(|i| (i * 10) as i16).collect();
        let wav = make_wav(48000, 2, &samples);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.frames(), 500);
    }

    #[test]
    fn duration_matches_frame_count() {
        let samples: Vec<i16> = vec![0; 22050];
        let wav = make_wav(44100, 1, &samples);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let secs = clip.duration().as_secs_f64();
        assert!((secs - 0.5).abs() < 1e-6, "got {secs}");
        assert_eq!(clip.info().duration, clip.duration());
    }

    #[test]
    fn decoded_samples_are_in_valid_range() {
        let samples: Vec<i16> = (0..2000)
            .map(|i| ((i as f64 * 0.05).sin() * 30000.0) as i16)
            .collect();
        let wav = make_wav(44100, 1, &samples);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let full = clip.slice(Duration::ZERO, None);
        assert_eq!(full.len(), 2000);
        for (i, &s) in full.iter().enumerate() {
            assert!((-1.0..=1.0).contains(&s), "sample {i} out of range: {s}");
        }
    }

    #[test]
    fn decode_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        fs::write(&path, make_wav(44100, 1, &[1000; 441])).unwrap();

        let clip = decode_file(&path).unwrap();
        assert_eq!(clip.frames(), 441);
    }

    #[test]
    fn decode_missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    // --- Slicing ---

    #[test]
    fn slice_full_equals_all_samples() {
        let wav = make_wav(44100, 1, &[500; 100]);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();
        assert_eq!(clip.slice(Duration::ZERO, None).len(), 100);
    }

    #[test]
    fn slice_from_offset_drops_leading_frames() {
        let wav = make_wav(1000, 1, &[100; 1000]); // exactly 1s at 1 kHz
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let tail = clip.slice(Duration::from_millis(250), None);
        assert_eq!(tail.len(), 750);
    }

    #[test]
    fn slice_range_is_frame_aligned_for_stereo() {
        let samples: Vec<i16> = vec![0; 2000]; // 1000 stereo frames
        let wav = make_wav(1000, 2, &samples);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let window = clip.slice(Duration::from_millis(100), Some(Duration::from_millis(300)));
        // 200 frames * 2 channels
        assert_eq!(window.len(), 400);
        assert_eq!(window.len() % 2, 0);
    }

    #[test]
    fn slice_end_clamps_to_clip_length() {
        let wav = make_wav(1000, 1, &[0; 500]);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let window = clip.slice(Duration::from_millis(400), Some(Duration::from_secs(10)));
        assert_eq!(window.len(), 100);
    }

    #[test]
    fn slice_start_past_end_wraps_to_zero() {
        let wav = make_wav(1000, 1, &[0; 500]);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let wrapped = clip.slice(Duration::from_secs(5), None);
        assert_eq!(wrapped.len(), 500);
    }

    #[test]
    fn slice_empty_range_is_empty() {
        let wav = make_wav(1000, 1, &[0; 500]);
        let clip = decode_reader(Cursor::new(wav), Some("wav")).unwrap();

        let window = clip.slice(Duration::from_millis(200), Some(Duration::from_millis(200)));
        assert!(window.is_empty());
    }

    // --- Error paths ---

    #[test]
    fn error_on_invalid_data() {
        let result = decode_reader(Cursor::new(vec![0u8; 100]), None);
        assert!(result.is_err());
    }

    #[test]
    fn error_on_empty_data() {
        let result = decode_reader(Cursor::new(Vec::<u8>::new()), None);
        assert!(result.is_err());
    }

    #[test]
    fn error_on_truncated_wav_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        // fmt chunk missing
        let result = decode_reader(Cursor::new(buf), Some("wav"));
        assert!(result.is_err());
    }

    #[test]
    fn error_message_is_descriptive() {
        let err = decode_reader(Cursor::new(vec![0u8; 50]), None).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn repeated_decode_failures_do_not_accumulate_state() {
        for _ in 0..10 {
            assert!(decode_reader(Cursor::new(vec![0u8; 50]), None).is_err());
        }
    }
}
