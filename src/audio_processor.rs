use hound::{SampleFormat, WavReader};
use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::AnalysisError;

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Mono audio plus its sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples normalized to [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decodes uploaded audio and brings it to the rate a consumer expects.
pub struct AudioProcessor {
    target_sample_rate: u32,
}

impl AudioProcessor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn load_audio_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Waveform> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Ok(self.decode(&bytes)?)
    }

    /// Decode an in-memory audio file at its native sample rate.
    ///
    /// WAV goes through hound; anything hound rejects is handed to symphonia,
    /// which covers FLAC, OGG/Vorbis, MP3 and MP4/AAC.
    pub fn decode(&self, bytes: &[u8]) -> Result<Waveform, AnalysisError> {
        match decode_wav(bytes) {
            Ok(waveform) => Ok(waveform),
            Err(wav_err) => {
                debug!("hound rejected upload ({}), probing with symphonia", wav_err);
                decode_container(bytes)
            }
        }
    }

    /// Decode and resample to the target rate
    pub fn decode_resampled(&self, bytes: &[u8]) -> Result<Waveform, AnalysisError> {
        let waveform = self.decode(bytes)?;
        self.resample(waveform)
    }

    /// Band-limited sinc resampling to the target rate.
    ///
    /// Audio already at the target rate is returned untouched.
    pub fn resample(&self, waveform: Waveform) -> Result<Waveform, AnalysisError> {
        let to_rate = self.target_sample_rate;
        if waveform.sample_rate == to_rate {
            return Ok(waveform);
        }
        if waveform.sample_rate == 0 {
            return Err(AnalysisError::Decode("sample rate is zero".to_string()));
        }
        if waveform.is_empty() {
            return Ok(Waveform::new(Vec::new(), to_rate));
        }

        let ratio = to_rate as f64 / waveform.sample_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
            .map_err(|e| AnalysisError::Internal(format!("Failed to create resampler: {}", e)))?;

        // Output is already aligned with the input; the filter delay only
        // has to be flushed out of the tail.
        let expected_len = (waveform.len() as f64 * ratio).round() as usize;
        let mut resampled = Vec::with_capacity(expected_len + resampler.output_frames_max());

        for chunk in waveform.samples.chunks(RESAMPLE_CHUNK) {
            let input = [chunk];
            let output = if chunk.len() == RESAMPLE_CHUNK {
                resampler.process(&input[..], None)
            } else {
                resampler.process_partial(Some(&input[..]), None)
            }
            .map_err(|e| AnalysisError::Internal(format!("Resampling failed: {}", e)))?;
            resampled.extend_from_slice(&output[0]);
        }

        while resampled.len() < expected_len {
            let output = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(|e| AnalysisError::Internal(format!("Resampling failed: {}", e)))?;
            if output[0].is_empty() {
                break;
            }
            resampled.extend_from_slice(&output[0]);
        }

        resampled.truncate(expected_len);

        debug!(
            "resampled {} -> {} Hz ({} -> {} samples)",
            waveform.sample_rate,
            to_rate,
            waveform.len(),
            resampled.len()
        );
        Ok(Waveform::new(resampled, to_rate))
    }
}

/// Average interleaved frames down to one channel
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn decode_wav(bytes: &[u8]) -> Result<Waveform, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()?
        }
    };

    Ok(Waveform::new(
        downmix(&samples, spec.channels as usize),
        spec.sample_rate,
    ))
}

fn decode_container(bytes: &[u8]) -> Result<Waveform, AnalysisError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AnalysisError::Decode("no default audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(AnalysisError::Decode(
                    "decoder requires a reset (unsupported midstream change)".to_string(),
                ));
            }
            Err(err) => return Err(AnalysisError::Decode(err.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                mono.extend(downmix(buffer.samples(), spec.channels.count()));
            }
            // A corrupt packet is skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!("skipping undecodable packet: {}", msg);
            }
            Err(err) => return Err(AnalysisError::Decode(err.to_string())),
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| AnalysisError::Decode("missing sample rate".to_string()))?;
    Ok(Waveform::new(mono, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let bytes = wav_bytes(&[16384, 0, -16384, -16384, 8192, 24576], 2, 8000);
        let waveform = AudioProcessor::new(16000).decode(&bytes).unwrap();

        assert_eq!(waveform.sample_rate, 8000);
        assert_eq!(waveform.len(), 3);
        assert!((waveform.samples[0] - 0.25).abs() < 1e-6);
        assert!((waveform.samples[1] + 0.5).abs() < 1e-6);
        assert!((waveform.samples[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let err = AudioProcessor::new(16000)
            .decode(b"definitely not an audio container")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(_)));
    }

    #[test]
    fn same_rate_resample_is_identity() {
        let samples: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.01).sin()).collect();
        let waveform = Waveform::new(samples.clone(), 16000);
        let out = AudioProcessor::new(16000).resample(waveform).unwrap();
        assert_eq!(out.samples, samples);
        assert_eq!(out.sample_rate, 16000);
    }

    #[test]
    fn resampling_scales_length() {
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let out = AudioProcessor::new(16000)
            .resample(Waveform::new(samples, 44100))
            .unwrap();
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.len(), 16000);
        let peak = out.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6, "peak {}", peak);
    }

    fn peak_index(samples: &[f32]) -> usize {
        samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    fn impulse(len: usize, at: usize) -> Vec<f32> {
        let mut samples = vec![0.0; len];
        samples[at] = 1.0;
        samples
    }

    #[test]
    fn resampled_impulse_keeps_its_position() {
        let processor = AudioProcessor::new(16000);
        for (rate, len, at) in [(8000u32, 4000usize, 1000usize), (44100, 44100, 4410), (8000, 400, 40)] {
            let out = processor
                .resample(Waveform::new(impulse(len, at), rate))
                .unwrap();
            let expected = (at as f64 * 16000.0 / rate as f64).round() as usize;
            let peak = peak_index(&out.samples);
            assert!(
                peak.abs_diff(expected) <= 1,
                "{} Hz impulse at {} landed at {} (expected {})",
                rate,
                at,
                peak,
                expected
            );
            assert!(out.samples[peak].abs() > 0.2, "{} Hz peak {}", rate, out.samples[peak]);
        }
    }

    #[test]
    fn upsampled_sine_reaches_the_end() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 8000.0).sin() * 0.5)
            .collect();
        let out = AudioProcessor::new(16000)
            .resample(Waveform::new(samples, 8000))
            .unwrap();

        assert_eq!(out.len(), 2000);
        let tail_peak = out.samples[1900..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail_peak > 0.3, "tail peak {}", tail_peak);
    }

    #[test]
    fn very_short_clip_survives_resampling() {
        let samples: Vec<f32> = (0..10)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 8000.0).sin() * 0.5)
            .collect();
        let out = AudioProcessor::new(16000)
            .resample(Waveform::new(samples, 8000))
            .unwrap();

        assert_eq!(out.len(), 20);
        assert!(out.samples.iter().any(|s| s.abs() > 0.1), "{:?}", out.samples);
    }

    /// Stereo WAV with 64-bit float samples, which hound cannot read
    fn f64_wav_bytes(frames: &[[f64; 2]], sample_rate: u32) -> Vec<u8> {
        let data_len = (frames.len() * 16) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes()); // IEEE float
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 16).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(&64u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for frame in frames {
            for sample in frame {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn container_fallback_decodes_and_downmixes() {
        let frames: Vec<[f64; 2]> = (0..3000)
            .map(|i| {
                let s = (i as f64 * 0.05).sin() * 0.5;
                [s, s * 0.5]
            })
            .collect();
        let bytes = f64_wav_bytes(&frames, 22050);
        assert!(decode_wav(&bytes).is_err());

        let waveform = AudioProcessor::new(16000).decode(&bytes).unwrap();
        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.len(), 3000);
        for (i, frame) in frames.iter().enumerate() {
            let expected = ((frame[0] + frame[1]) / 2.0) as f32;
            assert!((waveform.samples[i] - expected).abs() < 1e-6, "frame {}", i);
        }
    }

    #[test]
    fn empty_wav_decodes_to_empty_waveform() {
        let bytes = wav_bytes(&[], 1, 22050);
        let waveform = AudioProcessor::new(16000).decode_resampled(&bytes).unwrap();
        assert!(waveform.is_empty());
        assert_eq!(waveform.sample_rate, 16000);
    }
}
