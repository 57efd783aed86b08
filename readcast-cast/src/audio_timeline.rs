//! Audio Timeline - Place synthesized turns on a shared clock and mix them
//!
//! Every appended clip starts where the previous one ended, whichever speaker
//! it belongs to, so the result is turn-taking rather than cross-talk. At
//! mixdown time each speaker gets its own silent track sized to the whole
//! conversation, clips are overlaid at their offsets, the track is panned and
//! all tracks are summed into one stereo mix.

use std::path::{Path, PathBuf};

use crate::error::{CastError, CastResult};
use crate::subtitles::Subtitle;

/// Sample rate used for assembled output unless configured otherwise
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

// ============================================================================
// AUDIO CLIPS
// ============================================================================

/// Mono audio with samples in -1.0..=1.0
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        Self::new(vec![0.0; ms_to_samples(duration_ms, sample_rate)], sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length, rounded down to whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.samples.len(), self.sample_rate)
    }

    /// Decode raw little-endian 16-bit mono PCM
    pub fn from_pcm16_le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Read a WAV file, downmixing to mono
    pub fn read_wav(path: &Path) -> CastResult<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Write as 16-bit mono WAV
    pub fn write_wav(&self, path: &Path) -> CastResult<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Linear-interpolation resample
    pub fn resampled(&self, target_rate: u32) -> Self {
        if target_rate == self.sample_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return self.clone();
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (self.samples.len() as u64 * target_rate as u64 / self.sample_rate as u64) as usize;
        let mut samples = Vec::with_capacity(out_len);

        for i in 0..out_len {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let fraction = (position - index as f64) as f32;
            let a = self.samples[index.min(self.samples.len() - 1)];
            let b = self.samples.get(index + 1).copied().unwrap_or(a);
            samples.push(a + (b - a) * fraction);
        }

        Self::new(samples, target_rate)
    }

    /// Concatenate another clip onto this one, resampling it if needed
    pub fn append(&mut self, other: &AudioClip) {
        if self.samples.is_empty() && self.sample_rate == 0 {
            *self = other.clone();
            return;
        }
        let other = other.resampled(self.sample_rate);
        self.samples.extend_from_slice(&other.samples);
    }
}

// ============================================================================
// STEREO MIX
// ============================================================================

/// Final stereo mix
#[derive(Debug, Clone, PartialEq)]
pub struct StereoTrack {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoTrack {
    pub fn silent(frames: usize, sample_rate: u32) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.frames(), self.sample_rate)
    }

    /// Add a mono track with the given pan applied
    pub fn overlay_panned(&mut self, mono: &[f32], pan: f32) {
        let (left_gain, right_gain) = pan_gains(pan);
        for (i, &sample) in mono.iter().enumerate().take(self.frames()) {
            self.left[i] += sample * left_gain;
            self.right[i] += sample * right_gain;
        }
    }

    /// Peak absolute sample value across both channels
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn write_wav(&self, path: &Path) -> CastResult<()> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for (&l, &r) in self.left.iter().zip(self.right.iter()) {
            writer.write_sample(to_i16(l))?;
            writer.write_sample(to_i16(r))?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Left/right gains for a pan in -1.0..=1.0 (negative pans left)
///
/// The favoured side is boosted by up to 3 dB and the other side is cut so
/// that full pan silences it.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let amount = pan.clamp(-1.0, 1.0).abs();
    let boost = 2f32.powf(amount / 2.0);
    let cut = 2.0 - 2f32.powf(amount);

    if pan < 0.0 {
        (boost, cut)
    } else {
        (cut, boost)
    }
}

fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    (ms * sample_rate as u64 / 1000) as usize
}

fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples as u64 * 1000 / sample_rate as u64
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

// ============================================================================
// TIMELINE
// ============================================================================

/// One clip placed on the timeline
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub speaker: String,
    /// Offset in samples at the timeline rate
    pub start_sample: usize,
    /// `start_sample` rounded down to whole milliseconds
    pub start_offset_ms: u64,
    pub clip: AudioClip,
    pub subtitle: Option<Subtitle>,
    /// Temporary file holding this clip, removed after a successful export
    pub clip_path: Option<PathBuf>,
}

impl TimelineEntry {
    pub fn end_sample(&self) -> usize {
        self.start_sample + self.clip.samples.len()
    }

    pub fn end_ms(&self) -> u64 {
        samples_to_ms(self.end_sample(), self.clip.sample_rate)
    }
}

/// Per-speaker placement of clips on one running clock
///
/// The clock counts samples so that clips whose length is not a whole
/// number of milliseconds still never overlap.
#[derive(Debug, Clone)]
pub struct AudioTimeline {
    sample_rate: u32,
    running_clock_samples: usize,
    /// Speakers in registration order with their pan
    speakers: Vec<(String, f32)>,
    entries: Vec<TimelineEntry>,
}

impl AudioTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running_clock_samples: 0,
            speakers: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Register a speaker or update its pan
    pub fn set_pan(&mut self, speaker: &str, pan: f32) {
        let pan = pan.clamp(-1.0, 1.0);
        match self.speakers.iter_mut().find(|(name, _)| name == speaker) {
            Some(existing) => existing.1 = pan,
            None => self.speakers.push((speaker.to_string(), pan)),
        }
    }

    pub fn pan_for(&self, speaker: &str) -> Option<f32> {
        self.speakers
            .iter()
            .find(|(name, _)| name == speaker)
            .map(|(_, pan)| *pan)
    }

    /// Place a clip at the current clock and advance the clock by its length
    ///
    /// Unknown speakers are registered centred. Returns the clip's offset in ms.
    pub fn append(
        &mut self,
        speaker: &str,
        clip: AudioClip,
        subtitle: Option<Subtitle>,
        clip_path: Option<PathBuf>,
    ) -> u64 {
        if self.pan_for(speaker).is_none() {
            self.set_pan(speaker, 0.0);
        }

        let clip = clip.resampled(self.sample_rate);
        let start_sample = self.running_clock_samples;
        let start_offset_ms = samples_to_ms(start_sample, self.sample_rate);
        self.running_clock_samples += clip.samples.len();

        ::log::debug!(
            "Timeline: {} at {} ms ({} samples)",
            speaker,
            start_offset_ms,
            clip.samples.len()
        );

        self.entries.push(TimelineEntry {
            speaker: speaker.to_string(),
            start_sample,
            start_offset_ms,
            clip,
            subtitle,
            clip_path,
        });
        start_offset_ms
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn running_clock_samples(&self) -> usize {
        self.running_clock_samples
    }

    pub fn running_clock_ms(&self) -> u64 {
        samples_to_ms(self.running_clock_samples, self.sample_rate)
    }

    /// Latest end point of any entry, in samples
    pub fn total_samples(&self) -> usize {
        self.entries.iter().map(TimelineEntry::end_sample).max().unwrap_or(0)
    }

    pub fn total_duration_ms(&self) -> u64 {
        samples_to_ms(self.total_samples(), self.sample_rate)
    }

    pub fn clip_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|e| e.clip_path.as_deref())
    }

    /// Render every speaker's track, pan it and sum into one stereo mix
    pub fn mixdown(&self) -> CastResult<StereoTrack> {
        if self.entries.is_empty() {
            return Err(CastError::NoAudioGenerated);
        }

        let frames = self.total_samples();
        let mut mix = StereoTrack::silent(frames, self.sample_rate);

        for (speaker, pan) in &self.speakers {
            let mut track = vec![0.0f32; frames];
            for entry in self.entries.iter().filter(|e| &e.speaker == speaker) {
                for (slot, &sample) in track[entry.start_sample..].iter_mut().zip(entry.clip.samples.iter()) {
                    *slot += sample;
                }
            }
            mix.overlay_panned(&track, *pan);
        }

        Ok(mix)
    }

    /// All subtitle fragments shifted onto the shared clock
    pub fn merged_subtitle(&self) -> Option<Subtitle> {
        let fragments: Vec<(u64, &Subtitle)> = self
            .entries
            .iter()
            .filter_map(|e| e.subtitle.as_ref().map(|s| (e.start_offset_ms, s)))
            .collect();

        if fragments.is_empty() {
            return None;
        }
        Some(Subtitle::merge(fragments))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::Cue;

    const RATE: u32 = 1000;

    fn constant(duration_ms: u64, value: f32) -> AudioClip {
        AudioClip::new(vec![value; duration_ms as usize], RATE)
    }

    #[test]
    fn test_offsets_follow_running_clock() {
        let durations = [120u64, 45, 300, 10, 75];
        let mut timeline = AudioTimeline::new(RATE);

        for (i, d) in durations.iter().enumerate() {
            let speaker = if i % 2 == 0 { "speaker1" } else { "speaker2" };
            timeline.append(speaker, constant(*d, 0.1), None, None);
        }

        let mut expected = 0;
        for (entry, d) in timeline.entries().iter().zip(durations.iter()) {
            assert_eq!(entry.start_offset_ms, expected);
            expected += d;
        }

        let last = timeline.entries().last().unwrap();
        assert_eq!(timeline.total_duration_ms(), last.start_offset_ms + durations[4]);
        assert_eq!(timeline.total_duration_ms(), durations.iter().sum::<u64>());
    }

    #[test]
    fn test_pan_gains() {
        assert_eq!(pan_gains(0.0), (1.0, 1.0));

        let (left, right) = pan_gains(-0.2);
        assert!(left > 1.0 && right < 1.0);
        assert!((left - 2f32.powf(0.1)).abs() < 1e-6);
        assert!((right - (2.0 - 2f32.powf(0.2))).abs() < 1e-6);

        let (left, right) = pan_gains(0.2);
        assert!(right > 1.0 && left < 1.0);

        let (_, right) = pan_gains(-1.0);
        assert!(right.abs() < 1e-6);
    }

    #[test]
    fn test_mixdown_places_speakers_sequentially() {
        let mut timeline = AudioTimeline::new(RATE);
        timeline.set_pan("speaker1", -0.2);
        timeline.set_pan("speaker2", 0.2);
        timeline.append("speaker1", constant(100, 0.5), None, None);
        timeline.append("speaker2", constant(50, 0.25), None, None);

        let mix = timeline.mixdown().unwrap();
        assert_eq!(mix.frames(), 150);
        assert_eq!(mix.duration_ms(), 150);

        let (l1, r1) = pan_gains(-0.2);
        assert!((mix.left[10] - 0.5 * l1).abs() < 1e-6);
        assert!((mix.right[10] - 0.5 * r1).abs() < 1e-6);

        let (l2, r2) = pan_gains(0.2);
        assert!((mix.left[120] - 0.25 * l2).abs() < 1e-6);
        assert!((mix.right[120] - 0.25 * r2).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_millisecond_clips_never_overlap() {
        let rate = 24_000;
        let lengths = [24_001usize, 24_000, 17, 1, 23_999, 480];
        let mut timeline = AudioTimeline::new(rate);

        for (i, len) in lengths.iter().enumerate() {
            let speaker = if i % 2 == 0 { "speaker1" } else { "speaker2" };
            timeline.append(speaker, AudioClip::new(vec![0.1; *len], rate), None, None);
        }

        for pair in timeline.entries().windows(2) {
            assert_eq!(pair[1].start_sample, pair[0].end_sample());
        }

        let total: usize = lengths.iter().sum();
        assert_eq!(timeline.running_clock_samples(), total);
        assert_eq!(timeline.total_samples(), total);
        assert_eq!(timeline.total_duration_ms(), total as u64 * 1000 / rate as u64);
        assert_eq!(timeline.entries()[1].start_offset_ms, 1000);

        let mix = timeline.mixdown().unwrap();
        assert_eq!(mix.frames(), total);
        assert_eq!(mix.duration_ms(), timeline.total_duration_ms());

        // Sequential placement means no frame ever carries two clips
        let single = 0.1 * pan_gains(0.0).0;
        assert!(mix.left.iter().all(|s| (s - single).abs() < 1e-6));
    }

    #[test]
    fn test_mixdown_of_empty_timeline_fails() {
        let timeline = AudioTimeline::new(RATE);
        assert!(matches!(timeline.mixdown(), Err(CastError::NoAudioGenerated)));
    }

    #[test]
    fn test_append_resamples_to_timeline_rate() {
        let mut timeline = AudioTimeline::new(RATE);
        let clip = AudioClip::new(vec![0.1; 2000], 2000);

        timeline.append("narrator", clip, None, None);

        assert_eq!(timeline.entries()[0].clip.sample_rate, RATE);
        assert_eq!(timeline.entries()[0].clip.samples.len(), 1000);
        assert_eq!(timeline.running_clock_ms(), 1000);
    }

    #[test]
    fn test_merged_subtitle_uses_entry_offsets() {
        let cue = |text: &str| Subtitle::new(vec![Cue { start_ms: 0, end_ms: 40, text: text.into() }]);
        let mut timeline = AudioTimeline::new(RATE);

        timeline.append("speaker1", constant(100, 0.1), Some(cue("one")), None);
        timeline.append("speaker2", constant(100, 0.1), None, None);
        timeline.append("speaker1", constant(100, 0.1), Some(cue("three")), None);

        let merged = timeline.merged_subtitle().unwrap();
        assert_eq!(merged.cues.len(), 2);
        assert_eq!(merged.cues[0].start_ms, 0);
        assert_eq!(merged.cues[1].start_ms, 200);
        assert_eq!(merged.cues[1].text, "three");
    }

    #[test]
    fn test_wav_round_trip_keeps_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5, 0.25], 24_000);

        clip.write_wav(&path).unwrap();
        let read = AudioClip::read_wav(&path).unwrap();

        assert_eq!(read.sample_rate, 24_000);
        assert_eq!(read.samples.len(), 4);
        assert!((read.samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_pcm_decoding() {
        let bytes = [0x00, 0x40, 0x00, 0xC0];
        let clip = AudioClip::from_pcm16_le(&bytes, 24_000);
        assert_eq!(clip.samples, vec![0.5, -0.5]);
    }
}
