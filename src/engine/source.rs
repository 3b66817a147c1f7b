//! WAV file source for playback.
//!
//! Reads PCM frames back as interleaved f32, tracking position in frames.
//! Accepts the sink's own 32-bit float files plus 16-bit int WAVs from
//! elsewhere; anything else is refused at open time.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec};

use super::error::IoError;

/// One chunk of decoded samples. `reached_end` is set on the chunk that
/// consumes the last frame; later reads stay empty with it still set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadChunk {
    pub samples: Vec<f32>,
    pub reached_end: bool,
}

pub struct FileSource {
    path: PathBuf,
    reader: Option<WavReader<BufReader<File>>>,
    spec: WavSpec,
    total_frames: u64,
    position_frames: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let reader = WavReader::open(path).map_err(|e| map_open_error(path, e))?;
        let spec = reader.spec();

        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16) => {}
            (format, bits) => {
                return Err(IoError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: format!("{:?} {}-bit samples", format, bits),
                });
            }
        }

        let total_frames = reader.duration() as u64;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            spec,
            total_frames,
            position_frames: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn position_frames(&self) -> u64 {
        self.position_frames
    }

    pub fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / self.spec.sample_rate as f64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seek to a position in seconds, clamped to `[0, duration]`.
    pub fn seek(&mut self, position_seconds: f64) -> Result<(), IoError> {
        if self.total_frames == 0 {
            return Err(IoError::SeekOutOfRange);
        }

        let clamped = position_seconds.clamp(0.0, self.duration_seconds());
        let target = ((clamped * self.spec.sample_rate as f64) as u64).min(self.total_frames);

        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        reader.seek(target as u32).map_err(|e| IoError::UnsupportedFormat {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.position_frames = target;
        Ok(())
    }

    /// Read up to `max_frames` frames of interleaved samples.
    pub fn read(&mut self, max_frames: usize) -> Result<ReadChunk, IoError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(ReadChunk {
                samples: Vec::new(),
                reached_end: true,
            });
        };

        let want = max_frames * self.spec.channels as usize;
        let mut samples = Vec::with_capacity(want);

        match self.spec.sample_format {
            SampleFormat::Float => {
                for result in reader.samples::<f32>().take(want) {
                    samples.push(result.map_err(|e| IoError::UnsupportedFormat {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?);
                }
            }
            SampleFormat::Int => {
                for result in reader.samples::<i16>().take(want) {
                    let sample = result.map_err(|e| IoError::UnsupportedFormat {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
                    samples.push(sample as f32 / 32_768.0);
                }
            }
        }

        self.position_frames += samples.len() as u64 / self.spec.channels as u64;
        let reached_end = self.position_frames >= self.total_frames;

        Ok(ReadChunk {
            samples,
            reached_end,
        })
    }

    /// Release the file handle. Idempotent.
    pub fn close(&mut self) {
        self.reader = None;
    }
}

fn map_open_error(path: &Path, error: hound::Error) -> IoError {
    match error {
        hound::Error::IoError(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
            IoError::NotFound {
                path: path.to_path_buf(),
            }
        }
        other => IoError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::AudioFormat;
    use crate::engine::sink::FileSink;

    fn write_take(path: &Path, frames: usize) {
        let mut sink = FileSink::create(
            path,
            AudioFormat {
                sample_rate: 44_100,
                channels: 1,
            },
        )
        .unwrap();
        let samples: Vec<f32> = (0..frames).map(|i| (i as f32) / frames as f32).collect();
        sink.write(&samples).unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSource::open(&dir.path().join("missing.wav"));
        assert!(matches!(result, Err(IoError::NotFound { .. })));
    }

    #[test]
    fn test_open_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file at all").unwrap();

        let result = FileSource::open(&path);
        assert!(matches!(result, Err(IoError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_open_unsupported_bit_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i32).unwrap();
        writer.finalize().unwrap();

        let result = FileSource::open(&path);
        assert!(matches!(result, Err(IoError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_read_all_frames_sets_reached_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        write_take(&path, 100);

        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.total_frames(), 100);

        let chunk = source.read(100).unwrap();
        assert_eq!(chunk.samples.len(), 100);
        assert!(chunk.reached_end);

        // Past the end: empty, still at the end.
        let chunk = source.read(10).unwrap();
        assert!(chunk.samples.is_empty());
        assert!(chunk.reached_end);
    }

    #[test]
    fn test_read_in_chunks_tracks_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        write_take(&path, 100);

        let mut source = FileSource::open(&path).unwrap();
        let first = source.read(60).unwrap();
        assert_eq!(first.samples.len(), 60);
        assert!(!first.reached_end);
        assert_eq!(source.position_frames(), 60);

        let second = source.read(60).unwrap();
        assert_eq!(second.samples.len(), 40);
        assert!(second.reached_end);
        assert_eq!(source.position_frames(), 100);
    }

    #[test]
    fn test_seek_restarts_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        write_take(&path, 100);

        let mut source = FileSource::open(&path).unwrap();
        source.read(100).unwrap();

        source.seek(0.0).unwrap();
        assert_eq!(source.position_frames(), 0);
        let chunk = source.read(100).unwrap();
        assert_eq!(chunk.samples.len(), 100);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        write_take(&path, 100);

        let mut source = FileSource::open(&path).unwrap();
        source.seek(9999.0).unwrap();
        assert_eq!(source.position_frames(), 100);

        source.seek(-3.0).unwrap();
        assert_eq!(source.position_frames(), 0);
    }

    #[test]
    fn test_seek_zero_duration_is_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_take(&path, 0);

        let mut source = FileSource::open(&path).unwrap();
        assert!(matches!(source.seek(0.0), Err(IoError::SeekOutOfRange)));
    }

    #[test]
    fn test_int16_decodes_to_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int16.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0i16, 16_384, -16_384, i16::MAX] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = FileSource::open(&path).unwrap();
        let chunk = source.read(4).unwrap();
        assert_eq!(chunk.samples.len(), 4);
        assert_eq!(chunk.samples[0], 0.0);
        assert!((chunk.samples[1] - 0.5).abs() < 1e-3);
        assert!((chunk.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_close_is_idempotent_and_ends_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        write_take(&path, 10);

        let mut source = FileSource::open(&path).unwrap();
        source.close();
        source.close();

        let chunk = source.read(10).unwrap();
        assert!(chunk.samples.is_empty());
        assert!(chunk.reached_end);
    }
}
