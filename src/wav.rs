//! WAV file sink.

use std::path::Path;

use crate::error::{Result, TtsError};

/// Write mono 16-bit PCM `samples` at `sample_rate` to `path`.
pub fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let io_err = |source| TtsError::Io { path: path.to_path_buf(), source };

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(io_err)?;
    for &s in samples {
        writer.write_sample(s).map_err(io_err)?;
    }
    writer.finalize().map_err(io_err)?;

    tracing::info!(
        path = %path.display(),
        samples = samples.len(),
        seconds = samples.len() as f32 / sample_rate as f32,
        "audio saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = (-500..500).map(|i| i * 30).collect();

        write_wav(&path, 24_000, &samples).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, samples);
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        let err = write_wav(&path, 24_000, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TtsError::Io { .. }), "{err:?}");
    }
}
