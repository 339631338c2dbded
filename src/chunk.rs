use serde::Serialize;

use crate::audio::AudioTrack;
use crate::error::{DubError, Result};

/// A contiguous span of source audio processed as one translation and
/// synthesis unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
    #[serde(skip)]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Chunk {
    pub fn duration_secs(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// Splits source audio at fixed duration boundaries
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    chunk_seconds: f64,
    trailing_merge_seconds: f64,
}

impl ChunkPlanner {
    /// `chunk_seconds` is raised to `min_chunk_seconds` when smaller
    pub fn new(chunk_seconds: f64, min_chunk_seconds: f64, trailing_merge_seconds: f64) -> Self {
        Self {
            chunk_seconds: chunk_seconds.max(min_chunk_seconds),
            trailing_merge_seconds: trailing_merge_seconds.max(0.0),
        }
    }

    /// Samples per full chunk at the given rate
    pub fn chunk_samples(&self, sample_rate: u32) -> usize {
        ((self.chunk_seconds * sample_rate as f64).round() as usize).max(1)
    }

    pub fn plan(&self, track: &AudioTrack) -> Result<Vec<Chunk>> {
        if track.is_empty() || track.sample_rate == 0 {
            return Err(DubError::InvalidInput(
                "No audio samples were extracted from the source video".to_string(),
            ));
        }

        let sr = track.sample_rate;
        let total = track.samples.len();
        let size = self.chunk_samples(sr);
        let merge_below = (self.trailing_merge_seconds * sr as f64).round() as usize;

        let mut bounds: Vec<(usize, usize)> = Vec::with_capacity(total / size + 1);
        let mut start = 0;
        while start < total {
            let end = (start + size).min(total);
            bounds.push((start, end));
            start = end;
        }

        // A degenerate tail would synthesize to nothing audible.
        if bounds.len() > 1 {
            if let Some(&(tail_start, tail_end)) = bounds.last() {
                if tail_end - tail_start < merge_below {
                    bounds.pop();
                    if let Some(prev) = bounds.last_mut() {
                        prev.1 = tail_end;
                    }
                }
            }
        }

        Ok(bounds
            .into_iter()
            .enumerate()
            .map(|(index, (s, e))| Chunk {
                index,
                start_s: s as f64 / sr as f64,
                end_s: e as f64 / sr as f64,
                samples: track.samples[s..e].to_vec(),
                sample_rate: sr,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::sine;

    fn assert_contiguous(chunks: &[Chunk], total_secs: f64) {
        assert_eq!(chunks[0].start_s, 0.0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_s, pair[1].start_s);
            assert_eq!(pair[0].index + 1, pair[1].index);
        }
        let sum: f64 = chunks.iter().map(|c| c.duration_secs()).sum();
        assert!((sum - total_secs).abs() < 1e-6, "sum {} vs {}", sum, total_secs);
    }

    #[test]
    fn test_chunks_cover_whole_track() {
        let track = sine(200.0, 50.0, 0.3, 16_000);
        let chunks = ChunkPlanner::new(20.0, 4.0, 1.0).plan(&track).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_contiguous(&chunks, 50.0);
        assert_eq!(chunks[2].duration_secs(), 10.0);
        let sample_sum: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(sample_sum, track.samples.len());
    }

    #[test]
    fn test_short_tail_is_merged() {
        let track = sine(200.0, 40.5, 0.3, 16_000);
        let chunks = ChunkPlanner::new(20.0, 4.0, 1.0).plan(&track).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_contiguous(&chunks, 40.5);
        assert_eq!(chunks[1].duration_secs(), 20.5);
    }

    #[test]
    fn test_chunk_size_has_floor() {
        let track = sine(200.0, 10.0, 0.3, 16_000);
        let chunks = ChunkPlanner::new(1.0, 4.0, 1.0).plan(&track).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].duration_secs(), 4.0);
        assert_contiguous(&chunks, 10.0);
    }

    #[test]
    fn test_audio_shorter_than_one_chunk() {
        let track = sine(200.0, 0.5, 0.3, 16_000);
        let chunks = ChunkPlanner::new(20.0, 4.0, 1.0).plan(&track).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_contiguous(&chunks, 0.5);
    }

    #[test]
    fn test_empty_audio_is_invalid_input() {
        let track = AudioTrack::new(Vec::new(), 16_000);
        let result = ChunkPlanner::new(20.0, 4.0, 1.0).plan(&track);
        assert!(matches!(result, Err(DubError::InvalidInput(_))));
    }
}
