//! Named scalar accumulation between log flushes.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::logger::{MetricsLogger, VideoFrames};

/// Accumulates named scalars (and occasional videos) across train steps,
/// then flushes windowed means to a logger.
#[derive(Debug, Default)]
pub struct MetricsBuffer {
    scalars: BTreeMap<String, Vec<f32>>,
    videos: Vec<(String, VideoFrames)>,
}

impl MetricsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: f32) {
        self.scalars.entry(name.to_string()).or_default().push(value);
    }

    pub fn add_video(&mut self, name: &str, frames: VideoFrames) {
        self.videos.push((name.to_string(), frames));
    }

    /// Mean of each accumulated scalar series, in name order.
    pub fn means(&self) -> Vec<(String, f32)> {
        self.scalars
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| {
                let mean = values.iter().sum::<f32>() / values.len() as f32;
                (name.clone(), mean)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.videos.is_empty()
    }

    /// Write windowed means and pending videos to `logger`, then clear.
    pub fn flush_to(&mut self, logger: &mut dyn MetricsLogger, step: usize) {
        for (name, mean) in self.means() {
            logger.scalar(step, &name, mean);
        }
        for (name, frames) in self.videos.drain(..) {
            logger.video(step, &name, &frames);
        }
        logger.flush();
        self.scalars.clear();
    }
}

/// Buffer shared between a training loop and a reporting thread.
pub type SharedMetricsBuffer = Arc<RwLock<MetricsBuffer>>;

pub fn shared_metrics() -> SharedMetricsBuffer {
    Arc::new(RwLock::new(MetricsBuffer::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture {
        scalars: Vec<(usize, String, f32)>,
        videos: usize,
        flushes: usize,
    }

    impl MetricsLogger for Capture {
        fn scalar(&mut self, step: usize, name: &str, value: f32) {
            self.scalars.push((step, name.to_string(), value));
        }

        fn video(&mut self, _step: usize, _name: &str, _frames: &VideoFrames) {
            self.videos += 1;
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[test]
    fn test_windowed_means() {
        let mut buffer = MetricsBuffer::new();
        buffer.add("loss", 1.0);
        buffer.add("loss", 3.0);
        buffer.add("entropy", 0.5);

        let means = buffer.means();
        assert_eq!(means.len(), 2);
        assert_eq!(means[0], ("entropy".to_string(), 0.5));
        assert_eq!(means[1], ("loss".to_string(), 2.0));
    }

    #[test]
    fn test_flush_clears_and_forwards() {
        let mut buffer = MetricsBuffer::new();
        buffer.add("loss", 2.0);
        buffer.add_video(
            "openloop",
            VideoFrames {
                shape: [1, 2, 3],
                data: vec![0.0; 6],
            },
        );

        let mut capture = Capture {
            scalars: Vec::new(),
            videos: 0,
            flushes: 0,
        };
        buffer.flush_to(&mut capture, 100);

        assert_eq!(capture.scalars, vec![(100, "loss".to_string(), 2.0)]);
        assert_eq!(capture.videos, 1);
        assert_eq!(capture.flushes, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_shared_buffer_across_threads() {
        let shared = shared_metrics();
        let writer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            for _ in 0..10 {
                writer.write().add("reward", 1.0);
            }
        });
        handle.join().unwrap();

        let means = shared.read().means();
        assert_eq!(means, vec![("reward".to_string(), 1.0)]);
    }
}
