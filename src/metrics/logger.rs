//! Metric sinks.
//!
//! The agent accumulates scalars into a [`crate::metrics::MetricsBuffer`] and
//! flushes them to a [`MetricsLogger`] on a step cadence. Loggers also accept
//! occasional video arrays (open-loop prediction diagnostics).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use burn::prelude::*;

/// Dense float array for qualitative diagnostics: `[batch, time, obs_dim]`.
#[derive(Debug, Clone)]
pub struct VideoFrames {
    pub shape: [usize; 3],
    pub data: Vec<f32>,
}

impl VideoFrames {
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 3>) -> Self {
        let shape = tensor.dims();
        let data = tensor
            .into_data()
            .as_slice::<f32>()
            .expect("contiguous f32 video data")
            .to_vec();
        Self { shape, data }
    }
}

/// Logger trait for different metric backends.
pub trait MetricsLogger: Send {
    /// Log one scalar at a step.
    fn scalar(&mut self, step: usize, name: &str, value: f32);

    /// Log a video array at a step. Backends without a video channel may
    /// record only its shape or drop it.
    fn video(&mut self, step: usize, name: &str, frames: &VideoFrames);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger: one line per scalar, grouped by step.
pub struct ConsoleLogger {
    last_step: Option<usize>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self { last_step: None }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for ConsoleLogger {
    fn scalar(&mut self, step: usize, name: &str, value: f32) {
        if self.last_step != Some(step) {
            println!("---- step {step} ----");
            self.last_step = Some(step);
        }
        println!("{name:<28} {value:>12.5}");
    }

    fn video(&mut self, step: usize, name: &str, frames: &VideoFrames) {
        let [b, t, d] = frames.shape;
        println!("[{step}] {name}: video {b}x{t}x{d}");
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// Long-format CSV logger: one `step,name,value` row per scalar.
pub struct CSVLogger {
    writer: BufWriter<File>,
}

impl CSVLogger {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "step,name,value")?;
        Ok(Self { writer })
    }
}

impl MetricsLogger for CSVLogger {
    fn scalar(&mut self, step: usize, name: &str, value: f32) {
        let _ = writeln!(self.writer, "{step},{name},{value:.6}");
    }

    fn video(&mut self, _step: usize, _name: &str, _frames: &VideoFrames) {
        // No video channel in CSV output.
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fans metrics out to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn scalar(&mut self, step: usize, name: &str, value: f32) {
        for logger in &mut self.loggers {
            logger.scalar(step, name, value);
        }
    }

    fn video(&mut self, step: usize, name: &str, frames: &VideoFrames) {
        for logger in &mut self.loggers {
            logger.video(step, name, frames);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        {
            let mut logger = CSVLogger::new(&path).unwrap();
            logger.scalar(1, "loss", 0.5);
            logger.scalar(2, "loss", 0.25);
            logger.flush();
        }

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "step,name,value");
        assert!(lines[1].starts_with("1,loss,"));
        assert!(lines[2].starts_with("2,loss,"));
    }

    #[test]
    fn test_multi_logger_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut multi = MultiLogger::new()
            .add(ConsoleLogger::new())
            .add(CSVLogger::new(&path).unwrap());
        multi.scalar(1, "reward", 3.0);
        multi.flush();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("1,reward,"));
    }

    #[test]
    fn test_video_frames_from_tensor() {
        use burn::backend::NdArray;
        let device = Default::default();
        let tensor = Tensor::<NdArray<f32>, 3>::zeros([2, 3, 4], &device);
        let frames = VideoFrames::from_tensor(tensor);
        assert_eq!(frames.shape, [2, 3, 4]);
        assert_eq!(frames.data.len(), 24);
    }
}
