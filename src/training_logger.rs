//! CSV record of a training run.
//!
//! One row per evaluation with the columns
//! `step,elapsed_seconds,learning_rate,train_loss,val_loss,train_perplexity,val_perplexity`.
//! Perplexity is `exp(loss)`; a model guessing uniformly over `V` symbols
//! scores `V`. The validation columns stay empty when the held-out split is
//! too short to evaluate.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Writes one CSV row per evaluation.
pub struct TrainingLogger {
    log_file: BufWriter<File>,
    start_time: Instant,
}

impl TrainingLogger {
    /// Creates (or truncates) the CSV file at `log_path` and writes the header.
    pub fn new(log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut log_file = BufWriter::new(File::create(log_path)?);
        writeln!(
            log_file,
            "step,elapsed_seconds,learning_rate,train_loss,val_loss,train_perplexity,val_perplexity"
        )?;
        log_file.flush()?;
        Ok(Self {
            log_file,
            start_time: Instant::now(),
        })
    }

    /// Appends a row; empty validation fields when `val_loss` is `None`.
    pub fn log(
        &mut self,
        step: usize,
        learning_rate: f32,
        train_loss: f32,
        val_loss: Option<f32>,
    ) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let (val_loss, val_perplexity) = val_loss.map_or_else(
            || (String::new(), String::new()),
            |l| (format!("{l:.4}"), format!("{:.2}", l.exp())),
        );
        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{},{:.2},{}",
            step,
            elapsed,
            learning_rate,
            train_loss,
            val_loss,
            train_loss.exp(),
            val_perplexity
        )?;
        // Rows must survive a crash later in the run.
        self.log_file.flush()
    }
}
