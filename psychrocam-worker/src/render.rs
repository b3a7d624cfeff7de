//! Rendering collaborator seam
//!
//! The chart itself is drawn outside this workspace. A cycle gathers a
//! [`RenderContext`] from the cache and hands it to a [`ChartRenderer`]; the
//! returned bytes end up under `svg_chart`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use psychrocam_core::config::ConvexZone;
use psychrocam_core::constants::keys;
use psychrocam_core::{Arrows, CacheResult, SensorAggregator, Snapshot, TypedCache};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::RenderError;

/// Everything the renderer needs from one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderContext {
    /// Chart style configuration
    pub chart_style: Option<Value>,
    /// Zones overlay configuration
    pub chart_zones: Option<Value>,
    /// Site altitude in metres
    pub altitude: Option<f64>,
    /// Latest pressure reading in kPa
    pub pressure_kpa: Option<f64>,
    /// Current points
    pub points: Snapshot,
    /// Arrows from the oldest to the newest snapshot
    pub arrows: Option<Arrows>,
    /// Interior/exterior hull zones
    pub interior_zones: Option<Vec<ConvexZone>>,
    /// Hours covered by the history window
    pub history_span_hours: Option<f64>,
}

impl RenderContext {
    /// Read the context from `cache`
    pub fn gather(cache: &TypedCache) -> CacheResult<Self> {
        Ok(Self {
            chart_style: cache.get_json(keys::CHART_STYLE)?,
            chart_zones: cache.get_json(keys::CHART_ZONES)?,
            altitude: cache.get_f64(keys::ALTITUDE)?,
            pressure_kpa: cache.get_f64(keys::PRESSURE_KPA)?,
            points: cache.get_json(keys::LAST_POINTS)?.unwrap_or_default(),
            arrows: cache.get_json(keys::ARROWS)?,
            interior_zones: cache.get_json(keys::INTERIOR_ZONES)?,
            history_span_hours: SensorAggregator::new(cache.clone()).history_span_hours()?,
        })
    }
}

/// Draws a chart from a [`RenderContext`]
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Produce the chart artifact
    async fn render(&self, context: &RenderContext) -> Result<Vec<u8>, RenderError>;
}

/// Renderer running an external program
///
/// The context is written to the program's stdin as JSON and the artifact is
/// read from its stdout. A non-zero exit or empty output is a failure.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Run `program` with no arguments and a 60 s timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Split a shell-like command line on whitespace
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Append arguments
    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Set the time allowed per render
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, input: Vec<u8>) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin while stdout is drained, or a chatty renderer fills both pipes
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output?;
        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        fed?;
        if output.stdout.is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ChartRenderer for CommandRenderer {
    async fn render(&self, context: &RenderContext) -> Result<Vec<u8>, RenderError> {
        let input = serde_json::to_vec(context).map_err(|e| RenderError::Context(e.to_string()))?;
        debug!("Rendering {} points with {}", context.points.len(), self.program);

        match tokio::time::timeout(self.timeout, self.run(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Renderer {} did not finish in {:?}", self.program, self.timeout);
                Err(RenderError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
