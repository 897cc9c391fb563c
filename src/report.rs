// src/report.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::risk::RiskAssessmentResult;
use crate::domain::threat::MevAnalysisResult;
use crate::shared::errors::ReportError;
use crate::shared::utils::report_timestamp;

/// Per-cycle report persisted to durable storage
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum Report {
    Risk(RiskAssessmentResult),
    Mev(MevAnalysisResult),
}

impl Report {
    /// File stem convention: `risk_assessment_<YYYYMMDD_HHMMSS>` /
    /// `mev_analysis_<YYYYMMDD_HHMMSS>`
    pub fn file_stem(&self) -> String {
        match self {
            Report::Risk(r) => format!("risk_assessment_{}", report_timestamp(r.timestamp)),
            Report::Mev(r) => format!("mev_analysis_{}", report_timestamp(r.timestamp)),
        }
    }
}

/// Durable storage collaborator. Returns an identifier for the persisted
/// report (for the file sink, its path).
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn persist(&self, report: &Report) -> Result<String, ReportError>;
}

/// One pretty-printed JSON file per cycle, named by timestamp
pub struct FileReportSink {
    output_dir: PathBuf,
}

impl FileReportSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    async fn write_once(&self, report: &Report) -> Result<String, ReportError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{}.json", report.file_stem()));
        let body = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, body).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn persist(&self, report: &Report) -> Result<String, ReportError> {
        match self.write_once(report).await {
            Ok(id) => {
                info!("📝 Report persisted: {}", id);
                Ok(id)
            }
            Err(first) => {
                warn!("Report write failed ({}), retrying once", first);
                tokio::time::sleep(Duration::from_millis(500)).await;
                self.write_once(report).await
            }
        }
    }
}
