use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one upload-to-artifact request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Uploaded,
    Moderating,
    Rejected,
    Generating,
    Completed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStage::Rejected | JobStage::Completed | JobStage::Failed
        )
    }

    /// Forward-only transitions; any live stage may fail.
    pub fn can_transition_to(self, next: JobStage) -> bool {
        match (self, next) {
            (JobStage::Uploaded, JobStage::Moderating)
            | (JobStage::Moderating, JobStage::Rejected)
            | (JobStage::Moderating, JobStage::Generating)
            | (JobStage::Generating, JobStage::Completed) => true,
            (from, JobStage::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// True when `self` can only be reached after `earlier`.
    pub fn is_after(self, earlier: JobStage) -> bool {
        self.rank() > earlier.rank()
    }

    fn rank(self) -> u8 {
        match self {
            JobStage::Uploaded => 0,
            JobStage::Moderating => 1,
            JobStage::Generating => 2,
            JobStage::Rejected | JobStage::Completed | JobStage::Failed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Uploaded => "uploaded",
            JobStage::Moderating => "moderating",
            JobStage::Rejected => "rejected",
            JobStage::Generating => "generating",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Moderation,
    GenerationTimeout,
    Generation,
    Storage,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
}

/// The staged upload a job works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Storage key of the staged file
    pub key: String,
    /// Sanitized client file name
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLabel {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// 0-100
    pub confidence: f32,
}

impl ModerationLabel {
    /// Top-level category: the parent when the classifier reports one.
    pub fn category(&self) -> &str {
        match self.parent.as_deref() {
            Some(parent) if !parent.trim().is_empty() => parent,
            _ => &self.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub job_id: JobId,
    pub approved: bool,
    pub flagged_categories: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationStatus {
    Pending,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicFigureThreshold {
    #[default]
    Auto,
    Low,
}

impl FromStr for PublicFigureThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown public figure threshold '{}'", other)),
        }
    }
}

/// Parameters forwarded to the video-to-video model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model: String,
    pub prompt_text: String,
    /// "W:H", e.g. "1280:720"
    pub ratio: String,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub reference_image_uri: Option<String>,
    #[serde(default)]
    pub public_figure_threshold: PublicFigureThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRequest {
    pub job_id: JobId,
    pub source_key: String,
    pub model: String,
    pub status: TransformationStatus,
    /// Task id assigned by the generation service once it accepted the input
    #[serde(default)]
    pub remote_task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub key: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub url: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: JobStage, to: JobStage },
    #[error("a moderation verdict was already recorded")]
    VerdictAlreadyRecorded,
    #[error("verdict belongs to job {0}")]
    ForeignVerdict(JobId),
    #[error("generation requires an approved verdict")]
    NotApproved,
    #[error("no transformation request exists")]
    NoTransformation,
    #[error("an artifact was already stored")]
    ArtifactAlreadyStored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source: SourceRef,
    pub options: GenerationOptions,
    pub stage: JobStage,
    #[serde(default)]
    pub verdict: Option<ModerationVerdict>,
    #[serde(default)]
    pub transformation: Option<TransformationRequest>,
    #[serde(default)]
    pub artifact: Option<StoredArtifact>,
    #[serde(default)]
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, source: SourceRef, options: GenerationOptions) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            options,
            stage: JobStage::Uploaded,
            verdict: None,
            transformation: None,
            artifact: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn move_to(&mut self, next: JobStage) -> Result<(), TransitionError> {
        if !self.stage.can_transition_to(next) {
            return Err(TransitionError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn start_moderation(&mut self) -> Result<(), TransitionError> {
        self.move_to(JobStage::Moderating)
    }

    /// Records the single verdict of this job. A rejection is terminal.
    pub fn record_verdict(&mut self, verdict: ModerationVerdict) -> Result<(), TransitionError> {
        if self.stage != JobStage::Moderating {
            return Err(TransitionError::IllegalTransition {
                from: self.stage,
                to: if verdict.approved {
                    JobStage::Generating
                } else {
                    JobStage::Rejected
                },
            });
        }
        if self.verdict.is_some() {
            return Err(TransitionError::VerdictAlreadyRecorded);
        }
        if verdict.job_id != self.id {
            return Err(TransitionError::ForeignVerdict(verdict.job_id));
        }
        let approved = verdict.approved;
        self.verdict = Some(verdict);
        if approved {
            self.touch();
            Ok(())
        } else {
            self.move_to(JobStage::Rejected)
        }
    }

    /// Opens the transformation request. Only reachable with an approved verdict.
    pub fn begin_generation(&mut self) -> Result<(), TransitionError> {
        match &self.verdict {
            Some(v) if v.approved => {}
            _ => return Err(TransitionError::NotApproved),
        }
        self.move_to(JobStage::Generating)?;
        self.transformation = Some(TransformationRequest {
            job_id: self.id,
            source_key: self.source.key.clone(),
            model: self.options.model.clone(),
            status: TransformationStatus::Pending,
            remote_task_id: None,
        });
        Ok(())
    }

    pub fn mark_transformation_running(&mut self, task_id: &str) -> Result<(), TransitionError> {
        if self.stage != JobStage::Generating {
            return Err(TransitionError::IllegalTransition {
                from: self.stage,
                to: JobStage::Generating,
            });
        }
        let request = self
            .transformation
            .as_mut()
            .ok_or(TransitionError::NoTransformation)?;
        request.status = TransformationStatus::Running;
        request.remote_task_id = Some(task_id.to_string());
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, artifact: StoredArtifact) -> Result<(), TransitionError> {
        match &self.verdict {
            Some(v) if v.approved => {}
            _ => return Err(TransitionError::NotApproved),
        }
        if self.artifact.is_some() {
            return Err(TransitionError::ArtifactAlreadyStored);
        }
        if self.transformation.is_none() {
            return Err(TransitionError::NoTransformation);
        }
        self.move_to(JobStage::Completed)?;
        if let Some(request) = self.transformation.as_mut() {
            request.status = TransformationStatus::Done;
        }
        self.artifact = Some(artifact);
        Ok(())
    }

    pub fn fail(&mut self, kind: FailureKind, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.move_to(JobStage::Failed)?;
        if let Some(request) = self.transformation.as_mut() {
            if matches!(
                request.status,
                TransformationStatus::Pending | TransformationStatus::Running
            ) {
                request.status = TransformationStatus::Error;
            }
        }
        self.failure = Some(JobFailure {
            kind,
            reason: reason.into(),
        });
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.fail(FailureKind::Cancelled, "cancelled by client")
    }

    pub fn result_url(&self) -> Option<&str> {
        match self.stage {
            JobStage::Completed => self.artifact.as_ref().map(|a| a.url.as_str()),
            _ => None,
        }
    }

    /// Human-readable reason for a rejected or failed job.
    pub fn reason(&self) -> Option<String> {
        match self.stage {
            JobStage::Rejected => {
                let categories = self
                    .verdict
                    .as_ref()
                    .map(|v| v.flagged_categories.join(", "))
                    .unwrap_or_default();
                Some(format!("rejected by moderation: {}", categories))
            }
            JobStage::Failed => self.failure.as_ref().map(|f| f.reason.clone()),
            _ => None,
        }
    }
}
