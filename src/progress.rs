use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Generating,
    Zipping,
    Downloading,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Generating => "generating",
            JobStatus::Zipping => "zipping",
            JobStatus::Downloading => "downloading",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn can_move_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Idle, Generating) => true,
            (Generating, Generating | Zipping | Downloading) => true,
            (Zipping, Zipping | Downloading) => true,
            (Downloading, Done) => true,
            (Generating | Zipping | Downloading, Error) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderEvent {
    pub status: JobStatus,
    pub progress: u8,
    /// 1-based page the event refers to, if any.
    pub page: Option<usize>,
    pub total_pages: usize,
    pub message: Option<String>,
}

/// Observer for a batch's intermediate state.
pub trait ProgressSink {
    fn emit(&mut self, event: RenderEvent);
}

impl ProgressSink for Vec<RenderEvent> {
    fn emit(&mut self, event: RenderEvent) {
        self.push(event);
    }
}

impl ProgressSink for Sender<RenderEvent> {
    fn emit(&mut self, event: RenderEvent) {
        // A receiver that went away only stops observing.
        let _ = self.send(event);
    }
}

/// Logs every event.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&mut self, event: RenderEvent) {
        match event.status {
            JobStatus::Error => error!(
                page = event.page,
                "batch failed: {}",
                event.message.as_deref().unwrap_or("unknown error")
            ),
            status => info!(
                status = status.as_str(),
                progress = event.progress,
                page = event.page,
                total_pages = event.total_pages,
                "batch progress"
            ),
        }
    }
}

pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub page: Option<usize>,
    pub message: String,
}

/// In-memory state of one batch render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub status: JobStatus,
    pub progress: u8,
    pub total_pages: usize,
    pub current_page: Option<usize>,
    pub error: Option<JobError>,
}

impl Default for RenderJob {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            progress: 0,
            total_pages: 0,
            current_page: None,
            error: None,
        }
    }
}

impl RenderJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `status` and build the event describing the new state.
    /// Illegal transitions are programming errors.
    pub fn advance(&mut self, status: JobStatus, progress: u8, page: Option<usize>) -> RenderEvent {
        assert!(
            self.status.can_move_to(status),
            "illegal job transition {} -> {}",
            self.status,
            status
        );
        self.status = status;
        self.progress = progress;
        if page.is_some() {
            self.current_page = page;
        }
        self.event(None)
    }

    pub fn fail(&mut self, page: Option<usize>, message: String) -> RenderEvent {
        assert!(
            self.status.can_move_to(JobStatus::Error),
            "illegal job transition {} -> error",
            self.status
        );
        self.status = JobStatus::Error;
        self.error = Some(JobError {
            page,
            message: message.clone(),
        });
        self.event(Some(message))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Done | JobStatus::Error)
    }

    fn event(&self, message: Option<String>) -> RenderEvent {
        RenderEvent {
            status: self.status,
            progress: self.progress,
            page: match self.status {
                JobStatus::Error => self.error.as_ref().and_then(|e| e.page),
                _ => self.current_page,
            },
            total_pages: self.total_pages,
            message,
        }
    }
}
