use crate::{
    chunk_plan::chunk,
    compose::compose_page,
    geometry::GridGeometry,
    package::{Artifact, ArtifactKind, package_with_progress, write_artifact},
    progress::{JobStatus, ProgressSink, RenderJob, percent},
    qr::{QrCache, QrEncoder},
    record::{ReportRecord, duplicate_report_numbers},
    render::{PageInput, PageRenderer},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} of {total_pages} failed: {message}")]
    Page {
        page: usize,
        total_pages: usize,
        message: String,
    },
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("nothing to deliver: job is {0}")]
    NotReady(JobStatus),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub geometry: GridGeometry,
    pub overprint_header: bool,
    pub qr_base_url: String,
}

pub struct Pipeline<R: PageRenderer, Q: QrEncoder> {
    opts: PipelineOptions,
    renderer: R,
    encoder: Q,
}

impl<R: PageRenderer, Q: QrEncoder> Pipeline<R, Q> {
    pub fn new(opts: PipelineOptions, renderer: R, encoder: Q) -> Self {
        Self {
            opts,
            renderer,
            encoder,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Fresh state for one batch: empty QR cache, idle job.
    pub fn session(&mut self) -> RenderSession<'_, R, Q> {
        RenderSession {
            pipeline: self,
            qr_cache: QrCache::new(),
            job: RenderJob::new(),
        }
    }

    /// Render a whole batch in a new session.
    pub fn run(
        &mut self,
        records: &[ReportRecord],
        file_root: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<Option<Artifact>, RenderError> {
        self.session().render(records, file_root, sink)
    }
}

/// One batch invocation. Owns the QR cache and the job state; nothing is
/// shared with other sessions.
pub struct RenderSession<'p, R: PageRenderer, Q: QrEncoder> {
    pipeline: &'p mut Pipeline<R, Q>,
    qr_cache: QrCache,
    job: RenderJob,
}

impl<R: PageRenderer, Q: QrEncoder> RenderSession<'_, R, Q> {
    pub fn job(&self) -> &RenderJob {
        &self.job
    }

    pub fn qr_cache(&self) -> &QrCache {
        &self.qr_cache
    }

    /// Start over: drop cached QR codes and return to idle.
    pub fn reset(&mut self) {
        self.qr_cache = QrCache::new();
        self.job.reset();
    }

    /// Render `records` page by page. Returns `Ok(None)` for an empty batch.
    /// Any page failure aborts the batch and nothing is delivered.
    pub fn render(
        &mut self,
        records: &[ReportRecord],
        file_root: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<Option<Artifact>, RenderError> {
        assert_eq!(
            self.job.status,
            JobStatus::Idle,
            "a session renders once; reset() before retrying"
        );

        let started = Instant::now();
        let opts = &self.pipeline.opts;
        let pages = chunk(records, opts.geometry.items_per_page());
        if pages.is_empty() {
            info!("no records; nothing to render");
            return Ok(None);
        }

        for dup in duplicate_report_numbers(records) {
            warn!("report_no {dup} appears more than once in this batch; rendering every copy");
        }

        let total = pages.len();
        self.job.total_pages = total;
        info!(
            "rendering {} records on {} page(s) of {}x{}",
            records.len(),
            total,
            opts.geometry.cols,
            opts.geometry.rows
        );
        sink.emit(self.job.advance(JobStatus::Generating, 0, Some(1)));

        let mut blobs = Vec::with_capacity(total);
        for (i, page_records) in pages.iter().enumerate() {
            let page = i + 1;
            let opts = &self.pipeline.opts;

            let qr = self
                .qr_cache
                .resolve_page(page_records, &opts.qr_base_url, &self.pipeline.encoder);
            let layout = compose_page(page_records, &opts.geometry, opts.overprint_header);
            debug!(page, empty_cells = layout.empty_cells(), "page composed");

            let input = PageInput {
                page,
                layout: &layout,
                records: page_records,
                qr: &qr,
            };
            match self.pipeline.renderer.render(&input) {
                Ok(bytes) => {
                    debug!(page, bytes = bytes.len(), "page rendered");
                    blobs.push(bytes);
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    sink.emit(self.job.fail(Some(page), message.clone()));
                    return Err(RenderError::Page {
                        page,
                        total_pages: total,
                        message,
                    });
                }
            }

            sink.emit(
                self.job
                    .advance(JobStatus::Generating, percent(page, total), Some(page)),
            );
        }

        if total > 1 {
            sink.emit(self.job.advance(JobStatus::Zipping, 0, None));
        }
        let job = &mut self.job;
        let packaged = package_with_progress(blobs, file_root, |pct| {
            sink.emit(job.advance(JobStatus::Zipping, pct, None));
        });
        let artifact = match packaged {
            Ok(artifact) => artifact,
            Err(err) => {
                let message = format!("{err:#}");
                sink.emit(self.job.fail(None, message.clone()));
                return Err(RenderError::Packaging(message));
            }
        };

        info!(
            "batch ready: {} ({:?}, {} bytes) in {:?}",
            artifact.file_name,
            artifact.kind,
            artifact.bytes.len(),
            started.elapsed()
        );
        sink.emit(self.job.advance(JobStatus::Downloading, 100, None));
        Ok(Some(artifact))
    }

    /// Record that the caller has handed the artifact to its user.
    /// Only valid once, right after a successful `render`.
    pub fn mark_delivered(&mut self, sink: &mut dyn ProgressSink) -> Result<(), RenderError> {
        self.ensure_downloading()?;
        sink.emit(self.job.advance(JobStatus::Done, 100, None));
        Ok(())
    }

    /// Write the artifact into `dir` and finish the job. Fails with
    /// `NotReady` unless the session is waiting for delivery.
    pub fn deliver(
        &mut self,
        artifact: &Artifact,
        dir: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<PathBuf, RenderError> {
        self.ensure_downloading()?;
        match write_artifact(artifact, dir) {
            Ok(path) => {
                if artifact.kind == ArtifactKind::Archive {
                    debug!(parts = artifact.parts.len(), "archive written");
                }
                self.mark_delivered(sink)?;
                Ok(path)
            }
            Err(err) => {
                let message = format!("{err:#}");
                sink.emit(self.job.fail(None, message.clone()));
                Err(RenderError::Delivery(message))
            }
        }
    }

    fn ensure_downloading(&self) -> Result<(), RenderError> {
        if self.job.status == JobStatus::Downloading {
            Ok(())
        } else {
            Err(RenderError::NotReady(self.job.status))
        }
    }
}
