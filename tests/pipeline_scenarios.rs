use anyhow::{Result, anyhow};
use certgrid::{
    assets::NoAssets,
    geometry::compute_geometry,
    package::ArtifactKind,
    pipeline::{Pipeline, PipelineOptions, RenderError},
    progress::{JobStatus, RenderEvent},
    qr::{QrCodeEncoder, QrEncoder, QrRaster},
    record::ReportRecord,
    render::{PageInput, PageRenderer, PdfPageRenderer},
};
use std::io::Cursor;
use zip::ZipArchive;

const ROOT: &str = "05-03-2024-01-07-09-pm";

/// Stand-in renderer: remembers what each page saw and can fail on a chosen page.
#[derive(Default)]
struct RecordingRenderer {
    fail_on: Option<usize>,
    seen: Vec<(usize, usize, usize)>, // (page, qr codes, empty cells)
}

impl PageRenderer for RecordingRenderer {
    fn render(&mut self, input: &PageInput<'_>) -> Result<Vec<u8>> {
        if self.fail_on == Some(input.page) {
            return Err(anyhow!("renderer exploded"));
        }
        self.seen
            .push((input.page, input.qr.len(), input.layout.empty_cells()));
        Ok(format!("%PDF-fake-page-{}", input.page).into_bytes())
    }
}

struct TinyEncoder;

impl QrEncoder for TinyEncoder {
    fn encode(&self, _text: &str) -> Result<QrRaster> {
        Ok(QrRaster {
            width: 1,
            height: 1,
            pixels: vec![0],
        })
    }
}

fn records(n: usize) -> Vec<ReportRecord> {
    (0..n)
        .map(|i| ReportRecord {
            report_no: format!("LG{:06}", 600_000 + i),
            description: "One ring".into(),
            shape_and_cut: "Round Brilliant".into(),
            tot_est_weight: "1.02".into(),
            color: "E".into(),
            clarity: "VS1".into(),
            ..Default::default()
        })
        .collect()
}

fn grid_options() -> PipelineOptions {
    PipelineOptions {
        geometry: compute_geometry(2484, 3512, 300, 3, 3, 0.3),
        overprint_header: true,
        qr_base_url: "http://localhost:3000".into(),
    }
}

fn statuses(events: &[RenderEvent]) -> Vec<JobStatus> {
    let mut out: Vec<JobStatus> = Vec::new();
    for e in events {
        if out.last() != Some(&e.status) {
            out.push(e.status);
        }
    }
    out
}

#[test]
fn nine_records_make_one_pdf() {
    let mut pipeline = Pipeline::new(
        grid_options(),
        PdfPageRenderer::new(Box::new(NoAssets)),
        QrCodeEncoder::default(),
    );
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    let artifact = session
        .render(&records(9), ROOT, &mut events)
        .unwrap()
        .expect("artifact");

    assert_eq!(artifact.kind, ArtifactKind::Single);
    assert_eq!(artifact.file_name, format!("{ROOT}.pdf"));
    assert!(artifact.bytes.starts_with(b"%PDF"));
    let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);

    assert_eq!(session.qr_cache().len(), 9);
    assert_eq!(
        statuses(&events),
        vec![JobStatus::Generating, JobStatus::Downloading]
    );
    assert_eq!(events.last().unwrap().progress, 100);
    assert_eq!(session.job().status, JobStatus::Downloading);
}

#[test]
fn ten_records_make_a_two_part_zip() {
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let artifact = pipeline
        .run(&records(10), ROOT, &mut events)
        .unwrap()
        .expect("artifact");

    assert_eq!(artifact.kind, ArtifactKind::Archive);
    assert_eq!(artifact.file_name, format!("{ROOT}.zip"));
    let mut archive = ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![format!("1-part-{ROOT}.pdf"), format!("2-part-{ROOT}.pdf")]
    );

    assert_eq!(
        statuses(&events),
        vec![JobStatus::Generating, JobStatus::Zipping, JobStatus::Downloading]
    );
    let generating: Vec<u8> = events
        .iter()
        .filter(|e| e.status == JobStatus::Generating)
        .map(|e| e.progress)
        .collect();
    assert_eq!(generating, vec![0, 50, 100]);
    assert!(events.iter().all(|e| e.total_pages == 2));
}

#[test]
fn second_page_is_padded() {
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    pipeline.run(&records(10), ROOT, &mut Vec::<RenderEvent>::new()).unwrap();
    assert_eq!(pipeline.renderer().seen, vec![(1, 9, 0), (2, 1, 8)]);

    // every run gets its own cache
    assert!(pipeline.session().qr_cache().is_empty());
}

#[test]
fn missing_report_number_renders_without_qr() {
    let mut recs = records(3);
    recs[1].report_no = String::new();
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let artifact = pipeline.run(&recs, ROOT, &mut events).unwrap().expect("artifact");
    assert_eq!(artifact.kind, ArtifactKind::Single);
    assert_eq!(pipeline.renderer().seen, vec![(1, 2, 6)]);

    // the real renderer copes with the blank record too
    let mut real = Pipeline::new(
        grid_options(),
        PdfPageRenderer::new(Box::new(NoAssets)),
        QrCodeEncoder::default(),
    );
    let artifact = real.run(&recs, ROOT, &mut Vec::<RenderEvent>::new()).unwrap().expect("artifact");
    assert!(artifact.bytes.starts_with(b"%PDF"));
}

#[test]
fn failing_page_aborts_the_batch() {
    let renderer = RecordingRenderer {
        fail_on: Some(2),
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(grid_options(), renderer, TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    let err = session.render(&records(27), ROOT, &mut events).unwrap_err();

    match &err {
        RenderError::Page {
            page, total_pages, ..
        } => {
            assert_eq!(*page, 2);
            assert_eq!(*total_pages, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.job().status, JobStatus::Error);
    assert_eq!(session.job().error.as_ref().unwrap().page, Some(2));

    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Error);
    assert_eq!(last.page, Some(2));
    assert!(last.message.as_deref().unwrap().contains("renderer exploded"));
    assert!(!events.iter().any(|e| e.status == JobStatus::Zipping));

    // a retry starts from a clean slate
    session.reset();
    assert_eq!(session.job().status, JobStatus::Idle);
    assert!(session.qr_cache().is_empty());
}

#[test]
fn empty_batch_stays_idle() {
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    assert!(session.render(&[], ROOT, &mut events).unwrap().is_none());
    assert!(events.is_empty());
    assert_eq!(session.job().status, JobStatus::Idle);
}

#[test]
fn single_layout_puts_one_card_per_page() {
    let opts = PipelineOptions {
        geometry: compute_geometry(1004, 591, 300, 1, 1, 0.0),
        overprint_header: false,
        qr_base_url: "http://localhost:3000".into(),
    };
    let mut pipeline = Pipeline::new(opts, PdfPageRenderer::new(Box::new(NoAssets)), TinyEncoder);
    let artifact = pipeline
        .run(&records(2), ROOT, &mut Vec::<RenderEvent>::new())
        .unwrap()
        .expect("artifact");
    assert_eq!(artifact.kind, ArtifactKind::Archive);
    assert_eq!(artifact.parts.len(), 2);
}

#[test]
fn delivery_writes_file_and_finishes_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    let artifact = session
        .render(&records(4), ROOT, &mut events)
        .unwrap()
        .expect("artifact");
    let path = session.deliver(&artifact, dir.path(), &mut events).unwrap();

    assert_eq!(path, dir.path().join(format!("{ROOT}.pdf")));
    assert_eq!(std::fs::read(&path).unwrap(), artifact.bytes);
    assert_eq!(session.job().status, JobStatus::Done);
    assert!(session.job().is_terminal());
    assert_eq!(events.last().unwrap().status, JobStatus::Done);
}

#[test]
fn failed_delivery_ends_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    let artifact = session
        .render(&records(2), ROOT, &mut events)
        .unwrap()
        .expect("artifact");
    let err = session.deliver(&artifact, &blocker, &mut events).unwrap_err();

    assert!(matches!(err, RenderError::Delivery(_)), "{err}");
    assert_eq!(session.job().status, JobStatus::Error);
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Error);
    assert_eq!(last.page, None);
    assert!(last.message.is_some());
}

#[test]
fn delivering_twice_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut events: Vec<RenderEvent> = Vec::new();
    let mut session = pipeline.session();
    let artifact = session
        .render(&records(1), ROOT, &mut events)
        .unwrap()
        .expect("artifact");
    session.deliver(&artifact, dir.path(), &mut events).unwrap();
    let seen = events.len();

    let err = session.deliver(&artifact, dir.path(), &mut events).unwrap_err();
    assert!(matches!(err, RenderError::NotReady(JobStatus::Done)), "{err}");
    assert!(session.mark_delivered(&mut events).is_err());
    assert_eq!(events.len(), seen);
    assert_eq!(session.job().status, JobStatus::Done);
}

#[test]
fn delivery_before_render_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = certgrid::package::package(vec![b"%PDF".to_vec()], ROOT).unwrap();
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let mut session = pipeline.session();
    let err = session
        .deliver(&artifact, dir.path(), &mut Vec::<RenderEvent>::new())
        .unwrap_err();
    assert!(matches!(err, RenderError::NotReady(JobStatus::Idle)));
    assert!(!dir.path().join(&artifact.file_name).exists());
}

#[test]
fn channel_observer_sees_every_transition() {
    let (mut tx, rx) = std::sync::mpsc::channel::<RenderEvent>();
    let mut pipeline = Pipeline::new(grid_options(), RecordingRenderer::default(), TinyEncoder);
    let artifact = pipeline.run(&records(10), ROOT, &mut tx).unwrap().expect("artifact");
    drop(tx);
    assert_eq!(artifact.kind, ArtifactKind::Archive);

    let received: Vec<(JobStatus, u8, Option<usize>)> =
        rx.iter().map(|e| (e.status, e.progress, e.page)).collect();
    assert_eq!(
        received,
        vec![
            (JobStatus::Generating, 0, Some(1)),
            (JobStatus::Generating, 50, Some(1)),
            (JobStatus::Generating, 100, Some(2)),
            (JobStatus::Zipping, 0, Some(2)),
            (JobStatus::Zipping, 50, Some(2)),
            (JobStatus::Zipping, 100, Some(2)),
            (JobStatus::Downloading, 100, Some(2)),
        ]
    );
}
