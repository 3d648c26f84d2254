use crate::{
    assets::{AssetStore, LocalAssetStore, NoAssets},
    chunk_plan::PagePlan,
    config::Config,
    filename::{build_file_name_root, parse_utc_offset},
    pipeline::{Pipeline, PipelineOptions},
    progress::TracingSink,
    qr::{QrCodeEncoder, QrEncoder, verify_url},
    record::load_records,
    render::PdfPageRenderer,
    report::BatchReport,
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "certgrid")]
#[command(about = "Render gemological report certificates onto printable page grids")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./certgrid.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the page geometry for the configured grid.
    Geometry {
        #[arg(long)]
        single: bool,
    },
    /// Show how records split into pages.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        single: bool,
    },
    /// Write the verification QR code for one report as PNG.
    Qr {
        #[arg(long)]
        report_no: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Render a batch and deliver a single PDF or a ZIP of per-page PDFs.
    Render {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        cols: Option<u32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        rows: Option<u32>,
        /// One full-page certificate per record instead of the grid.
        #[arg(long)]
        single: bool,
        #[arg(long)]
        base_url: Option<String>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Geometry { single } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            validate_layout(&cfg)?;
            println!("{}", serde_json::to_string_pretty(&cfg.geometry(*single))?);
            Ok(())
        }
        Command::Plan { input, single } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            plan(&cfg, input, *single)
        }
        Command::Qr {
            report_no,
            out,
            base_url,
        } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            if let Some(url) = base_url {
                cfg.qr.base_url = url.clone();
            }
            qr(&cfg, report_no, out)
        }
        Command::Render {
            input,
            out_dir,
            cols,
            rows,
            single,
            base_url,
        } => {
            if let Some(c) = cols {
                cfg.layout.cols = *c;
            }
            if let Some(r) = rows {
                cfg.layout.rows = *r;
            }
            if let Some(url) = base_url {
                cfg.qr.base_url = url.clone();
            }
            render(&args, &cfg, input, out_dir.as_deref(), *single)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("certgrid.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("certgrid.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn validate_layout(cfg: &Config) -> Result<()> {
    if cfg.layout.cols == 0 || cfg.layout.rows == 0 {
        return Err(anyhow!(
            "layout needs at least one column and one row (got {}x{})",
            cfg.layout.cols,
            cfg.layout.rows
        ));
    }
    if cfg.layout.dpi == 0 || cfg.single.dpi == 0 {
        return Err(anyhow!("dpi must be positive"));
    }
    if cfg.layout.border_width_pt < 0.0 {
        return Err(anyhow!("border_width_pt must not be negative"));
    }
    Ok(())
}

fn encoder(cfg: &Config) -> QrCodeEncoder {
    QrCodeEncoder {
        margin_modules: cfg.qr.margin_modules,
        scale: cfg.qr.scale,
        target_width_px: cfg.qr.target_width_px,
    }
}

fn plan(cfg: &Config, input: &Path, single: bool) -> Result<()> {
    validate_layout(cfg)?;
    let records = load_records(input)?;
    let plan = PagePlan::from_records(&records, &cfg.geometry(single));
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn qr(cfg: &Config, report_no: &str, out: &Path) -> Result<()> {
    if report_no.trim().is_empty() {
        return Err(anyhow!("report number is empty"));
    }
    let url = verify_url(&cfg.qr.base_url, report_no);
    let raster = encoder(cfg).encode(&url)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    std::fs::write(out, raster.to_png()?)
        .with_context(|| format!("writing QR: {}", out.display()))?;
    info!("qr {} -> {} ({}px)", url, out.display(), raster.width);
    Ok(())
}

fn render(
    args: &Args,
    cfg: &Config,
    input: &Path,
    out_override: Option<&Path>,
    single: bool,
) -> Result<()> {
    validate_layout(cfg)?;

    let out_dir = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.output.out_dir));
    ensure_dir(&out_dir)?;

    let log_path = resolve_log_path(cfg, Some(&out_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(out_dir.join("effective-config.toml"), raw)?;
    }

    let records = load_records(input)?;
    let geometry = cfg.geometry(single);
    let offset = parse_utc_offset(&cfg.output.utc_offset)?;
    let root = build_file_name_root(offset)?;
    info!("batch root={root} records={} out={}", records.len(), out_dir.display());

    let missing = records.iter().filter(|r| !r.has_report_no()).count();
    if missing > 0 {
        warn!("{missing} record(s) have no report_no and will render without a QR code");
    }

    let assets: Box<dyn AssetStore> = if cfg.assets.local_dir.is_empty() {
        Box::new(NoAssets)
    } else {
        Box::new(
            LocalAssetStore::new(&cfg.assets.local_dir).with_base_url(&cfg.assets.base_url),
        )
    };

    let opts = PipelineOptions {
        geometry: geometry.clone(),
        overprint_header: cfg.overprint_header(single),
        qr_base_url: cfg.qr.base_url.clone(),
    };
    let mut pipeline = Pipeline::new(opts, PdfPageRenderer::new(assets), encoder(cfg));
    let mut sink = TracingSink;

    let started = now_rfc3339();
    let mut session = pipeline.session();
    let Some(artifact) = session.render(&records, &root, &mut sink)? else {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "status": "idle", "pages": 0 }))?
        );
        return Ok(());
    };
    let path = session.deliver(&artifact, &out_dir, &mut sink)?;
    let pages = session.job().total_pages;

    if cfg.output.write_manifest {
        let report = BatchReport::new(
            &artifact,
            PagePlan::from_records(&records, &geometry),
            geometry,
            started,
            now_rfc3339(),
        );
        std::fs::write(
            out_dir.join(format!("{root}.json")),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "artifact": path,
            "kind": artifact.kind,
            "pages": pages,
            "parts": artifact.parts,
            "status": session.job().status,
        }))?
    );
    Ok(())
}

fn resolve_log_path(cfg: &Config, out_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(out_dir) = out_dir {
        return Some(out_dir.join("logs").join("certgrid.log"));
    }

    Some(PathBuf::from(&cfg.output.out_dir).join("certgrid.log"))
}
