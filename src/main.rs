use anyhow::{Context, Result};
use clap::Parser;
use emergency_watch::analysis;
use emergency_watch::capture::DefaultSources;
use emergency_watch::detection::{Detector, DetectorFactory};
use emergency_watch::pipeline::{Collaborators, Monitor};
use emergency_watch::publish::{JsonLinesPublisher, Publisher};
use emergency_watch::storage::DirectoryStore;
use emergency_watch::PipelineConfig;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video source: `camera:<index>` or a directory of frames
    source: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to the YOLO detector (ONNX file)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Class labels by model index, comma separated
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,

    /// Per-class threshold override, e.g. `--threshold fall=0.76`
    #[arg(long = "threshold", value_parser = parse_threshold)]
    thresholds: Vec<(String, f32)>,

    /// Analyze every Nth frame
    #[arg(long)]
    frame_skip: Option<u64>,

    /// Seconds between two alerts of the same class
    #[arg(long)]
    cooldown: Option<f64>,

    /// TrueType font for overlay text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Directory for evidence images and reports
    #[arg(long)]
    alerts_dir: Option<PathBuf>,

    /// Model id for AI analysis; the key is read from the configured env var
    #[arg(long)]
    analyzer_model: Option<String>,

    /// Where to write events as JSON lines, `-` for stdout
    #[arg(long, default_value = "-")]
    events: String,

    /// Keep base64 images in the event output
    #[arg(long)]
    include_images: bool,
}

fn parse_threshold(s: &str) -> Result<(String, f32), String> {
    let (class, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS=VALUE, got {s}"))?;
    let value: f32 = value
        .parse()
        .map_err(|_| format!("invalid threshold {value}"))?;
    Ok((class.trim().to_lowercase(), value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::info!("Emergency watch starting");

    let config = load_config(&args)?;
    tracing::info!(
        "Frame skip: {}, cooldown: {:.1}s, buffer: {}",
        config.frame_skip,
        config.cooldown_secs,
        config.frame_buffer_capacity
    );

    let publisher: Arc<dyn Publisher> = if args.events == "-" {
        Arc::new(JsonLinesPublisher::new(io::stdout(), args.include_images))
    } else {
        let file = File::create(&args.events)
            .with_context(|| format!("Failed to create event log {}", args.events))?;
        Arc::new(JsonLinesPublisher::new(BufWriter::new(file), args.include_images))
    };

    let store = DirectoryStore::new(&config.alerts_dir)
        .context("Failed to initialize evidence directory")?;

    let parts = Collaborators {
        sources: Arc::new(DefaultSources),
        detectors: detector_factory(&config)?,
        analyzer: analysis::from_config(&config),
        store: Arc::new(store),
        publisher,
    };
    let monitor = Monitor::new(config, parts);

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    monitor
        .start(&args.source)
        .with_context(|| format!("Failed to start monitoring {}", args.source))?;
    tracing::info!("Press Ctrl+C to stop");

    loop {
        if stop_rx.try_recv().is_ok() {
            tracing::info!("Interrupted");
            monitor.stop();
            break;
        }
        if monitor.wait_idle(Duration::from_millis(200)) {
            break;
        }
    }

    tracing::info!("{} alerts issued", monitor.alerts_issued());
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    for (class, value) in &args.thresholds {
        config.thresholds.insert(class.clone(), *value);
    }
    if let Some(skip) = args.frame_skip {
        config.frame_skip = skip;
    }
    if let Some(cooldown) = args.cooldown {
        config.cooldown_secs = cooldown;
    }
    if let Some(font) = &args.font {
        config.font_path = Some(font.clone());
    }
    if let Some(dir) = &args.alerts_dir {
        config.alerts_dir = dir.clone();
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
    if !args.classes.is_empty() {
        config.detector.classes = args.classes.clone();
    }
    if let Some(model) = &args.analyzer_model {
        config.analyzer.model = Some(model.clone());
    }

    config.normalize();
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "onnx")]
fn detector_factory(config: &PipelineConfig) -> Result<Arc<dyn DetectorFactory>> {
    use emergency_watch::detection::YoloDetector;

    let path = config
        .detector
        .model_path
        .clone()
        .context("No detector model given, use --model or detector.model_path")?;
    let input = config.detector_input;
    let labels = config.detector.classes.clone();

    let factory = move || -> Result<Box<dyn Detector>> {
        let detector = YoloDetector::new(&path, (input.width, input.height), labels.clone())?;
        Ok(Box::new(detector))
    };
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "onnx"))]
fn detector_factory(_config: &PipelineConfig) -> Result<Arc<dyn DetectorFactory>> {
    let factory = || -> Result<Box<dyn Detector>> {
        anyhow::bail!("built without the `onnx` feature, no detector available")
    };
    Ok(Arc::new(factory))
}
