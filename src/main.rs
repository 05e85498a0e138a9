//! accessible-reader: read a content file aloud with chunk highlighting.

use std::path::PathBuf;
use std::sync::Arc;

use accessible_reader::api::{self, ApiState};
use accessible_reader::config::Config;
use accessible_reader::controls::Control;
use accessible_reader::document::Document;
use accessible_reader::playback::PlaybackState;
use accessible_reader::presenter::ConsolePresenter;
use accessible_reader::reader::{AccessibleReader, ReaderHandle};
use accessible_reader::segmenter::{segment, SegmentRules};
use accessible_reader::settings::{JsonFileStore, SettingsStore};
use accessible_reader::speech::selector::BackendSelector;
use accessible_reader::speech::LanguageHint;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "accessible-reader", about = "Read scripture, hymns and catechisms aloud")]
struct Args {
    /// Content file (.html/.xhtml markup, or .txt for plain text)
    file: PathBuf,

    /// Id of the element holding the readable content
    #[arg(long, default_value = "content")]
    container: String,

    /// Content language (en, hi, hi-IN, ...)
    #[arg(short, long)]
    language: Option<String>,

    /// Never use the remote synthesis service
    #[arg(long)]
    native: bool,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start reading immediately
    #[arg(long)]
    autoplay: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,reqwest=info,hyper=info")
    } else {
        EnvFilter::new("info,reqwest=warn,hyper=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("accessible-reader starting");

    let mut config = Config::load(args.config.as_deref());
    if args.native {
        config.remote.enabled = false;
    }
    let language = LanguageHint::new(args.language.as_deref().unwrap_or(&config.language));

    // Content
    let mut document = Document::load(&args.file, &args.container)?;
    let chunks = match document.find_by_id(&args.container) {
        Some(container) => {
            let rules = SegmentRules::from(&config.segmenter);
            let segmentation = segment(&document, container, &rules);
            if segmentation.is_fallback() {
                info!("No structural chunks in #{}, reading sentence by sentence", args.container);
            }
            segmentation.materialize(&mut document)
        }
        None => {
            warn!("Container #{} not found in {}", args.container, args.file.display());
            Vec::new()
        }
    };

    // Settings
    let store_path = config.storage.resolved_path();
    info!("Reader settings stored in {}", store_path.display());
    let settings = SettingsStore::load(
        Box::new(JsonFileStore::new(store_path)),
        &config.storage.settings_key,
    );

    // Reader
    let selector = Arc::new(BackendSelector::from_config(&config));
    let reader = AccessibleReader::new(selector, settings, Box::new(ConsolePresenter::new()), language)
        .init()
        .await;
    reader.load(chunks);

    if config.api.enabled {
        api::start_control_api(ApiState { reader: reader.clone() }, config.api.port).await;
    }

    if args.autoplay {
        reader.play();
    }

    println!("Controls: <space>/toggle, play, pause, stop, n/next, p/prev, rate <x>, set <setting> <value>, lang <tag>, status, q");
    run_controls(&reader).await;

    reader.dispose().await;
    info!("accessible-reader stopped");
    Ok(())
}

/// Read controls from stdin until quit, Ctrl+C, or stdin closes and reading
/// has finished.
async fn run_controls(reader: &ReaderHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match Control::parse(&line) {
                    Ok(Some(Control::Quit)) => break,
                    Ok(Some(Control::Status)) => print_status(reader),
                    Ok(Some(control)) => control.dispatch(reader),
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                },
                Ok(None) => {
                    wait_until_idle(reader).await;
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    wait_until_idle(reader).await;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
}

async fn wait_until_idle(reader: &ReaderHandle) {
    reader.sync().await;
    let mut state = reader.watch();
    tokio::select! {
        _ = state.wait_for(|s| s.state != PlaybackState::Playing) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
}

fn print_status(reader: &ReaderHandle) {
    let snapshot = reader.snapshot();
    println!(
        "{} | {} | chunk {}/{} | backend {} | remote {} | {} | rate {}x | mode {}",
        snapshot.state,
        snapshot.status,
        snapshot.cursor.current_index + 1,
        snapshot.chunk_count,
        snapshot.cursor.active_backend,
        if snapshot.remote_available { "up" } else { "down" },
        snapshot.language,
        snapshot.settings.rate,
        snapshot.settings.mode,
    );
}
