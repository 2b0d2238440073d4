use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use blob_io::{ByteSource, FileBlob, TokioBlobReader};
use clap::Parser;
use parking_lot::Mutex;
use reader_core::{handler, ReadController};
use shared::{
    domain::ReadResult,
    error::ReadFailure,
    protocol::{EventName, ReaderEvent},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Read a file through the event-driven blob reader")]
struct Args {
    /// File to read.
    path: PathBuf,
    /// text, array-buffer or data-url.
    #[arg(long)]
    mode: Option<String>,
    /// Text encoding label, used in text mode only.
    #[arg(long)]
    encoding: Option<String>,
    /// MIME type for data URLs instead of guessing from the file name.
    #[arg(long)]
    mime_type: Option<String>,
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Print every event as a JSON line instead of the result.
    #[arg(long)]
    json: bool,
    #[arg(long)]
    config: Option<PathBuf>,
}

enum Outcome {
    Completed(ReadResult),
    Failed(ReadFailure),
    Aborted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(mode) = &args.mode {
        settings.mode = mode.parse()?;
    }
    if let Some(encoding) = args.encoding {
        settings.encoding = Some(encoding);
    }
    if let Some(chunk_size) = args.chunk_size {
        settings.chunk_size = config::checked_chunk_size(chunk_size).context("invalid --chunk-size")?;
    }
    settings.json |= args.json;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut source = FileBlob::new(&args.path);
    if let Some(mime_type) = args.mime_type {
        source = source.with_mime_type(mime_type);
    }
    match source.last_modified().await {
        Ok(modified) => info!(
            "reader: file={} mime_type={} modified={modified}",
            args.path.display(),
            source.mime_type()
        ),
        Err(err) => warn!("reader: cannot stat file={} err={err}", args.path.display()),
    }

    let mut controller = ReadController::new_with_reader(Arc::new(TokioBlobReader::new(
        settings.reader_config(),
    )));
    let outcome = Arc::new(Mutex::new(None::<Outcome>));
    install_slots(&mut controller, &outcome, settings.json);
    if settings.json {
        print_events_as_json(&controller);
    }

    controller.set_mode(settings.mode);
    controller.set_encoding(settings.encoding.clone());
    controller.set_source(Some(Arc::new(source)));
    controller.set_auto_read(true);

    let interrupted = tokio::select! {
        _ = controller.settle() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("reader: interrupted, aborting read");
        controller.abort();
    }

    let outcome = outcome.lock().take();
    match outcome {
        Some(Outcome::Completed(result)) => {
            if !settings.json {
                write_result(&result).context("failed to write result")?;
            }
            Ok(())
        }
        Some(Outcome::Failed(failure)) => bail!("read failed: {failure}"),
        Some(Outcome::Aborted) => bail!("read aborted"),
        None => bail!("read ended without an outcome"),
    }
}

fn install_slots(
    controller: &mut ReadController,
    outcome: &Arc<Mutex<Option<Outcome>>>,
    quiet: bool,
) {
    let sink = Arc::clone(outcome);
    controller.set_on_read_completed(Some(handler(move |event| {
        if let ReaderEvent::ReadCompleted { result } = event {
            *sink.lock() = Some(Outcome::Completed(result.clone()));
        }
    })));

    let sink = Arc::clone(outcome);
    controller.set_on_error(Some(handler(move |event| {
        if let ReaderEvent::ReadFailed { error } = event {
            *sink.lock() = Some(Outcome::Failed(error.clone()));
        }
    })));

    let sink = Arc::clone(outcome);
    controller.set_on_abort(Some(handler(move |_| {
        *sink.lock() = Some(Outcome::Aborted);
    })));

    if !quiet {
        controller.set_on_progress(Some(handler(|event| {
            if let ReaderEvent::Progress { progress } = event {
                info!("reader: progress={:.0}%", progress * 100.0);
            }
        })));
    }
}

fn print_events_as_json(controller: &ReadController) {
    for name in EventName::ALL {
        controller.subscribe(
            name,
            handler(|event| match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("reader: failed to encode event err={err}"),
            }),
        );
    }
}

fn write_result(result: &ReadResult) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match result {
        ReadResult::Text(text) => stdout.write_all(text.as_bytes())?,
        ReadResult::ArrayBuffer(bytes) => stdout.write_all(bytes)?,
        ReadResult::DataUrl(url) => writeln!(stdout, "{url}")?,
    }
    stdout.flush()
}
