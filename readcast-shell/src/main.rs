//! readcast - queue articles, text and podcasts and read them aloud

mod app;
mod config;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use readcast_queue::task::is_http_url;
use readcast_queue::{FeedSchedulerHandle, InputType, ProcessorHandle, SweepReport, TaskMode, TaskRecord};

use crate::app::App;
use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "readcast", version, about = "Turn articles and text into audio", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "READCAST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the task processor and the feed scheduler until Ctrl-C
    Serve {
        /// Do not fetch feeds
        #[arg(long)]
        no_feeds: bool,
    },
    /// Add a task to the queue
    Enqueue {
        #[arg(value_enum)]
        kind: Kind,
        /// URL, text, or podcast source (URL or text)
        content: String,
        /// TTS engine name
        #[arg(long)]
        engine: Option<String>,
        /// Read a summary instead of the full text
        #[arg(long)]
        tldr: bool,
    },
    /// Process everything queued now, in the foreground
    Sweep,
    /// Show pending tasks
    Queue {
        /// Remove all pending tasks
        #[arg(long)]
        clear: bool,
    },
    /// List the voices of an engine
    Voices {
        #[arg(long)]
        engine: Option<String>,
    },
    /// Fetch configured feeds once
    FetchFeeds,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Url,
    Text,
    Podcast,
}

impl From<Kind> for InputType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Url => InputType::Url,
            Kind::Text => InputType::Text,
            Kind::Podcast => InputType::Podcast,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let app = App::new(settings);

    match cli.command {
        Command::Serve { no_feeds } => serve(&app, no_feeds),
        Command::Enqueue {
            kind,
            content,
            engine,
            tldr,
        } => enqueue(&app, kind, content, engine, tldr),
        Command::Sweep => {
            let processor = app.processor();
            let report = runtime()?.block_on(processor.sweep());
            print_report(&report);
            Ok(())
        }
        Command::Queue { clear } => {
            if clear {
                app.store.clear().context("clearing queue")?;
                println!("Queue cleared");
                return Ok(());
            }
            let records = app.store.drain_all();
            if records.is_empty() {
                println!("Queue is empty");
            }
            for (index, record) in records.iter().enumerate() {
                println!(
                    "{:>3}. {} [{}]",
                    index + 1,
                    record.label(),
                    record.tts_engine.as_deref().unwrap_or("?")
                );
            }
            Ok(())
        }
        Command::Voices { engine } => {
            let name = engine.unwrap_or_else(|| app.engines.default_engine().to_string());
            let engine = app
                .engines
                .get(&name)
                .with_context(|| format!("unknown engine '{}' (have: {})", name, app.engines.names().join(", ")))?;
            let voices = runtime()?
                .block_on(engine.list_available_voices())
                .with_context(|| format!("listing voices of {}", name))?;
            for voice in voices {
                println!("{}", voice);
            }
            Ok(())
        }
        Command::FetchFeeds => {
            let added = app.feed_scheduler().run_once();
            println!("{} new tasks queued", added);
            Ok(())
        }
    }
}

fn serve(app: &App, no_feeds: bool) -> Result<()> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let processor = ProcessorHandle::spawn(app.processor()).context("starting task processor")?;
    let feeds = if no_feeds || !app.settings.feeds.enabled {
        None
    } else {
        let handle = FeedSchedulerHandle::spawn(app.feed_scheduler(), app.settings.feed_schedule())
            .context("starting feed scheduler")?;
        Some(handle)
    };

    ::log::info!("readcast running, press Ctrl-C to stop");
    let _ = stop_rx.recv();
    ::log::info!("Shutting down, waiting for the current task to finish");

    if let Some(feeds) = feeds {
        feeds.stop();
    }
    processor.stop();
    Ok(())
}

fn enqueue(app: &App, kind: Kind, content: String, engine: Option<String>, tldr: bool) -> Result<()> {
    let input_type = InputType::from(kind);
    if input_type == InputType::Url && !is_http_url(&content) {
        bail!("'{}' is not an http(s) URL", content);
    }
    if tldr && input_type == InputType::Podcast {
        bail!("--tldr applies to url and text tasks only");
    }

    let engine = engine.unwrap_or_else(|| app.settings.default_engine.clone());
    let mode = if tldr { TaskMode::Tldr } else { TaskMode::Full };
    let record = TaskRecord::new(input_type, content.trim(), engine).with_mode(mode);

    app.store.append(record).context("writing task queue")?;
    println!("Queued ({} pending)", app.store.len());
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

fn print_report(report: &SweepReport) {
    if report.is_empty() {
        println!("Nothing queued");
        return;
    }
    for task in &report.tasks {
        match &task.outcome {
            Ok(done) => println!("done     {} -> {}", task.label, done.audio_file.display()),
            Err(reason) => println!("skipped  {}: {}", task.label, reason),
        }
    }
    println!(
        "{} completed, {} skipped, {} failed",
        report.completed(),
        report.skipped(),
        report.failed()
    );
}
