//! Command-line boundary for the stembox library.
//!
//! Constructs the service objects once and wires subcommands to them; no
//! globals, so the same wiring works for any host (IPC, HTTP, tests).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stembox::{
    JobStatus, LyricsStore, NewSong, SeparationManager, SeparationQuality, SeparationWorker,
    Settings, SongKind, SongLibrary, WorkerRuntime,
};

#[derive(Parser)]
#[command(name = "stembox", version, about = "Song library and stem-separation queue")]
struct Cli {
    /// Data directory override (defaults to the platform data directory).
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a local audio file into the library
    Import {
        audio: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: Option<String>,
        /// Song kind: 'source' or 'accompaniment'
        #[arg(long, default_value = "source")]
        kind: String,
        /// Optional raw lyrics file to attach
        #[arg(long, value_name = "FILE")]
        lyrics: Option<PathBuf>,
    },
    /// List all songs, newest first
    List,
    /// Print one song record as JSON
    Show { id: String },
    /// Delete a song and its directory
    Delete { id: String },
    /// Queue a separation job and exit
    Queue {
        id: String,
        /// Quality tier: 'fast', 'normal' or 'high'
        #[arg(long)]
        quality: Option<String>,
    },
    /// Print the current job list as JSON
    Jobs,
    /// Queue a separation job and stream snapshots until it finishes
    Watch {
        id: String,
        #[arg(long)]
        quality: Option<String>,
    },
    /// Read or write lyrics files
    Lyrics {
        #[command(subcommand)]
        command: LyricsCommand,
    },
}

#[derive(Subcommand)]
enum LyricsCommand {
    /// Print the raw lyrics text
    Get { id: String },
    /// Replace the raw lyrics from a file
    Set { id: String, file: PathBuf },
    /// Print the time-synced (LRC) lyrics
    GetSynced { id: String },
    /// Replace the synced lyrics from a file
    SetSynced { id: String, file: PathBuf },
}

struct App {
    library: Arc<SongLibrary>,
    lyrics: LyricsStore,
    manager: Arc<SeparationManager>,
}

impl App {
    fn new(data_dir: PathBuf) -> Self {
        let library = Arc::new(SongLibrary::new(&data_dir));
        let settings = Arc::new(Settings::new());
        let runtime = WorkerRuntime::resolve(&data_dir);
        let separator = Arc::new(SeparationWorker::new(runtime));
        let manager = SeparationManager::new(Arc::clone(&library), settings, separator);

        Self {
            lyrics: LyricsStore::new(Arc::clone(&library)),
            library,
            manager,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(stembox::data_dir);
    log::debug!("Using data directory '{}'", data_dir.display());

    match run(App::new(data_dir), cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(app: App, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Import {
            audio,
            title,
            artist,
            kind,
            lyrics,
        } => {
            let kind: SongKind = kind.parse()?;
            let lyrics_text = match lyrics {
                Some(path) => Some(tokio::fs::read_to_string(path).await?),
                None => None,
            };
            let record = app
                .library
                .import(NewSong {
                    source_path: audio,
                    title,
                    artist,
                    kind,
                    lyrics_text,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::List => {
            for record in app.library.load_all().await {
                println!(
                    "{}  {:<20} {:<16} {}",
                    record.id,
                    record.audio_status,
                    record.kind,
                    record.title
                );
            }
        }
        Command::Show { id } => {
            let record = app
                .library
                .get(&id)
                .await
                .ok_or_else(|| stembox::LibraryError::SongNotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Delete { id } => {
            app.library.delete(&id).await?;
            println!("deleted {}", id);
        }
        Command::Queue { id, quality } => {
            let quality = parse_quality(quality)?;
            let job = app.manager.queue_with_quality(&id, quality).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Jobs => {
            println!("{}", serde_json::to_string_pretty(&app.manager.jobs())?);
        }
        Command::Watch { id, quality } => {
            let quality = parse_quality(quality)?;
            let subscription = app.manager.subscribe(Box::new(|jobs| {
                if let Ok(json) = serde_json::to_string(jobs) {
                    println!("{}", json);
                }
            }));

            let job = app.manager.queue_with_quality(&id, quality).await?;
            let finished = loop {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let current = app.manager.jobs().into_iter().find(|j| j.id == job.id);
                match current {
                    Some(j) if j.is_finished() => break j,
                    Some(_) => {}
                    None => break job.clone(),
                }
            };
            app.manager.unsubscribe(subscription);

            if finished.status == JobStatus::Failed {
                return Err(stembox::SeparationError::Worker(
                    finished
                        .error_message
                        .unwrap_or_else(|| "separation failed".to_string()),
                )
                .into());
            }
        }
        Command::Lyrics { command } => match command {
            LyricsCommand::Get { id } => match app.lyrics.read_raw(&id).await? {
                Some(file) => println!("{}", file.content),
                None => eprintln!("no raw lyrics for {}", id),
            },
            LyricsCommand::Set { id, file } => {
                let text = tokio::fs::read_to_string(file).await?;
                let (path, record) = app.lyrics.write_raw(&id, &text).await?;
                println!("wrote {} (status: {})", path.display(), record.lyrics_status);
            }
            LyricsCommand::GetSynced { id } => match app.lyrics.read_synced(&id).await? {
                Some(file) => println!("{}", file.content),
                None => eprintln!("no synced lyrics for {}", id),
            },
            LyricsCommand::SetSynced { id, file } => {
                let text = tokio::fs::read_to_string(file).await?;
                let (path, record) = app.lyrics.write_synced(&id, &text).await?;
                println!("wrote {} (status: {})", path.display(), record.lyrics_status);
            }
        },
    }
    Ok(())
}

fn parse_quality(value: Option<String>) -> Result<Option<SeparationQuality>, String> {
    value.map(|v| v.parse()).transpose()
}
