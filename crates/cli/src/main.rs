#![deny(warnings)]

mod render;
mod shell;

use anyhow::Context;
use clap::{Parser, Subcommand};
use emotion_client_core::api::{HttpEmotionApi, UserProfile};
use emotion_client_core::capture::{load_from_file, AudioArtifact};
use emotion_client_core::config::{
    resolve_api_url, resolve_optional_string, resolve_page_size, AppConfig, Env, InsightsWindow,
    PageSize, StdEnv, DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_MEMORY_PAGE_SIZE, ENV_API_URL,
    ENV_PAGE_SIZE, ENV_USER_ID,
};
use emotion_client_core::console::{
    Connectivity, ConsoleConfig, EmotionConsole, NoticeLevel, PageMove, RenderSink,
};
use emotion_client_core::memory::Importance;
use emotion_client_core::playback::ArtifactPlayer;
use emotion_client_core::session::SessionIdentity;
use emotion_client_core::verify::SymphoniaVerifier;
use render::TerminalSink;
use shell::{parse_shell_line, ShellCommand, HELP};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type Console = EmotionConsole<HttpEmotionApi, SymphoniaVerifier, TerminalSink>;
type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

#[derive(Parser, Debug)]
#[command(name = "emotion-client")]
#[command(about = "Terminal client for the emotion classification service")]
struct Args {
    /// Base URL of the service (env: EMOTION_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// User to act as (env: EMOTION_USER_ID)
    #[arg(long = "user", global = true)]
    user_id: Option<String>,

    /// History rows per page (env: EMOTION_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[arg(long, global = true)]
    memory_page_size: Option<usize>,

    /// Play audio back after it was classified
    #[arg(long, global = true)]
    play: bool,

    #[arg(long, global = true)]
    input_device: Option<String>,

    #[arg(long, global = true)]
    output_device: Option<String>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the service is reachable
    Health,
    /// Classify a piece of text
    Text {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Classify an audio file
    File {
        path: PathBuf,
        /// Overrides the type guessed from the file extension
        #[arg(long)]
        mime: Option<String>,
    },
    /// Record from the microphone; press Enter to stop
    Record,
    /// Show classification history
    History {
        /// Only the last N days (0 = all)
        #[arg(long)]
        since_days: Option<u32>,
        #[arg(long)]
        page: Option<usize>,
        /// Write the filtered history to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        timeline: bool,
    },
    /// List or save memories
    Memory {
        #[command(subcommand)]
        action: Option<MemoryAction>,
    },
    /// Emotion summary over a window of days
    Insights {
        #[arg(long)]
        window_days: Option<u32>,
    },
    /// Show or replace the user profile
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
    /// Ask for a reply adapted to the user's recent history
    Respond,
    /// Interactive session
    Shell,
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    List,
    Save {
        memory_type: String,
        #[arg(required = true)]
        content: Vec<String>,
        #[arg(long, default_value = "normal")]
        importance: Importance,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    Show,
    /// Replaces the stored profile; fields not given are cleared
    Set {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        style: Option<String>,
        #[arg(long = "pref")]
        preferences: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct AudioOptions {
    play: bool,
    input_device: Option<String>,
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&args, &env)?;

    tracing::info!(
        api_url = %cfg.api_url.as_url(),
        user_id = ?cfg.user_id,
        history_page_size = cfg.history_page_size.get(),
        "config loaded"
    );

    let session = match cfg.user_id.as_deref() {
        Some(id) => SessionIdentity::with_identity(id),
        None => SessionIdentity::new(),
    };
    let timeline = matches!(args.command, Command::History { timeline: true, .. });
    let mut console = EmotionConsole::new(
        HttpEmotionApi::from_config(&cfg),
        SymphoniaVerifier,
        TerminalSink::new().with_timeline(timeline),
        session,
        ConsoleConfig::from_app(&cfg),
    );
    let audio = AudioOptions {
        play: args.play,
        input_device: args.input_device,
        output_device: args.output_device,
    };

    let succeeded = run_command(&mut console, args.command, &audio).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `Ok(false)` means the console already rendered a failure.
async fn run_command(
    console: &mut Console,
    command: Command,
    audio: &AudioOptions,
) -> anyhow::Result<bool> {
    let player = build_player(audio);
    let player = player.as_deref();

    let succeeded = match command {
        Command::Health => matches!(
            console.check_connectivity().await,
            Connectivity::Online { .. }
        ),
        Command::Text { text } => console.submit_text(&text.join(" "), None).await.is_ok(),
        Command::File { path, mime } => submit_file(console, &path, mime, player).await?,
        Command::Record => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            record_and_submit(console, &mut lines, audio, player).await?
        }
        Command::History {
            since_days,
            page,
            csv,
            timeline: _,
        } => {
            let loaded = show_history(console, since_days, page.unwrap_or(1)).await;
            if let (true, Some(path)) = (loaded, csv) {
                export_csv(console, &path)?;
            }
            loaded
        }
        Command::Memory { action } => match action.unwrap_or(MemoryAction::List) {
            MemoryAction::List => console.reload_memory(None).await.is_ok(),
            MemoryAction::Save {
                memory_type,
                content,
                importance,
            } => console
                .save_memory(&memory_type, &content.join(" "), importance, None)
                .await
                .is_ok(),
        },
        Command::Insights { window_days } => {
            let window = window_days.map(InsightsWindow::new).transpose()?;
            console.insights(window, None).await.is_ok()
        }
        Command::Profile { action } => match action.unwrap_or(ProfileAction::Show) {
            ProfileAction::Show => console.load_profile(None).await.is_ok(),
            ProfileAction::Set {
                name,
                style,
                preferences,
            } => {
                let profile = UserProfile {
                    user_id: console.session().identity().unwrap_or_default(),
                    name,
                    interaction_style: style,
                    preferences,
                };
                console.save_profile(profile).await.is_ok()
            }
        },
        Command::Respond => console.adaptive_reply(None).await.is_ok(),
        Command::Shell => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            run_shell(console, &mut lines, audio, player).await?;
            true
        }
    };
    Ok(succeeded)
}

async fn run_shell(
    console: &mut Console,
    lines: &mut StdinLines,
    audio: &AudioOptions,
    player: Option<&dyn ArtifactPlayer>,
) -> anyhow::Result<()> {
    console.check_connectivity().await;
    println!("Type 'help' for commands.");

    loop {
        print!("> ");
        std::io::stdout().flush().context("flushing prompt")?;
        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };

        let command = match parse_shell_line(&line) {
            Ok(c) => c,
            Err(msg) => {
                console.sink_mut().notice(NoticeLevel::Warning, &msg);
                continue;
            }
        };

        // Failures are rendered by the console; the shell keeps going.
        match command {
            ShellCommand::Empty => {}
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => break,
            ShellCommand::Health => {
                console.check_connectivity().await;
            }
            ShellCommand::Text(text) => {
                let _ = console.submit_text(&text, None).await;
            }
            ShellCommand::File { path, mime } => {
                if let Err(e) = submit_file(console, &path, mime, player).await {
                    console.sink_mut().notice(NoticeLevel::Error, &format!("{e:#}"));
                }
            }
            ShellCommand::Record => {
                if let Err(e) = record_and_submit(console, lines, audio, player).await {
                    console.sink_mut().notice(NoticeLevel::Error, &format!("{e:#}"));
                }
            }
            ShellCommand::History { since_days } => {
                let page = console.history().current_page();
                show_history(console, since_days, page).await;
            }
            ShellCommand::NextPage => console.change_history_page(PageMove::Next),
            ShellCommand::PrevPage => console.change_history_page(PageMove::Prev),
            ShellCommand::Page(n) => console.change_history_page(PageMove::To(n)),
            ShellCommand::Csv(path) => {
                if let Err(e) = export_csv(console, &path) {
                    console.sink_mut().notice(NoticeLevel::Error, &format!("{e:#}"));
                }
            }
            ShellCommand::Memories => {
                let _ = console.reload_memory(None).await;
            }
            ShellCommand::NextMemoryPage => console.change_memory_page(PageMove::Next),
            ShellCommand::PrevMemoryPage => console.change_memory_page(PageMove::Prev),
            ShellCommand::Remember {
                memory_type,
                importance,
                content,
            } => {
                let _ = console
                    .save_memory(&memory_type, &content, importance, None)
                    .await;
            }
            ShellCommand::Insights { window_days } => {
                match window_days.map(InsightsWindow::new).transpose() {
                    Ok(window) => {
                        let _ = console.insights(window, None).await;
                    }
                    Err(e) => console.sink_mut().notice(NoticeLevel::Warning, &e.to_string()),
                }
            }
            ShellCommand::Profile => {
                let _ = console.load_profile(None).await;
            }
            ShellCommand::User(id) => {
                if console.session().set_identity(&id) {
                    console
                        .sink_mut()
                        .notice(NoticeLevel::Info, &format!("Now acting as {}.", id.trim()));
                }
            }
            ShellCommand::Respond => {
                let _ = console.adaptive_reply(None).await;
            }
        }
    }
    Ok(())
}

/// Reloads history and renders it once, already windowed and paged.
async fn show_history(console: &mut Console, since_days: Option<u32>, page: usize) -> bool {
    console.sink_mut().hold_history(true);
    let loaded = console.reload_history(None).await.is_ok();
    if let (true, Some(days)) = (loaded, since_days) {
        console.change_since_days(days);
    }
    console.sink_mut().hold_history(false);
    if loaded {
        console.change_history_page(PageMove::To(page));
    }
    loaded
}

fn export_csv(console: &mut Console, path: &Path) -> anyhow::Result<()> {
    let csv = console.export_csv();
    std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
    let rows = console.history().filtered().len();
    tracing::info!(path = %path.display(), rows, "history exported");
    console.sink_mut().notice(
        NoticeLevel::Info,
        &format!("Exported {rows} records to {}.", path.display()),
    );
    Ok(())
}

async fn submit_file(
    console: &mut Console,
    path: &Path,
    mime: Option<String>,
    player: Option<&dyn ArtifactPlayer>,
) -> anyhow::Result<bool> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mime = mime.unwrap_or_else(|| guess_mime(path).to_owned());
    let artifact = load_from_file(bytes, &mime);
    tracing::debug!(
        path = %path.display(),
        bytes = artifact.len(),
        mime_type = %artifact.mime_type(),
        "audio file loaded"
    );

    let succeeded = console.submit_artifact(artifact.clone(), None).await.is_ok();
    if succeeded {
        play_back(console, player, artifact).await;
    }
    Ok(succeeded)
}

#[cfg(feature = "audio-device")]
async fn record_and_submit(
    console: &mut Console,
    lines: &mut StdinLines,
    audio: &AudioOptions,
    player: Option<&dyn ArtifactPlayer>,
) -> anyhow::Result<bool> {
    use emotion_client_core::capture::{CaptureController, MicrophoneDevice};

    let mut device = MicrophoneDevice::new();
    if let Some(name) = audio.input_device.as_deref() {
        device = device.with_input_device_name(name);
    }
    let mut controller = CaptureController::new(device);
    if let Err(e) = controller.start_capture().await {
        console.sink_mut().notice(NoticeLevel::Error, &e.to_string());
        return Ok(false);
    }
    console
        .sink_mut()
        .notice(NoticeLevel::Info, "Recording. Press Enter to stop.");

    // Stop before surfacing a stdin error so the microphone is released.
    let stop_signal = lines.next_line().await;
    let stopped = controller.stop_capture().await;
    stop_signal.context("reading stdin")?;

    let capture = match stopped {
        Ok(capture) => capture,
        Err(e) => {
            console.sink_mut().notice(NoticeLevel::Error, &e.to_string());
            return Ok(false);
        }
    };
    let artifact = capture.artifact.clone();
    let succeeded = console.submit_capture(capture, None).await.is_ok();
    if succeeded {
        play_back(console, player, artifact).await;
    }
    Ok(succeeded)
}

#[cfg(not(feature = "audio-device"))]
async fn record_and_submit(
    console: &mut Console,
    _lines: &mut StdinLines,
    audio: &AudioOptions,
    _player: Option<&dyn ArtifactPlayer>,
) -> anyhow::Result<bool> {
    tracing::debug!(input_device = ?audio.input_device, "microphone requested");
    console.sink_mut().notice(
        NoticeLevel::Error,
        "This build has no microphone support (rebuild with the audio-device feature).",
    );
    Ok(false)
}

async fn play_back(
    console: &mut Console,
    player: Option<&dyn ArtifactPlayer>,
    artifact: AudioArtifact,
) {
    let Some(player) = player else {
        return;
    };
    if let Err(e) = player.play(artifact).await {
        tracing::warn!(error = %e, "playback failed");
        console
            .sink_mut()
            .notice(NoticeLevel::Warning, &format!("Playback failed: {e}"));
    }
}

fn build_player(audio: &AudioOptions) -> Option<Box<dyn ArtifactPlayer>> {
    audio
        .play
        .then(|| output_player(audio.output_device.as_deref()))
}

#[cfg(feature = "audio-device")]
fn output_player(output_device: Option<&str>) -> Box<dyn ArtifactPlayer> {
    let mut player = emotion_client_core::playback::AudioPlayer::new();
    if let Some(name) = output_device {
        player = player.with_output_device_name(name);
    }
    Box::new(player)
}

#[cfg(not(feature = "audio-device"))]
fn output_player(output_device: Option<&str>) -> Box<dyn ArtifactPlayer> {
    tracing::warn!(?output_device, "built without audio-device; playback is silent");
    Box::new(emotion_client_core::playback::SilentPlayer::new())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        _ => "",
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let api_url = resolve_api_url(args.api_url.clone(), ENV_API_URL, env)?;
    let user_id = resolve_optional_string(args.user_id.clone(), ENV_USER_ID, env);
    let history_page_size = resolve_page_size(
        args.page_size,
        ENV_PAGE_SIZE,
        env,
        DEFAULT_HISTORY_PAGE_SIZE,
    )?;
    let memory_page_size =
        PageSize::new(args.memory_page_size.unwrap_or(DEFAULT_MEMORY_PAGE_SIZE))?;

    Ok(AppConfig {
        api_url,
        user_id,
        history_page_size,
        memory_page_size,
        ..AppConfig::default()
    })
}
