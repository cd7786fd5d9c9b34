//! Main Entrypoint for the Kairos Session CLI
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Starting the session runtime against the configured lesson backend.
//! 4. Acting as a minimal presentation layer: displayed chunks go to
//!    stdout, stdin lines become questions or `/` commands.

use anyhow::Context;
use clap::Parser;
use kairos_core::adaptation::InMemoryVariantStore;
use kairos_session::{
    affect::{demo_sequence, spawn_random, spawn_scripted},
    config::Config,
    session::{LessonRequest, SessionDeps, SessionEvent, SessionRuntime, UserIntent},
    storage::JsonFileStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "kairos-session",
    about = "Run an adaptive lesson session from the terminal"
)]
struct Args {
    /// Lesson topic to request.
    topic: String,

    #[arg(long, default_value = "intermediate")]
    difficulty: String,

    #[arg(long, default_value = "mixed")]
    style: String,

    #[arg(long)]
    age: Option<u32>,

    /// Affect source to run alongside the lesson: scripted, random or off.
    #[arg(long, default_value = "scripted")]
    affect: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(endpoint = %config.endpoint, topic = %args.topic, "starting session");

    let request = LessonRequest {
        topic: args.topic,
        user_alias: config.user_alias.clone(),
        difficulty: args.difficulty,
        style: args.style,
        age: args.age,
        language: config.language.clone(),
    };
    let deps = SessionDeps {
        variants: Arc::new(InMemoryVariantStore::new()),
        store: Arc::new(JsonFileStore::new(config.storage_dir.clone())),
    };

    let (runtime, mut handle) = SessionRuntime::new(&config, request, deps);

    let _affect_task = match args.affect.as_str() {
        "scripted" => Some(spawn_scripted(
            demo_sequence(),
            config.affect_interval,
            handle.affect_sender(),
        )),
        "random" => Some(spawn_random(config.affect_interval, handle.affect_sender())),
        "off" => None,
        other => anyhow::bail!("unknown affect source '{}'", other),
    };

    let session_task = tokio::spawn(runtime.run());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => render(event),
                None => break,
            },
            line = stdin.next_line(), if stdin_open => {
                let Ok(Some(line)) = line else {
                    stdin_open = false;
                    continue;
                };
                let intent = match line.trim() {
                    "" => continue,
                    "/pause" => UserIntent::Pause,
                    "/resume" => UserIntent::Resume,
                    "/finish" => UserIntent::Finish,
                    "/exit" => UserIntent::Exit,
                    question => UserIntent::Ask(question.to_string()),
                };
                if handle.submit(intent).await.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; leaving the session");
                let _ = handle.submit(UserIntent::Exit).await;
            }
        }
    }

    session_task.await.context("session task panicked")??;
    Ok(())
}

fn render(event: SessionEvent) {
    match event {
        SessionEvent::ChunkDisplayed(chunk) => {
            match &chunk.caption {
                Some(caption) => println!("[{}] {} ({})", chunk.kind, chunk.content, caption),
                None => println!("[{}] {}", chunk.kind, chunk.content),
            };
        }
        SessionEvent::PhaseChanged(phase) => println!("-- {phase} --"),
        SessionEvent::AffectUpdated(sample) => {
            info!(state = %sample.state, confidence = sample.confidence, "affect");
        }
        SessionEvent::AdaptationApplied(decision) => {
            println!("** {} **", decision.rationale);
        }
        SessionEvent::ErrorBanner { message, fatal } => {
            if fatal {
                warn!(%message, "session is over");
            } else {
                warn!(%message, "transient error");
            }
        }
        SessionEvent::Completed(summary) => {
            println!(
                "Lesson complete: {} chunks over {}s, {} questions, {} adaptations.",
                summary.chunks_delivered,
                summary.duration_secs,
                summary.questions_asked,
                summary.adaptations.len()
            );
        }
    }
}
