use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use now_playing_engine::provider::{self, ScriptedProvider, SourceProvider};
use now_playing_engine::{
    Config, Engine, EngineConfig, EngineHandle, PlayState, PlaybackEvent, RawPayload,
};

#[derive(Parser, Debug)]
#[command(name = "now_playing")]
#[command(about = "Prints the track that is actually playing, debounced across sources")]
#[command(version)]
struct Args {
    /// Config file; by default config.toml is looked up next to the
    /// working directory and the executable
    #[arg(short, long, env = "NOW_PLAYING_CONFIG")]
    config: Option<PathBuf>,

    /// Run against built-in scripted sources instead of real ones
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "now_playing_engine=info,now_playing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let (engine_config, providers) = if args.demo {
        info!("running with scripted demo sources");
        demo_sources()
    } else {
        let config = match &args.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => Config::load().context("failed to load configuration")?,
        };
        let providers = provider::from_config(&config.providers);
        (config.engine, providers)
    };

    let status_interval = engine_config.poll_interval;
    let mut engine = Engine::new(engine_config).context("invalid engine configuration")?;
    for provider in providers {
        engine.add_provider(provider);
    }
    if engine.provider_count() == 0 {
        warn!("no sources configured; nothing will ever be reported as playing");
    }

    let handle = engine.start();
    print_until_interrupted(&handle, status_interval).await;
    handle.shutdown().await;
    Ok(())
}

async fn print_until_interrupted(handle: &EngineHandle, status_interval: Duration) {
    let mut events = handle.subscribe();
    let mut status = tokio::time::interval(status_interval);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(err) = res {
                    warn!(%err, "failed to listen for Ctrl+C");
                }
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(PlaybackEvent::TrackChanged { metadata, .. }) => {
                    println!("now playing: {metadata}");
                    if let Some(album) = metadata.album.known() {
                        println!("  album: {album}");
                    }
                    if let Some(player) = &metadata.player_name {
                        println!("  player: {player}");
                    }
                }
                Ok(PlaybackEvent::PlayStateChanged(state)) => println!("state: {state}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "fell behind the event stream"),
                Err(RecvError::Closed) => break,
            },
            _ = status.tick() => print_progress(handle),
        }
    }
}

fn print_progress(handle: &EngineHandle) {
    let snapshot = handle.snapshot();
    if snapshot.identity.is_none() || snapshot.play_state != PlayState::Playing {
        return;
    }
    let position = format_timestamp(handle.position().as_secs_f64());
    match snapshot.metadata.duration {
        Some(duration) => println!(
            "  {position} / {}",
            format_timestamp(duration.as_secs_f64())
        ),
        None => println!("  {position}"),
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0).floor() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// A steady player and a flaky tab title that keeps flipping between two
/// videos. Only the player's tracks should ever be announced.
fn demo_sources() -> (EngineConfig, Vec<Arc<dyn SourceProvider>>) {
    let config = EngineConfig::with_poll_interval(Duration::from_secs(1));

    let song = |title: &str, position: f64, playing: bool| RawPayload {
        title: Some(title.to_string()),
        artist: Some("Artist X".to_string()),
        album: Some("Demo Album".to_string()),
        duration: Some(200.0),
        position: Some(position),
        is_playing: Some(playing),
        player_name: Some("demo-player".to_string()),
        ..Default::default()
    };

    let mut player = ScriptedProvider::new("player", 10);
    for tick in 0..12 {
        player = player.then(song("Song A", 30.0 + tick as f64, true));
    }
    for _ in 0..4 {
        player = player.then(song("Song A", 42.0, false));
    }
    for tick in 0..8 {
        player = player.then(song("Song B", tick as f64, true));
    }

    let tab = |title: &str| RawPayload {
        title: Some(title.to_string()),
        artist: Some("Someone".to_string()),
        is_playing: Some(true),
        ..Default::default()
    };
    let mut browser = ScriptedProvider::new("browser", 1);
    for idx in 0..24 {
        let title = if idx % 2 == 0 { "Some Video" } else { "Other Video" };
        browser = browser.then(tab(title));
    }

    let providers: Vec<Arc<dyn SourceProvider>> = vec![Arc::new(player), Arc::new(browser)];
    (config, providers)
}
