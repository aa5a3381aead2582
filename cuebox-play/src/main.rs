//! cuebox-play - command-line demo player
//!
//! Loads one clip and plays it through the default output device, either
//! as a repeated multishot trigger or as a gapless loop that ends
//! cleanly on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cuebox::{CpalBackend, SoundConfig, SoundEngine, SoundSource, SoundType};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for cuebox-play
#[derive(Parser, Debug)]
#[command(name = "cuebox-play")]
#[command(about = "Demo player for the cuebox clip playback engine")]
#[command(version)]
struct Args {
    /// Clip to play: a local file path or an http(s) URL
    source: String,

    /// Play as a gapless loop instead of a one-shot (Ctrl-C to end)
    #[arg(long = "loop")]
    looped: bool,

    /// Volume, 0 to 100
    #[arg(short, long, default_value_t = 100.0)]
    volume: f64,

    /// Playback rate multiplier
    #[arg(short, long, default_value_t = 1.0)]
    rate: f64,

    /// Number of multishot triggers
    #[arg(short, long, default_value_t = 1)]
    count: usize,

    /// Milliseconds between multishot triggers
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,

    /// Output device name (default device when omitted)
    #[arg(long, env = "CUEBOX_DEVICE")]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuebox=debug,cuebox_play=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let backend =
        Arc::new(CpalBackend::with_device(args.device.clone()).context("Failed to open audio output")?);
    let engine = SoundEngine::new(backend);

    let source = if args.source.starts_with("http://") || args.source.starts_with("https://") {
        SoundSource::Url(args.source.clone())
    } else {
        SoundSource::File(args.source.clone().into())
    };
    let sound_type = if args.looped {
        SoundType::Loop
    } else {
        SoundType::Multishot
    };

    let (load_tx, mut load_rx) = tokio::sync::mpsc::unbounded_channel();
    let (end_tx, mut end_rx) = tokio::sync::mpsc::unbounded_channel();

    let mut config = SoundConfig::new(source, sound_type);
    config.volume = args.volume;
    config.playback_rate = args.rate;
    config.concurrency = args.count.max(1);
    {
        let load_tx = load_tx.clone();
        config.callbacks.on_load = Some(Box::new(move || {
            let _ = load_tx.send(Ok(()));
        }));
    }
    config.callbacks.on_error = Some(Box::new(move |error| {
        let _ = load_tx.send(Err(error.to_string()));
    }));
    config.callbacks.on_loop = Some(Box::new(|next_start| {
        info!("loop iteration scheduled, next starts at {:.3}s", next_start);
    }));
    config.callbacks.on_end = Some(Box::new(move || {
        let _ = end_tx.send(());
    }));

    let sound = engine.create_sound(config).context("Failed to create sound")?;

    info!("Loading {}", args.source);
    match load_rx.recv().await {
        Some(Ok(())) => info!("Loaded, duration {:.3}s", sound.duration()),
        Some(Err(message)) => bail!("Failed to load clip: {}", message),
        None => bail!("Load notification channel closed"),
    }

    if args.looped {
        sound.play();
        info!("Looping, press Ctrl-C to end after the current iteration");
        signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        info!("Ending loop");
        sound.end();
        let _ = tokio::time::timeout(
            Duration::from_secs_f64(sound.duration() / args.rate + 1.0),
            end_rx.recv(),
        )
        .await;
    } else {
        for trigger in 0..args.count.max(1) {
            if trigger > 0 {
                tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
            }
            sound.play();
        }
        // Let the tail ring out before the backend is torn down.
        tokio::time::sleep(Duration::from_secs_f64(sound.duration() / args.rate + 0.2)).await;
    }

    info!("Done");
    Ok(())
}
