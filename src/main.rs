use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use daehwaro::voice::{AudioCapture, AudioPlayback, BatchRead, FrameQueue, TextToSpeech};
use daehwaro::{Config, Pipeline};

/// Daehwaro - voice-driven bus information assistant for Daejeon
#[derive(Parser)]
#[command(name = "daehwaro", version, about)]
struct Cli {
    /// Path to a config file (default: ~/.config/daehwaro/config.toml)
    #[arg(short, long, env = "DAEHWARO_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "안녕하세요! 음성 합성 테스트입니다.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,daehwaro=info",
        1 => "info,daehwaro=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        None => run(config).await,
        Some(Command::TestMic { duration, output }) => test_mic(&config, duration, output.as_deref()),
        Some(Command::TestSpeaker) => test_speaker(),
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> daehwaro::Result<()> {
    let mut pipeline = Pipeline::new(config)?;
    pipeline.run().await
}

/// Record from the microphone for a few seconds and report what arrived
fn test_mic(config: &Config, duration: u64, output: Option<&std::path::Path>) -> daehwaro::Result<()> {
    let capture = AudioCapture::new(&config.audio)?;
    let queue = FrameQueue::new(config.audio.queue_capacity);
    let stream = capture.start(queue.clone())?;

    println!("recording for {duration}s, speak into the microphone...");

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut batches = 0u64;
    let mut captured: Vec<i16> = Vec::new();
    let mut peak = 0i16;

    while Instant::now() < deadline {
        match queue.next_batch(Duration::from_millis(100)) {
            BatchRead::Batch(batch) => {
                batches += 1;
                peak = peak.max(batch.iter().map(|s| s.saturating_abs()).max().unwrap_or(0));
                captured.extend(batch);
            }
            BatchRead::Pending => {}
            BatchRead::Closed => break,
        }
    }

    let dropped = stream.dropped_frames();
    drop(stream);

    println!("batches: {batches}");
    println!(
        "samples: {} ({:.1}s)",
        captured.len(),
        captured.len() as f64 / f64::from(config.audio.sample_rate)
    );
    println!("peak level: {:.1}%", f64::from(peak) / f64::from(i16::MAX) * 100.0);
    println!("dropped frames: {dropped}");
    if peak == 0 {
        println!("warning: only silence captured, check the input device");
    }

    if let Some(path) = output {
        write_wav(path, &captured, config.audio.sample_rate)?;
        println!("recording written to {}", path.display());
    }
    Ok(())
}

/// Write captured samples to a mono 16-bit WAV file
fn write_wav(path: &std::path::Path, samples: &[i16], sample_rate: u32) -> daehwaro::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| daehwaro::Error::Audio(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| daehwaro::Error::Audio(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| daehwaro::Error::Audio(e.to_string()))?;
    Ok(())
}

/// Play a short test tone
fn test_speaker() -> daehwaro::Result<()> {
    let playback = AudioPlayback::new()?;
    let sample_rate = 16000u32;
    let samples: Vec<f32> = (0..sample_rate)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect();

    println!("playing a 440 Hz tone for 1s...");
    playback.play_samples(samples, sample_rate)?;
    println!("done");
    Ok(())
}

/// Synthesize text and play it through the speakers
async fn test_tts(config: &Config, text: &str) -> daehwaro::Result<()> {
    let tts = TextToSpeech::new(
        config.tts.api_key.clone(),
        config.tts.language.clone(),
        config.tts.voice.clone(),
        config.tts.prosody_rate,
    )?;
    let playback = AudioPlayback::new()?;

    println!("synthesizing: {text}");
    let audio = tts.synthesize(text).await?;
    playback.play_mp3(&audio).await?;
    println!("done");
    Ok(())
}
