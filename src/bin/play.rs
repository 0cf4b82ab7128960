use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::{error, info};
use std::time::Duration;

use playhead::decoder::ffmpeg::FfmpegBackend;
use playhead::pipeline::types::VideoFrame;
use playhead::session::{PlayerEvent, PlayerSession};
use playhead::sink::cpal::CpalAudioSink;
use playhead::sink::{AudioSink, NullAudioSink, VideoSink};

/// Counts delivered frames instead of painting them.
#[derive(Default)]
struct ProgressVideoSink {
    frames: u64,
}

impl VideoSink for ProgressVideoSink {
    fn present(&mut self, frame: &VideoFrame) {
        self.frames += 1;
        if self.frames % 100 == 1 {
            info!(
                "video: frame {} ({}x{} at {})",
                self.frames, frame.width, frame.height, frame.pts
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("play")
        .version(playhead::config::version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Play a media file or URL with synchronized audio")
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Path or URL of the media to play")
                .required(true),
        )
        .arg(
            Arg::new("mute")
                .short('m')
                .long("mute")
                .help("Discard audio instead of playing it")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let source = matches.get_one::<String>("source").unwrap();
    let muted = matches.get_flag("mute");

    let audio_sink: Box<dyn AudioSink> = if muted {
        Box::new(NullAudioSink)
    } else {
        Box::new(CpalAudioSink::new()?)
    };

    let mut session = PlayerSession::new(Box::new(FfmpegBackend::new()));
    let mut events = session.take_events().expect("fresh session has events");

    session.open(source, Box::new(ProgressVideoSink::default()), audio_sink)?;
    session.toggle_play()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PlayerEvent::StateChanged(state)) => info!("state: {state}"),
                Some(PlayerEvent::EndOfStream) => {
                    info!("end of stream");
                    // Let the workers drain what is still queued.
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    break;
                }
                Some(PlayerEvent::Error(message)) => {
                    error!("playback failed: {message}");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let (elapsed, total) = session.position();
                info!("position: {elapsed} / {total} ms");
            }
        }
    }

    session.close().await;
    Ok(())
}
