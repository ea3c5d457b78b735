use anyhow::{bail, Result};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use motion_coach::config::Config;
use motion_coach::engine::{EngineStatus, RepEvent};
use motion_coach::replay;
use motion_coach::session::Session;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("motion_coach=info")),
        )
        .init();

    let config = Config::load_or_default(CONFIG_PATH).resolve_paths(CONFIG_PATH);
    let args: Vec<String> = std::env::args().skip(1).collect();

    println!("=== Motion Coach {} ===", env!("MOTION_COACH_VERSION"));

    let (exercise, recording) = match args.as_slice() {
        [exercise, recording] => (exercise.as_str(), recording.as_str()),
        _ => {
            println!("Usage: motion-coach <exercise> <recording.jsonl>");
            println!();
            println!("Exercises:");
            for entry in &config.exercises {
                println!("  {:<12} {}", entry.name, entry.path.display());
            }
            return Ok(());
        }
    };

    let mut session = Session::new(config);
    if let EngineStatus::ConfigInvalid { reason } = session.switch_to(exercise) {
        bail!("Cannot start '{}': {}", exercise, reason);
    }

    let frames = replay::load(recording)?;
    println!("Exercise:  {}", session.exercise_name());
    println!("Recording: {} ({} frames)", recording, frames.len());
    println!();

    let start = Instant::now();
    let mut last_message: Option<String> = None;
    for frame in &frames {
        let now = frame.at(start);
        let out = session.process(frame.detections.iter().copied(), now);

        match out.event {
            Some(RepEvent::Completed) => {
                let sound = out.sound.map(|s| format!("{:?}", s)).unwrap_or_default();
                println!(
                    "[{:>7.2}s] rep {:>3}  bad {:>3}  sound={}",
                    frame.offset.as_secs_f32(),
                    out.reps,
                    out.bad_reps,
                    sound
                );
            }
            Some(RepEvent::Aborted) => {
                println!("[{:>7.2}s] stalled rep reset", frame.offset.as_secs_f32());
            }
            _ => {}
        }

        let text = out.message.map(|m| m.text);
        if text.is_some() && text != last_message {
            println!(
                "[{:>7.2}s] message: {}",
                frame.offset.as_secs_f32(),
                text.as_deref().unwrap_or_default()
            );
        }
        last_message = text;
    }

    let end = frames.last().map_or(start, |f| f.at(start));
    let snapshot = session.snapshot(end);
    println!();
    println!("Reps:      {}", snapshot.reps);
    println!("Bad reps:  {}", snapshot.bad_reps);
    for (condition, count) in &snapshot.error_counts {
        println!("  {:<20} {}", condition, count);
    }

    Ok(())
}
