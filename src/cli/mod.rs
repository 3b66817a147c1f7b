use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub mod client;

use client::TransportClient;

const POLL_INTERVAL_MS: u64 = 200;

#[derive(Parser, Debug)]
#[command(name = "tapedeck")]
#[command(about = "Headless audio recorder and player", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Port of the running tapedeck service
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the tapedeck service (default when no command is given)
    Serve,
    /// Start recording a new take
    Record(RecordCliArgs),
    /// Play a file, or the most recent recording
    Play(PlayCliArgs),
    /// Pause playback
    Pause,
    /// Resume paused playback
    Resume,
    /// Seek within the playing file
    Seek(SeekCliArgs),
    /// Stop recording or playback
    Stop,
    /// Show transport status
    Status,
    /// List recorded files
    List(ListCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    /// Destination file (default: timestamped name in the recordings dir)
    pub path: Option<PathBuf>,
    /// Stay attached and show elapsed time until stopped
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(ClapArgs, Debug)]
pub struct PlayCliArgs {
    /// File to play (default: most recent recording)
    pub file: Option<PathBuf>,
    /// Stay attached and show progress until playback ends
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SeekCliArgs {
    /// Target position in seconds
    pub position: f64,
}

#[derive(ClapArgs, Debug)]
pub struct ListCliArgs {
    /// Maximum number of results to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Port for client commands: the --port flag wins, then the config file,
/// then the built-in default.
pub fn resolve_port(flag: Option<u16>) -> u16 {
    flag.or_else(|| crate::config::Config::load().ok().map(|c| c.api.port))
        .unwrap_or(8273)
}

pub async fn handle_record_command(args: RecordCliArgs, port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.start_record(args.path.as_deref()).await?;

    if let Some(path) = json.get("path").and_then(|v| v.as_str()) {
        println!("Recording to {}", path);
    }

    if args.follow {
        follow_recording(&client).await?;
    } else {
        println!("Stop with: tapedeck stop");
    }

    Ok(())
}

pub async fn handle_play_command(args: PlayCliArgs, port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.start_play(args.file.as_deref()).await?;

    if let Some(path) = json.get("path").and_then(|v| v.as_str()) {
        println!("Playing {}", path);
    }

    if args.follow {
        follow_playback(&client).await?;
    }

    Ok(())
}

pub async fn handle_pause_command(port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.pause().await?;
    print_state_line(&json);
    Ok(())
}

pub async fn handle_resume_command(port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.resume().await?;
    print_state_line(&json);
    Ok(())
}

pub async fn handle_seek_command(args: SeekCliArgs, port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    client.seek(args.position).await?;
    println!("Seeked to {}", format_clock(args.position));
    Ok(())
}

pub async fn handle_stop_command(port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.stop().await?;

    match json.get("finalized") {
        Some(finalized) if !finalized.is_null() => {
            let path = finalized
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>");
            let duration = finalized
                .get("duration_seconds")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            println!("Saved {} ({})", path, format_clock(duration));
        }
        _ => println!("Stopped."),
    }

    Ok(())
}

pub async fn handle_status_command(port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let status = client.status().await?;

    if status.active {
        let position = if status.total_seconds > 0.0 {
            format!(
                "{} / {}",
                format_clock(status.elapsed_seconds),
                format_clock(status.total_seconds)
            )
        } else {
            format_clock(status.elapsed_seconds)
        };

        println!("State: {}", status.state);
        println!("Position: {}", position);
        if let Some(path) = &status.path {
            println!("File: {}", path.display());
        }
    } else {
        println!("State: {}", status.state);
        if let Some(last) = &status.last_recording {
            println!(
                "Last recording: {} ({})",
                last.path.display(),
                format_clock(last.duration_seconds)
            );
        }
    }

    if let Some(error) = &status.last_error {
        println!("Last error: {}", error);
    }

    Ok(())
}

pub async fn handle_list_command(args: ListCliArgs, port: u16) -> Result<()> {
    let client = TransportClient::new(port);
    let json = client.recordings(args.limit).await?;

    let Some(recordings) = json.get("recordings").and_then(|v| v.as_array()) else {
        println!("No recordings yet.");
        return Ok(());
    };

    if recordings.is_empty() {
        println!("No recordings yet.");
        return Ok(());
    }

    for recording in recordings {
        let name = recording
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("<unnamed>");
        let size = recording
            .get("size_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let modified = recording
            .get("modified")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        println!("{}  {:>8}  {}", name, format_size(size), modified);
    }

    Ok(())
}

/// Live elapsed-time display while recording, until the transport leaves
/// the recording state (e.g. `tapedeck stop` from another shell).
async fn follow_recording(client: &TransportClient) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.red} Recording {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    loop {
        let status = client.status().await?;
        if status.state != "recording" {
            break;
        }
        pb.set_message(format_clock(status.elapsed_seconds));
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    pb.finish_and_clear();
    println!("Recording stopped.");
    Ok(())
}

/// Progress bar until playback finishes or is stopped. Pausing keeps the
/// bar up; it just stops advancing.
async fn follow_playback(client: &TransportClient) -> Result<()> {
    let first = client.status().await?;
    let total = first.total_seconds.max(0.0);

    let pb = ProgressBar::new(total.ceil() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .unwrap()
            .progress_chars("━╸━"),
    );

    loop {
        let status = client.status().await?;
        if !status.active {
            break;
        }
        pb.set_position(status.elapsed_seconds as u64);
        pb.set_message(format!(
            "{} / {}",
            format_clock(status.elapsed_seconds),
            format_clock(status.total_seconds)
        ));
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    pb.finish_and_clear();
    println!("Playback finished.");
    Ok(())
}

fn print_state_line(json: &serde_json::Value) {
    if let Some(state) = json.get("state").and_then(|v| v.as_str()) {
        println!("State: {}", state);
    }
}

/// mm:ss display, zero-padded, like a recorder's time labels. Hours roll
/// into the minutes field.
fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock_pads_and_rolls_minutes() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(7.9), "00:07");
        assert_eq!(format_clock(63.0), "01:03");
        assert_eq!(format_clock(3600.0), "60:00");
    }

    #[test]
    fn test_format_clock_clamps_negative() {
        assert_eq!(format_clock(-5.0), "00:00");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0MB");
    }
}
