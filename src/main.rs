// Retime Main Entry Point
// Copyright (c) 2026 Retime Contributors

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;

use retime::pipeline;

#[derive(Parser)]
#[command(name = "retime")]
#[command(about = "Retime a video file to a target frame rate by linear interpolation", long_about = None)]
struct Cli {
    /// Input media file
    input: PathBuf,

    /// Output media file
    output: PathBuf,

    /// Target output frame rate, frames per second
    #[arg(default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    target_fps: u32,
}

fn main() -> ExitCode {
    dotenv().ok();

    // Default to info-level logs unless explicitly overridden by the user.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    // Logs go to stderr; stdout carries only the run summary.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Cli::parse();

    match pipeline::run(&args.input, &args.output, args.target_fps) {
        Ok(total) => {
            println!("inserted {total} interpolated frames");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("retime: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_defaults_to_60_fps() {
        let cli = Cli::try_parse_from(["retime", "in.mp4", "out.mp4"]).unwrap();
        assert_eq!(cli.target_fps, 60);
    }

    #[test]
    fn test_cli_accepts_explicit_rate() {
        let cli = Cli::try_parse_from(["retime", "in.mp4", "out.mp4", "120"]).unwrap();
        assert_eq!(cli.target_fps, 120);
    }

    #[test]
    fn test_cli_rejects_zero_fps() {
        assert!(Cli::try_parse_from(["retime", "in.mp4", "out.mp4", "0"]).is_err());
    }

    #[test]
    fn test_cli_requires_both_paths() {
        assert!(Cli::try_parse_from(["retime", "in.mp4"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
