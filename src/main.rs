use std::io;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use log::info;

use toolprogress::io::ConsoleOutputTrimmer;
use toolprogress::{ConsoleFormat, KnownFormat, LineClassifier, ToolRun};

#[derive(Debug, Parser)]
#[command(version, about = "Inspect the console output of proteomics analysis tools")]
struct App {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report the progress, version and first error found in a console output file
    Parse {
        /// The tool that wrote the file
        format: KnownFormat,
        path: PathBuf,
        /// Load the console format from a JSON file instead of a built-in one
        #[cfg(feature = "serde")]
        #[arg(long)]
        format_file: Option<PathBuf>,
        #[arg(short, long, default_value_t = 1)]
        debug_level: u8,
    },
    /// Collapse repeated progress lines in a finished console output file
    Trim {
        path: PathBuf,
        #[arg(short, long, default_value_t = KnownFormat::TopPIC)]
        format: KnownFormat,
    },
}

fn load_format(format: KnownFormat, _format_file: Option<&PathBuf>) -> io::Result<ConsoleFormat> {
    #[cfg(feature = "serde")]
    if let Some(path) = _format_file {
        return ConsoleFormat::from_path(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
    }
    Ok(format.to_format())
}

fn parse(format: ConsoleFormat, path: PathBuf, debug_level: u8) -> io::Result<()> {
    let mut run = ToolRun::new(path, format)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .with_debug_level(debug_level);
    if !run.console_output_path().exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", run.console_output_path().display()),
        ));
    }
    run.finalize();
    let snapshot = run.snapshot();
    println!("Progress: {:0.2}%", snapshot.progress);
    if !snapshot.tool_version.is_empty() {
        println!("Version: {}", snapshot.tool_version);
    }
    if let Some(phase) = snapshot.current_phase.as_deref() {
        println!("Phase: {phase}");
    }
    if let Some(elapsed) = snapshot.elapsed {
        println!("Elapsed: {} minutes", elapsed.num_minutes());
    }
    if !snapshot.error_message.is_empty() {
        println!("Error: {}", snapshot.error_message);
    }
    Ok(())
}

fn trim(format: ConsoleFormat, path: PathBuf) -> io::Result<()> {
    let classifier =
        LineClassifier::new(format).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let summary = ConsoleOutputTrimmer::new(&classifier)
        .trim_file(&path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    info!(
        "Kept {} of {} lines",
        summary.lines_kept, summary.lines_read
    );
    Ok(())
}

fn main() -> io::Result<()> {
    env_logger::init();
    let app = App::parse();
    let result = match app.command {
        #[cfg(feature = "serde")]
        Command::Parse {
            format,
            path,
            format_file,
            debug_level,
        } => load_format(format, format_file.as_ref()).and_then(|f| parse(f, path, debug_level)),
        #[cfg(not(feature = "serde"))]
        Command::Parse {
            format,
            path,
            debug_level,
        } => load_format(format, None).and_then(|f| parse(f, path, debug_level)),
        Command::Trim { path, format } => trim(format.to_format(), path),
    };
    if let Err(e) = result {
        eprintln!("{e}");
        exit(1)
    }
    Ok(())
}
