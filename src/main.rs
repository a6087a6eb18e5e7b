use clap::{ArgAction, Parser};
use mediasort::cli::{RunOptions, report_duplicates, run};
use mediasort::logging;
use mediasort::output::OutputFormatter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Archive photos and videos into year/month folders by capture date.
#[derive(Debug, Parser)]
#[command(name = "mediasort", version, about)]
struct Cli {
    /// Directory to scan for media files
    source: PathBuf,

    /// Root of the year/month archive (overrides archive.root)
    #[arg(short, long)]
    archive: Option<PathBuf>,

    /// Configuration file (default: ./.mediasortrc.toml, then ~/.config/mediasort/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show what would happen without touching any file
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Maximum number of files processed at once
    #[arg(short, long)]
    workers: Option<usize>,

    /// Path to the exiftool executable
    #[arg(long)]
    exiftool: Option<PathBuf>,

    /// Stop on two different files of the same size and name instead of keeping both
    #[arg(long)]
    abort_on_conflict: bool,

    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_symlinks: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Only list media files with identical content; nothing is moved
    #[arg(long)]
    report_duplicates: bool,

    /// Do not show the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let _guard = match logging::init_logger(args.verbose, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            OutputFormatter::error(&format!("Error opening log file: {}", e));
            return ExitCode::from(1);
        }
    };

    let options = RunOptions {
        source: args.source,
        archive_root: args.archive,
        config_path: args.config,
        dry_run: args.dry_run,
        workers: args.workers,
        exiftool: args.exiftool,
        abort_on_conflict: args.abort_on_conflict,
        follow_symlinks: args.follow_symlinks,
        show_progress: !args.no_progress,
    };

    if args.report_duplicates {
        return match report_duplicates(&options) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                OutputFormatter::error(&format!("Error: {:#}", e));
                ExitCode::from(1)
            }
        };
    }

    match run(&options) {
        Ok(summary) if summary.is_fatal() => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            OutputFormatter::error(&format!("Error: {:#}", e));
            ExitCode::from(1)
        }
    }
}
