mod automation;
mod capture;
mod paths;
mod vision;

use crate::automation::runner::RunArgs;
use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Logs a timestamped message to the console and, once logging is
/// initialized, to the run log file.
pub fn log(message: &str) {
    let line = format!(
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    );
    println!("{}", line);
    if let Some(path) = LOG_FILE.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Logs only when --debug was passed.
pub fn debug(message: &str) {
    if DEBUG.load(Ordering::Relaxed) {
        log(&format!("[debug] {}", message));
    }
}

fn init_logging() {
    let logs_dir = paths::get_logs_dir();
    if std::fs::create_dir_all(&logs_dir).is_ok() {
        let name = format!(
            "run_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let _ = LOG_FILE.set(logs_dir.join(name));
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log(&format!("Fatal error: {}", info));
        default_hook(info);
    }));
}

#[derive(Default)]
struct CliArgs {
    run: RunArgs,
    debug: bool,
    size: Option<(u32, u32)>,
    info: bool,
    generate_config: bool,
    help: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .with_context(|| format!("--size expects WIDTHxHEIGHT, got '{}'", value))?;
    Ok((
        width.parse().with_context(|| format!("Bad width '{}'", width))?,
        height
            .parse()
            .with_context(|| format!("Bad height '{}'", height))?,
    ))
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    // Accept both `--flag value` and `--flag=value`.
    let mut args = args
        .flat_map(|arg| match arg.strip_prefix("--").and_then(|a| a.split_once('=')) {
            Some((flag, value)) => vec![format!("--{}", flag), value.to_string()],
            None => vec![arg],
        })
        .collect::<Vec<_>>()
        .into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--title" => {
                cli.run.title = Some(args.next().context("--title requires a value")?);
            }
            "--budget" => {
                let value = args.next().context("--budget requires a value")?;
                cli.run.budget = Some(
                    value
                        .parse()
                        .with_context(|| format!("--budget must be a number, got '{}'", value))?,
                );
            }
            "--items" => {
                let value = args.next().context("--items requires a value")?;
                cli.run.items_filter = Some(
                    value
                        .split(',')
                        .map(|token| token.trim().to_string())
                        .filter(|token| !token.is_empty())
                        .collect(),
                );
            }
            "--size" => {
                let value = args.next().context("--size requires a value")?;
                cli.size = Some(parse_size(&value)?);
            }
            "--allow-move" => cli.run.allow_move = true,
            "--debug" => cli.debug = true,
            "--info" => cli.info = true,
            "--generate-config" => cli.generate_config = true,
            "--help" | "-h" => cli.help = true,
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(cli)
}

fn print_usage() {
    println!("Epic Seven secret shop auto-refresher");
    println!();
    println!("Usage: e7-secret-shop [options]");
    println!();
    println!("Options:");
    println!("  --title <title>      Exact game window title (auto-detected otherwise)");
    println!("  --budget <n>         Stop after spending n skystones on refreshes");
    println!("  --items <a,b,...>    Only track items whose name matches a token");
    println!("  --allow-move         Allow moving an off-screen game window to the origin");
    println!("  --size <WxH>         Resolution the template assets were captured at");
    println!("  --debug              Verbose match logging");
    println!("  --info               List visible windows and data directories");
    println!("  --generate-config    Write config.default.json next to the executable");
    println!("  --help               Show this help");
    println!();
    println!("Press ESC during a run to stop.");
}

fn print_info() {
    log(&format!("Executable dir: {}", paths::get_exe_dir().display()));
    log(&format!("Assets dir:     {}", paths::get_assets_dir().display()));
    log(&format!("History dir:    {}", paths::get_history_dir().display()));
    let reference = &automation::config::get_config().reference;
    log(&format!(
        "Asset reference resolution: {}x{}",
        reference.width, reference.height
    ));
    #[cfg(windows)]
    {
        log("Visible windows:");
        for title in capture::list_window_titles() {
            log(&format!("  {}", title));
        }
    }
}

fn main() {
    install_panic_hook();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            println!();
            print_usage();
            std::process::exit(2);
        }
    };
    if cli.help {
        print_usage();
        return;
    }

    DEBUG.store(cli.debug, Ordering::Relaxed);
    init_logging();
    if let Err(e) = paths::ensure_directories() {
        log(&format!("Failed to create data directories: {}", e));
    }
    automation::config::init_config(cli.size);
    if automation::config::get_config().debug.enabled {
        DEBUG.store(true, Ordering::Relaxed);
    }

    if cli.generate_config {
        let path = paths::get_exe_dir().join("config.default.json");
        match automation::config::save_default_config(&path) {
            Ok(()) => log(&format!("Default config written to {}", path.display())),
            Err(e) => {
                log(&format!("Failed to write default config: {}", e));
                std::process::exit(1);
            }
        }
        return;
    }
    if cli.info {
        print_info();
        return;
    }

    #[cfg(windows)]
    {
        match automation::runner::run(&cli.run) {
            Ok(reason) => log(&format!("Done: {}", reason)),
            Err(e) => {
                log(&format!("Error: {:#}", e));
                std::process::exit(1);
            }
        }
    }
    #[cfg(not(windows))]
    {
        let _ = cli.run;
        log("This tool drives a Windows emulator window and must run on Windows.");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = parse(&[
            "--title",
            "Epic Seven",
            "--budget",
            "30",
            "--allow-move",
            "--items",
            "covenant, mystic",
        ])
        .unwrap();
        assert_eq!(cli.run.title.as_deref(), Some("Epic Seven"));
        assert_eq!(cli.run.budget, Some(30));
        assert!(cli.run.allow_move);
        assert_eq!(
            cli.run.items_filter,
            Some(vec!["covenant".to_string(), "mystic".to_string()])
        );
    }

    #[test]
    fn test_equals_syntax_is_accepted() {
        let cli = parse(&["--budget=15", "--title=Epic Seven"]).unwrap();
        assert_eq!(cli.run.budget, Some(15));
        assert_eq!(cli.run.title.as_deref(), Some("Epic Seven"));
    }

    #[test]
    fn test_parse_size() {
        let cli = parse(&["--size", "1920x1080"]).unwrap();
        assert_eq!(cli.size, Some((1920, 1080)));
        assert!(parse(&["--size", "1920"]).is_err());
        assert!(parse(&["--size", "axb"]).is_err());
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(parse(&["--frobnicate"]).is_err());
    }

    #[test]
    fn test_missing_value_is_rejected() {
        assert!(parse(&["--budget"]).is_err());
        assert!(parse(&["--budget", "lots"]).is_err());
    }
}
