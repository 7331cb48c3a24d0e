// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use geoview_app::AppState;
use geoview_db::Store;
use runtime::DbRuntime;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_SEED: u64 = 20_260_101;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `geoview --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    init_logging(&config)?;

    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or GEOVIEW_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;
    if options.demo {
        seed_demo_layers(&store, config.delimiter())?;
    }

    for path in &options.files {
        store
            .import_csv_file(path, config.delimiter())
            .with_context(|| format!("import {}", path.display()))?;
    }

    let layers = store.list_layers()?;
    if options.check_only {
        info!(layers = layers.len(), "check passed");
        return Ok(());
    }

    let mut runtime = DbRuntime::new(&store);
    let main_bus = runtime.subscribe();
    for layer in &layers {
        runtime.announce(layer);
    }

    let mut state = AppState::new(config.initial_extent());
    geoview_tui::run_app(&mut state, &mut runtime, &main_bus, config.ui_options())
}

/// Logs go to a file because the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let filter = match env::var("GEOVIEW_LOG") {
        Ok(raw) => EnvFilter::try_new(&raw).with_context(|| format!("parse GEOVIEW_LOG {raw:?}"))?,
        Err(_) => EnvFilter::try_new(config.log_level())
            .with_context(|| format!("parse log level {:?}", config.log_level()))?,
    };

    let log_path = config.log_file()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

fn seed_demo_layers(store: &Store, delimiter: char) -> Result<()> {
    for layer in geoview_testkit::demo_layers(DEMO_SEED) {
        store
            .import_csv_text(&layer.title, &layer.to_csv(delimiter), delimiter)
            .with_context(|| format!("seed demo layer {}", layer.title))?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    files: Vec<PathBuf>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        files: Vec::new(),
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown if unknown.starts_with('-') => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
            file => options.files.push(PathBuf::from(file)),
        }
    }

    Ok(options)
}

fn print_help() {
    println!("geoview [options] [FILE.csv ...]");
    println!("  FILE.csv                 Import a lng;lat;attr... CSV file as a layer");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with generated demo layers (in-memory)");
    println!("  --check                  Validate config, database and imports, then exit");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, parse_cli_args, seed_demo_layers};
    use anyhow::Result;
    use geoview_db::Store;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/geoview-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_db_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                show_help: false,
                files: Vec::new(),
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_config_value() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_flag() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown flag should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_collects_positional_files_in_order() -> Result<()> {
        let options = parse_cli_args(
            vec!["towns.csv", "--check", "data/rivers.csv"],
            default_options_path(),
        )?;
        assert_eq!(
            options.files,
            vec![PathBuf::from("towns.csv"), PathBuf::from("data/rivers.csv")]
        );
        assert!(options.check_only);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_print_and_demo_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--demo", "--print-path"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.demo);
        assert!(options.print_db_path);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }

    #[test]
    fn demo_seed_creates_three_layers() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        seed_demo_layers(&store, ';')?;

        let titles = store
            .list_layers()?
            .into_iter()
            .map(|layer| layer.title)
            .collect::<Vec<_>>();
        assert_eq!(titles.len(), 3);
        assert!(titles.contains(&"alpine towns".to_owned()));
        Ok(())
    }
}
