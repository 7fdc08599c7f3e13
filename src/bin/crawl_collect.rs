use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use crawl_collector::app::App;
use crawl_collector::cancel::CancelToken;
use crawl_collector::config::{CollectorConfig, ConfigLoader};
use crawl_collector::error::CollectorError;
use crawl_collector::output::{ConsoleSink, JsonOutput, OutputMode, TextOutput};
use crawl_collector::remote::HttpRemoteClient;

#[derive(Parser)]
#[command(name = "crawl-collect")]
#[command(about = "Download web-crawl data lists and build deduplicated local datasets")]
#[command(version)]
struct Cli {
    /// Config file (default: ./crawl-collector.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Write a default config and create the storage directories")]
    Init(InitArgs),
    #[command(about = "Create a dataset from a data list URL")]
    Add(AddArgs),
    #[command(about = "Remove a dataset or an unused data list by id")]
    Remove(RemoveArgs),
    #[command(about = "List datasets and data lists")]
    Inspect,
    #[command(about = "Show available, downloaded and missing file counts")]
    Status(NameArgs),
    #[command(about = "Download missing files into a dataset")]
    Download(CountArgs),
    #[command(about = "Delete downloaded files from a dataset")]
    Delete(CountArgs),
    #[command(about = "Print the data list entries of a dataset")]
    Entries(NameArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Storage root holding lists/ and datasets/
    #[arg(long)]
    data_root: Option<String>,
}

#[derive(Args)]
struct AddArgs {
    name: String,
    url: String,
}

#[derive(Args)]
struct RemoveArgs {
    id: String,

    /// Also remove the dataset's data list when no other dataset uses it
    #[arg(long)]
    prune_list: bool,
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

#[derive(Args)]
struct CountArgs {
    name: String,
    count: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CollectorError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CollectorError) -> u8 {
    match error {
        err if err.is_not_found() => 2,
        CollectorError::MissingConfig(_) => 2,
        CollectorError::InvalidUrl(_)
        | CollectorError::TransferFailed { .. }
        | CollectorError::HttpClient(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config_path = ConfigLoader::path(cli.config.as_deref());

    if let Command::Init(args) = &cli.command {
        return run_init(args, &config_path, output_mode);
    }

    let config = ConfigLoader::load(&config_path)?;
    let remote = HttpRemoteClient::new(config.remote_settings())?;
    let app = App::open(config, config_path, remote)?;
    dispatch(cli.command, app, output_mode)
}

fn dispatch(
    command: Command,
    mut app: App<HttpRemoteClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let cancel = CancelToken::new();
    match command {
        Command::Init(_) => Ok(()),
        Command::Add(args) => {
            let result = app.add(&args.name, &args.url, &cancel)?;
            emit(output_mode, &result, TextOutput::print_add)
        }
        Command::Remove(args) => {
            let result = app.remove(&args.id, args.prune_list)?;
            emit(output_mode, &result, TextOutput::print_remove)
        }
        Command::Inspect => emit(output_mode, &app.inspect(), TextOutput::print_inspect),
        Command::Status(args) => {
            let result = app.status(&args.name)?;
            emit(output_mode, &result, TextOutput::print_status)
        }
        Command::Download(args) => {
            let result = match output_mode {
                OutputMode::Json => app.download(&args.name, args.count, &JsonOutput, &cancel)?,
                OutputMode::Text => {
                    let time = chrono::Local::now().format("%H:%M:%S");
                    let word = if args.count == 1 { "file" } else { "files" };
                    eprintln!("[{time}] Downloading {} new {word}", args.count);
                    app.download(&args.name, args.count, &ConsoleSink, &cancel)?
                }
            };
            emit(output_mode, &result, TextOutput::print_download)
        }
        Command::Delete(args) => {
            let result = app.delete(&args.name, args.count)?;
            emit(output_mode, &result, TextOutput::print_delete)
        }
        Command::Entries(args) => {
            let entries = app.entries(&args.name)?;
            emit(output_mode, &entries, |entries: &Vec<_>| {
                TextOutput::print_entries(entries)
            })
        }
    }
}

fn emit<T: serde::Serialize>(
    output_mode: OutputMode,
    value: &T,
    text: impl FnOnce(&T) -> std::io::Result<()>,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print(value).into_diagnostic(),
        OutputMode::Text => text(value).into_diagnostic(),
    }
}

fn run_init(
    args: &InitArgs,
    config_path: &camino::Utf8Path,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut config = if config_path.as_std_path().exists() {
        ConfigLoader::load(config_path)?
    } else {
        CollectorConfig::default()
    };
    if let Some(root) = &args.data_root {
        config.data_root = Some(camino::Utf8PathBuf::from(root.as_str()));
    }
    let store = config.store()?;
    let missing = store.missing_dirs();
    store.ensure_layout()?;
    ConfigLoader::save(config_path, &config)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print(&serde_json::json!({
            "config": config_path,
            "data_root": store.root(),
            "created": missing,
        }))
        .into_diagnostic(),
        OutputMode::Text => {
            for dir in &missing {
                println!("[*] Created {dir}");
            }
            println!("[*] Config written to {config_path}");
            Ok(())
        }
    }
}
