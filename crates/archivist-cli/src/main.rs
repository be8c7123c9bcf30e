use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use archivist_core::service::ExtractionService;
use archivist_core::service::openai::OpenAiService;
use archivist_core::{Config, ContentMode, MetadataExtractor, ProgressEvent, config_file};
use archivist_ingest::{
    ConversionSettings, ConverterChain, DocumentPreparer, InputSource, convert_directory, discover,
};
use archivist_reporting::{SinkTarget, open_sink};

mod logging;
mod output;
mod run;

use output::ColorMode;

/// Archivist - extract archival metadata from documents with a language model
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("input").required(true).args(["file", "folder"])))]
#[command(group(ArgGroup::new("sink").required(true).args(["csv_file", "json_file"])))]
struct RunArgs {
    /// Process a single document
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Process every supported document in a folder (top level only)
    #[arg(short = 'd', long)]
    folder: Option<PathBuf>,

    /// Append records to this CSV file
    #[arg(short = 'c', long)]
    csv_file: Option<PathBuf>,

    /// Append records to this JSON file
    #[arg(short = 'j', long)]
    json_file: Option<PathBuf>,

    /// Pages kept from the start of each document (0 = no limit)
    #[arg(short = 'p', long)]
    first: Option<usize>,

    /// Pages kept from the end of each document (0 = no limit)
    #[arg(short = 'l', long)]
    last: Option<usize>,

    /// What the service receives: extracted `text` or the PDF `file`
    #[arg(long)]
    mode: Option<ContentMode>,

    /// Field context JSON replacing the built-in one
    #[arg(long)]
    context: Option<PathBuf>,

    /// Fields to request in addition to the context defaults (names or columns)
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Fields not to request (names or columns)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Documents processed concurrently
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Also OCR image originals with tesseract
    #[arg(long)]
    ocr: bool,

    /// Model name
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Config file to use instead of the platform/CWD cascade
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More log output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every convertible file in a directory to PDF
    Convert {
        /// Directory holding the documents
        dir: PathBuf,
    },

    /// Convert a JSON metadata file to CSV
    ToCsv {
        /// JSON file written by a previous run
        json_file: PathBuf,

        /// CSV file to create
        csv_file: Option<PathBuf>,

        /// Value for every dc:format column
        #[arg(long)]
        format: Option<String>,

        /// Print a summary of the JSON file instead of converting
        #[arg(long)]
        summary: bool,

        /// Field context that defines the columns
        #[arg(long)]
        context: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.common.verbose, cli.common.log_file.as_deref())?;

    let color = ColorMode(!cli.common.no_color && std::io::stdout().is_terminal());
    let file = match &cli.common.config {
        Some(path) => config_file::load_from_path(path)
            .ok_or_else(|| anyhow::anyhow!("cannot load config file {}", path.display()))?,
        None => config_file::load_config(),
    };
    let mut config = Config::from_sources(&file, |key| std::env::var(key).ok())?;

    match cli.command {
        Some(Command::Convert { dir }) => convert(&dir, &config, color).await,
        Some(Command::ToCsv {
            json_file,
            csv_file,
            format,
            summary,
            context,
        }) => {
            if context.is_some() {
                config.context_path = context;
            }
            to_csv(&json_file, csv_file, format, summary, &config, color)
        }
        None => {
            apply_run_args(&mut config, &cli.run);
            extract(&cli.run, config, color).await
        }
    }
}

/// CLI flags override every other source.
fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(first) = args.first {
        config.first_pages = first;
    }
    if let Some(last) = args.last {
        config.last_pages = last;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.context.is_some() {
        config.context_path = args.context.clone();
    }
    if !args.include.is_empty() {
        config.include = args.include.clone();
    }
    if !args.exclude.is_empty() {
        config.exclude = args.exclude.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if args.ocr {
        config.ocr = true;
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
}

fn sink_target(args: &RunArgs) -> anyhow::Result<SinkTarget> {
    match (&args.csv_file, &args.json_file) {
        (Some(csv), None) => Ok(SinkTarget::Csv(csv.clone())),
        (None, Some(json)) => Ok(SinkTarget::Json(json.clone())),
        _ => anyhow::bail!("exactly one of --csv-file or --json-file is required"),
    }
}

fn input_source(args: &RunArgs) -> anyhow::Result<InputSource> {
    match (&args.file, &args.folder) {
        (Some(file), None) => Ok(InputSource::File(file.clone())),
        (None, Some(folder)) => Ok(InputSource::Folder(folder.clone())),
        _ => anyhow::bail!("exactly one of --file or --folder is required"),
    }
}

async fn extract(args: &RunArgs, config: Config, color: ColorMode) -> anyhow::Result<ExitCode> {
    // Configuration problems are fatal before any document is touched.
    let api_key = config.require_api_key()?.to_string();
    let service = OpenAiService::new(
        api_key,
        config.model.clone(),
        config.base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );
    tracing::debug!(model = service.model(), "extraction service ready");
    let preparer = DocumentPreparer::from_config(&config)?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    run_extraction(args, &config, Arc::new(service), preparer, cancel, color).await
}

/// Discover, open the sink and run the pipeline. Exits with failure only
/// when there is nothing to process; per-document failures are reported in
/// the summary.
async fn run_extraction(
    args: &RunArgs,
    config: &Config,
    service: Arc<dyn ExtractionService>,
    preparer: DocumentPreparer,
    cancel: CancellationToken,
    color: ColorMode,
) -> anyhow::Result<ExitCode> {
    let context = Arc::new(config.load_field_context()?);
    tracing::debug!(?config, fields = context.len(), "configuration resolved");

    let source = input_source(args)?;
    let target = sink_target(args)?;

    let files = discover(&source)?;
    if files.is_empty() {
        eprintln!("No supported files found to process");
        return Ok(ExitCode::FAILURE);
    }

    let mut sink = open_sink(&target, &context)?;
    let extractor = MetadataExtractor::new(service, Arc::clone(&context));
    let pipeline = run::Pipeline::new(Arc::new(preparer), Arc::new(extractor), config.workers);

    let bar = if color.enabled() {
        let bar = ProgressBar::new(files.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let progress = {
        let bar = bar.clone();
        move |event: ProgressEvent| {
            let mut line = Vec::new();
            if output::print_progress(&mut line, &event, color).is_ok() && !line.is_empty() {
                let text = String::from_utf8_lossy(&line);
                if bar.is_hidden() {
                    print!("{text}");
                } else {
                    bar.println(text.trim_end());
                }
            }
            if matches!(
                event,
                ProgressEvent::Failed { .. }
                    | ProgressEvent::Stage {
                        stage: archivist_core::DocumentStage::Written,
                        ..
                    }
            ) {
                bar.inc(1);
            }
        }
    };

    let report = pipeline.run(files, sink.as_mut(), &progress, cancel).await;
    bar.finish_and_clear();

    let mut stdout = std::io::stdout();
    output::print_run_summary(&mut stdout, &report, target.path(), color)?;
    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}

async fn convert(dir: &Path, config: &Config, color: ColorMode) -> anyhow::Result<ExitCode> {
    let chain = ConverterChain::standard(&ConversionSettings::from_config(config));
    tracing::info!(converters = ?chain.names(), "converting directory");
    let result = convert_directory(dir, &chain).await?;

    let mut stdout = std::io::stdout();
    output::print_conversion_summary(&mut stdout, dir, &result, color)?;
    Ok(ExitCode::SUCCESS)
}

fn to_csv(
    json_file: &Path,
    csv_file: Option<PathBuf>,
    format: Option<String>,
    summary: bool,
    config: &Config,
    color: ColorMode,
) -> anyhow::Result<ExitCode> {
    let mut stdout = std::io::stdout();
    if summary {
        let summary = archivist_reporting::summarize(json_file)?;
        output::print_json_summary(&mut stdout, json_file, &summary, color)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(csv_file) = csv_file else {
        anyhow::bail!("a CSV output file is required unless --summary is given");
    };
    let context = config.load_field_context()?;
    let export =
        archivist_reporting::json_to_csv(json_file, &csv_file, &context, format.as_deref())?;
    output::print_export(&mut stdout, &csv_file, &export, color)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    use archivist_core::service::mock::MockService;
    use archivist_core::{BackendError, PdfBackend};
    use archivist_ingest::PrepareOptions;
    use archivist_ingest::convert::TextRenderer;

    struct StubBackend;

    impl PdfBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn extract_text(&self, _path: &Path) -> Result<String, BackendError> {
            Ok("Annual report of the council".to_string())
        }
    }

    fn stub_preparer() -> DocumentPreparer {
        DocumentPreparer::new(
            ConverterChain::new(vec![Box::new(TextRenderer)]),
            Arc::new(StubBackend),
            PrepareOptions::default(),
        )
    }

    fn folder_run(folder: &Path, json: &Path) -> Cli {
        parse(&[
            "-d",
            folder.to_str().unwrap(),
            "-j",
            json.to_str().unwrap(),
        ])
        .unwrap()
    }

    async fn run_with_mock(cli: &Cli, mock: Arc<MockService>) -> anyhow::Result<ExitCode> {
        run_extraction(
            &cli.run,
            &Config::default(),
            mock,
            stub_preparer(),
            CancellationToken::new(),
            ColorMode(false),
        )
        .await
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("archivist").chain(args.iter().copied()))
    }

    #[test]
    fn run_needs_an_input_and_a_sink() {
        assert!(parse(&["-f", "a.pdf"]).is_err());
        assert!(parse(&["-c", "out.csv"]).is_err());
        assert!(parse(&["-f", "a.pdf", "-c", "out.csv"]).is_ok());
    }

    #[test]
    fn inputs_and_sinks_are_exclusive() {
        assert!(parse(&["-f", "a.pdf", "-d", "docs", "-c", "out.csv"]).is_err());
        assert!(parse(&["-d", "docs", "-c", "out.csv", "-j", "out.json"]).is_err());
    }

    #[test]
    fn run_flags_override_config() {
        let cli = parse(&[
            "-d", "docs", "-j", "out.json", "-p", "3", "-l", "2", "--mode", "file", "--exclude",
            "Description,dc:language", "-w", "4",
        ])
        .unwrap();
        let mut config = Config::default();
        apply_run_args(&mut config, &cli.run);
        assert_eq!(config.first_pages, 3);
        assert_eq!(config.last_pages, 2);
        assert_eq!(config.mode, ContentMode::File);
        assert_eq!(config.exclude, ["Description", "dc:language"]);
        assert_eq!(config.workers, 4);
        assert!(matches!(input_source(&cli.run).unwrap(), InputSource::Folder(_)));
        assert!(matches!(sink_target(&cli.run).unwrap(), SinkTarget::Json(_)));
    }

    #[test]
    fn unset_flags_leave_config_alone() {
        let cli = parse(&["-f", "a.pdf", "-c", "out.csv"]).unwrap();
        let mut config = Config {
            first_pages: 6,
            workers: 2,
            ..Default::default()
        };
        apply_run_args(&mut config, &cli.run);
        assert_eq!(config.first_pages, 6);
        assert_eq!(config.workers, 2);
        assert_eq!(config.mode, ContentMode::Text);
    }

    #[test]
    fn subcommands_need_no_run_arguments() {
        let cli = parse(&["convert", "docs"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Convert { .. })));

        let cli = parse(&["to-csv", "meta.json", "meta.csv", "--format", "pdf"]).unwrap();
        match cli.command {
            Some(Command::ToCsv {
                csv_file, format, summary, ..
            }) => {
                assert_eq!(csv_file, Some(PathBuf::from("meta.csv")));
                assert_eq!(format.as_deref(), Some("pdf"));
                assert!(!summary);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_folder_fails_without_creating_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        let json = dir.path().join("out.json");
        let mock = Arc::new(MockService::replying("{}"));

        let code = run_with_mock(&folder_run(&docs, &json), mock.clone())
            .await
            .unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(!json.exists());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_stops_before_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("out.json");
        let cli = folder_run(&dir.path().join("no-such-folder"), &json);

        let err = extract(&cli.run, Config::default(), ColorMode(false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"), "{err}");
        assert!(!json.exists());
    }

    #[tokio::test]
    async fn failed_documents_do_not_change_the_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("minutes.txt"), "Council minutes").unwrap();
        // Nothing in the stub chain converts spreadsheets.
        std::fs::write(docs.join("budget.xlsx"), b"x").unwrap();
        let json = dir.path().join("out.json");
        let mock = Arc::new(MockService::replying(r#"{"Title": "Minutes"}"#));

        let code = run_with_mock(&folder_run(&docs, &json), mock.clone())
            .await
            .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(mock.call_count(), 1);
        let records = archivist_reporting::MetadataFile::load(&json).unwrap().metadata;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].asset_id, "minutes.txt");
    }

    #[test]
    fn to_csv_without_output_needs_summary() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("meta.json");
        std::fs::write(&json, r#"{"metadata": [], "total_records": 0}"#).unwrap();
        let config = Config::default();

        assert!(to_csv(&json, None, None, false, &config, ColorMode(false)).is_err());
        assert!(to_csv(&json, None, None, true, &config, ColorMode(false)).is_ok());
    }
}
