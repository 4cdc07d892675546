use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{ArgAction, Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use comfy_table::{ContentArrangement, Table};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};

mod cache;
mod config;
mod export;
mod html;
mod identify;
mod lab_dir;
mod report;
mod rules;
mod tanks;
mod workbook;
#[cfg(test)]
mod fixtures;

use cache::WorkbookCache;
use config::{LabSettings, TankSettings, TimeZone};
use report::{Orientation, ReportOptions};
use rules::MatchRules;
use workbook::{IngestError, IngestOptions, LoadedWorkbook, Source};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const NO_SHEETS_MSG: &str = "No sheets found in the workbook.";
const UPLOAD_NAME: &str = "upload.xlsx";

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "cdrdash",
    about = "CDR facility dashboard: lab-result workbooks, PDF reports and phycotank series",
    long_about = "Browse laboratory-result spreadsheets, export them as paginated PDF reports alongside the untouched original, and summarise phycotank sensor readings.",
    after_long_help = "Examples:\n  cdrdash lab list --details\n  cdrdash lab show data/lab_results/TP_EXAMPLE.xlsx --html preview.html\n  cdrdash lab export --all --out-dir reports\n  cat TP_1.xlsx | cdrdash lab export - --original-name TP_1.xlsx\n  cdrdash tanks show --tank PT-01 --metrics pH,lux --csv-out pt01.csv",
    color = ColorChoice::Auto
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, global = true)]
    config: Option<String>,
    /// Path to JSON alias rules (default ./rules.json)
    #[arg(long, global = true)]
    rules: Option<String>,
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
    #[arg(long, global = true)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false, global = true)]
    quiet: bool,
    #[arg(long, short = 'C', default_value_t = false, global = true)]
    no_color: bool,
    #[arg(long, default_value_t = false, global = true)]
    force_color: bool,
    #[arg(long, default_value_t = false, global = true)]
    progress: bool,
    /// `local`, `utc`, or an IANA zone name (default Europe/London)
    #[arg(long, global = true)]
    time_zone: Option<TimeZone>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Laboratory result workbooks
    #[command(subcommand)]
    Lab(LabCmd),
    /// Phycotank sensor readings
    #[command(subcommand)]
    Tanks(TanksCmd),
}

#[derive(Subcommand, Debug)]
enum LabCmd {
    /// List workbooks in the lab directory
    List(LabListArgs),
    /// Print one workbook sheet by sheet
    Show(LabShowArgs),
    /// Write the PDF report and the original file
    Export(LabExportArgs),
}

#[derive(Subcommand, Debug)]
enum TanksCmd {
    /// Tank tags present in the readings file
    List(TanksListArgs),
    /// Aggregated or single-tank series
    Show(TanksShowArgs),
}

#[derive(Args, Debug)]
struct LabListArgs {
    #[arg(long)]
    dir: Option<String>,
    #[arg(long, short = 'g')]
    glob: Option<String>,
    #[arg(long, short = 'r', default_value_t = false)]
    recursive: bool,
    /// Open each workbook to show sheet count and sample id
    #[arg(long, default_value_t = false)]
    details: bool,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
}

#[derive(Args, Debug)]
struct LabShowArgs {
    /// Workbook path, or `-` to read an upload from stdin
    file: Option<String>,
    /// File name for a stdin upload
    #[arg(long)]
    name: Option<String>,
    /// Only this sheet
    #[arg(long)]
    sheet: Option<String>,
    #[arg(long)]
    max_rows: Option<usize>,
    #[arg(long, default_value_t = 40)]
    cell_width: usize,
    #[arg(long, default_value_t = false)]
    no_truncate: bool,
    #[arg(long)]
    html: Option<String>,
    #[arg(long, value_enum, default_value = "dark")]
    theme: html::Theme,
    #[arg(long, default_value_t = false)]
    no_open: bool,
    /// Re-read the file even if an earlier load is cached
    #[arg(long, default_value_t = false)]
    reload: bool,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
}

#[derive(Args, Debug)]
struct LabExportArgs {
    /// Workbook paths, or `-` for a stdin upload
    files: Vec<String>,
    /// Export every workbook in the lab directory
    #[arg(long, default_value_t = false, conflicts_with = "files")]
    all: bool,
    #[arg(long)]
    dir: Option<String>,
    #[arg(long, default_value = ".")]
    out_dir: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    row_cap: Option<usize>,
    #[arg(long, value_enum)]
    orientation: Option<Orientation>,
    #[arg(long, conflicts_with = "no_logo")]
    logo: Option<String>,
    #[arg(long, default_value_t = false)]
    no_logo: bool,
    #[arg(long)]
    footer: Option<String>,
    #[arg(long, default_value_t = false)]
    no_original: bool,
    /// Name for the original copy (single input only)
    #[arg(long)]
    original_name: Option<String>,
    #[arg(long, default_value_t = false)]
    strict_encoding: bool,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
}

#[derive(Args, Debug)]
struct TanksListArgs {
    #[arg(long)]
    csv: Option<String>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
}

#[derive(Args, Debug)]
struct TanksShowArgs {
    #[arg(long)]
    csv: Option<String>,
    #[arg(long, conflicts_with = "aggregate")]
    tank: Option<String>,
    /// Mean across all tanks per timestamp (default)
    #[arg(long, default_value_t = false)]
    aggregate: bool,
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    metrics: Vec<String>,
    #[arg(long, short = 'n')]
    limit: Option<usize>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    #[arg(long)]
    csv_out: Option<String>,
}

/// Per-invocation state: merged settings plus the workbook cache shared by every load.
struct Session {
    lab: LabSettings,
    tanks: TankSettings,
    rules: MatchRules,
    cache: WorkbookCache,
    progress: bool,
    quiet: bool,
}

impl Session {
    fn load(&mut self, source: &Source) -> Result<Arc<LoadedWorkbook>, IngestError> {
        let pb = self.spinner(format!("Reading {}", source.display_name()));
        let res = self.cache.get_or_load(source);
        if let Some(pb) = pb { pb.finish_and_clear(); }
        res
    }

    fn spinner(&self, msg: String) -> Option<indicatif::ProgressBar> {
        if !self.progress || self.quiet { return None; }
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_message(msg);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", paint("error:", "1;31"), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(sh) = cli.completions {
        let mut cmd = Cli::command();
        match cli.completions_out.as_ref() {
            Some(path) => {
                let mut f = std::fs::File::create(path).with_context(|| format!("cannot create {}", path))?;
                clap_complete::generate(sh, &mut cmd, "cdrdash", &mut f);
            }
            None => clap_complete::generate(sh, &mut cmd, "cdrdash", &mut std::io::stdout()),
        }
        return Ok(());
    }
    init_logger(&cli);
    let app_cfg = config::load_config(cli.config.as_deref()).unwrap_or_default();

    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let force_color = cli.force_color || app_cfg.force_color.unwrap_or(false);
    let _ = ENABLE_COLOR.set(if force_color { true } else { color_default && !cli.no_color });

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let mut lab = LabSettings::default();
    if let Some(c) = app_cfg.lab { lab.apply(c); }
    if let Some(tz) = cli.time_zone { lab.time_zone = tz; }
    if let Some(r) = cli.rules { lab.rules = Some(r); }
    let mut tank_settings = TankSettings::default();
    if let Some(c) = app_cfg.tanks { tank_settings.apply(c); }
    let rules = rules::load_rules(lab.rules.as_deref()).map(|c| MatchRules::from_config(&c)).unwrap_or_default();
    let mut session = Session {
        cache: WorkbookCache::new(IngestOptions { numeric_share: lab.numeric_share }),
        lab,
        tanks: tank_settings,
        rules,
        progress: cli.progress || app_cfg.progress.unwrap_or(false),
        quiet: cli.quiet,
    };

    match command {
        Command::Lab(LabCmd::List(a)) => lab_list(&mut session, a),
        Command::Lab(LabCmd::Show(a)) => lab_show(&mut session, a),
        Command::Lab(LabCmd::Export(a)) => lab_export(&mut session, a),
        Command::Tanks(TanksCmd::List(a)) => tanks_list(&session, a),
        Command::Tanks(TanksCmd::Show(a)) => tanks_show(&mut session, a),
    }
}

fn init_logger(cli: &Cli) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = cli.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if cli.verbose > 0 {
        let f = if cli.verbose >= 3 { log::LevelFilter::Trace } else if cli.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    match cli.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                use std::io::Write;
                let obj = serde_json::json!({
                    "ts": chrono::Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        Some(LogFormat::Text) => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(buf, "[{:<5} {}] {}", record.level(), chrono::Local::now().format("%H:%M:%S"), record.args())
            });
        }
        None => {}
    }
    if let Some(path) = cli.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => eprintln!("Failed to open log file {}: {}", path, e),
        }
    }
    builder.init();
}

/// A workbook without sheets is a notice for the caller to print, not a failure.
fn skip_no_sheets<T>(res: Result<T, IngestError>) -> Result<Option<T>, IngestError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(IngestError::NoSheets { name }) => { log::info!("'{}' has no sheets", name); Ok(None) }
        Err(e) => Err(e),
    }
}

/// `-` reads an upload from stdin; no argument falls back to the configured default workbook.
fn resolve_source(arg: Option<&str>, name: Option<&str>, default: &Path) -> anyhow::Result<Source> {
    match arg {
        Some("-") => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes).context("reading workbook from stdin")?;
            if bytes.is_empty() { bail!("no data on stdin"); }
            Ok(Source::Upload { name: name.unwrap_or(UPLOAD_NAME).to_string(), bytes })
        }
        Some(p) => Ok(Source::Path(PathBuf::from(p))),
        None => Ok(Source::Path(default.to_path_buf())),
    }
}

#[derive(Serialize)]
struct ListRow {
    name: String,
    path: PathBuf,
    size: u64,
    modified: Option<String>,
    sheets: Option<usize>,
    sample_id: Option<String>,
    error: Option<String>,
}

fn lab_list(session: &mut Session, args: LabListArgs) -> anyhow::Result<()> {
    let dir = args.dir.map(PathBuf::from).unwrap_or_else(|| session.lab.dir.clone());
    let files = lab_dir::list_workbooks(&dir, args.glob.as_deref(), args.recursive)?;
    let mut rows = Vec::with_capacity(files.len());
    for f in files {
        let modified = f.modified.map(|t| chrono::DateTime::<chrono::Local>::from(t).format("%Y-%m-%d %H:%M").to_string());
        let mut row = ListRow { name: f.name, path: f.path, size: f.size, modified, sheets: None, sample_id: None, error: None };
        if args.details {
            match session.load(&Source::Path(row.path.clone())) {
                Ok(lw) => {
                    row.sheets = Some(lw.workbook.sheets.len());
                    row.sample_id = identify::extract_identifier(&lw.workbook, &session.rules).map(|i| i.value);
                }
                Err(IngestError::NoSheets { .. }) => row.sheets = Some(0),
                Err(e) => { log::warn!("{}", e); row.error = Some(e.to_string()); }
            }
        }
        rows.push(row);
    }
    match args.output {
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFmt::Text => {
            if rows.is_empty() {
                println!("No workbooks found in {}", dir.to_string_lossy());
                return Ok(());
            }
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            if args.details { table.set_header(vec!["File", "Size", "Modified", "Sheets", "Sample ID"]); } else { table.set_header(vec!["File", "Size", "Modified"]); }
            for r in &rows {
                let mut cells = vec![r.name.clone(), human_size(r.size), r.modified.clone().unwrap_or_else(|| "-".into())];
                if args.details {
                    cells.push(r.sheets.map(|n| n.to_string()).unwrap_or_else(|| "-".into()));
                    cells.push(match (&r.sample_id, &r.error) {
                        (Some(id), _) => id.clone(),
                        (None, Some(e)) => paint(&truncate(e, 48), "31"),
                        (None, None) => "-".into(),
                    });
                }
                table.add_row(cells);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SheetView<'a> {
    name: &'a str,
    rows: usize,
    columns: Vec<&'a str>,
    data: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct WorkbookView<'a> {
    file: &'a str,
    size: usize,
    identifier: Option<&'a identify::Identifier>,
    pdf_name: String,
    sheets: Vec<SheetView<'a>>,
}

fn lab_show(session: &mut Session, args: LabShowArgs) -> anyhow::Result<()> {
    let source = resolve_source(args.file.as_deref(), args.name.as_deref(), &session.lab.default_file)?;
    if args.reload {
        match &source {
            Source::Path(p) => { session.cache.invalidate_path(p); }
            Source::Upload { .. } => { session.cache.invalidate(&cache::CacheKey::for_source(&source)?); }
        }
    }
    let Some(lw) = skip_no_sheets(session.load(&source))? else {
        println!("{}", NO_SHEETS_MSG);
        return Ok(());
    };
    let identifier = identify::extract_identifier(&lw.workbook, &session.rules);
    let sheets: Vec<&workbook::Sheet> = match args.sheet.as_deref() {
        Some(name) => vec![lw.workbook.sheet(name).with_context(|| format!("no sheet named '{}'", name))?],
        None => lw.workbook.sheets.iter().collect(),
    };

    if let Some(path) = args.html.as_ref() {
        let page = html::render_workbook_html(&lw, identifier.as_ref(), args.theme, args.max_rows, &session.lab.footer);
        std::fs::write(path, page).with_context(|| format!("HTML write failed for {}", path))?;
        if !args.no_open { open_file_default(PathBuf::from(path)); }
        if !session.quiet { println!("{}", paint(&format!("HTML generated: {}", path), "1;36")); }
    }

    match args.output {
        OutputFmt::Json => {
            let view = WorkbookView {
                file: &lw.source.name,
                size: lw.source.bytes.len(),
                identifier: identifier.as_ref(),
                pdf_name: identify::pdf_filename(identifier.as_ref()),
                sheets: sheets.iter().map(|s| {
                    let shown = args.max_rows.map_or(s.rows(), |m| m.min(s.rows()));
                    SheetView { name: &s.name, rows: s.rows(), columns: s.column_names(), data: (0..shown).map(|r| s.row_texts(r)).collect() }
                }).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        OutputFmt::Text => {
            match lw.source.path.as_ref() {
                Some(p) => println!("{} {} ({})", paint("File:", "1"), lw.source.name, p.to_string_lossy()),
                None => println!("{} {} (upload, {})", paint("File:", "1"), lw.source.name, human_size(lw.source.bytes.len() as u64)),
            }
            match identifier.as_ref() {
                Some(id) => println!("{} {} (sheet '{}')", paint("Sample ID:", "1"), paint(&id.value, "1;32"), id.sheet),
                None => println!("{} {}", paint("Sample ID:", "1"), paint("not found", "33")),
            }
            println!("{} {}", paint("Report:", "1"), identify::pdf_filename(identifier.as_ref()));
            let width = if args.no_truncate { None } else { Some(args.cell_width) };
            for sheet in sheets {
                println!();
                println!("{}", paint(&format!("Sheet: {} ({} rows)", sheet.name, sheet.rows()), "1;36"));
                if sheet.coerced_cells() > 0 { println!("{}", paint(&format!("{} non-numeric value(s) in numeric columns shown as empty", sheet.coerced_cells()), "33")); }
                print_sheet(sheet, args.max_rows, width);
            }
        }
    }
    Ok(())
}

fn print_sheet(sheet: &workbook::Sheet, max_rows: Option<usize>, width: Option<usize>) {
    if sheet.is_empty() {
        println!("{}", report::EMPTY_NOTICE);
        return;
    }
    let shown = max_rows.map_or(sheet.rows(), |m| m.min(sheet.rows()));
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(sheet.column_names());
    for r in 0..shown {
        table.add_row(sheet.row_texts(r).into_iter().map(|c| match width { Some(w) => truncate(&c, w), None => c }));
    }
    println!("{}", table);
    if shown < sheet.rows() { println!("Showing first {} of {} rows.", shown, sheet.rows()); }
}

fn report_options(lab: &LabSettings, args: &LabExportArgs) -> ReportOptions {
    let logo = if args.no_logo { None } else { args.logo.as_ref().map(PathBuf::from).or_else(|| lab.logo.clone()) };
    ReportOptions {
        title: args.title.clone().unwrap_or_else(|| lab.title.clone()),
        orientation: args.orientation.unwrap_or(lab.orientation),
        row_cap: args.row_cap.unwrap_or(lab.row_cap),
        footer: args.footer.clone().unwrap_or_else(|| lab.footer.clone()),
        logo,
        generated_at: Utc::now(),
        time_zone: lab.time_zone,
        strict_encoding: args.strict_encoding || lab.strict_encoding,
        compress: true,
    }
}

fn lab_export(session: &mut Session, args: LabExportArgs) -> anyhow::Result<()> {
    let sources: Vec<Source> = if args.all {
        let dir = args.dir.as_ref().map(PathBuf::from).unwrap_or_else(|| session.lab.dir.clone());
        lab_dir::list_workbooks(&dir, None, false)?.into_iter().map(|f| Source::Path(f.path)).collect()
    } else if args.files.is_empty() {
        vec![Source::Path(session.lab.default_file.clone())]
    } else {
        if args.files.iter().filter(|f| f.as_str() == "-").count() > 1 { bail!("stdin can only be read once"); }
        args.files.iter().map(|f| resolve_source(Some(f.as_str()), args.original_name.as_deref(), &session.lab.default_file)).collect::<anyhow::Result<_>>()?
    };
    if sources.is_empty() { bail!("no workbooks to export"); }
    if sources.len() > 1 && args.original_name.is_some() { bail!("--original-name needs exactly one input"); }

    let mut exporter = export::Exporter::new(export::ExportOptions {
        out_dir: PathBuf::from(&args.out_dir),
        report: report_options(&session.lab, &args),
        include_original: !args.no_original,
        original_name: args.original_name.clone(),
    });
    let mut summaries = Vec::new();
    let mut failed = 0usize;
    for source in &sources {
        let lw = match skip_no_sheets(session.load(source)) {
            Ok(Some(lw)) => lw,
            Ok(None) => { println!("{}: {}", source.display_name(), NO_SHEETS_MSG); continue; }
            Err(e) => { log::error!("{}", e); failed += 1; continue; }
        };
        let pb = session.spinner(format!("Rendering {}", lw.source.name));
        let res = exporter.export(&lw, &session.rules);
        if let Some(pb) = pb { pb.finish_and_clear(); }
        match res {
            Ok(s) => summaries.push(s),
            Err(e) => { log::error!("{}: {}", lw.source.name, e); failed += 1; }
        }
    }
    let stats = session.cache.stats();
    if !session.cache.is_empty() { log::debug!("Workbook cache: {} hit(s), {} miss(es), {} entr(ies)", stats.hits, stats.misses, session.cache.len()); }

    match args.output {
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFmt::Text => if !session.quiet {
            for s in &summaries {
                println!("{}", paint(&format!("PDF written: {} ({} page(s))", s.pdf_path.to_string_lossy(), s.page_count), "1;36"));
                if let Some(p) = s.original_path.as_ref() { println!("{}", paint(&format!("Original written: {}", p.to_string_lossy()), "36")); }
                if s.identifier.is_none() { println!("  {}", paint(&format!("{}: no sample id, used fallback name", s.source), "33")); }
                for t in &s.truncated {
                    println!("  {}", paint(&format!("Sheet '{}' truncated: showing first {} of {} rows", t.sheet, t.printed_rows, t.total_rows), "33"));
                }
                if !s.logo_drawn && exporter.options().report.logo.is_some() { println!("  {}", paint("Logo unavailable; report written without it", "33")); }
            }
        },
    }
    if failed > 0 { bail!("{} of {} export(s) failed", failed, sources.len()); }
    Ok(())
}

fn tank_csv(settings: &TankSettings, arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from).unwrap_or_else(|| settings.csv.clone())
}

fn tanks_list(session: &Session, args: TanksListArgs) -> anyhow::Result<()> {
    let path = tank_csv(&session.tanks, args.csv.as_ref());
    let table = tanks::load_readings(&path, &session.tanks.series).with_context(|| format!("loading {}", path.to_string_lossy()))?;
    let ids = table.tank_ids();
    match args.output {
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
        OutputFmt::Text => {
            for id in &ids { println!("{}", id); }
            if !session.quiet { eprintln!("{} tank(s), {} reading(s), {} row(s) skipped", ids.len(), table.readings().len(), table.skipped()); }
        }
    }
    Ok(())
}

fn tanks_show(session: &mut Session, args: TanksShowArgs) -> anyhow::Result<()> {
    let path = tank_csv(&session.tanks, args.csv.as_ref());
    if !args.metrics.is_empty() { session.tanks.series.metrics = args.metrics.clone(); }
    let table = tanks::load_readings(&path, &session.tanks.series).with_context(|| format!("loading {}", path.to_string_lossy()))?;
    let series = match args.tank.as_deref() {
        Some(tank) => table.tank_series(tank, &[])?,
        None => table.aggregate(&[])?,
    };
    if let Some(out) = args.csv_out.as_ref() {
        let f = std::fs::File::create(out).with_context(|| format!("cannot create {}", out))?;
        series.write_csv(f)?;
        if !session.quiet { println!("{}", paint(&format!("CSV written: {}", out), "1;36")); }
    }
    match args.output {
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&series)?),
        OutputFmt::Text => {
            println!("{}", paint(&format!("{} ({} point(s))", series.label, series.points.len()), "1;36"));
            let mut t = Table::new();
            t.set_content_arrangement(ContentArrangement::Dynamic);
            let mut header = vec!["Timestamp".to_string()];
            header.extend(series.metrics.iter().map(|m| tanks::metric_label(m)));
            t.set_header(header);
            let shown = args.limit.map_or(series.points.len(), |n| n.min(series.points.len()));
            for p in &series.points[..shown] {
                let mut row = vec![p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
                row.extend(p.values.iter().map(|v| v.map(|x| workbook::format_number((x * 1000.0).round() / 1000.0)).unwrap_or_default()));
                t.add_row(row);
            }
            println!("{}", t);
            if shown < series.points.len() { println!("Showing first {} of {} points.", shown, series.points.len()); }
        }
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1 << 20 { format!("{:.1} MiB", bytes as f64 / (1 << 20) as f64) } else if bytes >= 1 << 10 { format!("{:.1} KiB", bytes as f64 / 1024.0) } else { format!("{} B", bytes) }
}

fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&true) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(target_os = "windows")]
fn open_file_default(p: PathBuf) {
    let s = p.to_string_lossy().into_owned();
    let _ = std::process::Command::new("explorer").arg(&s).spawn()
        .or_else(|_| std::process::Command::new("cmd").args(["/C", "start", "", &s]).spawn())
        .map_err(|e| log::error!("Failed to open file {}: {}", s, e));
}

#[cfg(not(target_os = "windows"))]
fn open_file_default(p: PathBuf) {
    let s = p.to_string_lossy().into_owned();
    let _ = std::process::Command::new("xdg-open").arg(&s).spawn().map_err(|e| log::error!("Failed to open file {}: {}", s, e));
}
