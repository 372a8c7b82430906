//! kaso - Scratch comment archive search CLI
//!
//! Main entry point for the kaso command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use kaso::acquire::{self, AcquireOutcome, FetchOptions};
use kaso::cache::ArchiveCache;
use kaso::config::Config;
use kaso::logging::{LogConfig, OperationGuard, init_logging};
use kaso::render::{
    CommentView, PageView, format_comment_line, format_compact, format_result_count,
    format_window, wrap_content, write_csv,
};
use kaso::search::PageWindow;
use kaso::stats::{CommentStats, DateRange};
use kaso::*;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load();

    let colors = !cli.no_color && config.output.colors;
    if !colors {
        colored::control::set_override(false);
    }
    let quiet = cli.quiet || config.output.quiet;
    init_logging(&LogConfig::from_flags(quiet, cli.verbose, colors).with_env_overrides());

    let ctx = AppContext::new(&cli, config, quiet);
    match run(&cli, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

/// Settings resolved from config file, environment and flags.
struct AppContext {
    config: Config,
    db_path: PathBuf,
    format: OutputFormat,
    quiet: bool,
    archives: ArchiveCache,
}

impl AppContext {
    fn new(cli: &Cli, config: Config, quiet: bool) -> Self {
        let db_path = cli.db.clone().unwrap_or_else(|| config.db_path());
        let format = cli.format.unwrap_or_else(|| {
            OutputFormat::from_config(&config.output.format).unwrap_or_default()
        });
        Self {
            config,
            db_path,
            format,
            quiet,
            archives: ArchiveCache::default(),
        }
    }

    fn open_storage(&self) -> kaso::Result<Storage> {
        Storage::open_existing(&self.db_path)
    }
}

fn run(cli: &Cli, ctx: &AppContext) -> Result<()> {
    match &cli.command {
        Commands::Fetch(args) => cmd_fetch(ctx, args),
        Commands::Import(args) => cmd_import(ctx, args),
        Commands::Search(args) => cmd_search(ctx, args),
        Commands::Show(args) => cmd_show(ctx, args),
        Commands::Stats(args) => cmd_stats(ctx, args),
        Commands::Repl(args) => cmd_repl(ctx, args),
        Commands::Config(args) => cmd_config(ctx, args),
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

fn report_error(err: &anyhow::Error) {
    if let Some(kaso_err) = err.downcast_ref::<KasoError>() {
        eprintln!("{}", format_error(&kaso_err.to_string(), kaso_err.suggestion()));
    } else {
        eprintln!("{} {err:#}", "Error:".red().bold());
    }
}

fn print_outcome(outcome: &AcquireOutcome, db_path: &Path) {
    match outcome {
        AcquireOutcome::AlreadyPresent => {
            println!(
                "Store already present at {} (use --force to download again).",
                db_path.display()
            );
        }
        AcquireOutcome::InstalledDatabase { bytes } => {
            println!(
                "  {} Installed SQLite store ({})",
                "✓".green(),
                format_bytes(u64::try_from(*bytes).unwrap_or(u64::MAX))
            );
        }
        AcquireOutcome::ImportedArchive { bytes, comments } => {
            println!(
                "  {} Imported {} comments ({})",
                "✓".green(),
                format_number_usize(*comments),
                format_bytes(u64::try_from(*bytes).unwrap_or(u64::MAX))
            );
        }
    }
}

fn cmd_fetch(ctx: &AppContext, args: &cli::FetchArgs) -> Result<()> {
    let source = &ctx.config.source;
    let url = args.url.as_deref().unwrap_or(&source.url);
    let opts = FetchOptions {
        timeout: Duration::from_secs(args.timeout.unwrap_or(source.timeout_secs)),
        sha256: args.sha256.clone().or_else(|| source.sha256.clone()),
        force: args.force,
        show_progress: !ctx.quiet,
    };

    if !ctx.quiet {
        println!("{}", "Fetching comment archive...".bold().cyan());
        println!("  Source: {url}");
        println!("  Store: {}", ctx.db_path.display());
    }

    let guard = OperationGuard::new("fetch");
    let outcome = guard.finish(acquire::ensure_store(url, &ctx.db_path, &opts))?;
    if !ctx.quiet {
        print_outcome(&outcome, &ctx.db_path);
    }
    Ok(())
}

fn cmd_import(ctx: &AppContext, args: &cli::ImportArgs) -> Result<()> {
    let guard = OperationGuard::new("import");
    let outcome = guard.finish(acquire::import_file(&args.file, &ctx.db_path, args.force))?;
    if !ctx.quiet {
        print_outcome(&outcome, &ctx.db_path);
    }
    Ok(())
}

fn build_engine(ctx: &AppContext, backend: Backend, source: Option<&Path>) -> Result<SearchEngine> {
    debug!(%backend, "building search engine");
    match backend {
        Backend::Sqlite => {
            if source.is_some() {
                anyhow::bail!("--source only applies to the memory backend");
            }
            Ok(SearchEngine::new(ctx.open_storage()?))
        }
        Backend::Memory => {
            let version = &ctx.config.source.version;
            let store = match source {
                Some(path) => ctx.archives.load_archive(path, version)?,
                None => ctx.archives.load_store(&ctx.db_path, version)?,
            };
            Ok(SearchEngine::new(store))
        }
    }
}

fn cmd_search(ctx: &AppContext, args: &cli::SearchArgs) -> Result<()> {
    let backend = args.backend.unwrap_or(ctx.config.search.backend);
    let engine = build_engine(ctx, backend, args.source.as_deref())?;
    let page_size = args.page_size.unwrap_or_else(|| ctx.config.page_size()).max(1);

    let query = Query::parse(args.user.as_deref(), args.query.as_deref());
    let (comments, window) = engine.search_page(&query, args.page, page_size)?;

    match ctx.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let view = PageView {
                query: query.to_string(),
                window,
                comments: comments.iter().map(CommentView::from).collect(),
            };
            print_json(&view, ctx.format)?;
        }
        OutputFormat::Csv => {
            write_csv(&mut io::stdout().lock(), &comments)?;
        }
        OutputFormat::Compact => {
            for c in &comments {
                println!("{}", format_compact(c, 100));
            }
        }
        OutputFormat::Text => print_text_page(&comments, &window),
    }

    Ok(())
}

fn print_text_page(comments: &[Comment], window: &PageWindow) {
    println!("{}", format_result_count(window.total_results).cyan());
    println!("{}", format_window(window).dimmed());
    println!();
    for c in comments {
        let line = format_comment_line(c);
        if c.is_reply {
            println!("  {}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let json = if matches!(format, OutputFormat::JsonPretty) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_show(ctx: &AppContext, args: &cli::ShowArgs) -> Result<()> {
    let storage = ctx.open_storage()?;
    let comments = if args.thread {
        storage.get_thread(args.id)?
    } else {
        storage.get_comment(args.id)?.into_iter().collect()
    };

    if comments.is_empty() {
        anyhow::bail!("Comment {} not found.", args.id);
    }

    match ctx.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let views: Vec<CommentView<'_>> = comments.iter().map(CommentView::from).collect();
            print_json(&views, ctx.format)?;
        }
        OutputFormat::Csv => write_csv(&mut io::stdout().lock(), &comments)?,
        OutputFormat::Compact => {
            for c in &comments {
                println!("{}", format_compact(c, 100));
            }
        }
        OutputFormat::Text if args.thread => {
            for c in &comments {
                println!("{}", format_comment_line(c));
            }
        }
        OutputFormat::Text => {
            for c in &comments {
                println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
                for line in wrap_content(c, CONTENT_DIVIDER_WIDTH) {
                    println!("{line}");
                }
                println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
                println!(
                    "  ID: {}  User: {}  Date: {}",
                    c.id.to_string().dimmed(),
                    c.user.green(),
                    c.datetime_raw.dimmed()
                );
                if let Some(parent) = c.parent_id {
                    println!("  Reply to: ID:{parent}");
                }
            }
        }
    }
    Ok(())
}

fn cmd_stats(ctx: &AppContext, args: &cli::StatsArgs) -> Result<()> {
    let range = DateRange::parse(args.since.as_deref(), args.until.as_deref())?;
    let storage = ctx.open_storage()?;
    let stats = CommentStats::compute(&storage.get_all_comments()?, range, args.top);

    match ctx.format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(&stats, ctx.format)?,
        OutputFormat::Csv => {
            let mut out = io::stdout().lock();
            writeln!(out, "date,count")?;
            for day in &stats.daily_counts {
                writeln!(out, "{},{}", day.date, day.count)?;
            }
        }
        OutputFormat::Text | OutputFormat::Compact => {
            print_stats_text(&stats, args.daily);
            let summary = storage.get_summary()?;
            if let (Some(first), Some(last)) = (summary.first_comment_at, summary.last_comment_at) {
                println!(
                    "  Archive spans {} to {}",
                    first.format("%Y-%m-%d").to_string().green(),
                    last.format("%Y-%m-%d").to_string().green()
                );
            }
        }
    }
    Ok(())
}

fn print_stats_text(stats: &CommentStats, daily: bool) {
    println!("{}", "Archive Statistics".bold().cyan());
    if stats.range.since.is_some() || stats.range.until.is_some() {
        let bound = |d: Option<chrono::NaiveDate>| d.map_or_else(|| "…".to_string(), |d| d.to_string());
        println!(
            "  Range: {} - {}",
            bound(stats.range.since),
            bound(stats.range.until)
        );
    }
    println!("{}", "─".repeat(40));
    println!("  {:<20} {:>10}", "Comments:", format_number(stats.total));
    println!("  {:<20} {:>10}", "Originals:", format_number(stats.originals));
    println!("  {:<20} {:>10}", "Replies:", format_number(stats.replies));
    println!("  {:<20} {:>9.2}%", "Reply rate:", stats.reply_rate);
    println!("{}", "─".repeat(40));

    if !stats.top_users.is_empty() {
        println!("{}", "Top users".bold());
        for (rank, user) in stats.top_users.iter().enumerate() {
            println!(
                "  {:>3}. {:<24} {:>8}",
                rank + 1,
                user.user,
                format_number(user.count)
            );
        }
    }

    if let Some(day) = stats.busiest_day() {
        println!(
            "  Busiest day: {} ({} comments)",
            day.date.to_string().green(),
            format_number(day.count)
        );
    }

    if daily {
        println!("{}", "Comments per day".bold());
        for day in &stats.daily_counts {
            println!("  {}  {:>8}", day.date, format_number(day.count));
        }
    }
}

fn cmd_repl(ctx: &AppContext, args: &cli::ReplArgs) -> Result<()> {
    let backend = args.backend.unwrap_or(ctx.config.search.backend);
    let engine = build_engine(ctx, backend, None)?;
    let history_path = ctx.config.data_dir().join("history");
    repl::run(engine, ctx.config.page_size(), history_path)
}

fn cmd_config(ctx: &AppContext, args: &cli::ConfigArgs) -> Result<()> {
    if args.path {
        match Config::user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine config directory"),
        }
    }

    if args.init {
        let path = Config::user_config_path().context("Could not determine config directory")?;
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        Config::default().save_to(&path)?;
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    if let Some(assignment) = &args.set {
        let (key, value) = assignment
            .split_once('=')
            .context("Expected key=value, e.g. search.page_size=100")?;
        let mut config = ctx.config.clone();
        config.set(key.trim(), value.trim())?;
        let path = config.save()?;
        println!("{} Set {} in {}", "✓".green(), key.trim(), path.display());
    }

    if args.show || !(args.path || args.init || args.set.is_some()) {
        println!("{}", "Current Configuration".bold().cyan());
        println!("  Store: {}", ctx.db_path.display());
        println!(
            "{}",
            anyhow::Context::context(toml::to_string_pretty(&ctx.config), "Failed to render configuration")?
        );
    }
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "kaso", &mut io::stdout());
}
