//! Interactive REPL for kaso.
//!
//! A command-driven shell over one [`SearchSession`]: a search replaces the
//! result list and returns to page 1, and page commands move through the
//! stored results without searching again.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, EditMode, Editor};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::render::{format_comment_line, format_result_count, format_window};
use crate::search::PageWindow;
use crate::stats::{CommentStats, DateRange, DEFAULT_TOP_USERS};
use crate::{Query, SearchEngine, SearchSession};

/// REPL session state.
pub struct ReplSession {
    engine: SearchEngine,
    session: SearchSession,
    author: Option<String>,
    text: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Search { text: Option<String> },
    User { author: Option<String> },
    Page { page: usize },
    Next,
    Prev,
    Stats,
    Help { command: Option<String> },
    Quit,
}

/// Run the REPL session until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if readline setup, history persistence, or terminal IO fails.
pub fn run(engine: SearchEngine, page_size: usize, history_path: PathBuf) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;
    if rl.load_history(&history_path).is_err() {
        debug!(path = %history_path.display(), "no REPL history yet");
    }

    let mut session = ReplSession::new(engine, page_size);

    info!("Starting kaso REPL session");
    println!(
        "{}",
        "kaso interactive mode. Type 'help' for commands, 'quit' to exit.".cyan()
    );
    println!();

    let mut stdout = std::io::stdout();
    loop {
        let prompt = session.format_prompt();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if !matches!(line, "quit" | "exit" | "q") {
                    rl.add_history_entry(line)?;
                }

                debug!(command = %line, "REPL command");
                match session.execute(line, &mut stdout) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "REPL command failed");
                        eprintln!("{}: {e}", "Error".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("Readline failed");
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rl.save_history(&history_path)?;
    info!("Ended kaso REPL session");
    println!("Goodbye!");
    Ok(())
}

impl ReplSession {
    #[must_use]
    pub const fn new(engine: SearchEngine, page_size: usize) -> Self {
        Self {
            engine,
            session: SearchSession::new(page_size),
            author: None,
            text: None,
        }
    }

    fn format_prompt(&self) -> String {
        if !self.session.has_results() {
            return "kaso> ".to_string();
        }
        let paginator = self.session.paginator();
        format!(
            "kaso [{} | {}/{}]> ",
            paginator.len(),
            self.session.current_page_number(),
            paginator.total_pages()
        )
    }

    /// Run one command line, writing its output to `out`.
    /// Returns `Ok(false)` when the session should end.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands, bad arguments, or store failures.
    pub fn execute(&mut self, input: &str, out: &mut impl Write) -> Result<bool> {
        match parse_command(input)? {
            Command::Search { text } => {
                self.text = text;
                self.run_search(out)?;
            }
            Command::User { author } => {
                self.author = author;
                self.run_search(out)?;
            }
            Command::Page { page } => {
                self.require_results()?;
                let target = self.session.clamp_page(page);
                if target != page {
                    writeln!(out, "{}", format!("(page {page} clamped to {target})").dimmed())?;
                }
                self.session.goto(target)?;
                self.print_page(out)?;
            }
            Command::Next => {
                self.require_results()?;
                self.session.next_page()?;
                self.print_page(out)?;
            }
            Command::Prev => {
                self.require_results()?;
                self.session.prev_page()?;
                self.print_page(out)?;
            }
            Command::Stats => self.run_stats(out)?,
            Command::Help { command } => print_help(out, command.as_deref())?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn require_results(&self) -> Result<()> {
        if self.session.has_results() {
            Ok(())
        } else {
            anyhow::bail!("No search yet. Use 'search <query>' first.")
        }
    }

    fn run_search(&mut self, out: &mut impl Write) -> Result<()> {
        let query = Query::parse(self.author.as_deref(), self.text.as_deref());
        let results = self.engine.search(&query)?;
        self.session.submit(query, results);
        self.print_page(out)
    }

    fn print_page(&self, out: &mut impl Write) -> Result<()> {
        let page = self.session.current_page()?;
        if let Some(query) = self.session.query() {
            writeln!(out, "{} {}", "query:".dimmed(), query)?;
        }
        writeln!(out, "{}", format_result_count(page.total_items).cyan())?;
        writeln!(out, "{}", format_window(&PageWindow::from(&page)).dimmed())?;
        for comment in page.items {
            writeln!(out, "{}", format_comment_line(comment))?;
        }
        Ok(())
    }

    fn run_stats(&self, out: &mut impl Write) -> Result<()> {
        let comments = self.engine.store().all()?;
        let stats = CommentStats::compute(&comments, DateRange::default(), DEFAULT_TOP_USERS);
        writeln!(out, "{}", "Archive Statistics".bold().cyan())?;
        writeln!(out, "{}", "─".repeat(40))?;
        writeln!(out, "  {:<20} {}", "Comments:", stats.total)?;
        writeln!(out, "  {:<20} {}", "Originals:", stats.originals)?;
        writeln!(out, "  {:<20} {}", "Replies:", stats.replies)?;
        writeln!(out, "  {:<20} {:.2}%", "Reply rate:", stats.reply_rate)?;
        for (rank, user) in stats.top_users.iter().take(5).enumerate() {
            writeln!(out, "  {:>2}. {} ({})", rank + 1, user.user, user.count)?;
        }
        Ok(())
    }
}

fn parse_command(input: &str) -> Result<Command> {
    let input = input.trim();
    let (head, rest) = input
        .split_once(char::is_whitespace)
        .map_or((input, ""), |(h, r)| (h, r.trim()));
    let rest = (!rest.is_empty()).then(|| rest.to_string());

    match head {
        "" => anyhow::bail!("Empty command"),
        "search" | "s" => Ok(Command::Search { text: rest }),
        "user" | "u" => Ok(Command::User { author: rest }),
        "page" | "p" => {
            let arg = rest.context("Usage: page <number>")?;
            let page = arg
                .parse()
                .with_context(|| format!("Not a page number: {arg}"))?;
            Ok(Command::Page { page })
        }
        "next" | "n" => Ok(Command::Next),
        "prev" | "b" => Ok(Command::Prev),
        "stats" => Ok(Command::Stats),
        "help" | "h" | "?" => Ok(Command::Help { command: rest }),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        _ => anyhow::bail!(
            "Unknown command: {}. Type 'help' for available commands.",
            head
        ),
    }
}

fn print_help(out: &mut impl Write, command: Option<&str>) -> std::io::Result<()> {
    match command {
        Some("search" | "s") => {
            writeln!(out, "search <query>  - terms, -exclusions, a|b alternatives")?;
        }
        Some("user" | "u") => writeln!(out, "user [name]     - filter by author; no name clears")?,
        Some("page" | "p") => writeln!(out, "page <n>        - jump to page n")?,
        Some("stats") => writeln!(out, "stats           - show archive statistics")?,
        _ => {
            writeln!(out, "{}", "Commands:".bold().cyan())?;
            writeln!(out, "  search <query>  - search comments (empty query lists all)")?;
            writeln!(out, "  user [name]     - filter by author and search again")?;
            writeln!(out, "  page <n>        - jump to page n")?;
            writeln!(out, "  next / prev     - move one page")?;
            writeln!(out, "  stats           - show archive statistics")?;
            writeln!(out, "  help [command]  - show help")?;
            writeln!(out, "  quit            - exit")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Comment;
    use crate::store::MemoryStore;

    fn session() -> ReplSession {
        colored::control::set_override(false);
        let mut comments = Vec::new();
        for i in 0..5 {
            comments.push(Comment::original(
                i,
                if i % 2 == 0 { "alice" } else { "bob" },
                "2024-01-01T00:00:00Z",
                format!("scratch {i}"),
            ));
        }
        ReplSession::new(SearchEngine::new(MemoryStore::new(comments)), 2)
    }

    fn run(s: &mut ReplSession, line: &str) -> String {
        let mut out = Vec::new();
        s.execute(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            parse_command("search scratch -宣伝").unwrap(),
            Command::Search {
                text: Some("scratch -宣伝".to_string())
            }
        );
        assert_eq!(parse_command("user").unwrap(), Command::User { author: None });
        assert_eq!(parse_command("page 3").unwrap(), Command::Page { page: 3 });
        assert!(parse_command("page x").is_err());
        assert!(parse_command("frobnicate").is_err());
        assert_eq!(parse_command("q").unwrap(), Command::Quit);
    }

    #[test]
    fn search_then_page() {
        let mut s = session();
        let out = run(&mut s, "search scratch");
        assert!(out.contains("5 results"));
        assert!(out.contains("showing 1 - 2 / 5"));

        let out = run(&mut s, "next");
        assert!(out.contains("showing 3 - 4 / 5"));

        let out = run(&mut s, "page 9");
        assert!(out.contains("clamped to 3"));
        assert!(out.contains("showing 5 - 5 / 5"));
    }

    #[test]
    fn new_search_resets_page() {
        let mut s = session();
        run(&mut s, "search scratch");
        run(&mut s, "page 2");
        let out = run(&mut s, "user alice");
        assert!(out.contains("3 results"));
        assert!(out.contains("(page 1/2)"));
    }

    #[test]
    fn paging_before_search_fails() {
        let mut s = session();
        let mut out = Vec::new();
        assert!(s.execute("next", &mut out).is_err());
    }

    #[test]
    fn quit_ends_session() {
        let mut s = session();
        let mut out = Vec::new();
        assert!(!s.execute("quit", &mut out).unwrap());
    }
}
