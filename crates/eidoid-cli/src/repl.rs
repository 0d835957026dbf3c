//! REPL – the interactive persona memory viewer.
//!
//! Supported slash-commands:
//!   /help                                  – show this list
//!   /personas                              – list personas with stored data
//!   /stats <persona>                       – entry count, tokens, importance, age range
//!   /recent <persona> [n]                  – newest entries first
//!   /recall <persona> [query…]             – relevance-ranked recall
//!   /record <persona> <role> <text…>       – store an utterance
//!   /profile <persona>                     – show the persona profile
//!   /trait <persona> <trait[,trait…]>      – merge traits into the profile
//!   /evolve <persona> <trait,…> [style…]   – personality update + reflection
//!   /context <persona>                     – preview the prompt context block
//!   /session <persona> [clear]             – show (or drop) the short-term turns
//!   /export <persona> [path]               – dump profile and entries as JSON
//!   /forget <persona> <id>                 – delete one entry
//!   /reset <persona>                       – delete everything (asks first)
//!   /settings                              – edit `~/.eidoid/config.toml`
//!   /quit | /exit                          – leave the viewer

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eidoid_memory::session::DEFAULT_SESSION_TURNS;
use eidoid_memory::{ContextRequest, MemoryEngine, RecallQuery};
use eidoid_types::{EntryId, MemoryEntry, NewEntry, PersonaStats, ProfileUpdate, TraitDelta};
use tokio::runtime::Runtime;

use crate::config::{self, Config};

const DEFAULT_RECENT: usize = 10;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Personas,
    Stats { persona: String },
    Recent { persona: String, limit: usize },
    Recall { persona: String, query: Option<String> },
    Record { persona: String, role: String, text: String },
    Profile { persona: String },
    Trait { persona: String, traits: Vec<String> },
    Evolve { persona: String, traits: Vec<String>, style_notes: Option<String> },
    Context { persona: String },
    Session { persona: String, clear: bool },
    Export { persona: String, path: Option<PathBuf> },
    Forget { persona: String, id: EntryId },
    Reset { persona: String },
    Settings,
    Quit,
}

fn usage(text: &str) -> String {
    format!("usage: {text}")
}

fn split_traits(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split `rest` into its first word and the (trimmed) remainder.
fn next_word(rest: &str) -> (Option<&str>, &str) {
    let rest = rest.trim_start();
    if rest.is_empty() {
        return (None, "");
    }
    match rest.split_once(char::is_whitespace) {
        Some((word, tail)) => (Some(word), tail.trim()),
        None => (Some(rest), ""),
    }
}

/// Parse one input line. `Err` carries a message for the operator.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let (cmd, rest) = next_word(line);
    let cmd = cmd.unwrap_or_default();
    let (persona, tail) = next_word(rest);
    let persona = persona.map(str::to_string);

    let need = |p: Option<String>, form: &str| p.ok_or_else(|| usage(form));

    match cmd {
        "/help" => Ok(Command::Help),
        "/personas" => Ok(Command::Personas),
        "/settings" => Ok(Command::Settings),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/stats" => Ok(Command::Stats { persona: need(persona, "/stats <persona>")? }),
        "/profile" => Ok(Command::Profile { persona: need(persona, "/profile <persona>")? }),
        "/context" => Ok(Command::Context { persona: need(persona, "/context <persona>")? }),
        "/reset" => Ok(Command::Reset { persona: need(persona, "/reset <persona>")? }),
        "/session" => {
            let form = "/session <persona> [clear]";
            let persona = need(persona, form)?;
            match tail {
                "" => Ok(Command::Session { persona, clear: false }),
                "clear" => Ok(Command::Session { persona, clear: true }),
                _ => Err(usage(form)),
            }
        }
        "/recent" => {
            let persona = need(persona, "/recent <persona> [n]")?;
            let limit = if tail.is_empty() {
                DEFAULT_RECENT
            } else {
                tail.parse::<usize>()
                    .map_err(|_| format!("'{tail}' is not a number"))?
            };
            Ok(Command::Recent { persona, limit })
        }
        "/recall" => Ok(Command::Recall {
            persona: need(persona, "/recall <persona> [query…]")?,
            query: (!tail.is_empty()).then(|| tail.to_string()),
        }),
        "/record" => {
            let form = "/record <persona> <role> <text…>";
            let persona = need(persona, form)?;
            let (role, text) = next_word(tail);
            match role {
                Some(role) if !text.is_empty() => Ok(Command::Record {
                    persona,
                    role: role.to_string(),
                    text: text.to_string(),
                }),
                _ => Err(usage(form)),
            }
        }
        "/trait" => {
            let form = "/trait <persona> <trait[,trait…]>";
            let persona = need(persona, form)?;
            let traits = split_traits(tail);
            if traits.is_empty() {
                return Err(usage(form));
            }
            Ok(Command::Trait { persona, traits })
        }
        "/evolve" => {
            let form = "/evolve <persona> <trait,trait…> [style notes…]";
            let persona = need(persona, form)?;
            let (traits, style) = next_word(tail);
            let traits = traits.map(split_traits).unwrap_or_default();
            let style_notes = (!style.is_empty()).then(|| style.to_string());
            if traits.is_empty() && style_notes.is_none() {
                return Err(usage(form));
            }
            Ok(Command::Evolve { persona, traits, style_notes })
        }
        "/export" => Ok(Command::Export {
            persona: need(persona, "/export <persona> [path]")?,
            path: (!tail.is_empty()).then(|| PathBuf::from(tail)),
        }),
        "/forget" => {
            let form = "/forget <persona> <id>";
            let persona = need(persona, form)?;
            let id = tail.parse::<EntryId>().map_err(|_| usage(form))?;
            Ok(Command::Forget { persona, id })
        }
        other => Err(format!("Unknown command: '{other}'. Type /help for available commands.")),
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(rt: &Runtime, engine: Arc<MemoryEngine>, cfg: Config, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "eidoid>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(cmd) => execute(rt, &engine, &cfg, cmd),
            Err(msg) => println!("{}", msg.yellow()),
        }
    }
}

fn execute(rt: &Runtime, engine: &MemoryEngine, cfg: &Config, cmd: Command) {
    match cmd {
        Command::Help => cmd_help(),
        Command::Settings => cmd_settings(),
        Command::Quit => {}
        Command::Personas => match rt.block_on(engine.list_personas()) {
            Ok(ids) if ids.is_empty() => println!("  {}", "No personas with stored memories.".dimmed()),
            Ok(ids) => {
                println!("{}", "Personas".bold().underline());
                for id in ids {
                    match rt.block_on(engine.stats(&id)) {
                        Ok(stats) => println!("  {}  {} entries", id.bold(), stats.count),
                        Err(e) => println!("  {}  {}", id.bold(), e.to_string().red()),
                    }
                }
            }
            Err(e) => print_error("Listing personas failed", e),
        },
        Command::Stats { persona } => match rt.block_on(engine.stats(&persona)) {
            Ok(stats) => print_stats(&stats),
            Err(e) => print_error("Stats failed", e),
        },
        Command::Recent { persona, limit } => {
            match rt.block_on(engine.try_recent(&persona, limit)) {
                Ok(entries) => print_entries(&entries),
                Err(e) => print_error("Listing memories failed", e),
            }
        }
        Command::Recall { persona, query } => {
            let q = RecallQuery {
                query,
                top_k: cfg.default_top_k,
                categories: Vec::new(),
            };
            match rt.block_on(engine.try_recall(&persona, &q)) {
                Ok(entries) => print_entries(&entries),
                Err(e) => print_error("Recall failed", e),
            }
        }
        Command::Record { persona, role, text } => {
            match rt.block_on(engine.try_record(&persona, role.as_str(), NewEntry::new(text))) {
                Ok(outcome) => {
                    println!("{} #{}", "✓ Recorded".green(), outcome.entry.id);
                    if !outcome.evicted.is_empty() {
                        println!("  {} entries evicted by quota", outcome.evicted.len());
                    }
                }
                Err(e) => print_error("Record failed", e),
            }
        }
        Command::Profile { persona } => match rt.block_on(engine.profile(&persona)) {
            Ok(Some(profile)) => {
                println!("{}", "Persona Profile".bold().underline());
                print_field("Name", profile.display_name.as_deref());
                print_field("World", profile.world_description.as_deref());
                print_field("Personality", profile.personality.as_deref());
                print_field("Voice", profile.voice.as_deref());
                let traits = profile.traits.join(", ");
                print_field("Traits", (!traits.is_empty()).then_some(traits.as_str()));
                print_field("Style notes", profile.style_notes.as_deref());
                println!("  {:<12} {}", "Updated", profile.updated_at.to_rfc3339().dimmed());
            }
            Ok(None) => println!("  {}", "No profile yet.".dimmed()),
            Err(e) => print_error("Loading profile failed", e),
        },
        Command::Trait { persona, traits } => {
            let update = ProfileUpdate {
                traits,
                ..ProfileUpdate::default()
            };
            match rt.block_on(engine.merge_profile(&persona, &update)) {
                Ok(profile) => println!("{} {}", "✓ Traits:".green(), profile.traits.join(", ")),
                Err(e) => print_error("Profile update failed", e),
            }
        }
        Command::Evolve { persona, traits, style_notes } => {
            let delta = TraitDelta {
                traits,
                style_notes,
            };
            match rt.block_on(engine.evolve(&persona, &delta)) {
                Ok(profile) => println!("{} {}", "✓ Evolved. Traits:".green(), profile.traits.join(", ")),
                Err(e) => print_error("Evolve failed", e),
            }
        }
        Command::Context { persona } => {
            let request = ContextRequest {
                query: None,
                include_short_term: true,
                max_chars: cfg.context_max_chars,
            };
            let text = rt.block_on(engine.render_context_with(&persona, &request));
            if text.is_empty() {
                println!("  {}", "(empty)".dimmed());
            } else {
                println!("{text}");
            }
        }
        Command::Session { persona, clear: true } => match rt.block_on(engine.clear_session(&persona)) {
            Ok(n) => println!("{} {} turn(s) of {}", "✓ Dropped".green(), n, persona.bold()),
            Err(e) => print_error("Clearing the session failed", e),
        },
        Command::Session { persona, clear: false } => {
            let text = rt.block_on(engine.session_context(&persona, DEFAULT_SESSION_TURNS));
            if text.is_empty() {
                println!("  {}", "(no turns this session)".dimmed());
            } else {
                println!("{}", "Recent conversation".bold().underline());
                println!("{text}");
            }
        }
        Command::Export { persona, path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(format!("{persona}-export.json")));
            let written = rt
                .block_on(engine.export_persona(&persona))
                .map_err(|e| e.to_string())
                .and_then(|export| {
                    serde_json::to_string_pretty(&export)
                        .map_err(|e| e.to_string())
                        .map(|json| (export.entries.len(), json))
                })
                .and_then(|(count, json)| {
                    std::fs::write(&path, json)
                        .map(|()| count)
                        .map_err(|e| format!("{}: {e}", path.display()))
                });
            match written {
                Ok(count) => println!(
                    "{} {} entries to {}",
                    "✓ Exported".green(),
                    count,
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Export failed".red(), e),
            }
        }
        Command::Forget { persona, id } => match rt.block_on(engine.forget(&persona, id)) {
            Ok(true) => println!("{} #{id}", "✓ Forgot".green()),
            Ok(false) => println!("  No entry #{id} for {persona}."),
            Err(e) => print_error("Forget failed", e),
        },
        Command::Reset { persona } => cmd_reset(rt, engine, &persona),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Eidoid Memory Viewer".bold().underline());
    let rows = [
        ("/personas", "list personas with stored data"),
        ("/stats <persona>", "entry count, tokens, importance, age range"),
        ("/recent <persona> [n]", "newest entries first"),
        ("/recall <persona> [query…]", "relevance-ranked recall"),
        ("/record <persona> <role> <text…>", "store an utterance"),
        ("/profile <persona>", "show the persona profile"),
        ("/trait <persona> <a,b…>", "merge traits into the profile"),
        ("/evolve <persona> <a,b…> [style…]", "personality update with reflection"),
        ("/context <persona>", "preview the prompt context block"),
        ("/session <persona> [clear]", "show or drop the short-term turns"),
        ("/export <persona> [path]", "dump profile and entries as JSON"),
        ("/forget <persona> <id>", "delete one entry"),
        ("/reset <persona>", "delete all memories and the profile"),
        ("/settings", "edit ~/.eidoid/config.toml"),
        ("/quit  /exit", "leave the viewer"),
    ];
    for (cmd, what) in rows {
        println!("  {:<36} – {}", cmd.bold().cyan(), what);
    }
    println!();
}

fn cmd_reset(rt: &Runtime, engine: &MemoryEngine, persona: &str) {
    println!(
        "{} This deletes every memory and the profile of {}.",
        "⚠".yellow().bold(),
        persona.bold()
    );
    let typed = prompt_str("  Type the persona id to confirm: ", "");
    if !confirms_reset(&typed, persona) {
        println!("  Aborted.");
        return;
    }
    match rt.block_on(engine.reset_persona(persona)) {
        Ok(report) => println!(
            "{} {} ({} entries{})",
            "✓ Reset".green(),
            report.persona_id.bold(),
            report.entries_removed,
            if report.profile_removed { ", profile" } else { "" }
        ),
        Err(e) => print_error("Reset failed", e),
    }
}

/// The operator must retype the exact persona id.
fn confirms_reset(typed: &str, persona: &str) -> bool {
    !persona.is_empty() && typed.trim() == persona
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    let dir = prompt_str(
        &format!("  Data directory     [{}]: ", cfg.data_dir.display()),
        &cfg.data_dir.display().to_string(),
    );
    cfg.data_dir = PathBuf::from(dir);
    cfg.memory.max_items_per_persona = prompt_num(
        "  Max items/persona ",
        cfg.memory.max_items_per_persona,
    );
    cfg.memory.max_tokens_per_persona = prompt_num(
        "  Max tokens/persona",
        cfg.memory.max_tokens_per_persona,
    );
    cfg.context_max_chars = prompt_num("  Context chars     ", cfg.context_max_chars);
    cfg.default_top_k = prompt_num("  Recall results    ", cfg.default_top_k);

    match config::save(&cfg) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!("  {}", "Restart eidoid to apply them.".dimmed());
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn print_error(what: &str, e: impl std::fmt::Display) {
    println!("{}: {}", what.red(), e);
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(v) = value {
        println!("  {:<12} {}", label, v);
    }
}

fn print_stats(stats: &PersonaStats) {
    let when = |ts: Option<chrono::DateTime<chrono::Utc>>| {
        ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "–".to_string())
    };
    println!("{} {}", "Stats for".bold(), stats.persona_id.bold().cyan());
    println!("  Entries        : {}", stats.count.to_string().yellow());
    println!("  Tokens         : {}", stats.token_sum.to_string().yellow());
    println!("  Avg importance : {:.2}", stats.avg_importance);
    println!("  Oldest         : {}", when(stats.oldest));
    println!("  Newest         : {}", when(stats.newest));
}

fn format_entry(e: &MemoryEntry) -> String {
    let tags = if e.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", e.tags.join(", "))
    };
    format!(
        "#{:<5} {:<11} {:.2}  {}  {}{}",
        e.id,
        e.category.as_str(),
        e.importance,
        e.created_at.format("%Y-%m-%d %H:%M"),
        e.text.replace('\n', " "),
        tags
    )
}

fn print_entries(entries: &[MemoryEntry]) {
    if entries.is_empty() {
        println!("  {}", "No memories.".dimmed());
        return;
    }
    for e in entries {
        println!("  {}", format_entry(e));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a number.  Returns `default` on Enter or unparsable input.
pub(crate) fn prompt_num<T>(label: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let raw = prompt_str(&format!("{label} [{default}]: "), &default.to_string());
    match raw.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub(crate) fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("  /exit  "), Ok(Command::Quit));
        assert_eq!(
            parse_command("/stats alexa"),
            Ok(Command::Stats { persona: "alexa".into() })
        );
    }

    #[test]
    fn session_takes_optional_clear() {
        assert_eq!(
            parse_command("/session alexa"),
            Ok(Command::Session { persona: "alexa".into(), clear: false })
        );
        assert_eq!(
            parse_command("/session alexa clear"),
            Ok(Command::Session { persona: "alexa".into(), clear: true })
        );
        assert!(parse_command("/session alexa wipe").is_err());
        assert!(parse_command("/session").is_err());
    }

    #[test]
    fn recent_defaults_and_parses_limit() {
        assert_eq!(
            parse_command("/recent alexa"),
            Ok(Command::Recent { persona: "alexa".into(), limit: DEFAULT_RECENT })
        );
        assert_eq!(
            parse_command("/recent alexa 3"),
            Ok(Command::Recent { persona: "alexa".into(), limit: 3 })
        );
        assert!(parse_command("/recent alexa lots").is_err());
    }

    #[test]
    fn recall_query_is_optional() {
        assert_eq!(
            parse_command("/recall jarvis"),
            Ok(Command::Recall { persona: "jarvis".into(), query: None })
        );
        assert_eq!(
            parse_command("/recall jarvis green tea"),
            Ok(Command::Recall { persona: "jarvis".into(), query: Some("green tea".into()) })
        );
    }

    #[test]
    fn record_keeps_whole_text() {
        assert_eq!(
            parse_command("/record alexa user I like  jazz"),
            Ok(Command::Record {
                persona: "alexa".into(),
                role: "user".into(),
                text: "I like  jazz".into(),
            })
        );
        assert!(parse_command("/record alexa user").is_err());
    }

    #[test]
    fn evolve_splits_traits_and_style() {
        assert_eq!(
            parse_command("/evolve alexa warm,direct uses short sentences"),
            Ok(Command::Evolve {
                persona: "alexa".into(),
                traits: vec!["warm".into(), "direct".into()],
                style_notes: Some("uses short sentences".into()),
            })
        );
        assert!(parse_command("/evolve alexa").is_err());
    }

    #[test]
    fn forget_requires_numeric_id() {
        assert_eq!(
            parse_command("/forget alexa 42"),
            Ok(Command::Forget { persona: "alexa".into(), id: EntryId(42) })
        );
        assert!(parse_command("/forget alexa x").is_err());
    }

    #[test]
    fn missing_persona_is_reported() {
        let err = parse_command("/stats").unwrap_err();
        assert!(err.starts_with("usage:"));
        assert!(parse_command("/dance").unwrap_err().contains("Unknown command"));
    }

    #[test]
    fn reset_needs_exact_persona_id() {
        assert!(confirms_reset(" alexa \n", "alexa"));
        assert!(!confirms_reset("yes", "alexa"));
        assert!(!confirms_reset("", ""));
    }

    #[test]
    fn entries_render_on_one_line() {
        let now = chrono::Utc::now();
        let entry = MemoryEntry {
            id: EntryId(7),
            persona_id: "alexa".into(),
            text: "two\nlines".into(),
            category: eidoid_types::Category::Fact,
            importance: 0.5,
            created_at: now,
            last_accessed_at: now,
            token_estimate: 2,
            tags: vec!["role:user".into()],
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("#7"));
        assert!(line.contains("two lines"));
        assert!(line.ends_with("[role:user]"));
    }
}
