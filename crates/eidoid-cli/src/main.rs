//! `eidoid` – the Eidoid persona memory viewer.
//!
//! This binary is the operator's window into the pet robot's persona
//! memories.  It:
//!
//! 1. Checks for `~/.eidoid/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the memory engine on the configured data directory.
//! 3. Drops the operator into an **interactive REPL** with slash-commands
//!    (`/personas`, `/stats`, `/recall`, `/reset`, `/help`, …).
//! 4. Intercepts **Ctrl-C** and leaves the REPL at the next prompt.

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use eidoid_memory::MemoryEngine;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); EIDOID_LOG_FORMAT=json switches to
    // JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.  The
    // viewer's own output still uses println! for UX consistency.
    let _telemetry = telemetry::init_tracing("eidoid");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing the memory viewer …".yellow().bold());
        println!("{}", "  ✓ Every recorded memory is already on disk.".green());
        println!("{}", "  Press Enter to exit.".dimmed());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Memory engine ─────────────────────────────────────────────────────
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            std::process::exit(1);
        }
    };

    print!("\n  Opening memories at {} … ", cfg.data_dir.display().to_string().dimmed());
    let engine = match MemoryEngine::open(&cfg.data_dir, cfg.memory) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            println!("{}", "failed".red());
            error!(error = %e, path = %cfg.data_dir.display(), "cannot open the memory store");
            std::process::exit(1);
        }
    };
    match rt.block_on(engine.list_personas()) {
        Ok(ids) => println!("{} ({} persona(s))", "ok".green(), ids.len()),
        Err(e) => println!("{} ({})", "ok".green(), e.to_string().yellow()),
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, engine, cfg, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Eidoid First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the memory viewer.\n");

    let mut cfg = config::Config::default();

    let dir = repl::prompt_str(
        &format!("  Where should persona memories live? [{}]: ", cfg.data_dir.display()),
        &cfg.data_dir.display().to_string(),
    );
    cfg.data_dir = dir.into();

    cfg.memory.max_items_per_persona =
        repl::prompt_num("  Max memories per persona", cfg.memory.max_items_per_persona);
    cfg.memory.max_tokens_per_persona =
        repl::prompt_num("  Token budget per persona", cfg.memory.max_tokens_per_persona);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____   _     __      _     __"#.bold().cyan());
    println!("{}", r#"  / __/  (_)__/ /___  (_)__/ /"#.bold().cyan());
    println!("{}", r#" / _/   / / _  / __ \/ / _  / "#.bold().cyan());
    println!("{}", r#"/___/  /_/\_,_/\____/_/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Eidoid".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Persona Memory Viewer");
    println!();
}
