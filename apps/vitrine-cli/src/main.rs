//! # Vitrine CLI
//!
//! A command-line front end for the Vitrine document state engine. The
//! document lives in a directory-backed store (one JSON file per key), so the
//! same catalog survives between runs, with rotating backups next to it.
//!
//! ```text
//! .vitrine/
//!   site-state.json                  ← live document
//!   site-state-backup-<millis>.json  ← newest three previous versions
//! ```

use std::io::{self, Write};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use clap::{Parser, Subcommand};
use colored::*;
use tracing::debug;
use vitrine_sdk::prelude::*;
use vitrine_sdk::{export_filename, DirtyProbe, DirtyTracker, OrderLists, UnloadGuard};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(about = "Catalog editor with durable undo history and backups (Vitrine SDK)")]
#[command(version)]
struct Cli {
    /// Directory holding the stored document and its backups
    #[arg(long, global = true, default_value = ".vitrine")]
    store: PathBuf,

    /// JSON file overriding editor settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the catalog, cart and order lists
    Show,
    /// Write the content regions to a JSON file
    Export {
        /// Output file (default: site-state-YYYYMMDD.json)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate a JSON export and replace the stored document with it
    Import { file: PathBuf },
    /// List retained backups, newest first
    Backups,
    /// Replace the stored document with a backup
    Restore { key: String },
    /// Scripted walkthrough against an in-memory store
    Demo,
    /// Interactive REPL on the stored document
    Interactive,
}

// ─── Collaborators ─────────────────────────────────────────────────────────

/// Prints a status line whenever the document changes.
struct StatusLine;

impl RenderSink for StatusLine {
    fn render(&self, document: &Document) {
        println!(
            "  {} {} products · cart {} item(s), {:.2} · {} text(s)",
            "◆".bright_blue(),
            document.items.products.len(),
            document.cart_count(),
            document.cart_total(),
            document.texts.len()
        );
    }
}

/// Shows the reconciled order whenever it changes.
struct OrderEcho;

impl OrderingSink for OrderEcho {
    fn order_changed(&self, lists: &OrderLists) {
        println!(
            "  {} order: {}",
            "⇅".bright_magenta(),
            lists.group_order.join(" → ").dimmed()
        );
    }
}

/// Remembers the dirty probe so quitting can ask for confirmation.
#[derive(Default)]
struct ExitConfirm {
    probe: OnceLock<DirtyProbe>,
}

impl UnloadGuard for ExitConfirm {
    fn install(&self, probe: DirtyProbe) {
        debug!("exit confirmation armed");
        let _ = self.probe.set(probe);
    }
}

impl ExitConfirm {
    fn should_confirm(&self) -> bool {
        self.probe
            .get()
            .map(DirtyProbe::should_confirm_exit)
            .unwrap_or(false)
    }
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn warn_line(text: &str) {
    println!("  {} {}", "!".bright_red(), text);
}

fn show_document(document: &Document) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    for id in &document.layout.group_order {
        let Some(category) = document.category(id) else {
            continue;
        };
        println!("  │ {:<54} │", category.label.bright_yellow().to_string());
        let members = document
            .layout
            .item_order
            .get(id)
            .cloned()
            .unwrap_or_default();
        for member in members {
            println!("  │   {:<52} │", member.dimmed().to_string());
            for product in document
                .items
                .products
                .iter()
                .filter(|p| p.category.as_deref() == Some(id.as_str()))
                .filter(|p| p.subcategory.as_deref() == Some(member.as_str()))
            {
                let line = format!(
                    "{:<16} {:>8.2} / {:<4} {}",
                    product.id, product.price, product.unit, product.name
                );
                println!("  │     {:<50} │", line);
            }
        }
    }
    println!("  ├{}┤", border);
    if document.items.cart.is_empty() {
        println!("  │ {:<54} │", "(cart is empty)".dimmed().to_string());
    } else {
        for (id, entry) in &document.items.cart {
            let line = format!(
                "{:<16} × {:<4} @ {:>7.2} = {:>8.2}",
                id,
                entry.quantity,
                entry.price,
                entry.line_total()
            );
            println!("  │ {:<54} │", line);
        }
        let total = format!("{:>45.2}", document.cart_total());
        println!("  │ {} {} │", "total".bold(), total.bright_green());
    }
    if !document.texts.is_empty() {
        println!("  ├{}┤", border);
        for (key, value) in &document.texts {
            let line = format!("{:<16} {}", key, value);
            println!("  │ {:<54} │", line);
        }
    }
    println!("  └{}┘", border);
}

fn history_line<S: KvStore>(editor: &Editor<S>) {
    let history = editor.history();
    println!(
        "  {} undo {} · redo {} · {}",
        "⟲".bright_cyan(),
        history.undo_depth(),
        history.redo_depth(),
        if editor.is_dirty() {
            "unsaved".bright_yellow()
        } else {
            "saved".bright_green()
        }
    );
}

// ─── Setup ─────────────────────────────────────────────────────────────────

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "error:".bright_red().bold(), message);
    std::process::exit(1);
}

fn load_config(path: Option<&Path>) -> EditorConfig {
    let Some(path) = path else {
        return EditorConfig::default();
    };
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read {}: {}", path.display(), e)));
    EditorConfig::from_json(&text).unwrap_or_else(|e| fail(e))
}

async fn open_editor(cli: &Cli, dirty: Arc<DirtyTracker>) -> Editor<FileStore> {
    let store = FileStore::open(&cli.store)
        .await
        .unwrap_or_else(|e| fail(format!("cannot open store {}: {}", cli.store.display(), e)));
    let config = load_config(cli.config.as_deref());
    Editor::open_with_tracker(Arc::new(store), config, dirty).await
}

fn cart_edit(product: &str, quantity: u32) -> Edit {
    Edit::AddToCart {
        product: product.to_string(),
        quantity: NonZeroU32::new(quantity).unwrap_or(NonZeroU32::MIN),
    }
}

// ─── One-shot commands ─────────────────────────────────────────────────────

fn run_export<S: KvStore>(editor: &Editor<S>, out: Option<PathBuf>) {
    let json = editor.export().unwrap_or_else(|e| fail(e));
    let path = out.unwrap_or_else(|| PathBuf::from(export_filename(chrono::Local::now().date_naive())));
    std::fs::write(&path, json).unwrap_or_else(|e| fail(format!("cannot write {}: {}", path.display(), e)));
    step(&format!("Exported to {}", path.display().to_string().bright_white()));
}

async fn run_import<S: KvStore>(editor: &mut Editor<S>, file: &Path) -> bool {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            warn_line(&format!("cannot read {}: {}", file.display(), e));
            return false;
        }
    };
    match editor.import_json(&text).await {
        Ok(()) => {
            step(&format!(
                "Imported {} ({} products)",
                file.display(),
                editor.document().items.products.len()
            ));
            true
        }
        Err(e) => {
            warn_line(&format!("Import rejected: {}", e));
            false
        }
    }
}

async fn run_backups<S: KvStore>(editor: &Editor<S>) {
    match editor.backups().await {
        Ok(backups) if backups.is_empty() => println!("  {}", "(no backups)".dimmed()),
        Ok(backups) => {
            for record in backups {
                let when = record
                    .created_at()
                    .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("  {}  {}", when.bright_white(), record.key.dimmed());
            }
        }
        Err(e) => warn_line(&format!("cannot list backups: {}", e)),
    }
}

async fn run_restore<S: KvStore>(editor: &mut Editor<S>, key: &str) -> bool {
    match editor.restore_backup(key).await {
        Ok(()) => {
            step(&format!("Restored {}", key.bright_white()));
            true
        }
        Err(e) => {
            warn_line(&format!("Restore failed: {}", e));
            false
        }
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo() {
    header("DEMO: Vitrine document state engine");

    let store = Arc::new(MemoryStore::new());
    let mut editor = Editor::open(Arc::clone(&store), EditorConfig::default())
        .await
        .with_render_sink(Arc::new(StatusLine))
        .with_ordering_sink(Arc::new(OrderEcho));

    section("Fresh editor on an empty store");
    show_document(editor.document());
    history_line(&editor);

    section("Cart and catalog edits (each one undoable)");
    for edit in [
        cart_edit("p-apples", 2),
        cart_edit("p-sourdough", 1),
        Edit::UpdateProduct {
            id: "p-cheese".to_string(),
            patch: ProductPatch::price(22.5),
        },
    ] {
        if let Err(e) = editor.apply(edit) {
            warn_line(&e.to_string());
        }
    }
    history_line(&editor);

    section("Typing into a headline coalesces into one undo step");
    for value in ["F", "Fr", "Fre", "Fres", "Fresh"] {
        editor.edit_text("hero/h1", value);
    }
    editor.end_text_edit();
    history_line(&editor);

    section("Decreasing apples by 2 removes the cart line");
    let _ = editor.apply(Edit::ChangeQuantity {
        product: "p-apples".to_string(),
        delta: -2,
    });
    step(&format!(
        "apples in cart: {}",
        editor.document().items.cart.contains_key("p-apples")
    ));

    section("Undo twice, redo once");
    editor.undo().await;
    editor.undo().await;
    editor.redo().await;
    history_line(&editor);

    section("Reordering groups notifies the drag-and-drop layer");
    let _ = editor.apply(Edit::MoveGroup {
        id: "dairy".to_string(),
        to: 0,
    });

    section("A malformed import is rejected without touching the document");
    let before = editor.document().items.products.len();
    if let Err(e) = editor
        .import_json(r#"{ "items": { "products": [] }, "groups": {}, "texts": {} }"#)
        .await
    {
        warn_line(&e.to_string());
    }
    step(&format!(
        "products before {} / after {}",
        before,
        editor.document().items.products.len()
    ));

    section("Export then import is idempotent");
    let snapshot = editor.document().clone();
    match editor.export() {
        Ok(json) => {
            let _ = editor.import_json(&json).await;
            step(&format!("unchanged: {}", editor.document() == &snapshot));
        }
        Err(e) => warn_line(&e.to_string()),
    }

    section("Five immediate saves keep the three newest backups");
    for i in 1..=5 {
        let _ = editor.apply(Edit::SetText {
            key: "footer/p".to_string(),
            value: format!("revision {}", i),
        });
        editor.save_now().await;
    }
    run_backups(&editor).await;

    section("A storage outage leaves the document dirty until the next write");
    store.set_available(false);
    let _ = editor.apply(cart_edit("p-croissant", 3));
    let saved = editor.save_now().await;
    step(&format!("write succeeded: {} · dirty: {}", saved, editor.is_dirty()));
    store.set_available(true);
    let saved = editor.save_now().await;
    step(&format!("write succeeded: {} · dirty: {}", saved, editor.is_dirty()));

    section("Final document");
    show_document(editor.document());
    history_line(&editor);
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

fn print_help() {
    println!();
    println!("  {}", "Commands:".bold().underline());
    let rows = [
        ("show", "", "Show catalog, cart and texts"),
        ("add", "<product> [n]", "Add n to the cart (default 1)"),
        ("dec", "<product> [n]", "Decrease cart quantity by n"),
        ("price", "<product> <value>", "Change a product price"),
        ("text", "<key> <value...>", "Type into a text fragment"),
        ("blur", "", "End the current typing session"),
        ("move", "<category> <index>", "Move a category in the group order"),
        ("category", "<id> <label...>", "Add a category"),
        ("undo", "", "Undo the last change"),
        ("redo", "", "Redo the last undone change"),
        ("save", "", "Write now instead of waiting for the debounce"),
        ("export", "[file]", "Export the content regions"),
        ("import", "<file>", "Import an export file"),
        ("backups", "", "List backups"),
        ("restore", "<key>", "Restore a backup"),
        ("quit", "", "Exit (asks first if unsaved)"),
    ];
    for (name, args, about) in rows {
        println!(
            "    {} {:<20} {}",
            format!("{:<8}", name).bright_cyan(),
            args,
            about
        );
    }
    println!();
}

fn confirm(question: &str) -> bool {
    print!("  {} {} [y/N] ", "?".bright_yellow(), question);
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn report(result: vitrine_sdk::Result<bool>) {
    match result {
        Ok(true) => {}
        Ok(false) => println!("  {}", "(no change)".dimmed()),
        Err(e) => warn_line(&e.to_string()),
    }
}

async fn run_interactive(cli: &Cli) {
    header("INTERACTIVE REPL: Vitrine catalog editor");

    let guard = Arc::new(ExitConfirm::default());
    let dirty = Arc::new(DirtyTracker::new().with_unload_guard(guard.clone()));
    let mut editor = open_editor(cli, dirty)
        .await
        .with_render_sink(Arc::new(StatusLine))
        .with_ordering_sink(Arc::new(OrderEcho));

    step(&format!("store: {}", cli.store.display()));
    print_help();

    loop {
        print!("{}", "vitrine> ".bright_cyan().bold());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            editor.save_now().await;
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "show" | "s" => {
                show_document(editor.document());
                history_line(&editor);
            }

            "add" | "+" => {
                let Some(product) = parts.get(1) else {
                    warn_line("Usage: add <product> [n]");
                    continue;
                };
                let n = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
                report(editor.apply(cart_edit(product, n)));
            }

            "dec" | "-" => {
                let Some(product) = parts.get(1) else {
                    warn_line("Usage: dec <product> [n]");
                    continue;
                };
                let n: i64 = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
                report(editor.apply(Edit::ChangeQuantity {
                    product: product.to_string(),
                    delta: -n,
                }));
            }

            "price" => {
                let (Some(id), Some(Ok(price))) = (parts.get(1), parts.get(2).map(|s| s.parse::<f64>())) else {
                    warn_line("Usage: price <product> <value>");
                    continue;
                };
                report(editor.apply(Edit::UpdateProduct {
                    id: id.to_string(),
                    patch: ProductPatch::price(price),
                }));
            }

            "text" | "t" => {
                if parts.len() < 3 {
                    warn_line("Usage: text <key> <value...>");
                    continue;
                }
                if !editor.edit_text(parts[1], &parts[2..].join(" ")) {
                    println!("  {}", "(no change)".dimmed());
                }
            }

            "blur" => {
                editor.end_text_edit();
                step("typing session closed");
            }

            "move" => {
                let (Some(id), Some(Ok(to))) = (parts.get(1), parts.get(2).map(|s| s.parse::<usize>())) else {
                    warn_line("Usage: move <category> <index>");
                    continue;
                };
                report(editor.apply(Edit::MoveGroup {
                    id: id.to_string(),
                    to,
                }));
            }

            "category" => {
                if parts.len() < 3 {
                    warn_line("Usage: category <id> <label...>");
                    continue;
                }
                report(editor.apply(Edit::AddCategory {
                    id: parts[1].to_string(),
                    label: parts[2..].join(" "),
                }));
            }

            "undo" | "u" => {
                if !editor.undo().await {
                    println!("  {}", "(nothing to undo)".dimmed());
                }
                history_line(&editor);
            }

            "redo" | "r" => {
                if !editor.redo().await {
                    println!("  {}", "(nothing to redo)".dimmed());
                }
                history_line(&editor);
            }

            "save" => {
                if editor.save_now().await {
                    step("saved");
                } else {
                    warn_line("save failed; will retry on the next change");
                }
            }

            "export" => run_export(&editor, parts.get(1).map(PathBuf::from)),

            "import" => {
                let Some(file) = parts.get(1) else {
                    warn_line("Usage: import <file>");
                    continue;
                };
                run_import(&mut editor, Path::new(file)).await;
            }

            "backups" => run_backups(&editor).await,

            "restore" => {
                let Some(key) = parts.get(1) else {
                    warn_line("Usage: restore <key>");
                    continue;
                };
                run_restore(&mut editor, key).await;
            }

            "quit" | "exit" | "q" => {
                editor.flush().await;
                if guard.should_confirm() && !confirm("Unsaved changes will be lost. Quit anyway?") {
                    continue;
                }
                println!("  {}", "Goodbye!".dimmed());
                break;
            }

            "help" | "h" | "?" => print_help(),

            other => {
                println!(
                    "  {} Unknown command '{}', type 'help'",
                    "?".bright_yellow(),
                    other
                );
            }
        }
    }
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Show => {
            let editor = open_editor(&cli, Arc::new(DirtyTracker::new())).await;
            show_document(editor.document());
        }
        Commands::Export { out } => {
            let editor = open_editor(&cli, Arc::new(DirtyTracker::new())).await;
            run_export(&editor, out.clone());
        }
        Commands::Import { file } => {
            let mut editor = open_editor(&cli, Arc::new(DirtyTracker::new())).await;
            if !run_import(&mut editor, file).await {
                std::process::exit(1);
            }
        }
        Commands::Backups => {
            let editor = open_editor(&cli, Arc::new(DirtyTracker::new())).await;
            run_backups(&editor).await;
        }
        Commands::Restore { key } => {
            let mut editor = open_editor(&cli, Arc::new(DirtyTracker::new())).await;
            if !run_restore(&mut editor, key).await {
                std::process::exit(1);
            }
        }
        Commands::Demo => run_demo().await,
        Commands::Interactive => run_interactive(&cli).await,
    }
}
