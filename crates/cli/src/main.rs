//! MergePane command-line tool.
//!
//! Exercises the core library without an editor: inspect conflict sibling
//! files, map line positions between file versions, preview layouts, find
//! conflict markers, regenerate a merged file, and generate / validate
//! configuration files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mergepane_core::config::AppConfig;
use mergepane_core::conflict_markers::{contains_conflict_markers, marker_lines};
use mergepane_core::db::Database;
use mergepane_core::git::GitClient;
use mergepane_core::layout::manager::layout_state_key;
use mergepane_core::layout::{LayoutDescription, LayoutElement, LayoutKind, Zoom};
use mergepane_core::mapping::{DiffLineMapper, LineMapper};
use mergepane_core::uris::DiffedUris;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// MergePane command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mergepane",
    version,
    about = "Inspect merge conflict files and preview MergePane layouts"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the conflict file set a BASE/LOCAL/REMOTE sibling belongs to.
    Siblings {
        /// Path of any sibling file.
        path: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Map line positions from one file version to another.
    Map {
        /// Version the positions refer to.
        old: PathBuf,

        /// Version to map the positions into.
        new: PathBuf,

        /// Zero-based, possibly fractional line positions.
        #[arg(required = true, allow_negative_numbers = true)]
        lines: Vec<f64>,

        /// Map from `new` into `old` instead.
        #[arg(long)]
        reverse: bool,
    },

    /// List layout arrangements, or describe one for a conflict file set.
    Layouts {
        /// Path of a sibling file; lists all arrangements when omitted.
        path: Option<PathBuf>,

        /// Arrangement key (defaults to the selected one, else the configured one).
        #[arg(short, long)]
        layout: Option<String>,

        /// Zoom: default, center, left, right, top, bottom.
        #[arg(short, long, default_value = "default")]
        zoom: String,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Persist the arrangement to use for the next merge layouts.
    Select {
        /// Arrangement key, e.g. 3DiffToBase.
        layout: String,
    },

    /// List conflict marker lines of a file.
    Markers {
        /// File to scan.
        file: PathBuf,
    },

    /// Recreate the merged file with `git merge-file`.
    Merge {
        /// Path of any sibling file.
        path: PathBuf,

        /// Overwrite a merged file without conflict markers without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    // Logging level: RUST_LOG, else the configured level, else warn.
    let configured_level = AppConfig::load_from_file(&config_path)
        .ok()
        .map(|c| c.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_level.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config_path: &Path) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(output.as_deref().unwrap_or(config_path)),
        Commands::Validate => cmd_validate(config_path),
        Commands::Siblings { path, json } => cmd_siblings(&path, json),
        Commands::Map {
            old,
            new,
            lines,
            reverse,
        } => cmd_map(&old, &new, &lines, reverse),
        Commands::Markers { file } => cmd_markers(&file),
        Commands::Layouts {
            path,
            layout,
            zoom,
            json,
        } => {
            let config = load_config(config_path)?;
            cmd_layouts(&config, path.as_deref(), layout.as_deref(), &zoom, json)
        }
        Commands::Select { layout } => {
            let config = load_config(config_path)?;
            cmd_select(&config, &layout)
        }
        Commands::Merge { path, yes } => {
            let config = load_config(config_path)?;
            cmd_merge(&config, &path, yes).await
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_or_default(path).context("failed to load configuration file")?;
    debug!(config = %path.display(), layout = %config.layout.default, "configuration loaded");
    Ok(config)
}

fn parse_siblings(path: &Path) -> Result<DiffedUris> {
    DiffedUris::from_sibling_path(path).with_context(|| {
        format!(
            "'{}' is not a conflict sibling file (expected <name>_BASE|LOCAL|REMOTE_<pid><ext>)",
            path.display()
        )
    })
}

fn open_state(config: &AppConfig) -> Result<Database> {
    let path = config.state.database_path();
    Database::open_initialized(&path)
        .with_context(|| format!("failed to open state database {}", path.display()))
}

/// Arrangement key to use: `explicit`, else the persisted choice, else the
/// configured default. A missing state database is not created.
fn layout_key(config: &AppConfig, explicit: Option<&str>) -> Result<String> {
    if let Some(key) = explicit {
        return Ok(key.to_string());
    }
    if config.state.database_path().exists() {
        if let Some(stored) = open_state(config)?.get_state(&layout_state_key())? {
            debug!(layout = %stored, "using persisted layout");
            return Ok(stored);
        }
    }
    Ok(config.layout.default.clone())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_siblings(path: &Path, json: bool) -> Result<()> {
    let uris = parse_siblings(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&uris)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Role", "Path", "Exists", "Writable"]);

    let mut rows: Vec<(&str, &Path)> = vec![
        ("base", uris.base.as_path()),
        ("local", uris.local.as_path()),
        ("remote", uris.remote.as_path()),
        ("merged", uris.merged.as_path()),
    ];
    if let Some(backup) = uris.backup.as_deref() {
        rows.push(("backup", backup));
    }
    for (role, p) in rows {
        table.add_row(vec![
            Cell::new(role),
            Cell::new(p.display()),
            Cell::new(if p.exists() { "yes" } else { "no" }),
            Cell::new(if uris.is_writable(p) { "yes" } else { "" }),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn cmd_map(old: &Path, new: &Path, lines: &[f64], reverse: bool) -> Result<()> {
    let old_text = read_file(old)?;
    let new_text = read_file(new)?;

    let mut mapper = DiffLineMapper::from_texts(&old_text, &new_text);
    if reverse {
        mapper = mapper.create_reversed();
    }

    for &line in lines {
        println!("{} -> {}", line, mapper.map(line));
    }
    Ok(())
}

fn cmd_layouts(
    config: &AppConfig,
    path: Option<&Path>,
    layout: Option<&str>,
    zoom: &str,
    json: bool,
) -> Result<()> {
    let zoom = Zoom::parse(zoom).with_context(|| format!("unknown zoom '{}'", zoom))?;
    let key = layout_key(config, layout)?;
    let kind =
        LayoutKind::from_setting_value(&key).with_context(|| format!("unknown layout '{}'", key))?;

    let Some(path) = path else {
        if json {
            let keys: Vec<&str> = LayoutKind::ALL.iter().map(|k| k.setting_value()).collect();
            println!("{}", serde_json::to_string_pretty(&keys)?);
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Key", "Description", "Zoom", ""]);
        for k in LayoutKind::ALL {
            let zooms: Vec<&str> = k.supported_zooms().iter().map(|z| z.as_str()).collect();
            table.add_row(vec![
                Cell::new(k.setting_value()),
                Cell::new(k.label()),
                Cell::new(zooms.join(", ")),
                Cell::new(if k == kind { "selected" } else { "" }),
            ]);
        }
        println!("{}", table);
        return Ok(());
    };

    let uris = parse_siblings(path)?;
    let description = kind.describe(&uris, zoom);
    if json {
        println!("{}", serde_json::to_string_pretty(&description)?);
    } else {
        println!("{} ({}), zoom {}", kind, kind.label(), zoom);
        print_layout(&description);
    }
    Ok(())
}

fn print_layout(description: &LayoutDescription) {
    fn walk(elements: &[LayoutElement], depth: usize, column: &mut u32) {
        for element in elements {
            let indent = "  ".repeat(depth);
            match element {
                LayoutElement::Group { size, groups } => {
                    println!("{}group {:.0}%", indent, size * 100.0);
                    walk(groups, depth + 1, column);
                }
                LayoutElement::Diff(pane) => {
                    *column += 1;
                    let marker = if pane.is_merge_editor { " [merge]" } else { "" };
                    println!(
                        "{}#{} {} {:.0}%{}\n{}   {} -> {}",
                        indent,
                        column,
                        pane.title,
                        pane.size * 100.0,
                        marker,
                        indent,
                        pane.old.display(),
                        pane.new.display()
                    );
                }
            }
        }
    }
    println!("{:?}", description.orientation);
    let mut column = 0;
    walk(&description.groups, 1, &mut column);
}

fn cmd_select(config: &AppConfig, key: &str) -> Result<()> {
    let kind =
        LayoutKind::from_setting_value(key).with_context(|| format!("unknown layout '{}'", key))?;
    let db = open_state(config)?;
    db.set_state(&layout_state_key(), kind.setting_value())?;
    println!("Selected {} ({})", kind, kind.label());
    Ok(())
}

fn cmd_markers(file: &Path) -> Result<()> {
    let text = read_file(file)?;
    let markers = marker_lines(&text);
    if markers.is_empty() {
        println!("No conflict markers in {}", file.display());
        return Ok(());
    }

    let lines: Vec<&str> = text.lines().collect();
    for line in markers {
        println!("{:>6}: {}", line + 1, lines.get(line).copied().unwrap_or_default());
    }
    Ok(())
}

async fn cmd_merge(config: &AppConfig, path: &Path, yes: bool) -> Result<()> {
    let uris = parse_siblings(path)?;
    for p in [&uris.base, &uris.local, &uris.remote] {
        anyhow::ensure!(p.exists(), "missing sibling file: {}", p.display());
    }

    if uris.merged.exists() && !yes {
        let current = read_file(&uris.merged)?;
        if !contains_conflict_markers(&current) {
            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "{} has no conflict markers left. Overwrite it?",
                    uris.merged.display()
                ))
                .default(false)
                .interact()
                .context("failed to read confirmation")?;
            if !overwrite {
                println!("Merge cancelled. {} was not modified.", uris.merged.display());
                return Ok(());
            }
        }
    }

    let git = GitClient::from_config(&config.git);
    let output = git
        .merge_file(&uris.local, &uris.base, &uris.remote, async {
            eprintln!("Waiting for git merge-file to finish...");
        })
        .await
        .context("git merge-file failed")?;

    std::fs::write(&uris.merged, &output.contents)
        .with_context(|| format!("failed to write {}", uris.merged.display()))?;

    if output.has_conflicts() {
        println!(
            "Wrote {} with {} conflict(s) left to resolve",
            uris.merged.display(),
            output.exit_code
        );
    } else {
        println!("Wrote {} (merged cleanly)", uris.merged.display());
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# MergePane Configuration

[logging]
level = "info"

[layout]
# One of: 4TransferRight, 4TransferDown, 3DiffToBase, 3DiffToBaseRows,
# 3DiffToBaseMergedRight, 3DiffToMerged
default = "4TransferRight"

[scroll]
enabled = true
surrounding_lines = 3
decay_per_sec = 0.05
max_diff_chars = 500000

[git]
binary = "git"
reaction_timeout_ms = 1500

[editor.overrides]
"diffEditor.renderSideBySide" = false

# [state]
# data_dir = "~/.local/share/mergepane"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Validate with: mergepane validate --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All values are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Default layout    : {}", config.layout.default);
    println!(
        "  Scroll sync       : {}",
        if config.scroll.enabled { "enabled" } else { "disabled" }
    );
    println!("  Surrounding lines : {}", config.scroll.surrounding_lines);
    println!("  Git binary        : {}", config.git.binary.display());
    println!("  Setting overrides : {}", config.editor.overrides.len());
    println!("  State database    : {}", config.state.database_path().display());

    Ok(())
}
