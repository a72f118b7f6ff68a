use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use curator_core::{CuratorConfig, CuratorError, ExitCode};
use curator_dedup::{
    Classifier, RestoreReport, RunOptions, RunReport, ThemeVocabulary, ValidationReport,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "curator",
    about = "Deduplicate the record catalog embedded in a page",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting CURATOR_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of ~/.config/curator/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove duplicates, rewrite the catalog and append the audit log.
    Run {
        file: PathBuf,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Classify and report without writing anything.
    Scan {
        file: PathBuf,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Parse every record and check the display count.
    Validate {
        file: PathBuf,
        #[arg(long)]
        array: Option<String>,
    },

    /// Put a dropped record back from the audit log.
    Restore {
        file: PathBuf,
        /// Audit entry id or a unique prefix of it.
        #[arg(long)]
        entry: String,
        #[arg(long)]
        audit_log: Option<PathBuf>,
        #[arg(long)]
        array: Option<String>,
        #[arg(long)]
        no_backup: bool,
    },

    /// List the theme vocabulary used by thematic caps.
    Themes,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path.
    Path,
}

/// Per-run overrides of the `[policy]`, `[container]` and `[backup]` config.
#[derive(Args)]
struct PolicyArgs {
    /// Only remove records whose normalized title and description are identical.
    #[arg(long)]
    exact_only: bool,

    /// Title similarity at which two records are near duplicates (0.0..=1.0).
    #[arg(long)]
    threshold: Option<f64>,

    /// Keep at most N records of a theme, e.g. `--cap bicycle=2`.
    #[arg(long, value_parser = parse_cap, action = clap::ArgAction::Append)]
    cap: Vec<(String, usize)>,

    /// Name of the record array variable.
    #[arg(long)]
    array: Option<String>,

    /// Where to append audit entries.
    #[arg(long)]
    audit_log: Option<PathBuf>,

    #[arg(long)]
    no_backup: bool,
}

impl PolicyArgs {
    fn apply(self, config: &mut CuratorConfig) -> RunOptions {
        if self.exact_only {
            config.policy.exact_only = true;
        }
        if let Some(threshold) = self.threshold {
            config.policy.near_duplicate.title_threshold = threshold;
        }
        for (theme, cap) in self.cap {
            config.policy.thematic_caps.insert(theme, cap);
        }
        if let Some(array) = self.array {
            config.container.array_name = array;
        }
        if self.no_backup {
            config.backup.enabled = false;
        }

        RunOptions {
            dry_run: false,
            audit_log: self.audit_log,
        }
    }
}

fn parse_cap(raw: &str) -> std::result::Result<(String, usize), String> {
    let (theme, cap) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected THEME=N, got `{raw}`"))?;
    let theme = theme.trim();
    if theme.is_empty() {
        return Err(format!("missing theme name in `{raw}`"));
    }
    let cap = cap
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid cap in `{raw}`: {e}"))?;
    Ok((theme.to_string(), cap))
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing();

    let json_output = cli.json || std::env::var("CURATOR_JSON").as_deref() == Ok("1");

    if let Err(err) = execute(cli, json_output, start) {
        let code = err
            .downcast_ref::<CuratorError>()
            .map_or(ExitCode::GeneralError, CuratorError::exit_code);

        if json_output {
            let _ = print_json(&serde_json::json!({
                "status": "error",
                "error": error_kind(code),
                "message": format!("{err:#}"),
                "meta": { "duration_ms": start.elapsed().as_millis() }
            }));
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn execute(cli: Cli, json_output: bool, start: Instant) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(CuratorConfig::config_path);
    let mut config = CuratorConfig::load_from(&config_path)?;
    debug!(path = %config_path.display(), "config loaded");

    match cli.command {
        Commands::Run { file, policy } => {
            let options = policy.apply(&mut config);
            let report = curator_dedup::run(&file, &config, &options)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                print_run_report(&report);
            }
        }

        Commands::Scan { file, policy } => {
            policy.apply(&mut config);
            let report = curator_dedup::scan(&file, &config)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                print_run_report(&report);
            }
        }

        Commands::Validate { file, array } => {
            if let Some(array) = array {
                config.container.array_name = array;
            }
            let report = curator_dedup::validate(&file, &config)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                print_validation_report(&report);
            }
        }

        Commands::Restore {
            file,
            entry,
            audit_log,
            array,
            no_backup,
        } => {
            if let Some(array) = array {
                config.container.array_name = array;
            }
            if no_backup {
                config.backup.enabled = false;
            }
            let report = curator_dedup::restore(&file, &config, &entry, audit_log.as_deref())?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                print_restore_report(&report);
            }
        }

        Commands::Themes => {
            let classifier = Classifier::from_policy(&config.policy)?;
            let vocabulary: &ThemeVocabulary = classifier.vocabulary();
            let dur = start.elapsed().as_millis();

            if json_output {
                let items: Vec<serde_json::Value> = vocabulary
                    .iter()
                    .map(|theme| {
                        serde_json::json!({
                            "name": theme.name,
                            "keywords": theme.keywords,
                            "builtin": theme.builtin,
                            "cap": config.policy.thematic_caps.get(&theme.name),
                        })
                    })
                    .collect();
                print_json(&serde_json::json!({"status":"ok","data":items,"meta":{"duration_ms":dur}}))?;
            } else {
                for theme in vocabulary.iter() {
                    let cap = config
                        .policy
                        .thematic_caps
                        .get(&theme.name)
                        .map(|cap| format!("  (cap {cap})"))
                        .unwrap_or_default();
                    let origin = if theme.builtin { "" } else { "  [custom]" };
                    println!(
                        "{name:<16} {keywords}{origin}{cap}",
                        name = theme.name,
                        keywords = theme.keywords.join(", "),
                    );
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if json_output {
                    let dur = start.elapsed().as_millis();
                    print_json(&serde_json::json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                } else {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ConfigAction::Path => {
                if json_output {
                    print_json(&serde_json::json!({"status":"ok","data":{"path":config_path,"exists":config_path.exists()}}))?;
                } else {
                    println!("{}", config_path.display());
                }
            }
        },
    }

    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────────────

fn print_run_report(report: &RunReport) {
    let verb = if report.dry_run { "would remove" } else { "removed" };
    println!(
        "{}: {} → {} records ({verb} {})",
        report.source.display(),
        report.before_count,
        report.after_count,
        report.removed(),
    );
    if let Some(display) = report.display_count_before
        && display != report.before_count
    {
        println!("  display count was {display}");
    }

    for entry in &report.entries {
        let detail = match (&entry.theme, entry.cap, entry.title_similarity) {
            (Some(theme), Some(cap), _) => format!("theme {theme}, cap {cap}"),
            (_, _, Some(title)) => format!(
                "title {:.2}, description {:.2}",
                title,
                entry.description_similarity.unwrap_or_default()
            ),
            _ => String::new(),
        };
        let detail = if entry.survivor_capped {
            format!("{detail} (survivor capped)")
        } else {
            detail
        };
        println!(
            "  {id}  #{pos:<4} line {line:<5} {title:<40} [{rule}] kept #{kept} {kept_title:?} {detail}",
            id = entry.short_id(),
            pos = entry.dropped.position,
            line = entry.dropped.line,
            title = format!("{:?}", entry.dropped.title),
            rule = entry.rule,
            kept = entry.survivor.position,
            kept_title = entry.survivor.title,
        );
    }

    if !report.census.is_empty() {
        println!("\nThemes:");
        for count in &report.census {
            let cap = count.cap.map(|cap| format!("  cap {cap}")).unwrap_or_default();
            println!(
                "  {theme:<16} {before:>4} → {after:<4}{cap}",
                theme = count.theme,
                before = count.before,
                after = count.after,
            );
        }
    }

    if report.written {
        if let Some(backup) = &report.backup_path {
            println!("backup: {}", backup.display());
        }
        if let Some(audit) = &report.audit_path {
            println!("audit:  {}", audit.display());
        }
    } else if !report.dry_run {
        println!("nothing to write");
    }
}

fn print_validation_report(report: &ValidationReport) {
    println!("{}: {} records", report.source.display(), report.records);
    match report.display_count {
        Some(display) if report.count_in_sync => {
            println!("  display count {display} ({} sites) is correct", report.count_sites);
        }
        Some(display) => println!(
            "  display count {display} does not match {} records",
            report.records
        ),
        None => println!("  no display count found"),
    }
}

fn print_restore_report(report: &RestoreReport) {
    println!(
        "restored {:?} at #{} (line {}) in {}: {} → {} records",
        report.restored.title,
        report.restored.position,
        report.restored.line,
        report.source.display(),
        report.before_count,
        report.after_count,
    );
    if let Some(backup) = &report.backup_path {
        println!("backup: {}", backup.display());
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn error_kind(code: ExitCode) -> &'static str {
    match code {
        ExitCode::Success => "ok",
        ExitCode::GeneralError => "error",
        ExitCode::NotFound => "not_found",
        ExitCode::ParseError => "parse_error",
        ExitCode::ClassificationError => "classification_error",
        ExitCode::WriteError => "write_error",
        ExitCode::ConfigError => "config_error",
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CURATOR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
