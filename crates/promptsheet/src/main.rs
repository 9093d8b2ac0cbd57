//! Fill the AI columns of a sheet from the command line.
//!
//! Loads a preset, applies edits, runs one sweep and prints the grid.
//!
//! # Examples
//!
//! ```sh
//! # Students preset against the hosted classifier
//! promptsheet --template students
//!
//! # Through a running sheet server's relay, with an edit first
//! promptsheet --relay http://localhost:3001 --set 1:Major="Civil Engineering"
//!
//! # No network: keyword heuristic, JSON output
//! promptsheet --offline --json
//!
//! # Custom presets and prompts
//! promptsheet --preset-file presets.json --template research \
//!   --prompt "Summary=Summarise @Abstract in one line" -v
//! ```

use std::time::Duration;

use clap::Parser;
use promptsheet::client::{Completer, HeuristicCompleter, HttpCompleter};
use promptsheet::config::ClientConfig;
use promptsheet::events::LoggingHandler;
use promptsheet::preset::PresetLibrary;
use promptsheet::sheet::{self, Column, Sheet};
use promptsheet::sweep::sweep;
use serde_json::{Map, Value};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Fill the AI columns of a sheet and print the result.
#[derive(Parser)]
#[command(name = "promptsheet")]
struct Cli {
    // ── Sheet ──────────────────────────────────────────────────
    /// Preset to start from
    #[arg(long, short, default_value = "students")]
    template: String,

    /// JSON file with extra presets (one object or an array)
    #[arg(long = "preset-file")]
    preset_files: Vec<String>,

    /// List available presets and exit
    #[arg(long)]
    list: bool,

    /// Set a cell before the sweep: ROW:COLUMN=VALUE (row is 0-based; the
    /// row after the last one appends a new row)
    #[arg(long = "set", value_name = "ROW:COLUMN=VALUE")]
    sets: Vec<String>,

    /// Make a column AI-triggered: COLUMN=PROMPT
    #[arg(long = "prompt", value_name = "COLUMN=PROMPT")]
    prompts: Vec<String>,

    // ── Endpoint ───────────────────────────────────────────────
    /// Full URL prompts are POSTed to
    #[arg(long, conflicts_with_all = ["upstream", "relay", "offline"])]
    endpoint: Option<String>,

    /// Base URL of a classification service (POSTs to /check-engineer)
    #[arg(long, conflicts_with_all = ["relay", "offline"])]
    upstream: Option<String>,

    /// Base URL of a sheet server (POSTs to /api/ai-proxy)
    #[arg(long, conflicts_with = "offline")]
    relay: Option<String>,

    /// Answer with the built-in keyword heuristic instead of a network call
    #[arg(long)]
    offline: bool,

    /// Retries for transient failures (429, 5xx, connection errors)
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    // ── Output ─────────────────────────────────────────────────
    /// Print rows as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut library = PresetLibrary::builtin();
    for path in &cli.preset_files {
        library.load_file(path).map_err(|e| e.to_string())?;
    }

    if cli.list {
        for preset in library.list() {
            println!("{:<16} {}", preset.id, preset.name);
        }
        return Ok(());
    }

    let mut sheet = library
        .instantiate(&cli.template)
        .map_err(|e| e.to_string())?;
    apply_edits(&mut sheet, &cli)?;

    let completer = build_completer(&cli)?;
    let shared = Mutex::new(sheet);
    let report = sweep(&shared, completer.as_ref(), &LoggingHandler).await;
    info!(
        "{} updated, {} failed, {} stale",
        report.updated, report.failed, report.stale
    );

    let sheet = sheet::lock(&shared);
    if cli.json {
        let rows = rows_as_json(&sheet);
        let text = serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        print!("{}", render_table(&sheet));
    }

    if report.failed > 0 {
        return Err(format!("{} cell(s) could not be computed", report.failed));
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

fn build_completer(cli: &Cli) -> Result<Box<dyn Completer>, String> {
    if cli.offline {
        return Ok(Box::new(HeuristicCompleter));
    }
    let config = if let Some(url) = &cli.endpoint {
        ClientConfig::new(url.as_str())
    } else if let Some(base) = &cli.upstream {
        ClientConfig::upstream(base)
    } else if let Some(server) = &cli.relay {
        ClientConfig::relay(server)
    } else {
        ClientConfig::from_env()
    };
    let config = config
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_retries(cli.retries);
    let client = HttpCompleter::new(&config).map_err(|e| e.to_string())?;
    info!("sending prompts to {}", client.endpoint());
    Ok(Box::new(client))
}

fn apply_edits(sheet: &mut Sheet, cli: &Cli) -> Result<(), String> {
    for spec in &cli.prompts {
        let (column, prompt) = spec
            .split_once('=')
            .ok_or_else(|| format!("--prompt expects COLUMN=PROMPT, got '{spec}'"))?;
        if sheet.column(column).is_none() {
            sheet
                .push_column(Column::regular(column))
                .map_err(|e| e.to_string())?;
        }
        sheet.set_prompt(column, prompt).map_err(|e| e.to_string())?;
    }
    for spec in &cli.sets {
        let (row, column, value) = parse_set(spec)?;
        let rows = sheet.rows().len();
        if row > rows {
            return Err(format!("--set row {row} is out of range: the sheet has {rows} rows"));
        }
        if row == rows {
            sheet.add_row();
        }
        sheet
            .update_cell(row, column, value)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Split `ROW:COLUMN=VALUE`.
fn parse_set(spec: &str) -> Result<(usize, &str, &str), String> {
    let invalid = || format!("--set expects ROW:COLUMN=VALUE, got '{spec}'");
    let (target, value) = spec.split_once('=').ok_or_else(invalid)?;
    let (row, column) = target.split_once(':').ok_or_else(invalid)?;
    let row = row.trim().parse::<usize>().map_err(|_| invalid())?;
    Ok((row, column, value))
}

fn rows_as_json(sheet: &Sheet) -> Vec<Value> {
    sheet
        .rows()
        .iter()
        .map(|row| {
            let obj: Map<String, Value> = sheet
                .columns()
                .iter()
                .map(|c| {
                    let v = row.get(&c.name).unwrap_or_default();
                    (c.name.clone(), Value::String(v.to_string()))
                })
                .collect();
            Value::Object(obj)
        })
        .collect()
}

fn render_table(sheet: &Sheet) -> String {
    let headers: Vec<String> = sheet
        .columns()
        .iter()
        .map(|c| {
            if c.is_ai_trigger() {
                format!("{} (AI)", c.name)
            } else {
                c.name.clone()
            }
        })
        .collect();
    let cells: Vec<Vec<&str>> = sheet
        .rows()
        .iter()
        .map(|row| {
            sheet
                .columns()
                .iter()
                .map(|c| row.get(&c.name).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = format!("# {}\n", sheet.name());
    out.push_str(&line(headers.iter().map(String::as_str).collect()));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("-+-")));
    for row in cells {
        out.push_str(&line(row));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_splits_row_column_value() {
        assert_eq!(
            parse_set("1:Major=Civil Engineering").unwrap(),
            (1, "Major", "Civil Engineering")
        );
        assert_eq!(parse_set("0:Note=a=b").unwrap(), (0, "Note", "a=b"));
        assert!(parse_set("x:Major=1").is_err());
        assert!(parse_set("Major=1").is_err());
    }

    #[test]
    fn set_appends_at_most_one_row() {
        let mut sheet = PresetLibrary::builtin().instantiate("students").unwrap();
        let cli =
            Cli::try_parse_from(["promptsheet", "--set", "3:Major=Civil Engineering"]).unwrap();
        apply_edits(&mut sheet, &cli).unwrap();
        assert_eq!(sheet.rows().len(), 4);
        assert_eq!(sheet.rows()[3].get("Major"), Some("Civil Engineering"));

        let huge = format!("{}:Major=x", usize::MAX);
        let cli = Cli::try_parse_from(["promptsheet", "--set", huge.as_str()]).unwrap();
        let err = apply_edits(&mut sheet, &cli).unwrap_err();
        assert!(err.contains("out of range"), "{err}");
        assert_eq!(sheet.rows().len(), 4);
    }

    #[test]
    fn table_lists_every_row() {
        let sheet = PresetLibrary::builtin().instantiate("students").unwrap();
        let table = render_table(&sheet);
        assert!(table.starts_with("# Students\n"));
        assert!(table.contains("isEngineer (AI)"));
        assert_eq!(table.lines().count(), 2 + 1 + 3);
    }

    #[test]
    fn json_rows_keep_column_order() {
        let sheet = PresetLibrary::builtin().instantiate("students").unwrap();
        let rows = rows_as_json(&sheet);
        let keys: Vec<&str> = rows[0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["First name", "Last name", "Major", "isEngineer"]);
    }

    #[test]
    fn cli_rejects_conflicting_endpoints() {
        assert!(Cli::try_parse_from(["promptsheet", "--offline", "--relay", "http://x"]).is_err());
        let cli = Cli::try_parse_from(["promptsheet", "-vv", "--set", "0:Major=Art"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.template, "students");
    }
}
