use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};
use symdb::error::IndexError;
use symdb::output::{
    json_response, ErrorResponse, KindCountResponse, NameResponse, OccurrenceMatch,
    OccurrenceResponse, OutputFormat, StatsResponse,
};
use symdb::output_common::{
    format_occurrence_lines, format_partial_footer, format_total_header, is_json_format,
    render_json_response,
};
use symdb::store::load_store_library;
use symdb::{Index, IndexOptions, NamePattern, SymbolKind, SymbolOccurrenceRef, SymbolRoleSet};

#[derive(Parser)]
#[command(
    name = "symdb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Query a persisted source symbol index"
)]
struct Cli {
    #[arg(long, global = true, default_value_t = OutputFormat::Human)]
    output: OutputFormat,

    /// Symbol store to read
    #[arg(long, global = true, env = "SYMDB_STORE")]
    store: Option<PathBuf>,

    /// Index state directory (defaults to `<store>.d`)
    #[arg(long, global = true, env = "SYMDB_DATABASE")]
    database: Option<PathBuf>,

    /// Never write to disk
    #[arg(long, global = true)]
    readonly: bool,

    /// Pick up store commits before every query
    #[arg(long, global = true)]
    listen: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Occurrences of a symbol by USR
    #[command(after_help = USR_EXAMPLES)]
    Usr {
        usr: String,
        /// Comma-separated role filter (e.g. definition,call)
        #[arg(long, default_value = "")]
        roles: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Occurrences that carry a relation to a symbol
    Related {
        usr: String,
        #[arg(long, default_value = "")]
        roles: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Occurrences at an exact position, given as path:line:column
    At {
        location: String,
        #[arg(long, default_value = "")]
        roles: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Every distinct symbol name
    Names {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Canonical occurrences of symbols with an exact name
    Canonical {
        name: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Canonical occurrences of symbols whose name matches a pattern
    #[command(after_help = FIND_EXAMPLES)]
    Find {
        pattern: String,
        #[arg(long)]
        anchor_start: bool,
        #[arg(long)]
        anchor_end: bool,
        #[arg(long)]
        subsequence: bool,
        #[arg(long, short = 'i')]
        ignore_case: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Canonical occurrences of symbols of a kind
    Kind {
        kind: String,
        #[arg(long)]
        workspace_only: bool,
        /// Print only the number of symbols
        #[arg(long)]
        count: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Store counts and query statistics
    Stats,
    /// Wait until pending store updates are visible
    Wait,
}

const USR_EXAMPLES: &str = r#"
EXAMPLES:
  # All occurrences of a function
  symdb --store index.db usr c:@F@main

  # Only definitions, as JSON
  symdb --store index.db usr c:@F@main --roles definition --output json
"#;

const FIND_EXAMPLES: &str = r#"
EXAMPLES:
  # Fuzzy, case-insensitive ("fb" finds fooBar)
  symdb --store index.db find fb --subsequence -i

  # Names starting with "parse"
  symdb --store index.db find parse --anchor-start
"#;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = dispatch(&cli) {
        emit_error(&cli, &err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn dispatch(cli: &Cli) -> Result<(), IndexError> {
    let index = open_index(cli)?;
    match &cli.command {
        Command::Usr { usr, roles, limit } => {
            let filter = parse_roles(roles)?;
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_symbol_occurrence_by_usr(usr, filter, receiver)
            });
            output_occurrences(cli, usr, filter, results, partial)
        }
        Command::Related { usr, roles, limit } => {
            let filter = parse_roles(roles)?;
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_related_symbol_occurrence_by_usr(usr, filter, receiver)
            });
            output_occurrences(cli, usr, filter, results, partial)
        }
        Command::At {
            location,
            roles,
            limit,
        } => {
            let filter = parse_roles(roles)?;
            let (path, line, column) = parse_location(location)?;
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_symbol_occurrence_at_location(&path, line, column, filter, receiver)
            });
            output_occurrences(cli, location, filter, results, partial)
        }
        Command::Names { limit } => {
            let mut names = Vec::new();
            let exhausted = index.foreach_symbol_name(|name| {
                if limit.is_some_and(|l| names.len() >= l) {
                    return false;
                }
                names.push(name.to_string());
                true
            });
            output_names(cli, names, !exhausted)
        }
        Command::Canonical { name, limit } => {
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_canonical_symbol_occurrence_by_name(name, receiver)
            });
            output_occurrences(cli, name, SymbolRoleSet::empty(), results, partial)
        }
        Command::Find {
            pattern,
            anchor_start,
            anchor_end,
            subsequence,
            ignore_case,
            limit,
        } => {
            let matcher = NamePattern::with_options(
                pattern,
                *anchor_start,
                *anchor_end,
                *subsequence,
                *ignore_case,
            );
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_canonical_symbol_occurrence_containing_pattern(&matcher, receiver)
            });
            output_occurrences(cli, pattern, SymbolRoleSet::empty(), results, partial)
        }
        Command::Kind {
            kind,
            workspace_only,
            count,
            limit,
        } => {
            let parsed = SymbolKind::from_label(kind).ok_or_else(|| IndexError::InvalidArgument {
                reason: format!("unknown symbol kind '{}'", kind),
            })?;
            if *count {
                let total = index.count_of_canonical_symbols_with_kind(parsed, *workspace_only);
                return output_kind_count(cli, parsed, *workspace_only, total as u64);
            }
            let (results, partial) = collect_occurrences(*limit, |receiver| {
                index.foreach_canonical_symbol_occurrence_by_kind(parsed, *workspace_only, receiver)
            });
            output_occurrences(cli, kind, SymbolRoleSet::empty(), results, partial)
        }
        Command::Stats => output_stats(cli, &index),
        Command::Wait => {
            index.poll_for_unit_changes_and_wait();
            output_stats(cli, &index)
        }
    }
}

fn open_index(cli: &Cli) -> Result<Index, IndexError> {
    let store = cli.store.as_deref().ok_or_else(|| IndexError::InvalidArgument {
        reason: "no store given (use --store or SYMDB_STORE)".to_string(),
    })?;
    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| default_database_path(store));
    let library = load_store_library(store)?;
    let options = IndexOptions::default()
        .readonly(cli.readonly)
        .listen_for_updates(cli.listen);
    Index::open(
        store,
        &database,
        &move |_: &str| Some(library.clone()),
        options,
    )
}

fn default_database_path(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_os_string();
    name.push(".d");
    PathBuf::from(name)
}

fn parse_roles(value: &str) -> Result<SymbolRoleSet, IndexError> {
    SymbolRoleSet::parse_list(value).map_err(|reason| IndexError::InvalidArgument { reason })
}

fn parse_location(value: &str) -> Result<(String, u32, u32), IndexError> {
    let invalid = || IndexError::InvalidArgument {
        reason: format!("expected path:line:column, got '{}'", value),
    };
    let re = Regex::new(r"^(.+):(\d+):(\d+)$").map_err(|_| invalid())?;
    let caps = re.captures(value).ok_or_else(invalid)?;
    let line = caps[2].parse::<u32>().map_err(|_| invalid())?;
    let column = caps[3].parse::<u32>().map_err(|_| invalid())?;
    Ok((caps[1].to_string(), line, column))
}

/// Runs `query` and gathers at most `limit` matches. The flag is true when
/// the limit cut the stream short.
fn collect_occurrences(
    limit: Option<usize>,
    query: impl FnOnce(&mut dyn FnMut(&SymbolOccurrenceRef) -> bool) -> bool,
) -> (Vec<OccurrenceMatch>, bool) {
    let mut results = Vec::new();
    let exhausted = query(&mut |occ| {
        if limit.is_some_and(|l| results.len() >= l) {
            return false;
        }
        results.push(OccurrenceMatch::from_occurrence(occ));
        true
    });
    (results, !exhausted)
}

fn output_occurrences(
    cli: &Cli,
    query: &str,
    filter: SymbolRoleSet,
    results: Vec<OccurrenceMatch>,
    partial: bool,
) -> Result<(), IndexError> {
    if is_json_format(cli.output) {
        let response = OccurrenceResponse {
            total_count: results.len() as u64,
            results,
            query: query.to_string(),
            role_filter: (!filter.is_empty()).then(|| filter.to_string()),
        };
        println!("{}", render_json_response(&response, partial, cli.output)?);
        return Ok(());
    }
    println!("{}", format_total_header(results.len() as u64));
    for occurrence in &results {
        for line in format_occurrence_lines(occurrence) {
            println!("{}", line);
        }
    }
    if partial {
        println!("{}", format_partial_footer());
    }
    Ok(())
}

fn output_names(cli: &Cli, names: Vec<String>, partial: bool) -> Result<(), IndexError> {
    if is_json_format(cli.output) {
        let response = NameResponse {
            total_count: names.len() as u64,
            results: names,
        };
        println!("{}", render_json_response(&response, partial, cli.output)?);
        return Ok(());
    }
    println!("{}", format_total_header(names.len() as u64));
    for name in &names {
        println!("{}", name);
    }
    if partial {
        println!("{}", format_partial_footer());
    }
    Ok(())
}

fn output_kind_count(
    cli: &Cli,
    kind: SymbolKind,
    workspace_only: bool,
    total: u64,
) -> Result<(), IndexError> {
    if is_json_format(cli.output) {
        let response = KindCountResponse {
            kind: kind.label(),
            workspace_only,
            total_count: total,
        };
        println!("{}", render_json_response(&response, false, cli.output)?);
        return Ok(());
    }
    println!("{}", format_total_header(total));
    Ok(())
}

fn output_stats(cli: &Cli, index: &Index) -> Result<(), IndexError> {
    let response = StatsResponse {
        store_path: index.store_path().map(|p| p.display().to_string()),
        library: index.library().map(|lib| lib.name().to_string()),
        stats: index.stats(),
    };
    if is_json_format(cli.output) {
        println!("{}", render_json_response(&response, false, cli.output)?);
        return Ok(());
    }
    let store = response.stats.store;
    if let Some(path) = &response.store_path {
        println!("store: {}", path);
    }
    if let Some(library) = &response.library {
        println!("library: {}", library);
    }
    println!("units: {}", store.units);
    println!("symbols: {}", store.symbols);
    println!("occurrences: {}", store.occurrences);
    println!("files: {}", store.files);
    Ok(())
}

fn emit_error(cli: &Cli, err: &IndexError) {
    match cli.output {
        OutputFormat::Human => {
            eprintln!("ERROR [{}]: {}", err.error_code(), err);
            if let Some(hint) = err.remediation() {
                eprintln!("Hint: {}", hint);
            }
        }
        OutputFormat::Json | OutputFormat::Pretty => {
            let error = ErrorResponse {
                code: err.error_code().to_string(),
                error: err.severity().to_string(),
                message: err.to_string(),
                remediation: err.remediation().map(|s| s.to_string()),
            };
            let response = json_response(error);
            let result = if matches!(cli.output, OutputFormat::Pretty) {
                serde_json::to_string_pretty(&response)
            } else {
                serde_json::to_string(&response)
            };
            match result {
                Ok(payload) => println!("{}", payload),
                Err(ser_err) => eprintln!("ERROR: {}", ser_err),
            }
        }
    }
}
