use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::Serialize;

use sesame_client::{Item, SecretService};
use sesame_core::config::{self, Config};
use sesame_core::{Error, SERVICE_PATH};

/// Exit status for `introspect` on a path the service does not know.
const EXIT_NOT_FOUND: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    // Reset SIGPIPE to default so piping output to `head` etc. exits cleanly
    // instead of panicking with "broken pipe".
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = take_config_flag(&mut args)?;
    let config = Config::load(&config_path)?;
    init_logging(&config);
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let cmd = args.first().map(String::as_str).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    // Dropping the command future on Ctrl-C cancels any prompt wait and
    // releases its signal subscription.
    let outcome = tokio::select! {
        outcome = run(cmd, &args[1..], &config) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            std::process::exit(130);
        }
    };

    if let Err(err) = outcome {
        if let Some(domain) = err.downcast_ref::<Error>().filter(|e| e.is_domain()) {
            eprintln!("error: {domain}");
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cmd: &str, args: &[String], config: &Config) -> Result<()> {
    match cmd {
        "collection" | "collections" => cmd_collection(args, config).await,
        "alias" => cmd_alias(args, config).await,
        "search" => cmd_search(args, config).await,
        "introspect" => cmd_introspect(args, config).await,
        other => {
            eprintln!("unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        "\
sesame - freedesktop Secret Service client

USAGE:
    sesame [--config <path>] <command> [args...]

COMMANDS:
    collection <subcommand>             Manage collections (alias: collections)
      list                              List collections in service order
      create <label> [alias]            Create a collection (may show a prompt)
      delete [-i|-f] <name>...          Delete collections by name
    alias get <name>                    Print the collection an alias points to
    search --collection <name> [--format=<fmt>] [key=value]...
                                        List items of a collection, filtered by attributes
    introspect [path]                   Print introspection XML (exit 2 if not found)
    help                                Show this help

DELETE FLAGS:
    -i, --interactive                   Ask before deleting each collection
    -f, --force                         Never ask; ignore names that do not exist

OUTPUT FORMATS (--format):
    table                               Aligned columns: ID | LABEL | ATTRIBUTES  [default]
    kv                                  Key=value pairs, one attribute per line per item
    json                                JSON array of objects

SEARCH FILTERS:
    key=value pairs are ANDed. Values may be glob patterns (* and ?);
    the key 'name' matches the item label.

CONFIG:
    Default file: $XDG_CONFIG_HOME/sesame/config.toml
    RUST_LOG overrides [log] filter.

EXAMPLES:
    sesame collection list
    sesame collection create Work
    sesame collection delete -i work scratch
    sesame alias get default
    sesame search --collection login service=github*
    sesame introspect collection/login"
    );
}

/// Remove `--config <path>`, `-c <path>` or `--config=<path>` from `args`,
/// returning the chosen path or the XDG default.
fn take_config_flag(args: &mut Vec<String>) -> Result<PathBuf> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" || args[i] == "-c" {
            if i + 1 >= args.len() {
                bail!("{} requires a value", args[i]);
            }
            let path = args.remove(i + 1);
            args.remove(i);
            return Ok(PathBuf::from(path));
        }
        if let Some(p) = args[i].strip_prefix("--config=") {
            let path = PathBuf::from(p);
            args.remove(i);
            return Ok(path);
        }
        i += 1;
    }
    Ok(config::default_config_path())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn connect(config: &Config) -> Result<SecretService> {
    Ok(SecretService::connect(config).await?)
}

// ---------------------------------------------------------------------------
// collection
// ---------------------------------------------------------------------------

async fn cmd_collection(args: &[String], config: &Config) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("list") => cmd_collection_list(config).await,
        Some("create") => cmd_collection_create(&args[1..], config).await,
        Some("delete") => cmd_collection_delete(&args[1..], config).await,
        Some(other) => bail!("unknown collection subcommand: {other}"),
        None => bail!("usage: sesame collection <list|create|delete> [args...]"),
    }
}

async fn cmd_collection_list(config: &Config) -> Result<()> {
    let ss = connect(config).await?;
    for collection in ss.collections().await? {
        println!("{}", collection.name());
    }
    Ok(())
}

async fn cmd_collection_create(args: &[String], config: &Config) -> Result<()> {
    let (label, alias) = match args {
        [label] => (label.as_str(), None),
        [label, alias] => (label.as_str(), Some(alias.as_str())),
        _ => bail!("usage: sesame collection create <label> [alias]"),
    };
    let ss = connect(config).await?;
    let collection = ss.create_collection(label, alias).await?;
    println!("{}", collection.name());
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DeleteArgs {
    interactive: bool,
    force: bool,
    names: Vec<String>,
}

impl DeleteArgs {
    /// Flags may appear anywhere; the last of -i/-f wins, as with rm.
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = Self::default();
        for arg in args {
            match arg.as_str() {
                "-i" | "--interactive" => {
                    parsed.interactive = true;
                    parsed.force = false;
                }
                "-f" | "--force" => {
                    parsed.force = true;
                    parsed.interactive = false;
                }
                flag if flag.starts_with('-') => bail!("unknown flag: {flag}"),
                name => parsed.names.push(name.to_string()),
            }
        }
        if parsed.names.is_empty() {
            bail!("usage: sesame collection delete [-i|-f] <name>...");
        }
        Ok(parsed)
    }
}

/// Delete each named collection in turn. A failure is reported against its
/// name and the batch carries on; the exit status is 1 if any failed.
async fn cmd_collection_delete(args: &[String], config: &Config) -> Result<()> {
    let args = DeleteArgs::parse(args)?;
    let ss = connect(config).await?;
    if delete_collections(&ss, &args, confirm, &mut io::stderr()).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Run a delete batch, writing one `error: <name>: ..` line per failed name
/// to `errors`. Returns whether any name failed. Failures outside the domain
/// taxonomy abort the batch.
async fn delete_collections(
    ss: &SecretService,
    args: &DeleteArgs,
    mut confirm: impl FnMut(&str) -> Result<bool>,
    errors: &mut impl Write,
) -> Result<bool> {
    let mut failed = false;
    for name in &args.names {
        if args.interactive && !confirm(&format!("delete collection '{name}'? [y/N] "))? {
            continue;
        }
        let collection = ss.collection(name);
        match ss.delete_collection(&collection).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) if args.force => {}
            Err(err) if err.is_domain() => {
                writeln!(errors, "error: {name}: {err}")?;
                failed = true;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(failed)
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question}");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

// ---------------------------------------------------------------------------
// alias
// ---------------------------------------------------------------------------

async fn cmd_alias(args: &[String], config: &Config) -> Result<()> {
    let name = match args {
        [sub, name] if sub == "get" => name,
        _ => bail!("usage: sesame alias get <name>"),
    };
    let ss = connect(config).await?;
    let collection = ss.collection_by_alias(name).await?;
    println!("{}", collection.name());
    Ok(())
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Output format for `sesame search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Kv,
    Json,
}

impl OutputFormat {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(Self::Table),
            "kv" => Some(Self::Kv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SearchArgs {
    collection: String,
    format: OutputFormat,
    filters: HashMap<String, String>,
}

impl SearchArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut collection = None;
        let mut format = OutputFormat::Table;
        let mut filters = HashMap::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--collection" {
                let Some(name) = iter.next() else {
                    bail!("--collection requires a value");
                };
                collection = Some(name.clone());
            } else if let Some(name) = arg.strip_prefix("--collection=") {
                collection = Some(name.to_string());
            } else if let Some(fmt) = arg.strip_prefix("--format=") {
                format = OutputFormat::parse(fmt).ok_or_else(|| {
                    anyhow::anyhow!("unknown format '{fmt}' (expected table, kv or json)")
                })?;
            } else if let Some((key, value)) = arg.split_once('=') {
                filters.insert(key.to_string(), value.to_string());
            } else {
                bail!("unexpected argument: {arg}");
            }
        }

        let Some(collection) = collection else {
            bail!("usage: sesame search --collection <name> [--format=<fmt>] [key=value]...");
        };
        Ok(Self {
            collection,
            format,
            filters,
        })
    }

    /// Filters the service can answer itself with `SearchItems`: exact
    /// attribute values, no label matching.
    fn exact_filters(&self) -> bool {
        !self.filters.is_empty()
            && self
                .filters
                .iter()
                .all(|(key, value)| key != "name" && !is_glob(value))
    }
}

/// All data fetched for a single search result item.
#[derive(Debug, Serialize)]
struct ItemSummary {
    id: String,
    label: String,
    attributes: HashMap<String, String>,
    path: String,
}

/// Returns true if the value string contains any wildmatch glob metacharacters.
fn is_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Returns true if all glob/exact filters match the item summary.
/// The special key `"name"` matches the item label.
fn glob_matches(item: &ItemSummary, filters: &HashMap<String, String>) -> bool {
    filters.iter().all(|(key, pattern)| {
        let value = if key == "name" {
            item.label.as_str()
        } else {
            item.attributes
                .get(key.as_str())
                .map(String::as_str)
                .unwrap_or("")
        };
        wildmatch::WildMatch::new(pattern).matches(value)
    })
}

async fn summarize(ss: &SecretService, item: &Item) -> Result<ItemSummary> {
    Ok(ItemSummary {
        id: item.name().to_string(),
        label: ss.item_label(item).await?,
        attributes: ss.attributes(item).await?,
        path: item.path(),
    })
}

async fn cmd_search(args: &[String], config: &Config) -> Result<()> {
    let args = SearchArgs::parse(args)?;
    let ss = connect(config).await?;
    let collection = ss.collection(&args.collection);

    let items = if args.exact_filters() {
        ss.search_items(&collection, &args.filters).await?
    } else {
        ss.items(&collection).await?
    };

    let mut summaries = Vec::with_capacity(items.len());
    for item in &items {
        let summary = summarize(&ss, item).await?;
        if glob_matches(&summary, &args.filters) {
            summaries.push(summary);
        }
    }

    match args.format {
        OutputFormat::Table => print_search_table(&summaries),
        OutputFormat::Kv => print_search_kv(&summaries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
    }
    Ok(())
}

/// Truncate a string to `max` display chars, appending `…` if cut.
fn trunc(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

fn sorted_attributes(attributes: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut sorted: Vec<_> = attributes.iter().collect();
    sorted.sort();
    sorted
}

/// Print results as an aligned table: ID | LABEL | ATTRIBUTES.
fn print_search_table(items: &[ItemSummary]) {
    const H_ID: &str = "ID";
    const H_LABEL: &str = "LABEL";
    const MAX_ID: usize = 20;
    const MAX_LABEL: usize = 40;

    let w_id = items
        .iter()
        .map(|i| i.id.chars().count().min(MAX_ID))
        .max()
        .unwrap_or(0)
        .max(H_ID.len());
    let w_label = items
        .iter()
        .map(|i| i.label.chars().count().min(MAX_LABEL))
        .max()
        .unwrap_or(0)
        .max(H_LABEL.len());

    println!("{H_ID:<w_id$}  {H_LABEL:<w_label$}  ATTRIBUTES");
    for item in items {
        let attrs = sorted_attributes(&item.attributes)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<w_id$}  {:<w_label$}  {attrs}",
            trunc(&item.id, MAX_ID),
            trunc(&item.label, MAX_LABEL),
        );
    }
}

fn print_search_kv(items: &[ItemSummary]) {
    for (n, item) in items.iter().enumerate() {
        if n > 0 {
            println!();
        }
        println!("id={}", item.id);
        println!("label={}", item.label);
        println!("path={}", item.path);
        for (k, v) in sorted_attributes(&item.attributes) {
            println!("{k}={v}");
        }
    }
}

// ---------------------------------------------------------------------------
// introspect
// ---------------------------------------------------------------------------

/// Accept either a path relative to the service root or an absolute one
/// under it. `None` is the root object.
fn introspect_subpath(arg: Option<&str>) -> Result<Option<String>> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    if arg == SERVICE_PATH {
        return Ok(None);
    }
    if let Some(rest) = arg.strip_prefix(SERVICE_PATH).and_then(|r| r.strip_prefix('/')) {
        return Ok(Some(rest.to_string()));
    }
    if arg.starts_with('/') {
        bail!("path is outside {SERVICE_PATH}: {arg}");
    }
    Ok(Some(arg.to_string()))
}

async fn cmd_introspect(args: &[String], config: &Config) -> Result<()> {
    if args.len() > 1 {
        bail!("usage: sesame introspect [path]");
    }
    let subpath = introspect_subpath(args.first().map(String::as_str))?;
    let ss = connect(config).await?;
    match ss.introspect(subpath.as_deref()).await {
        Ok(xml) => {
            println!("{xml}");
            Ok(())
        }
        Err(Error::NotFound(path)) => {
            eprintln!("error: no such object: {path}");
            std::process::exit(EXIT_NOT_FOUND);
        }
        Err(err) => Err(err.into()),
    }
}
