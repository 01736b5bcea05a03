//! Purpose: `mongofixture` CLI entry point.
//! Role: Binary crate root; parses args, dispatches fixtures, emits JSON reports on stdout.
//! Invariants: One JSON line per loaded fixture on stdout, in argument order.
//! Invariants: Errors are emitted as JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use mongofixture::api::{
    BatchOutcome, Connector, Dispatcher, Error, ErrorKind, Fixture, LoadContext, MemoryStore,
    ScanOptions, resolve_endpoint, to_exit_code,
};

const DRY_RUN_ENDPOINT: &str = "memory://dry-run";

#[derive(Parser, Debug)]
#[command(
    name = "mongofixture",
    version,
    about = "Load mongoexport-style extended JSON fixtures into MongoDB",
    long_about = r#"Load mongoexport-style extended JSON fixtures into MongoDB.

Each file holds whitespace-separated JSON objects. Extended JSON wrappers such as
{"$date": ...}, {"$oid": ...} and {"$binary": ...} become native BSON values.
Documents are inserted one at a time, in file order, into a collection named
after the file (users.json -> users). The first failure stops the run; documents
inserted before it stay in the collection."#,
    after_help = r#"EXAMPLES
  $ mongofixture --db test testdata/users.json testdata/orders.json
  $ mongofixture --uri mongodb://db:27017 --db test --collection people users.json
  $ mongofixture --dry-run --db test users.json"#
)]
struct Cli {
    #[arg(
        long,
        help = "MongoDB connection string (default: $MONGODB_URI, then mongodb://localhost:27017)"
    )]
    uri: Option<String>,
    #[arg(long = "db", short = 'd', help = "Target database")]
    database: String,
    #[arg(
        long,
        short = 'c',
        help = "Target collection (single fixture only; default: file name without extension)"
    )]
    collection: Option<String>,
    #[arg(long, value_name = "SECS", help = "Abort the whole run after this many seconds")]
    timeout: Option<u64>,
    #[arg(long, value_name = "BYTES", help = "Reject fixture objects larger than this")]
    max_object_bytes: Option<usize>,
    #[arg(long, help = "Decode and insert into an in-memory store instead of MongoDB")]
    dry_run: bool,
    #[arg(required = true, value_hint = ValueHint::FilePath, help = "Fixture files")]
    fixtures: Vec<PathBuf>,
}

fn main() {
    init_tracing();
    let exit_code = match run(std::env::args_os()) {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run<I>(args: I) -> Result<i32, Error>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(0);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `mongofixture --help` for usage."));
            }
        },
    };

    if cli.collection.is_some() && cli.fixtures.len() != 1 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--collection requires exactly one fixture file"));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start async runtime")
                .with_source(err)
        })?;

    let mut ctx = LoadContext::background();
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    let stop = ctx.cancel_handle();
    let scan = ScanOptions {
        max_object_bytes: cli.max_object_bytes,
    };
    let fixtures: Vec<Fixture> = cli
        .fixtures
        .iter()
        .map(|path| Fixture::new(path, cli.database.clone()))
        .collect();

    let batch = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.cancel();
            }
        });
        if cli.dry_run {
            let dispatcher =
                Dispatcher::new(MemoryStore::new(), DRY_RUN_ENDPOINT).with_scan_options(scan);
            execute(&dispatcher, &ctx, &fixtures, cli.collection).await
        } else {
            let dispatcher =
                Dispatcher::mongo(resolve_endpoint(cli.uri.as_deref())).with_scan_options(scan);
            execute(&dispatcher, &ctx, &fixtures, cli.collection).await
        }
    });
    runtime.shutdown_timeout(Duration::from_millis(100));

    for report in &batch.reports {
        let mut value = serde_json::to_value(report).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode report")
                .with_source(err)
        })?;
        if let (Some(object), Some(now)) = (value.as_object_mut(), time_now()) {
            object.insert("loaded_at".to_string(), json!(now));
        }
        println!("{value}");
    }
    match batch.error {
        Some(err) => Err(add_hint(err)),
        None => Ok(0),
    }
}

async fn execute<C: Connector>(
    dispatcher: &Dispatcher<C>,
    ctx: &LoadContext,
    fixtures: &[Fixture],
    collection: Option<String>,
) -> BatchOutcome {
    match (collection, fixtures) {
        (Some(collection), [fixture]) => {
            let mut batch = BatchOutcome::default();
            match dispatcher.dispatch_into(ctx, fixture, collection).await {
                Ok(report) => batch.reports.push(report),
                Err(err) => batch.error = Some(err),
            }
            batch
        }
        _ => dispatcher.dispatch_all(ctx, fixtures).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    time::OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .map(|line| line.trim_start_matches("error: ").trim().to_string())
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn add_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::FileAccess => err.with_hint("Check that the fixture path exists and is readable."),
        ErrorKind::Insert => err.with_hint(
            "Documents before the failing one were inserted; clean the collection before retrying.",
        ),
        ErrorKind::Cancelled => err.with_hint("Raise --timeout or let the run finish."),
        _ => err,
    }
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::FileAccess => "cannot read fixture",
        ErrorKind::Connection => "cannot connect to database",
        ErrorKind::Parse => "malformed json",
        ErrorKind::TypeResolution => "malformed extended json value",
        ErrorKind::Structural => "fixture record is not an object",
        ErrorKind::Insert => "insert rejected",
        ErrorKind::Cancelled => "cancelled",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(index) = err.index() {
        inner.insert("document".to_string(), json!(index));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(field) = err.field() {
        lines.push(format!("field: {field}"));
    }
    if let (Some(index), Some(offset)) = (err.index(), err.offset()) {
        lines.push(format!("document: {index} (byte offset {offset})"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
