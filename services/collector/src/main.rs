use clap::{Arg, ArgAction, Command};
use collector::config::{self, CollectorConfig};
use collector::listen;
use collector::sink::SinkFactory;
use collector::sink::null::NullSinkFactory;
use collector::sink::pg::{PgSinkFactory, PgSinkHandle, PgStore};
use collector::sink::text::TextSinkFactory;
use collector::sink::tree::TreeSinkFactory;
use collector::sink::{FilterFactory, MultiFactory};
use logtree_core::Severity;
use logtree_core::store::LogStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

fn validate_severity(value: &str) -> Result<Severity, String> {
    value
        .parse::<Severity>()
        .map_err(|_| format!("'{value}' is not a severity name"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("logtree-collector")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Aggregates structured log streams into terminal and SQL sinks")
        .arg(
            Arg::new("config")
                .help("Path to the TOML configuration file")
                .short('c')
                .long("config"),
        )
        .arg(
            Arg::new("listen")
                .help("TCP listen address (e.g. 0.0.0.0:34917); omit to read stdin")
                .short('l')
                .long("listen"),
        )
        .arg(
            Arg::new("db_url")
                .help("PostgreSQL connection URL for the database sink")
                .long("db-url"),
        )
        .arg(
            Arg::new("db")
                .help("Enable the database sink")
                .long("db")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tree")
                .help("Enable the terminal tree sink")
                .long("tree")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("text")
                .help("Enable the plain-text sink")
                .long("text")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("null")
                .help("Enable the discard sink")
                .long("null")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("min_severity")
                .help("Drop messages below this severity")
                .short('s')
                .long("min-severity")
                .value_parser(validate_severity),
        )
        .get_matches();

    let mut cfg = match matches.get_one::<String>("config") {
        Some(path) => match config::load_config_from_path(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(error) => {
                error!(%error, "cannot load configuration");
                std::process::exit(2);
            }
        },
        None => CollectorConfig::default(),
    };

    // CLI overrides
    if let Some(listen) = matches.get_one::<String>("listen") {
        cfg.listen = Some(listen.clone());
    }
    if let Some(url) = matches.get_one::<String>("db_url") {
        cfg.db.url = url.clone();
        cfg.sinks.db = true;
    }
    if matches.get_flag("db") {
        cfg.sinks.db = true;
    }
    if matches.get_flag("tree") {
        cfg.sinks.tree = true;
    }
    if matches.get_flag("text") {
        cfg.sinks.text = true;
    }
    if matches.get_flag("null") {
        cfg.sinks.null = true;
    }
    if let Some(min) = matches.get_one::<Severity>("min_severity") {
        cfg.min_severity = Some(*min);
    }
    if !cfg.sinks.any() {
        cfg.sinks.tree = true;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "collector starting");

    let factory = build_factory(&cfg).await;

    let outcome = match cfg.listen.as_deref() {
        Some(addr) => listen::run_listener(addr, factory)
            .await
            .map_err(|e| e.to_string()),
        None => listen::run_stdin(factory).await.map_err(|e| e.to_string()),
    };

    match outcome {
        Ok(()) => info!("clean end of input"),
        Err(error) => {
            error!(%error, "source failed");
            std::process::exit(1);
        }
    }
}

async fn build_factory(cfg: &CollectorConfig) -> Arc<dyn SinkFactory> {
    let mut factories: Vec<Arc<dyn SinkFactory>> = Vec::new();
    if cfg.sinks.tree {
        factories.push(Arc::new(TreeSinkFactory::stdout(
            cfg.tty.batch_size,
            cfg.tty.default_hit_interval,
        )));
    }
    if cfg.sinks.text {
        factories.push(Arc::new(TextSinkFactory::stdout(
            cfg.tty.batch_size,
            cfg.tty.default_hit_interval,
        )));
    }
    if cfg.sinks.null {
        factories.push(Arc::new(NullSinkFactory));
    }
    if cfg.sinks.db {
        let mut store = PgStore::new(cfg.db.url.clone());
        if store.reconnect().await {
            info!(url = %cfg.db.url, "connected to log database");
        } else {
            warn!(url = %cfg.db.url, "log database unavailable, will keep retrying");
        }
        let factory = PgSinkFactory::new(
            store,
            collector::backoff::Backoff::new(cfg.db.reconnect_initial, cfg.db.reconnect_cap),
        );
        factories.push(Arc::new(PgSinkHandle::new(
            factory,
            cfg.db.batch_size,
            cfg.db.default_hit_interval,
        )));
    }

    let base: Arc<dyn SinkFactory> = if factories.len() == 1 {
        factories.remove(0)
    } else {
        Arc::new(MultiFactory::new(factories))
    };
    match cfg.min_severity {
        Some(min) => Arc::new(FilterFactory::new(min, base)),
        None => base,
    }
}
