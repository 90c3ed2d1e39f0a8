use clap::{Parser, Subcommand};
use geocascade::config::Config;
use geocascade::location::{
    FetchCoordinator, HttpGeographyClient, ResolverSession, ResultCache, SessionOptions, Step,
};
use geocascade::picker::{check_lookup, parse_input, LookupFailure, PickCommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// geocascade: Country → Province → City location resolver
///
/// Drills down through a remote geography API with caching, request
/// de-duplication and a built-in province fallback.
///
/// Examples:
///   geocascade countries --search south
///   geocascade provinces "South Africa"
///   geocascade cities "South Africa" "Western Cape" --origin "Cape Town"
///   geocascade pick --country Namibia
///   geocascade serve --port 3030
#[derive(Parser)]
#[command(name = "geocascade", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.geocascade/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Geography API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List countries.
    Countries {
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    /// List provinces/states of a country.
    Provinces {
        country: String,
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    /// List cities of a province.
    Cities {
        country: String,
        province: String,
        #[arg(long, short = 's')]
        search: Option<String>,
        /// City to leave out of the results.
        #[arg(long)]
        origin: Option<String>,
    },
    /// Interactive picker on stdin.
    Pick {
        /// Start from this country.
        #[arg(long)]
        country: Option<String>,
        /// Start from this province (with --country).
        #[arg(long)]
        province: Option<String>,
        /// City to leave out of the results.
        #[arg(long)]
        origin: Option<String>,
    },
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,geocascade=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }
    if let Some(t) = cli.timeout {
        config.timeout_secs = t;
    }

    let source = Arc::new(HttpGeographyClient::from_config(&config));
    let coordinator = Arc::new(FetchCoordinator::new(Arc::new(ResultCache::new())));

    match cli.command {
        Command::Countries { search } => {
            let options = SessionOptions::default();
            lookup(source, coordinator, options, Step::Country, search).await;
        }
        Command::Provinces { country, search } => {
            let options = SessionOptions {
                initial_country: Some(country),
                ..Default::default()
            };
            lookup(source, coordinator, options, Step::Province, search).await;
        }
        Command::Cities { country, province, search, origin } => {
            let options = SessionOptions {
                origin_city: origin,
                initial_country: Some(country),
                initial_province: Some(province),
            };
            lookup(source, coordinator, options, Step::City, search).await;
        }
        Command::Pick { country, province, origin } => {
            let options = SessionOptions {
                origin_city: origin,
                initial_country: country,
                initial_province: province,
            };
            pick(source, coordinator, options).await;
        }
        Command::Serve { host, port } => {
            if let Some(h) = host {
                config.host = h;
            }
            if let Some(p) = port {
                config.port = p;
            }
            if let Err(e) = geocascade::server::start(&config).await {
                eprintln!("Error: server failed on {}:{}: {}", config.host, config.port, e);
                std::process::exit(1);
            }
        }
    }
}

/// Open a session with hints, expect it to land on `target`, print the view.
async fn lookup(
    source: Arc<HttpGeographyClient>,
    coordinator: Arc<FetchCoordinator>,
    options: SessionOptions,
    target: Step,
    search: Option<String>,
) {
    let mut session = ResolverSession::open(source, coordinator, options).await;
    if let Some(q) = search {
        session.set_search(q);
    }
    let view = session.view();

    match check_lookup(&view, target) {
        Ok(()) => {}
        Err(LookupFailure::Unavailable(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(LookupFailure::NoMatch(step)) => {
            eprintln!("Error: no match for the given {} name.", step);
            std::process::exit(1);
        }
    }
    if let Some(ref err) = view.last_error {
        eprintln!("  \u{26A0}\u{FE0F}  {}", err);
    }
    match serde_json::to_string_pretty(&view) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Read one line from stdin on the blocking pool. `None` on EOF or error.
async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    })
    .await
    .ok()
    .flatten()
}

/// Line-driven picker; see [`parse_input`] for the accepted input.
async fn pick(source: Arc<HttpGeographyClient>, coordinator: Arc<FetchCoordinator>, options: SessionOptions) {
    let mut session = ResolverSession::open(source, coordinator, options).await;

    loop {
        let view = session.view();
        if let Some(selection) = view.selection {
            match serde_json::to_string_pretty(&selection) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            }
            return;
        }

        eprintln!();
        eprintln!("  Choose a {} ({} of {} shown)", view.step, view.candidates.len(), view.total_candidates);
        if let Some(ref err) = view.last_error {
            eprintln!("  \u{26A0}\u{FE0F}  {}", err);
        }
        for (i, name) in view.candidates.iter().enumerate().take(40) {
            eprintln!("    {:>3}. {}", i + 1, name);
        }
        if view.candidates.len() > 40 {
            eprintln!("    ... narrow with /text");
        }
        eprint!("  [number|name|/search|..|r|q] > ");
        let _ = io::stderr().flush();

        let Some(line) = read_line().await else { return };
        match parse_input(&line, &view.candidates) {
            PickCommand::Quit => return,
            PickCommand::Nothing => {}
            PickCommand::Back => {
                session.back().await;
            }
            PickCommand::Retry => session.retry().await,
            PickCommand::Search(query) => session.set_search(query),
            PickCommand::Select(name) => {
                if let Err(e) = session.select(&name).await {
                    eprintln!("  {}", e);
                }
            }
        }
    }
}
