use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::http::HeaderName;
use novel_db::{LoadMode, NovelDb};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use novelflow::rate_limit::{DEFAULT_CLIENT_HEADER, RateLimiterLayer};
use novelflow::{AppState, MemoryAccessCodes, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_LIBRARY_PATH: &str = "data";
const DEFAULT_LIBRARY_IMAGE_PATH: &str = "/app/data";
const DEFAULT_RATE_LIMIT_RPS: u32 = 5;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    info!(
        "using library at {} (mode: {:?})",
        config.library_path.display(),
        config.library_mode
    );
    if config.disable_cache {
        info!("cache headers disabled");
    }
    info!(
        "rate limit: {} req/s (burst {}, keyed by {})",
        config.rate_limit_rps, config.rate_limit_burst, config.rate_limit_header
    );

    let start = Instant::now();
    let db = Arc::new(NovelDb::load_with_mode(
        &config.library_path,
        config.library_mode,
    )?);
    info!("library loaded in {} ms", start.elapsed().as_millis());

    let access_codes = match &config.access_codes_path {
        Some(path) => MemoryAccessCodes::load_from_file(path)?,
        None => {
            warn!("ACCESS_CODES_PATH not set; no access code will validate");
            MemoryAccessCodes::new()
        }
    };

    let mut state = AppState::new(db, Arc::new(access_codes));
    state.disable_cache = config.disable_cache;

    let rate_limiter = RateLimiterLayer::new(config.rate_limit_rps, config.rate_limit_burst)
        .with_client_header(config.rate_limit_header.clone());
    let app = router(state)
        .layer(rate_limiter)
        .layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    library_path: PathBuf,
    library_mode: LoadMode,
    access_codes_path: Option<PathBuf>,
    disable_cache: bool,
    rate_limit_rps: u32,
    rate_limit_burst: u32,
    rate_limit_header: HeaderName,
}

fn load_config() -> Config {
    let mut disable_cache = false;
    let mut cli_library_dir: Option<PathBuf> = None;
    let mut cli_library_mode: Option<LoadMode> = None;
    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-cache" => disable_cache = true,
            "--library-dir" => {
                if let Some(path) = args.next() {
                    cli_library_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--library-dir=") {
                    cli_library_dir = Some(PathBuf::from(path));
                } else if let Some(mode) = arg.strip_prefix("--library-mode=") {
                    cli_library_mode = parse_load_mode(mode);
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let library_path = cli_library_dir
        .or_else(|| env::var("LIBRARY_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(default_library_path);
    let library_mode = cli_library_mode
        .or_else(|| {
            env::var("LIBRARY_LOAD_MODE")
                .ok()
                .as_deref()
                .and_then(parse_load_mode)
        })
        .unwrap_or(LoadMode::Mmap);
    let access_codes_path = env::var("ACCESS_CODES_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);
    let rate_limit_rps = env::var("RATE_LIMIT_RPS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RATE_LIMIT_RPS);
    let rate_limit_burst = env::var("RATE_LIMIT_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RATE_LIMIT_BURST);
    let rate_limit_header = env::var("RATE_LIMIT_HEADER")
        .ok()
        .and_then(|v| HeaderName::try_from(v.trim().to_ascii_lowercase()).ok())
        .unwrap_or_else(|| HeaderName::from_static(DEFAULT_CLIENT_HEADER));

    Config {
        host,
        port,
        library_path,
        library_mode,
        access_codes_path,
        disable_cache,
        rate_limit_rps,
        rate_limit_burst,
        rate_limit_header,
    }
}

fn default_library_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_LIBRARY_PATH);
    if local.exists() {
        return local;
    }
    PathBuf::from(DEFAULT_LIBRARY_IMAGE_PATH)
}

fn parse_load_mode(raw: &str) -> Option<LoadMode> {
    match raw.to_ascii_lowercase().as_str() {
        "mmap" => Some(LoadMode::Mmap),
        "owned" => Some(LoadMode::Owned),
        _ => None,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
