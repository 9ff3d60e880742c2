use crate::certificate::CertificateDescriptor;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tower_http::services::{ServeDir, ServeFile};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STATIC_DIR: &str = "dist";
const DEFAULT_CERTIFICATE_MANIFEST_PATH: &str = "config/certificates.json";
const DEFAULT_CERTIFICATES_CACHE_MAX_AGE_SECONDS: u64 = 300;
const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

const CERTIFICATES_CACHE_MAX_AGE_SECONDS_BOUNDS: (u64, u64) = (0, 86_400);
const REQUEST_ID_HEADER: &str = "x-request-id";

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(level: LogLevel) -> u8 {
            match level {
                LogLevel::Debug => 0,
                LogLevel::Info => 1,
                LogLevel::Warn => 2,
            }
        }

        rank(*self).cmp(&rank(*other))
    }
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
        }
    }
}

#[derive(Clone)]
struct GalleryRuntimeConfig {
    port: u16,
    static_dir: PathBuf,
    manifest_path: PathBuf,
    cache_max_age_seconds: u64,
    log_level: LogLevel,
}

impl GalleryRuntimeConfig {
    fn from_env() -> Self {
        let port = parse_env_non_empty_string("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let static_dir = parse_env_non_empty_string("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
        let manifest_path = parse_env_non_empty_string("CERTIFICATE_MANIFEST_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CERTIFICATE_MANIFEST_PATH));
        let cache_max_age_seconds = parse_env_u64_with_bounds(
            "CERTIFICATES_CACHE_MAX_AGE_SECONDS",
            DEFAULT_CERTIFICATES_CACHE_MAX_AGE_SECONDS,
            CERTIFICATES_CACHE_MAX_AGE_SECONDS_BOUNDS,
        );
        let log_level = parse_log_level("LOG_LEVEL", DEFAULT_LOG_LEVEL);

        Self {
            port,
            static_dir,
            manifest_path,
            cache_max_age_seconds,
            log_level,
        }
    }
}

#[derive(Debug, Error)]
enum ManifestError {
    #[error("failed to read certificate manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid certificate manifest: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct CertificateManifest {
    #[serde(default)]
    certificates: Vec<CertificateDescriptor>,
}

#[derive(Clone)]
struct AppState {
    certificates: Arc<Vec<CertificateDescriptor>>,
    config: GalleryRuntimeConfig,
}

#[derive(Serialize)]
struct CertificatesPayload<'a> {
    ok: bool,
    certificates: &'a [CertificateDescriptor],
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GalleryRuntimeConfig::from_env();
    let certificates = load_certificates(&config);
    let bind_address = format!("0.0.0.0:{}", config.port);

    let index_path = config.static_dir.join("index.html");
    let static_service = ServeDir::new(&config.static_dir).not_found_service(ServeFile::new(index_path));

    let state = AppState {
        certificates: Arc::new(certificates),
        config: config.clone(),
    };

    let app = Router::new()
        .route("/api/certificates", get(get_certificates))
        .fallback_service(static_service)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    log_event(
        &config,
        LogLevel::Info,
        "server_listening",
        serde_json::json!({
            "address": &bind_address,
            "staticDir": config.static_dir.display().to_string(),
        }),
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_certificates(State(state): State<AppState>, headers: HeaderMap) -> axum::response::Response {
    let request_id = resolve_request_id(&headers);

    log_event(
        &state.config,
        LogLevel::Debug,
        "certificates_served",
        serde_json::json!({
            "requestId": &request_id,
            "count": state.certificates.len(),
        }),
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CACHE_CONTROL,
        cache_control(&format!("public, max-age={}", state.config.cache_max_age_seconds)),
    );

    response_with_request_id(
        StatusCode::OK,
        response_headers,
        Json(CertificatesPayload {
            ok: true,
            certificates: &state.certificates,
        }),
        &request_id,
    )
}

fn load_certificates(config: &GalleryRuntimeConfig) -> Vec<CertificateDescriptor> {
    match read_certificate_manifest(&config.manifest_path) {
        Ok(entries) => {
            let RetainedCertificates {
                certificates,
                missing_source,
                duplicates,
            } = retain_usable_certificates(entries);
            if missing_source > 0 || duplicates > 0 {
                log_event(
                    config,
                    LogLevel::Warn,
                    "manifest_entries_skipped",
                    serde_json::json!({ "missingSource": missing_source, "duplicates": duplicates }),
                );
            }
            log_event(
                config,
                LogLevel::Info,
                "manifest_loaded",
                serde_json::json!({
                    "path": config.manifest_path.display().to_string(),
                    "count": certificates.len(),
                }),
            );
            certificates
        }
        Err(err) => {
            log_event(
                config,
                LogLevel::Warn,
                "manifest_unavailable",
                serde_json::json!({
                    "path": config.manifest_path.display().to_string(),
                    "error": err.to_string(),
                }),
            );
            Vec::new()
        }
    }
}

fn read_certificate_manifest(path: &Path) -> Result<Vec<CertificateDescriptor>, ManifestError> {
    let raw = fs::read_to_string(path)?;
    parse_certificate_manifest(&raw)
}

fn parse_certificate_manifest(raw: &str) -> Result<Vec<CertificateDescriptor>, ManifestError> {
    let manifest: CertificateManifest = serde_json::from_str(raw)?;
    Ok(manifest.certificates)
}

struct RetainedCertificates {
    certificates: Vec<CertificateDescriptor>,
    missing_source: usize,
    duplicates: usize,
}

// Keeps the first entry for each source URL.
fn retain_usable_certificates(entries: Vec<CertificateDescriptor>) -> RetainedCertificates {
    let mut seen = HashSet::new();
    let mut retained = RetainedCertificates {
        certificates: Vec::with_capacity(entries.len()),
        missing_source: 0,
        duplicates: 0,
    };

    for entry in entries {
        if !entry.has_source() {
            retained.missing_source += 1;
        } else if !seen.insert(entry.source_url.clone()) {
            retained.duplicates += 1;
        } else {
            retained.certificates.push(entry);
        }
    }

    retained
}

fn cache_control(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}

fn parse_env_u64_with_bounds(name: &str, default: u64, bounds: (u64, u64)) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| (bounds.0..=bounds.1).contains(value))
        .unwrap_or(default)
}

fn parse_env_non_empty_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_log_level(name: &str, default: LogLevel) -> LogLevel {
    parse_env_non_empty_string(name)
        .map(|value| log_level_from_str(&value, default))
        .unwrap_or(default)
}

fn log_level_from_str(value: &str, default: LogLevel) -> LogLevel {
    match value.to_ascii_lowercase().as_str() {
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "warn" | "warning" => LogLevel::Warn,
        _ => default,
    }
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis())
        .unwrap_or(0)
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

fn generate_request_id() -> String {
    let counter = REQUEST_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    format!("req-{}-{counter}", now_unix_millis())
}

fn resolve_request_id(headers: &HeaderMap) -> String {
    let value = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|raw| raw.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string);

    value.unwrap_or_else(generate_request_id)
}

fn response_with_request_id(
    status: StatusCode,
    mut headers: HeaderMap,
    payload: impl IntoResponse,
    request_id: &str,
) -> axum::response::Response {
    if let Ok(request_id_header) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, request_id_header);
    }
    (status, headers, payload).into_response()
}

fn log_event(config: &GalleryRuntimeConfig, level: LogLevel, event: &str, fields: serde_json::Value) {
    if level < config.log_level {
        return;
    }

    let mut payload = serde_json::Map::new();
    payload.insert(
        "ts".to_string(),
        serde_json::Value::Number(serde_json::Number::from(now_unix_seconds())),
    );
    payload.insert("level".to_string(), serde_json::Value::String(level.as_str().to_string()));
    payload.insert("event".to_string(), serde_json::Value::String(event.to_string()));

    if let serde_json::Value::Object(extra) = fields {
        for (key, value) in extra {
            payload.insert(key, value);
        }
    }

    println!("{}", serde_json::Value::Object(payload));
}
