//! HTTP surface: QR generation, validation, health and version endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::json;
use sha2::{Digest, Sha256};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi as _;

use crate::auth;
use crate::epc;
use crate::keys::KeyConfig;
use crate::logo;
use crate::openapi::ApiDoc;
use crate::qr;
use crate::qr_render::{ModuleStyle, Style};
use crate::recolor::{self, GradientSpec};
use crate::state::AppState;
use crate::validate::{self, Input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidJson,
    InvalidInput,
    Unauthorized,
    RateLimited,
    MethodNotAllowed,
    PayloadBuildFailed,
    QrEncodeFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::PayloadBuildFailed => "payload_build_failed",
            ErrorCode::QrEncodeFailed => "qr_encode_failed",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidJson | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::PayloadBuildFailed | ErrorCode::QrEncodeFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Injected into request extensions by the request-id middleware.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub fn router(state: AppState) -> Router {
    let write_timeout = state.cfg.write_timeout;
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/health", any(health))
        .route("/healthz", any(health))
        .route("/readyz", any(ready))
        .route("/version", any(version))
        .route("/sepa-qr", any(sepa_qr))
        .route("/sepa-qr/validate", any(sepa_qr_validate))
        .layer(middleware::from_fn_with_state(state.clone(), access_log))
        .layer(TimeoutLayer::new(write_timeout))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = auth::new_request_id();
    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(v) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", v);
    }
    res
}

async fn access_log(State(st): State<AppState>, req: Request, next: Next) -> Response {
    if !st.cfg.access_log {
        return next.run(req).await;
    }
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let peer = peer_addr(req.extensions());
    let ip = auth::client_ip(peer, req.headers(), &st.cfg.trusted_proxy_cidrs);
    let start = Instant::now();
    let res = next.run(req).await;
    tracing::info!(
        ip = %ip,
        method = %method,
        path = %path,
        status = res.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "access"
    );
    res
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Liveness probe")))]
pub async fn health() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ok\n")
}

#[utoipa::path(get, path = "/readyz", responses(
    (status = 200, description = "Ready"),
    (status = 503, description = "Not ready, reason in body")
))]
pub async fn ready(State(st): State<AppState>, req: Request) -> Response {
    let (ready, reason) = st.readiness();
    if ready {
        return ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ready\n").into_response();
    }
    if wants_json_response(req.headers()) {
        let body = json!({
            "ok": false,
            "status": "not_ready",
            "reason": reason,
            "request_id": request_id_of(req.extensions()),
        });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("not ready: {reason}\n"),
    )
        .into_response()
}

#[utoipa::path(get, path = "/version", responses((status = 200, description = "Build and mode info")))]
pub async fn version(State(st): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": st.cfg.version,
        "commit": st.cfg.commit,
        "tls_enabled": st.cfg.tls_enabled,
        "allow_query_api_key": st.cfg.allow_query_api_key,
        "require_api_key": st.cfg.require_api_key,
    }))
}

#[utoipa::path(get, path = "/sepa-qr", responses(
    (status = 200, description = "EPC QR code", content_type = "image/png"),
    (status = 400, description = "Invalid input"),
    (status = 401, description = "Unauthorized"),
    (status = 429, description = "Rate limited")
))]
pub async fn sepa_qr(State(st): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    if parts.method == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [(header::ALLOW, "POST, GET, HEAD, OPTIONS")],
        )
            .into_response();
    }
    if parts.method != Method::POST && parts.method != Method::GET && parts.method != Method::HEAD {
        return write_error(&st, &parts, ErrorCode::MethodNotAllowed, "", "");
    }

    let ip = auth::client_ip(
        peer_addr(&parts.extensions),
        &parts.headers,
        &st.cfg.trusted_proxy_cidrs,
    );
    if !st.limiter.allow(&ip) {
        return write_error(&st, &parts, ErrorCode::RateLimited, "", "");
    }

    let pairs = query_pairs(&parts);
    let api_key = auth::extract_api_key(&parts.headers, &pairs, st.cfg.allow_query_api_key);

    // Public mode: no key at all produces a standard QR.
    let is_public = api_key.is_empty();
    if st.cfg.require_api_key && is_public {
        return write_error(&st, &parts, ErrorCode::Unauthorized, "unauthorized", "");
    }

    // A bare HEAD probe succeeds without parameters.
    if parts.method == Method::HEAD && parts.uri.query().unwrap_or("").is_empty() {
        return write_png_headers_only(&st);
    }

    let key_cfg: Option<KeyConfig> = if is_public {
        None
    } else {
        match st.keys.get(&api_key) {
            Some(k) => Some(k.clone()),
            // A provided but unknown key is an explicit 401, never a silent
            // fallback to public mode.
            None => return write_error(&st, &parts, ErrorCode::Unauthorized, "unauthorized", ""),
        }
    };

    let input: Input = if parts.method == Method::POST {
        let bytes = match to_bytes(body, st.cfg.max_body_bytes).await {
            Ok(b) => b,
            Err(e) => {
                if st.log_limiter.allow(ErrorCode::InvalidJson.as_str()) {
                    warn!("invalid json body: {e}");
                }
                return write_error(&st, &parts, ErrorCode::InvalidJson, "invalid json body", "");
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(input) => input,
            Err(e) => {
                if st.log_limiter.allow(ErrorCode::InvalidJson.as_str()) {
                    warn!("invalid json body: {e}");
                }
                return write_error(&st, &parts, ErrorCode::InvalidJson, "invalid json body", "");
            }
        }
    } else {
        match input_from_query(&pairs) {
            Ok(input) => input,
            Err(e) => {
                if st.log_limiter.allow(ErrorCode::InvalidInput.as_str()) {
                    warn!("invalid input: {e}");
                }
                let field = e.field().to_string();
                return write_error(&st, &parts, ErrorCode::InvalidInput, &e.to_string(), &field);
            }
        }
    };

    let cleaned = match validate::clean_and_validate(&input) {
        Ok(c) => c,
        Err(e) => {
            if st.log_limiter.allow(ErrorCode::InvalidInput.as_str()) {
                warn!("invalid input: {e}");
            }
            let field = e.field().to_string();
            return write_error(&st, &parts, ErrorCode::InvalidInput, &e.to_string(), &field);
        }
    };

    let payload = match epc::build_payload(&cleaned) {
        Ok(p) => p,
        Err(_) => {
            return write_error(
                &st,
                &parts,
                ErrorCode::PayloadBuildFailed,
                "payload build failed",
                "",
            )
        }
    };

    // Public requests render at the global size with medium error
    // correction; authenticated keys may override the size and get high
    // error correction when a logo will cover modules.
    let with_logo = key_cfg.as_ref().is_some_and(|k| !k.logo_path.is_empty());
    let mut opt = qr::default_public_options();
    opt.size = st.cfg.qr_size;
    if let Some(k) = &key_cfg {
        opt = qr::default_auth_options(with_logo);
        opt.size = if k.qr_size > 0 { k.qr_size } else { st.cfg.qr_size };
    }

    let cache_key = build_cache_key(&cleaned, key_cfg.as_ref(), st.cfg.logo_max_ratio, opt);
    if let Some(cached) = st.png_cache.get(&cache_key) {
        return write_png(&st, &parts, cached);
    }

    let style = key_cfg.as_ref().and_then(|k| {
        (k.module_style != ModuleStyle::Square || k.corner_radius > 0 || k.quiet_zone > 0).then(
            || Style {
                corner_radius: k.corner_radius,
                module_style: k.module_style,
                module_radius: k.module_radius,
                quiet_zone: k.quiet_zone,
            },
        )
    });
    let rendered = match &style {
        Some(style) => qr::make_qr_styled(&payload, opt, style),
        None => qr::make_qr(&payload, opt),
    };
    let mut png = match rendered {
        Ok(p) => p,
        Err(_) => {
            return write_error(&st, &parts, ErrorCode::QrEncodeFailed, "qr encode failed", "")
        }
    };

    if let Some(k) = &key_cfg {
        png = apply_key_styling(&st, k, png);
    } else {
        // Standard public output: black on transparent, no logo.
        if let Ok(recolored) = recolor::recolor(&png, "#000000", "transparent") {
            png = recolored;
        }
    }

    st.png_cache.set(&cache_key, png.clone());
    write_png(&st, &parts, png)
}

/// Applies palette/gradient recoloring and the logo overlay for an
/// authenticated key. Failures degrade to the unstyled bytes and are logged
/// at most once per interval per key-stage.
fn apply_key_styling(st: &AppState, k: &KeyConfig, mut png: Vec<u8>) -> Vec<u8> {
    if !k.palette.fg.is_empty()
        || !k.palette.bg.is_empty()
        || k.fg_gradient.is_set()
        || k.bg_gradient.is_set()
    {
        let fg = if k.palette.fg.is_empty() { "#000000" } else { &k.palette.fg };
        let bg = if k.palette.bg.is_empty() { "#ffffff" } else { &k.palette.bg };
        let fg_grad = k.fg_gradient.is_set().then(|| GradientSpec {
            from: k.fg_gradient.from.clone(),
            to: k.fg_gradient.to.clone(),
            angle: k.fg_gradient.angle,
        });
        let bg_grad = k.bg_gradient.is_set().then(|| GradientSpec {
            from: k.bg_gradient.from.clone(),
            to: k.bg_gradient.to.clone(),
            angle: k.bg_gradient.angle,
        });
        match recolor::recolor_gradient(&png, fg, bg, fg_grad.as_ref(), bg_grad.as_ref()) {
            Ok(out) => png = out,
            Err(e) => {
                if st.log_limiter.allow(&format!("recolor:{}", k.name)) {
                    warn!(key = %k.name, "recolor failed: {e}");
                }
            }
        }
    }

    if !k.logo_path.is_empty() {
        let logo_img = match st.logo_cache.get(&k.logo_path) {
            Some(img) => Some(img),
            None => match load_logo_image(&k.logo_path) {
                Ok(img) => {
                    let img = Arc::new(img);
                    st.logo_cache.set(&k.logo_path, img.clone());
                    Some(img)
                }
                Err(e) => {
                    if st.log_limiter.allow(&format!("logo-load:{}", k.name)) {
                        warn!(key = %k.name, "logo load failed: {e}");
                    }
                    None
                }
            },
        };
        if let Some(img) = logo_img {
            match logo::overlay_logo(&png, &img, st.cfg.logo_max_ratio, k.logo_bg_shape) {
                Ok(out) => png = out,
                Err(e) => {
                    if st.log_limiter.allow(&format!("logo-overlay:{}", k.name)) {
                        warn!(key = %k.name, "logo overlay failed: {e}");
                    }
                }
            }
        }
    }

    png
}

#[utoipa::path(post, path = "/sepa-qr/validate", request_body = Input, responses(
    (status = 200, description = "Input is valid"),
    (status = 400, description = "Invalid input")
))]
pub async fn sepa_qr_validate(State(st): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let req_id = request_id_of(&parts.extensions);

    if parts.method != Method::POST {
        return write_json_error(ErrorCode::MethodNotAllowed, "", "", &req_id);
    }
    let ip = auth::client_ip(
        peer_addr(&parts.extensions),
        &parts.headers,
        &st.cfg.trusted_proxy_cidrs,
    );
    if !st.limiter.allow(&ip) {
        return write_json_error(ErrorCode::RateLimited, "", "", &req_id);
    }

    let pairs = query_pairs(&parts);
    let api_key = auth::extract_api_key(&parts.headers, &pairs, st.cfg.allow_query_api_key);
    let is_public = api_key.is_empty();
    if st.cfg.require_api_key && is_public {
        return write_json_error(ErrorCode::Unauthorized, "unauthorized", "", &req_id);
    }
    if !is_public && st.keys.get(&api_key).is_none() {
        return write_json_error(ErrorCode::Unauthorized, "unauthorized", "", &req_id);
    }

    let bytes = match to_bytes(body, st.cfg.max_body_bytes).await {
        Ok(b) => b,
        Err(_) => {
            return write_json_validation(false, ErrorCode::InvalidJson, "invalid json body", "", &req_id)
        }
    };
    let input: Input = match serde_json::from_slice(&bytes) {
        Ok(input) => input,
        Err(e) => {
            if st.log_limiter.allow(ErrorCode::InvalidJson.as_str()) {
                warn!("validate: invalid json body: {e}");
            }
            return write_json_validation(false, ErrorCode::InvalidJson, "invalid json body", "", &req_id);
        }
    };

    match validate::clean_and_validate(&input) {
        Ok(_) => write_json_validation(true, ErrorCode::InvalidInput, "", "", &req_id),
        Err(e) => {
            if st.log_limiter.allow(ErrorCode::InvalidInput.as_str()) {
                warn!("validate: invalid input: {e}");
            }
            let field = e.field().to_string();
            write_json_validation(false, ErrorCode::InvalidInput, &e.to_string(), &field, &req_id)
        }
    }
}

fn input_from_query(pairs: &[(String, String)]) -> Result<Input, validate::Error> {
    let mut input = Input::default();
    for (name, slot) in [
        ("scheme", &mut input.scheme),
        ("name", &mut input.name),
        ("iban", &mut input.iban),
        ("bic", &mut input.bic),
        ("amount", &mut input.amount),
        ("amount_format", &mut input.amount_format),
        ("purpose", &mut input.purpose),
        ("remittance_reference", &mut input.remittance_reference),
        ("remittance_text", &mut input.remittance_text),
        ("information", &mut input.information),
    ] {
        *slot = single_query_param(pairs, name)?;
    }
    Ok(input)
}

/// Each recognized parameter may appear at most once.
fn single_query_param(pairs: &[(String, String)], key: &str) -> Result<String, validate::Error> {
    let mut found: Option<&str> = None;
    for (k, v) in pairs {
        if k == key {
            if found.is_some() {
                return Err(validate::Error::DuplicateQueryParam(key.to_string()));
            }
            found = Some(v);
        }
    }
    Ok(found.unwrap_or("").to_string())
}

/// Every input that influences the rendered PNG, `|`-delimited and hashed.
/// Any change to the cleaned fields, key styling, size, error correction or
/// logo ratio yields a different key.
fn build_cache_key(
    cleaned: &validate::Clean,
    key_cfg: Option<&KeyConfig>,
    ratio: f64,
    opt: qr::Options,
) -> String {
    use std::fmt::Write as _;

    let mut b = String::new();
    match key_cfg {
        Some(k) => {
            b.push_str("a|");
            let _ = write!(
                b,
                "{}|{}|{}|{}|{}|{:.3}|{}|{}|{:.3}|{}|{}|{}|{:.3}|{}|{}|",
                k.name,
                k.palette.fg,
                k.palette.bg,
                k.fg_gradient.from,
                k.fg_gradient.to,
                k.fg_gradient.angle,
                k.bg_gradient.from,
                k.bg_gradient.to,
                k.bg_gradient.angle,
                k.logo_path,
                k.logo_bg_shape.as_str(),
                k.module_style.as_str(),
                k.module_radius,
                k.corner_radius,
                k.quiet_zone,
            );
        }
        None => b.push_str("p|"),
    }
    let _ = write!(
        b,
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{:.4}",
        cleaned.name,
        cleaned.iban,
        cleaned.bic,
        cleaned.purpose,
        cleaned.remittance_reference,
        cleaned.remittance_text,
        cleaned.information,
        cleaned.amount_cents,
        opt.size,
        qr::ecc_code(opt.ecc),
        ratio,
    );

    hex::encode(Sha256::digest(b.as_bytes()))
}

fn etag_for_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn load_logo_image(path: &str) -> anyhow::Result<image::DynamicImage> {
    let bytes = std::fs::read(path)?;
    Ok(image::load_from_memory(&bytes)?)
}

fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0)
}

fn request_id_of(extensions: &Extensions) -> String {
    extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

fn query_pairs(parts: &Parts) -> Vec<(String, String)> {
    serde_urlencoded::from_str(parts.uri.query().unwrap_or("")).unwrap_or_default()
}

fn write_png(st: &AppState, parts: &Parts, png: Vec<u8>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    if let Ok(v) = HeaderValue::from_str(&st.cfg.cache_control) {
        headers.insert(header::CACHE_CONTROL, v);
    }
    if let Ok(v) = HeaderValue::from_str(&format!("\"{}\"", etag_for_bytes(&png))) {
        headers.insert(header::ETAG, v);
    }
    if let Ok(v) = HeaderValue::from_str(&png.len().to_string()) {
        headers.insert(header::CONTENT_LENGTH, v);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    if parts.method == Method::HEAD {
        (StatusCode::OK, headers, Body::empty()).into_response()
    } else {
        (StatusCode::OK, headers, png).into_response()
    }
}

fn write_png_headers_only(st: &AppState) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    if let Ok(v) = HeaderValue::from_str(&st.cfg.cache_control) {
        headers.insert(header::CACHE_CONTROL, v);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    (StatusCode::OK, headers, Body::empty()).into_response()
}

fn write_error(st: &AppState, parts: &Parts, code: ErrorCode, details: &str, field: &str) -> Response {
    if wants_json_error(parts) {
        return write_json_error(code, details, field, &request_id_of(&parts.extensions));
    }
    write_error_png(st, parts, code)
}

fn write_error_png(st: &AppState, parts: &Parts, code: ErrorCode) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-error-code", HeaderValue::from_static(code.as_str()));

    if parts.method == Method::HEAD || st.error_png.is_empty() {
        (code.status(), headers, Body::empty()).into_response()
    } else {
        (code.status(), headers, st.error_png.as_ref().clone()).into_response()
    }
}

fn write_json_error(code: ErrorCode, details: &str, field: &str, req_id: &str) -> Response {
    let details = if details.is_empty() { code.as_str() } else { details };
    let body = json!({
        "ok": false,
        "error_code": code.as_str(),
        "details": details,
        "field": field,
        "request_id": req_id,
    });
    (
        code.status(),
        [(header::X_CONTENT_TYPE_OPTIONS, "nosniff")],
        Json(body),
    )
        .into_response()
}

fn write_json_validation(
    ok: bool,
    code: ErrorCode,
    details: &str,
    field: &str,
    req_id: &str,
) -> Response {
    if ok {
        return (
            StatusCode::OK,
            [(header::X_CONTENT_TYPE_OPTIONS, "nosniff")],
            Json(json!({"ok": true, "request_id": req_id})),
        )
            .into_response();
    }
    write_json_error(code, details, field, req_id)
}

/// JSON error responses are opted into by `?format=json` or an Accept
/// header naming `application/json` without `image/png`.
fn wants_json_error(parts: &Parts) -> bool {
    let format = query_pairs(parts)
        .into_iter()
        .find(|(k, _)| k == "format")
        .map(|(_, v)| v.trim().to_lowercase())
        .unwrap_or_default();
    if format == "json" {
        return true;
    }
    wants_json_response(&parts.headers)
}

fn wants_json_response(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    accept.contains("application/json") && !accept.contains("image/png")
}
