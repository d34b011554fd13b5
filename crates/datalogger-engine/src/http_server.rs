/// Read-only HTTP status surface: `/data`, `/status`, `/`.
///
/// Routes and payload shapes follow the original firmware's `http_server.c`
/// exactly; only the router-construction idiom (axum, routes built once in
/// `run`) is borrowed from the teacher's `health_server.rs`. Every handler
/// builds its response fresh per request and sets `Cache-Control: no-store`
/// plus `Connection: close`, matching the original's one-shot-per-request
/// `netconn` server.
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

use datalogger_protocol::flags::FlagExt;
use datalogger_protocol::health::{DataResponse, LastMeasurementBlock, StatusSnapshot};

use crate::engine::Engine;

fn no_store_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, "no-store".parse().unwrap());
    headers.insert(header::CONNECTION, "close".parse().unwrap());
    response
}

pub async fn run(engine: Arc<Engine>) {
    let app = Router::new()
        .route("/data", get(data_handler))
        .route("/status", get(status_handler))
        .route("/", get(index_handler))
        .with_state(engine.clone());

    let addr = engine.config.http.bind.clone();
    info!(bind = %addr, "http status surface listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(bind = %addr, error = %e, "failed to bind http status surface");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "http status surface error");
    }
}

async fn data_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let last = engine.last_measurement.read().await.clone();
    let body = match last {
        Some(m) => axum::Json(DataResponse::from(m)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no measurement yet").into_response(),
    };
    no_store_headers(body)
}

async fn status_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let last = engine.last_measurement.read().await.clone();
    let snapshot = StatusSnapshot {
        firmware_version: engine.config.http.firmware_version.clone(),
        sensor_id: engine.config.sampler.sensor_id.clone(),
        mac: mac_string(&engine.mac_address),
        link_connected: engine.flags.link_connected.is_set(),
        broker_connected: engine.flags.broker_connected.is_set(),
        system_state: engine.flags.system_state().as_str().to_string(),
        system_ready: engine.flags.system_ready.is_set(),
        messages_sent: engine.counters.messages_sent.load(Ordering::Relaxed),
        publish_attempts: engine.counters.publish_attempts.load(Ordering::Relaxed),
        backlog_count: engine.backlog_count(),
        consecutive_failures: engine.counters.consecutive_failures.load(Ordering::Relaxed),
        uptime_secs: engine.start_time.elapsed().as_secs(),
        last_measurement: last.map(LastMeasurementBlock::from),
    };
    no_store_headers(axum::Json(snapshot).into_response())
}

async fn index_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let last = engine.last_measurement.read().await.clone();
    let (temp, hum, ts) = last
        .map(|m| (m.temperature, m.humidity, m.timestamp))
        .unwrap_or((0.0, 0.0, 0));

    let html = format!(
        r#"<!DOCTYPE html>
<html><head><meta http-equiv="refresh" content="1">
<style>body{{font-family:sans-serif;background:#111;color:#eee;text-align:center;padding-top:2em}}
.reading{{font-size:3em;margin:0.3em}}</style></head>
<body>
<div class="reading">{temp:.1}&deg;C</div>
<div class="reading">{hum:.1}% RH</div>
<p>measured at {ts}</p>
<p>mac: {mac}</p>
<p>firmware: {fw} &middot; sensor: {sensor}</p>
</body></html>"#,
        temp = temp,
        hum = hum,
        ts = ts,
        mac = mac_string(&engine.mac_address),
        fw = engine.config.http.firmware_version,
        sensor = engine.config.sampler.sensor_id,
    );
    no_store_headers(Html(html).into_response())
}

fn mac_string(mac: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
