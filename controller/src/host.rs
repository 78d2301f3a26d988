use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info, warn};

use roomtemp_common::{
    api, sensor::is_due, Controller, ErrorBody, Level, PinWrite, RuntimeConfig, SampleOutcome,
    SensorDriver, SensorError, TickReport,
};

const DEFAULT_CONFIG_PATH: &str = "./roomtemp.json";
const DEFAULT_HTTP_PORT: u16 = 8080;
const SIMULATED_FAILURE_EVERY: u64 = 9;

#[derive(Clone)]
struct AppState {
    station: Arc<Mutex<Station>>,
}

/// The controller plus the stand-in hardware it drives on a development host.
struct Station {
    controller: Controller,
    pins: SimulatedPins,
    sensor: SimulatedSensor,
    display_interval_ms: u64,
    last_display_ms: u64,
    last_display: Option<[String; 2]>,
}

#[derive(Debug, Default)]
struct SimulatedPins {
    levels: [Option<Level>; 4],
}

/// Triangle-wave temperature around the target, crossing both hysteresis
/// bands, with a read failure every `fail_every` reads.
#[derive(Debug)]
struct SimulatedSensor {
    base_c: f32,
    reads: u64,
    fail_every: u64,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let runtime = load_runtime_config().await?;
    info!(
        "config loaded: target={:.1}C hysteresis={:.1}C sensor_interval={}ms manual_timeout={}ms",
        runtime.thermostat.target_temp_c,
        runtime.thermostat.hysteresis_c,
        runtime.timing.sensor_interval_ms,
        runtime.timing.manual_timeout_ms,
    );

    let state = AppState {
        station: Arc::new(Mutex::new(Station::new(&runtime))),
    };
    info!("relays initialized (all off)");

    spawn_control_loop(
        state.clone(),
        Duration::from_millis(runtime.timing.tick_interval_ms),
    );

    let app = build_router(state)?;

    let port = std::env::var("ROOMTEMP_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("ROOMTEMP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    match tokio::fs::read(&path).await {
        Ok(raw) => RuntimeConfig::from_json(&raw)
            .with_context(|| format!("failed to parse runtime config {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no runtime config at {}, using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read runtime config {}", path.display()))
        }
    }
}

fn build_router(state: AppState) -> anyhow::Result<Router> {
    let mut router = Router::new()
        .route(api::PATH_ROOT, get(handle_root).fallback(handle_not_found))
        .route(
            api::PATH_STATUS,
            get(handle_get_status)
                .options(handle_preflight)
                .fallback(handle_not_found),
        )
        .route(
            api::PATH_RELAY,
            get(handle_relay)
                .options(handle_preflight)
                .fallback(handle_not_found),
        )
        .fallback(handle_not_found)
        .with_state(state);

    for (name, value) in api::CORS_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name}"))?,
            HeaderValue::from_static(value),
        ));
    }

    Ok(router)
}

fn spawn_control_loop(state: AppState, tick: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();
            state.station.lock().await.tick(now_ms);
        }
    });
}

async fn handle_root() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, api::CONTENT_TYPE_TEXT)], api::BANNER)
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let status = {
        let station = state.station.lock().await;
        station.controller.status(now_ms)
    };

    Json(status)
}

async fn handle_relay(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.unwrap_or_default();
    let channel = api::query_value(&query, api::PARAM_CHANNEL);
    let state_param = api::query_value(&query, api::PARAM_STATE);

    let command = match api::parse_relay_command(channel.as_deref(), state_param.as_deref()) {
        Ok(command) => command,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let now_ms = monotonic_ms();
    let status = {
        let mut station = state.station.lock().await;
        if let Some(write) = station.controller.apply_relay_command(command, now_ms) {
            station.pins.apply(write);
        }
        station.controller.status(now_ms)
    };

    info!(
        "relay command ch{}={} applied, manual mode for {}s",
        command.channel,
        if command.on { "ON" } else { "OFF" },
        status.manual_remaining_s
    );
    Json(status).into_response()
}

async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, api::NOT_FOUND_MESSAGE)
}

impl Station {
    fn new(runtime: &RuntimeConfig) -> Self {
        let mut station = Self {
            controller: Controller::new(runtime),
            pins: SimulatedPins::default(),
            sensor: SimulatedSensor::new(runtime.thermostat.target_temp_c, SIMULATED_FAILURE_EVERY),
            display_interval_ms: runtime.timing.display_interval_ms,
            last_display_ms: 0,
            last_display: None,
        };
        for write in station.controller.startup() {
            station.pins.apply(write);
        }
        station
    }

    fn tick(&mut self, now_ms: u64) {
        let report = self.controller.tick(now_ms, &mut self.sensor);
        log_tick(&report);
        for write in report.writes {
            self.pins.apply(write);
        }
        self.refresh_display(now_ms);
    }

    fn refresh_display(&mut self, now_ms: u64) {
        if !is_due(now_ms, self.last_display_ms, self.display_interval_ms) {
            return;
        }
        self.last_display_ms = now_ms;

        let lines = self.controller.display_lines();
        if self.last_display.as_ref() != Some(&lines) {
            debug!("display |{}| |{}|", lines[0], lines[1]);
            self.last_display = Some(lines);
        }
    }
}

fn log_tick(report: &TickReport) {
    match &report.sample {
        SampleOutcome::Updated(reading) => info!(
            "sensor T={:?}C H={:?}%",
            reading.temperature_c, reading.humidity
        ),
        SampleOutcome::Failed(err) => warn!("{err}; keeping last reading"),
        SampleOutcome::NotDue => {}
    }

    if report.reverted_to_auto {
        info!("manual timeout elapsed, back to AUTO");
    }
}

impl SimulatedPins {
    fn apply(&mut self, write: PinWrite) {
        let Some(slot) = usize::from(write.channel)
            .checked_sub(1)
            .and_then(|index| self.levels.get_mut(index))
        else {
            return;
        };

        // Only level changes are worth a log line; writes repeat every tick.
        if *slot != Some(write.level) {
            info!(
                "relay ch{} -> {} (pin {:?})",
                write.channel,
                if write.on { "ON" } else { "OFF" },
                write.level
            );
            *slot = Some(write.level);
        }
    }

    #[cfg(test)]
    fn level(&self, channel: u8) -> Option<Level> {
        usize::from(channel)
            .checked_sub(1)
            .and_then(|index| self.levels.get(index).copied().flatten())
    }
}

impl SimulatedSensor {
    fn new(base_c: f32, fail_every: u64) -> Self {
        Self {
            base_c,
            reads: 0,
            fail_every,
        }
    }
}

impl SensorDriver for SimulatedSensor {
    fn read(&mut self) -> Result<(f32, f32), SensorError> {
        self.reads = self.reads.saturating_add(1);

        // Hardware integration point: the ESP32 build reads a DHT11 here.
        if self.fail_every > 0 && self.reads % self.fail_every == 0 {
            return Err(SensorError::ReadFailed(
                "simulated DHT11 timeout".to_string(),
            ));
        }

        let phase = self.reads % 24;
        let step = if phase < 12 { phase } else { 24 - phase };
        let temperature_c = self.base_c + step as f32 * 0.25 - 1.5;
        let humidity = 55.0 + (self.reads % 6) as f32 * 0.5;
        Ok((temperature_c, humidity))
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
