use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyOutputPin, InputOutput, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::Serialize;

use roomtemp_common::{
    api,
    config::{NetworkConfig, RelayConfig},
    sensor::is_due,
    Controller, ErrorBody, Level, PinWrite, RelayCommand, RuntimeConfig, SampleOutcome,
    SensorDriver, SensorError, StatusPayload, TickReport,
};

const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type HttpRequest<'r, 'c> =
    esp_idf_svc::http::server::Request<&'r mut esp_idf_svc::http::server::EspHttpConnection<'c>>;

type SharedStation = Arc<Mutex<Station>>;

struct Station {
    controller: Controller,
    relays: RelayPins,
    sensor: Dht11Sensor,
    display_interval_ms: u64,
    last_display_ms: u64,
    last_display: Option<[String; 2]>,
}

struct RelayPins {
    pins: Vec<PinDriver<'static, AnyOutputPin, Output>>,
    levels: Vec<Option<Level>>,
}

struct Dht11Sensor {
    gpio: i32,
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    info!(
        "config: target={:.1}C hysteresis={:.1}C relays=GPIO{:?} dht=GPIO{}",
        runtime.thermostat.target_temp_c,
        runtime.thermostat.hysteresis_c,
        runtime.relays.channels.map(|channel| channel.gpio),
        runtime.sensor.dht_gpio,
    );

    let mut relays = RelayPins::new(&runtime.relays)?;
    let mut controller = Controller::new(&runtime);
    for write in controller.startup() {
        relays.apply(write);
    }
    info!("relays initialized (all off)");

    let sensor = Dht11Sensor::new(runtime.sensor.dht_gpio)?;

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let station: SharedStation = Arc::new(Mutex::new(Station {
        controller,
        relays,
        sensor,
        display_interval_ms: runtime.timing.display_interval_ms,
        last_display_ms: 0,
        last_display: None,
    }));

    spawn_control_loop(
        station.clone(),
        Duration::from_millis(runtime.timing.tick_interval_ms),
    )?;

    let server = create_http_server(station, runtime.network.http_port)?;
    info!("HTTP server started on port {}", runtime.network.http_port);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn create_http_server(station: SharedStation, port: u16) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        uri_match_wildcard: true,
        stack_size: 8 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>(api::PATH_ROOT, Method::Get, |req| {
        req.into_response(200, Some("OK"), &response_headers(api::CONTENT_TYPE_TEXT))?
            .write_all(api::BANNER.as_bytes())?;
        Ok(())
    })?;

    {
        let station = station.clone();
        server.fn_handler(api::PATH_STATUS, Method::Get, move |req| {
            let status = lock_station(&station).controller.status(monotonic_ms());
            write_json(req, &status)
        })?;
    }

    {
        let station = station.clone();
        server.fn_handler(api::PATH_RELAY, Method::Get, move |req| {
            let channel = api::query_param(req.uri(), api::PARAM_CHANNEL);
            let state = api::query_param(req.uri(), api::PARAM_STATE);

            let command = match api::parse_relay_command(channel.as_deref(), state.as_deref()) {
                Ok(command) => command,
                Err(err) => return write_error(req, 400, &err.to_string()),
            };

            let status = lock_station(&station).apply_command(command, monotonic_ms());
            info!(
                "relay command ch{}={} applied, manual mode for {}s",
                command.channel,
                if command.on { "ON" } else { "OFF" },
                status.manual_remaining_s
            );
            write_json(req, &status)
        })?;
    }

    for path in [api::PATH_STATUS, api::PATH_RELAY] {
        server.fn_handler::<anyhow::Error, _>(path, Method::Options, |req| {
            req.into_response(204, None, &api::CORS_HEADERS)?;
            Ok(())
        })?;
    }

    // Registered last: the server tries handlers in registration order.
    for method in [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Options,
    ] {
        server.fn_handler("/*", method, |req| {
            write_error(req, 404, api::NOT_FOUND_MESSAGE)
        })?;
    }

    Ok(server)
}

fn response_headers(content_type: &'static str) -> [(&'static str, &'static str); 4] {
    let [origin, methods, headers] = api::CORS_HEADERS;
    [("Content-Type", content_type), origin, methods, headers]
}

fn write_json<T: Serialize>(req: HttpRequest<'_, '_>, payload: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(200, Some("OK"), &response_headers(api::CONTENT_TYPE_JSON))?
        .write_all(&body)?;
    Ok(())
}

fn write_error(req: HttpRequest<'_, '_>, status_code: u16, message: &str) -> anyhow::Result<()> {
    let body = serde_json::to_vec(&ErrorBody::new(message))?;
    req.into_response(status_code, None, &response_headers(api::CONTENT_TYPE_JSON))?
        .write_all(&body)?;
    Ok(())
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if network.wifi_ssid.is_empty() {
        return Err(anyhow!("wifi ssid missing; build with WIFI_SSID set"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                let ip = wifi.wifi().sta_netif().get_ip_info()?.ip;
                info!("wifi connected on attempt {attempt}, IP {ip}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    if let Some(err) = last_err {
        return Err(err).context(format!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
        ));
    }

    Ok(esp_wifi)
}

fn spawn_control_loop(station: SharedStation, tick: Duration) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            let now_ms = monotonic_ms();
            lock_station(&station).tick(now_ms);
            thread::sleep(tick);
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

fn lock_station(station: &SharedStation) -> MutexGuard<'_, Station> {
    // A panicked handler leaves the relay state consistent; keep serving.
    station.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Station {
    fn tick(&mut self, now_ms: u64) {
        let report = self.controller.tick(now_ms, &mut self.sensor);
        log_tick(&report);
        for write in report.writes {
            self.relays.apply(write);
        }

        if is_due(now_ms, self.last_display_ms, self.display_interval_ms) {
            self.last_display_ms = now_ms;
            let lines = self.controller.display_lines();
            if self.last_display.as_ref() != Some(&lines) {
                info!("[LCD] {} | {}", lines[0], lines[1]);
                self.last_display = Some(lines);
            }
        }
    }

    fn apply_command(&mut self, command: RelayCommand, now_ms: u64) -> StatusPayload {
        if let Some(write) = self.controller.apply_relay_command(command, now_ms) {
            self.relays.apply(write);
        }
        self.controller.status(now_ms)
    }
}

fn log_tick(report: &TickReport) {
    match &report.sample {
        SampleOutcome::Updated(reading) => info!(
            "[DHT11] T={:?}C H={:?}%",
            reading.temperature_c, reading.humidity
        ),
        SampleOutcome::Failed(err) => warn!("{err}; keeping last reading"),
        SampleOutcome::NotDue => {}
    }

    if report.reverted_to_auto {
        info!("manual timeout elapsed, back to AUTO");
    }
}

impl RelayPins {
    fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let pins = config
            .channels
            .iter()
            .map(|channel| {
                unsafe { PinDriver::output(AnyOutputPin::new(channel.gpio)) }
                    .with_context(|| format!("failed to configure relay GPIO{}", channel.gpio))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            levels: vec![None; pins.len()],
            pins,
        })
    }

    fn apply(&mut self, write: PinWrite) {
        let Some(index) = usize::from(write.channel).checked_sub(1) else {
            return;
        };
        let (Some(pin), Some(current)) = (self.pins.get_mut(index), self.levels.get_mut(index))
        else {
            return;
        };

        if *current == Some(write.level) {
            return;
        }

        let result = match write.level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        };
        match result {
            Ok(()) => {
                *current = Some(write.level);
                info!(
                    "relay ch{} -> {} (pin {:?})",
                    write.channel,
                    if write.on { "ON" } else { "OFF" },
                    write.level
                );
            }
            Err(err) => warn!("failed to drive relay ch{}: {err:?}", write.channel),
        }
    }
}

impl Dht11Sensor {
    fn new(gpio: i32) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(gpio) })
            .with_context(|| format!("failed to configure DHT11 GPIO{gpio}"))?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        Ok(Self {
            gpio,
            pin,
            delay: Ets,
        })
    }
}

impl SensorDriver for Dht11Sensor {
    fn read(&mut self) -> Result<(f32, f32), SensorError> {
        self.pin.set_high().map_err(|err| {
            SensorError::ReadFailed(format!("DHT11 line on GPIO{} stuck: {err:?}", self.gpio))
        })?;

        let reading = dht11::blocking::read(&mut self.delay, &mut self.pin).map_err(|err| {
            SensorError::ReadFailed(format!("DHT11 on GPIO{}: {err:?}", self.gpio))
        })?;

        Ok((
            f32::from(reading.temperature),
            f32::from(reading.relative_humidity),
        ))
    }
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
