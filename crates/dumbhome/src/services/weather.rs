//! Weather fetch and cache.
//!
//! A time-boxed cache around the open-meteo current-conditions endpoint.
//! Fetches run on a worker thread (minreq is blocking) and results come back
//! over a channel; the owning thread applies them via [`WeatherService::poll`].
//! A generation counter makes late results from a superseded request or a
//! disposed screen harmless: they are drained and dropped.
//!
//! Cache rules: a snapshot younger than thirty minutes suppresses the
//! network entirely; a failed fetch keeps the previous snapshot for display;
//! a failure with nothing cached is an explicit "unavailable" state, never a
//! stale or partial one.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How long a snapshot stays fresh.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Bounded wait for the network call, in seconds.
const FETCH_TIMEOUT_SECS: u64 = 5;

/// Current conditions as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReading {
    pub temperature: i32,
    pub unit: String,
    pub condition: String,
}

impl WeatherReading {
    /// The home-screen line, e.g. `18°C · Overcast`.
    pub fn display(&self) -> String {
        format!("{}{} \u{b7} {}", self.temperature, self.unit, self.condition)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] minreq::Error),

    #[error("weather request returned status {0}")]
    Status(i32),

    #[error("malformed weather response: missing {0}")]
    MalformedResponse(&'static str),
}

/// Last-known-location boundary.
pub trait LocationProvider {
    fn last_known(&self) -> Option<(f64, f64)>;
}

/// [`LocationProvider`] from `DUMBHOME_LATITUDE` / `DUMBHOME_LONGITUDE`.
///
/// The CLI host has no platform location service, so the coordinates come
/// from the environment.
pub struct EnvLocation;

impl LocationProvider for EnvLocation {
    fn last_known(&self) -> Option<(f64, f64)> {
        let lat = std::env::var("DUMBHOME_LATITUDE").ok()?.parse().ok()?;
        let lon = std::env::var("DUMBHOME_LONGITUDE").ok()?.parse().ok()?;
        Some((lat, lon))
    }
}

/// Map a WMO weather code to a short label.
pub fn condition_label(code: i64) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mostly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snow",
        77 => "Snow grains",
        80 | 81 | 82 => "Showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Hail storm",
        _ => "Unknown",
    }
}

/// Fetch current conditions from open-meteo. Blocks up to the fetch
/// timeout; call from a worker thread (or the CLI's one-shot path).
pub fn fetch_current(latitude: f64, longitude: f64) -> Result<WeatherReading, WeatherError> {
    let url = format!(
        "https://api.open-meteo.com/v1/forecast\
         ?latitude={latitude}&longitude={longitude}\
         &current=temperature_2m,weather_code&timezone=auto"
    );

    let response = minreq::get(&url).with_timeout(FETCH_TIMEOUT_SECS).send()?;
    if !(200..300).contains(&response.status_code) {
        return Err(WeatherError::Status(response.status_code));
    }

    let json: serde_json::Value = serde_json::from_str(
        response
            .as_str()
            .map_err(|_| WeatherError::MalformedResponse("utf-8 body"))?,
    )
    .map_err(|_| WeatherError::MalformedResponse("json body"))?;

    let current = &json["current"];
    let temperature = current["temperature_2m"]
        .as_f64()
        .ok_or(WeatherError::MalformedResponse("current.temperature_2m"))?
        as i32;
    let code = current["weather_code"]
        .as_i64()
        .ok_or(WeatherError::MalformedResponse("current.weather_code"))?;
    let unit = json["current_units"]["temperature_2m"]
        .as_str()
        .ok_or(WeatherError::MalformedResponse("current_units.temperature_2m"))?
        .to_string();

    Ok(WeatherReading {
        temperature,
        unit,
        condition: condition_label(code).to_string(),
    })
}

/// The time-boxed snapshot cache. Pure state; time is passed in so tests
/// control the clock.
#[derive(Debug, Default)]
pub struct WeatherCache {
    snapshot: Option<(WeatherReading, Instant)>,
    /// True once a fetch has failed with nothing cached.
    unavailable: bool,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fetch is needed at `now`.
    pub fn needs_fetch(&self, now: Instant) -> bool {
        match &self.snapshot {
            Some((_, fetched_at)) => now.duration_since(*fetched_at) >= FRESHNESS_WINDOW,
            None => true,
        }
    }

    pub fn note_success(&mut self, reading: WeatherReading, now: Instant) {
        self.snapshot = Some((reading, now));
        self.unavailable = false;
    }

    /// A fetch failed: keep the previous snapshot if there is one, otherwise
    /// mark the cache explicitly unavailable.
    pub fn note_failure(&mut self) {
        if self.snapshot.is_none() {
            self.unavailable = true;
        }
    }

    pub fn reading(&self) -> Option<&WeatherReading> {
        self.snapshot.as_ref().map(|(r, _)| r)
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }
}

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherView {
    /// Feature off; show nothing.
    Hidden,
    /// No location fix yet.
    AwaitingLocation,
    /// Fetch failed with nothing cached.
    Unavailable,
    /// Nothing yet, fetch may be in flight.
    Pending,
    /// A (possibly stale but displayable) reading.
    Reading(String),
}

/// Outcome of a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDisposition {
    /// Cache is fresh; no fetch issued.
    Fresh,
    /// A fetch is already in flight.
    AlreadyRunning,
    /// No last-known location; nothing to fetch.
    AwaitingLocation,
    /// A background fetch was started.
    Started,
}

struct Envelope {
    generation: u64,
    result: Result<WeatherReading, WeatherError>,
}

/// Owns the cache and the background-fetch hand-off.
///
/// All methods run on the owning thread; only the worker the service spawns
/// runs elsewhere, and it communicates exclusively through the channel.
pub struct WeatherService {
    cache: WeatherCache,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    generation: u64,
    in_flight: bool,
}

impl Default for WeatherService {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherService {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            cache: WeatherCache::new(),
            tx,
            rx,
            generation: 0,
            in_flight: false,
        }
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    /// Refresh through the cache: fresh snapshots suppress the network call
    /// entirely; otherwise a worker thread fetches for the last-known
    /// location.
    pub fn request_refresh(
        &mut self,
        location: &dyn LocationProvider,
        now: Instant,
    ) -> RefreshDisposition {
        if !self.cache.needs_fetch(now) {
            debug!("Weather cache is fresh, skipping fetch");
            return RefreshDisposition::Fresh;
        }
        let Some((lat, lon)) = location.last_known() else {
            return RefreshDisposition::AwaitingLocation;
        };
        self.spawn_fetch(move || fetch_current(lat, lon))
    }

    /// Start a background fetch with an arbitrary fetcher. Split out so the
    /// channel plumbing is testable without the network.
    fn spawn_fetch<F>(&mut self, fetch: F) -> RefreshDisposition
    where
        F: FnOnce() -> Result<WeatherReading, WeatherError> + Send + 'static,
    {
        if self.in_flight {
            return RefreshDisposition::AlreadyRunning;
        }

        self.generation += 1;
        self.in_flight = true;
        let generation = self.generation;
        let tx = self.tx.clone();

        thread::spawn(move || {
            let result = fetch();
            // The receiver may be gone if the service was dropped; that is
            // exactly the screen-disposed case and the result is dropped.
            let _ = tx.send(Envelope { generation, result });
        });

        RefreshDisposition::Started
    }

    /// Drop any result still in flight (the requesting screen went away).
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.in_flight = false;
    }

    /// Apply completed fetches to the cache. Returns true if the cache
    /// changed. Call from the owning thread; never blocks.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.generation != self.generation {
                debug!("Dropping weather result from superseded request");
                continue;
            }
            self.in_flight = false;
            match envelope.result {
                Ok(reading) => {
                    debug!("Weather updated: {}", reading.display());
                    self.cache.note_success(reading, now);
                    changed = true;
                }
                Err(e) => {
                    warn!("Weather fetch failed: {}", e);
                    self.cache.note_failure();
                    changed = true;
                }
            }
        }
        changed
    }

    /// The current presentation state. `enabled` is the feature toggle.
    pub fn view(&self, enabled: bool, has_location: bool) -> WeatherView {
        if !enabled {
            return WeatherView::Hidden;
        }
        if let Some(reading) = self.cache.reading() {
            return WeatherView::Reading(reading.display());
        }
        if self.cache.is_unavailable() {
            return WeatherView::Unavailable;
        }
        if !has_location {
            return WeatherView::AwaitingLocation;
        }
        WeatherView::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: i32) -> WeatherReading {
        WeatherReading {
            temperature,
            unit: "°C".to_string(),
            condition: "Clear".to_string(),
        }
    }

    struct FixedLocation(Option<(f64, f64)>);

    impl LocationProvider for FixedLocation {
        fn last_known(&self) -> Option<(f64, f64)> {
            self.0
        }
    }

    /// Drive poll() until the worker result lands or the deadline passes.
    fn poll_until_settled(service: &mut WeatherService, now: Instant) {
        for _ in 0..200 {
            if service.poll(now) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("weather worker never delivered a result");
    }

    #[test]
    fn test_fresh_cache_suppresses_fetch() {
        let now = Instant::now();
        let mut service = WeatherService::new();
        service.cache.note_success(reading(18), now);

        let disposition = service.request_refresh(&FixedLocation(Some((1.0, 2.0))), now);
        assert_eq!(disposition, RefreshDisposition::Fresh);
    }

    #[test]
    fn test_expired_cache_triggers_fetch() {
        let now = Instant::now();
        let mut cache = WeatherCache::new();
        cache.note_success(reading(18), now);

        assert!(!cache.needs_fetch(now + FRESHNESS_WINDOW - Duration::from_secs(1)));
        assert!(cache.needs_fetch(now + FRESHNESS_WINDOW));
    }

    #[test]
    fn test_failure_keeps_prior_snapshot() {
        let now = Instant::now();
        let mut cache = WeatherCache::new();
        cache.note_success(reading(18), now);
        cache.note_failure();

        assert_eq!(cache.reading(), Some(&reading(18)));
        assert!(!cache.is_unavailable());
    }

    #[test]
    fn test_failure_with_no_snapshot_is_unavailable() {
        let mut cache = WeatherCache::new();
        cache.note_failure();
        assert!(cache.reading().is_none());
        assert!(cache.is_unavailable());
    }

    #[test]
    fn test_no_location_means_no_fetch() {
        let now = Instant::now();
        let mut service = WeatherService::new();
        let disposition = service.request_refresh(&FixedLocation(None), now);
        assert_eq!(disposition, RefreshDisposition::AwaitingLocation);
    }

    #[test]
    fn test_background_fetch_lands_via_poll() {
        let now = Instant::now();
        let mut service = WeatherService::new();

        let disposition = service.spawn_fetch(|| Ok(reading(21)));
        assert_eq!(disposition, RefreshDisposition::Started);

        poll_until_settled(&mut service, now);
        assert_eq!(service.cache.reading(), Some(&reading(21)));
    }

    #[test]
    fn test_second_request_while_in_flight_is_coalesced() {
        let mut service = WeatherService::new();
        service.spawn_fetch(|| {
            thread::sleep(Duration::from_millis(50));
            Ok(reading(1))
        });
        assert_eq!(
            service.spawn_fetch(|| Ok(reading(2))),
            RefreshDisposition::AlreadyRunning
        );
    }

    #[test]
    fn test_invalidate_drops_late_result() {
        let now = Instant::now();
        let mut service = WeatherService::new();

        service.spawn_fetch(|| Ok(reading(99)));
        service.invalidate();

        // Give the worker ample time, then drain: nothing may apply.
        thread::sleep(Duration::from_millis(100));
        let changed = service.poll(now);
        assert!(!changed);
        assert!(service.cache.reading().is_none());
    }

    #[test]
    fn test_failed_fetch_after_success_keeps_display() {
        let now = Instant::now();
        let mut service = WeatherService::new();
        service.cache.note_success(reading(18), now);

        service.spawn_fetch(|| Err(WeatherError::Status(503)));
        poll_until_settled(&mut service, now);

        assert_eq!(service.cache.reading(), Some(&reading(18)));
        assert_eq!(
            service.view(true, true),
            WeatherView::Reading("18°C \u{b7} Clear".to_string())
        );
    }

    #[test]
    fn test_view_states() {
        let service = WeatherService::new();
        assert_eq!(service.view(false, true), WeatherView::Hidden);
        assert_eq!(service.view(true, false), WeatherView::AwaitingLocation);
        assert_eq!(service.view(true, true), WeatherView::Pending);

        let mut service = WeatherService::new();
        service.cache.note_failure();
        assert_eq!(service.view(true, true), WeatherView::Unavailable);
    }

    #[test]
    fn test_condition_labels() {
        assert_eq!(condition_label(0), "Clear");
        assert_eq!(condition_label(3), "Overcast");
        assert_eq!(condition_label(45), "Fog");
        assert_eq!(condition_label(48), "Fog");
        assert_eq!(condition_label(95), "Thunderstorm");
        assert_eq!(condition_label(1234), "Unknown");
    }

    #[test]
    fn test_display_format() {
        assert_eq!(reading(18).display(), "18°C \u{b7} Clear");
    }
}
