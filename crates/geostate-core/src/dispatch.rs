use crate::config::DispatchConfig;
use crate::error::Result;
use crate::geocode::{Geocoder, ResolveError};
use crate::types::{GeocoderId, LocationPoint};
use std::time::{Duration, Instant};

/// Why the dispatcher will make no further calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    Halted(String),
}

/// Outcome of offering one point to the dispatcher.
#[derive(Debug)]
pub enum Dispatch {
    Resolved(String),
    /// The call was made and failed; the point stays unresolved.
    Failed(ResolveError),
    /// No call was made.
    Stopped(StopReason),
}

/// Paces and caps calls to a single backend for one run.
pub struct GeocodeDispatcher<'a> {
    geocoder: &'a dyn Geocoder,
    pace: Duration,
    limit: Option<usize>,
    max_consecutive_failures: Option<u32>,
    calls: usize,
    consecutive_failures: u32,
    halted: Option<String>,
    last_call: Option<Instant>,
}

impl<'a> GeocodeDispatcher<'a> {
    /// Fails with `BackendUnusable` before any call when the backend's
    /// configuration is invalid.
    pub fn new(geocoder: &'a dyn Geocoder, config: &DispatchConfig) -> Result<Self> {
        geocoder.check()?;
        let pace = config
            .pace_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| geocoder.default_pace());
        Ok(Self {
            geocoder,
            pace,
            limit: config.limit,
            max_consecutive_failures: config.max_consecutive_failures,
            calls: 0,
            consecutive_failures: 0,
            halted: None,
            last_call: None,
        })
    }

    pub fn geocoder_id(&self) -> GeocoderId {
        self.geocoder.id()
    }

    pub fn calls_made(&self) -> usize {
        self.calls
    }

    pub fn pace(&self) -> Duration {
        self.pace
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if let Some(reason) = &self.halted {
            return Some(StopReason::Halted(reason.clone()));
        }
        match self.limit {
            Some(limit) if self.calls >= limit => Some(StopReason::LimitReached),
            _ => None,
        }
    }

    /// Resolve one point, sleeping first if the previous call started less
    /// than `pace` ago.
    pub fn resolve(&mut self, point: &LocationPoint) -> Dispatch {
        if let Some(reason) = self.stop_reason() {
            return Dispatch::Stopped(reason);
        }

        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.pace {
                std::thread::sleep(self.pace - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
        self.calls += 1;

        tracing::debug!(
            call = self.calls,
            point = %point.identity(),
            geocoder = %self.geocoder.id(),
            "reverse geocoding"
        );

        match self.geocoder.resolve(point.coordinate) {
            Ok(state) => {
                self.consecutive_failures = 0;
                Dispatch::Resolved(state)
            }
            Err(err) => {
                self.consecutive_failures += 1;
                tracing::warn!(point = %point.identity(), error = %err, "reverse geocoding failed");
                if err.is_fatal() {
                    self.halted = Some(err.to_string());
                } else if let Some(max) = self.max_consecutive_failures {
                    if self.consecutive_failures >= max {
                        self.halted = Some(format!("{max} consecutive failures, last: {err}"));
                    }
                }
                Dispatch::Failed(err)
            }
        }
    }
}
