//! Synthetic report generator
//!
//! Offline stand-in for the live feed. Emits one report per tick, drawn
//! from a fixed scenario pool and attributed to one of a small fleet of
//! synthetic vessels with stable routes.

use super::{
    ConnectionState, NavHint, NavStatus, RawReport, ReportSource, SourceContext, SourceMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logitrack_common::config::SyntheticConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Coordinate jitter applied to every emitted position (degrees)
const JITTER_DEGREES: f64 = 0.05;

/// Major shipping ports: (label, latitude, longitude)
pub const PORTS: &[(&str, f64, f64)] = &[
    ("Shanghai, China", 31.2304, 121.4737),
    ("Singapore", 1.2897, 103.8501),
    ("Rotterdam, Netherlands", 51.9225, 4.4792),
    ("Hamburg, Germany", 53.5511, 9.9937),
    ("Los Angeles, USA", 34.0522, -118.2437),
    ("Long Beach, USA", 33.7701, -118.1937),
    ("New York, USA", 40.7128, -74.0060),
    ("Hong Kong", 22.3193, 114.1694),
    ("Busan, South Korea", 35.1796, 129.0756),
    ("Dubai, UAE", 25.2048, 55.2708),
    ("Tokyo, Japan", 35.6762, 139.6503),
    ("Mumbai, India", 19.0760, 72.8777),
    ("London, UK", 51.5074, -0.1278),
    ("Sydney, Australia", -33.8688, 151.2093),
    ("Vancouver, Canada", 49.2827, -123.1207),
    ("Seattle, USA", 47.6062, -122.3321),
    ("Miami, USA", 25.7617, -80.1918),
    ("Santos, Brazil", -23.9608, -46.3334),
    ("Buenos Aires, Argentina", -34.6037, -58.3816),
    ("Melbourne, Australia", -37.8136, 144.9631),
    ("Antwerp, Belgium", 51.2194, 4.4025),
    ("Barcelona, Spain", 41.3851, 2.1734),
    ("Istanbul, Turkey", 41.0082, 28.9784),
    ("Jeddah, Saudi Arabia", 21.5433, 39.1728),
    ("Cape Town, South Africa", -33.9249, 18.4241),
    ("Lagos, Nigeria", 6.5244, 3.3792),
    ("Karachi, Pakistan", 24.8607, 67.0011),
    ("Chennai, India", 13.0827, 80.2707),
    ("Bangkok, Thailand", 13.7563, 100.5018),
    ("Jakarta, Indonesia", -6.2088, 106.8456),
    ("Manila, Philippines", 14.5995, 120.9842),
    ("Ho Chi Minh City, Vietnam", 10.8231, 106.6297),
    ("Colombo, Sri Lanka", 6.9271, 79.8612),
    ("Port Said, Egypt", 31.2653, 32.3019),
    ("Piraeus, Greece", 37.9469, 23.6436),
    ("Genoa, Italy", 44.4056, 8.9463),
    ("Marseille, France", 43.2965, 5.3698),
    ("Valencia, Spain", 39.4699, -0.3763),
    ("Felixstowe, UK", 51.9612, 1.3511),
    ("Bremen, Germany", 53.0793, 8.8017),
];

/// Where a scenario takes place
#[derive(Debug, Clone, Copy)]
enum Place {
    /// Fixed location
    At(&'static str, f64, f64),
    /// Any port
    AnyPort,
    /// The vessel's own destination
    Destination,
}

#[derive(Debug, Clone, Copy)]
struct Scenario {
    text: &'static str,
    place: Place,
    nav: Option<NavStatus>,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        text: "Vessel delayed at port due to congestion.",
        place: Place::At("Port of Singapore", 1.2897, 103.8501),
        nav: Some(NavStatus::AtAnchor),
    },
    Scenario {
        text: "On time, arrived at sorting facility.",
        place: Place::At("Los Angeles, CA", 34.0522, -118.2437),
        nav: None,
    },
    Scenario {
        text: "Customs hold - incomplete paperwork.",
        place: Place::At("Newark, NJ", 40.7357, -74.1724),
        nav: Some(NavStatus::Moored),
    },
    Scenario {
        text: "Departed from origin port.",
        place: Place::At("Hamburg, Germany", 53.5511, 9.9937),
        nav: Some(NavStatus::UnderWayUsingEngine),
    },
    Scenario {
        text: "Weather delay - typhoon.",
        place: Place::At("Shanghai, China", 31.2304, 121.4737),
        nav: Some(NavStatus::AtAnchor),
    },
    Scenario {
        text: "Trucking to final destination.",
        place: Place::At("Chicago, IL", 41.8781, -87.6298),
        nav: None,
    },
    Scenario {
        text: "Package delivered successfully.",
        place: Place::Destination,
        nav: Some(NavStatus::Moored),
    },
    Scenario {
        text: "In transit - maintaining schedule",
        place: Place::AnyPort,
        nav: Some(NavStatus::UnderWayUsingEngine),
    },
    Scenario {
        text: "Departed origin port on schedule",
        place: Place::AnyPort,
        nav: Some(NavStatus::UnderWayUsingEngine),
    },
    Scenario {
        text: "Processing at distribution center",
        place: Place::AnyPort,
        nav: None,
    },
    Scenario {
        text: "Vessel delayed - severe port congestion at berth",
        place: Place::AnyPort,
        nav: Some(NavStatus::AtAnchor),
    },
    Scenario {
        text: "Port congestion - 48hr queue for dock space",
        place: Place::AnyPort,
        nav: Some(NavStatus::AtAnchor),
    },
    Scenario {
        text: "Weather delay - Typhoon warning, vessel holding position",
        place: Place::AnyPort,
        nav: Some(NavStatus::AtAnchor),
    },
    Scenario {
        text: "Severe weather - Hurricane causing delay",
        place: Place::AnyPort,
        nav: Some(NavStatus::UnderWayUsingEngine),
    },
    Scenario {
        text: "Customs hold - missing documentation, awaiting paperwork",
        place: Place::AnyPort,
        nav: Some(NavStatus::Moored),
    },
    Scenario {
        text: "Customs inspection in progress",
        place: Place::AnyPort,
        nav: Some(NavStatus::Moored),
    },
    Scenario {
        text: "Successfully delivered to recipient",
        place: Place::Destination,
        nav: Some(NavStatus::Moored),
    },
    Scenario {
        text: "Package delivered, signed by customer",
        place: Place::Destination,
        nav: Some(NavStatus::Moored),
    },
];

#[derive(Debug, Clone)]
struct Vessel {
    id: String,
    origin: (&'static str, f64, f64),
    destination: (&'static str, f64, f64),
}

pub struct SyntheticGenerator {
    config: SyntheticConfig,
    rng: StdRng,
    fleet: Vec<Vessel>,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let fleet = (1..=config.vessel_count.max(1))
            .map(|n| {
                let origin = PORTS[rng.gen_range(0..PORTS.len())];
                let destination = loop {
                    let candidate = PORTS[rng.gen_range(0..PORTS.len())];
                    if candidate.0 != origin.0 {
                        break candidate;
                    }
                };
                Vessel {
                    id: format!("SHP{:06}", n),
                    origin,
                    destination,
                }
            })
            .collect();

        Self { config, rng, fleet }
    }

    pub fn vessel_ids(&self) -> Vec<String> {
        self.fleet.iter().map(|v| v.id.clone()).collect()
    }

    /// Draw one report
    pub fn next_report(&mut self, now: DateTime<Utc>) -> RawReport {
        let vessel_idx = self.rng.gen_range(0..self.fleet.len());
        let scenario = *SCENARIOS
            .choose(&mut self.rng)
            .unwrap_or(&SCENARIOS[0]);
        let vessel = &self.fleet[vessel_idx];

        let (label, lat, lon) = match scenario.place {
            Place::At(label, lat, lon) => (label, lat, lon),
            Place::Destination => vessel.destination,
            Place::AnyPort => PORTS[self.rng.gen_range(0..PORTS.len())],
        };

        let latitude = lat + self.rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES);
        let longitude = lon + self.rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES);
        let latitude = latitude.clamp(-90.0, 90.0);
        let longitude = longitude.clamp(-180.0, 180.0);

        RawReport {
            external_id: vessel.id.clone(),
            raw_status_text: scenario.text.to_string(),
            nav_hint: scenario.nav.map(NavHint::new),
            latitude,
            longitude,
            observed_at: now,
            location_label: Some(label.to_string()),
            origin: Some(vessel.origin.0.to_string()),
            destination: Some(vessel.destination.0.to_string()),
        }
    }
}

#[async_trait]
impl ReportSource for SyntheticGenerator {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Synthetic
    }

    async fn run(mut self: Box<Self>, ctx: SourceContext) {
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        info!(
            interval_ms = period.as_millis() as u64,
            vessels = self.fleet.len(),
            "Synthetic generator started"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ctx.set_state(ConnectionState::Receiving);

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.next_report(Utc::now());
                    debug!(
                        external_id = %report.external_id,
                        status = %report.raw_status_text,
                        "Synthetic report"
                    );
                    ctx.publish(report);
                }
            }
        }

        ctx.set_state(ConnectionState::Closing);
        ctx.set_state(ConnectionState::Disconnected);
        info!("Synthetic generator stopped");
    }
}
