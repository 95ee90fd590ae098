use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use dispatch_core::config::DispatchConfig;
use dispatch_core::matching::MatchingPolicyKind;

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "dispatch_node",
    about = "Run the trip dispatch pipeline in-process",
    long_about = "Boots the broker, dispatch coordinator and session gateway in one\n\
                  process, connects simulated drivers and riders, and requests the\n\
                  configured trips."
)]
pub struct Cli {
    /// Tracing filter directives
    #[arg(long, env = "DISPATCH_LOG", default_value = "info")]
    pub log_filter: String,

    /// Log record format
    #[arg(long, env = "DISPATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Treat an offer as declined after this many seconds without an answer
    #[arg(long, env = "DISPATCH_OFFER_TIMEOUT_SECS")]
    pub offer_timeout_secs: Option<u64>,

    /// Driver to connect, as `package:driver_id` (repeatable)
    #[arg(long = "driver", value_name = "PACKAGE:ID")]
    pub drivers: Vec<DriverSpec>,

    /// Trip to request, as `rider_id:package` (repeatable)
    #[arg(long = "trip", value_name = "RIDER:PACKAGE")]
    pub trips: Vec<TripSpec>,

    /// Chance that a simulated driver declines an offer
    #[arg(long, default_value_t = 0.3, value_parser = parse_probability)]
    pub decline_probability: f64,

    /// Seed for the simulated drivers' decisions
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Keep drivers matchable after their session ends
    #[arg(long)]
    pub keep_drivers_on_disconnect: bool,

    /// Stop after this many seconds (Ctrl-C stops earlier)
    #[arg(long, default_value_t = 5)]
    pub run_for_secs: u64,

    /// Driver selection policy
    #[arg(long, value_enum, default_value_t = PolicyArg::FirstRegistered)]
    pub policy: PolicyArg,
}

impl Cli {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            offer_timeout: self.offer_timeout_secs.map(Duration::from_secs),
            unregister_on_disconnect: !self.keep_drivers_on_disconnect,
        }
    }

    /// Drivers from the command line, or a small default fleet.
    pub fn drivers(&self) -> Vec<DriverSpec> {
        if !self.drivers.is_empty() {
            return self.drivers.clone();
        }
        [("suv", "driver-1"), ("suv", "driver-2"), ("sedan", "driver-3")]
            .into_iter()
            .map(|(package_slug, driver_id)| DriverSpec {
                package_slug: package_slug.to_string(),
                driver_id: driver_id.to_string(),
            })
            .collect()
    }

    /// Trips from the command line, or one per default package plus one that
    /// nobody serves.
    pub fn trips(&self) -> Vec<TripSpec> {
        if !self.trips.is_empty() {
            return self.trips.clone();
        }
        [("rider-1", "suv"), ("rider-2", "sedan"), ("rider-3", "luxury")]
            .into_iter()
            .map(|(rider_id, package_slug)| TripSpec {
                rider_id: rider_id.to_string(),
                package_slug: package_slug.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    FirstRegistered,
    RoundRobin,
}

impl From<PolicyArg> for MatchingPolicyKind {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::FirstRegistered => MatchingPolicyKind::FirstRegistered,
            PolicyArg::RoundRobin => MatchingPolicyKind::RoundRobin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSpec {
    pub package_slug: String,
    pub driver_id: String,
}

impl FromStr for DriverSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (package_slug, driver_id) = split_pair(value, "package:driver_id")?;
        Ok(Self {
            package_slug,
            driver_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSpec {
    pub rider_id: String,
    pub package_slug: String,
}

impl FromStr for TripSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (rider_id, package_slug) = split_pair(value, "rider_id:package")?;
        Ok(Self {
            rider_id,
            package_slug,
        })
    }
}

fn split_pair(value: &str, shape: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.trim().to_string(), right.trim().to_string()))
        }
        _ => Err(format!("expected `{shape}`, got `{value}`")),
    }
}

fn parse_probability(value: &str) -> Result<f64, String> {
    let probability: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(format!("probability must be within 0..=1, got {probability}"))
    }
}
