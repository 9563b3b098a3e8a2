//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fleet_cloud::ReconcilerConfig;
use fleet_sim::{SimConfig, SpawnConfig};

use crate::hub::HubConfig;
use crate::tick::TickConfig;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "fleet_app",
    about = "Real-time 3D visualizer for a cloud compute fleet"
)]
pub struct Config {
    /// Address the HTTP and websocket listener binds to
    #[arg(long, env = "FLEET_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory of browser client files
    #[arg(long, env = "FLEET_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Seconds between inventory polls
    #[arg(long, env = "FLEET_RECONCILE_PERIOD", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconcile_period: u64,

    /// Seconds of CPU metrics averaged per poll
    #[arg(long, env = "FLEET_METRICS_WINDOW", default_value_t = 600)]
    pub metrics_window: u64,

    /// Region passed through to the provider
    #[arg(long, env = "FLEET_REGION")]
    pub region: Option<String>,

    /// JSON inventory read by the file-backed provider
    #[arg(long, env = "FLEET_INVENTORY_FILE")]
    pub inventory_file: Option<PathBuf>,

    /// Simulation ticks per second
    #[arg(long, env = "FLEET_TICK_RATE", default_value_t = 60.0, value_parser = positive_rate)]
    pub tick_rate: f64,

    /// Frames a client may have queued before it counts as stalled
    #[arg(long, env = "FLEET_CLIENT_QUEUE", default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    pub client_queue: u32,

    /// Consecutive stalled ticks after which a client is dropped
    #[arg(long, env = "FLEET_MAX_STALLED_TICKS", default_value_t = 30)]
    pub max_stalled_ticks: u32,

    /// Half-extent of the square new instances are scattered over
    #[arg(long, env = "FLEET_SCATTER_RADIUS", default_value_t = 100.0, value_parser = scatter_radius)]
    pub scatter_radius: f32,

    /// Seed for spawn scattering; random when unset
    #[arg(long, env = "FLEET_SEED")]
    pub seed: Option<u64>,
}

fn positive_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("tick rate must be a positive number, got {rate}"))
    }
}

fn scatter_radius(s: &str) -> Result<f32, String> {
    let radius: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if radius.is_finite() && radius >= 0.0 {
        Ok(radius)
    } else {
        Err(format!("scatter radius must be a finite non-negative number, got {radius}"))
    }
}

impl Config {
    #[must_use]
    pub fn tick(&self) -> TickConfig {
        TickConfig {
            tick_rate: self.tick_rate,
            max_ticks: 0,
        }
    }

    #[must_use]
    pub fn hub(&self) -> HubConfig {
        HubConfig {
            client_queue: self.client_queue as usize,
            max_stalled_ticks: self.max_stalled_ticks,
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig::default()
            .with_period(Duration::from_secs(self.reconcile_period))
            .with_metrics_window(Duration::from_secs(self.metrics_window))
    }

    #[must_use]
    pub fn sim(&self) -> SimConfig {
        SimConfig {
            spawn: SpawnConfig {
                scatter_radius: self.scatter_radius,
            },
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["fleet_app"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.reconciler().period, Duration::from_secs(60));
        assert_eq!(config.reconciler().metrics_window, Duration::from_secs(600));
        assert_eq!(config.tick().tick_rate, 60.0);
        assert_eq!(config.hub().client_queue, 64);
        assert_eq!(config.hub().max_stalled_ticks, 30);
        assert_eq!(config.sim().spawn.scatter_radius, 100.0);
        assert!(config.inventory_file.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "fleet_app",
            "--listen",
            "127.0.0.1:9000",
            "--reconcile-period",
            "5",
            "--tick-rate",
            "30",
            "--seed",
            "7",
            "--region",
            "eu-west-1",
        ])
        .unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.reconciler().period, Duration::from_secs(5));
        assert_eq!(config.tick().tick_rate, 30.0);
        assert_eq!(config.sim().seed, Some(7));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::try_parse_from(["fleet_app", "--tick-rate", "0"]).is_err());
        assert!(Config::try_parse_from(["fleet_app", "--client-queue", "0"]).is_err());
        assert!(Config::try_parse_from(["fleet_app", "--reconcile-period", "0"]).is_err());
        assert!(Config::try_parse_from(["fleet_app", "--scatter-radius", "NaN"]).is_err());
        assert!(Config::try_parse_from(["fleet_app", "--scatter-radius", "inf"]).is_err());
        assert!(Config::try_parse_from(["fleet_app", "--scatter-radius", "-5"]).is_err());

        let config = Config::try_parse_from(["fleet_app", "--scatter-radius", "0"]).unwrap();
        assert_eq!(config.sim().spawn.scatter_radius, 0.0);
    }
}
