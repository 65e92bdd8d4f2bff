// src/config.rs

//! Configuration loading utilities.
//!
//! Loads the main config plus the schedule and filter rule files it points
//! to. Relative paths are resolved against the config file's directory.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Config, FlightSchedule, PathsConfig};
use crate::services::FaultCorrelationFilter;

/// Everything a monitor run needs from disk.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub config: Config,
    /// `config.paths` resolved to absolute locations
    pub paths: PathsConfig,
    pub schedule: Arc<FlightSchedule>,
    pub filter: FaultCorrelationFilter,
}

/// Load and validate config, schedule and filter rules.
///
/// A missing or unreadable config falls back to defaults with a warning.
/// A missing schedule uses the built-in one; a schedule that exists but
/// does not parse or validate is an error.
pub fn load_all(config_path: &Path) -> Result<Runtime> {
    let config = Config::load_or_default(config_path);
    config.validate()?;

    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let paths = config.paths.resolved(base);

    let schedule = if paths.schedule_file.exists() {
        FlightSchedule::load(&paths.schedule_file)?
    } else {
        log::warn!(
            "No schedule at {}, using the built-in schedule",
            paths.schedule_file.display()
        );
        FlightSchedule::default()
    };
    schedule.validate()?;

    let filter = FaultCorrelationFilter::load(&paths.single_rules_file, &paths.group_rules_file)?;

    Ok(Runtime {
        config,
        paths,
        schedule: Arc::new(schedule),
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_nothing_exists() {
        let tmp = TempDir::new().unwrap();
        let runtime = load_all(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(runtime.paths.state_dir, tmp.path().join("state"));
        assert!(runtime.schedule.contains("VJ105"));
        assert_eq!(runtime.filter.stats().single_rules, 0);
    }

    #[test]
    fn files_resolve_next_to_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[fleet]\naircraft = [\"B-652G\"]\n\n[paths]\nsingle_rules_file = \"rules/single.toml\"\n",
        )
        .unwrap();
        std::fs::create_dir(tmp.path().join("rules")).unwrap();
        std::fs::write(
            tmp.path().join("rules/single.toml"),
            "[[rules]]\n\"描述\" = \"CABIN\"\n",
        )
        .unwrap();

        let runtime = load_all(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(runtime.config.fleet.aircraft, vec!["B-652G"]);
        assert_eq!(runtime.filter.stats().single_rules, 1);
    }

    #[test]
    fn invalid_schedule_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("schedule.toml"),
            "[[flights]]\nflight_number = \"VJ105\"\nscheduled_departure = \"7.45\"\nduration_minutes = 110\nroute = \"HAN-VCS\"\ndeparture_airport = \"HAN\"\narrival_airport = \"VCS\"\n",
        )
        .unwrap();
        assert!(load_all(&tmp.path().join("config.toml")).is_err());
    }
}
