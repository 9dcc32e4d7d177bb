//! fleet.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};
use crate::types::{ServiceTemplate, WorkerSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub fleet: FleetSection,
    #[serde(default)]
    pub scaling: ScalingSection,
    #[serde(default)]
    pub readiness: ReadinessSection,
    pub services: BTreeMap<String, WorkerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSection {
    pub name: String,
    #[serde(default)]
    pub target: u32,
    pub poll_interval: Option<String>,
    pub ready_timeout: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingKind {
    #[default]
    ReplicaTarget,
    LoadThreshold,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalingSection {
    #[serde(default)]
    pub policy: ScalingKind,
    /// Per-worker load at which the load-threshold policy adds a worker.
    pub threshold: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessKind {
    #[default]
    ReplicaTarget,
    SingleWorker,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessSection {
    #[serde(default)]
    pub policy: ReadinessKind,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> FleetResult<Self> {
        let config: FleetConfig =
            toml::from_str(content).map_err(|e| FleetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FleetResult<()> {
        if self.fleet.name.is_empty() {
            return Err(FleetError::Config("fleet name must not be empty".into()));
        }
        if self.services.is_empty() {
            return Err(FleetError::NoServices(self.fleet.name.clone()));
        }
        if self.scaling.policy == ScalingKind::LoadThreshold
            && self.scaling.threshold.unwrap_or(0) == 0
        {
            return Err(FleetError::Config(
                "load-threshold scaling needs threshold >= 1".into(),
            ));
        }
        self.poll_interval()?;
        self.ready_timeout()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> FleetResult<Duration> {
        optional_duration(self.fleet.poll_interval.as_deref(), Duration::from_secs(1))
    }

    pub fn ready_timeout(&self) -> FleetResult<Duration> {
        optional_duration(self.fleet.ready_timeout.as_deref(), Duration::from_secs(10))
    }

    pub fn templates(&self) -> Vec<ServiceTemplate> {
        self.services
            .iter()
            .map(|(name, spec)| ServiceTemplate::new(name.clone(), spec.clone()))
            .collect()
    }
}

fn optional_duration(value: Option<&str>, default: Duration) -> FleetResult<Duration> {
    match value {
        Some(s) => {
            parse_duration(s).ok_or_else(|| FleetError::Config(format!("invalid duration: {s}")))
        }
        None => Ok(default),
    }
}

/// Parse a duration string like "250ms", "30s", "5m", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[fleet]
name = "vpn-pool"
target = 3
poll_interval = "250ms"

[scaling]
policy = "load-threshold"
threshold = 2

[readiness]
policy = "single-worker"

[services.eu]
image = "vpn:latest"
command = ["sh", "-c", "while sleep 3600; do :; done"]
env = { REGION = "eu" }

[services.us]
image = "vpn:latest"
"#;

    #[test]
    fn parse_full_config() {
        let config = FleetConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.fleet.name, "vpn-pool");
        assert_eq!(config.fleet.target, 3);
        assert_eq!(config.poll_interval().unwrap(), Duration::from_millis(250));
        assert_eq!(config.ready_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.scaling.policy, ScalingKind::LoadThreshold);
        assert_eq!(config.scaling.threshold, Some(2));
        assert_eq!(config.readiness.policy, ReadinessKind::SingleWorker);

        let templates = config.templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name, "eu");
        assert_eq!(templates[0].spec.env.get("REGION").unwrap(), "eu");
        assert!(templates[1].spec.command.is_empty());
    }

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = FleetConfig::from_toml_str(
            r#"
[fleet]
name = "pool"

[services.worker]
image = "alpine:latest"
"#,
        )
        .unwrap();
        assert_eq!(config.fleet.target, 0);
        assert_eq!(config.scaling.policy, ScalingKind::ReplicaTarget);
        assert_eq!(config.readiness.policy, ReadinessKind::ReplicaTarget);
        assert_eq!(config.poll_interval().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_config_without_services() {
        let err = FleetConfig::from_toml_str(
            r#"
[fleet]
name = "pool"

[services]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::NoServices(_)));
    }

    #[test]
    fn rejects_load_threshold_without_threshold() {
        let err = FleetConfig::from_toml_str(
            r#"
[fleet]
name = "pool"

[scaling]
policy = "load-threshold"

[services.worker]
image = "alpine:latest"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = FleetConfig::from_toml_str(
            r#"
[fleet]
name = "pool"
poll_interval = "soon"

[services.worker]
image = "alpine:latest"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::Config(msg) if msg.contains("soon")));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
    }
}
