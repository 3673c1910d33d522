//! Orchestrator configuration
//!
//! One [`ReplicatorConfig`] is supplied per owner alongside its identity. It
//! can be built in code or loaded from the YAML fragment an owner carries.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::volsync::{schedule, snapshot_class_selector};
use crate::Error;

/// Cron spec used when no scheduling interval is configured
pub const DEFAULT_SCHEDULE: &str = "*/10 * * * *";

/// Service type VolSync creates for the rsync endpoint
pub const DEFAULT_RSYNC_SERVICE_TYPE: &str = "ClusterIP";

/// Settings shared by every volume of one owner
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicatorConfig {
    /// Replication interval such as "10m", "4h" or "3d"; empty means
    /// [`ReplicatorConfig::default_schedule`]
    pub scheduling_interval: String,

    /// Narrows which snapshot classes are considered for a volume
    pub volume_snapshot_class_selector: LabelSelector,

    /// Service type of the rsync endpoint on the destination
    pub rsync_service_type: String,

    /// Cron spec used when `scheduling_interval` is empty
    pub default_schedule: String,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            scheduling_interval: String::new(),
            volume_snapshot_class_selector: LabelSelector::default(),
            rsync_service_type: DEFAULT_RSYNC_SERVICE_TYPE.to_string(),
            default_schedule: DEFAULT_SCHEDULE.to_string(),
        }
    }
}

impl ReplicatorConfig {
    /// Set the scheduling interval and return self for chaining
    pub fn scheduling_interval(mut self, interval: impl Into<String>) -> Self {
        self.scheduling_interval = interval.into();
        self
    }

    /// Set the snapshot class selector and return self for chaining
    pub fn snapshot_class_selector(mut self, selector: LabelSelector) -> Self {
        self.volume_snapshot_class_selector = selector;
        self
    }

    /// Set the rsync service type and return self for chaining
    pub fn rsync_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.rsync_service_type = service_type.into();
        self
    }

    /// Parse a YAML document and validate it
    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::validation(format!("invalid replicator config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the interval translates, the selector parses and the
    /// service type is set
    pub fn validate(&self) -> Result<(), Error> {
        if !self.scheduling_interval.is_empty() {
            schedule::to_schedule(&self.scheduling_interval)?;
        }
        snapshot_class_selector(&self.volume_snapshot_class_selector)?;
        if self.rsync_service_type.is_empty() {
            return Err(Error::validation("rsync service type must not be empty"));
        }
        Ok(())
    }

    /// Cron spec for periodic syncs
    ///
    /// Falls back to the default schedule when no interval is configured.
    pub fn cron_schedule(&self) -> Result<String, Error> {
        if self.scheduling_interval.is_empty() {
            tracing::warn!(
                default = %self.default_schedule,
                "no scheduling interval configured, using default schedule"
            );
            return Ok(self.default_schedule.clone());
        }
        schedule::to_schedule(&self.scheduling_interval)
    }
}
