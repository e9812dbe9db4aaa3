//! Scenario description, loadable from TOML:
//!
//! ```toml
//! ratio = 3.0
//! seed = 7
//!
//! [kind]
//! type = "backpressure"
//! requests = 64
//! stall_probability = 0.4
//!
//! [crossing]
//! depth = 4
//! ```

use cdc_skid::CdcConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ScenarioError, ScenarioResult};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Back-to-back requests in a single group, responder always ready.
    Flood { requests: u32 },
    /// Separate groups, each closed normally once its responses are in.
    Burst { bursts: u32, burst_size: u32 },
    /// Back-to-back requests against a responder that stalls at random.
    Backpressure { requests: u32, stall_probability: f64 },
    /// Groups abandoned right after their last request is accepted, against
    /// a responder that may stall while the abandoned work drains.
    Cancel {
        groups: u32,
        group_size: u32,
        #[serde(default)]
        stall_probability: f64,
    },
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::Flood { .. } => "flood",
            ScenarioKind::Burst { .. } => "burst",
            ScenarioKind::Backpressure { .. } => "backpressure",
            ScenarioKind::Cancel { .. } => "cancel",
        }
    }

    /// Total requests the script issues.
    pub fn request_count(&self) -> u64 {
        match *self {
            ScenarioKind::Flood { requests } | ScenarioKind::Backpressure { requests, .. } => {
                requests as u64
            }
            ScenarioKind::Burst { bursts, burst_size } => bursts as u64 * burst_size as u64,
            ScenarioKind::Cancel {
                groups, group_size, ..
            } => groups as u64 * group_size as u64,
        }
    }

    pub fn stall_probability(&self) -> f64 {
        match *self {
            ScenarioKind::Backpressure {
                stall_probability, ..
            }
            | ScenarioKind::Cancel {
                stall_probability, ..
            } => stall_probability,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub kind: ScenarioKind,
    pub crossing: CdcConfig,
    /// Domain-B ticks per domain-A tick, on average.
    pub ratio: f64,
    /// Relative jitter applied to every clock period, in `[0, 1)`.
    pub jitter: f64,
    /// Responder ticks between accepting a request and completing it.
    pub latency: u32,
    pub seed: u64,
    /// Length of the idle window sampled for register quiescence.
    pub idle_ticks: u32,
    /// Upper bound on total ticks before the run is declared stuck.
    pub max_ticks: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kind: ScenarioKind::Flood { requests: 10 },
            crossing: CdcConfig::default(),
            ratio: 1.0,
            jitter: 0.0,
            latency: 1,
            seed: 0,
            idle_ticks: 32,
            max_ticks: 1_000_000,
        }
    }
}

impl ScenarioConfig {
    pub fn flood(requests: u32) -> Self {
        Self {
            kind: ScenarioKind::Flood { requests },
            ..Self::default()
        }
    }

    pub fn burst(bursts: u32, burst_size: u32) -> Self {
        Self {
            kind: ScenarioKind::Burst { bursts, burst_size },
            ..Self::default()
        }
    }

    pub fn backpressure(requests: u32, stall_probability: f64) -> Self {
        Self {
            kind: ScenarioKind::Backpressure {
                requests,
                stall_probability,
            },
            ..Self::default()
        }
    }

    pub fn cancel(groups: u32, group_size: u32) -> Self {
        Self {
            kind: ScenarioKind::Cancel {
                groups,
                group_size,
                stall_probability: 0.0,
            },
            ..Self::default()
        }
    }

    /// Makes the responder stall with `probability` per tick. Only the
    /// kinds that carry a stall schedule are affected.
    pub fn with_stall_probability(mut self, probability: f64) -> Self {
        match &mut self.kind {
            ScenarioKind::Backpressure {
                stall_probability, ..
            }
            | ScenarioKind::Cancel {
                stall_probability, ..
            } => *stall_probability = probability,
            ScenarioKind::Flood { .. } | ScenarioKind::Burst { .. } => {}
        }
        self
    }

    pub fn with_crossing(mut self, crossing: CdcConfig) -> Self {
        self.crossing = crossing;
        self
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_toml_str(source: &str) -> ScenarioResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        self.crossing.validate()?;
        if !(self.ratio.is_finite() && self.ratio > 0.0) {
            return Err(ScenarioError::invalid(format!(
                "ratio {} must be a positive number",
                self.ratio
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ScenarioError::invalid(format!(
                "jitter {} must be in [0, 1)",
                self.jitter
            )));
        }
        if self.latency == 0 {
            return Err(ScenarioError::invalid("latency must be at least 1"));
        }
        let stall = self.kind.stall_probability();
        if !(0.0..1.0).contains(&stall) {
            return Err(ScenarioError::invalid(format!(
                "stall_probability {stall} must be in [0, 1)"
            )));
        }
        if let ScenarioKind::Cancel { group_size: 0, .. } | ScenarioKind::Burst { burst_size: 0, .. } =
            self.kind
        {
            return Err(ScenarioError::invalid("groups need at least one request"));
        }
        Ok(())
    }
}
