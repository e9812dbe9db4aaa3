//! Crossing configuration.
//!
//! Every field has a default so partial TOML documents are accepted:
//!
//! ```toml
//! depth = 8
//! sync_stages = 3
//! strict = true
//! ```

use cdc_ring::{RingConfig, MAX_DEPTH, MAX_SYNC_STAGES, MIN_DEPTH, MIN_SYNC_STAGES};
use serde::{Deserialize, Serialize};

use crate::bus::{Completion, Transaction};
use crate::error::{SkidError, SkidResult};

const MAX_WIDTH: u32 = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CdcConfig {
    pub address_width: u32,
    /// Multiple of 8; one byte-select bit per lane.
    pub data_width: u32,
    pub tag_data_width: u32,
    pub tag_address_width: u32,
    pub tag_cycle_width: u32,
    /// Ring slots, also the ceiling on outstanding transactions.
    pub depth: u32,
    /// Destination ticks before a toggle is trusted.
    pub sync_stages: u32,
    /// Clear data registers whenever their valid signal is low.
    pub low_power: bool,
    /// Latch protocol violations instead of recovering from them.
    pub strict: bool,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            address_width: 32,
            data_width: 32,
            tag_data_width: 0,
            tag_address_width: 0,
            tag_cycle_width: 0,
            depth: 4,
            sync_stages: 2,
            low_power: false,
            strict: false,
        }
    }
}

impl CdcConfig {
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_sync_stages(mut self, sync_stages: u32) -> Self {
        self.sync_stages = sync_stages;
        self
    }

    pub fn with_low_power(mut self, low_power: bool) -> Self {
        self.low_power = low_power;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> SkidResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SkidResult<()> {
        if !(1..=MAX_WIDTH).contains(&self.address_width) {
            return Err(SkidError::config(format!(
                "address_width {} must be between 1 and {MAX_WIDTH}",
                self.address_width
            )));
        }
        if self.data_width == 0 || self.data_width > MAX_WIDTH || self.data_width % 8 != 0 {
            return Err(SkidError::config(format!(
                "data_width {} must be a multiple of 8 no larger than {MAX_WIDTH}",
                self.data_width
            )));
        }
        for (name, width) in [
            ("tag_data_width", self.tag_data_width),
            ("tag_address_width", self.tag_address_width),
            ("tag_cycle_width", self.tag_cycle_width),
        ] {
            if width > MAX_WIDTH {
                return Err(SkidError::config(format!(
                    "{name} {width} exceeds {MAX_WIDTH}"
                )));
            }
        }
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(SkidError::config(format!(
                "depth {} must be between {MIN_DEPTH} and {MAX_DEPTH}",
                self.depth
            )));
        }
        if !(MIN_SYNC_STAGES..=MAX_SYNC_STAGES).contains(&self.sync_stages) {
            return Err(SkidError::config(format!(
                "sync_stages {} must be between {MIN_SYNC_STAGES} and {MAX_SYNC_STAGES}",
                self.sync_stages
            )));
        }
        Ok(())
    }

    pub fn ring_config(&self) -> RingConfig {
        RingConfig {
            depth: self.depth,
            sync_stages: self.sync_stages,
        }
    }

    /// Truncates every field of `tx` to the configured widths.
    pub fn mask_transaction(&self, tx: &Transaction) -> Transaction {
        Transaction {
            address: tx.address & width_mask(self.address_width),
            data: tx.data & width_mask(self.data_width),
            byte_select: (tx.byte_select as u64 & width_mask(self.data_width / 8)) as u8,
            tag_data: tx.tag_data & width_mask(self.tag_data_width),
            tag_address: tx.tag_address & width_mask(self.tag_address_width),
            tag_cycle: tx.tag_cycle & width_mask(self.tag_cycle_width),
            write: tx.write,
            lock: tx.lock,
            burst_type: tx.burst_type & 0b111,
            burst_extension: tx.burst_extension & 0b11,
        }
    }

    /// Truncates response data to the configured widths.
    pub fn mask_completion(&self, completion: &Completion) -> Completion {
        Completion {
            status: completion.status,
            data: completion.data & width_mask(self.data_width),
            tag_data: completion.tag_data & width_mask(self.tag_data_width),
        }
    }
}

fn width_mask(width: u32) -> u64 {
    match width {
        0 => 0,
        w if w >= 64 => u64::MAX,
        w => (1u64 << w) - 1,
    }
}
