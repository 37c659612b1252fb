//! Number Space
//!
//! The bounded integer range shared by install numbers and network numbers.
//! Numbers below `assign_min` exist (legacy hubs and supernodes) but are
//! never handed out.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Smallest number that can exist
pub const NETWORK_NUMBER_MIN: u32 = 1;

/// Smallest number the allocator hands out
pub const NETWORK_NUMBER_ASSIGN_MIN: u32 = 101;

/// Largest number that can exist
pub const NETWORK_NUMBER_MAX: u32 = 8192;

/// Bounds of the shared namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberSpaceConfig {
    pub min: u32,
    pub assign_min: u32,
    pub max: u32,
}

impl Default for NumberSpaceConfig {
    fn default() -> Self {
        Self {
            min: NETWORK_NUMBER_MIN,
            assign_min: NETWORK_NUMBER_ASSIGN_MIN,
            max: NETWORK_NUMBER_MAX,
        }
    }
}

/// Validated view of a [`NumberSpaceConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberSpace {
    min: u32,
    assign_min: u32,
    max: u32,
}

impl Default for NumberSpace {
    fn default() -> Self {
        let config = NumberSpaceConfig::default();
        Self {
            min: config.min,
            assign_min: config.assign_min,
            max: config.max,
        }
    }
}

impl NumberSpace {
    pub fn new(config: NumberSpaceConfig) -> Result<Self> {
        if !(config.min <= config.assign_min && config.assign_min <= config.max) {
            return Err(Error::Configuration(format!(
                "number space bounds must satisfy min <= assign_min <= max, got {} / {} / {}",
                config.min, config.assign_min, config.max
            )));
        }
        Ok(Self {
            min: config.min,
            assign_min: config.assign_min,
            max: config.max,
        })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn assign_min(&self) -> u32 {
        self.assign_min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Numbers the allocator may hand out
    pub fn assignable(&self) -> RangeInclusive<u32> {
        self.assign_min..=self.max
    }

    /// Fail unless `number` may be handed out or picked for a node
    pub fn check_assignable(&self, number: u32) -> Result<()> {
        if self.assignable().contains(&number) {
            Ok(())
        } else {
            Err(Error::NumberOutOfRange {
                number,
                min: self.assign_min,
                max: self.max,
            })
        }
    }

    /// Fail unless `number` lies anywhere in the namespace
    pub fn check_in_range(&self, number: u32) -> Result<()> {
        if (self.min..=self.max).contains(&number) {
            Ok(())
        } else {
            Err(Error::NumberOutOfRange {
                number,
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Lowest assignable number not in `used`
    pub fn first_free(&self, used: &HashSet<u32>) -> Option<u32> {
        self.assignable().find(|n| !used.contains(n))
    }
}
