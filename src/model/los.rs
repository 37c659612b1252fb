//! Line-of-sight records
//!
//! A row states that two buildings can see each other. Rows are keyed by the
//! unordered building pair; orientation carries no meaning.

use super::ids::{BuildingId, LosId};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a line-of-sight claim came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LosSource {
    HumanAnnotated,
    ExistingLink,
}

impl std::fmt::Display for LosSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LosSource::HumanAnnotated => write!(f, "Human Annotated"),
            LosSource::ExistingLink => write!(f, "Existing Link"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Los {
    pub id: LosId,
    pub from_building: BuildingId,
    pub to_building: BuildingId,
    pub source: LosSource,
    pub analysis_date: NaiveDate,
}

impl Los {
    /// Build a new row; a building cannot have line of sight to itself
    pub fn new(
        from_building: BuildingId,
        to_building: BuildingId,
        source: LosSource,
        analysis_date: NaiveDate,
    ) -> Result<Self> {
        if from_building == to_building {
            return Err(Error::InvalidLos(format!(
                "building {} cannot have line of sight to itself",
                from_building
            )));
        }
        Ok(Self {
            id: LosId::new(),
            from_building,
            to_building,
            source,
            analysis_date,
        })
    }

    /// Whether this row covers the unordered pair `{a, b}`
    pub fn joins(&self, a: BuildingId, b: BuildingId) -> bool {
        (self.from_building == a && self.to_building == b)
            || (self.from_building == b && self.to_building == a)
    }
}
