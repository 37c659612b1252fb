//! Reconciliation Heuristics
//!
//! Best-effort interpretation of UISP data: network numbers embedded in
//! device names, link technology from type and frequency, and sector beam
//! geometry guessed from names and models.

use crate::domain::ports::{InventoryDevice, InventoryLink};
use crate::error::{Error, Result};
use crate::model::{LinkType, SectorGeometry, DEFAULT_SECTOR_AZIMUTH, DEFAULT_SECTOR_WIDTH};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default pattern extracting the network number from a device name
pub const DEFAULT_NETWORK_NUMBER_PATTERN: &str = r"^nycmesh-(?:[a-z]+-)*(\d{1,4})(?:-|$)";

// =============================================================================
// Network Number Parsing
// =============================================================================

/// Literal replacement applied to device names before parsing. Matching
/// ignores case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSubstitution {
    pub from: String,
    pub to: String,
}

impl NameSubstitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Extracts network numbers from device names
#[derive(Debug, Clone)]
pub struct NetworkNumberParser {
    substitutions: Vec<NameSubstitution>,
    pattern: Regex,
}

impl NetworkNumberParser {
    pub fn new(substitutions: Vec<NameSubstitution>, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::Configuration(format!("Invalid network number pattern: {}", e))
        })?;
        if pattern.captures_len() < 2 {
            return Err(Error::Configuration(
                "Network number pattern needs a capture group".into(),
            ));
        }
        let substitutions = substitutions
            .into_iter()
            .map(|s| NameSubstitution::new(s.from.to_lowercase(), s.to.to_lowercase()))
            .collect();
        Ok(Self {
            substitutions,
            pattern,
        })
    }

    /// Network number named by `name`, if any
    pub fn parse(&self, name: &str) -> Option<u32> {
        let mut name = name.to_lowercase();
        for substitution in &self.substitutions {
            name = name.replace(&substitution.from, &substitution.to);
        }

        let number = self
            .pattern
            .captures(&name)?
            .get(1)?
            .as_str()
            .parse::<u32>()
            .ok();
        debug!("Parsed network number {:?} from device name {}", number, name);
        number
    }
}

// =============================================================================
// Link Classification
// =============================================================================

/// Upper frequency bounds (MHz, exclusive) of the wireless bands
const FIVE_GHZ_CEILING_MHZ: u32 = 7_000;
const TWENTY_FOUR_GHZ_CEILING_MHZ: u32 = 40_000;
const SIXTY_GHZ_CEILING_MHZ: u32 = 70_000;

/// Link technology for a UISP link
pub fn classify_link(link: &InventoryLink) -> Result<LinkType> {
    let kind = link.kind.to_ascii_lowercase();
    match (kind.as_str(), link.frequency) {
        ("ethernet", _) => Ok(LinkType::Ethernet),
        ("pon", _) => Ok(LinkType::Fiber),
        ("wireless", Some(f)) if f < FIVE_GHZ_CEILING_MHZ => Ok(LinkType::FiveGhz),
        ("wireless", Some(f)) if f < TWENTY_FOUR_GHZ_CEILING_MHZ => Ok(LinkType::TwentyFourGhz),
        ("wireless", Some(f)) if f < SIXTY_GHZ_CEILING_MHZ => Ok(LinkType::SixtyGhz),
        ("wireless", Some(_)) => Ok(LinkType::SeventyEightyGhz),
        _ => Err(Error::UnclassifiableLink {
            link: link.id.clone(),
            kind: link.kind.clone(),
            frequency: link.frequency,
        }),
    }
}

// =============================================================================
// Sector Geometry
// =============================================================================

/// Partial sector geometry; unset fields fall back to defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectorGuess {
    pub azimuth_deg: Option<u16>,
    pub width_deg: Option<u16>,
}

impl SectorGuess {
    pub fn geometry(&self) -> SectorGeometry {
        SectorGeometry {
            azimuth_deg: self.azimuth_deg.unwrap_or(DEFAULT_SECTOR_AZIMUTH),
            width_deg: self.width_deg.unwrap_or(DEFAULT_SECTOR_WIDTH),
            ..SectorGeometry::default()
        }
    }

    /// Operator-facing description of what was guessed
    pub fn describe(&self) -> String {
        let geometry = self.geometry();
        let part = |value: u16, guessed: bool| {
            if guessed {
                format!("{}° (guessed)", value)
            } else {
                format!("{}° (default)", value)
            }
        };
        format!(
            "Azimuth {}, width {}, please verify",
            part(geometry.azimuth_deg, self.azimuth_deg.is_some()),
            part(geometry.width_deg, self.width_deg.is_some())
        )
    }
}

/// Guesses sector beam geometry for a new sector
pub trait SectorGeometryStrategy: Send + Sync {
    fn guess(&self, device: &InventoryDevice) -> SectorGuess;
}

/// Reads a compass heading from the device name and a beam width from
/// the model
#[derive(Debug, Clone)]
pub struct NameModelHeuristic {
    headings: Vec<(&'static str, u16)>,
    /// Model substrings, longest first
    widths: Vec<(&'static str, u16)>,
}

impl Default for NameModelHeuristic {
    fn default() -> Self {
        let headings = vec![
            ("north", 0),
            ("n", 0),
            ("northeast", 45),
            ("ne", 45),
            ("east", 90),
            ("e", 90),
            ("southeast", 135),
            ("se", 135),
            ("south", 180),
            ("s", 180),
            ("southwest", 225),
            ("sw", 225),
            ("west", 270),
            ("w", 270),
            ("northwest", 315),
            ("nw", 315),
        ];

        let mut widths = vec![
            ("LAP-120", 120),
            ("LAP-GPS", 90),
            ("LAP-HP", 90),
            ("LITEAP", 120),
            ("WAVE-AP-MICRO", 90),
            ("WAVE-AP", 30),
        ];
        widths.sort_by_key(|(model, _)| std::cmp::Reverse(model.len()));

        Self { headings, widths }
    }
}

impl NameModelHeuristic {
    fn heading(&self, name: &str) -> Option<u16> {
        let name = name.to_lowercase();
        name.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
            .rev()
            .find_map(|token| {
                self.headings
                    .iter()
                    .find(|(word, _)| *word == token)
                    .map(|(_, degrees)| *degrees)
            })
    }

    fn width(&self, model: &str) -> Option<u16> {
        let model = model.to_uppercase();
        self.widths
            .iter()
            .find(|(needle, _)| model.contains(needle))
            .map(|(_, degrees)| *degrees)
    }
}

impl SectorGeometryStrategy for NameModelHeuristic {
    fn guess(&self, device: &InventoryDevice) -> SectorGuess {
        SectorGuess {
            azimuth_deg: self.heading(&device.name),
            width_deg: device.model.as_deref().and_then(|m| self.width(m)),
        }
    }
}
