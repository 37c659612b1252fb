//! Change Events
//!
//! Every structural change the core makes is described by a [`ChangeEvent`]
//! and handed to the dispatcher explicitly, instead of being fired from a
//! save hook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of record a change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Node,
    Install,
    Device,
    Sector,
    Link,
    Los,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Node => write!(f, "Node"),
            RecordKind::Install => write!(f, "Install"),
            RecordKind::Device => write!(f, "Device"),
            RecordKind::Sector => write!(f, "Sector"),
            RecordKind::Link => write!(f, "Link"),
            RecordKind::Los => write!(f, "LOS"),
        }
    }
}

/// The record a change event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSubject {
    pub kind: RecordKind,
    /// Internal record id
    pub id: String,
    /// Human-readable label, e.g. the device name
    pub label: String,
}

impl ChangeSubject {
    pub fn new(kind: RecordKind, id: impl ToString, label: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.to_string(),
            label: label.into(),
        }
    }
}

impl std::fmt::Display for ChangeSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.label)
    }
}

/// A batch of changes applied to one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub subject: ChangeSubject,
    /// Ordered, human-readable change descriptions
    pub changes: Vec<String>,
    /// Whether the record was created rather than modified
    pub created: bool,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(subject: ChangeSubject, changes: Vec<String>, created: bool) -> Self {
        Self {
            subject,
            changes,
            created,
            at: Utc::now(),
        }
    }

    pub fn created(subject: ChangeSubject, changes: Vec<String>) -> Self {
        Self::new(subject, changes, true)
    }

    pub fn updated(subject: ChangeSubject, changes: Vec<String>) -> Self {
        Self::new(subject, changes, false)
    }

    /// Administrator-facing text: a title line, then one bullet per change
    pub fn render(&self) -> String {
        let verb = if self.created { "Created" } else { "Modified" };
        let mut text = format!("{} {} ({})", verb, self.subject, self.subject.id);
        for change in &self.changes {
            text.push_str("\n • ");
            text.push_str(change);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_update() {
        let event = ChangeEvent::updated(
            ChangeSubject::new(RecordKind::Device, "d-1", "nycmesh-227-east"),
            vec![
                "Changed name from nycmesh-227-e to nycmesh-227-east".into(),
                "Marked as Active".into(),
            ],
        );
        assert_eq!(
            event.render(),
            "Modified Device nycmesh-227-east (d-1)\n • Changed name from nycmesh-227-e to nycmesh-227-east\n • Marked as Active"
        );
    }

    #[test]
    fn test_render_creation_without_changes() {
        let event = ChangeEvent::created(
            ChangeSubject::new(RecordKind::Link, "l-1", "a <-> b"),
            vec![],
        );
        assert_eq!(event.render(), "Created Link a <-> b (l-1)");
    }
}
