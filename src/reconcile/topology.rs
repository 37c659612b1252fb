//! LOS pass: derive line-of-sight rows from links
//!
//! Every link between two buildings proves those buildings can see each
//! other. Human-annotated rows are only promoted by an active link, and an
//! inactive link never rewrites them.

use super::reconciler::{ReconcileReport, RunContext};
use crate::error::Result;
use crate::model::{BuildingId, DeviceId, Link, LinkStatus, Los, LosSource, NodeId};
use crate::notify::{ChangeEvent, ChangeSubject, RecordKind};
use std::collections::HashMap;
use tracing::debug;

/// Caches device → representative building lookups for one pass
struct BuildingResolver<'c, 'a> {
    ctx: &'c RunContext<'a>,
    devices: HashMap<DeviceId, Option<(NodeId, BuildingId)>>,
}

impl<'c, 'a> BuildingResolver<'c, 'a> {
    fn new(ctx: &'c RunContext<'a>) -> Self {
        Self {
            ctx,
            devices: HashMap::new(),
        }
    }

    async fn resolve(&mut self, device_id: DeviceId) -> Result<Option<(NodeId, BuildingId)>> {
        if let Some(cached) = self.devices.get(&device_id) {
            return Ok(*cached);
        }

        let resolved = match self.ctx.repo.get_device(device_id).await? {
            Some(device) => self
                .ctx
                .repo
                .get_node(device.node)
                .await?
                .and_then(|node| node.representative_building().map(|b| (node.id, b))),
            None => None,
        };
        self.devices.insert(device_id, resolved);
        Ok(resolved)
    }
}

pub(crate) async fn sync_los(ctx: &RunContext<'_>, report: &mut ReconcileReport) {
    let links = match ctx.repo.list_links().await {
        Ok(links) => links,
        Err(e) => {
            ctx.diagnose(report, "line of sight sync", e);
            return;
        }
    };

    let mut resolver = BuildingResolver::new(ctx);
    for link in links.iter().filter(|l| l.status != LinkStatus::Planned) {
        if let Err(e) = sync_link_los(ctx, &mut resolver, link, report).await {
            ctx.diagnose(report, &format!("line of sight for link {}", link.id), e);
        }
    }
}

async fn sync_link_los(
    ctx: &RunContext<'_>,
    resolver: &mut BuildingResolver<'_, '_>,
    link: &Link,
    report: &mut ReconcileReport,
) -> Result<()> {
    let (Some((from_node, from_building)), Some((to_node, to_building))) = (
        resolver.resolve(link.from_device).await?,
        resolver.resolve(link.to_device).await?,
    ) else {
        return Ok(());
    };

    if let Some(scoped) = ctx.scoped_node {
        if from_node != scoped && to_node != scoped {
            return Ok(());
        }
    } else if !ctx.is_whole_fleet() {
        return Ok(());
    }

    if from_building == to_building {
        return Ok(());
    }

    let today = ctx.now.date_naive();
    let rows = ctx.repo.find_los_between(from_building, to_building).await?;

    if rows.is_empty() {
        let analysis_date = match link.status {
            LinkStatus::Inactive => link.abandon_date.unwrap_or(today),
            _ => today,
        };
        let los = Los::new(from_building, to_building, LosSource::ExistingLink, analysis_date)?;
        ctx.repo.save_los(&los).await?;

        debug!("Created LOS {} for link {}", los.id, link.id);
        report.los_created += 1;
        ctx.emit(
            report,
            ChangeEvent::created(
                subject(&los),
                vec![format!("Derived from {} link {}", link.status, link.id)],
            ),
        );
        return Ok(());
    }

    for mut los in rows {
        let mut changes = Vec::new();

        match (link.status, link.abandon_date) {
            (LinkStatus::Active, _) => {
                if los.source == LosSource::HumanAnnotated {
                    changes.push(format!(
                        "Changed source from {} to {}",
                        los.source,
                        LosSource::ExistingLink
                    ));
                    los.source = LosSource::ExistingLink;
                }
                if los.analysis_date != today {
                    changes.push(format!(
                        "Changed analysis date from {} to {}",
                        los.analysis_date, today
                    ));
                    los.analysis_date = today;
                }
            }
            (LinkStatus::Inactive, Some(abandoned))
                if los.source == LosSource::ExistingLink && abandoned > los.analysis_date =>
            {
                changes.push(format!(
                    "Changed analysis date from {} to {}",
                    los.analysis_date, abandoned
                ));
                los.analysis_date = abandoned;
            }
            _ => {}
        }

        if changes.is_empty() {
            continue;
        }

        ctx.repo.save_los(&los).await?;
        debug!("Updated LOS {}: {:?}", los.id, changes);
        report.los_updated += 1;
        ctx.emit(report, ChangeEvent::updated(subject(&los), changes));
    }
    Ok(())
}

fn subject(los: &Los) -> ChangeSubject {
    ChangeSubject::new(
        RecordKind::Los,
        los.id,
        format!("{} <-> {}", los.from_building, los.to_building),
    )
}
