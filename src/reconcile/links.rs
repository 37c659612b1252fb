//! Link pass: mirror UISP links onto internal links
//!
//! Links are matched on their UISP id. When UISP rotates an id, the
//! internal link between the same two devices adopts the new id without
//! an event. Whole-fleet runs also retire links UISP no longer reports.

use super::heuristics::classify_link;
use super::reconciler::{ReconcileReport, RunContext};
use super::status::StatusDecision;
use crate::domain::ports::InventoryLink;
use crate::error::{Error, Result};
use crate::model::{Device, DeviceId, Link, LinkStatus, LinkType};
use crate::notify::{ChangeEvent, ChangeSubject, RecordKind};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

enum LinkOutcome {
    Created(ChangeEvent),
    Updated(ChangeEvent),
    Unchanged,
    OutOfScope,
}

pub(crate) async fn sync_links(
    ctx: &RunContext<'_>,
    snapshot: &[InventoryLink],
    report: &mut ReconcileReport,
) {
    let snapshot_ids: HashSet<&str> = snapshot.iter().map(|l| l.id.as_str()).collect();

    for link in snapshot {
        match sync_link(ctx, link, &snapshot_ids).await {
            Ok(LinkOutcome::Created(event)) => {
                report.links_created += 1;
                ctx.emit(report, event);
            }
            Ok(LinkOutcome::Updated(event)) => {
                report.links_updated += 1;
                ctx.emit(report, event);
            }
            Ok(LinkOutcome::Unchanged) | Ok(LinkOutcome::OutOfScope) => {}
            Err(e) => ctx.diagnose(report, &format!("link {}", link.id), e),
        }
    }

    if ctx.is_whole_fleet() && ctx.config.deactivate_missing_links {
        retire_missing_links(ctx, &snapshot_ids, report).await;
    }
}

async fn resolve_endpoint(
    ctx: &RunContext<'_>,
    link: &InventoryLink,
    uisp_id: Option<&str>,
) -> Result<Option<Device>> {
    let Some(uisp_id) = uisp_id else {
        return Err(Error::UnresolvedLinkEndpoint {
            link: link.id.clone(),
            device_uisp_id: "<missing>".to_string(),
        });
    };
    ctx.repo.find_device_by_uisp_id(uisp_id).await
}

async fn sync_link(
    ctx: &RunContext<'_>,
    link: &InventoryLink,
    snapshot_ids: &HashSet<&str>,
) -> Result<LinkOutcome> {
    let from = resolve_endpoint(ctx, link, link.from_device_id()).await?;
    let to = resolve_endpoint(ctx, link, link.to_device_id()).await?;

    if let Some(scoped) = ctx.scoped_node {
        let touches = [&from, &to]
            .into_iter()
            .flatten()
            .any(|device| device.node == scoped);
        if !touches {
            return Ok(LinkOutcome::OutOfScope);
        }
    } else if !ctx.is_whole_fleet() {
        return Ok(LinkOutcome::OutOfScope);
    }

    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        (None, _) => return Err(unresolved(link, link.from_device_id())),
        (_, None) => return Err(unresolved(link, link.to_device_id())),
    };

    let link_type = classify_link(link)?;

    let existing = match ctx.repo.find_link_by_uisp_id(&link.id).await? {
        Some(existing) => Some(existing),
        None => adopt_rotated_id(ctx, link, &from, &to, snapshot_ids).await?,
    };

    match existing {
        Some(existing) => update_link(ctx, link, existing, &from, &to, link_type).await,
        None => {
            let status = if link.is_active() {
                LinkStatus::Active
            } else {
                LinkStatus::Inactive
            };
            let mut created = Link::new(from.id, to.id, status).with_uisp_id(&link.id);
            created.link_type = Some(link_type);
            if status == LinkStatus::Inactive {
                created.abandon_date = min_last_seen(ctx, link).await?.map(|t| t.date_naive());
            }

            ctx.repo.save_link(&created).await?;
            debug!("Created link {} ({})", link.id, label(&from, &to));
            Ok(LinkOutcome::Created(ChangeEvent::created(
                ChangeSubject::new(RecordKind::Link, created.id, label(&from, &to)),
                vec![format!("Imported from UISP as a {} link", link_type)],
            )))
        }
    }
}

/// Internal link between the same devices whose UISP id was rotated away
async fn adopt_rotated_id(
    ctx: &RunContext<'_>,
    link: &InventoryLink,
    from: &Device,
    to: &Device,
    snapshot_ids: &HashSet<&str>,
) -> Result<Option<Link>> {
    let candidates = ctx.repo.find_links_between(from.id, to.id).await?;
    let Some(mut rotated) = candidates.into_iter().find(|candidate| {
        candidate
            .uisp_id
            .as_deref()
            .map(|old| !snapshot_ids.contains(old))
            .unwrap_or(false)
    }) else {
        return Ok(None);
    };

    debug!(
        "Link {} changed UISP id from {:?} to {}",
        rotated.id, rotated.uisp_id, link.id
    );
    rotated.uisp_id = Some(link.id.clone());
    ctx.repo.save_link(&rotated).await?;
    Ok(Some(rotated))
}

async fn update_link(
    ctx: &RunContext<'_>,
    snapshot: &InventoryLink,
    mut link: Link,
    from: &Device,
    to: &Device,
    link_type: LinkType,
) -> Result<LinkOutcome> {
    let mut changes = Vec::new();

    if !link.connects(from.id, to.id) {
        let previous = endpoints_label(ctx, &link).await?;
        changes.push(format!(
            "Changed connected devices from {} to {}",
            previous,
            label(from, to)
        ));
        link.from_device = from.id;
        link.to_device = to.id;
    }

    if link.link_type != Some(link_type) {
        let previous = link
            .link_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unset".to_string());
        changes.push(format!("Changed type from {} to {}", previous, link_type));
        link.link_type = Some(link_type);
    }

    let active = link.status == LinkStatus::Active;
    let online = snapshot.is_active();
    // Only a deactivation check needs the endpoints' last-seen times
    let last_seen = if active && !online {
        min_last_seen(ctx, snapshot).await?
    } else {
        None
    };

    match ctx
        .policy
        .decide(active, online, last_seen, link.abandon_date, ctx.now)
    {
        StatusDecision::Unchanged => {}
        StatusDecision::Deactivate { abandon_date } => {
            link.status = LinkStatus::Inactive;
            if abandon_date.is_some() {
                link.abandon_date = abandon_date;
            }
            changes.push(ctx.policy.deactivation_message());
        }
        StatusDecision::Reactivate { stale_since } => {
            link.status = LinkStatus::Active;
            link.abandon_date = None;
            changes.extend(ctx.policy.reactivation_messages(stale_since, ctx.now));
        }
    }

    if changes.is_empty() {
        return Ok(LinkOutcome::Unchanged);
    }

    ctx.repo.save_link(&link).await?;
    debug!("Updated link {}: {:?}", snapshot.id, changes);
    Ok(LinkOutcome::Updated(ChangeEvent::updated(
        ChangeSubject::new(RecordKind::Link, link.id, label(from, to)),
        changes,
    )))
}

/// Oldest last-seen time across both endpoints; missing values are ignored
async fn min_last_seen(
    ctx: &RunContext<'_>,
    link: &InventoryLink,
) -> Result<Option<DateTime<Utc>>> {
    let fetch = |id: Option<&str>| {
        let id = id.map(str::to_string);
        async move {
            match id {
                Some(id) => ctx.inventory.get_device_detail(&id).await.map(|d| d.last_seen),
                None => Ok(None),
            }
        }
    };

    let (from, to) = futures::try_join!(fetch(link.from_device_id()), fetch(link.to_device_id()))?;
    Ok([from, to].into_iter().flatten().min())
}

async fn retire_missing_links(
    ctx: &RunContext<'_>,
    snapshot_ids: &HashSet<&str>,
    report: &mut ReconcileReport,
) {
    let links = match ctx.repo.list_links().await {
        Ok(links) => links,
        Err(e) => {
            ctx.diagnose(report, "missing link check", e);
            return;
        }
    };

    for mut link in links {
        let missing = link
            .uisp_id
            .as_deref()
            .map(|id| !snapshot_ids.contains(id))
            .unwrap_or(false);
        if !missing || link.status != LinkStatus::Active {
            continue;
        }

        link.status = LinkStatus::Inactive;
        link.abandon_date = Some(ctx.now.date_naive());
        let subject_label = match endpoints_label(ctx, &link).await {
            Ok(label) => label,
            Err(e) => {
                ctx.diagnose(report, &format!("link {}", link.id), e);
                continue;
            }
        };
        if let Err(e) = ctx.repo.save_link(&link).await {
            ctx.diagnose(report, &format!("link {}", link.id), e);
            continue;
        }

        info!("Link {} no longer appears in UISP, marked inactive", subject_label);
        report.links_updated += 1;
        ctx.emit(
            report,
            ChangeEvent::updated(
                ChangeSubject::new(RecordKind::Link, link.id, subject_label),
                vec!["Marked as Inactive because it no longer appears in UISP".to_string()],
            ),
        );
    }
}

fn unresolved(link: &InventoryLink, device: Option<&str>) -> Error {
    Error::UnresolvedLinkEndpoint {
        link: link.id.clone(),
        device_uisp_id: device.unwrap_or("<missing>").to_string(),
    }
}

fn label(from: &Device, to: &Device) -> String {
    format!("{} <-> {}", from.name, to.name)
}

async fn endpoints_label(ctx: &RunContext<'_>, link: &Link) -> Result<String> {
    let name = |device: Option<Device>, id: DeviceId| {
        device
            .map(|d| d.name)
            .unwrap_or_else(|| format!("device {}", id))
    };
    let from = ctx.repo.get_device(link.from_device).await?;
    let to = ctx.repo.get_device(link.to_device).await?;
    Ok(format!(
        "{} <-> {}",
        name(from, link.from_device),
        name(to, link.to_device)
    ))
}
