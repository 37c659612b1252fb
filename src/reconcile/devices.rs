//! Device pass: mirror UISP devices onto internal devices and sectors

use super::reconciler::{ReconcileReport, ReconcileScope, RunContext};
use super::status::StatusDecision;
use crate::domain::ports::InventoryDevice;
use crate::error::{Error, Result};
use crate::model::{Device, DeviceStatus, Node};
use crate::notify::{ChangeEvent, ChangeSubject, RecordKind};
use tracing::debug;

enum DeviceOutcome {
    Created(ChangeEvent),
    Updated(ChangeEvent),
    Unchanged,
    OutOfScope,
}

pub(crate) async fn sync_devices(
    ctx: &RunContext<'_>,
    snapshot: &[InventoryDevice],
    report: &mut ReconcileReport,
) {
    for device in snapshot {
        if ctx.config.is_excluded_category(device.category.as_deref()) {
            debug!("Skipping {} device {}", device.category.as_deref().unwrap_or_default(), device.name);
            continue;
        }

        match sync_device(ctx, device).await {
            Ok(DeviceOutcome::Created(event)) => {
                report.devices_created += 1;
                ctx.emit(report, event);
            }
            Ok(DeviceOutcome::Updated(event)) => {
                report.devices_updated += 1;
                ctx.emit(report, event);
            }
            Ok(DeviceOutcome::Unchanged) | Ok(DeviceOutcome::OutOfScope) => {}
            Err(e) => ctx.diagnose(report, &format!("device {} ({})", device.name, device.id), e),
        }
    }
}

async fn sync_device(ctx: &RunContext<'_>, device: &InventoryDevice) -> Result<DeviceOutcome> {
    let network_number = match (ctx.parser.parse(&device.name), ctx.scope) {
        (Some(nn), ReconcileScope::NetworkNumber(scoped)) if nn != scoped => {
            return Ok(DeviceOutcome::OutOfScope)
        }
        // A scoped run cannot tell whether an unparseable name is its own
        (None, ReconcileScope::NetworkNumber(_)) => return Ok(DeviceOutcome::OutOfScope),
        (Some(nn), _) => nn,
        (None, ReconcileScope::All) => {
            return Err(Error::UnresolvedNode {
                device: device.name.clone(),
                network_number: None,
            })
        }
    };

    let node = ctx
        .repo
        .find_node_by_number(network_number)
        .await?
        .ok_or_else(|| Error::UnresolvedNode {
            device: device.name.clone(),
            network_number: Some(network_number),
        })?;

    match ctx.repo.find_device_by_uisp_id(&device.id).await? {
        Some(existing) => update_device(ctx, device, existing, &node).await,
        None => create_device(ctx, device, &node).await,
    }
}

async fn update_device(
    ctx: &RunContext<'_>,
    snapshot: &InventoryDevice,
    mut device: Device,
    node: &Node,
) -> Result<DeviceOutcome> {
    let mut changes = Vec::new();

    if device.name != snapshot.name {
        changes.push(format!(
            "Changed name from {} to {}",
            device.name, snapshot.name
        ));
        device.name = snapshot.name.clone();
    }

    if device.node != node.id {
        let previous = match ctx.repo.get_node(device.node).await? {
            Some(previous) => previous.to_string(),
            None => format!("node {}", device.node),
        };
        changes.push(format!("Changed node from {} to {}", previous, node));
        device.node = node.id;
    }

    match ctx.policy.decide(
        device.status == DeviceStatus::Active,
        snapshot.is_online(),
        snapshot.last_seen,
        device.abandon_date,
        ctx.now,
    ) {
        StatusDecision::Unchanged => {}
        StatusDecision::Deactivate { abandon_date } => {
            device.status = DeviceStatus::Inactive;
            if abandon_date.is_some() {
                device.abandon_date = abandon_date;
            }
            changes.push(ctx.policy.deactivation_message());
        }
        StatusDecision::Reactivate { stale_since } => {
            device.status = DeviceStatus::Active;
            device.abandon_date = None;
            changes.extend(ctx.policy.reactivation_messages(stale_since, ctx.now));
        }
    }

    if changes.is_empty() {
        return Ok(DeviceOutcome::Unchanged);
    }

    ctx.repo.save_device(&device).await?;
    debug!("Updated device {}: {:?}", device.name, changes);
    Ok(DeviceOutcome::Updated(ChangeEvent::updated(
        subject(&device),
        changes,
    )))
}

async fn create_device(
    ctx: &RunContext<'_>,
    snapshot: &InventoryDevice,
    node: &Node,
) -> Result<DeviceOutcome> {
    let status = if snapshot.is_online() {
        DeviceStatus::Active
    } else {
        DeviceStatus::Inactive
    };

    let mut device = Device::new(snapshot.name.clone(), node.id, status).with_uisp_id(&snapshot.id);
    device.install_date = snapshot.created_at.map(|t| t.date_naive());
    if status == DeviceStatus::Inactive {
        device.abandon_date = snapshot.last_seen.map(|t| t.date_naive());
    }

    let mut changes = vec![format!("Imported from UISP at {}", node)];
    let is_sector = snapshot
        .wireless_mode
        .as_deref()
        .map(|mode| mode.eq_ignore_ascii_case(&ctx.config.sector_wireless_mode))
        .unwrap_or(false);
    if is_sector {
        let guess = ctx.sectors.guess(snapshot);
        device.sector = Some(guess.geometry());
        changes.push(guess.describe());
    }

    ctx.repo.save_device(&device).await?;
    debug!("Created {} {}", if is_sector { "sector" } else { "device" }, device.name);
    Ok(DeviceOutcome::Created(ChangeEvent::created(
        subject(&device),
        changes,
    )))
}

fn subject(device: &Device) -> ChangeSubject {
    let kind = if device.is_sector() {
        RecordKind::Sector
    } else {
        RecordKind::Device
    };
    ChangeSubject::new(kind, device.id, device.name.clone())
}
