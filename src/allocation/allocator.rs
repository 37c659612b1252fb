//! Network Number Allocator
//!
//! Finds and claims free numbers in the shared namespace, and validates
//! numbers operators pick for a node by hand. Every scan-then-claim runs
//! under the advisory allocation lock so two callers can never compute the
//! same free number, and every candidate is re-validated under the row lock
//! of the install holding it right before it is committed.

use super::locks::{install_row_lock, LockManager, NUMBER_ALLOCATION_LOCK};
use super::number_space::NumberSpace;
use crate::domain::ports::NumberRegistryRef;
use crate::error::{Error, Result};
use crate::model::{Install, InstallId, InstallStatus, NodeId};
use crate::notify::{ChangeSubject, NotificationDispatcher, RecordKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Injection Point
// =============================================================================

/// Called after a free number has been selected and before it is validated
/// and committed, with the allocation lock held.
#[async_trait]
pub trait AllocationHook: Send + Sync {
    async fn number_selected(&self, candidate: u32);
}

/// Hook that does nothing
#[derive(Debug, Default)]
pub struct NoopHook;

#[async_trait]
impl AllocationHook for NoopHook {
    async fn number_selected(&self, _candidate: u32) {}
}

// =============================================================================
// Validation Outcome
// =============================================================================

/// Why a candidate number was accepted
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    /// Nobody holds the number
    Free,
    /// The number belongs to an install already attached to the exempt node
    CarriedOver { install: InstallId },
    /// The number was taken from a non-active install, now `NnReassigned`
    Reclaimed { install: Install },
}

// =============================================================================
// Statistics
// =============================================================================

/// Allocation statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub claims: u64,
    pub reclaimed_installs: u64,
}

// =============================================================================
// Number Allocator
// =============================================================================

/// Allocator for the shared install/network number namespace
pub struct NumberAllocator {
    registry: NumberRegistryRef,
    space: NumberSpace,
    locks: Arc<LockManager>,
    hook: Arc<dyn AllocationHook>,
    dispatcher: Option<NotificationDispatcher>,
    claims: AtomicU64,
    reclaimed: AtomicU64,
}

impl NumberAllocator {
    /// Create a new allocator with its own lock manager
    pub fn new(registry: NumberRegistryRef, space: NumberSpace) -> Self {
        Self {
            registry,
            space,
            locks: LockManager::new(),
            hook: Arc::new(NoopHook),
            dispatcher: None,
            claims: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Share locks with other allocators working on the same registry
    pub fn with_locks(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AllocationHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Report reclaimed installs and assigned numbers
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn number_space(&self) -> NumberSpace {
        self.space
    }

    /// Check that `candidate` may be given to `exempt_node`, reclaiming it
    /// from a non-active install that holds it.
    ///
    /// Marking the donor install `NnReassigned` is a side effect of a
    /// successful validation.
    pub async fn validate_candidate(
        &self,
        candidate: u32,
        exempt_node: Option<NodeId>,
    ) -> Result<CandidateOutcome> {
        self.space.check_assignable(candidate)?;
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;
        self.validate_locked(candidate, exempt_node).await
    }

    /// Raw uniqueness check over the whole namespace. Never mutates.
    pub async fn check_unused(&self, number: u32) -> Result<()> {
        self.space.check_in_range(number)?;

        if let Some(node) = self.registry.find_node_by_number(number).await? {
            return Err(Error::NumberCollision {
                number,
                owner: format!("node {}", node.id),
            });
        }
        if let Some(install) = self.registry.find_install_by_number(number).await? {
            return Err(Error::NumberCollision {
                number,
                owner: format!("install {}", install.id),
            });
        }
        if self.registry.pending_claims().await?.contains(&number) {
            return Err(Error::NumberCollision {
                number,
                owner: "a pending claim".to_string(),
            });
        }
        Ok(())
    }

    /// Claim the lowest free assignable number.
    ///
    /// The number is recorded as a pending claim before it is returned, so
    /// no other caller can receive it until it is released. The claim is
    /// not tied to a node: settle it with [`Self::commit_claim`] (or by
    /// saving a node that carries the number), or hand it back with
    /// [`Self::release_claim`].
    pub async fn claim_next_available(&self) -> Result<u32> {
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;

        let candidate = self.select_free().await?;
        self.hook.number_selected(candidate).await;
        self.validate_locked(candidate, None).await?;
        self.registry.record_claim(candidate).await?;

        self.claims.fetch_add(1, Ordering::Relaxed);
        info!("Claimed number {}", candidate);
        Ok(candidate)
    }

    /// Put a pending claim onto a node
    pub async fn commit_claim(&self, node_id: NodeId, number: u32) -> Result<()> {
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;

        if !self.registry.pending_claims().await?.contains(&number) {
            return Err(Error::Internal(format!(
                "Number {} has no pending claim to commit",
                number
            )));
        }
        let node = self.load_node(node_id).await?;
        self.set_node_number(node, number).await
    }

    /// Give a pending claim back to the pool
    pub async fn release_claim(&self, number: u32) -> Result<()> {
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;
        self.registry.release_claim(number).await?;
        debug!("Released claim on number {}", number);
        Ok(())
    }

    /// Give the node the lowest free number, or return the one it has
    pub async fn assign_next_to_node(&self, node_id: NodeId) -> Result<u32> {
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;

        let mut node = self.load_node(node_id).await?;
        if let Some(existing) = node.network_number {
            return Ok(existing);
        }

        let candidate = self.select_free().await?;
        self.hook.number_selected(candidate).await;
        self.validate_locked(candidate, Some(node_id)).await?;

        node.network_number = Some(candidate);
        self.registry.save_node(&node).await?;
        self.claims.fetch_add(1, Ordering::Relaxed);

        info!("Assigned network number {} to node {}", candidate, node_id);
        self.report(
            ChangeSubject::new(RecordKind::Node, node_id, node.to_string()),
            vec![format!("Assigned network number {}", candidate)],
        );
        Ok(candidate)
    }

    /// Give the node a number picked by an operator
    pub async fn assign_vanity(&self, node_id: NodeId, number: u32) -> Result<CandidateOutcome> {
        self.space.check_assignable(number)?;
        let _allocation = self.locks.acquire(NUMBER_ALLOCATION_LOCK).await;

        let node = self.load_node(node_id).await?;
        let outcome = self.validate_locked(number, Some(node_id)).await?;
        self.set_node_number(node, number).await?;
        Ok(outcome)
    }

    /// Save `number` onto the node and report it; the caller holds the
    /// allocation lock
    async fn set_node_number(&self, mut node: crate::model::Node, number: u32) -> Result<()> {
        if node.network_number == Some(number) {
            return Ok(());
        }

        let previous = node.network_number;
        node.network_number = Some(number);
        self.registry.save_node(&node).await?;

        let change = match previous {
            Some(old) => format!("Changed network number from {} to {}", old, number),
            None => format!("Assigned network number {}", number),
        };
        info!("Node {}: {}", node.id, change);
        self.report(
            ChangeSubject::new(RecordKind::Node, node.id, node.to_string()),
            vec![change],
        );
        Ok(())
    }

    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            claims: self.claims.load(Ordering::Relaxed),
            reclaimed_installs: self.reclaimed.load(Ordering::Relaxed),
        }
    }

    async fn load_node(&self, node_id: NodeId) -> Result<crate::model::Node> {
        self.registry
            .get_node(node_id)
            .await?
            .ok_or_else(|| Error::NodeNotFound {
                node_id: node_id.to_string(),
            })
    }

    /// Numbers already spoken for: installs holding their number, node
    /// network numbers and pending claims
    async fn used_numbers(&self) -> Result<HashSet<u32>> {
        let mut used: HashSet<u32> = self.registry.held_install_numbers().await?.into_iter().collect();
        used.extend(self.registry.node_numbers().await?);
        used.extend(self.registry.pending_claims().await?);
        Ok(used)
    }

    async fn select_free(&self) -> Result<u32> {
        let used = self.used_numbers().await?;
        let candidate = self
            .space
            .first_free(&used)
            .ok_or(Error::NumberSpaceExhausted {
                min: self.space.assign_min(),
                max: self.space.max(),
            })?;
        debug!("Selected free number {} ({} in use)", candidate, used.len());
        Ok(candidate)
    }

    /// Validation body; the caller holds the allocation lock
    async fn validate_locked(
        &self,
        candidate: u32,
        exempt_node: Option<NodeId>,
    ) -> Result<CandidateOutcome> {
        self.space.check_assignable(candidate)?;

        if let Some(owner) = self.registry.find_node_by_number(candidate).await? {
            if Some(owner.id) != exempt_node {
                return Err(Error::NumberCollision {
                    number: candidate,
                    owner: format!("node {}", owner.id),
                });
            }
        }

        if self.registry.pending_claims().await?.contains(&candidate) {
            return Err(Error::NumberCollision {
                number: candidate,
                owner: "a pending claim".to_string(),
            });
        }

        let _row = self.locks.acquire(&install_row_lock(candidate)).await;

        // Re-read under the row lock
        let Some(mut install) = self.registry.find_install_by_number(candidate).await? else {
            return Ok(CandidateOutcome::Free);
        };

        if exempt_node.is_some() && install.node == exempt_node {
            return Ok(CandidateOutcome::CarriedOver {
                install: install.id,
            });
        }

        match install.status {
            InstallStatus::Active => Err(Error::ActiveInstallConflict {
                number: candidate,
                install_id: install.id.to_string(),
            }),
            InstallStatus::NnReassigned => Ok(CandidateOutcome::Free),
            previous => {
                install.status = InstallStatus::NnReassigned;
                self.registry.save_install(&install).await?;
                self.reclaimed.fetch_add(1, Ordering::Relaxed);

                warn!(
                    "Reclaimed number {} from install {} (was {})",
                    candidate, install.id, previous
                );
                self.report(
                    ChangeSubject::new(
                        RecordKind::Install,
                        install.id,
                        format!("#{}", install.install_number),
                    ),
                    vec![format!(
                        "Changed status from {} to {}: number donated to a node",
                        previous,
                        InstallStatus::NnReassigned
                    )],
                );
                Ok(CandidateOutcome::Reclaimed { install })
            }
        }
    }

    fn report(&self, subject: ChangeSubject, changes: Vec<String>) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.notify(subject, changes, false);
        }
    }
}
