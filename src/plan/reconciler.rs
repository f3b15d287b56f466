//! Transactional reconciliation of a plan and its child collections

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::plan::diff::{diff_children, ChildDiff};
use crate::traits::*;
use crate::types::*;

/// Per-kind counts of the changes a reconciliation applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub kind: ChildKind,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Outcome of a committed plan write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Identity of the written plan
    pub plan_id: PlanId,
    /// Applied change counts, one entry per kind in apply order
    pub stats: Vec<KindStats>,
    /// Result of the post-commit recompute stage
    pub recompute: RecomputeStatus,
}

/// Apply computed child diffs under a plan inside the caller's transaction
///
/// Kinds are applied in the order given; within a kind, deletes run first,
/// then inserts (with the parent key forced to `plan_id`), then updates. A
/// missing delete or update target means the row vanished between the fresh
/// read and the apply pass and surfaces as a concurrent modification; the
/// caller is expected to roll the transaction back.
pub async fn apply_child_diffs<T: BillingTransaction>(
    tx: &mut T,
    plan_id: PlanId,
    diffs: &[ChildDiff],
) -> BillingResult<Vec<KindStats>> {
    let mut stats = Vec::with_capacity(diffs.len());

    for diff in diffs {
        for id in &diff.to_delete {
            tx.delete_child(diff.kind, *id)
                .await
                .map_err(conflict_on_missing)?;
        }
        for fields in &diff.to_insert {
            tx.insert_child(plan_id, fields).await?;
        }
        for (id, fields) in &diff.to_update {
            tx.update_child(diff.kind, *id, fields)
                .await
                .map_err(conflict_on_missing)?;
        }
        stats.push(KindStats {
            kind: diff.kind,
            inserted: diff.to_insert.len(),
            updated: diff.to_update.len(),
            deleted: diff.to_delete.len(),
        });
    }

    Ok(stats)
}

fn conflict_on_missing(err: BillingError) -> BillingError {
    match err {
        BillingError::ChildNotFound { kind, id } => BillingError::ConcurrentModification(format!(
            "{kind} {id} vanished before the change could be applied"
        )),
        other => other,
    }
}

/// Reconciler for plan writes
///
/// Validates everything up front, applies the parent row and all three child
/// collections inside one transaction, and runs the invoice recompute hook
/// after a successful commit.
pub struct PlanReconciler<S: BillingStore> {
    store: S,
    plan_validator: Box<dyn PlanValidator>,
    child_validator: Box<dyn ChildValidator>,
    recalculator: Option<Arc<dyn InvoiceRecalculator>>,
}

impl<S: BillingStore> PlanReconciler<S> {
    /// Create a reconciler with the default validators
    pub fn new(store: S) -> Self {
        Self {
            store,
            plan_validator: Box::new(DefaultPlanValidator),
            child_validator: Box::new(DefaultChildValidator),
            recalculator: None,
        }
    }

    /// Create a reconciler with custom validators
    pub fn with_validators(
        store: S,
        plan_validator: Box<dyn PlanValidator>,
        child_validator: Box<dyn ChildValidator>,
    ) -> Self {
        Self {
            store,
            plan_validator,
            child_validator,
            recalculator: None,
        }
    }

    /// Attach the post-commit invoice recompute hook
    pub fn with_recalculator(mut self, recalculator: Arc<dyn InvoiceRecalculator>) -> Self {
        self.recalculator = Some(recalculator);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a plan together with its child collections
    ///
    /// Proposed children must not carry identities: there is nothing persisted
    /// yet to update or delete. Checklist rows with `selected == false` are
    /// skipped.
    pub async fn create_plan(
        &self,
        draft: PlanDraft,
        children: ProposedChildren,
    ) -> BillingResult<ReconcileOutcome> {
        self.plan_validator.validate_draft(&draft)?;
        self.validate_children(&children)?;
        for (kind, row) in children.iter_all() {
            if row.id.filter(|id| *id != 0).is_some() {
                return Err(BillingError::Validation(format!(
                    "Proposed {kind} row carries an identity but the plan does not exist yet"
                )));
            }
        }

        let mut diffs = Vec::with_capacity(ChildKind::APPLY_ORDER.len());
        for kind in ChildKind::APPLY_ORDER {
            diffs.push(diff_children(kind, &[], children.for_kind(kind))?);
        }

        let linked = self
            .store
            .find_open_invoice_for_contractor(draft.contractor_id)
            .await?;

        let mut tx = self.store.begin().await?;
        let written = async {
            let plan_id = tx.insert_plan(&draft).await?;
            let stats = apply_child_diffs(&mut tx, plan_id, &diffs).await?;
            Ok::<_, BillingError>((plan_id, stats))
        }
        .await;
        let (plan_id, stats) = match written {
            Ok(v) => v,
            Err(e) => return Err(release(tx, e).await),
        };
        tx.commit().await?;
        info!(plan_id, contractor_id = draft.contractor_id, "plan created");

        let recompute = self
            .run_recompute(draft.contractor_id, linked.as_ref())
            .await;
        Ok(ReconcileOutcome {
            plan_id,
            stats,
            recompute,
        })
    }

    /// Reconcile an existing plan against the proposed child collections
    ///
    /// The parent row is written first, then each kind is read fresh inside
    /// the transaction, diffed and applied in the fixed kind order. Either the
    /// whole edit commits or none of it does.
    pub async fn update_plan(
        &self,
        plan: Plan,
        children: ProposedChildren,
    ) -> BillingResult<ReconcileOutcome> {
        self.plan_validator.validate_plan(&plan)?;
        self.validate_children(&children)?;

        let linked = self
            .store
            .find_open_invoice_for_contractor(plan.contractor_id)
            .await?;

        let mut tx = self.store.begin().await?;
        let written = async {
            tx.update_plan(&plan).await?;

            let mut diffs = Vec::with_capacity(ChildKind::APPLY_ORDER.len());
            for kind in ChildKind::APPLY_ORDER {
                let current = tx.list_children(plan.id, kind).await?;
                let diff = diff_children(kind, &current, children.for_kind(kind))?;
                debug!(
                    plan_id = plan.id,
                    kind = %kind,
                    inserts = diff.to_insert.len(),
                    updates = diff.to_update.len(),
                    deletes = diff.to_delete.len(),
                    "computed child diff"
                );
                diffs.push(diff);
            }

            apply_child_diffs(&mut tx, plan.id, &diffs).await
        }
        .await;
        let stats = match written {
            Ok(v) => v,
            Err(e) => return Err(release(tx, e).await),
        };
        tx.commit().await?;
        info!(plan_id = plan.id, "plan reconciled");

        let recompute = self.run_recompute(plan.contractor_id, linked.as_ref()).await;
        Ok(ReconcileOutcome {
            plan_id: plan.id,
            stats,
            recompute,
        })
    }

    /// Delete a plan and all of its child rows in one transaction
    pub async fn delete_plan(&self, plan_id: PlanId) -> BillingResult<ReconcileOutcome> {
        let plan = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or(BillingError::PlanNotFound(plan_id))?;
        let linked = self
            .store
            .find_open_invoice_for_contractor(plan.contractor_id)
            .await?;

        let mut tx = self.store.begin().await?;
        let written = async {
            let mut stats = Vec::with_capacity(ChildKind::APPLY_ORDER.len());
            for kind in ChildKind::APPLY_ORDER {
                let current = tx.list_children(plan_id, kind).await?;
                for child in &current {
                    tx.delete_child(kind, child.id)
                        .await
                        .map_err(conflict_on_missing)?;
                }
                stats.push(KindStats {
                    kind,
                    inserted: 0,
                    updated: 0,
                    deleted: current.len(),
                });
            }
            tx.delete_plan(plan_id).await?;
            Ok::<_, BillingError>(stats)
        }
        .await;
        let stats = match written {
            Ok(v) => v,
            Err(e) => return Err(release(tx, e).await),
        };
        tx.commit().await?;
        info!(plan_id, "plan deleted");

        let recompute = self.run_recompute(plan.contractor_id, linked.as_ref()).await;
        Ok(ReconcileOutcome {
            plan_id,
            stats,
            recompute,
        })
    }

    fn validate_children(&self, children: &ProposedChildren) -> BillingResult<()> {
        for (kind, row) in children.iter_all() {
            self.child_validator.validate_child(kind, row)?;
        }
        Ok(())
    }

    async fn run_recompute(
        &self,
        contractor_id: ContractorId,
        linked: Option<&Invoice>,
    ) -> RecomputeStatus {
        let (Some(recalculator), Some(invoice)) = (&self.recalculator, linked) else {
            return RecomputeStatus::NotRequired;
        };
        match recalculator.recompute(contractor_id, invoice.id).await {
            Ok(()) => RecomputeStatus::Completed {
                invoice_id: invoice.id,
            },
            Err(e) => {
                warn!(
                    contractor_id,
                    invoice_id = invoice.id,
                    error = %e,
                    "invoice recompute failed after commit"
                );
                RecomputeStatus::Failed {
                    invoice_id: invoice.id,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Roll the transaction back and hand the original error through
async fn release<T: BillingTransaction>(tx: T, err: BillingError) -> BillingError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "transaction rollback failed");
    }
    err
}
