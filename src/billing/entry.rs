//! Billing line-item management

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::billing::invoice::attachment_target;
use crate::traits::*;
use crate::types::*;

/// Outcome of a committed billing entry write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCommit {
    /// Identity of the written entry
    pub entry_id: EntryId,
    /// Invoice the entry ended up attached to, if any
    pub invoice_id: Option<InvoiceId>,
    /// One recompute status per invoice touched by this write; empty when no
    /// invoice was touched or no recalculator is configured
    pub recompute: Vec<RecomputeStatus>,
}

/// Manager for billing line items
///
/// Records, edits and removes line items, resolving the open-invoice
/// attachment window on every write and recomputing touched invoice totals
/// after commit.
pub struct EntryManager<S: BillingStore> {
    store: S,
    validator: Box<dyn EntryValidator>,
    recalculator: Option<Arc<dyn InvoiceRecalculator>>,
}

impl<S: BillingStore> EntryManager<S> {
    /// Create an entry manager with the default validator
    pub fn new(store: S) -> Self {
        Self {
            store,
            validator: Box::new(DefaultEntryValidator),
            recalculator: None,
        }
    }

    /// Create an entry manager with a custom validator
    pub fn with_validator(store: S, validator: Box<dyn EntryValidator>) -> Self {
        Self {
            store,
            validator,
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

    /// Record a new billing line item
    ///
    /// If the installation has an invoice under analysis and the billing date
    /// falls inside its attachment window, the entry is attached to it;
    /// otherwise it stays unattached for a future invoice cycle.
    pub async fn record_entry(&self, draft: EntryDraft) -> BillingResult<EntryCommit> {
        self.validator.validate_draft(&draft)?;

        let open = self
            .store
            .find_open_invoice_for_installation(draft.installation_id)
            .await?;
        let invoice_id = attachment_target(open.as_ref(), draft.billing_date);

        let mut tx = self.store.begin().await?;
        let entry_id = match tx.insert_entry(&draft, invoice_id).await {
            Ok(id) => id,
            Err(e) => return Err(release(tx, e).await),
        };
        tx.commit().await?;
        info!(entry_id, ?invoice_id, "billing entry recorded");

        let recompute = self
            .run_recompute(draft.contractor_id, invoice_id.into_iter().collect())
            .await;
        Ok(EntryCommit {
            entry_id,
            invoice_id,
            recompute,
        })
    }

    /// Update a billing line item, re-evaluating its invoice attachment
    ///
    /// Both the previously linked invoice and the newly linked one (when they
    /// differ) are recomputed after commit.
    pub async fn update_entry(&self, entry: BillingEntry) -> BillingResult<EntryCommit> {
        self.validator.validate_entry(&entry)?;

        let previous = self
            .store
            .get_entry(entry.id)
            .await?
            .ok_or(BillingError::EntryNotFound(entry.id))?;

        let open = self
            .store
            .find_open_invoice_for_installation(entry.installation_id)
            .await?;
        let invoice_id = attachment_target(open.as_ref(), entry.billing_date);

        let mut updated = entry;
        updated.invoice_id = invoice_id;

        let mut tx = self.store.begin().await?;
        if let Err(e) = tx.update_entry(&updated).await {
            return Err(release(tx, e).await);
        }
        tx.commit().await?;
        info!(entry_id = updated.id, ?invoice_id, "billing entry updated");

        let mut touched: Vec<InvoiceId> = Vec::new();
        touched.extend(previous.invoice_id);
        if let Some(id) = invoice_id {
            if !touched.contains(&id) {
                touched.push(id);
            }
        }
        let recompute = self.run_recompute(updated.contractor_id, touched).await;
        Ok(EntryCommit {
            entry_id: updated.id,
            invoice_id,
            recompute,
        })
    }

    /// Delete a billing line item, recomputing its invoice if it was attached
    pub async fn delete_entry(&self, entry_id: EntryId) -> BillingResult<EntryCommit> {
        let entry = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or(BillingError::EntryNotFound(entry_id))?;

        let mut tx = self.store.begin().await?;
        if let Err(e) = tx.delete_entry(entry_id).await {
            return Err(release(tx, e).await);
        }
        tx.commit().await?;
        info!(entry_id, "billing entry deleted");

        let recompute = self
            .run_recompute(entry.contractor_id, entry.invoice_id.into_iter().collect())
            .await;
        Ok(EntryCommit {
            entry_id,
            invoice_id: None,
            recompute,
        })
    }

    async fn run_recompute(
        &self,
        contractor_id: ContractorId,
        invoice_ids: Vec<InvoiceId>,
    ) -> Vec<RecomputeStatus> {
        let Some(recalculator) = &self.recalculator else {
            return Vec::new();
        };
        let mut statuses = Vec::with_capacity(invoice_ids.len());
        for invoice_id in invoice_ids {
            let status = match recalculator.recompute(contractor_id, invoice_id).await {
                Ok(()) => RecomputeStatus::Completed { invoice_id },
                Err(e) => {
                    warn!(
                        contractor_id,
                        invoice_id,
                        error = %e,
                        "invoice recompute failed after commit"
                    );
                    RecomputeStatus::Failed {
                        invoice_id,
                        reason: e.to_string(),
                    }
                }
            };
            statuses.push(status);
        }
        statuses
    }
}

/// Roll the transaction back and hand the original error through
async fn release<T: BillingTransaction>(tx: T, err: BillingError) -> BillingError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "transaction rollback failed");
    }
    err
}
