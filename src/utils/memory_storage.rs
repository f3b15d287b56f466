//! In-memory storage implementation for testing and development

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    plans: BTreeMap<PlanId, Plan>,
    terms: BTreeMap<ChildId, PersistedChild>,
    charges: BTreeMap<ChildId, PersistedChild>,
    features: BTreeMap<ChildId, PersistedChild>,
    entries: BTreeMap<EntryId, BillingEntry>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    next_id: i64,
}

impl MemoryState {
    fn children(&self, kind: ChildKind) -> &BTreeMap<ChildId, PersistedChild> {
        match kind {
            ChildKind::SubscriptionTerm => &self.terms,
            ChildKind::ChargeRule => &self.charges,
            ChildKind::FeatureFlag => &self.features,
        }
    }

    fn children_mut(&mut self, kind: ChildKind) -> &mut BTreeMap<ChildId, PersistedChild> {
        match kind {
            ChildKind::SubscriptionTerm => &mut self.terms,
            ChildKind::ChargeRule => &mut self.charges,
            ChildKind::FeatureFlag => &mut self.features,
        }
    }

    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create a new memory store instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        *self.state.write().unwrap() = MemoryState::default();
    }

    /// A recalculator that sums attached entry amounts into invoice totals
    ///
    /// Shares this store's state, so recomputed totals are visible through
    /// the store's read methods.
    pub fn recalculator(&self) -> MemoryRecalculator {
        MemoryRecalculator {
            state: Arc::clone(&self.state),
            fail: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Insert an invoice directly, bypassing any transaction (test setup)
    pub fn seed_invoice(
        &self,
        contractor_id: ContractorId,
        installation_id: InstallationId,
        period_start: chrono::NaiveDate,
        period_end: chrono::NaiveDate,
        status: InvoiceStatus,
    ) -> InvoiceId {
        let mut state = self.state.write().unwrap();
        let id = state.assign_id();
        state.invoices.insert(
            id,
            Invoice {
                id,
                contractor_id,
                installation_id,
                period_start,
                period_end,
                status,
                total: BigDecimal::from(0),
            },
        );
        id
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> BillingResult<MemoryTx> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.state),
            work: self.state.read().unwrap().clone(),
        })
    }

    async fn get_plan(&self, plan_id: PlanId) -> BillingResult<Option<Plan>> {
        Ok(self.state.read().unwrap().plans.get(&plan_id).cloned())
    }

    async fn list_plans(&self, contractor_id: Option<ContractorId>) -> BillingResult<Vec<Plan>> {
        let state = self.state.read().unwrap();
        Ok(state
            .plans
            .values()
            .filter(|plan| contractor_id.is_none_or(|c| plan.contractor_id == c))
            .cloned()
            .collect())
    }

    async fn list_children(
        &self,
        plan_id: PlanId,
        kind: ChildKind,
    ) -> BillingResult<Vec<PersistedChild>> {
        let state = self.state.read().unwrap();
        Ok(state
            .children(kind)
            .values()
            .filter(|child| child.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, entry_id: EntryId) -> BillingResult<Option<BillingEntry>> {
        Ok(self.state.read().unwrap().entries.get(&entry_id).cloned())
    }

    async fn list_entries(
        &self,
        installation_id: InstallationId,
    ) -> BillingResult<Vec<BillingEntry>> {
        let state = self.state.read().unwrap();
        let mut entries: Vec<BillingEntry> = state
            .entries
            .values()
            .filter(|entry| entry.installation_id == installation_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.billing_date.cmp(&a.billing_date));
        Ok(entries)
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Option<Invoice>> {
        Ok(self.state.read().unwrap().invoices.get(&invoice_id).cloned())
    }

    async fn find_open_invoice_for_installation(
        &self,
        installation_id: InstallationId,
    ) -> BillingResult<Option<Invoice>> {
        let state = self.state.read().unwrap();
        Ok(state
            .invoices
            .values()
            .find(|invoice| {
                invoice.installation_id == installation_id
                    && invoice.status == InvoiceStatus::UnderAnalysis
            })
            .cloned())
    }

    async fn find_open_invoice_for_contractor(
        &self,
        contractor_id: ContractorId,
    ) -> BillingResult<Option<Invoice>> {
        let state = self.state.read().unwrap();
        Ok(state
            .invoices
            .values()
            .find(|invoice| {
                invoice.contractor_id == contractor_id
                    && invoice.status == InvoiceStatus::UnderAnalysis
            })
            .cloned())
    }
}

/// Transaction over a [`MemoryStore`]
///
/// Works on a snapshot taken at [`begin`]; commit swaps the snapshot into the
/// shared state wholesale, so concurrent transactions are last-writer-wins.
/// Dropping the transaction without committing discards every write.
///
/// [`begin`]: BillingStore::begin
pub struct MemoryTx {
    shared: Arc<RwLock<MemoryState>>,
    work: MemoryState,
}

#[async_trait]
impl BillingTransaction for MemoryTx {
    async fn insert_plan(&mut self, draft: &PlanDraft) -> BillingResult<PlanId> {
        let now = chrono::Utc::now().naive_utc();
        let id = self.work.assign_id();
        self.work.plans.insert(
            id,
            Plan {
                id,
                contractor_id: draft.contractor_id,
                name: draft.name.clone(),
                description: draft.description.clone(),
                base_amount: draft.base_amount.clone(),
                active: draft.active,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_plan(&mut self, plan: &Plan) -> BillingResult<()> {
        let created_at = self
            .work
            .plans
            .get(&plan.id)
            .ok_or(BillingError::PlanNotFound(plan.id))?
            .created_at;
        let mut updated = plan.clone();
        updated.created_at = created_at;
        updated.updated_at = chrono::Utc::now().naive_utc();
        self.work.plans.insert(updated.id, updated);
        Ok(())
    }

    async fn delete_plan(&mut self, plan_id: PlanId) -> BillingResult<()> {
        if self.work.plans.remove(&plan_id).is_some() {
            Ok(())
        } else {
            Err(BillingError::PlanNotFound(plan_id))
        }
    }

    async fn list_children(
        &self,
        plan_id: PlanId,
        kind: ChildKind,
    ) -> BillingResult<Vec<PersistedChild>> {
        Ok(self
            .work
            .children(kind)
            .values()
            .filter(|child| child.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn insert_child(
        &mut self,
        plan_id: PlanId,
        fields: &ChildFields,
    ) -> BillingResult<ChildId> {
        if !self.work.plans.contains_key(&plan_id) {
            return Err(BillingError::PlanNotFound(plan_id));
        }
        let id = self.work.assign_id();
        self.work.children_mut(fields.kind()).insert(
            id,
            PersistedChild {
                id,
                plan_id,
                fields: fields.clone(),
            },
        );
        Ok(id)
    }

    async fn update_child(
        &mut self,
        kind: ChildKind,
        child_id: ChildId,
        fields: &ChildFields,
    ) -> BillingResult<()> {
        if fields.kind() != kind {
            return Err(BillingError::Validation(format!(
                "Payload of kind {} submitted under {}",
                fields.kind(),
                kind
            )));
        }
        let child = self
            .work
            .children_mut(kind)
            .get_mut(&child_id)
            .ok_or(BillingError::ChildNotFound { kind, id: child_id })?;
        child.fields = fields.clone();
        Ok(())
    }

    async fn delete_child(&mut self, kind: ChildKind, child_id: ChildId) -> BillingResult<()> {
        if self.work.children_mut(kind).remove(&child_id).is_some() {
            Ok(())
        } else {
            Err(BillingError::ChildNotFound { kind, id: child_id })
        }
    }

    async fn insert_entry(
        &mut self,
        draft: &EntryDraft,
        invoice_id: Option<InvoiceId>,
    ) -> BillingResult<EntryId> {
        let now = chrono::Utc::now().naive_utc();
        let id = self.work.assign_id();
        self.work.entries.insert(
            id,
            BillingEntry {
                id,
                contractor_id: draft.contractor_id,
                installation_id: draft.installation_id,
                description: draft.description.clone(),
                amount: draft.amount.clone(),
                billing_date: draft.billing_date,
                invoice_id,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_entry(&mut self, entry: &BillingEntry) -> BillingResult<()> {
        let created_at = self
            .work
            .entries
            .get(&entry.id)
            .ok_or(BillingError::EntryNotFound(entry.id))?
            .created_at;
        let mut updated = entry.clone();
        updated.created_at = created_at;
        updated.updated_at = chrono::Utc::now().naive_utc();
        self.work.entries.insert(updated.id, updated);
        Ok(())
    }

    async fn delete_entry(&mut self, entry_id: EntryId) -> BillingResult<()> {
        if self.work.entries.remove(&entry_id).is_some() {
            Ok(())
        } else {
            Err(BillingError::EntryNotFound(entry_id))
        }
    }

    async fn commit(self) -> BillingResult<()> {
        let Self { shared, work } = self;
        *shared.write().unwrap() = work;
        Ok(())
    }

    async fn rollback(self) -> BillingResult<()> {
        Ok(())
    }
}

/// Recalculator over a [`MemoryStore`] that sums attached entries into invoice totals
#[derive(Debug, Clone)]
pub struct MemoryRecalculator {
    state: Arc<RwLock<MemoryState>>,
    fail: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<(ContractorId, InvoiceId)>>>,
}

impl MemoryRecalculator {
    /// Make every following recompute call fail (useful for testing)
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// The recompute calls received so far
    pub fn calls(&self) -> Vec<(ContractorId, InvoiceId)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceRecalculator for MemoryRecalculator {
    async fn recompute(
        &self,
        contractor_id: ContractorId,
        invoice_id: InvoiceId,
    ) -> BillingResult<()> {
        self.calls.lock().unwrap().push((contractor_id, invoice_id));
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Storage(
                "simulated recompute failure".to_string(),
            ));
        }

        let mut state = self.state.write().unwrap();
        let total: BigDecimal = state
            .entries
            .values()
            .filter(|entry| entry.invoice_id == Some(invoice_id))
            .map(|entry| &entry.amount)
            .sum();
        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| BillingError::Storage(format!("Invoice {invoice_id} missing")))?;
        invoice.total = total;
        Ok(())
    }
}
