//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::types::*;

/// Storage abstraction for the billing system
///
/// This trait allows the billing core to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these methods.
/// Writes go through a [`BillingTransaction`] obtained from [`begin`]; the
/// read methods here operate on committed state only.
///
/// [`begin`]: BillingStore::begin
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Transaction handle type for this backend
    type Tx: BillingTransaction;

    /// Open a transaction scoped to one reconciliation or entry write
    async fn begin(&self) -> BillingResult<Self::Tx>;

    /// Get a plan by ID
    async fn get_plan(&self, plan_id: PlanId) -> BillingResult<Option<Plan>>;

    /// List plans, optionally filtered by contractor
    async fn list_plans(&self, contractor_id: Option<ContractorId>) -> BillingResult<Vec<Plan>>;

    /// List the persisted child rows of one kind under a plan
    async fn list_children(
        &self,
        plan_id: PlanId,
        kind: ChildKind,
    ) -> BillingResult<Vec<PersistedChild>>;

    /// Get a billing entry by ID
    async fn get_entry(&self, entry_id: EntryId) -> BillingResult<Option<BillingEntry>>;

    /// List billing entries for an installation, newest billing date first
    async fn list_entries(
        &self,
        installation_id: InstallationId,
    ) -> BillingResult<Vec<BillingEntry>>;

    /// Get an invoice by ID
    async fn get_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Option<Invoice>>;

    /// Find the under-analysis invoice for an installation, if one exists
    async fn find_open_invoice_for_installation(
        &self,
        installation_id: InstallationId,
    ) -> BillingResult<Option<Invoice>>;

    /// Find an under-analysis invoice for a contractor, if one exists
    async fn find_open_invoice_for_contractor(
        &self,
        contractor_id: ContractorId,
    ) -> BillingResult<Option<Invoice>>;
}

/// A write transaction against the billing store
///
/// Every mutation performed through a transaction is invisible to readers
/// until [`commit`] succeeds. Dropping a transaction without committing
/// discards all of its writes, so early returns and `?` propagation release
/// the transaction safely on every exit path.
///
/// [`commit`]: BillingTransaction::commit
#[async_trait]
pub trait BillingTransaction: Send {
    /// Insert a plan row and return its assigned identity
    async fn insert_plan(&mut self, draft: &PlanDraft) -> BillingResult<PlanId>;

    /// Update an existing plan row
    async fn update_plan(&mut self, plan: &Plan) -> BillingResult<()>;

    /// Delete a plan row
    async fn delete_plan(&mut self, plan_id: PlanId) -> BillingResult<()>;

    /// List the child rows of one kind under a plan, as seen by this transaction
    async fn list_children(
        &self,
        plan_id: PlanId,
        kind: ChildKind,
    ) -> BillingResult<Vec<PersistedChild>>;

    /// Insert a child row under a plan and return its assigned identity
    async fn insert_child(
        &mut self,
        plan_id: PlanId,
        fields: &ChildFields,
    ) -> BillingResult<ChildId>;

    /// Update the attribute fields of an existing child row
    ///
    /// The row's identity and owning plan are never changed by this call.
    async fn update_child(
        &mut self,
        kind: ChildKind,
        child_id: ChildId,
        fields: &ChildFields,
    ) -> BillingResult<()>;

    /// Delete a child row by identity
    async fn delete_child(&mut self, kind: ChildKind, child_id: ChildId) -> BillingResult<()>;

    /// Insert a billing entry and return its assigned identity
    async fn insert_entry(
        &mut self,
        draft: &EntryDraft,
        invoice_id: Option<InvoiceId>,
    ) -> BillingResult<EntryId>;

    /// Update an existing billing entry
    async fn update_entry(&mut self, entry: &BillingEntry) -> BillingResult<()>;

    /// Delete a billing entry by identity
    async fn delete_entry(&mut self, entry_id: EntryId) -> BillingResult<()>;

    /// Commit all writes made through this transaction
    async fn commit(self) -> BillingResult<()>
    where
        Self: Sized;

    /// Discard all writes made through this transaction
    async fn rollback(self) -> BillingResult<()>
    where
        Self: Sized;
}

/// Post-commit recomputation of an invoice's aggregate total
///
/// Invoked only after a successful commit when the written data is linked to
/// an open invoice. A failure here is reported as degraded success and never
/// rolls back the committed write.
#[async_trait]
pub trait InvoiceRecalculator: Send + Sync {
    /// Recompute the aggregate total of one invoice
    async fn recompute(
        &self,
        contractor_id: ContractorId,
        invoice_id: InvoiceId,
    ) -> BillingResult<()>;
}

/// Trait for implementing custom plan validation rules
pub trait PlanValidator: Send + Sync {
    /// Validate a plan draft before insertion
    fn validate_draft(&self, draft: &PlanDraft) -> BillingResult<()>;

    /// Validate a plan before update
    fn validate_plan(&self, plan: &Plan) -> BillingResult<()>;
}

/// Trait for implementing custom child payload validation rules
pub trait ChildValidator: Send + Sync {
    /// Validate one proposed child row submitted under the given kind
    fn validate_child(&self, kind: ChildKind, proposed: &ProposedChild) -> BillingResult<()>;
}

/// Trait for implementing custom billing entry validation rules
pub trait EntryValidator: Send + Sync {
    /// Validate an entry draft before insertion
    fn validate_draft(&self, draft: &EntryDraft) -> BillingResult<()>;

    /// Validate an entry before update
    fn validate_entry(&self, entry: &BillingEntry) -> BillingResult<()>;
}

/// Default plan validator with basic rules
pub struct DefaultPlanValidator;

impl PlanValidator for DefaultPlanValidator {
    fn validate_draft(&self, draft: &PlanDraft) -> BillingResult<()> {
        if draft.name.trim().is_empty() {
            return Err(BillingError::Validation(
                "Plan name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_plan(&self, plan: &Plan) -> BillingResult<()> {
        if plan.name.trim().is_empty() {
            return Err(BillingError::Validation(
                "Plan name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default child validator with basic rules
pub struct DefaultChildValidator;

impl ChildValidator for DefaultChildValidator {
    fn validate_child(&self, kind: ChildKind, proposed: &ProposedChild) -> BillingResult<()> {
        if proposed.fields.kind() != kind {
            return Err(BillingError::Validation(format!(
                "Payload of kind {} submitted under {}",
                proposed.fields.kind(),
                kind
            )));
        }
        match &proposed.fields {
            ChildFields::Term(term) => {
                if term.label.trim().is_empty() {
                    return Err(BillingError::Validation(
                        "Term label cannot be empty".to_string(),
                    ));
                }
                if term.months == 0 {
                    return Err(BillingError::Validation(
                        "Term length must be at least one month".to_string(),
                    ));
                }
            }
            ChildFields::Charge(charge) => {
                if charge.description.trim().is_empty() {
                    return Err(BillingError::Validation(
                        "Charge description cannot be empty".to_string(),
                    ));
                }
            }
            ChildFields::Feature(feature) => {
                if feature.code.trim().is_empty() {
                    return Err(BillingError::Validation(
                        "Feature code cannot be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Default entry validator with basic rules
pub struct DefaultEntryValidator;

impl EntryValidator for DefaultEntryValidator {
    fn validate_draft(&self, draft: &EntryDraft) -> BillingResult<()> {
        if draft.description.trim().is_empty() {
            return Err(BillingError::Validation(
                "Entry description cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_entry(&self, entry: &BillingEntry) -> BillingResult<()> {
        if entry.description.trim().is_empty() {
            return Err(BillingError::Validation(
                "Entry description cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
