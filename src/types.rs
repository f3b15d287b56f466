//! Core types and data structures for the billing system

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier for a service plan
pub type PlanId = i64;
/// Identifier for a dependent child row under a plan
pub type ChildId = i64;
/// Identifier for a billing line item
pub type EntryId = i64;
/// Identifier for an invoice
pub type InvoiceId = i64;
/// Identifier for a contractor (tenant)
pub type ContractorId = i64;
/// Identifier for a monitored installation (tracked vehicle/unit)
pub type InstallationId = i64;

/// Categories of dependent rows owned by a plan
///
/// Each kind maps to its own table in the backing store and is reconciled
/// independently of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKind {
    /// Contract duration options with their monthly pricing
    SubscriptionTerm,
    /// One-time or recurring charges attached to the plan
    ChargeRule,
    /// Optional add-on features the plan offers
    FeatureFlag,
}

impl ChildKind {
    /// Fixed order in which kinds are written during an apply pass
    pub const APPLY_ORDER: [ChildKind; 3] = [
        ChildKind::SubscriptionTerm,
        ChildKind::ChargeRule,
        ChildKind::FeatureFlag,
    ];

    /// Whether proposed rows of this kind carry a selection flag
    ///
    /// Charge rules and feature flags are submitted as a checklist: every
    /// option arrives with a flag saying whether it should exist. Subscription
    /// terms are submitted as a plain list and rows left out are removed.
    pub fn uses_selection(&self) -> bool {
        match self {
            ChildKind::SubscriptionTerm => false,
            ChildKind::ChargeRule | ChildKind::FeatureFlag => true,
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildKind::SubscriptionTerm => write!(f, "subscription_term"),
            ChildKind::ChargeRule => write!(f, "charge_rule"),
            ChildKind::FeatureFlag => write!(f, "feature_flag"),
        }
    }
}

/// Attribute payload for a subscription term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermFields {
    /// Display label (e.g. "12-month contract")
    pub label: String,
    /// Contract length in months
    pub months: u32,
    /// Monthly price while the term is in force
    pub monthly_amount: BigDecimal,
}

/// How a charge recurs once attached to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeRecurrence {
    /// Billed once on activation
    OneTime,
    /// Billed every invoice cycle
    Monthly,
}

/// Attribute payload for a charge rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeFields {
    /// Human-readable description of the charge
    pub description: String,
    /// Amount charged per occurrence
    pub amount: BigDecimal,
    /// Recurrence of the charge
    pub recurrence: ChargeRecurrence,
}

/// Attribute payload for an optional plan feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFields {
    /// Stable machine code (e.g. "driver_id", "fuel_sensor")
    pub code: String,
    /// Display label
    pub label: String,
    /// Monthly surcharge for the feature
    pub monthly_amount: BigDecimal,
}

/// Kind-tagged attribute payload for one child row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChildFields {
    Term(TermFields),
    Charge(ChargeFields),
    Feature(FeatureFields),
}

impl ChildFields {
    /// The kind this payload belongs to
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildFields::Term(_) => ChildKind::SubscriptionTerm,
            ChildFields::Charge(_) => ChildKind::ChargeRule,
            ChildFields::Feature(_) => ChildKind::FeatureFlag,
        }
    }
}

/// One caller-supplied desired child row
///
/// `id` is `None` for rows the caller wants created and `Some` for rows the
/// caller wants kept or updated. `selected` must be present exactly when the
/// kind uses a selection flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedChild {
    /// Identity of an existing row, absent for new rows
    pub id: Option<ChildId>,
    /// Checklist state for selection-flag kinds
    pub selected: Option<bool>,
    /// Attribute payload
    pub fields: ChildFields,
}

impl ProposedChild {
    /// A new row to be inserted
    pub fn new(fields: ChildFields) -> Self {
        Self {
            id: None,
            selected: None,
            fields,
        }
    }

    /// An existing row to be kept with updated attributes
    pub fn existing(id: ChildId, fields: ChildFields) -> Self {
        Self {
            id: Some(id),
            selected: None,
            fields,
        }
    }

    /// Set the selection flag (checklist kinds only)
    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }
}

/// The full proposed end state of a plan's child collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedChildren {
    pub terms: Vec<ProposedChild>,
    pub charges: Vec<ProposedChild>,
    pub features: Vec<ProposedChild>,
}

impl ProposedChildren {
    /// The proposed list for one kind
    pub fn for_kind(&self, kind: ChildKind) -> &[ProposedChild] {
        match kind {
            ChildKind::SubscriptionTerm => &self.terms,
            ChildKind::ChargeRule => &self.charges,
            ChildKind::FeatureFlag => &self.features,
        }
    }

    /// Iterate over every proposed row across all kinds
    pub fn iter_all(&self) -> impl Iterator<Item = (ChildKind, &ProposedChild)> {
        ChildKind::APPLY_ORDER
            .into_iter()
            .flat_map(move |kind| self.for_kind(kind).iter().map(move |p| (kind, p)))
    }
}

/// A child row as currently persisted under a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedChild {
    /// Store-assigned identity
    pub id: ChildId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Attribute payload
    pub fields: ChildFields,
}

/// A service plan offered to a contractor's installations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Store-assigned identity
    pub id: PlanId,
    /// Owning contractor
    pub contractor_id: ContractorId,
    /// Plan name
    pub name: String,
    /// Optional longer description
    pub description: Option<String>,
    /// Base monthly amount before terms, charges and features
    pub base_amount: BigDecimal,
    /// Whether the plan can be attached to new subscriptions
    pub active: bool,
    /// When the plan was created
    pub created_at: NaiveDateTime,
    /// When the plan was last updated
    pub updated_at: NaiveDateTime,
}

/// Insert shape for a plan, before the store assigns an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub contractor_id: ContractorId,
    pub name: String,
    pub description: Option<String>,
    pub base_amount: BigDecimal,
    pub active: bool,
}

impl PlanDraft {
    /// Create a draft for an active plan
    pub fn new(contractor_id: ContractorId, name: String, base_amount: BigDecimal) -> Self {
        Self {
            contractor_id,
            name,
            description: None,
            base_amount,
            active: true,
        }
    }
}

/// A billing line item charged to an installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEntry {
    /// Store-assigned identity
    pub id: EntryId,
    /// Owning contractor
    pub contractor_id: ContractorId,
    /// Installation the charge applies to
    pub installation_id: InstallationId,
    /// What is being charged
    pub description: String,
    /// Charged amount
    pub amount: BigDecimal,
    /// Date the charge is due for billing
    pub billing_date: NaiveDate,
    /// Invoice the entry is attached to, if any
    pub invoice_id: Option<InvoiceId>,
    /// When the entry was created
    pub created_at: NaiveDateTime,
    /// When the entry was last updated
    pub updated_at: NaiveDateTime,
}

/// Insert shape for a billing line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub contractor_id: ContractorId,
    pub installation_id: InstallationId,
    pub description: String,
    pub amount: BigDecimal,
    pub billing_date: NaiveDate,
}

/// Lifecycle state of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Still open; line items dated inside the period may attach
    UnderAnalysis,
    /// Finalized, no further attachments
    Closed,
    /// Settled by the contractor
    Paid,
}

/// An invoice for one installation's billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Store-assigned identity
    pub id: InvoiceId,
    /// Owning contractor
    pub contractor_id: ContractorId,
    /// Installation the invoice bills
    pub installation_id: InstallationId,
    /// First day of the billing period
    pub period_start: NaiveDate,
    /// Last day of the billing period
    pub period_end: NaiveDate,
    /// Lifecycle state
    pub status: InvoiceStatus,
    /// Aggregate of attached entry amounts
    pub total: BigDecimal,
}

/// Result of the post-commit invoice recompute stage
///
/// The recompute runs only after a successful commit, so a failure here never
/// undoes the committed write; it is reported as degraded success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecomputeStatus {
    /// No open invoice is linked to the written data, or no recalculator is configured
    NotRequired,
    /// The linked invoice total was recomputed
    Completed { invoice_id: InvoiceId },
    /// The commit succeeded but the recompute failed
    Failed { invoice_id: InvoiceId, reason: String },
}

/// Errors that can occur in the billing system
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),
    #[error("Billing entry not found: {0}")]
    EntryNotFound(EntryId),
    #[error("{kind} not found: {id}")]
    ChildNotFound { kind: ChildKind, id: ChildId },
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for billing operations
pub type BillingResult<T> = Result<T, BillingError>;
