//! # Billing Core
//!
//! A billing library providing service-plan reconciliation, open-invoice
//! attachment and line-item management for subscription businesses.
//!
//! ## Features
//!
//! - **Plan reconciliation**: diff a plan's dependent collections (terms,
//!   charges, features) against a proposed end state and apply the insert,
//!   update and delete sets in one all-or-nothing transaction
//! - **Open-invoice attachment**: date-window rule deciding whether a billing
//!   line item joins the invoice currently under analysis
//! - **Line-item management**: record, edit and remove billing entries with
//!   automatic invoice-total recomputation after commit
//! - **Concurrent-edit detection**: vanished update/delete targets surface as
//!   conflicts instead of silent partial writes
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   transactional storage
//!
//! ## Quick Start
//!
//! ```rust
//! use billing_core::{PlanDraft, PlanReconciler, ProposedChildren};
//! use bigdecimal::BigDecimal;
//!
//! // This example shows basic usage - you need to implement BillingStore trait
//! // let store = YourStorageImplementation::new();
//! // let reconciler = PlanReconciler::new(store);
//! ```

pub mod billing;
pub mod plan;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use billing::*;
pub use plan::*;
pub use traits::*;
pub use types::*;
