//! Integration tests for billing-core

use std::sync::Arc;

use billing_core::{
    apply_child_diffs,
    utils::{EnhancedChildValidator, EnhancedEntryValidator, EnhancedPlanValidator, MemoryStore},
    BillingError, BillingStore, BillingTransaction, ChargeFields, ChargeRecurrence, ChildDiff,
    ChildFields, ChildKind, EntryDraft, EntryManager, FeatureFields, InvoiceStatus, PlanDraft,
    PlanReconciler, ProposedChild, ProposedChildren, RecomputeStatus, TermFields,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

fn term(label: &str, months: u32, amount: i64) -> ChildFields {
    ChildFields::Term(TermFields {
        label: label.to_string(),
        months,
        monthly_amount: BigDecimal::from(amount),
    })
}

fn charge(description: &str, amount: i64) -> ChildFields {
    ChildFields::Charge(ChargeFields {
        description: description.to_string(),
        amount: BigDecimal::from(amount),
        recurrence: ChargeRecurrence::OneTime,
    })
}

fn feature(code: &str, amount: i64) -> ChildFields {
    ChildFields::Feature(FeatureFields {
        code: code.to_string(),
        label: code.replace('_', " "),
        monthly_amount: BigDecimal::from(amount),
    })
}

#[tokio::test]
async fn test_complete_plan_workflow() {
    let store = MemoryStore::new();
    let reconciler = PlanReconciler::new(store.clone());

    // Create a plan with all three child collections populated.
    let outcome = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![
                    ProposedChild::new(term("annual", 12, 70)),
                    ProposedChild::new(term("monthly", 1, 95)),
                ],
                charges: vec![
                    ProposedChild::new(charge("activation", 150)).selected(true),
                    // Offered but not picked: must not be persisted.
                    ProposedChild::new(charge("chip swap", 30)).selected(false),
                ],
                features: vec![ProposedChild::new(feature("driver_id", 10)).selected(true)],
            },
        )
        .await
        .unwrap();

    let plan_id = outcome.plan_id;
    assert_eq!(outcome.stats[0].inserted, 2);
    assert_eq!(outcome.stats[1].inserted, 1);
    assert_eq!(outcome.stats[2].inserted, 1);

    let terms = store
        .list_children(plan_id, ChildKind::SubscriptionTerm)
        .await
        .unwrap();
    let charges = store
        .list_children(plan_id, ChildKind::ChargeRule)
        .await
        .unwrap();
    assert_eq!(terms.len(), 2);
    assert_eq!(charges.len(), 1);

    // Edit: reprice one term, drop the other, add a third, deselect the
    // activation charge, keep the feature untouched.
    let annual = terms.iter().find(|c| c.fields == term("annual", 12, 70)).unwrap();
    let activation = charges[0].id;
    let feature_row = store
        .list_children(plan_id, ChildKind::FeatureFlag)
        .await
        .unwrap()[0]
        .clone();

    let mut plan = store.get_plan(plan_id).await.unwrap().unwrap();
    plan.base_amount = BigDecimal::from(85);

    let outcome = reconciler
        .update_plan(
            plan,
            ProposedChildren {
                terms: vec![
                    ProposedChild::existing(annual.id, term("annual", 12, 65)),
                    ProposedChild::new(term("quarterly", 3, 90)),
                ],
                charges: vec![
                    ProposedChild::existing(activation, charge("activation", 150)).selected(false),
                ],
                features: vec![
                    ProposedChild::existing(feature_row.id, feature("driver_id", 12)).selected(true),
                ],
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.stats[0].updated, 1);
    assert_eq!(outcome.stats[0].inserted, 1);
    assert_eq!(outcome.stats[0].deleted, 1);
    assert_eq!(outcome.stats[1].deleted, 1);
    assert_eq!(outcome.stats[2].updated, 1);

    let terms = store
        .list_children(plan_id, ChildKind::SubscriptionTerm)
        .await
        .unwrap();
    assert_eq!(terms.len(), 2);
    assert!(terms.iter().any(|c| c.fields == term("annual", 12, 65)));
    assert!(terms.iter().any(|c| c.fields == term("quarterly", 3, 90)));
    assert!(store
        .list_children(plan_id, ChildKind::ChargeRule)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .list_children(plan_id, ChildKind::FeatureFlag)
            .await
            .unwrap()[0]
            .fields,
        feature("driver_id", 12)
    );
    assert_eq!(
        store.get_plan(plan_id).await.unwrap().unwrap().base_amount,
        BigDecimal::from(85)
    );
}

#[tokio::test]
async fn test_apply_failure_reverts_earlier_kinds() {
    let store = MemoryStore::new();
    let reconciler = PlanReconciler::new(store.clone());

    let outcome = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![ProposedChild::new(term("annual", 12, 70))],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let plan_id = outcome.plan_id;

    // A diff whose first kind succeeds and whose second kind targets a row
    // that does not exist.
    let diffs = vec![
        ChildDiff {
            kind: ChildKind::SubscriptionTerm,
            to_insert: vec![term("quarterly", 3, 90)],
            to_update: vec![],
            to_delete: vec![],
        },
        ChildDiff {
            kind: ChildKind::ChargeRule,
            to_insert: vec![],
            to_update: vec![],
            to_delete: vec![999],
        },
    ];

    let mut tx = store.begin().await.unwrap();
    let err = apply_child_diffs(&mut tx, plan_id, &diffs).await.unwrap_err();
    assert!(matches!(err, BillingError::ConcurrentModification(_)));
    tx.rollback().await.unwrap();

    // The term inserted by the first kind never reached the store.
    let terms = store
        .list_children(plan_id, ChildKind::SubscriptionTerm)
        .await
        .unwrap();
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].fields, term("annual", 12, 70));
}

#[tokio::test]
async fn test_vanished_child_is_detected_as_conflict() {
    let store = MemoryStore::new();
    let reconciler = PlanReconciler::new(store.clone());

    let outcome = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![ProposedChild::new(term("annual", 12, 70))],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let plan_id = outcome.plan_id;
    let term_id = store
        .list_children(plan_id, ChildKind::SubscriptionTerm)
        .await
        .unwrap()[0]
        .id;

    // Another session removes the term before our edit lands.
    let mut tx = store.begin().await.unwrap();
    tx.delete_child(ChildKind::SubscriptionTerm, term_id)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut plan = store.get_plan(plan_id).await.unwrap().unwrap();
    plan.name = "Fleet tracking v2".to_string();
    let err = reconciler
        .update_plan(
            plan,
            ProposedChildren {
                terms: vec![ProposedChild::existing(term_id, term("annual", 12, 65))],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::ConcurrentModification(_)));
    // The parent update rolled back with the rest.
    assert_eq!(
        store.get_plan(plan_id).await.unwrap().unwrap().name,
        "Fleet tracking"
    );
}

#[tokio::test]
async fn test_entry_attachment_window() {
    let store = MemoryStore::new();
    let recalculator = store.recalculator();
    let manager =
        EntryManager::new(store.clone()).with_recalculator(Arc::new(recalculator.clone()));

    let invoice_id = store.seed_invoice(
        1,
        7,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        InvoiceStatus::UnderAnalysis,
    );

    // Dated on the last day of the period: attaches.
    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(120),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(commit.invoice_id, Some(invoice_id));
    assert_eq!(commit.recompute, vec![RecomputeStatus::Completed { invoice_id }]);
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(120)
    );

    // Dated one day past the period end: stays unattached.
    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Chip swap".to_string(),
            amount: BigDecimal::from(30),
            billing_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(commit.invoice_id, None);
    assert!(commit.recompute.is_empty());

    // No open invoice for this installation: never attaches.
    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 8,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(120),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(commit.invoice_id, None);
}

#[tokio::test]
async fn test_entry_update_and_delete_recompute_invoice() {
    let store = MemoryStore::new();
    let recalculator = store.recalculator();
    let manager =
        EntryManager::new(store.clone()).with_recalculator(Arc::new(recalculator.clone()));

    let invoice_id = store.seed_invoice(
        1,
        7,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        InvoiceStatus::UnderAnalysis,
    );

    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(120),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        })
        .await
        .unwrap();

    // Repricing the entry keeps the attachment and refreshes the total.
    let mut entry = store.get_entry(commit.entry_id).await.unwrap().unwrap();
    entry.amount = BigDecimal::from(150);
    let updated = manager.update_entry(entry).await.unwrap();
    assert_eq!(updated.invoice_id, Some(invoice_id));
    assert_eq!(updated.recompute, vec![RecomputeStatus::Completed { invoice_id }]);
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(150)
    );

    // Moving the billing date past the window detaches the entry and the
    // formerly linked invoice is recomputed back down.
    let mut entry = store.get_entry(commit.entry_id).await.unwrap().unwrap();
    entry.billing_date = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();
    let updated = manager.update_entry(entry).await.unwrap();
    assert_eq!(updated.invoice_id, None);
    assert_eq!(updated.recompute, vec![RecomputeStatus::Completed { invoice_id }]);
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(0)
    );

    // Re-attach, then delete: the invoice total drops again.
    let mut entry = store.get_entry(commit.entry_id).await.unwrap().unwrap();
    entry.billing_date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
    manager.update_entry(entry).await.unwrap();
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(150)
    );

    let deleted = manager.delete_entry(commit.entry_id).await.unwrap();
    assert_eq!(deleted.recompute, vec![RecomputeStatus::Completed { invoice_id }]);
    assert!(store.get_entry(commit.entry_id).await.unwrap().is_none());
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(0)
    );
}

#[tokio::test]
async fn test_recompute_failure_is_degraded_success() {
    let store = MemoryStore::new();
    let recalculator = store.recalculator();
    let manager =
        EntryManager::new(store.clone()).with_recalculator(Arc::new(recalculator.clone()));

    let invoice_id = store.seed_invoice(
        1,
        7,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        InvoiceStatus::UnderAnalysis,
    );
    recalculator.set_fail(true);

    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(120),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        })
        .await
        .unwrap();

    // The write committed; only the recompute stage failed.
    assert!(matches!(
        commit.recompute.as_slice(),
        [RecomputeStatus::Failed { .. }]
    ));
    assert!(store.get_entry(commit.entry_id).await.unwrap().is_some());
    assert_eq!(
        store.get_invoice(invoice_id).await.unwrap().unwrap().total,
        BigDecimal::from(0)
    );
}

#[tokio::test]
async fn test_plan_edit_recomputes_open_invoice() {
    let store = MemoryStore::new();
    let recalculator = store.recalculator();
    let reconciler = PlanReconciler::new(store.clone())
        .with_recalculator(Arc::new(recalculator.clone()));

    let invoice_id = store.seed_invoice(
        1,
        7,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        InvoiceStatus::UnderAnalysis,
    );

    let outcome = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.recompute, RecomputeStatus::Completed { invoice_id });
    assert_eq!(recalculator.calls(), vec![(1, invoice_id)]);
}

#[tokio::test]
async fn test_validation_failures_leave_store_untouched() {
    let store = MemoryStore::new();
    let reconciler = PlanReconciler::with_validators(
        store.clone(),
        Box::new(EnhancedPlanValidator),
        Box::new(EnhancedChildValidator),
    );
    let manager = EntryManager::with_validator(store.clone(), Box::new(EnhancedEntryValidator));

    let err = reconciler
        .create_plan(
            PlanDraft::new(1, "  ".to_string(), BigDecimal::from(80)),
            ProposedChildren::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    let err = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![ProposedChild::new(term("annual", 0, 70))],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    let err = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(-5),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    assert!(store.list_plans(None).await.unwrap().is_empty());
    assert!(store.list_entries(7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_plan_rejects_preassigned_identities() {
    let store = MemoryStore::new();
    let reconciler = PlanReconciler::new(store.clone());

    let err = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![ProposedChild::existing(3, term("annual", 12, 70))],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert!(store.list_plans(None).await.unwrap().is_empty());
}
