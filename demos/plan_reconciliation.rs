//! Plan reconciliation usage example

use billing_core::utils::MemoryStore;
use billing_core::{
    BillingStore, ChargeFields, ChargeRecurrence, ChildFields, ChildKind, FeatureFields,
    PlanDraft, PlanReconciler, ProposedChild, ProposedChildren, TermFields,
};
use bigdecimal::BigDecimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("📋 Billing Core - Plan Reconciliation Example\n");

    let store = MemoryStore::new();
    let reconciler = PlanReconciler::new(store.clone());

    // 1. Create a plan with its child collections
    println!("🛠️  Creating a tracking plan...");
    let outcome = reconciler
        .create_plan(
            PlanDraft::new(1, "Fleet tracking".to_string(), BigDecimal::from(80)),
            ProposedChildren {
                terms: vec![
                    ProposedChild::new(ChildFields::Term(TermFields {
                        label: "annual".to_string(),
                        months: 12,
                        monthly_amount: BigDecimal::from(70),
                    })),
                    ProposedChild::new(ChildFields::Term(TermFields {
                        label: "monthly".to_string(),
                        months: 1,
                        monthly_amount: BigDecimal::from(95),
                    })),
                ],
                charges: vec![
                    ProposedChild::new(ChildFields::Charge(ChargeFields {
                        description: "activation".to_string(),
                        amount: BigDecimal::from(150),
                        recurrence: ChargeRecurrence::OneTime,
                    }))
                    .selected(true),
                ],
                features: vec![
                    ProposedChild::new(ChildFields::Feature(FeatureFields {
                        code: "driver_id".to_string(),
                        label: "Driver identification".to_string(),
                        monthly_amount: BigDecimal::from(10),
                    }))
                    .selected(true),
                ],
            },
        )
        .await?;

    let plan_id = outcome.plan_id;
    for stats in &outcome.stats {
        println!(
            "  ✓ {:?}: {} inserted, {} updated, {} deleted",
            stats.kind, stats.inserted, stats.updated, stats.deleted
        );
    }
    println!();

    // 2. Edit the plan: reprice the annual term, drop the monthly one,
    //    deselect the activation charge
    println!("✏️  Reconciling an edit...");
    let terms = store
        .list_children(plan_id, ChildKind::SubscriptionTerm)
        .await?;
    let annual = terms.iter().find(|c| match &c.fields {
        ChildFields::Term(t) => t.label == "annual",
        _ => false,
    });
    let charges = store.list_children(plan_id, ChildKind::ChargeRule).await?;
    let plan = store.get_plan(plan_id).await?.unwrap();

    let outcome = reconciler
        .update_plan(
            plan,
            ProposedChildren {
                terms: vec![ProposedChild::existing(
                    annual.unwrap().id,
                    ChildFields::Term(TermFields {
                        label: "annual".to_string(),
                        months: 12,
                        monthly_amount: BigDecimal::from(65),
                    }),
                )],
                charges: vec![ProposedChild::existing(
                    charges[0].id,
                    charges[0].fields.clone(),
                )
                .selected(false)],
                features: vec![],
            },
        )
        .await?;

    for stats in &outcome.stats {
        println!(
            "  ✓ {:?}: {} inserted, {} updated, {} deleted",
            stats.kind, stats.inserted, stats.updated, stats.deleted
        );
    }
    println!();

    // 3. Show the resulting state
    println!("🔍 Persisted child rows after the edit:");
    for kind in ChildKind::APPLY_ORDER {
        let rows = store.list_children(plan_id, kind).await?;
        println!("  {kind}: {} row(s)", rows.len());
        for row in rows {
            println!("    - {:?}", row.fields);
        }
    }

    println!("\n🎉 Example completed successfully!");
    Ok(())
}
