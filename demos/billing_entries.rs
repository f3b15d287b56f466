//! Billing entries and open-invoice attachment example

use std::sync::Arc;

use billing_core::utils::MemoryStore;
use billing_core::{BillingStore, EntryDraft, EntryManager, InvoiceStatus};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Billing Core - Billing Entries Example\n");

    let store = MemoryStore::new();
    let recalculator = store.recalculator();
    let manager = EntryManager::new(store.clone()).with_recalculator(Arc::new(recalculator));

    // 1. An invoice is under analysis for installation 7, covering March
    println!("📅 Opening March invoice for installation 7...");
    let invoice_id = store.seed_invoice(
        1,
        7,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        InvoiceStatus::UnderAnalysis,
    );
    println!("  ✓ Invoice {invoice_id} open until 2024-03-31\n");

    // 2. A charge dated inside the window attaches to it
    println!("💰 Recording a charge dated 2024-03-20...");
    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Antenna replacement".to_string(),
            amount: BigDecimal::from(120),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
        })
        .await?;
    println!("  ✓ Entry {} attached to invoice {:?}", commit.entry_id, commit.invoice_id);

    // 3. A charge dated past the window stays unattached
    println!("💰 Recording a charge dated 2024-04-02...");
    let commit = manager
        .record_entry(EntryDraft {
            contractor_id: 1,
            installation_id: 7,
            description: "Chip swap".to_string(),
            amount: BigDecimal::from(30),
            billing_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        })
        .await?;
    println!(
        "  ✓ Entry {} left for a future cycle (attached: {:?})\n",
        commit.entry_id, commit.invoice_id
    );

    // 4. The invoice total reflects only the attached charge
    let invoice = store.get_invoice(invoice_id).await?.unwrap();
    println!("📈 Invoice {invoice_id} total after recompute: {}", invoice.total);

    println!("\n🎉 Example completed successfully!");
    Ok(())
}
