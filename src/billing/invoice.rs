//! Open-invoice attachment window

use chrono::NaiveDate;

use crate::types::*;

impl Invoice {
    /// Whether the invoice is still open for new line items
    pub fn is_open(&self) -> bool {
        self.status == InvoiceStatus::UnderAnalysis
    }

    /// Whether a line item with this billing date attaches to the invoice
    ///
    /// A line item attaches if and only if the invoice is open and the
    /// billing date does not fall past the end of the billing period. Dates
    /// before the period start still attach: late-registered charges belong
    /// to the invoice currently under analysis.
    pub fn accepts(&self, billing_date: NaiveDate) -> bool {
        self.is_open() && billing_date <= self.period_end
    }
}

/// Decide which invoice, if any, a billing date attaches to
pub fn attachment_target(open_invoice: Option<&Invoice>, billing_date: NaiveDate) -> Option<InvoiceId> {
    open_invoice
        .filter(|invoice| invoice.accepts(billing_date))
        .map(|invoice| invoice.id)
}
