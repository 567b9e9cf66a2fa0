use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talentbill_core::{InvoiceId, Money, PaymentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cash,
    PaymentProcessor,
    Other,
}

/// A payment recorded against an invoice. Payments are never retracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub method: PaymentMethod,
    /// Bank or processor reference, if the payer supplied one.
    pub reference: Option<String>,
}

impl Payment {
    pub fn new(
        invoice_id: InvoiceId,
        amount: Money,
        paid_at: DateTime<Utc>,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            invoice_id,
            amount,
            paid_at,
            method,
            reference,
        }
    }
}
