use crate::domain::payment::Payment;
use crate::error::Result;
use std::io::Write;

/// Writes payment rows as CSV, for the ledger export.
pub struct PaymentsWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentsWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments(&mut self, payments: Vec<Payment>) -> Result<()> {
        self.writer.write_record([
            "id",
            "user",
            "course",
            "amount",
            "currency",
            "status",
            "order_handle",
            "transaction_id",
            "receipt",
            "failure_reason",
        ])?;
        for payment in payments {
            self.writer.write_record([
                payment.id.to_string(),
                payment.user.to_string(),
                payment.course.to_string(),
                payment.amount.to_string(),
                payment.currency,
                payment.status.to_string(),
                payment.order_handle,
                payment.transaction_id.unwrap_or_default(),
                payment.receipt,
                payment.failure_reason.unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
