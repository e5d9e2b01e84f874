use crate::domain::transaction::{Category, Transaction, TransactionStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ReportRow<'a> {
    transaction: &'a str,
    category: Category,
    wallet: &'a str,
    amount: Decimal,
    status: TransactionStatus,
    retry_count: u32,
    retry_exhausted: bool,
    final_failure_reason: Option<&'a str>,
}

/// Writes one line per transaction with its retry outcome.
pub struct TransactionReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TransactionReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_transactions<'a, I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.writer.serialize(ReportRow {
                transaction: &tx.id,
                category: tx.category(),
                wallet: &tx.wallet_id,
                amount: tx.amount.value().normalize(),
                status: tx.status,
                retry_count: tx.metadata.retry_count,
                retry_exhausted: tx.metadata.retry_exhausted,
                final_failure_reason: tx.metadata.final_failure_reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::SettlementDetails;
    use crate::domain::wallet::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_rows() {
        let mut done = Transaction::new(
            "fund-1",
            "alice",
            Amount::new(dec!(50.0)).unwrap(),
            SettlementDetails::Funding {
                gateway_reference: Some("ref".to_string()),
            },
        );
        done.status = TransactionStatus::Completed;
        done.metadata.retry_count = 1;

        let mut dead = Transaction::new(
            "bet-1",
            "bob",
            Amount::new(dec!(5)).unwrap(),
            SettlementDetails::Betting { bet: None },
        );
        dead.status = TransactionStatus::Failed;
        dead.metadata.retry_count = 3;
        dead.metadata.retry_exhausted = true;
        dead.metadata.final_failure_reason = Some("Bet slip required for betting retry".to_string());

        let mut out = Vec::new();
        TransactionReportWriter::new(&mut out)
            .write_transactions([&done, &dead])
            .unwrap();
        let output = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "transaction,category,wallet,amount,status,retry_count,retry_exhausted,final_failure_reason"
        );
        assert_eq!(lines[1], "fund-1,funding,alice,50,completed,1,false,");
        assert_eq!(
            lines[2],
            "bet-1,betting,bob,5,failed,3,true,Bet slip required for betting retry"
        );
    }
}
