use crate::domain::wallet::Wallet;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRow<'a> {
    wallet: &'a str,
    balance: Decimal,
}

/// Writes final wallet balances as `wallet,balance` CSV.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: &[Wallet]) -> Result<()> {
        if wallets.is_empty() {
            self.writer.write_record(["wallet", "balance"])?;
        }
        for wallet in wallets {
            self.writer.serialize(WalletRow {
                wallet: &wallet.id,
                balance: wallet.balance().0.normalize(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
