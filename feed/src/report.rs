//! Monthly audit report over transfer records.
//!
//! Groups the audit trail by source account and calendar month, producing
//! the per-group sum and count. The equivalent of running an aggregation
//! pipeline (group by `(from, year, month)`, sum amounts, sort) over the
//! transfer collection.

use chrono::Datelike;
use docledger_core::account::AccountId;
use docledger_core::transfer::TransferRecord;
use std::collections::BTreeMap;
use std::fmt;

/// Totals for one source account in one calendar month.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthlyTotal {
    /// The account the transfers were sent from.
    pub account: AccountId,
    /// Calendar year of the transfers.
    pub year: i32,
    /// Calendar month of the transfers (1-12).
    pub month: u32,
    /// Sum of the amounts transferred.
    pub total: u64,
    /// Number of transfers.
    pub count: u64,
}

impl fmt::Display for MonthlyTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04}-{:02}: {} across {} transfer(s)",
            self.account, self.year, self.month, self.total, self.count
        )
    }
}

/// Summarize transfer records per source account and month.
///
/// Results are sorted by account, then year, then month.
#[must_use]
pub fn monthly_totals(records: &[TransferRecord]) -> Vec<MonthlyTotal> {
    let mut groups: BTreeMap<(AccountId, i32, u32), (u64, u64)> = BTreeMap::new();
    for record in records {
        let key = (
            record.from.clone(),
            record.timestamp.year(),
            record.timestamp.month(),
        );
        let entry = groups.entry(key).or_insert((0, 0));
        entry.0 += record.amount.units();
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|((account, year, month), (total, count))| MonthlyTotal {
            account,
            year,
            month,
            total,
            count,
        })
        .collect()
}
