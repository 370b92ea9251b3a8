//! In-process ledger
//!
//! Mirrors the stored procedures of the PostgreSQL schema so the service can
//! run, and be tested, without a database. All state sits behind one mutex;
//! each operation validates first and mutates only once it cannot fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::domain::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto, HistoryRow,
    HistorySortKey, Money, MonthlyReportRow, RecognizeRevenueDto, ReplenishBalanceDto,
    ReserveMoneyDto,
};

use super::{BalanceStore, StoreError, StoreResult};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// (user_id, service_id, order_id)
type TransactionKey = (i64, i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionStatus {
    Reserved,
    Recognized,
    Cancelled,
}

#[derive(Debug, Clone)]
struct Transaction {
    amount: Money,
    status: TransactionStatus,
    recognized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    id: u64,
    user_id: i64,
    timestamp: DateTime<Utc>,
    amount: Money,
    description: String,
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<i64, Money>,
    services: HashMap<i64, String>,
    transactions: BTreeMap<TransactionKey, Transaction>,
    history: Vec<HistoryEntry>,
    next_history_id: u64,
}

impl Ledger {
    fn record(&mut self, user_id: i64, timestamp: DateTime<Utc>, amount: Money, description: String) {
        self.next_history_id += 1;
        self.history.push(HistoryEntry {
            id: self.next_history_id,
            user_id,
            timestamp,
            amount,
            description,
        });
    }
}

fn overflow() -> StoreError {
    StoreError::Backend("balance out of range".to_string())
}

/// `balance + amount`, bounded like the `NUMERIC(14, 2)` balance column
fn credit(balance: Money, amount: Money) -> StoreResult<Money> {
    balance
        .checked_add(amount)
        .filter(|updated| *updated <= Money::MAX)
        .ok_or_else(StoreError::balance_limit_exceeded)
}

/// Start of the month and start of the following month, in UTC
fn month_bounds(year: i32, month: i32) -> StoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = || StoreError::Backend(format!("invalid report period {year}-{month}"));
    let month = u32::try_from(month).map_err(|_| invalid())?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid)?;
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid)?;
    Ok((start, end))
}

/// Ledger kept in memory for the lifetime of the process
pub struct MemoryBalanceStore {
    ledger: Mutex<Ledger>,
    clock: Clock,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Use `clock` for every timestamp the store records
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            ledger: Mutex::new(Ledger::default()),
            clock: Arc::new(clock),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBalanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBalanceStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_balance(&self, dto: &GetBalanceDto) -> StoreResult<Money> {
        self.ledger
            .lock()
            .balances
            .get(&dto.user_id)
            .copied()
            .ok_or_else(StoreError::unknown_user)
    }

    async fn replenish_balance(&self, dto: &ReplenishBalanceDto) -> StoreResult<()> {
        let now = self.now();
        let mut ledger = self.ledger.lock();

        let current = ledger.balances.get(&dto.user_id).copied().unwrap_or_default();
        let updated = credit(current, dto.amount)?;

        ledger.balances.insert(dto.user_id, updated);
        ledger.record(
            dto.user_id,
            now,
            dto.amount,
            dto.description.clone().unwrap_or_default(),
        );
        Ok(())
    }

    async fn reserve_money(&self, dto: &ReserveMoneyDto) -> StoreResult<()> {
        let now = self.now();
        let mut ledger = self.ledger.lock();
        let key = (dto.user_id, dto.service_id, dto.order_id);

        let balance = ledger
            .balances
            .get(&dto.user_id)
            .copied()
            .ok_or_else(StoreError::unknown_user)?;
        if ledger.transactions.contains_key(&key) {
            return Err(StoreError::duplicate_transaction());
        }
        if balance < dto.amount {
            return Err(StoreError::insufficient_funds());
        }
        let remaining = balance.checked_sub(dto.amount).ok_or_else(overflow)?;
        let debit = dto.amount.checked_neg().ok_or_else(overflow)?;

        ledger.balances.insert(dto.user_id, remaining);
        ledger.transactions.insert(
            key,
            Transaction {
                amount: dto.amount,
                status: TransactionStatus::Reserved,
                recognized_at: None,
            },
        );
        ledger.record(
            dto.user_id,
            now,
            debit,
            dto.description.clone().unwrap_or_default(),
        );
        if let Some(name) = dto.service_name() {
            ledger.services.insert(dto.service_id, name.to_string());
        }
        Ok(())
    }

    async fn recognize_revenue(&self, dto: &RecognizeRevenueDto) -> StoreResult<()> {
        let now = self.now();
        let mut ledger = self.ledger.lock();

        match ledger
            .transactions
            .get_mut(&(dto.user_id, dto.service_id, dto.order_id))
        {
            Some(tx) if tx.status == TransactionStatus::Reserved && tx.amount == dto.amount => {
                tx.status = TransactionStatus::Recognized;
                tx.recognized_at = Some(now);
                Ok(())
            }
            _ => Err(StoreError::unknown_transaction()),
        }
    }

    async fn cancel_transaction(&self, dto: &CancelTransactionDto) -> StoreResult<()> {
        let now = self.now();
        let mut ledger = self.ledger.lock();
        let key = (dto.user_id, dto.service_id, dto.order_id);

        let amount = match ledger.transactions.get(&key) {
            Some(tx) if tx.status == TransactionStatus::Reserved => tx.amount,
            _ => return Err(StoreError::unknown_transaction()),
        };
        let balance = ledger
            .balances
            .get(&dto.user_id)
            .copied()
            .ok_or_else(StoreError::unknown_transaction)?;
        let refunded = credit(balance, amount)?;

        ledger.balances.insert(dto.user_id, refunded);
        if let Some(tx) = ledger.transactions.get_mut(&key) {
            tx.status = TransactionStatus::Cancelled;
        }
        ledger.record(
            dto.user_id,
            now,
            amount,
            format!(
                "Cancelled reservation for order {} of service {}",
                dto.order_id, dto.service_id
            ),
        );
        Ok(())
    }

    async fn get_history(&self, dto: &GetHistoryDto) -> StoreResult<Vec<HistoryRow>> {
        let ledger = self.ledger.lock();
        if !ledger.balances.contains_key(&dto.user_id) {
            return Err(StoreError::unknown_user());
        }

        let mut entries: Vec<&HistoryEntry> = ledger
            .history
            .iter()
            .filter(|entry| entry.user_id == dto.user_id)
            .collect();
        match dto.sort_by {
            HistorySortKey::Timestamp => entries.sort_by_key(|e| (e.timestamp, e.id)),
            HistorySortKey::Amount => entries.sort_by_key(|e| (e.amount, e.id)),
        }
        if dto.reverse {
            entries.reverse();
        }

        let offset = usize::try_from(dto.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(dto.limit).unwrap_or(usize::MAX);
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| HistoryRow {
                timestamp: entry.timestamp,
                amount: entry.amount,
                description: entry.description.clone(),
            })
            .collect())
    }

    async fn get_monthly_report(
        &self,
        dto: &GetMonthlyReportDto,
    ) -> StoreResult<Vec<MonthlyReportRow>> {
        let (start, end) = month_bounds(dto.year, dto.month)?;
        let ledger = self.ledger.lock();

        let mut revenue: BTreeMap<i64, Money> = BTreeMap::new();
        for (&(_, service_id, _), tx) in &ledger.transactions {
            let in_month = tx
                .recognized_at
                .map_or(false, |at| at >= start && at < end);
            if tx.status != TransactionStatus::Recognized || !in_month {
                continue;
            }
            let total = revenue.entry(service_id).or_default();
            *total = total.checked_add(tx.amount).ok_or_else(overflow)?;
        }

        let mut rows: Vec<(String, i64, Money)> = revenue
            .into_iter()
            .map(|(service_id, total)| {
                let name = ledger
                    .services
                    .get(&service_id)
                    .cloned()
                    .unwrap_or_else(|| format!("service {service_id}"));
                (name, service_id, total)
            })
            .collect();
        rows.sort();

        Ok(rows
            .into_iter()
            .map(|(service_name, _, revenue)| MonthlyReportRow {
                service_name,
                revenue,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    /// Clock that advances one second per reading, starting at `start`
    fn ticking_store(start: DateTime<Utc>) -> MemoryBalanceStore {
        let ticks = AtomicI64::new(0);
        MemoryBalanceStore::with_clock(move || {
            start + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst))
        })
    }

    async fn funded(user_id: i64, amount: &str) -> MemoryBalanceStore {
        let store = MemoryBalanceStore::new();
        store
            .replenish_balance(&ReplenishBalanceDto::new(user_id, money(amount)))
            .await
            .unwrap();
        store
    }

    async fn balance(store: &MemoryBalanceStore, user_id: i64) -> Money {
        store.get_balance(&GetBalanceDto::new(user_id)).await.unwrap()
    }

    async fn page(store: &MemoryBalanceStore, dto: GetHistoryDto) -> Vec<HistoryRow> {
        store.get_history(&dto).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_user_balance() {
        let store = MemoryBalanceStore::new();
        let err = store.get_balance(&GetBalanceDto::new(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser { .. }));
    }

    #[tokio::test]
    async fn test_replenish_accumulates() {
        let store = funded(1, "100").await;
        store
            .replenish_balance(&ReplenishBalanceDto::new(1, money("0.50")))
            .await
            .unwrap();
        assert_eq!(balance(&store, 1).await, money("100.50"));
    }

    #[tokio::test]
    async fn test_balance_is_bounded_by_column_size() {
        let store = MemoryBalanceStore::new();
        store
            .replenish_balance(&ReplenishBalanceDto::new(1, Money::MAX))
            .await
            .unwrap();

        let err = store
            .replenish_balance(&ReplenishBalanceDto::new(1, money("0.01")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimitExceeded { .. }));
        assert_eq!(balance(&store, 1).await, Money::MAX);

        // A refund that no longer fits is rejected and the reservation stays
        store
            .reserve_money(&ReserveMoneyDto::new(1, money("10"), 1, 1))
            .await
            .unwrap();
        store
            .replenish_balance(&ReplenishBalanceDto::new(1, money("10")))
            .await
            .unwrap();
        let err = store
            .cancel_transaction(&CancelTransactionDto::new(1, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimitExceeded { .. }));
        store
            .recognize_revenue(&RecognizeRevenueDto::new(1, money("10"), 1, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserve_debits_and_blocks_duplicates() {
        let store = funded(1, "100").await;
        let dto = ReserveMoneyDto::new(1, money("30"), 2, 3);

        store.reserve_money(&dto).await.unwrap();
        assert_eq!(balance(&store, 1).await, money("70"));

        let err = store.reserve_money(&dto).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTransaction { .. }));
        assert_eq!(balance(&store, 1).await, money("70"));
    }

    #[tokio::test]
    async fn test_reserve_requires_funds_and_user() {
        let store = funded(1, "10").await;

        let err = store
            .reserve_money(&ReserveMoneyDto::new(1, money("10.01"), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));
        assert_eq!(balance(&store, 1).await, money("10"));

        let err = store
            .reserve_money(&ReserveMoneyDto::new(2, money("1"), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser { .. }));

        // Exact balance may be reserved
        store
            .reserve_money(&ReserveMoneyDto::new(1, money("10"), 1, 1))
            .await
            .unwrap();
        assert_eq!(balance(&store, 1).await, Money::ZERO);
    }

    #[tokio::test]
    async fn test_recognize_requires_matching_pending_reservation() {
        let store = funded(1, "100").await;
        store
            .reserve_money(&ReserveMoneyDto::new(1, money("30"), 2, 3))
            .await
            .unwrap();

        let wrong_amount = RecognizeRevenueDto::new(1, money("29.99"), 2, 3);
        let err = store.recognize_revenue(&wrong_amount).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTransaction { .. }));

        let dto = RecognizeRevenueDto::new(1, money("30"), 2, 3);
        store.recognize_revenue(&dto).await.unwrap();

        let err = store.recognize_revenue(&dto).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTransaction { .. }));
        assert_eq!(balance(&store, 1).await, money("70"));
    }

    #[tokio::test]
    async fn test_cancel_refunds_once() {
        let store = funded(1, "100").await;
        store
            .reserve_money(&ReserveMoneyDto::new(1, money("30"), 2, 3))
            .await
            .unwrap();

        let dto = CancelTransactionDto::new(1, 2, 3);
        store.cancel_transaction(&dto).await.unwrap();
        assert_eq!(balance(&store, 1).await, money("100"));

        let err = store.cancel_transaction(&dto).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTransaction { .. }));

        // A cancelled key stays taken
        let err = store
            .reserve_money(&ReserveMoneyDto::new(1, money("30"), 2, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTransaction { .. }));
    }

    #[tokio::test]
    async fn test_recognized_reservation_cannot_be_cancelled() {
        let store = funded(1, "100").await;
        store
            .reserve_money(&ReserveMoneyDto::new(1, money("30"), 2, 3))
            .await
            .unwrap();
        store
            .recognize_revenue(&RecognizeRevenueDto::new(1, money("30"), 2, 3))
            .await
            .unwrap();

        let err = store
            .cancel_transaction(&CancelTransactionDto::new(1, 2, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTransaction { .. }));
    }

    #[tokio::test]
    async fn test_history_ordering_and_paging() {
        let start = Utc.with_ymd_and_hms(2022, 11, 1, 10, 0, 0).unwrap();
        let store = ticking_store(start);
        store
            .replenish_balance(
                &ReplenishBalanceDto::new(1, money("100")).with_description("top up".to_string()),
            )
            .await
            .unwrap();
        store
            .reserve_money(
                &ReserveMoneyDto::new(1, money("30"), 2, 3).with_description("order".to_string()),
            )
            .await
            .unwrap();
        store
            .cancel_transaction(&CancelTransactionDto::new(1, 2, 3))
            .await
            .unwrap();

        let rows = page(&store, GetHistoryDto::new(1).with_page(0, 10)).await;
        let amounts: Vec<String> = rows.iter().map(|r| r.amount.to_string()).collect();
        assert_eq!(amounts, ["100.00", "-30.00", "30.00"]);
        assert_eq!(rows[0].timestamp, start);
        assert_eq!(
            rows[2].description,
            "Cancelled reservation for order 3 of service 2"
        );

        let rows = page(
            &store,
            GetHistoryDto::new(1)
                .with_page(0, 10)
                .sorted_by(HistorySortKey::Amount, true),
        )
        .await;
        let amounts: Vec<String> = rows.iter().map(|r| r.amount.to_string()).collect();
        assert_eq!(amounts, ["100.00", "30.00", "-30.00"]);

        let rows = page(&store, GetHistoryDto::new(1).with_page(1, 1)).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, money("-30"));

        let rows = page(&store, GetHistoryDto::new(1).with_page(5, 10)).await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_history_of_unknown_user() {
        let store = MemoryBalanceStore::new();
        let err = store
            .get_history(&GetHistoryDto::new(9).with_page(0, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser { .. }));
    }

    #[tokio::test]
    async fn test_monthly_report_groups_by_service() {
        let november = Utc.with_ymd_and_hms(2022, 11, 30, 23, 59, 0).unwrap();
        let store = ticking_store(november);
        store
            .replenish_balance(&ReplenishBalanceDto::new(1, money("1000")))
            .await
            .unwrap();

        for (service_id, order_id, amount, name) in [
            (1, 1, "10", Some("Delivery")),
            (1, 2, "5.50", None),
            (2, 3, "7", None),
            (3, 4, "100", None),
        ] {
            let mut dto = ReserveMoneyDto::new(1, money(amount), service_id, order_id);
            if let Some(name) = name {
                dto = dto.with_service_name(name.to_string());
            }
            store.reserve_money(&dto).await.unwrap();
        }
        for (service_id, order_id, amount) in [(1, 1, "10"), (1, 2, "5.50"), (2, 3, "7")] {
            store
                .recognize_revenue(&RecognizeRevenueDto::new(1, money(amount), service_id, order_id))
                .await
                .unwrap();
        }

        let report = store
            .get_monthly_report(&GetMonthlyReportDto::new(2022, 11))
            .await
            .unwrap();
        assert_eq!(
            report,
            vec![
                MonthlyReportRow {
                    service_name: "Delivery".to_string(),
                    revenue: money("15.50"),
                },
                MonthlyReportRow {
                    service_name: "service 2".to_string(),
                    revenue: money("7"),
                },
            ]
        );

        let empty = store
            .get_monthly_report(&GetMonthlyReportDto::new(2022, 12))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_month_bounds_wrap_year() {
        let (start, end) = month_bounds(2022, 12).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert!(month_bounds(2022, 0).is_err());
    }
}
