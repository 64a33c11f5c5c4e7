//! The transaction processor.
//!
//! Every mutating operation follows the same critical-section shape:
//! idempotency fast path → per-user lock (fail fast on contention) → database
//! transaction with a strong balance read → validate → write balance + append
//! ledger row → commit → release lock → invalidate cache → publish event →
//! store the idempotency mapping.
//!
//! The advisory lock only narrows the race window; the row lock taken by
//! `get_or_create_for_update` and the uniqueness constraints on the ledger
//! tables are what make the money invariants hold even if the advisory lock
//! expires mid-operation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use dust_core::{
    next_streak, reward_day, validate_idempotency_key, AppId, Balance, BalanceChanged,
    GrantKind, LedgerError, Transaction, TransactionId, TransactionStatus, TransactionType,
    UserId, INITIAL_GRANT_MAX, STREAK_CYCLE_DAYS, STREAK_GRANT_MAX,
};
use dust_coord::{CoordStore, EventBus, LockManager};
use dust_store::{balances, grants, streaks, transactions, PgStore, StoreError};

/// Result of a committed (or replayed) ledger operation.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    /// The ledger entry.
    pub transaction: Transaction,
    /// Balance before the operation.
    pub balance_before: i64,
    /// Balance after the operation.
    pub balance_after: i64,
}

impl Receipt {
    /// Rebuild a receipt from a previously committed transaction.
    ///
    /// The processor records `balance_after` in transaction metadata at
    /// commit time precisely so a retry can be answered verbatim.
    fn from_committed(transaction: Transaction) -> Self {
        let balance_after = transaction
            .metadata
            .get("balance_after")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(transaction.amount.max(0));
        Self {
            balance_before: balance_after - transaction.amount,
            balance_after,
            transaction,
        }
    }
}

/// Whether an operation committed fresh work or resolved to a prior commit.
enum Applied {
    Committed(Receipt),
    Replayed(Receipt),
}

/// Arguments for [`Ledger::consume`].
#[derive(Debug)]
pub struct ConsumeArgs {
    /// The paying user.
    pub user_id: UserId,
    /// DUST to deduct, strictly positive.
    pub amount: i64,
    /// The consuming app (already validated by the caller).
    pub app_id: AppId,
    /// Human-readable description for the ledger row.
    pub description: String,
    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,
    /// Opaque metadata to attach.
    pub metadata: serde_json::Value,
}

/// Arguments for [`Ledger::grant`].
#[derive(Debug)]
pub struct GrantArgs {
    /// The receiving user.
    pub user_id: UserId,
    /// DUST to credit, strictly positive.
    pub amount: i64,
    /// Reason recorded as the ledger-row description.
    pub description: String,
    /// The granting app, when app-initiated.
    pub app_id: Option<AppId>,
    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,
    /// Opaque metadata to attach.
    pub metadata: serde_json::Value,
}

/// The ledger core: all balance mutations and the cached read path.
pub struct Ledger {
    store: Arc<PgStore>,
    coord: Arc<dyn CoordStore>,
    locks: LockManager,
    events: EventBus,
    balance_cache_ttl: Duration,
    idempotency_ttl: Duration,
}

impl Ledger {
    /// Wire up the processor from its injected collaborators.
    #[must_use]
    pub fn new(
        store: Arc<PgStore>,
        coord: Arc<dyn CoordStore>,
        locks: LockManager,
        events: EventBus,
        balance_cache_ttl: Duration,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            store,
            coord,
            locks,
            events,
            balance_cache_ttl,
            idempotency_ttl,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current balance with pending delta, cache-first.
    ///
    /// Users the ledger has never credited read as a zero balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` on database failure.
    pub async fn balance(&self, user_id: &UserId) -> Result<(Balance, i64), LedgerError> {
        if let Ok(Some(cached)) = self.coord.get_cached_balance(user_id).await {
            let pending = balances::pending_delta(&self.store, user_id).await?;
            return Ok((cached, pending));
        }

        let balance = balances::get(&self.store, user_id)
            .await?
            .unwrap_or_else(|| Balance::empty(*user_id));

        if let Err(e) = self
            .coord
            .set_cached_balance(&balance, self.balance_cache_ttl)
            .await
        {
            tracing::debug!(user_id = %user_id, error = %e, "Balance cache write failed");
        }

        let pending = balances::pending_delta(&self.store, user_id).await?;
        Ok((balance, pending))
    }

    // ========================================================================
    // Consume
    // ========================================================================

    /// Deduct DUST for app usage.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive amount or malformed key,
    /// `InsufficientBalance` when the balance cannot cover the amount,
    /// `Conflict` on lock contention.
    pub async fn consume(&self, args: ConsumeArgs) -> Result<Receipt, LedgerError> {
        if args.amount <= 0 {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        if let Some(key) = &args.idempotency_key {
            validate_idempotency_key(key)?;
            if let Some(receipt) = self.find_replay(key).await? {
                return Ok(receipt);
            }
        }

        let lock = self.locks.acquire(&args.user_id).await?;
        let outcome = self.consume_in_tx(&args).await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn consume_in_tx(&self, args: &ConsumeArgs) -> Result<Applied, LedgerError> {
        let mut tx = self.store.begin().await?;
        let balance = balances::get_or_create_for_update(&mut tx, &args.user_id).await?;

        if balance.amount < args.amount {
            return Err(LedgerError::InsufficientBalance {
                balance: balance.amount,
                required: args.amount,
            });
        }

        let after = balance.amount - args.amount;
        let metadata = embed_balance_after(args.metadata.clone(), after);
        let entry = Transaction::consume(
            args.user_id,
            args.amount,
            args.app_id,
            args.description.clone(),
            metadata,
            args.idempotency_key.clone(),
        );

        balances::set_amount(&mut tx, &args.user_id, after).await?;

        match transactions::insert(&mut tx, &entry).await {
            Ok(()) => {}
            Err(StoreError::DuplicateIdempotencyKey) => {
                // A concurrent retry won the race; answer with its commit.
                drop(tx);
                return self.replay_committed(args.idempotency_key.as_deref()).await;
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    // ========================================================================
    // Grants and purchases
    // ========================================================================

    /// Unconditional credit: admin, referral, promotional.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive amount, `Conflict` on lock contention.
    pub async fn grant(&self, args: GrantArgs) -> Result<Receipt, LedgerError> {
        self.credit(args, TransactionType::Grant).await
    }

    /// Record the DUST effect of an externally verified payment.
    ///
    /// 1 DUST = 1 minor currency unit; the verified paid amount must cover
    /// the requested DUST.
    ///
    /// # Errors
    ///
    /// `Validation` when the payment does not cover the amount.
    pub async fn purchase(
        &self,
        user_id: UserId,
        amount: i64,
        payment_id: &str,
        verified_paid_minor: i64,
        idempotency_key: Option<String>,
    ) -> Result<Receipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        if verified_paid_minor < amount {
            return Err(LedgerError::Validation(format!(
                "verified payment of {verified_paid_minor} does not cover {amount} DUST"
            )));
        }

        self.credit(
            GrantArgs {
                user_id,
                amount,
                description: format!("Purchase of {amount} DUST"),
                app_id: None,
                idempotency_key,
                metadata: serde_json::json!({
                    "payment_id": payment_id,
                    "paid_minor": verified_paid_minor,
                }),
            },
            TransactionType::Purchase,
        )
        .await
    }

    async fn credit(
        &self,
        args: GrantArgs,
        tx_type: TransactionType,
    ) -> Result<Receipt, LedgerError> {
        if args.amount <= 0 {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        if let Some(key) = &args.idempotency_key {
            validate_idempotency_key(key)?;
            if let Some(receipt) = self.find_replay(key).await? {
                return Ok(receipt);
            }
        }

        let lock = self.locks.acquire(&args.user_id).await?;
        let outcome = self.credit_in_tx(&args, tx_type).await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn credit_in_tx(
        &self,
        args: &GrantArgs,
        tx_type: TransactionType,
    ) -> Result<Applied, LedgerError> {
        let mut tx = self.store.begin().await?;
        let balance = balances::get_or_create_for_update(&mut tx, &args.user_id).await?;

        let after = balance.amount + args.amount;
        let metadata = embed_balance_after(args.metadata.clone(), after);
        let entry = if tx_type == TransactionType::Purchase {
            Transaction::purchase(
                args.user_id,
                args.amount,
                args.description.clone(),
                metadata,
                args.idempotency_key.clone(),
            )
        } else {
            Transaction::grant(
                args.user_id,
                args.amount,
                args.description.clone(),
                args.app_id,
                metadata,
                args.idempotency_key.clone(),
            )
        };

        balances::set_amount(&mut tx, &args.user_id, after).await?;

        match transactions::insert(&mut tx, &entry).await {
            Ok(()) => {}
            Err(StoreError::DuplicateIdempotencyKey) => {
                drop(tx);
                return self.replay_committed(args.idempotency_key.as_deref()).await;
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    /// One-time welcome grant for a (user, app) pair.
    ///
    /// Idempotent by construction: if the grant was ever issued, the
    /// original transaction is returned unchanged, whatever idempotency key
    /// the retry carries.
    ///
    /// # Errors
    ///
    /// `Validation` when the amount exceeds [`INITIAL_GRANT_MAX`].
    pub async fn grant_initial(
        &self,
        user_id: UserId,
        app_id: AppId,
        amount: i64,
        idempotency_key: Option<String>,
    ) -> Result<Receipt, LedgerError> {
        if amount <= 0 || amount > INITIAL_GRANT_MAX {
            return Err(LedgerError::Validation(format!(
                "initial grant must be within 1..={INITIAL_GRANT_MAX} DUST"
            )));
        }
        if let Some(key) = &idempotency_key {
            validate_idempotency_key(key)?;
            if let Some(receipt) = self.find_replay(key).await? {
                return Ok(receipt);
            }
        }
        if let Some(receipt) = self.existing_initial_grant(&user_id, &app_id).await? {
            return Ok(receipt);
        }

        let lock = self.locks.acquire(&user_id).await?;
        let outcome = self
            .grant_initial_in_tx(user_id, app_id, amount, idempotency_key.as_deref())
            .await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn grant_initial_in_tx(
        &self,
        user_id: UserId,
        app_id: AppId,
        amount: i64,
        idempotency_key: Option<&str>,
    ) -> Result<Applied, LedgerError> {
        let mut tx = self.store.begin().await?;
        let balance = balances::get_or_create_for_update(&mut tx, &user_id).await?;

        let after = balance.amount + amount;
        let metadata = embed_balance_after(
            serde_json::json!({ "grant_kind": GrantKind::Initial.as_str() }),
            after,
        );
        let entry = Transaction::grant(
            user_id,
            amount,
            format!("Initial grant of {amount} DUST"),
            Some(app_id),
            metadata,
            idempotency_key.map(String::from),
        );

        balances::set_amount(&mut tx, &user_id, after).await?;
        transactions::insert(&mut tx, &entry).await?;

        let grant = grants::new_grant(user_id, app_id, GrantKind::Initial, None, entry.id);
        match grants::insert(&mut tx, &grant).await {
            Ok(()) => {}
            Err(StoreError::DuplicateGrant) => {
                // Lost the race: the rolled-back credit never happened, so
                // answer with the winner's transaction.
                drop(tx);
                return self
                    .existing_initial_grant(&user_id, &app_id)
                    .await?
                    .map(Applied::Replayed)
                    .ok_or_else(|| LedgerError::Conflict("initial grant already issued".into()));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    async fn existing_initial_grant(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Option<Receipt>, LedgerError> {
        let Some(grant) =
            grants::find_one_time(&self.store, user_id, app_id, GrantKind::Initial).await?
        else {
            return Ok(None);
        };
        let original = transactions::get(&self.store, &grant.transaction_id)
            .await?
            .ok_or_else(|| {
                LedgerError::Storage(format!(
                    "app grant references missing transaction {}",
                    grant.transaction_id
                ))
            })?;
        Ok(Some(Receipt::from_committed(original)))
    }

    /// Daily login-streak bonus for a (user, app) pair.
    ///
    /// Recomputes the streak counter inside the same database transaction;
    /// the daily uniqueness index turns a concurrent duplicate claim into a
    /// `Conflict` rather than a double grant.
    ///
    /// # Errors
    ///
    /// `Validation` for an amount over [`STREAK_GRANT_MAX`] or a reward day
    /// outside `1..=5`; `Conflict` when today's bonus was already claimed.
    pub async fn grant_streak(
        &self,
        user_id: UserId,
        app_id: AppId,
        amount: i64,
        streak_days: u32,
        idempotency_key: Option<String>,
    ) -> Result<Receipt, LedgerError> {
        if amount <= 0 || amount > STREAK_GRANT_MAX {
            return Err(LedgerError::Validation(format!(
                "streak bonus must be within 1..={STREAK_GRANT_MAX} DUST"
            )));
        }
        if !(1..=STREAK_CYCLE_DAYS).contains(&streak_days) {
            return Err(LedgerError::Validation(format!(
                "streak_days must be within 1..={STREAK_CYCLE_DAYS}"
            )));
        }
        if let Some(key) = &idempotency_key {
            validate_idempotency_key(key)?;
            if let Some(receipt) = self.find_replay(key).await? {
                return Ok(receipt);
            }
        }

        let today = Utc::now().date_naive();
        if grants::find_daily(&self.store, &user_id, &app_id, GrantKind::Streak, today)
            .await?
            .is_some()
        {
            return Err(LedgerError::Conflict(
                "streak bonus already claimed today".into(),
            ));
        }

        let lock = self.locks.acquire(&user_id).await?;
        let outcome = self
            .grant_streak_in_tx(
                user_id,
                app_id,
                amount,
                streak_days,
                idempotency_key.as_deref(),
            )
            .await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn grant_streak_in_tx(
        &self,
        user_id: UserId,
        app_id: AppId,
        amount: i64,
        claimed_day: u32,
        idempotency_key: Option<&str>,
    ) -> Result<Applied, LedgerError> {
        let today = Utc::now().date_naive();

        let mut tx = self.store.begin().await?;

        let previous = streaks::get_for_update(&mut tx, &user_id).await?;
        let streak = next_streak(previous, today);
        streaks::upsert(&mut tx, &user_id, streak, today).await?;

        let balance = balances::get_or_create_for_update(&mut tx, &user_id).await?;
        let after = balance.amount + amount;
        let metadata = embed_balance_after(
            serde_json::json!({
                "grant_kind": GrantKind::Streak.as_str(),
                "streak": streak,
                "reward_day": reward_day(streak),
                "claimed_day": claimed_day,
            }),
            after,
        );
        let entry = Transaction::grant(
            user_id,
            amount,
            format!("Day {} streak bonus of {amount} DUST", reward_day(streak)),
            Some(app_id),
            metadata,
            idempotency_key.map(String::from),
        );

        balances::set_amount(&mut tx, &user_id, after).await?;
        transactions::insert(&mut tx, &entry).await?;

        let grant = grants::new_grant(user_id, app_id, GrantKind::Streak, Some(today), entry.id);
        match grants::insert(&mut tx, &grant).await {
            Ok(()) => {}
            Err(StoreError::DuplicateGrant) => {
                return Err(LedgerError::Conflict(
                    "streak bonus already claimed today".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    // ========================================================================
    // Refunds and adjustments
    // ========================================================================

    /// Credit back a completed consume, at most once per target.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown transaction, `InvalidRefundTarget` when the
    /// target is not a completed consume, `AlreadyRefunded` on a second
    /// attempt.
    pub async fn refund(
        &self,
        transaction_id: &TransactionId,
        reason: String,
        admin_id: Option<String>,
    ) -> Result<Receipt, LedgerError> {
        let original = transactions::get(&self.store, transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction: {transaction_id}")))?;

        if original.tx_type != TransactionType::Consume
            || original.status != TransactionStatus::Completed
        {
            return Err(LedgerError::InvalidRefundTarget(format!(
                "transaction {transaction_id} is not a completed consume"
            )));
        }
        if transactions::find_refund_of(&self.store, transaction_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::AlreadyRefunded {
                transaction_id: transaction_id.to_string(),
            });
        }

        let lock = self.locks.acquire(&original.user_id).await?;
        let outcome = self.refund_in_tx(&original, reason, admin_id).await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn refund_in_tx(
        &self,
        original: &Transaction,
        reason: String,
        admin_id: Option<String>,
    ) -> Result<Applied, LedgerError> {
        let mut tx = self.store.begin().await?;
        let balance = balances::get_or_create_for_update(&mut tx, &original.user_id).await?;

        let amount = original.amount.abs();
        let after = balance.amount + amount;
        let mut entry = Transaction::refund(original.user_id, amount, original.id, reason, admin_id);
        entry.metadata = embed_balance_after(entry.metadata, after);

        balances::set_amount(&mut tx, &original.user_id, after).await?;

        match transactions::insert(&mut tx, &entry).await {
            Ok(()) => {}
            Err(StoreError::DuplicateRefund) => {
                return Err(LedgerError::AlreadyRefunded {
                    transaction_id: original.id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    /// Signed admin correction; negative deltas may not cross zero.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero delta, `InsufficientBalance` when a negative
    /// delta exceeds the balance.
    pub async fn adjust(
        &self,
        user_id: UserId,
        delta: i64,
        reason: String,
        admin_id: String,
    ) -> Result<Receipt, LedgerError> {
        if delta == 0 {
            return Err(LedgerError::Validation("delta must be non-zero".into()));
        }

        let lock = self.locks.acquire(&user_id).await?;
        let outcome = self.adjust_in_tx(user_id, delta, reason, admin_id).await;
        lock.release().await;

        self.conclude(outcome).await
    }

    async fn adjust_in_tx(
        &self,
        user_id: UserId,
        delta: i64,
        reason: String,
        admin_id: String,
    ) -> Result<Applied, LedgerError> {
        let mut tx = self.store.begin().await?;
        let balance = balances::get_or_create_for_update(&mut tx, &user_id).await?;

        let after = balance.amount + delta;
        if after < 0 {
            return Err(LedgerError::InsufficientBalance {
                balance: balance.amount,
                required: -delta,
            });
        }

        let mut entry = Transaction::adjustment(user_id, delta, reason, admin_id);
        entry.metadata = embed_balance_after(entry.metadata, after);

        balances::set_amount(&mut tx, &user_id, after).await?;
        transactions::insert(&mut tx, &entry).await?;
        tx.commit().await.map_err(store_err)?;

        Ok(Applied::Committed(Receipt {
            transaction: entry,
            balance_before: balance.amount,
            balance_after: after,
        }))
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    /// Resolve an idempotency key to its prior receipt: coordination-store
    /// fast path first, then the durable unique index as backstop.
    async fn find_replay(&self, key: &str) -> Result<Option<Receipt>, LedgerError> {
        if let Ok(Some(id_str)) = self.coord.get_idempotent(key).await {
            if let Ok(id) = id_str.parse::<TransactionId>() {
                if let Some(committed) = transactions::get(&self.store, &id).await? {
                    return Ok(Some(Receipt::from_committed(committed)));
                }
            }
        }

        Ok(transactions::get_by_idempotency_key(&self.store, key)
            .await?
            .map(Receipt::from_committed))
    }

    async fn replay_committed(&self, key: Option<&str>) -> Result<Applied, LedgerError> {
        let key =
            key.ok_or_else(|| LedgerError::Storage("duplicate key without a key".into()))?;
        transactions::get_by_idempotency_key(&self.store, key)
            .await?
            .map(|t| Applied::Replayed(Receipt::from_committed(t)))
            .ok_or_else(|| LedgerError::Conflict("idempotency key already used".into()))
    }

    /// Post-commit side effects. None of these can fail the operation: the
    /// ledger row is already durable.
    async fn conclude(&self, outcome: Result<Applied, LedgerError>) -> Result<Receipt, LedgerError> {
        match outcome? {
            Applied::Committed(receipt) => {
                let t = &receipt.transaction;

                if let Err(e) = self.coord.invalidate_balance(&t.user_id).await {
                    tracing::warn!(user_id = %t.user_id, error = %e, "Cache invalidation failed");
                }

                self.events.publish(BalanceChanged {
                    user_id: t.user_id,
                    delta: t.amount,
                    balance: receipt.balance_after,
                    transaction_id: t.id,
                    tx_type: t.tx_type,
                    at: Utc::now(),
                });

                if let Some(key) = &t.idempotency_key {
                    if let Err(e) = self
                        .coord
                        .put_idempotent(key, &t.id.to_string(), self.idempotency_ttl)
                        .await
                    {
                        // Non-fatal: the unique index on idempotency_key is
                        // the durable backstop for retries.
                        tracing::warn!(key = %key, error = %e, "Idempotency record write failed");
                    }
                }

                tracing::info!(
                    user_id = %t.user_id,
                    transaction_id = %t.id,
                    tx_type = %t.tx_type,
                    amount = %t.amount,
                    balance_after = %receipt.balance_after,
                    "Ledger operation committed"
                );

                Ok(receipt)
            }
            Applied::Replayed(receipt) => {
                tracing::debug!(
                    transaction_id = %receipt.transaction.id,
                    "Replayed previously committed operation"
                );
                Ok(receipt)
            }
        }
    }
}

fn store_err(e: sqlx::Error) -> LedgerError {
    StoreError::from(e).into()
}

/// Merge the committed balance into transaction metadata so retries can be
/// answered verbatim. Non-object metadata is replaced with an object.
fn embed_balance_after(metadata: serde_json::Value, after: i64) -> serde_json::Value {
    let mut map = match metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".into(), other);
            map
        }
    };
    map.insert("balance_after".into(), serde_json::Value::from(after));
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_balance_after_preserves_caller_metadata() {
        let merged = embed_balance_after(serde_json::json!({"action": "generate"}), 6);
        assert_eq!(merged["action"], "generate");
        assert_eq!(merged["balance_after"], 6);
    }

    #[test]
    fn embed_balance_after_wraps_non_object_payloads() {
        let merged = embed_balance_after(serde_json::json!([1, 2]), 10);
        assert_eq!(merged["payload"], serde_json::json!([1, 2]));
        assert_eq!(merged["balance_after"], 10);
    }

    #[test]
    fn receipt_from_committed_recovers_balances() {
        let mut t = Transaction::consume(
            UserId::generate(),
            4,
            AppId::generate(),
            "usage".into(),
            serde_json::json!({}),
            Some("k1".into()),
        );
        t.metadata = embed_balance_after(t.metadata, 6);

        let receipt = Receipt::from_committed(t);
        assert_eq!(receipt.balance_before, 10);
        assert_eq!(receipt.balance_after, 6);
    }
}
