use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-player credit balance consulted before chargeable operations.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, player_id: &str) -> Result<i64>;

    /// Atomically takes `amount` from the balance. Returns false, without
    /// changing anything, when the balance is too low.
    async fn try_debit(&self, player_id: &str, amount: i64) -> Result<bool>;

    async fn refund(&self, player_id: &str, amount: i64) -> Result<()>;
}

/// Ledger that never runs out.
#[derive(Debug, Default, Clone)]
pub struct UnlimitedCredits;

#[async_trait]
impl CreditLedger for UnlimitedCredits {
    async fn balance(&self, _player_id: &str) -> Result<i64> {
        Ok(i64::MAX)
    }

    async fn try_debit(&self, _player_id: &str, _amount: i64) -> Result<bool> {
        Ok(true)
    }

    async fn refund(&self, _player_id: &str, _amount: i64) -> Result<()> {
        Ok(())
    }
}

/// Process-local balances; unknown players start at `initial`.
#[derive(Debug)]
pub struct InMemoryCredits {
    initial: i64,
    balances: Mutex<HashMap<String, i64>>,
}

impl InMemoryCredits {
    pub fn new(initial: i64) -> Self {
        Self {
            initial,
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_balance(&self, player_id: &str, amount: i64) {
        if let Ok(mut balances) = self.balances.lock() {
            balances.insert(player_id.to_string(), amount);
        }
    }
}

#[async_trait]
impl CreditLedger for InMemoryCredits {
    async fn balance(&self, player_id: &str) -> Result<i64> {
        let balances = self
            .balances
            .lock()
            .map_err(|_| anyhow::anyhow!("credit ledger lock poisoned"))?;
        Ok(balances.get(player_id).copied().unwrap_or(self.initial))
    }

    async fn try_debit(&self, player_id: &str, amount: i64) -> Result<bool> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| anyhow::anyhow!("credit ledger lock poisoned"))?;
        let balance = balances
            .entry(player_id.to_string())
            .or_insert(self.initial);
        if *balance < amount {
            return Ok(false);
        }
        *balance -= amount;
        Ok(true)
    }

    async fn refund(&self, player_id: &str, amount: i64) -> Result<()> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| anyhow::anyhow!("credit ledger lock poisoned"))?;
        *balances
            .entry(player_id.to_string())
            .or_insert(self.initial) += amount;
        Ok(())
    }
}

/// Balances kept in Redis under `user:credits:{player_id}`.
pub struct RedisCreditLedger {
    redis: ConnectionManager,
    initial: i64,
}

impl RedisCreditLedger {
    pub fn new(redis: ConnectionManager, initial: i64) -> Self {
        Self { redis, initial }
    }

    fn key(player_id: &str) -> String {
        format!("user:credits:{}", player_id)
    }
}

#[async_trait]
impl CreditLedger for RedisCreditLedger {
    async fn balance(&self, player_id: &str) -> Result<i64> {
        let mut conn = self.redis.clone();
        let balance: Option<i64> = redis::cmd("GET")
            .arg(Self::key(player_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read credit balance")?;
        Ok(balance.unwrap_or(self.initial))
    }

    // Lua script keeps check + decrement atomic across API instances
    async fn try_debit(&self, player_id: &str, amount: i64) -> Result<bool> {
        let mut conn = self.redis.clone();

        let lua_script = r#"
            local key = KEYS[1]
            local amount = tonumber(ARGV[1])
            local initial = tonumber(ARGV[2])
            local current = redis.call('GET', key)

            if current == false then
                current = initial
            else
                current = tonumber(current)
            end

            if current < amount then
                return -1
            end

            redis.call('SET', key, current - amount)
            return current - amount
        "#;

        let remaining: i64 = redis::Script::new(lua_script)
            .key(Self::key(player_id))
            .arg(amount)
            .arg(self.initial)
            .invoke_async(&mut conn)
            .await
            .context("Failed to execute credit debit Lua script")?;

        if remaining < 0 {
            tracing::info!(
                "Credit debit refused: player={}, required={}",
                player_id,
                amount
            );
            return Ok(false);
        }

        tracing::debug!(
            "Credits debited: player={}, amount={}, remaining={}",
            player_id,
            amount,
            remaining
        );
        Ok(true)
    }

    async fn refund(&self, player_id: &str, amount: i64) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::key(player_id);

        redis::cmd("SET")
            .arg(&key)
            .arg(self.initial)
            .arg("NX")
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to initialize credit balance")?;

        let balance: i64 = redis::cmd("INCRBY")
            .arg(&key)
            .arg(amount)
            .query_async(&mut conn)
            .await
            .context("Failed to refund credits")?;

        tracing::debug!(
            "Credits refunded: player={}, amount={}, balance={}",
            player_id,
            amount,
            balance
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_refuses_when_balance_is_low() {
        let ledger = InMemoryCredits::new(150);

        assert!(ledger.try_debit("p1", 100).await.unwrap());
        assert!(!ledger.try_debit("p1", 100).await.unwrap());
        assert_eq!(ledger.balance("p1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn refund_restores_balance() {
        let ledger = InMemoryCredits::new(100);
        ledger.try_debit("p1", 100).await.unwrap();
        ledger.refund("p1", 100).await.unwrap();
        assert_eq!(ledger.balance("p1").await.unwrap(), 100);
        assert_eq!(ledger.balance("someone-else").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn unlimited_always_debits() {
        let ledger = UnlimitedCredits;
        assert!(ledger.try_debit("p1", i64::MAX).await.unwrap());
    }
}
