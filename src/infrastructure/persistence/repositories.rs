use crate::domain::delivery_state::DeliveryAdmission;
use crate::domain::instrument_state::InstrumentState;
use crate::domain::position::{Position, PositionMonitoringSample};
use crate::domain::ports::CandleStore;
use crate::domain::repositories::{
    DeliveryStateRepository, InstrumentStateRepository, PositionRepository, SignalRepository,
    SubscriberRepository, SubscriptionRepository,
};
use crate::domain::signal::Signal;
use crate::domain::subscription::{Subscriber, Subscription};
use crate::domain::types::{Action, Candle, Instrument, Pair, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteCandleStore {
    pool: SqlitePool,
}

impl SqliteCandleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    async fn latest(&self, instrument: Instrument, n: usize) -> anyhow::Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT pair, timeframe, timestamp, open, high, low, close, volume, source \
             FROM candles WHERE pair = ? AND timeframe = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(instrument.pair.to_string())
        .bind(instrument.timeframe.to_string())
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles: Vec<Candle> = rows.iter().map(row_to_candle).collect::<anyhow::Result<_>>()?;
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn upsert(&self, candle: &Candle) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO candles (pair, timeframe, timestamp, open, high, low, close, volume, source) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (pair, timeframe, timestamp) DO UPDATE SET source = excluded.source",
        )
        .bind(candle.pair.to_string())
        .bind(candle.timeframe.to_string())
        .bind(candle.timestamp.to_rfc3339())
        .bind(candle.open.to_string())
        .bind(candle.high.to_string())
        .bind(candle.low.to_string())
        .bind(candle.close.to_string())
        .bind(candle.volume.to_string())
        .bind(&candle.source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_batch(&self, candles: &[Candle]) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                "INSERT INTO candles (pair, timeframe, timestamp, open, high, low, close, volume, source) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (pair, timeframe, timestamp) DO UPDATE SET source = excluded.source",
            )
            .bind(candle.pair.to_string())
            .bind(candle.timeframe.to_string())
            .bind(candle.timestamp.to_rfc3339())
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(&candle.source)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(candles.len())
    }
}

fn row_to_candle(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Candle> {
    let pair: String = row.try_get("pair")?;
    let timeframe: String = row.try_get("timeframe")?;
    let timestamp: String = row.try_get("timestamp")?;
    let open: String = row.try_get("open")?;
    let high: String = row.try_get("high")?;
    let low: String = row.try_get("low")?;
    let close: String = row.try_get("close")?;
    let volume: String = row.try_get("volume")?;
    let source: String = row.try_get("source")?;

    Ok(Candle {
        pair: Pair::from_str(&pair)?,
        timeframe: Timeframe::from_str(&timeframe)?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&chrono::Utc),
        open: open.parse()?,
        high: high.parse()?,
        low: low.parse()?,
        close: close.parse()?,
        volume: volume.parse()?,
        source,
    })
}

pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn save(&self, signal: &Signal) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO signals (id, pair, timeframe, action, confidence, strength, entry_price, \
             stop_loss, take_profit, risk_reward_ratio, position_size_hint, source, model_version, \
             generated_at, expires_at, technical_snapshot) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(signal.id.to_string())
        .bind(signal.instrument.pair.to_string())
        .bind(signal.instrument.timeframe.to_string())
        .bind(serde_json::to_string(&signal.action)?)
        .bind(signal.confidence)
        .bind(serde_json::to_string(&signal.strength)?)
        .bind(signal.entry_price.to_string())
        .bind(signal.stop_loss.to_string())
        .bind(signal.take_profit.to_string())
        .bind(signal.risk_reward_ratio.to_string())
        .bind(signal.position_size_hint.to_string())
        .bind(serde_json::to_string(&signal.source)?)
        .bind(&signal.model_version)
        .bind(signal.generated_at.to_rfc3339())
        .bind(signal.expires_at.to_rfc3339())
        .bind(signal.technical_snapshot.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self, instrument: Instrument) -> anyhow::Result<Option<Signal>> {
        let row = sqlx::query(
            "SELECT id, action, confidence, strength, entry_price, stop_loss, take_profit, \
             risk_reward_ratio, position_size_hint, source, model_version, generated_at, expires_at, \
             technical_snapshot FROM signals WHERE pair = ? AND timeframe = ? \
             ORDER BY generated_at DESC LIMIT 1",
        )
        .bind(instrument.pair.to_string())
        .bind(instrument.timeframe.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let id: String = row.try_get("id")?;
        let action: String = row.try_get("action")?;
        let strength: String = row.try_get("strength")?;
        let entry_price: String = row.try_get("entry_price")?;
        let stop_loss: String = row.try_get("stop_loss")?;
        let take_profit: String = row.try_get("take_profit")?;
        let risk_reward_ratio: String = row.try_get("risk_reward_ratio")?;
        let position_size_hint: String = row.try_get("position_size_hint")?;
        let source: String = row.try_get("source")?;
        let model_version: Option<String> = row.try_get("model_version")?;
        let generated_at: String = row.try_get("generated_at")?;
        let expires_at: String = row.try_get("expires_at")?;
        let technical_snapshot: String = row.try_get("technical_snapshot")?;

        Ok(Some(Signal {
            id: Uuid::parse_str(&id)?,
            instrument,
            action: serde_json::from_str(&action)?,
            confidence: row.try_get("confidence")?,
            strength: serde_json::from_str(&strength)?,
            entry_price: entry_price.parse()?,
            stop_loss: stop_loss.parse()?,
            take_profit: take_profit.parse()?,
            risk_reward_ratio: risk_reward_ratio.parse()?,
            position_size_hint: position_size_hint.parse()?,
            source: serde_json::from_str(&source)?,
            model_version,
            generated_at: chrono::DateTime::parse_from_rfc3339(&generated_at)?.with_timezone(&chrono::Utc),
            expires_at: chrono::DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&chrono::Utc),
            technical_snapshot: serde_json::from_str(&technical_snapshot)?,
        }))
    }
}

pub struct SqliteInstrumentStateRepository {
    pool: SqlitePool,
}

impl SqliteInstrumentStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstrumentStateRepository for SqliteInstrumentStateRepository {
    async fn load(&self, instrument: Instrument) -> anyhow::Result<Option<InstrumentState>> {
        let row = sqlx::query(
            "SELECT last_signal_json, last_change_at \
             FROM instrument_state WHERE pair = ? AND timeframe = ?",
        )
        .bind(instrument.pair.to_string())
        .bind(instrument.timeframe.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let last_signal_json: Option<String> = row.try_get("last_signal_json")?;
        let last_change_at: Option<String> = row.try_get("last_change_at")?;

        Ok(Some(InstrumentState {
            instrument,
            last_signal: last_signal_json.map(|s| serde_json::from_str(&s)).transpose()?,
            last_change_at: last_change_at
                .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
                .transpose()?,
        }))
    }

    async fn save(&self, state: &InstrumentState) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO instrument_state (pair, timeframe, last_signal_json, last_change_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (pair, timeframe) DO UPDATE SET \
             last_signal_json = excluded.last_signal_json, \
             last_change_at = excluded.last_change_at",
        )
        .bind(state.instrument.pair.to_string())
        .bind(state.instrument.timeframe.to_string())
        .bind(state.last_signal.as_ref().map(serde_json::to_string).transpose()?)
        .bind(state.last_change_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn upsert(&self, subscription: &Subscription) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (id, subscriber_id, pair, timeframe, filter_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (subscriber_id, pair, timeframe) DO UPDATE SET \
             filter_json = excluded.filter_json, updated_at = excluded.updated_at",
        )
        .bind(subscription.id.to_string())
        .bind(subscription.subscriber_id.to_string())
        .bind(subscription.instrument.pair.to_string())
        .bind(subscription.instrument.timeframe.to_string())
        .bind(serde_json::to_string(&subscription.filter)?)
        .bind(subscription.created_at.to_rfc3339())
        .bind(subscription.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, subscriber_id: Uuid, instrument: Option<Instrument>) -> anyhow::Result<u64> {
        let result = if let Some(instrument) = instrument {
            sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ? AND pair = ? AND timeframe = ?")
                .bind(subscriber_id.to_string())
                .bind(instrument.pair.to_string())
                .bind(instrument.timeframe.to_string())
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ?")
                .bind(subscriber_id.to_string())
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected())
    }

    async fn remove_by_id(&self, subscription_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(subscription_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> anyhow::Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT id, subscriber_id, pair, timeframe, filter_json, created_at, updated_at \
             FROM subscriptions WHERE subscriber_id = ?",
        )
        .bind(subscriber_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_subscription).collect()
    }

    async fn list_for_instrument(&self, instrument: Instrument) -> anyhow::Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT id, subscriber_id, pair, timeframe, filter_json, created_at, updated_at \
             FROM subscriptions WHERE pair = ? AND timeframe = ?",
        )
        .bind(instrument.pair.to_string())
        .bind(instrument.timeframe.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_subscription).collect()
    }
}

fn row_to_subscription(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Subscription> {
    let id: String = row.try_get("id")?;
    let subscriber_id: String = row.try_get("subscriber_id")?;
    let pair: String = row.try_get("pair")?;
    let timeframe: String = row.try_get("timeframe")?;
    let filter_json: String = row.try_get("filter_json")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Subscription {
        id: Uuid::parse_str(&id)?,
        subscriber_id: Uuid::parse_str(&subscriber_id)?,
        instrument: Instrument::new(Pair::from_str(&pair)?, Timeframe::from_str(&timeframe)?),
        filter: serde_json::from_str(&filter_json)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&chrono::Utc),
    })
}

pub struct SqliteSubscriberRepository {
    pool: SqlitePool,
}

impl SqliteSubscriberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberRepository for SqliteSubscriberRepository {
    async fn find_by_platform_identity(&self, platform_identity: &str) -> anyhow::Result<Option<Subscriber>> {
        let row = sqlx::query("SELECT id, kind, platform_identity, preferences_json FROM subscribers WHERE platform_identity = ?")
            .bind(platform_identity)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_subscriber).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Subscriber>> {
        let row = sqlx::query("SELECT id, kind, platform_identity, preferences_json FROM subscribers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_subscriber).transpose()
    }

    async fn save(&self, subscriber: &Subscriber) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO subscribers (id, kind, platform_identity, preferences_json) VALUES (?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET preferences_json = excluded.preferences_json",
        )
        .bind(subscriber.id.to_string())
        .bind(serde_json::to_string(&subscriber.kind)?)
        .bind(&subscriber.platform_identity)
        .bind(serde_json::to_string(&subscriber.preferences)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_subscriber(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Subscriber> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let platform_identity: String = row.try_get("platform_identity")?;
    let preferences_json: String = row.try_get("preferences_json")?;

    Ok(Subscriber {
        id: Uuid::parse_str(&id)?,
        kind: serde_json::from_str(&kind)?,
        platform_identity,
        preferences: serde_json::from_str(&preferences_json)?,
    })
}

pub struct SqlitePositionRepository {
    pool: SqlitePool,
}

impl SqlitePositionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlitePositionRepository {
    async fn save(&self, position: &Position) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO positions (id, subscriber_id, pair, timeframe, side, entry_price, stop_loss, \
             take_profit, size, opened_at, status, exit_price, closed_at, realized_pnl_pips, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             status = excluded.status, exit_price = excluded.exit_price, \
             closed_at = excluded.closed_at, realized_pnl_pips = excluded.realized_pnl_pips, \
             stop_loss = excluded.stop_loss, take_profit = excluded.take_profit",
        )
        .bind(position.id.to_string())
        .bind(position.subscriber_id.to_string())
        .bind(position.instrument.pair.to_string())
        .bind(position.instrument.timeframe.to_string())
        .bind(serde_json::to_string(&position.side)?)
        .bind(position.entry_price.to_string())
        .bind(position.stop_loss.to_string())
        .bind(position.take_profit.to_string())
        .bind(position.size.to_string())
        .bind(position.opened_at.to_rfc3339())
        .bind(serde_json::to_string(&position.status)?)
        .bind(position.exit_price.map(|d| d.to_string()))
        .bind(position.closed_at.map(|d| d.to_rfc3339()))
        .bind(position.realized_pnl_pips.map(|d| d.to_string()))
        .bind(&position.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Position>> {
        let row = sqlx::query(
            "SELECT id, subscriber_id, pair, timeframe, side, entry_price, stop_loss, take_profit, \
             size, opened_at, status, exit_price, closed_at, realized_pnl_pips, notes \
             FROM positions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_position).transpose()
    }

    async fn list_open(&self) -> anyhow::Result<Vec<Position>> {
        let rows = sqlx::query(
            "SELECT id, subscriber_id, pair, timeframe, side, entry_price, stop_loss, take_profit, \
             size, opened_at, status, exit_price, closed_at, realized_pnl_pips, notes \
             FROM positions WHERE status = '\"open\"'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_position).collect()
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid, pair: Option<&str>) -> anyhow::Result<Vec<Position>> {
        let rows = if let Some(pair) = pair {
            sqlx::query(
                "SELECT id, subscriber_id, pair, timeframe, side, entry_price, stop_loss, take_profit, \
                 size, opened_at, status, exit_price, closed_at, realized_pnl_pips, notes \
                 FROM positions WHERE subscriber_id = ? AND pair = ?",
            )
            .bind(subscriber_id.to_string())
            .bind(pair)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, subscriber_id, pair, timeframe, side, entry_price, stop_loss, take_profit, \
                 size, opened_at, status, exit_price, closed_at, realized_pnl_pips, notes \
                 FROM positions WHERE subscriber_id = ?",
            )
            .bind(subscriber_id.to_string())
            .fetch_all(&self.pool)
            .await?
        };
        rows.iter().map(row_to_position).collect()
    }

    async fn save_sample(&self, sample: &PositionMonitoringSample) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO position_monitoring (position_id, observed_at, current_price, unrealized_pnl_pips, \
             unrealized_pnl_pct, high_watermark, low_watermark, sl_armed, tp_armed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (position_id, observed_at) DO NOTHING",
        )
        .bind(sample.position_id.to_string())
        .bind(sample.observed_at.to_rfc3339())
        .bind(sample.current_price.to_string())
        .bind(sample.unrealized_pnl_pips.to_string())
        .bind(sample.unrealized_pnl_pct.to_string())
        .bind(sample.high_watermark.to_string())
        .bind(sample.low_watermark.to_string())
        .bind(sample.sl_armed)
        .bind(sample.tp_armed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_samples(&self, position_id: Uuid) -> anyhow::Result<Vec<PositionMonitoringSample>> {
        let rows = sqlx::query(
            "SELECT position_id, observed_at, current_price, unrealized_pnl_pips, unrealized_pnl_pct, \
             high_watermark, low_watermark, sl_armed, tp_armed \
             FROM position_monitoring WHERE position_id = ? ORDER BY observed_at ASC",
        )
        .bind(position_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_sample).collect()
    }
}

fn row_to_sample(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<PositionMonitoringSample> {
    let position_id: String = row.try_get("position_id")?;
    let observed_at: String = row.try_get("observed_at")?;
    let current_price: String = row.try_get("current_price")?;
    let unrealized_pnl_pips: String = row.try_get("unrealized_pnl_pips")?;
    let unrealized_pnl_pct: String = row.try_get("unrealized_pnl_pct")?;
    let high_watermark: String = row.try_get("high_watermark")?;
    let low_watermark: String = row.try_get("low_watermark")?;

    Ok(PositionMonitoringSample {
        position_id: Uuid::parse_str(&position_id)?,
        observed_at: chrono::DateTime::parse_from_rfc3339(&observed_at)?.with_timezone(&chrono::Utc),
        current_price: current_price.parse()?,
        unrealized_pnl_pips: unrealized_pnl_pips.parse()?,
        unrealized_pnl_pct: unrealized_pnl_pct.parse()?,
        high_watermark: high_watermark.parse()?,
        low_watermark: low_watermark.parse()?,
        sl_armed: row.try_get("sl_armed")?,
        tp_armed: row.try_get("tp_armed")?,
    })
}

fn row_to_position(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Position> {
    let id: String = row.try_get("id")?;
    let subscriber_id: String = row.try_get("subscriber_id")?;
    let pair: String = row.try_get("pair")?;
    let timeframe: String = row.try_get("timeframe")?;
    let side: String = row.try_get("side")?;
    let entry_price: String = row.try_get("entry_price")?;
    let stop_loss: String = row.try_get("stop_loss")?;
    let take_profit: String = row.try_get("take_profit")?;
    let size: String = row.try_get("size")?;
    let opened_at: String = row.try_get("opened_at")?;
    let status: String = row.try_get("status")?;
    let exit_price: Option<String> = row.try_get("exit_price")?;
    let closed_at: Option<String> = row.try_get("closed_at")?;
    let realized_pnl_pips: Option<String> = row.try_get("realized_pnl_pips")?;
    let notes: Option<String> = row.try_get("notes")?;

    Ok(Position {
        id: Uuid::parse_str(&id)?,
        subscriber_id: Uuid::parse_str(&subscriber_id)?,
        instrument: Instrument::new(Pair::from_str(&pair)?, Timeframe::from_str(&timeframe)?),
        side: serde_json::from_str(&side)?,
        entry_price: entry_price.parse()?,
        stop_loss: stop_loss.parse()?,
        take_profit: take_profit.parse()?,
        size: size.parse()?,
        opened_at: chrono::DateTime::parse_from_rfc3339(&opened_at)?.with_timezone(&chrono::Utc),
        status: serde_json::from_str(&status)?,
        exit_price: exit_price.map(|s| s.parse()).transpose()?,
        closed_at: closed_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
            .transpose()?,
        realized_pnl_pips: realized_pnl_pips.map(|s| s.parse()).transpose()?,
        notes,
    })
}

/// Durable backing for the Delivery Filter's cooldown/cap counters (spec §5):
/// each admission check runs as one transaction so a CAS-equivalent read then
/// write can't race across process restarts or concurrent delivery attempts.
pub struct SqliteDeliveryStateRepository {
    pool: SqlitePool,
}

impl SqliteDeliveryStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStateRepository for SqliteDeliveryStateRepository {
    async fn try_record(
        &self,
        subscriber_id: Uuid,
        action: Action,
        now: DateTime<Utc>,
        cooldown: Duration,
        daily_cap: u32,
        bypass_cooldown: bool,
    ) -> anyhow::Result<DeliveryAdmission> {
        let mut tx = self.pool.begin().await?;

        if !bypass_cooldown {
            let row = sqlx::query(
                "SELECT last_notified_at FROM delivery_cooldown WHERE subscriber_id = ? AND action = ?",
            )
            .bind(subscriber_id.to_string())
            .bind(serde_json::to_string(&action)?)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                let last_notified_at: String = row.try_get("last_notified_at")?;
                let last = chrono::DateTime::parse_from_rfc3339(&last_notified_at)?.with_timezone(&Utc);
                if now - last < cooldown {
                    tx.rollback().await?;
                    return Ok(DeliveryAdmission::CooldownActive);
                }
            }
        }

        let day = now.date_naive().to_string();
        let row = sqlx::query("SELECT count FROM delivery_daily_count WHERE subscriber_id = ? AND day = ?")
            .bind(subscriber_id.to_string())
            .bind(&day)
            .fetch_optional(&mut *tx)
            .await?;
        let count: i64 = row.map(|r| r.try_get("count")).transpose()?.unwrap_or(0);
        if count as u32 >= daily_cap {
            tx.rollback().await?;
            return Ok(DeliveryAdmission::DailyCapReached);
        }

        sqlx::query(
            "INSERT INTO delivery_cooldown (subscriber_id, action, last_notified_at) VALUES (?, ?, ?) \
             ON CONFLICT (subscriber_id, action) DO UPDATE SET last_notified_at = excluded.last_notified_at",
        )
        .bind(subscriber_id.to_string())
        .bind(serde_json::to_string(&action)?)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO delivery_daily_count (subscriber_id, day, count) VALUES (?, ?, 1) \
             ON CONFLICT (subscriber_id, day) DO UPDATE SET count = count + 1",
        )
        .bind(subscriber_id.to_string())
        .bind(&day)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DeliveryAdmission::Accepted)
    }
}
