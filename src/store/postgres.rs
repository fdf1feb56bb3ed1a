//! Postgres store backend.
//!
//! Multi-document mutations run inside SERIALIZABLE transactions; Postgres
//! serialization failures (40001) and deadlocks (40P01) come back as
//! [`StoreError::Conflict`] so the retry wrapper can re-run them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{BookingStore, StoreError, Transition};
use crate::models::{
    Booking, BookingStatus, EventRecord, LineItem, PaymentSession, PaymentStatus,
    TicketInventory, IDEMPOTENCY_TTL_SECONDS,
};

const BOOKING_COLUMNS: &str = "id, user_id, event_id, order_id, items, subtotal, booking_fee, \
     total_amount, booking_status, payment_status, qr_token, created_at, expired_at, \
     confirmation_email_sent_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    event_id: String,
    order_id: Option<String>,
    items: sqlx::types::Json<Vec<LineItem>>,
    subtotal: i64,
    booking_fee: i64,
    total_amount: i64,
    booking_status: BookingStatus,
    payment_status: PaymentStatus,
    qr_token: Option<String>,
    created_at: DateTime<Utc>,
    expired_at: Option<DateTime<Utc>>,
    confirmation_email_sent_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            order_id: row.order_id,
            items: row.items.0,
            subtotal: row.subtotal,
            booking_fee: row.booking_fee,
            total_amount: row.total_amount,
            booking_status: row.booking_status,
            payment_status: row.payment_status,
            qr_token: row.qr_token,
            created_at: row.created_at,
            expired_at: row.expired_at,
            confirmation_email_sent_at: row.confirmation_email_sent_at,
        }
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_serializable(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        Ok(tx)
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.code().as_deref() {
            Some("40001") | Some("40P01") => return StoreError::Conflict(db_err.to_string()),
            Some("23505") => return StoreError::DuplicateKey,
            _ => {}
        }
    }
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl BookingStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn upsert_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, title)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(&event.id)
        .bind(&event.title)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        for tt in &event.ticket_types {
            sqlx::query(
                r#"
                INSERT INTO event_ticket_types
                    (event_id, ticket_type_id, name, unit_price, total_quantity,
                     tickets_sold, max_per_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (event_id, ticket_type_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    unit_price = EXCLUDED.unit_price,
                    total_quantity = EXCLUDED.total_quantity,
                    tickets_sold = EXCLUDED.tickets_sold,
                    max_per_order = EXCLUDED.max_per_order
                "#,
            )
            .bind(&event.id)
            .bind(&tt.ticket_type_id)
            .bind(&tt.name)
            .bind(tt.unit_price)
            .bind(tt.total_quantity)
            .bind(tt.tickets_sold)
            .bind(tt.max_per_order)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>, StoreError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, title FROM events WHERE id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        let Some((id, title)) = row else {
            return Ok(None);
        };

        let ticket_types: Vec<TicketInventory> = sqlx::query_as(
            r#"
            SELECT ticket_type_id, name, unit_price, total_quantity, tickets_sold, max_per_order
            FROM event_ticket_types
            WHERE event_id = $1
            ORDER BY ticket_type_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(Some(EventRecord {
            id,
            title,
            ticket_types,
        }))
    }

    async fn create_reservation(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tx = self.begin_serializable().await?;

        // Re-read inventory inside the transaction; the pre-validation in
        // the service layer is advisory only.
        for item in &booking.items {
            let row: Option<(i32, i32)> = sqlx::query_as(
                r#"
                SELECT total_quantity, tickets_sold
                FROM event_ticket_types
                WHERE event_id = $1 AND ticket_type_id = $2
                FOR UPDATE
                "#,
            )
            .bind(&booking.event_id)
            .bind(&item.ticket_type_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let (total_quantity, tickets_sold) = row.ok_or(StoreError::NotFound)?;
            if tickets_sold + item.quantity > total_quantity {
                return Err(StoreError::InsufficientInventory {
                    ticket_type_id: item.ticket_type_id.clone(),
                });
            }

            sqlx::query(
                r#"
                UPDATE event_ticket_types
                SET tickets_sold = tickets_sold + $3
                WHERE event_id = $1 AND ticket_type_id = $2
                "#,
            )
            .bind(&booking.event_id)
            .bind(&item.ticket_type_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, user_id, event_id, order_id, items, subtotal, booking_fee,
                 total_amount, booking_status, payment_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', 'PENDING', $9)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(&booking.event_id)
        .bind(&booking.order_id)
        .bind(sqlx::types::Json(&booking.items))
        .bind(booking.subtotal)
        .bind(booking.booking_fee)
        .bind(booking.total_amount)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(row.map(Booking::from))
    }

    async fn find_booking_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(Booking::from))
    }

    async fn bookings_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET order_id = $2, payment_status = 'INITIATED'
            WHERE id = $1 AND booking_status = 'PENDING'
            "#,
        )
        .bind(booking_id)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        qr_token: &str,
    ) -> Result<Transition, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let booking = Booking::from(row.ok_or(StoreError::NotFound)?);
        if booking.booking_status != BookingStatus::Pending {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(Transition::AlreadySettled(booking));
        }

        let updated: BookingRow = sqlx::query_as(&format!(
            "UPDATE bookings \
             SET booking_status = 'CONFIRMED', payment_status = 'SUCCESS', qr_token = $2 \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(qr_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Transition::Applied(updated.into()))
    }

    async fn fail_booking(&self, booking_id: Uuid) -> Result<Transition, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let booking = Booking::from(row.ok_or(StoreError::NotFound)?);
        if booking.booking_status != BookingStatus::Pending {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(Transition::AlreadySettled(booking));
        }

        release_items(&mut tx, &booking.event_id, &booking.items).await?;

        let updated: BookingRow = sqlx::query_as(&format!(
            "UPDATE bookings \
             SET booking_status = 'FAILED', payment_status = 'FAILED' \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Transition::Applied(updated.into()))
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>, batch: i64) -> Result<u64, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let stale: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE booking_status = 'PENDING' \
               AND payment_status IN ('PENDING', 'INITIATED') \
               AND created_at < $1 \
             ORDER BY created_at \
             LIMIT $2 \
             FOR UPDATE"
        ))
        .bind(cutoff)
        .bind(batch)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut expired = 0u64;
        for row in stale {
            let booking = Booking::from(row);
            release_items(&mut tx, &booking.event_id, &booking.items).await?;

            sqlx::query(
                r#"
                UPDATE bookings
                SET booking_status = 'EXPIRED', payment_status = 'EXPIRED', expired_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(booking.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            expired += 1;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(expired)
    }

    async fn idempotency_check(
        &self,
        key: &str,
        ttl_seconds: i64,
    ) -> Result<Option<JsonValue>, StoreError> {
        let row: Option<(JsonValue,)> = sqlx::query_as(
            r#"
            SELECT result FROM idempotency_records
            WHERE key = $1 AND created_at > NOW() - make_interval(secs => $2)
            "#,
        )
        .bind(key)
        .bind(ttl_seconds as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(|(result,)| result))
    }

    async fn idempotency_save(&self, key: &str, result: &JsonValue) -> Result<(), StoreError> {
        // Create-if-absent: an expired record may be overwritten, a living
        // one must not be. rows_affected == 0 means a living record won.
        let outcome = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, result)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
                SET result = EXCLUDED.result, created_at = NOW()
                WHERE idempotency_records.created_at <= NOW() - make_interval(secs => $3)
            "#,
        )
        .bind(key)
        .bind(result)
        .bind(IDEMPOTENCY_TTL_SECONDS as f64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::DuplicateKey);
        }
        Ok(())
    }

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_sessions
                (payment_session_id, order_id, booking_id, user_id, event_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.payment_session_id)
        .bind(&session.order_id)
        .bind(session.booking_id)
        .bind(&session.user_id)
        .bind(&session.event_id)
        .bind(session.amount)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<PaymentSession>, StoreError> {
        let session: Option<PaymentSession> = sqlx::query_as(
            r#"
            SELECT payment_session_id, order_id, booking_id, user_id, event_id,
                   amount, completed_at, created_at
            FROM payment_sessions
            WHERE payment_session_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(session)
    }

    async fn complete_session(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE payment_sessions
            SET completed_at = NOW()
            WHERE payment_session_id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn mark_email_sent(&self, booking_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET confirmation_email_sent_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

/// Return held units to the event, floored at zero. The UPDATE reads the
/// current counter in place, so concurrent unrelated updates to the same
/// event are not overwritten.
async fn release_items(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    items: &[LineItem],
) -> Result<(), StoreError> {
    for item in items {
        sqlx::query(
            r#"
            UPDATE event_ticket_types
            SET tickets_sold = GREATEST(tickets_sold - $3, 0)
            WHERE event_id = $1 AND ticket_type_id = $2
            "#,
        )
        .bind(event_id)
        .bind(&item.ticket_type_id)
        .bind(item.quantity)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
    }
    Ok(())
}
