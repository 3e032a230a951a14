use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::scheduling::{
    Appointment, AvailabilityException, AvailabilityRule, WaitingListEntry,
};

use super::{BookingStore, BookingTx, RowLock};
use crate::error::DatabaseError;

const RULE_COLUMNS: &str = "id, doctor_id, day_of_week, start_time, end_time, timezone, \
    slot_duration_minutes, buffer_minutes, is_blocked, effective_from, effective_to, created_at";

const EXCEPTION_COLUMNS: &str = "id, doctor_id, date, is_unavailable, is_blocking, is_recurring, \
    recurrence_type, recurrence_interval, recurrence_until, weekday, start_time, end_time, note, \
    sort_order, created_at";

const APPOINTMENT_COLUMNS: &str = "id, doctor_id, patient_id, start_at, end_at, timezone, status, \
    call_provider, call_room_id, call_status, fee_paid, meeting_link, notes, created_at, updated_at";

const WAITING_COLUMNS: &str = "id, appointment_id, user_id, position, created_at";

fn lock_clause(lock: RowLock) -> &'static str {
    match lock {
        RowLock::None => "",
        RowLock::ForUpdate => " FOR UPDATE",
    }
}

fn map_write_error(err: sqlx::Error) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DatabaseError::Duplicate(db.message().to_string())
        }
        _ => DatabaseError::Sqlx(err),
    }
}

// ==============================================================================
// ROW MAPPING
// ==============================================================================

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    doctor_id: Uuid,
    day_of_week: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    timezone: String,
    slot_duration_minutes: i32,
    buffer_minutes: i32,
    is_blocked: bool,
    effective_from: Option<NaiveDate>,
    effective_to: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<RuleRow> for AvailabilityRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            doctor_id: row.doctor_id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            timezone: row.timezone,
            slot_duration_minutes: row.slot_duration_minutes,
            buffer_minutes: row.buffer_minutes,
            is_blocked: row.is_blocked,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ExceptionRow {
    id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    is_unavailable: bool,
    is_blocking: bool,
    is_recurring: bool,
    recurrence_type: Option<String>,
    recurrence_interval: i32,
    recurrence_until: Option<NaiveDate>,
    weekday: Option<i32>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    note: Option<String>,
    sort_order: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExceptionRow> for AvailabilityException {
    type Error = DatabaseError;

    fn try_from(row: ExceptionRow) -> Result<Self, Self::Error> {
        let recurrence_type = row.recurrence_type
            .map(|value| value.parse())
            .transpose()
            .map_err(DatabaseError::InvalidData)?;

        Ok(Self {
            id: row.id,
            doctor_id: row.doctor_id,
            date: row.date,
            is_unavailable: row.is_unavailable,
            is_blocking: row.is_blocking,
            is_recurring: row.is_recurring,
            recurrence_type,
            recurrence_interval: row.recurrence_interval,
            recurrence_until: row.recurrence_until,
            weekday: row.weekday,
            start_time: row.start_time,
            end_time: row.end_time,
            note: row.note,
            sort_order: row.sort_order,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    timezone: String,
    status: String,
    call_provider: Option<String>,
    call_room_id: Option<String>,
    call_status: String,
    fee_paid: bool,
    meeting_link: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DatabaseError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            doctor_id: row.doctor_id,
            patient_id: row.patient_id,
            start_at: row.start_at,
            end_at: row.end_at,
            timezone: row.timezone,
            status: row.status.parse().map_err(DatabaseError::InvalidData)?,
            call_provider: row.call_provider,
            call_room_id: row.call_room_id,
            call_status: row.call_status.parse().map_err(DatabaseError::InvalidData)?,
            fee_paid: row.fee_paid,
            meeting_link: row.meeting_link,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct WaitingRow {
    id: Uuid,
    appointment_id: Uuid,
    user_id: Uuid,
    position: i32,
    created_at: DateTime<Utc>,
}

impl From<WaitingRow> for WaitingListEntry {
    fn from(row: WaitingRow) -> Self {
        Self {
            id: row.id,
            appointment_id: row.appointment_id,
            user_id: row.user_id,
            position: row.position,
            created_at: row.created_at,
        }
    }
}

fn into_appointments(rows: Vec<AppointmentRow>) -> Result<Vec<Appointment>, DatabaseError> {
    rows.into_iter().map(Appointment::try_from).collect()
}

// ==============================================================================
// STORE
// ==============================================================================

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `DATABASE_URL` and bring the schema up to date.
    pub async fn connect(config: &AppConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Scheduling schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBookingTx { tx }))
    }
}

struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_doctor(&mut self, doctor_id: Uuid) -> Result<(), DatabaseError> {
        debug!("Taking advisory lock for doctor {}", doctor_id);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(doctor_id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_rules(&mut self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM doctor_availability_rules WHERE doctor_id = $1 \
             ORDER BY day_of_week, start_time",
            RULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(doctor_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(AvailabilityRule::from).collect())
    }

    async fn replace_rules(
        &mut self,
        doctor_id: Uuid,
        rules: Vec<AvailabilityRule>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM doctor_availability_rules WHERE doctor_id = $1")
            .bind(doctor_id)
            .execute(&mut *self.tx)
            .await?;

        let sql = format!(
            "INSERT INTO doctor_availability_rules ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            RULE_COLUMNS
        );
        for rule in rules {
            sqlx::query(&sql)
                .bind(rule.id)
                .bind(rule.doctor_id)
                .bind(rule.day_of_week)
                .bind(rule.start_time)
                .bind(rule.end_time)
                .bind(&rule.timezone)
                .bind(rule.slot_duration_minutes)
                .bind(rule.buffer_minutes)
                .bind(rule.is_blocked)
                .bind(rule.effective_from)
                .bind(rule.effective_to)
                .bind(rule.created_at)
                .execute(&mut *self.tx)
                .await
                .map_err(map_write_error)?;
        }
        Ok(())
    }

    async fn list_exceptions(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilityException>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM doctor_availability_exceptions WHERE doctor_id = $1 \
             ORDER BY date, sort_order",
            EXCEPTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(doctor_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(AvailabilityException::try_from).collect()
    }

    async fn replace_exceptions(
        &mut self,
        doctor_id: Uuid,
        exceptions: Vec<AvailabilityException>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM doctor_availability_exceptions WHERE doctor_id = $1")
            .bind(doctor_id)
            .execute(&mut *self.tx)
            .await?;

        let sql = format!(
            "INSERT INTO doctor_availability_exceptions ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            EXCEPTION_COLUMNS
        );
        for exception in exceptions {
            sqlx::query(&sql)
                .bind(exception.id)
                .bind(exception.doctor_id)
                .bind(exception.date)
                .bind(exception.is_unavailable)
                .bind(exception.is_blocking)
                .bind(exception.is_recurring)
                .bind(exception.recurrence_type.map(|r| r.as_str()))
                .bind(exception.recurrence_interval)
                .bind(exception.recurrence_until)
                .bind(exception.weekday)
                .bind(exception.start_time)
                .bind(exception.end_time)
                .bind(&exception.note)
                .bind(exception.sort_order)
                .bind(exception.created_at)
                .execute(&mut *self.tx)
                .await
                .map_err(map_write_error)?;
        }
        Ok(())
    }

    async fn get_appointment(
        &mut self,
        appointment_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE id = $1{}",
            APPOINTMENT_COLUMNS,
            lock_clause(lock)
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn find_confirmed_overlap(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM appointments \
             WHERE doctor_id = $1 AND status = 'CONFIRMED' \
               AND start_at < $3 AND end_at > $2 \
               AND ($4::uuid IS NULL OR id <> $4) \
             ORDER BY start_at LIMIT 1{}",
            APPOINTMENT_COLUMNS,
            lock_clause(lock)
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(doctor_id)
            .bind(start)
            .bind(end)
            .bind(exclude_appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn confirmed_in_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM appointments \
             WHERE doctor_id = $1 AND status = 'CONFIRMED' \
               AND start_at < $3 AND end_at > $2 \
             ORDER BY start_at",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(doctor_id)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *self.tx)
            .await?;
        into_appointments(rows)
    }

    async fn appointments_for_doctor(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE doctor_id = $1 ORDER BY start_at, created_at",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(doctor_id)
            .fetch_all(&mut *self.tx)
            .await?;
        into_appointments(rows)
    }

    async fn appointments_for_patient(
        &mut self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE patient_id = $1 ORDER BY start_at, created_at",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(patient_id)
            .fetch_all(&mut *self.tx)
            .await?;
        into_appointments(rows)
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO appointments ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            APPOINTMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(appointment.id)
            .bind(appointment.doctor_id)
            .bind(appointment.patient_id)
            .bind(appointment.start_at)
            .bind(appointment.end_at)
            .bind(&appointment.timezone)
            .bind(appointment.status.as_str())
            .bind(&appointment.call_provider)
            .bind(&appointment.call_room_id)
            .bind(appointment.call_status.as_str())
            .bind(appointment.fee_paid)
            .bind(&appointment.meeting_link)
            .bind(&appointment.notes)
            .bind(appointment.created_at)
            .bind(appointment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE appointments SET start_at = $2, end_at = $3, timezone = $4, status = $5, \
             call_provider = $6, call_room_id = $7, call_status = $8, fee_paid = $9, \
             meeting_link = $10, notes = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(appointment.id)
        .bind(appointment.start_at)
        .bind(appointment.end_at)
        .bind(&appointment.timezone)
        .bind(appointment.status.as_str())
        .bind(&appointment.call_provider)
        .bind(&appointment.call_room_id)
        .bind(appointment.call_status.as_str())
        .bind(appointment.fee_paid)
        .bind(&appointment.meeting_link)
        .bind(&appointment.notes)
        .bind(appointment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn waiting_list(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Vec<WaitingListEntry>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM waiting_list WHERE appointment_id = $1 ORDER BY position, created_at",
            WAITING_COLUMNS
        );
        let rows = sqlx::query_as::<_, WaitingRow>(&sql)
            .bind(appointment_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(WaitingListEntry::from).collect())
    }

    async fn waiting_list_head(
        &mut self,
        appointment_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<WaitingListEntry>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM waiting_list WHERE appointment_id = $1 \
             ORDER BY position, created_at LIMIT 1{}",
            WAITING_COLUMNS,
            lock_clause(lock)
        );
        let row = sqlx::query_as::<_, WaitingRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(WaitingListEntry::from))
    }

    async fn insert_waiting_entry(&mut self, entry: &WaitingListEntry) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO waiting_list ({}) VALUES ($1, $2, $3, $4, $5)",
            WAITING_COLUMNS
        );
        sqlx::query(&sql)
            .bind(entry.id)
            .bind(entry.appointment_id)
            .bind(entry.user_id)
            .bind(entry.position)
            .bind(entry.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn delete_waiting_entry(&mut self, entry_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM waiting_list WHERE id = $1")
            .bind(entry_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn set_waiting_position(
        &mut self,
        entry_id: Uuid,
        position: i32,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE waiting_list SET position = $2 WHERE id = $1")
            .bind(entry_id)
            .bind(position)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
