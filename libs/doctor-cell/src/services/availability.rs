use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{BookingStore, BookingTx};
use shared_models::scheduling::{AvailabilityException, AvailabilityRule};

use crate::models::{
    AvailabilityError, AvailabilityExceptionIn, AvailabilityRuleIn, AvailableSlot,
    BulkAvailabilityIn,
};
use crate::services::generator;

pub struct AvailabilityService {
    config: Arc<AppConfig>,
    store: Arc<dyn BookingStore>,
}

fn build_rules(
    doctor_id: Uuid,
    rules: Vec<AvailabilityRuleIn>,
) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
    rules.iter().try_for_each(AvailabilityRuleIn::validate)?;
    Ok(rules.into_iter().map(|rule| rule.into_rule(doctor_id)).collect())
}

fn build_exceptions(
    doctor_id: Uuid,
    exceptions: Vec<AvailabilityExceptionIn>,
) -> Result<Vec<AvailabilityException>, AvailabilityError> {
    exceptions.iter().try_for_each(AvailabilityExceptionIn::validate)?;
    Ok(exceptions
        .into_iter()
        .enumerate()
        .map(|(index, item)| item.into_exception(doctor_id, index as i32))
        .collect())
}

impl AvailabilityService {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn BookingStore>) -> Self {
        Self { config, store }
    }

    // ==========================================================================
    // RULES AND EXCEPTIONS
    // ==========================================================================

    /// Replace the doctor's whole rule set and return the stored result.
    pub async fn replace_rules(
        &self,
        doctor_id: Uuid,
        rules: Vec<AvailabilityRuleIn>,
    ) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        let rules = build_rules(doctor_id, rules)?;
        let count = rules.len();

        let mut tx = self.store.begin().await?;
        tx.replace_rules(doctor_id, rules).await?;
        let stored = tx.list_rules(doctor_id).await?;
        tx.commit().await?;

        info!("Replaced availability rules for doctor {} ({} rules)", doctor_id, count);
        Ok(stored)
    }

    pub async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        let mut tx = self.store.begin().await?;
        let rules = tx.list_rules(doctor_id).await?;
        tx.rollback().await?;
        Ok(rules)
    }

    pub async fn replace_exceptions(
        &self,
        doctor_id: Uuid,
        exceptions: Vec<AvailabilityExceptionIn>,
    ) -> Result<Vec<AvailabilityException>, AvailabilityError> {
        let exceptions = build_exceptions(doctor_id, exceptions)?;
        let count = exceptions.len();

        let mut tx = self.store.begin().await?;
        tx.replace_exceptions(doctor_id, exceptions).await?;
        let stored = tx.list_exceptions(doctor_id).await?;
        tx.commit().await?;

        info!("Replaced availability exceptions for doctor {} ({} exceptions)", doctor_id, count);
        Ok(stored)
    }

    pub async fn list_exceptions(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilityException>, AvailabilityError> {
        let mut tx = self.store.begin().await?;
        let exceptions = tx.list_exceptions(doctor_id).await?;
        tx.rollback().await?;
        Ok(exceptions)
    }

    /// Replace rules and exceptions together; either both sets change or neither.
    pub async fn replace_all(
        &self,
        doctor_id: Uuid,
        bulk: BulkAvailabilityIn,
    ) -> Result<(Vec<AvailabilityRule>, Vec<AvailabilityException>), AvailabilityError> {
        let rules = build_rules(doctor_id, bulk.rules)?;
        let exceptions = build_exceptions(doctor_id, bulk.exceptions)?;

        let mut tx = self.store.begin().await?;
        tx.replace_rules(doctor_id, rules).await?;
        tx.replace_exceptions(doctor_id, exceptions).await?;
        let stored_rules = tx.list_rules(doctor_id).await?;
        let stored_exceptions = tx.list_exceptions(doctor_id).await?;
        tx.commit().await?;

        info!(
            "Bulk replaced availability for doctor {} ({} rules, {} exceptions)",
            doctor_id,
            stored_rules.len(),
            stored_exceptions.len()
        );
        Ok((stored_rules, stored_exceptions))
    }

    // ==========================================================================
    // SLOT GENERATION
    // ==========================================================================

    pub fn validate_range(&self, date_from: NaiveDate, date_to: NaiveDate) -> Result<(), AvailabilityError> {
        if date_to < date_from {
            return Err(AvailabilityError::ValidationError(
                "date_to must be >= date_from".to_string(),
            ));
        }
        let max_days = self.config.availability_max_range_days;
        if (date_to - date_from).num_days() > max_days {
            return Err(AvailabilityError::ValidationError(format!(
                "Date range cannot exceed {} days",
                max_days
            )));
        }
        Ok(())
    }

    pub async fn generate_slots(
        &self,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<AvailableSlot>, AvailabilityError> {
        self.validate_range(date_from, date_to)?;
        debug!("Generating slots for doctor {} from {} to {}", doctor_id, date_from, date_to);

        let mut tx = self.store.begin().await?;
        let slots = Self::generate_in(tx.as_mut(), doctor_id, date_from, date_to).await;
        tx.rollback().await?;
        slots
    }

    async fn generate_in(
        tx: &mut dyn BookingTx,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<AvailableSlot>, AvailabilityError> {
        let rules = tx.list_rules(doctor_id).await?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        let exceptions = tx.list_exceptions(doctor_id).await?;

        // Local days can start up to a day away from the UTC day, so widen the
        // appointment window on both sides.
        let window_start = (date_from - Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let window_end = (date_to + Duration::days(2)).and_time(NaiveTime::MIN).and_utc();
        let confirmed = tx.confirmed_in_window(doctor_id, window_start, window_end).await?;

        Ok(generator::generate_slots(&rules, &exceptions, &confirmed, date_from, date_to))
    }
}
