use chrono::{DateTime, Duration, Utc};
use libsql::Row;
use serde::Serialize;

use crate::account::Accounts;
use crate::api::Page;
use crate::db::{Database, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::helpers;
use crate::model::{Appointment, AppointmentStatus, User};

const APPOINTMENT_COLUMNS: &str =
    "id, subject, details, date, status, user_id, created_at, updated_at";

/// Listing row enriched with the booking user, for the admin view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentWithUser {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Default)]
pub struct AppointmentFilter<'f> {
    pub status: Option<AppointmentStatus>,
    pub user_id: Option<&'f str>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    pub total_appointments: u64,
    pub pending_appointments: u64,
    pub confirmed_appointments: u64,
    pub completed_appointments: u64,
    pub cancelled_appointments: u64,
    pub upcoming_this_week: u64,
}

pub struct Appointments<'a> {
    db: &'a Database,
}

impl<'a> Appointments<'a> {
    pub fn new(db: &'a Database) -> Self {
        Appointments { db }
    }

    fn appointment_from_row(row: &Row) -> AppResult<Appointment> {
        let status_raw: String = row.get(4)?;
        let status = AppointmentStatus::from_str(&status_raw).ok_or_else(|| {
            AppError::Store(anyhow::anyhow!("invalid appointment status: {status_raw}"))
        })?;
        Ok(Appointment {
            id: row.get(0)?,
            subject: row.get(1)?,
            details: row.get(2)?,
            date: parse_timestamp(&row.get::<String>(3)?)?,
            status,
            user_id: row.get(5)?,
            created_at: parse_timestamp(&row.get::<String>(6)?)?,
            updated_at: parse_timestamp(&row.get::<String>(7)?)?,
        })
    }

    pub async fn create(
        &self,
        user: &User,
        subject: String,
        details: String,
        date: DateTime<Utc>,
    ) -> AppResult<Appointment> {
        if date <= Utc::now() {
            return Err(AppError::Validation(
                "Appointment date must be in the future".to_string(),
            ));
        }

        let _guard = self.db.begin_write().await?;
        let result = self.create_inner(user, subject, details, date).await;
        self.db.finish_write(result).await
    }

    async fn create_inner(
        &self,
        user: &User,
        subject: String,
        details: String,
        date: DateTime<Utc>,
    ) -> AppResult<Appointment> {
        let now = Utc::now();
        let appointment = Appointment {
            id: helpers::generate_appointment_id(&user.id),
            subject,
            details,
            date,
            status: AppointmentStatus::Pending,
            user_id: user.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let query = format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.db
            .connection()
            .execute(
                &query,
                libsql::params![
                    appointment.id.clone(),
                    appointment.subject.clone(),
                    appointment.details.clone(),
                    format_timestamp(&appointment.date),
                    appointment.status.as_str(),
                    appointment.user_id.clone(),
                    format_timestamp(&appointment.created_at),
                    format_timestamp(&appointment.updated_at),
                ],
            )
            .await?;

        let accounts = Accounts::new(self.db);
        let mut owner = accounts
            .get_user(&user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        owner.appointments.push(appointment.clone());
        owner.updated_at = now;
        accounts.replace_user(&owner).await?;

        Ok(appointment)
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Appointment>> {
        let query = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::appointment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        filter: AppointmentFilter<'_>,
        page: Page,
    ) -> AppResult<(Vec<AppointmentWithUser>, u64)> {
        let clause = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR user_id = ?2) \
                      AND (?3 IS NULL OR date >= ?3) AND (?4 IS NULL OR date <= ?4)";
        let query = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE {clause} \
             ORDER BY date ASC LIMIT ?5 OFFSET ?6"
        );
        let count_query = format!("SELECT COUNT(*) FROM appointments WHERE {clause}");

        let status = filter.status.map(|s| s.as_str().to_string());
        let user_id = filter.user_id.map(|u| u.to_string());
        let start = filter.start_date.as_ref().map(format_timestamp);
        let end = filter.end_date.as_ref().map(format_timestamp);

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    status.clone(),
                    user_id.clone(),
                    start.clone(),
                    end.clone(),
                    page.limit as i64,
                    page.offset as i64
                ],
            )
            .await?;
        let mut appointments = Vec::new();
        while let Some(row) = rows.next().await? {
            appointments.push(Self::appointment_from_row(&row)?);
        }

        let mut rows = self
            .db
            .connection()
            .query(&count_query, libsql::params![status, user_id, start, end])
            .await?;
        let total = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as u64,
            None => 0,
        };

        let accounts = Accounts::new(self.db);
        let mut enriched = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let user = accounts.get_user(&appointment.user_id).await?;
            enriched.push(AppointmentWithUser {
                user_name: user.as_ref().map(|u| u.full_name()),
                user_email: user.map(|u| u.email),
                appointment,
            });
        }

        Ok((enriched, total))
    }

    /// Reschedules or rewords an appointment. Completed and cancelled
    /// bookings are frozen.
    pub async fn update(
        &self,
        id: &str,
        subject: Option<String>,
        details: Option<String>,
        date: Option<DateTime<Utc>>,
    ) -> AppResult<Appointment> {
        let _guard = self.db.begin_write().await?;
        let result = self.update_inner(id, subject, details, date).await;
        self.db.finish_write(result).await
    }

    async fn update_inner(
        &self,
        id: &str,
        subject: Option<String>,
        details: Option<String>,
        date: Option<DateTime<Utc>>,
    ) -> AppResult<Appointment> {
        let mut appointment = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

        if matches!(
            appointment.status,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        ) {
            return Err(AppError::Validation(
                "Cannot update a completed or cancelled appointment".to_string(),
            ));
        }

        if let Some(subject) = subject {
            appointment.subject = subject;
        }
        if let Some(details) = details {
            appointment.details = details;
        }
        if let Some(date) = date {
            if date <= Utc::now() {
                return Err(AppError::Validation(
                    "Appointment date must be in the future".to_string(),
                ));
            }
            appointment.date = date;
        }
        appointment.updated_at = Utc::now();

        self.persist(&appointment).await?;
        self.mirror(&appointment, true).await?;
        Ok(appointment)
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> AppResult<Appointment> {
        let _guard = self.db.begin_write().await?;
        let result = self.update_status_inner(id, status).await;
        self.db.finish_write(result).await
    }

    async fn update_status_inner(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> AppResult<Appointment> {
        let mut appointment = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

        appointment.status = status;
        appointment.updated_at = Utc::now();

        self.persist(&appointment).await?;
        self.mirror(&appointment, true).await?;
        Ok(appointment)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let _guard = self.db.begin_write().await?;
        let result = self.delete_inner(id).await;
        self.db.finish_write(result).await
    }

    async fn delete_inner(&self, id: &str) -> AppResult<()> {
        let appointment = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

        self.db
            .connection()
            .execute("DELETE FROM appointments WHERE id = ?", libsql::params![id])
            .await?;

        self.mirror(&appointment, false).await?;
        Ok(())
    }

    async fn persist(&self, appointment: &Appointment) -> AppResult<()> {
        self.db
            .connection()
            .execute(
                "UPDATE appointments SET subject = ?, details = ?, date = ?, status = ?, \
                 updated_at = ? WHERE id = ?",
                libsql::params![
                    appointment.subject.clone(),
                    appointment.details.clone(),
                    format_timestamp(&appointment.date),
                    appointment.status.as_str(),
                    format_timestamp(&appointment.updated_at),
                    appointment.id.clone()
                ],
            )
            .await?;
        Ok(())
    }

    async fn mirror(&self, appointment: &Appointment, keep: bool) -> AppResult<()> {
        let accounts = Accounts::new(self.db);
        if let Some(mut user) = accounts.get_user(&appointment.user_id).await? {
            if keep {
                if let Some(entry) = user
                    .appointments
                    .iter_mut()
                    .find(|a| a.id == appointment.id)
                {
                    *entry = appointment.clone();
                }
            } else {
                user.appointments.retain(|a| a.id != appointment.id);
            }
            user.updated_at = Utc::now();
            accounts.replace_user(&user).await?;
        }
        Ok(())
    }

    pub async fn stats(&self) -> AppResult<AppointmentStats> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT status, COUNT(*) FROM appointments GROUP BY status",
                (),
            )
            .await?;
        let mut stats = AppointmentStats {
            total_appointments: 0,
            pending_appointments: 0,
            confirmed_appointments: 0,
            completed_appointments: 0,
            cancelled_appointments: 0,
            upcoming_this_week: 0,
        };
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count = row.get::<i64>(1)? as u64;
            stats.total_appointments += count;
            match AppointmentStatus::from_str(&status) {
                Some(AppointmentStatus::Pending) => stats.pending_appointments = count,
                Some(AppointmentStatus::Confirmed) => stats.confirmed_appointments = count,
                Some(AppointmentStatus::Completed) | Some(AppointmentStatus::Successful) => {
                    stats.completed_appointments += count
                }
                Some(AppointmentStatus::Cancelled) => stats.cancelled_appointments = count,
                None => tracing::warn!("unknown appointment status: {}", status),
            }
        }

        let now = Utc::now();
        let week_out = now + Duration::days(7);
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT COUNT(*) FROM appointments WHERE date >= ? AND date <= ? \
                 AND status IN ('pending', 'confirmed')",
                libsql::params![format_timestamp(&now), format_timestamp(&week_out)],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            stats.upcoming_this_week = row.get::<i64>(0)? as u64;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PageParams;
    use crate::model::Role;

    async fn seed_user(db: &Database, id: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: "Visitor".to_string(),
            email: format!("{id}@example.com"),
            phone_number: "5551234".to_string(),
            password_hash: "digest".to_string(),
            role: Role::User,
            brought_books: vec![],
            borrowed_books: vec![],
            transaction_history: vec![],
            comments: vec![],
            appointments: vec![],
            cart: vec![],
            created_at: now,
            updated_at: now,
        };
        Accounts::new(db).insert_user(&user).await.unwrap();
        user
    }

    fn default_page() -> Page {
        PageParams {
            page: None,
            limit: None,
        }
        .resolve()
    }

    #[tokio::test]
    async fn create_mirrors_into_the_account() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_apt").await;

        let appointments = Appointments::new(&db);
        let appointment = appointments
            .create(
                &user,
                "Research help".to_string(),
                "Need help finding sources for a thesis".to_string(),
                Utc::now() + Duration::days(3),
            )
            .await
            .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert!(appointment.id.starts_with("apt_"));

        let account = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(account.appointments.len(), 1);
        assert_eq!(account.appointments[0].id, appointment.id);
    }

    #[tokio::test]
    async fn rejects_past_dates() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_past").await;

        let err = Appointments::new(&db)
            .create(
                &user,
                "Too late".to_string(),
                "This slot has already gone by".to_string(),
                Utc::now() - Duration::hours(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn frozen_states_reject_edits() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_frozen").await;

        let appointments = Appointments::new(&db);
        let appointment = appointments
            .create(
                &user,
                "Book pickup".to_string(),
                "Collecting a reserved first edition".to_string(),
                Utc::now() + Duration::days(1),
            )
            .await
            .unwrap();

        appointments
            .update_status(&appointment.id, AppointmentStatus::Cancelled)
            .await
            .unwrap();

        let err = appointments
            .update(&appointment.id, Some("New subject".to_string()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn status_change_reaches_the_embedded_copy() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_confirm").await;

        let appointments = Appointments::new(&db);
        let appointment = appointments
            .create(
                &user,
                "Reading room".to_string(),
                "Reserve a quiet desk for the afternoon".to_string(),
                Utc::now() + Duration::days(2),
            )
            .await
            .unwrap();

        appointments
            .update_status(&appointment.id, AppointmentStatus::Confirmed)
            .await
            .unwrap();

        let account = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(
            account.appointments[0].status,
            AppointmentStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn list_filters_by_status_and_window() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_list").await;

        let appointments = Appointments::new(&db);
        let soon = appointments
            .create(
                &user,
                "Soon".to_string(),
                "Happening in a couple of days".to_string(),
                Utc::now() + Duration::days(2),
            )
            .await
            .unwrap();
        appointments
            .create(
                &user,
                "Later".to_string(),
                "Happening far in the future".to_string(),
                Utc::now() + Duration::days(30),
            )
            .await
            .unwrap();

        let filter = AppointmentFilter {
            end_date: Some(Utc::now() + Duration::days(7)),
            ..Default::default()
        };
        let (rows, total) = appointments.list(filter, default_page()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].appointment.id, soon.id);
        assert_eq!(rows[0].user_email.as_deref(), Some("user_list@example.com"));

        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        };
        let (_, total) = appointments.list(filter, default_page()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn delete_removes_the_mirror_too() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_rm").await;

        let appointments = Appointments::new(&db);
        let appointment = appointments
            .create(
                &user,
                "Cancelled plans".to_string(),
                "No longer needed, removing it".to_string(),
                Utc::now() + Duration::days(4),
            )
            .await
            .unwrap();

        appointments.delete(&appointment.id).await.unwrap();

        assert!(appointments.get(&appointment.id).await.unwrap().is_none());
        let account = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert!(account.appointments.is_empty());
    }

    #[tokio::test]
    async fn stats_count_upcoming_bookings() {
        let db = Database::open_in_memory().await.unwrap();
        let user = seed_user(&db, "user_counts").await;

        let appointments = Appointments::new(&db);
        appointments
            .create(
                &user,
                "This week".to_string(),
                "Falls inside the seven day window".to_string(),
                Utc::now() + Duration::days(3),
            )
            .await
            .unwrap();
        let far = appointments
            .create(
                &user,
                "Next month".to_string(),
                "Falls outside the seven day window".to_string(),
                Utc::now() + Duration::days(20),
            )
            .await
            .unwrap();
        appointments
            .update_status(&far.id, AppointmentStatus::Cancelled)
            .await
            .unwrap();

        let stats = appointments.stats().await.unwrap();
        assert_eq!(stats.total_appointments, 2);
        assert_eq!(stats.pending_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
        assert_eq!(stats.upcoming_this_week, 1);
    }
}
