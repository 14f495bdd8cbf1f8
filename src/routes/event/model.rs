use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::access::Owned;
use crate::error::AppError;
use crate::membership::MemberSet;
use crate::routes::user::{CreatorRef, Directory, UserSummary};
use crate::upload::{Attachment, UploadForm};

const EVENT_COLUMNS: &str = "id, title, description, date, location, creator_id, file_path, \
     original_file_name, COALESCE(attendees, '{}') AS attendees, created_at, updated_at";

// 浏览器 datetime-local 控件给出的格式
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, FromRow)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub creator_id: String,
    pub file_path: Option<String>,
    pub original_file_name: Option<String>,
    #[sqlx(try_from = "Vec<String>")]
    pub attendees: MemberSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub file_path: Option<String>,
    pub original_file_name: Option<String>,
    pub creator: CreatorRef,
    pub attendees: Vec<UserSummary>,
    pub attendee_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub attachment: Option<Attachment>,
}

impl NewEvent {
    pub fn from_form(form: &mut UploadForm) -> Result<Self, AppError> {
        let title = form.required("title", "活动标题")?;
        let title_len = title.chars().count();
        if !(2..=100).contains(&title_len) {
            return Err(AppError::Validation("活动标题长度必须在2到100个字符之间".into()));
        }

        let description = form.required("description", "活动描述")?;
        let location = form.required("location", "活动地点")?;
        let raw_date = form.required("date", "活动时间")?;
        let date = parse_event_date(&raw_date)
            .ok_or_else(|| AppError::Validation(format!("无法识别的活动时间: {raw_date}")))?;

        Ok(NewEvent {
            title,
            description,
            date,
            location,
            attachment: form.attachment.take(),
        })
    }
}

/// 支持 RFC 3339、不带时区的本地时间（按 UTC 处理）和纯日期
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Some(date) = LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Some(date.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
}

impl Owned for Event {
    fn owner_id(&self) -> &str {
        &self.creator_id
    }

    fn denied_message(&self) -> &'static str {
        "只有活动创建者、教职工或管理员可以删除活动"
    }
}

impl Event {
    /// 新活动的报名列表为空
    pub async fn create(pool: &PgPool, new_event: NewEvent, creator_id: &str) -> Result<Self, sqlx::Error> {
        let (file_path, original_file_name) = match &new_event.attachment {
            Some(file) => (Some(file.stored_name.as_str()), Some(file.original_name.as_str())),
            None => (None, None),
        };
        let sql = format!(
            r#"
            INSERT INTO events (
                id, title, description, date, location, creator_id,
                file_path, original_file_name, attendees
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{{}}')
            RETURNING {EVENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Event>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&new_event.title)
            .bind(&new_event.description)
            .bind(new_event.date)
            .bind(&new_event.location)
            .bind(creator_id)
            .bind(file_path)
            .bind(original_file_name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&sql).bind(id).fetch_optional(pool).await
    }

    /// 按活动时间升序
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY date ASC");
        sqlx::query_as::<_, Event>(&sql).fetch_all(pool).await
    }

    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.creator_id.as_str()).chain(self.attendees.iter())
    }

    pub fn into_view(self, directory: &Directory) -> EventView {
        EventView {
            creator: directory.creator(&self.creator_id),
            attendees: directory.members(&self.attendees),
            attendee_count: self.attendees.len(),
            id: self.id,
            title: self.title,
            description: self.description,
            date: self.date,
            location: self.location,
            file_path: self.file_path,
            original_file_name: self.original_file_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub async fn populate(self, pool: &PgPool) -> Result<EventView, sqlx::Error> {
        let directory = Directory::load(pool, self.user_ids()).await?;
        Ok(self.into_view(&directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::membership::MemberField;

    #[test]
    fn event_dates_accept_common_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).unwrap();
        assert_eq!(parse_event_date("2025-03-14T18:30:00Z"), Some(expected));
        assert_eq!(parse_event_date("2025-03-15T00:00:00+05:30"), Some(expected));
        assert_eq!(parse_event_date("2025-03-14T18:30"), Some(expected));
        assert_eq!(parse_event_date(" 2025-03-14 18:30 "), Some(expected));
        assert_eq!(
            parse_event_date("2025-03-14"),
            Some(Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_event_date("next friday"), None);
    }

    fn event(attendees: Vec<String>) -> Event {
        Event {
            id: "e1".into(),
            title: "Hackathon".into(),
            description: "24 hours of code".into(),
            date: Utc::now(),
            location: "Main hall".into(),
            creator_id: "a".into(),
            file_path: None,
            original_file_name: None,
            attendees: attendees.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn attendee_ids(set: &MemberSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rsvp_sequence_for_creator_and_guest(pool: PgPool) -> sqlx::Result<()> {
        for id in ["a", "b"] {
            sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES ($1, $1, $2, 'x')")
                .bind(id)
                .bind(format!("{id}@campus.edu"))
                .execute(&pool)
                .await?;
        }
        let new_event = NewEvent {
            title: "Hackathon".into(),
            description: "24 hours of code".into(),
            date: Utc::now(),
            location: "Main hall".into(),
            attachment: None,
        };

        let created = Event::create(&pool, new_event, "a").await?;
        assert!(created.attendees.is_empty());

        let rsvp = MemberField::EventAttendees;
        let attendees = rsvp.toggle(&pool, &created.id, "a").await?.unwrap();
        assert_eq!(attendee_ids(&attendees), ["a"]);
        let attendees = rsvp.toggle(&pool, &created.id, "a").await?.unwrap();
        assert!(attendees.is_empty());
        let attendees = rsvp.toggle(&pool, &created.id, "b").await?.unwrap();
        assert_eq!(attendee_ids(&attendees), ["b"]);

        let stored = Event::find_by_id(&pool, &created.id).await?.unwrap();
        assert_eq!(attendee_ids(&stored.attendees), ["b"]);
        Ok(())
    }

    #[test]
    fn view_counts_attendees() {
        let view = event(vec!["a".into(), "b".into()]).into_view(&Directory::default());
        assert_eq!(view.attendee_count, 2);
        assert_eq!(view.creator.id, "a");
        assert!(view.attendees.is_empty());
    }
}
