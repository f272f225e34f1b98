//! Recent groups, sessions and questions shown on the dashboard.

use chrono::{DateTime, Utc};
use futures::try_join;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use crate::provider::{IdentityProvider, ProviderError, Row, RowQuery};

pub const RECENT_GROUPS: usize = 4;
pub const RECENT_SESSIONS: usize = 4;
pub const RECENT_QUESTIONS: usize = 6;

/// Row ids may be integers or uuids depending on the table.
fn id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// `null` and missing both read as `false`.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn opt_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructor_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassSession {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_answered: bool,
    #[serde(default, deserialize_with = "opt_id_text")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Live,
    Upcoming,
    Past,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Live => "Live now",
            Self::Upcoming => "Upcoming",
            Self::Past => "Past",
        }
    }

    /// Live within `[start, end]`, upcoming before `start`, past otherwise
    /// (including when the times are missing or unreadable).
    pub fn at(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) if s <= now && now <= e => Self::Live,
            (Some(s), _) if now < s => Self::Upcoming,
            _ => Self::Past,
        }
    }
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl ClassSession {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        parse_time(self.start_time.as_deref())
    }

    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        SessionStatus::at(self.starts_at(), parse_time(self.end_time.as_deref()), now)
    }
}

impl Question {
    /// Link target: the question inside its session, or on its own.
    pub fn href(&self) -> String {
        match &self.session_id {
            Some(session) => format!("/sessions/{}?q={}", session, self.id),
            None => format!("/questions/{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecentActivity {
    pub groups: Vec<Group>,
    pub sessions: Vec<ClassSession>,
    pub questions: Vec<Question>,
}

fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> Result<Vec<T>, ProviderError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| {
                ProviderError::transport(format!("unreadable {} row: {}", table, e))
            })
        })
        .collect()
}

async fn fetch<T: DeserializeOwned>(
    provider: &dyn IdentityProvider,
    access_token: &str,
    query: RowQuery,
) -> Result<Vec<T>, ProviderError> {
    let rows = provider.select(Some(access_token), &query).await?;
    decode_rows(&query.table, rows)
}

async fn fetch_all(
    provider: &dyn IdentityProvider,
    access_token: &str,
) -> Result<RecentActivity, ProviderError> {
    let (groups, sessions, questions) = try_join!(
        fetch::<Group>(
            provider,
            access_token,
            RowQuery::from("groups")
                .select("id, name, instructor_name, created_at")
                .order("created_at", false)
                .limit(RECENT_GROUPS),
        ),
        fetch::<ClassSession>(
            provider,
            access_token,
            RowQuery::from("sessions")
                .select("id, name, group_id, start_time, end_time")
                .order("start_time", false)
                .limit(RECENT_SESSIONS),
        ),
        fetch::<Question>(
            provider,
            access_token,
            RowQuery::from("questions")
                .select("id, title, is_answered, created_at, session_id")
                .order("created_at", false)
                .limit(RECENT_QUESTIONS),
        ),
    )?;

    Ok(RecentActivity {
        groups,
        sessions,
        questions,
    })
}

/// Run the three dashboard queries concurrently. If any of them fails, all
/// three lists are empty.
pub async fn load_recent(provider: &dyn IdentityProvider, access_token: &str) -> RecentActivity {
    match fetch_all(provider, access_token).await {
        Ok(activity) => activity,
        Err(e) => {
            warn!(error = %e, "Dashboard queries failed, showing empty lists");
            RecentActivity::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_session_status() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert_eq!(
            SessionStatus::at(Some(now - hour), Some(now + hour), now),
            SessionStatus::Live
        );
        assert_eq!(
            SessionStatus::at(Some(now + hour), None, now),
            SessionStatus::Upcoming
        );
        assert_eq!(
            SessionStatus::at(Some(now - hour), None, now),
            SessionStatus::Past
        );
        assert_eq!(SessionStatus::at(None, None, now), SessionStatus::Past);
    }

    #[test]
    fn test_unreadable_time_is_past() {
        let session = ClassSession {
            id: "1".into(),
            name: Some("Lecture".into()),
            start_time: Some("yesterday".into()),
            end_time: None,
        };
        assert_eq!(session.status(Utc::now()), SessionStatus::Past);
    }

    #[test]
    fn test_question_href() {
        let mut question: Question =
            serde_json::from_value(json!({ "id": 7, "title": "Why?", "session_id": 3 })).unwrap();
        assert_eq!(question.href(), "/sessions/3?q=7");
        question.session_id = None;
        assert_eq!(question.href(), "/questions/7");
    }

    #[tokio::test]
    async fn test_load_recent_orders_and_limits() {
        let provider = MemoryProvider::new(b"dashboard-secret");
        for i in 0..6 {
            provider.insert_row(
                "groups",
                json!({
                    "id": i,
                    "name": format!("Group {}", i),
                    "created_at": format!("2024-01-0{}T00:00:00Z", i + 1),
                }),
            );
        }
        provider.insert_row(
            "questions",
            json!({ "id": "q1", "title": "First", "is_answered": true, "created_at": "2024-01-01T00:00:00Z" }),
        );

        let activity = load_recent(&provider, "token").await;
        assert_eq!(activity.groups.len(), RECENT_GROUPS);
        assert_eq!(activity.groups[0].name.as_deref(), Some("Group 5"));
        assert!(activity.sessions.is_empty());
        assert_eq!(activity.questions.len(), 1);
        assert!(activity.questions[0].is_answered);
    }

    #[tokio::test]
    async fn test_load_recent_failure_empties_everything() {
        let provider = MemoryProvider::new(b"dashboard-secret");
        provider.insert_row("groups", json!({ "id": 1, "name": "Physics" }));
        provider.set_fail_queries(true);

        let activity = load_recent(&provider, "token").await;
        assert!(activity.groups.is_empty());
        assert!(activity.sessions.is_empty());
        assert!(activity.questions.is_empty());
    }

    #[tokio::test]
    async fn test_null_columns_are_kept() {
        let provider = MemoryProvider::new(b"dashboard-secret");
        provider.insert_row("groups", json!({ "id": 1, "name": "Physics" }));
        provider.insert_row("groups", json!({ "id": 2, "name": null }));
        provider.insert_row(
            "questions",
            json!({ "id": 5, "title": null, "is_answered": null }),
        );

        let activity = load_recent(&provider, "token").await;
        assert_eq!(activity.groups.len(), 2);
        assert_eq!(activity.questions.len(), 1);
        assert!(!activity.questions[0].is_answered);
    }

    #[tokio::test]
    async fn test_row_without_id_empties_everything() {
        let provider = MemoryProvider::new(b"dashboard-secret");
        provider.insert_row("groups", json!({ "id": 1, "name": "Physics" }));
        provider.insert_row("sessions", json!({ "name": "Lecture 1" }));

        let activity = load_recent(&provider, "token").await;
        assert!(activity.groups.is_empty());
        assert!(activity.sessions.is_empty());
    }
}
