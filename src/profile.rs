//! Display attributes for the signed-in user.

use serde_json::Value;
use tracing::{debug, warn};

use crate::provider::{IdentityProvider, Row, RowQuery};

/// Name shown when the profile has none.
pub const FALLBACK_NAME: &str = "there";

/// Initials shown when the profile has no name.
pub const FALLBACK_INITIALS: &str = "U";

const PROFILE_TABLE: &str = "users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub display_name: String,
    pub first_name: Option<String>,
    pub avatar_url: Option<String>,
    pub initials: String,
}

impl Default for ProfileView {
    fn default() -> Self {
        Self {
            display_name: FALLBACK_NAME.to_string(),
            first_name: None,
            avatar_url: None,
            initials: FALLBACK_INITIALS.to_string(),
        }
    }
}

fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}

fn initial(name: Option<&String>) -> Option<String> {
    name.and_then(|n| n.chars().next())
        .map(|c| c.to_uppercase().collect())
}

impl ProfileView {
    pub fn from_row(row: &Row) -> Self {
        let first_name = text(row, "first_name");
        let last_name = text(row, "last_name");

        let parts: Vec<&str> = [first_name.as_deref(), last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let display_name = if parts.is_empty() {
            FALLBACK_NAME.to_string()
        } else {
            parts.join(" ")
        };

        let initials: String = [initial(first_name.as_ref()), initial(last_name.as_ref())]
            .into_iter()
            .flatten()
            .collect();

        Self {
            display_name,
            avatar_url: text(row, "avatar_url").or_else(|| text(row, "avatar_path")),
            initials: if initials.is_empty() {
                FALLBACK_INITIALS.to_string()
            } else {
                initials
            },
            first_name,
        }
    }

    /// Greeting name: the first name, or the fallback.
    pub fn greeting_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or(FALLBACK_NAME)
    }
}

/// Look up the profile row of `user_id`. Never fails: errors and missing rows
/// give the default view.
pub async fn enrich(provider: &dyn IdentityProvider, access_token: &str, user_id: &str) -> ProfileView {
    let query = RowQuery::from(PROFILE_TABLE).select("*").eq("id", user_id);

    match provider.maybe_single(Some(access_token), &query).await {
        Ok(Some(row)) => ProfileView::from_row(&row),
        Ok(None) => {
            debug!(user = %user_id, "No profile row");
            ProfileView::default()
        }
        Err(e) => {
            warn!(user = %user_id, error = %e, "Profile lookup failed");
            ProfileView::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_full_name_and_initials() {
        let view = ProfileView::from_row(&row(json!({
            "first_name": "Jordan", "last_name": "lee", "avatar_path": "a/b.png"
        })));
        assert_eq!(view.display_name, "Jordan lee");
        assert_eq!(view.initials, "JL");
        assert_eq!(view.greeting_name(), "Jordan");
        assert_eq!(view.avatar_url.as_deref(), Some("a/b.png"));
    }

    #[test]
    fn test_blank_names_fall_back() {
        let view = ProfileView::from_row(&row(json!({
            "first_name": "  ", "last_name": null
        })));
        assert_eq!(view.display_name, "there");
        assert_eq!(view.initials, "U");
        assert_eq!(view.greeting_name(), "there");
    }

    #[test]
    fn test_last_name_only() {
        let view = ProfileView::from_row(&row(json!({ "last_name": "Okafor" })));
        assert_eq!(view.display_name, "Okafor");
        assert_eq!(view.initials, "O");
        assert!(view.first_name.is_none());
    }

    #[test]
    fn test_avatar_url_preferred_over_path() {
        let view = ProfileView::from_row(&row(json!({
            "avatar_url": "https://cdn.example.com/a.png", "avatar_path": "a.png"
        })));
        assert_eq!(
            view.avatar_url.as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }

    #[tokio::test]
    async fn test_enrich_missing_row() {
        let provider = MemoryProvider::new(b"profile-secret");
        let view = enrich(&provider, "token", "nobody").await;
        assert_eq!(view, ProfileView::default());
        assert_eq!(view.display_name, "there");
        assert!(view.avatar_url.is_none());
    }

    #[tokio::test]
    async fn test_enrich_query_failure() {
        let provider = MemoryProvider::new(b"profile-secret");
        provider.insert_row("users", json!({ "id": "u1", "first_name": "Jordan" }));
        provider.set_fail_queries(true);

        let view = enrich(&provider, "token", "u1").await;
        assert_eq!(view, ProfileView::default());
    }

    #[tokio::test]
    async fn test_enrich_scoped_to_user() {
        let provider = MemoryProvider::new(b"profile-secret");
        provider.insert_row("users", json!({ "id": "u1", "first_name": "Jordan" }));
        provider.insert_row("users", json!({ "id": "u2", "first_name": "Sam" }));

        let view = enrich(&provider, "token", "u2").await;
        assert_eq!(view.display_name, "Sam");
    }
}
