//! Protected dashboard and the sign-out action.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use super::PagesState;
use super::html::{escape, html_response, page};
use crate::auth::{LOGIN_PATH, RequireSession, append_cleared_cookies, sign_out};
use crate::dashboard::{RecentActivity, load_recent};
use crate::profile::{ProfileView, enrich};
use crate::provider::User;

fn profile_menu(profile: &ProfileView, user: &User) -> String {
    let avatar = match &profile.avatar_url {
        Some(url) => format!(
            "<img class=\"avatar\" src=\"{}\" alt=\"Profile\">",
            escape(url)
        ),
        None => format!(
            "<span class=\"avatar badge\">{}</span>",
            escape(&profile.initials)
        ),
    };
    format!(
        "<details class=\"profile-menu\"><summary aria-label=\"Open profile menu\">{}</summary>\
         <p><strong>{}</strong></p><p class=\"muted\">{}</p>\
         <a href=\"/account\">Profile</a>\
         <form method=\"post\" action=\"/auth/sign-out\"><button type=\"submit\">Logout</button></form>\
         </details>",
        avatar,
        escape(&profile.display_name),
        escape(user.email.as_deref().unwrap_or("Signed in")),
    )
}

fn groups_card(activity: &RecentActivity) -> String {
    let items = if activity.groups.is_empty() {
        "<p class=\"muted\">You\u{2019}re not in any groups yet. Join one with a code, or create a new class.</p>"
            .to_string()
    } else {
        activity
            .groups
            .iter()
            .map(|g| {
                format!(
                    "<div class=\"card\"><strong>{}</strong><div class=\"muted\">{}</div>\
                     <a href=\"/groups/{}\">Go to Group</a></div>",
                    escape(g.name.as_deref().unwrap_or("Untitled group")),
                    escape(g.instructor_name.as_deref().unwrap_or("\u{2014}")),
                    escape(&g.id)
                )
            })
            .collect()
    };
    format!(
        "<section class=\"card\"><h2>Your Groups</h2><a href=\"/groups\">View all</a>{}</section>",
        items
    )
}

fn sessions_card(activity: &RecentActivity) -> String {
    let now = Utc::now();
    let items = if activity.sessions.is_empty() {
        "<p class=\"muted\">No sessions yet. When a professor starts a lecture, it\u{2019}ll show up here.</p>"
            .to_string()
    } else {
        activity
            .sessions
            .iter()
            .map(|s| {
                let starts = s
                    .starts_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "\u{2014}".to_string());
                format!(
                    "<div class=\"card\"><strong>{}</strong><div class=\"muted\">{}</div>\
                     <span class=\"badge\">{}</span> <a href=\"/sessions/{}\">View Questions</a></div>",
                    escape(s.name.as_deref().unwrap_or("Untitled session")),
                    escape(&starts),
                    s.status(now).label(),
                    escape(&s.id)
                )
            })
            .collect()
    };
    format!(
        "<section class=\"card\"><h2>Recent Sessions</h2><a href=\"/recent-sessions\">View all</a>{}</section>",
        items
    )
}

fn activity_card(activity: &RecentActivity) -> String {
    let items = if activity.questions.is_empty() {
        "<p class=\"muted\">No questions yet. Ask away during your next session, without interrupting.</p>"
            .to_string()
    } else {
        activity
            .questions
            .iter()
            .map(|q| {
                format!(
                    "<a class=\"card\" href=\"{}\"><strong>{}</strong> <span class=\"badge\">{}</span></a>",
                    escape(&q.href()),
                    escape(q.title.as_deref().unwrap_or("Untitled question")),
                    if q.is_answered { "Answered" } else { "Unanswered" }
                )
            })
            .collect()
    };
    format!(
        "<section class=\"card\"><h2>Recent Activity</h2>\
         <p class=\"muted\">Track your questions and answers.</p>\
         <a href=\"/questions\">View all</a>{}\
         <p><a href=\"/sessions/live\">Join Live Session</a></p></section>",
        items
    )
}

fn dashboard_html(user: &User, profile: &ProfileView, activity: &RecentActivity) -> String {
    page(
        "Dashboard",
        &format!(
            "<header><nav><a href=\"/\"><strong>SpeakUp</strong></a> \
             <a href=\"/groups\">Groups</a> <a href=\"/sessions\">Sessions</a></nav>{}</header>\
             <main><h1>Hey, {}</h1>\
             <p class=\"muted\">Jump back into your classes, lectures, and Q&amp;A without interrupting the professor.</p>\
             <p><a href=\"/groups/join\">Join Group</a> <a href=\"/groups/new\">Create Group</a></p>\
             {}{}{}</main>",
            profile_menu(profile, user),
            escape(profile.greeting_name()),
            groups_card(activity),
            sessions_card(activity),
            activity_card(activity),
        ),
    )
}

pub async fn dashboard(
    State(state): State<PagesState>,
    RequireSession(session): RequireSession,
) -> Response {
    let provider = state.provider.as_ref();

    let activity = load_recent(provider, &session.access_token).await;

    let user = match provider.get_user(&session.access_token).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!(user = %session.user_id(), "Session user no longer exists");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
        Err(e) => {
            warn!(error = %e, "User lookup failed, redirecting to login");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
    };

    let profile = enrich(provider, &session.access_token, &user.id).await;
    html_response(dashboard_html(&user, &profile, &activity))
}

/// Sign out and return to the login page, whatever the provider says.
pub async fn sign_out_action(State(state): State<PagesState>, headers: HeaderMap) -> Response {
    sign_out(state.provider.as_ref(), &headers).await;

    let mut response = Redirect::to(LOGIN_PATH).into_response();
    append_cleared_cookies(response.headers_mut());
    response
}
