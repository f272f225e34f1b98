//! Login, sign-up and password reset forms.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{error, info};

use super::html::{error_line, escape, html_response, page};
use super::{
    DASHBOARD_PATH, PagesState, SIGN_UP_SUCCESS_PATH, UPDATE_PASSWORD_PATH, confirm_url,
};
use crate::auth::{MaybeSession, append_session_cookies};
use crate::provider::{OtpType, ProviderError, SessionTokens, SignUpMetadata};

const GENERIC_FAILURE: &str = "Something went wrong. Try again.";

/// Form page with an inline message, sent with `status`.
fn form_response(status: StatusCode, html: String) -> Response {
    let mut response = html_response(html);
    *response.status_mut() = status;
    response
}

/// Status and inline message for a provider failure.
fn failure(context: &str, e: ProviderError, rejected: StatusCode) -> (StatusCode, String) {
    match e {
        ProviderError::Rejected(msg) => (rejected, msg),
        transport @ ProviderError::Transport(_) => {
            error!(error = %transport, "{}", context);
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
        }
    }
}

/// 303 to `to`, storing the session if there is one.
fn redirect_with_session(to: &str, tokens: Option<&SessionTokens>, secure: bool) -> Response {
    let mut response = Redirect::to(to).into_response();
    if let Some(tokens) = tokens {
        append_session_cookies(response.headers_mut(), tokens, secure);
    }
    response
}

// =============================================================================
// Login
// =============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    email: String,
    password: String,
}

fn login_html(email: &str, error: Option<&str>) -> String {
    page(
        "Login",
        &format!(
            "<h1>Login</h1><p class=\"muted\">Enter your email below to login to your account</p>\
             <form method=\"post\" action=\"/auth/login\">\
             <label for=\"email\">Email</label>\
             <input id=\"email\" name=\"email\" type=\"email\" value=\"{}\" required>\
             <label for=\"password\">Password</label>\
             <input id=\"password\" name=\"password\" type=\"password\" required>\
             <a href=\"/auth/forgot-password\">Forgot your password?</a>\
             {}<button type=\"submit\">Login</button></form>\
             <p>Don&#39;t have an account? <a href=\"/auth/sign-up\">Sign up</a></p>",
            escape(email),
            error_line(error)
        ),
    )
}

pub async fn login_page() -> Response {
    html_response(login_html("", None))
}

pub async fn login_submit(State(state): State<PagesState>, Form(form): Form<LoginForm>) -> Response {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return form_response(
            StatusCode::BAD_REQUEST,
            login_html(email, Some("Email and password are required")),
        );
    }

    match state.provider.sign_in_with_password(email, &form.password).await {
        Ok(auth) => match auth.session {
            Some(tokens) => {
                info!(user = %auth.user.id, "Signed in");
                redirect_with_session(DASHBOARD_PATH, Some(&tokens), state.secure_cookies)
            }
            None => form_response(
                StatusCode::UNAUTHORIZED,
                login_html(email, Some("Email not confirmed")),
            ),
        },
        Err(e) => {
            let (status, msg) = failure("Sign-in failed", e, StatusCode::UNAUTHORIZED);
            form_response(status, login_html(email, Some(&msg)))
        }
    }
}

// =============================================================================
// Sign-up
// =============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SignUpForm {
    email: String,
    password: String,
    repeat_password: String,
    first_name: String,
    last_name: String,
}

fn sign_up_html(form: &SignUpForm, error: Option<&str>) -> String {
    page(
        "Sign up",
        &format!(
            "<h1>Sign up</h1><p class=\"muted\">Create a new account</p>\
             <form method=\"post\" action=\"/auth/sign-up\">\
             <label for=\"first_name\">First name</label>\
             <input id=\"first_name\" name=\"first_name\" value=\"{}\">\
             <label for=\"last_name\">Last name</label>\
             <input id=\"last_name\" name=\"last_name\" value=\"{}\">\
             <label for=\"email\">Email</label>\
             <input id=\"email\" name=\"email\" type=\"email\" value=\"{}\" required>\
             <label for=\"password\">Password</label>\
             <input id=\"password\" name=\"password\" type=\"password\" required>\
             <label for=\"repeat_password\">Repeat Password</label>\
             <input id=\"repeat_password\" name=\"repeat_password\" type=\"password\" required>\
             {}<button type=\"submit\">Sign up</button></form>\
             <p>Already have an account? <a href=\"/auth/login\">Login</a></p>",
            escape(&form.first_name),
            escape(&form.last_name),
            escape(&form.email),
            error_line(error)
        ),
    )
}

pub async fn sign_up_page() -> Response {
    html_response(sign_up_html(&SignUpForm::default(), None))
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub async fn sign_up_submit(
    State(state): State<PagesState>,
    Form(form): Form<SignUpForm>,
) -> Response {
    if form.password != form.repeat_password {
        return form_response(
            StatusCode::BAD_REQUEST,
            sign_up_html(&form, Some("Passwords must match")),
        );
    }
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return form_response(
            StatusCode::BAD_REQUEST,
            sign_up_html(&form, Some("Email and password are required")),
        );
    }

    let metadata = SignUpMetadata {
        first_name: non_blank(&form.first_name),
        last_name: non_blank(&form.last_name),
    };

    match state.provider.sign_up(email, &form.password, &metadata).await {
        Ok(auth) => {
            info!(user = %auth.user.id, "Account created");
            redirect_with_session(
                SIGN_UP_SUCCESS_PATH,
                auth.session.as_ref(),
                state.secure_cookies,
            )
        }
        Err(e) => {
            let (status, msg) = failure("Sign-up failed", e, StatusCode::BAD_REQUEST);
            form_response(status, sign_up_html(&form, Some(&msg)))
        }
    }
}

pub async fn sign_up_success_page() -> Response {
    html_response(page(
        "Thank you for signing up",
        "<h1>Thank you for signing up!</h1><p class=\"muted\">Check your email to confirm</p>\
         <p>You&#39;ve successfully signed up. Please check your email to confirm your account \
         before signing in.</p><p><a href=\"/auth/login\">Back to login</a></p>",
    ))
}

// =============================================================================
// Password reset
// =============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ForgotPasswordForm {
    email: String,
}

fn forgot_password_html(email: &str, error: Option<&str>) -> String {
    page(
        "Reset your password",
        &format!(
            "<h1>Forgot Password?</h1>\
             <p class=\"muted\">Type in your email and we&#39;ll send you a link to reset your password</p>\
             <form method=\"post\" action=\"/auth/forgot-password\">\
             <label for=\"email\">Email</label>\
             <input id=\"email\" name=\"email\" type=\"email\" value=\"{}\" required>\
             {}<button type=\"submit\">Send reset email</button></form>\
             <p>Already have an account? <a href=\"/auth/login\">Login</a></p>",
            escape(email),
            error_line(error)
        ),
    )
}

pub async fn forgot_password_page() -> Response {
    html_response(forgot_password_html("", None))
}

pub async fn forgot_password_submit(
    State(state): State<PagesState>,
    Form(form): Form<ForgotPasswordForm>,
) -> Response {
    let email = form.email.trim();
    if email.is_empty() {
        return form_response(
            StatusCode::BAD_REQUEST,
            forgot_password_html(email, Some("Email is required")),
        );
    }

    let redirect_to = confirm_url(&state.site_url);
    match state.provider.reset_password_for_email(email, &redirect_to).await {
        Ok(()) => html_response(page(
            "Email Sent",
            "<h1>Email Sent</h1><p class=\"muted\">Check your inbox for further steps</p>\
             <p>If you registered using your email and password, you will receive a password \
             reset email.</p>",
        )),
        Err(e) => {
            let (status, msg) = failure("Password reset failed", e, StatusCode::BAD_REQUEST);
            form_response(status, forgot_password_html(email, Some(&msg)))
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct UpdatePasswordForm {
    password: String,
}

fn update_password_html(error: Option<&str>) -> String {
    page(
        "Update Password",
        &format!(
            "<h1>Update Password</h1>\
             <p class=\"muted\">Enter your new password below to finish resetting your account.</p>\
             <form method=\"post\" action=\"/auth/update-password\">\
             <label for=\"password\">New Password</label>\
             <input id=\"password\" name=\"password\" type=\"password\" required>\
             {}<button type=\"submit\">Confirm Password Change</button></form>",
            error_line(error)
        ),
    )
}

pub async fn update_password_page() -> Response {
    html_response(update_password_html(None))
}

pub async fn update_password_submit(
    State(state): State<PagesState>,
    MaybeSession(user): MaybeSession,
    Form(form): Form<UpdatePasswordForm>,
) -> Response {
    let Some(user) = user else {
        return form_response(
            StatusCode::UNAUTHORIZED,
            update_password_html(Some("Auth session missing!")),
        );
    };
    if form.password.is_empty() {
        return form_response(
            StatusCode::BAD_REQUEST,
            update_password_html(Some("Password is required")),
        );
    }

    match state
        .provider
        .update_password(&user.access_token, &form.password)
        .await
    {
        Ok(_) => {
            info!(user = %user.user_id(), "Password updated");
            Redirect::to(DASHBOARD_PATH).into_response()
        }
        Err(e) => {
            let (status, msg) = failure("Password update failed", e, StatusCode::BAD_REQUEST);
            form_response(status, update_password_html(Some(&msg)))
        }
    }
}

// =============================================================================
// Email link confirmation
// =============================================================================

#[derive(Deserialize)]
pub struct ConfirmQuery {
    token_hash: Option<String>,
    #[serde(rename = "type")]
    kind: Option<OtpType>,
}

fn confirm_error_html(message: &str) -> String {
    page(
        "Link Error",
        &format!(
            "<h1>Sorry, something went wrong.</h1>{}\
             <p><a href=\"/auth/forgot-password\">Request a new link</a></p>",
            error_line(Some(message))
        ),
    )
}

/// Landing route for email links: swaps the token hash for a session and
/// continues to the page the link was for.
pub async fn confirm(State(state): State<PagesState>, Query(query): Query<ConfirmQuery>) -> Response {
    let (Some(token_hash), Some(kind)) = (query.token_hash, query.kind) else {
        return form_response(
            StatusCode::BAD_REQUEST,
            confirm_error_html("No token hash or type"),
        );
    };

    match state.provider.verify_otp(&token_hash, kind).await {
        Ok(auth) => {
            info!(user = %auth.user.id, kind = ?kind, "Email link verified");
            let next = match kind {
                OtpType::Recovery => UPDATE_PASSWORD_PATH,
                _ => DASHBOARD_PATH,
            };
            redirect_with_session(next, auth.session.as_ref(), state.secure_cookies)
        }
        Err(e) => {
            let (status, msg) = failure("Email link verification failed", e, StatusCode::BAD_REQUEST);
            form_response(status, confirm_error_html(&msg))
        }
    }
}
