use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// HTML is rendered per request and carries session state.
pub const NO_CACHE: &str = "no-store";

/// Pages are plain markup and forms: no scripts at all.
pub const PAGE_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; img-src 'self' https: data:; form-action 'self'; frame-ancestors 'none'; base-uri 'none'";

/// Escape text for element content and double-quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:56rem;margin:2rem auto;padding:0 1rem}\
form{display:flex;flex-direction:column;gap:.5rem;max-width:24rem}\
.error{color:#b91c1c}.muted{color:#6b7280}.card{border:1px solid #e5e7eb;border-radius:.5rem;padding:1rem;margin:1rem 0}\
.badge{font-size:.75rem;padding:.1rem .5rem;border-radius:.25rem;background:#f3f4f6}\
header{display:flex;justify-content:space-between;align-items:center}\
.avatar{width:2rem;height:2rem;border-radius:50%}";

/// Wrap `body` in the document shell.
pub fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{} | SpeakUp</title><style>{}</style></head><body>{}</body></html>",
        escape(title),
        STYLE,
        body
    )
}

/// Inline error paragraph, empty when there is nothing to report.
pub fn error_line(error: Option<&str>) -> String {
    match error {
        Some(msg) => format!("<p class=\"error\" role=\"alert\">{}</p>", escape(msg)),
        None => String::new(),
    }
}

/// Serve a rendered page with CSP and no-cache headers.
pub fn html_response(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, NO_CACHE),
            (header::CONTENT_SECURITY_POLICY, PAGE_CSP),
        ],
        body,
    )
        .into_response()
}
