//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::provider::{IdentityProvider, MemoryProvider, SupabaseProvider};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

const ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderKind {
    /// Hosted Supabase project
    #[default]
    Supabase,
    /// In-process provider for local development; nothing is persisted
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "SpeakUp",
    about = "Classroom Q&A gateway with provider-backed sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Identity provider backend
    #[arg(long, value_enum, default_value = "supabase")]
    pub provider: ProviderKind,

    /// Supabase project URL (e.g., "https://xyz.supabase.co")
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Path to file containing the Supabase anon key. Prefer the SUPABASE_ANON_KEY env var instead
    #[arg(long)]
    pub anon_key_file: Option<String>,

    /// Public URL of this site, used in password reset links (e.g., "https://speakup.example.com")
    #[arg(long, default_value = "http://localhost:3000")]
    pub site_url: String,

    /// Rate-limit clients by the X-Forwarded-For header. Only enable behind a trusted proxy
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the anon key from environment variable or file.
/// Returns None and logs an error if the key cannot be loaded.
///
/// Clears the environment variable, so it must run before any other thread
/// is started.
pub fn load_anon_key(anon_key_file: Option<&str>) -> Option<String> {
    let key = if let Ok(key) = std::env::var(ANON_KEY_ENV) {
        // Clear the environment variable to prevent leaking
        // SAFETY: called from `main` before the async runtime and its worker
        // threads exist, so nothing reads the environment concurrently.
        unsafe { std::env::remove_var(ANON_KEY_ENV) };
        key
    } else if let Some(path) = anon_key_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read anon key file");
                return None;
            }
        }
    } else {
        error!(
            "Supabase anon key is required. Set SUPABASE_ANON_KEY environment variable (recommended) or use --anon-key-file"
        );
        return None;
    };

    if key.trim().is_empty() {
        error!("Supabase anon key is empty");
        return None;
    }

    Some(key.trim().to_string())
}

/// Parse and validate a URL that must be HTTPS unless it points at localhost.
/// Returns None and logs an error if validation fails.
fn validate_https_url(name: &str, value: &str) -> Option<Url> {
    let url = match Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %value, error = %e, "Invalid {} URL", name);
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if !is_https && !is_localhost {
        error!("{} must use HTTPS for non-localhost deployments", name);
        return None;
    }

    Some(url)
}

/// Parse and validate the site URL.
pub fn validate_site_url(site_url: &str) -> Option<Url> {
    validate_https_url("site-url", site_url)
}

/// Build the configured identity provider.
/// Returns None and logs an error if it cannot be configured.
pub fn build_provider(args: &Args) -> Option<Arc<dyn IdentityProvider>> {
    match args.provider {
        ProviderKind::Supabase => {
            let Some(raw_url) = args.supabase_url.as_deref() else {
                error!("Supabase URL is required. Set SUPABASE_URL or use --supabase-url");
                return None;
            };
            let url = validate_https_url("supabase-url", raw_url)?;
            let anon_key = load_anon_key(args.anon_key_file.as_deref())?;
            info!(url = %url, "Using Supabase provider");
            Some(Arc::new(SupabaseProvider::new(url, anon_key)))
        }
        ProviderKind::Memory => {
            warn!("Using in-memory provider: accounts and rows are lost on restart");
            let secret = uuid::Uuid::new_v4();
            Some(Arc::new(MemoryProvider::new(secret.as_bytes())))
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    provider: Arc<dyn IdentityProvider>,
    site_url: Url,
    trust_forwarded_for: bool,
) -> ServerConfig {
    let secure_cookies = site_url.scheme() == "https";

    ServerConfig {
        provider,
        site_url,
        secure_cookies,
        trust_forwarded_for,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_url_requires_https_off_localhost() {
        assert!(validate_site_url("http://localhost:3000").is_some());
        assert!(validate_site_url("https://speakup.example.com").is_some());
        assert!(validate_site_url("http://speakup.example.com").is_none());
        assert!(validate_site_url("not a url").is_none());
    }

    #[test]
    fn test_secure_cookies_follow_scheme() {
        let provider: Arc<dyn IdentityProvider> = Arc::new(MemoryProvider::new(b"cli-secret"));

        let config = build_config(
            provider.clone(),
            Url::parse("https://speakup.example.com").unwrap(),
            false,
        );
        assert!(config.secure_cookies);

        let config = build_config(provider, Url::parse("http://localhost:3000").unwrap(), true);
        assert!(!config.secure_cookies);
        assert!(config.trust_forwarded_for);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["speakup", "--provider", "memory"]);
        assert_eq!(args.port, 3000);
        assert_eq!(args.provider, ProviderKind::Memory);
        assert_eq!(args.site_url, "http://localhost:3000");
        assert!(!args.trust_forwarded_for);
    }

    // `main` builds the provider before the runtime exists
    #[test]
    fn test_build_supabase_provider_without_runtime() {
        let key_file = std::env::temp_dir().join(format!("speakup-anon-{}", uuid::Uuid::new_v4()));
        std::fs::write(&key_file, "anon-key\n").unwrap();

        let args = Args::parse_from([
            "speakup",
            "--supabase-url",
            "https://project.supabase.co",
            "--anon-key-file",
            key_file.to_str().unwrap(),
        ]);
        assert!(build_provider(&args).is_some());

        std::fs::remove_file(key_file).unwrap();
    }
}
