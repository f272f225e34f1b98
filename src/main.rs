use clap::Parser;
use speakup::cli::{Args, build_config, build_provider, init_logging, validate_site_url};
use speakup::{ServerConfig, run_server};
use tokio::net::TcpListener;
use tracing::{error, info};

async fn serve(config: ServerConfig, port: u16) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(
        address = %listener.local_addr()?,
        secure_cookies = config.secure_cookies,
        "Listening"
    );
    run_server(config, listener).await
}

// The runtime is started by hand: the provider setup reads and clears
// environment variables, which must happen before any worker thread exists.
fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(site_url) = validate_site_url(&args.site_url) else {
        std::process::exit(1);
    };

    let Some(provider) = build_provider(&args) else {
        std::process::exit(1);
    };

    let config = build_config(provider, site_url, args.trust_forwarded_for);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start the async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config, args.port)) {
        error!(port = args.port, error = %e, "Server error");
        std::process::exit(1);
    }
}
