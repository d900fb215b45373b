/// Curricula - curriculum content API
///
/// Accepts PDF uploads for course resources, optionally compresses them
/// with Ghostscript, serves them back and records app-open analytics.

mod analytics;
mod api;
mod auth;
mod blob_store;
mod compression;
mod config;
mod context;
mod db;
mod error;
mod jobs;
mod metrics;
mod rate_limit;
mod server;
mod upload;

use config::ServerConfig;
use context::AppContext;
use error::{CmsError, CmsResult};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> CmsResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    init_tracing(&config);

    // `curricula issue-admin-token <subject> [hours]` prints a bearer token and exits
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("issue-admin-token") {
        return issue_admin_token(&config, &args[1..]);
    }

    print_banner();

    error::set_expose_internal_errors(config.service.development);
    if config.service.development {
        tracing::warn!("Development mode: internal error details are returned to clients");
    }

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    let status = ctx.upload_pipeline.compression_status().await;
    tracing::info!(
        ghostscript_available = status.ghostscript_available,
        compression_enabled = status.compression_enabled,
        "{}",
        status.message
    );

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("curricula={},tower_http=info", config.logging.level).into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn issue_admin_token(config: &ServerConfig, args: &[String]) -> CmsResult<()> {
    config.validate()?;

    let subject = args
        .first()
        .ok_or_else(|| CmsError::Validation("Usage: issue-admin-token <subject> [hours]".to_string()))?;
    let hours: i64 = match args.get(1) {
        Some(h) => h
            .parse()
            .map_err(|_| CmsError::Validation(format!("Invalid hours: {}", h)))?,
        None => 24,
    };

    let token = auth::issue_token(
        &config.authentication.jwt_secret,
        subject,
        auth::ADMIN_ROLE,
        chrono::Duration::hours(hours),
    )?;
    println!("{}", token);

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______                _            __
  / ____/_  ____________(_)______  __/ /___ _
 / /   / / / / ___/ ___/ / ___/ / / / / __ `/
/ /___/ /_/ / /  / /  / / /__/ /_/ / / /_/ /
\____/\__,_/_/  /_/  /_/\___/\__,_/_/\__,_/

        Curriculum content API v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
