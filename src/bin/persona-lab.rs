use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use persona_lab::monetization::metrics::DEFAULT_MAX_EVENTS;
use persona_lab::server::{PersonaLabState, logging, router};
use persona_lab::{
    MonetizationConfig, PersonaLabError, PolicySet, QuotaGuard, SafetyConfig, SafetyGuard,
};

#[derive(Debug, Parser)]
#[command(name = "persona-lab", about = "Persona A/B service with daily quota metering")]
struct Cli {
    #[arg(long, env = "APP_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "APP_PORT", default_value_t = 8001)]
    port: u16,
    /// Enables `POST /admin/monetization/reset`.
    #[arg(long, env = "PERSONA_LAB_ADMIN_TOKEN")]
    admin_token: Option<String>,
    /// Persona weight tables (`.json` or `.toml`); built-in tables otherwise.
    #[arg(long, env = "PERSONA_LAB_POLICIES")]
    policies: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_MAX_EVENTS)]
    metrics_max_events: usize,
    #[arg(long)]
    json_logs: bool,
    #[arg(long)]
    otel: bool,
    #[arg(long)]
    otel_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let otel_guard = attach_otel(cli.otel, cli.otel_endpoint.as_deref(), cli.json_logs)?;
    if otel_guard.is_none() {
        logging::init_logging(cli.json_logs)?;
    }

    let config = MonetizationConfig::from_env().map_err(PersonaLabError::from)?;
    let safety = SafetyConfig::from_env().map_err(PersonaLabError::from)?;
    let policies = match cli.policies.as_deref() {
        Some(path) => PolicySet::load(path).map_err(PersonaLabError::from)?,
        None => PolicySet::default(),
    };

    tracing::info!(
        enabled = config.enabled,
        free_tier_daily_requests = config.free_tier_daily_requests,
        allow_header_plans = config.allow_header_plans,
        policies = %policies.names().collect::<Vec<_>>().join(","),
        "monetization configured"
    );
    tracing::info!(
        kill_switch = safety.kill_switch,
        max_prompt_chars = safety.max_prompt_chars,
        denylist_len = safety.denylist.len(),
        "safety preflight configured"
    );

    let mut state = PersonaLabState::new(QuotaGuard::new(config))
        .with_policies(policies)
        .with_safety(SafetyGuard::new(safety))
        .with_metrics_max_events(cli.metrics_max_events);
    if let Some(token) = cli.admin_token {
        state = state.with_admin_token(token);
    }

    let app = router(state);
    let listen = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, "persona-lab listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    tracing::info!("persona-lab stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(feature = "otel")]
fn attach_otel(
    enabled: bool,
    endpoint: Option<&str>,
    json_logs: bool,
) -> Result<Option<logging::OtelGuard>, Box<dyn std::error::Error>> {
    if !enabled && endpoint.is_none() {
        return Ok(None);
    }
    Ok(Some(logging::init_tracing("persona-lab", endpoint, json_logs)?))
}

#[cfg(not(feature = "otel"))]
fn attach_otel(
    enabled: bool,
    endpoint: Option<&str>,
    _json_logs: bool,
) -> Result<Option<()>, Box<dyn std::error::Error>> {
    if enabled || endpoint.is_some() {
        return Err("otel requires `--features otel`".into());
    }
    Ok(None)
}
