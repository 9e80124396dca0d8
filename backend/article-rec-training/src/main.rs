use anyhow::Context;
use article_rec_training::{jobs::run_training_job, Config};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // LOG_FORMAT=json for structured output in the scheduler
    let json_logs = std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));
    let fmt_layer = if json_logs {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(site = %config.site, strategy = ?config.strategy, "Configuration loaded");

    let stats = match run_training_job(config).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(
                error = %e,
                input_contract_violation = e.is_input_contract_violation(),
                "Training job aborted"
            );
            return Err(e).context("Training job failed");
        }
    };

    info!(
        model_id = %stats.model_id,
        recommendations = stats.recommendations,
        total_ms = stats.timings.total().as_millis() as u64,
        "Done"
    );
    Ok(())
}
