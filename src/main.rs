use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use orienta::api::router::service_router;
use orienta::api::types::ApiContext;
use orienta::audit::AuditSink;
use orienta::config::{self, Config};
use orienta::encounter::{EncounterDirectory, StaticDirectory};
use orienta::model::{BackoffPolicy, InvokerConfig, ModelInvoker, OpenAiCompatClient};
use orienta::pipeline::AnswerPipeline;
use orienta::policy::PolicyStore;
use orienta::rate_limit::{MemoryRateLimiter, RateLimiter, RedisRateLimiter};
use orienta::telemetry::Telemetry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = Config::from_env();

    let policies = Arc::new(PolicyStore::load(
        &config.safety_policy_path,
        &config.age_policy_path,
    ));
    let telemetry = Arc::new(Telemetry::new());

    let limiter = match &config.redis_url {
        Some(url) => {
            match RedisRateLimiter::connect(url, config.patient_per_minute, config.ip_per_minute)
                .await
            {
                Ok(limiter) => RateLimiter::Redis(limiter),
                Err(err) => {
                    tracing::error!(error = %err, "Shared rate limit store unreachable, using in-process limiter");
                    RateLimiter::Memory(MemoryRateLimiter::new(
                        config.patient_per_minute,
                        config.ip_per_minute,
                    ))
                }
            }
        }
        None => RateLimiter::Memory(MemoryRateLimiter::new(
            config.patient_per_minute,
            config.ip_per_minute,
        )),
    };

    let directory: Arc<dyn EncounterDirectory> = match &config.encounters_path {
        Some(path) => match StaticDirectory::from_json_file(path) {
            Ok(directory) => Arc::new(directory),
            Err(err) => {
                tracing::error!(error = %err, "Encounter seed unreadable, starting empty");
                Arc::new(StaticDirectory::new())
            }
        },
        None => Arc::new(StaticDirectory::new()),
    };

    let chat = OpenAiCompatClient::new(
        &config.model_base_url,
        &config.model_api_key,
        config.model_timeout,
    );
    let invoker = ModelInvoker::new(
        Box::new(chat),
        Arc::clone(&policies),
        Arc::clone(&telemetry),
        InvokerConfig {
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
            backoff: BackoffPolicy::new(config.model_retries, config.backoff_base),
        },
    );

    let audit = AuditSink::new(&config.pseudonym_salt, config.audit_log_path.as_deref());

    let pipeline = Arc::new(AnswerPipeline::new(
        limiter,
        Arc::clone(&policies),
        directory,
        invoker,
        audit,
        Arc::clone(&telemetry),
        config.primary_model.clone(),
    ));

    let ctx = ApiContext::new(pipeline, policies, telemetry);
    let app = service_router(ctx);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %config.bind_addr, error = %err, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr, "Listening");

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "Server error");
        std::process::exit(1);
    }
}
