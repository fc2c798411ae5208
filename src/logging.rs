use tracing_subscriber::{fmt, EnvFilter};

/// Production gets JSON lines for the log pipeline, development gets the
/// human-readable format.
pub fn init_tracing(environment: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,aws_config=warn"));

    if environment == "production" {
        fmt().with_env_filter(env_filter).json().init();
    } else {
        fmt().with_env_filter(env_filter).with_target(false).init();
    }
}
