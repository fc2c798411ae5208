use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    pub region: String,
    pub stream_table: String,
    pub chatroom_table: String,
    pub message_table: String,
    /// Overrides the regional endpoint, for local DynamoDB in development.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub http_port: u16,
    pub grpc_port: u16,

    pub user_service_address: String,
    /// REST base used when the user directory is unreachable over gRPC.
    pub user_service_http_fallback: String,

    pub dynamodb: DynamoDbConfig,
    pub redis: RedisConfig,

    pub kinesis_stream_name: String,
    pub s3_bucket_name: String,

    /// Hard ceiling for any single store or directory call.
    pub operation_timeout: Duration,
    pub grpc_request_timeout: Duration,
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let environment = get_env("ENVIRONMENT", "development");

        let http_port: u16 = get_env_parsed("HTTP_PORT", 8084);
        let grpc_port: u16 = get_env_parsed("GRPC_PORT", 9090);
        if http_port == grpc_port {
            return Err(AppError::Config(format!(
                "HTTP_PORT and GRPC_PORT must differ (both {http_port})"
            )));
        }

        let user_service_address = get_env("USER_SERVICE_ADDRESS", "http://user-service:8082");
        let user_service_http_fallback =
            get_env("USER_SERVICE_HTTP_FALLBACK", "http://user-service:8000");

        let dynamodb = DynamoDbConfig {
            region: get_env("AWS_REGION", "us-east-1"),
            stream_table: get_env("DYNAMODB_STREAM_TABLE", "streams"),
            chatroom_table: get_env("DYNAMODB_CHATROOM_TABLE", "chatrooms"),
            message_table: get_env("DYNAMODB_MESSAGE_TABLE", "messages"),
            endpoint: env::var("DYNAMODB_ENDPOINT").ok().filter(|v| !v.is_empty()),
        };

        let redis = RedisConfig {
            addr: get_env("REDIS_ADDR", "localhost:6379"),
            password: get_env("REDIS_PASSWORD", ""),
            db: get_env_parsed("REDIS_DB", 0),
        };

        Ok(Self {
            environment,
            http_port,
            grpc_port,
            user_service_address,
            user_service_http_fallback,
            dynamodb,
            redis,
            kinesis_stream_name: get_env("KINESIS_STREAM_NAME", "stream-events"),
            s3_bucket_name: get_env("S3_BUCKET_NAME", "stream-recordings"),
            operation_timeout: Duration::from_secs(get_env_parsed("OPERATION_TIMEOUT_SECS", 10)),
            grpc_request_timeout: Duration::from_secs(get_env_parsed("GRPC_TIMEOUT_SECS", 10)),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment != "production"
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            environment: "development".into(),
            http_port: 8084,
            grpc_port: 9090,
            user_service_address: "http://localhost:8082".into(),
            user_service_http_fallback: "http://localhost:8000".into(),
            dynamodb: DynamoDbConfig {
                region: "us-east-1".into(),
                stream_table: "streams".into(),
                chatroom_table: "chatrooms".into(),
                message_table: "messages".into(),
                endpoint: None,
            },
            redis: RedisConfig {
                addr: "localhost:6379".into(),
                password: String::new(),
                db: 0,
            },
            kinesis_stream_name: "stream-events".into(),
            s3_bucket_name: "stream-recordings".into(),
            operation_timeout: Duration::from_secs(10),
            grpc_request_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_without_password() {
        let cfg = RedisConfig {
            addr: "localhost:6379".into(),
            password: String::new(),
            db: 2,
        };
        assert_eq!(cfg.url(), "redis://localhost:6379/2");
    }

    #[test]
    fn redis_url_with_password() {
        let cfg = RedisConfig {
            addr: "redis:6379".into(),
            password: "hunter2".into(),
            db: 0,
        };
        assert_eq!(cfg.url(), "redis://:hunter2@redis:6379/0");
    }
}
