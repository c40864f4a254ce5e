use drupe_core::config as core_config;
use drupe_core::error::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct BackofficeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub auth: AuthPolicyConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
    pub hub: HubConfig,
    pub inventory: InventoryConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub staging_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPolicyConfig {
    /// Failed logins before the account is locked.
    pub lock_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub idle_ttl_seconds: u64,
    pub sweep_period_seconds: u64,
    pub remember_me_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub principal_limit: u32,
    pub principal_window_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub ingress_capacity: usize,
    pub max_outbound: usize,
    pub ping_interval_seconds: u64,
    pub drain_deadline_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    pub low_stock_threshold: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    pub emitter_enabled: bool,
    pub emitter_interval_seconds: u64,
}

impl BackofficeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = BackofficeConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("drupe-backoffice"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
                staging_token_expiry_minutes: parse_env(
                    "JWT_STAGING_TOKEN_EXPIRY_MINUTES",
                    "5",
                    is_prod,
                )?,
            },
            auth: AuthPolicyConfig {
                lock_threshold: parse_env("AUTH_LOCK_THRESHOLD", "5", is_prod)?,
            },
            session: SessionConfig {
                idle_ttl_seconds: parse_env("SESSION_IDLE_TTL_SECONDS", "1800", is_prod)?,
                sweep_period_seconds: parse_env("SESSION_SWEEP_PERIOD_SECONDS", "60", is_prod)?,
                remember_me_days: parse_env("SESSION_REMEMBER_ME_DAYS", "30", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                principal_limit: parse_env("RATE_LIMIT_PRINCIPAL_LIMIT", "100", is_prod)?,
                principal_window_seconds: parse_env(
                    "RATE_LIMIT_PRINCIPAL_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    "900",
                    is_prod,
                )?,
            },
            hub: HubConfig {
                ingress_capacity: parse_env("HUB_INGRESS_CAPACITY", "256", is_prod)?,
                max_outbound: parse_env("HUB_MAX_OUTBOUND", "64", is_prod)?,
                ping_interval_seconds: parse_env("HUB_PING_INTERVAL_SECONDS", "30", is_prod)?,
                drain_deadline_seconds: parse_env("HUB_DRAIN_DEADLINE_SECONDS", "5", is_prod)?,
            },
            inventory: InventoryConfig {
                low_stock_threshold: parse_env("LOW_STOCK_THRESHOLD", "10", is_prod)?,
            },
            demo: DemoConfig {
                emitter_enabled: parse_env("DEMO_EMITTER_ENABLED", "false", is_prod)?,
                emitter_interval_seconds: parse_env(
                    "DEMO_EMITTER_INTERVAL_SECONDS",
                    "10",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.jwt.secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 bytes"
            )));
        }

        if self.session.sweep_period_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_SWEEP_PERIOD_SECONDS must be greater than 0"
            )));
        }

        if self.hub.max_outbound == 0 || self.hub.ingress_capacity == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HUB_MAX_OUTBOUND and HUB_INGRESS_CAPACITY must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
