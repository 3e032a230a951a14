use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub availability_max_range_days: i64,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            database_url: String::new(),
            database_max_connections: 10,
            availability_max_range_days: 60,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, falling back to the in-memory store");
                    String::new()
                }),
            database_max_connections: parse_or_default(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            availability_max_range_days: parse_or_default(
                "AVAILABILITY_MAX_RANGE_DAYS",
                defaults.availability_max_range_days,
            ),
            server_port: parse_or_default("SERVER_PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Token validation is impossible without the JWT secret.
    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_database_configured(&self) -> bool {
        !self.database_url.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_not_configured() {
        let config = AppConfig::default();

        assert!(!config.is_configured());
        assert!(!config.is_supabase_configured());
        assert!(!config.is_database_configured());
        assert_eq!(config.availability_max_range_days, 60);
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_configured_flags() {
        let config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            database_url: "postgres://localhost/amae".to_string(),
            ..AppConfig::default()
        };

        assert!(config.is_configured());
        assert!(config.is_supabase_configured());
        assert!(config.is_database_configured());
    }
}
