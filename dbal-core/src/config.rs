use crate::error::{Error, Result};
use crate::validator;

/// Configuration for one adapter-backed client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// `dev` / `development`, `prod` / `production`, or `test`. Optional.
    pub mode: String,
    /// Symbolic backend tag, e.g. `sqlite` or `postgres`.
    pub adapter: String,
    /// Optional backend endpoint (cloud backends).
    pub endpoint: String,
    /// Connection string; the protocol must match `adapter`.
    pub database_url: String,
    pub sandbox_enabled: bool,
}

impl ClientConfig {
    /// Check mode, adapter, and database URL coherence.
    ///
    /// Called before any adapter is constructed, so a bad configuration can
    /// never replace a working one.
    pub fn validate(&self) -> Result<()> {
        self.validate_mode()?;

        if self.adapter.is_empty() {
            return Err(Error::Validation("Adapter type must be specified".to_string()));
        }
        if self.database_url.is_empty() {
            return Err(Error::Validation("Database URL must be specified".to_string()));
        }

        let validated = validator::validate_url(&self.database_url)
            .map_err(|e| Error::Validation(format!("Invalid database URL: {e}")))?;

        // postgres/postgresql are aliases; everything else must match exactly.
        let adapter = if self.adapter == "postgresql" { "postgres" } else { self.adapter.as_str() };
        if adapter != validated.adapter_type {
            return Err(Error::Validation(format!(
                "Adapter type '{}' does not match URL protocol '{}'",
                self.adapter, validated.adapter_type
            )));
        }

        Ok(())
    }

    fn validate_mode(&self) -> Result<()> {
        if self.mode.is_empty() {
            return Ok(());
        }
        match self.mode.to_ascii_lowercase().as_str() {
            "development" | "dev" | "production" | "prod" | "test" => Ok(()),
            _ => Err(Error::Validation(format!(
                "Invalid mode: {}. Valid modes: development, production, test",
                self.mode
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(adapter: &str, url: &str) -> ClientConfig {
        ClientConfig {
            adapter: adapter.to_string(),
            database_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_matching_adapter_and_url() {
        assert!(config("sqlite", "sqlite://:memory:").validate().is_ok());
        assert!(config("postgres", "postgres://localhost/app").validate().is_ok());
    }

    #[test]
    fn postgres_aliases_are_interchangeable() {
        assert!(config("postgres", "postgresql://localhost/app").validate().is_ok());
        assert!(config("postgresql", "postgres://localhost/app").validate().is_ok());
    }

    #[test]
    fn rejects_adapter_url_mismatch() {
        let err = config("mysql", "postgres://localhost/app").validate().unwrap_err();
        assert!(err.to_string().contains("does not match URL protocol"));
    }

    #[test]
    fn mode_is_optional_but_closed() {
        let mut cfg = config("sqlite", "sqlite://:memory:");
        for mode in ["", "dev", "Development", "PROD", "test"] {
            cfg.mode = mode.to_string();
            assert!(cfg.validate().is_ok(), "mode {mode:?} should be accepted");
        }
        cfg.mode = "staging".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(config("", "sqlite://:memory:").validate().is_err());
        assert!(config("sqlite", "").validate().is_err());
    }
}
