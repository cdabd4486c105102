use std::net::SocketAddr;

use thiserror::Error;

/// Failures while bringing the service up or running migrations.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind http listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to the flag database")]
    Connect(#[source] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("database url is not configured; set database.url or pass --database-url")]
    MissingDatabaseUrl,
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn bind_error_keeps_io_source() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().expect("addr");
        let err = InfraError::bind(addr, std::io::Error::other("address in use"));

        assert_eq!(err.to_string(), "failed to bind http listener on 127.0.0.1:3000");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("address in use")
        );
    }
}
