//! Administrative SQL sessions against source and destination.
//!
//! Every call opens its own session and closes it when done, so session
//! settings such as `session_replication_role` do not outlive the call.

mod tls;

pub use tls::SslMode;

use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::Result;

/// Suppresses FK and user triggers for the issuing session.
pub const DISABLE_CONSTRAINTS_SQL: &str = "SET session_replication_role = 'replica';";

/// Restores normal trigger and FK enforcement for the issuing session.
pub const ENABLE_CONSTRAINTS_SQL: &str = "SET session_replication_role = 'origin';";

/// Trait for administrative SQL against an endpoint.
#[async_trait]
pub trait SqlAdmin: Send + Sync {
    /// Open a session and run a trivial liveness probe.
    async fn ping(&self, endpoint: &EndpointConfig) -> Result<()>;

    /// Open a session and run one or more statements.
    async fn batch_execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<()>;
}

/// Admin sessions over tokio-postgres.
#[derive(Debug, Default, Clone)]
pub struct PgAdmin;

impl PgAdmin {
    /// Create a new admin.
    pub fn new() -> Self {
        Self
    }

    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Client> {
        let mut pg_config = PgConfig::new();
        pg_config
            .host(&endpoint.host)
            .port(endpoint.port)
            .dbname(&endpoint.database)
            .user(&endpoint.user)
            .password(&endpoint.password)
            .application_name("pg-dump-migrate");
        if let Some(secs) = endpoint.connect_timeout_secs {
            pg_config.connect_timeout(Duration::from_secs(secs));
        }

        let mode = SslMode::parse(&endpoint.ssl_mode)?;
        pg_config.ssl_mode(if mode.requires_tls() {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        });

        let client = match tls::make_connector(mode)? {
            Some(connector) => {
                let (client, connection) = pg_config.connect(connector).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("Admin session closed with error: {}", e);
                    }
                });
                client
            }
            None => {
                let (client, connection) = pg_config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("Admin session closed with error: {}", e);
                    }
                });
                client
            }
        };

        debug!("Opened admin session to {}", endpoint.describe());
        Ok(client)
    }
}

#[async_trait]
impl SqlAdmin for PgAdmin {
    async fn ping(&self, endpoint: &EndpointConfig) -> Result<()> {
        let client = self.connect(endpoint).await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn batch_execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<()> {
        let client = self.connect(endpoint).await?;
        client.batch_execute(sql).await?;
        Ok(())
    }
}

/// What the destination cleanup removes.
#[derive(Debug, Clone)]
pub struct CleanupPlan {
    pub schemas: Vec<String>,
    pub drop_sequences: bool,
    pub drop_enum_types: bool,
}

impl CleanupPlan {
    /// Render the cleanup as a single `DO` block.
    ///
    /// Referential checks are switched off for the duration and restored
    /// before the block ends; if any drop fails the whole statement rolls
    /// back, including the setting.
    pub fn to_sql(&self) -> String {
        let schemas = format!(
            "ARRAY[{}]::text[]",
            self.schemas
                .iter()
                .map(|s| sql_literal(s))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut sql = String::from("DO $$\nDECLARE\n    r RECORD;\nBEGIN\n");
        sql.push_str("    EXECUTE 'SET session_replication_role = ''replica''';\n");

        sql.push_str(&format!(
            "    FOR r IN SELECT schemaname, tablename FROM pg_tables \
             WHERE schemaname = ANY({schemas}) LOOP\n        \
             EXECUTE format('DROP TABLE IF EXISTS %I.%I CASCADE', r.schemaname, r.tablename);\n    \
             END LOOP;\n"
        ));

        if self.drop_sequences {
            sql.push_str(&format!(
                "    FOR r IN SELECT schemaname, sequencename FROM pg_sequences \
                 WHERE schemaname = ANY({schemas}) LOOP\n        \
                 EXECUTE format('DROP SEQUENCE IF EXISTS %I.%I CASCADE', r.schemaname, r.sequencename);\n    \
                 END LOOP;\n"
            ));
        }

        if self.drop_enum_types {
            sql.push_str(&format!(
                "    FOR r IN SELECT n.nspname, t.typname FROM pg_type t \
                 JOIN pg_namespace n ON n.oid = t.typnamespace \
                 WHERE t.typtype = 'e' AND n.nspname = ANY({schemas}) LOOP\n        \
                 EXECUTE format('DROP TYPE IF EXISTS %I.%I CASCADE', r.nspname, r.typname);\n    \
                 END LOOP;\n"
            ));
        }

        sql.push_str("    EXECUTE 'SET session_replication_role = ''origin''';\n");
        sql.push_str("END $$;");
        sql
    }
}

/// Quote a string as a SQL literal.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> CleanupPlan {
        CleanupPlan {
            schemas: vec!["public".to_string()],
            drop_sequences: true,
            drop_enum_types: true,
        }
    }

    #[test]
    fn test_cleanup_sql_toggles_replication_role_around_drops() {
        let sql = plan().to_sql();
        let replica = sql.find("''replica''").unwrap();
        let drop_table = sql.find("DROP TABLE IF EXISTS").unwrap();
        let origin = sql.find("''origin''").unwrap();

        assert!(sql.starts_with("DO $$"));
        assert!(sql.ends_with("END $$;"));
        assert!(replica < drop_table && drop_table < origin);
    }

    #[test]
    fn test_cleanup_sql_quotes_identifiers() {
        let sql = plan().to_sql();
        assert!(sql.contains("format('DROP TABLE IF EXISTS %I.%I CASCADE'"));
        assert!(sql.contains("ANY(ARRAY['public']::text[])"));
    }

    #[test]
    fn test_cleanup_sql_optional_objects() {
        let sql = plan().to_sql();
        assert!(sql.contains("DROP SEQUENCE IF EXISTS"));
        assert!(sql.contains("DROP TYPE IF EXISTS"));

        let tables_only = CleanupPlan {
            drop_sequences: false,
            drop_enum_types: false,
            ..plan()
        }
        .to_sql();
        assert!(tables_only.contains("DROP TABLE IF EXISTS"));
        assert!(!tables_only.contains("DROP SEQUENCE"));
        assert!(!tables_only.contains("DROP TYPE"));
    }

    #[test]
    fn test_cleanup_sql_escapes_schema_names() {
        let sql = CleanupPlan {
            schemas: vec!["public".to_string(), "o'neil".to_string()],
            ..plan()
        }
        .to_sql();
        assert!(sql.contains("ARRAY['public', 'o''neil']::text[]"));
    }

    #[test]
    fn test_cleanup_sql_only_drops_what_exists() {
        // Every DROP is guarded and iterates over catalog rows, so an empty
        // schema runs no DROP at all and a second run is a no-op.
        let sql = plan().to_sql();
        let drops: Vec<usize> = sql.match_indices("DROP ").map(|(i, _)| i).collect();
        assert_eq!(drops.len(), 3);

        for &at in &drops {
            let stmt = &sql[at..];
            assert!(
                stmt.starts_with("DROP TABLE IF EXISTS %I.%I CASCADE")
                    || stmt.starts_with("DROP SEQUENCE IF EXISTS %I.%I CASCADE")
                    || stmt.starts_with("DROP TYPE IF EXISTS %I.%I CASCADE"),
                "unguarded drop: {}",
                &stmt[..40]
            );

            let before = &sql[..at];
            let loops_open = before.matches("FOR r IN SELECT").count();
            let loops_closed = before.matches("END LOOP;").count();
            assert_eq!(loops_open, loops_closed + 1, "DROP outside a loop at {}", at);
        }

        // Outside the loops only the role toggles run.
        let mut outside = String::new();
        let mut rest = sql.as_str();
        while let Some(start) = rest.find("FOR r IN SELECT") {
            outside.push_str(&rest[..start]);
            let end = start + rest[start..].find("END LOOP;").unwrap() + "END LOOP;".len();
            rest = &rest[end..];
        }
        outside.push_str(rest);
        let statements: Vec<&str> = outside
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("EXECUTE"))
            .collect();
        assert_eq!(
            statements,
            vec![
                "EXECUTE 'SET session_replication_role = ''replica''';",
                "EXECUTE 'SET session_replication_role = ''origin''';",
            ]
        );
    }
}
