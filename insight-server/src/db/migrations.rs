//! Migration code

use anyhow::{anyhow, Context as _, Result};
use diesel::{pg::PgConnection, Connection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};

/// Embed migrations into binary
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Run pending migrations on a dedicated, synchronous connection.
pub async fn run(url: &str) -> Result<()> {
    let url = url.to_string();

    tokio::task::spawn_blocking(move || {
        let mut conn =
            PgConnection::establish(&url).context("Cannot connect to postgres database.")?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!(e))
            .context("Could not run migrations")?;

        for version in applied {
            tracing::info!(%version, "Applied migration");
        }

        Ok(())
    })
    .await?
}
