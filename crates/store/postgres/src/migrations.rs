use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// Dependents of an asset (retention record, versions, share links) reference
/// it with `ON DELETE CASCADE`, so purging the asset row removes them in the
/// same statement.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let clients = config.clients_table();
    let projects = config.projects_table();
    let assets = config.assets_table();
    let retention = config.retention_table();
    let versions = config.versions_table();
    let links = config.share_links_table();
    let locks = config.locks_table();
    let prefix = &config.table_prefix;

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {clients} (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {projects} (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES {clients} (id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {assets} (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES {projects} (id) ON DELETE CASCADE,
                uploaded_by TEXT,
                locator TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                fingerprint TEXT,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}assets_fingerprint_idx \
             ON {assets} (fingerprint) WHERE fingerprint IS NOT NULL AND NOT is_deleted"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {retention} (
                asset_id TEXT PRIMARY KEY REFERENCES {assets} (id) ON DELETE CASCADE,
                deleted_at TIMESTAMPTZ NOT NULL,
                expiry TIMESTAMPTZ NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {prefix}retention_expiry_idx ON {retention} (expiry)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {versions} (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL REFERENCES {assets} (id) ON DELETE CASCADE,
                version_number INTEGER NOT NULL,
                locator TEXT NOT NULL,
                fingerprint TEXT,
                created_by TEXT NOT NULL,
                note TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (asset_id, version_number)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {links} (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL REFERENCES {assets} (id) ON DELETE CASCADE,
                token TEXT NOT NULL UNIQUE,
                created_by TEXT NOT NULL,
                permission TEXT NOT NULL,
                expires_at TIMESTAMPTZ,
                access_count BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {locks} (
                name TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )"
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
