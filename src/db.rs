use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("Database connection established");
    Ok(db)
}

/// Creates tables from the entity definitions when they do not exist yet.
///
/// Used for sqlite development databases and the test harness; production
/// schemas are managed externally.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(crate::entities::cart::Entity),
        schema.create_table_from_entity(crate::entities::cart_item::Entity),
        schema.create_table_from_entity(crate::entities::discount_lead::Entity),
        schema.create_table_from_entity(crate::entities::order::Entity),
    ];

    for statement in &mut statements {
        db.execute(backend.build(statement.if_not_exists())).await?;
    }

    info!("Schema ensured for {} tables", statements.len());
    Ok(())
}
