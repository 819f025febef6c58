use diesel::pg::PgConnection;
use diesel::prelude::*;
use dotenv::dotenv;
use log::{error, info};
use std::env;

use crate::error::ApiError;

pub fn establish_connection() -> Result<PgConnection, ApiError> {
    // Try to load .env again to ensure environment variables are available
    dotenv().ok();

    let database_url = env::var("DATABASE_URL").map_err(|e| {
        error!("DATABASE_URL environment variable not found: {}", e);
        ApiError::Internal("DATABASE_URL environment variable not set".to_string())
    })?;

    match PgConnection::establish(&database_url) {
        Ok(conn) => Ok(conn),
        Err(e) => {
            error!("Failed to establish database connection: {}", e);
            Err(ApiError::Internal(format!(
                "Database connection failed: {}",
                e
            )))
        }
    }
}

/// Connectivity probe run once at startup.
pub fn ping(conn: &mut PgConnection) -> Result<(), ApiError> {
    let result: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(conn)
        .map_err(ApiError::from)?;
    info!("Database test query result: {}", result);
    Ok(())
}
