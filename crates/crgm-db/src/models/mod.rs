//! Declarative model base
//!
//! Entity definitions live in the domain crates, not here. They derive
//! `sqlx::FromRow` and implement [`Model`] to bind the struct to its table.

use sqlx::postgres::PgRow;
use sqlx::FromRow;

/// Base trait for persisted entity models
pub trait Model: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    /// Table the model maps to
    const TABLE: &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, FromRow)]
    struct WarehouseModel {
        #[allow(dead_code)]
        id: i64,
        #[allow(dead_code)]
        name: String,
    }

    impl Model for WarehouseModel {
        const TABLE: &'static str = "warehouses";
    }

    #[test]
    fn test_model_binds_table_name() {
        assert_eq!(WarehouseModel::TABLE, "warehouses");
    }
}
