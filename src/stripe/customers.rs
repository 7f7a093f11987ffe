//! Durable mapping from shop customer numbers to gateway customers
//!
//! Uses redb so a gateway customer created during one checkout is reused by
//! every later checkout and account page of the same shop customer, whatever
//! session they arrive with.

use anyhow::Result;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use crate::stripe::session::SessionPaymentState;

/// Key: shop customer number
/// Value: gateway customer id
const STRIPE_CUSTOMERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("stripe_customers");

#[derive(Clone)]
pub struct CustomerStore {
    db: Arc<Database>,
}

impl CustomerStore {
    /// Create a new store or open an existing one
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Database::create(path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let write_txn = db.begin_write()?;
        {
            let _table = write_txn.open_table(STRIPE_CUSTOMERS_TABLE)?;
        }
        write_txn.commit()?;

        tracing::info!("Customer store initialized with stripe_customers table");

        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, customer_number: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STRIPE_CUSTOMERS_TABLE)?;
        let customer_id = table.get(customer_number)?.map(|v| v.value().to_string());
        Ok(customer_id)
    }

    pub fn insert(&self, customer_number: &str, customer_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(STRIPE_CUSTOMERS_TABLE)?;
            table.insert(customer_number, customer_id)?;
        }
        write_txn.commit()?;
        tracing::debug!(customer_number = %customer_number, customer_id = %customer_id, "Stored Stripe customer");
        Ok(())
    }

    /// Fills the session's customer cache from the store if it is still empty.
    pub fn restore_into(&self, session: &mut SessionPaymentState, customer_number: &str) -> Result<()> {
        let customer_number = customer_number.trim();
        if session.stripe_customer.is_some() || customer_number.is_empty() {
            return Ok(());
        }
        session.stripe_customer = self.get(customer_number)?;
        Ok(())
    }
}
