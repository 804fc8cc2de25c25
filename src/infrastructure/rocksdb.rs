use crate::domain::invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
use crate::domain::ports::{InvoiceStore, PropertyStore};
use crate::domain::property::Property;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for invoices, keyed by invoice id.
pub const CF_INVOICES: &str = "invoices";
/// Column Family for properties, keyed by property id.
pub const CF_PROPERTIES: &str = "properties";

/// A persistent store implementation using RocksDB.
///
/// Invoices and properties live in separate Column Families as JSON values.
/// Writes to invoices go through `write_lock` so the read-check-write in
/// `update_if` cannot interleave with another writer in this process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating the
    /// "invoices" and "properties" column families if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_invoices = ColumnFamilyDescriptor::new(CF_INVOICES, Options::default());
        let cf_properties = ColumnFamilyDescriptor::new(CF_PROPERTIES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_invoices, cf_properties])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EngineError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            EngineError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| {
                EngineError::InternalError(Box::new(std::io::Error::other(format!(
                    "RocksDB iteration error: {}",
                    e
                ))))
            })?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        EngineError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl InvoiceStore for RocksDBStore {
    async fn insert(&self, invoice: Invoice) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put(CF_INVOICES, &invoice.id, &invoice)
    }

    async fn get(&self, invoice_id: &str) -> Result<Option<Invoice>> {
        self.read(CF_INVOICES, invoice_id)
    }

    async fn find(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let mut found: Vec<Invoice> = self
            .scan::<Invoice>(CF_INVOICES)?
            .into_iter()
            .filter(|invoice| filter.matches(invoice))
            .collect();
        found.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn update_if(
        &self,
        invoice_id: &str,
        expected: InvoiceStatus,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut invoice) = self.read::<Invoice>(CF_INVOICES, invoice_id)? else {
            return Ok(None);
        };
        if invoice.status != expected {
            return Ok(None);
        }
        invoice.apply(update);
        self.put(CF_INVOICES, &invoice.id, &invoice)?;
        Ok(Some(invoice))
    }
}

#[async_trait]
impl PropertyStore for RocksDBStore {
    async fn insert(&self, property: Property) -> Result<()> {
        self.put(CF_PROPERTIES, &property.id, &property)
    }

    async fn get(&self, property_id: &str) -> Result<Option<Property>> {
        self.read(CF_PROPERTIES, property_id)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Property>> {
        Ok(self
            .scan::<Property>(CF_PROPERTIES)?
            .into_iter()
            .filter(|p| p.owner_id == owner_id)
            .collect())
    }
}
