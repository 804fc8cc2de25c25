use crate::domain::invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
use crate::domain::ports::{InvoiceStore, PropertyStore};
use crate::domain::property::Property;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for invoices.
///
/// `update_if` holds the write lock across the status check and the update,
/// which makes the compare-and-set atomic for every caller sharing the store.
#[derive(Default, Clone)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: Invoice) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        invoices.insert(invoice.id.clone(), invoice);
        Ok(())
    }

    async fn get(&self, invoice_id: &str) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(invoice_id).cloned())
    }

    async fn find(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        let mut found: Vec<Invoice> = invoices
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
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
        let mut invoices = self.invoices.write().await;
        match invoices.get_mut(invoice_id) {
            Some(invoice) if invoice.status == expected => {
                invoice.apply(update);
                Ok(Some(invoice.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// A thread-safe in-memory store for properties.
#[derive(Default, Clone)]
pub struct InMemoryPropertyStore {
    properties: Arc<RwLock<HashMap<String, Property>>>,
}

impl InMemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PropertyStore for InMemoryPropertyStore {
    async fn insert(&self, property: Property) -> Result<()> {
        let mut properties = self.properties.write().await;
        properties.insert(property.id.clone(), property);
        Ok(())
    }

    async fn get(&self, property_id: &str) -> Result<Option<Property>> {
        let properties = self.properties.read().await;
        Ok(properties.get(property_id).cloned())
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Property>> {
        let properties = self.properties.read().await;
        let mut owned: Vec<Property> = properties
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(owned)
    }
}
