use crate::error::{FulfillmentError, Result};
use crate::money;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// Server-side source of truth for item pricing and display titles.
/// Client-supplied prices are never consulted.
pub trait Catalog: Send + Sync {
    fn price_cents(&self, item_id: &str) -> Option<i64>;
    fn title(&self, item_id: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    item: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    id: String,
    title: String,
    price: String,
}

/// Catalog loaded once at startup from a TOML file.
pub struct FileCatalog {
    items: HashMap<String, (String, i64)>,
}

impl FileCatalog {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            FulfillmentError::Config(format!("failed to read catalog file '{path}': {e}"))
        })?;
        let parsed: CatalogFile = toml::from_str(&raw)?;

        let mut items = HashMap::new();
        for entry in parsed.item {
            let cents = money::parse_amount(&entry.price).map_err(|_| {
                FulfillmentError::Config(format!(
                    "bad price '{}' for catalog item '{}'",
                    entry.price, entry.id
                ))
            })?;
            items.insert(entry.id, (entry.title, cents));
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Catalog for FileCatalog {
    fn price_cents(&self, item_id: &str) -> Option<i64> {
        self.items.get(item_id).map(|(_, cents)| *cents)
    }

    fn title(&self, item_id: &str) -> Option<String> {
        self.items.get(item_id).map(|(title, _)| title.clone())
    }
}

/// Fixed catalog for tests and local development.
pub struct StaticCatalog {
    items: HashMap<String, (String, i64)>,
}

impl StaticCatalog {
    pub fn new(entries: &[(&str, &str, i64)]) -> Self {
        let items = entries
            .iter()
            .map(|(id, title, cents)| (id.to_string(), (title.to_string(), *cents)))
            .collect();
        Self { items }
    }
}

impl Catalog for StaticCatalog {
    fn price_cents(&self, item_id: &str) -> Option<i64> {
        self.items.get(item_id).map(|(_, cents)| *cents)
    }

    fn title(&self, item_id: &str) -> Option<String> {
        self.items.get(item_id).map(|(title, _)| title.clone())
    }
}
