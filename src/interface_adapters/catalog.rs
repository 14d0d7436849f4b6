// In-memory item catalog, loaded from TOML or the built-in flag set.

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::domain::Item;
use crate::domain::ports::ItemCatalog;

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    TooFewItems { found: usize, needed: usize },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "failed to read catalog: {err}"),
            CatalogError::Parse(err) => write!(f, "invalid catalog file: {err}"),
            CatalogError::TooFewItems { found, needed } => {
                write!(f, "catalog has {found} items, need at least {needed}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    items: Vec<Item>,
}

impl InMemoryCatalog {
    /// Builds a catalog that can serve at least `min_items` per draw.
    pub fn new(items: Vec<Item>, min_items: usize) -> Result<Self, CatalogError> {
        if items.len() < min_items {
            return Err(CatalogError::TooFewItems {
                found: items.len(),
                needed: min_items,
            });
        }
        Ok(Self { items })
    }

    pub fn from_toml_str(text: &str, min_items: usize) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text).map_err(CatalogError::Parse)?;
        Self::new(file.items, min_items)
    }

    pub fn load(path: &Path, min_items: usize) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(CatalogError::Io)?;
        Self::from_toml_str(&text, min_items)
    }

    pub fn builtin() -> Self {
        let items = BUILTIN_FLAGS
            .iter()
            .map(|(id, hints)| Item {
                id: (*id).to_string(),
                image_path: format!("/flags/{id}.png"),
                hints: hints.iter().map(|hint| (*hint).to_string()).collect(),
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl ItemCatalog for InMemoryCatalog {
    async fn draw(&self, count: usize, seed: u64) -> Result<Vec<Item>, String> {
        if self.items.len() < count {
            return Err(format!(
                "catalog has {} items, {count} requested",
                self.items.len()
            ));
        }
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        Ok(order
            .into_iter()
            .take(count)
            .map(|i| self.items[i].clone())
            .collect())
    }
}

const BUILTIN_FLAGS: &[(&str, &[&str])] = &[
    (
        "france",
        &[
            "Population: about 68 million",
            "Capital: Paris",
            "Last letter: E",
            "Name length: 6 letters",
        ],
    ),
    (
        "japan",
        &[
            "Population: about 124 million",
            "Capital: Tokyo",
            "Last letter: N",
            "Name length: 5 letters",
        ],
    ),
    (
        "brazil",
        &[
            "Population: about 216 million",
            "Capital: Brasilia",
            "Last letter: L",
            "Name length: 6 letters",
        ],
    ),
    (
        "canada",
        &[
            "Population: about 40 million",
            "Capital: Ottawa",
            "Last letter: A",
            "Name length: 6 letters",
        ],
    ),
    (
        "kenya",
        &[
            "Population: about 55 million",
            "Capital: Nairobi",
            "Last letter: A",
            "Name length: 5 letters",
        ],
    ),
    (
        "norway",
        &[
            "Population: about 5.5 million",
            "Capital: Oslo",
            "Last letter: Y",
            "Name length: 6 letters",
        ],
    ),
    (
        "peru",
        &[
            "Population: about 34 million",
            "Capital: Lima",
            "Last letter: U",
            "Name length: 4 letters",
        ],
    ),
    (
        "vietnam",
        &[
            "Population: about 99 million",
            "Capital: Hanoi",
            "Last letter: M",
            "Name length: 7 letters",
        ],
    ),
    (
        "lithuania",
        &[
            "Population: about 2.9 million",
            "Capital: Vilnius",
            "Last letter: A",
            "Name length: 9 letters",
        ],
    ),
    (
        "australia",
        &[
            "Population: about 27 million",
            "Capital: Canberra",
            "Last letter: A",
            "Name length: 9 letters",
        ],
    ),
];
