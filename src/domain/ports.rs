use async_trait::async_trait;

use crate::domain::entities::Item;

// Port for retrieving the current time. The server clock is the only source
// of `now` for round computation.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

// Port for the item catalog that duels draw their rounds from.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    // Draws `count` distinct items; the same seed yields the same draw.
    async fn draw(&self, count: usize, seed: u64) -> Result<Vec<Item>, String>;
}
