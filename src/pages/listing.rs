use crate::locator::{Locator, TextMatch};
use crate::session::Session;
use crate::Result;

/// Searchable listing table shared by the console screens.
#[derive(Debug, Clone)]
pub struct Listing {
    pub table: Locator,
    pub search: Locator,
}

impl Default for Listing {
    fn default() -> Self {
        Self {
            table: Locator::css("table"),
            search: Locator::css("input.rc-input").first(),
        }
    }
}

impl Listing {
    /// Cells whose accessible name contains `name`.
    pub fn cell(&self, name: &str) -> Locator {
        Locator::role_named("cell", TextMatch::Contains(name.to_string()))
    }

    /// Table cells, scoped to the listing table.
    pub fn table_cell(&self, name: &str) -> Locator {
        self.table.locate(self.cell(name))
    }

    pub fn row(&self, name: &str) -> Locator {
        Locator::role_named("row", TextMatch::Contains(name.to_string()))
    }

    pub async fn search_for(&self, session: &Session, text: &str) -> Result<()> {
        session.fill(&self.search, text).await
    }

    /// Wait until a cell carrying `name` is visible.
    pub async fn expect_cell(&self, session: &Session, name: &str) -> Result<()> {
        session.wait_visible(&self.table_cell(name).first()).await?;
        Ok(())
    }

    /// Wait until no cell carries `name`.
    pub async fn expect_no_cell(&self, session: &Session, name: &str) -> Result<()> {
        session.wait_gone(&self.cell(name)).await
    }
}
