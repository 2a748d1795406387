use super::{submit, Listing};
use crate::locator::{Locator, TextMatch};
use crate::network::{HttpMethod, Intent, ResponseMatcher};
use crate::select::{select_multiple, SelectionTarget};
use crate::session::Session;
use crate::Result;
use tracing::info;

pub const PATH: &str = "/admin/region";
pub const API: &str = "/api/region";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInput {
    pub name: String,
}

impl RegionInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRecord {
    pub name: String,
    pub countries: Vec<String>,
}

pub struct RegionPage<'a> {
    session: &'a Session,
    listing: Listing,
    btn_create: Locator,
    btn_save: Locator,
    btn_confirm_delete: Locator,
    input_name: Locator,
    field_country: Locator,
}

impl<'a> RegionPage<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            listing: Listing::default(),
            btn_create: Locator::button("create"),
            btn_save: Locator::button("save"),
            btn_confirm_delete: Locator::button("^delete$"),
            input_name: Locator::css(r#"input[name="name"]"#)
                .or(Locator::placeholder("RegionName")),
            field_country: Locator::css(r#"div[name="country"]"#),
        }
    }

    pub async fn navigate_to(&self) -> Result<()> {
        self.session.open(PATH, &self.btn_create).await
    }

    pub async fn create(
        &self,
        input: &RegionInput,
        country_indexes: &[usize],
    ) -> Result<RegionRecord> {
        self.session.click(&self.btn_create).await?;
        // Region saves may be answered as an upsert.
        let saved = ResponseMatcher::new(API, &[HttpMethod::Post, HttpMethod::Put]);
        let record = self.save(input, country_indexes, &saved).await?;
        info!("region created: {} {:?}", record.name, record.countries);
        Ok(record)
    }

    pub async fn update(
        &self,
        current_name: &str,
        input: &RegionInput,
        country_indexes: &[usize],
    ) -> Result<RegionRecord> {
        self.session
            .click(&self.listing.table_cell(current_name).first())
            .await?;
        let saved = ResponseMatcher::for_intent(API, Intent::Update);
        let record = self.save(input, country_indexes, &saved).await?;
        info!("region updated: {} -> {}", current_name, record.name);
        Ok(record)
    }

    /// Search for `name` and wait for a matching table cell.
    pub async fn verify_visible(&self, name: &str) -> Result<()> {
        self.listing.search_for(self.session, name).await?;
        let cell = Locator::css("td")
            .filter_text(TextMatch::Contains(name.to_string()))
            .first();
        self.session.wait_visible(&cell).await?;
        Ok(())
    }

    pub async fn verify_absent(&self, name: &str) -> Result<()> {
        self.listing.search_for(self.session, name).await?;
        self.listing.expect_no_cell(self.session, name).await
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let row = self.listing.row(name).first();
        self.session.wait_visible(&row).await?;
        self.session
            .click(&row.locate(Locator::role("img")).first())
            .await?;
        submit(
            self.session,
            &self.btn_confirm_delete,
            &ResponseMatcher::for_intent(API, Intent::Delete),
        )
        .await?;
        self.listing.expect_no_cell(self.session, name).await?;
        info!("region deleted: {}", name);
        Ok(())
    }

    async fn save(
        &self,
        input: &RegionInput,
        country_indexes: &[usize],
        saved: &ResponseMatcher,
    ) -> Result<RegionRecord> {
        self.session.fill(&self.input_name, &input.name).await?;
        let target = SelectionTarget::discover(self.session, self.field_country.clone()).await?;
        let countries = select_multiple(self.session, &target, country_indexes).await?;

        submit(self.session, &self.btn_save, saved).await?;
        self.listing.expect_cell(self.session, &input.name).await?;

        Ok(RegionRecord {
            name: input.name.clone(),
            countries,
        })
    }
}
