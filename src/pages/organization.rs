use super::{matcher, submit, Listing};
use crate::format::{normalize_date, DateValue};
use crate::locator::{Locator, TextMatch};
use crate::network::Intent;
use crate::select::{select_single, Criterion, SelectionTarget};
use crate::session::Session;
use crate::Result;
use std::fmt;
use tracing::info;

pub const PATH: &str = "/organization";
pub const API: &str = "/api/organization";

/// Organization roles offered by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Supervisor,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Supervisor => "Supervisor",
            Role::Staff => "Staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role requested for an organization: by option position or by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChoice {
    Index(usize),
    Label(String),
}

impl From<Role> for RoleChoice {
    fn from(role: Role) -> Self {
        RoleChoice::Label(role.as_str().to_string())
    }
}

impl From<usize> for RoleChoice {
    fn from(index: usize) -> Self {
        RoleChoice::Index(index)
    }
}

#[derive(Debug, Clone)]
pub struct OrganizationInput {
    pub name: String,
    pub start_date: DateValue,
    pub end_date: Option<DateValue>,
    pub role: Option<RoleChoice>,
}

impl OrganizationInput {
    pub fn new(name: impl Into<String>, start_date: impl Into<DateValue>) -> Self {
        Self {
            name: name.into(),
            start_date: start_date.into(),
            end_date: None,
            role: None,
        }
    }

    pub fn ending(mut self, end_date: impl Into<DateValue>) -> Self {
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<RoleChoice>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Values committed by a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRecord {
    pub name: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub role: Option<String>,
}

pub struct OrganizationPage<'a> {
    session: &'a Session,
    listing: Listing,
    btn_create: Locator,
    btn_save: Locator,
    btn_confirm_delete: Locator,
    input_name: Locator,
    input_start_date: Locator,
    input_end_date: Locator,
    field_role: Locator,
}

impl<'a> OrganizationPage<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            listing: Listing::default(),
            btn_create: Locator::button("create"),
            btn_save: Locator::button("save"),
            btn_confirm_delete: Locator::button("^delete$"),
            input_name: Locator::css(r#"input[name="name"]"#)
                .or(Locator::placeholder("OrganizationName")),
            input_start_date: Locator::css(r#"input[name="startDate"]"#)
                .or(Locator::placeholder("startDate")),
            input_end_date: Locator::css(r#"input[name="endDate"]"#)
                .or(Locator::placeholder("endDate")),
            field_role: Locator::css(r#"[name="role"], div[name="role"]"#),
        }
    }

    pub async fn navigate_to(&self) -> Result<()> {
        self.session.open(PATH, &self.btn_create).await
    }

    /// Create an organization. `role_fallback` is the option index used
    /// when the input names no role.
    pub async fn create(
        &self,
        input: &OrganizationInput,
        role_fallback: Option<usize>,
    ) -> Result<OrganizationRecord> {
        self.session.click(&self.btn_create).await?;
        let record = self.fill_form(input, role_fallback).await?;
        submit(self.session, &self.btn_save, &matcher(API, Intent::Create)).await?;
        info!("organization created: {}", record.name);
        Ok(record)
    }

    /// Open the row named `current_name` and save `input` over it.
    pub async fn update(
        &self,
        current_name: &str,
        input: &OrganizationInput,
        role_fallback: Option<usize>,
    ) -> Result<OrganizationRecord> {
        self.session
            .click(&self.listing.table_cell(current_name).first())
            .await?;
        let record = self.fill_form(input, role_fallback).await?;
        submit(self.session, &self.btn_save, &matcher(API, Intent::Update)).await?;
        info!("organization updated: {} -> {}", current_name, record.name);
        Ok(record)
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
            &matcher(API, Intent::Delete),
        )
        .await?;
        self.listing.expect_no_cell(self.session, name).await?;
        info!("organization deleted: {}", name);
        Ok(())
    }

    /// Search for the name, then check the name (cell, else any text) and
    /// the role are shown.
    pub async fn verify_visible(&self, record: &OrganizationRecord) -> Result<()> {
        self.listing.search_for(self.session, &record.name).await?;
        let cell = self.listing.cell(&record.name).first();
        if self.session.count(&cell).await? > 0 {
            self.session.wait_visible(&cell).await?;
        } else {
            self.session
                .wait_visible(&Locator::text(TextMatch::Contains(record.name.clone())).first())
                .await?;
        }
        if let Some(ref role) = record.role {
            self.session
                .wait_visible(&Locator::text(TextMatch::Contains(role.clone())).first())
                .await?;
        }
        Ok(())
    }

    /// Search for `name` and wait until no cell carries it.
    pub async fn verify_absent(&self, name: &str) -> Result<()> {
        self.listing.search_for(self.session, name).await?;
        self.listing.expect_no_cell(self.session, name).await
    }

    async fn fill_form(
        &self,
        input: &OrganizationInput,
        role_fallback: Option<usize>,
    ) -> Result<OrganizationRecord> {
        let start_date = normalize_date(input.start_date.clone())?;
        let end_date = input
            .end_date
            .clone()
            .map(normalize_date)
            .transpose()?;

        self.session.fill(&self.input_name, &input.name).await?;
        self.session
            .fill(&self.input_start_date, &start_date)
            .await?;
        if let Some(ref end) = end_date {
            self.session.fill(&self.input_end_date, end).await?;
        }

        let role = match (&input.role, role_fallback) {
            (None, None) => None,
            (choice, fallback) => {
                let criterion = match choice {
                    Some(RoleChoice::Label(label)) => Criterion::label(label.clone()),
                    Some(RoleChoice::Index(i)) => Criterion::index(*i),
                    None => Criterion::default(),
                }
                .with_fallback(fallback);
                let target = SelectionTarget::discover(self.session, self.field_role.clone()).await?;
                Some(select_single(self.session, &target, &criterion).await?)
            }
        };

        Ok(OrganizationRecord {
            name: input.name.clone(),
            start_date,
            end_date,
            role,
        })
    }
}
