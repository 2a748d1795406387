use super::{ensure_switch, matcher, submit, Listing};
use crate::locator::{Locator, TextMatch};
use crate::network::Intent;
use crate::select::{select_single, Criterion, SelectionTarget};
use crate::session::Session;
use crate::{Error, Result};
use tracing::info;

pub const PATH: &str = "/admin/users";
pub const API: &str = "/api/users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
}

/// A user as shown in the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization: String,
    /// `Active` or `Inactive`.
    pub active: String,
}

impl UserRecord {
    fn from_input(input: &UserInput, organization: String) -> Self {
        Self {
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            email: input.email.clone(),
            organization,
            active: active_label(input.active).to_string(),
        }
    }
}

pub fn active_label(active: bool) -> &'static str {
    if active {
        "Active"
    } else {
        "Inactive"
    }
}

pub struct UserPage<'a> {
    session: &'a Session,
    listing: Listing,
    btn_create: Locator,
    btn_edit: Locator,
    btn_save: Locator,
    btn_delete: Locator,
    btn_confirm_delete: Locator,
    input_first_name: Locator,
    input_last_name: Locator,
    input_email: Locator,
    field_org: Locator,
    switch_active: Locator,
    value_items: Locator,
}

impl<'a> UserPage<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            listing: Listing::default(),
            btn_create: Locator::button("^create$"),
            btn_edit: Locator::button("^edit$"),
            btn_save: Locator::button("^save$"),
            btn_delete: Locator::button("^delete$"),
            btn_confirm_delete: Locator::button("^ok$"),
            input_first_name: Locator::css(r#"input[name="firstName"]"#),
            input_last_name: Locator::css(r#"input[name="lastName"]"#),
            input_email: Locator::css(r#"input[name="email"]"#),
            field_org: Locator::css(r#"div[name="organizationName"]"#),
            switch_active: Locator::css(r#"[role="switch"]"#),
            value_items: Locator::css(r#"[class*="CustomFormView_value"]"#),
        }
    }

    pub async fn navigate_to(&self) -> Result<()> {
        self.session.open(PATH, &self.btn_create).await
    }

    pub async fn create(&self, input: &UserInput, org_index: usize) -> Result<UserRecord> {
        self.session.click(&self.btn_create).await?;
        let record = self.save(input, org_index, Intent::Create).await?;
        info!("user created: {}", record.first_name);
        Ok(record)
    }

    /// Edit the user currently shown in the detail view.
    pub async fn update(&self, input: &UserInput, org_index: usize) -> Result<UserRecord> {
        self.session.click(&self.btn_edit).await?;
        let record = self.save(input, org_index, Intent::Update).await?;
        info!("user updated: {}", record.first_name);
        Ok(record)
    }

    pub async fn expect_visible(&self, first_name: &str) -> Result<()> {
        self.listing.search_for(self.session, first_name).await?;
        self.session
            .wait_visible(&self.text(first_name).first())
            .await?;
        Ok(())
    }

    /// Search for `first_name` and read the five detail values.
    pub async fn read_back(&self, first_name: &str) -> Result<UserRecord> {
        self.listing.search_for(self.session, first_name).await?;
        self.session.wait_visible(&self.value_items.first()).await?;

        let values: Vec<String> = self
            .session
            .query(&self.value_items)
            .await?
            .iter()
            .map(|v| v.trimmed_text().to_string())
            .collect();
        if values.len() < 5 {
            return Err(Error::AssertionFailed(format!(
                "user detail shows {} values, expected 5",
                values.len()
            )));
        }

        Ok(UserRecord {
            first_name: values[0].clone(),
            last_name: values[1].clone(),
            email: values[2].clone(),
            organization: values[3].clone(),
            active: values[4].clone(),
        })
    }

    pub async fn check_info(&self, expected: &UserRecord) -> Result<()> {
        let actual = self.read_back(&expected.first_name).await?;
        let mut diffs = Vec::new();
        for (field, want, got) in [
            ("first name", &expected.first_name, &actual.first_name),
            ("last name", &expected.last_name, &actual.last_name),
            ("email", &expected.email, &actual.email),
            ("organization", &expected.organization, &actual.organization),
            ("active", &expected.active, &actual.active),
        ] {
            if want != got {
                diffs.push(format!("{}: expected {:?}, got {:?}", field, want, got));
            }
        }
        if diffs.is_empty() {
            Ok(())
        } else {
            Err(Error::AssertionFailed(diffs.join("; ")))
        }
    }

    /// Delete the user shown for `first_name`.
    pub async fn remove(&self, first_name: &str) -> Result<()> {
        self.listing.search_for(self.session, first_name).await?;
        self.session.click(&self.btn_delete).await?;
        submit(
            self.session,
            &self.btn_confirm_delete,
            &matcher(API, Intent::Delete),
        )
        .await?;
        info!("user deleted: {}", first_name);
        Ok(())
    }

    pub async fn verify_absent(&self, first_name: &str) -> Result<()> {
        self.listing.search_for(self.session, first_name).await?;
        self.session.wait_gone(&self.text(first_name)).await
    }

    async fn save(&self, input: &UserInput, org_index: usize, intent: Intent) -> Result<UserRecord> {
        self.session
            .fill(&self.input_first_name, &input.first_name)
            .await?;
        self.session
            .fill(&self.input_last_name, &input.last_name)
            .await?;
        self.session.fill(&self.input_email, &input.email).await?;

        let target = SelectionTarget::discover(self.session, self.field_org.clone()).await?;
        let organization = select_single(self.session, &target, &Criterion::index(org_index)).await?;

        ensure_switch(self.session, &self.switch_active, input.active).await?;

        submit(self.session, &self.btn_save, &matcher(API, intent)).await?;
        self.expect_visible(&input.first_name).await?;

        Ok(UserRecord::from_input(input, organization))
    }

    fn text(&self, needle: &str) -> Locator {
        Locator::text(TextMatch::Contains(needle.to_string()))
    }
}
