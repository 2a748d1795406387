//! End-to-end flows composed from the page objects.

use crate::pages::{OrganizationPage, RegionPage, UserPage};
use crate::session::Session;
use crate::Result;
use tracing::info;

pub use crate::pages::{
    OrganizationInput, OrganizationRecord, RegionInput, RegionRecord, Role, RoleChoice, UserInput,
    UserRecord,
};

/// The user created by the user flow.
pub fn sample_user() -> UserInput {
    UserInput {
        first_name: "test first name".into(),
        last_name: "test last name".into(),
        email: "test.test@example.com".into(),
        active: true,
    }
}

/// The values the user flow updates the sample user to.
pub fn sample_user_update() -> UserInput {
    UserInput {
        first_name: "test update first name".into(),
        last_name: "test update last name".into(),
        email: "test.update@example.com".into(),
        active: false,
    }
}

/// Navigate, create, verify, delete, verify gone.
pub async fn organization_flow(
    session: &Session,
    input: &OrganizationInput,
    role_fallback: Option<usize>,
) -> Result<OrganizationRecord> {
    info!("organization flow: {}", input.name);
    let page = OrganizationPage::new(session);
    page.navigate_to().await?;
    let created = page.create(input, role_fallback).await?;
    page.verify_visible(&created).await?;
    page.remove(&created.name).await?;
    page.verify_absent(&created.name).await?;
    Ok(created)
}

/// Navigate, create, verify through search, delete, verify gone.
pub async fn region_flow(
    session: &Session,
    input: &RegionInput,
    country_indexes: &[usize],
) -> Result<RegionRecord> {
    info!("region flow: {}", input.name);
    let page = RegionPage::new(session);
    page.navigate_to().await?;
    let created = page.create(input, country_indexes).await?;
    page.verify_visible(&created.name).await?;
    page.remove(&created.name).await?;
    page.verify_absent(&created.name).await?;
    Ok(created)
}

/// Create the sample user, check it, update it, check again, delete it.
pub async fn user_flow(session: &Session) -> Result<(UserRecord, UserRecord)> {
    let page = UserPage::new(session);
    page.navigate_to().await?;

    let created = page.create(&sample_user(), 0).await?;
    page.check_info(&created).await?;

    let updated = page.update(&sample_user_update(), 1).await?;
    page.check_info(&updated).await?;

    page.remove(&updated.first_name).await?;
    page.verify_absent(&updated.first_name).await?;
    Ok((created, updated))
}
