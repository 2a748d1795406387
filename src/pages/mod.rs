//! Page objects for the console screens.
//!
//! Each page owns its locators and API path and exposes the user-level
//! operations a flow needs. Saves and deletes complete only once the
//! correlated response has been observed.

mod listing;
mod organization;
mod region;
mod user;

pub use listing::Listing;
pub use organization::{OrganizationInput, OrganizationPage, OrganizationRecord, Role, RoleChoice};
pub use region::{RegionInput, RegionPage, RegionRecord};
pub use user::{UserInput, UserPage, UserRecord};

use crate::locator::Locator;
use crate::network::{Intent, ResponseMatcher};
use crate::session::Session;
use crate::Result;
use tracing::debug;

/// Set a `role="switch"` control to `desired`, clicking only when needed.
pub async fn ensure_switch(session: &Session, switch: &Locator, desired: bool) -> Result<()> {
    let el = session.wait_visible(switch).await?;
    let now = el.attr("aria-checked") == Some("true");
    if now == desired {
        return Ok(());
    }
    debug!("switch {} -> {}", switch, desired);
    session.click(switch).await?;
    session
        .wait_attribute(switch, "aria-checked", if desired { "true" } else { "false" })
        .await
}

/// Click `trigger` and wait for the response it causes.
pub(crate) async fn submit(
    session: &Session,
    trigger: &Locator,
    matcher: &ResponseMatcher,
) -> Result<()> {
    session.wait_visible(trigger).await?;
    let mark = session.mark().await?;
    session.click(trigger).await?;
    session.await_response(matcher, mark).await?;
    Ok(())
}

pub(crate) fn matcher(api: &str, intent: Intent) -> ResponseMatcher {
    ResponseMatcher::for_intent(api, intent)
}
