//! The option selector.
//!
//! One entry point for native `<select>` elements and custom overlay
//! dropdowns. The control kind is discovered from the element itself, and
//! index clamping plus the empty-set failure apply to both kinds alike.

use crate::locator::{Locator, TextMatch};
use crate::session::Session;
use crate::{Error, Result};
use tracing::{debug, info};

/// Where a custom dropdown renders its menu and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayStyle {
    /// The open menu; the first match is used.
    pub menu: Locator,
    /// Options inside the menu, in display order.
    pub option: Locator,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            menu: Locator::css(
                r#"[role="listbox"], [data-radix-popper-content-available], .ant-select-dropdown, .rc-select-dropdown"#,
            ),
            option: Locator::css(
                r#"[role="option"], .ant-select-item-option, .rc-select-item-option"#,
            ),
        }
    }
}

/// How a choice control is driven; discovered from the opener's tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Native,
    CustomOverlay(OverlayStyle),
}

/// A choice control on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTarget {
    pub kind: ControlKind,
    /// The `<select>` itself, or the element that opens the overlay.
    pub opener: Locator,
}

impl SelectionTarget {
    pub fn native(opener: Locator) -> Self {
        Self {
            kind: ControlKind::Native,
            opener,
        }
    }

    pub fn custom(opener: Locator) -> Self {
        Self {
            kind: ControlKind::CustomOverlay(OverlayStyle::default()),
            opener,
        }
    }

    /// Inspect the first match of `opener`: a `<select>` is native,
    /// anything else is a custom overlay with the default style.
    pub async fn discover(session: &Session, opener: Locator) -> Result<Self> {
        let opener = opener.first();
        let el = session.wait_visible(&opener).await?;
        debug!("discovered <{}> for {}", el.tag, opener);
        if el.tag == "select" {
            Ok(Self::native(opener))
        } else {
            Ok(Self::custom(opener))
        }
    }
}

/// Which option to pick. The label wins over the index; without either
/// the fallback index is used, then 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criterion {
    pub index: Option<usize>,
    pub label: Option<String>,
    pub fallback_index: Option<usize>,
}

impl Criterion {
    pub fn index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, fallback_index: Option<usize>) -> Self {
        self.fallback_index = fallback_index;
        self
    }

    /// Position of the chosen option within `labels`.
    pub fn resolve(&self, labels: &[String], control: &str) -> Result<usize> {
        if labels.is_empty() {
            return Err(Error::NoOptions(control.to_string()));
        }
        if let Some(ref label) = self.label {
            let wanted = TextMatch::exact_label(label);
            return labels
                .iter()
                .position(|l| wanted.matches(l))
                .ok_or_else(|| Error::OptionNotFound {
                    label: label.clone(),
                    control: control.to_string(),
                });
        }
        let index = self.index.or(self.fallback_index).unwrap_or(0);
        Ok(clamp(index, labels.len()))
    }
}

fn clamp(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

/// Pick one option and return its trimmed label.
pub async fn select_single(
    session: &Session,
    target: &SelectionTarget,
    criterion: &Criterion,
) -> Result<String> {
    let control = target.opener.to_string();
    let chosen = match &target.kind {
        ControlKind::Native => {
            let (labels, _) = native_labels(session, &target.opener).await?;
            let i = criterion.resolve(&labels, &control)?;
            session
                .driver()
                .select_by_label(&target.opener, &labels[i])
                .await?
        }
        ControlKind::CustomOverlay(style) => {
            let options = open_overlay(session, target, style).await?;
            let (positions, labels) = overlay_options(session, &options).await?;
            let i = criterion.resolve(&labels, &control)?;
            session.click(&options.nth(positions[i])).await?;
            labels[i].clone()
        }
    };
    info!("selected '{}' in {}", chosen, control);
    Ok(chosen)
}

/// Pick the options at `indexes` (each clamped, duplicates after clamping
/// skipped) and return their labels in activation order.
pub async fn select_multiple(
    session: &Session,
    target: &SelectionTarget,
    indexes: &[usize],
) -> Result<Vec<String>> {
    let control = target.opener.to_string();
    let mut chosen = Vec::with_capacity(indexes.len());

    match &target.kind {
        ControlKind::Native => {
            let (labels, multiple) = native_labels(session, &target.opener).await?;
            if labels.is_empty() {
                return Err(Error::NoOptions(control));
            }
            let picks = distinct_clamped(indexes, labels.len());
            if !multiple && picks.len() > 1 {
                return Err(Error::AssertionFailed(format!(
                    "{} options requested but {} is a single-choice select",
                    picks.len(),
                    control
                )));
            }
            for i in picks {
                let label = session
                    .driver()
                    .select_by_label(&target.opener, &labels[i])
                    .await?;
                chosen.push(label);
            }
        }
        ControlKind::CustomOverlay(style) => {
            let options = open_overlay(session, target, style).await?;
            let (positions, labels) = overlay_options(session, &options).await?;
            if labels.is_empty() {
                return Err(Error::NoOptions(control));
            }
            for i in distinct_clamped(indexes, labels.len()) {
                session.click(&options.nth(positions[i])).await?;
                chosen.push(labels[i].clone());
            }
            session.click(&target.opener).await?;
        }
    }

    info!("selected {:?} in {}", chosen, control);
    Ok(chosen)
}

fn distinct_clamped(indexes: &[usize], len: usize) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(indexes.len());
    for &i in indexes {
        let i = clamp(i, len);
        if !out.contains(&i) {
            out.push(i);
        }
    }
    out
}

/// Option labels of a `<select>` and whether it accepts several choices.
async fn native_labels(session: &Session, select: &Locator) -> Result<(Vec<String>, bool)> {
    let el = session.wait_visible(select).await?;
    let options = session.query(&select.locate(Locator::css("option"))).await?;
    let labels = options
        .iter()
        .map(|o| o.trimmed_text().to_string())
        .collect();
    Ok((labels, el.attr("multiple").is_some()))
}

/// Click the opener, wait for the menu, and return the option locator.
async fn open_overlay(
    session: &Session,
    target: &SelectionTarget,
    style: &OverlayStyle,
) -> Result<Locator> {
    session.click(&target.opener).await?;
    let menu = style.menu.first();
    session.wait_visible(&menu).await?;
    Ok(menu.locate(style.option.clone()))
}

/// Visible options with their position among all matches of `options`.
/// Hidden accessibility options inside the menu are skipped.
async fn overlay_options(
    session: &Session,
    options: &Locator,
) -> Result<(Vec<usize>, Vec<String>)> {
    let found = session.query(options).await?;
    Ok(found
        .iter()
        .enumerate()
        .filter(|(_, o)| o.visible)
        .map(|(pos, o)| (pos, o.trimmed_text().to_string()))
        .unzip())
}
