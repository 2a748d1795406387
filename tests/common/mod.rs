//! In-memory admin console implementing `Driver`.
//!
//! The console renders a small element tree from its state on every call
//! and resolves locators against it the same way the in-page resolver does.
//! Saves and deletes go through the registered routes first, then a fake
//! backend, and every exchange lands in the response log.

#![allow(dead_code)]

use async_trait::async_trait;
use eoka_e2e::network::{ResponseLog, RouteTable};
use eoka_e2e::{
    Driver, ElementInfo, Error, HttpMethod, InterceptedRequest, Locator, ObservedResponse,
    Result, RouteHandler, Session, TextMatch, Timeouts, UrlPattern,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const BASE_URL: &str = "http://console.test";

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        navigation_ms: 200,
        visibility_ms: 200,
        response_ms: 200,
        poll_ms: 5,
    }
}

pub fn session(console: &Arc<SimConsole>) -> Session {
    Session::new(console.clone() as Arc<dyn Driver>, BASE_URL, fast_timeouts())
}

// ---------------------------------------------------------------------------
// state

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    Organization,
    Region,
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    StartDate,
    EndDate,
    FirstName,
    LastName,
    Email,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Act {
    OpenCreate,
    OpenEdit(usize),
    EditCurrentUser,
    ToggleDropdown,
    PickRole(String),
    ToggleCountry(String),
    PickOrg(String),
    ToggleSwitch,
    Save,
    AskDelete(usize),
    AskDeleteUser,
    ConfirmDelete,
    Cancel,
    Input(Field),
}

#[derive(Debug, Clone, Default)]
struct Form {
    editing: Option<usize>,
    name: String,
    start_date: String,
    end_date: String,
    role: Option<String>,
    countries: Vec<String>,
    first_name: String,
    last_name: String,
    email: String,
    organization: Option<String>,
    active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Org {
    pub id: u64,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: u64,
    pub name: String,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization: String,
    pub active: bool,
}

struct State {
    origin: String,
    screen: Screen,
    form: Option<Form>,
    dropdown: bool,
    confirm: Option<usize>,
    toast: Option<String>,
    search: String,
    native_role: bool,
    a11y_options: bool,
    page_size: Option<usize>,
    roles: Vec<String>,
    countries: Vec<String>,
    organizations: Vec<Org>,
    regions: Vec<Region>,
    users: Vec<User>,
    next_id: u64,
    log: ResponseLog,
    routes: RouteTable,
    clicks: Vec<String>,
}

/// Simulated console. Cheap to build; one per test.
pub struct SimConsole {
    state: Mutex<State>,
}

impl SimConsole {
    pub fn new() -> Self {
        let organizations = ["Initech", "Umbrella", "Hooli"]
            .iter()
            .enumerate()
            .map(|(i, name)| Org {
                id: i as u64 + 1,
                name: name.to_string(),
                start_date: "2020-01-01".into(),
                end_date: String::new(),
                role: Some("Staff".into()),
            })
            .collect();
        Self {
            state: Mutex::new(State {
                origin: BASE_URL.into(),
                screen: Screen::Blank,
                form: None,
                dropdown: false,
                confirm: None,
                toast: None,
                search: String::new(),
                native_role: false,
                a11y_options: false,
                page_size: None,
                roles: vec!["Admin".into(), "Supervisor".into(), "Staff".into()],
                countries: ["Austria", "Belgium", "Croatia", "Denmark", "Estonia"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                organizations,
                regions: Vec::new(),
                users: Vec::new(),
                next_id: 100,
                log: ResponseLog::new(),
                routes: RouteTable::new(),
                clicks: Vec::new(),
            }),
        }
    }

    /// Render the role field as a native `<select>`.
    pub fn with_native_role(self) -> Self {
        self.state.lock().native_role = true;
        self
    }

    /// Render hidden accessibility options ahead of the visible ones in
    /// overlay menus, as rc-select does.
    pub fn with_accessibility_options(self) -> Self {
        self.state.lock().a11y_options = true;
        self
    }

    /// Show at most `size` rows in unfiltered listings.
    pub fn with_page_size(self, size: usize) -> Self {
        self.state.lock().page_size = Some(size);
        self
    }

    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.state.lock().roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_countries(self, countries: &[&str]) -> Self {
        self.state.lock().countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_region(self, name: &str) -> Self {
        {
            let mut st = self.state.lock();
            let id = st.next();
            st.regions.push(Region {
                id,
                name: name.into(),
                countries: Vec::new(),
            });
        }
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn organizations(&self) -> Vec<Org> {
        self.state.lock().organizations.clone()
    }

    pub fn regions(&self) -> Vec<Region> {
        self.state.lock().regions.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.state.lock().users.clone()
    }

    pub fn toast(&self) -> Option<String> {
        self.state.lock().toast.clone()
    }

    pub fn log(&self) -> Vec<ObservedResponse> {
        self.state.lock().log.entries().to_vec()
    }

    /// Names of the option elements clicked so far, in order.
    pub fn option_clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn api(&self) -> &'static str {
        match self.screen {
            Screen::Organization => "/api/organization",
            Screen::Region => "/api/region",
            Screen::Users | Screen::Blank => "/api/users",
        }
    }

    fn navigate(&mut self, url: &str) {
        let (origin, path) = split_url(url);
        self.origin = origin;
        self.screen = match path.as_str() {
            "/organization" => Screen::Organization,
            "/admin/region" => Screen::Region,
            "/admin/users" => Screen::Users,
            _ => Screen::Blank,
        };
        self.form = None;
        self.dropdown = false;
        self.confirm = None;
        self.toast = None;
        self.search.clear();
        if self.screen != Screen::Blank {
            let logo = format!("{}/static/logo.png", self.origin);
            self.exchange(logo, HttpMethod::Get, None, |_| (200, Value::Null));
        }
    }

    /// Route the request, fall back to `backend`, and log the exchange.
    fn exchange(
        &mut self,
        url: String,
        method: HttpMethod,
        body: Option<Value>,
        backend: impl FnOnce(&Value) -> (u16, Value),
    ) -> (u16, Value) {
        let request = InterceptedRequest {
            url: url.clone(),
            method,
            body: body.as_ref().map(|b| b.to_string()),
        };
        let (status, reply) = match self.routes.dispatch(&request) {
            Some(mock) => (
                mock.status,
                serde_json::from_str(&mock.body).unwrap_or(Value::Null),
            ),
            None => backend(body.as_ref().unwrap_or(&Value::Null)),
        };
        self.log.push(url, method, status);
        (status, reply)
    }

    fn visible_users(&self) -> Vec<usize> {
        let needle = self.search.to_lowercase();
        (0..self.users.len())
            .filter(|&i| self.users[i].first_name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Rows to render: those matching the search, paged when unfiltered.
    fn listed(&self, names: &[&str]) -> Vec<usize> {
        let needle = self.search.to_lowercase();
        let matching = (0..names.len()).filter(|&i| names[i].to_lowercase().contains(&needle));
        match self.page_size {
            Some(size) if needle.is_empty() => matching.take(size).collect(),
            _ => matching.collect(),
        }
    }

    fn current_user(&self) -> Option<usize> {
        self.visible_users().first().copied()
    }

    fn apply(&mut self, act: Act) {
        match act {
            Act::OpenCreate => {
                self.form = Some(Form::default());
                self.toast = None;
            }
            Act::OpenEdit(i) => {
                let mut form = Form {
                    editing: Some(i),
                    ..Default::default()
                };
                match self.screen {
                    Screen::Organization => {
                        let org = &self.organizations[i];
                        form.name = org.name.clone();
                        form.start_date = org.start_date.clone();
                        form.end_date = org.end_date.clone();
                        form.role = org.role.clone();
                    }
                    Screen::Region => {
                        let region = &self.regions[i];
                        form.name = region.name.clone();
                        form.countries = region.countries.clone();
                    }
                    _ => {}
                }
                self.form = Some(form);
            }
            Act::EditCurrentUser => {
                if let Some(i) = self.current_user() {
                    let u = &self.users[i];
                    self.form = Some(Form {
                        editing: Some(i),
                        first_name: u.first_name.clone(),
                        last_name: u.last_name.clone(),
                        email: u.email.clone(),
                        organization: Some(u.organization.clone()),
                        active: u.active,
                        ..Default::default()
                    });
                }
            }
            Act::ToggleDropdown => self.dropdown = !self.dropdown,
            Act::PickRole(role) => {
                self.clicks.push(role.clone());
                if let Some(ref mut form) = self.form {
                    form.role = Some(role);
                }
                self.dropdown = false;
            }
            Act::ToggleCountry(country) => {
                self.clicks.push(country.clone());
                if let Some(ref mut form) = self.form {
                    if let Some(pos) = form.countries.iter().position(|c| *c == country) {
                        form.countries.remove(pos);
                    } else {
                        form.countries.push(country);
                    }
                }
            }
            Act::PickOrg(org) => {
                self.clicks.push(org.clone());
                if let Some(ref mut form) = self.form {
                    form.organization = Some(org);
                }
                self.dropdown = false;
            }
            Act::ToggleSwitch => {
                if let Some(ref mut form) = self.form {
                    form.active = !form.active;
                }
            }
            Act::Save => self.save(),
            Act::AskDelete(i) => self.confirm = Some(i),
            Act::AskDeleteUser => self.confirm = self.current_user(),
            Act::ConfirmDelete => self.delete(),
            Act::Cancel => self.confirm = None,
            Act::Input(_) => {}
        }
    }

    fn fill(&mut self, field: Field, value: &str) {
        if field == Field::Search {
            self.search = value.to_string();
            return;
        }
        let Some(ref mut form) = self.form else {
            return;
        };
        let slot = match field {
            Field::Name => &mut form.name,
            Field::StartDate => &mut form.start_date,
            Field::EndDate => &mut form.end_date,
            Field::FirstName => &mut form.first_name,
            Field::LastName => &mut form.last_name,
            Field::Email => &mut form.email,
            Field::Search => unreachable!(),
        };
        *slot = value.to_string();
    }

    fn save(&mut self) {
        let Some(form) = self.form.clone() else {
            return;
        };
        let api = self.api();
        let (method, url) = match form.editing {
            None => (HttpMethod::Post, format!("{}{}", self.origin, api)),
            Some(i) => (
                HttpMethod::Put,
                format!("{}{}/{}", self.origin, api, self.id_at(i)),
            ),
        };
        let created = if method == HttpMethod::Post { 201 } else { 200 };

        let body = match self.screen {
            Screen::Organization => json!({
                "name": form.name,
                "startDate": form.start_date,
                "endDate": form.end_date,
                "role": form.role,
            }),
            Screen::Region => json!({ "name": form.name, "country": form.countries }),
            _ => json!({
                "firstName": form.first_name,
                "lastName": form.last_name,
                "email": form.email,
                "organizationName": form.organization,
                "active": form.active,
            }),
        };

        let screen = self.screen;
        let (status, reply) = self.exchange(url, method, Some(body), |b| {
            let ok = match screen {
                Screen::Organization | Screen::Region => {
                    b["name"].as_str().map(|n| !n.is_empty()).unwrap_or(false)
                }
                _ => b["email"].as_str().map(|e| e.contains('@')).unwrap_or(false),
            };
            if ok {
                (created, b.clone())
            } else {
                (400, json!({ "error": "validation failed" }))
            }
        });

        if !(200..300).contains(&status) {
            let reason = reply["error"].as_str().unwrap_or("unknown").to_string();
            self.toast = Some(format!("Request failed: {}", reason));
            return;
        }

        let id = match form.editing {
            Some(i) => self.id_at(i),
            None => self.next(),
        };
        match self.screen {
            Screen::Organization => {
                let org = Org {
                    id,
                    name: form.name,
                    start_date: form.start_date,
                    end_date: form.end_date,
                    role: form.role,
                };
                match form.editing {
                    Some(i) => self.organizations[i] = org,
                    None => self.organizations.push(org),
                }
                self.toast = Some("Organization created successfully".into());
            }
            Screen::Region => {
                let region = Region {
                    id,
                    name: form.name,
                    countries: form.countries,
                };
                match form.editing {
                    Some(i) => self.regions[i] = region,
                    None => self.regions.push(region),
                }
                self.toast = Some("Region saved successfully".into());
            }
            _ => {
                let user = User {
                    id,
                    first_name: form.first_name,
                    last_name: form.last_name,
                    email: form.email,
                    organization: form.organization.unwrap_or_default(),
                    active: form.active,
                };
                match form.editing {
                    Some(i) => self.users[i] = user,
                    None => self.users.push(user),
                }
                self.toast = Some("User created successfully".into());
            }
        }
        self.form = None;
        self.dropdown = false;
    }

    fn delete(&mut self) {
        let Some(i) = self.confirm.take() else {
            return;
        };
        let url = format!("{}{}/{}", self.origin, self.api(), self.id_at(i));
        let (status, _) = self.exchange(url, HttpMethod::Delete, None, |_| (200, Value::Null));
        if !(200..300).contains(&status) {
            self.toast = Some("Request failed".into());
            return;
        }
        match self.screen {
            Screen::Organization => {
                self.organizations.remove(i);
            }
            Screen::Region => {
                self.regions.remove(i);
            }
            _ => {
                self.users.remove(i);
            }
        }
        self.toast = Some("Deleted".into());
    }

    fn id_at(&self, i: usize) -> u64 {
        match self.screen {
            Screen::Organization => self.organizations[i].id,
            Screen::Region => self.regions[i].id,
            _ => self.users[i].id,
        }
    }

    // -----------------------------------------------------------------------
    // rendering

    fn render(&self) -> N {
        let mut body = n("body");
        match self.screen {
            Screen::Blank => body = body.text("Not found"),
            Screen::Organization => {
                body = body
                    .child(button("Create", Act::OpenCreate))
                    .child(search_box());
                let mut table = n("table");
                let names: Vec<&str> = self.organizations.iter().map(|o| o.name.as_str()).collect();
                for i in self.listed(&names) {
                    let org = &self.organizations[i];
                    table = table.child(
                        n("tr")
                            .child(n("td").text(&org.name).act(Act::OpenEdit(i)))
                            .child(n("td").text(org.role.as_deref().unwrap_or("")))
                            .child(n("td").text(&org.start_date))
                            .child(n("td").child(delete_icon(i))),
                    );
                }
                body = body.child(table);
                if let Some(ref form) = self.form {
                    body = body.child(self.organization_form(form));
                }
            }
            Screen::Region => {
                body = body
                    .child(button("Create", Act::OpenCreate))
                    .child(search_box());
                let mut table = n("table");
                let names: Vec<&str> = self.regions.iter().map(|r| r.name.as_str()).collect();
                for i in self.listed(&names) {
                    let region = &self.regions[i];
                    table = table.child(
                        n("tr")
                            .child(n("td").text(&region.name).act(Act::OpenEdit(i)))
                            .child(n("td").text(&region.countries.join(", ")))
                            .child(n("td").child(delete_icon(i))),
                    );
                }
                body = body.child(table);
                if let Some(ref form) = self.form {
                    body = body.child(self.region_form(form));
                }
            }
            Screen::Users => {
                body = body
                    .child(button("Create", Act::OpenCreate))
                    .child(search_box());
                let mut table = n("table");
                for &i in &self.visible_users() {
                    let u = &self.users[i];
                    table = table.child(
                        n("tr")
                            .child(n("td").text(&u.first_name))
                            .child(n("td").text(&u.last_name))
                            .child(n("td").text(&u.email)),
                    );
                }
                body = body.child(table);
                if let Some(i) = self.current_user() {
                    let u = &self.users[i];
                    let active = if u.active { "Active" } else { "Inactive" };
                    let mut detail = n("div").attr("class", "CustomFormView_root__a1");
                    for value in [&u.first_name, &u.last_name, &u.email, &u.organization] {
                        detail = detail.child(value_item(value));
                    }
                    detail = detail
                        .child(value_item(active))
                        .child(button("Edit", Act::EditCurrentUser))
                        .child(button("Delete", Act::AskDeleteUser));
                    body = body.child(detail);
                }
                if let Some(ref form) = self.form {
                    body = body.child(self.user_form(form));
                }
            }
        }

        if self.confirm.is_some() {
            let label = if self.screen == Screen::Users { "OK" } else { "Delete" };
            body = body.child(
                n("div")
                    .attr("role", "dialog")
                    .child(n("p").text("Are you sure?"))
                    .child(button(label, Act::ConfirmDelete))
                    .child(button("Cancel", Act::Cancel)),
            );
        }
        if let Some(ref toast) = self.toast {
            body = body.child(n("div").attr("class", "toast").text(toast));
        }
        n("html").child(body)
    }

    fn organization_form(&self, form: &Form) -> N {
        let mut modal = n("div")
            .attr("class", "modal")
            .child(input("name", "OrganizationName", Field::Name))
            .child(input("startDate", "startDate", Field::StartDate))
            .child(input("endDate", "endDate", Field::EndDate));

        if self.native_role {
            let mut select = n("select").attr("name", "role");
            for role in &self.roles {
                let mut opt = n("option").attr("value", &role.to_lowercase()).text(role);
                if form.role.as_deref() == Some(role.as_str()) {
                    opt = opt.attr("selected", "");
                }
                select = select.child(opt);
            }
            modal = modal.child(select);
        } else {
            modal = modal.child(
                n("div")
                    .attr("name", "role")
                    .attr("class", "rc-select")
                    .text(form.role.as_deref().unwrap_or("Select role"))
                    .act(Act::ToggleDropdown),
            );
            if self.dropdown {
                let mut menu = n("div")
                    .attr("role", "listbox")
                    .attr("class", "rc-select-dropdown");
                if self.a11y_options {
                    menu = menu.child(hidden_listbox(&self.roles));
                }
                for role in &self.roles {
                    menu = menu.child(
                        n("div")
                            .attr("role", "option")
                            .attr("class", "rc-select-item-option")
                            .text(&format!("  {}  ", role))
                            .act(Act::PickRole(role.clone())),
                    );
                }
                modal = modal.child(menu);
            }
        }
        modal.child(button("Save", Act::Save))
    }

    fn region_form(&self, form: &Form) -> N {
        let mut modal = n("div")
            .attr("class", "modal")
            .child(input("name", "RegionName", Field::Name))
            .child(
                n("div")
                    .attr("name", "country")
                    .attr("class", "rc-select rc-select-multiple")
                    .text(&form.countries.join(" "))
                    .act(Act::ToggleDropdown),
            );
        if self.dropdown {
            let mut menu = n("div").attr("class", "rc-select-dropdown");
            if self.a11y_options {
                menu = menu.child(hidden_listbox(&self.countries));
            }
            for country in &self.countries {
                let selected = form.countries.contains(country);
                menu = menu.child(
                    n("div")
                        .attr("class", "rc-select-item-option")
                        .attr("aria-selected", if selected { "true" } else { "false" })
                        .text(country)
                        .act(Act::ToggleCountry(country.clone())),
                );
            }
            modal = modal.child(menu);
        }
        modal.child(button("Save", Act::Save))
    }

    fn user_form(&self, form: &Form) -> N {
        let mut modal = n("div")
            .attr("class", "modal")
            .child(input("firstName", "First name", Field::FirstName))
            .child(input("lastName", "Last name", Field::LastName))
            .child(input("email", "Email", Field::Email))
            .child(
                n("div")
                    .attr("name", "organizationName")
                    .attr("class", "ant-select")
                    .text(form.organization.as_deref().unwrap_or("Select organization"))
                    .act(Act::ToggleDropdown),
            );
        if self.dropdown {
            let mut menu = n("div").attr("class", "ant-select-dropdown");
            for org in &self.organizations {
                menu = menu.child(
                    n("div")
                        .attr("class", "ant-select-item-option")
                        .text(&org.name)
                        .act(Act::PickOrg(org.name.clone())),
                );
            }
            modal = modal.child(menu);
        }
        modal
            .child(
                n("button")
                    .attr("role", "switch")
                    .attr("aria-label", "active")
                    .attr("aria-checked", if form.active { "true" } else { "false" })
                    .act(Act::ToggleSwitch),
            )
            .child(button("Save", Act::Save))
    }
}

fn split_url(url: &str) -> (String, String) {
    match url.find("://") {
        Some(scheme) => {
            let rest = &url[scheme + 3..];
            match rest.find('/') {
                Some(slash) => (
                    url[..scheme + 3 + slash].to_string(),
                    rest[slash..].to_string(),
                ),
                None => (url.to_string(), "/".into()),
            }
        }
        None => (BASE_URL.to_string(), url.to_string()),
    }
}

// ---------------------------------------------------------------------------
// element tree

#[derive(Debug, Clone)]
struct N {
    tag: &'static str,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<N>,
    act: Option<Act>,
}

fn n(tag: &'static str) -> N {
    N {
        tag,
        attrs: Vec::new(),
        text: String::new(),
        children: Vec::new(),
        act: None,
    }
}

impl N {
    fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    fn child(mut self, child: N) -> Self {
        self.children.push(child);
        self
    }

    fn act(mut self, act: Act) -> Self {
        self.act = Some(act);
        self
    }
}

fn button(label: &str, act: Act) -> N {
    n("button").text(label).act(act)
}

fn input(name: &str, placeholder: &str, field: Field) -> N {
    n("input")
        .attr("name", name)
        .attr("placeholder", placeholder)
        .act(Act::Input(field))
}

fn search_box() -> N {
    n("input")
        .attr("class", "rc-input")
        .attr("placeholder", "Search")
        .act(Act::Input(Field::Search))
}

fn delete_icon(i: usize) -> N {
    n("img").attr("alt", "delete").act(Act::AskDelete(i))
}

/// Zero-size listbox carrying option values; never clickable.
fn hidden_listbox(values: &[String]) -> N {
    values.iter().fold(
        n("div").attr("role", "listbox").attr("hidden", ""),
        |list, v| list.child(n("div").attr("role", "option").text(&v.to_lowercase())),
    )
}

fn value_item(value: &str) -> N {
    n("div")
        .attr("class", "CustomFormView_value__x9f")
        .text(&format!(" {} ", value))
}

/// Flattened element in document order.
struct El {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    act: Option<Act>,
    parent: Option<usize>,
    end: usize,
}

impl El {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Dom {
    els: Vec<El>,
}

impl Dom {
    fn build(root: &N) -> Self {
        let mut els = Vec::new();
        flatten(root, None, &mut els);
        Dom { els }
    }

    fn descendants(&self, id: usize) -> std::ops::Range<usize> {
        id + 1..self.els[id].end
    }

    fn children(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.descendants(id)
            .filter(move |&c| self.els[c].parent == Some(id))
    }

    fn scope(&self, roots: &[usize]) -> Vec<usize> {
        let mut out: Vec<usize> = roots.iter().flat_map(|&r| self.descendants(r)).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn resolve(&self, loc: &Locator, roots: &[usize]) -> Vec<usize> {
        match loc {
            Locator::Css { selector } => {
                let selectors = parse_selector_list(selector);
                self.scope(roots)
                    .into_iter()
                    .filter(|&id| selectors.iter().any(|s| s.matches(&self.els[id])))
                    .collect()
            }
            Locator::Role { role, name } => self
                .scope(roots)
                .into_iter()
                .filter(|&id| {
                    role_of(&self.els[id]).as_deref() == Some(role.as_str())
                        && name
                            .as_ref()
                            .map(|m| m.matches(&accessible_name(&self.els[id])))
                            .unwrap_or(true)
                })
                .collect(),
            Locator::Text { text } => self
                .scope(roots)
                .into_iter()
                .filter(|&id| {
                    text.matches(&self.els[id].text)
                        && !self.children(id).any(|c| text.matches(&self.els[c].text))
                })
                .collect(),
            Locator::Placeholder { text } => self
                .scope(roots)
                .into_iter()
                .filter(|&id| {
                    self.els[id]
                        .attr("placeholder")
                        .map(|p| p.to_lowercase().contains(&text.to_lowercase()))
                        .unwrap_or(false)
                })
                .collect(),
            Locator::Or { first, second } => {
                let mut out = self.resolve(first, roots);
                out.extend(self.resolve(second, roots));
                out.sort_unstable();
                out.dedup();
                out
            }
            Locator::Within { scope, inner } => {
                let scopes = self.resolve(scope, roots);
                let mut out = self.resolve(inner, &scopes);
                out.sort_unstable();
                out.dedup();
                out
            }
            Locator::Filter { inner, has_text } => self
                .resolve(inner, roots)
                .into_iter()
                .filter(|&id| has_text.matches(&self.els[id].text))
                .collect(),
            Locator::Nth { inner, index } => self
                .resolve(inner, roots)
                .get(*index)
                .map(|&id| vec![id])
                .unwrap_or_default(),
        }
    }

    fn query(&self, loc: &Locator) -> Vec<usize> {
        self.resolve(loc, &[0])
    }

    /// Hidden when the element or an ancestor carries `hidden`.
    fn visible(&self, id: usize) -> bool {
        let mut cur = Some(id);
        while let Some(i) = cur {
            if self.els[i].attr("hidden").is_some() {
                return false;
            }
            cur = self.els[i].parent;
        }
        true
    }

    fn info(&self, id: usize) -> ElementInfo {
        let el = &self.els[id];
        ElementInfo {
            handle: id.to_string(),
            tag: el.tag.clone(),
            text: el.text.clone(),
            visible: self.visible(id),
            attributes: el.attrs.iter().cloned().collect::<HashMap<_, _>>(),
        }
    }
}

fn flatten(node: &N, parent: Option<usize>, out: &mut Vec<El>) -> String {
    let id = out.len();
    out.push(El {
        tag: node.tag.to_string(),
        attrs: node.attrs.clone(),
        text: String::new(),
        act: node.act.clone(),
        parent,
        end: 0,
    });
    let mut text = node.text.clone();
    for child in &node.children {
        text.push_str(&flatten(child, Some(id), out));
    }
    out[id].text = text.clone();
    out[id].end = out.len();
    text
}

fn role_of(el: &El) -> Option<String> {
    if let Some(role) = el.attr("role") {
        return role.split_whitespace().next().map(str::to_string);
    }
    let implicit = match el.tag.as_str() {
        "button" => "button",
        "td" => "cell",
        "th" => "columnheader",
        "tr" => "row",
        "table" => "table",
        "img" => "img",
        "option" => "option",
        "select" => "combobox",
        "input" => "textbox",
        _ => return None,
    };
    Some(implicit.to_string())
}

fn accessible_name(el: &El) -> String {
    if let Some(label) = el.attr("aria-label").or_else(|| el.attr("alt")) {
        return label.to_string();
    }
    el.text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// css subset: tag, .class, [attr], [attr="v"], [attr*="v"], comma lists

#[derive(Debug)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
}

impl Compound {
    fn matches(&self, el: &El) -> bool {
        if let Some(ref tag) = self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        let classes: Vec<&str> = el.attr("class").unwrap_or("").split_whitespace().collect();
        if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        self.attrs.iter().all(|(name, op)| match (el.attr(name), op) {
            (None, _) => false,
            (Some(_), AttrOp::Exists) => true,
            (Some(v), AttrOp::Equals(want)) => v == want,
            (Some(v), AttrOp::Contains(want)) => v.contains(want.as_str()),
        })
    }
}

fn parse_selector_list(list: &str) -> Vec<Compound> {
    list.split(',').map(|s| parse_compound(s.trim())).collect()
}

fn parse_compound(s: &str) -> Compound {
    let chars: Vec<char> = s.chars().collect();
    let ident = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '-' || chars[*i] == '_') {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>()
    };

    let mut c = Compound::default();
    let mut i = 0;
    let tag = ident(&mut i);
    if !tag.is_empty() {
        c.tag = Some(tag);
    }
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                c.classes.push(ident(&mut i));
            }
            '[' => {
                i += 1;
                let name = ident(&mut i);
                let op = match chars[i] {
                    ']' => {
                        i += 1;
                        c.attrs.push((name, AttrOp::Exists));
                        continue;
                    }
                    '*' => {
                        i += 2;
                        true
                    }
                    '=' => {
                        i += 1;
                        false
                    }
                    other => panic!("unsupported attribute operator {:?} in {:?}", other, s),
                };
                let quoted = chars[i] == '"';
                if quoted {
                    i += 1;
                }
                let close = if quoted { '"' } else { ']' };
                let start = i;
                while chars[i] != close {
                    i += 1;
                }
                let value: String = chars[start..i].iter().collect();
                if quoted {
                    i += 1;
                }
                assert_eq!(chars[i], ']', "unterminated attribute in {:?}", s);
                i += 1;
                c.attrs.push((
                    name,
                    if op {
                        AttrOp::Contains(value)
                    } else {
                        AttrOp::Equals(value)
                    },
                ));
            }
            other => panic!("unsupported selector syntax {:?} in {:?}", other, s),
        }
    }
    c
}

// ---------------------------------------------------------------------------
// driver

impl SimConsole {
    fn resolve_first(&self, st: &State, locator: &Locator) -> Result<(Dom, usize)> {
        let dom = Dom::build(&st.render());
        let id = dom
            .query(locator)
            .first()
            .copied()
            .ok_or_else(|| Error::Driver(format!("no element matches {}", locator)))?;
        Ok((dom, id))
    }
}

#[async_trait]
impl Driver for SimConsole {
    async fn goto(&self, url: &str) -> Result<()> {
        self.state.lock().navigate(url);
        Ok(())
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        let st = self.state.lock();
        let dom = Dom::build(&st.render());
        Ok(dom.query(locator).into_iter().map(|id| dom.info(id)).collect())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let mut st = self.state.lock();
        let (dom, id) = self.resolve_first(&st, locator)?;
        if let Some(act) = dom.els[id].act.clone() {
            st.apply(act);
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let mut st = self.state.lock();
        let (dom, id) = self.resolve_first(&st, locator)?;
        match dom.els[id].act {
            Some(Act::Input(field)) => {
                st.fill(field, value);
                Ok(())
            }
            _ => Err(Error::Driver(format!("{} is not fillable", locator))),
        }
    }

    async fn select_by_label(&self, locator: &Locator, label: &str) -> Result<String> {
        let mut st = self.state.lock();
        let (dom, id) = self.resolve_first(&st, locator)?;
        if dom.els[id].tag != "select" {
            return Err(Error::Driver(format!("{} is not a select", locator)));
        }
        let wanted = TextMatch::exact_label(label);
        let chosen = dom
            .children(id)
            .map(|c| dom.els[c].text.trim().to_string())
            .find(|t| wanted.matches(t))
            .ok_or_else(|| Error::OptionNotFound {
                label: label.to_string(),
                control: locator.to_string(),
            })?;
        st.clicks.push(chosen.clone());
        if let Some(ref mut form) = st.form {
            form.role = Some(chosen.clone());
        }
        Ok(chosen)
    }

    async fn responses(&self) -> Result<Vec<ObservedResponse>> {
        Ok(self.state.lock().log.entries().to_vec())
    }

    async fn route(&self, pattern: UrlPattern, handler: Arc<dyn RouteHandler>) -> Result<()> {
        self.state.lock().routes.add(pattern, handler);
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(2)
    }
}
