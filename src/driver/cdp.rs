//! [`Driver`] over an `eoka::Page`.
//!
//! Locators are evaluated in the page by an injected resolver that returns
//! element snapshots plus a unique CSS selector; clicks and fills then go
//! through eoka on that selector. A network shim patches `fetch` and
//! `XMLHttpRequest` to record completed requests and to hold requests that
//! match a registered route until the Rust side settles them. Every driver
//! call pumps the shim first.

use super::{Driver, ElementInfo};
use crate::locator::Locator;
use crate::network::{
    HttpMethod, InterceptedRequest, ObservedResponse, ResponseLog, RouteHandler, RouteTable,
    UrlPattern,
};
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::Page;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Network shim. Idempotent; returns whether it was already present.
const SHIM_JS: &str = r#"
(() => {
  if (window.__eokaE2e) return 'present';
  const st = { done: [], pending: [], waiters: {}, routes: [], next: 1 };
  const abs = u => { try { return new URL(String(u), location.href).href; } catch (_) { return String(u); } };
  const routed = url => st.routes.some(r => { try { return new RegExp(r.source).test(url); } catch (_) { return false; } });
  const hold = (url, method, body) => new Promise(resolve => {
    const rid = st.next++;
    st.waiters[rid] = resolve;
    st.pending.push({ rid, url, method, body: typeof body === 'string' ? body : null });
  });

  const origFetch = window.fetch ? window.fetch.bind(window) : null;
  if (origFetch) {
    window.fetch = async (input, init) => {
      const req = (typeof Request !== 'undefined' && input instanceof Request) ? input : null;
      const url = abs(req ? req.url : input);
      const method = String((init && init.method) || (req && req.method) || 'GET').toUpperCase();
      let body = init && init.body != null ? init.body : null;
      if (body == null && req && method !== 'GET' && method !== 'HEAD') {
        try { body = await req.clone().text(); } catch (_) {}
      }
      if (routed(url)) {
        const d = await hold(url, method, body);
        if (d.fulfill) {
          const f = d.fulfill;
          st.done.push({ url, method, status: f.status });
          const empty = f.status === 204 || f.status === 205 || f.status === 304;
          return new Response(empty ? null : f.body, { status: f.status, headers: f.headers || {} });
        }
      }
      const resp = await origFetch(input, init);
      st.done.push({ url, method, status: resp.status });
      return resp;
    };
  }

  const X = XMLHttpRequest.prototype;
  const origOpen = X.open;
  const origSend = X.send;
  X.open = function (method, url) {
    const meta = { method: String(method).toUpperCase(), url: abs(url) };
    this.__e2e = meta;
    this.addEventListener('loadend', () => {
      if (!this.__e2eMocked && this.status) st.done.push({ url: meta.url, method: meta.method, status: this.status });
    });
    return origOpen.apply(this, arguments);
  };
  X.send = function (body) {
    const meta = this.__e2e;
    if (!meta || !routed(meta.url)) return origSend.call(this, body);
    const xhr = this;
    hold(meta.url, meta.method, body).then(d => {
      if (!d.fulfill) return origSend.call(xhr, body);
      const f = d.fulfill;
      const headers = f.headers || {};
      const def = (k, v) => Object.defineProperty(xhr, k, { configurable: true, value: v });
      xhr.__e2eMocked = true;
      def('readyState', 4);
      def('status', f.status);
      def('statusText', '');
      def('responseURL', meta.url);
      def('responseText', f.body);
      let parsed = f.body;
      if (xhr.responseType === 'json') { try { parsed = JSON.parse(f.body); } catch (_) { parsed = null; } }
      def('response', parsed);
      xhr.getAllResponseHeaders = () => Object.entries(headers).map(([k, v]) => k + ': ' + v).join('\r\n');
      xhr.getResponseHeader = n => {
        const k = Object.keys(headers).find(h => h.toLowerCase() === String(n).toLowerCase());
        return k ? headers[k] : null;
      };
      st.done.push({ url: meta.url, method: meta.method, status: f.status });
      ['readystatechange', 'load', 'loadend'].forEach(t => xhr.dispatchEvent(new Event(t)));
    });
  };

  window.__eokaE2e = {
    setRoutes(list) { st.routes = list; },
    drain() { return JSON.stringify({ done: st.done.splice(0), pending: st.pending.splice(0) }); },
    settle(rid, decision) {
      const w = st.waiters[rid];
      delete st.waiters[rid];
      if (w) w(decision);
    },
  };
  return 'installed';
})()
"#;

const DRAIN_JS: &str = "window.__eokaE2e ? window.__eokaE2e.drain() : 'null'";

/// Locator resolver. Called as `LOCATE_JS(locator, op, arg)`.
const LOCATE_JS: &str = r#"
((loc, op, arg) => {
  const matchText = (text, m) => {
    const s = text || '';
    switch (m.kind) {
      case 'exact': return s.trim() === m.value;
      case 'contains': return s.toLowerCase().includes(String(m.value).toLowerCase());
      case 'pattern': try { return new RegExp(m.value, 'i').test(s); } catch (_) { return false; }
    }
    return false;
  };

  const implicitRole = el => {
    const t = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    switch (t) {
      case 'button': return 'button';
      case 'a': return el.hasAttribute('href') ? 'link' : null;
      case 'td': return 'cell';
      case 'th': return 'columnheader';
      case 'tr': return 'row';
      case 'table': return 'table';
      case 'option': return 'option';
      case 'img': return 'img';
      case 'select': return el.multiple ? 'listbox' : 'combobox';
      case 'textarea': return 'textbox';
      case 'input':
        if (['button', 'submit', 'reset'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        return 'textbox';
    }
    return null;
  };
  const roleOf = el => (el.getAttribute('role') || '').split(/\s+/).filter(Boolean)[0] || implicitRole(el);
  const nameOf = el => (el.getAttribute('aria-label') || el.getAttribute('alt')
    || el.innerText || el.textContent || el.getAttribute('title') || '').replace(/\s+/g, ' ').trim();

  const order = els => [...new Set(els)].sort((a, b) =>
    a === b ? 0 : (a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1));
  const all = roots => roots.flatMap(r => [...r.querySelectorAll('*')]);

  const resolve = (l, roots) => {
    switch (l.kind) {
      case 'css': return order(roots.flatMap(r => [...r.querySelectorAll(l.selector)]));
      case 'role': return order(all(roots).filter(el => roleOf(el) === l.role && (!l.name || matchText(nameOf(el), l.name))));
      case 'text': return order(all(roots).filter(el => matchText(el.textContent, l.text)
        && ![...el.children].some(c => matchText(c.textContent, l.text))));
      case 'placeholder': return order(all(roots).filter(el =>
        (el.getAttribute('placeholder') || '').toLowerCase().includes(l.text.toLowerCase())));
      case 'or': return order([...resolve(l.first, roots), ...resolve(l.second, roots)]);
      case 'within': return order(resolve(l.inner, resolve(l.scope, roots)));
      case 'filter': return resolve(l.inner, roots).filter(el => matchText(el.textContent, l.has_text));
      case 'nth': { const els = resolve(l.inner, roots); return els[l.index] ? [els[l.index]] : []; }
    }
    return [];
  };

  const selectorOf = el => {
    if (el.id) return '#' + CSS.escape(el.id);
    const path = [];
    let n = el;
    while (n && n.nodeType === 1) {
      let s = n.tagName.toLowerCase();
      if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
      const p = n.parentElement;
      if (p) {
        const sibs = [...p.children].filter(c => c.tagName === n.tagName);
        if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
      }
      path.unshift(s);
      n = p;
    }
    return path.join(' > ');
  };
  const visible = el => {
    if (!el.isConnected) return false;
    const s = getComputedStyle(el);
    if (s.visibility === 'hidden' || s.display === 'none') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };

  const els = resolve(loc, [document]);
  if (op === 'query') {
    return JSON.stringify(els.map(el => ({
      handle: selectorOf(el),
      tag: el.tagName.toLowerCase(),
      text: el.textContent || '',
      visible: visible(el),
      attributes: Object.fromEntries([...el.attributes].map(a => [a.name, a.value])),
    })));
  }
  if (op === 'select') {
    const el = els[0];
    if (!el) return JSON.stringify({ ok: false, error: 'element_not_found' });
    if (!el.options) return JSON.stringify({ ok: false, error: 'not_a_select' });
    const want = String(arg).trim().toLowerCase();
    const opt = [...el.options].find(o => o.text.trim().toLowerCase() === want);
    if (!opt) return JSON.stringify({ ok: false, error: 'option_not_found' });
    if (!el.multiple) {
      const setter = Object.getOwnPropertyDescriptor(HTMLSelectElement.prototype, 'value').set;
      setter.call(el, opt.value);
    }
    opt.selected = true;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return JSON.stringify({ ok: true, label: opt.text.trim() });
  }
  return JSON.stringify({ ok: false, error: 'unknown_op' });
})
"#;

#[derive(Debug, Deserialize)]
struct Drained {
    done: Vec<DoneEntry>,
    pending: Vec<PendingEntry>,
}

#[derive(Debug, Deserialize)]
struct DoneEntry {
    url: String,
    method: String,
    status: u16,
}

#[derive(Debug, Deserialize)]
struct PendingEntry {
    rid: u64,
    url: String,
    method: String,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectResult {
    ok: bool,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Browser-backed driver for one scenario.
pub struct EokaDriver {
    page: Mutex<Page>,
    routes: parking_lot::Mutex<RouteTable>,
    log: parking_lot::Mutex<ResponseLog>,
    poll: Duration,
}

impl EokaDriver {
    pub fn new(page: Page) -> Self {
        Self {
            page: Mutex::new(page),
            routes: parking_lot::Mutex::new(RouteTable::new()),
            log: parking_lot::Mutex::new(ResponseLog::new()),
            poll: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// PNG screenshot of the current page.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.page.lock().await;
        Ok(page.screenshot().await?)
    }

    async fn install(&self, page: &Page) -> Result<()> {
        let state: String = page.evaluate(SHIM_JS).await?;
        let routes: Vec<serde_json::Value> = self
            .routes
            .lock()
            .patterns()
            .into_iter()
            .map(|(id, source)| json!({ "id": id, "source": source }))
            .collect();
        page.execute(&format!(
            "window.__eokaE2e && window.__eokaE2e.setRoutes({})",
            serde_json::Value::Array(routes)
        ))
        .await?;
        debug!("network shim {}", state);
        Ok(())
    }

    /// Move completed responses into the log and settle held requests.
    async fn pump(&self, page: &Page) -> Result<()> {
        let raw: String = page.evaluate(DRAIN_JS).await?;
        if raw == "null" {
            return self.install(page).await;
        }
        let drained: Drained = serde_json::from_str(&raw)?;

        {
            let mut log = self.log.lock();
            for entry in drained.done {
                match entry.method.parse::<HttpMethod>() {
                    Ok(method) => {
                        log.push(entry.url, method, entry.status);
                    }
                    Err(e) => warn!("dropping response {}: {}", entry.url, e),
                }
            }
        }

        for held in drained.pending {
            let request = InterceptedRequest {
                url: held.url,
                method: held.method.parse().unwrap_or(HttpMethod::Get),
                body: held.body,
            };
            let decision = self.routes.lock().dispatch(&request);
            let payload = match decision {
                Some(resp) => {
                    debug!("route: {} {} -> {}", request.method, request.url, resp.status);
                    let headers: serde_json::Map<String, serde_json::Value> = resp
                        .headers
                        .iter()
                        .map(|(k, v)| (k.clone(), json!(v)))
                        .collect();
                    json!({ "fulfill": { "status": resp.status, "headers": headers, "body": resp.body } })
                }
                None => {
                    debug!("route: {} {} -> network", request.method, request.url);
                    json!({ "fallback": true })
                }
            };
            page.execute(&format!(
                "window.__eokaE2e && window.__eokaE2e.settle({}, {})",
                held.rid, payload
            ))
            .await?;
        }
        Ok(())
    }

    async fn locate(&self, page: &Page, locator: &Locator, op: &str, arg: &str) -> Result<String> {
        let js = format!(
            "{}({}, {}, {})",
            LOCATE_JS,
            locator.to_json(),
            serde_json::to_string(op)?,
            serde_json::to_string(arg)?
        );
        Ok(page.evaluate(&js).await?)
    }

    async fn resolve_first(&self, page: &Page, locator: &Locator) -> Result<ElementInfo> {
        let raw = self.locate(page, locator, "query", "").await?;
        let found: Vec<ElementInfo> = serde_json::from_str(&raw)?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| Error::Driver(format!("no element matches {}", locator)))
    }
}

#[async_trait]
impl Driver for EokaDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        debug!("goto: {}", url);
        page.goto(url).await?;
        self.install(&page).await
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        let page = self.page.lock().await;
        self.pump(&page).await?;
        let raw = self.locate(&page, locator, "query", "").await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let page = self.page.lock().await;
        self.pump(&page).await?;
        let el = self.resolve_first(&page, locator).await?;
        page.click(&el.handle).await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let page = self.page.lock().await;
        self.pump(&page).await?;
        let el = self.resolve_first(&page, locator).await?;
        page.fill(&el.handle, value).await?;
        Ok(())
    }

    async fn select_by_label(&self, locator: &Locator, label: &str) -> Result<String> {
        let page = self.page.lock().await;
        self.pump(&page).await?;
        let raw = self.locate(&page, locator, "select", label).await?;
        let result: SelectResult = serde_json::from_str(&raw)?;
        match (result.ok, result.label) {
            (true, Some(chosen)) => Ok(chosen),
            _ => match result.error.as_deref() {
                Some("option_not_found") => Err(Error::OptionNotFound {
                    label: label.to_string(),
                    control: locator.to_string(),
                }),
                other => Err(Error::Driver(format!(
                    "select on {} failed: {}",
                    locator,
                    other.unwrap_or("unknown error")
                ))),
            },
        }
    }

    async fn responses(&self) -> Result<Vec<ObservedResponse>> {
        let page = self.page.lock().await;
        self.pump(&page).await?;
        let log = self.log.lock();
        Ok(log.entries().to_vec())
    }

    async fn route(&self, pattern: UrlPattern, handler: Arc<dyn RouteHandler>) -> Result<()> {
        debug!("route registered: {}", pattern);
        self.routes.lock().add(pattern, handler);
        let page = self.page.lock().await;
        self.install(&page).await
    }

    fn poll_interval(&self) -> Duration {
        self.poll
    }
}
