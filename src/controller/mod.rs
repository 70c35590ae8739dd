//! The browser controller: a uniform facade over the CDP transport.
//!
//! Every DOM read returns a [`Retryable`] whose fetch re-issues the same
//! remote read, so callers can `expect(...)` on it and have the assertion
//! poll live state. Discrete actions (navigation, clicks, key input) return
//! plain results.

pub mod context;
pub mod handle;
pub mod pool;
pub mod session;

pub use context::LookupContext;
pub use handle::ElementHandle;
pub use pool::ControllerPool;
pub use session::BrowserSession;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotParams;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::netlog::NetworkLog;
use crate::retry::{poll_until, PollOptions, Retryable};
use crate::selectors::{self, SelectorType};

/// Pseudo-key accepted by [`BrowserController::type_text`]: issues the
/// platform paste chord instead of literal key injection, since clipboard
/// content cannot be typed through standard key events.
pub const PASTE_KEY: &str = "__paste__";

/// Position and size of an element's bounding client rect.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
struct InnerSize {
    width: u32,
    height: u32,
}

/// Evaluate `js` on `page` and decode the result.
async fn eval<T: DeserializeOwned>(page: &Page, js: &str) -> Result<T> {
    let result = page.evaluate(js).await?;
    Ok(result.into_value::<T>()?)
}

/// Facade over one remote page. Owns the addressing context (document /
/// frame / shadow root) and the network log for its session.
///
/// One controller belongs to one logical test execution; context switches
/// take `&mut self`, serializing them against reads scoped to that context.
pub struct BrowserController {
    page: Page,
    context: LookupContext,
    netlog: NetworkLog,
    poll: PollOptions,
    xpath_installed: AtomicBool,
}

impl BrowserController {
    /// Wrap an open page: enables network capture and starts with the top
    /// document as lookup root.
    pub async fn attach(page: Page) -> Result<Self> {
        let netlog = NetworkLog::attach(&page).await?;
        Ok(Self {
            page,
            context: LookupContext::Document,
            netlog,
            poll: PollOptions::default(),
            xpath_installed: AtomicBool::new(false),
        })
    }

    pub fn network_log(&self) -> &NetworkLog {
        &self.netlog
    }

    /// The current addressing context.
    pub fn context(&self) -> &LookupContext {
        &self.context
    }

    /// Default timeout/cadence for lookups and reads.
    pub fn set_poll_options(&mut self, options: PollOptions) {
        self.poll = options;
    }

    // ── addressing context ─────────────────────────────────────────────

    /// Re-root subsequent lookups into an iframe's document.
    pub fn switch_to_frame(&mut self, frame: ElementHandle) {
        self.context = LookupContext::Frame(frame);
    }

    /// Return to the top document from a frame.
    pub fn switch_to_parent(&mut self) {
        self.context = LookupContext::Document;
    }

    /// Re-root subsequent lookups into `host`'s shadow tree. The shadow
    /// root is re-derived from the host's live `shadowRoot` property on
    /// every lookup, never held as a stored remote reference.
    pub fn switch_to_shadow_root(&mut self, host: ElementHandle) {
        self.context = LookupContext::ShadowRoot(host);
    }

    /// Alias for [`switch_to_shadow_root`](Self::switch_to_shadow_root):
    /// querySelector scoping inside a shadow tree always goes through the
    /// root node.
    pub fn switch_to_shadow(&mut self, host: ElementHandle) {
        self.switch_to_shadow_root(host);
    }

    /// Leave shadow DOM, back to the top document.
    pub fn switch_to_light(&mut self) {
        self.context = LookupContext::Document;
    }

    // ── element lookup ─────────────────────────────────────────────────

    /// Poll the current root for a CSS match, resolving once one exists.
    pub async fn find_element(&self, selector: &str, timeout: Duration) -> Result<ElementHandle> {
        self.find_element_by(selector, SelectorType::Css, timeout)
            .await
    }

    /// Poll the current root for an XPath match.
    pub async fn find_element_xpath(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        self.find_element_by(selector, SelectorType::Xpath, timeout)
            .await
    }

    pub async fn find_element_by(
        &self,
        selector: &str,
        selector_type: SelectorType,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        if selector_type == SelectorType::Xpath {
            self.ensure_xpath_helper().await?;
        }
        let root = self.context.root_js();
        let locate = selectors::locator_js(selector, selector_type, &root)?;
        // "Not found yet" is a false probe result and keeps the poll
        // going; only transport failures abort.
        let probe = format!(
            "(() => {{ const el = {locate}; return el !== null && el !== undefined; }})()"
        );
        let options = self.poll.with_timeout(timeout);
        let outcome = poll_until(
            &format!("element {selector:?} present in {}", self.context.name()),
            || eval::<bool>(&self.page, &probe),
            |present| *present,
            &options,
        )
        .await;

        match outcome {
            Ok(_) => Ok(ElementHandle::new(
                locate,
                format!("element matching {selector:?}"),
            )),
            Err(Error::PollTimeout { .. }) => Err(Error::NotFound {
                selector: selector.to_string(),
                timeout,
            }),
            Err(other) => Err(other),
        }
    }

    /// Poll until at least one CSS match exists, then hand back indexed
    /// handles for every current match.
    pub async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.find_elements_by(selector, SelectorType::Css).await
    }

    pub async fn find_elements_xpath(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.find_elements_by(selector, SelectorType::Xpath).await
    }

    pub async fn find_elements_by(
        &self,
        selector: &str,
        selector_type: SelectorType,
    ) -> Result<Vec<ElementHandle>> {
        if selector_type == SelectorType::Xpath {
            self.ensure_xpath_helper().await?;
        }
        let root = self.context.root_js();
        let count = selectors::count_js(selector, selector_type, &root)?;
        let outcome = poll_until(
            &format!("elements {selector:?} present in {}", self.context.name()),
            || eval::<usize>(&self.page, &count),
            |n| *n > 0,
            &self.poll,
        )
        .await;

        let n = match outcome {
            Ok(n) => n,
            Err(Error::PollTimeout { .. }) => {
                return Err(Error::NotFound {
                    selector: selector.to_string(),
                    timeout: self.poll.timeout,
                })
            }
            Err(other) => return Err(other),
        };

        (0..n)
            .map(|i| {
                Ok(ElementHandle::new(
                    selectors::nth_locator_js(selector, selector_type, &root, i)?,
                    format!("element {i} matching {selector:?}"),
                ))
            })
            .collect()
    }

    /// Live count of matches — retryable, for "wait until N items" checks.
    pub fn element_count(&self, selector: &str) -> Result<Retryable<usize>> {
        let count = selectors::count_js(selector, SelectorType::Css, &self.context.root_js())?;
        Ok(self.remote_read(format!("count of {selector:?}"), count))
    }

    /// Install the XPath evaluation helper into the page, once per
    /// controller lifetime.
    async fn ensure_xpath_helper(&self) -> Result<()> {
        if self.xpath_installed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = eval::<bool>(&self.page, selectors::XPATH_HELPER_JS).await {
            self.xpath_installed.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    // ── retryable reads ────────────────────────────────────────────────

    fn remote_read<T>(&self, description: String, js: String) -> Retryable<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let page = self.page.clone();
        Retryable::live(description, move || {
            let page = page.clone();
            let js = js.clone();
            async move { eval::<T>(&page, &js).await }
        })
    }

    fn element_read<T>(&self, handle: &ElementHandle, what: &str, body: &str) -> Retryable<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        // A vanished element is a permanent failure, not a retry: the
        // thrown error aborts any poll immediately.
        let js = format!(
            r#"(() => {{
                const el = {locate};
                if (!el) throw new Error('element no longer present: {what}');
                return {body};
            }})()"#,
            locate = handle.locate_js(),
        );
        self.remote_read(format!("{what} of {}", handle.description()), js)
    }

    /// Trimmed text content.
    pub fn text(&self, handle: &ElementHandle) -> Retryable<String> {
        self.element_read(handle, "text", "(el.textContent || '').trim()")
    }

    pub fn attribute(&self, handle: &ElementHandle, name: &str) -> Retryable<Option<String>> {
        let name_js = serde_json::to_string(name).unwrap_or_default();
        self.element_read(
            handle,
            &format!("attribute {name}"),
            &format!("el.getAttribute({name_js})"),
        )
    }

    pub fn property(&self, handle: &ElementHandle, name: &str) -> Retryable<serde_json::Value> {
        let name_js = serde_json::to_string(name).unwrap_or_default();
        self.element_read(
            handle,
            &format!("property {name}"),
            &format!("el[{name_js}]"),
        )
    }

    /// Computed style value.
    pub fn css_value(&self, handle: &ElementHandle, prop: &str) -> Retryable<String> {
        let prop_js = serde_json::to_string(prop).unwrap_or_default();
        self.element_read(
            handle,
            &format!("css {prop}"),
            &format!("getComputedStyle(el).getPropertyValue({prop_js})"),
        )
    }

    pub fn rect(&self, handle: &ElementHandle) -> Retryable<ElementRect> {
        self.element_read(
            handle,
            "rect",
            "(() => { const r = el.getBoundingClientRect(); \
             return { x: r.x, y: r.y, width: r.width, height: r.height }; })()",
        )
    }

    pub fn enabled(&self, handle: &ElementHandle) -> Retryable<bool> {
        self.element_read(handle, "enabled", "!el.disabled")
    }

    pub fn selected(&self, handle: &ElementHandle) -> Retryable<bool> {
        self.element_read(handle, "selected", "!!(el.checked || el.selected)")
    }

    pub fn displayed(&self, handle: &ElementHandle) -> Retryable<bool> {
        self.element_read(
            handle,
            "displayed",
            "(() => { const style = getComputedStyle(el); \
             const rect = el.getBoundingClientRect(); \
             return style.display !== 'none' && style.visibility !== 'hidden' \
                 && parseFloat(style.opacity) > 0 && rect.width > 0 && rect.height > 0; })()",
        )
    }

    pub fn title(&self) -> Retryable<String> {
        self.remote_read("page title".to_string(), "document.title".to_string())
    }

    pub fn url(&self) -> Retryable<String> {
        self.remote_read(
            "page url".to_string(),
            "window.location.href".to_string(),
        )
    }

    // ── actions ────────────────────────────────────────────────────────

    /// Hybrid click: scroll into view, prefer a real mouse-event sequence
    /// when the element is visible and unobscured, fall back to a JS click
    /// otherwise.
    pub async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let check_js = format!(
            r#"(() => {{
                const el = {locate};
                if (!el) throw new Error('element no longer present');
                el.scrollIntoView({{ block: 'center', inline: 'center', behavior: 'instant' }});
                const rect = el.getBoundingClientRect();
                if (rect.width === 0 && rect.height === 0) {{
                    return {{ visible: false, unobscured: false }};
                }}
                const cx = rect.left + rect.width / 2;
                const cy = rect.top + rect.height / 2;
                const style = getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden' || parseFloat(style.opacity) === 0) {{
                    return {{ visible: false, unobscured: false }};
                }}
                const top = document.elementFromPoint(cx, cy);
                const unobscured = !!top && (el === top || el.contains(top) || top.contains(el));
                return {{ visible: true, unobscured: unobscured }};
            }})()"#,
            locate = handle.locate_js(),
        );
        let check: serde_json::Value = eval(&self.page, &check_js).await?;
        let direct = check["visible"].as_bool().unwrap_or(false)
            && check["unobscured"].as_bool().unwrap_or(false);

        // Let scroll and layout settle before dispatching.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let click_js = if direct {
            format!(
                r#"(() => {{
                    const el = {locate};
                    const rect = el.getBoundingClientRect();
                    const opts = {{
                        bubbles: true, cancelable: true,
                        clientX: rect.left + rect.width / 2,
                        clientY: rect.top + rect.height / 2,
                        button: 0
                    }};
                    el.dispatchEvent(new MouseEvent('mousemove', opts));
                    el.dispatchEvent(new MouseEvent('mousedown', opts));
                    el.dispatchEvent(new MouseEvent('mouseup', opts));
                    el.dispatchEvent(new MouseEvent('click', opts));
                    return true;
                }})()"#,
                locate = handle.locate_js(),
            )
        } else {
            format!(
                r#"(() => {{
                    const el = {locate};
                    if (!el) throw new Error('element no longer present');
                    el.click();
                    return true;
                }})()"#,
                locate = handle.locate_js(),
            )
        };
        eval::<bool>(&self.page, &click_js).await?;
        Ok(())
    }

    /// Type into `handle`, or into the focused element when `handle` is
    /// `None`. [`PASTE_KEY`] issues the platform paste chord instead of
    /// literal keystrokes.
    pub async fn type_text(&self, handle: Option<&ElementHandle>, text: &str) -> Result<()> {
        if text == PASTE_KEY {
            let modifier = if cfg!(target_os = "macos") { "meta" } else { "ctrl" };
            return self.press_key("v", &[modifier]).await;
        }

        let target = match handle {
            Some(h) => h.locate_js().to_string(),
            None => "document.activeElement".to_string(),
        };
        let js = format!(
            r#"(() => {{
                const el = {target};
                if (!el) throw new Error('no element to type into');
                el.focus();
                const text = {text};
                if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {{
                    const setter = Object.getOwnPropertyDescriptor(
                        window.HTMLInputElement.prototype, 'value'
                    )?.set || Object.getOwnPropertyDescriptor(
                        window.HTMLTextAreaElement.prototype, 'value'
                    )?.set;
                    if (setter) {{
                        setter.call(el, el.value + text);
                    }} else {{
                        el.value += text;
                    }}
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                }} else {{
                    document.execCommand('insertText', false, text);
                }}
                return true;
            }})()"#,
            text = serde_json::to_string(text)?,
        );
        eval::<bool>(&self.page, &js).await?;
        Ok(())
    }

    /// Dispatch a key event sequence to the focused element.
    pub async fn press_key(&self, key: &str, modifiers: &[&str]) -> Result<()> {
        let (code, key_code) = key_to_code(key);
        let js = format!(
            r#"(() => {{
                const el = document.activeElement || document.body;
                const opts = {{
                    key: {key}, code: {code}, keyCode: {key_code}, which: {key_code},
                    bubbles: true, cancelable: true,
                    ctrlKey: {ctrl}, shiftKey: {shift}, altKey: {alt}, metaKey: {meta}
                }};
                el.dispatchEvent(new KeyboardEvent('keydown', opts));
                el.dispatchEvent(new KeyboardEvent('keypress', opts));
                el.dispatchEvent(new KeyboardEvent('keyup', opts));
                return true;
            }})()"#,
            key = serde_json::to_string(key)?,
            code = serde_json::to_string(&code)?,
            key_code = key_code,
            ctrl = modifiers.iter().any(|m| *m == "ctrl" || *m == "control"),
            shift = modifiers.iter().any(|m| *m == "shift"),
            alt = modifiers.iter().any(|m| *m == "alt"),
            meta = modifiers.iter().any(|m| *m == "meta" || *m == "command"),
        );
        eval::<bool>(&self.page, &js).await?;
        Ok(())
    }

    /// Scroll the element into view.
    pub async fn scroll_to(&self, handle: &ElementHandle) -> Result<()> {
        let js = format!(
            r#"(() => {{
                const el = {locate};
                if (!el) throw new Error('element no longer present');
                el.scrollIntoView({{ block: 'center', behavior: 'instant' }});
                return true;
            }})()"#,
            locate = handle.locate_js(),
        );
        eval::<bool>(&self.page, &js).await?;
        Ok(())
    }

    /// Scroll the window by a pixel delta.
    pub async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()> {
        let js = format!(
            "window.scrollBy({{ left: {dx}, top: {dy}, behavior: 'instant' }})"
        );
        self.page.evaluate(js).await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        tracing::info!("navigating to {url}");
        self.page.goto(url).await?;
        // goto waits for the load event; a short settle covers post-load
        // JS rendering.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    pub async fn back(&self) -> Result<()> {
        self.page.evaluate("window.history.back()").await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    pub async fn forward(&self) -> Result<()> {
        self.page.evaluate("window.history.forward()").await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    pub async fn reload(&self) -> Result<()> {
        self.page.reload().await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    /// Execute a script in the page context and decode its result.
    pub async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        eval(&self.page, js).await
    }

    /// Execute a JS function expression with serialized arguments.
    pub async fn evaluate_with_args(
        &self,
        function: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value> {
        let rendered: Vec<String> = args
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<_, _>>()?;
        let js = format!("({function})({})", rendered.join(", "));
        eval(&self.page, &js).await
    }

    /// Capture the viewport as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let bytes = self
            .page
            .screenshot(CaptureScreenshotParams::builder().build())
            .await?;
        Ok(bytes)
    }

    /// Capture the viewport as a base64 PNG string.
    pub async fn screenshot_base64(&self) -> Result<String> {
        let bytes = self.screenshot().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    // ── window sizing ──────────────────────────────────────────────────

    /// Resize so the *content* area is exactly `width`x`height`.
    ///
    /// Requests the outer bounds, re-measures the inner size, and if
    /// browser chrome ate part of it, re-requests with the measured border
    /// delta. A final mismatch fails loudly — silent mis-sizing never
    /// passes.
    pub async fn set_window_rect(&self, width: u32, height: u32) -> Result<()> {
        self.request_window_bounds(width, height).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let observed = self.inner_size().await?;
        if observed == (width, height) {
            return Ok(());
        }

        let (outer_w, outer_h) = compensated_outer((width, height), observed);
        tracing::debug!(
            "window chrome delta {}x{}, re-requesting {outer_w}x{outer_h}",
            width - observed.0.min(width),
            height - observed.1.min(height),
        );
        self.request_window_bounds(outer_w, outer_h).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let actual = self.inner_size().await?;
        if actual == (width, height) {
            Ok(())
        } else {
            Err(Error::WindowSize {
                width,
                height,
                actual_width: actual.0,
                actual_height: actual.1,
            })
        }
    }

    async fn request_window_bounds(&self, width: u32, height: u32) -> Result<()> {
        let window = self
            .page
            .execute(GetWindowForTargetParams::default())
            .await?;
        let bounds = Bounds::builder()
            .width(width as i64)
            .height(height as i64)
            .build();
        self.page
            .execute(SetWindowBoundsParams::new(window.window_id.clone(), bounds))
            .await?;
        Ok(())
    }

    async fn inner_size(&self) -> Result<(u32, u32)> {
        let size: InnerSize = eval(
            &self.page,
            "({ width: window.innerWidth, height: window.innerHeight })",
        )
        .await?;
        Ok((size.width, size.height))
    }

    /// Close the page. Safe even when setup partially failed; a failing
    /// close is logged, not surfaced.
    pub async fn dispose(self) {
        if let Err(e) = self.page.close().await {
            tracing::warn!("page close failed: {e}");
        }
    }
}

/// Outer size to request so the content area reaches `requested`, given the
/// content size `observed` after requesting `requested` as outer size. The
/// difference is the window chrome (borders, title bar) the first request
/// lost.
pub(crate) fn compensated_outer(requested: (u32, u32), observed: (u32, u32)) -> (u32, u32) {
    (
        requested.0 + requested.0.saturating_sub(observed.0),
        requested.1 + requested.1.saturating_sub(observed.1),
    )
}

fn key_to_code(key: &str) -> (String, u32) {
    match key {
        "Enter" => ("Enter".into(), 13),
        "Tab" => ("Tab".into(), 9),
        "Escape" => ("Escape".into(), 27),
        "Backspace" => ("Backspace".into(), 8),
        "Delete" => ("Delete".into(), 46),
        "ArrowUp" => ("ArrowUp".into(), 38),
        "ArrowDown" => ("ArrowDown".into(), 40),
        "ArrowLeft" => ("ArrowLeft".into(), 37),
        "ArrowRight" => ("ArrowRight".into(), 39),
        "Home" => ("Home".into(), 36),
        "End" => ("End".into(), 35),
        "PageUp" => ("PageUp".into(), 33),
        "PageDown" => ("PageDown".into(), 34),
        "Space" | " " => ("Space".into(), 32),
        _ => (
            format!("Key{}", key.to_uppercase()),
            key.chars().next().map(|c| c as u32).unwrap_or(0),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_compensation_enlarges_by_the_chrome_delta() {
        // Requested 800x600, chrome left us 780x580: ask for 820x620.
        assert_eq!(compensated_outer((800, 600), (780, 580)), (820, 620));
    }

    #[test]
    fn border_compensation_is_identity_when_exact() {
        assert_eq!(compensated_outer((800, 600), (800, 600)), (800, 600));
    }

    #[test]
    fn border_compensation_never_shrinks() {
        // An observed size larger than requested (over-tall content area)
        // must not underflow the adjustment.
        assert_eq!(compensated_outer((800, 600), (810, 650)), (800, 600));
    }

    #[test]
    fn known_keys_map_to_dom_codes() {
        assert_eq!(key_to_code("Enter"), ("Enter".to_string(), 13));
        assert_eq!(key_to_code(" "), ("Space".to_string(), 32));
        assert_eq!(key_to_code("v"), ("KeyV".to_string(), 118));
    }
}
