//! JS locator expressions.
//!
//! Element lookups are expressed as JavaScript that re-resolves the node
//! inside the current addressing root on every evaluation — a fresh read
//! per poll attempt, and handles that survive DOM churn as long as the
//! selector still matches.

use crate::error::Result;

/// The type of selector used for element resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectorType {
    #[default]
    Css,
    Text,
    Xpath,
}

/// Name of the XPath evaluation helper installed into the page once per
/// controller lifetime.
pub const XPATH_HELPER: &str = "window.__stakeout_xpath";

/// Installer for the XPath helper. Evaluates XPath relative to an arbitrary
/// root node (document, frame document, or shadow root) and returns the
/// matches as an array.
pub const XPATH_HELPER_JS: &str = r#"(() => {
    if (window.__stakeout_xpath) return true;
    window.__stakeout_xpath = (expr, root) => {
        const doc = root.ownerDocument || root;
        const result = doc.evaluate(expr, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const nodes = [];
        for (let i = 0; i < result.snapshotLength; i++) {
            nodes.push(result.snapshotItem(i));
        }
        return nodes;
    };
    return true;
})()"#;

/// Expression resolving every match of `selector` under `root_js`, as an
/// array.
fn all_matches_js(selector: &str, selector_type: SelectorType, root_js: &str) -> Result<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(match selector_type {
        SelectorType::Css => {
            format!("Array.from(({root_js}).querySelectorAll({sel}))")
        }
        SelectorType::Text => format!(
            r#"(() => {{
                const root = {root_js};
                const scope = root.body || root;
                const doc = root.ownerDocument || root;
                const matches = [];
                const walker = doc.createTreeWalker(scope, NodeFilter.SHOW_TEXT, null);
                while (walker.nextNode()) {{
                    if (walker.currentNode.textContent.trim().includes({sel})) {{
                        matches.push(walker.currentNode.parentElement);
                    }}
                }}
                return matches;
            }})()"#
        ),
        SelectorType::Xpath => format!("{XPATH_HELPER}({sel}, {root_js})"),
    })
}

/// Expression resolving the first match of `selector` under `root_js`
/// (`null` when nothing matches).
pub fn locator_js(selector: &str, selector_type: SelectorType, root_js: &str) -> Result<String> {
    nth_locator_js(selector, selector_type, root_js, 0)
}

/// Expression resolving the `index`-th match (`null`/`undefined` when out of
/// range).
pub fn nth_locator_js(
    selector: &str,
    selector_type: SelectorType,
    root_js: &str,
    index: usize,
) -> Result<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(match selector_type {
        // querySelector avoids materializing the full match list for the
        // common first-match case.
        SelectorType::Css if index == 0 => format!("({root_js}).querySelector({sel})"),
        _ => format!(
            "({all})[{index}]",
            all = all_matches_js(selector, selector_type, root_js)?
        ),
    })
}

/// Expression counting matches of `selector` under `root_js`.
pub fn count_js(selector: &str, selector_type: SelectorType, root_js: &str) -> Result<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(match selector_type {
        SelectorType::Css => format!("({root_js}).querySelectorAll({sel}).length"),
        _ => format!(
            "({all}).length",
            all = all_matches_js(selector, selector_type, root_js)?
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_first_match_uses_query_selector() {
        let js = locator_js("#submit", SelectorType::Css, "document").unwrap();
        assert_eq!(js, r##"(document).querySelector("#submit")"##);
    }

    #[test]
    fn css_nth_match_indexes_the_full_list() {
        let js = nth_locator_js(".item", SelectorType::Css, "document", 2).unwrap();
        assert!(js.contains("querySelectorAll(\".item\")"));
        assert!(js.ends_with("[2]"));
    }

    #[test]
    fn selector_text_is_json_escaped() {
        let js = locator_js(r#"a[title="x"]"#, SelectorType::Css, "document").unwrap();
        assert!(js.contains(r#""a[title=\"x\"]""#));
    }

    #[test]
    fn xpath_goes_through_the_helper() {
        let js = locator_js("//button[@id='go']", SelectorType::Xpath, "document").unwrap();
        assert!(js.starts_with(&format!("({XPATH_HELPER}(")));
        assert!(js.ends_with("[0]"));
    }

    #[test]
    fn text_walker_scopes_to_the_root() {
        let root = "(host).shadowRoot";
        let js = count_js("Save", SelectorType::Text, root).unwrap();
        assert!(js.contains("createTreeWalker"));
        assert!(js.contains(root));
        assert!(js.ends_with(".length"));
    }

    #[test]
    fn count_css_is_a_length_read() {
        let js = count_js("p", SelectorType::Css, "document").unwrap();
        assert_eq!(js, r#"(document).querySelectorAll("p").length"#);
    }

    #[test]
    fn helper_installer_is_idempotent() {
        assert!(XPATH_HELPER_JS.contains("if (window.__stakeout_xpath) return true;"));
    }
}
