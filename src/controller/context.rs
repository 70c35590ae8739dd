use super::handle::ElementHandle;

/// The addressing context element lookups are scoped to.
///
/// An explicit state machine rather than nullable fields: the current root
/// is always one of these three states, transitions are named operations on
/// the controller, and tests can assert the state directly.
///
/// Shadow roots are never held as remote references — the root expression
/// re-derives them from the host element's live `shadowRoot` property on
/// every evaluation, so the context stays valid across DOM churn for as
/// long as the host itself resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LookupContext {
    /// The top document.
    #[default]
    Document,
    /// An iframe's content document, addressed through the frame element.
    Frame(ElementHandle),
    /// A shadow tree, addressed through its host element.
    ShadowRoot(ElementHandle),
}

impl LookupContext {
    /// The JS expression for the current lookup root.
    pub fn root_js(&self) -> String {
        match self {
            LookupContext::Document => "document".to_string(),
            LookupContext::Frame(frame) => format!("({}).contentDocument", frame.locate_js()),
            LookupContext::ShadowRoot(host) => format!("({}).shadowRoot", host.locate_js()),
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            LookupContext::Document => "document",
            LookupContext::Frame(_) => "frame",
            LookupContext::ShadowRoot(_) => "shadow root",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(js: &str) -> ElementHandle {
        ElementHandle::new(js.to_string(), "test element".to_string())
    }

    #[test]
    fn document_is_the_default_root() {
        assert_eq!(LookupContext::default(), LookupContext::Document);
        assert_eq!(LookupContext::Document.root_js(), "document");
    }

    #[test]
    fn frame_root_addresses_the_content_document() {
        let ctx = LookupContext::Frame(handle("document.querySelector(\"iframe\")"));
        assert_eq!(
            ctx.root_js(),
            "(document.querySelector(\"iframe\")).contentDocument"
        );
        assert_eq!(ctx.name(), "frame");
    }

    #[test]
    fn shadow_root_is_rederived_from_the_host() {
        let ctx = LookupContext::ShadowRoot(handle("document.querySelector(\"x-app\")"));
        assert_eq!(
            ctx.root_js(),
            "(document.querySelector(\"x-app\")).shadowRoot"
        );
        assert_eq!(ctx.name(), "shadow root");
    }
}
