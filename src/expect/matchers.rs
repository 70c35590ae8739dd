//! The fixed matcher table.
//!
//! Instead of patching an assertion library's internals per matcher, the
//! adapter surface is enumerated here: every matcher name the fluent API
//! understands, what kind of word it is, and whether it can run as a poll
//! predicate against a retryable subject. [`Expectation`] methods consult
//! this table; the table itself is testable in isolation.
//!
//! [`Expectation`]: super::Expectation

/// How a matcher word participates in an assertion chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// Performs a check when invoked with operands.
    Terminal,
    /// Performs a check by mere access, no operands.
    Property,
    /// Language glue (`to`, `be`, `not`...). Never triggers evaluation.
    Chainable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherSpec {
    pub name: &'static str,
    pub kind: MatcherKind,
    /// Whether the check can be re-evaluated against freshly polled values.
    /// Matchers needing pre/post mutation state cannot.
    pub retryable: bool,
}

const fn terminal(name: &'static str) -> MatcherSpec {
    MatcherSpec {
        name,
        kind: MatcherKind::Terminal,
        retryable: true,
    }
}

const fn property(name: &'static str) -> MatcherSpec {
    MatcherSpec {
        name,
        kind: MatcherKind::Property,
        retryable: true,
    }
}

const fn chainable(name: &'static str) -> MatcherSpec {
    MatcherSpec {
        name,
        kind: MatcherKind::Chainable,
        retryable: true,
    }
}

const fn unsupported(name: &'static str) -> MatcherSpec {
    MatcherSpec {
        name,
        kind: MatcherKind::Terminal,
        retryable: false,
    }
}

/// Every matcher word the expectation API understands.
pub const MATCHERS: &[MatcherSpec] = &[
    // language chains — no evaluation on their own
    chainable("to"),
    chainable("be"),
    chainable("been"),
    chainable("is"),
    chainable("that"),
    chainable("which"),
    chainable("and"),
    chainable("has"),
    chainable("have"),
    chainable("with"),
    chainable("at"),
    chainable("of"),
    chainable("same"),
    chainable("not"),
    // equality / ordering
    terminal("equal"),
    terminal("eql"),
    terminal("above"),
    terminal("least"),
    terminal("below"),
    terminal("most"),
    terminal("within"),
    terminal("closeTo"),
    // containment / membership
    terminal("contain"),
    terminal("include"),
    terminal("members"),
    terminal("oneOf"),
    terminal("string"),
    terminal("match"),
    // shape
    terminal("lengthOf"),
    terminal("property"),
    terminal("ownProperty"),
    terminal("keys"),
    terminal("instanceof"),
    terminal("satisfy"),
    // state properties
    property("ok"),
    property("true"),
    property("false"),
    property("null"),
    property("undefined"),
    property("exist"),
    property("empty"),
    property("nan"),
    property("finite"),
    // need pre/post mutation state — cannot be polled
    unsupported("throw"),
    unsupported("respondTo"),
    unsupported("change"),
    unsupported("increase"),
    unsupported("decrease"),
    unsupported("by"),
];

/// Look up a matcher word.
pub fn lookup(name: &str) -> Option<&'static MatcherSpec> {
    MATCHERS.iter().find(|m| m.name == name)
}

/// Whether this matcher may run against a retryable subject.
pub fn is_retry_supported(name: &str) -> bool {
    lookup(name).is_some_and(|m| m.retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_the_full_surface() {
        assert_eq!(MATCHERS.len(), 49);
        let chain = MATCHERS
            .iter()
            .filter(|m| m.kind == MatcherKind::Chainable)
            .count();
        assert_eq!(chain, 14);
    }

    #[test]
    fn no_duplicate_names() {
        for (i, m) in MATCHERS.iter().enumerate() {
            assert!(
                !MATCHERS[i + 1..].iter().any(|o| o.name == m.name),
                "duplicate matcher {:?}",
                m.name
            );
        }
    }

    #[test]
    fn exactly_the_mutation_matchers_are_unsupported() {
        let unsupported: Vec<&str> = MATCHERS
            .iter()
            .filter(|m| !m.retryable)
            .map(|m| m.name)
            .collect();
        assert_eq!(
            unsupported,
            ["throw", "respondTo", "change", "increase", "decrease", "by"]
        );
    }

    #[test]
    fn chain_words_never_evaluate() {
        for name in ["not", "to", "be", "have"] {
            let spec = lookup(name).unwrap();
            assert_eq!(spec.kind, MatcherKind::Chainable);
            assert!(spec.retryable);
        }
    }

    #[test]
    fn lookup_misses_cleanly() {
        assert!(lookup("frobnicate").is_none());
        assert!(!is_retry_supported("frobnicate"));
        assert!(is_retry_supported("equal"));
        assert!(!is_retry_supported("throw"));
    }
}
