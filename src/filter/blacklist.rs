//! Domain blacklist with exact and wildcard rules.
//!
//! Rules come from the configuration document. A rule without `*` matches
//! one domain verbatim; a rule with `*` matches any span of characters in
//! that position, dots included. Comparison is case-sensitive raw-string in
//! both directions.

use regex::Regex;
use rustc_hash::FxHashSet;

/// Compiled blacklist rules for efficient lookup.
#[derive(Debug)]
pub struct Blacklist {
    /// Raw rules in document order, kept for diagnostics.
    rules: Vec<String>,
    /// Every rule verbatim, for the O(1) exact check.
    exact: FxHashSet<String>,
    /// Anchored matchers for rules containing `*`.
    wildcards: Vec<Regex>,
}

impl Blacklist {
    /// Compile a rule list. Never fails: every character special to the
    /// regex language is escaped before `*` is expanded, so each pattern is
    /// valid by construction.
    pub fn compile(rules: Vec<String>) -> Self {
        let exact = rules.iter().cloned().collect();
        let wildcards = rules
            .iter()
            .filter(|rule| rule.contains('*'))
            .map(|rule| {
                let escaped = regex::escape(rule).replace("\\*", ".*");
                Regex::new(&format!("^{escaped}$")).expect("escaped pattern is a valid regex")
            })
            .collect();

        Self {
            rules,
            exact,
            wildcards,
        }
    }

    /// Check whether a domain is blacklisted.
    ///
    /// True if the domain appears verbatim in the rule set or any wildcard
    /// rule matches it in full.
    pub fn is_blacklisted(&self, domain: &str) -> bool {
        if self.exact.contains(domain) {
            return true;
        }
        self.wildcards.iter().any(|pattern| pattern.is_match(domain))
    }

    /// Raw rules in document order.
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Number of rules in the blacklist.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(rules: &[&str]) -> Blacklist {
        Blacklist::compile(rules.iter().map(|r| r.to_string()).collect())
    }

    #[test]
    fn exact_match() {
        let blacklist = compile(&["example.com"]);

        assert!(blacklist.is_blacklisted("example.com"));
        assert!(!blacklist.is_blacklisted("notexample.com"));
        assert!(!blacklist.is_blacklisted("example.com.evil.net"));
    }

    #[test]
    fn leading_wildcard_matches_subdomains_only() {
        let blacklist = compile(&["*.badwebsite.org"]);

        assert!(!blacklist.is_blacklisted("badwebsite.org"));
        assert!(blacklist.is_blacklisted("sub.badwebsite.org"));
        assert!(blacklist.is_blacklisted("deep.sub.badwebsite.org"));
    }

    #[test]
    fn trailing_wildcard_matches_any_suffix() {
        let blacklist = compile(&["tracker.*"]);

        assert!(blacklist.is_blacklisted("tracker.com"));
        assert!(blacklist.is_blacklisted("tracker.org"));
        assert!(!blacklist.is_blacklisted("mytracker.com"));
    }

    #[test]
    fn inner_wildcards_match_label_boundary() {
        let blacklist = compile(&["*.test.*"]);

        assert!(blacklist.is_blacklisted("sub.test.com"));
        assert!(blacklist.is_blacklisted("my.test.org"));
        assert!(!blacklist.is_blacklisted("justtest.com"));
    }

    #[test]
    fn mixed_rule_set() {
        let blacklist = compile(&["example.com", "*.badwebsite.org", "tracker.*", "*.test.*"]);

        assert!(blacklist.is_blacklisted("example.com"));
        assert!(!blacklist.is_blacklisted("notexample.com"));
        assert!(!blacklist.is_blacklisted("badwebsite.org"));
        assert!(blacklist.is_blacklisted("sub.badwebsite.org"));
        assert!(blacklist.is_blacklisted("tracker.com"));
        assert!(!blacklist.is_blacklisted("mytracker.com"));
        assert!(blacklist.is_blacklisted("sub.test.com"));
        assert!(!blacklist.is_blacklisted("justtest.com"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let blacklist = compile(&["example.com", "*.badwebsite.org"]);

        assert!(!blacklist.is_blacklisted("Example.com"));
        assert!(!blacklist.is_blacklisted("sub.BADWEBSITE.org"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        // The dot in a rule must not act as a regex wildcard.
        let blacklist = compile(&["a.b"]);

        assert!(blacklist.is_blacklisted("a.b"));
        assert!(!blacklist.is_blacklisted("axb"));
    }

    #[test]
    fn compiles_any_rule_without_failing() {
        let blacklist = compile(&["(unbalanced", "[brackets", "a+b?", "**"]);

        assert!(blacklist.is_blacklisted("(unbalanced"));
        assert!(blacklist.is_blacklisted("a+b?"));
        // `**` collapses to match-anything.
        assert!(blacklist.is_blacklisted("anything.at.all"));
    }

    #[test]
    fn empty_blacklist_matches_nothing() {
        let blacklist = compile(&[]);

        assert!(blacklist.is_empty());
        assert!(!blacklist.is_blacklisted("example.com"));
        assert!(!blacklist.is_blacklisted(""));
    }
}
