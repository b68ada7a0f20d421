//! Detection rule table and allow-list.
//!
//! Rules are data, not code: the deny patterns, allow-listed script domains
//! and allow-listed inline signatures all come from
//! [`GuardConfig`](crate::config::GuardConfig) and are compiled once at
//! startup. A [`RuleSet`] is immutable afterwards and holds no interior
//! state, so every detector can share it.
//!
//! # Evaluation order
//!
//! 1. Allow-list: if any inline signature matches, the text is accepted.
//! 2. Deny rules in table order; the first match wins.
//!
//! Matching is a heuristic over raw strings, not a parser.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::config::GuardConfig;
use crate::error::GuardError;

/// What a deny rule is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    /// Dynamic code evaluation (`eval(`, `new Function(`).
    ScriptExecution,
    /// Inline event-binding assignments (`onerror=`).
    EventHandler,
    /// Script-executable URI schemes (`javascript:`).
    ExecutableUri,
    /// Raw markup writes (`innerHTML =`, `document.write(`).
    MarkupInjection,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleCategory::ScriptExecution => "script-execution",
            RuleCategory::EventHandler => "event-handler",
            RuleCategory::ExecutableUri => "executable-uri",
            RuleCategory::MarkupInjection => "markup-injection",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A compiled deny rule.
#[derive(Debug, Clone)]
pub struct SecurityRule {
    pub id: String,
    pub pattern: Regex,
    pub category: RuleCategory,
    pub severity: Severity,
}

impl SecurityRule {
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// An exemption from the deny rules.
#[derive(Debug, Clone)]
pub enum AllowListEntry {
    /// External scripts served from this host or any subdomain of it.
    Domain(String),
    /// Inline content containing this signature.
    Signature(Regex),
}

/// Something the allow-list can exempt.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// Fully resolved `src` of an external script.
    ScriptSource(&'a Url),
    /// Inline script text or a submitted field value.
    Inline(&'a str),
}

impl AllowListEntry {
    pub fn matches(&self, candidate: Candidate<'_>) -> bool {
        match (self, candidate) {
            (AllowListEntry::Domain(domain), Candidate::ScriptSource(url)) => {
                url.host_str().is_some_and(|host| {
                    let host = host.to_ascii_lowercase();
                    host == *domain || host.ends_with(&format!(".{}", domain))
                })
            }
            (AllowListEntry::Signature(sig), Candidate::Inline(text)) => sig.is_match(text),
            _ => false,
        }
    }
}

/// Outcome of [`RuleSet::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct Evaluation<'a> {
    pub matched: bool,
    pub rule: Option<&'a SecurityRule>,
}

impl Evaluation<'_> {
    fn clean() -> Self {
        Self {
            matched: false,
            rule: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<SecurityRule>,
    allow_list: Vec<AllowListEntry>,
    blocked_schemes: Vec<String>,
    event_prefix: String,
}

impl RuleSet {
    /// Compile the rule table from configuration.
    pub fn from_config(config: &GuardConfig) -> Result<Self, GuardError> {
        let mut rules = Vec::with_capacity(config.dangerous_patterns.len());
        for spec in &config.dangerous_patterns {
            rules.push(SecurityRule {
                id: spec.id.clone(),
                pattern: compile(&spec.id, &spec.pattern)?,
                category: spec.category,
                severity: spec.severity,
            });
        }

        let mut allow_list: Vec<AllowListEntry> = config
            .allowed_script_domains
            .iter()
            .map(|d| AllowListEntry::Domain(normalize_domain(d)))
            .filter(|entry| !matches!(entry, AllowListEntry::Domain(d) if d.is_empty()))
            .collect();
        for (i, pattern) in config.allowed_inline_patterns.iter().enumerate() {
            let id = format!("allow-{}", i);
            allow_list.push(AllowListEntry::Signature(compile(&id, pattern)?));
        }

        let event_prefix = config.event_attribute_prefix.trim().to_ascii_lowercase();
        if event_prefix.is_empty() {
            return Err(GuardError::InvalidConfig(
                "event_attribute_prefix must not be empty".to_string(),
            ));
        }

        Ok(Self {
            rules,
            allow_list,
            blocked_schemes: config
                .blocked_link_schemes
                .iter()
                .map(|s| normalize_uri(s))
                .filter(|s| !s.is_empty())
                .collect(),
            event_prefix,
        })
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    pub fn allow_list(&self) -> &[AllowListEntry] {
        &self.allow_list
    }

    /// Screen text against the deny rules, honoring inline signatures first.
    pub fn evaluate(&self, text: &str) -> Evaluation<'_> {
        if self.is_allowed(Candidate::Inline(text)) {
            return Evaluation::clean();
        }
        match self.rules.iter().find(|rule| rule.is_match(text)) {
            Some(rule) => Evaluation {
                matched: true,
                rule: Some(rule),
            },
            None => Evaluation::clean(),
        }
    }

    pub fn is_allowed(&self, candidate: Candidate<'_>) -> bool {
        self.allow_list.iter().any(|entry| entry.matches(candidate))
    }

    /// Whether a link target would run script when followed.
    ///
    /// Whitespace and control characters are dropped before comparing, since
    /// browsers ignore them inside a scheme (`java\tscript:`).
    pub fn is_executable_uri(&self, value: &str) -> bool {
        let normalized = normalize_uri(value);
        self.blocked_schemes
            .iter()
            .any(|scheme| normalized.starts_with(scheme.as_str()))
    }

    /// Whether an attribute name is an inline event binding (`onclick`, ...).
    pub fn is_event_attribute(&self, name: &str) -> bool {
        name.len() > self.event_prefix.len()
            && name.to_ascii_lowercase().starts_with(&self.event_prefix)
    }
}

fn compile(id: &str, pattern: &str) -> Result<Regex, GuardError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| GuardError::InvalidPattern {
            id: id.to_string(),
            source,
        })
}

fn normalize_uri(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Reduce `https://cdn.example.com/` or `CDN.example.com` to `cdn.example.com`.
fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('.')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuardConfig, PatternRule};

    fn default_rules() -> RuleSet {
        RuleSet::from_config(&GuardConfig::default()).unwrap()
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = default_rules();
        let eval = rules.evaluate("x = 1; eval('2'); document.write('3')");
        assert!(eval.matched);
        assert_eq!(eval.rule.unwrap().id, "eval-call");
        assert_eq!(eval.rule.unwrap().category, RuleCategory::ScriptExecution);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rules = default_rules();
        assert!(rules.evaluate("JavaScript:alert(1)").matched);
        assert!(rules.evaluate("el.INNERHTML = x").matched);
        assert!(!rules.evaluate("plain marketing copy").matched);
    }

    #[test]
    fn inline_signature_overrides_deny_rule() {
        let rules = default_rules();
        // Would match `eval-call`, but the analytics signature exempts it.
        let text = "window.dataLayer = []; eval('x')";
        let eval = rules.evaluate(text);
        assert!(!eval.matched);
        assert!(eval.rule.is_none());
    }

    #[test]
    fn domain_allow_list_matches_host_and_subdomains() {
        let rules = default_rules();
        let exact = Url::parse("https://fonts.googleapis.com/css").unwrap();
        let sub = Url::parse("https://eu.fonts.gstatic.com/x.woff").unwrap();
        let lookalike = Url::parse("https://fonts.googleapis.com.evil.io/x.js").unwrap();
        let suffix_trick = Url::parse("https://evilfonts.gstatic.com.io/").unwrap();

        assert!(rules.is_allowed(Candidate::ScriptSource(&exact)));
        assert!(rules.is_allowed(Candidate::ScriptSource(&sub)));
        assert!(!rules.is_allowed(Candidate::ScriptSource(&lookalike)));
        assert!(!rules.is_allowed(Candidate::ScriptSource(&suffix_trick)));
    }

    #[test]
    fn domain_entries_do_not_exempt_inline_text() {
        let rules = default_rules();
        assert!(!rules.is_allowed(Candidate::Inline("fonts.googleapis.com")));
    }

    #[test]
    fn executable_uri_ignores_whitespace_and_case() {
        let rules = default_rules();
        assert!(rules.is_executable_uri("javascript:alert(1)"));
        assert!(rules.is_executable_uri("  JaVa\tScRiPt:void(0)"));
        assert!(rules.is_executable_uri("vbscript:msgbox"));
        assert!(rules.is_executable_uri("data: text/html;base64,AAAA"));
        assert!(!rules.is_executable_uri("https://example.com/javascript:"));
        assert!(!rules.is_executable_uri("data:image/png;base64,AAAA"));
        assert!(!rules.is_executable_uri("/about"));
    }

    #[test]
    fn event_attribute_prefix() {
        let rules = default_rules();
        assert!(rules.is_event_attribute("onclick"));
        assert!(rules.is_event_attribute("ONMOUSEOVER"));
        assert!(!rules.is_event_attribute("on"));
        assert!(!rules.is_event_attribute("href"));
        assert!(!rules.is_event_attribute("data-onclick"));
    }

    #[test]
    fn invalid_pattern_reports_rule_id() {
        let mut config = GuardConfig::default();
        config.dangerous_patterns = vec![PatternRule {
            id: "broken".to_string(),
            pattern: "eval(".to_string(),
            category: RuleCategory::ScriptExecution,
            severity: Severity::High,
        }];

        let err = RuleSet::from_config(&config).unwrap_err();
        match err {
            GuardError::InvalidPattern { id, .. } => assert_eq!(id, "broken"),
            other => panic!("Expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn configured_domains_are_normalized() {
        let mut config = GuardConfig::default();
        config.allowed_script_domains = vec!["https://CDN.Example.com/lib/".to_string()];
        let rules = RuleSet::from_config(&config).unwrap();

        let url = Url::parse("https://cdn.example.com/app.js").unwrap();
        assert!(rules.is_allowed(Candidate::ScriptSource(&url)));
    }
}
