use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Paths;
use crate::security::{RuleCategory, RuleSet, Severity};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub page: PageConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Hosts allowed to serve external scripts (subdomains included)
    #[serde(default = "default_allowed_script_domains")]
    pub allowed_script_domains: Vec<String>,

    /// Deny rules, tested in order; the first match wins
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<PatternRule>,

    /// Inline signatures that exempt content from the deny rules
    #[serde(default = "default_allowed_inline_patterns")]
    pub allowed_inline_patterns: Vec<String>,

    /// Lockdown triggers once the incident count exceeds this value
    #[serde(default = "default_max_violations")]
    pub max_violations: u64,

    /// Health check period in milliseconds
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Link schemes that execute script when followed
    #[serde(default = "default_blocked_link_schemes")]
    pub blocked_link_schemes: Vec<String>,

    /// Attribute name prefix marking inline event bindings
    #[serde(default = "default_event_attribute_prefix")]
    pub event_attribute_prefix: String,

    /// Global identifiers that page elements must not shadow
    #[serde(default = "default_reserved_identifiers")]
    pub reserved_identifiers: Vec<String>,

    /// Runtime primitives expected to report as native
    #[serde(default = "default_monitored_primitives")]
    pub monitored_primitives: Vec<String>,

    /// Shown in place of the page content on lockdown
    #[serde(default = "default_lockdown_notice")]
    pub lockdown_notice: String,

    /// Shown when a form submission is blocked
    #[serde(default = "default_form_block_notice")]
    pub form_block_notice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub pattern: String,
    pub category: RuleCategory,
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// URL of the monitored page; defines the same-origin boundary
    #[serde(default = "default_page_url")]
    pub url: String,

    /// Agent fingerprint stamped on incidents
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Incident details are truncated to this many characters
    #[serde(default = "default_details_max_chars")]
    pub details_max_chars: usize,

    /// Optional JSONL export of the session ledger.
    /// `{session}` is replaced with the session id.
    #[serde(default)]
    pub export_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_allowed_script_domains() -> Vec<String> {
    vec![
        "img1.wsimg.com".to_string(),
        "fonts.googleapis.com".to_string(),
        "fonts.gstatic.com".to_string(),
    ]
}
fn rule(id: &str, pattern: &str, category: RuleCategory, severity: Severity) -> PatternRule {
    PatternRule {
        id: id.to_string(),
        pattern: pattern.to_string(),
        category,
        severity,
    }
}
fn default_dangerous_patterns() -> Vec<PatternRule> {
    use RuleCategory::*;
    use Severity::*;
    vec![
        rule("eval-call", r"eval\s*\(", ScriptExecution, Critical),
        rule("function-constructor", r"new\s+Function\s*\(", ScriptExecution, Critical),
        rule("onerror-assignment", r"onerror\s*=", EventHandler, High),
        rule("onload-assignment", r"onload\s*=", EventHandler, High),
        rule("onclick-assignment", r"onclick\s*=", EventHandler, High),
        rule("onmouseover-assignment", r"onmouseover\s*=", EventHandler, High),
        rule("javascript-uri", r"javascript\s*:", ExecutableUri, Critical),
        rule("vbscript-uri", r"vbscript\s*:", ExecutableUri, Critical),
        rule("data-html-uri", r"data\s*:\s*text/html", ExecutableUri, High),
        rule(
            "data-script-src",
            r#"<script[^>]*src\s*=\s*["']?data:"#,
            ExecutableUri,
            Critical,
        ),
        rule("document-write", r"document\.write\s*\(", MarkupInjection, Medium),
        rule("inner-html-assignment", r"innerHTML\s*=", MarkupInjection, Medium),
        rule("outer-html-assignment", r"outerHTML\s*=", MarkupInjection, Medium),
    ]
}
fn default_allowed_inline_patterns() -> Vec<String> {
    vec![r"gtag\(".to_string(), "dataLayer".to_string()]
}
fn default_max_violations() -> u64 {
    10
}
fn default_health_check_interval_ms() -> u64 {
    30000 // 30 seconds
}
fn default_blocked_link_schemes() -> Vec<String> {
    vec![
        "javascript:".to_string(),
        "vbscript:".to_string(),
        "data:text/html".to_string(),
    ]
}
fn default_event_attribute_prefix() -> String {
    "on".to_string()
}
fn default_reserved_identifiers() -> Vec<String> {
    vec![
        "document".to_string(),
        "window".to_string(),
        "location".to_string(),
    ]
}
fn default_monitored_primitives() -> Vec<String> {
    vec![
        "eval".to_string(),
        "Function".to_string(),
        "setTimeout".to_string(),
        "setInterval".to_string(),
    ]
}
fn default_lockdown_notice() -> String {
    "Security lockdown activated. Please refresh the page.".to_string()
}
fn default_form_block_notice() -> String {
    "Form submission blocked for security reasons. Please contact support if this is an error."
        .to_string()
}
fn default_severity() -> Severity {
    Severity::High
}
fn default_page_url() -> String {
    "http://localhost/".to_string()
}
fn default_user_agent() -> String {
    format!("pageguard/{}", env!("CARGO_PKG_VERSION"))
}
fn default_details_max_chars() -> usize {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            allowed_script_domains: default_allowed_script_domains(),
            dangerous_patterns: default_dangerous_patterns(),
            allowed_inline_patterns: default_allowed_inline_patterns(),
            max_violations: default_max_violations(),
            health_check_interval_ms: default_health_check_interval_ms(),
            blocked_link_schemes: default_blocked_link_schemes(),
            event_attribute_prefix: default_event_attribute_prefix(),
            reserved_identifiers: default_reserved_identifiers(),
            monitored_primitives: default_monitored_primitives(),
            lockdown_notice: default_lockdown_notice(),
            form_block_notice: default_form_block_notice(),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: default_page_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            details_max_chars: default_details_max_chars(),
            export_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location, creating it from the template on
    /// first run.
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        let path = paths.config_file();

        if !path.exists() {
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let mut config = Self::load_from(&path)?;
        config.paths = paths;
        Ok(config)
    }

    /// Load and validate a config file at an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the rule table compiles and the page URL parses.
    pub fn validate(&self) -> Result<()> {
        RuleSet::from_config(&self.guard)?;
        url::Url::parse(&self.page.url)
            .with_context(|| format!("Invalid page.url `{}`", self.page.url))?;
        if self.guard.health_check_interval_ms == 0 {
            anyhow::bail!("guard.health_check_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    /// Resolve the ledger export path for a session, if one is configured.
    pub fn ledger_export_path(&self, session_id: &str) -> Option<PathBuf> {
        self.ledger.export_path.as_ref().map(|raw| {
            let expanded = shellexpand::tilde(raw).replace("{session}", session_id);
            PathBuf::from(expanded)
        })
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["guard", "max_violations"] => Ok(self.guard.max_violations.to_string()),
            ["guard", "health_check_interval_ms"] => {
                Ok(self.guard.health_check_interval_ms.to_string())
            }
            ["guard", "event_attribute_prefix"] => Ok(self.guard.event_attribute_prefix.clone()),
            ["guard", "allowed_script_domains"] => Ok(self.guard.allowed_script_domains.join(",")),
            ["page", "url"] => Ok(self.page.url.clone()),
            ["page", "user_agent"] => Ok(self.page.user_agent.clone()),
            ["ledger", "details_max_chars"] => Ok(self.ledger.details_max_chars.to_string()),
            ["ledger", "export_path"] => Ok(self.ledger.export_path.clone().unwrap_or_default()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["guard", "max_violations"] => self.guard.max_violations = value.parse()?,
            ["guard", "health_check_interval_ms"] => {
                self.guard.health_check_interval_ms = value.parse()?
            }
            ["guard", "event_attribute_prefix"] => {
                self.guard.event_attribute_prefix = value.to_string()
            }
            ["guard", "allowed_script_domains"] => {
                self.guard.allowed_script_domains = value
                    .split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect()
            }
            ["page", "url"] => self.page.url = value.to_string(),
            ["page", "user_agent"] => self.page.user_agent = value.to_string(),
            ["ledger", "details_max_chars"] => self.ledger.details_max_chars = value.parse()?,
            ["ledger", "export_path"] => {
                self.ledger.export_path = (!value.is_empty()).then(|| value.to_string())
            }
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        self.validate()
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# PageGuard Configuration
# Auto-created on first run. Edit as needed.

[guard]
# Hosts allowed to serve external scripts (subdomains included)
allowed_script_domains = ["img1.wsimg.com", "fonts.googleapis.com", "fonts.gstatic.com"]

# Inline content matching any of these is exempt from the deny rules
allowed_inline_patterns = ['gtag\(', "dataLayer"]

# Lockdown once more than this many incidents are recorded
max_violations = 10

# Runtime primitive / clobbering check period
health_check_interval_ms = 30000

# Deny rules are tested in order; omit to use the built-in table.
# [[guard.dangerous_patterns]]
# id = "eval-call"
# pattern = 'eval\s*\('
# category = "script-execution"   # script-execution | event-handler | executable-uri | markup-injection
# severity = "critical"           # low | medium | high | critical

[page]
url = "http://localhost/"

[ledger]
details_max_chars = 100
# export_path = "~/.local/state/pageguard/ledgers/{session}.jsonl"

[logging]
level = "info"
"#;
