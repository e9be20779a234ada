use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::targets::Target;

macro_rules! rule_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

rule_pattern!(RE_ARROW, r"=>");
rule_pattern!(RE_CLASS, r"\bclass\s+");
rule_pattern!(RE_NEW, r"\bnew\s+[A-Z_a-z]");
rule_pattern!(RE_ASYNC, r"\bPromise\b|\basync\b|\bawait\b");
rule_pattern!(RE_MODULE_IO, r"\bimport\s|\bexport\s");
rule_pattern!(RE_TEMPLATE, r"`");
rule_pattern!(
    RE_HIGHER_ORDER,
    r"\.\s*(map|forEach|filter|reduce|find|some|every)\s*\("
);
rule_pattern!(RE_NAMESPACE, r"\bnamespace\b|\bmodule\b");
rule_pattern!(RE_TYPES, r"\benum\b|\binterface\b|\btype\s+[A-Z_a-z]");
rule_pattern!(RE_GENERICS, r"<\s*[A-Z_a-z0-9_,\s]+>");
rule_pattern!(RE_TIMERS, r"setTimeout\s*\(|setInterval\s*\(");
rule_pattern!(RE_CONSOLE, r"console\.");
rule_pattern!(RE_LINE_COMMENT, r"(?m)^\s*//");
rule_pattern!(RE_BLOCK_COMMENT, r"(?s)/\*.*?\*/");
rule_pattern!(RE_ARCADE_API, r"(?i)sprites\.|controller\.|scene\.|game\.onUpdate");
rule_pattern!(RE_MICROBIT_API, r"(?i)led\.|radio\.");
rule_pattern!(RE_NON_ASCII, r"[^\x09\x0A\x0D\x20-\x7E]");

pub const ARCADE_LEAK: &str = "Arcade APIs in micro:bit/Maker";
pub const MICROBIT_LEAK: &str = "micro:bit APIs in Arcade";
pub const NON_ASCII: &str = "non-ASCII characters";

/// One forbidden construct. Rules run independently of each other.
pub struct ComplianceRule {
    pub name: &'static str,
    pub regex: &'static LazyLock<Option<Regex>>,
}

pub static SYNTAX_RULES: &[ComplianceRule] = &[
    ComplianceRule { name: "arrow functions", regex: &RE_ARROW },
    ComplianceRule { name: "classes", regex: &RE_CLASS },
    ComplianceRule { name: "new constructor", regex: &RE_NEW },
    ComplianceRule { name: "promises/async", regex: &RE_ASYNC },
    ComplianceRule { name: "import/export", regex: &RE_MODULE_IO },
    ComplianceRule { name: "template strings", regex: &RE_TEMPLATE },
    ComplianceRule { name: "higher-order array methods", regex: &RE_HIGHER_ORDER },
    ComplianceRule { name: "namespaces/modules", regex: &RE_NAMESPACE },
    ComplianceRule { name: "TS types/enums", regex: &RE_TYPES },
    ComplianceRule { name: "generics syntax", regex: &RE_GENERICS },
    ComplianceRule { name: "timers", regex: &RE_TIMERS },
    ComplianceRule { name: "console calls", regex: &RE_CONSOLE },
    ComplianceRule { name: "line comments", regex: &RE_LINE_COMMENT },
    ComplianceRule { name: "block comments", regex: &RE_BLOCK_COMMENT },
];

impl ComplianceRule {
    pub fn matches(&self, code: &str) -> bool {
        self.regex
            .as_ref()
            .map(|re| re.is_match(code))
            .unwrap_or(false)
    }
}

/// Every name `validate` can report, in detection order.
pub fn rule_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = SYNTAX_RULES.iter().map(|rule| rule.name).collect();
    names.extend([ARCADE_LEAK, MICROBIT_LEAK, NON_ASCII]);
    names
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    ok: bool,
    violations: Vec<String>,
}

impl ValidationResult {
    pub fn from_violations<I, S>(found: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut violations: Vec<String> = Vec::new();
        for name in found {
            let name = name.into();
            if !violations.contains(&name) {
                violations.push(name);
            }
        }
        Self {
            ok: violations.is_empty(),
            violations,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

/// Seam for swapping the pattern check for a real decompiler-backed one.
pub trait ComplianceCheck: Send + Sync {
    fn validate(&self, code: &str, target: Target) -> ValidationResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternValidator;

impl ComplianceCheck for PatternValidator {
    fn validate(&self, code: &str, target: Target) -> ValidationResult {
        validate(code, target)
    }
}

pub fn validate(code: &str, target: Target) -> ValidationResult {
    let mut found: Vec<&'static str> = SYNTAX_RULES
        .iter()
        .filter(|rule| rule.matches(code))
        .map(|rule| rule.name)
        .collect();

    match target {
        Target::Microbit | Target::Maker => {
            if pattern_hit(&RE_ARCADE_API, code) {
                found.push(ARCADE_LEAK);
            }
        }
        Target::Arcade => {
            if pattern_hit(&RE_MICROBIT_API, code) {
                found.push(MICROBIT_LEAK);
            }
        }
    }

    if pattern_hit(&RE_NON_ASCII, code) {
        found.push(NON_ASCII);
    }
    ValidationResult::from_violations(found)
}

fn pattern_hit(pattern: &LazyLock<Option<Regex>>, code: &str) -> bool {
    pattern
        .as_ref()
        .map(|re| re.is_match(code))
        .unwrap_or(false)
}
