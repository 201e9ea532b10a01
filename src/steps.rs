use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// -------------------------
// Step model
// -------------------------

/// One normalized, dialect-independent action in a replayable script.
/// Serialized with an `action` tag so a runtime node can replay it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Goto { url: String },
    WaitForSelector { selector: String },
    Click { selector: String },
    Fill { selector: String, value: String },
    EvaluateText { selector: String },
    Hover { selector: String },
    Press { selector: String, value: String },
    ByRoleClick { role: String, name: String },
    ByTextClick { text: String },
}

/// Source dialect of a recorded codegen script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Python,
    Javascript,
}

/// Per-line match accounting, so an operator can tell a script was only
/// partially converted. Blank lines are neither matched nor skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub total_lines: usize,
    pub matched_lines: usize,
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedScript {
    pub steps: Vec<Step>,
    pub report: ParseReport,
}

// -------------------------
// Line patterns
// -------------------------

// A quoted argument: the opening quote picks the alternative, so the closing
// quote must be the same character. Two capture groups per argument; exactly
// one of them participates in any match.
const QUOTED: &str = r#"(?:'([^']+)'|"([^"]+)")"#;

struct DialectPatterns {
    goto: Regex,
    wait_for_selector: Regex,
    click: Regex,
    fill: Regex,
    evaluate_text: Regex,
    hover: Regex,
    press: Regex,
    locator_click: Regex,
    by_role_click: Regex,
    by_text_click: Regex,
}

fn one_arg(method: &str) -> Regex {
    Regex::new(&format!(r"page\.{method}\({QUOTED}\)")).unwrap()
}

fn two_arg(method: &str) -> Regex {
    Regex::new(&format!(r"page\.{method}\({QUOTED}\s*,\s*{QUOTED}\)")).unwrap()
}

impl DialectPatterns {
    fn javascript() -> Self {
        Self {
            goto: one_arg("goto"),
            wait_for_selector: one_arg("waitForSelector"),
            click: one_arg("click"),
            fill: two_arg("fill"),
            evaluate_text: one_arg("textContent"),
            hover: one_arg("hover"),
            press: two_arg("press"),
            locator_click: Regex::new(&format!(r"page\.locator\({QUOTED}\)\.click\(\)")).unwrap(),
            by_role_click: Regex::new(&format!(
                r"page\.getByRole\({QUOTED}\s*,\s*\{{\s*name:\s*{QUOTED}[^}}]*\}}\)\.click\(\)"
            ))
            .unwrap(),
            by_text_click: Regex::new(&format!(r"page\.getByText\({QUOTED}\)\.click\(\)")).unwrap(),
        }
    }

    fn python() -> Self {
        Self {
            goto: one_arg("goto"),
            wait_for_selector: one_arg("wait_for_selector"),
            click: one_arg("click"),
            fill: two_arg("fill"),
            evaluate_text: one_arg("text_content"),
            hover: one_arg("hover"),
            press: two_arg("press"),
            locator_click: Regex::new(&format!(r"page\.locator\({QUOTED}\)\.click\(\)")).unwrap(),
            by_role_click: Regex::new(&format!(
                r"page\.get_by_role\({QUOTED}\s*,\s*name={QUOTED}[^)]*\)\.click\(\)"
            ))
            .unwrap(),
            by_text_click: Regex::new(&format!(r"page\.get_by_text\({QUOTED}\)\.click\(\)"))
                .unwrap(),
        }
    }
}

static JS_PATTERNS: LazyLock<DialectPatterns> = LazyLock::new(DialectPatterns::javascript);
static PY_PATTERNS: LazyLock<DialectPatterns> = LazyLock::new(DialectPatterns::python);

// First argument lives in groups 1/2, second in groups 3/4.
fn arg(caps: &Captures<'_>, group: usize) -> String {
    caps.get(group)
        .or_else(|| caps.get(group + 1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// -------------------------
// Converter
// -------------------------

/// Convert a recorded codegen script into an ordered step list.
///
/// Lines are tested independently against the dialect's patterns in a fixed
/// priority order; the first match wins and emits exactly one step (hover
/// emits an implicit wait first). Lines matching nothing are dropped and
/// tallied in the report. Never fails: malformed input just converts to
/// fewer steps.
pub fn parse_script(script: &str, dialect: Dialect) -> ConvertedScript {
    let patterns = match dialect {
        Dialect::Javascript => &*JS_PATTERNS,
        Dialect::Python => &*PY_PATTERNS,
    };

    let mut steps = Vec::new();
    let mut report = ParseReport::default();

    for line in script.lines() {
        report.total_lines += 1;

        if let Some(c) = patterns.goto.captures(line) {
            steps.push(Step::Goto { url: arg(&c, 1) });
        } else if let Some(c) = patterns.wait_for_selector.captures(line) {
            steps.push(Step::WaitForSelector { selector: arg(&c, 1) });
        } else if let Some(c) = patterns.click.captures(line) {
            steps.push(Step::Click { selector: arg(&c, 1) });
        } else if let Some(c) = patterns.fill.captures(line) {
            steps.push(Step::Fill { selector: arg(&c, 1), value: arg(&c, 3) });
        } else if let Some(c) = patterns.evaluate_text.captures(line) {
            steps.push(Step::EvaluateText { selector: arg(&c, 1) });
        } else if let Some(c) = patterns.hover.captures(line) {
            // Hovers are flaky without the element present; replay waits first.
            steps.push(Step::WaitForSelector { selector: arg(&c, 1) });
            steps.push(Step::Hover { selector: arg(&c, 1) });
        } else if let Some(c) = patterns.press.captures(line) {
            steps.push(Step::Press { selector: arg(&c, 1), value: arg(&c, 3) });
        } else if let Some(c) = patterns.locator_click.captures(line) {
            steps.push(Step::Click { selector: arg(&c, 1) });
        } else if let Some(c) = patterns.by_role_click.captures(line) {
            steps.push(Step::ByRoleClick { role: arg(&c, 1), name: arg(&c, 3) });
        } else if let Some(c) = patterns.by_text_click.captures(line) {
            steps.push(Step::ByTextClick { text: arg(&c, 1) });
        } else {
            if !line.trim().is_empty() {
                report.skipped_lines += 1;
            }
            continue;
        }

        report.matched_lines += 1;
    }

    ConvertedScript { steps, report }
}

// -------------------------
// Tests
// -------------------------
