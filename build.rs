use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// One source-hygiene rule: a line regex plus what to tell the author.
struct Rule {
    name: &'static str,
    pattern: &'static str,
    comments_only: bool,
    advice: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        name: "change-log words in comments",
        pattern: r"(//|/\*).*\b(?:CRITICAL|FIXED|FIXES|FIX|CORRECTED|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFY|UPDATED|UPDATES|UPDATE)\b",
        comments_only: true,
        advice: "Comments describe the code as it is, not how it got there.",
    },
    Rule {
        name: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        comments_only: false,
        advice: "Use the item or delete it.",
    },
    Rule {
        name: "#[ignore]d tests",
        pattern: r"#\s*\[\s*ignore\b",
        comments_only: false,
        advice: "Fix the test or delete it.",
    },
    Rule {
        name: "discarded results",
        pattern: r"\blet\s+_\s*=",
        comments_only: false,
        advice: "Handle the value, or log why it does not matter.",
    },
];

// Collects the matching lines of one file for one rule.
struct RuleCollector<'a> {
    rule: &'a Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl<'a> RuleCollector<'a> {
    fn new(rule: &'a Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.name,
            self.file_path.display()
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice));
        Some(error_msg)
    }
}

fn is_comment_line(line_text: &str) -> bool {
    let trimmed = line_text.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        // Trailing comments count too, but a string that merely contains "//" does not.
        if self.rule.comments_only && !is_comment_line(line_text) && line_text.contains('"') {
            return Ok(true);
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn rust_sources(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: &Rule, files: &[PathBuf]) -> Vec<String> {
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern) {
        Ok(matcher) => matcher,
        Err(e) => return vec![format!("Error creating regex for {}: {}", rule.name, e)],
    };
    let mut searcher = Searcher::new();
    let mut all_violations = Vec::new();
    for path in files {
        let mut collector = RuleCollector::new(rule, path);
        if searcher.search_path(&matcher, path, &mut collector).is_err() {
            continue;
        }
        if let Some(error_message) = collector.check_and_get_error_message() {
            all_violations.push(error_message);
        }
    }
    all_violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-env-changed=QN_BFGS_SKIP_LINT_CHECKS");

    if std::env::var("QN_BFGS_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let files = rust_sources(Path::new("src"));
    for path in &files {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    let all_violations: Vec<String> = RULES.iter().flat_map(|rule| scan(rule, &files)).collect();
    if !all_violations.is_empty() {
        for violation in &all_violations {
            eprintln!("{violation}");
        }
        panic!(
            "source hygiene scan failed with {} violation group(s); set QN_BFGS_SKIP_LINT_CHECKS to bypass",
            all_violations.len()
        );
    }
}
