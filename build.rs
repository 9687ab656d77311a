use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Source trees owned by this crate. Anything else under the manifest directory
// (target/, vendored data, scratch files) is not linted.
const SOURCE_DIRS: [&str; 4] = ["score", "cli", "tests", "benches"];

/// Which policy a collector enforces; decides how matches are filtered and
/// how the failure is explained.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenCommentWord,
    StarsInComment,
    ShoutingComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> &'static str {
        match self {
            Self::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b",
            Self::ForbiddenCommentWord => {
                r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)"
            }
            Self::StarsInComment => r"(//|/\*).*\*\*",
            Self::ShoutingComment => r"(//|/\*).*",
            Self::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Self::UnderscorePrefix => "underscore-prefixed variables",
            Self::ForbiddenCommentWord => "comments narrating edits (FIX, NEW, UPDATE, ...)",
            Self::StarsInComment => "'**' emphasis in non-doc comments",
            Self::ShoutingComment => "comments written entirely in capitals",
            Self::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Self::UnderscorePrefix => {
                "Either use the variable (removing the underscore) or remove it completely."
            }
            Self::ForbiddenCommentWord => {
                "Describe what the code does, not how it changed. History belongs in git."
            }
            Self::StarsInComment | Self::ShoutingComment => "Write comments in plain prose.",
            Self::AllowDeadCode => "Either use the code (removing the attribute) or remove it.",
        }
    }

    // Returns true when a matched line really violates the rule.
    fn applies_to(self, line_text: &str) -> bool {
        let trimmed = line_text.trim_start();
        match self {
            Self::UnderscorePrefix => {
                let is_pure_comment = trimmed.starts_with("//");
                // A match between quotes belongs to a string literal.
                let is_in_string = line_text
                    .split('"')
                    .enumerate()
                    .any(|(i, part)| i % 2 == 1 && part.contains('_'));
                !is_pure_comment && !is_in_string
            }
            Self::StarsInComment => !trimmed.starts_with("///") && !trimmed.starts_with("//!"),
            Self::ShoutingComment => {
                let Some(start) = line_text.find("//") else {
                    return false;
                };
                let comment = line_text[start..].trim_start_matches(['/', '!']);
                let letters: Vec<char> = comment.chars().filter(|c| c.is_alphabetic()).collect();
                // Single tokens such as `// NaN` or `// CRH` are labels, not shouting.
                letters.len() > 4 && letters.iter().all(|c| c.is_uppercase())
            }
            Self::ForbiddenCommentWord | Self::AllowDeadCode => true,
        }
    }
}

// Collects every violating line of one file so the error lists them all.
struct ViolationCollector {
    rule: Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.headline(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!(
            "\n⚠️ These are not allowed in this project.\n   {}\n",
            self.rule.advice()
        ));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.applies_to(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(rule: Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
    let mut searcher = Searcher::new();

    for path in rust_sources() {
        let mut collector = ViolationCollector::new(rule, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let rules = [
        Rule::UnderscorePrefix,
        Rule::ForbiddenCommentWord,
        Rule::StarsInComment,
        Rule::ShoutingComment,
        Rule::AllowDeadCode,
    ];
    for rule in rules {
        if let Err(e) = scan(rule) {
            // Printed to stderr so cargo shows it with the failed build.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
