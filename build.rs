use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories that are not part of this crate's sources.
const SKIPPED_DIRS: [&str; 2] = ["./target", "./examples"];

// A source rule: a line regex, an optional extra filter on the matched line,
// and the explanation printed when a file breaks it.
struct Rule {
    name: &'static str,
    pattern: &'static str,
    keep: fn(&str) -> bool,
    advice: &'static str,
}

// Collects the offending lines of one file for one rule.
struct Offenses {
    keep: fn(&str) -> bool,
    lines: Vec<String>,
}

impl Sink for Offenses {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.keep)(line_text) {
            self.lines.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

// Underscore-prefixed bindings hide unused values; they are only tolerated
// inside comments and string literals.
fn underscore_binding_in_code(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn any_line(_: &str) -> bool {
    true
}

fn comment_stars(line: &str) -> bool {
    is_comment(line) && !line.trim_start().starts_with("///")
}

fn shouting_comment(line: &str) -> bool {
    if !is_comment(line) {
        return false;
    }
    let text = line.trim_start().trim_start_matches('/');
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

const RULES: [Rule; 5] = [
    Rule {
        name: "underscore-prefixed variables",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        keep: underscore_binding_in_code,
        advice: "Either use the variable (removing the underscore) or remove it completely.",
    },
    Rule {
        name: "forbidden comment markers",
        pattern: r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        keep: any_line,
        advice: "Comments describing edits belong in version control, not in the source.",
    },
    Rule {
        name: "'**' in regular comments",
        pattern: r"(//|/\*).*\*\*",
        keep: comment_stars,
        advice: "Emphasis markup is only allowed in doc comments.",
    },
    Rule {
        name: "comments written entirely in capitals",
        pattern: r"//.*",
        keep: shouting_comment,
        advice: "Rewrite the comment in sentence case or delete it.",
    },
    Rule {
        name: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        keep: any_line,
        advice: "Either use the code or remove it completely.",
    },
];

fn rust_sources() -> Vec<PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_entry(|e| !SKIPPED_DIRS.iter().any(|dir| e.path().starts_with(dir)))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != "build.rs")
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check(rule: &Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut offenses = Offenses {
            keep: rule.keep,
            lines: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut offenses)?;
        if !offenses.lines.is_empty() {
            return Err(report(rule, path, &offenses.lines).into());
        }
    }
    Ok(())
}

fn report(rule: &Rule, path: &Path, lines: &[String]) -> String {
    let mut msg = format!(
        "\n❌ ERROR: Found {} {} in {}:\n",
        lines.len(),
        rule.name,
        path.display()
    );
    for line in lines {
        msg.push_str(&format!("   {line}\n"));
    }
    msg.push_str(&format!(
        "\n⚠️ {} are STRICTLY FORBIDDEN in this project.\n   {}\n",
        rule.name, rule.advice
    ));
    msg
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in ["risk", "cli", "tests"] {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = rust_sources();
    for rule in &RULES {
        if let Err(e) = check(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
