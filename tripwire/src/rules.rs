//! PROCESS rule matching.
//!
//! Targets are shell globs in the `filepath.Match` dialect: `*` and `?` stay
//! inside one path element, `[...]` is a character class (`^` or `!` negates)
//! and `\` escapes the next character. A rule is tried against the base name
//! of the candidate first, then against the whole string.

use anyhow::{Context, Result};
use regex::Regex;

use crate::{event::ExecInfo, settings::TripwireRule};

/// A compiled PROCESS rule.
#[derive(Debug, Clone)]
pub struct ProcessRule {
    pub name: String,
    pub severity: String,
    pattern: Option<Regex>,
}

impl ProcessRule {
    pub fn compile(rule: &TripwireRule) -> Result<Self> {
        let pattern = if rule.target.is_empty() {
            None
        } else {
            Some(
                glob_to_regex(&rule.target)
                    .with_context(|| format!("Invalid target for rule {}", rule.name))?,
            )
        };
        Ok(Self {
            name: rule.name.clone(),
            severity: rule.severity.clone(),
            pattern,
        })
    }

    pub fn matches(&self, proc_name: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(re) => re.is_match(base_name(proc_name)) || re.is_match(proc_name),
        }
    }
}

/// Ordered PROCESS rules; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<ProcessRule>,
}

impl RuleMatcher {
    /// Compiles the PROCESS rules out of `rules`, keeping their order.
    pub fn new<'a>(rules: impl IntoIterator<Item = &'a TripwireRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .filter(|r| r.is_process())
            .map(ProcessRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matching_rule(&self, proc_name: &str) -> Option<&ProcessRule> {
        self.rules.iter().find(|r| r.matches(proc_name))
    }

    /// Tries the executable path, then the task name.
    pub fn match_exec(&self, info: &ExecInfo) -> Option<&ProcessRule> {
        self.matching_rule(&info.filename)
            .or_else(|| self.matching_rule(&info.comm))
    }
}

/// Last path element, ignoring trailing slashes.
pub fn base_name(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Translates a glob into an anchored regex.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '\\' => {
                let escaped = chars.next().context("Trailing backslash in glob")?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    out.push_str("^/");
                }
                let mut first = true;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '-' if !first && chars.peek().is_some_and(|&n| n != ']') => out.push('-'),
                        '\\' => {
                            let escaped = chars.next().context("Trailing backslash in glob")?;
                            out.push_str(&regex::escape(&escaped.to_string()));
                        }
                        _ => out.push_str(&regex::escape(&c.to_string())),
                    }
                    first = false;
                }
                if !closed {
                    anyhow::bail!("Unterminated character class in glob {:?}", glob);
                }
                out.push(']');
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).with_context(|| format!("Failed to compile glob {:?}", glob))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_rule(name: &str, target: &str) -> TripwireRule {
        TripwireRule {
            name: name.to_string(),
            rule_type: "PROCESS".to_string(),
            target: target.to_string(),
            severity: "WARN".to_string(),
        }
    }

    fn exec(comm: &str, filename: &str) -> ExecInfo {
        ExecInfo {
            pid: 100,
            ppid: 1,
            uid: 0,
            gid: 0,
            comm: comm.to_string(),
            filename: filename.to_string(),
            argv: String::new(),
        }
    }

    #[test]
    fn test_glob_star_and_question() {
        let re = glob_to_regex("*sh").unwrap();
        assert!(re.is_match("bash"));
        assert!(re.is_match("sh"));
        assert!(!re.is_match("/bin/bash"));

        let re = glob_to_regex("python3.?").unwrap();
        assert!(re.is_match("python3.9"));
        assert!(!re.is_match("python3.10"));
    }

    #[test]
    fn test_glob_literal_dots_are_not_wildcards() {
        let re = glob_to_regex("a.b").unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn test_glob_character_classes() {
        let re = glob_to_regex("[bz]sh").unwrap();
        assert!(re.is_match("bsh"));
        assert!(re.is_match("zsh"));
        assert!(!re.is_match("csh"));

        let re = glob_to_regex("nc[0-9]").unwrap();
        assert!(re.is_match("nc7"));
        assert!(!re.is_match("nca"));

        let re = glob_to_regex("[!a]x").unwrap();
        assert!(re.is_match("bx"));
        assert!(!re.is_match("ax"));
        assert!(!re.is_match("/x"));
    }

    #[test]
    fn test_glob_escapes() {
        let re = glob_to_regex(r"a\*").unwrap();
        assert!(re.is_match("a*"));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn test_malformed_globs() {
        assert!(glob_to_regex("[abc").is_err());
        assert!(glob_to_regex("abc\\").is_err());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/usr/bin/curl"), "curl");
        assert_eq!(base_name("curl"), "curl");
        assert_eq!(base_name("/usr/bin/"), "bin");
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name(""), ".");
    }

    #[test]
    fn test_rule_matches_base_name_then_full_path() {
        let by_base = ProcessRule::compile(&process_rule("curl", "curl")).unwrap();
        assert!(by_base.matches("/usr/bin/curl"));

        let by_path = ProcessRule::compile(&process_rule("tmp-exec", "/tmp/*")).unwrap();
        assert!(by_path.matches("/tmp/payload"));
        assert!(!by_path.matches("/tmp/dir/payload"));
        assert!(!by_path.matches("/usr/bin/payload"));
    }

    #[test]
    fn test_empty_target_matches_everything() {
        let any = ProcessRule::compile(&process_rule("any", "")).unwrap();
        assert!(any.matches("/bin/true"));
        assert!(any.matches(""));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            process_rule("shells", "*sh"),
            process_rule("bash-only", "bash"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();
        assert_eq!(matcher.matching_rule("/bin/bash").unwrap().name, "shells");
    }

    #[test]
    fn test_non_process_rules_are_ignored() {
        let mut file_rule = process_rule("passwd", "/etc/passwd");
        file_rule.rule_type = "FILE".to_string();
        let rules = vec![file_rule, process_rule("nc", "nc")];

        let matcher = RuleMatcher::new(&rules).unwrap();
        assert_eq!(matcher.len(), 1);
        assert!(matcher.matching_rule("/etc/passwd").is_none());
    }

    #[test]
    fn test_exec_falls_back_to_comm() {
        let rules = vec![process_rule("python", "python*")];
        let matcher = RuleMatcher::new(&rules).unwrap();

        // script exec: the path is the script, comm is the interpreter
        let info = exec("python3", "/opt/app/run");
        assert_eq!(matcher.match_exec(&info).unwrap().name, "python");

        let info = exec("bash", "/bin/ls");
        assert!(matcher.match_exec(&info).is_none());
    }

    #[test]
    fn test_invalid_target_fails_compilation() {
        let rules = vec![process_rule("broken", "[x")];
        let err = RuleMatcher::new(&rules).unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }
}
