//! Re-indents an embedded host snippet to a target indentation prefix,
//! preserving its relative structure.
//!
//! Grounded in `katagami.py::PythonTokens.set_indent`, which strips the
//! "first-most indent" (the leading whitespace of the first non-blank,
//! non-comment line) from every line and re-prefixes with the target. We
//! operate directly on source lines rather than re-tokenizing and
//! untokenizing: since only *leading* whitespace changes, line-granularity
//! string surgery produces the same result with less machinery.

/// Rewrites the leading indentation of every line in `source` so that the
/// snippet's first-most indent becomes `target`.
///
/// Blank lines are left blank. If the first real line has no leading
/// whitespace, every line is simply prefixed with `target` — equivalent to
/// inserting a synthetic indent token at the start, per spec §4.3.
pub fn normalize(source: &str, target: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();

    let first_most = lines
        .iter()
        .map(|line| {
            let trimmed = line.trim_start();
            (line, trimmed)
        })
        .find(|(_, trimmed)| !trimmed.is_empty() && !trimmed.starts_with('#'))
        .map(|(line, trimmed)| &line[..line.len() - trimmed.len()])
        .unwrap_or("");

    let mut out = Vec::with_capacity(lines.len());
    for line in &lines {
        if line.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        let rest = line.strip_prefix(first_most).unwrap_or_else(|| line.trim_start());
        out.push(format!("{target}{rest}"));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_common_indent_and_reprefixes() {
        let src = "    x = 1\n    if x:\n        y = 2\n";
        let got = normalize(src, "  ");
        assert_eq!(got, "  x = 1\n  if x:\n      y = 2\n  ");
    }

    #[test]
    fn blank_lines_stay_blank() {
        let src = "x = 1\n\ny = 2";
        let got = normalize(src, ">>");
        assert_eq!(got, ">>x = 1\n\n>>y = 2");
    }

    #[test]
    fn no_leading_indent_still_gets_target() {
        let src = "x = 1\ny = 2";
        let got = normalize(src, "    ");
        assert_eq!(got, "    x = 1\n    y = 2");
    }

    #[test]
    fn leading_comment_lines_are_skipped_when_finding_first_most() {
        let src = "  # note\n    x = 1\n    y = 2";
        let got = normalize(src, "");
        assert_eq!(got, "# note\nx = 1\ny = 2");
    }
}
