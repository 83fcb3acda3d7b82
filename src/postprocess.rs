//! Final line-list passes: deferred indentation and escape collapsing.

const INC_MARKER: &str = "{incindent}";
const DEC_MARKER: &str = "{decindent}";

/// Apply the delayed `{IncIndent}`/`{DecIndent}` markers.
///
/// Marker occurrences adjust a running indent level (floored at zero) and
/// are stripped from their line; a line left empty by stripping is deleted.
/// Every surviving non-empty line is prefixed with one copy of
/// `indent_unit` per indent level. Idempotent: a second run finds no
/// markers and changes nothing.
pub fn postprocess(lines: &[String], indent_unit: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut level: usize = 0;
    for line in lines {
        let lower = line.to_ascii_lowercase();
        let mut text = if lower.contains(INC_MARKER) || lower.contains(DEC_MARKER) {
            let stripped = strip_markers(line, &mut level);
            if stripped.trim().is_empty() {
                continue;
            }
            stripped
        } else {
            line.clone()
        };
        if level > 0 && !text.is_empty() {
            text.insert_str(0, &indent_unit.repeat(level));
        }
        out.push(text);
    }
    out
}

/// Collapse doubled bracket escapes to singles. Runs exactly once, when a
/// buffer is flushed to output: collapsing is not repeat-safe (`{{{{`
/// legitimately flushes as `{{`), so it stays out of [`postprocess`].
pub fn collapse_escapes(lines: &[String]) -> Vec<String> {
    lines.iter().map(|l| collapse_doubles(l)).collect()
}

fn strip_markers(line: &str, level: &mut usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let lower = rest.to_ascii_lowercase();
        let inc = lower.find(INC_MARKER);
        let dec = lower.find(DEC_MARKER);
        let (pos, increment) = match (inc, dec) {
            (Some(i), Some(d)) if i < d => (i, true),
            (Some(_), Some(d)) => (d, false),
            (Some(i), None) => (i, true),
            (None, Some(d)) => (d, false),
            (None, None) => break,
        };
        out.push_str(&rest[..pos]);
        if increment {
            *level += 1;
        } else {
            *level = level.saturating_sub(1);
        }
        rest = &rest[pos + INC_MARKER.len()..];
    }
    out.push_str(rest);
    out
}

fn collapse_doubles(line: &str) -> String {
    if !line.contains("{{") && !line.contains("}}") && !line.contains("[[") && !line.contains("]]")
    {
        return line.to_string();
    }
    line.replace("{{", "{")
        .replace("}}", "}")
        .replace("[[", "[")
        .replace("]]", "]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn markers_indent_the_lines_between_them() {
        let out = postprocess(
            &lines(&["{IncIndent}", "one", "two", "{DecIndent}", "three"]),
            "\t",
        );
        assert_eq!(out, vec!["\tone", "\ttwo", "three"]);
    }

    #[test]
    fn nested_markers_stack() {
        let out = postprocess(
            &lines(&["a", "{IncIndent}", "b", "{IncIndent}", "c", "{DecIndent}", "d"]),
            "  ",
        );
        assert_eq!(out, vec!["a", "  b", "    c", "  d"]);
    }

    #[test]
    fn decrement_never_goes_below_zero() {
        let out = postprocess(&lines(&["{DecIndent}", "{DecIndent}", "flat"]), "\t");
        assert_eq!(out, vec!["flat"]);
    }

    #[test]
    fn marker_with_remainder_keeps_the_line() {
        let out = postprocess(&lines(&["{DecIndent}end", "{IncIndent}open"]), "\t");
        // The decrement line stays at level zero; the increment line is
        // already at the new level.
        assert_eq!(out, vec!["end", "\topen"]);
    }

    #[test]
    fn doubled_brackets_collapse_to_singles() {
        let out = collapse_escapes(&lines(&["a {{b}} c [[d]]"]));
        assert_eq!(out, vec!["a {b} c [d]"]);
    }

    #[test]
    fn collapse_removes_exactly_one_doubling() {
        // Quadrupled brackets are an escaped escape; one flush collapses
        // one level, never more.
        let out = collapse_escapes(&lines(&["a {{{{b", "[[[[x]]]]"]));
        assert_eq!(out, vec!["a {{b", "[[x]]"]);
    }

    #[test]
    fn processing_is_idempotent() {
        let first = postprocess(
            &lines(&["{IncIndent}", "body {{{{x}}}}", "{DecIndent}", "tail"]),
            "\t",
        );
        let second = postprocess(&first, "\t");
        assert_eq!(first, second);
        // Doubled brackets pass through untouched, so re-running the pass
        // over already-flushed output cannot over-collapse them.
        assert_eq!(first, vec!["\tbody {{{{x}}}}", "tail"]);
    }

    #[test]
    fn empty_lines_are_kept_but_not_indented() {
        let out = postprocess(&lines(&["{IncIndent}", "a", "", "b", "{DecIndent}"]), "\t");
        assert_eq!(out, vec!["\ta", "", "\tb"]);
    }
}
