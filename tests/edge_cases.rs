use weft::{render, Project, SKIP_MARKER};

// Malformed and odd inputs: the engine must always finish and emit its
// best effort, never panic.

fn run(p: &mut Project, lines: &[&str]) -> Vec<String> {
    let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    render(&lines, p).lines
}

#[test]
fn empty_template_renders_nothing() {
    let mut p = Project::new();
    let out = render(&[], &mut p);
    assert!(out.lines.is_empty());
    assert!(!out.dirty);
}

#[test]
fn blank_lines_are_preserved() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["a", "", "b"]), vec!["a", "", "b"]);
}

#[test]
fn doubled_brackets_escape_placeholders() {
    let mut p = Project::new();
    p.set_config("Name", "World");
    // Escaped braces are never looked up and collapse to singles at the end.
    assert_eq!(run(&mut p, &["{{Name}} [[0]]"]), vec!["{Name} [0]"]);
}

#[test]
fn nested_ref_with_adjacent_closers_is_an_escape() {
    let mut p = Project::new();
    p.set_config("A", "x");
    p.set_config("B", "y");
    // The trailing `}}` reads as an escaped brace, so neither name is
    // looked up; the pair collapses to a single `}` on output. Name
    // composition needs a separator before the outer closer.
    assert_eq!(run(&mut p, &["{A{B}}"]), vec!["{A{B}"]);
}

#[test]
fn quadrupled_brackets_collapse_one_level_per_flush() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["a {{{{b"]), vec!["a {{b"]);
}

#[test]
fn braced_prose_stays_literal() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["{ not a ref } [1]"]), vec!["{ not a ref } [1]"]);
}

#[test]
fn missing_references_resolve_empty() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["a{Nope}b[element:Nope]c"]), vec!["abc"]);
}

#[test]
fn unknown_command_resolves_empty() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["x{Frobnicate(1,2)}y"]), vec!["xy"]);
}

#[test]
fn stray_end_tag_is_dropped() {
    let mut p = Project::new();
    assert_eq!(run(&mut p, &["a", "{EndLoop}", "b"]), vec!["a", "b"]);
}

#[test]
fn unterminated_loop_closes_at_end_of_input() {
    let mut p = Project::new();
    p.sheet_mut("Customer")
        .record_mut("customer")
        .set("Table", "customers")
        .base = true;
    let out = run(&mut p, &["{Loop(Name:C)}", "[component:Table]"]);
    assert_eq!(out, vec!["customers"]);
}

#[test]
fn mismatched_end_name_falls_back_to_nearest_block() {
    let mut p = Project::new();
    p.set_config("Components", "One,Two");
    let out = run(&mut p, &["{Loop(Name:A)}", "x", "{EndLoop(Name:Z)}", "y"]);
    assert_eq!(out, vec!["x", "x", "y"]);
}

#[test]
fn self_referential_config_emits_best_effort() {
    let mut p = Project::new();
    p.set_config("A", "{A}");
    // The reduce gives up after the pass cap; the line comes out as it
    // last stood instead of hanging or aborting.
    assert_eq!(run(&mut p, &["{A}"]), vec!["{A}"]);
}

#[test]
fn skip_marker_drops_the_line() {
    let mut p = Project::new();
    p.set_config("Gone", SKIP_MARKER);
    assert_eq!(run(&mut p, &["{Gone}", "kept"]), vec!["kept"]);
}

#[test]
fn selection_only_lines_leave_no_blanks() {
    let mut p = Project::new();
    p.sheet_mut("Customer").record_mut("Name").set("Type", "string");
    let out = run(
        &mut p,
        &["{SetComponent(Customer)}", "{SetElement(Name)}", "[element:Type]"],
    );
    assert_eq!(out, vec!["string"]);
}

#[test]
fn unicode_text_passes_through() {
    let mut p = Project::new();
    p.set_config("Name", "wörld 🌍");
    assert_eq!(run(&mut p, &["héllo {Name}"]), vec!["héllo wörld 🌍"]);
}

#[test]
fn condition_on_field_of_missing_component_is_false() {
    let mut p = Project::new();
    // No component selected: the field reduces empty and the guard fails
    // to parse, which reads as false rather than an error.
    let out = run(
        &mut p,
        &["{Condition(Expression:[Type]=string)}", "in", "{EndCondition}", "out"],
    );
    assert_eq!(out, vec!["out"]);
}
