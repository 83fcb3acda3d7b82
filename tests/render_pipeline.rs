use weft::{render, Project};

// End-to-end runs through the whole pipeline: parse, tree build, walk,
// reduce, post-process.

fn project() -> Project {
    let mut p = Project::new();
    let sheet = p.sheet_mut("Customer");
    let base = sheet.record_mut("customer");
    base.base = true;
    base.set("Table", "customers");
    sheet
        .record_mut("Name")
        .set("Name", "name")
        .set("Type", "string");
    sheet
        .record_mut("Age")
        .set("Name", "age")
        .set("Type", "int");
    let sheet = p.sheet_mut("Order");
    let base = sheet.record_mut("order");
    base.base = true;
    base.set("Table", "orders");
    sheet
        .record_mut("Total")
        .set("Name", "total")
        .set("Type", "float");
    p
}

fn run(p: &mut Project, lines: &[&str]) -> Vec<String> {
    let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    render(&lines, p).lines
}

#[test]
fn config_substitution() {
    let mut p = Project::new();
    p.set_config("Name", "World");
    assert_eq!(run(&mut p, &["Hello, {Name}!"]), vec!["Hello, World!"]);
}

#[test]
fn field_lookup_through_selection_commands() {
    let mut p = project();
    let out = run(
        &mut p,
        &[
            "{SetComponent(Customer)}",
            "{SetElement(Name)}",
            "[element:Type] in [component:Table]",
        ],
    );
    assert_eq!(out, vec!["string in customers"]);
}

#[test]
fn ddl_generation_scenario() {
    let mut p = project();
    let out = run(
        &mut p,
        &[
            "{Loop(Name:Tables)}",
            "CREATE TABLE [component:Table] (",
            "{IncIndent}",
            "{Loop(Name:Cols;Level:Element)}",
            "[element:Name] {StorageType([element:Type])}{iif({isLast};true,,,)}",
            "{EndLoop(Name:Cols)}",
            "{DecIndent}",
            ");",
            "{EndLoop(Name:Tables)}",
        ],
    );
    assert_eq!(
        out,
        vec![
            "CREATE TABLE customers (",
            "\tname TEXT,",
            "\tage INTEGER",
            ");",
            "CREATE TABLE orders (",
            "\ttotal REAL",
            ");",
        ]
    );
}

#[test]
fn configured_indent_unit() {
    let mut p = Project::new();
    p.set_config("TabCharacter", " ");
    p.set_config("TabCount", "4");
    let out = run(&mut p, &["a", "{IncIndent}", "b", "{DecIndent}", "c"]);
    assert_eq!(out, vec!["a", "    b", "c"]);
}

#[test]
fn continue_joins_the_next_line() {
    let mut p = Project::new();
    let out = run(&mut p, &["Hello, {Continue}", "World!", "next"]);
    assert_eq!(out, vec!["Hello, World!", "next"]);
}

#[test]
fn save_file_claims_the_buffer_so_far() {
    let mut p = project();
    let lines: Vec<String> = ["header", "{SaveFile(a.sql)}", "footer"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = render(&lines, &mut p);
    assert_eq!(out.lines, vec!["footer"]);
    assert!(out.dirty);
    assert_eq!(p.saved.len(), 1);
    assert_eq!(p.saved[0].name.as_deref(), Some("a.sql"));
    assert_eq!(p.saved[0].lines, vec!["header"]);
}

#[test]
fn inline_save_file_splits_its_line_first() {
    let mut p = project();
    let lines: Vec<String> = ["alpha{SaveFile}"].iter().map(|s| s.to_string()).collect();
    let out = render(&lines, &mut p);
    // Everything went to the save; nothing is left over.
    assert!(out.lines.is_empty());
    assert!(!out.dirty);
    assert_eq!(p.saved.len(), 1);
    assert_eq!(p.saved[0].name, None);
    assert_eq!(p.saved[0].lines, vec!["alpha"]);
}

#[test]
fn json_project_renders() {
    let mut p: Project = serde_json::from_str(
        r#"{
            "config": {"Greeting": "hi"},
            "components": {
                "Customer": {
                    "records": {
                        "customer": {"base": true, "fields": {"Table": "customers"}},
                        "Name": {"fields": {"Type": "string"}}
                    }
                }
            }
        }"#,
    )
    .unwrap();
    let out = run(
        &mut p,
        &["{Greeting}", "{Loop(Name:C)}", "[component:Table]", "{EndLoop}"],
    );
    assert_eq!(out, vec!["hi", "customers"]);
}

#[test]
fn set_value_defines_config_for_later_lines() {
    let mut p = Project::new();
    let out = run(&mut p, &["{SetValue(Greeting,hello)}", "{Greeting} there"]);
    assert_eq!(out, vec!["hello there"]);
}

#[test]
fn config_indirection_composes_names() {
    let mut p = Project::new();
    p.set_config("Kind", "Color");
    p.set_config("FavoriteColor", "teal");
    // {Kind} resolves inside the outer braces, naming the second lookup.
    let out = run(&mut p, &["{Favorite{Kind} }!"]);
    assert_eq!(out, vec!["teal!"]);
}
