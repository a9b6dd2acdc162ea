use pyarcade::compiler::CompiledUnit;
use pyarcade::translate;
use std::path::Path;

/// Opening minus closing braces outside string literals and comment lines.
fn brace_balance(native: &str) -> i64 {
    let mut balance = 0;
    for line in native.lines().filter(|l| !l.trim_start().starts_with("//")) {
        let mut quote = None;
        let mut escaped = false;
        for c in line.chars() {
            match quote {
                Some(_) if escaped => escaped = false,
                Some(_) if c == '\\' => escaped = true,
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '"' | '\'' | '`' => quote = Some(c),
                    '{' => balance += 1,
                    '}' => balance -= 1,
                    _ => {}
                },
            }
        }
    }
    balance
}

#[test]
fn bundled_programs_translate_to_balanced_blocks() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("project");
    for name in ["main.py", "snake.py", "platformer.py", "shooter.py"] {
        let source = std::fs::read_to_string(dir.join(name)).expect("read program");
        let native = translate(&source).native;
        assert_eq!(brace_balance(&native), 0, "{name}:\n{native}");
        assert_eq!(
            native.lines().count(),
            source.lines().count(),
            "{name} keeps one native line per guest line"
        );
        CompiledUnit::from_native(&native).unwrap_or_else(|f| panic!("{name}: {f}\n{native}"));
    }
}

#[test]
fn unterminated_blocks_are_repaired() {
    let native = translate("while True:\n    if x:\n        y = 1\n").native;
    assert_eq!(brace_balance(&native), 0);
}

#[test]
fn first_binding_is_the_only_declaration() {
    let native = translate("x = 5\nx = x + 1\nprint(x)\n").native;
    assert_eq!(native.matches("let x").count(), 1);
    assert!(native.contains("x = x + 1;"));
}

#[test]
fn imports_are_collected() {
    let translation = translate("import game, random\nfrom math import floor\n");
    let imports: Vec<&str> = translation.imports.iter().map(String::as_str).collect();
    assert_eq!(imports, ["game", "math", "random"]);
}
