use lazy_static::lazy_static;
use regex::Regex;

// Placeholder delimiters for masked string literals; private-use code points
// never appear in guest source.
const MASK_OPEN: char = '\u{E000}';
const MASK_CLOSE: char = '\u{E001}';

lazy_static! {
    static ref KEYWORDS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\bTrue\b").unwrap(), "true"),
        (Regex::new(r"\bFalse\b").unwrap(), "false"),
        (Regex::new(r"\bNone\b").unwrap(), "null"),
        (Regex::new(r"\bis\s+not\b").unwrap(), "!="),
        (Regex::new(r"\bis\b").unwrap(), "=="),
        (Regex::new(r"\band\b").unwrap(), "&&"),
        (Regex::new(r"\bor\b").unwrap(), "||"),
        (Regex::new(r"\bnot\b").unwrap(), "!"),
    ];
    static ref MASK: Regex = Regex::new("\u{E000}(\\d+)\u{E001}").unwrap();
    static ref SIMPLE_OPERAND: Regex =
        Regex::new("^[A-Za-z_$][\\w$]*(\\.[A-Za-z_$][\\w$]*|\\[[^\\[\\]]*\\])*$|^\u{E000}\\d+\u{E001}$")
            .unwrap();
}

const BUILTINS: [(&str, &str); 3] = [("str", "String"), ("int", "parseInt"), ("float", "parseFloat")];

/// Rewrites one guest expression fragment into host-native expression text.
///
/// Applied independently at every expression site. Never fails: input the
/// rewrites do not understand passes through and surfaces when the program runs.
pub fn convert_expression(expr: &str) -> String {
    let expr = rewrite_fstrings(expr.trim());
    let (masked, literals) = mask_strings(&expr);

    let mut text = masked;
    for (pattern, replacement) in KEYWORDS.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    let text = rewrite_builtins(&text);

    MASK.replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| literals.get(i).cloned())
            .unwrap_or_default()
    })
    .into_owned()
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `f"..{x}.."` becomes a template literal; interpolations are converted too.
fn rewrite_fstrings(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let end = literal_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        let prefixed = (c == 'f' || c == 'F')
            && matches!(chars.get(i + 1), Some('"') | Some('\''))
            && (i == 0 || !is_word(chars[i - 1]));
        if !prefixed {
            out.push(c);
            i += 1;
            continue;
        }

        let quote = chars[i + 1];
        let mut j = i + 2;
        out.push('`');
        while j < chars.len() && chars[j] != quote {
            match chars[j] {
                '\\' if j + 1 < chars.len() => {
                    out.push('\\');
                    out.push(chars[j + 1]);
                    j += 2;
                }
                '{' if chars.get(j + 1) == Some(&'{') => {
                    out.push('{');
                    j += 2;
                }
                '}' if chars.get(j + 1) == Some(&'}') => {
                    out.push('}');
                    j += 2;
                }
                '{' => {
                    let mut depth = 0;
                    let mut k = j + 1;
                    while k < chars.len() {
                        match chars[k] {
                            '{' => depth += 1,
                            '}' if depth == 0 => break,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        k += 1;
                    }
                    let inner: String = chars[j + 1..k.min(chars.len())].iter().collect();
                    out.push_str("${");
                    out.push_str(&convert_expression(&inner));
                    out.push('}');
                    j = k + 1;
                }
                '`' => {
                    out.push_str("\\`");
                    j += 1;
                }
                other => {
                    out.push(other);
                    j += 1;
                }
            }
        }
        out.push('`');
        i = j + 1;
    }
    out
}

/// Index one past the closing quote of the literal starting at `start`.
fn literal_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Swaps every string literal for a placeholder so later rewrites leave
/// string contents alone. Single-quoted literals come back double-quoted.
fn mask_strings(expr: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = expr.chars().collect();
    let mut masked = String::with_capacity(expr.len());
    let mut literals = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' || c == '`' {
            let end = literal_end(&chars, i);
            let body: String = chars[i..end].iter().collect();
            let literal = if c == '\'' { requote(&body) } else { body };
            masked.push(MASK_OPEN);
            masked.push_str(&literals.len().to_string());
            masked.push(MASK_CLOSE);
            literals.push(literal);
            i = end;
        } else {
            masked.push(c);
            i += 1;
        }
    }
    (masked, literals)
}

fn requote(single: &str) -> String {
    let inner = single
        .strip_prefix('\'')
        .map(|s| s.strip_suffix('\'').unwrap_or(s))
        .unwrap_or(single);
    let mut out = String::from("\"");
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// `len(x)`, `str(x)`, `int(x)`, `float(x)` with balanced argument scanning.
fn rewrite_builtins(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    'scan: while i < chars.len() {
        let boundary = i == 0 || !(is_word(chars[i - 1]) || chars[i - 1] == '.' || chars[i - 1] == '$');
        if boundary && is_word(chars[i]) {
            let mut j = i;
            while j < chars.len() && is_word(chars[j]) {
                j += 1;
            }
            let name: String = chars[i..j].iter().collect();
            let known = name == "len" || BUILTINS.iter().any(|(py, _)| *py == name);
            if known && chars.get(j) == Some(&'(') {
                if let Some(close) = matching_paren(&chars, j) {
                    let inner: String = chars[j + 1..close].iter().collect();
                    let arg = rewrite_builtins(inner.trim());
                    if name == "len" {
                        if SIMPLE_OPERAND.is_match(&arg) {
                            out.push_str(&format!("{arg}.length"));
                        } else {
                            out.push_str(&format!("({arg}).length"));
                        }
                    } else if let Some((_, native)) = BUILTINS.iter().find(|(py, _)| *py == name) {
                        out.push_str(&format!("{native}({arg})"));
                    }
                    i = close + 1;
                    continue 'scan;
                }
            }
            out.push_str(&name);
            i = j;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (k, c) in chars.iter().enumerate().skip(open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(k);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fstring_becomes_template() {
        assert_eq!(convert_expression(r#"f"Score: {score}""#), "`Score: ${score}`");
    }

    #[test]
    fn fstring_interpolation_is_converted() {
        assert_eq!(
            convert_expression("f'Len: {len(snake)} {ok and True}'"),
            "`Len: ${snake.length} ${ok && true}`"
        );
    }

    #[test]
    fn keywords_and_literals_are_rewritten() {
        assert_eq!(
            convert_expression("not done and x is None or y"),
            "! done && x == null || y"
        );
    }

    #[test]
    fn words_inside_strings_are_left_alone() {
        assert_eq!(
            convert_expression("'True or False' + str(n)"),
            "\"True or False\" + String(n)"
        );
    }

    #[test]
    fn single_quoted_literal_with_double_quote_is_escaped() {
        assert_eq!(convert_expression(r#"'say "hi"'"#), r#""say \"hi\"""#);
    }

    #[test]
    fn len_parenthesises_compound_arguments() {
        assert_eq!(convert_expression("len(a) + len(b + c)"), "a.length + (b + c).length");
        assert_eq!(convert_expression("len(snake['body'])"), "snake[\"body\"].length");
    }

    #[test]
    fn nested_builtins_use_balanced_scanning() {
        assert_eq!(convert_expression("int(float(x) * 2)"), "parseInt(parseFloat(x) * 2)");
    }

    #[test]
    fn methods_named_like_builtins_are_untouched() {
        assert_eq!(convert_expression("obj.len(x) + string_len(y)"), "obj.len(x) + string_len(y)");
    }

    #[test]
    fn random_vocabulary_passes_through() {
        assert_eq!(
            convert_expression("random.randint(0, WIDTH // 20 - 1)"),
            "random.randint(0, WIDTH // 20 - 1)"
        );
    }
}
