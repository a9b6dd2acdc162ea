use crate::error::Fault;
use crate::grammar::{Spanned, TemplatePart, Token};
use std::iter::Peekable;
use std::str::Chars;

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, Fault> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;
    let mut line_start = true;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            line_start = true;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        let at_line_start = std::mem::replace(&mut line_start, false);
        let start_line = line;

        let token = match c {
            '0'..='9' => {
                let mut text = String::new();
                text.push(c);
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !text.contains('.') {
                        let mut ahead = chars.clone();
                        ahead.next();
                        if matches!(ahead.peek(), Some(n) if n.is_ascii_digit()) {
                            text.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    } else if matches!(d, 'e' | 'E') {
                        let mut ahead = chars.clone();
                        ahead.next();
                        let sign = ahead.next_if(|s| *s == '+' || *s == '-');
                        if !matches!(ahead.peek(), Some(n) if n.is_ascii_digit()) {
                            break;
                        }
                        text.push(d);
                        chars.next();
                        if let Some(sign) = sign {
                            text.push(sign);
                            chars.next();
                        }
                        while let Some(&n) = chars.peek() {
                            if !n.is_ascii_digit() {
                                break;
                            }
                            text.push(n);
                            chars.next();
                        }
                        break;
                    } else {
                        break;
                    }
                }
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Fault::syntax(line, format!("Invalid number '{text}'")))?;
                Token::Number(value)
            }

            'a'..='z' | 'A'..='Z' | '_' | '$' => {
                let mut s = String::new();
                s.push(c);

                while let Some(ch) = chars.peek() {
                    if ch.is_alphanumeric() || *ch == '_' || *ch == '$' {
                        s.push(*ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                match s.as_str() {
                    "let"      => Token::Let,
                    "if"       => Token::If,
                    "else"     => Token::Else,
                    "while"    => Token::While,
                    "for"      => Token::For,
                    "of"       => Token::Of,
                    "in"       => Token::In,
                    "function" => Token::Function,
                    "return"   => Token::Return,
                    "break"    => Token::Break,
                    "continue" => Token::Continue,
                    "true"     => Token::True,
                    "false"    => Token::False,
                    "null"     => Token::Null,
                    _          => Token::Ident(s),
                }
            }

            '"' | '\'' => Token::Str(read_string(&mut chars, c, line)?),
            '`' => Token::Template(read_template(&mut chars, &mut line, start_line)?),

            '/' => match chars.peek() {
                Some('/') if at_line_start => {
                    while let Some(&ch) = chars.peek() {
                        if ch == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    line_start = true;
                    continue;
                }
                Some('/') => {
                    chars.next();
                    Token::FloorDiv
                }
                Some('=') => {
                    chars.next();
                    Token::DivAssign
                }
                _ => Token::Div,
            },
            '+' => match chars.peek() {
                Some('+') => {
                    chars.next();
                    Token::Increment
                }
                Some('=') => {
                    chars.next();
                    Token::AddAssign
                }
                _ => Token::Add,
            },
            '-' => match chars.peek() {
                Some('-') => {
                    chars.next();
                    Token::Decrement
                }
                Some('=') => {
                    chars.next();
                    Token::SubAssign
                }
                _ => Token::Sub,
            },
            '*' => match chars.peek() {
                Some('*') => {
                    chars.next();
                    if let Some('=') = chars.peek() {
                        chars.next();
                        Token::PowAssign
                    } else {
                        Token::Power
                    }
                }
                Some('=') => {
                    chars.next();
                    Token::MulAssign
                }
                _ => Token::Mul,
            },
            '%' => {
                if let Some('=') = chars.peek() {
                    chars.next();
                    Token::ModAssign
                } else {
                    Token::Modulo
                }
            }
            '=' => {
                if let Some('=') = chars.peek() {
                    chars.next();
                    if let Some('=') = chars.peek() {
                        chars.next();
                    }
                    Token::Equal
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if let Some('=') = chars.peek() {
                    chars.next();
                    if let Some('=') = chars.peek() {
                        chars.next();
                    }
                    Token::NotEqual
                } else {
                    Token::Not
                }
            }
            '>' => {
                if let Some('=') = chars.peek() {
                    chars.next();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '<' => {
                if let Some('=') = chars.peek() {
                    chars.next();
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            '&' => {
                if let Some('&') = chars.peek() {
                    chars.next();
                    Token::And
                } else {
                    return Err(Fault::syntax(line, "Invalid or unexpected token '&'"));
                }
            }
            '|' => {
                if let Some('|') = chars.peek() {
                    chars.next();
                    Token::Or
                } else {
                    return Err(Fault::syntax(line, "Invalid or unexpected token '|'"));
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LSquare,
            ']' => Token::RSquare,
            ',' => Token::Comma,
            '.' => Token::Dot,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            other => {
                return Err(Fault::syntax(
                    line,
                    format!("Invalid or unexpected token '{other}'"),
                ));
            }
        };

        tokens.push(Spanned {
            token,
            line: start_line,
        });
    }

    Ok(tokens)
}

fn read_string(chars: &mut Peekable<Chars<'_>>, quote: char, line: usize) -> Result<String, Fault> {
    let mut s = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(s),
            Some('\\') => match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('r') => s.push('\r'),
                Some('0') => s.push('\0'),
                Some(other) => s.push(other),
                None => break,
            },
            Some('\n') | None => break,
            Some(c) => s.push(c),
        }
    }
    Err(Fault::syntax(line, "Invalid or unexpected token (unterminated string)"))
}

fn read_template(
    chars: &mut Peekable<Chars<'_>>,
    line: &mut usize,
    start_line: usize,
) -> Result<Vec<TemplatePart>, Fault> {
    let mut parts = Vec::new();
    let mut text = String::new();

    loop {
        match chars.next() {
            Some('`') => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                return Ok(parts);
            }
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(other) => text.push(other),
                None => break,
            },
            Some('$') if chars.peek() == Some(&'{') => {
                chars.next();
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                parts.push(TemplatePart::Expr(read_interpolation(chars, line)?));
            }
            Some(c) => {
                if c == '\n' {
                    *line += 1;
                }
                text.push(c);
            }
            None => break,
        }
    }
    Err(Fault::syntax(start_line, "Unterminated template literal"))
}

fn read_interpolation(chars: &mut Peekable<Chars<'_>>, line: &mut usize) -> Result<String, Fault> {
    let mut expr = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            expr.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    expr.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '}' if depth == 0 => return Ok(expr),
            '{' => depth += 1,
            '}' => depth -= 1,
            '"' | '\'' => quote = Some(c),
            '\n' => *line += 1,
            _ => {}
        }
        expr.push(c);
    }
    Err(Fault::syntax(*line, "Unterminated template interpolation"))
}
