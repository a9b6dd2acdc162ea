use crate::error::Fault;
use crate::grammar::{AST, Operator, Spanned, TemplatePart, TemplateSegment, Token};
use crate::tokenizer::tokenize;

type Parsed = Result<AST, Fault>;

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, index: 0 }
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index).map(|s| &s.token);
        self.index += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn unexpected(&self) -> Fault {
        match self.peek() {
            Some(token) => Fault::syntax(self.line(), format!("Unexpected token {}", describe(token))),
            None => Fault::syntax(self.line(), "Unexpected end of input"),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), Fault> {
        if self.peek() == Some(&expected) {
            self.next();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Result<String, Fault> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.next();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn skip_semicolon(&mut self) {
        if let Some(Token::Semicolon) = self.peek() {
            self.next();
        }
    }

    fn parse_factor(&mut self) -> Parsed {
        let line = self.line();
        match self.next().cloned() {
            Some(Token::Ident(name)) => Ok(AST::Var(name)),
            Some(Token::Number(n)) => Ok(AST::Number(n)),
            Some(Token::Str(s)) => Ok(AST::Str(s)),
            Some(Token::True) => Ok(AST::Bool(true)),
            Some(Token::False) => Ok(AST::Bool(false)),
            Some(Token::Null) => Ok(AST::Null),
            Some(Token::Template(parts)) => parse_template(parts, line),

            Some(Token::LParen) => {
                if let Some(Token::RParen) = self.peek() {
                    self.next();
                    return Ok(AST::List(Vec::new()));
                }
                let first = self.parse_or()?;
                if let Some(Token::Comma) = self.peek() {
                    let mut items = vec![first];
                    while let Some(Token::Comma) = self.peek() {
                        self.next();
                        if let Some(Token::RParen) = self.peek() {
                            break;
                        }
                        items.push(self.parse_or()?);
                    }
                    self.expect(Token::RParen)?;
                    return Ok(AST::List(items));
                }
                self.expect(Token::RParen)?;
                Ok(first)
            }

            Some(Token::LSquare) => {
                let items = self.parse_list_items(Token::RSquare)?;
                Ok(AST::List(items))
            }

            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                while self.peek() != Some(&Token::RBrace) {
                    let key = match self.next().cloned() {
                        Some(Token::Str(s)) | Some(Token::Ident(s)) => s,
                        Some(Token::Number(n)) => crate::vm::runtime::format_number(n),
                        _ => {
                            self.index -= 1;
                            return Err(self.unexpected());
                        }
                    };
                    self.expect(Token::Colon)?;
                    let value = self.parse_or()?;
                    entries.push((key, value));
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.next();
                        }
                        Some(Token::RBrace) => {}
                        _ => return Err(self.unexpected()),
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(AST::Map(entries))
            }

            _ => {
                self.index -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn parse_list_items(&mut self, close: Token) -> Result<Vec<AST>, Fault> {
        let mut items = Vec::new();
        while self.peek() != Some(&close) {
            items.push(self.parse_or()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                Some(t) if *t == close => {}
                _ => return Err(self.unexpected()),
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_postfix(&mut self) -> Parsed {
        let mut ast = self.parse_factor()?;

        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.next();
                    let args = self.parse_list_items(Token::RParen)?;
                    ast = match ast {
                        AST::FieldAccess(receiver, name) => AST::MethodCall {
                            receiver,
                            name,
                            args,
                        },
                        callee => AST::Call {
                            callee: Box::new(callee),
                            args,
                        },
                    };
                }
                Some(Token::Dot) => {
                    self.next();
                    let field = self.expect_ident()?;
                    ast = AST::FieldAccess(Box::new(ast), field);
                }
                Some(Token::LSquare) => {
                    self.next();
                    let start = if let Some(Token::Colon) = self.peek() {
                        None
                    } else {
                        Some(Box::new(self.parse_or()?))
                    };
                    if let Some(Token::Colon) = self.peek() {
                        self.next();
                        let end = if let Some(Token::RSquare) = self.peek() {
                            None
                        } else {
                            Some(Box::new(self.parse_or()?))
                        };
                        self.expect(Token::RSquare)?;
                        ast = AST::Slice(Box::new(ast), start, end);
                    } else {
                        self.expect(Token::RSquare)?;
                        let index = start.ok_or_else(|| self.unexpected())?;
                        ast = AST::Index(Box::new(ast), index);
                    }
                }
                _ => break,
            }
        }

        Ok(ast)
    }

    fn parse_unary(&mut self) -> Parsed {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                Ok(AST::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Sub) => {
                self.next();
                Ok(AST::Negate(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_power(),
        }
    }

    /// `**` is right-associative and binds tighter than a leading minus;
    /// its right operand may itself be negated.
    fn parse_power(&mut self) -> Parsed {
        let base = self.parse_postfix()?;
        if let Some(Token::Power) = self.peek() {
            self.next();
            let exponent = self.parse_unary()?;
            return Ok(AST::Operation(
                Box::new(base),
                Operator::Power,
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn parse_summand(&mut self) -> Parsed {
        let mut ast = self.parse_unary()?;

        while let Some(tok) = self.peek() {
            let op = match tok {
                Token::Mul => Operator::Multiplication,
                Token::Div => Operator::Division,
                Token::FloorDiv => Operator::FloorDivision,
                Token::Modulo => Operator::Modulo,
                _ => break,
            };
            self.next();
            let right = self.parse_unary()?;
            ast = AST::Operation(Box::new(ast), op, Box::new(right));
        }
        Ok(ast)
    }

    fn parse_expr(&mut self) -> Parsed {
        let mut ast = self.parse_summand()?;

        while let Some(tok) = self.peek() {
            let op = match tok {
                Token::Add => Operator::Addition,
                Token::Sub => Operator::Subtraction,
                _ => break,
            };
            self.next();
            let right = self.parse_summand()?;
            ast = AST::Operation(Box::new(ast), op, Box::new(right));
        }
        Ok(ast)
    }

    fn parse_comparison(&mut self) -> Parsed {
        let mut ast = self.parse_expr()?;

        while let Some(tok) = self.peek() {
            let op = match tok {
                Token::Greater => Operator::Greater,
                Token::Less => Operator::Less,
                Token::Equal => Operator::Equal,
                Token::GreaterEqual => Operator::GreaterEqual,
                Token::LessEqual => Operator::LessEqual,
                Token::NotEqual => Operator::NotEqual,
                Token::In => Operator::In,
                _ => break,
            };
            self.next();
            let right = self.parse_expr()?;
            ast = AST::Operation(Box::new(ast), op, Box::new(right));
        }
        Ok(ast)
    }

    fn parse_and(&mut self) -> Parsed {
        let mut ast = self.parse_comparison()?;

        while let Some(Token::And) = self.peek() {
            self.next();
            let right = self.parse_comparison()?;
            ast = AST::Operation(Box::new(ast), Operator::And, Box::new(right));
        }
        Ok(ast)
    }

    fn parse_or(&mut self) -> Parsed {
        let mut ast = self.parse_and()?;

        while let Some(Token::Or) = self.peek() {
            self.next();
            let right = self.parse_and()?;
            ast = AST::Operation(Box::new(ast), Operator::Or, Box::new(right));
        }
        Ok(ast)
    }

    fn parse_if(&mut self) -> Parsed {
        self.next();
        self.expect(Token::LParen)?;
        let cond = self.parse_or()?;
        self.expect(Token::RParen)?;

        let then_branch = self.parse_block()?;

        let else_branch = if let Some(Token::Else) = self.peek() {
            self.next();
            if let Some(Token::If) = self.peek() {
                let line = self.line();
                vec![AST::Located(line, Box::new(self.parse_if()?))]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };

        Ok(AST::IfElse(Box::new(cond), then_branch, else_branch))
    }

    fn parse_block(&mut self) -> Result<Vec<AST>, Fault> {
        let mut statements = Vec::new();

        self.expect(Token::LBrace)?;

        while let Some(tok) = self.peek() {
            match tok {
                Token::RBrace => break,
                Token::Semicolon => {
                    self.next();
                }
                _ => statements.push(self.parse_located()?),
            }
        }

        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    fn parse_for(&mut self) -> Parsed {
        self.next();
        self.expect(Token::LParen)?;

        if let (Some(Token::Let), Some(Token::Ident(_)), Some(Token::Of)) =
            (self.peek(), self.peek_at(1), self.peek_at(2))
        {
            self.next();
            let var = self.expect_ident()?;
            self.next();
            let iterable = self.parse_or()?;
            self.expect(Token::RParen)?;
            let body = self.parse_block()?;
            return Ok(AST::ForOf {
                var,
                iterable: Box::new(iterable),
                body,
            });
        }

        let init = self.parse_simple()?;
        self.expect(Token::Semicolon)?;
        let cond = self.parse_or()?;
        self.expect(Token::Semicolon)?;
        let update = self.parse_simple()?;
        self.expect(Token::RParen)?;
        let body = self.parse_block()?;

        Ok(AST::ForCount {
            init: Box::new(init),
            cond: Box::new(cond),
            update: Box::new(update),
            body,
        })
    }

    fn parse_function(&mut self) -> Parsed {
        self.next();
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;

        let mut params = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            params.push(self.expect_ident()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                Some(Token::RParen) => {}
                _ => return Err(self.unexpected()),
            }
        }
        self.expect(Token::RParen)?;

        let body = self.parse_block()?;
        Ok(AST::FuncDef { name, params, body })
    }

    /// Declarations, assignments and expression statements (no terminator).
    fn parse_simple(&mut self) -> Parsed {
        if let Some(Token::Let) = self.peek() {
            self.next();
            let name = self.expect_ident()?;
            self.expect(Token::Assign)?;
            let value = self.parse_or()?;
            return Ok(AST::Let(name, Box::new(value)));
        }

        let line = self.line();
        let expr = self.parse_or()?;

        let op = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::AddAssign) => Some(Operator::Addition),
            Some(Token::SubAssign) => Some(Operator::Subtraction),
            Some(Token::MulAssign) => Some(Operator::Multiplication),
            Some(Token::DivAssign) => Some(Operator::Division),
            Some(Token::ModAssign) => Some(Operator::Modulo),
            Some(Token::PowAssign) => Some(Operator::Power),
            Some(Token::Increment) | Some(Token::Decrement) => {
                let op = if let Some(Token::Increment) = self.peek() {
                    Operator::Addition
                } else {
                    Operator::Subtraction
                };
                self.next();
                ensure_target(&expr, line)?;
                return Ok(AST::CompoundAssign(
                    Box::new(expr),
                    op,
                    Box::new(AST::Number(1.0)),
                ));
            }
            _ => return Ok(AST::Expression(Box::new(expr))),
        };

        self.next();
        ensure_target(&expr, line)?;
        let value = self.parse_or()?;

        Ok(match op {
            None => AST::Assign(Box::new(expr), Box::new(value)),
            Some(op) => AST::CompoundAssign(Box::new(expr), op, Box::new(value)),
        })
    }

    fn parse_statement(&mut self) -> Parsed {
        match self.peek() {
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.next();
                self.expect(Token::LParen)?;
                let cond = self.parse_or()?;
                self.expect(Token::RParen)?;
                let body = self.parse_block()?;
                Ok(AST::While(Box::new(cond), body))
            }
            Some(Token::For) => self.parse_for(),
            Some(Token::Function) => self.parse_function(),
            Some(Token::Return) => {
                let line = self.line();
                self.next();
                let ends = match self.tokens.get(self.index) {
                    None => true,
                    Some(s) => {
                        matches!(s.token, Token::Semicolon | Token::RBrace) || s.line != line
                    }
                };
                let value = if ends {
                    None
                } else {
                    Some(Box::new(self.parse_or()?))
                };
                self.skip_semicolon();
                Ok(AST::Return(value))
            }
            Some(Token::Break) => {
                self.next();
                self.skip_semicolon();
                Ok(AST::Break)
            }
            Some(Token::Continue) => {
                self.next();
                self.skip_semicolon();
                Ok(AST::Continue)
            }
            _ => {
                let stmt = self.parse_simple()?;
                self.skip_semicolon();
                Ok(stmt)
            }
        }
    }

    fn parse_located(&mut self) -> Parsed {
        let line = self.line();
        let stmt = self.parse_statement()?;
        Ok(AST::Located(line, Box::new(stmt)))
    }

    fn parse_program(&mut self) -> Parsed {
        let mut statements = Vec::new();

        while let Some(tok) = self.peek() {
            if let Token::Semicolon = tok {
                self.next();
                continue;
            }
            statements.push(self.parse_located()?);
        }
        Ok(AST::Program(statements))
    }
}

fn ensure_target(ast: &AST, line: usize) -> Result<(), Fault> {
    match ast {
        AST::Var(_) | AST::Index(_, _) | AST::FieldAccess(_, _) => Ok(()),
        _ => Err(Fault::syntax(line, "Invalid left-hand side in assignment")),
    }
}

fn parse_template(parts: Vec<TemplatePart>, line: usize) -> Parsed {
    let mut segments = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            TemplatePart::Text(text) => segments.push(TemplateSegment::Text(text)),
            TemplatePart::Expr(source) => {
                let expr = parse_expression(&source)
                    .map_err(|fault| Fault::syntax(line, fault_message(&fault)))?;
                segments.push(TemplateSegment::Expr(expr));
            }
        }
    }
    Ok(AST::Template(segments))
}

fn fault_message(fault: &Fault) -> String {
    match fault {
        Fault::Syntax { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Number(n) => format!("number {n}"),
        Token::Str(s) => format!("string \"{s}\""),
        Token::RBrace => "'}'".to_string(),
        Token::LBrace => "'{'".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RSquare => "']'".to_string(),
        Token::Semicolon => "';'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Assign => "'='".to_string(),
        other => format!("{other:?}"),
    }
}

pub fn parse(tokens: Vec<Spanned>) -> Parsed {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

/// Parses a standalone expression, such as a template interpolation.
pub fn parse_expression(source: &str) -> Parsed {
    let mut parser = Parser::new(tokenize(source)?);
    let expr = parser.parse_or()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Vec<AST> {
        match parse(tokenize(src).expect("tokenize")).expect("parse") {
            AST::Program(stmts) => stmts
                .into_iter()
                .map(|s| match s {
                    AST::Located(_, inner) => *inner,
                    other => other,
                })
                .collect(),
            other => panic!("not a program: {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let stmts = program("let x = 1 + 2 * 3;");
        assert_eq!(
            stmts[0],
            AST::Let(
                "x".into(),
                Box::new(AST::Operation(
                    Box::new(AST::Number(1.0)),
                    Operator::Addition,
                    Box::new(AST::Operation(
                        Box::new(AST::Number(2.0)),
                        Operator::Multiplication,
                        Box::new(AST::Number(3.0)),
                    )),
                ))
            )
        );
    }

    #[test]
    fn power_is_right_associative_and_outranks_negation() {
        let num = |n: f64| Box::new(AST::Number(n));
        let stmts = program("a = 2 ** 3 ** 2;\nb = -2 ** 2;");
        assert_eq!(
            stmts[0],
            AST::Assign(
                Box::new(AST::Var("a".into())),
                Box::new(AST::Operation(
                    num(2.0),
                    Operator::Power,
                    Box::new(AST::Operation(num(3.0), Operator::Power, num(2.0))),
                ))
            )
        );
        assert_eq!(
            stmts[1],
            AST::Assign(
                Box::new(AST::Var("b".into())),
                Box::new(AST::Negate(Box::new(AST::Operation(
                    num(2.0),
                    Operator::Power,
                    num(2.0),
                ))))
            )
        );
    }

    #[test]
    fn parenthesised_comma_list_is_a_list() {
        let stmts = program("d = (0, -20);");
        match &stmts[0] {
            AST::Assign(_, value) => match value.as_ref() {
                AST::List(items) => assert_eq!(items.len(), 2),
                other => panic!("expected list, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn else_if_chain_nests_in_else_branch() {
        let stmts = program("if (a) { x = 1; } else if (b) { x = 2; } else { x = 3; }");
        match &stmts[0] {
            AST::IfElse(_, then_branch, else_branch) => {
                assert_eq!(then_branch.len(), 1);
                assert!(matches!(
                    &else_branch[0],
                    AST::Located(_, inner) if matches!(inner.as_ref(), AST::IfElse(_, _, e) if e.len() == 1)
                ));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn method_call_keeps_receiver() {
        let stmts = program("game.rect(1, 2, 3, 4);");
        assert!(matches!(
            &stmts[0],
            AST::Expression(e) if matches!(e.as_ref(), AST::MethodCall { name, args, .. } if name == "rect" && args.len() == 4)
        ));
    }

    #[test]
    fn slices_and_counting_loops_parse() {
        let stmts = program("for (let i = 0; i < 5; i++) { }\nfor (let b of bullets[:]) { }");
        assert!(matches!(&stmts[0], AST::ForCount { .. }));
        assert!(matches!(
            &stmts[1],
            AST::ForOf { iterable, .. } if matches!(iterable.as_ref(), AST::Slice(_, None, None))
        ));
    }

    #[test]
    fn extra_closing_brace_reports_its_line() {
        let err = parse(tokenize("let a = 1;\n}\n").expect("tokenize")).unwrap_err();
        assert_eq!(err, Fault::syntax(2, "Unexpected token '}'"));
    }

    #[test]
    fn assignment_to_call_is_rejected() {
        let err = parse(tokenize("f() = 3;").expect("tokenize")).unwrap_err();
        assert!(err.to_string().contains("Invalid left-hand side"));
    }

    #[test]
    fn bare_return_stops_at_line_end() {
        let stmts = program("function f() {\n return\n}");
        assert!(matches!(
            &stmts[0],
            AST::FuncDef { body, .. } if matches!(&body[0], AST::Located(_, r) if matches!(r.as_ref(), AST::Return(None)))
        ));
    }
}
