use crate::error::Fault;
use crate::grammar::{AST, FunctionProto, Instruction, Operator, TemplateSegment};
use crate::parser::parse;
use crate::tokenizer::tokenize;
use crate::vm::build_labels;
use std::collections::HashMap;
use std::rc::Rc;

/// Jump targets of the innermost enclosing loop.
struct LoopLabels {
    break_to: String,
    continue_to: String,
}

/// Per-body compilation state: one per program and one per function.
pub struct CompileContext {
    labels: LabelGenerator,
    loops: Vec<LoopLabels>,
    line: usize,
}

impl CompileContext {
    pub fn new() -> Self {
        Self {
            labels: LabelGenerator::new(),
            loops: Vec::new(),
            line: 0,
        }
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A native program ready for the VM.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub code: Rc<Vec<Instruction>>,
    pub labels: Rc<HashMap<String, usize>>,
}

impl CompiledUnit {
    /// Tokenizes, parses and compiles native program text.
    pub fn from_native(text: &str) -> Result<Self, Fault> {
        let ast = parse(tokenize(text)?)?;
        let mut code = Vec::new();
        compile(ast, &mut code, &mut CompileContext::new())?;
        let labels = build_labels(&code);
        Ok(Self {
            code: Rc::new(code),
            labels: Rc::new(labels),
        })
    }
}

pub fn compile(ast: AST, code: &mut Vec<Instruction>, ctx: &mut CompileContext) -> Result<(), Fault> {
    match ast {
        // ---------- literals ----------
        AST::Number(n) => code.push(Instruction::PushNumber(n)),
        AST::Str(s) => code.push(Instruction::PushStr(Rc::from(s.as_str()))),
        AST::Bool(b) => code.push(Instruction::PushBool(b)),
        AST::Null => code.push(Instruction::PushNull),
        AST::Var(name) => code.push(Instruction::Load(name)),

        AST::Template(segments) => {
            let count = segments.len();
            for segment in segments {
                match segment {
                    TemplateSegment::Text(text) => {
                        code.push(Instruction::PushStr(Rc::from(text.as_str())))
                    }
                    TemplateSegment::Expr(expr) => compile(expr, code, ctx)?,
                }
            }
            code.push(Instruction::Concat(count));
        }

        AST::List(items) => {
            let count = items.len();
            for item in items {
                compile(item, code, ctx)?;
            }
            code.push(Instruction::BuildList(count));
        }

        AST::Map(entries) => {
            let mut keys = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                compile(value, code, ctx)?;
                keys.push(key);
            }
            code.push(Instruction::BuildMap(keys));
        }

        // ---------- expressions ----------
        AST::Operation(l, Operator::And, r) => {
            let end = ctx.labels.fresh("and_end");
            compile(*l, code, ctx)?;
            code.push(Instruction::Dup);
            code.push(Instruction::JumpIfFalse(end.clone()));
            code.push(Instruction::Pop);
            compile(*r, code, ctx)?;
            code.push(Instruction::Label(end));
        }

        AST::Operation(l, Operator::Or, r) => {
            let end = ctx.labels.fresh("or_end");
            compile(*l, code, ctx)?;
            code.push(Instruction::Dup);
            code.push(Instruction::JumpIfTrue(end.clone()));
            code.push(Instruction::Pop);
            compile(*r, code, ctx)?;
            code.push(Instruction::Label(end));
        }

        AST::Operation(l, op, r) => {
            compile(*l, code, ctx)?;
            compile(*r, code, ctx)?;
            emit_operator(op, code);
        }

        AST::Not(e) => {
            compile(*e, code, ctx)?;
            code.push(Instruction::Not);
        }

        AST::Negate(e) => {
            compile(*e, code, ctx)?;
            code.push(Instruction::Negate);
        }

        AST::Index(base, index) => {
            compile(*base, code, ctx)?;
            compile(*index, code, ctx)?;
            code.push(Instruction::Index);
        }

        AST::Slice(base, start, end) => {
            compile(*base, code, ctx)?;
            let has_start = start.is_some();
            let has_end = end.is_some();
            if let Some(start) = start {
                compile(*start, code, ctx)?;
            }
            if let Some(end) = end {
                compile(*end, code, ctx)?;
            }
            code.push(Instruction::Slice {
                start: has_start,
                end: has_end,
            });
        }

        AST::FieldAccess(base, field) => {
            compile(*base, code, ctx)?;
            code.push(Instruction::FieldGet(field));
        }

        AST::Call { callee, args } => {
            let argc = args.len();
            compile(*callee, code, ctx)?;
            for a in args {
                compile(a, code, ctx)?;
            }
            code.push(Instruction::Call(argc));
        }

        AST::MethodCall {
            receiver,
            name,
            args,
        } => {
            let argc = args.len();
            compile(*receiver, code, ctx)?;
            for a in args {
                compile(a, code, ctx)?;
            }
            code.push(Instruction::CallMethod(name, argc));
        }

        // ---------- assignments ----------
        AST::Let(name, value) => {
            compile(*value, code, ctx)?;
            code.push(Instruction::Declare(name));
        }

        AST::Assign(target, value) => match *target {
            AST::Var(name) => {
                compile(*value, code, ctx)?;
                code.push(Instruction::Store(name));
            }
            AST::Index(base, key) => {
                compile(*base, code, ctx)?;
                compile(*key, code, ctx)?;
                compile(*value, code, ctx)?;
                code.push(Instruction::StoreIndex);
            }
            AST::FieldAccess(base, field) => {
                compile(*base, code, ctx)?;
                compile(*value, code, ctx)?;
                code.push(Instruction::FieldSet(field));
            }
            _ => return Err(invalid_target(ctx)),
        },

        AST::CompoundAssign(target, op, value) => match *target {
            AST::Var(name) => {
                code.push(Instruction::Load(name.clone()));
                compile(*value, code, ctx)?;
                emit_operator(op, code);
                code.push(Instruction::Store(name));
            }
            AST::Index(base, key) => {
                compile(*base, code, ctx)?;
                compile(*key, code, ctx)?;
                code.push(Instruction::Dup2);
                code.push(Instruction::Index);
                compile(*value, code, ctx)?;
                emit_operator(op, code);
                code.push(Instruction::StoreIndex);
            }
            AST::FieldAccess(base, field) => {
                compile(*base, code, ctx)?;
                code.push(Instruction::Dup);
                code.push(Instruction::FieldGet(field.clone()));
                compile(*value, code, ctx)?;
                emit_operator(op, code);
                code.push(Instruction::FieldSet(field));
            }
            _ => return Err(invalid_target(ctx)),
        },

        // ---------- control ----------
        AST::IfElse(cond, then_block, else_block) => {
            compile(*cond, code, ctx)?;

            let else_lbl = ctx.labels.fresh("else");
            let end_lbl = ctx.labels.fresh("ifend");

            code.push(Instruction::JumpIfFalse(else_lbl.clone()));
            compile_block(then_block, code, ctx)?;
            code.push(Instruction::Jump(end_lbl.clone()));

            code.push(Instruction::Label(else_lbl));
            compile_block(else_block, code, ctx)?;

            code.push(Instruction::Label(end_lbl));
        }

        AST::While(cond, body) => {
            let start = ctx.labels.fresh("while_start");
            let end = ctx.labels.fresh("while_end");

            code.push(Instruction::Label(start.clone()));
            compile(*cond, code, ctx)?;
            code.push(Instruction::JumpIfFalse(end.clone()));

            compile_loop_body(body, code, ctx, &end, &start)?;

            code.push(Instruction::Jump(start));
            code.push(Instruction::Label(end));
        }

        AST::ForCount {
            init,
            cond,
            update,
            body,
        } => {
            let start = ctx.labels.fresh("for_start");
            let next = ctx.labels.fresh("for_next");
            let end = ctx.labels.fresh("for_end");

            compile(*init, code, ctx)?;
            code.push(Instruction::Label(start.clone()));
            compile(*cond, code, ctx)?;
            code.push(Instruction::JumpIfFalse(end.clone()));

            compile_loop_body(body, code, ctx, &end, &next)?;

            code.push(Instruction::Label(next));
            compile(*update, code, ctx)?;
            code.push(Instruction::Jump(start));
            code.push(Instruction::Label(end));
        }

        AST::ForOf {
            var,
            iterable,
            body,
        } => {
            let start = ctx.labels.fresh("of_start");
            let broken = ctx.labels.fresh("of_break");
            let exhausted = ctx.labels.fresh("of_end");

            compile(*iterable, code, ctx)?;
            code.push(Instruction::IterStart);
            code.push(Instruction::Label(start.clone()));
            code.push(Instruction::IterNext(exhausted.clone()));
            code.push(Instruction::Declare(var));

            compile_loop_body(body, code, ctx, &broken, &start)?;

            code.push(Instruction::Jump(start));
            // `break` leaves the iterator on the stack
            code.push(Instruction::Label(broken));
            code.push(Instruction::Pop);
            code.push(Instruction::Label(exhausted));
        }

        AST::Break => {
            let target = ctx
                .loops
                .last()
                .map(|l| l.break_to.clone())
                .ok_or_else(|| Fault::syntax(ctx.line, "Illegal break statement"))?;
            code.push(Instruction::Jump(target));
        }

        AST::Continue => {
            let target = ctx
                .loops
                .last()
                .map(|l| l.continue_to.clone())
                .ok_or_else(|| {
                    Fault::syntax(
                        ctx.line,
                        "Illegal continue statement: no surrounding iteration statement",
                    )
                })?;
            code.push(Instruction::Jump(target));
        }

        AST::Return(expr) => {
            if let Some(e) = expr {
                compile(*e, code, ctx)?;
            } else {
                code.push(Instruction::PushNull);
            }
            code.push(Instruction::Return);
        }

        // ---------- definitions ----------
        AST::FuncDef { name, params, body } => {
            let proto = compile_function(name.clone(), params, body)?;
            code.push(Instruction::StoreFunction(Rc::new(proto)));
            code.push(Instruction::Declare(name));
        }

        AST::Expression(e) => {
            compile(*e, code, ctx)?;
            code.push(Instruction::Pop);
        }

        AST::Located(line, stmt) => {
            ctx.line = line;
            code.push(Instruction::Line(line));
            compile(*stmt, code, ctx)?;
        }

        AST::Program(stmts) => compile_block(stmts, code, ctx)?,
    }
    Ok(())
}

fn is_function_def(stmt: &AST) -> bool {
    match stmt {
        AST::FuncDef { .. } => true,
        AST::Located(_, inner) => is_function_def(inner),
        _ => false,
    }
}

/// Compiles a statement list with its function declarations hoisted.
fn compile_block(stmts: Vec<AST>, code: &mut Vec<Instruction>, ctx: &mut CompileContext) -> Result<(), Fault> {
    let (functions, rest): (Vec<AST>, Vec<AST>) = stmts.into_iter().partition(is_function_def);
    for s in functions.into_iter().chain(rest) {
        compile(s, code, ctx)?;
    }
    Ok(())
}

fn compile_loop_body(
    body: Vec<AST>,
    code: &mut Vec<Instruction>,
    ctx: &mut CompileContext,
    break_to: &str,
    continue_to: &str,
) -> Result<(), Fault> {
    ctx.loops.push(LoopLabels {
        break_to: break_to.to_string(),
        continue_to: continue_to.to_string(),
    });
    let result = compile_block(body, code, ctx);
    ctx.loops.pop();
    result
}

fn compile_function(name: String, params: Vec<String>, body: Vec<AST>) -> Result<FunctionProto, Fault> {
    let mut code = Vec::new();
    let mut ctx = CompileContext::new();

    compile_block(body, &mut code, &mut ctx)?;

    code.push(Instruction::PushNull);
    code.push(Instruction::Return);

    let labels = build_labels(&code);
    Ok(FunctionProto {
        name,
        params,
        code: Rc::new(code),
        labels: Rc::new(labels),
    })
}

fn invalid_target(ctx: &CompileContext) -> Fault {
    Fault::syntax(ctx.line, "Invalid left-hand side in assignment")
}

fn emit_operator(op: Operator, code: &mut Vec<Instruction>) {
    use Operator::*;
    match op {
        Addition => code.push(Instruction::Add),
        Subtraction => code.push(Instruction::Sub),
        Multiplication => code.push(Instruction::Mul),
        Division => code.push(Instruction::Div),
        FloorDivision => code.push(Instruction::FloorDiv),
        Modulo => code.push(Instruction::Modulo),
        Power => code.push(Instruction::Pow),
        Greater => code.push(Instruction::Greater),
        Less => code.push(Instruction::Less),
        Equal => code.push(Instruction::Equal),
        NotEqual => code.push(Instruction::NotEqual),
        GreaterEqual => code.push(Instruction::GreaterEqual),
        LessEqual => code.push(Instruction::LessEqual),
        In => code.push(Instruction::In),
        // short-circuit forms are compiled to jumps above
        And | Or => {}
    }
}

pub struct LabelGenerator {
    counter: usize,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    pub fn fresh(&mut self, prefix: &str) -> String {
        let s = format!("{prefix}_{}", self.counter);
        self.counter += 1;
        s
    }
}

impl Default for LabelGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(src: &str) -> Vec<Instruction> {
        CompiledUnit::from_native(src)
            .expect("compile")
            .code
            .iter()
            .filter(|i| !matches!(i, Instruction::Line(_)))
            .cloned()
            .collect()
    }

    #[test]
    fn functions_are_hoisted_above_statements() {
        let code = ops("let a = f();\nfunction f() { return 1; }");
        assert!(matches!(code[0], Instruction::StoreFunction(_)));
        assert!(matches!(&code[1], Instruction::Declare(n) if n == "f"));
    }

    #[test]
    fn break_outside_loop_is_a_syntax_fault() {
        let err = CompiledUnit::from_native("let a = 1;\nbreak;").unwrap_err();
        assert_eq!(err, Fault::syntax(2, "Illegal break statement"));
    }

    #[test]
    fn labels_point_at_their_instruction() {
        let unit = CompiledUnit::from_native("while (x) { x = x - 1; }").expect("compile");
        for (name, &at) in unit.labels.iter() {
            assert!(matches!(&unit.code[at], Instruction::Label(l) if l == name));
        }
    }

    #[test]
    fn compound_index_assignment_reads_then_stores() {
        let code = ops("p[\"x\"] += 2;");
        let tail: Vec<_> = code
            .iter()
            .skip(2)
            .map(|i| format!("{i:?}"))
            .collect();
        assert_eq!(
            tail,
            vec!["Dup2", "Index", "PushNumber(2.0)", "Add", "StoreIndex"]
        );
    }

    #[test]
    fn function_body_returns_null_by_default() {
        let code = ops("function f() { }");
        match &code[0] {
            Instruction::StoreFunction(proto) => {
                assert!(matches!(
                    proto.code.as_slice(),
                    [Instruction::PushNull, Instruction::Return]
                ));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }
}
