// Native program grammar (the translator's output language)

// program        ::= statement*

// statement      ::= "let" identifier "=" expression ";"?
//                  | target "=" expression ";"?
//                  | target ("+=" | "-=" | "*=" | "/=" | "%=") expression ";"?
//                  | identifier ("++" | "--") ";"?
//                  | if_statement
//                  | "while" "(" expression ")" block
//                  | "for" "(" "let" identifier "of" expression ")" block
//                  | "for" "(" statement ";" expression ";" statement ")" block
//                  | "function" identifier "(" params? ")" block
//                  | "return" expression? ";"?
//                  | "break" ";"? | "continue" ";"?
//                  | expression ";"?

// if_statement   ::= "if" "(" expression ")" block ("else" (if_statement | block))?

// block          ::= "{" statement* "}"

// target         ::= identifier | postfix "[" expression "]" | postfix "." identifier

// expression     ::= or_expr

// or_expr        ::= and_expr ("||" and_expr)*

// and_expr       ::= comparison ("&&" comparison)*

// comparison     ::= additive (("==" | "!=" | ">" | "<" | ">=" | "<=" | "in") additive)*

// additive       ::= multiplicative (("+" | "-") multiplicative)*

// multiplicative ::= unary (("*" | "/" | "//" | "%") unary)*

// unary          ::= ("!" | "-") unary | postfix

// postfix        ::= factor ("(" args? ")" | "." identifier | "[" expression "]" | "[" expression? ":" expression? "]")*

// factor         ::= number | string | template | "true" | "false" | "null"
//                  | identifier
//                  | "(" ")" | "(" expression ")" | "(" expression ("," expression)+ ","? ")"
//                  | "[" (expression ("," expression)* ","?)? "]"
//                  | "{" (key ":" expression ("," key ":" expression)* ","?)? "}"

// comment        ::= "//" .* (only as the first thing on a line)

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),

    Let,
    If,
    Else,
    While,
    For,
    Of,
    In,
    Function,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,

    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Modulo,
    Power,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
    Increment,
    Decrement,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    And,
    Or,
    Not,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LSquare,
    RSquare,
    Comma,
    Dot,
    Colon,
    Semicolon,
}

/// Raw piece of a template literal; interpolations are parsed later.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    Expr(AST),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AST {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Template(Vec<TemplateSegment>),
    Var(String),
    List(Vec<AST>),
    Map(Vec<(String, AST)>),

    Operation(Box<AST>, Operator, Box<AST>),
    Not(Box<AST>),
    Negate(Box<AST>),
    Index(Box<AST>, Box<AST>),
    Slice(Box<AST>, Option<Box<AST>>, Option<Box<AST>>),
    FieldAccess(Box<AST>, String),
    Call {
        callee: Box<AST>,
        args: Vec<AST>,
    },
    MethodCall {
        receiver: Box<AST>,
        name: String,
        args: Vec<AST>,
    },

    Let(String, Box<AST>),
    Assign(Box<AST>, Box<AST>),
    CompoundAssign(Box<AST>, Operator, Box<AST>),
    IfElse(Box<AST>, Vec<AST>, Vec<AST>),
    While(Box<AST>, Vec<AST>),
    ForOf {
        var: String,
        iterable: Box<AST>,
        body: Vec<AST>,
    },
    ForCount {
        init: Box<AST>,
        cond: Box<AST>,
        update: Box<AST>,
        body: Vec<AST>,
    },
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Vec<AST>,
    },
    Return(Option<Box<AST>>),
    Break,
    Continue,
    Expression(Box<AST>),
    Located(usize, Box<AST>),
    Program(Vec<AST>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    FloorDivision,
    Modulo,
    Power,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
    In,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    PushNumber(f64),
    PushStr(Rc<str>),
    PushBool(bool),
    PushNull,
    Load(String),
    Declare(String),
    Store(String),
    Pop,
    Dup,
    Dup2,

    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Modulo,
    Pow,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
    In,
    Not,
    Negate,

    BuildList(usize),
    BuildMap(Vec<String>),
    Concat(usize),
    Index,      // pops key and target, pushes element
    StoreIndex, // pops value, key and target
    Slice { start: bool, end: bool },
    FieldGet(String),
    FieldSet(String), // pops value and target

    Call(usize),               // callee below its arguments
    CallMethod(String, usize), // receiver below its arguments
    StoreFunction(Rc<FunctionProto>),
    Return,

    Label(String),
    Jump(String),
    JumpIfFalse(String),
    JumpIfTrue(String),
    IterStart,
    IterNext(String), // jumps (and drops the iterator) once exhausted
    Line(usize),
}

#[derive(Debug)]
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<String>,
    pub code: Rc<Vec<Instruction>>,
    pub labels: Rc<HashMap<String, usize>>,
}

/// Host natives reachable by name from translated code.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    Print,
    StringOf,
    ParseInt,
    ParseFloat,
    Bound(Capability, Rc<str>),
}

/// Capability handles injected into every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Random,
    Runtime,
}

#[derive(Debug)]
pub enum IterState {
    Live {
        list: Rc<RefCell<Vec<Value>>>,
        pos: usize,
    },
    Snapshot {
        items: Vec<Value>,
        pos: usize,
    },
}

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Runtime value of a guest program.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    List(ListRef),
    Map(MapRef),
    Function(Rc<FunctionProto>),
    Native(Native),
    Capability(Capability),
    Iterator(Rc<RefCell<IterState>>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Capability(_) => "module",
            Value::Iterator(_) => "iterator",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        structural_eq(self, other, &mut Vec::new())
    }
}

/// `==` on values. Lists and maps compare by contents; a pair of containers
/// already under comparison further up counts as equal, so cycles terminate.
fn structural_eq(a: &Value, b: &Value, pairs: &mut Vec<(*const (), *const ())>) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let pair = (Rc::as_ptr(x) as *const (), Rc::as_ptr(y) as *const ());
            if pairs.contains(&pair) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return false;
            }
            pairs.push(pair);
            let same = x.iter().zip(y.iter()).all(|(a, b)| structural_eq(a, b, pairs));
            pairs.pop();
            same
        }
        (Value::Map(x), Value::Map(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let pair = (Rc::as_ptr(x) as *const (), Rc::as_ptr(y) as *const ());
            if pairs.contains(&pair) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return false;
            }
            pairs.push(pair);
            let same = x
                .iter()
                .all(|(k, a)| y.get(k).is_some_and(|b| structural_eq(a, b, pairs)));
            pairs.pop();
            same
        }
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => a == b,
        (Value::Capability(a), Value::Capability(b)) => a == b,
        (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
