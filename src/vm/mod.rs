pub mod builtins;
pub mod call;
pub mod debug;
pub mod env;
pub mod exec;
pub mod runtime;

use crate::capability::CapabilityBindings;
use crate::compiler::CompiledUnit;
use crate::grammar::{Capability, Instruction, Native, Value};
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) struct CallFrame {
    code: Rc<Vec<Instruction>>,
    labels: Rc<HashMap<String, usize>>,
    pointer: usize,
    local_env: Option<HashMap<String, Value>>,
    line: usize,
    stack_base: usize,
}

pub struct VM<'a> {
    // Operand stack
    stack: Vec<Value>,

    // Top-level bindings; they outlive the run for frame callbacks
    globals: HashMap<String, Value>,

    // Function scope, `None` at top level
    local_env: Option<HashMap<String, Value>>,

    // Bytecode execution state
    pointer: usize,
    code: Rc<Vec<Instruction>>,
    labels: Rc<HashMap<String, usize>>,
    call_stack: Vec<CallFrame>,
    max_call_depth: usize,

    // Last `Line` marker executed, attached to faults
    line: usize,

    caps: CapabilityBindings<'a>,
}

impl<'a> VM<'a> {
    pub fn new(
        unit: &CompiledUnit,
        globals: HashMap<String, Value>,
        caps: CapabilityBindings<'a>,
        max_call_depth: usize,
    ) -> Self {
        let mut vm = Self {
            stack: Vec::new(),
            globals,
            local_env: None,
            pointer: 0,
            code: Rc::clone(&unit.code),
            labels: Rc::clone(&unit.labels),
            call_stack: Vec::new(),
            max_call_depth,
            line: 0,
            caps,
        };
        vm.bind_capabilities();
        vm
    }

    /// A VM with no top-level code, used to invoke frame callbacks against
    /// the globals a previous run left behind.
    pub fn with_globals(
        globals: HashMap<String, Value>,
        caps: CapabilityBindings<'a>,
        max_call_depth: usize,
    ) -> Self {
        let empty = CompiledUnit {
            code: Rc::new(Vec::new()),
            labels: Rc::new(HashMap::new()),
        };
        Self::new(&empty, globals, caps, max_call_depth)
    }

    fn bind_capabilities(&mut self) {
        self.globals
            .insert("print".to_string(), Value::Native(Native::Print));
        self.globals
            .insert("random".to_string(), Value::Capability(Capability::Random));
        self.globals
            .insert("game".to_string(), Value::Capability(Capability::Runtime));
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub fn into_globals(self) -> HashMap<String, Value> {
        self.globals
    }
}

pub fn build_labels(code: &[Instruction]) -> HashMap<String, usize> {
    let mut labels = HashMap::new();
    for (i, instr) in code.iter().enumerate() {
        if let Instruction::Label(name) = instr {
            labels.insert(name.clone(), i);
        }
    }
    labels
}
