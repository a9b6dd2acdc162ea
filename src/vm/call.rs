use super::{CallFrame, VM};
use crate::error::Fault;
use crate::grammar::{FunctionProto, Instruction, Value};
use std::collections::HashMap;
use std::rc::Rc;

impl VM<'_> {
    /// Calls any callable guest value.
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, Fault> {
        match callee {
            Value::Function(proto) => self.call_function(proto, args),
            Value::Native(native) => self.call_native(native, args),
            other => Err(Fault::type_error(format!(
                "{} is not a function",
                super::runtime::describe(&other)
            ))),
        }
    }

    // =========================================================
    // Function execution
    // =========================================================
    fn call_function(&mut self, proto: Rc<FunctionProto>, args: Vec<Value>) -> Result<Value, Fault> {
        if self.call_stack.len() >= self.max_call_depth {
            return Err(Fault::range("Maximum call stack size exceeded"));
        }

        let mut env = HashMap::with_capacity(proto.params.len());
        let mut args = args.into_iter();
        for param in &proto.params {
            env.insert(param.clone(), args.next().unwrap_or(Value::Null));
        }

        self.push_frame(Rc::clone(&proto.code), Rc::clone(&proto.labels), Some(env));
        let result = self.run();
        let ret = self.pop_frame();

        result.map(|()| ret)
    }

    fn push_frame(
        &mut self,
        code: Rc<Vec<Instruction>>,
        labels: Rc<HashMap<String, usize>>,
        local_env: Option<HashMap<String, Value>>,
    ) {
        let frame = CallFrame {
            code: std::mem::replace(&mut self.code, code),
            labels: std::mem::replace(&mut self.labels, labels),
            pointer: self.pointer,

            local_env: std::mem::replace(&mut self.local_env, local_env),
            line: self.line,

            stack_base: self.stack.len(),
        };

        self.pointer = 0;
        self.call_stack.push(frame);
    }

    /// Restores the caller and returns the callee's return value. Anything
    /// the callee left on the stack is discarded, so this also unwinds a
    /// frame that faulted.
    fn pop_frame(&mut self) -> Value {
        let Some(frame) = self.call_stack.pop() else {
            return Value::Null;
        };

        let ret = if self.stack.len() > frame.stack_base {
            self.stack.pop().unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        self.stack.truncate(frame.stack_base);

        self.code = frame.code;
        self.labels = frame.labels;
        self.pointer = frame.pointer;
        self.local_env = frame.local_env;
        self.line = frame.line;

        ret
    }

    pub(crate) fn call_depth(&self) -> usize {
        self.call_stack.len()
    }
}
