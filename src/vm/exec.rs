use super::VM;
use super::runtime::{
    arithmetic, build_iterator, compare, contains, display, index_value, slice_value,
    store_index,
};
use crate::error::Fault;
use crate::grammar::{Instruction, IterState, Value};
use indexmap::IndexMap;
use log::trace;
use std::cmp::Ordering;
use std::rc::Rc;

/// How the run loop continues after one instruction.
enum Flow {
    Next,
    Jumped,
    Return,
}

impl VM<'_> {
    /// Runs the top-level program.
    pub fn execute(&mut self) -> Result<(), Fault> {
        self.pointer = 0;
        let result = self.run();
        if let Err(fault) = &result {
            self.dbg_dump_state(&format!("fault: {fault}"));
        }
        result
    }

    /// Executes the current code until it ends or returns. A `Return`
    /// leaves the return value on top of the stack.
    pub(crate) fn run(&mut self) -> Result<(), Fault> {
        while self.pointer < self.code.len() {
            let code = Rc::clone(&self.code);
            let instr = &code[self.pointer];

            match self.step(instr) {
                Ok(Flow::Next) => self.pointer += 1,
                Ok(Flow::Jumped) => {}
                Ok(Flow::Return) => return Ok(()),
                Err(fault) => return Err(fault.at_line(self.line)),
            }
        }
        Ok(())
    }

    fn step(&mut self, instr: &Instruction) -> Result<Flow, Fault> {
        match instr {
            Instruction::PushNumber(n) => self.stack.push(Value::Number(*n)),
            Instruction::PushStr(s) => self.stack.push(Value::Str(Rc::clone(s))),
            Instruction::PushBool(b) => self.stack.push(Value::Bool(*b)),
            Instruction::PushNull => self.stack.push(Value::Null),

            Instruction::Load(name) => {
                let v = self.lookup_var(name)?;
                self.stack.push(v);
            }
            Instruction::Declare(name) => {
                let v = self.pop()?;
                self.declare_var(name, v);
            }
            Instruction::Store(name) => {
                let v = self.pop()?;
                self.store_var(name, v);
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Dup => {
                let v = self.peek()?.clone();
                self.stack.push(v);
            }
            Instruction::Dup2 => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.extend([a.clone(), b.clone(), a, b]);
            }

            Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::FloorDiv
            | Instruction::Modulo
            | Instruction::Pow => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(arithmetic(instr, a, b)?);
            }
            Instruction::Greater => self.exec_cmp(|o| o == Ordering::Greater)?,
            Instruction::Less => self.exec_cmp(|o| o == Ordering::Less)?,
            Instruction::GreaterEqual => self.exec_cmp(|o| o != Ordering::Less)?,
            Instruction::LessEqual => self.exec_cmp(|o| o != Ordering::Greater)?,
            Instruction::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a == b));
            }
            Instruction::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a != b));
            }
            Instruction::In => {
                let haystack = self.pop()?;
                let needle = self.pop()?;
                self.stack.push(Value::Bool(contains(&haystack, &needle)?));
            }
            Instruction::Not => {
                let v = self.pop()?;
                self.stack.push(Value::Bool(!v.is_truthy()));
            }
            Instruction::Negate => {
                let v = self.pop()?;
                self.stack.push(Value::Number(-super::runtime::to_number(&v)));
            }

            Instruction::BuildList(n) => {
                let items = self.pop_args(*n)?;
                self.stack.push(Value::list(items));
            }
            Instruction::BuildMap(keys) => {
                let values = self.pop_args(keys.len())?;
                let entries: IndexMap<String, Value> = keys.iter().cloned().zip(values).collect();
                self.stack.push(Value::map(entries));
            }
            Instruction::Concat(n) => {
                let parts = self.pop_args(*n)?;
                let text: String = parts.iter().map(display).collect();
                self.stack.push(Value::str(text));
            }
            Instruction::Index => {
                let key = self.pop()?;
                let target = self.pop()?;
                self.stack.push(index_value(&target, &key)?);
            }
            Instruction::StoreIndex => {
                let value = self.pop()?;
                let key = self.pop()?;
                let target = self.pop()?;
                store_index(&target, &key, value)?;
            }
            Instruction::Slice { start, end } => {
                let end = if *end { self.pop()? } else { Value::Null };
                let start = if *start { self.pop()? } else { Value::Null };
                let target = self.pop()?;
                self.stack.push(slice_value(&target, &start, &end)?);
            }
            Instruction::FieldGet(field) => {
                let target = self.pop()?;
                let v = self.field_get(&target, field)?;
                self.stack.push(v);
            }
            Instruction::FieldSet(field) => {
                let value = self.pop()?;
                let target = self.pop()?;
                self.field_set(&target, field, value)?;
            }

            Instruction::Call(argc) => {
                let args = self.pop_args(*argc)?;
                let callee = self.pop()?;
                let ret = self.call_value(callee, args)?;
                self.stack.push(ret);
            }
            Instruction::CallMethod(name, argc) => {
                let args = self.pop_args(*argc)?;
                let receiver = self.pop()?;
                let ret = self.call_method(receiver, name, args)?;
                self.stack.push(ret);
            }
            Instruction::StoreFunction(proto) => {
                self.stack.push(Value::Function(Rc::clone(proto)));
            }
            Instruction::Return => return Ok(Flow::Return),

            Instruction::Label(_) => {}
            Instruction::Jump(label) => {
                self.pointer = self.label(label)?;
                return Ok(Flow::Jumped);
            }
            Instruction::JumpIfFalse(label) => {
                if !self.pop()?.is_truthy() {
                    self.pointer = self.label(label)?;
                    return Ok(Flow::Jumped);
                }
            }
            Instruction::JumpIfTrue(label) => {
                if self.pop()?.is_truthy() {
                    self.pointer = self.label(label)?;
                    return Ok(Flow::Jumped);
                }
            }
            Instruction::IterStart => {
                let iterable = self.pop()?;
                self.stack.push(build_iterator(iterable)?);
            }
            Instruction::IterNext(label) => {
                let next = match self.peek()? {
                    Value::Iterator(state) => advance(&mut state.borrow_mut()),
                    other => {
                        return Err(Fault::type_error(format!(
                            "{} is not an iterator",
                            other.type_name()
                        )));
                    }
                };
                match next {
                    Some(item) => self.stack.push(item),
                    None => {
                        self.pop()?;
                        self.pointer = self.label(label)?;
                        return Ok(Flow::Jumped);
                    }
                }
            }
            Instruction::Line(line) => {
                self.line = *line;
                trace!("line {line}, stack depth {}", self.stack.len());
            }
        }
        Ok(Flow::Next)
    }

    fn label(&self, label: &str) -> Result<usize, Fault> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| Fault::error(format!("internal error: unknown label `{label}`")))
    }

    fn exec_cmp(&mut self, test: impl FnOnce(Ordering) -> bool) -> Result<(), Fault> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = compare(&a, &b).map(test).unwrap_or(false);
        self.stack.push(Value::Bool(result));
        Ok(())
    }
}

/// Next element of a live list iterator or a snapshot.
fn advance(state: &mut IterState) -> Option<Value> {
    match state {
        IterState::Live { list, pos } => {
            let item = list.borrow().get(*pos).cloned();
            *pos += 1;
            item
        }
        IterState::Snapshot { items, pos } => {
            let item = items.get(*pos).cloned();
            *pos += 1;
            item
        }
    }
}
