use super::VM;
use crate::error::Fault;
use crate::grammar::{Native, Value};

impl VM<'_> {
    pub(crate) fn lookup_var(&self, name: &str) -> Result<Value, Fault> {
        self.local_env
            .as_ref()
            .and_then(|e| e.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
            .or_else(|| host_native(name))
            .ok_or_else(|| Fault::reference(format!("{name} is not defined")))
    }

    /// `let`: binds in the current function scope, or globally at top level.
    pub(crate) fn declare_var(&mut self, name: &str, value: Value) {
        match &mut self.local_env {
            Some(env) => {
                env.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Plain assignment: updates the nearest existing binding, otherwise
    /// creates one in the current scope.
    pub(crate) fn store_var(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.local_env.as_mut().and_then(|e| e.get_mut(name)) {
            *slot = value;
            return;
        }
        if let Some(slot) = self.globals.get_mut(name) {
            *slot = value;
            return;
        }
        self.declare_var(name, value);
    }
}

fn host_native(name: &str) -> Option<Value> {
    let native = match name {
        "String" => Native::StringOf,
        "parseInt" => Native::ParseInt,
        "parseFloat" => Native::ParseFloat,
        _ => return None,
    };
    Some(Value::Native(native))
}
