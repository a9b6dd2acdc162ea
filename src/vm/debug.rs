use super::VM;
use crate::grammar::Value;
use log::{Level, log_enabled, trace};

impl VM<'_> {
    // =========================================================
    // Debug helpers
    // =========================================================

    pub(crate) fn dbg_short_value(&self, v: &Value) -> String {
        match v {
            Value::Number(n) => format!("Num({n})"),
            Value::Str(s) => format!("Str({s:?})"),
            Value::Bool(b) => format!("Bool({b})"),
            Value::Null => "Null".to_string(),
            Value::List(items) => format!("List(len={})", items.borrow().len()),
            Value::Map(entries) => format!("Map(keys={:?})", entries.borrow().keys()),
            Value::Function(proto) => format!("Function({}/{})", proto.name, proto.params.len()),
            Value::Native(native) => format!("Native({native:?})"),
            Value::Capability(cap) => format!("Capability({cap:?})"),
            Value::Iterator(_) => "Iterator".to_string(),
        }
    }

    pub(crate) fn dump_global_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.globals.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn dump_stack(&self) -> Vec<String> {
        self.stack.iter().map(|v| self.dbg_short_value(v)).collect()
    }

    pub(crate) fn dbg_dump_state(&self, headline: &str) {
        if !log_enabled!(Level::Trace) {
            return;
        }

        trace!("================ VM STATE ================");
        trace!("{headline}");
        trace!(
            "ip={} line={} instr={:?}",
            self.pointer,
            self.line,
            self.code.get(self.pointer)
        );
        trace!("stack(len={}): {:?}", self.stack.len(), self.dump_stack());
        trace!("globals: {:?}", self.dump_global_keys());
        trace!("call depth: {}", self.call_depth());

        if let Some(env) = &self.local_env {
            let mut keys: Vec<_> = env.keys().cloned().collect();
            keys.sort();
            trace!("  locals={keys:?}");
        }
        trace!("==========================================");
    }
}
