//! Attributes call sites to the function whose body contains them.

use crate::model::SymbolModel;
use crate::parser::ast::CallSite;

pub struct CallCollector {
    enabled: bool,
    current: Option<String>,
}

impl CallCollector {
    pub fn new(enabled: bool) -> Self {
        CallCollector {
            enabled,
            current: None,
        }
    }

    /// Make `function` the enclosing context, returning the one it replaces.
    /// `None` stops attribution, e.g. inside a function that was filtered out.
    pub fn enter(&mut self, function: Option<&str>) -> Option<String> {
        std::mem::replace(&mut self.current, function.map(str::to_string))
    }

    pub fn leave(&mut self, previous: Option<String>) {
        self.current = previous;
    }

    pub fn record(&self, call: &CallSite, model: &mut SymbolModel) {
        if !self.enabled {
            return;
        }
        if let (Some(function), Some(callee)) = (&self.current, &call.callee) {
            model.push_call(function, callee);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Docs, FunctionClass, FunctionRecord};

    fn model_with(names: &[&str]) -> SymbolModel {
        let mut model = SymbolModel::new();
        for name in names {
            model.upsert_function(
                name,
                FunctionRecord {
                    class: FunctionClass::Normal,
                    returns: "void".into(),
                    args: Vec::new(),
                    calls: Vec::new(),
                    docs: Docs::default(),
                },
            );
        }
        model
    }

    #[test]
    fn nested_contexts_restore() {
        let mut model = model_with(&["outer", "inner"]);
        let mut calls = CallCollector::new(true);

        let top = calls.enter(Some("outer"));
        calls.record(&CallSite::direct("a"), &mut model);
        let saved = calls.enter(Some("inner"));
        calls.record(&CallSite::direct("b"), &mut model);
        calls.leave(saved);
        calls.record(&CallSite::direct("c"), &mut model);
        calls.leave(top);
        calls.record(&CallSite::direct("d"), &mut model);

        assert_eq!(model.functions["outer"].calls, vec!["a", "c"]);
        assert_eq!(model.functions["inner"].calls, vec!["b"]);
    }

    #[test]
    fn indirect_and_disabled() {
        let mut model = model_with(&["f"]);
        let mut calls = CallCollector::new(true);
        calls.enter(Some("f"));
        calls.record(&CallSite::indirect(), &mut model);
        assert!(model.functions["f"].calls.is_empty());

        let mut off = CallCollector::new(false);
        off.enter(Some("f"));
        off.record(&CallSite::direct("g"), &mut model);
        assert!(model.functions["f"].calls.is_empty());
    }

    #[test]
    fn rejected_function_drops_calls() {
        let mut model = model_with(&["f"]);
        let mut calls = CallCollector::new(true);
        let prev = calls.enter(Some("f"));
        let inner = calls.enter(None);
        calls.record(&CallSite::direct("hidden"), &mut model);
        calls.leave(inner);
        calls.leave(prev);
        assert!(model.functions["f"].calls.is_empty());
    }
}
