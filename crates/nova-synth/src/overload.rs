use nova_synth_bridge::{MethodInfo, Type};

use crate::types::TypeStore;

/// Decides where an argument needs an explicit cast so that a call resolves to the intended
/// overload once compiled.
pub struct OverloadChecker<'a> {
    store: &'a TypeStore,
    method: &'a MethodInfo,
    rivals: Vec<&'a MethodInfo>,
}

impl<'a> OverloadChecker<'a> {
    /// `candidates` are the methods (or constructors) visible on the receiver type.
    pub fn new(store: &'a TypeStore, method: &'a MethodInfo, candidates: &[&'a MethodInfo]) -> Self {
        let rivals = candidates
            .iter()
            .copied()
            .filter(|m| {
                m.name == method.name
                    && m.params.len() == method.params.len()
                    && m.params != method.params
            })
            .collect();
        Self {
            store,
            method,
            rivals,
        }
    }

    /// Whether passing a value of type `actual` at `index` could select a different overload.
    pub fn needs_cast(&self, actual: &Type, index: usize) -> bool {
        let Some(param) = self.method.params.get(index) else {
            return false;
        };
        if actual == param {
            return false;
        }
        self.rivals.iter().any(|rival| {
            rival
                .params
                .get(index)
                .is_some_and(|other| other != param && self.store.is_subtype(actual, other))
        })
    }
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::{ClassInfo, FrameInfo, Modifiers};

    use super::*;

    #[test]
    fn null_arguments_to_overloaded_methods_need_casts() {
        let frame = FrameInfo {
            thread: 1,
            frame: 1,
            declaring_type: "Main".to_owned(),
            method: "main".to_owned(),
            is_static: true,
            this: None,
            locals: Vec::new(),
            imports: Vec::new(),
        };
        let mut store = TypeStore::new(&frame);
        store.insert(ClassInfo::new("java.lang.String"));
        store.insert(ClassInfo::new("java.lang.Integer"));
        let by_string = MethodInfo::new("Printer", "print", vec![Type::string()], Type::int(), Modifiers::PUBLIC);
        let by_integer = MethodInfo::new(
            "Printer",
            "print",
            vec![Type::class("java.lang.Integer")],
            Type::int(),
            Modifiers::PUBLIC,
        );
        let by_int = MethodInfo::new("Printer", "print", vec![Type::int()], Type::int(), Modifiers::PUBLIC);
        let all = [&by_string, &by_integer, &by_int];
        let checker = OverloadChecker::new(&store, &by_string, &all);
        assert!(checker.needs_cast(&Type::Null, 0));
        assert!(!checker.needs_cast(&Type::string(), 0));
        let checker = OverloadChecker::new(&store, &by_int, &all);
        assert!(!checker.needs_cast(&Type::Primitive(nova_synth_bridge::PrimitiveType::Short), 0));
    }
}
