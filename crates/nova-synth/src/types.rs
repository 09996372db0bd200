//! Type introspection over the classes loaded in the paused process.

use std::collections::{BTreeSet, HashMap, VecDeque};

use nova_synth_bridge::{
    ClassInfo, ExecutionBridge, FieldInfo, FrameInfo, MethodInfo, Modifiers, PrimitiveType, Type,
    OBJECT,
};

use crate::SynthResult;

/// Loaded class metadata plus the naming context of the paused frame.
#[derive(Debug, Clone)]
pub struct TypeStore {
    classes: HashMap<String, ClassInfo>,
    this_type: String,
    package: String,
    imports: Vec<String>,
}

impl TypeStore {
    pub fn load(bridge: &mut dyn ExecutionBridge, frame: &FrameInfo) -> SynthResult<Self> {
        let mut store = Self::new(frame);
        for name in bridge.loaded_classes()? {
            if let Some(info) = bridge.class_info(&name)? {
                store.insert(info);
            }
        }
        tracing::debug!(
            target: "nova.synth.types",
            classes = store.classes.len(),
            this_type = %store.this_type,
            "loaded type store"
        );
        Ok(store)
    }

    pub fn new(frame: &FrameInfo) -> Self {
        let package = frame
            .declaring_type
            .rsplit_once('.')
            .map(|(package, _)| package.to_owned())
            .unwrap_or_default();
        Self {
            classes: HashMap::new(),
            this_type: frame.declaring_type.clone(),
            package,
            imports: frame.imports.clone(),
        }
    }

    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn this_type(&self) -> Type {
        Type::Class(self.this_type.clone())
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// `class` and everything it extends or implements, breadth first, `class` itself first.
    pub fn supertypes(&self, class: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([class.to_owned()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(info) = self.classes.get(&next) {
                queue.extend(info.superclass.iter().cloned());
                queue.extend(info.interfaces.iter().cloned());
            }
            order.push(next);
        }
        order
    }

    pub fn is_interface(&self, ty: &Type) -> bool {
        ty.class_name()
            .and_then(|name| self.classes.get(name))
            .is_some_and(|info| info.is_interface)
    }

    /// Assignment compatibility without boxing.
    pub fn is_subtype(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b),
            (Type::Null, to) => to.is_reference() && !matches!(to, Type::Null),
            (Type::Class(_) | Type::Array(_), Type::Class(name)) if name == OBJECT => true,
            (Type::Class(from), Type::Class(to)) => self.supertypes(from).iter().any(|s| s == to),
            (Type::Array(a), Type::Array(b)) => match (a.as_ref(), b.as_ref()) {
                (Type::Primitive(_), _) | (_, Type::Primitive(_)) => a == b,
                (a, b) => self.is_subtype(a, b),
            },
            _ => false,
        }
    }

    /// Either type is assignable to the other.
    pub fn related(&self, a: &Type, b: &Type) -> bool {
        self.is_subtype(a, b) || self.is_subtype(b, a)
    }

    /// Instance and static fields visible on `ty`, nearest declaration first.
    pub fn fields(&self, ty: &Type) -> Vec<&FieldInfo> {
        let Some(class) = ty.class_name() else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut fields = Vec::new();
        for owner in self.supertypes(class) {
            let Some(info) = self.classes.get(&owner) else {
                continue;
            };
            for field in &info.fields {
                if seen.insert(field.name.as_str()) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Methods callable on `ty`; overridden declarations are skipped. Constructors excluded.
    pub fn methods(&self, ty: &Type) -> Vec<&MethodInfo> {
        let class = match ty {
            Type::Class(name) => name.as_str(),
            Type::Array(_) => OBJECT,
            _ => return Vec::new(),
        };
        let mut seen = BTreeSet::new();
        let mut methods = Vec::new();
        for owner in self.supertypes(class) {
            let Some(info) = self.classes.get(&owner) else {
                continue;
            };
            for method in info.methods.iter().filter(|m| !m.is_constructor()) {
                if seen.insert(method.signature()) {
                    methods.push(method);
                }
            }
        }
        methods
    }

    pub fn constructors(&self, ty: &Type) -> Vec<&MethodInfo> {
        ty.class_name()
            .and_then(|name| self.classes.get(name))
            .filter(|info| !info.is_interface)
            .map(|info| info.methods.iter().filter(|m| m.is_constructor()).collect())
            .unwrap_or_default()
    }

    /// Public, or private to the type the paused frame executes in.
    pub fn is_accessible(&self, declaring: &str, modifiers: &Modifiers) -> bool {
        (modifiers.is_public || declaring == self.this_type) && !modifiers.is_synthetic
    }

    /// A field a candidate may read through a receiver of the given kind.
    pub fn is_legal_field(&self, field: &FieldInfo, static_receiver: bool) -> bool {
        self.is_accessible(&field.declaring, &field.modifiers) && field.is_static() == static_receiver
    }

    /// A method a candidate may call. `Object`'s own methods and static initializers never
    /// qualify.
    pub fn is_legal_method(&self, method: &MethodInfo, constructor: bool) -> bool {
        self.is_accessible(&method.declaring, &method.modifiers)
            && !method.is_static_initializer()
            && method.declaring != OBJECT
            && method.is_constructor() == constructor
    }

    /// Resolves a class name as written in source.
    pub fn resolve_class(&self, name: &str) -> Option<String> {
        if self.classes.contains_key(name) {
            return Some(name.to_owned());
        }
        if let Some((outer, inner)) = name.split_once('.') {
            // `Outer.Inner` and `pkg.Outer.Inner`.
            if let Some(outer) = self.resolve_class(outer) {
                let nested = format!("{outer}${}", inner.replace('.', "$"));
                if self.classes.contains_key(&nested) {
                    return Some(nested);
                }
            }
            let mut candidate = name.to_owned();
            while let Some(dot) = candidate.rfind('.') {
                candidate.replace_range(dot..=dot, "$");
                if self.classes.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
            return None;
        }
        let nested = format!("{}${name}", self.this_type);
        let candidates = self
            .imports
            .iter()
            .filter(|import| import.rsplit('.').next() == Some(name))
            .cloned()
            .chain([
                nested,
                format!("java.lang.{name}"),
                format!("{}.{name}", self.package),
            ]);
        candidates.into_iter().find(|c| self.classes.contains_key(c))
    }

    pub fn resolve_type(&self, name: &str) -> Option<Type> {
        let name = name.trim();
        if let Some(component) = name.strip_suffix("[]") {
            return self.resolve_type(component).map(Type::array_of);
        }
        if let Some(primitive) = PrimitiveType::from_name(name) {
            return Some(Type::Primitive(primitive));
        }
        self.resolve_class(name).map(Type::Class)
    }

    /// How `ty` is spelled in generated source: the simple name when it resolves back to the
    /// same class, the qualified name otherwise.
    pub fn source_name(&self, ty: &Type) -> String {
        match ty {
            Type::Class(name) => {
                let simple = ty.simple_name();
                if self.resolve_class(&simple).as_deref() == Some(name.as_str()) {
                    simple
                } else {
                    ty.source_name()
                }
            }
            Type::Array(component) => format!("{}[]", self.source_name(component)),
            other => other.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FrameInfo {
        FrameInfo {
            thread: 1,
            frame: 1,
            declaring_type: "app.Main".to_owned(),
            method: "run".to_owned(),
            is_static: true,
            this: None,
            locals: Vec::new(),
            imports: vec!["java.util.List".to_owned()],
        }
    }

    fn store() -> TypeStore {
        let mut store = TypeStore::new(&frame());
        store.insert(ClassInfo::new(OBJECT).method("hashCode", vec![], Type::int(), Modifiers::PUBLIC));
        store.insert(ClassInfo::new("java.lang.String"));
        store.insert(ClassInfo::interface("java.util.List").method("size", vec![], Type::int(), Modifiers::PUBLIC));
        store.insert(
            ClassInfo::new("java.util.ArrayList")
                .implements("java.util.List")
                .method("size", vec![], Type::int(), Modifiers::PUBLIC)
                .constructor(vec![], Modifiers::PUBLIC),
        );
        store.insert(ClassInfo::new("app.Main"));
        store.insert(ClassInfo::new("app.Main$Node").field("next", Type::class("app.Main$Node"), Modifiers::PUBLIC));
        store.insert(ClassInfo::new("app.Other"));
        store
    }

    #[test]
    fn subtyping_follows_classes_interfaces_and_arrays() {
        let store = store();
        let list = Type::class("java.util.List");
        let array_list = Type::class("java.util.ArrayList");
        assert!(store.is_subtype(&array_list, &list));
        assert!(!store.is_subtype(&list, &array_list));
        assert!(store.related(&list, &array_list));
        assert!(store.is_subtype(&list, &Type::object()));
        assert!(store.is_subtype(&Type::Null, &list));
        assert!(!store.is_subtype(&Type::Null, &Type::int()));
        assert!(store.is_subtype(&Type::int(), &Type::long()));
        assert!(store.is_subtype(&Type::array_of(array_list.clone()), &Type::array_of(list)));
        assert!(!store.is_subtype(&Type::array_of(Type::int()), &Type::array_of(Type::long())));
        assert!(store.is_subtype(&Type::array_of(Type::int()), &Type::object()));
    }

    #[test]
    fn overridden_methods_are_listed_once() {
        let store = store();
        let methods = store.methods(&Type::class("java.util.ArrayList"));
        let sizes = methods.iter().filter(|m| m.name == "size").count();
        assert_eq!(sizes, 1);
        assert_eq!(methods[0].declaring, "java.util.ArrayList");
        assert_eq!(store.constructors(&Type::class("java.util.List")).len(), 0);
    }

    #[test]
    fn names_resolve_through_imports_java_lang_nesting_and_package() {
        let store = store();
        assert_eq!(store.resolve_class("List").as_deref(), Some("java.util.List"));
        assert_eq!(store.resolve_class("String").as_deref(), Some("java.lang.String"));
        assert_eq!(store.resolve_class("Node").as_deref(), Some("app.Main$Node"));
        assert_eq!(store.resolve_class("Main.Node").as_deref(), Some("app.Main$Node"));
        assert_eq!(store.resolve_class("Other").as_deref(), Some("app.Other"));
        assert_eq!(store.resolve_class("ArrayList"), None);
        assert_eq!(
            store.resolve_type("int[]"),
            Some(Type::array_of(Type::int()))
        );
    }

    #[test]
    fn source_names_prefer_resolvable_simple_names() {
        let store = store();
        assert_eq!(store.source_name(&Type::class("java.util.List")), "List");
        assert_eq!(store.source_name(&Type::class("java.util.ArrayList")), "java.util.ArrayList");
        assert_eq!(store.source_name(&Type::array_of(Type::string())), "String[]");
    }
}
