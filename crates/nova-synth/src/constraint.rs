//! Constraints on the static type of an expression position.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use nova_synth_bridge::{FieldInfo, MethodInfo, Type};

use crate::types::TypeStore;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstraint {
    Unconstrained,
    /// Exactly this type.
    Exact(Type),
    /// The type of a demonstrated value. Seeds the search with exactly this type and accepts
    /// anything assignable to it.
    Desired(Type),
    /// Any type assignable to the bound (result and operand positions).
    SupertypeBound(Type),
    /// Any type the bound is assignable to (argument positions).
    SubtypeBound(Type),
    SupertypeSet(BTreeSet<Type>),
    SubtypeSet(BTreeSet<Type>),
    /// Assignable in either direction (cast and `instanceof` operands).
    SameHierarchy(Type),
    /// A receiver type with a field (named, or any) whose type satisfies the inner constraint.
    Field {
        name: Option<String>,
        field: Box<TypeConstraint>,
    },
    /// A receiver type with a method (named, or any) returning a satisfying type and accepting
    /// the given arguments. `None` argument entries are unknown.
    Method {
        name: Option<String>,
        result: Box<TypeConstraint>,
        args: Option<Vec<Option<TypeConstraint>>>,
    },
    FieldName(Arc<FieldNameConstraint>),
    MethodName(Arc<MethodNameConstraint>),
}

impl TypeConstraint {
    /// `SupertypeBound` for one distinct type, `SupertypeSet` for several.
    pub fn supertype_of_any(types: impl IntoIterator<Item = Type>) -> TypeConstraint {
        let mut set: BTreeSet<Type> = types.into_iter().collect();
        if set.len() == 1 {
            if let Some(only) = set.pop_first() {
                return TypeConstraint::SupertypeBound(only);
            }
        }
        TypeConstraint::SupertypeSet(set)
    }

    pub fn is_fulfilled_by(&self, ty: &Type, store: &TypeStore) -> bool {
        match self {
            TypeConstraint::Unconstrained => true,
            TypeConstraint::Exact(expected) => ty == expected,
            TypeConstraint::Desired(bound) | TypeConstraint::SupertypeBound(bound) => {
                store.is_subtype(ty, bound)
            }
            TypeConstraint::SubtypeBound(bound) => store.is_subtype(bound, ty),
            TypeConstraint::SupertypeSet(bounds) => bounds.iter().any(|b| store.is_subtype(ty, b)),
            TypeConstraint::SubtypeSet(bounds) => bounds.iter().any(|b| store.is_subtype(b, ty)),
            TypeConstraint::SameHierarchy(other) => store.related(ty, other),
            TypeConstraint::Field { name, field } => store.fields(ty).into_iter().any(|f| {
                name.as_ref().map_or(true, |n| *n == f.name)
                    && store.is_accessible(&f.declaring, &f.modifiers)
                    && field.is_fulfilled_by(&f.ty, store)
            }),
            TypeConstraint::Method { name, result, args } => {
                store.methods(ty).into_iter().any(|m| {
                    name.as_ref().map_or(true, |n| *n == m.name)
                        && store.is_legal_method(m, false)
                        && result.is_fulfilled_by(&m.return_type, store)
                        && fulfills_arg_constraints(m, args.as_deref(), store)
                })
            }
            TypeConstraint::FieldName(names) => names.field.is_fulfilled_by(ty, store),
            TypeConstraint::MethodName(names) => names.result.is_fulfilled_by(ty, store),
        }
    }

    /// Types that seed a search for this constraint. Empty when the constraint names none.
    pub fn candidate_types(&self) -> Vec<Type> {
        match self {
            TypeConstraint::Exact(ty)
            | TypeConstraint::Desired(ty)
            | TypeConstraint::SupertypeBound(ty)
            | TypeConstraint::SubtypeBound(ty)
            | TypeConstraint::SameHierarchy(ty) => vec![ty.clone()],
            TypeConstraint::SupertypeSet(types) | TypeConstraint::SubtypeSet(types) => {
                types.iter().cloned().collect()
            }
            TypeConstraint::Unconstrained
            | TypeConstraint::Field { .. }
            | TypeConstraint::Method { .. }
            | TypeConstraint::FieldName(_)
            | TypeConstraint::MethodName(_) => Vec::new(),
        }
    }

    /// The constraint an actual argument must meet for a formal parameter position built from
    /// a result-position constraint.
    pub fn for_argument(self) -> TypeConstraint {
        match self {
            TypeConstraint::Desired(ty) | TypeConstraint::SupertypeBound(ty) => {
                TypeConstraint::SubtypeBound(ty)
            }
            TypeConstraint::SupertypeSet(types) => TypeConstraint::SubtypeSet(types),
            other => other,
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(types: &BTreeSet<Type>) -> String {
            types.iter().map(Type::name).collect::<Vec<_>>().join(", ")
        }
        match self {
            TypeConstraint::Unconstrained => f.write_str("?"),
            TypeConstraint::Exact(ty) => write!(f, "={ty}"),
            TypeConstraint::Desired(ty) => write!(f, "desired {ty}"),
            TypeConstraint::SupertypeBound(ty) => write!(f, "<:{ty}"),
            TypeConstraint::SubtypeBound(ty) => write!(f, ":>{ty}"),
            TypeConstraint::SupertypeSet(types) => write!(f, "<:{{{}}}", join(types)),
            TypeConstraint::SubtypeSet(types) => write!(f, ":>{{{}}}", join(types)),
            TypeConstraint::SameHierarchy(ty) => write!(f, "~{ty}"),
            TypeConstraint::Field { name, field } => {
                write!(f, "{{.{}: {field}}}", name.as_deref().unwrap_or("?"))
            }
            TypeConstraint::Method { name, result, .. } => {
                write!(f, "{{.{}(..): {result}}}", name.as_deref().unwrap_or("?"))
            }
            TypeConstraint::FieldName(names) => write!(f, "field name: {}", names.field),
            TypeConstraint::MethodName(names) => write!(f, "method name: {}", names.result),
        }
    }
}

/// Whether `method` accepts arguments meeting `args`. Unknown argument lists accept anything.
pub fn fulfills_arg_constraints(
    method: &MethodInfo,
    args: Option<&[Option<TypeConstraint>]>,
    store: &TypeStore,
) -> bool {
    let Some(args) = args else {
        return true;
    };
    method.params.len() == args.len()
        && method.params.iter().zip(args).all(|(param, arg)| {
            arg.as_ref()
                .map_or(true, |arg| arg.is_fulfilled_by(param, store))
        })
}

/// Members grouped by the name of the receiver type they were found on.
pub type MembersByType<M> = BTreeMap<String, Vec<M>>;

/// The name position of `receiver.??`.
#[derive(Debug)]
pub struct FieldNameConstraint {
    pub receiver: TypeConstraint,
    /// Constraint on the accessed field's type.
    pub field: TypeConstraint,
    pub legal_names: Option<BTreeSet<String>>,
    fields: OnceLock<MembersByType<FieldInfo>>,
}

impl FieldNameConstraint {
    pub fn new(
        receiver: TypeConstraint,
        field: TypeConstraint,
        legal_names: Option<BTreeSet<String>>,
    ) -> Self {
        Self {
            receiver,
            field,
            legal_names,
            fields: OnceLock::new(),
        }
    }

    pub fn is_legal_name(&self, name: &str) -> bool {
        self.legal_names.as_ref().map_or(true, |names| names.contains(name))
    }

    /// Fields of each receiver type that may fill the name. Computed on first use; later calls
    /// return the same map.
    pub fn fields(&self, store: &TypeStore, receiver_types: &[Type]) -> &MembersByType<FieldInfo> {
        self.fields.get_or_init(|| {
            let mut by_type = MembersByType::new();
            for receiver in receiver_types {
                let fields: Vec<FieldInfo> = store
                    .fields(receiver)
                    .into_iter()
                    .filter(|f| self.is_legal_name(&f.name))
                    .filter(|f| store.is_accessible(&f.declaring, &f.modifiers))
                    .filter(|f| self.field.is_fulfilled_by(&f.ty, store))
                    .cloned()
                    .collect();
                if !fields.is_empty() {
                    by_type.insert(receiver.name(), fields);
                }
            }
            by_type
        })
    }
}

impl PartialEq for FieldNameConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.receiver == other.receiver
            && self.field == other.field
            && self.legal_names == other.legal_names
    }
}

/// The name position of `receiver.??(args)`.
#[derive(Debug)]
pub struct MethodNameConstraint {
    pub receiver: TypeConstraint,
    /// Constraint on the call's result type.
    pub result: TypeConstraint,
    pub args: Option<Vec<Option<TypeConstraint>>>,
    pub legal_names: Option<BTreeSet<String>>,
    methods: OnceLock<MembersByType<MethodInfo>>,
}

impl MethodNameConstraint {
    pub fn new(
        receiver: TypeConstraint,
        result: TypeConstraint,
        args: Option<Vec<Option<TypeConstraint>>>,
        legal_names: Option<BTreeSet<String>>,
    ) -> Self {
        Self {
            receiver,
            result,
            args,
            legal_names,
            methods: OnceLock::new(),
        }
    }

    pub fn is_legal_name(&self, name: &str) -> bool {
        self.legal_names.as_ref().map_or(true, |names| names.contains(name))
    }

    /// Methods of each receiver type that may fill the name; memoized like
    /// [`FieldNameConstraint::fields`]. `accept` applies caller-side legality rules.
    pub fn methods(
        &self,
        store: &TypeStore,
        receiver_types: &[Type],
        accept: impl Fn(&MethodInfo) -> bool,
    ) -> &MembersByType<MethodInfo> {
        self.methods.get_or_init(|| {
            let mut by_type = MembersByType::new();
            for receiver in receiver_types {
                let methods: Vec<MethodInfo> = store
                    .methods(receiver)
                    .into_iter()
                    .filter(|m| self.is_legal_name(&m.name))
                    .filter(|m| store.is_legal_method(m, false))
                    .filter(|m| !m.return_type.is_void())
                    .filter(|m| self.result.is_fulfilled_by(&m.return_type, store))
                    .filter(|m| fulfills_arg_constraints(m, self.args.as_deref(), store))
                    .filter(|m| accept(m))
                    .cloned()
                    .collect();
                if !methods.is_empty() {
                    by_type.insert(receiver.name(), methods);
                }
            }
            by_type
        })
    }
}

impl PartialEq for MethodNameConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.receiver == other.receiver
            && self.result == other.result
            && self.args == other.args
            && self.legal_names == other.legal_names
    }
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::{ClassInfo, FrameInfo, Modifiers, OBJECT};
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> TypeStore {
        let mut store = TypeStore::new(&FrameInfo {
            thread: 1,
            frame: 1,
            declaring_type: "Main".to_owned(),
            method: "main".to_owned(),
            is_static: true,
            this: None,
            locals: Vec::new(),
            imports: Vec::new(),
        });
        store.insert(ClassInfo::new(OBJECT));
        store.insert(ClassInfo::new("Shape").field("sides", Type::int(), Modifiers::PUBLIC));
        store.insert(
            ClassInfo::new("Square")
                .extends("Shape")
                .field("secret", Type::int(), Modifiers::PRIVATE)
                .method("area", vec![], Type::int(), Modifiers::PUBLIC)
                .method("scale", vec![Type::int()], Type::class("Square"), Modifiers::PUBLIC)
                .method("reset", vec![], Type::Void, Modifiers::PUBLIC),
        );
        store
    }

    #[test]
    fn bounds_follow_assignability() {
        let store = store();
        let shape = Type::class("Shape");
        let square = Type::class("Square");
        assert!(TypeConstraint::SupertypeBound(shape.clone()).is_fulfilled_by(&square, &store));
        assert!(!TypeConstraint::SupertypeBound(square.clone()).is_fulfilled_by(&shape, &store));
        assert!(TypeConstraint::SubtypeBound(square.clone()).is_fulfilled_by(&shape, &store));
        assert!(TypeConstraint::SameHierarchy(square.clone()).is_fulfilled_by(&shape, &store));
        assert!(TypeConstraint::Desired(shape.clone()).is_fulfilled_by(&square, &store));
        assert!(!TypeConstraint::Exact(shape).is_fulfilled_by(&square, &store));
        assert!(TypeConstraint::SupertypeBound(Type::long()).is_fulfilled_by(&Type::int(), &store));
    }

    #[test]
    fn narrowing_a_bound_never_admits_new_types() {
        let store = store();
        let narrow = TypeConstraint::SupertypeBound(Type::class("Square"));
        let wide = TypeConstraint::SupertypeBound(Type::class("Shape"));
        for ty in [Type::class("Square"), Type::class("Shape"), Type::object(), Type::Null, Type::int()] {
            if narrow.is_fulfilled_by(&ty, &store) {
                assert!(wide.is_fulfilled_by(&ty, &store), "{ty}");
            }
        }
    }

    #[test]
    fn sets_deduplicate_primitives_and_collapse_singletons() {
        let single = TypeConstraint::supertype_of_any([Type::int(), Type::int()]);
        assert_eq!(single, TypeConstraint::SupertypeBound(Type::int()));
        let set = TypeConstraint::supertype_of_any([Type::int(), Type::boolean(), Type::int()]);
        assert_eq!(set.candidate_types(), vec![Type::boolean(), Type::int()]);
        assert_eq!(
            TypeConstraint::SupertypeSet(BTreeSet::from([Type::int()])).for_argument(),
            TypeConstraint::SubtypeSet(BTreeSet::from([Type::int()]))
        );
    }

    #[test]
    fn member_constraints_look_through_inherited_members() {
        let store = store();
        let square = Type::class("Square");
        let has_sides = TypeConstraint::Field {
            name: Some("sides".to_owned()),
            field: Box::new(TypeConstraint::SupertypeBound(Type::int())),
        };
        assert!(has_sides.is_fulfilled_by(&square, &store));
        let has_secret = TypeConstraint::Field {
            name: Some("secret".to_owned()),
            field: Box::new(TypeConstraint::Unconstrained),
        };
        assert!(!has_secret.is_fulfilled_by(&square, &store));
        let scales = TypeConstraint::Method {
            name: Some("scale".to_owned()),
            result: Box::new(TypeConstraint::SupertypeBound(Type::class("Shape"))),
            args: Some(vec![Some(TypeConstraint::SubtypeBound(Type::int()))]),
        };
        assert!(scales.is_fulfilled_by(&square, &store));
        assert!(!scales.is_fulfilled_by(&Type::class("Shape"), &store));
    }

    #[test]
    fn method_names_are_resolved_once() {
        let store = store();
        let names = MethodNameConstraint::new(
            TypeConstraint::Unconstrained,
            TypeConstraint::SupertypeBound(Type::int()),
            None,
            None,
        );
        let square = [Type::class("Square")];
        let found: Vec<String> = names.methods(&store, &square, |_| true)["Square"]
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(found, vec!["area".to_owned()]);
        // Memoized: a different receiver list does not recompute.
        assert!(names.methods(&store, &[], |_| true).contains_key("Square"));
    }
}
