use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => PrimitiveType::Boolean,
            "byte" => PrimitiveType::Byte,
            "char" => PrimitiveType::Char,
            "short" => PrimitiveType::Short,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveType::Boolean)
    }

    /// Position in the widening order `byte < short < int < long < float < double`; `char`
    /// widens to `int` and up only.
    fn rank(self) -> u8 {
        match self {
            PrimitiveType::Boolean => 0,
            PrimitiveType::Byte => 1,
            PrimitiveType::Short | PrimitiveType::Char => 2,
            PrimitiveType::Int => 3,
            PrimitiveType::Long => 4,
            PrimitiveType::Float => 5,
            PrimitiveType::Double => 6,
        }
    }

    /// Identity or widening primitive conversion from `self` to `target`.
    pub fn widens_to(self, target: PrimitiveType) -> bool {
        if self == target {
            return true;
        }
        if !self.is_numeric() || !target.is_numeric() {
            return false;
        }
        match (self, target) {
            (_, PrimitiveType::Char) => false,
            (PrimitiveType::Char, PrimitiveType::Short) => false,
            _ => self.rank() < target.rank(),
        }
    }
}

/// A Java type as seen through the debugger. Type arguments are erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Primitive(PrimitiveType),
    Void,
    /// The type of the `null` literal.
    Null,
    Class(String),
    Array(Box<Type>),
}

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";

impl Type {
    pub fn int() -> Self {
        Type::Primitive(PrimitiveType::Int)
    }

    pub fn boolean() -> Self {
        Type::Primitive(PrimitiveType::Boolean)
    }

    pub fn long() -> Self {
        Type::Primitive(PrimitiveType::Long)
    }

    pub fn double() -> Self {
        Type::Primitive(PrimitiveType::Double)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    pub fn object() -> Self {
        Type::Class(OBJECT.to_owned())
    }

    pub fn string() -> Self {
        Type::Class(STRING.to_owned())
    }

    pub fn array_of(component: Type) -> Self {
        Type::Array(Box::new(component))
    }

    /// Parses a source-level type name (`int`, `java.util.List`, `int[][]`).
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if let Some(component) = name.strip_suffix("[]") {
            return Type::array_of(Type::parse(component));
        }
        if let Some(primitive) = PrimitiveType::from_name(name) {
            return Type::Primitive(primitive);
        }
        match name {
            "void" => Type::Void,
            "null" => Type::Null,
            _ => Type::Class(name.to_owned()),
        }
    }

    /// Canonical name; two types are the same type iff their names are equal.
    pub fn name(&self) -> String {
        match self {
            Type::Primitive(p) => p.name().to_owned(),
            Type::Void => "void".to_owned(),
            Type::Null => "null".to_owned(),
            Type::Class(name) => name.clone(),
            Type::Array(component) => format!("{}[]", component.name()),
        }
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Array(_) | Type::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Boolean))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Int))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Primitive(p) if p.is_numeric())
    }

    pub fn component(&self) -> Option<&Type> {
        match self {
            Type::Array(component) => Some(component),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Unqualified name used in generated source where an import resolves it.
    pub fn simple_name(&self) -> String {
        match self {
            Type::Class(name) => name
                .rsplit('.')
                .next()
                .unwrap_or(name.as_str())
                .replace('$', "."),
            Type::Array(component) => format!("{}[]", component.simple_name()),
            other => other.name(),
        }
    }

    /// Name as written in source (`Outer$Inner` becomes `Outer.Inner`).
    pub fn source_name(&self) -> String {
        match self {
            Type::Class(name) => name.replace('$', "."),
            Type::Array(component) => format!("{}[]", component.source_name()),
            other => other.name(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub is_public: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_synthetic: bool,
}

impl Modifiers {
    pub const PUBLIC: Modifiers = Modifiers {
        is_public: true,
        is_static: false,
        is_final: false,
        is_synthetic: false,
    };

    pub const PRIVATE: Modifiers = Modifiers {
        is_public: false,
        is_static: false,
        is_final: false,
        is_synthetic: false,
    };

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn with_synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }
}

/// A field identified by its declaring class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub declaring: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(declaring: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring: declaring.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub declaring: String,
    pub name: String,
    pub ty: Type,
    pub modifiers: Modifiers,
}

impl FieldInfo {
    pub fn new(declaring: impl Into<String>, name: impl Into<String>, ty: Type, modifiers: Modifiers) -> Self {
        Self {
            declaring: declaring.into(),
            name: name.into(),
            ty,
            modifiers,
        }
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(self.declaring.clone(), self.name.clone())
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub declaring: String,
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub modifiers: Modifiers,
}

pub const CONSTRUCTOR_NAME: &str = "<init>";
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

impl MethodInfo {
    pub fn new(
        declaring: impl Into<String>,
        name: impl Into<String>,
        params: Vec<Type>,
        return_type: Type,
        modifiers: Modifiers,
    ) -> Self {
        Self {
            declaring: declaring.into(),
            name: name.into(),
            params,
            return_type,
            modifiers,
        }
    }

    pub fn constructor(declaring: impl Into<String>, params: Vec<Type>, modifiers: Modifiers) -> Self {
        Self::new(declaring, CONSTRUCTOR_NAME, params, Type::Void, modifiers)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    /// `name(int, java.lang.String)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(Type::name).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    /// A class extending `java.lang.Object` with no members.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let superclass = (name != OBJECT).then(|| OBJECT.to_owned());
        Self {
            name,
            superclass,
            interfaces: Vec::new(),
            is_interface: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut info = Self::new(name);
        info.superclass = None;
        info.is_interface = true;
        info
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn field(mut self, name: &str, ty: Type, modifiers: Modifiers) -> Self {
        self.fields
            .push(FieldInfo::new(self.name.clone(), name, ty, modifiers));
        self
    }

    pub fn method(mut self, name: &str, params: Vec<Type>, return_type: Type, modifiers: Modifiers) -> Self {
        self.methods.push(MethodInfo::new(
            self.name.clone(),
            name,
            params,
            return_type,
            modifiers,
        ));
        self
    }

    pub fn constructor(mut self, params: Vec<Type>, modifiers: Modifiers) -> Self {
        self.methods
            .push(MethodInfo::constructor(self.name.clone(), params, modifiers));
        self
    }

    pub fn declared_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}
