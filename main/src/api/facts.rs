use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Access flags and visibility
// ---------------------------------------------------------------------------

/// Class-file access flag bits used by the engine.
pub mod access {
    /// Declared public.
    pub const PUBLIC: u16 = 0x0001;
    /// Declared private.
    pub const PRIVATE: u16 = 0x0002;
    /// Declared protected.
    pub const PROTECTED: u16 = 0x0004;
    /// Declared static.
    pub const STATIC: u16 = 0x0008;
    /// Declared final.
    pub const FINAL: u16 = 0x0010;
    /// Is an interface.
    pub const INTERFACE: u16 = 0x0200;
    /// Declared abstract.
    pub const ABSTRACT: u16 = 0x0400;
    /// Compiler-generated, not present in source.
    pub const SYNTHETIC: u16 = 0x1000;
    /// Is an annotation interface.
    pub const ANNOTATION: u16 = 0x2000;
    /// Is an enum.
    pub const ENUM: u16 = 0x4000;
}

/// Member visibility derived from access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// `public`.
    Public,
    /// `protected`.
    Protected,
    /// No modifier (package-private).
    Package,
    /// `private`.
    Private,
}

impl Visibility {
    /// Derive visibility from JVM access flags.
    pub fn from_access(flags: u16) -> Self {
        if flags & access::PUBLIC != 0 {
            Visibility::Public
        } else if flags & access::PROTECTED != 0 {
            Visibility::Protected
        } else if flags & access::PRIVATE != 0 {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }
}

// ---------------------------------------------------------------------------
// Type references
// ---------------------------------------------------------------------------

/// Canonical JVM type identity. Arrays normalize to their element type with
/// the array flag set; primitives and `void` carry the primitive flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Slash-separated internal name (e.g. `com/pit/app/UserService`).
    pub internal: String,
    /// Dot-separated fully-qualified name.
    pub fqn: String,
    /// Dot-separated package, empty for the default package.
    pub package: String,
    /// Simple class name (after the last dot; nested classes keep `$`).
    pub simple: String,
    /// Whether the reference was discovered as an array type.
    pub is_array: bool,
    /// Whether the reference is a primitive or `void`.
    pub is_primitive: bool,
}

impl TypeRef {
    /// Build from a slash-separated internal name. Array internal names
    /// (`[Lcom/a/B;`, `[[I`) normalize to their element type.
    pub fn from_internal_name(name: &str) -> TypeRef {
        if let Some(stripped) = name.strip_prefix('[') {
            let mut elem = stripped;
            while let Some(rest) = elem.strip_prefix('[') {
                elem = rest;
            }
            let mut t = TypeRef::from_element_descriptor(elem);
            t.is_array = true;
            return t;
        }
        let fqn = name.replace('/', ".");
        let (package, simple) = split_fqn(&fqn);
        TypeRef {
            internal: name.to_string(),
            fqn,
            package,
            simple,
            is_array: false,
            is_primitive: false,
        }
    }

    /// Build from a field descriptor (`Lcom/a/B;`, `I`, `[J`, `V`).
    pub fn from_descriptor(desc: &str) -> TypeRef {
        let mut elem = desc;
        let mut is_array = false;
        while let Some(rest) = elem.strip_prefix('[') {
            elem = rest;
            is_array = true;
        }
        let mut t = TypeRef::from_element_descriptor(elem);
        t.is_array = is_array;
        t
    }

    fn from_element_descriptor(elem: &str) -> TypeRef {
        if let Some(inner) = elem.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
            return TypeRef::from_internal_name(inner);
        }
        let name = match elem {
            "B" => "byte",
            "C" => "char",
            "D" => "double",
            "F" => "float",
            "I" => "int",
            "J" => "long",
            "S" => "short",
            "Z" => "boolean",
            "V" => "void",
            other => other,
        };
        TypeRef {
            internal: name.to_string(),
            fqn: name.to_string(),
            package: String::new(),
            simple: name.to_string(),
            is_array: false,
            is_primitive: true,
        }
    }
}

// Ordering compares by FQN first; the flags only break ties so that equal
// ordering stays consistent with equality.
impl PartialOrd for TypeRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fqn
            .cmp(&other.fqn)
            .then_with(|| self.is_array.cmp(&other.is_array))
            .then_with(|| self.is_primitive.cmp(&other.is_primitive))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn)
    }
}

fn split_fqn(fqn: &str) -> (String, String) {
    match fqn.rsplit_once('.') {
        Some((pkg, simple)) => (pkg.to_string(), simple.to_string()),
        None => (String::new(), fqn.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// Kind of physical container a class was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    /// A `.class` file under a directory root.
    DirectoryClass,
    /// An entry inside a zip archive.
    ArchiveEntry,
}

/// Where a class's bytes came from. Paths are always stored normalized
/// (forward slashes, no drive-letter prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The container kind.
    pub kind: OriginKind,
    /// Normalized path of the origin: the class file for directory origins,
    /// the archive file for archive origins.
    pub origin_path: String,
    /// Normalized archive path, present for archive entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    /// Entry path inside the archive, present for archive entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_path: Option<String>,
    /// The `SourceFile` attribute value, when present in the class file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Optional line, when any line metadata was present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl SourceLocation {
    /// Stable identity for diagnostics: `<container>!<entry>` for archive
    /// entries, the origin path otherwise.
    pub fn origin_id(&self) -> String {
        match (&self.container_path, &self.entry_path) {
            (Some(c), Some(e)) => format!("{}!{}", c, e),
            _ => self.origin_path.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Everything the engine knows about one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFact {
    /// Canonical identity.
    pub type_ref: TypeRef,
    /// Raw JVM access flags.
    pub access: u16,
    /// Super type, absent only for `java.lang.Object` and module-info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<TypeRef>,
    /// Directly implemented interfaces.
    pub interfaces: Vec<TypeRef>,
    /// FQNs of annotations present on the class.
    pub annotations: BTreeSet<String>,
    /// Whether the class declares `public static void main(String[])`.
    pub has_main_method: bool,
    /// Where the class bytes came from.
    pub location: SourceLocation,
}

impl ClassFact {
    /// Dot-separated package name.
    pub fn package(&self) -> &str {
        &self.type_ref.package
    }

    /// Simple class name.
    pub fn simple_name(&self) -> &str {
        &self.type_ref.simple
    }

    /// Fully-qualified name.
    pub fn fqn(&self) -> &str {
        &self.type_ref.fqn
    }

    /// Whether the class is declared public.
    pub fn is_public(&self) -> bool {
        self.access & access::PUBLIC != 0
    }

    /// Whether the class is an interface.
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Whether the class is compiler-generated.
    pub fn is_synthetic(&self) -> bool {
        self.access & access::SYNTHETIC != 0
    }
}

/// Everything the engine knows about one declared method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFact {
    /// FQN of the declaring class.
    pub owner_fqn: String,
    /// Method name (`<init>` for constructors).
    pub name: String,
    /// JVM method descriptor.
    pub descriptor: String,
    /// Generic signature attribute, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Raw JVM access flags.
    pub access: u16,
    /// Whether this is a constructor.
    pub is_constructor: bool,
    /// Declared return type; absent for constructors and `void`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeRef>,
    /// Declared parameter types, in order.
    pub param_types: Vec<TypeRef>,
    /// Declared thrown types, sorted by FQN.
    pub throws: Vec<TypeRef>,
    /// FQNs of annotations present on the method.
    pub annotations: BTreeSet<String>,
}

impl MethodFact {
    /// Visibility derived from access flags.
    pub fn visibility(&self) -> Visibility {
        Visibility::from_access(self.access)
    }

    /// Whether the method is static.
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Whether the method is compiler-generated.
    pub fn is_synthetic(&self) -> bool {
        self.access & access::SYNTHETIC != 0
    }
}

/// Everything the engine knows about one declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFact {
    /// FQN of the declaring class.
    pub owner_fqn: String,
    /// Field name.
    pub name: String,
    /// JVM field descriptor.
    pub descriptor: String,
    /// Generic signature attribute, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Raw JVM access flags.
    pub access: u16,
    /// Declared field type; absent for primitives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<TypeRef>,
    /// FQNs of annotations present on the field.
    pub annotations: BTreeSet<String>,
}

impl FieldFact {
    /// Visibility derived from access flags.
    pub fn visibility(&self) -> Visibility {
        Visibility::from_access(self.access)
    }

    /// Whether the field is static.
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }
}

// ---------------------------------------------------------------------------
// Dependency edges
// ---------------------------------------------------------------------------

/// How a dependency was discovered. The set is the union of both engine
/// lineages; `FieldAccess` covers get/put instructions inside method bodies
/// while `FieldType` is the declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyKind {
    /// Superclass relationship.
    Extends,
    /// Interface implementation.
    Implements,
    /// Declared field type.
    FieldType,
    /// Field read/write inside a method body.
    FieldAccess,
    /// Method invocation inside a method body.
    MethodCall,
    /// Declared parameter type.
    ParameterType,
    /// Declared return type.
    ReturnType,
    /// Annotation usage.
    Annotation,
    /// Declared thrown type.
    Throws,
    /// `instanceof` / `checkcast` inside a method body.
    Instanceof,
    /// Object or array allocation inside a method body.
    New,
}

impl DependencyKind {
    /// Case-tolerant parse of the canonical uppercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EXTENDS" => Some(Self::Extends),
            "IMPLEMENTS" => Some(Self::Implements),
            "FIELD_TYPE" => Some(Self::FieldType),
            "FIELD_ACCESS" => Some(Self::FieldAccess),
            "METHOD_CALL" => Some(Self::MethodCall),
            "PARAMETER_TYPE" => Some(Self::ParameterType),
            "RETURN_TYPE" => Some(Self::ReturnType),
            "ANNOTATION" | "ANNOTATION_TYPE" => Some(Self::Annotation),
            "THROWS" => Some(Self::Throws),
            "INSTANCEOF" => Some(Self::Instanceof),
            "NEW" => Some(Self::New),
            _ => None,
        }
    }

    /// Canonical uppercase name.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::FieldType => "FIELD_TYPE",
            Self::FieldAccess => "FIELD_ACCESS",
            Self::MethodCall => "METHOD_CALL",
            Self::ParameterType => "PARAMETER_TYPE",
            Self::ReturnType => "RETURN_TYPE",
            Self::Annotation => "ANNOTATION",
            Self::Throws => "THROWS",
            Self::Instanceof => "INSTANCEOF",
            Self::New => "NEW",
        }
    }

    /// Every kind, in canonical order.
    pub fn all() -> &'static [DependencyKind] {
        &[
            Self::Extends,
            Self::Implements,
            Self::FieldType,
            Self::FieldAccess,
            Self::MethodCall,
            Self::ParameterType,
            Self::ReturnType,
            Self::Annotation,
            Self::Throws,
            Self::Instanceof,
            Self::New,
        ]
    }
}

/// One directed dependency discovered during extraction. Self-loops and
/// primitive/void targets are filtered before an edge is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// FQN of the depending class.
    pub from_fqn: String,
    /// The referenced type.
    pub to: TypeRef,
    /// How the dependency was discovered.
    pub kind: DependencyKind,
    /// Extra context (e.g. member name for calls and field accesses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Where the dependency was discovered.
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Fact index
// ---------------------------------------------------------------------------

/// The immutable, queryable view over extracted facts. Built once per run
/// and then only read. Collections keep insertion order; derived maps key
/// by FQN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactIndex {
    /// All class facts, in discovery order.
    pub classes: Vec<ClassFact>,
    /// All method facts, in discovery order.
    pub methods: Vec<MethodFact>,
    /// All field facts, in discovery order.
    pub fields: Vec<FieldFact>,
    /// All dependency edges, in discovery order.
    pub edges: Vec<DependencyEdge>,
    /// Referenced members: `(owner FQN, member name)` pairs seen anywhere in
    /// method bodies, including intra-class references (which dependency
    /// edges exclude as self-loops).
    pub member_refs: BTreeSet<(String, String)>,
    /// Classes known only through external archives: FQN → bucket name.
    pub external_by_fqn: BTreeMap<String, String>,

    #[serde(skip)]
    class_by_fqn: HashMap<String, usize>,
    #[serde(skip)]
    methods_by_owner: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    fields_by_owner: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    outgoing: HashMap<String, BTreeSet<String>>,
    #[serde(skip)]
    incoming: HashMap<String, BTreeSet<String>>,
}

impl FactIndex {
    /// Assemble and freeze an index from extraction output.
    pub fn build(
        classes: Vec<ClassFact>,
        methods: Vec<MethodFact>,
        fields: Vec<FieldFact>,
        edges: Vec<DependencyEdge>,
        member_refs: BTreeSet<(String, String)>,
        external_by_fqn: BTreeMap<String, String>,
    ) -> Self {
        let mut index = FactIndex {
            classes,
            methods,
            fields,
            edges,
            member_refs,
            external_by_fqn,
            ..FactIndex::default()
        };
        index.rebuild_derived();
        index
    }

    /// Recompute the derived lookup maps (also used after deserialization).
    pub fn rebuild_derived(&mut self) {
        self.class_by_fqn = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.fqn().to_string(), i))
            .collect();
        self.methods_by_owner = HashMap::new();
        for (i, m) in self.methods.iter().enumerate() {
            self.methods_by_owner.entry(m.owner_fqn.clone()).or_default().push(i);
        }
        self.fields_by_owner = HashMap::new();
        for (i, f) in self.fields.iter().enumerate() {
            self.fields_by_owner.entry(f.owner_fqn.clone()).or_default().push(i);
        }
        self.outgoing = HashMap::new();
        self.incoming = HashMap::new();
        for e in &self.edges {
            self.outgoing
                .entry(e.from_fqn.clone())
                .or_default()
                .insert(e.to.fqn.clone());
            self.incoming
                .entry(e.to.fqn.clone())
                .or_default()
                .insert(e.from_fqn.clone());
        }
    }

    /// Look up a class by FQN.
    pub fn class(&self, fqn: &str) -> Option<&ClassFact> {
        self.class_by_fqn.get(fqn).map(|&i| &self.classes[i])
    }

    /// Whether the FQN belongs to a class in the index.
    pub fn contains_class(&self, fqn: &str) -> bool {
        self.class_by_fqn.contains_key(fqn)
    }

    /// Declared methods of a class, in declaration order.
    pub fn methods_of(&self, fqn: &str) -> Vec<&MethodFact> {
        self.methods_by_owner
            .get(fqn)
            .map(|idx| idx.iter().map(|&i| &self.methods[i]).collect())
            .unwrap_or_default()
    }

    /// Declared fields of a class, in declaration order.
    pub fn fields_of(&self, fqn: &str) -> Vec<&FieldFact> {
        self.fields_by_owner
            .get(fqn)
            .map(|idx| idx.iter().map(|&i| &self.fields[i]).collect())
            .unwrap_or_default()
    }

    /// Distinct FQNs this class depends on.
    pub fn outgoing_refs(&self, fqn: &str) -> BTreeSet<String> {
        self.outgoing.get(fqn).cloned().unwrap_or_default()
    }

    /// Distinct FQNs depending on this class.
    pub fn incoming_refs(&self, fqn: &str) -> BTreeSet<String> {
        self.incoming.get(fqn).cloned().unwrap_or_default()
    }

    /// Whether any method body references `(owner, member)`.
    pub fn is_member_referenced(&self, owner_fqn: &str, member: &str) -> bool {
        self.member_refs
            .contains(&(owner_fqn.to_string(), member.to_string()))
    }

    /// External bucket for an FQN, when the class lives in a scanned archive
    /// outside the project.
    pub fn external_bucket(&self, fqn: &str) -> Option<&str> {
        self.external_by_fqn.get(fqn).map(|s| s.as_str())
    }

    /// Distinct external bucket names.
    pub fn external_buckets(&self) -> BTreeSet<String> {
        self.external_by_fqn.values().cloned().collect()
    }
}
