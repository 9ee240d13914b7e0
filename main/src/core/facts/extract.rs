use std::collections::BTreeSet;

use crate::api::facts::{
    access, ClassFact, DependencyEdge, DependencyKind, FieldFact, MethodFact, SourceLocation, TypeRef,
};
use crate::core::facts::classfile::{
    parse_class, parse_method_descriptor, ClassEvent, ClassParseError, MemberOp, TypeOp,
};

/// Extraction output for a single class.
#[derive(Debug, Clone)]
pub struct ClassExtraction {
    /// The class fact.
    pub class: ClassFact,
    /// Declared methods, in declaration order.
    pub methods: Vec<MethodFact>,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldFact>,
    /// Dependency edges discovered in this class, deduped.
    pub edges: Vec<DependencyEdge>,
    /// Members referenced from this class's method bodies, including
    /// intra-class references.
    pub member_refs: Vec<(String, String)>,
}

#[derive(Clone, Copy)]
enum Element {
    Class,
    Field(usize),
    Method(usize),
}

struct Builder {
    location: SourceLocation,
    class: Option<ClassFact>,
    methods: Vec<MethodFact>,
    fields: Vec<FieldFact>,
    edges: Vec<DependencyEdge>,
    edge_seen: BTreeSet<(String, DependencyKind, Option<String>)>,
    member_refs: Vec<(String, String)>,
    current: Element,
}

impl Builder {
    fn new(location: SourceLocation) -> Self {
        Builder {
            location,
            class: None,
            methods: Vec::new(),
            fields: Vec::new(),
            edges: Vec::new(),
            edge_seen: BTreeSet::new(),
            member_refs: Vec::new(),
            current: Element::Class,
        }
    }

    fn this_fqn(&self) -> &str {
        self.class.as_ref().map(|c| c.fqn()).unwrap_or("")
    }

    /// Record an edge unless it is a self-loop, a primitive/void target, or
    /// a duplicate within this class.
    fn edge(&mut self, to: TypeRef, kind: DependencyKind, detail: Option<String>) {
        if to.is_primitive || to.fqn == self.this_fqn() {
            return;
        }
        let key = (to.fqn.clone(), kind, detail.clone());
        if !self.edge_seen.insert(key) {
            return;
        }
        self.edges.push(DependencyEdge {
            from_fqn: self.this_fqn().to_string(),
            to,
            kind,
            detail,
            location: self.location.clone(),
        });
    }

    fn on_event(&mut self, event: ClassEvent) {
        match event {
            ClassEvent::ClassStart { access: flags, this_class, super_class, interfaces } => {
                let type_ref = TypeRef::from_internal_name(&this_class);
                let super_type = super_class.as_deref().map(TypeRef::from_internal_name);
                let interface_refs: Vec<TypeRef> =
                    interfaces.iter().map(|i| TypeRef::from_internal_name(i)).collect();
                self.class = Some(ClassFact {
                    type_ref,
                    access: flags,
                    super_type: super_type.clone(),
                    interfaces: interface_refs.clone(),
                    annotations: BTreeSet::new(),
                    has_main_method: false,
                    location: self.location.clone(),
                });
                if let Some(sup) = super_type {
                    self.edge(sup, DependencyKind::Extends, None);
                }
                for iface in interface_refs {
                    self.edge(iface, DependencyKind::Implements, None);
                }
            }
            ClassEvent::SourceFile { name } => {
                if let Some(class) = self.class.as_mut() {
                    class.location.source_file = Some(name.clone());
                }
                self.location.source_file = Some(name);
            }
            ClassEvent::Annotation { type_desc } => {
                let anno = TypeRef::from_descriptor(&type_desc);
                match self.current {
                    Element::Class => {
                        if let Some(class) = self.class.as_mut() {
                            class.annotations.insert(anno.fqn.clone());
                        }
                    }
                    Element::Field(i) => {
                        self.fields[i].annotations.insert(anno.fqn.clone());
                    }
                    Element::Method(i) => {
                        self.methods[i].annotations.insert(anno.fqn.clone());
                    }
                }
                self.edge(anno, DependencyKind::Annotation, None);
            }
            ClassEvent::Field { access: flags, name, descriptor, signature } => {
                let field_type = TypeRef::from_descriptor(&descriptor);
                let stored_type = if field_type.is_primitive { None } else { Some(field_type.clone()) };
                self.fields.push(FieldFact {
                    owner_fqn: self.this_fqn().to_string(),
                    name,
                    descriptor,
                    signature,
                    access: flags,
                    field_type: stored_type,
                    annotations: BTreeSet::new(),
                });
                self.current = Element::Field(self.fields.len() - 1);
                self.edge(field_type, DependencyKind::FieldType, None);
            }
            ClassEvent::Method { access: flags, name, descriptor, signature, exceptions } => {
                let is_constructor = name == "<init>";
                let (param_descs, return_desc) = match parse_method_descriptor(&descriptor) {
                    Ok(parts) => parts,
                    Err(_) => (Vec::new(), "V".to_string()),
                };
                let param_types: Vec<TypeRef> =
                    param_descs.iter().map(|d| TypeRef::from_descriptor(d)).collect();
                let return_ref = TypeRef::from_descriptor(&return_desc);
                let return_type = if return_ref.fqn == "void" { None } else { Some(return_ref.clone()) };
                let mut throws: Vec<TypeRef> =
                    exceptions.iter().map(|e| TypeRef::from_internal_name(e)).collect();
                throws.sort();

                let is_main = name == "main"
                    && descriptor == "([Ljava/lang/String;)V"
                    && flags & access::PUBLIC != 0
                    && flags & access::STATIC != 0;
                if is_main {
                    if let Some(class) = self.class.as_mut() {
                        class.has_main_method = true;
                    }
                }

                for p in &param_types {
                    self.edge(p.clone(), DependencyKind::ParameterType, None);
                }
                if return_ref.fqn != "void" {
                    self.edge(return_ref, DependencyKind::ReturnType, None);
                }
                for t in &throws {
                    self.edge(t.clone(), DependencyKind::Throws, None);
                }

                self.methods.push(MethodFact {
                    owner_fqn: self.this_fqn().to_string(),
                    name,
                    descriptor,
                    signature,
                    access: flags,
                    is_constructor,
                    return_type,
                    param_types,
                    throws,
                    annotations: BTreeSet::new(),
                });
                self.current = Element::Method(self.methods.len() - 1);
            }
            ClassEvent::MemberInsn { op, owner, name, descriptor: _ } => {
                let target = TypeRef::from_internal_name(&owner);
                if !target.is_primitive {
                    self.member_refs.push((target.fqn.clone(), name.clone()));
                }
                let kind = match op {
                    MemberOp::MethodCall => DependencyKind::MethodCall,
                    MemberOp::FieldAccess => DependencyKind::FieldAccess,
                };
                self.edge(target, kind, Some(name));
            }
            ClassEvent::TypeInsn { op, internal } => {
                let target = TypeRef::from_internal_name(&internal);
                let kind = match op {
                    TypeOp::New => DependencyKind::New,
                    TypeOp::Instanceof => DependencyKind::Instanceof,
                };
                self.edge(target, kind, None);
            }
            ClassEvent::ClassEnd => {}
        }
    }
}

/// Extract all facts from one class file.
pub fn extract_class(bytes: &[u8], location: SourceLocation) -> Result<ClassExtraction, ClassParseError> {
    let mut builder = Builder::new(location);
    parse_class(bytes, |event| builder.on_event(event))?;
    let class = builder.class.ok_or(ClassParseError {
        offset: 0,
        message: "class file produced no class header".to_string(),
    })?;
    let mut member_refs = builder.member_refs;
    member_refs.sort();
    member_refs.dedup();
    Ok(ClassExtraction {
        class,
        methods: builder.methods,
        fields: builder.fields,
        edges: builder.edges,
        member_refs,
    })
}

/// Parse only the class header, cheaply, for external archive indexing.
pub fn extract_class_name(bytes: &[u8]) -> Result<String, ClassParseError> {
    let mut name = None;
    // The decoder streams events in order, so the header arrives first; the
    // remainder of the file is still walked but discarded.
    parse_class(bytes, |event| {
        if let ClassEvent::ClassStart { this_class, .. } = event {
            if name.is_none() {
                name = Some(this_class);
            }
        }
    })?;
    name.map(|n| TypeRef::from_internal_name(&n).fqn).ok_or(ClassParseError {
        offset: 0,
        message: "class file produced no class header".to_string(),
    })
}
