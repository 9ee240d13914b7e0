#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Opcodes a test method body can use.
pub enum CodeOp {
    /// `invokestatic owner.name:desc`.
    InvokeStatic(&'static str, &'static str, &'static str),
    /// `invokevirtual owner.name:desc`.
    InvokeVirtual(&'static str, &'static str, &'static str),
    /// `getfield owner.name:desc`.
    GetField(&'static str, &'static str, &'static str),
    /// `new type`.
    New(&'static str),
    /// `return`.
    Return,
}

struct FieldSpec {
    access: u16,
    name: String,
    descriptor: String,
}

struct MethodSpec {
    access: u16,
    name: String,
    descriptor: String,
    code: Vec<CodeOp>,
}

/// Assembles a minimal, well-formed class file in memory.
pub struct ClassFileBuilder {
    this: String,
    super_name: String,
    access: u16,
    interfaces: Vec<String>,
    annotations: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

impl ClassFileBuilder {
    pub fn new(internal_name: &str) -> Self {
        ClassFileBuilder {
            this: internal_name.to_string(),
            super_name: "java/lang/Object".to_string(),
            access: 0x0001,
            interfaces: vec![],
            annotations: vec![],
            fields: vec![],
            methods: vec![],
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn extends(mut self, internal_name: &str) -> Self {
        self.super_name = internal_name.to_string();
        self
    }

    pub fn implements(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    /// Class-level annotation by FQN (converted to descriptor form).
    pub fn annotated(mut self, fqn: &str) -> Self {
        self.annotations.push(format!("L{};", fqn.replace('.', "/")));
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str, code: Vec<CodeOp>) -> Self {
        self.methods.push(MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = Pool::default();

        let this_class = pool.class(&self.this);
        let super_class = pool.class(&self.super_name);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        let mut field_bytes = Vec::new();
        for field in &self.fields {
            let name = pool.utf8(&field.name);
            let desc = pool.utf8(&field.descriptor);
            field_bytes.push((field.access, name, desc));
        }

        struct BuiltMethod {
            access: u16,
            name: u16,
            desc: u16,
            code: Option<Vec<u8>>,
            code_attr: Option<u16>,
        }
        let mut method_bytes = Vec::new();
        for method in &self.methods {
            let name = pool.utf8(&method.name);
            let desc = pool.utf8(&method.descriptor);
            let code = if method.code.is_empty() {
                None
            } else {
                let mut body = Vec::new();
                for op in &method.code {
                    match op {
                        CodeOp::InvokeStatic(owner, name, desc) => {
                            body.push(0xB8);
                            let index = pool.method_ref(owner, name, desc);
                            body.extend_from_slice(&index.to_be_bytes());
                        }
                        CodeOp::InvokeVirtual(owner, name, desc) => {
                            body.push(0xB6);
                            let index = pool.method_ref(owner, name, desc);
                            body.extend_from_slice(&index.to_be_bytes());
                        }
                        CodeOp::GetField(owner, name, desc) => {
                            body.push(0xB4);
                            let index = pool.field_ref(owner, name, desc);
                            body.extend_from_slice(&index.to_be_bytes());
                        }
                        CodeOp::New(class) => {
                            body.push(0xBB);
                            let index = pool.class(class);
                            body.extend_from_slice(&index.to_be_bytes());
                        }
                        CodeOp::Return => body.push(0xB1),
                    }
                }
                Some(body)
            };
            let code_attr = code.as_ref().map(|_| pool.utf8("Code"));
            method_bytes.push(BuiltMethod { access: method.access, name, desc, code, code_attr });
        }

        let annotations: Vec<u16> = self.annotations.iter().map(|a| pool.utf8(a)).collect();
        let annotations_attr = if annotations.is_empty() {
            None
        } else {
            Some(pool.utf8("RuntimeVisibleAnnotations"))
        };

        let mut bytes: Vec<u8> = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        bytes.extend_from_slice(&((pool.entries.len() + 1) as u16).to_be_bytes());
        for entry in &pool.entries {
            bytes.extend_from_slice(entry);
        }
        bytes.extend_from_slice(&self.access.to_be_bytes());
        bytes.extend_from_slice(&this_class.to_be_bytes());
        bytes.extend_from_slice(&super_class.to_be_bytes());
        bytes.extend_from_slice(&(interfaces.len() as u16).to_be_bytes());
        for interface in interfaces {
            bytes.extend_from_slice(&interface.to_be_bytes());
        }

        bytes.extend_from_slice(&(field_bytes.len() as u16).to_be_bytes());
        for (access, name, desc) in field_bytes {
            bytes.extend_from_slice(&access.to_be_bytes());
            bytes.extend_from_slice(&name.to_be_bytes());
            bytes.extend_from_slice(&desc.to_be_bytes());
            bytes.extend_from_slice(&0u16.to_be_bytes());
        }

        bytes.extend_from_slice(&(method_bytes.len() as u16).to_be_bytes());
        for method in method_bytes {
            bytes.extend_from_slice(&method.access.to_be_bytes());
            bytes.extend_from_slice(&method.name.to_be_bytes());
            bytes.extend_from_slice(&method.desc.to_be_bytes());
            match (method.code, method.code_attr) {
                (Some(body), Some(code_attr)) => {
                    bytes.extend_from_slice(&1u16.to_be_bytes());
                    bytes.extend_from_slice(&code_attr.to_be_bytes());
                    let mut attr = Vec::new();
                    attr.extend_from_slice(&8u16.to_be_bytes()); // max_stack
                    attr.extend_from_slice(&8u16.to_be_bytes()); // max_locals
                    attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
                    attr.extend_from_slice(&body);
                    attr.extend_from_slice(&0u16.to_be_bytes()); // exception table
                    attr.extend_from_slice(&0u16.to_be_bytes()); // attributes
                    bytes.extend_from_slice(&(attr.len() as u32).to_be_bytes());
                    bytes.extend_from_slice(&attr);
                }
                _ => bytes.extend_from_slice(&0u16.to_be_bytes()),
            }
        }

        match annotations_attr {
            Some(attr_name) => {
                bytes.extend_from_slice(&1u16.to_be_bytes());
                bytes.extend_from_slice(&attr_name.to_be_bytes());
                let mut attr = Vec::new();
                attr.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
                for type_index in annotations {
                    attr.extend_from_slice(&type_index.to_be_bytes());
                    attr.extend_from_slice(&0u16.to_be_bytes()); // no element pairs
                }
                bytes.extend_from_slice(&(attr.len() as u32).to_be_bytes());
                bytes.extend_from_slice(&attr);
            }
            None => bytes.extend_from_slice(&0u16.to_be_bytes()),
        }
        bytes
    }
}

/// Deduplicating constant pool assembler.
#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    utf8_cache: HashMap<String, u16>,
    class_cache: HashMap<String, u16>,
    nat_cache: HashMap<(u16, u16), u16>,
    member_cache: HashMap<(u8, u16, u16), u16>,
}

impl Pool {
    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8_cache.get(value) {
            return index;
        }
        let mut entry = vec![1u8];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        let index = self.push(entry);
        self.utf8_cache.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        if let Some(&index) = self.class_cache.get(internal_name) {
            return index;
        }
        let name = self.utf8(internal_name);
        let mut entry = vec![7u8];
        entry.extend_from_slice(&name.to_be_bytes());
        let index = self.push(entry);
        self.class_cache.insert(internal_name.to_string(), index);
        index
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let desc = self.utf8(descriptor);
        if let Some(&index) = self.nat_cache.get(&(name, desc)) {
            return index;
        }
        let mut entry = vec![12u8];
        entry.extend_from_slice(&name.to_be_bytes());
        entry.extend_from_slice(&desc.to_be_bytes());
        let index = self.push(entry);
        self.nat_cache.insert((name, desc), index);
        index
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        if let Some(&index) = self.member_cache.get(&(tag, class, nat)) {
            return index;
        }
        let mut entry = vec![tag];
        entry.extend_from_slice(&class.to_be_bytes());
        entry.extend_from_slice(&nat.to_be_bytes());
        let index = self.push(entry);
        self.member_cache.insert((tag, class, nat), index);
        index
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, owner, name, descriptor)
    }

    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }
}

/// Write a class file under `<root>/out/<internal>.class`.
pub fn write_class(root: &Path, builder: ClassFileBuilder) {
    let internal = builder.this.clone();
    let path = root.join("out").join(format!("{}.class", internal));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, builder.build()).unwrap();
}

/// Write the policy file at the project root.
pub fn write_policy(root: &Path, policy: &str) {
    fs::write(root.join("shamash.yml"), policy).unwrap();
}

/// A policy header scanning `out/` with the given extra sections appended.
pub fn policy_with(sections: &str) -> String {
    format!("version: 1\nproject:\n  bytecodeRoots: [\"out\"]\n{}", sections)
}
