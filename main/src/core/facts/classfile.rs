//! Streaming class-file decoder.
//!
//! Walks the container format directly (constant pool, fields, methods,
//! attributes, Code instruction stream) and emits typed events; no AST is
//! materialized. The extractor accumulates events into fact records.

use std::fmt;

/// Parse failure with the byte offset where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassParseError {
    /// Byte offset into the class file.
    pub offset: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ClassParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed class file at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ClassParseError {}

/// Member-reference opcodes grouped by edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    /// invokevirtual / invokespecial / invokestatic / invokeinterface.
    MethodCall,
    /// getstatic / putstatic / getfield / putfield.
    FieldAccess,
}

/// Type-reference opcodes grouped by edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    /// new / anewarray / multianewarray.
    New,
    /// checkcast / instanceof.
    Instanceof,
}

/// One decoded event. Annotation events apply to the most recently started
/// element (the class until the first member); instruction events apply to
/// the most recently started method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassEvent {
    /// Header: access flags, this/super internal names, interfaces.
    ClassStart {
        /// Class access flags.
        access: u16,
        /// Internal name of this class.
        this_class: String,
        /// Internal name of the super class, absent for `java/lang/Object`.
        super_class: Option<String>,
        /// Internal names of directly implemented interfaces.
        interfaces: Vec<String>,
    },
    /// The `SourceFile` attribute.
    SourceFile {
        /// Source file name as compiled.
        name: String,
    },
    /// A runtime-visible or -invisible annotation on the current element.
    Annotation {
        /// Annotation type descriptor (`Lcom/a/Anno;`).
        type_desc: String,
    },
    /// One declared field.
    Field {
        /// Field access flags.
        access: u16,
        /// Field name.
        name: String,
        /// Field descriptor.
        descriptor: String,
        /// Generic signature, when present.
        signature: Option<String>,
    },
    /// One declared method. Instruction events follow until the next
    /// `Field`/`Method` or `ClassEnd`.
    Method {
        /// Method access flags.
        access: u16,
        /// Method name (`<init>` for constructors).
        name: String,
        /// Method descriptor.
        descriptor: String,
        /// Generic signature, when present.
        signature: Option<String>,
        /// Internal names from the `Exceptions` attribute.
        exceptions: Vec<String>,
    },
    /// A member reference inside the current method body.
    MemberInsn {
        /// Call or field access.
        op: MemberOp,
        /// Internal name of the owning class.
        owner: String,
        /// Member name.
        name: String,
        /// Member descriptor.
        descriptor: String,
    },
    /// A type reference inside the current method body.
    TypeInsn {
        /// Allocation or type test.
        op: TypeOp,
        /// Internal name (may be an array form).
        internal: String,
    },
    /// End of the class file.
    ClassEnd,
}

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn err(&self, message: impl Into<String>) -> ClassParseError {
        ClassParseError { offset: self.pos, message: message.into() }
    }

    fn u8(&mut self) -> Result<u8, ClassParseError> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.err("unexpected end of file"))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, ClassParseError> {
        Ok(((self.u8()? as u16) << 8) | self.u8()? as u16)
    }

    fn u32(&mut self) -> Result<u32, ClassParseError> {
        Ok(((self.u16()? as u32) << 16) | self.u16()? as u32)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassParseError> {
        if self.pos + n > self.bytes.len() {
            return Err(self.err(format!("unexpected end of file ({} bytes wanted)", n)));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), ClassParseError> {
        self.take(n).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Constant pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CpEntry {
    Utf8(String),
    Class(u16),
    Member { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    Other,
    Unused,
}

struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    fn parse(cur: &mut Cursor<'_>) -> Result<ConstantPool, ClassParseError> {
        let count = cur.u16()? as usize;
        let mut entries = vec![CpEntry::Unused; count.max(1)];
        let mut i = 1;
        while i < count {
            let tag = cur.u8()?;
            let entry = match tag {
                1 => {
                    let len = cur.u16()? as usize;
                    let bytes = cur.take(len)?;
                    CpEntry::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                3 | 4 => {
                    cur.skip(4)?;
                    CpEntry::Other
                }
                5 | 6 => {
                    cur.skip(8)?;
                    // Longs and doubles occupy two pool slots.
                    entries[i] = CpEntry::Other;
                    i += 2;
                    continue;
                }
                7 => CpEntry::Class(cur.u16()?),
                8 => {
                    cur.skip(2)?;
                    CpEntry::Other
                }
                9 | 10 | 11 => CpEntry::Member { class: cur.u16()?, name_and_type: cur.u16()? },
                12 => CpEntry::NameAndType { name: cur.u16()?, descriptor: cur.u16()? },
                15 => {
                    cur.skip(3)?;
                    CpEntry::Other
                }
                16 => {
                    cur.skip(2)?;
                    CpEntry::Other
                }
                17 | 18 => {
                    cur.skip(4)?;
                    CpEntry::Other
                }
                19 | 20 => {
                    cur.skip(2)?;
                    CpEntry::Other
                }
                other => return Err(cur.err(format!("unknown constant pool tag {}", other))),
            };
            entries[i] = entry;
            i += 1;
        }
        Ok(ConstantPool { entries })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.entries.get(index as usize) {
            Some(CpEntry::Utf8(s)) => Ok(s),
            _ => Err(ClassParseError {
                offset: 0,
                message: format!("constant pool index {} is not a Utf8 entry", index),
            }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.entries.get(index as usize) {
            Some(CpEntry::Class(name_index)) => self.utf8(*name_index),
            _ => Err(ClassParseError {
                offset: 0,
                message: format!("constant pool index {} is not a Class entry", index),
            }),
        }
    }

    fn member(&self, index: u16) -> Result<(String, String, String), ClassParseError> {
        match self.entries.get(index as usize) {
            Some(CpEntry::Member { class, name_and_type }) => {
                let owner = self.class_name(*class)?.to_string();
                match self.entries.get(*name_and_type as usize) {
                    Some(CpEntry::NameAndType { name, descriptor }) => Ok((
                        owner,
                        self.utf8(*name)?.to_string(),
                        self.utf8(*descriptor)?.to_string(),
                    )),
                    _ => Err(ClassParseError {
                        offset: 0,
                        message: format!("constant pool index {} is not a NameAndType entry", name_and_type),
                    }),
                }
            }
            _ => Err(ClassParseError {
                offset: 0,
                message: format!("constant pool index {} is not a member reference", index),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Split a method descriptor into parameter descriptors and the return
/// descriptor.
pub fn parse_method_descriptor(desc: &str) -> Result<(Vec<String>, String), ClassParseError> {
    let bad = |message: &str| ClassParseError {
        offset: 0,
        message: format!("bad method descriptor '{}': {}", desc, message),
    };
    let rest = desc.strip_prefix('(').ok_or_else(|| bad("missing '('"))?;
    let close = rest.find(')').ok_or_else(|| bad("missing ')'"))?;
    let (params_str, ret) = (&rest[..close], &rest[close + 1..]);
    if ret.is_empty() {
        return Err(bad("missing return type"));
    }

    let mut params = Vec::new();
    let chars: Vec<char> = params_str.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let start = i;
        while chars[i] == '[' {
            i += 1;
            if i >= chars.len() {
                return Err(bad("truncated array type"));
            }
        }
        match chars[i] {
            'L' => {
                while i < chars.len() && chars[i] != ';' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(bad("unterminated object type"));
                }
                i += 1;
            }
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {
                i += 1;
            }
            other => return Err(bad(&format!("unexpected character '{}'", other))),
        }
        params.push(chars[start..i].iter().collect());
    }
    Ok((params, ret.to_string()))
}

// ---------------------------------------------------------------------------
// Attribute helpers
// ---------------------------------------------------------------------------

/// Skip one `element_value` of an annotation.
fn skip_element_value(cur: &mut Cursor<'_>) -> Result<(), ClassParseError> {
    let tag = cur.u8()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => cur.skip(2),
        b'e' => cur.skip(4),
        b'@' => skip_annotation(cur),
        b'[' => {
            let n = cur.u16()?;
            for _ in 0..n {
                skip_element_value(cur)?;
            }
            Ok(())
        }
        other => Err(cur.err(format!("unknown element_value tag {}", other as char))),
    }
}

/// Skip one annotation body after its `type_index` has been read.
fn skip_annotation_pairs(cur: &mut Cursor<'_>) -> Result<(), ClassParseError> {
    let pairs = cur.u16()?;
    for _ in 0..pairs {
        cur.skip(2)?; // element_name_index
        skip_element_value(cur)?;
    }
    Ok(())
}

fn skip_annotation(cur: &mut Cursor<'_>) -> Result<(), ClassParseError> {
    cur.skip(2)?; // type_index
    skip_annotation_pairs(cur)
}

/// Read a `RuntimeVisibleAnnotations`-shaped attribute, emitting one
/// `Annotation` event per entry.
fn read_annotations(
    cur: &mut Cursor<'_>,
    pool: &ConstantPool,
    sink: &mut impl FnMut(ClassEvent),
) -> Result<(), ClassParseError> {
    let count = cur.u16()?;
    for _ in 0..count {
        let type_index = cur.u16()?;
        sink(ClassEvent::Annotation { type_desc: pool.utf8(type_index)?.to_string() });
        skip_annotation_pairs(cur)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Instruction stream
// ---------------------------------------------------------------------------

/// Operand byte count for fixed-length opcodes; `None` for tableswitch,
/// lookupswitch, and wide, which are variable.
fn operand_len(op: u8) -> Result<Option<usize>, ClassParseError> {
    let len = match op {
        0x00..=0x0f => 0,          // nop, constants
        0x10 => 1,                 // bipush
        0x11 => 2,                 // sipush
        0x12 => 1,                 // ldc
        0x13 | 0x14 => 2,          // ldc_w, ldc2_w
        0x15..=0x19 => 1,          // loads with index
        0x1a..=0x35 => 0,          // short-form loads, array loads
        0x36..=0x3a => 1,          // stores with index
        0x3b..=0x83 => 0,          // short-form stores, stack, arithmetic
        0x84 => 2,                 // iinc
        0x85..=0x98 => 0,          // conversions, comparisons
        0x99..=0xa8 => 2,          // ifs, goto, jsr
        0xa9 => 1,                 // ret
        0xaa | 0xab => return Ok(None), // tableswitch, lookupswitch
        0xac..=0xb1 => 0,          // returns
        0xb2..=0xb8 => 2,          // field access, invokes
        0xb9 | 0xba => 4,          // invokeinterface, invokedynamic
        0xbb => 2,                 // new
        0xbc => 1,                 // newarray
        0xbd => 2,                 // anewarray
        0xbe | 0xbf => 0,          // arraylength, athrow
        0xc0 | 0xc1 => 2,          // checkcast, instanceof
        0xc2 | 0xc3 => 0,          // monitorenter, monitorexit
        0xc4 => return Ok(None),   // wide
        0xc5 => 3,                 // multianewarray
        0xc6 | 0xc7 => 2,          // ifnull, ifnonnull
        0xc8 | 0xc9 => 4,          // goto_w, jsr_w
        other => {
            return Err(ClassParseError {
                offset: 0,
                message: format!("unknown opcode 0x{:02x}", other),
            })
        }
    };
    Ok(Some(len))
}

/// Walk a method's bytecode, emitting member/type reference events.
fn walk_code(
    code: &[u8],
    pool: &ConstantPool,
    sink: &mut impl FnMut(ClassEvent),
) -> Result<(), ClassParseError> {
    let mut cur = Cursor::new(code);
    while cur.pos < code.len() {
        let op = cur.u8()?;
        match op {
            // Field reads/writes.
            0xb2..=0xb5 => {
                let index = cur.u16()?;
                let (owner, name, descriptor) = pool.member(index)?;
                sink(ClassEvent::MemberInsn { op: MemberOp::FieldAccess, owner, name, descriptor });
            }
            // invokevirtual, invokespecial, invokestatic.
            0xb6..=0xb8 => {
                let index = cur.u16()?;
                let (owner, name, descriptor) = pool.member(index)?;
                sink(ClassEvent::MemberInsn { op: MemberOp::MethodCall, owner, name, descriptor });
            }
            // invokeinterface: index + count + zero.
            0xb9 => {
                let index = cur.u16()?;
                cur.skip(2)?;
                let (owner, name, descriptor) = pool.member(index)?;
                sink(ClassEvent::MemberInsn { op: MemberOp::MethodCall, owner, name, descriptor });
            }
            // invokedynamic references a bootstrap call site, not a class.
            0xba => {
                cur.skip(4)?;
            }
            0xbb => {
                let index = cur.u16()?;
                sink(ClassEvent::TypeInsn { op: TypeOp::New, internal: pool.class_name(index)?.to_string() });
            }
            0xbd => {
                let index = cur.u16()?;
                sink(ClassEvent::TypeInsn { op: TypeOp::New, internal: pool.class_name(index)?.to_string() });
            }
            0xc0 | 0xc1 => {
                let index = cur.u16()?;
                sink(ClassEvent::TypeInsn {
                    op: TypeOp::Instanceof,
                    internal: pool.class_name(index)?.to_string(),
                });
            }
            0xc5 => {
                let index = cur.u16()?;
                cur.skip(1)?;
                sink(ClassEvent::TypeInsn { op: TypeOp::New, internal: pool.class_name(index)?.to_string() });
            }
            0xaa => {
                // tableswitch: pad to 4-byte alignment from the code start.
                let pad = (4 - (cur.pos % 4)) % 4;
                cur.skip(pad)?;
                cur.skip(4)?; // default
                let low = cur.u32()? as i32;
                let high = cur.u32()? as i32;
                if high < low {
                    return Err(cur.err("tableswitch high < low"));
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                cur.skip(entries * 4)?;
            }
            0xab => {
                let pad = (4 - (cur.pos % 4)) % 4;
                cur.skip(pad)?;
                cur.skip(4)?; // default
                let npairs = cur.u32()? as usize;
                cur.skip(npairs * 8)?;
            }
            0xc4 => {
                // wide: modified opcode + u16 index, iinc also carries a u16 constant.
                let widened = cur.u8()?;
                if widened == 0x84 {
                    cur.skip(4)?;
                } else {
                    cur.skip(2)?;
                }
            }
            other => {
                match operand_len(other)? {
                    Some(len) => cur.skip(len)?,
                    None => unreachable!("variable-length opcodes handled above"),
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Top-level parse
// ---------------------------------------------------------------------------

const MAGIC: u32 = 0xCAFE_BABE;

/// Decode one class file, pushing events into `sink`.
pub fn parse_class(bytes: &[u8], mut sink: impl FnMut(ClassEvent)) -> Result<(), ClassParseError> {
    let mut cur = Cursor::new(bytes);
    if cur.u32()? != MAGIC {
        return Err(cur.err("bad magic number"));
    }
    cur.skip(4)?; // minor, major

    let pool = ConstantPool::parse(&mut cur)?;

    let access = cur.u16()?;
    let this_index = cur.u16()?;
    let super_index = cur.u16()?;
    let this_class = pool.class_name(this_index)?.to_string();
    let super_class = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?.to_string())
    };

    let interface_count = cur.u16()? as usize;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        let index = cur.u16()?;
        interfaces.push(pool.class_name(index)?.to_string());
    }

    sink(ClassEvent::ClassStart { access, this_class, super_class, interfaces });

    // Fields.
    let field_count = cur.u16()?;
    for _ in 0..field_count {
        let access = cur.u16()?;
        let name = pool.utf8(cur.u16()?)?.to_string();
        let descriptor = pool.utf8(cur.u16()?)?.to_string();
        let mut signature = None;
        let mut annotations: Vec<ClassEvent> = Vec::new();
        read_member_attributes(&mut cur, &pool, &mut signature, None, &mut |e| annotations.push(e), None)?;
        sink(ClassEvent::Field { access, name, descriptor, signature });
        for event in annotations {
            sink(event);
        }
    }

    // Methods.
    let method_count = cur.u16()?;
    for _ in 0..method_count {
        let access = cur.u16()?;
        let name = pool.utf8(cur.u16()?)?.to_string();
        let descriptor = pool.utf8(cur.u16()?)?.to_string();
        let mut signature = None;
        let mut exceptions = Vec::new();
        let mut deferred: Vec<ClassEvent> = Vec::new();
        let mut code: Option<Vec<u8>> = None;
        read_member_attributes(
            &mut cur,
            &pool,
            &mut signature,
            Some(&mut exceptions),
            &mut |e| deferred.push(e),
            Some(&mut code),
        )?;
        sink(ClassEvent::Method { access, name, descriptor, signature, exceptions });
        for event in deferred {
            sink(event);
        }
        if let Some(code) = code {
            walk_code(&code, &pool, &mut sink)?;
        }
    }

    // Class attributes.
    let attr_count = cur.u16()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(cur.u16()?)?.to_string();
        let attr_len = cur.u32()? as usize;
        match attr_name.as_str() {
            "SourceFile" => {
                let index = cur.u16()?;
                sink(ClassEvent::SourceFile { name: pool.utf8(index)?.to_string() });
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                read_annotations(&mut cur, &pool, &mut sink)?;
            }
            _ => cur.skip(attr_len)?,
        }
    }

    sink(ClassEvent::ClassEnd);
    Ok(())
}

/// Read the attribute table of a field or method, capturing `Signature`,
/// `Exceptions`, annotations, and (for methods) the `Code` body.
fn read_member_attributes(
    cur: &mut Cursor<'_>,
    pool: &ConstantPool,
    signature: &mut Option<String>,
    mut exceptions: Option<&mut Vec<String>>,
    annotation_sink: &mut impl FnMut(ClassEvent),
    mut code: Option<&mut Option<Vec<u8>>>,
) -> Result<(), ClassParseError> {
    let attr_count = cur.u16()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(cur.u16()?)?.to_string();
        let attr_len = cur.u32()? as usize;
        match attr_name.as_str() {
            "Signature" => {
                let index = cur.u16()?;
                *signature = Some(pool.utf8(index)?.to_string());
            }
            "Exceptions" => {
                let count = cur.u16()?;
                match exceptions.as_deref_mut() {
                    Some(out) => {
                        for _ in 0..count {
                            let index = cur.u16()?;
                            out.push(pool.class_name(index)?.to_string());
                        }
                    }
                    None => cur.skip(count as usize * 2)?,
                }
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                read_annotations(cur, pool, annotation_sink)?;
            }
            "Code" => {
                let end = cur.pos + attr_len;
                cur.skip(4)?; // max_stack, max_locals
                let code_len = cur.u32()? as usize;
                let body = cur.take(code_len)?.to_vec();
                if let Some(slot) = code.as_deref_mut() {
                    *slot = Some(body);
                }
                // Exception table and nested attributes are not needed.
                let remaining = end
                    .checked_sub(cur.pos)
                    .ok_or_else(|| cur.err("Code attribute length mismatch"))?;
                cur.skip(remaining)?;
            }
            _ => cur.skip(attr_len)?,
        }
    }
    Ok(())
}
