//! In-memory model of one compiled class's API surface.
//!
//! The model is a plain value type, rebuilt from raw bytes on every read and
//! never shared mutably between threads. Parsing keeps only what the stub
//! needs (declared members, hierarchy, flags, annotations by type); method
//! bodies, debug tables and nest/record metadata are discarded.

use crate::error::{Result, StubError};
use ristretto_classfile::attributes::{Annotation, Attribute, InnerClass, Instruction};
use ristretto_classfile::{
    ClassFile, Constant, ConstantPool, Field, FieldAccessFlags, FieldType, Method,
    MethodAccessFlags, Version,
};
use ristretto_classfile::{BaseType, ClassAccessFlags};
use std::io::Cursor;

/// A compile-time constant attached to a `static final` field.
#[derive(Debug, Clone)]
pub enum ConstValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

// Floats compare by bit pattern so NaN-valued constants still intersect
// deterministically.
impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Integer(a), ConstValue::Integer(b)) => a == b,
            (ConstValue::Long(a), ConstValue::Long(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::String(a), ConstValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

/// An annotation reduced to its type descriptor and retention visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiAnnotation {
    pub descriptor: String,
    pub visible: bool,
}

/// One `InnerClasses` record linking a nested class to its enclosing class.
#[derive(Debug, Clone)]
pub struct ApiInnerClass {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub flags: ristretto_classfile::attributes::NestedClassAccessFlags,
}

#[derive(Debug, Clone)]
pub struct ApiField {
    pub flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub field_type: FieldType,
    pub constant: Option<ConstValue>,
    pub annotations: Vec<ApiAnnotation>,
    pub signature: Option<String>,
    pub deprecated: bool,
}

#[derive(Debug, Clone)]
pub struct ApiMethod {
    pub flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub exceptions: Vec<String>,
    pub annotations: Vec<ApiAnnotation>,
    pub signature: Option<String>,
    pub deprecated: bool,
}

/// Structured view of one compiled class, sufficient to re-emit a loadable
/// stub of its declared API surface.
#[derive(Debug, Clone)]
pub struct ApiClass {
    pub version: Version,
    pub flags: ClassAccessFlags,
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ApiField>,
    pub methods: Vec<ApiMethod>,
    pub annotations: Vec<ApiAnnotation>,
    pub inner_classes: Vec<ApiInnerClass>,
    pub signature: Option<String>,
    pub deprecated: bool,
}

fn parse_annotations(
    pool: &ConstantPool,
    annotations: &[Annotation],
    visible: bool,
    out: &mut Vec<ApiAnnotation>,
) -> ristretto_classfile::Result<()> {
    for annotation in annotations {
        out.push(ApiAnnotation {
            descriptor: pool.try_get_utf8(annotation.type_index)?.to_string(),
            visible,
        });
    }
    Ok(())
}

impl ApiClass {
    /// Parses a fresh representation from raw classfile bytes.
    pub fn from_bytes(entry: &str, bytes: &[u8]) -> Result<Self> {
        Self::parse(bytes).map_err(|source| StubError::ClassParse {
            entry: entry.to_string(),
            source,
        })
    }

    fn parse(bytes: &[u8]) -> ristretto_classfile::Result<Self> {
        let class_file = ClassFile::from_bytes(&mut Cursor::new(bytes.to_vec()))?;
        let pool = &class_file.constant_pool;

        let name = pool.try_get_class(class_file.this_class)?.to_string();
        let superclass = if class_file.super_class == 0 {
            None
        } else {
            Some(pool.try_get_class(class_file.super_class)?.to_string())
        };
        let mut interfaces = Vec::with_capacity(class_file.interfaces.len());
        for index in &class_file.interfaces {
            interfaces.push(pool.try_get_class(*index)?.to_string());
        }

        let mut fields = Vec::with_capacity(class_file.fields.len());
        for field in &class_file.fields {
            let mut constant = None;
            let mut annotations = Vec::new();
            let mut signature = None;
            let mut deprecated = false;
            for attribute in &field.attributes {
                match attribute {
                    Attribute::ConstantValue {
                        constant_value_index,
                        ..
                    } => {
                        constant = parse_constant(pool, *constant_value_index)?;
                    }
                    Attribute::Signature {
                        signature_index, ..
                    } => {
                        signature = Some(pool.try_get_utf8(*signature_index)?.to_string());
                    }
                    Attribute::Deprecated { .. } => deprecated = true,
                    Attribute::RuntimeVisibleAnnotations {
                        annotations: list, ..
                    } => parse_annotations(pool, list, true, &mut annotations)?,
                    Attribute::RuntimeInvisibleAnnotations {
                        annotations: list, ..
                    } => parse_annotations(pool, list, false, &mut annotations)?,
                    _ => {}
                }
            }
            fields.push(ApiField {
                flags: field.access_flags,
                name: pool.try_get_utf8(field.name_index)?.to_string(),
                descriptor: pool.try_get_utf8(field.descriptor_index)?.to_string(),
                field_type: field.field_type.clone(),
                constant,
                annotations,
                signature,
                deprecated,
            });
        }

        let mut methods = Vec::with_capacity(class_file.methods.len());
        for method in &class_file.methods {
            let mut exceptions = Vec::new();
            let mut annotations = Vec::new();
            let mut signature = None;
            let mut deprecated = false;
            for attribute in &method.attributes {
                match attribute {
                    Attribute::Exceptions {
                        exception_indexes, ..
                    } => {
                        for index in exception_indexes {
                            exceptions.push(pool.try_get_class(*index)?.to_string());
                        }
                    }
                    Attribute::Signature {
                        signature_index, ..
                    } => {
                        signature = Some(pool.try_get_utf8(*signature_index)?.to_string());
                    }
                    Attribute::Deprecated { .. } => deprecated = true,
                    Attribute::RuntimeVisibleAnnotations {
                        annotations: list, ..
                    } => parse_annotations(pool, list, true, &mut annotations)?,
                    Attribute::RuntimeInvisibleAnnotations {
                        annotations: list, ..
                    } => parse_annotations(pool, list, false, &mut annotations)?,
                    _ => {}
                }
            }
            methods.push(ApiMethod {
                flags: method.access_flags,
                name: pool.try_get_utf8(method.name_index)?.to_string(),
                descriptor: pool.try_get_utf8(method.descriptor_index)?.to_string(),
                exceptions,
                annotations,
                signature,
                deprecated,
            });
        }

        let mut annotations = Vec::new();
        let mut inner_classes = Vec::new();
        let mut signature = None;
        let mut deprecated = false;
        for attribute in &class_file.attributes {
            match attribute {
                Attribute::InnerClasses { classes, .. } => {
                    for inner in classes {
                        inner_classes.push(ApiInnerClass {
                            inner: pool.try_get_class(inner.class_info_index)?.to_string(),
                            outer: if inner.outer_class_info_index == 0 {
                                None
                            } else {
                                Some(
                                    pool.try_get_class(inner.outer_class_info_index)?
                                        .to_string(),
                                )
                            },
                            simple_name: if inner.name_index == 0 {
                                None
                            } else {
                                Some(pool.try_get_utf8(inner.name_index)?.to_string())
                            },
                            flags: inner.access_flags,
                        });
                    }
                }
                Attribute::Signature {
                    signature_index, ..
                } => {
                    signature = Some(pool.try_get_utf8(*signature_index)?.to_string());
                }
                Attribute::Deprecated { .. } => deprecated = true,
                Attribute::RuntimeVisibleAnnotations {
                    annotations: list, ..
                } => parse_annotations(pool, list, true, &mut annotations)?,
                Attribute::RuntimeInvisibleAnnotations {
                    annotations: list, ..
                } => parse_annotations(pool, list, false, &mut annotations)?,
                _ => {}
            }
        }

        Ok(ApiClass {
            version: class_file.version.clone(),
            flags: class_file.access_flags,
            name,
            superclass,
            interfaces,
            fields,
            methods,
            annotations,
            inner_classes,
            signature,
            deprecated,
        })
    }

    /// Serializes to classfile bytes, building a fresh constant pool in a
    /// fixed order so identical representations yield identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.serialize().map_err(|source| StubError::ClassWrite {
            name: self.name.clone(),
            source,
        })
    }

    fn serialize(&self) -> ristretto_classfile::Result<Vec<u8>> {
        let mut pool = ConstantPool::default();
        let this_class = pool.add_class(&self.name)?;
        let super_class = match &self.superclass {
            Some(name) => pool.add_class(name)?,
            None => 0,
        };
        let mut interfaces = Vec::with_capacity(self.interfaces.len());
        for name in &self.interfaces {
            interfaces.push(pool.add_class(name)?);
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let name_index = pool.add_utf8(&field.name)?;
            let descriptor_index = pool.add_utf8(&field.descriptor)?;
            let mut attributes = Vec::new();
            if let Some(constant) = &field.constant {
                let name_index = pool.add_utf8("ConstantValue")?;
                let constant_value_index = add_constant(&mut pool, constant)?;
                attributes.push(Attribute::ConstantValue {
                    name_index,
                    constant_value_index,
                });
            }
            write_common_attributes(
                &mut pool,
                &mut attributes,
                &field.annotations,
                field.signature.as_deref(),
                field.deprecated,
            )?;
            fields.push(Field {
                access_flags: field.flags,
                name_index,
                descriptor_index,
                field_type: field.field_type.clone(),
                attributes,
            });
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            let name_index = pool.add_utf8(&method.name)?;
            let descriptor_index = pool.add_utf8(&method.descriptor)?;
            let mut attributes = Vec::new();
            if needs_body(&method.flags) {
                attributes.push(synthesize_body(&mut pool, method)?);
            }
            if !method.exceptions.is_empty() {
                let name_index = pool.add_utf8("Exceptions")?;
                let mut exception_indexes = Vec::with_capacity(method.exceptions.len());
                for exception in &method.exceptions {
                    exception_indexes.push(pool.add_class(exception)?);
                }
                attributes.push(Attribute::Exceptions {
                    name_index,
                    exception_indexes,
                });
            }
            write_common_attributes(
                &mut pool,
                &mut attributes,
                &method.annotations,
                method.signature.as_deref(),
                method.deprecated,
            )?;
            methods.push(Method {
                access_flags: method.flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let mut attributes = Vec::new();
        if !self.inner_classes.is_empty() {
            let name_index = pool.add_utf8("InnerClasses")?;
            let mut classes = Vec::with_capacity(self.inner_classes.len());
            for inner in &self.inner_classes {
                classes.push(InnerClass {
                    class_info_index: pool.add_class(&inner.inner)?,
                    outer_class_info_index: match &inner.outer {
                        Some(outer) => pool.add_class(outer)?,
                        None => 0,
                    },
                    name_index: match &inner.simple_name {
                        Some(simple) => pool.add_utf8(simple)?,
                        None => 0,
                    },
                    access_flags: inner.flags,
                });
            }
            attributes.push(Attribute::InnerClasses {
                name_index,
                classes,
            });
        }
        write_common_attributes(
            &mut pool,
            &mut attributes,
            &self.annotations,
            self.signature.as_deref(),
            self.deprecated,
        )?;

        let class_file = ClassFile {
            version: self.version.clone(),
            constant_pool: pool,
            access_flags: self.flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class_file.verify()?;

        let mut bytes = Vec::new();
        class_file.to_bytes(&mut bytes)?;
        Ok(bytes)
    }
}

fn parse_constant(
    pool: &ConstantPool,
    index: u16,
) -> ristretto_classfile::Result<Option<ConstValue>> {
    let value = match pool.try_get(index)? {
        Constant::Integer(value) => Some(ConstValue::Integer(*value)),
        Constant::Long(value) => Some(ConstValue::Long(*value)),
        Constant::Float(value) => Some(ConstValue::Float(*value)),
        Constant::Double(value) => Some(ConstValue::Double(*value)),
        Constant::String(utf8_index) => {
            Some(ConstValue::String(pool.try_get_utf8(*utf8_index)?.to_string()))
        }
        _ => None,
    };
    Ok(value)
}

fn add_constant(
    pool: &mut ConstantPool,
    constant: &ConstValue,
) -> ristretto_classfile::Result<u16> {
    match constant {
        ConstValue::Integer(value) => pool.add_integer(*value),
        ConstValue::Long(value) => pool.add_long(*value),
        ConstValue::Float(value) => pool.add_float(*value),
        ConstValue::Double(value) => pool.add_double(*value),
        ConstValue::String(value) => pool.add_string(value),
    }
}

fn write_common_attributes(
    pool: &mut ConstantPool,
    attributes: &mut Vec<Attribute>,
    annotations: &[ApiAnnotation],
    signature: Option<&str>,
    deprecated: bool,
) -> ristretto_classfile::Result<()> {
    if let Some(signature) = signature {
        let name_index = pool.add_utf8("Signature")?;
        let signature_index = pool.add_utf8(signature)?;
        attributes.push(Attribute::Signature {
            name_index,
            signature_index,
        });
    }
    if deprecated {
        let name_index = pool.add_utf8("Deprecated")?;
        attributes.push(Attribute::Deprecated { name_index });
    }
    for visible in [true, false] {
        let subset: Vec<&ApiAnnotation> =
            annotations.iter().filter(|a| a.visible == visible).collect();
        if subset.is_empty() {
            continue;
        }
        let name_index = if visible {
            pool.add_utf8("RuntimeVisibleAnnotations")?
        } else {
            pool.add_utf8("RuntimeInvisibleAnnotations")?
        };
        let mut list = Vec::with_capacity(subset.len());
        for annotation in subset {
            list.push(Annotation {
                type_index: pool.add_utf8(&annotation.descriptor)?,
                elements: Vec::new(),
            });
        }
        if visible {
            attributes.push(Attribute::RuntimeVisibleAnnotations {
                name_index,
                annotations: list,
            });
        } else {
            attributes.push(Attribute::RuntimeInvisibleAnnotations {
                name_index,
                annotations: list,
            });
        }
    }
    Ok(())
}

// Abstract and native methods must not carry a Code attribute; everything
// else (including interface default and static methods) must.
fn needs_body(method_flags: &MethodAccessFlags) -> bool {
    !method_flags.contains(MethodAccessFlags::ABSTRACT)
        && !method_flags.contains(MethodAccessFlags::NATIVE)
}

/// Builds the minimal loadable body: `aconst_null; athrow`.
///
/// Straight-line code with no branches needs no stack map frames, so the
/// result verifies on every classfile version the inputs can carry.
fn synthesize_body(
    pool: &mut ConstantPool,
    method: &ApiMethod,
) -> ristretto_classfile::Result<Attribute> {
    let name_index = pool.add_utf8("Code")?;
    let (parameters, _return_type) = FieldType::parse_method_descriptor(&method.descriptor)?;
    let mut max_locals: u16 = if method.flags.contains(MethodAccessFlags::STATIC) {
        0
    } else {
        1
    };
    for parameter in &parameters {
        max_locals += match parameter {
            FieldType::Base(BaseType::Long) | FieldType::Base(BaseType::Double) => 2,
            _ => 1,
        };
    }
    Ok(Attribute::Code {
        name_index,
        max_stack: 1,
        max_locals,
        code: vec![Instruction::Aconst_null, Instruction::Athrow],
        exception_table: Vec::new(),
        attributes: Vec::new(),
    })
}
