//! Structural intersection of class representations.
//!
//! Two versions of a class reduce to the surface a consumer can rely on
//! against either: members present on both sides with compatible shapes,
//! the nearest superclass both hierarchies share, and the interfaces both
//! implementations honor. Folding the pairwise intersection across every
//! classpath yields the maximal common surface.

use crate::classpath::ClasspathLoader;
use crate::error::Result;
use crate::model::{ApiAnnotation, ApiClass, ApiField, ApiInnerClass, ApiMethod};
use ristretto_classfile::attributes::NestedClassAccessFlags;
use ristretto_classfile::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Version};
use std::collections::HashSet;

const OBJECT: &str = "java/lang/Object";

/// Folds [`intersect`] over one class's representation on every classpath.
///
/// `classes` and `loaders` are aligned by classpath index. The accumulator
/// descends from the first classpath's view, so that classpath's loader
/// resolves the left-hand hierarchy for the whole fold. Returns `None` when
/// either slice is empty or any pairwise step finds no common surface.
pub fn intersect_all(
    classes: &[ApiClass],
    loaders: &[ClasspathLoader],
) -> Result<Option<ApiClass>> {
    let (Some(first), Some(base)) = (classes.first(), loaders.first()) else {
        return Ok(None);
    };
    let mut merged = first.clone();
    for (class, loader) in classes[1..].iter().zip(&loaders[1..]) {
        match intersect(&merged, base, class, loader)? {
            Some(next) => merged = next,
            None => return Ok(None),
        }
    }
    Ok(Some(merged))
}

/// Intersects two versions of the same class into their common surface.
///
/// Hierarchy questions about `a` are answered through `loader_a`, about `b`
/// through `loader_b`. Returns `None` when the two sides disagree on
/// class-ness versus interface-ness, or when one side is final and the
/// other abstract.
pub fn intersect(
    a: &ApiClass,
    loader_a: &ClasspathLoader,
    b: &ApiClass,
    loader_b: &ClasspathLoader,
) -> Result<Option<ApiClass>> {
    if a.flags.contains(ClassAccessFlags::INTERFACE) != b.flags.contains(ClassAccessFlags::INTERFACE)
    {
        return Ok(None);
    }
    let flags = merge_class_flags(a.flags, b.flags);
    if flags.contains(ClassAccessFlags::ABSTRACT) && flags.contains(ClassAccessFlags::FINAL) {
        // Instantiable on neither variant and extensible on neither; no
        // loadable classfile carries both bits.
        return Ok(None);
    }

    let superclass = common_superclass(a, loader_a, b, loader_b)?;

    let mut interfaces = Vec::new();
    for interface in &a.interfaces {
        if loader_b.implements(b, interface)? {
            interfaces.push(interface.clone());
        }
    }

    let mut fields = Vec::new();
    for field in &a.fields {
        if let Some(other) = find_field(b, loader_b, &field.name, &field.descriptor)? {
            if let Some(merged) = merge_fields(field, &other) {
                fields.push(merged);
            }
        }
    }

    let mut methods = Vec::new();
    for method in &a.methods {
        if let Some(other) = find_method(b, loader_b, &method.name, &method.descriptor)? {
            if let Some(merged) = merge_methods(method, &other) {
                methods.push(merged);
            }
        }
    }

    let inner_classes = a
        .inner_classes
        .iter()
        .filter_map(|inner| {
            b.inner_classes
                .iter()
                .find(|candidate| candidate.inner == inner.inner)
                .map(|candidate| ApiInnerClass {
                    inner: inner.inner.clone(),
                    outer: inner.outer.clone(),
                    simple_name: inner.simple_name.clone(),
                    flags: merge_nested_flags(inner.flags, candidate.flags),
                })
        })
        .collect();

    Ok(Some(ApiClass {
        version: min_version(&a.version, &b.version),
        flags,
        name: a.name.clone(),
        superclass,
        interfaces,
        fields,
        methods,
        annotations: common_annotations(&a.annotations, &b.annotations),
        inner_classes,
        signature: common_signature(&a.signature, &b.signature),
        deprecated: a.deprecated && b.deprecated,
    }))
}

fn min_version(a: &Version, b: &Version) -> Version {
    if (a.major(), a.minor()) <= (b.major(), b.minor()) {
        a.clone()
    } else {
        b.clone()
    }
}

fn common_annotations(a: &[ApiAnnotation], b: &[ApiAnnotation]) -> Vec<ApiAnnotation> {
    a.iter()
        .filter(|annotation| b.contains(annotation))
        .cloned()
        .collect()
}

fn common_signature(a: &Option<String>, b: &Option<String>) -> Option<String> {
    if a == b { a.clone() } else { None }
}

/// Picks the nearest superclass both sides can agree on.
///
/// Equal declared superclasses win outright. Otherwise the declared chains
/// are walked through each side's own loader and the first name appearing on
/// both is taken; `java/lang/Object` is the fallback when the chains never
/// meet (or cannot be resolved far enough to meet).
fn common_superclass(
    a: &ApiClass,
    loader_a: &ClasspathLoader,
    b: &ApiClass,
    loader_b: &ClasspathLoader,
) -> Result<Option<String>> {
    if a.superclass == b.superclass {
        return Ok(a.superclass.clone());
    }
    if a.superclass.is_none() || b.superclass.is_none() {
        return Ok(Some(OBJECT.to_string()));
    }
    let a_chain = superclass_names(a, loader_a)?;
    let b_chain: HashSet<String> = superclass_names(b, loader_b)?.into_iter().collect();
    for name in a_chain {
        if b_chain.contains(&name) {
            return Ok(Some(name));
        }
    }
    Ok(Some(OBJECT.to_string()))
}

/// Declared superclass names, nearest first. The declared name is included
/// even when its class cannot be resolved; the walk just stops there.
fn superclass_names(class: &ApiClass, loader: &ClasspathLoader) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut visited = HashSet::new();
    let mut next = class.superclass.clone();
    while let Some(name) = next {
        if !visited.insert(name.clone()) {
            break;
        }
        next = loader
            .load_class(&name)?
            .and_then(|parent| parent.superclass.clone());
        names.push(name);
    }
    Ok(names)
}

/// Looks up a field on `class` or, failing that, as an inherited member on
/// its superclass chain. Private fields are not inherited.
fn find_field(
    class: &ApiClass,
    loader: &ClasspathLoader,
    name: &str,
    descriptor: &str,
) -> Result<Option<ApiField>> {
    let local = class
        .fields
        .iter()
        .find(|field| field.name == name && field.descriptor == descriptor);
    if let Some(field) = local {
        return Ok(Some(field.clone()));
    }
    for parent in loader.superclass_chain(class)? {
        let inherited = parent.fields.iter().find(|field| {
            field.name == name
                && field.descriptor == descriptor
                && !field.flags.contains(FieldAccessFlags::PRIVATE)
        });
        if let Some(field) = inherited {
            return Ok(Some(field.clone()));
        }
    }
    Ok(None)
}

/// Method counterpart of [`find_field`]. Constructors and class initializers
/// never resolve through inheritance.
fn find_method(
    class: &ApiClass,
    loader: &ClasspathLoader,
    name: &str,
    descriptor: &str,
) -> Result<Option<ApiMethod>> {
    let local = class
        .methods
        .iter()
        .find(|method| method.name == name && method.descriptor == descriptor);
    if let Some(method) = local {
        return Ok(Some(method.clone()));
    }
    if name == "<init>" || name == "<clinit>" {
        return Ok(None);
    }
    for parent in loader.superclass_chain(class)? {
        let inherited = parent.methods.iter().find(|method| {
            method.name == name
                && method.descriptor == descriptor
                && !method.flags.contains(MethodAccessFlags::PRIVATE)
        });
        if let Some(method) = inherited {
            return Ok(Some(method.clone()));
        }
    }
    Ok(None)
}

fn field_essentials(flags: FieldAccessFlags) -> FieldAccessFlags {
    flags
        & (FieldAccessFlags::STATIC
            | FieldAccessFlags::PUBLIC
            | FieldAccessFlags::PRIVATE
            | FieldAccessFlags::PROTECTED)
}

/// Permission bits survive only when both sides grant them; the restriction
/// bits `ABSTRACT` and `FINAL` survive when either side imposes them, so the
/// stub never permits an instantiation or extension some variant forbids.
fn merge_class_flags(a: ClassAccessFlags, b: ClassAccessFlags) -> ClassAccessFlags {
    (a & b) | ((a | b) & (ClassAccessFlags::ABSTRACT | ClassAccessFlags::FINAL))
}

fn merge_nested_flags(
    a: NestedClassAccessFlags,
    b: NestedClassAccessFlags,
) -> NestedClassAccessFlags {
    (a & b) | ((a | b) & (NestedClassAccessFlags::ABSTRACT | NestedClassAccessFlags::FINAL))
}

fn merge_field_flags(a: FieldAccessFlags, b: FieldAccessFlags) -> FieldAccessFlags {
    (a & b) | ((a | b) & FieldAccessFlags::FINAL)
}

fn merge_method_flags(a: MethodAccessFlags, b: MethodAccessFlags) -> MethodAccessFlags {
    (a & b) | ((a | b) & (MethodAccessFlags::ABSTRACT | MethodAccessFlags::FINAL))
}

fn method_essentials(flags: MethodAccessFlags) -> MethodAccessFlags {
    flags
        & (MethodAccessFlags::STATIC
            | MethodAccessFlags::PUBLIC
            | MethodAccessFlags::PRIVATE
            | MethodAccessFlags::PROTECTED)
}

/// Merges two matching fields, or drops the pair when staticness or
/// visibility disagree. Remaining flags keep the bits both sides set, plus
/// `FINAL` from either side.
fn merge_fields(a: &ApiField, b: &ApiField) -> Option<ApiField> {
    if field_essentials(a.flags) != field_essentials(b.flags) {
        return None;
    }
    Some(ApiField {
        flags: merge_field_flags(a.flags, b.flags),
        name: a.name.clone(),
        descriptor: a.descriptor.clone(),
        field_type: a.field_type.clone(),
        constant: if a.constant == b.constant {
            a.constant.clone()
        } else {
            None
        },
        annotations: common_annotations(&a.annotations, &b.annotations),
        signature: common_signature(&a.signature, &b.signature),
        deprecated: a.deprecated && b.deprecated,
    })
}

fn merge_methods(a: &ApiMethod, b: &ApiMethod) -> Option<ApiMethod> {
    if method_essentials(a.flags) != method_essentials(b.flags) {
        return None;
    }
    let flags = merge_method_flags(a.flags, b.flags);
    if flags.contains(MethodAccessFlags::ABSTRACT) && flags.contains(MethodAccessFlags::FINAL) {
        // Abstract on one side, final on the other: no subclass can satisfy
        // both variants.
        return None;
    }
    Some(ApiMethod {
        flags,
        name: a.name.clone(),
        descriptor: a.descriptor.clone(),
        exceptions: a
            .exceptions
            .iter()
            .filter(|exception| b.exceptions.contains(exception))
            .cloned()
            .collect(),
        annotations: common_annotations(&a.annotations, &b.annotations),
        signature: common_signature(&a.signature, &b.signature),
        deprecated: a.deprecated && b.deprecated,
    })
}
