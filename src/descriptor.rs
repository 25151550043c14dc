use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

/// Parse a JVM method descriptor such as `(ILjava/lang/String;)V`.
pub(crate) fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor> {
    MethodDescriptor::from_str(descriptor)
        .with_context(|| format!("parse method descriptor {descriptor}"))
}

/// Parse a JVM field descriptor such as `[J`. `V` is not a field type.
pub(crate) fn parse_field_descriptor(descriptor: &str) -> Result<TypeDescriptor> {
    let parsed = TypeDescriptor::from_str(descriptor)
        .with_context(|| format!("parse field descriptor {descriptor}"))?;
    if parsed == TypeDescriptor::Void {
        anyhow::bail!("field descriptor {descriptor} is void");
    }
    Ok(parsed)
}

/// Render an internal class name (`p/Outer$Inner`) as a Java source name.
pub(crate) fn java_class_name(internal_name: &str) -> String {
    let name = internal_name
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(internal_name);
    name.replace(['/', '$'], ".")
}

/// Qualified Java name of a field, e.g. `p.Test.counter`.
pub(crate) fn qualified_field_name(class: &str, field: &str) -> String {
    format!("{}.{}", java_class_name(class), field)
}

/// Strip anonymous-class suffixes (`p/A$1$2` -> `p/A`).
pub(crate) fn enclosing_nonanonymous_class(internal_name: &str) -> &str {
    let mut name = internal_name;
    while let Some((outer, suffix)) = name.rsplit_once('$') {
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        name = outer;
    }
    name
}
