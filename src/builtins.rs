//! Signatures of the built-in runtime library. The code bodies that back
//! these signatures are emitted by `codegen::emit_builtins`.

use crate::types::{Type, TypeKind};

pub struct BuiltinSignature {
    pub name: &'static str,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Other built-ins this one transitively requires to be emitted.
    pub requires: &'static [&'static str],
}

fn t(kind: TypeKind) -> Type {
    Type::new(kind)
}

pub fn builtin_signature(name: &str) -> Option<BuiltinSignature> {
    Some(match name {
        "print_int" => BuiltinSignature {
            name: "print_int",
            params: vec![t(TypeKind::Int)],
            return_type: t(TypeKind::Void),
            requires: &[],
        },
        "read_int" => BuiltinSignature {
            name: "read_int",
            params: vec![],
            return_type: t(TypeKind::Int),
            requires: &[],
        },
        "print_str" => BuiltinSignature {
            name: "print_str",
            params: vec![t(TypeKind::String)],
            return_type: t(TypeKind::Void),
            requires: &[],
        },
        "read_str" => BuiltinSignature {
            name: "read_str",
            params: vec![],
            return_type: t(TypeKind::String),
            requires: &[],
        },
        "strcmp" => BuiltinSignature {
            name: "strcmp",
            params: vec![t(TypeKind::String), t(TypeKind::String)],
            return_type: t(TypeKind::Int),
            requires: &["strlen"],
        },
        "strcat" => BuiltinSignature {
            name: "strcat",
            params: vec![t(TypeKind::String), t(TypeKind::String)],
            return_type: t(TypeKind::String),
            requires: &["strlen"],
        },
        "strlen" => BuiltinSignature {
            name: "strlen",
            params: vec![t(TypeKind::String)],
            return_type: t(TypeKind::Int),
            requires: &[],
        },
        "print_float" => BuiltinSignature {
            name: "print_float",
            params: vec![t(TypeKind::Float)],
            return_type: t(TypeKind::Void),
            requires: &["print_int"],
        },
        "read_float" => BuiltinSignature {
            name: "read_float",
            params: vec![],
            return_type: t(TypeKind::Float),
            requires: &["read_int"],
        },
        _ => return None,
    })
}

pub fn is_builtin(name: &str) -> bool {
    builtin_signature(name).is_some()
}

/// Expand a set of directly-referenced builtin names with their transitive
/// dependencies (e.g. `print_float` pulls in `print_int`), in a stable,
/// dependency-first emission order.
pub fn close_over_dependencies(referenced: &[String]) -> Vec<String> {
    let mut ordered = Vec::new();
    let mut seen = std::collections::HashSet::new();

    fn visit(
        name: &str,
        seen: &mut std::collections::HashSet<String>,
        ordered: &mut Vec<String>,
    ) {
        if seen.contains(name) {
            return;
        }
        seen.insert(name.to_string());
        if let Some(sig) = builtin_signature(name) {
            for dep in sig.requires {
                visit(dep, seen, ordered);
            }
        }
        ordered.push(name.to_string());
    }

    for name in referenced {
        visit(name, &mut seen, &mut ordered);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_float_pulls_in_print_int() {
        let closed = close_over_dependencies(&["print_float".to_string()]);
        assert_eq!(closed, vec!["print_int".to_string(), "print_float".to_string()]);
    }

    #[test]
    fn already_present_dependency_is_not_duplicated() {
        let closed = close_over_dependencies(&[
            "print_int".to_string(),
            "print_float".to_string(),
        ]);
        assert_eq!(closed, vec!["print_int".to_string(), "print_float".to_string()]);
    }

    #[test]
    fn strcmp_pulls_in_strlen() {
        let closed = close_over_dependencies(&["strcmp".to_string()]);
        assert_eq!(closed, vec!["strlen".to_string(), "strcmp".to_string()]);
    }

    #[test]
    fn strcat_pulls_in_strlen() {
        let closed = close_over_dependencies(&["strcat".to_string()]);
        assert_eq!(closed, vec!["strlen".to_string(), "strcat".to_string()]);
    }
}
