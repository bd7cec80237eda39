//! The source language's tiny type system.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Int,
    Bool,
    String,
    Float,
}

impl TypeKind {
    /// Size of one value of this kind in VM slots.
    pub fn slot_size(self) -> u32 {
        match self {
            TypeKind::Void => 0,
            TypeKind::Int | TypeKind::Bool | TypeKind::String => 1,
            TypeKind::Float => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::Int => "int",
            TypeKind::Bool => "bool",
            TypeKind::String => "string",
            TypeKind::Float => "float",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A type as it appears on a declaration, parameter, or expression result.
///
/// `points_to_stack` is only meaningful when `pointer_level > 0`; it is set
/// by the analyzer at the point a pointer-typed variable is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    pub pointer_level: u32,
    pub points_to_stack: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            pointer_level: 0,
            points_to_stack: false,
        }
    }

    pub fn pointer(kind: TypeKind, pointer_level: u32, points_to_stack: bool) -> Self {
        Type {
            kind,
            pointer_level,
            points_to_stack,
        }
    }

    pub fn is_pointer(self) -> bool {
        self.pointer_level > 0
    }

    /// Slot size of this value as stored in an activation record. A pointer
    /// is always one slot regardless of its pointee's size.
    pub fn slot_size(self) -> u32 {
        if self.is_pointer() {
            1
        } else {
            self.kind.slot_size()
        }
    }

    /// The type obtained by removing one level of indirection.
    pub fn dereferenced(self) -> Type {
        Type {
            kind: self.kind,
            pointer_level: self.pointer_level.saturating_sub(1),
            points_to_stack: self.points_to_stack,
        }
    }

    pub fn is_float(self) -> bool {
        !self.is_pointer() && self.kind == TypeKind::Float
    }

    pub fn is_string(self) -> bool {
        !self.is_pointer() && self.kind == TypeKind::String
    }

    pub fn is_void(self) -> bool {
        !self.is_pointer() && self.kind == TypeKind::Void
    }

    /// Two types are assignment/argument-compatible when their base kind and
    /// pointer level match; `points_to_stack` is not part of identity.
    pub fn matches(self, other: Type) -> bool {
        self.kind == other.kind && self.pointer_level == other.pointer_level
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for _ in 0..self.pointer_level {
            write!(f, "*")?;
        }
        Ok(())
    }
}
