//! Nested-scope symbol table with activation-record addressing.
//!
//! The reference implementation this is modeled on keeps one process-global
//! table and returns a sentinel "undefined" record on a failed lookup. Here
//! the table is an ordinary owned value threaded through the analyzer and
//! code generator, and a miss is `None` rather than a sentinel.

use std::collections::HashMap;

use crate::types::Type;

pub const ACTIVATION_RECORD_SIZE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub is_const: bool,
    /// For variables: activation-record slot. For functions: bytecode
    /// instruction index of the entry point (patched in after emission for
    /// forward-declared and built-in functions).
    pub address: i64,
    pub params: Vec<Type>,
    /// Set once a `const` variable has received its first assignment.
    pub assigned: bool,
    /// For a pointer variable with `points_to_stack = true`, the
    /// (level, address) of the variable it was captured from. Stack
    /// pointers in this language are compile-time aliases rather than
    /// runtime-indirected values, so dereferencing one re-emits its
    /// pointee's address directly instead of loading the pointer's own
    /// stack slot.
    pub pointee: Option<(u32, i64)>,
}

struct Scope {
    address_base: u32,
    address_offset: u32,
    is_function_scope: bool,
    table: HashMap<String, Record>,
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    temp_counter: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                address_base: 0,
                address_offset: 0,
                is_function_scope: false,
                table: HashMap::new(),
            }],
            temp_counter: 0,
        }
    }

    pub fn push_scope(&mut self, is_function_scope: bool) {
        let (base, offset) = if is_function_scope {
            (ACTIVATION_RECORD_SIZE, 0)
        } else {
            let parent = self.scopes.last().unwrap();
            (parent.address_base + parent.address_offset, 0)
        };
        self.scopes.push(Scope {
            address_base: base,
            address_offset: offset,
            is_function_scope,
            table: HashMap::new(),
        });
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Insert a variable, assigning the next free address in the current
    /// scope. Returns the assigned address.
    pub fn insert_variable(&mut self, name: &str, ty: Type, is_const: bool) -> i64 {
        let scope = self.scopes.last_mut().unwrap();
        let address = (scope.address_base + scope.address_offset) as i64;
        scope.address_offset += ty.slot_size();
        scope.table.insert(
            name.to_string(),
            Record {
                name: name.to_string(),
                kind: SymbolKind::Variable,
                ty,
                is_const,
                address,
                params: Vec::new(),
                assigned: false,
                pointee: None,
            },
        );
        address
    }

    /// Insert a function at an explicit address (a bytecode index, known
    /// only once codegen emits or forward-declares the body).
    pub fn insert_function(
        &mut self,
        name: &str,
        return_type: Type,
        params: Vec<Type>,
        address: i64,
    ) {
        let scope = self.scopes.last_mut().unwrap();
        scope.table.insert(
            name.to_string(),
            Record {
                name: name.to_string(),
                kind: SymbolKind::Function,
                ty: return_type,
                is_const: false,
                address,
                params,
                assigned: true,
                pointee: None,
            },
        );
    }

    /// Look up `name` from the innermost scope outward. Returns the record
    /// and the number of *function* scope boundaries crossed to find it.
    pub fn lookup(&self, name: &str) -> Option<(&Record, u32)> {
        let mut level = 0;
        for scope in self.scopes.iter().rev() {
            if let Some(record) = scope.table.get(name) {
                return Some((record, level));
            }
            if scope.is_function_scope {
                level += 1;
            }
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Record> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(record) = scope.table.get_mut(name) {
                return Some(record);
            }
        }
        None
    }

    /// True if `name` exists in the *current* (innermost) scope only.
    pub fn declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes.last().unwrap().table.contains_key(name)
    }

    pub fn current_scope_var_bytes(&self) -> u32 {
        self.scopes.last().unwrap().address_offset
    }

    /// Reserve `size` scratch slots in the current scope under a name no
    /// user identifier can collide with, returning the address.
    pub fn allocate_temp(&mut self, ty: Type) -> (String, i64) {
        self.temp_counter += 1;
        let name = format!("__temp_{}__", self.temp_counter);
        let addr = self.insert_variable(&name, ty, false);
        (name, addr)
    }

    /// Reserve `count` contiguous scratch slots of `elem_ty`'s size each in
    /// the current scope, returning the address of the first slot. Unlike
    /// `allocate_temp`, these slots have no symbol table entry: callers
    /// address them with a runtime-computed offset (e.g. `PST`/`PLD`) rather
    /// than by name.
    pub fn allocate_temp_block(&mut self, elem_ty: Type, count: u32) -> i64 {
        let scope = self.scopes.last_mut().unwrap();
        let base = (scope.address_base + scope.address_offset) as i64;
        scope.address_offset += elem_ty.slot_size() * count;
        base
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        let scope = self.scopes.last_mut().unwrap();
        if let Some(mut record) = scope.table.remove(old) {
            record.name = new.to_string();
            scope.table.insert(new.to_string(), record);
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn sibling_scopes_do_not_collide() {
        let mut st = SymbolTable::new();
        st.push_scope(true);
        st.insert_variable("a", Type::new(TypeKind::Int), false);
        st.push_scope(false);
        st.insert_variable("b", Type::new(TypeKind::Int), false);
        st.pop_scope();
        st.push_scope(false);
        let addr = st.insert_variable("c", Type::new(TypeKind::Int), false);
        assert_eq!(addr, 4); // base 3 + offset 1 (from `a`)
        st.pop_scope();
        st.pop_scope();
    }

    #[test]
    fn lookup_counts_function_levels_only() {
        let mut st = SymbolTable::new();
        st.push_scope(true);
        st.insert_variable("outer", Type::new(TypeKind::Int), false);
        st.push_scope(false);
        st.push_scope(true);
        let (_rec, level) = st.lookup("outer").unwrap();
        assert_eq!(level, 1);
    }

    #[test]
    fn lookup_miss_is_none() {
        let st = SymbolTable::new();
        assert!(st.lookup("nope").is_none());
    }
}
