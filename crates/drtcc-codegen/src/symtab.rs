use std::collections::HashMap;

use drtcc_asm::Opcode;
use drtcc_ast::{Interner, NodeId, Symbol as Ident};

/// What a symbol table entry names, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    /// An `enum` member; `data` is its numeric value.
    Enum,
    /// A bare numeric constant symbol (unused by the surface language today,
    /// kept as a class for parity with the original's `ClzNumber`).
    Number,
    /// A user-defined function; `data` is its `text`-segment entry index.
    Func,
    /// A built-in call; `data` is its [`Opcode`] discriminant.
    Builtin,
    /// A global variable; `data` is its byte offset in `data`.
    VarGlobal,
    /// A function parameter; `data` is its frame offset from `bp`.
    VarParam,
    /// A local variable; `data` is its frame offset from `bp`.
    VarLocal,
}

/// One symbol table entry: `(node-ref, class, data)` per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbol {
    /// The declaring AST node, when there is one (builtins have none).
    pub node: Option<NodeId>,
    /// What kind of name this is.
    pub class: SymbolClass,
    /// Class-dependent payload: enum value, text-segment entry, opcode, or
    /// frame/data offset.
    pub data: i32,
}

impl Symbol {
    /// Whether this symbol's binding may be shadowed by a new declaration
    /// in an inner scope (`spec.md` §3: "a VarGlobal/VarLocal in an outer
    /// scope may be shadowed by a new binding"). Parameters get the same
    /// treatment: a block nested inside a function body is already an
    /// "outer" relationship to that function's own parameters.
    fn is_shadowable(self) -> bool {
        matches!(
            self.class,
            SymbolClass::VarGlobal | SymbolClass::VarParam | SymbolClass::VarLocal
        )
    }
}

/// A stack of lexical scopes plus an unshadowable built-ins table, per
/// `spec.md` §3/§4.3.
pub struct SymbolTable {
    scopes: Vec<HashMap<Ident, Symbol>>,
    builtins: HashMap<Ident, Symbol>,
}

/// The fixed name -> opcode mapping `GenCode::MakeBuiltin` installs before
/// any user code is resolved.
const BUILTINS: &[(&str, Opcode)] = &[
    ("printf", Opcode::Prtf),
    ("memcmp", Opcode::Mcmp),
    ("exit", Opcode::Exit),
    ("memset", Opcode::Mset),
    ("open", Opcode::Open),
    ("read", Opcode::Read),
    ("close", Opcode::Clos),
    ("malloc", Opcode::Malc),
    ("trace", Opcode::Trac),
    ("trans", Opcode::Tran),
];

impl SymbolTable {
    /// Build a table with one empty top-level scope and the built-ins
    /// interned and installed.
    pub fn new(interner: &mut Interner) -> Self {
        let mut builtins = HashMap::with_capacity(BUILTINS.len());
        for (name, opcode) in BUILTINS.iter().copied() {
            let ident = interner.intern(name);
            builtins.insert(
                ident,
                Symbol {
                    node: None,
                    class: SymbolClass::Builtin,
                    data: opcode as i32,
                },
            );
        }
        Self {
            scopes: vec![HashMap::new()],
            builtins,
        }
    }

    /// Push a fresh, empty scope (function entry, block entry).
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        tracing::debug!(depth = self.scopes.len(), "push scope");
    }

    /// Pop the innermost scope (function exit, block exit).
    ///
    /// # Panics
    /// Panics if called with only the base scope remaining — codegen never
    /// pops the base scope, so this would indicate a push/pop mismatch bug.
    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "popped the base scope");
        self.scopes.pop();
        tracing::debug!(depth = self.scopes.len(), "pop scope");
    }

    /// `find`: innermost scope outward, then built-ins.
    pub fn find(&self, name: Ident) -> Option<Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name))
            .or_else(|| self.builtins.get(&name))
            .copied()
    }

    /// `conflict`: true if `name` is a built-in, already bound in the
    /// innermost scope, or bound to a non-shadowable class in an outer one.
    pub fn conflicts(&self, name: Ident) -> bool {
        if self.builtins.contains_key(&name) {
            return true;
        }
        let (innermost, outer) = self
            .scopes
            .split_last()
            .expect("symbol table always has at least one scope");
        if innermost.contains_key(&name) {
            return true;
        }
        outer
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name))
            .is_some_and(|sym| !sym.is_shadowable())
    }

    /// Declare `name` as `symbol` in the innermost scope. Returns `false`
    /// (and declares nothing) if [`Self::conflicts`] holds.
    pub fn declare(&mut self, name: Ident, symbol: Symbol) -> bool {
        if self.conflicts(name) {
            return false;
        }
        self.scopes
            .last_mut()
            .expect("symbol table always has at least one scope")
            .insert(name, symbol);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_and_cannot_be_redeclared() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new(&mut interner);
        let printf = interner.intern("printf");
        let found = table.find(printf).expect("printf is builtin");
        assert_eq!(found.class, SymbolClass::Builtin);
        assert_eq!(found.data, Opcode::Prtf as i32);

        let declared = table.declare(
            printf,
            Symbol {
                node: None,
                class: SymbolClass::VarGlobal,
                data: 0,
            },
        );
        assert!(!declared, "builtins are unshadowable");
    }

    #[test]
    fn inner_scope_may_shadow_outer_variable_but_not_function() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new(&mut interner);
        let x = interner.intern("x");
        let f = interner.intern("f");

        assert!(table.declare(
            x,
            Symbol {
                node: None,
                class: SymbolClass::VarGlobal,
                data: 0,
            }
        ));
        assert!(table.declare(
            f,
            Symbol {
                node: None,
                class: SymbolClass::Func,
                data: 0,
            }
        ));

        table.push_scope();
        assert!(table.declare(
            x,
            Symbol {
                node: None,
                class: SymbolClass::VarLocal,
                data: -4,
            }
        ));
        assert!(!table.declare(
            f,
            Symbol {
                node: None,
                class: SymbolClass::VarLocal,
                data: -8,
            }
        ));
        table.pop_scope();

        assert_eq!(table.find(x).unwrap().class, SymbolClass::VarGlobal);
    }

    #[test]
    fn redeclaring_in_the_same_scope_conflicts() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new(&mut interner);
        let x = interner.intern("x");
        assert!(table.declare(
            x,
            Symbol {
                node: None,
                class: SymbolClass::VarGlobal,
                data: 0,
            }
        ));
        assert!(!table.declare(
            x,
            Symbol {
                node: None,
                class: SymbolClass::VarGlobal,
                data: 4,
            }
        ));
    }
}
