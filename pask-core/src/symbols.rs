use std::collections::HashMap;

use pask_code::{ProcId, FRAME_RESERVED};

use crate::ast::Operator;
use crate::types::Type;

/// Index of a scope in the symbol table's flat arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32);

/// Index of a symbol entry in the symbol table's flat arena. AST nodes
/// refer to entries by id, never by pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u32);

#[derive(Clone, Debug)]
pub struct ConstantEntry {
    pub name: String,
    pub ty: Type,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct VariableEntry {
    pub name: String,
    pub ty: Type,
    /// Static level of the frame holding this variable.
    pub level: u32,
    /// Frame offset, assigned when the owning scope is resolved.
    pub offset: Option<i32>,
    /// Set by the `for` checker on its control variable; never cleared.
    pub read_only: bool,
}

#[derive(Clone, Debug)]
pub struct ProcedureEntry {
    pub name: String,
    /// Static level of the scope the procedure is declared in.
    pub level: u32,
    /// The procedure's local scope, one level deeper.
    pub scope: ScopeId,
    /// Key of this procedure's code blob in the output table.
    pub proc: ProcId,
    pub defined: bool,
}

#[derive(Clone, Debug)]
pub struct TypeEntry {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct OperatorEntry {
    pub op: Operator,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub enum SymEntry {
    Constant(ConstantEntry),
    Variable(VariableEntry),
    Procedure(ProcedureEntry),
    Type(TypeEntry),
    Operator(OperatorEntry),
}

/// One scope in the tree: an ordered local mapping, a parent link, the
/// owning procedure entry, and, on frame scopes only, the running
/// variable-offset counter seeded at the frame-save area. Nested scopes
/// (the `for` loop's) delegate allocation to the nearest enclosing frame.
#[derive(Clone, Debug)]
struct Scope {
    parent: Option<ScopeId>,
    owner: Option<EntryId>,
    level: u32,
    entries: Vec<EntryId>,
    names: HashMap<String, EntryId>,
    operators: HashMap<Operator, EntryId>,
    next_offset: Option<i32>,
    resolved: bool,
}

/// The scope arena plus every symbol entry, with the predefined scope
/// (operators and the `integer`/`boolean` types) installed at level 0.
///
/// The declaration methods are the parser's contract: the parser pre-builds
/// procedure entries, local scopes and `for` scopes through them before the
/// checker runs. The test suite exercises them in the parser's stead.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    entries: Vec<SymEntry>,
    predefined: ScopeId,
    next_proc: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: Vec::new(),
            entries: Vec::new(),
            predefined: ScopeId(0),
            next_proc: 0,
        };
        table.predefined = table.push_scope(Scope {
            parent: None,
            owner: None,
            level: 0,
            entries: Vec::new(),
            names: HashMap::new(),
            operators: HashMap::new(),
            next_offset: None,
            resolved: true,
        });
        table.install_predefined();
        table
    }

    fn install_predefined(&mut self) {
        let scope = self.predefined;
        let int = Type::integer();
        let boolean = Type::boolean();
        self.declare_type(scope, "integer", int.clone());
        self.declare_type(scope, "boolean", boolean.clone());

        for op in [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div] {
            self.install_operator(
                scope,
                op,
                Type::operator(
                    op,
                    Type::product(vec![int.clone(), int.clone()]),
                    int.clone(),
                ),
            );
        }
        // Equality is overloaded over integers and booleans; candidates are
        // tried in this order.
        for op in [Operator::Eq, Operator::Ne] {
            self.install_operator(
                scope,
                op,
                Type::intersection(vec![
                    Type::operator(
                        op,
                        Type::product(vec![int.clone(), int.clone()]),
                        boolean.clone(),
                    ),
                    Type::operator(
                        op,
                        Type::product(vec![boolean.clone(), boolean.clone()]),
                        boolean.clone(),
                    ),
                ]),
            );
        }
        for op in [Operator::Lt, Operator::Le, Operator::Gt, Operator::Ge] {
            self.install_operator(
                scope,
                op,
                Type::operator(
                    op,
                    Type::product(vec![int.clone(), int.clone()]),
                    boolean.clone(),
                ),
            );
        }
        self.install_operator(
            scope,
            Operator::Neg,
            Type::operator(Operator::Neg, int.clone(), int.clone()),
        );
        for op in [Operator::Pred, Operator::Succ] {
            self.install_operator(
                scope,
                op,
                Type::intersection(vec![
                    Type::operator(op, int.clone(), int.clone()),
                    Type::operator(op, boolean.clone(), boolean.clone()),
                ]),
            );
        }
    }

    fn push_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope arena overflow"));
        self.scopes.push(scope);
        id
    }

    fn push_entry(&mut self, entry: SymEntry) -> EntryId {
        let id = EntryId(u32::try_from(self.entries.len()).expect("entry arena overflow"));
        self.entries.push(entry);
        id
    }

    pub fn predefined_scope(&self) -> ScopeId {
        self.predefined
    }

    /// Create a procedure entry in `parent` together with its local frame
    /// scope one static level deeper.
    pub fn new_procedure(&mut self, parent: ScopeId, name: &str) -> EntryId {
        let level = self.scopes[parent.0 as usize].level;
        let proc = ProcId(self.next_proc);
        self.next_proc += 1;
        let local = self.push_scope(Scope {
            parent: Some(parent),
            owner: None,
            level: level + 1,
            entries: Vec::new(),
            names: HashMap::new(),
            operators: HashMap::new(),
            next_offset: Some(FRAME_RESERVED),
            resolved: false,
        });
        let entry = self.push_entry(SymEntry::Procedure(ProcedureEntry {
            name: name.to_string(),
            level,
            scope: local,
            proc,
            defined: false,
        }));
        self.scopes[local.0 as usize].owner = Some(entry);
        self.register(parent, name, entry);
        entry
    }

    /// Create a nested scope sharing the parent's frame (a `for` scope).
    pub fn new_nested_scope(&mut self, parent: ScopeId) -> ScopeId {
        let level = self.scopes[parent.0 as usize].level;
        self.push_scope(Scope {
            parent: Some(parent),
            owner: None,
            level,
            entries: Vec::new(),
            names: HashMap::new(),
            operators: HashMap::new(),
            next_offset: None,
            resolved: false,
        })
    }

    pub fn declare_variable(&mut self, scope: ScopeId, name: &str, ty: Type) -> EntryId {
        let level = self.scopes[scope.0 as usize].level;
        let entry = self.push_entry(SymEntry::Variable(VariableEntry {
            name: name.to_string(),
            ty,
            level,
            offset: None,
            read_only: false,
        }));
        self.register(scope, name, entry);
        entry
    }

    pub fn declare_constant(&mut self, scope: ScopeId, name: &str, ty: Type, value: i64) -> EntryId {
        let entry = self.push_entry(SymEntry::Constant(ConstantEntry {
            name: name.to_string(),
            ty,
            value,
        }));
        self.register(scope, name, entry);
        entry
    }

    pub fn declare_type(&mut self, scope: ScopeId, name: &str, ty: Type) -> EntryId {
        let entry = self.push_entry(SymEntry::Type(TypeEntry {
            name: name.to_string(),
            ty,
        }));
        self.register(scope, name, entry);
        entry
    }

    /// Mint a named subrange and install its type entry.
    pub fn declare_subrange(
        &mut self,
        scope: ScopeId,
        name: &str,
        base: Type,
        lower: i64,
        upper: i64,
    ) -> Type {
        let ty = Type::subrange(base, lower, upper);
        self.declare_type(scope, name, ty.clone());
        ty
    }

    /// Mint a nominal array type and install its type entry.
    pub fn declare_array(
        &mut self,
        scope: ScopeId,
        name: &str,
        index: Type,
        element: Type,
    ) -> Type {
        let ty = Type::array(index, element);
        self.declare_type(scope, name, ty.clone());
        ty
    }

    /// Declare a user scalar (enumeration) type: a nominal scalar over
    /// `0..values.len()-1`, one constant entry per value, and extended
    /// comparison and pred/succ overloads visible from `scope` inward.
    pub fn declare_scalar_type(&mut self, scope: ScopeId, name: &str, values: &[&str]) -> Type {
        debug_assert!(!values.is_empty());
        let ty = Type::scalar(name, 1, 0, values.len() as i64 - 1);
        self.declare_type(scope, name, ty.clone());
        for (ordinal, value) in values.iter().enumerate() {
            self.declare_constant(scope, value, ty.clone(), ordinal as i64);
        }
        let boolean = Type::boolean();
        for op in [
            Operator::Eq,
            Operator::Ne,
            Operator::Lt,
            Operator::Le,
            Operator::Gt,
            Operator::Ge,
        ] {
            self.extend_operator(
                scope,
                op,
                Type::operator(
                    op,
                    Type::product(vec![ty.clone(), ty.clone()]),
                    boolean.clone(),
                ),
            );
        }
        for op in [Operator::Pred, Operator::Succ] {
            self.extend_operator(scope, op, Type::operator(op, ty.clone(), ty.clone()));
        }
        ty
    }

    fn install_operator(&mut self, scope: ScopeId, op: Operator, ty: Type) {
        let entry = self.push_entry(SymEntry::Operator(OperatorEntry { op, ty }));
        let scope = &mut self.scopes[scope.0 as usize];
        scope.entries.push(entry);
        scope.operators.insert(op, entry);
    }

    /// Shadow `op` in `scope` with an intersection listing the new overload
    /// first, followed by every overload already visible from here.
    fn extend_operator(&mut self, scope: ScopeId, op: Operator, overload: Type) {
        let mut types = vec![overload];
        if let Some(existing) = self.lookup_operator(scope, op) {
            match &self.operator_entry(existing).ty {
                single @ Type::Operator(_) => types.push(single.clone()),
                Type::Intersection(i) => types.extend(i.types.iter().cloned()),
                other => panic!("operator entry carries a non-operator type: {other}"),
            }
        }
        self.install_operator(scope, op, Type::intersection(types));
    }

    fn register(&mut self, scope: ScopeId, name: &str, entry: EntryId) {
        let scope = &mut self.scopes[scope.0 as usize];
        debug_assert!(
            !scope.names.contains_key(name),
            "duplicate declaration of {name}"
        );
        scope.entries.push(entry);
        scope.names.insert(name.to_string(), entry);
    }

    /// Resolve an identifier by walking parent-ward; the first entry wins.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<EntryId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.0 as usize];
            if let Some(entry) = scope.names.get(name) {
                return Some(*entry);
            }
            current = scope.parent;
        }
        None
    }

    /// Resolve an operator in its disjoint namespace, walking parent-ward.
    pub fn lookup_operator(&self, scope: ScopeId, op: Operator) -> Option<EntryId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.0 as usize];
            if let Some(entry) = scope.operators.get(&op) {
                return Some(*entry);
            }
            current = scope.parent;
        }
        None
    }

    /// Finalize pending entries: variables declared without an offset are
    /// assigned one in declaration order. Idempotent.
    pub fn resolve_scope(&mut self, scope: ScopeId) {
        if self.scopes[scope.0 as usize].resolved {
            return;
        }
        self.scopes[scope.0 as usize].resolved = true;
        let pending: Vec<EntryId> = self.scopes[scope.0 as usize]
            .entries
            .iter()
            .copied()
            .filter(|id| {
                matches!(
                    self.entries[id.0 as usize],
                    SymEntry::Variable(VariableEntry { offset: None, .. })
                )
            })
            .collect();
        for id in pending {
            let words = match &self.entries[id.0 as usize] {
                SymEntry::Variable(v) => v.ty.space(),
                _ => unreachable!(),
            };
            let offset = self.alloc_variable_space(scope, words);
            if let SymEntry::Variable(v) = &mut self.entries[id.0 as usize] {
                v.offset = Some(offset);
            }
        }
    }

    /// Return the current offset counter of the owning frame and advance it
    /// by `words`. On a nested scope this allocates in the nearest enclosing
    /// frame, so hidden slots live in the procedure's frame.
    pub fn alloc_variable_space(&mut self, scope: ScopeId, words: i32) -> i32 {
        let frame = self.frame_scope(scope);
        let counter = self.scopes[frame.0 as usize]
            .next_offset
            .as_mut()
            .expect("frame scope has an offset counter");
        let offset = *counter;
        *counter += words;
        offset
    }

    /// Words of locals in the frame owning `scope`, hidden slots included.
    pub fn variable_space(&self, scope: ScopeId) -> i32 {
        let frame = self.frame_scope(scope);
        self.scopes[frame.0 as usize]
            .next_offset
            .expect("frame scope has an offset counter")
            - FRAME_RESERVED
    }

    fn frame_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let s = &self.scopes[current.0 as usize];
            if s.next_offset.is_some() {
                return current;
            }
            current = s.parent.expect("no enclosing frame scope");
        }
    }

    pub fn scope_level(&self, scope: ScopeId) -> u32 {
        self.scopes[scope.0 as usize].level
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    pub fn scope_owner(&self, scope: ScopeId) -> Option<EntryId> {
        self.scopes[scope.0 as usize].owner
    }

    /// Install the owning procedure entry on a nested scope.
    pub fn set_scope_owner(&mut self, scope: ScopeId, owner: Option<EntryId>) {
        self.scopes[scope.0 as usize].owner = owner;
    }

    pub fn entry(&self, id: EntryId) -> &SymEntry {
        &self.entries[id.0 as usize]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut SymEntry {
        &mut self.entries[id.0 as usize]
    }

    /// The variable entry behind `id`; the caller guarantees the kind.
    pub fn variable(&self, id: EntryId) -> &VariableEntry {
        match self.entry(id) {
            SymEntry::Variable(v) => v,
            other => panic!("expected a variable entry, found {other:?}"),
        }
    }

    /// The procedure entry behind `id`; the caller guarantees the kind.
    pub fn procedure(&self, id: EntryId) -> &ProcedureEntry {
        match self.entry(id) {
            SymEntry::Procedure(p) => p,
            other => panic!("expected a procedure entry, found {other:?}"),
        }
    }

    fn operator_entry(&self, id: EntryId) -> &OperatorEntry {
        match self.entry(id) {
            SymEntry::Operator(o) => o,
            other => panic!("expected an operator entry, found {other:?}"),
        }
    }

    pub fn set_read_only(&mut self, id: EntryId) {
        if let SymEntry::Variable(v) = self.entry_mut(id) {
            v.read_only = true;
        }
    }
}
