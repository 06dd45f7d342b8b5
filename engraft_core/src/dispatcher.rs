// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dispatch table from program tags to tools.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use hashbrown::{HashMap, HashSet};
use serde_json::Value;

use crate::not_found::{NOT_FOUND_TOOL, NotFoundProgram, NotFoundTool};
use crate::program::{Program, ProgramError, ToolProgram, tool_name_of};
use crate::references::{RefSet, ReferenceCollection};
use crate::tool::AnyTool;
use crate::var::VarId;

/// Reference sets cached by program address. Each entry keeps a [`Weak`] to
/// its program, which pins the allocation so the address is not reused while
/// the entry exists.
#[derive(Default)]
struct ReferenceCache {
    entries: HashMap<usize, (Weak<dyn ToolProgram>, RefSet)>,
    prune_at: usize,
}

impl ReferenceCache {
    const MIN_PRUNE_AT: usize = 64;

    fn get(&self, program: &Program) -> Option<RefSet> {
        self.entries
            .get(&program.addr())
            .map(|(_, refs)| Rc::clone(refs))
    }

    fn insert(&mut self, program: &Program, refs: RefSet) {
        if self.entries.len() >= self.prune_at {
            self.entries.retain(|_, (program, _)| program.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(Self::MIN_PRUNE_AT);
        }
        self.entries
            .insert(program.addr(), (program.downgrade(), refs));
    }
}

struct Inner {
    tools: HashMap<String, Rc<dyn AnyTool>>,
    not_found: Rc<dyn AnyTool>,
    references: RefCell<ReferenceCache>,
}

/// An immutable lookup table from tool name to tool.
///
/// Build one with [`Dispatcher::builder`] and pass it down through the
/// [`EngraftContext`](crate::EngraftContext). Lookups never fail: unknown
/// names resolve to the built-in not-found tool, whose output is rejected and
/// whose view shows a warning.
///
/// # Example
///
/// ```rust
/// use engraft_core::{AnyTool, Dispatcher};
/// use engraft_core::testing::KnownOutputTool;
///
/// let dispatcher = Dispatcher::builder().register(KnownOutputTool::new()).build();
/// assert_eq!(dispatcher.look_up_by_name("testing-known-output").name(), "testing-known-output");
/// assert_eq!(dispatcher.look_up_by_name("no-such-tool").name(), "not-found");
/// ```
#[derive(Clone)]
pub struct Dispatcher(Rc<Inner>);

thread_local! {
    static DEFAULT: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };
}

impl Dispatcher {
    /// A dispatcher with only the not-found tool.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Returns the tool registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn AnyTool>> {
        self.0.tools.get(name).cloned()
    }

    /// Returns `true` if a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.tools.contains_key(name)
    }

    /// Returns the tool registered under `name`, or the not-found tool.
    #[must_use]
    pub fn look_up_by_name(&self, name: &str) -> Rc<dyn AnyTool> {
        self.get(name)
            .unwrap_or_else(|| Rc::clone(&self.0.not_found))
    }

    /// Returns the tool for `program`'s tag, or the not-found tool.
    #[must_use]
    pub fn look_up_by_program(&self, program: &Program) -> Rc<dyn AnyTool> {
        self.look_up_by_name(program.tool_name())
    }

    /// Returns every registered tool name, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Rebuilds a program tree from JSON.
    ///
    /// A tag with no registered tool loads as a not-found program that keeps
    /// its JSON, so saving it again loses nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError`] if the JSON is not a tagged object, or if the
    /// tool rejects its fields.
    pub fn load_program(&self, json: &Value) -> Result<Program, ProgramError> {
        let name = tool_name_of(json)?;
        match self.0.tools.get(name) {
            Some(tool) => tool.load_program(json, self),
            None => {
                tracing::debug!(tool = name, "loading program for unregistered tool");
                Ok(Program::new(NotFoundProgram::from_json(name, json.clone())))
            }
        }
    }

    /// Returns the variables `program` reads, following nested programs.
    ///
    /// Results are cached by program identity, so the same program always
    /// yields the same shared set.
    pub fn references(&self, program: &Program) -> RefSet {
        if let Some(refs) = self.0.references.borrow().get(program) {
            return refs;
        }
        let collection = self.look_up_by_program(program).collect_references(program);
        let refs = Rc::new(self.resolve(&collection));
        self.0
            .references
            .borrow_mut()
            .insert(program, Rc::clone(&refs));
        refs
    }

    /// Flattens a reference collection into variable ids.
    pub fn resolve(&self, collection: &ReferenceCollection) -> HashSet<VarId> {
        match collection {
            ReferenceCollection::Var(id) => std::iter::once(id.clone()).collect(),
            ReferenceCollection::Program(program) => HashSet::clone(&self.references(program)),
            ReferenceCollection::List(entries) => {
                let mut refs = HashSet::new();
                for entry in entries {
                    match entry {
                        ReferenceCollection::Minus(removed) => {
                            for id in self.resolve(removed) {
                                refs.remove(&id);
                            }
                        }
                        entry => refs.extend(self.resolve(entry)),
                    }
                }
                refs
            }
            // Nothing accumulated yet to remove from.
            ReferenceCollection::Minus(_) => HashSet::new(),
        }
    }

    /// Installs the process-wide default dispatcher for this thread,
    /// returning the previous one.
    ///
    /// Only the outermost composition point should install or read the
    /// default. Everything below it receives the dispatcher through its
    /// context.
    pub fn install_default(dispatcher: Self) -> Option<Self> {
        DEFAULT.with(|default| default.borrow_mut().replace(dispatcher))
    }

    /// Returns this thread's default dispatcher, installing an empty one if
    /// none was installed.
    #[must_use]
    pub fn default_instance() -> Self {
        DEFAULT.with(|default| default.borrow_mut().get_or_insert_with(Self::new).clone())
    }

    /// Returns `true` if both handles share one table.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tool_names())
            .field("cached_references", &self.0.references.borrow().entries.len())
            .finish()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    tools: HashMap<String, Rc<dyn AnyTool>>,
}

impl DispatcherBuilder {
    /// A builder holding only the not-found tool.
    #[must_use]
    pub fn new() -> Self {
        let mut tools: HashMap<String, Rc<dyn AnyTool>> = HashMap::new();
        tools.insert(NOT_FOUND_TOOL.to_owned(), Rc::new(NotFoundTool::new()));
        Self { tools }
    }

    /// Registers `tool` under its name, replacing any earlier registration.
    ///
    /// # Panics
    ///
    /// Panics if the tool's name is empty.
    #[must_use]
    pub fn register(self, tool: impl AnyTool + 'static) -> Self {
        self.register_rc(Rc::new(tool))
    }

    /// Registers an already shared tool.
    ///
    /// # Panics
    ///
    /// Panics if the tool's name is empty.
    #[must_use]
    pub fn register_rc(mut self, tool: Rc<dyn AnyTool>) -> Self {
        let name = tool.name().to_owned();
        assert!(!name.is_empty(), "tool has no name");
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice; keeping the latest");
        }
        self
    }

    /// Finishes the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        let not_found = self
            .tools
            .get(NOT_FOUND_TOOL)
            .cloned()
            .unwrap_or_else(|| Rc::new(NotFoundTool::new()));
        Dispatcher(Rc::new(Inner {
            tools: self.tools,
            not_found,
            references: RefCell::default(),
        }))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort_unstable();
        f.debug_struct("DispatcherBuilder")
            .field("tools", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KnownOutputTool;
    use crate::{ContextError, EngraftContext, Tool, ToolProps, ToolResult};
    use engraft_promise::Rejection;
    use engraft_refunc::Memory;
    use serde_json::json;

    /// A program that declares a fixed reference collection.
    #[derive(Debug)]
    struct Declares(ReferenceCollection);

    impl ToolProgram for Declares {
        fn tool_name(&self) -> &str {
            "declares"
        }
    }

    struct DeclaresTool;

    impl Tool for DeclaresTool {
        type Program = Declares;

        fn name(&self) -> &str {
            "declares"
        }

        fn make_program(
            &self,
            _context: &EngraftContext,
            _default_code: Option<&str>,
        ) -> Result<Declares, ContextError> {
            Ok(Declares(ReferenceCollection::none()))
        }

        fn collect_references(&self, program: &Declares) -> ReferenceCollection {
            program.0.clone()
        }

        fn run(&self, _memory: &mut Memory, _props: ToolProps<Rc<Declares>>) -> ToolResult {
            ToolResult::failed(Rejection::msg("not runnable"))
        }
    }

    fn declares(entries: Vec<ReferenceCollection>) -> Program {
        Program::new(Declares(ReferenceCollection::List(entries)))
    }

    fn var(id: &str) -> ReferenceCollection {
        VarId::from(id).into()
    }

    fn ids(ids: &[&str]) -> HashSet<VarId> {
        ids.iter().map(|id| VarId::from(*id)).collect()
    }

    #[test]
    fn unknown_names_fall_back_to_not_found() {
        let dispatcher = Dispatcher::builder().register(KnownOutputTool::new()).build();
        assert!(Rc::ptr_eq(
            &dispatcher.look_up_by_name("testing-known-output"),
            &dispatcher.get("testing-known-output").unwrap()
        ));
        assert_eq!(dispatcher.look_up_by_name("nope").name(), NOT_FOUND_TOOL);
        assert_eq!(dispatcher.tool_names(), ["not-found", "testing-known-output"]);
    }

    #[test]
    #[should_panic(expected = "tool has no name")]
    fn empty_names_are_rejected() {
        struct Nameless;
        impl Tool for Nameless {
            type Program = Declares;
            fn name(&self) -> &str {
                ""
            }
            fn make_program(
                &self,
                _: &EngraftContext,
                _: Option<&str>,
            ) -> Result<Declares, ContextError> {
                Err(ContextError::Unsupported("make_program"))
            }
            fn collect_references(&self, _: &Declares) -> ReferenceCollection {
                ReferenceCollection::none()
            }
            fn run(&self, _: &mut Memory, _: ToolProps<Rc<Declares>>) -> ToolResult {
                ToolResult::failed(Rejection::msg("nameless"))
            }
        }
        let _ = Dispatcher::builder().register(Nameless);
    }

    #[test]
    fn reregistering_replaces() {
        let first = KnownOutputTool::new();
        let dispatcher = Dispatcher::builder()
            .register(first)
            .register(KnownOutputTool::new())
            .build();
        assert_eq!(dispatcher.tool_names().len(), 2);
    }

    #[test]
    fn references_follow_nested_programs_and_minus() {
        let dispatcher = Dispatcher::builder().register(DeclaresTool).build();
        let inner = declares(vec![var("IDa000001"), var("IDb000002")]);
        let outer = declares(vec![
            inner.clone().into(),
            var("IDc000003"),
            ReferenceCollection::minus(var("IDb000002")),
        ]);
        assert_eq!(*dispatcher.references(&inner), ids(&["IDa000001", "IDb000002"]));
        assert_eq!(*dispatcher.references(&outer), ids(&["IDa000001", "IDc000003"]));
    }

    #[test]
    fn minus_only_removes_what_came_before() {
        let dispatcher = Dispatcher::builder().register(DeclaresTool).build();
        let program = declares(vec![
            ReferenceCollection::minus(var("IDa000001")),
            var("IDa000001"),
        ]);
        assert_eq!(*dispatcher.references(&program), ids(&["IDa000001"]));
    }

    #[test]
    fn references_are_cached_by_identity() {
        let dispatcher = Dispatcher::builder().register(DeclaresTool).build();
        let program = declares(vec![var("IDa000001")]);
        let first = dispatcher.references(&program);
        assert!(Rc::ptr_eq(&first, &dispatcher.references(&program)));

        let twin = declares(vec![var("IDa000001")]);
        let second = dispatcher.references(&twin);
        assert_eq!(first, second);
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn unregistered_programs_keep_their_json() {
        let dispatcher = Dispatcher::new();
        let json = json!({"toolName": "slider", "min": 0, "max": 10});
        let program = dispatcher.load_program(&json).unwrap();
        assert_eq!(program.tool_name(), "slider");
        assert_eq!(program.to_json(), json);
        assert!(dispatcher.references(&program).is_empty());
        assert!(matches!(
            dispatcher.load_program(&json!([1, 2])),
            Err(ProgramError::MissingToolName(_))
        ));
    }

    #[test]
    fn default_instance_is_per_thread() {
        let installed = Dispatcher::builder().register(KnownOutputTool::new()).build();
        let previous = Dispatcher::install_default(installed.clone());
        assert!(Dispatcher::default_instance().ptr_eq(&installed));
        std::thread::spawn(|| {
            assert!(!Dispatcher::default_instance().contains("testing-known-output"));
        })
        .join()
        .unwrap();
        if let Some(previous) = previous {
            Dispatcher::install_default(previous);
        }
    }
}
