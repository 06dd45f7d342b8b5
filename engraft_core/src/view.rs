// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Views: what a tool shows for its program.
//!
//! Rendering proper belongs to the host. The core only produces a
//! [`ToolView`] whose identity is stable when nothing changed, and a
//! host-neutral [`ViewOutput`] description that hosts map onto real widgets.

use std::fmt;
use std::rc::Rc;

use engraft_promise::{EngraftPromise, PromiseState};
use engraft_refunc::RefEq;
use serde_json::Value;

use crate::tool::ToolOutput;
use crate::var::VarBindings;

/// Properties supplied by the host when rendering a view.
#[derive(Clone, Debug, Default)]
pub struct RenderProps {
    /// Whether the view should take focus.
    pub auto_focus: bool,
    /// Whether the view should show its expanded form.
    pub expand: bool,
    /// Bindings visible to editors inside the view.
    pub scope_var_bindings: VarBindings,
}

/// A host-neutral description of rendered output.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewOutput {
    /// Nothing to show.
    Empty,
    /// Plain text.
    Text(String),
    /// A value to inspect.
    Value(Value),
    /// An output that has not settled yet.
    Pending,
    /// A visible, non-fatal warning.
    Warning(String),
    /// A visible error.
    Error(String),
    /// Labelled children, shown together.
    Group {
        /// Heading of the group.
        label: String,
        /// Children in display order.
        children: Vec<ViewOutput>,
    },
}

impl ViewOutput {
    /// Returns the first error or warning message in this tree, if any.
    #[must_use]
    pub fn first_problem(&self) -> Option<&str> {
        match self {
            Self::Warning(message) | Self::Error(message) => Some(message),
            Self::Group { children, .. } => children.iter().find_map(Self::first_problem),
            _ => None,
        }
    }
}

/// Something that renders a view.
pub trait ViewRender {
    /// Renders the view.
    fn render(&self, props: &RenderProps) -> ViewOutput;
}

impl<F> ViewRender for F
where
    F: Fn(&RenderProps) -> ViewOutput,
{
    fn render(&self, props: &RenderProps) -> ViewOutput {
        self(props)
    }
}

/// A shared view handle. Views compare by identity.
#[derive(Clone)]
pub struct ToolView(Rc<dyn ViewRender>);

impl ToolView {
    /// Wraps a renderer.
    pub fn new(render: impl ViewRender + 'static) -> Self {
        Self(Rc::new(render))
    }

    /// A view that renders a fixed output.
    pub fn fixed(output: ViewOutput) -> Self {
        Self::new(move |_: &RenderProps| output.clone())
    }

    /// A view that shows nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::fixed(ViewOutput::Empty)
    }

    /// A view that shows `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::fixed(ViewOutput::Text(text.into()))
    }

    /// A view that shows an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::fixed(ViewOutput::Error(message.into()))
    }

    /// A view that shows a warning message.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::fixed(ViewOutput::Warning(message.into()))
    }

    /// A view that shows the current state of an output promise.
    pub fn output(output: EngraftPromise<ToolOutput>) -> Self {
        Self::new(move |_: &RenderProps| render_output(&output))
    }

    /// Renders the view.
    #[must_use]
    pub fn render(&self, props: &RenderProps) -> ViewOutput {
        self.0.render(props)
    }

    /// Returns `true` if both handles share one renderer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl RefEq for ToolView {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ToolView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolView").finish_non_exhaustive()
    }
}

/// Describes the current state of an output promise.
pub fn render_output(output: &EngraftPromise<ToolOutput>) -> ViewOutput {
    match output.state() {
        PromiseState::Pending => ViewOutput::Pending,
        PromiseState::Fulfilled(output) => ViewOutput::Value(output.value),
        PromiseState::Rejected(reason) => ViewOutput::Error(reason.to_string()),
    }
}
