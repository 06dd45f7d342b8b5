// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Programs: the immutable, tagged records that tools run.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use engraft_refunc::RefEq;
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON key holding a program's tool name.
pub const TOOL_NAME_KEY: &str = "toolName";

/// A tool-specific program record.
///
/// Programs are immutable. Editing a program means building a new one, and
/// the identity of the shared [`Program`] handle is the signal that it
/// changed.
pub trait ToolProgram: Any + fmt::Debug {
    /// Name of the tool that runs this program.
    fn tool_name(&self) -> &str;

    /// Serializes the program as a JSON object tagged with
    /// [`TOOL_NAME_KEY`].
    ///
    /// The default writes only the tag, for programs that hold
    /// non-serializable state.
    fn to_json(&self) -> Value {
        tagged(self.tool_name(), Map::new())
    }
}

/// Builds a JSON object tagged with `tool_name`.
pub fn tagged(tool_name: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert(TOOL_NAME_KEY.to_owned(), Value::from(tool_name));
    Value::Object(fields)
}

/// A shared handle to any tool's program.
#[derive(Clone)]
pub struct Program(Rc<dyn ToolProgram>);

impl Program {
    /// Wraps a program.
    pub fn new<P: ToolProgram>(program: P) -> Self {
        Self(Rc::new(program))
    }

    /// Wraps an already shared program, keeping its identity.
    pub fn from_rc<P: ToolProgram>(program: Rc<P>) -> Self {
        Self(program)
    }

    /// Name of the tool that runs this program.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        self.0.tool_name()
    }

    /// Serializes the program tree.
    #[must_use]
    pub fn to_json(&self) -> Value {
        self.0.to_json()
    }

    /// Returns the typed program, sharing this handle's allocation.
    #[must_use]
    pub fn downcast<P: ToolProgram>(&self) -> Option<Rc<P>> {
        let any: Rc<dyn Any> = self.0.clone();
        any.downcast().ok()
    }

    /// Returns `true` if both handles share one program.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared program, used as an identity key.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<dyn ToolProgram> {
        Rc::downgrade(&self.0)
    }
}

impl RefEq for Program {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// An error loading a program tree from JSON.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The value is not an object with a string `toolName`.
    #[error("program is not an object with a string `toolName`: {0}")]
    MissingToolName(Value),
    /// A field required by the tool is absent or has the wrong shape.
    #[error("program for `{tool}` has an invalid `{field}` field")]
    InvalidField {
        /// The tool whose program failed to load.
        tool: String,
        /// The offending field.
        field: String,
    },
    /// The tool cannot be loaded from JSON.
    #[error("programs for `{0}` cannot be loaded from JSON")]
    NotSerializable(String),
    /// A nested value failed to deserialize.
    #[error("failed to deserialize program: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProgramError {
    /// Shorthand for [`ProgramError::InvalidField`].
    pub fn invalid_field(tool: &str, field: &str) -> Self {
        Self::InvalidField {
            tool: tool.to_owned(),
            field: field.to_owned(),
        }
    }
}

/// Reads the tool name tag of a serialized program.
///
/// # Errors
///
/// Returns [`ProgramError::MissingToolName`] if `json` is not an object with
/// a string tag.
pub fn tool_name_of(json: &Value) -> Result<&str, ProgramError> {
    json.get(TOOL_NAME_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| ProgramError::MissingToolName(json.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Note {
        text: String,
    }

    impl ToolProgram for Note {
        fn tool_name(&self) -> &str {
            "note"
        }

        fn to_json(&self) -> Value {
            let mut fields = Map::new();
            fields.insert("text".into(), Value::from(self.text.as_str()));
            tagged(self.tool_name(), fields)
        }
    }

    #[derive(Debug)]
    struct Other;

    impl ToolProgram for Other {
        fn tool_name(&self) -> &str {
            "other"
        }
    }

    #[test]
    fn downcast_keeps_identity() {
        let program = Program::new(Note { text: "hi".into() });
        let typed = program.downcast::<Note>().unwrap();
        assert_eq!(typed.text, "hi");
        assert!(program.ptr_eq(&Program::from_rc(typed)));
        assert!(program.downcast::<Other>().is_none());
    }

    #[test]
    fn identity_not_contents_decides_equality() {
        let a = Program::new(Note { text: "same".into() });
        let b = Program::new(Note { text: "same".into() });
        assert!(a.ref_eq(&a.clone()));
        assert!(!a.ref_eq(&b));
    }

    #[test]
    fn json_is_tagged() {
        let note = Program::new(Note { text: "hi".into() });
        assert_eq!(note.to_json(), json!({"toolName": "note", "text": "hi"}));
        assert_eq!(Program::new(Other).to_json(), json!({"toolName": "other"}));
        assert_eq!(tool_name_of(&note.to_json()).unwrap(), "note");
        assert!(matches!(
            tool_name_of(&json!({"text": 1})),
            Err(ProgramError::MissingToolName(_))
        ));
    }
}
