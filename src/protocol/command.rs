//! Parsed client requests.

use bytes::Bytes;

/// One client request: an ordered, non-empty list of arguments.
///
/// Argument 0 is the command name, matched case-insensitively at dispatch.
/// The remaining arguments are positional and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from its arguments.
    ///
    /// Returns `None` when `args` is empty.
    pub fn from_args(args: Vec<Bytes>) -> Option<Self> {
        if args.is_empty() {
            None
        } else {
            Some(Self { args })
        }
    }

    /// The command name as sent by the client, for error messages.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).into_owned()
    }

    /// The uppercased command name used as the dispatch key.
    pub fn dispatch_key(&self) -> String {
        self.name_lossy().to_ascii_uppercase()
    }

    /// All arguments, including the command name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Total number of arguments, including the command name.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}
