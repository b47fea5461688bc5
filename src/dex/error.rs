use std::fmt;

macro_rules! err {
    ($base:ident, $msg:literal) => {
        DexError::with_context($base, $msg.to_string())
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::with_context($base, format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        DexError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::new(&format!($fmtstr, $($args)*))
    };
}


#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err($crate::dex::error::DexError::new($msg))
    };
    (($msg:literal), ($context:literal)) => {
        return Err($crate::dex::error::DexError::with_context($crate::dex::error::DexError::new($msg), $context.to_string()))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::dex::error::DexError::new(&format!($fmtstr, $($args)*)))
    };
    (($fmtstr:literal, $($args:tt)*), ($context:literal)) => {
        return Err($crate::dex::error::DexError::with_context($crate::dex::error::DexError::new(&format!($fmtstr, $($args)*)), $context.to_string()))
    };
    (($fmtstr:literal, $($args:tt)*), ($contextfmt:literal, $($contextargs:tt)*)) => {
        return Err($crate::dex::error::DexError::with_context($crate::dex::error::DexError::new(&format!($fmtstr, $($args)*)), format!($contextfmt, $($contextargs)*)))
    };
}


/// Broad category of a [`DexError`].
///
/// `InvalidFormat` aborts a whole load, `InvalidInstruction` only the current
/// linear sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    InvalidFormat,
    InvalidInstruction,
    InvalidArgument,
    UnexpectedEof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(msg: &str) -> Self
    {
        DexError {
            kind: ErrorKind::InvalidFormat,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_kind(kind: ErrorKind, msg: &str) -> Self
    {
        DexError {
            kind,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn invalid_instruction(msg: &str) -> Self
    {
        Self::with_kind(ErrorKind::InvalidInstruction, msg)
    }

    pub(crate) fn invalid_argument(msg: &str) -> Self
    {
        Self::with_kind(ErrorKind::InvalidArgument, msg)
    }

    pub(crate) fn eof(msg: &str) -> Self
    {
        Self::with_kind(ErrorKind::UnexpectedEof, msg)
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, msg: base.msg, contexts }
    }

    /// Re-labels an error, keeping message and contexts. Used when a cursor
    /// underrun happens inside an instruction and must surface as a decode error.
    pub(crate) fn into_kind(self, kind: ErrorKind) -> Self
    {
        DexError { kind, ..self }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_chains_contexts()
    {
        let base = DexError::new("bad magic");
        let e = err!(base, "header");
        let e = DexError::with_context(e, "classes.dex".to_string());
        assert_eq!(e.to_string(), "bad magic for header of classes.dex");
        assert_eq!(e.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn into_kind_keeps_message()
    {
        let e = DexError::eof("Unexpected end of stream").into_kind(ErrorKind::InvalidInstruction);
        assert_eq!(e.kind(), ErrorKind::InvalidInstruction);
        assert_eq!(e.message(), "Unexpected end of stream");
    }
}
