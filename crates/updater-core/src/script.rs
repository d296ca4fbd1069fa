//! Update scripts: the ordered list of operations an install applies.
//!
//! A script is a UTF-8 text file with one operation per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! COPY app/bin/app.exe -> app.exe
//! COPY [mode=0755] [sha256=<hex>] "bin/helper tool" -> "bin/helper tool"
//! DELETE lib/old.dll
//! EXEC [best-effort] bin/post-install --quiet
//! ```
//!
//! Fields are separated by whitespace and may be double-quoted (`\"` and `\\`
//! escape inside quotes). Option fields in square brackets come straight
//! after the kind. Every problem is reported by [`UpdateScript::parse`], so a
//! bad script never starts mutating the install directory.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PathError, ScriptParseError};
use crate::path::RelativePath;

const COPY: &str = "COPY";
const DELETE: &str = "DELETE";
const EXEC: &str = "EXEC";
const ARROW: &str = "->";
const MAX_MODE: u32 = 0o7777;

/// What happens to the rest of the script when an operation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Required,
    /// Failure is reported as a warning and the script continues.
    BestEffort,
}

/// Program run by an `EXEC` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Shipped inside the install directory.
    Installed(RelativePath),
    /// Bare name looked up on `PATH`.
    OnPath(String),
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed(path) => write!(f, "{path}"),
            Self::OnPath(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    CopyFile {
        source: RelativePath,
        destination: RelativePath,
        mode: Option<u32>,
        sha256: Option<String>,
    },
    DeleteFile {
        destination: RelativePath,
    },
    ExecuteCommand {
        program: Program,
        args: Vec<String>,
    },
}

impl OperationKind {
    fn name(&self) -> &'static str {
        match self {
            Self::CopyFile { .. } => COPY,
            Self::DeleteFile { .. } => DELETE,
            Self::ExecuteCommand { .. } => EXEC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: OperationKind,
    policy: FailurePolicy,
    line: usize,
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    #[must_use]
    pub fn is_best_effort(&self) -> bool {
        self.policy == FailurePolicy::BestEffort
    }

    /// Manifest line this operation came from.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Install-directory path this operation writes to, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&RelativePath> {
        match &self.kind {
            OperationKind::CopyFile { destination, .. }
            | OperationKind::DeleteFile { destination } => Some(destination),
            OperationKind::ExecuteCommand { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::CopyFile {
                source,
                destination,
                ..
            } => write!(f, "{COPY} {source} {ARROW} {destination}"),
            OperationKind::DeleteFile { destination } => write!(f, "{DELETE} {destination}"),
            OperationKind::ExecuteCommand { program, args } => {
                write!(f, "{EXEC} {program}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// A validated, immutable sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateScript {
    operations: Vec<Operation>,
    path: Option<PathBuf>,
}

impl UpdateScript {
    /// Read and validate the manifest at `manifest_path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read as UTF-8 text or any line
    /// fails validation.
    pub fn parse(manifest_path: &Path) -> Result<Self, ScriptParseError> {
        let bytes = std::fs::read(manifest_path)
            .map_err(|error| ScriptParseError::read(manifest_path, &error))?;
        let text = String::from_utf8(bytes).map_err(|error| {
            ScriptParseError::read(
                manifest_path,
                &std::io::Error::new(std::io::ErrorKind::InvalidData, error),
            )
        })?;

        let mut script = Self::parse_str(&text)?;
        script.path = Some(manifest_path.to_path_buf());
        Ok(script)
    }

    /// Validate manifest text that did not come from a file.
    ///
    /// # Errors
    /// Returns the first line that fails validation.
    pub fn parse_str(text: &str) -> Result<Self, ScriptParseError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut operations = Vec::new();

        for (index, raw_line) in text.lines().enumerate() {
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            operations.push(parse_line(trimmed, index + 1)?);
        }

        Ok(Self {
            operations,
            path: None,
        })
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Manifest file this script was read from.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_bare(&self, text: &str) -> bool {
        !self.quoted && self.text == text
    }

    fn is_option(&self) -> bool {
        !self.quoted && self.text.starts_with('[')
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Operation, ScriptParseError> {
    let mut tokens = tokenize(line, line_no)?.into_iter();
    let Some(kind_token) = tokens.next() else {
        return Err(ScriptParseError::malformed(line_no, "empty operation"));
    };
    let operation = operation_name(&kind_token).ok_or_else(|| {
        ScriptParseError::UnknownOperation {
            line: line_no,
            kind: kind_token.text.clone(),
        }
    })?;

    let mut options = Options::default();
    let mut operands = Vec::new();
    for token in tokens {
        if operands.is_empty() && token.is_option() {
            options.apply(&token.text, operation, line_no)?;
        } else {
            operands.push(token);
        }
    }

    let kind = match operation {
        COPY => parse_copy(operands, options.mode, options.sha256, line_no)?,
        DELETE => parse_delete(operands, line_no)?,
        _ => parse_exec(operands, line_no)?,
    };

    Ok(Operation {
        kind,
        policy: options.policy,
        line: line_no,
    })
}

fn operation_name(token: &Token) -> Option<&'static str> {
    if token.quoted {
        return None;
    }
    [COPY, DELETE, EXEC]
        .into_iter()
        .find(|name| token.text.eq_ignore_ascii_case(name))
}

#[derive(Default)]
struct Options {
    policy: FailurePolicy,
    mode: Option<u32>,
    sha256: Option<String>,
}

impl Options {
    fn apply(
        &mut self,
        raw: &str,
        operation: &'static str,
        line: usize,
    ) -> Result<(), ScriptParseError> {
        let invalid = || ScriptParseError::InvalidOption {
            line,
            operation,
            option: raw.to_string(),
        };

        let inner = raw
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;
        let (name, value) = match inner.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (inner.trim(), None),
        };

        match (name, value, operation) {
            ("best-effort", None, _) => self.policy = FailurePolicy::BestEffort,
            ("required", None, _) => self.policy = FailurePolicy::Required,
            ("mode", Some(value), COPY) => {
                let mode = u32::from_str_radix(value, 8).map_err(|_| invalid())?;
                if mode > MAX_MODE {
                    return Err(invalid());
                }
                self.mode = Some(mode);
            }
            ("sha256", Some(value), COPY) => {
                if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                self.sha256 = Some(value.to_ascii_lowercase());
            }
            _ => return Err(invalid()),
        }
        Ok(())
    }
}

fn parse_copy(
    operands: Vec<Token>,
    mode: Option<u32>,
    sha256: Option<String>,
    line: usize,
) -> Result<OperationKind, ScriptParseError> {
    let missing = |field| ScriptParseError::MissingField {
        line,
        operation: COPY,
        field,
    };

    let mut operands = operands.into_iter();
    let source = operands.next().ok_or_else(|| missing("source"))?;
    let Some(arrow) = operands.next() else {
        return Err(missing("destination"));
    };
    if !arrow.is_bare(ARROW) {
        return Err(ScriptParseError::malformed(
            line,
            format!("expected '{ARROW}' after the {COPY} source"),
        ));
    }
    let destination = operands.next().ok_or_else(|| missing("destination"))?;
    if let Some(extra) = operands.next() {
        return Err(ScriptParseError::malformed(
            line,
            format!("unexpected field '{}' after the {COPY} destination", extra.text),
        ));
    }

    Ok(OperationKind::CopyFile {
        source: relative_path(&source.text, line)?,
        destination: relative_path(&destination.text, line)?,
        mode,
        sha256,
    })
}

fn parse_delete(operands: Vec<Token>, line: usize) -> Result<OperationKind, ScriptParseError> {
    let mut operands = operands.into_iter();
    let destination = operands
        .next()
        .ok_or(ScriptParseError::MissingField {
            line,
            operation: DELETE,
            field: "destination",
        })?;
    if let Some(extra) = operands.next() {
        return Err(ScriptParseError::malformed(
            line,
            format!("unexpected field '{}' after the {DELETE} path", extra.text),
        ));
    }

    Ok(OperationKind::DeleteFile {
        destination: relative_path(&destination.text, line)?,
    })
}

fn parse_exec(operands: Vec<Token>, line: usize) -> Result<OperationKind, ScriptParseError> {
    let mut operands = operands.into_iter();
    let program = operands.next().ok_or(ScriptParseError::MissingField {
        line,
        operation: EXEC,
        field: "command",
    })?;

    let program = if program.text.contains(['/', '\\']) {
        Program::Installed(relative_path(&program.text, line)?)
    } else {
        Program::OnPath(program.text)
    };

    Ok(OperationKind::ExecuteCommand {
        program,
        args: operands.map(|token| token.text).collect(),
    })
}

fn relative_path(raw: &str, line: usize) -> Result<RelativePath, ScriptParseError> {
    RelativePath::parse(raw).map_err(|reason: PathError| ScriptParseError::InvalidPath {
        line,
        path: raw.to_string(),
        reason,
    })
}

fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>, ScriptParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_ascii_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.peek() {
                        Some(&next @ ('"' | '\\')) => {
                            text.push(next);
                            chars.next();
                        }
                        _ => text.push('\\'),
                    },
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(ScriptParseError::malformed(line_no, "unterminated quote"));
            }
            if chars.peek().is_some_and(|c| !c.is_ascii_whitespace()) {
                return Err(ScriptParseError::malformed(
                    line_no,
                    "unexpected character after closing quote",
                ));
            }
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_whitespace() {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
            });
        }
    }

    Ok(tokens)
}
