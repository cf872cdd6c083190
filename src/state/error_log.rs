use serde::Serialize;
use std::fmt;

/// A value with its non-terminal warnings, or the terminal log that prevented it.
pub type Diagnosed<T> = std::result::Result<(T, ErrorLog), ErrorLog>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub message: String,
    pub terminal: bool,
    /// Breadcrumbs from the outermost context inwards.
    pub path: Vec<String>,
    /// Number of consecutive identical entries collapsed into this one.
    pub count: usize,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            write!(f, "({}) ", self.count)?;
        }
        if !self.path.is_empty() {
            write!(f, "in {}: ", self.path.join(" > "))?;
        }
        write!(f, "{}", self.message)
    }
}

/// A rendered error log, ready for a `ScriptIO` to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub title: String,
    pub body: String,
    pub terminal: bool,
}

/// Ordered accumulation of warnings and terminal errors.
///
/// A log is terminal iff any of its entries is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorLog {
    entries: Vec<LogEntry>,
    terminal: bool,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding a single terminal entry.
    pub fn fatal(message: impl Into<String>) -> Self {
        let mut log = Self::new();
        log.log(message, true);
        log
    }

    pub fn log(&mut self, message: impl Into<String>, terminal: bool) -> &mut Self {
        let message = message.into();
        if terminal {
            tracing::warn!(message = %message, "Terminal script error");
        } else {
            tracing::debug!(message = %message, "Script warning");
        }
        self.push(LogEntry {
            message,
            terminal,
            path: Vec::new(),
            count: 1,
        });
        self
    }

    pub fn warn(&mut self, message: impl Into<String>) -> &mut Self {
        self.log(message, false)
    }

    /// Logs a terminal entry and hands the whole log back, leaving this one empty.
    ///
    /// Meant for `return Err(errors.fail(..))`.
    pub fn fail(&mut self, message: impl Into<String>) -> ErrorLog {
        self.log(message, true);
        std::mem::take(self)
    }

    fn push(&mut self, entry: LogEntry) {
        self.terminal |= entry.terminal;
        if let Some(last) = self.entries.last_mut()
            && last.message == entry.message
            && last.terminal == entry.terminal
            && last.path == entry.path
        {
            last.count += entry.count;
            return;
        }
        self.entries.push(entry);
    }

    /// Appends another log's entries, prefixing their paths with `label`.
    pub fn extend(&mut self, other: ErrorLog, label: Option<&str>) -> &mut Self {
        for mut entry in other.entries {
            if let Some(label) = label {
                entry.path.insert(0, label.to_string());
            }
            self.push(entry);
        }
        self
    }

    /// Folds a child result into this log.
    ///
    /// Warnings are kept and the value returned; a terminal child makes the whole
    /// log terminal and returns it as the error, ready for `?`.
    pub fn merge<T>(
        &mut self,
        result: Diagnosed<T>,
        label: Option<&str>,
    ) -> std::result::Result<T, ErrorLog> {
        match result {
            Ok((value, warnings)) => {
                self.extend(warnings, label);
                Ok(value)
            }
            Err(errors) => {
                self.extend(errors, label);
                Err(std::mem::take(self))
            }
        }
    }

    /// `Ok((value, self))` unless the log is terminal.
    pub fn into_result<T>(self, value: T) -> Diagnosed<T> {
        if self.terminal { Err(self) } else { Ok((value, self)) }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Renders the log for display, or `None` when there is nothing to show.
    pub fn render(&self, name: Option<&str>) -> Option<Diagnostic> {
        if self.is_empty() {
            return None;
        }
        let mut title = if self.terminal { "Error log" } else { "Warning log" }.to_string();
        if let Some(name) = name {
            title.push_str(" for ");
            title.push_str(name);
        }
        Some(Diagnostic {
            title,
            body: self.to_string(),
            terminal: self.terminal,
        })
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let marker = if entry.terminal { "error" } else { "warning" };
            write!(f, "{marker}: {entry}")?;
        }
        Ok(())
    }
}
