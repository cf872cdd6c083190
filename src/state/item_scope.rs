use crate::imports::*;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Which items of a scope were referenced by argument templates.
///
/// `{0}` consumes item 0 so it is not fed to the pipe as input; `{0!}` only
/// sets it aside, so it skips the pipe but is still passed through.
#[derive(Debug, Default)]
struct Marks {
    consumed: BTreeSet<usize>,
    ignored: BTreeSet<usize>,
}

/// The items in flight plus local variable bindings.
///
/// Scopes nest: `{^0}` reads the parent scope's first item, `{^^0}` its parent's.
#[derive(Debug, Default)]
pub struct ItemScope<'p> {
    items: Vec<String>,
    variables: HashMap<String, String>,
    parent: Option<&'p ItemScope<'p>>,
    marks: Mutex<Marks>,
}

impl<'p> ItemScope<'p> {
    pub fn new(items: Vec<String>) -> Self {
        ItemScope {
            items,
            ..Default::default()
        }
    }

    pub fn child<'c>(&'c self, items: Vec<String>) -> ItemScope<'c>
    where
        'p: 'c,
    {
        ItemScope {
            items,
            parent: Some(self),
            ..Default::default()
        }
    }

    /// A scope under `parent` if there is one, a root scope otherwise.
    pub fn under(parent: Option<&'p ItemScope<'p>>, items: Vec<String>) -> ItemScope<'p> {
        ItemScope {
            items,
            parent,
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Looks a variable up here, then in each parent.
    pub fn variable(&self, name: &str) -> Option<&str> {
        match self.variables.get(name) {
            Some(value) => Some(value),
            None => self.parent?.variable(name),
        }
    }

    fn ancestor(&self, carrots: usize) -> std::result::Result<&ItemScope<'p>, String> {
        let mut scope = self;
        for _ in 0..carrots {
            scope = scope
                .parent
                .ok_or_else(|| format!("Out of scope: {carrots} carrots go beyond the outermost scope"))?;
        }
        Ok(scope)
    }

    fn mark(&self, index: usize, bang: bool) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        if bang {
            marks.ignored.insert(index);
        } else {
            marks.consumed.insert(index);
        }
    }

    pub fn get_item(&self, carrots: usize, index: i64, bang: bool) -> std::result::Result<String, String> {
        let scope = self.ancestor(carrots)?;
        let count = scope.items.len() as i64;
        let resolved = if index < 0 { index + count } else { index };
        if resolved < 0 || resolved >= count {
            return Err(format!(
                "Index `{index}` out of range for {count} item{}",
                if count == 1 { "" } else { "s" }
            ));
        }
        let resolved = resolved as usize;
        scope.mark(resolved, bang);
        Ok(scope.items[resolved].clone())
    }

    pub fn get_items(
        &self,
        carrots: usize,
        start: Option<i64>,
        end: Option<i64>,
        bang: bool,
    ) -> std::result::Result<Vec<String>, String> {
        let scope = self.ancestor(carrots)?;
        let count = scope.items.len() as i64;
        let resolve = |bound: i64| if bound < 0 { bound + count } else { bound };

        let from = start.map(resolve).unwrap_or(0);
        let to = end.map(resolve).unwrap_or(count);
        if from < 0 || from > count || to < 0 || to > count {
            return Err(format!(
                "Slice `{}:{}` out of range for {count} items",
                start.map(|s| s.to_string()).unwrap_or_default(),
                end.map(|e| e.to_string()).unwrap_or_default(),
            ));
        }
        if from >= to {
            return Ok(Vec::new());
        }
        let (from, to) = (from as usize, to as usize);
        for index in from..to {
            scope.mark(index, bang);
        }
        Ok(scope.items[from..to].to_vec())
    }

    /// Splits this scope's items into `(ignored, input)`.
    ///
    /// Consumed items appear in neither list; ignored items are set aside to be passed through.
    pub fn extract_ignored(&self) -> (Vec<String>, Vec<String>) {
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ignored = Vec::new();
        let mut input = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            if marks.ignored.contains(&index) {
                ignored.push(item.clone());
            } else if !marks.consumed.contains(&index) {
                input.push(item.clone());
            }
        }
        (ignored, input)
    }
}
