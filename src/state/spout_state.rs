use crate::imports::*;

/// One deferred spout invocation: the items it received and its determined arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoutCall {
    pub items: Vec<String>,
    pub args: Args,
}

#[derive(Clone)]
pub(crate) struct PendingSpout {
    pub(crate) spout: Arc<dyn Spout>,
    pub(crate) calls: Vec<SpoutCall>,
}

impl std::fmt::Debug for PendingSpout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSpout")
            .field("spout", &self.spout.name())
            .field("calls", &self.calls.len())
            .finish()
    }
}

/// Side effects accumulated while a pipeline runs, performed once it has finished.
#[derive(Debug, Clone, Default)]
pub struct SpoutState {
    print_values: Vec<Vec<String>>,
    simple: Vec<PendingSpout>,
    aggregated: Vec<PendingSpout>,
    spouted: bool,
}

impl SpoutState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures one column of the print table.
    pub fn print(&mut self, items: Vec<String>) {
        self.print_values.push(items);
        self.spouted = true;
    }

    /// Defers a spout invocation. Aggregated spouts gather every invocation under one callback.
    pub fn hook(&mut self, spout: Arc<dyn Spout>, items: Vec<String>, args: Args) {
        self.spouted = true;
        let call = SpoutCall { items, args };
        match spout.mode() {
            SpoutMode::Simple => self.simple.push(PendingSpout {
                spout,
                calls: vec![call],
            }),
            SpoutMode::Aggregated => {
                match self.aggregated.iter_mut().find(|p| p.spout.name() == spout.name()) {
                    Some(pending) => pending.calls.push(call),
                    None => self.aggregated.push(PendingSpout {
                        spout,
                        calls: vec![call],
                    }),
                }
            }
        }
    }

    /// Absorbs the state of a nested pipeline, keeping aggregation by name.
    pub fn extend(&mut self, other: SpoutState) {
        self.print_values.extend(other.print_values);
        self.simple.extend(other.simple);
        for pending in other.aggregated {
            match self
                .aggregated
                .iter_mut()
                .find(|p| p.spout.name() == pending.spout.name())
            {
                Some(existing) => existing.calls.extend(pending.calls),
                None => self.aggregated.push(pending),
            }
        }
        self.spouted |= other.spouted;
    }

    pub fn print_values(&self) -> &[Vec<String>] {
        &self.print_values
    }

    /// Whether any spout (including `print`) was reached.
    pub fn spouted(&self) -> bool {
        self.spouted
    }

    pub fn anything(&self) -> bool {
        !self.print_values.is_empty() || !self.simple.is_empty() || !self.aggregated.is_empty()
    }

    /// Number of callbacks that `take_callbacks` would hand out.
    pub fn callbacks(&self) -> usize {
        self.simple.len() + self.aggregated.len()
    }

    /// Drains every pending callback, simple ones first.
    pub(crate) fn take_callbacks(&mut self) -> Vec<PendingSpout> {
        let mut callbacks = std::mem::take(&mut self.simple);
        callbacks.append(&mut self.aggregated);
        callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{aggregated_spout, recording_spout};

    fn items(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aggregated_spouts_share_one_callback() {
        let (simple, _) = recording_spout("log");
        let (gathered, _) = aggregated_spout("gather");

        let mut state = SpoutState::new();
        state.hook(gathered.clone(), items(&["a"]), Args::new());
        state.hook(simple.clone(), items(&["b"]), Args::new());
        state.hook(gathered.clone(), items(&["c"]), Args::new());

        let mut nested = SpoutState::new();
        nested.hook(gathered, items(&["d"]), Args::new());
        nested.hook(simple, items(&["e"]), Args::new());
        state.extend(nested);

        assert_eq!(state.callbacks(), 3);
        let callbacks = state.take_callbacks();
        assert_eq!(callbacks[0].spout.name(), "log");
        assert_eq!(callbacks[1].spout.name(), "log");
        assert_eq!(callbacks[2].spout.name(), "gather");
        assert_eq!(callbacks[2].calls.len(), 3);
        assert_eq!(state.callbacks(), 0);
    }

    #[test]
    fn print_counts_as_spouting() {
        let mut state = SpoutState::new();
        assert!(!state.spouted());
        state.print(items(&["x"]));
        assert!(state.spouted());
        assert!(state.anything());
        assert_eq!(state.print_values(), &[items(&["x"])]);
    }
}
