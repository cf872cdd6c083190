use crate::imports::*;
use crate::registry::is_valid_name;
use crate::services::persist::Persistence;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/*
    Types:
    * MessagePattern - A message regex, serialized as its source text
    * Trigger - What an event reacts to
    * TriggerInput - Something that happened and might trigger events
    * Activation - Starting items and arguments for a triggered event's script
    * Event - A trigger bound to a script and the channels it's enabled in
    * EventRegistry - Every event, written through on every change
*/

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessagePattern {
    source: String,
    regex: Regex,
}

impl MessagePattern {
    /// Compiles with `.` matching newlines.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = Regex::new(&format!("(?s){source}"))
            .with_context(|| format!("Invalid message pattern `{source}`"))?;
        Ok(MessagePattern { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl PartialEq for MessagePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for MessagePattern {
    type Error = anyhow::Error;

    fn try_from(source: String) -> Result<Self> {
        MessagePattern::new(source)
    }
}

impl From<MessagePattern> for String {
    fn from(pattern: MessagePattern) -> String {
        pattern.source
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Trigger {
    OnMessage { pattern: MessagePattern },
    OnReaction { emoji: Vec<String> },
    OnInvoke { command: String },
}

impl Trigger {
    pub fn on_message(pattern: &str) -> Result<Self> {
        Ok(Trigger::OnMessage {
            pattern: MessagePattern::new(pattern)?,
        })
    }

    /// Comma separated emoji.
    pub fn on_reaction(emoji: &str) -> Self {
        Trigger::OnReaction {
            emoji: emoji
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn on_invoke(command: &str) -> Self {
        Trigger::OnInvoke {
            command: command.trim().to_lowercase(),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::OnMessage { pattern } => write!(f, "ON MESSAGE `{}`", pattern.as_str()),
            Trigger::OnReaction { emoji } => write!(f, "ON REACTION `{}`", emoji.join(",")),
            Trigger::OnInvoke { command } => write!(f, "ON INVOKE `{command}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerInput {
    Message { text: String },
    Reaction { emoji: String, user: String },
    Invoke { command: String, payload: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub items: Vec<String>,
    pub arguments: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub channels: BTreeSet<String>,
    pub script: String,
    pub trigger: Trigger,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        script: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        Event {
            name: name.into(),
            desc: None,
            author_id: author_id.into(),
            channels: BTreeSet::new(),
            script: script.into(),
            trigger,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.insert(channel.into());
        self
    }

    pub fn is_enabled(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Whether the input triggers this event. Channels are not considered here.
    pub fn matches(&self, input: &TriggerInput) -> bool {
        self.activate(input).is_some()
    }

    /// The starting items and arguments if the input triggers this event.
    ///
    /// Messages start with the capture groups (or the whole text when there are none)
    /// and bind `0` to the full match, `1`.. to the groups and named groups by name.
    /// Reactions start with the emoji and the reacting user and bind `emoji`.
    /// Invokes start with their payload and bind `command` and `0`.. to the payload.
    pub fn activate(&self, input: &TriggerInput) -> Option<Activation> {
        match (&self.trigger, input) {
            (Trigger::OnMessage { pattern }, TriggerInput::Message { text }) => {
                let regex = pattern.regex();
                let captures = regex.captures(text)?;
                let groups: Vec<String> = captures
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();

                let mut arguments: HashMap<String, String> = groups
                    .iter()
                    .enumerate()
                    .map(|(i, g)| ((i + 1).to_string(), g.clone()))
                    .collect();
                if let Some(whole) = captures.get(0) {
                    arguments.insert("0".to_string(), whole.as_str().to_string());
                }
                for name in regex.capture_names().flatten() {
                    let value = captures.name(name).map(|m| m.as_str()).unwrap_or_default();
                    arguments.insert(name.to_string(), value.to_string());
                }

                let items = if groups.is_empty() { vec![text.clone()] } else { groups };
                Some(Activation { items, arguments })
            }
            (Trigger::OnReaction { emoji }, TriggerInput::Reaction { emoji: got, user }) => {
                emoji.contains(got).then(|| Activation {
                    items: vec![got.clone(), user.clone()],
                    arguments: HashMap::from([("emoji".to_string(), got.clone())]),
                })
            }
            (Trigger::OnInvoke { command }, TriggerInput::Invoke { command: got, payload }) => {
                (got.to_lowercase() == *command).then(|| {
                    let mut arguments: HashMap<String, String> = payload
                        .iter()
                        .enumerate()
                        .map(|(i, p)| (i.to_string(), p.clone()))
                        .collect();
                    arguments.insert("command".to_string(), command.clone());
                    Activation {
                        items: payload.clone(),
                        arguments,
                    }
                })
            }
            _ => None,
        }
    }
}

pub struct EventRegistry {
    events: RwLock<BTreeMap<String, Event>>,
    persistence: Persistence,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry").finish_non_exhaustive()
    }
}

impl EventRegistry {
    pub(crate) fn new(persistence: Persistence) -> Self {
        EventRegistry {
            events: RwLock::new(BTreeMap::new()),
            persistence,
        }
    }

    async fn write(&self) {
        match self.snapshot().await {
            Ok(snapshot) => self.persistence.write("events", snapshot).await,
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "Failed to snapshot events"),
        }
    }

    pub async fn define(&self, mut event: Event) -> Result<()> {
        event.name = event.name.to_lowercase();
        if !is_valid_name(&event.name) {
            anyhow::bail!("`{}` is not a valid event name", event.name);
        }
        {
            let mut events = self.events.write().await;
            if events.contains_key(&event.name) {
                anyhow::bail!("An event named `{}` already exists", event.name);
            }
            tracing::debug!(event = %event.name, trigger = %event.trigger, "Defined event");
            events.insert(event.name.clone(), event);
        }
        self.write().await;
        Ok(())
    }

    /// Edits an event in place. The name can't be changed, nor the kind of trigger.
    /// `Runtime::edit_event` checks the new script before calling this.
    pub async fn edit(&self, name: &str, edit: impl FnOnce(&mut Event)) -> Result<()> {
        {
            let mut events = self.events.write().await;
            let event = events
                .get_mut(name)
                .with_context(|| format!("No event named `{name}`"))?;
            let before = event.clone();
            edit(event);
            event.name = before.name.clone();
            if std::mem::discriminant(&event.trigger) != std::mem::discriminant(&before.trigger) {
                *event = before;
                anyhow::bail!("Event `{name}` can't change to a different kind of trigger");
            }
        }
        self.write().await;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<Event> {
        let removed = self
            .events
            .write()
            .await
            .remove(name)
            .with_context(|| format!("No event named `{name}`"))?;
        self.write().await;
        Ok(removed)
    }

    pub async fn enable(&self, name: &str, channel: &str) -> Result<()> {
        self.edit(name, |event| {
            event.channels.insert(channel.to_string());
        })
        .await
    }

    pub async fn disable(&self, name: &str, channel: &str) -> Result<()> {
        self.edit(name, |event| {
            event.channels.remove(channel);
        })
        .await
    }

    pub async fn get(&self, name: &str) -> Option<Event> {
        self.events.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Event> {
        self.events.read().await.values().cloned().collect()
    }

    /// Events enabled in `channel` that the input triggers, with their activations.
    pub async fn triggered(&self, input: &TriggerInput, channel: &str) -> Vec<(Event, Activation)> {
        self.events
            .read()
            .await
            .values()
            .filter(|event| event.is_enabled(channel))
            .filter_map(|event| event.activate(input).map(|a| (event.clone(), a)))
            .collect()
    }

    /// Runs the script of every triggered event, one after the other.
    #[tracing::instrument(skip(self, runtime, input))]
    pub async fn dispatch(
        &self,
        runtime: &Arc<Runtime>,
        input: &TriggerInput,
        channel: &str,
        activator: &str,
    ) -> Vec<(String, ExecutionReport)> {
        let triggered = self.triggered(input, channel).await;
        tracing::debug!(count = triggered.len(), "Dispatching events");

        let mut reports = Vec::with_capacity(triggered.len());
        for (event, activation) in triggered {
            let context = Context::new(runtime.clone(), Origin::event(&event.name, activator))
                .with_author(&event.author_id)
                .with_channel(channel)
                .with_arguments(activation.arguments);
            let scope = ItemScope::new(activation.items);
            let report = runtime.script(&event.script).execute(&context, &scope).await;
            reports.push((event.name, report));
        }
        reports
    }

    pub async fn snapshot(&self) -> Result<serde_json::Value> {
        let events: Vec<Event> = self.events.read().await.values().cloned().collect();
        serde_json::to_value(events).context("Failed to serialize events")
    }

    /// Replaces the contents with a snapshot, without writing it back.
    pub async fn load(&self, snapshot: serde_json::Value) -> Result<usize> {
        let loaded: Vec<Event> =
            serde_json::from_value(snapshot).context("Failed to deserialize events")?;
        let mut events = self.events.write().await;
        *events = loaded.into_iter().map(|e| (e.name.to_lowercase(), e)).collect();
        Ok(events.len())
    }
}
