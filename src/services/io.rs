use crate::imports::*;
use std::sync::{Mutex, PoisonError};

/*
    Built-in ScriptIO implementations:
    * StdoutInteraction - prints everything, for CLIs
    * BufferedInteraction - keeps everything in memory, for embedding and tests
*/
pub struct StdoutInteraction;

#[async_trait]
impl ScriptIO for StdoutInteraction {
    async fn deliver(&self, _channel: Option<&str>, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    async fn report(&self, _channel: Option<&str>, diagnostic: &Diagnostic) -> Result<()> {
        println!("{}\n{}", diagnostic.title, diagnostic.body);
        Ok(())
    }
}

type Delivered = Vec<(Option<String>, String)>;

#[derive(Clone, Default)]
pub struct BufferedInteraction {
    delivered: Arc<Mutex<Delivered>>,
    reports: Arc<Mutex<Vec<Diagnostic>>>,
}

impl BufferedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Delivered {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reports(&self) -> Vec<Diagnostic> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ScriptIO for BufferedInteraction {
    async fn deliver(&self, channel: Option<&str>, text: &str) -> Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.map(str::to_string), text.to_string()));
        Ok(())
    }

    async fn report(&self, _channel: Option<&str>, diagnostic: &Diagnostic) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
        Ok(())
    }
}
