/*
    Types for supporting the EventHooks trait:
    * ScriptStarted
    * ScriptFinished
    * RegistryWritten
*/
use crate::imports::*;

#[derive(Debug)]
pub struct ScriptStarted {
    pub origin: OriginKind,
    pub origin_name: String,
    pub channel: Option<String>,
    pub script: String,
}

#[derive(Debug)]
pub struct ScriptFinished {
    pub origin_name: String,
    pub channel: Option<String>,
    pub items: usize,
    pub terminal: bool,
    pub warnings: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[derive(Debug)]
pub struct RegistryWritten {
    pub registry: String,
    pub entries: usize,
    pub written_at: Instant,
}
