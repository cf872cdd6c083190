/*
    A implementation of EventHooks that prints to stdout for debugging purposes.
*/

use crate::imports::*;

pub struct DebugEventHooks;

#[async_trait::async_trait]
impl EventHooks for DebugEventHooks {
    async fn before_execute_script(&self, event: &hook_events::ScriptStarted) -> Result<()> {
        println!("DebugEventHooks - before_execute_script: {:?}", event);
        Ok(())
    }
    async fn after_execute_script(&self, event: &hook_events::ScriptFinished) -> Result<()> {
        println!(
            "DebugEventHooks - after_execute_script: {:?} ({:?})",
            event,
            event.finished_at.duration_since(event.started_at)
        );
        Ok(())
    }
    async fn after_registry_write(&self, event: &hook_events::RegistryWritten) -> Result<()> {
        println!("DebugEventHooks - after_registry_write: {:?}", event);
        Ok(())
    }
}
