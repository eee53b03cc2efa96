//! Record lifecycle hooks
//!
//! Hooks are keyed by [`Collection`] marker type and resolved at startup.
//! Once built, the registry is shared read-only behind an `Arc`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use mc_common::{Collection, RecordCreatedHook};
use tracing::debug;

struct CreatedHooks<C: Collection>(Vec<Arc<dyn RecordCreatedHook<C>>>);

#[derive(Default)]
pub struct HookRegistry {
    created: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `hook` to records committed to collection `C`
    pub fn on_record_created<C: Collection>(&mut self, hook: Arc<dyn RecordCreatedHook<C>>) -> &mut Self {
        let slot = self
            .created
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(CreatedHooks::<C>(Vec::new())));
        if let Some(hooks) = slot.downcast_mut::<CreatedHooks<C>>() {
            hooks.0.push(hook);
        }
        debug!(collection = C::NAME, "Registered record-created hook");
        self
    }

    /// Notify every hook registered for `C`. Returns the number notified.
    pub fn emit_created<C: Collection>(&self, record: &C::Record) -> usize {
        let Some(hooks) = self
            .created
            .get(&TypeId::of::<C>())
            .and_then(|slot| slot.downcast_ref::<CreatedHooks<C>>())
        else {
            return 0;
        };

        for hook in &hooks.0 {
            hook.on_created(record);
        }
        hooks.0.len()
    }

    pub fn created_hook_count<C: Collection>(&self) -> usize {
        self.created
            .get(&TypeId::of::<C>())
            .and_then(|slot| slot.downcast_ref::<CreatedHooks<C>>())
            .map(|hooks| hooks.0.len())
            .unwrap_or(0)
    }
}
