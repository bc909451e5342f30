use std::sync::Arc;

use colloquy_core::{BeanStore, BeanStoreProvider, Beans, SessionHandle};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::naming::NamingScheme;

/// The attribute map of one session, shared by every request in it.
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    map: Arc<DashMap<String, Value>>,
}

impl SessionAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.get(name).map(|v| v.value().clone())
    }

    pub fn set(&self, name: String, value: Value) {
        self.map.insert(name, value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.map.remove(name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Attribute names matching `filter`, collected so callers can mutate
    /// the map afterwards without holding shard locks.
    fn names_where(&self, filter: impl Fn(&str) -> bool) -> Vec<String> {
        self.map
            .iter()
            .filter(|r| filter(r.key().as_str()))
            .map(|r| r.key().clone())
            .collect()
    }
}

/// A bean store backed by session attributes.
///
/// A detached store (obtained for an invalidated session) neither reads from
/// nor writes through to the attributes.
pub struct SessionBeanStore {
    naming: NamingScheme,
    attributes: SessionAttributes,
    attached: bool,
}

impl SessionBeanStore {
    #[must_use]
    pub const fn new(naming: NamingScheme, attributes: SessionAttributes, attached: bool) -> Self {
        Self {
            naming,
            attributes,
            attached,
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    fn owned_names(&self) -> Vec<String> {
        self.attributes.names_where(|name| self.naming.owns(name))
    }
}

impl BeanStore for SessionBeanStore {
    fn load(&self, target: &mut Beans) -> anyhow::Result<()> {
        if !self.attached {
            debug!("Bean store detached, nothing to load");
            return Ok(());
        }
        for name in self.owned_names() {
            let Some(bean) = self.naming.deprefix(&name) else {
                continue;
            };
            if let Some(value) = self.attributes.get(&name) {
                trace!("Loading bean {bean} from {name}");
                target.insert(bean.to_string(), value);
            }
        }
        Ok(())
    }

    fn save(&self, source: &Beans) -> anyhow::Result<()> {
        if !self.attached {
            debug!("Bean store detached, skipping write-through");
            return Ok(());
        }
        for name in self.owned_names() {
            let stale = self
                .naming
                .deprefix(&name)
                .is_some_and(|bean| !source.contains_key(bean));
            if stale {
                self.attributes.remove(&name);
            }
        }
        for (bean, value) in source {
            self.attributes.set(self.naming.prefix(bean), value.clone());
        }
        trace!("Saved {} beans", source.len());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        if !self.attached {
            return Ok(());
        }
        let names = self.owned_names();
        for name in &names {
            self.attributes.remove(name);
        }
        debug!("Cleared {} session attributes", names.len());
        Ok(())
    }
}

/// Hands out [`SessionBeanStore`]s over one session's attributes.
#[derive(Debug, Clone)]
pub struct SessionBeanStoreProvider {
    attributes: SessionAttributes,
}

impl SessionBeanStoreProvider {
    #[must_use]
    pub const fn new(attributes: SessionAttributes) -> Self {
        Self { attributes }
    }

    #[must_use]
    pub const fn attributes(&self) -> &SessionAttributes {
        &self.attributes
    }
}

impl BeanStoreProvider for SessionBeanStoreProvider {
    fn of(&self, session: &SessionHandle, invalidated: bool, cid: &str) -> Arc<dyn BeanStore> {
        trace!("Creating bean store for conversation {cid} in {session}");
        Arc::new(SessionBeanStore::new(
            NamingScheme::for_conversation(cid),
            self.attributes.clone(),
            !invalidated,
        ))
    }
}
