//! Named cell and facet domains.
//!
//! Domains are keyed by `(dimension, id)` and kept in insertion order.
//! Entities read from files may carry a numeric tag that has no name yet;
//! such tags stay pending until [`DomainRegistry::prepare_domains`] turns
//! them into registered domains.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::datatypes::{Dim, DomainKey};
use crate::error::{Result, ShellmeshError};

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub key: DomainKey,
    pub name: String,
    pub members: BTreeSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: Vec<Domain>,
    index: HashMap<DomainKey, usize>,
    pending: BTreeMap<DomainKey, BTreeSet<usize>>,
    owners: HashMap<(Dim, usize), u32>,
}

impl DomainRegistry {
    pub fn new() -> DomainRegistry {
        DomainRegistry::default()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn domain_dims(&self) -> Vec<Dim> {
        self.domains.iter().map(|d| d.key.dim).collect()
    }

    pub fn domain_ids(&self) -> Vec<u32> {
        self.domains.iter().map(|d| d.key.id).collect()
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter()
    }

    pub fn contains(&self, dim: Dim, id: u32) -> bool {
        self.index.contains_key(&DomainKey::new(dim, id))
    }

    fn get(&self, dim: Dim, id: u32) -> Result<&Domain> {
        self.index
            .get(&DomainKey::new(dim, id))
            .map(|&i| &self.domains[i])
            .ok_or(ShellmeshError::UnknownDomain { dim, id })
    }

    pub fn domain_name(&self, dim: Dim, id: u32) -> Result<&str> {
        Ok(self.get(dim, id)?.name.as_str())
    }

    pub fn domain_members(&self, dim: Dim, id: u32) -> Result<&BTreeSet<usize>> {
        Ok(&self.get(dim, id)?.members)
    }

    /// Id of the domain (registered or pending) that currently owns an entity
    pub fn domain_of(&self, dim: Dim, entity: usize) -> Option<u32> {
        self.owners.get(&(dim, entity)).copied()
    }

    /// Registers a named domain.
    ///
    /// Registering the same name twice is a no-op. Raw tags already pending
    /// under this key become members of the new domain.
    ///
    /// # Errors
    /// `DuplicateDomain` if the key is registered under another name.
    pub fn register_domain(&mut self, dim: Dim, id: u32, name: &str) -> Result<()> {
        let key = DomainKey::new(dim, id);
        if let Some(&i) = self.index.get(&key) {
            let existing = &self.domains[i].name;
            if existing == name {
                return Ok(());
            }
            return Err(ShellmeshError::DuplicateDomain {
                dim,
                id,
                existing: existing.clone(),
                requested: name.to_owned(),
            });
        }

        let members = self.pending.remove(&key).unwrap_or_default();
        self.index.insert(key, self.domains.len());
        self.domains.push(Domain {
            key,
            name: name.to_owned(),
            members,
        });
        debug!("registered {dim} domain {id} '{name}'");
        Ok(())
    }

    /// Promotes every pending raw tag into a registered domain with a
    /// generated name. Returns how many domains were created.
    pub fn prepare_domains(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let promoted = pending.len();
        for (key, members) in pending {
            let name = match key.dim {
                Dim::Cell => format!("cell_domain_{}", key.id),
                Dim::Facet => format!("facet_domain_{}", key.id),
            };
            self.index.insert(key, self.domains.len());
            self.domains.push(Domain { key, name, members });
        }
        if promoted > 0 {
            debug!("promoted {promoted} raw domain tag(s)");
        }
        promoted
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self, dim: Dim) -> Vec<u32> {
        self.pending
            .keys()
            .filter(|k| k.dim == dim)
            .map(|k| k.id)
            .collect()
    }

    fn release(&mut self, dim: Dim, entity: usize) {
        let Some(previous) = self.owners.remove(&(dim, entity)) else {
            return;
        };
        let key = DomainKey::new(dim, previous);
        if let Some(&i) = self.index.get(&key) {
            self.domains[i].members.remove(&entity);
        } else if let Some(members) = self.pending.get_mut(&key) {
            members.remove(&entity);
            if members.is_empty() {
                self.pending.remove(&key);
            }
        }
    }

    /// Adds an entity to a registered domain, moving it out of any other
    /// domain of the same dimension.
    ///
    /// # Errors
    /// `UnknownDomain` if the domain is not registered.
    pub fn assign_entity(&mut self, dim: Dim, id: u32, entity: usize) -> Result<()> {
        let i = *self
            .index
            .get(&DomainKey::new(dim, id))
            .ok_or(ShellmeshError::UnknownDomain { dim, id })?;
        self.release(dim, entity);
        self.domains[i].members.insert(entity);
        self.owners.insert((dim, entity), id);
        Ok(())
    }

    /// Records a raw numeric tag for an entity, as carried by mesh files.
    ///
    /// The entity joins the registered domain when one exists, otherwise the
    /// tag stays pending until [`DomainRegistry::prepare_domains`].
    pub fn tag_entity(&mut self, dim: Dim, id: u32, entity: usize) {
        self.release(dim, entity);
        self.owners.insert((dim, entity), id);
        if let Some(&i) = self.index.get(&DomainKey::new(dim, id)) {
            self.domains[i].members.insert(entity);
            return;
        }
        self.pending
            .entry(DomainKey::new(dim, id))
            .or_default()
            .insert(entity);
    }

    /// Smallest id strictly above every registered or pending id of `dim`.
    ///
    /// # Errors
    /// `DomainIdsExhausted` when `u32::MAX` is already taken.
    pub fn next_unused_id(&self, dim: Dim) -> Result<u32> {
        let highest = self
            .domains
            .iter()
            .map(|d| d.key)
            .chain(self.pending.keys().copied())
            .filter(|key| key.dim == dim)
            .map(|key| key.id)
            .max();
        match highest {
            None => Ok(1),
            Some(id) => id
                .checked_add(1)
                .ok_or(ShellmeshError::DomainIdsExhausted { dim }),
        }
    }

    /// Fails if `other` defines a key of this registry under another name.
    pub fn check_collisions(&self, other: &DomainRegistry) -> Result<()> {
        for domain in &other.domains {
            if let Some(&i) = self.index.get(&domain.key) {
                let mine = &self.domains[i];
                if mine.name != domain.name {
                    return Err(ShellmeshError::DomainIdCollision {
                        dim: domain.key.dim,
                        id: domain.key.id,
                        left: mine.name.clone(),
                        right: domain.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Moves the domains of `other` into this registry, shifting member
    /// indices by the offsets their entities received when appended.
    ///
    /// # Errors
    /// `DomainIdCollision` when both registries name the same key differently.
    /// Nothing is modified in that case.
    pub fn absorb(
        &mut self,
        other: DomainRegistry,
        cell_offset: usize,
        facet_offset: usize,
    ) -> Result<()> {
        self.check_collisions(&other)?;

        let offset = |dim: Dim| match dim {
            Dim::Cell => cell_offset,
            Dim::Facet => facet_offset,
        };

        for domain in other.domains {
            let shift = offset(domain.key.dim);
            self.register_domain(domain.key.dim, domain.key.id, &domain.name)?;
            for member in domain.members {
                self.assign_entity(domain.key.dim, domain.key.id, member + shift)?;
            }
        }
        for (key, members) in other.pending {
            let shift = offset(key.dim);
            for member in members {
                self.tag_entity(key.dim, key.id, member + shift);
            }
        }
        Ok(())
    }

    /// Largest member index per dimension, for range checks
    pub(crate) fn max_member(&self, dim: Dim) -> Option<usize> {
        self.owners
            .keys()
            .filter(|(d, _)| *d == dim)
            .map(|&(_, entity)| entity)
            .max()
    }
}
