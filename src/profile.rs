//! Named cluster profiles.
//!
//! A profile gives a cluster a name and the bootstrap brokers to reach it with. Persisting
//! profiles is up to the embedding application; the [`ConnectionRegistry`](crate::registry::ConnectionRegistry)
//! only needs a [`ProfileStore`] to look them up.
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("Profile name must not be empty")]
    EmptyName,

    #[error("Profile \"{0}\" has an empty broker list")]
    EmptyBrokerList(String),

    #[error("Profile \"{0}\" already exists")]
    AlreadyExists(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    bootstrap_brokers: Vec<String>,
}

impl Profile {
    /// Blank broker entries are dropped; at least one broker must remain.
    pub fn new<A, I>(name: impl Into<String>, bootstrap_brokers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        let bootstrap_brokers: Vec<String> = bootstrap_brokers
            .into_iter()
            .map(Into::into)
            .map(|b| b.trim().to_owned())
            .filter(|b| !b.is_empty())
            .collect();
        if bootstrap_brokers.is_empty() {
            return Err(Error::EmptyBrokerList(name));
        }

        Ok(Self {
            name,
            bootstrap_brokers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Never empty.
    pub fn bootstrap_brokers(&self) -> &[String] {
        &self.bootstrap_brokers
    }
}

/// Lookup of profiles by name.
pub trait ProfileStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Profile>;
}

/// [`ProfileStore`] that keeps profiles in memory, in creation order.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<Vec<Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile. Names are unique.
    pub fn create(&self, profile: Profile) -> Result<(), Error> {
        let mut profiles = self.profiles.write();
        if profiles.iter().any(|p| p.name == profile.name) {
            return Err(Error::AlreadyExists(profile.name));
        }
        profiles.push(profile);
        Ok(())
    }

    /// Remove a profile, returning it if it existed.
    pub fn delete(&self, name: &str) -> Option<Profile> {
        let mut profiles = self.profiles.write();
        let idx = profiles.iter().position(|p| p.name == name)?;
        Some(profiles.remove(idx))
    }

    pub fn list(&self) -> Vec<Profile> {
        self.profiles.read().clone()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, name: &str) -> Option<Profile> {
        self.profiles.read().iter().find(|p| p.name == name).cloned()
    }
}

impl<T> ProfileStore for std::sync::Arc<T>
where
    T: ProfileStore + ?Sized,
{
    fn get(&self, name: &str) -> Option<Profile> {
        (**self).get(name)
    }
}
