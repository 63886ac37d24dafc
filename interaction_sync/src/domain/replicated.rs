// Replicated field wrapper: a value, the role allowed to write it, and change observers.

use crate::domain::errors::ReplicationError;

/// Which role may write a replicated field. Everyone may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Only the current owner of the object writes (e.g. `is_interacting`).
    Owner,
    /// Only the host writes (the `owner` assignment itself).
    Server,
}

/// Roles held by whoever is attempting a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteContext {
    pub is_owner: bool,
    pub is_server: bool,
}

impl WriteContext {
    pub const OWNER: WriteContext = WriteContext {
        is_owner: true,
        is_server: false,
    };

    pub const SERVER: WriteContext = WriteContext {
        is_owner: false,
        is_server: true,
    };
}

impl Authority {
    pub fn permits(self, ctx: WriteContext) -> bool {
        match self {
            Authority::Owner => ctx.is_owner,
            Authority::Server => ctx.is_server,
        }
    }
}

/// Old and new value of an applied write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

type Observer<T> = Box<dyn FnMut(&T, &T) + Send>;

pub struct ReplicatedField<T> {
    name: &'static str,
    value: T,
    authority: Authority,
    observers: Vec<Observer<T>>,
}

impl<T> std::fmt::Debug for ReplicatedField<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("authority", &self.authority)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<T> ReplicatedField<T>
where
    T: Clone + PartialEq,
{
    pub fn new(name: &'static str, initial: T, authority: Authority) -> Self {
        Self {
            name,
            value: initial,
            authority,
            observers: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Registers a callback invoked with `(old, new)` after every applied change.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Applies a write if the writer holds this field's authority.
    ///
    /// Returns `Ok(None)` when the value is unchanged; observers only run on a real change.
    pub fn write(&mut self, value: T, ctx: WriteContext) -> Result<Option<Change<T>>, ReplicationError> {
        if !self.authority.permits(ctx) {
            return Err(ReplicationError::NotAuthorized {
                field: self.name,
                authority: self.authority,
            });
        }

        Ok(self.replace(value))
    }

    /// Overwrites the value from an authoritative snapshot without an authority check.
    pub fn restore(&mut self, value: T) -> Option<Change<T>> {
        self.replace(value)
    }

    fn replace(&mut self, value: T) -> Option<Change<T>> {
        if self.value == value {
            return None;
        }

        let old = std::mem::replace(&mut self.value, value);
        for observer in &mut self.observers {
            observer(&old, &self.value);
        }

        Some(Change {
            old,
            new: self.value.clone(),
        })
    }
}
