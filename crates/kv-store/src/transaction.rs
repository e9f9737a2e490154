/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Overwrites a string value.
    Set { key: String, value: String },

    /// Adds `delta` to an integer counter (missing counters start at zero).
    IncrBy { key: String, delta: i64 },

    /// Adds a member to a set.
    SetAdd { key: String, member: String },

    /// Appends a value to the tail of a list.
    ListPush { key: String, value: String },

    /// Writes fields into a hash, keeping fields not mentioned.
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },

    /// Removes a field from a hash.
    HashDelete { key: String, field: String },

    /// Removes a key of any kind.
    Delete { key: String },
}

impl Mutation {
    /// Returns the key this mutation writes.
    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. }
            | Mutation::IncrBy { key, .. }
            | Mutation::SetAdd { key, .. }
            | Mutation::ListPush { key, .. }
            | Mutation::HashSet { key, .. }
            | Mutation::HashDelete { key, .. }
            | Mutation::Delete { key } => key,
        }
    }
}

/// An ordered batch of mutations applied atomically by
/// [`WatchGuard::exec`](crate::WatchGuard::exec).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a string write.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Stages a counter increment.
    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> &mut Self {
        self.push(Mutation::IncrBy {
            key: key.into(),
            delta,
        })
    }

    /// Stages a counter decrement.
    pub fn decr_by(&mut self, key: impl Into<String>, delta: i64) -> &mut Self {
        self.incr_by(key, -delta)
    }

    /// Stages a set insertion.
    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Mutation::SetAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Stages a list append.
    pub fn list_push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Mutation::ListPush {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Stages a hash write.
    pub fn hash_set<K, V>(
        &mut self,
        key: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(Mutation::HashSet {
            key: key.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    /// Stages a hash field removal.
    pub fn hash_delete(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.push(Mutation::HashDelete {
            key: key.into(),
            field: field.into(),
        })
    }

    /// Stages a key removal.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Mutation::Delete { key: key.into() })
    }

    /// Returns the staged mutations in order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Consumes the transaction, returning its mutations.
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    /// Returns the number of staged mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }
}

/// Result of executing a transaction under watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every staged mutation was applied.
    Committed,

    /// A watched key changed after the watch began; nothing was applied.
    Conflict,
}

impl CommitOutcome {
    /// Returns true if the transaction was applied.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}
