use std::fmt;
use std::time::Duration;

use rekon_core::Identity;
use rekon_kubehub::{is_conflict, is_not_found};

/// Server round trip a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    List,
    Patch,
    Create,
    Update,
    Delete,
    DeleteDependents,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Get => "get",
            Op::List => "list",
            Op::Patch => "patch",
            Op::Create => "create",
            Op::Update => "update",
            Op::Delete => "delete",
            Op::DeleteDependents => "delete dependents",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{id} not found ({op})")]
    NotFound {
        id: Identity,
        op: Op,
        #[source]
        source: kube::Error,
    },
    #[error("{id} was modified concurrently ({op})")]
    Conflict {
        id: Identity,
        op: Op,
        #[source]
        source: kube::Error,
    },
    #[error("{id} already exists and is not managed by this caller")]
    AlreadyExists { id: Identity },
    #[error("{op} {id}")]
    Transport {
        id: Identity,
        op: Op,
        #[source]
        source: kube::Error,
    },
    #[error("encoding {id}")]
    Encode {
        id: Identity,
        #[source]
        source: serde_json::Error,
    },
    #[error("{op} {id} exceeded deadline of {after:?}")]
    DeadlineExceeded { id: Identity, op: Op, after: Duration },
    #[error("claim could not be evaluated: {reason}")]
    Claim { reason: String },
    #[error("{id} needs a dependents handle to clean up orphans")]
    MissingDependents { id: Identity },
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Classify a kube error for `id`: 404 and 409 get their own variants.
    pub fn from_kube(id: Identity, op: Op, source: kube::Error) -> Self {
        if is_not_found(&source) {
            Error::NotFound { id, op, source }
        } else if is_conflict(&source) {
            Error::Conflict { id, op, source }
        } else {
            Error::Transport { id, op, source }
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context { context: context.into(), source: Box::new(self) }
    }

    /// Innermost error, skipping context annotations.
    pub fn root(&self) -> &Error {
        let mut cur = self;
        while let Error::Context { source, .. } = cur {
            cur = source.as_ref();
        }
        cur
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::AlreadyExists { .. })
    }

    /// Identity the failure is about, when known.
    pub fn identity(&self) -> Option<&Identity> {
        match self.root() {
            Error::NotFound { id, .. }
            | Error::Conflict { id, .. }
            | Error::AlreadyExists { id }
            | Error::Transport { id, .. }
            | Error::Encode { id, .. }
            | Error::DeadlineExceeded { id, .. }
            | Error::MissingDependents { id } => Some(id),
            Error::Claim { .. } | Error::Context { .. } => None,
        }
    }
}
