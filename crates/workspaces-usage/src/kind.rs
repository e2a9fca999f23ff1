//! Object kinds protected from deletion while workspaces reference them

use std::fmt;

use workspaces_common::crd::Workspace;
use workspaces_common::events::reasons;
use workspaces_common::labels::{
    ACCESS_STRATEGY_FINALIZER, LABEL_ACCESS_STRATEGY_NAME, LABEL_ACCESS_STRATEGY_NAMESPACE,
    LABEL_TEMPLATE_NAME, LABEL_TEMPLATE_NAMESPACE, TEMPLATE_FINALIZER,
};

/// A kind whose objects carry a finalizer while referenced by active workspaces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtectedKind {
    /// WorkspaceTemplate, referenced through `spec.templateRef`
    Template,
    /// WorkspaceAccessStrategy, referenced through `spec.accessStrategy`
    AccessStrategy,
}

impl ProtectedKind {
    /// Finalizer held while the object is in use
    pub fn finalizer(self) -> &'static str {
        match self {
            Self::Template => TEMPLATE_FINALIZER,
            Self::AccessStrategy => ACCESS_STRATEGY_FINALIZER,
        }
    }

    /// Workspace label carrying the referenced object's name
    pub fn name_label(self) -> &'static str {
        match self {
            Self::Template => LABEL_TEMPLATE_NAME,
            Self::AccessStrategy => LABEL_ACCESS_STRATEGY_NAME,
        }
    }

    /// Workspace label carrying the referenced object's namespace
    pub fn namespace_label(self) -> &'static str {
        match self {
            Self::Template => LABEL_TEMPLATE_NAMESPACE,
            Self::AccessStrategy => LABEL_ACCESS_STRATEGY_NAMESPACE,
        }
    }

    /// Event reason when deletion is blocked
    pub fn in_use_reason(self) -> &'static str {
        match self {
            Self::Template => reasons::TEMPLATE_IN_USE,
            Self::AccessStrategy => reasons::ACCESS_STRATEGY_IN_USE,
        }
    }

    /// The (name, namespace) the workspace's spec references, if any
    pub fn spec_reference(self, ws: &Workspace) -> Option<(String, String)> {
        match self {
            Self::Template => ws.template_key(),
            Self::AccessStrategy => ws.access_strategy_key(),
        }
    }

    /// The (name, namespace) recorded in the workspace's link labels
    pub fn label_reference(self, ws: &Workspace) -> Option<(String, String)> {
        let labels = ws.metadata.labels.as_ref()?;
        let name = labels.get(self.name_label()).filter(|n| !n.is_empty())?;
        let namespace = labels.get(self.namespace_label())?;
        Some((name.clone(), namespace.clone()))
    }

    /// Label selector matching workspaces linked to `name` in `namespace`
    pub fn label_selector(self, name: &str, namespace: &str) -> String {
        format!(
            "{}={},{}={}",
            self.name_label(),
            name,
            self.namespace_label(),
            namespace
        )
    }
}

impl fmt::Display for ProtectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::AccessStrategy => write!(f, "access strategy"),
        }
    }
}
