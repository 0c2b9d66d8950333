// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Optional compiled-in extensions and the mode they put the app in.

use std::fmt;

use anyhow::{Result, bail};

/// What an extension adds to the app.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Upload exported sections to the filing portal.
    PortalUpload,
    /// Track shipments sent through the portal.
    ShipmentTracking,
    /// Store portal credentials.
    Credentials,
}

pub trait Extension {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn capabilities(&self) -> &[Capability];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppMode {
    OpenCore,
    Full,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::OpenCore => write!(f, "Open Core"),
            AppMode::Full => write!(f, "Completo"),
        }
    }
}

#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension; ids must be unique.
    pub fn register(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        if self.get(extension.id()).is_some() {
            bail!("extension '{}' is already registered", extension.id());
        }
        log::info!("Extension {} loaded", extension.display_name());
        self.extensions.push(extension);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn Extension> {
        self.extensions.iter().find(|e| e.id() == id).map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.extensions
            .iter()
            .any(|e| e.capabilities().contains(&capability))
    }

    /// Full mode needs a portal extension.
    pub fn mode(&self) -> AppMode {
        if self.has_capability(Capability::PortalUpload) {
            AppMode::Full
        } else {
            AppMode::OpenCore
        }
    }
}

/// Register every extension compiled into this build.
pub fn load_extensions() -> ExtensionRegistry {
    let registry = ExtensionRegistry::new();
    if registry.mode() == AppMode::OpenCore {
        log::info!("Portal extension not found. Running in Open Core mode.");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        id: &'static str,
        caps: Vec<Capability>,
    }

    impl Extension for Fake {
        fn id(&self) -> &str {
            self.id
        }

        fn display_name(&self) -> &str {
            "Fake"
        }

        fn capabilities(&self) -> &[Capability] {
            &self.caps
        }
    }

    #[test]
    fn open_build_runs_in_open_core_mode() {
        let registry = load_extensions();
        assert!(registry.is_empty());
        assert_eq!(registry.mode(), AppMode::OpenCore);
    }

    #[test]
    fn portal_extension_enables_full_mode() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(Box::new(Fake {
                id: "tracker",
                caps: vec![Capability::ShipmentTracking],
            }))
            .unwrap();
        assert_eq!(registry.mode(), AppMode::OpenCore);

        registry
            .register(Box::new(Fake {
                id: "ove",
                caps: vec![Capability::PortalUpload, Capability::Credentials],
            }))
            .unwrap();
        assert_eq!(registry.mode(), AppMode::Full);
        assert!(registry.get("ove").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = ExtensionRegistry::new();
        let fake = || Box::new(Fake { id: "ove", caps: vec![] });
        registry.register(fake()).unwrap();
        assert!(registry.register(fake()).is_err());
    }
}
