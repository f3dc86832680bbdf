use crate::domain::value_objects::SourceConfig;

/// One input to the selector
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRequest {
    /// Apply the record's `active` flag and metadata to the matching source
    Set(SourceConfig),
    /// Re-resolve without touching any source, e.g. after a settings edit
    Recompute,
}

/// Ordered source list that keeps at most one source active.
///
/// The selector is a plain state machine; serialization of requests is
/// the caller's job (see `SourceController`).
#[derive(Debug, Clone, Default)]
pub struct ActiveSourceSelector {
    sources: Vec<SourceConfig>,
}

impl ActiveSourceSelector {
    /// Builds the selector, keeping only the last of several active sources
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        let mut selector = Self { sources };
        if let Some(last) = selector.sources.iter().rposition(|s| s.active) {
            for (index, source) in selector.sources.iter_mut().enumerate() {
                source.active = index == last;
            }
        }
        selector
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// First source registered under `name`
    pub fn find(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn active(&self) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.active)
    }

    /// Resolves one request and returns the source left active, if any.
    ///
    /// Always returns the resolution, even when nothing changed; deciding
    /// whether the pipeline needs a restart happens downstream.
    pub fn apply(&mut self, request: &SourceRequest) -> Option<SourceConfig> {
        let incoming = match request {
            SourceRequest::Set(source) => Some(source),
            SourceRequest::Recompute => None,
        };
        let activating = incoming.map(|s| s.active).unwrap_or(false);

        // Activation goes to the first matching entry; everything after it is
        // forced off so duplicate identities cannot both end up active.
        let mut claimed = false;
        let mut resolved = None;

        for source in self.sources.iter_mut() {
            match incoming {
                Some(request) if source.same_identity(request) => {
                    source.display_name = request.display_name.clone();
                    source.guide_channel_id = request.guide_channel_id;
                    source.active = request.active && !claimed;
                    claimed |= source.active;
                }
                _ if activating => source.active = false,
                _ => {}
            }

            if source.active {
                if resolved.is_some() {
                    source.active = false;
                } else {
                    resolved = Some(source.clone());
                }
            }
        }

        resolved
    }
}
